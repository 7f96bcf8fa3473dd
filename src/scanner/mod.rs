//! Directory scanner: enumerates an inbound/staging library into candidate
//! album directories.
//!
//! Traversal is read-only. A candidate is a leaf-most directory directly
//! containing at least one audio file; directories carrying the skipped or
//! duplicate prefix are excluded, as is everything beneath them.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Audio file extensions recognized by the scanner.
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "opus", "m4a", "aac", "wav", "aiff", "aif", "wma",
];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Unreadable directory {path}: {message}")]
    UnreadableDirectory { path: PathBuf, message: String },
}

/// One file inside a candidate directory.
#[derive(Clone, Debug)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub file_name: String,
    pub file_size: i64,
    pub is_audio: bool,
}

/// A candidate album directory: path, modification time and its direct
/// file listing.
#[derive(Clone, Debug)]
pub struct AlbumDirectory {
    pub path: PathBuf,
    pub modified_at: Option<std::time::SystemTime>,
    pub files: Vec<CandidateFile>,
}

impl AlbumDirectory {
    pub fn audio_files(&self) -> impl Iterator<Item = &CandidateFile> {
        self.files.iter().filter(|f| f.is_audio)
    }

    pub fn directory_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Directory-name prefixes to skip entirely (skipped + duplicate).
    pub skip_prefixes: Vec<String>,
    /// Hard cap on yielded candidates; 0 means unlimited.
    pub maximum_processing_count: usize,
    /// Per-scan limit (`stagingDirectoryScanLimit`); 0 means unlimited.
    pub scan_limit: usize,
}

impl ScanOptions {
    fn effective_limit(&self) -> usize {
        match (self.maximum_processing_count, self.scan_limit) {
            (0, 0) => usize::MAX,
            (0, limit) | (limit, 0) => limit,
            (a, b) => a.min(b),
        }
    }
}

pub struct DirectoryScanner;

impl DirectoryScanner {
    /// Enumerate candidate album directories under `root`.
    ///
    /// Returns candidates in path order (restartable: a fresh call re-walks
    /// the tree) and per-directory errors for unreadable entries; the
    /// caller decides whether an error aborts the scan.
    pub fn scan(
        root: &Path,
        options: &ScanOptions,
    ) -> Vec<Result<AlbumDirectory, ScanError>> {
        let limit = options.effective_limit();
        let mut results: Vec<Result<AlbumDirectory, ScanError>> = Vec::new();
        let mut candidates = 0usize;

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if !entry.file_type().is_dir() {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                let skipped = options
                    .skip_prefixes
                    .iter()
                    .any(|prefix| !prefix.trim().is_empty() && name.starts_with(prefix.trim()));
                if skipped {
                    debug!("Skipping prefixed directory {:?}", entry.path());
                }
                !skipped
            });

        for entry in walker {
            if candidates >= limit {
                break;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    results.push(Err(ScanError::UnreadableDirectory {
                        path,
                        message: e.to_string(),
                    }));
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            match Self::read_directory(entry.path()) {
                Ok(Some(album_directory)) => {
                    candidates += 1;
                    results.push(Ok(album_directory));
                }
                Ok(None) => {}
                Err(e) => results.push(Err(e)),
            }
        }
        results
    }

    /// Read one directory's direct children; `None` when it holds no audio
    /// files (not a candidate).
    fn read_directory(path: &Path) -> Result<Option<AlbumDirectory>, ScanError> {
        let read_dir = std::fs::read_dir(path).map_err(|e| ScanError::UnreadableDirectory {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut files = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| ScanError::UnreadableDirectory {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            let metadata = match dir_entry.metadata() {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let file_name = dir_entry.file_name().to_string_lossy().to_string();
            files.push(CandidateFile {
                is_audio: is_audio_file(&dir_entry.path()),
                path: dir_entry.path(),
                file_name,
                file_size: metadata.len() as i64,
            });
        }

        if !files.iter().any(|f| f.is_audio) {
            return Ok(None);
        }
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        let modified_at = std::fs::metadata(path).ok().and_then(|m| m.modified().ok());
        Ok(Some(AlbumDirectory {
            path: path.to_path_buf(),
            modified_at,
            files,
        }))
    }
}

fn is_audio_file(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        }
        // No extension: sniff the content.
        None => matches!(
            infer::get_from_path(path),
            Ok(Some(kind)) if kind.matcher_type() == infer::MatcherType::Audio
        ),
    }
}

/// Group an ordered candidate stream into processing batches.
pub fn into_batches<T>(items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut current = Vec::with_capacity(batch_size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == batch_size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options() -> ScanOptions {
        ScanOptions {
            skip_prefixes: vec!["_skip_ ".to_string(), "_duplicate_ ".to_string()],
            maximum_processing_count: 0,
            scan_limit: 0,
        }
    }

    fn make_album(root: &Path, artist: &str, album: &str, songs: &[&str]) {
        let dir = root.join(artist).join(album);
        std::fs::create_dir_all(&dir).unwrap();
        for song in songs {
            std::fs::write(dir.join(song), b"audio").unwrap();
        }
    }

    #[test]
    fn finds_directories_with_audio_files() {
        let temp = TempDir::new().unwrap();
        make_album(temp.path(), "Pink Floyd", "The Wall", &["01.mp3", "02.mp3"]);
        make_album(temp.path(), "Pink Floyd", "Animals", &["01.flac"]);
        // A directory with only artwork is not a candidate.
        let art_dir = temp.path().join("Pink Floyd").join("Artwork");
        std::fs::create_dir_all(&art_dir).unwrap();
        std::fs::write(art_dir.join("cover.jpg"), b"img").unwrap();

        let results = DirectoryScanner::scan(temp.path(), &options());
        let candidates: Vec<_> = results.into_iter().filter_map(Result::ok).collect();
        assert_eq!(candidates.len(), 2);
        let names: Vec<String> = candidates.iter().map(|c| c.directory_name()).collect();
        assert!(names.contains(&"The Wall".to_string()));
        assert!(names.contains(&"Animals".to_string()));
    }

    #[test]
    fn audio_and_non_audio_files_are_distinguished() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("A").join("B");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("01.mp3"), b"audio").unwrap();
        std::fs::write(dir.join("cover.jpg"), b"img").unwrap();
        std::fs::write(dir.join("notes.txt"), b"text").unwrap();

        let results = DirectoryScanner::scan(temp.path(), &options());
        let candidate = results.into_iter().find_map(Result::ok).unwrap();
        assert_eq!(candidate.files.len(), 3);
        assert_eq!(candidate.audio_files().count(), 1);
    }

    #[test]
    fn skip_prefixed_directories_are_excluded() {
        let temp = TempDir::new().unwrap();
        make_album(temp.path(), "A", "Good Album", &["01.mp3"]);
        make_album(temp.path(), "A", "_skip_ Broken Album", &["01.mp3"]);
        make_album(temp.path(), "A", "_duplicate_ Old Album", &["01.mp3"]);

        let results = DirectoryScanner::scan(temp.path(), &options());
        let candidates: Vec<_> = results.into_iter().filter_map(Result::ok).collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].directory_name(), "Good Album");
    }

    #[test]
    fn processing_count_caps_candidates() {
        let temp = TempDir::new().unwrap();
        for i in 0..5 {
            make_album(temp.path(), "A", &format!("Album {i}"), &["01.mp3"]);
        }
        let mut options = options();
        options.maximum_processing_count = 3;
        let results = DirectoryScanner::scan(temp.path(), &options);
        assert_eq!(results.into_iter().filter_map(Result::ok).count(), 3);
    }

    #[test]
    fn scan_limit_and_processing_count_use_the_smaller() {
        let temp = TempDir::new().unwrap();
        for i in 0..5 {
            make_album(temp.path(), "A", &format!("Album {i}"), &["01.mp3"]);
        }
        let mut options = options();
        options.maximum_processing_count = 4;
        options.scan_limit = 2;
        let results = DirectoryScanner::scan(temp.path(), &options);
        assert_eq!(results.into_iter().filter_map(Result::ok).count(), 2);
    }

    #[test]
    fn rescan_yields_the_same_candidates() {
        let temp = TempDir::new().unwrap();
        make_album(temp.path(), "A", "X", &["01.mp3"]);
        make_album(temp.path(), "B", "Y", &["01.mp3"]);

        let first: Vec<PathBuf> = DirectoryScanner::scan(temp.path(), &options())
            .into_iter()
            .filter_map(Result::ok)
            .map(|c| c.path)
            .collect();
        let second: Vec<PathBuf> = DirectoryScanner::scan(temp.path(), &options())
            .into_iter()
            .filter_map(Result::ok)
            .map(|c| c.path)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn batches_split_evenly() {
        let batches = into_batches((0..7).collect::<Vec<_>>(), 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], vec![0, 1, 2]);
        assert_eq!(batches[2], vec![6]);
        assert!(into_batches(Vec::<i32>::new(), 3).is_empty());
    }
}
