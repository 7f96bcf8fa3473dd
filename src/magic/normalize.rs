//! Text normalization primitives for metadata processing.
//!
//! Resolution and dedup decisions are made on normalized values, never on
//! raw display text, so every function here must be idempotent:
//! `f(f(x)) == f(x)` for all inputs.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref MULTI_SPACE: Regex = Regex::new(r"\s{2,}").unwrap();
    /// Trailing "featuring" clause: `feat.`, `ft.`, `featuring`, optionally
    /// parenthesized/bracketed.
    static ref FEATURING: Regex =
        Regex::new(r"(?i)[\(\[]?\s*\b(?:feat|ft|featuring)\b[\s.:]*").unwrap();
    /// Separators between multiple artist names in a single tag value.
    static ref ARTIST_SEPARATORS: Regex = Regex::new(r"\s*(?:;|,|/| & )\s*").unwrap();
}

/// The canonical separator for multi-artist tag values (standard ID3).
pub const CANONICAL_ARTIST_SEPARATOR: &str = "/";

/// Strip combining accents from characters in the Latin-1 supplement range
/// so "Motörhead" and "Motorhead" normalize identically.
fn fold_diacritics(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'a',
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => 'u',
        'ý' | 'ÿ' | 'Ý' => 'y',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        'ß' => 's',
        _ => c,
    }
}

/// Uppercase, diacritic-folded, punctuation-stripped form used as the
/// resolution/dedup key ("Pink_Floyd" → "PINK FLOYD").
pub fn normalize_name(input: &str) -> String {
    let replaced = input
        .replace('’', "'")
        .replace('&', " AND ")
        .replace('$', "S")
        .replace(['_', '-', '.'], " ");
    let mut out = String::with_capacity(replaced.len());
    for c in replaced.chars().map(fold_diacritics) {
        if c.is_alphanumeric() {
            out.extend(c.to_uppercase());
        } else if c.is_whitespace() {
            out.push(' ');
        }
        // everything else is dropped
    }
    MULTI_SPACE.replace_all(out.trim(), " ").to_string()
}

/// Collapse runs of whitespace and trim.
pub fn clean_display(input: &str) -> String {
    MULTI_SPACE
        .replace_all(input.replace('’', "'").trim(), " ")
        .to_string()
}

/// Article-aware sort form: a leading ignored article moves to the end
/// ("The Wall" → "Wall, The"). Articles are compared case-insensitively.
pub fn sort_name(input: &str, ignored_articles: &[String]) -> String {
    let cleaned = clean_display(input);
    if let Some((first, rest)) = cleaned.split_once(' ') {
        let first_upper = first.to_uppercase();
        if !rest.is_empty() && ignored_articles.iter().any(|a| *a == first_upper) {
            return format!("{}, {}", rest, first);
        }
    }
    cleaned
}

/// Remove configured fragments from a title (case-insensitive, literal).
pub fn strip_fragments(input: &str, removals: &[String]) -> String {
    let mut result = input.to_string();
    for fragment in removals {
        if fragment.is_empty() {
            continue;
        }
        let lowered_fragment = fragment.to_lowercase();
        loop {
            let lowered = result.to_lowercase();
            match lowered.find(&lowered_fragment) {
                Some(index) => {
                    result.replace_range(index..index + fragment.len(), "");
                }
                None => break,
            }
        }
    }
    clean_display(&result)
}

/// Split a trailing "featuring X" clause out of a value. Returns the value
/// without the clause and the featured-artist text, if any.
pub fn split_featuring(input: &str) -> (String, Option<String>) {
    match FEATURING.find(input) {
        Some(found) if found.start() > 0 => {
            let main = input[..found.start()].trim_end_matches(['(', '[', ' ']);
            let guest = input[found.end()..].trim().trim_end_matches([')', ']']).trim();
            let guest = if guest.is_empty() {
                None
            } else {
                Some(clean_display(guest))
            };
            (clean_display(main), guest)
        }
        _ => (clean_display(input), None),
    }
}

/// Normalize multi-artist separators to the canonical one and return the
/// individual names.
pub fn split_artist_list(input: &str) -> Vec<String> {
    ARTIST_SEPARATORS
        .split(input)
        .map(clean_display)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Canonical multi-artist value with normalized separators.
pub fn canonicalize_artist_separators(input: &str) -> String {
    split_artist_list(input).join(CANONICAL_ARTIST_SEPARATOR)
}

/// Replace a whole artist name with its canonical spelling when the value
/// matches one of the configured variants (case-insensitive).
pub fn apply_artist_replacement(
    input: &str,
    replacements: &std::collections::HashMap<String, String>,
) -> String {
    let cleaned = clean_display(input);
    for (variant, canonical) in replacements {
        if variant.eq_ignore_ascii_case(&cleaned) {
            return canonical.clone();
        }
    }
    cleaned
}

/// Clamp a release year into the configured bounds. Out-of-range or missing
/// years resolve to the current year when `use_current_for_invalid` is set,
/// otherwise to `None`.
pub fn validate_year(
    year: Option<i64>,
    minimum: i64,
    maximum: i64,
    use_current_for_invalid: bool,
    current_year: i64,
) -> Option<i64> {
    match year {
        Some(y) if y >= minimum && y <= maximum => Some(y),
        _ if use_current_for_invalid => Some(current_year),
        _ => None,
    }
}

/// Left-pad a song number to the width implied by the maximum allowed
/// number (9999 → width 4).
pub fn pad_number(number: i64, maximum: i64) -> String {
    let width = maximum.max(1).to_string().len();
    format!("{:0width$}", number, width = width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn articles() -> Vec<String> {
        "THE|EL|LA|LOS|LAS|LE|LES|OS|AS|O|A"
            .split('|')
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn normalize_name_basic() {
        assert_eq!(normalize_name("Pink Floyd"), "PINK FLOYD");
        assert_eq!(normalize_name("Pink_Floyd"), "PINK FLOYD");
        assert_eq!(normalize_name("  pink   floyd  "), "PINK FLOYD");
        assert_eq!(normalize_name("Motörhead"), "MOTORHEAD");
        assert_eq!(normalize_name("Simon & Garfunkel"), "SIMON AND GARFUNKEL");
    }

    #[test]
    fn normalize_name_is_idempotent() {
        for input in [
            "Pink_Floyd",
            "The Beatles!",
            "Sigur Rós",
            "AC/DC",
            "  spaced   out  ",
            "Simon & Garfunkel",
        ] {
            let once = normalize_name(input);
            assert_eq!(normalize_name(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn sort_name_moves_leading_article() {
        let articles = articles();
        assert_eq!(sort_name("The Wall", &articles), "Wall, The");
        assert_eq!(sort_name("Los Lobos", &articles), "Lobos, Los");
        assert_eq!(sort_name("Wall, The", &articles), "Wall, The");
        assert_eq!(sort_name("Abbey Road", &articles), "Abbey Road");
        // A bare article is left alone.
        assert_eq!(sort_name("The", &articles), "The");
    }

    #[test]
    fn strip_fragments_removes_case_insensitively() {
        let removals = vec!["(Remaster)".to_string(), ";".to_string()];
        assert_eq!(
            strip_fragments("Money (remaster)", &removals),
            "Money"
        );
        assert_eq!(strip_fragments("Time; ", &removals), "Time");
        let idempotent = strip_fragments("Money (Remaster)", &removals);
        assert_eq!(strip_fragments(&idempotent, &removals), idempotent);
    }

    #[test]
    fn split_featuring_extracts_guest() {
        assert_eq!(
            split_featuring("Lucky (feat. Daft Punk)"),
            ("Lucky".to_string(), Some("Daft Punk".to_string()))
        );
        assert_eq!(
            split_featuring("Lucky ft. Daft Punk"),
            ("Lucky".to_string(), Some("Daft Punk".to_string()))
        );
        assert_eq!(split_featuring("Lucky"), ("Lucky".to_string(), None));
        // A value that merely starts with "Feat..." is not a featuring clause.
        assert_eq!(
            split_featuring("Featuring Tonight"),
            ("Featuring Tonight".to_string(), None)
        );
    }

    #[test]
    fn artist_separator_canonicalization() {
        assert_eq!(
            canonicalize_artist_separators("A; B"),
            "A/B"
        );
        assert_eq!(canonicalize_artist_separators("A, B & C"), "A/B/C");
        assert_eq!(split_artist_list("Solo"), vec!["Solo".to_string()]);
    }

    #[test]
    fn artist_replacement_matches_variants() {
        let mut replacements = HashMap::new();
        replacements.insert("AC; DC".to_string(), "AC/DC".to_string());
        replacements.insert("AC DC".to_string(), "AC/DC".to_string());
        assert_eq!(apply_artist_replacement("ac dc", &replacements), "AC/DC");
        assert_eq!(
            apply_artist_replacement("Led Zeppelin", &replacements),
            "Led Zeppelin"
        );
    }

    #[test]
    fn year_validation_clamps_to_current() {
        assert_eq!(validate_year(Some(1979), 1860, 2150, true, 2026), Some(1979));
        assert_eq!(validate_year(Some(1500), 1860, 2150, true, 2026), Some(2026));
        assert_eq!(validate_year(Some(1500), 1860, 2150, false, 2026), None);
        assert_eq!(validate_year(None, 1860, 2150, true, 2026), Some(2026));
        assert_eq!(validate_year(None, 1860, 2150, false, 2026), None);
    }

    #[test]
    fn pad_number_uses_width_of_maximum() {
        assert_eq!(pad_number(3, 9999), "0003");
        assert_eq!(pad_number(42, 999), "042");
        assert_eq!(pad_number(7, 9), "7");
    }
}
