mod models;
mod schema;
mod store;
mod trait_def;

pub use models::*;
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use store::SqliteCatalogStore;
pub use trait_def::{
    AlbumExternalIds, AlbumWrite, ArtistExternalIds, ArtistRelationWrite, ArtistWrite,
    CatalogStore, ContributorWrite, SongFields, SongWrite, UnitCounts, UnitWrite,
};
