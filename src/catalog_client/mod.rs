mod backoff;
mod client;
mod error;
mod models;

pub use client::{CatalogApi, SpotifyClient, DEFAULT_API_BASE};
pub use error::{CatalogError, CatalogResult};
pub use models::*;
