//! Wire types for the remote catalog API.
//!
//! Every identifying field is optional at the wire level; the resolver drops
//! (and logs) objects that arrive without one instead of inventing sentinels.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageObject {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

/// Prefer the 640px rendition; fall back to whatever comes first.
pub fn best_image(images: &[ImageObject]) -> Option<String> {
    images
        .iter()
        .find(|img| img.height == Some(640))
        .or_else(|| images.first())
        .map(|img| img.url.clone())
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Followers {
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistObject {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageObject>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    #[serde(default)]
    pub followers: Followers,
    pub popularity: Option<i64>,
    pub uri: Option<String>,
}

/// The stripped-down artist embedded in album and track payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct SimplifiedArtist {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// The stripped-down album embedded in track payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct SimplifiedAlbum {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageObject>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumObject {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtist>,
    #[serde(default)]
    pub images: Vec<ImageObject>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    pub release_date: Option<String>,
    pub popularity: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackObject {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtist>,
    pub album: Option<SimplifiedAlbum>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    pub duration_ms: Option<i64>,
    pub popularity: Option<i64>,
    pub explicit: Option<bool>,
    pub track_number: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayHistoryObject {
    pub track: Option<TrackObject>,
    pub played_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageObject>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    pub country: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NowPlaying {
    pub item: Option<TrackObject>,
    pub is_playing: Option<bool>,
    pub progress_ms: Option<i64>,
}

// Response envelopes. Batch lookups return null slots for unknown ids.

#[derive(Debug, Deserialize)]
pub struct PagedItems<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct ArtistsEnvelope {
    #[serde(default)]
    pub artists: Vec<Option<ArtistObject>>,
}

#[derive(Debug, Deserialize)]
pub struct AlbumsEnvelope {
    #[serde(default)]
    pub albums: Vec<Option<AlbumObject>>,
}

#[derive(Debug, Deserialize)]
pub struct TracksEnvelope {
    #[serde(default)]
    pub tracks: Vec<Option<TrackObject>>,
}
