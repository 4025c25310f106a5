use color_eyre::eyre::Result;

use crate::spotify_rs::auth::TokenRequestError;
use crate::spotify_rs::types::{SessionToken, SpotifyUser};

/// Decoupled representation of a Spotify playlist from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyApiPlaylist {
    pub id: String,
    pub name: String,
    pub snapshot_id: String,
    pub total_tracks: i32,
}

/// Port trait wrapping the authenticated Spotify API calls used by the sync.
///
/// Implementations live in `spotify_rs::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PlaylistClient: Send + Sync {
    async fn current_user(&self) -> Result<SpotifyUser>;
    async fn get_playlist(&self, playlist_id: &str) -> Result<SpotifyApiPlaylist>;
    /// Append a single track, returning the playlist's new snapshot id.
    async fn add_track(&self, playlist_id: &str, track_id: &str) -> Result<String>;
}

/// Port trait wrapping the OAuth endpoints of the Spotify accounts service.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SpotifyAuth: Send + Sync {
    /// URL the operator opens to grant access. `state` is echoed back on the callback.
    fn authorize_url(&self, state: &str) -> String;
    async fn exchange_code(&self, code: &str) -> Result<SessionToken, TokenRequestError>;
    async fn refresh(&self, token: &SessionToken) -> Result<SessionToken, TokenRequestError>;
    /// Build an API client that authenticates with `token` as-is.
    fn connect(&self, token: &SessionToken) -> Box<dyn PlaylistClient>;
}
