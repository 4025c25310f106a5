use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use serde_json::json;

use crate::ports::spotify::{PlaylistClient, SpotifyApiPlaylist};
use crate::spotify_rs::types::{SnapshotResponse, SpotifyPlaylist, SpotifyUser};

const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";

/// Spotify API client authenticating with a fixed access token
pub struct SpotifyClient {
    access_token: String,
    client: reqwest::Client,
}

impl SpotifyClient {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            client: reqwest::Client::new(),
        }
    }

    /// Get the current user's profile
    pub async fn get_current_user(&self) -> Result<SpotifyUser> {
        let response = self
            .client
            .get(format!("{}/me", SPOTIFY_API_URL))
            .bearer_auth(&self.access_token)
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?;

        let user: SpotifyUser = response.json().await?;
        Ok(user)
    }

    /// Get a playlist's metadata (tracks are not paged in)
    pub async fn get_playlist(&self, playlist_id: &str) -> Result<SpotifyPlaylist> {
        let response = self
            .client
            .get(format!("{}/playlists/{}", SPOTIFY_API_URL, playlist_id))
            .query(&[("fields", "id,name,description,snapshot_id,tracks.total")])
            .bearer_auth(&self.access_token)
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?;

        let playlist: SpotifyPlaylist = response.json().await?;
        Ok(playlist)
    }

    /// Append tracks to the end of a playlist
    pub async fn add_tracks_to_playlist(
        &self,
        playlist_id: &str,
        track_ids: &[&str],
    ) -> Result<String> {
        let uris: Vec<String> = track_ids
            .iter()
            .map(|id| format!("spotify:track:{}", id))
            .collect();

        let response = self
            .client
            .post(format!("{}/playlists/{}/tracks", SPOTIFY_API_URL, playlist_id))
            .bearer_auth(&self.access_token)
            .json(&json!({ "uris": uris }))
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?;

        let snapshot: SnapshotResponse = response.json().await?;
        Ok(snapshot.snapshot_id)
    }
}

#[async_trait::async_trait]
impl PlaylistClient for SpotifyClient {
    async fn current_user(&self) -> Result<SpotifyUser> {
        self.get_current_user()
            .await
            .wrap_err("Failed to fetch current spotify user")
    }

    async fn get_playlist(&self, playlist_id: &str) -> Result<SpotifyApiPlaylist> {
        let playlist = SpotifyClient::get_playlist(self, playlist_id)
            .await
            .wrap_err_with(|| format!("Failed to fetch spotify playlist {}", playlist_id))?;

        Ok(SpotifyApiPlaylist {
            id: playlist.id,
            name: playlist.name,
            snapshot_id: playlist.snapshot_id,
            total_tracks: playlist.tracks.total,
        })
    }

    async fn add_track(&self, playlist_id: &str, track_id: &str) -> Result<String> {
        self.add_tracks_to_playlist(playlist_id, &[track_id])
            .await
            .wrap_err_with(|| format!("Failed to add track {} to playlist {}", track_id, playlist_id))
    }
}
