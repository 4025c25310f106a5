use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::spotify_rs::auth::TokenRequestError;

/// Spotify OAuth token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
}

/// OAuth credential bundle, as persisted in the token store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: String,
    /// Absolute expiry, truncated to whole seconds so it survives the text round trip
    pub expires_at: DateTime<Utc>,
}

impl SessionToken {
    /// Build a token from a token endpoint response received at `now`.
    ///
    /// Refresh responses may omit the refresh token, in which case
    /// `previous_refresh_token` is kept.
    pub fn from_response(
        response: SpotifyTokenResponse,
        now: DateTime<Utc>,
        previous_refresh_token: Option<&str>,
    ) -> Result<Self, TokenRequestError> {
        let expires_at = i64::try_from(response.expires_in)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or(TokenRequestError::InvalidExpiry(response.expires_in))?;

        let refresh_token = response
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_string))
            .unwrap_or_default();

        Ok(Self {
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token,
            expires_at: expires_at.trunc_subsecs(0),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

/// Spotify user profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpotifyUser {
    pub id: String,
    pub display_name: Option<String>,
}

/// Spotify playlist from API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpotifyPlaylist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub snapshot_id: String,
    pub tracks: SpotifyPlaylistTracks,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpotifyPlaylistTracks {
    pub total: i32,
}

/// Response of a playlist mutation
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResponse {
    pub snapshot_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn response(refresh_token: Option<&str>) -> SpotifyTokenResponse {
        SpotifyTokenResponse {
            access_token: "access".into(),
            token_type: "Bearer".into(),
            expires_in: 3600,
            refresh_token: refresh_token.map(str::to_string),
            scope: "playlist-modify-private".into(),
        }
    }

    #[test]
    fn test_from_response_computes_absolute_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + Duration::milliseconds(750);
        let token = SessionToken::from_response(response(Some("refresh")), now, None).unwrap();

        assert_eq!(
            token.expires_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
        );
        assert_eq!(token.refresh_token, "refresh");
    }

    #[test]
    fn test_from_response_keeps_previous_refresh_token() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let token = SessionToken::from_response(response(None), now, Some("old-refresh")).unwrap();

        assert_eq!(token.refresh_token, "old-refresh");
        assert!(token.has_refresh_token());
    }

    #[test]
    fn test_is_expired() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let token = SessionToken::from_response(response(None), now, None).unwrap();

        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + Duration::hours(2)));
        assert!(!token.has_refresh_token());
    }

    #[test]
    fn test_out_of_range_expiry_is_rejected() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut response = response(None);
        response.expires_in = u64::MAX;

        let result = SessionToken::from_response(response, now, None);

        assert!(matches!(
            result,
            Err(TokenRequestError::InvalidExpiry(u64::MAX))
        ));
    }
}
