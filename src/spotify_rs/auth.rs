use std::time::Duration;

use rand::Rng;

use crate::ports::spotify::{PlaylistClient, SpotifyAuth};
use crate::spotify_rs::client::SpotifyClient;
use crate::spotify_rs::types::{SessionToken, SpotifyTokenResponse};

const SPOTIFY_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

pub const SPOTIFY_SCOPES: [&str; 3] = [
    "user-read-private",
    "playlist-read-private",
    "playlist-modify-private",
];

/// Generate a random string from the URL-safe unreserved character set
fn generate_random_string(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            const CHARSET: &[u8] =
                b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
            CHARSET[rng.random_range(0..CHARSET.len())] as char
        })
        .collect()
}

/// Generate a random state parameter for CSRF protection
pub fn generate_state() -> String {
    generate_random_string(16)
}

#[derive(Debug, thiserror::Error)]
pub enum TokenRequestError {
    #[error("Invalid grant: {reason}")]
    InvalidGrant { reason: String },
    #[error("Failed to send http request: {0}")]
    FailedToSendRequest(reqwest::Error),
    #[error("Failed to parse response: {0}")]
    FailedToParseResponse(reqwest::Error),
    #[error("Token lifetime out of range: {0}s")]
    InvalidExpiry(u64),
}

/// Client credentials plus the redirect the callback listener answers on.
#[derive(Debug, Clone)]
pub struct SpotifyOAuth {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: reqwest::Client,
}

impl SpotifyOAuth {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            http: reqwest::Client::new(),
        }
    }

    /// POST to the token endpoint with client credentials in a basic auth header.
    /// https://developer.spotify.com/documentation/web-api/tutorials/code-flow
    async fn request_token(
        &self,
        params: &[(&str, &str)],
    ) -> Result<SpotifyTokenResponse, TokenRequestError> {
        let response = self
            .http
            .post(SPOTIFY_TOKEN_URL)
            // Serializes to x-www-form-urlencoded and sets the header, as required by spotify
            .form(params)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(TokenRequestError::FailedToSendRequest)?;

        if !response.status().is_success() {
            return Err(TokenRequestError::InvalidGrant {
                reason: response
                    .text()
                    .await
                    .unwrap_or("Failed to get error text".to_string()),
            });
        }

        response
            .json()
            .await
            .map_err(TokenRequestError::FailedToParseResponse)
    }
}

#[async_trait::async_trait]
impl SpotifyAuth for SpotifyOAuth {
    fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&state={}&scope={}",
            SPOTIFY_AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(&SPOTIFY_SCOPES.join(" "))
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<SessionToken, TokenRequestError> {
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                // Must match the redirect used to start the flow
                ("redirect_uri", &self.redirect_uri),
            ])
            .await?;

        SessionToken::from_response(response, chrono::Utc::now(), None)
    }

    async fn refresh(&self, token: &SessionToken) -> Result<SessionToken, TokenRequestError> {
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &token.refresh_token),
            ])
            .await?;

        SessionToken::from_response(response, chrono::Utc::now(), Some(&token.refresh_token))
    }

    fn connect(&self, token: &SessionToken) -> Box<dyn PlaylistClient> {
        Box::new(SpotifyClient::new(token.access_token.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_state() {
        let state = generate_state();
        assert_eq!(state.len(), 16);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()
            || c == '-'
            || c == '.'
            || c == '_'
            || c == '~'));
        assert_ne!(state, generate_state());
    }

    #[test]
    fn test_authorize_url() {
        let oauth = SpotifyOAuth::new(
            "test_client_id".into(),
            "secret".into(),
            "http://localhost:8080/callback".into(),
        );
        let url = oauth.authorize_url("abc123");

        assert!(url.starts_with(SPOTIFY_AUTH_URL));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback"));
        assert!(url.contains("state=abc123"));
        assert!(url.contains("scope=user-read-private%20playlist-read-private%20playlist-modify-private"));
        assert!(!url.contains("secret"));
    }
}
