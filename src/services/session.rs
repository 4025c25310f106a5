use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::http_server::callback::{self, CallbackState, LoginOutcome};
use crate::ports::spotify::{PlaylistClient, SpotifyAuth};
use crate::services::token_store::TokenStore;
use crate::spotify_rs::auth::{TokenRequestError, generate_state};
use crate::spotify_rs::types::{SessionToken, SpotifyUser};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("State mismatch: {received} != {expected}")]
    StateMismatch { expected: String, received: String },
    #[error("Authorization denied: {0}")]
    Denied(String),
    #[error("Callback did not carry an authorization code")]
    MissingCode,
    #[error("Couldn't get token: {0}")]
    TokenRequest(#[from] TokenRequestError),
    #[error("Failed to persist session token: {0:#}")]
    PersistToken(color_eyre::Report),
    #[error("Failed to bind callback listener: {0}")]
    Listener(#[from] std::io::Error),
    #[error("No login completed within {0:?}")]
    LoginTimedOut(Duration),
    #[error("Callback listener stopped before a login completed")]
    HandoffClosed,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Address the one-shot callback listener binds during interactive login
    pub listen_addr: SocketAddr,
    /// Give up waiting for the browser login after this long. `None` waits forever.
    pub login_timeout: Option<Duration>,
}

/// An authenticated client together with the user it acts as.
pub struct Session {
    pub client: Box<dyn PlaylistClient>,
    pub user: SpotifyUser,
}

/// Obtains a live Spotify session, either from the token store or through
/// an interactive browser login.
///
/// Restore path: stored token → explicit refresh if expired → liveness check.
/// Login path: callback listener → authorize URL → wait for the handoff →
/// listener shut down → liveness check.
pub struct SessionManager {
    auth: Arc<dyn SpotifyAuth>,
    store: TokenStore,
    config: SessionConfig,
    csrf_state: String,
}

impl SessionManager {
    pub fn new(auth: Arc<dyn SpotifyAuth>, store: TokenStore, config: SessionConfig) -> Self {
        Self {
            auth,
            store,
            config,
            csrf_state: generate_state(),
        }
    }

    /// The anti-forgery value the callback must echo back.
    pub fn csrf_state(&self) -> &str {
        &self.csrf_state
    }

    pub async fn ensure_session(&self) -> Result<Session> {
        if self.store.token_exists().await? {
            if let Some(session) = self.restore().await? {
                return Ok(session);
            }
        } else {
            tracing::info!("No stored Spotify session, starting interactive login");
        }

        self.login().await
    }

    /// `None` when the stored token cannot be used and a fresh login is needed.
    async fn restore(&self) -> Result<Option<Session>> {
        let Some(mut token) = self.store.load_token().await? else {
            return Ok(None);
        };

        if token.is_expired(chrono::Utc::now()) {
            if !token.has_refresh_token() {
                tracing::warn!("Stored token expired and has no refresh token");
                return Ok(None);
            }
            tracing::info!("Stored token expired at {}, refreshing", token.expires_at);
            token = self.refresh(&token).await?;
        }

        let client = self.auth.connect(&token);
        let user = client
            .current_user()
            .await
            .wrap_err("Restored session failed liveness check")?;
        tracing::info!("Logged in as {}", user.id);

        Ok(Some(Session { client, user }))
    }

    /// Trade the refresh token for a new access token and persist it.
    pub async fn refresh(&self, token: &SessionToken) -> Result<SessionToken> {
        let refreshed = self
            .auth
            .refresh(token)
            .await
            .map_err(AuthError::from)
            .wrap_err("Failed to refresh Spotify token")?;

        self.store.save_token(&refreshed).await?;
        Ok(refreshed)
    }

    pub async fn login(&self) -> Result<Session> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .map_err(AuthError::from)?;
        self.login_on(listener).await
    }

    /// Interactive login answering callbacks on an already bound listener.
    /// The listener is shut down before this returns, whatever the outcome.
    pub async fn login_on(&self, listener: TcpListener) -> Result<Session> {
        let (handoff_tx, handoff_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = CallbackState::new(
            self.csrf_state.clone(),
            self.auth.clone(),
            self.store.clone(),
            handoff_tx,
        );
        let app = callback::router(Arc::new(state));

        if let Ok(addr) = listener.local_addr() {
            tracing::debug!("Callback listener bound to {}", addr);
        }
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        // Printed regardless of the log filter, login blocks on it
        let authorize_url = self.auth.authorize_url(&self.csrf_state);
        println!("Please log in to Spotify: {}", authorize_url);
        tracing::info!(%authorize_url, "Waiting for Spotify login callback");

        let outcome = self.await_handoff(handoff_rx).await;

        let _ = shutdown_tx.send(());
        match server.await {
            Ok(Ok(())) => tracing::debug!("Callback listener stopped"),
            Ok(Err(error)) => tracing::warn!("Callback listener failed: {}", error),
            Err(error) => tracing::warn!("Callback listener task panicked: {}", error),
        }

        let client = outcome?;
        let user = client
            .current_user()
            .await
            .wrap_err("Failed to fetch Spotify user after login")?;
        tracing::info!("Logged in as {}", user.id);

        Ok(Session { client, user })
    }

    async fn await_handoff(
        &self,
        handoff: oneshot::Receiver<LoginOutcome>,
    ) -> Result<Box<dyn PlaylistClient>, AuthError> {
        let received = match self.config.login_timeout {
            Some(limit) => tokio::time::timeout(limit, handoff)
                .await
                .map_err(|_| AuthError::LoginTimedOut(limit))?,
            None => handoff.await,
        };

        received.map_err(|_| AuthError::HandoffClosed)?
    }
}
