use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::sync::{Mutex, oneshot};

use crate::ports::spotify::{PlaylistClient, SpotifyAuth};
use crate::services::session::AuthError;
use crate::services::token_store::TokenStore;

pub type LoginOutcome = Result<Box<dyn PlaylistClient>, AuthError>;

/// Everything the callback listener needs for one login attempt.
pub struct CallbackState {
    expected_state: String,
    auth: Arc<dyn SpotifyAuth>,
    store: TokenStore,
    handoff: Mutex<Option<oneshot::Sender<LoginOutcome>>>,
}

impl CallbackState {
    pub fn new(
        expected_state: String,
        auth: Arc<dyn SpotifyAuth>,
        store: TokenStore,
        handoff: oneshot::Sender<LoginOutcome>,
    ) -> Self {
        Self {
            expected_state,
            auth,
            store,
            handoff: Mutex::new(Some(handoff)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub fn router(state: Arc<CallbackState>) -> Router {
    Router::new()
        .route("/callback", get(complete_auth))
        .fallback(log_request)
        .with_state(state)
}

async fn log_request(uri: Uri) -> StatusCode {
    tracing::info!("Got request for: {}", uri);
    StatusCode::OK
}

async fn complete_auth(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(handoff) = state.handoff.lock().await.take() else {
        tracing::warn!("Ignoring callback, login already completed");
        return (StatusCode::CONFLICT, "Login already completed").into_response();
    };

    let outcome = authenticate(&state, params).await;

    let response = match &outcome {
        Ok(_) => (StatusCode::OK, "Login Completed!").into_response(),
        Err(error @ AuthError::StateMismatch { .. }) => {
            tracing::error!("{}", error);
            (StatusCode::NOT_FOUND, "State mismatch").into_response()
        }
        Err(error) => {
            tracing::error!("{}", error);
            (StatusCode::FORBIDDEN, "Couldn't get token").into_response()
        }
    };

    if handoff.send(outcome).is_err() {
        tracing::warn!("Login is no longer waiting for the callback");
    }

    response
}

/// The state is checked before anything else so a forged callback never
/// reaches the token endpoint or the store.
async fn authenticate(state: &CallbackState, params: CallbackParams) -> LoginOutcome {
    let received = params.state.unwrap_or_default();
    if received != state.expected_state {
        return Err(AuthError::StateMismatch {
            expected: state.expected_state.clone(),
            received,
        });
    }

    if let Some(error) = params.error {
        return Err(AuthError::Denied(error));
    }
    let code = params.code.ok_or(AuthError::MissingCode)?;

    let token = state.auth.exchange_code(&code).await?;
    state
        .store
        .save_token(&token)
        .await
        .map_err(AuthError::PersistToken)?;

    Ok(state.auth.connect(&token))
}
