//! Identity resolution strategies.
//!
//! Both strategies end in a [`UserId`]; the session does not care which one
//! produced it.

pub mod credential;
pub mod delegated;

use crate::error::ResolveError;
use crate::models::UserId;
use crate::state::AppState;

/// A client's request to bind its connection to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionRequest {
    /// One-time credential handed to the browser by the upstream application.
    Credential { token: String },
    /// Cookie header captured during the realtime handshake.
    Cookies { header: Option<String> },
}

pub async fn resolve(state: &AppState, request: ResolutionRequest) -> Result<UserId, ResolveError> {
    match request {
        ResolutionRequest::Credential { token } => {
            credential::resolve(&state.store, &state.config.credential_prefix, &token).await
        }
        ResolutionRequest::Cookies { header } => {
            delegated::resolve(
                &state.http,
                state.config.delegated_lookup_url.as_deref(),
                header.as_deref(),
            )
            .await
        }
    }
}
