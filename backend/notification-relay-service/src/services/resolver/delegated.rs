use reqwest::header::COOKIE;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::error::ResolveError;
use crate::models::{IdentityRecord, UserId};

/// Ask the upstream application who owns the browser's session cookies.
///
/// Checks run in order and the first failure wins, so the client sees a
/// single error per request.
pub async fn resolve(
    client: &reqwest::Client,
    url: Option<&str>,
    cookies: Option<&str>,
) -> Result<UserId, ResolveError> {
    let Some(url) = url else {
        info!("subscribe by cookies requested but no lookup URL is configured");
        return Err(ResolveError::DelegatedLookupUnavailable);
    };

    debug!(url = %url, has_cookies = cookies.is_some(), "sending delegated identity lookup");

    let mut request = client.get(url);
    if let Some(cookies) = cookies {
        request = request.header(COOKIE, cookies);
    }

    let response = request.send().await.map_err(|e| {
        warn!(url = %url, error = %e, "delegated identity lookup failed");
        ResolveError::DelegatedTransport(e.to_string())
    })?;

    let status = response.status();
    if status != StatusCode::OK {
        warn!(url = %url, status = status.as_u16(), "delegated identity lookup returned non-200");
        return Err(ResolveError::DelegatedStatus(status.as_u16()));
    }

    let body = response
        .text()
        .await
        .map_err(|e| ResolveError::DelegatedTransport(e.to_string()))?;
    debug!(bytes = body.len(), "delegated identity lookup body received");

    let record = IdentityRecord::parse(&body)
        .map_err(|e| ResolveError::DelegatedMalformedBody(e.to_string()))?;
    record.into_user_id().ok_or(ResolveError::MissingUserId)
}
