use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::models::{IdentityRecord, UserId};
use crate::services::credential_store::{delete_best_effort, CredentialStore};

/// Store key for a client-supplied token.
pub fn credential_key(prefix: &str, token: &str) -> String {
    format!("{}{}", prefix, token)
}

/// Exchange a one-time credential for the user it was issued to.
///
/// A successfully read key is deleted in the background whether or not its
/// record parses; a malformed record can never become valid.
pub async fn resolve(
    store: &Arc<dyn CredentialStore>,
    prefix: &str,
    token: &str,
) -> Result<UserId, ResolveError> {
    let key = credential_key(prefix, token);

    let raw = match store.lookup(&key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("one-time credential not found or expired");
            return Err(ResolveError::MissingUserId);
        }
        Err(e) => {
            warn!(error = %e, "credential store lookup failed");
            return Err(ResolveError::Store(e));
        }
    };

    delete_best_effort(store.clone(), key);

    let record =
        IdentityRecord::parse(&raw).map_err(|e| ResolveError::MalformedRecord(e.to_string()))?;
    record.into_user_id().ok_or(ResolveError::MissingUserId)
}
