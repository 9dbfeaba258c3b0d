//! Share token authorization.
//!
//! Stages run in a fixed order and each one short-circuits:
//! token present, token resolves (and is not expired), password, download
//! ceiling. The transform allow-list is checked separately once the
//! transform string has been parsed.

use std::sync::Arc;

use tracing::{debug, warn};

use cdn_firestore::ShareStore;
use cdn_models::{is_valid_share_token, Share, TransformDescriptor};

use crate::error::{ApiError, ApiResult};
use crate::services::telemetry::{tasks, TelemetryDispatcher};

#[derive(Clone)]
pub struct ShareAuthorizer {
    shares: Arc<dyn ShareStore>,
    telemetry: TelemetryDispatcher,
}

impl ShareAuthorizer {
    pub fn new(shares: Arc<dyn ShareStore>, telemetry: TelemetryDispatcher) -> Self {
        Self { shares, telemetry }
    }

    /// Resolve `token` to a share the caller may download from.
    ///
    /// `password` is the raw credential; bytes that are not the stored
    /// password (including non-UTF-8 input) are a mismatch, never "missing".
    pub async fn authorize(&self, token: &str, password: Option<&[u8]>) -> ApiResult<Share> {
        if token.is_empty() {
            return Err(ApiError::bad_request("share token is required"));
        }

        let share = self.resolve(token).await?;

        let shares = Arc::clone(&self.shares);
        let owned_token = token.to_string();
        self.telemetry.dispatch(tasks::ACCESS_COUNT, async move {
            shares.increment_access_count(&owned_token).await
        });

        if let Some(hash) = share.password_hash.clone() {
            let password = password.ok_or(ApiError::PasswordRequired)?;
            if !verify_password(password, hash).await? {
                debug!(share_id = %share.id, "Share password mismatch");
                return Err(ApiError::InvalidPassword);
            }
        }

        if share.download_limit_reached() {
            return Err(ApiError::DownloadLimitReached);
        }

        Ok(share)
    }

    async fn resolve(&self, token: &str) -> ApiResult<Share> {
        if !is_valid_share_token(token) {
            return Err(ApiError::NotFound);
        }

        match self.shares.get_share_by_token(token).await? {
            Some(share) if !share.is_expired() => Ok(share),
            Some(share) => {
                debug!(share_id = %share.id, "Share expired");
                Err(ApiError::NotFound)
            }
            None => Err(ApiError::NotFound),
        }
    }

    /// Allow-list gate for a parsed transform.
    pub fn check_transform(
        &self,
        share: &Share,
        raw: &str,
        descriptor: &TransformDescriptor,
    ) -> ApiResult<()> {
        if share.allows_transform(raw, descriptor) {
            Ok(())
        } else {
            debug!(share_id = %share.id, transform = %raw, "Transform not in allow-list");
            Err(ApiError::TransformNotAllowed)
        }
    }
}

/// bcrypt is CPU-bound, so verification runs off the async workers.
async fn verify_password(password: &[u8], hash: String) -> ApiResult<bool> {
    let password = password.to_vec();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ApiError::internal(format!("password verification task failed: {}", e)))?
        .map_err(|e| {
            warn!(error = %e, "Stored share password hash is unusable");
            ApiError::internal(format!("password verification failed: {}", e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cdn_firestore::MemoryStore;
    use chrono::{Duration as ChronoDuration, Utc};

    fn authorizer(store: &Arc<MemoryStore>) -> ShareAuthorizer {
        ShareAuthorizer::new(
            Arc::clone(store) as Arc<dyn ShareStore>,
            TelemetryDispatcher::new(16, Duration::from_secs(1)),
        )
    }

    async fn insert(store: &MemoryStore, share: Share) -> String {
        let token = share.token.clone();
        store.insert_share(share).await;
        token
    }

    #[tokio::test]
    async fn test_empty_token_is_bad_request() {
        let store = Arc::new(MemoryStore::new());
        let err = authorizer(&store).authorize("", None).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unknown_malformed_and_expired_are_not_found() {
        let store = Arc::new(MemoryStore::new());
        let auth = authorizer(&store);
        let expired = insert(
            &store,
            Share::new("file-1").with_expiry(Utc::now() - ChronoDuration::minutes(1)),
        )
        .await;

        for token in ["doesNotExist123", "bad token!", expired.as_str()] {
            let err = auth.authorize(token, None).await.unwrap_err();
            assert!(matches!(err, ApiError::NotFound), "token {token}");
        }
    }

    #[tokio::test]
    async fn test_expired_wins_over_wrong_password() {
        let store = Arc::new(MemoryStore::new());
        let hash = bcrypt::hash("secret", 4).unwrap();
        let token = insert(
            &store,
            Share::new("file-1")
                .with_password_hash(hash)
                .with_expiry(Utc::now() - ChronoDuration::hours(1)),
        )
        .await;

        let err = authorizer(&store)
            .authorize(&token, Some("wrong".as_bytes()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn test_password_gate() {
        let store = Arc::new(MemoryStore::new());
        let hash = bcrypt::hash("secret", 4).unwrap();
        let token = insert(&store, Share::new("file-1").with_password_hash(hash)).await;
        let auth = authorizer(&store);

        assert!(matches!(
            auth.authorize(&token, None).await.unwrap_err(),
            ApiError::PasswordRequired
        ));
        assert!(matches!(
            auth.authorize(&token, Some("nope".as_bytes())).await.unwrap_err(),
            ApiError::InvalidPassword
        ));
        assert_eq!(auth.authorize(&token, Some("secret".as_bytes())).await.unwrap().file_id, "file-1");

        // Bytes outside UTF-8 are a wrong password, not a missing one
        assert!(matches!(
            auth.authorize(&token, Some(&[0xff, 0xfe][..])).await.unwrap_err(),
            ApiError::InvalidPassword
        ));
    }

    #[tokio::test]
    async fn test_unparseable_hash_is_internal() {
        let store = Arc::new(MemoryStore::new());
        let token = insert(&store, Share::new("file-1").with_password_hash("not-bcrypt")).await;

        let err = authorizer(&store)
            .authorize(&token, Some("secret".as_bytes()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[tokio::test]
    async fn test_download_limit() {
        let store = Arc::new(MemoryStore::new());
        let mut share = Share::new("file-1").with_max_downloads(1);
        share.download_count = 1;
        let token = insert(&store, share).await;

        let err = authorizer(&store).authorize(&token, None).await.unwrap_err();
        assert!(matches!(err, ApiError::DownloadLimitReached));
    }

    #[tokio::test]
    async fn test_successful_resolve_counts_access() {
        let store = Arc::new(MemoryStore::new());
        let token = insert(&store, Share::new("file-1")).await;
        let telemetry = TelemetryDispatcher::new(16, Duration::from_secs(1));
        let auth = ShareAuthorizer::new(Arc::clone(&store) as Arc<dyn ShareStore>, telemetry.clone());

        auth.authorize(&token, None).await.unwrap();
        telemetry.drain(Duration::from_secs(1)).await;

        assert_eq!(store.share(&token).await.unwrap().access_count, 1);
    }

    #[test]
    fn test_allow_list_gate() {
        let store = Arc::new(MemoryStore::new());
        let auth = authorizer(&store);
        let share = Share::new("file-1").with_allowed_transforms(["w_800"]);

        let wide = TransformDescriptor::parse("w_1200").unwrap();
        assert!(matches!(
            auth.check_transform(&share, "w_1200", &wide),
            Err(ApiError::TransformNotAllowed)
        ));

        let allowed = TransformDescriptor::parse("w_800").unwrap();
        assert!(auth.check_transform(&share, "w_800", &allowed).is_ok());
        assert!(auth
            .check_transform(&share, "_", &TransformDescriptor::original())
            .is_ok());
    }
}
