//! CDN delivery handler.
//!
//! `GET /cdn/{token}/{transforms}/{filename}` and the original shorthand
//! `GET /cdn/{token}/{filename}`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use chrono::Utc;
use tracing::{debug, info, warn};

use cdn_models::{FileRecord, Share, TransformDescriptor};
use cdn_processor::ProcessOptions;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::delivery::{self, STREAMED_CACHE_CONTROL};
use crate::services::telemetry::tasks;
use crate::state::AppState;

/// Header carrying the share password.
pub const SHARE_PASSWORD_HEADER: &str = "x-share-password";

const CDN_PREFIX: &str = "/cdn/";

/// Decoded path segments of a CDN request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnPath {
    pub token: String,
    pub transforms: String,
    pub filename: String,
}

impl CdnPath {
    /// Split a request path. Segments are percent-decoded individually so an
    /// encoded `/` inside a filename never shifts the layout.
    pub fn parse(path: &str) -> ApiResult<Self> {
        let rest = path
            .strip_prefix(CDN_PREFIX)
            .ok_or_else(|| ApiError::bad_request("invalid CDN path"))?;

        let segments = rest
            .split('/')
            .map(|s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .map_err(|_| ApiError::bad_request("path segment is not valid UTF-8"))
            })
            .collect::<ApiResult<Vec<_>>>()?;

        match <[String; 3]>::try_from(segments) {
            Ok([token, transforms, filename]) => Ok(Self {
                token,
                transforms,
                filename,
            }),
            Err(segments) => match <[String; 2]>::try_from(segments) {
                Ok([token, filename]) => Ok(Self {
                    token,
                    transforms: "_".to_string(),
                    filename,
                }),
                Err(_) => Err(ApiError::bad_request(
                    "expected /cdn/{token}/{transforms}/{filename}",
                )),
            },
        }
    }
}

/// Serve one CDN request.
pub async fn serve(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = CdnPath::parse(uri.path())?;
    let password = headers.get(SHARE_PASSWORD_HEADER).map(|v| v.as_bytes());

    let share = state.authorizer.authorize(&path.token, password).await?;

    let descriptor = TransformDescriptor::parse_validated(&path.transforms)?;
    state
        .authorizer
        .check_transform(&share, &path.transforms, &descriptor)?;

    let file = state
        .files
        .get_file(&share.file_id)
        .await?
        .ok_or_else(|| {
            warn!(share_id = %share.id, file_id = %share.file_id, "Share points at a missing file");
            ApiError::NotFound
        })?;

    if descriptor.requires_processing() {
        serve_transformed(&state, &share, &file, &descriptor, &path.filename, &headers).await
    } else {
        serve_original(&state, &share, &file, &path.filename, &headers).await
    }
}

async fn serve_original(
    state: &AppState,
    share: &Share,
    file: &FileRecord,
    filename: &str,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let etag = delivery::etag(&TransformDescriptor::original().cache_key(), file.updated_at);
    let cache_control = delivery::cache_control_for(&file.content_type);

    if delivery::is_not_modified(headers, &etag) {
        return delivery::not_modified(&etag, cache_control);
    }

    let url = state
        .storage
        .presign_get(&file.storage_key, state.config.presign_ttl)
        .await?;

    count_download(state, share);
    debug!(file_id = %file.id, "Redirecting to original");
    delivery::redirect(&url, &etag, cache_control, filename)
}

async fn serve_transformed(
    state: &AppState,
    share: &Share,
    file: &FileRecord,
    descriptor: &TransformDescriptor,
    filename: &str,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let cache_key = descriptor.cache_key();

    if let Some(record) = state.cache.lookup(&file.id, &cache_key).await? {
        let records = state.cache.records();
        let (file_id, key) = (file.id.clone(), cache_key.clone());
        state.telemetry.dispatch(tasks::CACHE_HIT, async move {
            records.record_hit(&file_id, &key).await
        });

        let etag = delivery::etag(&cache_key, record.created_at);
        let cache_control = delivery::cache_control_for(&record.content_type);
        if delivery::is_not_modified(headers, &etag) {
            return delivery::not_modified(&etag, cache_control);
        }

        let url = state
            .storage
            .presign_get(&record.storage_key, state.config.presign_ttl)
            .await?;

        count_download(state, share);
        debug!(file_id = %file.id, cache_key = %cache_key, "Redirecting to cached rendition");
        return delivery::redirect(&url, &etag, cache_control, filename);
    }

    let etag = delivery::etag(&cache_key, Utc::now());
    if delivery::is_not_modified(headers, &etag) {
        return delivery::not_modified(&etag, STREAMED_CACHE_CONTROL);
    }

    let processor_name = descriptor.processor_name(&file.content_type);
    let processor = state.processors.get(processor_name).ok_or_else(|| {
        ApiError::internal(format!("processor '{}' is not registered", processor_name))
    })?;

    let source = state.storage.download(&file.storage_key).await?;
    let options = ProcessOptions::new(descriptor.clone(), file.content_type.clone(), filename);

    let start = Instant::now();
    let output = processor.process(&options, source).await?;
    metrics::record_processing_duration(processor_name, start.elapsed().as_secs_f64());

    if state.cache.should_promote(&file.id, &cache_key).await {
        state
            .cache
            .store(&file.id, &cache_key, descriptor, &output)
            .await?;
    }

    count_download(state, share);
    info!(
        file_id = %file.id,
        cache_key = %cache_key,
        processor = processor_name,
        size_bytes = output.size(),
        "Streamed processed rendition"
    );
    delivery::stream(
        output.data,
        &output.content_type,
        &etag,
        STREAMED_CACHE_CONTROL,
        filename,
    )
}

fn count_download(state: &AppState, share: &Share) {
    let shares = Arc::clone(&state.shares);
    let token = share.token.clone();
    state.telemetry.dispatch(tasks::DOWNLOAD_COUNT, async move {
        shares.increment_download_count(&token).await
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_path() {
        let path = CdnPath::parse("/cdn/tok123456/w_800,h_600/photo.jpg").unwrap();
        assert_eq!(path.token, "tok123456");
        assert_eq!(path.transforms, "w_800,h_600");
        assert_eq!(path.filename, "photo.jpg");
    }

    #[test]
    fn test_parse_original_shorthand() {
        let path = CdnPath::parse("/cdn/tok123456/report.pdf").unwrap();
        assert_eq!(path.transforms, "_");
        assert_eq!(path.filename, "report.pdf");
    }

    #[test]
    fn test_parse_decodes_segments() {
        let path = CdnPath::parse("/cdn/tok123456/wm_Hello%20World/my%2Ffile.png").unwrap();
        assert_eq!(path.transforms, "wm_Hello World");
        assert_eq!(path.filename, "my/file.png");
    }

    #[test]
    fn test_parse_keeps_empty_token() {
        let path = CdnPath::parse("/cdn//_/photo.jpg").unwrap();
        assert!(path.token.is_empty());
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(CdnPath::parse("/cdn/only").is_err());
        assert!(CdnPath::parse("/cdn/a/b/c/d").is_err());
        assert!(CdnPath::parse("/other/a/b").is_err());
    }
}
