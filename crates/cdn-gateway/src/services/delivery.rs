//! Conditional delivery: ETags, Cache-Control tiers and response building.

use axum::body::Body;
use axum::http::header::{self, HeaderName};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Cache-Control for renditions that are not (yet) cached.
pub const STREAMED_CACHE_CONTROL: &str = "public, max-age=3600";

const IMMUTABLE_YEAR: &str = "public, max-age=31536000, immutable";
const VIDEO_WEEK: &str = "public, max-age=604800";
const IMAGE_MONTH: &str = "public, max-age=2592000, immutable";

const STREAMING_CONTENT_TYPES: &[&str] = &[
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "application/dash+xml",
    "video/mp2t",
    "video/iso.segment",
];

const CROSS_ORIGIN_RESOURCE_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-resource-policy");

/// `"<cache_key>-<unix seconds>"`, quotes included.
pub fn etag(cache_key: &str, at: DateTime<Utc>) -> String {
    format!("\"{}-{}\"", cache_key, at.timestamp())
}

/// Whether an `If-None-Match` value matches `etag`.
///
/// Honors `*`, comma-separated lists and weak `W/` validators.
pub fn if_none_match_matches(if_none_match: &str, etag: &str) -> bool {
    let etag = etag.strip_prefix("W/").unwrap_or(etag);
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

/// Check request headers for a matching validator.
pub fn is_not_modified(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| if_none_match_matches(v, etag))
}

/// Cache-Control by content-type family.
pub fn cache_control_for(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if STREAMING_CONTENT_TYPES.contains(&mime.as_str()) {
        IMMUTABLE_YEAR
    } else if mime.starts_with("video/") {
        VIDEO_WEEK
    } else if mime.starts_with("image/") {
        IMAGE_MONTH
    } else {
        STREAMED_CACHE_CONTROL
    }
}

/// Strip characters that could break out of a quoted header parameter.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

fn content_disposition(filename: &str) -> ApiResult<HeaderValue> {
    let value = format!("inline; filename=\"{}\"", sanitize_filename(filename));
    HeaderValue::from_str(&value).map_err(|_| ApiError::bad_request("filename is not a valid header value"))
}

fn header_value(value: &str, what: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| ApiError::internal(format!("invalid {} header value", what)))
}

/// Validators and caching headers shared by every CDN response.
struct CommonHeaders<'a> {
    etag: &'a str,
    cache_control: &'a str,
}

impl CommonHeaders<'_> {
    fn apply(&self, headers: &mut HeaderMap) -> ApiResult<()> {
        headers.insert(header::ETAG, header_value(self.etag, "etag")?);
        headers.insert(header::CACHE_CONTROL, header_value(self.cache_control, "cache-control")?);
        headers.insert(CROSS_ORIGIN_RESOURCE_POLICY, HeaderValue::from_static("cross-origin"));
        Ok(())
    }
}

fn build(status: StatusCode, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

/// 304 with validators only.
pub fn not_modified(etag: &str, cache_control: &str) -> ApiResult<Response> {
    let mut response = build(StatusCode::NOT_MODIFIED, Body::empty());
    CommonHeaders { etag, cache_control }.apply(response.headers_mut())?;
    metrics::record_response("not_modified");
    Ok(response)
}

/// 307 to a presigned object URL.
pub fn redirect(location: &str, etag: &str, cache_control: &str, filename: &str) -> ApiResult<Response> {
    let mut response = build(StatusCode::TEMPORARY_REDIRECT, Body::empty());
    let headers = response.headers_mut();
    CommonHeaders { etag, cache_control }.apply(headers)?;
    headers.insert(header::LOCATION, header_value(location, "location")?);
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(filename)?);
    metrics::record_response("redirect");
    Ok(response)
}

/// 200 carrying rendition bytes.
pub fn stream(
    data: Bytes,
    content_type: &str,
    etag: &str,
    cache_control: &str,
    filename: &str,
) -> ApiResult<Response> {
    let length = data.len();
    let mut response = build(StatusCode::OK, Body::from(data));
    let headers = response.headers_mut();
    CommonHeaders { etag, cache_control }.apply(headers)?;
    headers.insert(header::CONTENT_TYPE, header_value(content_type, "content-type")?);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(filename)?);
    metrics::record_response("stream");
    Ok(response)
}
