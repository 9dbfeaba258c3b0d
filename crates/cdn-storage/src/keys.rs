//! Object key layout.

/// Prefix under which all materialized renditions live.
pub const TRANSFORMS_PREFIX: &str = "transforms";

/// Storage key of a cached rendition: `transforms/{file_id}/{cache_key}`.
pub fn rendition_key(file_id: &str, cache_key: &str) -> String {
    format!("{}/{}/{}", TRANSFORMS_PREFIX, file_id, cache_key)
}

/// Prefix holding every rendition of a file.
pub fn rendition_prefix(file_id: &str) -> String {
    format!("{}/{}/", TRANSFORMS_PREFIX, file_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendition_key() {
        assert_eq!(
            rendition_key("file-1", "0123456789abcdef"),
            "transforms/file-1/0123456789abcdef"
        );
        assert!(rendition_key("file-1", "k").starts_with(&rendition_prefix("file-1")));
    }
}
