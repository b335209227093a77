/// Compute the BLAKE3 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn blake3_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Hash a sequence of named blobs into one digest.
///
/// Names and contents are length-prefixed so `("ab", "c")` and `("a", "bc")`
/// hash differently.
#[must_use]
pub fn blake3_entries<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut hasher = blake3::Hasher::new();
    for (name, bytes) in entries {
        hasher.update(&(name.len() as u64).to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hasher.finalize().to_hex().to_string()
}

/// Truncate a hex digest to `len` characters.
#[must_use]
pub fn short(digest: &str, len: usize) -> &str {
    &digest[..len.min(digest.len())]
}

/// Strong HTTP entity tag for a body.
#[must_use]
pub fn etag(data: &[u8]) -> String {
    format!("\"{}\"", short(&blake3_bytes(data), 16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_bytes() {
        let hash = blake3_bytes(b"hello world");
        assert_eq!(
            hash,
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn test_blake3_entries_is_boundary_sensitive() {
        let a = blake3_entries([("ab", b"c".as_slice())]);
        let b = blake3_entries([("a", b"bc".as_slice())]);
        assert_ne!(a, b);
        assert_eq!(a, blake3_entries([("ab", b"c".as_slice())]));
    }

    #[test]
    fn test_short() {
        assert_eq!(short("abcdef", 4), "abcd");
        assert_eq!(short("ab", 4), "ab");
    }

    #[test]
    fn test_etag_is_quoted() {
        let tag = etag(b"hello world");
        assert_eq!(tag, "\"d74981efa70a0c88\"");
    }
}
