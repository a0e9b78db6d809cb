//! Size limits enforced at the record boundary.

/// Maximum length, in bytes, of a stored key.
///
/// Keys are UTF-8 text; this bounds the key portion of the Data Log record
/// header and WAL entries so a single malformed length prefix can't cause an
/// unbounded read.
pub const MAX_KEY_LEN: usize = 4096;

/// Maximum nesting depth accepted when encoding/decoding `Value::Array` and
/// `Value::Object`. Guards against stack overflow on deeply nested or
/// (if one were ever constructed) cyclic structures — see the "cyclic
/// references" design note.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Validate a key per the Index's key contract: non-empty, bounded-length
/// UTF-8. `&str` already guarantees UTF-8, so only emptiness and length are
/// checked here.
pub fn validate_key(key: &str) -> crate::Result<()> {
    if key.is_empty() {
        return Err(crate::Error::Configuration("key must not be empty".into()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(crate::Error::Configuration(format!(
            "key length {} exceeds maximum of {}",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    Ok(())
}
