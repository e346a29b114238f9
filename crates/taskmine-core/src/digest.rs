//! One-way digests for captured field values.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `value`.
pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Digest `value` off the caller's task.
///
/// Runs on the blocking pool so large values never stall the capture
/// context; if the pool is unavailable the digest is computed inline.
pub async fn sha256_hex_async(value: String) -> String {
    match tokio::task::spawn_blocking({
        let value = value.clone();
        move || sha256_hex(&value)
    })
    .await
    {
        Ok(digest) => digest,
        Err(err) => {
            tracing::debug!(error = %err, "digest task failed; hashing inline");
            sha256_hex(&value)
        }
    }
}
