//! crates/tax_analysis_core/src/hashing.rs
//!
//! Content hashing for uploaded files.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;
use uuid::Uuid;

use crate::domain::FileHash;

const CHUNK_SIZE: usize = 8 * 1024;

/// Computes the SHA-256 of everything `reader` yields, hex-encoded.
///
/// Never fails: if the content cannot be read, a `FileHash::Fallback` built from
/// the current time and a random component is returned instead.
pub async fn generate_file_hash<R>(mut reader: R) -> FileHash
where
    R: AsyncRead + Unpin,
{
    match sha256_hex(&mut reader).await {
        Ok(digest) => FileHash::Sha256(digest),
        Err(e) => {
            warn!("Failed to hash file content, using a placeholder: {}", e);
            FileHash::Fallback(fallback_id())
        }
    }
}

async fn sha256_hex<R>(reader: &mut R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn fallback_id() -> String {
    format!(
        "fallback-{}-{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}
