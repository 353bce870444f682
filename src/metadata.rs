//! Run metadata for reproducibility.

use crate::types::PricePoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

/// Metadata about an input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFileMetadata {
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// SHA256 checksum of the file contents.
    pub checksum: String,
}

/// Identity of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Command or pipeline that produced the run.
    pub command: String,
    /// SHA256 of the JSON-serialized configuration.
    pub config_hash: String,
    /// SHA256 over the price series actually used.
    pub data_checksum: Option<String>,
    pub data_files: Vec<DataFileMetadata>,
    pub version: String,
}

impl RunMetadata {
    pub fn new<T: Serialize>(command: impl Into<String>, config: &T) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            command: command.into(),
            config_hash: compute_config_hash(config),
            data_checksum: None,
            data_files: Vec::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_prices(mut self, prices: &[PricePoint]) -> Self {
        self.data_checksum = Some(compute_prices_checksum(prices));
        self
    }

    /// Record an input file; unreadable files are logged and skipped.
    pub fn with_data_file(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match track_data_file(path) {
            Ok(meta) => self.data_files.push(meta),
            Err(e) => warn!("Could not checksum {}: {}", path.display(), e),
        }
        self
    }

    /// Short form of the run id for display.
    pub fn short_id(&self) -> String {
        self.run_id.simple().to_string()[..8].to_string()
    }
}

/// Compute SHA256 checksum of a file.
pub fn compute_file_checksum(path: impl AsRef<Path>) -> std::io::Result<String> {
    let data = std::fs::read(path.as_ref())?;
    Ok(compute_hash(&data))
}

/// Compute SHA256 hash of arbitrary bytes.
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute configuration hash from JSON serialization.
pub fn compute_config_hash<T: Serialize>(config: &T) -> String {
    match serde_json::to_vec(config) {
        Ok(bytes) => compute_hash(&bytes),
        Err(e) => {
            warn!("Failed to serialize config for hashing: {}", e);
            String::new()
        }
    }
}

/// Hash timestamps and OHLCV values in order.
pub fn compute_prices_checksum(prices: &[PricePoint]) -> String {
    let mut hasher = Sha256::new();
    for p in prices {
        hasher.update(p.timestamp.timestamp().to_le_bytes());
        for v in [p.open, p.high, p.low, p.close, p.volume] {
            hasher.update(v.to_le_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Track data file metadata.
pub fn track_data_file(path: impl AsRef<Path>) -> std::io::Result<DataFileMetadata> {
    let path = path.as_ref();
    let size = std::fs::metadata(path)?.len();
    let checksum = compute_file_checksum(path)?;

    Ok(DataFileMetadata {
        path: path.display().to_string(),
        size,
        checksum,
    })
}
