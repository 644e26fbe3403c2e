//! Configuration types for the OneBot bindings.
//!
//! The runtime maps its `connect` and `files` sections onto this schema.
//!
//! # Example Configuration
//!
//! ```yaml
//! message_format: string   # V11 only: render event messages as CQ strings
//! fragment_ttl_secs: 600   # V12 only: abandoned fragmented uploads expire
//! max_upload_size: 67108864  # V12 only: largest declared fragmented upload
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How V11 events carry their `message` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentFormat {
    /// Segment array.
    #[default]
    Array,
    /// CQ code string.
    String,
}

/// OneBot binding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OneBotConfig {
    pub message_format: SegmentFormat,

    /// Lifetime of an unfinished fragmented upload, in seconds.
    pub fragment_ttl_secs: u64,

    /// Largest `total_size` a fragmented upload may declare, in bytes.
    pub max_upload_size: u64,
}

impl Default for OneBotConfig {
    fn default() -> Self {
        Self {
            message_format: SegmentFormat::Array,
            fragment_ttl_secs: 600,
            max_upload_size: 64 * 1024 * 1024,
        }
    }
}

impl OneBotConfig {
    pub fn fragment_ttl(&self) -> Duration {
        Duration::from_secs(self.fragment_ttl_secs)
    }
}
