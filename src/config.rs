use std::{env, time::Duration};

use crate::repository::DEFAULT_ASSISTANT_PROMPT;

/// Application settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// DynamoDB table holding every course row (default: "playlab-courses")
    pub table_name: String,
    /// S3 bucket for section files (default: "playlab-courses-content")
    pub bucket_name: String,
    /// Read cache TTL in seconds (default: 3600)
    pub cache_ttl_seconds: u64,
    /// Maximum number of read cache entries (default: 10,000)
    pub cache_max_entries: usize,
    /// System prompt of the built-in assistant
    pub default_assistant_prompt: String,
    /// Log level name (default: "info")
    pub log_level: String,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// Environment variables:
    /// - `COURSE_TABLE_NAME` - DynamoDB table name
    /// - `COURSE_BUCKET_NAME` - S3 bucket name
    /// - `CACHE_TTL_SECONDS` - Read cache TTL in seconds
    /// - `CACHE_MAX_ENTRIES` - Maximum read cache entries
    /// - `DEFAULT_ASSISTANT_PROMPT` - Built-in assistant prompt
    /// - `LOG_LEVEL` - trace, debug, info, warn or error
    ///
    /// AWS credentials and region come from the SDK's own environment chain.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        Self {
            table_name: string("COURSE_TABLE_NAME", "playlab-courses"),
            bucket_name: string("COURSE_BUCKET_NAME", "playlab-courses-content"),
            cache_ttl_seconds: lookup("CACHE_TTL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            cache_max_entries: lookup("CACHE_MAX_ENTRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            default_assistant_prompt: string("DEFAULT_ASSISTANT_PROMPT", DEFAULT_ASSISTANT_PROMPT),
            log_level: string("LOG_LEVEL", "info"),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
