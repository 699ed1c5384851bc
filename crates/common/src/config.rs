use serde::{Deserialize, Serialize};

use crate::{Result, RfqError};

/// Per-query knobs fixed at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Max items one node ships per page.
    pub page_size: usize,
    /// Global result cap; zero or negative disables the limit.
    pub limit: i64,
    /// Upper bound on waiting for every node's first page, in milliseconds.
    pub first_page_timeout_ms: u64,
    /// Buffered pages per node stream before producers see backpressure.
    pub page_channel_capacity: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_size: 1024,
            limit: 0,
            first_page_timeout_ms: 30_000,
            page_channel_capacity: 4,
        }
    }
}

impl QueryConfig {
    /// Normalized result cap: `None` when the wire-level value disables it.
    pub fn effective_limit(&self) -> Option<usize> {
        (self.limit > 0).then_some(self.limit as usize)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(RfqError::InvalidConfig(
                "page_size must be positive".to_string(),
            ));
        }
        if self.page_channel_capacity == 0 {
            return Err(RfqError::InvalidConfig(
                "page_channel_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_unlimited() {
        let cfg = QueryConfig::default();
        cfg.validate().expect("default config valid");
        assert_eq!(cfg.effective_limit(), None);
    }

    #[test]
    fn nonpositive_limit_disables_cap() {
        let mut cfg = QueryConfig::default();
        cfg.limit = -5;
        assert_eq!(cfg.effective_limit(), None);
        cfg.limit = 10;
        assert_eq!(cfg.effective_limit(), Some(10));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let cfg = QueryConfig {
            page_size: 0,
            ..QueryConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(RfqError::InvalidConfig(_))));
    }

    #[test]
    fn config_parses_from_json() {
        let cfg: QueryConfig = serde_json::from_str(
            r#"{"page_size":256,"limit":50,"first_page_timeout_ms":5000,"page_channel_capacity":2}"#,
        )
        .expect("parse config");
        assert_eq!(cfg.page_size, 256);
        assert_eq!(cfg.effective_limit(), Some(50));
    }
}
