//! The contract every backend adapter and composite operator implements.
//!
//! Construction of a datasource must stay cheap; only the three row-access
//! methods may block, and each of them is bounded by a caller-supplied
//! timeout. A failed or timed-out access leaves the datasource usable for a
//! later retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::dataset::{Results, Schema, no_results};
use crate::error::{Result, TributaryError};
use crate::query::QueryPart;

pub trait Datasource: Send + Sync {
    fn name(&self) -> &str;
    fn schema(&self) -> &Schema;
    /// Rows satisfying all parts. An empty query yields an empty result and a
    /// part naming an unknown column yields an empty result, not an error.
    fn find(&self, query: &[QueryPart], timeout: Duration) -> Result<Results>;
    /// All stored rows whose key is among `keys` (possibly more rows than keys).
    fn datasets_by_key(&self, keys: &[String], timeout: Duration) -> Result<Results>;
    /// An implementation-defined, possibly partial snapshot.
    fn contents(&self, timeout: Duration) -> Result<Results>;
}

pub type Source = Arc<dyn Datasource>;

// ------------- Deadline -------------
/// Remaining-time bookkeeping for composites that make several nested calls.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires: Option<Instant>,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            expires: Instant::now().checked_add(timeout),
        }
    }
    pub fn remaining(&self) -> Option<Duration> {
        match self.expires {
            None => Some(Duration::MAX),
            Some(expires) => {
                let left = expires.saturating_duration_since(Instant::now());
                if left.is_zero() { None } else { Some(left) }
            }
        }
    }
    pub fn expired(&self) -> bool {
        self.remaining().is_none()
    }
    /// The time left for the next nested call, or a timeout naming the caller.
    pub fn budget(&self, datasource: &str, operation: &'static str) -> Result<Duration> {
        self.remaining()
            .ok_or_else(|| TributaryError::timeout(datasource, operation))
    }
}

/// Treats a failed constituent call as an empty contribution, logging the cause.
pub fn degrade(composite: &str, constituent: &str, outcome: Result<Results>) -> Results {
    match outcome {
        Ok(results) => results,
        Err(e) => {
            warn!(datasource = composite, constituent, error = %e, "treating failed access as empty");
            no_results()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_is_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.expired());
        let err = deadline.budget("u", "find").unwrap_err();
        assert!(matches!(err, TributaryError::Timeout { .. }));
    }

    #[test]
    fn huge_timeout_never_expires() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(!deadline.expired());
        assert!(deadline.budget("u", "find").is_ok());
    }
}
