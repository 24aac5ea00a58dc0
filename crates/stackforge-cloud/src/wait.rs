//! Bounded polling for eventually-consistent resources
//!
//! Cloud resources converge asynchronously: a cache cluster takes minutes to
//! become `available`, a distribution must reach `Deployed` before it can be
//! deleted. Providers poll through [`WaitBudget::wait_for`], which gives up
//! with [`CloudError::Timeout`] once `max_attempts` probes have failed.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Poll budget: fixed interval, bounded attempt count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitBudget {
    /// Maximum number of probes before giving up
    pub max_attempts: u32,

    /// Seconds to sleep between probes
    pub interval_secs: u64,
}

impl Default for WaitBudget {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval_secs: 30,
        }
    }
}

impl WaitBudget {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval_secs: interval.as_secs(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Probe until it yields a value or the budget runs out
    ///
    /// `probe` returns `Ok(None)` while the resource is still converging. Errors
    /// from the probe abort the wait immediately.
    pub async fn wait_for<T, F, Fut>(&self, what: &str, mut probe: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        for attempt in 0..self.max_attempts {
            if let Some(value) = probe().await? {
                return Ok(value);
            }

            tracing::debug!(
                "{} not ready (attempt {}/{})",
                what,
                attempt + 1,
                self.max_attempts
            );

            if attempt + 1 < self.max_attempts {
                sleep(self.interval()).await;
            }
        }

        Err(CloudError::Timeout {
            what: what.to_string(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_once_ready() {
        let budget = WaitBudget::new(5, Duration::from_secs(30));
        let probes = AtomicU32::new(0);
        let probes = &probes;

        let value = budget
            .wait_for("cluster", || async move {
                let n = probes.fetch_add(1, Ordering::SeqCst) + 1;
                Ok((n == 3).then_some("available"))
            })
            .await
            .unwrap();

        assert_eq!(value, "available");
        assert_eq!(probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let budget = WaitBudget::new(4, Duration::from_secs(10));
        let probes = AtomicU32::new(0);
        let probes = &probes;

        let err = budget
            .wait_for::<(), _, _>("distribution", || async move {
                probes.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Timeout { attempts: 4, .. }));
        assert_eq!(probes.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_aborts_wait() {
        let budget = WaitBudget::default();

        let err = budget
            .wait_for::<(), _, _>("function", || async {
                Err(CloudError::provider("compute-functions", "AccessDenied"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Provider { .. }));
    }
}
