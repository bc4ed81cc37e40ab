use crate::{
    clock::Clock,
    error::{GrantError, Result},
    repository::GrantStore,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(1);

/// What the reaper does when a sweep fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaperFailurePolicy {
    /// Stop the loop and hand the error to the caller.
    Halt,
    /// Log the failure and try again at the next tick.
    #[default]
    LogAndContinue,
}

impl FromStr for ReaperFailurePolicy {
    type Err = GrantError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "halt" => Ok(Self::Halt),
            "continue" | "log_and_continue" => Ok(Self::LogAndContinue),
            other => Err(GrantError::invalid(format!(
                "unknown reaper failure policy '{}', expected 'halt' or 'continue'",
                other
            ))),
        }
    }
}

/// Periodically deletes grants whose expiry has passed.
///
/// Checks already ignore expired rows, so the reaper only bounds table growth;
/// a missed sweep never makes an expired grant authorize anything.
pub struct ExpiryReaper {
    store: Arc<dyn GrantStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    policy: ReaperFailurePolicy,
}

impl ExpiryReaper {
    pub fn new(store: Arc<dyn GrantStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            interval: DEFAULT_REAPER_INTERVAL,
            policy: ReaperFailurePolicy::default(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_policy(mut self, policy: ReaperFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// One sweep: delete everything with `expires_at <= now`.
    pub async fn sweep(&self) -> Result<u64> {
        let now = self.clock.now();
        let removed = self.store.delete_expired(now).await?;
        if removed > 0 {
            info!("Removed {} expired grants", removed);
        } else {
            debug!("No expired grants at {}", now);
        }
        Ok(removed)
    }

    /// Sweep every interval until `shutdown` turns true or its sender is dropped.
    ///
    /// Under [`ReaperFailurePolicy::Halt`] the first failed sweep ends the loop
    /// with that error.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.interval.is_zero() {
            return Err(GrantError::invalid("reaper interval must be greater than zero"));
        }
        info!(
            "Expiry reaper started (interval {:?}, policy {:?})",
            self.interval, self.policy
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        match self.policy {
                            ReaperFailurePolicy::Halt => {
                                error!("Expiry sweep failed, halting reaper: {}", err);
                                return Err(err);
                            }
                            ReaperFailurePolicy::LogAndContinue => {
                                error!("Expiry sweep failed, retrying in {:?}: {}", self.interval, err);
                            }
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Expiry reaper stopped");
        Ok(())
    }
}
