//! Orchestrator configuration.
//!
//! Defaults suit interactive use; every value can be overridden from the
//! environment (`INFOMAP_*`) and, in the CLI, from flags.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable naming the worker binary.
pub const WORKER_PATH_ENV: &str = "INFOMAP_WORKER_PATH";
/// Environment variable naming the engine shared library.
pub const ENGINE_PATH_ENV: &str = "INFOMAP_ENGINE_PATH";
/// Environment variable overriding the termination grace delay, in milliseconds.
pub const TERMINATION_GRACE_ENV: &str = "INFOMAP_TERMINATION_GRACE_MS";
/// Environment variable enabling the job watchdog, in seconds.
pub const JOB_TIMEOUT_ENV: &str = "INFOMAP_JOB_TIMEOUT_SECS";

/// Delay between a job's terminal message and its worker being terminated.
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How long a worker may keep draining messages after its terminal one.
    pub termination_grace: Duration,
    /// Report a job as failed if it has not finished within this time.
    /// `None` lets a job run for as long as its worker does.
    pub job_timeout: Option<Duration>,
    /// Explicit path to the `infomap-worker` binary.
    pub worker_path: Option<PathBuf>,
    /// Path to the engine shared library.
    pub engine_path: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            termination_grace: DEFAULT_TERMINATION_GRACE,
            job_timeout: None,
            worker_path: None,
            engine_path: None,
        }
    }
}

impl OrchestratorConfig {
    /// Defaults overridden by any `INFOMAP_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup(WORKER_PATH_ENV).filter(|p| !p.is_empty()) {
            config.worker_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(ENGINE_PATH_ENV).filter(|p| !p.is_empty()) {
            config.engine_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = lookup(TERMINATION_GRACE_ENV) {
            config.termination_grace = Duration::from_millis(parse_number(TERMINATION_GRACE_ENV, &ms)?);
        }
        if let Some(secs) = lookup(JOB_TIMEOUT_ENV) {
            config.job_timeout = match parse_number(JOB_TIMEOUT_ENV, &secs)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
        }

        Ok(config)
    }

    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_worker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_path = Some(path.into());
        self
    }

    pub fn with_engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_path = Some(path.into());
        self
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.termination_grace, Duration::from_secs(1));
        assert!(config.job_timeout.is_none());
        assert!(config.worker_path.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            (WORKER_PATH_ENV, "/opt/infomap/infomap-worker"),
            (TERMINATION_GRACE_ENV, "250"),
            (JOB_TIMEOUT_ENV, "60"),
        ]))
        .unwrap();
        assert_eq!(config.worker_path, Some(PathBuf::from("/opt/infomap/infomap-worker")));
        assert_eq!(config.termination_grace, Duration::from_millis(250));
        assert_eq!(config.job_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_timeout_disables_watchdog() {
        let config = OrchestratorConfig::from_lookup(lookup(&[(JOB_TIMEOUT_ENV, "0")])).unwrap();
        assert!(config.job_timeout.is_none());
    }

    #[test]
    fn test_malformed_number_is_config_error() {
        let err = OrchestratorConfig::from_lookup(lookup(&[(TERMINATION_GRACE_ENV, "soon")])).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains(TERMINATION_GRACE_ENV)));
    }
}
