// Orchestrator configuration
//
// All knobs come from environment variables, with sane defaults. The config
// is constructed once in main and passed down; no module-level state.

use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the scheduler, runner, reaper, and recovery.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// One agent step may run this long before the reaper fails it.
    pub agent_timeout: Duration,
    /// A workflow with no agent-execution progress for this long is stuck.
    pub workflow_timeout: Duration,
    /// How long a paused workflow waits before the runner gives up.
    pub pause_wait_timeout: Duration,
    /// Cadence for interrupt polling and pause-wait sleeps.
    pub poll_interval: Duration,
    /// Tree lock TTL; re-acquisition between leaves renews it.
    pub lock_ttl: Duration,
    /// Cadence of the stuck-work reaper.
    pub reaper_interval: Duration,
    /// Recovery treats active-executing workflows older than this as interrupted.
    pub recovery_freshness: Duration,
    /// Grace period after marking a rewound subtree cancelled, before deletion.
    pub rewind_grace: Duration,
    /// Directory holding one executable per agent type.
    pub agents_dir: PathBuf,
    /// Base directory for per-workflow working directories.
    pub workspaces_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(60 * 60),
            workflow_timeout: Duration::from_secs(2 * 60 * 60),
            pause_wait_timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(5),
            lock_ttl: Duration::from_secs(300),
            reaper_interval: Duration::from_secs(15 * 60),
            recovery_freshness: Duration::from_secs(30 * 60),
            rewind_grace: Duration::from_secs(2),
            agents_dir: PathBuf::from("./agents"),
            workspaces_dir: PathBuf::from("./workspaces"),
        }
    }
}

impl OrchestratorConfig {
    /// Create configuration from environment variables, defaulting anything
    /// unset. Values are seconds.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            agent_timeout: env_secs("AGENT_TIMEOUT_SECS", defaults.agent_timeout),
            workflow_timeout: env_secs("WORKFLOW_TIMEOUT_SECS", defaults.workflow_timeout),
            pause_wait_timeout: env_secs("PAUSE_WAIT_TIMEOUT_SECS", defaults.pause_wait_timeout),
            poll_interval: env_secs("INTERRUPT_POLL_SECS", defaults.poll_interval),
            lock_ttl: env_secs("TREE_LOCK_TTL_SECS", defaults.lock_ttl),
            reaper_interval: env_secs("REAPER_INTERVAL_SECS", defaults.reaper_interval),
            recovery_freshness: env_secs("RECOVERY_FRESHNESS_SECS", defaults.recovery_freshness),
            rewind_grace: env_secs("REWIND_GRACE_SECS", defaults.rewind_grace),
            agents_dir: std::env::var("AGENTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.agents_dir),
            workspaces_dir: std::env::var("WORKSPACES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspaces_dir),
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.agent_timeout, Duration::from_secs(3600));
        assert_eq!(config.workflow_timeout, Duration::from_secs(7200));
        assert_eq!(config.pause_wait_timeout, Duration::from_secs(1800));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.lock_ttl, Duration::from_secs(300));
        assert_eq!(config.reaper_interval, Duration::from_secs(900));
        assert_eq!(config.recovery_freshness, Duration::from_secs(1800));
        assert_eq!(config.rewind_grace, Duration::from_secs(2));
    }
}
