// Process-backed agent adapter and the local workspace provider
//
// Agents are external executables: one per agent type, named after it, under
// a configured directory. The input record goes to stdin as JSON; the agent
// prints `{success, artifacts, summary}` JSON on stdout. The child is killed
// on drop so the runner's step timeout also bounds the process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use taskforge_core::{
    Agent, AgentInput, AgentOutput, AgentRegistry, AgentType, OrchestratorError, Result,
    SourceControl,
};

pub struct ProcessAgent {
    program: PathBuf,
}

impl ProcessAgent {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

#[async_trait]
impl Agent for ProcessAgent {
    async fn execute(&self, input: AgentInput) -> Result<AgentOutput> {
        debug!(program = %self.program.display(), workflow_id = input.workflow_id, "spawning agent process");

        let mut child = Command::new(&self.program)
            .current_dir(&input.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OrchestratorError::agent(format!(
                    "failed to spawn {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let payload = serde_json::to_vec(&input)
            .map_err(|e| OrchestratorError::agent(format!("input serialization failed: {}", e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| OrchestratorError::agent(format!("writing agent stdin: {}", e)))?;
            // Closing stdin signals end of input.
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OrchestratorError::agent(format!("waiting for agent: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OrchestratorError::agent(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            OrchestratorError::agent(format!(
                "{} produced invalid output: {}",
                self.program.display(),
                e
            ))
        })
    }
}

/// Bind every agent type with an executable present in `agents_dir`.
pub fn registry_from_dir(agents_dir: &Path) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for name in [
        "plan",
        "code",
        "security_lint",
        "test",
        "review",
        "document",
        "scaffold",
        "module_import",
    ] {
        let program = agents_dir.join(name);
        if program.is_file() {
            // The list above only holds valid agent type names.
            if let Ok(agent_type) = AgentType::from_str(name) {
                info!(agent_type = name, program = %program.display(), "registered agent");
                registry.register(agent_type, Arc::new(ProcessAgent::new(program)));
            }
        }
    }
    registry
}

/// Working directories under a base path, one per workflow id. The head
/// commit comes from asking git, not from implementing it.
pub struct LocalWorkspaces {
    base: PathBuf,
}

impl LocalWorkspaces {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }
}

#[async_trait]
impl SourceControl for LocalWorkspaces {
    async fn prepare(&self, workflow_id: i64, _target_module: &str) -> Result<PathBuf> {
        let dir = self.base.join(format!("workflow-{}", workflow_id));
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            OrchestratorError::agent(format!(
                "failed to create working directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(dir)
    }

    async fn head_commit(&self, working_dir: &Path) -> Result<Option<String>> {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(working_dir)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let commit = String::from_utf8_lossy(&output.stdout).trim().to_string();
                Ok((!commit.is_empty()).then_some(commit))
            }
            // Not a repository (or git missing) just means no checkpoint.
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prepare_creates_per_workflow_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let workspaces = LocalWorkspaces::new(tmp.path().to_path_buf());
        let dir = workspaces.prepare(42, "billing").await.unwrap();
        assert!(dir.ends_with("workflow-42"));
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn head_commit_none_outside_repository() {
        let tmp = tempfile::tempdir().unwrap();
        let workspaces = LocalWorkspaces::new(tmp.path().to_path_buf());
        let dir = workspaces.prepare(7, "billing").await.unwrap();
        let commit = workspaces.head_commit(&dir).await.unwrap();
        assert_eq!(commit, None);
    }

    #[test]
    fn registry_empty_for_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry_from_dir(tmp.path());
        assert!(registry.registered_types().is_empty());
    }

    #[tokio::test]
    async fn registry_binds_present_executables() {
        let tmp = tempfile::tempdir().unwrap();
        tokio::fs::write(tmp.path().join("plan"), "#!/bin/sh\n")
            .await
            .unwrap();
        let registry = registry_from_dir(tmp.path());
        assert!(registry.get(AgentType::Plan).is_some());
        assert!(registry.get(AgentType::Code).is_none());
    }
}
