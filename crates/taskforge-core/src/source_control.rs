// Source control seam
//
// Clone/commit/checkout are external collaborators; the orchestrator only
// needs a working directory per leaf workflow and the current head commit
// for checkpoint bookkeeping.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;

/// The interface the orchestrator consumes from the source-control layer.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Return the working directory for a workflow, creating/cloning it on
    /// first use. The directory belongs exclusively to that workflow id.
    async fn prepare(&self, workflow_id: i64, target_module: &str) -> Result<PathBuf>;

    /// The current head commit of a working directory, if it is a repository.
    async fn head_commit(&self, working_dir: &Path) -> Result<Option<String>>;
}
