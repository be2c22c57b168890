// Drive a real agent executable through the process adapter: JSON input on
// stdin, {success, artifacts, summary} JSON back on stdout.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use taskforge_core::{Agent, AgentInput, ArtifactType};
use taskforge_worker::ProcessAgent;

fn write_agent(path: &Path, script: &str) {
    std::fs::write(path, script).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

fn input_for(dir: &Path) -> AgentInput {
    AgentInput {
        workflow_id: 1,
        working_dir: dir.to_path_buf(),
        task_description: "demo task".to_string(),
        prior_artifacts: vec![],
        pending_instructions: vec![],
    }
}

#[tokio::test]
async fn round_trips_success_output() {
    let tmp = tempfile::tempdir().unwrap();
    let program = tmp.path().join("plan");
    write_agent(
        &program,
        "#!/bin/sh\n\
         cat > /dev/null\n\
         printf '{\"success\": true, \"artifacts\": [{\"artifact_type\": \"plan\", \"content\": \"1. do the thing\"}], \"summary\": \"planned\"}'\n",
    );

    let agent = ProcessAgent::new(program);
    let output = agent.execute(input_for(tmp.path())).await.unwrap();

    assert!(output.success);
    assert_eq!(output.artifacts.len(), 1);
    assert_eq!(output.artifacts[0].artifact_type, ArtifactType::Plan);
    assert_eq!(output.summary.as_deref(), Some("planned"));
}

#[tokio::test]
async fn reported_failure_is_not_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let program = tmp.path().join("test");
    write_agent(
        &program,
        "#!/bin/sh\n\
         cat > /dev/null\n\
         printf '{\"success\": false, \"summary\": \"3 tests failed\"}'\n",
    );

    let agent = ProcessAgent::new(program);
    let output = agent.execute(input_for(tmp.path())).await.unwrap();

    // success=false is a valid agent verdict; the runner turns it into a
    // workflow failure, the adapter does not.
    assert!(!output.success);
    assert!(output.artifacts.is_empty());
}

#[tokio::test]
async fn nonzero_exit_surfaces_stderr() {
    let tmp = tempfile::tempdir().unwrap();
    let program = tmp.path().join("code");
    write_agent(
        &program,
        "#!/bin/sh\n\
         cat > /dev/null\n\
         echo 'compiler exploded' >&2\n\
         exit 3\n",
    );

    let agent = ProcessAgent::new(program);
    let err = agent.execute(input_for(tmp.path())).await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("compiler exploded"), "got: {}", message);
}

#[tokio::test]
async fn garbage_stdout_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let program = tmp.path().join("review");
    write_agent(
        &program,
        "#!/bin/sh\n\
         cat > /dev/null\n\
         echo 'not json at all'\n",
    );

    let agent = ProcessAgent::new(program);
    let err = agent.execute(input_for(tmp.path())).await.unwrap_err();
    assert!(err.to_string().contains("invalid output"));
}

#[tokio::test]
async fn agent_receives_input_record_on_stdin() {
    let tmp = tempfile::tempdir().unwrap();
    let program = tmp.path().join("document");
    // Echo the task description back as the summary.
    write_agent(
        &program,
        "#!/bin/sh\n\
         task=$(cat | sed -n 's/.*\"task_description\":\"\\([^\"]*\\)\".*/\\1/p')\n\
         printf '{\"success\": true, \"summary\": \"%s\"}' \"$task\"\n",
    );

    let agent = ProcessAgent::new(program);
    let output = agent.execute(input_for(tmp.path())).await.unwrap();
    assert_eq!(output.summary.as_deref(), Some("demo task"));
}
