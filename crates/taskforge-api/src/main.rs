// Taskforge API server
//
// Startup order matters: migrate, then recovery (clear locks, reset
// interrupted trees), then the reaper, then the HTTP listener. A fatal
// startup error (DB unreachable) exits 1.

mod common;
mod dto;
mod events;
mod logs;
mod messages;
mod state;
mod workflows;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use taskforge_core::{OrchestratorConfig, SourceControl};
use taskforge_storage::{Database, EventPublisher, TreeLock};
use taskforge_worker::{
    registry_from_dir, AgentRunner, CheckpointRewind, Interrupts, LocalWorkspaces, QueueEngine,
    Reaper, Recovery, Scheduler, TreeExecutor,
};

use state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        workflows::create_workflow,
        workflows::list_workflows,
        workflows::get_workflow,
        workflows::cancel_workflow,
        workflows::pause_workflow,
        workflows::unpause_workflow,
        workflows::force_fail_workflow,
        workflows::resume_workflow,
        workflows::retry_workflow,
        workflows::skip_workflow,
        workflows::create_child_workflow,
        workflows::get_queue,
        workflows::list_checkpoints,
        workflows::last_checkpoint,
        workflows::resume_from_checkpoint,
        workflows::resume_state,
        messages::list_messages,
        messages::create_message,
        logs::list_logs,
    ),
    components(
        schemas(
            dto::WorkflowDto,
            dto::WorkflowSummaryDto,
            dto::WorkflowDetailDto,
            dto::AgentExecutionDto,
            dto::ArtifactDto,
            dto::MessageDto,
            dto::ExecutionLogDto,
            dto::QueueEntryDto,
            dto::CheckpointDto,
            dto::ResumeStateDto,
            workflows::CreateWorkflowRequest,
            workflows::CreateChildWorkflowRequest,
            workflows::PauseRequest,
            workflows::ResumeFromCheckpointRequest,
            workflows::RewindResultDto,
            workflows::QueueDto,
            messages::CreateMessageRequest,
        )
    ),
    tags(
        (name = "workflows", description = "Workflow tree control endpoints"),
        (name = "messages", description = "Conversation thread endpoints"),
        (name = "checkpoints", description = "Checkpoint query and rewind endpoints"),
        (name = "logs", description = "Execution log endpoints")
    ),
    info(
        title = "Taskforge API",
        version = "0.2.0",
        description = "Orchestrator for long-running AI-assisted development workflows",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskforge=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("taskforge-api starting...");

    let config = OrchestratorConfig::from_env();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?;
    let db = Database::from_url(&database_url)
        .await
        .context("Failed to connect to database")?;
    db.migrate()
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Connected to database");

    let lock = TreeLock::new(db.pool().clone());
    let events = EventPublisher::new(db.clone());
    let interrupts = Interrupts::new(db.clone(), events.clone(), config.poll_interval);

    let registry = registry_from_dir(&config.agents_dir);
    let registered = registry.registered_types();
    if registered.is_empty() {
        tracing::warn!(
            agents_dir = %config.agents_dir.display(),
            "no agent executables found; leaf workflows will fail until agents are installed"
        );
    } else {
        tracing::info!(agents = registered.len(), "agent registry populated");
    }

    let source_control: Arc<dyn SourceControl> =
        Arc::new(LocalWorkspaces::new(config.workspaces_dir.clone()));

    let runner = AgentRunner::new(
        db.clone(),
        registry,
        interrupts.clone(),
        source_control,
        events.clone(),
        config.clone(),
    );
    let queue = QueueEngine::new(db.clone(), lock.clone(), events.clone(), config.clone());
    let scheduler = Arc::new(Scheduler::new(
        db.clone(),
        queue.clone(),
        runner,
        lock.clone(),
        events.clone(),
        config.clone(),
    ));
    let executor = Arc::new(TreeExecutor::new(db.clone(), scheduler, events.clone()));

    // Recovery runs before any work is accepted.
    let recovery = Recovery::new(db.clone(), lock.clone(), events.clone(), config.clone());
    let report = recovery.run().await.context("Startup recovery failed")?;
    for parent_id in &report.advance_parent_ids {
        let root_id = db
            .root_of(*parent_id)
            .await
            .context("Failed to resolve recovered tree root")?;
        executor
            .start_tree(root_id)
            .await
            .context("Failed to resume recovered tree")?;
    }

    let reaper = Arc::new(Reaper::new(
        db.clone(),
        queue,
        events.clone(),
        config.clone(),
    ));
    let _reaper_handle = reaper.spawn();

    let rewind = Arc::new(CheckpointRewind::new(
        db.clone(),
        events.clone(),
        config.clone(),
    ));

    let app_state = AppState {
        db,
        executor: executor.clone(),
        interrupts,
        rewind,
        events,
    };

    let app = Router::new()
        .route("/health", get(health))
        .merge(workflows::routes(app_state.clone()))
        .merge(messages::routes(app_state.clone()))
        .merge(logs::routes(app_state.clone()))
        .merge(events::routes(app_state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:9000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // In-flight trees are abandoned mid-step; the next startup's recovery
    // pass resets them.
    executor.shutdown().await;
    tracing::info!("taskforge-api stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
