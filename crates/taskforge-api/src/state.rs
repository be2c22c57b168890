// App state shared across routes

use std::sync::Arc;

use taskforge_storage::{Database, EventPublisher};
use taskforge_worker::{CheckpointRewind, Interrupts, TreeExecutor};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub executor: Arc<TreeExecutor>,
    pub interrupts: Interrupts,
    pub rewind: Arc<CheckpointRewind>,
    pub events: EventPublisher,
}
