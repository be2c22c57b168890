// Postgres storage layer with sqlx

pub mod event_publisher;
pub mod models;
pub mod repositories;
pub mod tree_lock;

pub use event_publisher::EventPublisher;
pub use models::*;
pub use repositories::{select_next_executable, Database};
pub use tree_lock::TreeLock;
