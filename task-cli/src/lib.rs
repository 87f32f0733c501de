pub mod config;
pub mod repository;
pub mod service;
pub mod task;

pub use repository::{InMemoryTaskRepository, JsonTaskRepository, RepositoryError, TaskRepository};
pub use service::{ServiceError, TaskService};
pub use task::{Status, Task};
