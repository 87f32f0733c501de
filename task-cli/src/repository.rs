use crate::task::Task;
use std::path::PathBuf;

pub mod json;
pub mod memory;

pub use json::JsonTaskRepository;
pub use memory::InMemoryTaskRepository;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("cannot read tasks from {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ReadErrorSource,
    },
    #[error("cannot write tasks to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no task ids left after {}", u32::MAX)]
    IdSpaceExhausted,
}

#[derive(Debug, thiserror::Error)]
pub enum ReadErrorSource {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed tasks document")]
    Json(#[from] serde_json::Error),
}

/// Storage for tasks, independent of the medium behind it.
///
/// Absence is never an error here: `get_by_id` yields `None` and `delete`
/// of an unknown id does nothing. Ids come from [`TaskRepository::get_next_id`],
/// which scans the stored tasks and is therefore only safe with a single writer.
#[cfg_attr(test, mockall::automock)]
pub trait TaskRepository {
    /// All tasks in storage order.
    fn get_all(&self) -> Result<Vec<Task>, RepositoryError>;

    fn get_by_id(&self, id: u32) -> Result<Option<Task>, RepositoryError>;

    /// Inserts the task, or replaces the stored task with the same id.
    fn save(&self, task: &Task) -> Result<(), RepositoryError>;

    fn delete(&self, id: u32) -> Result<(), RepositoryError>;

    /// `1` for an empty store, otherwise one past the highest stored id.
    fn get_next_id(&self) -> Result<u32, RepositoryError>;
}

/// Inserts or replaces `task` in `tasks`, keeping the position of a replaced entry.
pub(crate) fn upsert(tasks: &mut Vec<Task>, task: &Task) {
    match tasks.iter_mut().find(|stored| stored.id() == task.id()) {
        Some(stored) => *stored = task.clone(),
        None => tasks.push(task.clone()),
    }
}

pub(crate) fn next_id(tasks: &[Task]) -> Result<u32, RepositoryError> {
    match tasks.iter().map(Task::id).max() {
        None => Ok(1),
        Some(max) => max.checked_add(1).ok_or(RepositoryError::IdSpaceExhausted),
    }
}
