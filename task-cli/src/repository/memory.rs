use super::{RepositoryError, TaskRepository};
use crate::task::Task;
use std::cell::RefCell;

/// Volatile repository that forgets everything when dropped.
#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: RefCell<Vec<Task>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RefCell::new(tasks),
        }
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn get_all(&self) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.tasks.borrow().clone())
    }

    fn get_by_id(&self, id: u32) -> Result<Option<Task>, RepositoryError> {
        Ok(self.tasks.borrow().iter().find(|task| task.id() == id).cloned())
    }

    fn save(&self, task: &Task) -> Result<(), RepositoryError> {
        super::upsert(&mut self.tasks.borrow_mut(), task);
        Ok(())
    }

    fn delete(&self, id: u32) -> Result<(), RepositoryError> {
        self.tasks.borrow_mut().retain(|task| task.id() != id);
        Ok(())
    }

    fn get_next_id(&self) -> Result<u32, RepositoryError> {
        super::next_id(&self.tasks.borrow())
    }
}
