use crate::repository::{RepositoryError, TaskRepository};
use crate::task::{ParseStatusError, Status, Task};
use mockable::{Clock, DefaultClock};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Task with id {0} not found")]
    NotFound(u32),
    #[error("Task description must not be empty")]
    EmptyDescription,
    #[error(transparent)]
    InvalidStatus(#[from] ParseStatusError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Business rules for the task list, on top of any [`TaskRepository`].
pub struct TaskService<R: TaskRepository, C: Clock = DefaultClock> {
    repository: R,
    clock: C,
}

impl<R: TaskRepository> TaskService<R> {
    pub fn new(repository: R) -> Self {
        Self::with_clock(repository, DefaultClock)
    }
}

impl<R: TaskRepository, C: Clock> TaskService<R, C> {
    /// Stamps tasks with `clock` instead of the system time.
    pub fn with_clock(repository: R, clock: C) -> Self {
        Self { repository, clock }
    }

    #[cfg(test)]
    pub(crate) fn repository(&self) -> &R {
        &self.repository
    }

    /// Creates a `todo` task with the next free id.
    ///
    /// # Errors
    ///
    /// [`ServiceError::EmptyDescription`] for a blank description, or a
    /// repository error if storage fails.
    #[tracing::instrument(skip(self))]
    pub fn add_task(&self, description: &str) -> Result<Task, ServiceError> {
        if description.trim().is_empty() {
            return Err(ServiceError::EmptyDescription);
        }
        let id = self.repository.get_next_id()?;
        let task = Task::new(id, description, self.clock.utc());
        self.repository.save(&task)?;
        info!(id, "task added");
        Ok(task)
    }

    /// Changes the description and/or status of an existing task.
    ///
    /// Empty values are treated as absent. The status label is checked before
    /// anything is written, so an unknown label leaves the task untouched.
    #[tracing::instrument(skip(self))]
    pub fn update_task(
        &self,
        id: u32,
        description: Option<&str>,
        status: Option<&str>,
    ) -> Result<Task, ServiceError> {
        let status = status
            .filter(|label| !label.is_empty())
            .map(str::parse::<Status>)
            .transpose()?;
        let mut task = self
            .repository
            .get_by_id(id)?
            .ok_or(ServiceError::NotFound(id))?;

        if let Some(description) = description.filter(|d| !d.is_empty()) {
            task.set_description(description, self.clock.utc());
        }
        if let Some(status) = status {
            task.set_status(status, self.clock.utc());
        }

        self.repository.save(&task)?;
        info!(id, status = %task.status(), "task updated");
        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&self, id: u32) -> Result<(), ServiceError> {
        if self.repository.get_by_id(id)?.is_none() {
            return Err(ServiceError::NotFound(id));
        }
        self.repository.delete(id)?;
        info!(id, "task deleted");
        Ok(())
    }

    /// Every task, or only those whose status matches the `status` label.
    #[tracing::instrument(skip(self))]
    pub fn list_tasks(&self, status: Option<&str>) -> Result<Vec<Task>, ServiceError> {
        let filter = status
            .filter(|label| !label.is_empty())
            .map(str::parse::<Status>)
            .transpose()?;
        let tasks = self.repository.get_all()?;
        Ok(match filter {
            Some(status) => tasks
                .into_iter()
                .filter(|task| task.status() == status)
                .collect(),
            None => tasks,
        })
    }

    pub fn mark_in_progress(&self, id: u32) -> Result<Task, ServiceError> {
        self.update_task(id, None, Some(Status::InProgress.label()))
    }

    pub fn mark_done(&self, id: u32) -> Result<Task, ServiceError> {
        self.update_task(id, None, Some(Status::Done.label()))
    }
}
