use super::{ReadErrorSource, RepositoryError, TaskRepository};
use crate::task::Task;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Top-level shape of the tasks file.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
struct TaskDocument {
    #[serde(default)]
    tasks: Vec<Task>,
}

/// Keeps every task in one JSON document on disk.
///
/// Each call reads the whole document, and each mutation rewrites it. Writes go
/// through a temporary file in the same directory which then replaces the
/// document with a rename, so a crash leaves either the old or the new file.
#[derive(Debug, Clone)]
pub struct JsonTaskRepository {
    path: PathBuf,
}

impl JsonTaskRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_error(&self, source: impl Into<ReadErrorSource>) -> RepositoryError {
        RepositoryError::Read {
            path: self.path.clone(),
            source: source.into(),
        }
    }

    fn write_error(&self, source: std::io::Error) -> RepositoryError {
        RepositoryError::Write {
            path: self.path.clone(),
            source,
        }
    }

    fn read_document(&self) -> Result<TaskDocument, RepositoryError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "tasks file missing, starting empty");
                return Ok(TaskDocument::default());
            }
            Err(err) => return Err(self.read_error(err)),
        };

        if contents.trim().is_empty() {
            debug!(path = %self.path.display(), "tasks file empty, starting empty");
            return Ok(TaskDocument::default());
        }

        let document: TaskDocument =
            serde_json::from_str(&contents).map_err(|err| self.read_error(err))?;
        trace!(count = document.tasks.len(), "loaded tasks");
        Ok(document)
    }

    fn write_document(&self, document: &TaskDocument) -> Result<(), RepositoryError> {
        // a symlinked tasks file keeps its link; the file it points at is replaced
        let target = match fs::canonicalize(&self.path) {
            Ok(resolved) => resolved,
            Err(err) if err.kind() == ErrorKind::NotFound => self.path.clone(),
            Err(err) => return Err(self.write_error(err)),
        };
        let directory = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(directory).map_err(|err| self.write_error(err))?;

        let permissions = match fs::metadata(&target) {
            Ok(metadata) => Some(metadata.permissions()),
            Err(err) if err.kind() == ErrorKind::NotFound => new_file_permissions(),
            Err(err) => return Err(self.write_error(err)),
        };

        let mut contents =
            serde_json::to_vec_pretty(document).map_err(|err| self.write_error(err.into()))?;
        contents.push(b'\n');

        let mut staging =
            tempfile::NamedTempFile::new_in(directory).map_err(|err| self.write_error(err))?;
        if let Some(permissions) = permissions {
            staging
                .as_file()
                .set_permissions(permissions)
                .map_err(|err| self.write_error(err))?;
        }
        staging
            .write_all(&contents)
            .and_then(|_| staging.as_file().sync_all())
            .map_err(|err| self.write_error(err))?;
        staging
            .persist(&target)
            .map_err(|err| self.write_error(err.error))?;

        trace!(count = document.tasks.len(), path = %target.display(), "wrote tasks");
        Ok(())
    }
}

/// Staging files are private (0600); a freshly created tasks file is not.
#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

impl TaskRepository for JsonTaskRepository {
    fn get_all(&self) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.read_document()?.tasks)
    }

    fn get_by_id(&self, id: u32) -> Result<Option<Task>, RepositoryError> {
        Ok(self.get_all()?.into_iter().find(|task| task.id() == id))
    }

    fn save(&self, task: &Task) -> Result<(), RepositoryError> {
        let mut document = self.read_document()?;
        super::upsert(&mut document.tasks, task);
        debug!(id = task.id(), "saving task");
        self.write_document(&document)
    }

    fn delete(&self, id: u32) -> Result<(), RepositoryError> {
        let mut document = self.read_document()?;
        document.tasks.retain(|task| task.id() != id);
        debug!(id, "deleting task");
        self.write_document(&document)
    }

    fn get_next_id(&self) -> Result<u32, RepositoryError> {
        super::next_id(&self.get_all()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Status;
    use assert_fs::prelude::*;
    use chrono::{TimeZone, Utc};

    fn task(id: u32, description: &str) -> Task {
        Task::new(id, description, Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    fn repository_in(dir: &assert_fs::TempDir) -> JsonTaskRepository {
        JsonTaskRepository::new(dir.child("tasks.json").path())
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = assert_fs::TempDir::new().unwrap();
        let repo = repository_in(&dir);

        assert!(repo.get_all().unwrap().is_empty());
        assert_eq!(repo.get_next_id().unwrap(), 1);
    }

    #[test]
    fn empty_file_reads_as_empty() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("tasks.json").touch().unwrap();
        let repo = repository_in(&dir);

        assert!(repo.get_all().unwrap().is_empty());
    }

    #[test]
    fn garbage_file_is_a_read_error() {
        // Arrange
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("tasks.json").write_str("this is not json").unwrap();
        let repo = repository_in(&dir);

        // Act
        let result = repo.get_all();

        // Assert
        assert!(matches!(
            result,
            Err(RepositoryError::Read {
                source: ReadErrorSource::Json(_),
                ..
            })
        ));
    }

    #[test]
    fn document_without_tasks_field_reads_as_empty() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("tasks.json").write_str("{}").unwrap();
        let repo = repository_in(&dir);

        assert!(repo.get_all().unwrap().is_empty());
    }

    #[test]
    fn saved_tasks_read_back_equal() {
        // Arrange
        let dir = assert_fs::TempDir::new().unwrap();
        let repo = repository_in(&dir);
        let mut done = task(2, "walk dog");
        done.set_status(Status::Done, Utc.timestamp_opt(1_700_000_500, 0).unwrap());

        // Act
        repo.save(&task(1, "buy milk")).unwrap();
        repo.save(&done).unwrap();

        // Assert
        let reopened = repository_in(&dir);
        assert_eq!(reopened.get_all().unwrap(), vec![task(1, "buy milk"), done]);
    }

    #[test]
    fn save_is_idempotent() {
        let dir = assert_fs::TempDir::new().unwrap();
        let repo = repository_in(&dir);

        repo.save(&task(1, "buy milk")).unwrap();
        repo.save(&task(1, "buy milk")).unwrap();

        assert_eq!(repo.get_all().unwrap(), vec![task(1, "buy milk")]);
    }

    #[test]
    fn save_replaces_existing_task_in_place() {
        let dir = assert_fs::TempDir::new().unwrap();
        let repo = repository_in(&dir);
        repo.save(&task(1, "a")).unwrap();
        repo.save(&task(2, "b")).unwrap();

        repo.save(&task(1, "a, revised")).unwrap();

        assert_eq!(repo.get_all().unwrap(), vec![task(1, "a, revised"), task(2, "b")]);
    }

    #[test]
    fn delete_removes_only_that_task() {
        // Arrange
        let dir = assert_fs::TempDir::new().unwrap();
        let repo = repository_in(&dir);
        repo.save(&task(1, "a")).unwrap();
        repo.save(&task(2, "b")).unwrap();

        // Act
        repo.delete(1).unwrap();

        // Assert
        assert_eq!(repo.get_by_id(1).unwrap(), None);
        assert_eq!(repo.get_by_id(2).unwrap(), Some(task(2, "b")));
    }

    #[test]
    fn delete_of_unknown_id_is_a_no_op() {
        let dir = assert_fs::TempDir::new().unwrap();
        let repo = repository_in(&dir);
        repo.save(&task(1, "a")).unwrap();

        repo.delete(42).unwrap();

        assert_eq!(repo.get_all().unwrap(), vec![task(1, "a")]);
    }

    #[test]
    fn next_id_follows_the_highest_id() {
        let dir = assert_fs::TempDir::new().unwrap();
        let repo = repository_in(&dir);
        repo.save(&task(3, "c")).unwrap();
        repo.save(&task(1, "a")).unwrap();

        assert_eq!(repo.get_next_id().unwrap(), 4);
    }

    #[test]
    fn file_uses_numeric_status_and_camel_case_timestamps() {
        // Arrange
        let dir = assert_fs::TempDir::new().unwrap();
        let repo = repository_in(&dir);

        // Act
        repo.save(&task(1, "buy milk")).unwrap();

        // Assert
        let written = fs::read_to_string(dir.child("tasks.json").path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "tasks": [{
                    "id": 1,
                    "description": "buy milk",
                    "status": 1,
                    "createdAt": "2023-11-14T22:13:20Z",
                    "updatedAt": "2023-11-14T22:13:20Z",
                }]
            })
        );
    }

    #[test]
    fn reads_documents_written_by_hand() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("tasks.json")
            .write_str(
                r#"{
                    "tasks": [{
                        "id": 5,
                        "description": "Task 5",
                        "status": 2,
                        "createdAt": "2023-01-01T00:00:00Z",
                        "updatedAt": "2023-01-02T00:00:00+00:00"
                    }]
                }"#,
            )
            .unwrap();
        let repo = repository_in(&dir);

        let task = repo.get_by_id(5).unwrap().unwrap();

        assert_eq!(task.description(), "Task 5");
        assert_eq!(task.status(), Status::InProgress);
        assert_eq!(repo.get_next_id().unwrap(), 6);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = assert_fs::TempDir::new().unwrap();
        let repo = JsonTaskRepository::new(dir.child("nested/deeper/tasks.json").path());

        repo.save(&task(1, "a")).unwrap();

        dir.child("nested/deeper/tasks.json")
            .assert(predicates::path::exists());
    }

    #[test]
    fn unwritable_location_is_a_write_error() {
        // Arrange
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("blocker").write_str("a file, not a directory").unwrap();
        let repo = JsonTaskRepository::new(dir.child("blocker/tasks.json").path());

        // Act
        let result = repo.write_document(&TaskDocument::default());

        // Assert
        assert!(matches!(result, Err(RepositoryError::Write { .. })));
    }

    #[test]
    fn reads_timestamps_without_offset_as_utc() {
        // Arrange
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("tasks.json")
            .write_str(
                r#"{"tasks": [{
                    "id": 1,
                    "description": "legacy",
                    "status": 3,
                    "createdAt": "2025-01-01T12:00:00.123456",
                    "updatedAt": "2025-01-02T08:30:00"
                }]}"#,
            )
            .unwrap();
        let repo = repository_in(&dir);

        // Act
        let task = repo.get_by_id(1).unwrap().unwrap();

        // Assert
        assert_eq!(
            task.created_at(),
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
                + chrono::Duration::microseconds(123_456)
        );
        assert_eq!(
            task.updated_at(),
            Utc.with_ymd_and_hms(2025, 1, 2, 8, 30, 0).unwrap()
        );
        assert_eq!(task.status(), Status::Done);
    }

    #[test]
    fn rewriting_a_legacy_file_stores_rfc3339() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("tasks.json")
            .write_str(
                r#"{"tasks": [{"id": 1, "description": "legacy", "status": 1,
                    "createdAt": "2025-01-01T12:00:00", "updatedAt": "2025-01-01T12:00:00"}]}"#,
            )
            .unwrap();
        let repo = repository_in(&dir);

        repo.save(&task(2, "new")).unwrap();

        dir.child("tasks.json")
            .assert(predicates::str::contains(r#""createdAt": "2025-01-01T12:00:00Z""#));
    }

    #[test]
    fn record_without_status_reads_as_todo() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("tasks.json")
            .write_str(
                r#"{"tasks": [{"id": 1, "description": "no status yet",
                    "createdAt": "2025-01-01T00:00:00Z", "updatedAt": "2025-01-01T00:00:00Z"}]}"#,
            )
            .unwrap();
        let repo = repository_in(&dir);

        let task = repo.get_by_id(1).unwrap().unwrap();

        assert_eq!(task.status(), Status::Todo);
    }

    #[test]
    fn deleting_the_highest_id_frees_it_for_reuse() {
        // Arrange
        let dir = assert_fs::TempDir::new().unwrap();
        let repo = repository_in(&dir);
        repo.save(&task(1, "a")).unwrap();
        repo.save(&task(2, "b")).unwrap();
        repo.save(&task(3, "c")).unwrap();

        // Act
        repo.delete(3).unwrap();

        // Assert
        assert_eq!(repo.get_next_id().unwrap(), 3);
    }

    #[test]
    fn largest_stored_id_exhausts_the_id_space() {
        let dir = assert_fs::TempDir::new().unwrap();
        let repo = repository_in(&dir);
        repo.save(&task(u32::MAX, "last")).unwrap();

        let result = repo.get_next_id();

        assert!(matches!(result, Err(RepositoryError::IdSpaceExhausted)));
    }

    #[cfg(unix)]
    #[test]
    fn save_keeps_the_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        // Arrange
        let dir = assert_fs::TempDir::new().unwrap();
        let repo = repository_in(&dir);
        repo.save(&task(1, "a")).unwrap();
        let path = dir.child("tasks.json");
        fs::set_permissions(path.path(), fs::Permissions::from_mode(0o640)).unwrap();

        // Act
        repo.save(&task(2, "b")).unwrap();

        // Assert
        let mode = fs::metadata(path.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn new_file_is_not_private_to_the_staging_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = assert_fs::TempDir::new().unwrap();
        let repo = repository_in(&dir);

        repo.save(&task(1, "a")).unwrap();

        let mode = fs::metadata(dir.child("tasks.json").path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn save_writes_through_a_symlink() {
        // Arrange
        let dir = assert_fs::TempDir::new().unwrap();
        let real = dir.child("real.json");
        real.write_str(r#"{"tasks": []}"#).unwrap();
        let link = dir.child("tasks.json");
        std::os::unix::fs::symlink(real.path(), link.path()).unwrap();
        let repo = repository_in(&dir);

        // Act
        repo.save(&task(1, "through the link")).unwrap();

        // Assert
        let link_type = fs::symlink_metadata(link.path()).unwrap().file_type();
        assert!(link_type.is_symlink());
        real.assert(predicates::str::contains("through the link"));
    }
}
