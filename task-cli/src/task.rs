use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A single unit of work tracked by the task list.
#[derive(Debug, Eq, PartialEq, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    id: u32,
    description: String,
    #[serde(default)]
    status: Status,
    #[serde(deserialize_with = "timestamp::deserialize")]
    created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new `Todo` task stamped with `now` for both timestamps.
    pub fn new(id: u32, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            description: description.into(),
            status: Status::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replaces the description and refreshes `updated_at`.
    pub fn set_description(&mut self, description: impl Into<String>, now: DateTime<Utc>) {
        self.description = description.into();
        self.touch(now);
    }

    /// Replaces the status and refreshes `updated_at`.
    pub fn set_status(&mut self, status: Status, now: DateTime<Utc>) {
        self.status = status;
        self.touch(now);
    }

    // updated_at never goes backwards past created_at, even with a skewed clock
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.created_at);
    }
}

/// Reading side of the timestamp fields.
///
/// Accepts RFC 3339 and also ISO-8601 local date-times without an offset, which
/// are taken to be UTC. Writing always produces RFC 3339.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    const WITHOUT_OFFSET: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub(super) fn parse(value: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|parsed| parsed.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(value, WITHOUT_OFFSET).map(|naive| naive.and_utc())
            })
            .ok()
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        parse(&value).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid ISO-8601 timestamp '{value}'"))
        })
    }
}

/// Progress of a [`Task`].
///
/// Stored on disk as its numeric code and shown to users by its label.
#[derive(Debug, Default, Eq, PartialEq, Serialize, Deserialize, Clone, Copy, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub enum Status {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Todo, Status::InProgress, Status::Done];

    pub fn code(self) -> u8 {
        match self {
            Status::Todo => 1,
            Status::InProgress => 2,
            Status::Done => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in-progress",
            Status::Done => "done",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
#[error("unknown status '{0}', expected one of: todo, in-progress, done")]
pub struct ParseStatusError(pub String);

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
#[error("unknown status code {0}, expected 1, 2 or 3")]
pub struct StatusCodeError(pub u8);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.label() == label)
            .ok_or_else(|| ParseStatusError(label.to_string()))
    }
}

impl TryFrom<u8> for Status {
    type Error = StatusCodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Status::ALL
            .into_iter()
            .find(|status| status.code() == code)
            .ok_or(StatusCodeError(code))
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status.code()
    }
}
