use std::path::PathBuf;

use thiserror::Error;

use crate::core::validation::ValidationError;
use crate::persistence::write_queue::QueueClosed;

/// Contract violations on the store's public operations.
///
/// These are programmer errors, not expected user input: they should be
/// propagated loudly, never swallowed. Plain "not found" lookups return
/// `Option::None` instead and never land here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("employee ({name}) is not registered in this store")]
    EmployeeNotRegistered { name: String },

    #[error("there must not already exist a session for ({user}) if we are to create one")]
    DuplicateSession { user: String },

    #[error("there is no session for token ({token}), so it cannot be removed")]
    SessionNotFound { token: String },

    #[error("the store is stopped and no longer accepts writes")]
    Stopped,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<QueueClosed> for StoreError {
    fn from(_: QueueClosed) -> Self {
        StoreError::Stopped
    }
}

/// A single serialized line that could not be turned back into an entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unable to deserialize this text as {entity} data: {text}")]
pub struct DeserializationError {
    pub entity: &'static str,
    pub text: String,
}

impl DeserializationError {
    pub fn new(entity: &'static str, text: impl Into<String>) -> Self {
        Self {
            entity,
            text: text.into(),
        }
    }
}

/// The on-disk state is internally inconsistent.
///
/// Raised only during startup. The policy is to halt rather than attempt
/// partial recovery: each variant names the file, path or id involved so an
/// operator can decide what to do with the directory.
#[derive(Debug, Error)]
pub enum DatabaseCorrupted {
    #[error(transparent)]
    Unparseable(#[from] DeserializationError),

    #[error("Could not deserialize time entry file {file}. {source}")]
    TimeEntryFile {
        file: String,
        #[source]
        source: Box<DatabaseCorrupted>,
    },

    #[error("Unable to find an employee with the id of {id} based on entry in timeentries/")]
    UnknownEmployeeDirectory { id: u32 },

    #[error("Unable to find an employee with the id of {id}. Employee set size: {employee_count}")]
    UnknownEmployee { id: u32, employee_count: usize },

    #[error("Unable to find a project with the id of {id}. Project set size: {project_count}")]
    UnknownProject { id: u32, project_count: usize },

    #[error("Unable to find a user with the id of {id}. User set size: {user_count}")]
    UnknownUser { id: u32, user_count: usize },

    #[error("no time entry files found in employees directory at {}", .path.display())]
    EmptyEmployeeDirectory { path: PathBuf },

    #[error("time entries directory missing at {}", .path.display())]
    MissingTimeEntriesDirectory { path: PathBuf },

    #[error("database version marker missing at {}", .path.display())]
    MissingVersionMarker { path: PathBuf },

    #[error("database version {found} is not readable by this build, which expects version {expected}")]
    UnsupportedVersion { found: String, expected: u32 },

    #[error("failed to seed the fresh database: {0}")]
    Bootstrap(#[from] StoreError),

    #[error("database file system failure: {0}")]
    Io(#[from] std::io::Error),
}
