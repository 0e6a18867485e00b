// Maps the in-memory collections onto a database directory and rebuilds
// them at startup.
//
// Layout: one file per collection at the top level, plus one file per
// employee per month under timeentries/<employee id>/. A version marker is
// written when the directory is first created and checked before anything
// else in the directory is trusted.
//
// The reader distinguishes "nothing here yet" from "something here but
// broken": a missing collection file is an empty collection (progressive
// histories are normal), while a dangling reference, an unparseable line or
// a half-missing time entry tree is corruption, and corruption halts the
// startup rather than risking serving wrong data.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, TimeZone, Utc};

use crate::core::employee::Employee;
use crate::core::project::Project;
use crate::core::session::Session;
use crate::core::time_entry::{Details, Minutes, TimeEntry, TimeEntryId, date_from_epoch_day};
use crate::core::user::User;
use crate::persistence::errors::{DatabaseCorrupted, DeserializationError};
use crate::persistence::store::StoreSnapshot;
use crate::persistence::surrogate::{
    EmployeeSurrogate, ProjectSurrogate, SessionSurrogate, TimeEntrySurrogate, UserSurrogate,
};
use crate::persistence::write_queue::{FileWrite, QueueClosed, WriteQueue};

pub const DATABASE_VERSION: u32 = 1;
pub const DATABASE_FILE_SUFFIX: &str = ".db";
pub const VERSION_FILENAME: &str = "version.txt";
pub const TIME_ENTRIES_DIRECTORY: &str = "timeentries";

const EMPLOYEES_FILE: &str = "employees";
const PROJECTS_FILE: &str = "projects";
const USERS_FILE: &str = "users";
const SESSIONS_FILE: &str = "sessions";

pub fn month_file_stem(date: NaiveDate) -> String {
    format!("{}_{}", date.year(), date.month())
}

/// The store's writing end: owns the directory and the background queue.
pub struct DiskPersistence {
    directory: PathBuf,
    queue: WriteQueue,
}

impl DiskPersistence {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            queue: WriteQueue::new("database-writes"),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub async fn queue_employees(
        &self,
        employees: &HashSet<Employee>,
    ) -> Result<(), QueueClosed> {
        self.queue_collection(EMPLOYEES_FILE, render_employees(employees))
            .await
    }

    pub async fn queue_projects(&self, projects: &HashSet<Project>) -> Result<(), QueueClosed> {
        self.queue_collection(PROJECTS_FILE, render_projects(projects))
            .await
    }

    pub async fn queue_users(&self, users: &HashSet<User>) -> Result<(), QueueClosed> {
        self.queue_collection(USERS_FILE, render_users(users)).await
    }

    pub async fn queue_sessions(
        &self,
        sessions: &HashMap<String, Session>,
    ) -> Result<(), QueueClosed> {
        self.queue_collection(SESSIONS_FILE, render_sessions(sessions))
            .await
    }

    /// Rewrites one employee's file for the month `date` falls in. Months
    /// the entry does not touch are never rewritten.
    pub async fn queue_month_of_time_entries(
        &self,
        employee_id: u32,
        date: NaiveDate,
        entries: Vec<TimeEntry>,
    ) -> Result<(), QueueClosed> {
        self.queue
            .enqueue(FileWrite {
                directory: self
                    .directory
                    .join(TIME_ENTRIES_DIRECTORY)
                    .join(employee_id.to_string()),
                filename: format!("{}{}", month_file_stem(date), DATABASE_FILE_SUFFIX),
                content: render_time_entries(entries),
            })
            .await
    }

    pub async fn stop(&self) {
        self.queue.stop().await;
    }

    async fn queue_collection(&self, name: &str, content: String) -> Result<(), QueueClosed> {
        self.queue
            .enqueue(FileWrite {
                directory: self.directory.clone(),
                filename: format!("{name}{DATABASE_FILE_SUFFIX}"),
                content,
            })
            .await
    }
}

fn render_employees(employees: &HashSet<Employee>) -> String {
    let mut surrogates: Vec<_> = employees.iter().map(EmployeeSurrogate::from_employee).collect();
    surrogates.sort_by_key(|s| s.id);
    render_lines(surrogates.iter().map(EmployeeSurrogate::serialize))
}

fn render_projects(projects: &HashSet<Project>) -> String {
    let mut surrogates: Vec<_> = projects.iter().map(ProjectSurrogate::from_project).collect();
    surrogates.sort_by_key(|s| s.id);
    render_lines(surrogates.iter().map(ProjectSurrogate::serialize))
}

fn render_users(users: &HashSet<User>) -> String {
    let mut surrogates: Vec<_> = users.iter().map(UserSurrogate::from_user).collect();
    surrogates.sort_by_key(|s| s.id);
    render_lines(surrogates.iter().map(UserSurrogate::serialize))
}

fn render_sessions(sessions: &HashMap<String, Session>) -> String {
    let mut surrogates: Vec<_> = sessions
        .iter()
        .map(|(token, session)| SessionSurrogate {
            token: token.clone(),
            user_id: session.user.id.value(),
            created_epoch_millis: session.created_at.timestamp_millis(),
        })
        .collect();
    surrogates.sort_by(|a, b| a.token.cmp(&b.token));
    render_lines(surrogates.iter().map(SessionSurrogate::serialize))
}

fn render_time_entries(entries: Vec<TimeEntry>) -> String {
    let mut surrogates: Vec<_> = entries.iter().map(TimeEntrySurrogate::from_time_entry).collect();
    surrogates.sort_by_key(|s| s.id);
    render_lines(surrogates.iter().map(TimeEntrySurrogate::serialize))
}

fn render_lines(lines: impl Iterator<Item = String>) -> String {
    lines.collect::<Vec<_>>().join("\n")
}

/// True when the directory holds a database we should restore rather than
/// bootstrap over. An absent directory and an existing-but-empty directory
/// are both fresh starts; there is nothing in an empty directory to restore.
pub async fn has_existing_database(directory: &Path) -> Result<bool, DatabaseCorrupted> {
    if !tokio::fs::try_exists(directory).await? {
        return Ok(false);
    }
    let mut entries = tokio::fs::read_dir(directory).await?;
    Ok(entries.next_entry().await?.is_some())
}

pub async fn prepare_fresh_directory(directory: &Path) -> Result<(), DatabaseCorrupted> {
    tokio::fs::create_dir_all(directory.join(TIME_ENTRIES_DIRECTORY)).await?;
    tokio::fs::write(
        directory.join(VERSION_FILENAME),
        format!("{DATABASE_VERSION}\n"),
    )
    .await?;
    tracing::info!(directory = %directory.display(), "created a fresh database directory");
    Ok(())
}

/// Reads the whole directory back into plain collections.
///
/// Employees and projects load before time entries, and users before
/// sessions, so every cross-reference can be checked against a complete
/// collection. File write order across collections is not guaranteed, so
/// this only asserts internal validity, never inter-file write ordering.
pub async fn restore(directory: &Path) -> Result<StoreSnapshot, DatabaseCorrupted> {
    check_version(directory).await?;
    let employees = read_employees(directory).await?;
    let projects = read_projects(directory).await?;
    let users = read_users(directory).await?;
    let sessions = read_sessions(directory, &users).await?;
    let time_entries = read_time_entries(directory, &employees, &projects).await?;
    Ok(StoreSnapshot {
        employees,
        projects,
        users,
        sessions,
        time_entries,
    })
}

async fn check_version(directory: &Path) -> Result<(), DatabaseCorrupted> {
    let path = directory.join(VERSION_FILENAME);
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(DatabaseCorrupted::MissingVersionMarker { path });
        }
        Err(err) => return Err(err.into()),
    };
    let found = raw.trim().to_string();
    if found.parse::<u32>().ok() != Some(DATABASE_VERSION) {
        return Err(DatabaseCorrupted::UnsupportedVersion {
            found,
            expected: DATABASE_VERSION,
        });
    }
    Ok(())
}

async fn read_collection_file(
    directory: &Path,
    name: &str,
) -> Result<Option<String>, DatabaseCorrupted> {
    let path = directory.join(format!("{name}{DATABASE_FILE_SUFFIX}"));
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(file = %path.display(), "collection file missing, treating it as an empty collection");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn data_lines(content: &str) -> impl Iterator<Item = &str> {
    content.lines().filter(|line| !line.trim().is_empty())
}

async fn read_employees(directory: &Path) -> Result<HashSet<Employee>, DatabaseCorrupted> {
    let Some(content) = read_collection_file(directory, EMPLOYEES_FILE).await? else {
        return Ok(HashSet::new());
    };
    let mut employees = HashSet::new();
    for line in data_lines(&content) {
        let surrogate = EmployeeSurrogate::deserialize(line)?;
        let employee = surrogate
            .to_employee()
            .map_err(|_| DeserializationError::new(EmployeeSurrogate::ENTITY, line))?;
        employees.insert(employee);
    }
    Ok(employees)
}

async fn read_projects(directory: &Path) -> Result<HashSet<Project>, DatabaseCorrupted> {
    let Some(content) = read_collection_file(directory, PROJECTS_FILE).await? else {
        return Ok(HashSet::new());
    };
    let mut projects = HashSet::new();
    for line in data_lines(&content) {
        let surrogate = ProjectSurrogate::deserialize(line)?;
        let project = surrogate
            .to_project()
            .map_err(|_| DeserializationError::new(ProjectSurrogate::ENTITY, line))?;
        projects.insert(project);
    }
    Ok(projects)
}

async fn read_users(directory: &Path) -> Result<HashSet<User>, DatabaseCorrupted> {
    let Some(content) = read_collection_file(directory, USERS_FILE).await? else {
        return Ok(HashSet::new());
    };
    let mut users = HashSet::new();
    for line in data_lines(&content) {
        let surrogate = UserSurrogate::deserialize(line)?;
        let user = surrogate
            .to_user()
            .map_err(|_| DeserializationError::new(UserSurrogate::ENTITY, line))?;
        users.insert(user);
    }
    Ok(users)
}

async fn read_sessions(
    directory: &Path,
    users: &HashSet<User>,
) -> Result<HashMap<String, Session>, DatabaseCorrupted> {
    let Some(content) = read_collection_file(directory, SESSIONS_FILE).await? else {
        return Ok(HashMap::new());
    };
    let mut sessions = HashMap::new();
    for line in data_lines(&content) {
        let surrogate = SessionSurrogate::deserialize(line)?;
        let user = users
            .iter()
            .find(|user| user.id.value() == surrogate.user_id)
            .ok_or(DatabaseCorrupted::UnknownUser {
                id: surrogate.user_id,
                user_count: users.len(),
            })?
            .clone();
        let created_at = Utc
            .timestamp_millis_opt(surrogate.created_epoch_millis)
            .single()
            .ok_or_else(|| DeserializationError::new(SessionSurrogate::ENTITY, line))?;
        sessions.insert(surrogate.token, Session { user, created_at });
    }
    Ok(sessions)
}

async fn read_time_entries(
    directory: &Path,
    employees: &HashSet<Employee>,
    projects: &HashSet<Project>,
) -> Result<HashMap<Employee, HashMap<NaiveDate, HashSet<TimeEntry>>>, DatabaseCorrupted> {
    let root = directory.join(TIME_ENTRIES_DIRECTORY);
    if !tokio::fs::try_exists(&root).await? {
        return Err(DatabaseCorrupted::MissingTimeEntriesDirectory { path: root });
    }

    let mut all: HashMap<Employee, HashMap<NaiveDate, HashSet<TimeEntry>>> = HashMap::new();
    let mut employee_dirs = tokio::fs::read_dir(&root).await?;
    while let Some(employee_dir) = employee_dirs.next_entry().await? {
        if !employee_dir.file_type().await?.is_dir() {
            continue;
        }
        let dir_name = employee_dir.file_name().to_string_lossy().into_owned();
        let employee_id: u32 = dir_name
            .parse()
            .map_err(|_| DeserializationError::new("employee directory", &dir_name))?;
        if !employees.iter().any(|e| e.id.value() == employee_id) {
            return Err(DatabaseCorrupted::UnknownEmployeeDirectory { id: employee_id });
        }

        let mut saw_file = false;
        let mut month_files = tokio::fs::read_dir(employee_dir.path()).await?;
        while let Some(month_file) = month_files.next_entry().await? {
            if !month_file.file_type().await?.is_file() {
                continue;
            }
            saw_file = true;
            let file_name = month_file.file_name().to_string_lossy().into_owned();
            let content = tokio::fs::read_to_string(month_file.path()).await?;
            for line in data_lines(&content) {
                let entry = parse_time_entry(line, employees, projects).map_err(|source| {
                    DatabaseCorrupted::TimeEntryFile {
                        file: file_name.clone(),
                        source: Box::new(source),
                    }
                })?;
                all.entry(entry.employee.clone())
                    .or_default()
                    .entry(entry.date)
                    .or_default()
                    .insert(entry);
            }
        }
        if !saw_file {
            return Err(DatabaseCorrupted::EmptyEmployeeDirectory {
                path: employee_dir.path(),
            });
        }
    }
    Ok(all)
}

fn parse_time_entry(
    line: &str,
    employees: &HashSet<Employee>,
    projects: &HashSet<Project>,
) -> Result<TimeEntry, DatabaseCorrupted> {
    let surrogate = TimeEntrySurrogate::deserialize(line)?;
    let employee = employees
        .iter()
        .find(|e| e.id.value() == surrogate.employee_id)
        .ok_or(DatabaseCorrupted::UnknownEmployee {
            id: surrogate.employee_id,
            employee_count: employees.len(),
        })?
        .clone();
    let project = projects
        .iter()
        .find(|p| p.id.value() == surrogate.project_id)
        .ok_or(DatabaseCorrupted::UnknownProject {
            id: surrogate.project_id,
            project_count: projects.len(),
        })?
        .clone();
    let malformed = || DeserializationError::new(TimeEntrySurrogate::ENTITY, line);
    let date = date_from_epoch_day(surrogate.epoch_day).ok_or_else(malformed)?;
    Ok(TimeEntry {
        id: TimeEntryId::new(surrogate.id).map_err(|_| malformed())?,
        employee,
        project,
        minutes: Minutes::new(surrogate.minutes).map_err(|_| malformed())?,
        date,
        details: Details::new(surrogate.details.clone()).map_err(|_| malformed())?,
    })
}
