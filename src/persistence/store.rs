// The in-memory store at the heart of the application.
//
// Why use those heavy-handed database servers when you can keep your data
// in plain collections? Five collections, one lock each: employees,
// projects, users, sessions, and time entries grouped by employee and day.
// A write to one collection never contends with a write to another.
//
// Each id is taken from a monotonic counter guarded by the same lock as the
// insertion, so "allocate the next id and insert" is one critical section.
// Recomputing the id from the collection size outside the lock would
// reintroduce the lost-write race; do not separate those steps.
//
// When a database directory is configured, every mutation queues a rewrite
// of the affected file onto a background worker; callers only ever wait on
// the lock. `stop` closes that queue and drains it.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Datelike, NaiveDate, SubsecRound, Utc};
use tokio::sync::RwLock;

use crate::core::employee::{Employee, EmployeeId, EmployeeName};
use crate::core::project::{Project, ProjectId, ProjectName};
use crate::core::session::Session;
use crate::core::time_entry::{NewTimeEntry, TimeEntry, TimeEntryId};
use crate::core::user::{User, UserId, UserName};
use crate::persistence::disk::{self, DiskPersistence};
use crate::persistence::errors::{DatabaseCorrupted, StoreError};

/// The employee every fresh database is seeded with.
pub const ADMINISTRATOR_NAME: &str = "Administrator";

/// A plain, owned copy of all five collections.
///
/// Snapshots carry no locks and no id counters, so two of them compare with
/// `==`; that structural equality is what every round-trip test leans on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub employees: HashSet<Employee>,
    pub projects: HashSet<Project>,
    pub users: HashSet<User>,
    pub sessions: HashMap<String, Session>,
    pub time_entries: HashMap<Employee, HashMap<NaiveDate, HashSet<TimeEntry>>>,
}

struct Roster<T> {
    members: HashSet<T>,
    next_id: u32,
}

impl<T: Eq + std::hash::Hash> Roster<T> {
    fn seeded(members: HashSet<T>, id_of: impl Fn(&T) -> u32) -> Self {
        let next_id = members.iter().map(&id_of).max().unwrap_or(0) + 1;
        Self { members, next_id }
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

struct Timeline {
    days: HashMap<NaiveDate, HashSet<TimeEntry>>,
    next_entry_id: u32,
}

impl Timeline {
    fn new() -> Self {
        Self {
            days: HashMap::new(),
            next_entry_id: 1,
        }
    }

    fn seeded(days: HashMap<NaiveDate, HashSet<TimeEntry>>) -> Self {
        let next_entry_id = days
            .values()
            .flat_map(|entries| entries.iter())
            .map(|entry| entry.id.value())
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            days,
            next_entry_id,
        }
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_entry_id;
        self.next_entry_id += 1;
        id
    }

    fn minutes_on(&self, date: NaiveDate) -> u32 {
        self.days
            .get(&date)
            .map(|entries| entries.iter().map(|entry| entry.minutes.value()).sum())
            .unwrap_or(0)
    }

    fn entries_in_month_of(&self, date: NaiveDate) -> Vec<TimeEntry> {
        self.days
            .iter()
            .filter(|(day, _)| day.year() == date.year() && day.month() == date.month())
            .flat_map(|(_, entries)| entries.iter().cloned())
            .collect()
    }
}

pub struct MemoryStore {
    employees: RwLock<Roster<Employee>>,
    projects: RwLock<Roster<Project>>,
    users: RwLock<Roster<User>>,
    sessions: RwLock<HashMap<String, Session>>,
    time_entries: RwLock<HashMap<Employee, Timeline>>,
    disk: Option<DiskPersistence>,
}

impl MemoryStore {
    /// A store that never touches the disk. Useful on its own for tests and
    /// as the target of [`MemoryStore::copy`].
    pub fn in_memory() -> Self {
        Self::from_snapshot(StoreSnapshot::default(), None)
    }

    /// Starts a disk-backed store: restores the directory when it holds a
    /// previously persisted database, otherwise bootstraps a fresh one
    /// seeded with the [`ADMINISTRATOR_NAME`] employee.
    ///
    /// Corruption halts the startup; the error names what is broken.
    pub async fn start(directory: impl Into<PathBuf>) -> Result<Self, DatabaseCorrupted> {
        let directory = directory.into();
        if disk::has_existing_database(&directory).await? {
            let restored = disk::restore(&directory).await.inspect_err(|err| {
                tracing::error!(
                    directory = %directory.display(),
                    %err,
                    "database is corrupted, refusing to start"
                );
            })?;
            tracing::info!(directory = %directory.display(), "restored the store from disk");
            Ok(Self::from_snapshot(
                restored,
                Some(DiskPersistence::new(directory)),
            ))
        } else {
            disk::prepare_fresh_directory(&directory).await?;
            let store = Self::from_snapshot(
                StoreSnapshot::default(),
                Some(DiskPersistence::new(directory)),
            );
            let administrator = EmployeeName::new(ADMINISTRATOR_NAME)
                .map_err(|err| DatabaseCorrupted::Bootstrap(err.into()))?;
            store
                .add_new_employee(administrator)
                .await
                .map_err(DatabaseCorrupted::Bootstrap)?;
            Ok(store)
        }
    }

    fn from_snapshot(snapshot: StoreSnapshot, disk: Option<DiskPersistence>) -> Self {
        Self {
            employees: RwLock::new(Roster::seeded(snapshot.employees, |e| e.id.value())),
            projects: RwLock::new(Roster::seeded(snapshot.projects, |p| p.id.value())),
            users: RwLock::new(Roster::seeded(snapshot.users, |u| u.id.value())),
            sessions: RwLock::new(snapshot.sessions),
            time_entries: RwLock::new(
                snapshot
                    .time_entries
                    .into_iter()
                    .map(|(employee, days)| (employee, Timeline::seeded(days)))
                    .collect(),
            ),
            disk,
        }
    }

    pub async fn add_new_employee(&self, name: EmployeeName) -> Result<EmployeeId, StoreError> {
        let mut roster = self.employees.write().await;
        let id = EmployeeId::new(roster.allocate())?;
        roster.members.insert(Employee { id, name });
        if let Some(disk) = &self.disk {
            disk.queue_employees(&roster.members).await?;
        }
        Ok(id)
    }

    pub async fn add_new_project(&self, name: ProjectName) -> Result<ProjectId, StoreError> {
        let mut roster = self.projects.write().await;
        let id = ProjectId::new(roster.allocate())?;
        roster.members.insert(Project { id, name });
        if let Some(disk) = &self.disk {
            disk.queue_projects(&roster.members).await?;
        }
        Ok(id)
    }

    pub async fn add_new_user(
        &self,
        name: UserName,
        hash: String,
        salt: String,
        employee_id: Option<EmployeeId>,
    ) -> Result<UserId, StoreError> {
        let mut roster = self.users.write().await;
        let id = UserId::new(roster.allocate())?;
        roster.members.insert(User {
            id,
            name,
            hash,
            salt,
            employee_id,
        });
        if let Some(disk) = &self.disk {
            disk.queue_users(&roster.members).await?;
        }
        Ok(id)
    }

    /// Inserts a time entry under its employee and day, assigning the next
    /// id within that employee's timeline, and rewrites only that
    /// employee's file for that month.
    pub async fn add_time_entry(&self, new_entry: NewTimeEntry) -> Result<TimeEntry, StoreError> {
        let mut ledger = self.time_entries.write().await;
        let timeline = ledger
            .entry(new_entry.employee.clone())
            .or_insert_with(Timeline::new);
        let id = TimeEntryId::new(timeline.allocate())?;
        let entry = TimeEntry {
            id,
            employee: new_entry.employee,
            project: new_entry.project,
            minutes: new_entry.minutes,
            date: new_entry.date,
            details: new_entry.details,
        };
        timeline
            .days
            .entry(entry.date)
            .or_default()
            .insert(entry.clone());
        if let Some(disk) = &self.disk {
            let month = timeline.entries_in_month_of(entry.date);
            disk.queue_month_of_time_entries(entry.employee.id.value(), entry.date, month)
                .await?;
        }
        Ok(entry)
    }

    /// Total minutes the employee recorded on the date. Asking about an
    /// employee the store has never seen is a contract violation.
    pub async fn minutes_recorded_on_date(
        &self,
        employee: &Employee,
        date: NaiveDate,
    ) -> Result<u32, StoreError> {
        if !self.employees.read().await.members.contains(employee) {
            return Err(StoreError::EmployeeNotRegistered {
                name: employee.name.to_string(),
            });
        }
        let ledger = self.time_entries.read().await;
        Ok(ledger
            .get(employee)
            .map(|timeline| timeline.minutes_on(date))
            .unwrap_or(0))
    }

    pub async fn all_time_entries_for_employee(
        &self,
        employee: &Employee,
    ) -> HashMap<NaiveDate, HashSet<TimeEntry>> {
        self.time_entries
            .read()
            .await
            .get(employee)
            .map(|timeline| timeline.days.clone())
            .unwrap_or_default()
    }

    pub async fn all_time_entries_for_employee_on_date(
        &self,
        employee: &Employee,
        date: NaiveDate,
    ) -> HashSet<TimeEntry> {
        self.time_entries
            .read()
            .await
            .get(employee)
            .and_then(|timeline| timeline.days.get(&date))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn employee_by_id(&self, id: EmployeeId) -> Option<Employee> {
        self.employees
            .read()
            .await
            .members
            .iter()
            .find(|employee| employee.id == id)
            .cloned()
    }

    pub async fn project_by_id(&self, id: ProjectId) -> Option<Project> {
        self.projects
            .read()
            .await
            .members
            .iter()
            .find(|project| project.id == id)
            .cloned()
    }

    pub async fn project_by_name(&self, name: &ProjectName) -> Option<Project> {
        self.projects
            .read()
            .await
            .members
            .iter()
            .find(|project| &project.name == name)
            .cloned()
    }

    pub async fn user_by_name(&self, name: &UserName) -> Option<User> {
        self.users
            .read()
            .await
            .members
            .iter()
            .find(|user| &user.name == name)
            .cloned()
    }

    pub async fn all_employees(&self) -> Vec<Employee> {
        let mut employees: Vec<_> = self.employees.read().await.members.iter().cloned().collect();
        employees.sort_by_key(|employee| employee.id);
        employees
    }

    pub async fn all_projects(&self) -> Vec<Project> {
        let mut projects: Vec<_> = self.projects.read().await.members.iter().cloned().collect();
        projects.sort_by_key(|project| project.id);
        projects
    }

    pub async fn all_users(&self) -> Vec<User> {
        let mut users: Vec<_> = self.users.read().await.members.iter().cloned().collect();
        users.sort_by_key(|user| user.id);
        users
    }

    /// Records a session under its token. Creating a second session for a
    /// token that is already taken is a contract violation; the
    /// one-session-per-user rule is the authentication workflow's to keep.
    ///
    /// The creation instant is kept at millisecond precision, the same
    /// precision the disk format stores.
    pub async fn add_new_session(
        &self,
        token: impl Into<String>,
        user: User,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let token = token.into();
        let created_at = created_at.trunc_subsecs(3);
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&token) {
            return Err(StoreError::DuplicateSession {
                user: user.name.to_string(),
            });
        }
        sessions.insert(token, Session { user, created_at });
        if let Some(disk) = &self.disk {
            disk.queue_sessions(&sessions).await?;
        }
        Ok(())
    }

    pub async fn user_by_session_token(&self, token: &str) -> Option<User> {
        self.sessions
            .read()
            .await
            .get(token)
            .map(|session| session.user.clone())
    }

    /// Removing a session that does not exist is a contract violation.
    pub async fn remove_session_by_token(&self, token: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(token).is_none() {
            return Err(StoreError::SessionNotFound {
                token: token.to_string(),
            });
        }
        if let Some(disk) = &self.disk {
            disk.queue_sessions(&sessions).await?;
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            employees: self.employees.read().await.members.clone(),
            projects: self.projects.read().await.members.clone(),
            users: self.users.read().await.members.clone(),
            sessions: self.sessions.read().await.clone(),
            time_entries: self
                .time_entries
                .read()
                .await
                .iter()
                .map(|(employee, timeline)| (employee.clone(), timeline.days.clone()))
                .collect(),
        }
    }

    /// A fully independent in-memory copy: every entity is freshly owned,
    /// so mutating the copy never shows through in the original.
    pub async fn copy(&self) -> MemoryStore {
        Self::from_snapshot(self.snapshot().await, None)
    }

    pub async fn same_contents(&self, other: &MemoryStore) -> bool {
        self.snapshot().await == other.snapshot().await
    }

    /// Stops accepting writes and blocks until every queued disk write has
    /// drained. Write operations attempted afterwards fail with
    /// [`StoreError::Stopped`].
    pub async fn stop(&self) {
        if let Some(disk) = &self.disk {
            disk.stop().await;
        }
    }
}
