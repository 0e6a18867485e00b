#![allow(dead_code)]

// Helpers shared by the integration tests: canonical fixture values and a
// seeding routine that leaves a fully populated database on disk.

use std::path::Path;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use punchclock::core::employee::{Employee, EmployeeName};
use punchclock::core::project::{Project, ProjectName};
use punchclock::core::time_entry::{Details, Minutes, NewTimeEntry};
use punchclock::core::user::UserName;
use punchclock::persistence::store::MemoryStore;

/// Routes the store's tracing output through the test harness when
/// `RUST_LOG` asks for it. Safe to call from every test; only the first
/// call installs the subscriber.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn june_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 6, 25).unwrap()
}

pub fn july_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 7, 6).unwrap()
}

pub fn login_time() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_608_662_050_608).unwrap()
}

pub fn session_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn employee_name(value: &str) -> EmployeeName {
    EmployeeName::new(value).unwrap()
}

pub fn project_name(value: &str) -> ProjectName {
    ProjectName::new(value).unwrap()
}

pub fn user_name(value: &str) -> UserName {
    UserName::new(value).unwrap()
}

pub fn new_time_entry(
    employee: &Employee,
    project: &Project,
    minutes: u32,
    date: NaiveDate,
    details: &str,
) -> NewTimeEntry {
    NewTimeEntry {
        employee: employee.clone(),
        project: project.clone(),
        minutes: Minutes::new(minutes).unwrap(),
        date,
        details: Details::new(details).unwrap(),
    }
}

/// Bootstraps a database at `directory`, adds one of everything and stops
/// the store so all writes are on disk.
///
/// Leaves behind: the Administrator (employee 1), DefaultEmployee
/// (employee 2), DefaultUser (user 1, tied to employee 2), Default_Project
/// (project 1), one session for DefaultUser, and one June time entry for
/// employee 2 against project 1.
pub async fn seed_full_database(directory: &Path) -> MemoryStore {
    init_test_logging();
    let store = MemoryStore::start(directory).await.unwrap();
    let employee_id = store
        .add_new_employee(employee_name("DefaultEmployee"))
        .await
        .unwrap();
    let employee = store.employee_by_id(employee_id).await.unwrap();
    store
        .add_new_user(
            user_name("DefaultUser"),
            "myhash".to_string(),
            "12345".to_string(),
            Some(employee_id),
        )
        .await
        .unwrap();
    let user = store.user_by_name(&user_name("DefaultUser")).await.unwrap();
    let project_id = store
        .add_new_project(project_name("Default_Project"))
        .await
        .unwrap();
    let project = store.project_by_id(project_id).await.unwrap();
    store
        .add_new_session(session_token(), user, login_time())
        .await
        .unwrap();
    store
        .add_time_entry(new_time_entry(
            &employee,
            &project,
            60,
            june_day(),
            "I was lazing on a sunday afternoon",
        ))
        .await
        .unwrap();
    store.stop().await;
    store
}
