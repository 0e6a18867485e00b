// Disk round-trip behavior: a stopped store, read back from its directory,
// must equal the store that wrote it, and files that were never written
// must read back as empty collections rather than as corruption.

mod support;

use anyhow::Result;
use punchclock::core::employee::EmployeeId;
use punchclock::persistence::errors::StoreError;
use punchclock::persistence::store::{ADMINISTRATOR_NAME, MemoryStore};
use tempfile::tempdir;

#[tokio::test]
async fn it_should_bootstrap_a_fresh_database_with_an_administrator() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("db");

    let store = MemoryStore::start(&db_path).await?;

    let employees = store.all_employees().await;
    assert_eq!(employees.len(), 1);
    assert_eq!(employees[0].name.as_str(), ADMINISTRATOR_NAME);
    assert_eq!(employees[0].id.value(), 1);
    assert!(db_path.join("version.txt").exists());
    assert!(db_path.join("timeentries").is_dir());
    store.stop().await;
    Ok(())
}

#[tokio::test]
async fn it_should_bootstrap_into_an_existing_empty_directory() -> Result<()> {
    let dir = tempdir()?;

    let store = MemoryStore::start(dir.path()).await?;
    store.stop().await;

    assert!(dir.path().join("version.txt").exists());
    Ok(())
}

#[tokio::test]
async fn it_should_round_trip_an_administrator_only_store() -> Result<()> {
    let dir = tempdir()?;
    let store = MemoryStore::start(dir.path()).await?;
    store.stop().await;

    let restored = MemoryStore::start(dir.path()).await?;

    assert_eq!(store.snapshot().await, restored.snapshot().await);
    restored.stop().await;
    Ok(())
}

#[tokio::test]
async fn it_should_round_trip_a_fully_populated_store() -> Result<()> {
    let dir = tempdir()?;
    let store = MemoryStore::start(dir.path()).await?;
    let employee_id = store
        .add_new_employee(support::employee_name("DefaultEmployee"))
        .await?;
    let employee = store.employee_by_id(employee_id).await.unwrap();
    store
        .add_new_user(
            support::user_name("DefaultUser"),
            "myhash".to_string(),
            "12345".to_string(),
            Some(employee_id),
        )
        .await?;
    let user = store
        .user_by_name(&support::user_name("DefaultUser"))
        .await
        .unwrap();
    let project_id = store
        .add_new_project(support::project_name("Default_Project"))
        .await?;
    let project = store.project_by_id(project_id).await.unwrap();
    store
        .add_new_session(support::session_token(), user, support::login_time())
        .await?;
    store
        .add_time_entry(support::new_time_entry(
            &employee,
            &project,
            60,
            support::june_day(),
            "I was lazing\non a sunday afternoon ½",
        ))
        .await?;
    store
        .add_time_entry(support::new_time_entry(
            &employee,
            &project,
            195,
            support::june_day(),
            "",
        ))
        .await?;
    store
        .add_time_entry(support::new_time_entry(
            &employee,
            &project,
            120,
            support::july_day(),
            "back at it",
        ))
        .await?;
    store.stop().await;

    // entries span two months, so the employee gets one file per month
    let employee_dir = dir.path().join("timeentries").join("2");
    assert!(employee_dir.join("2020_6.db").exists());
    assert!(employee_dir.join("2020_7.db").exists());
    assert!(!dir.path().join("timeentries").join("1").exists());

    let restored = MemoryStore::start(dir.path()).await?;
    assert_eq!(store.snapshot().await, restored.snapshot().await);
    restored.stop().await;
    Ok(())
}

#[tokio::test]
async fn it_should_round_trip_a_user_without_an_employee() -> Result<()> {
    let dir = tempdir()?;
    let store = MemoryStore::start(dir.path()).await?;
    store
        .add_new_user(
            support::user_name("DefaultUser"),
            "myhash".to_string(),
            "12345".to_string(),
            None,
        )
        .await?;
    store.stop().await;

    let restored = MemoryStore::start(dir.path()).await?;

    assert_eq!(store.snapshot().await, restored.snapshot().await);
    let user = restored
        .user_by_name(&support::user_name("DefaultUser"))
        .await
        .unwrap();
    assert_eq!(user.employee_id, None);
    restored.stop().await;
    Ok(())
}

/// Session creation instants survive the disk format even when the caller
/// hands over a timestamp with more than millisecond precision.
#[tokio::test]
async fn it_should_round_trip_a_session_created_with_full_precision() -> Result<()> {
    let dir = tempdir()?;
    let store = MemoryStore::start(dir.path()).await?;
    store
        .add_new_user(
            support::user_name("DefaultUser"),
            "myhash".to_string(),
            "12345".to_string(),
            None,
        )
        .await?;
    let user = store
        .user_by_name(&support::user_name("DefaultUser"))
        .await
        .unwrap();
    store
        .add_new_session(support::session_token(), user, chrono::Utc::now())
        .await?;
    store.stop().await;

    let restored = MemoryStore::start(dir.path()).await?;

    assert_eq!(store.snapshot().await, restored.snapshot().await);
    restored.stop().await;
    Ok(())
}

/// A restored store must look exactly like one built by replaying the same
/// calls purely in memory.
#[tokio::test]
async fn it_should_match_an_in_memory_replay_of_the_same_calls() -> Result<()> {
    let dir = tempdir()?;
    let on_disk = MemoryStore::start(dir.path()).await?;
    let in_memory = MemoryStore::in_memory();
    in_memory
        .add_new_employee(support::employee_name(ADMINISTRATOR_NAME))
        .await?;

    for store in [&on_disk, &in_memory] {
        let employee_id = store
            .add_new_employee(support::employee_name("DefaultEmployee"))
            .await?;
        let employee = store.employee_by_id(employee_id).await.unwrap();
        let project_id = store
            .add_new_project(support::project_name("Default_Project"))
            .await?;
        let project = store.project_by_id(project_id).await.unwrap();
        store
            .add_time_entry(support::new_time_entry(
                &employee,
                &project,
                60,
                support::june_day(),
                "same on both sides",
            ))
            .await?;
    }
    on_disk.stop().await;

    let restored = MemoryStore::start(dir.path()).await?;
    assert_eq!(restored.snapshot().await, in_memory.snapshot().await);
    restored.stop().await;
    Ok(())
}

/// No user ever registered, so no users or sessions file was written.
/// That is history, not corruption.
#[tokio::test]
async fn it_should_treat_absent_users_and_sessions_files_as_empty() -> Result<()> {
    let dir = tempdir()?;
    let store = MemoryStore::start(dir.path()).await?;
    let employee_id = store
        .add_new_employee(support::employee_name("DefaultEmployee"))
        .await?;
    let employee = store.employee_by_id(employee_id).await.unwrap();
    let project_id = store
        .add_new_project(support::project_name("Default_Project"))
        .await?;
    let project = store.project_by_id(project_id).await.unwrap();
    store
        .add_time_entry(support::new_time_entry(
            &employee,
            &project,
            60,
            support::june_day(),
            "",
        ))
        .await?;
    store.stop().await;

    assert!(!dir.path().join("users.db").exists());
    assert!(!dir.path().join("sessions.db").exists());

    let restored = MemoryStore::start(dir.path()).await?;
    assert_eq!(store.snapshot().await, restored.snapshot().await);
    restored.stop().await;
    Ok(())
}

#[tokio::test]
async fn it_should_treat_an_absent_projects_file_as_empty() -> Result<()> {
    let dir = tempdir()?;
    let store = MemoryStore::start(dir.path()).await?;
    store
        .add_new_user(
            support::user_name("DefaultUser"),
            "myhash".to_string(),
            "12345".to_string(),
            None,
        )
        .await?;
    let user = store
        .user_by_name(&support::user_name("DefaultUser"))
        .await
        .unwrap();
    store
        .add_new_session(support::session_token(), user, support::login_time())
        .await?;
    store.stop().await;

    assert!(!dir.path().join("projects.db").exists());

    let restored = MemoryStore::start(dir.path()).await?;
    assert_eq!(store.snapshot().await, restored.snapshot().await);
    restored.stop().await;
    Ok(())
}

/// With no time entries on disk, a deleted employees file reads back as an
/// empty collection; nothing references the missing employees.
#[tokio::test]
async fn it_should_treat_a_deleted_employees_file_as_an_empty_collection() -> Result<()> {
    let dir = tempdir()?;
    let store = MemoryStore::start(dir.path()).await?;
    store
        .add_new_user(
            support::user_name("DefaultUser"),
            "myhash".to_string(),
            "12345".to_string(),
            None,
        )
        .await?;
    let user = store
        .user_by_name(&support::user_name("DefaultUser"))
        .await
        .unwrap();
    store
        .add_new_project(support::project_name("Default_Project"))
        .await?;
    store
        .add_new_session(support::session_token(), user, support::login_time())
        .await?;
    store.stop().await;
    std::fs::remove_file(dir.path().join("employees.db"))?;

    let restored = MemoryStore::start(dir.path()).await?;

    assert!(restored.all_employees().await.is_empty());
    assert_eq!(restored.all_projects().await.len(), 1);
    assert_eq!(restored.all_users().await.len(), 1);
    restored.stop().await;
    Ok(())
}

#[tokio::test]
async fn it_should_resume_id_allocation_past_the_restored_ids() -> Result<()> {
    let dir = tempdir()?;
    let store = MemoryStore::start(dir.path()).await?;
    store
        .add_new_employee(support::employee_name("DefaultEmployee"))
        .await?;
    store.stop().await;

    let restored = MemoryStore::start(dir.path()).await?;
    let next = restored
        .add_new_employee(support::employee_name("AnotherEmployee"))
        .await?;

    assert_eq!(next, EmployeeId::new(3).unwrap());
    restored.stop().await;
    Ok(())
}

/// Once stopped, a store loudly refuses further writes instead of silently
/// dropping them.
#[tokio::test]
async fn it_should_reject_writes_after_stop() -> Result<()> {
    let dir = tempdir()?;
    let store = MemoryStore::start(dir.path()).await?;
    store.stop().await;

    let result = store
        .add_new_employee(support::employee_name("TooLate"))
        .await;

    assert_eq!(result, Err(StoreError::Stopped));
    Ok(())
}
