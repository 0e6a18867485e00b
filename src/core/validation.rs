use thiserror::Error;

/// Rejections raised by the validated constructors of the domain types.
///
/// These surface both on the public write path (a caller handing us a bad
/// value) and on the deserialization path (a stored field that no longer
/// satisfies its constructor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("valid identifier values are 1 or above")]
    IdTooSmall,

    #[error("no way this company has more than 100 million employees")]
    EmployeeIdTooLarge,

    #[error("all employees must have a non-empty name")]
    EmptyEmployeeName,

    #[error("max size of an employee name is 30 characters")]
    EmployeeNameTooLong,

    #[error("all projects must have a non-empty name")]
    EmptyProjectName,

    #[error("all users must have a non-empty name")]
    EmptyUserName,

    #[error("a single time entry cannot exceed 1440 minutes, a full day")]
    MinutesOverDailyMaximum,

    #[error("max size of a time entry detail is 500 characters")]
    DetailsTooLong,
}
