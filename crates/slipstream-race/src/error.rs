//! Error types for the race layer.

/// Errors that can occur during race-session operations.
#[derive(Debug, thiserror::Error)]
pub enum RaceError {
    /// A race session is already running; only one exists at a time.
    #[error("a race is already active")]
    AlreadyActive,
}
