//! Unified error type for front-end operations and the monitor loop.
//!
//! `AppError` is returned by every operation the CLI exposes. It serializes as
//! `{ "kind": "...", "message": "..." }` so `--json` consumers can
//! distinguish error categories.

use serde::ser::SerializeStruct;

/// Application-level error.
///
/// Each variant maps to a distinct failure domain. In JSON output the operator
/// receives an object with `kind` (variant name) and `message`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Errors originating from SQLite / the quota store.
    #[error("{0}")]
    Database(String),

    /// Errors from the firewall tooling (iptables, ss).
    #[error("{0}")]
    Firewall(String),

    /// I/O and OS-level errors (filesystem, process spawning, terminal).
    #[error("{0}")]
    Io(String),

    /// Invalid or missing user input.
    #[error("{0}")]
    InvalidInput(String),
}

impl AppError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Firewall(_) => "Firewall",
            AppError::Io(_) => "Io",
            AppError::InvalidInput(_) => "InvalidInput",
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

// ---- From implementations for ergonomic error conversion ----

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Database(format!("{err:#}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<rustyline::error::ReadlineError> for AppError {
    fn from(err: rustyline::error::ReadlineError) -> Self {
        AppError::Io(err.to_string())
    }
}
