//! Error types for taskmine-core

use std::fmt::Write;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a suggested command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for taskmine-core
#[derive(Error, Debug)]
pub enum Error {
    /// Durable store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Runtime errors (task join failures, closed channels)
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Storage(err) => Some(err.remediation()),
            Self::Config(err) => Some(err.remediation()),
            Self::Io(_) => Some(
                Remediation::new("Check filesystem permissions and paths, then retry.")
                    .alternative("Verify the data directory exists and is writable."),
            ),
            Self::Json(_) => Some(
                Remediation::new("Validate the JSON input and retry.")
                    .alternative("Each ingested line must be one complete event object."),
            ),
            Self::Runtime(_) => None,
        }
    }
}

/// Durable store errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database could not be opened or its schema could not be prepared
    #[error("Failed to open event store at {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// A previous open failed; the store stays failed until rebuilt
    #[error("Event store is in the failed state: {0}")]
    Failed(String),

    /// Database schema is newer than this build understands
    #[error("Event store schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    /// SQLite errors
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Record could not be encoded for storage
    #[error("Failed to encode record: {0}")]
    Encode(String),

    /// Stored record could not be decoded
    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: i64, reason: String },

    /// Blocking database task failed to complete
    #[error("Store task failed: {0}")]
    Join(String),

    /// Integer conversion overflow
    #[error("Integer conversion overflow for field: {0}")]
    IntegerOverflow(&'static str),
}

impl StorageError {
    /// Remediation guidance for storage failures.
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::OpenFailed { path, .. } => Remediation::new(
                "Make sure the database directory exists and is writable.",
            )
            .command("Inspect", format!("ls -la {path}"))
            .alternative("Point storage.db_path (or --db) at a writable location."),
            Self::Failed(_) => Remediation::new(
                "The store failed to open earlier in this process; restart to retry.",
            ),
            Self::SchemaTooNew { .. } => Remediation::new(
                "This database was written by a newer taskmine; upgrade the binary.",
            )
            .alternative("Use a separate db_path for the older binary."),
            Self::Sqlite(_) | Self::Join(_) => Remediation::new(
                "Retry the operation; another process may hold the write lock.",
            )
            .command("Status", "tm stats"),
            Self::Encode(_) => Remediation::new(
                "The record could not be serialized; check the producer's payload.",
            ),
            Self::CorruptRecord { .. } | Self::IntegerOverflow(_) => Remediation::new(
                "The event log contains an unreadable row; back up the database file.",
            ),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    /// Config file could not be parsed
    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    /// Config failed validation
    #[error("Invalid config: {0}")]
    ValidationError(String),

    /// Config could not be serialized
    #[error("Failed to render config: {0}")]
    SerializeFailed(String),
}

impl ConfigError {
    /// Remediation guidance for configuration failures.
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::ReadFailed { path, .. } => Remediation::new("Check that the config file exists.")
                .command("Inspect", format!("cat {path}"))
                .alternative("Unset TASKMINE_CONFIG to fall back to defaults."),
            Self::ParseFailed(_) => Remediation::new("Fix the TOML syntax in taskmine.toml.")
                .command("Show defaults", "tm config --default"),
            Self::ValidationError(_) => {
                Remediation::new("Adjust the reported setting to a positive value.")
                    .command("Show effective config", "tm config")
            }
            Self::SerializeFailed(_) => Remediation::new("Report this as a bug."),
        }
    }
}
