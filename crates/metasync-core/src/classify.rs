//! Failure classification.
//!
//! Every call into a source reader or target store that fails goes through
//! [`ErrorClassifier::classify`]. The classifier picks a category and audit
//! code, records one audit entry (unless the failure was already handled
//! further down), and wraps the cause into a [`SyncError`]. Whether the
//! caller then continues or aborts is decided at the call site.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::audit::{AuditCode, AuditEvent, AuditLogger};
use crate::catalog::Level;
use crate::error::CollaboratorError;

/// Category assigned to every classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The source catalog could not be read.
    SourceRead,
    /// The target store rejected or failed an operation.
    TargetWrite,
    /// The connector lacks permission.
    Authorization,
    /// A collaborator rejected a parameter.
    InvalidParameter,
    /// Already audited further down; wrapped without a second audit entry.
    AlreadyHandled,
    /// Anything else.
    Unexpected,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::SourceRead => "source read error",
            ErrorCategory::TargetWrite => "target write error",
            ErrorCategory::Authorization => "authorization error",
            ErrorCategory::InvalidParameter => "invalid parameter error",
            ErrorCategory::AlreadyHandled => "already handled error",
            ErrorCategory::Unexpected => "unexpected error",
        };
        f.write_str(name)
    }
}

/// The collaborator call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Reading one level's listing from the source.
    ReadSource(Level),
    /// Reading a table's foreign keys from the source.
    ReadForeignKeys,
    /// Listing target records of one level.
    ListTarget(Level),
    /// Creating a target record.
    Create(Level),
    /// Updating a target record.
    Update(Level),
    /// Deleting a target record.
    Delete(Level),
    /// Searching target columns by qualified name.
    FindColumns,
    /// Checking whether a relationship already exists.
    CheckRelationship,
    /// Creating a foreign-key relationship.
    CreateRelationship,
    /// Opening the source session or running the cycle itself.
    Refresh,
}

fn plural(level: Level) -> &'static str {
    match level {
        Level::Database => "databases",
        Level::Schema => "schemas",
        Level::Table => "tables",
        Level::View => "views",
        Level::Column => "columns",
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ReadSource(level) => write!(f, "read_{}", plural(*level)),
            Operation::ReadForeignKeys => write!(f, "read_foreign_keys"),
            Operation::ListTarget(level) => write!(f, "list_{}", plural(*level)),
            Operation::Create(level) => write!(f, "create_{}", level),
            Operation::Update(level) => write!(f, "update_{}", level),
            Operation::Delete(level) => write!(f, "delete_{}", level),
            Operation::FindColumns => write!(f, "find_columns"),
            Operation::CheckRelationship => write!(f, "check_relationship"),
            Operation::CreateRelationship => write!(f, "create_relationship"),
            Operation::Refresh => write!(f, "refresh"),
        }
    }
}

impl Operation {
    /// Audit code used when the source fails this operation.
    fn source_read_code(&self) -> AuditCode {
        match self {
            Operation::ReadSource(Level::Database) => AuditCode::ErrorReadingDatabases,
            Operation::ReadSource(Level::Schema) => AuditCode::ErrorReadingSchemas,
            Operation::ReadSource(Level::Table) => AuditCode::ErrorReadingTables,
            Operation::ReadSource(Level::View) => AuditCode::ErrorReadingViews,
            Operation::ReadSource(Level::Column) => AuditCode::ErrorReadingColumns,
            Operation::ReadForeignKeys => AuditCode::ErrorReadingForeignKeys,
            _ => AuditCode::UnexpectedError,
        }
    }
}

/// A failure waiting to be classified.
#[derive(Debug)]
pub enum Failure {
    /// Reported by the source reader.
    Source(CollaboratorError),
    /// Reported by the target store.
    Target(CollaboratorError),
    /// Already classified and audited further down.
    Handled(SyncError),
}

impl From<SyncError> for Failure {
    fn from(err: SyncError) -> Self {
        Failure::Handled(err)
    }
}

/// Connector-level error produced by classification.
#[derive(Debug, Error)]
#[error("{code} {operation}: {message}")]
pub struct SyncError {
    category: ErrorCategory,
    code: AuditCode,
    operation: String,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl SyncError {
    /// Create an error without an underlying cause.
    pub fn new(
        category: ErrorCategory,
        code: AuditCode,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code,
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Error returned when a refresh overlaps another one.
    pub fn cycle_in_progress() -> Self {
        let code = AuditCode::CycleInProgress;
        Self::new(
            ErrorCategory::Unexpected,
            code,
            Operation::Refresh.to_string(),
            code.describe("refresh"),
        )
    }

    /// Category of the failure.
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Audit code recorded for the failure.
    pub fn code(&self) -> AuditCode {
        self.code
    }

    /// Operation that failed.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Description of the failure.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Maps failures to categories and records them in the audit log.
#[derive(Clone)]
pub struct ErrorClassifier {
    audit: Arc<dyn AuditLogger>,
    cycle_id: String,
}

impl ErrorClassifier {
    /// Create a classifier recording into `audit` for one cycle.
    pub fn new(audit: Arc<dyn AuditLogger>, cycle_id: impl Into<String>) -> Self {
        Self {
            audit,
            cycle_id: cycle_id.into(),
        }
    }

    /// Identifier of the cycle this classifier records for.
    pub fn cycle_id(&self) -> &str {
        &self.cycle_id
    }

    /// Classify a failure, audit it once, and wrap it.
    pub fn classify(&self, operation: Operation, failure: impl Into<Failure>) -> SyncError {
        let op = operation.to_string();

        let (category, code, cause) = match failure.into() {
            Failure::Handled(inner) => {
                // The inner error already produced its audit entry.
                let message = format!("{} (already handled)", inner.message());
                return SyncError::new(ErrorCategory::AlreadyHandled, inner.code(), op, message)
                    .with_source(inner);
            }
            Failure::Source(err) => {
                let (category, code) = match &err {
                    CollaboratorError::Query(_) | CollaboratorError::Repository(_) => {
                        (ErrorCategory::SourceRead, operation.source_read_code())
                    }
                    CollaboratorError::NotAuthorized(_) => {
                        (ErrorCategory::Authorization, AuditCode::NotAuthorized)
                    }
                    CollaboratorError::InvalidParameter { .. } => {
                        (ErrorCategory::InvalidParameter, AuditCode::InvalidParameter)
                    }
                    CollaboratorError::Unexpected(_) => {
                        (ErrorCategory::Unexpected, AuditCode::UnexpectedError)
                    }
                };
                (category, code, err)
            }
            Failure::Target(err) => {
                let (category, code) = match &err {
                    CollaboratorError::Query(_) | CollaboratorError::Repository(_) => {
                        (ErrorCategory::TargetWrite, AuditCode::RepositoryFailure)
                    }
                    CollaboratorError::NotAuthorized(_) => {
                        (ErrorCategory::Authorization, AuditCode::NotAuthorized)
                    }
                    CollaboratorError::InvalidParameter { .. } => {
                        (ErrorCategory::InvalidParameter, AuditCode::InvalidParameter)
                    }
                    CollaboratorError::Unexpected(_) => {
                        (ErrorCategory::Unexpected, AuditCode::UnexpectedError)
                    }
                };
                (category, code, err)
            }
        };

        self.audit.log(AuditEvent::new(
            self.cycle_id.clone(),
            code,
            op.clone(),
            Some(cause.to_string()),
        ));

        let message = format!("{}: {}", code.describe(&op), cause);
        SyncError::new(category, code, op, message).with_source(cause)
    }
}

impl fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("cycle_id", &self.cycle_id)
            .finish_non_exhaustive()
    }
}
