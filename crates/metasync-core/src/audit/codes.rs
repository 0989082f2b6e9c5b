//! Audit message catalogue.

use std::fmt;

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuditSeverity {
    /// Informational.
    Info,
    /// Degraded but continuing.
    Warning,
    /// An operation failed.
    Error,
    /// An unexpected condition that needs investigation.
    Exception,
}

impl fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditSeverity::Info => write!(f, "INFO"),
            AuditSeverity::Warning => write!(f, "WARNING"),
            AuditSeverity::Error => write!(f, "ERROR"),
            AuditSeverity::Exception => write!(f, "EXCEPTION"),
        }
    }
}

/// Structured codes recorded with every audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditCode {
    /// Listing databases from the source failed.
    ErrorReadingDatabases,
    /// Listing schemas from the source failed.
    ErrorReadingSchemas,
    /// Listing tables from the source failed.
    ErrorReadingTables,
    /// Listing views from the source failed.
    ErrorReadingViews,
    /// Listing columns from the source failed.
    ErrorReadingColumns,
    /// Listing foreign keys from the source failed.
    ErrorReadingForeignKeys,
    /// A collaborator rejected a parameter.
    InvalidParameter,
    /// The metadata repository reported a failure.
    RepositoryFailure,
    /// The connector is not authorized for an operation.
    NotAuthorized,
    /// Catch-all for anything unclassified.
    UnexpectedError,
    /// A refresh was requested while another was running.
    CycleInProgress,
}

impl AuditCode {
    /// Stable message identifier.
    pub fn id(&self) -> &'static str {
        match self {
            AuditCode::ErrorReadingDatabases => "METASYNC-0001",
            AuditCode::ErrorReadingSchemas => "METASYNC-0002",
            AuditCode::ErrorReadingTables => "METASYNC-0003",
            AuditCode::ErrorReadingViews => "METASYNC-0004",
            AuditCode::ErrorReadingColumns => "METASYNC-0005",
            AuditCode::ErrorReadingForeignKeys => "METASYNC-0006",
            AuditCode::InvalidParameter => "METASYNC-0007",
            AuditCode::RepositoryFailure => "METASYNC-0008",
            AuditCode::NotAuthorized => "METASYNC-0009",
            AuditCode::UnexpectedError => "METASYNC-0010",
            AuditCode::CycleInProgress => "METASYNC-0011",
        }
    }

    /// Severity recorded with the code.
    pub fn severity(&self) -> AuditSeverity {
        match self {
            AuditCode::UnexpectedError => AuditSeverity::Exception,
            AuditCode::CycleInProgress => AuditSeverity::Warning,
            _ => AuditSeverity::Error,
        }
    }

    /// Human readable description for an operation.
    pub fn describe(&self, operation: &str) -> String {
        match self {
            AuditCode::ErrorReadingDatabases => {
                "the connector could not read the databases from the source".to_string()
            }
            AuditCode::ErrorReadingSchemas => {
                "the connector could not read the schemas of a database".to_string()
            }
            AuditCode::ErrorReadingTables => {
                "the connector could not read the tables of a schema".to_string()
            }
            AuditCode::ErrorReadingViews => {
                "the connector could not read the views of a schema".to_string()
            }
            AuditCode::ErrorReadingColumns => {
                "the connector could not read the columns of a table".to_string()
            }
            AuditCode::ErrorReadingForeignKeys => {
                "the connector could not read the foreign keys of a table".to_string()
            }
            AuditCode::InvalidParameter => {
                format!("an invalid parameter was passed during {}", operation)
            }
            AuditCode::RepositoryFailure => {
                format!("the metadata repository failed during {}", operation)
            }
            AuditCode::NotAuthorized => {
                format!("the connector is not authorized to perform {}", operation)
            }
            AuditCode::UnexpectedError => {
                format!("an unexpected error occurred during {}", operation)
            }
            AuditCode::CycleInProgress => {
                "a refresh was requested while another refresh was still running".to_string()
            }
        }
    }
}

impl fmt::Display for AuditCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_ids() {
        assert_eq!(AuditCode::ErrorReadingDatabases.id(), "METASYNC-0001");
        assert_eq!(AuditCode::CycleInProgress.to_string(), "METASYNC-0011");
    }

    #[test]
    fn test_severity() {
        assert_eq!(AuditCode::UnexpectedError.severity(), AuditSeverity::Exception);
        assert_eq!(AuditCode::ErrorReadingTables.severity(), AuditSeverity::Error);
        assert!(AuditSeverity::Warning < AuditSeverity::Error);
    }

    #[test]
    fn test_describe_mentions_operation() {
        let text = AuditCode::RepositoryFailure.describe("create_table");
        assert!(text.contains("create_table"));
    }
}
