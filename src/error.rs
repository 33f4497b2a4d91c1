//! Fatal error taxonomy for a declaration extraction run
//!
//! Every variant aborts the run. The only soft condition in the pipeline
//! (an entry point missing from the syscall tables) never reaches this type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that terminate a declaration extraction run
#[derive(Error, Debug)]
pub enum DeclextractError {
    #[error("failed to load compilation database {path}: {message}")]
    CompileDb { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read syscall table {path}: {source}")]
    SyscallTable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}: {message}")]
    Extraction { file: String, message: String },

    #[error("{file}: parsing error: {message}")]
    Parse { file: String, message: String },

    #[error("{text:?} has wrong number of fields")]
    MalformedAnnotation { text: String },

    #[error("interface {id} has different identifying consts: {incoming} vs {previous}")]
    IdentityConflict {
        id: String,
        incoming: String,
        previous: String,
    },

    #[error("failed to typecheck descriptions: {0}")]
    TypeCheck(String),

    #[error("invalid subsystem rules: {0}")]
    SubsystemRules(String),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for declaration extraction operations
pub type Result<T> = std::result::Result<T, DeclextractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_conflict_message_names_interface() {
        let err = DeclextractError::IdentityConflict {
            id: "IOCTL/FOO".to_string(),
            incoming: "FOO_A".to_string(),
            previous: "FOO_B".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "interface IOCTL/FOO has different identifying consts: FOO_A vs FOO_B"
        );
    }

    #[test]
    fn test_malformed_annotation_quotes_text() {
        let err = DeclextractError::MalformedAnnotation {
            text: "INTERFACE: IOCTL".to_string(),
        };
        assert!(err.to_string().starts_with("\"INTERFACE: IOCTL\""));
    }
}
