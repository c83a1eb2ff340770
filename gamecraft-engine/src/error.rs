//! Engine error types
//!
//! Re-exports gamecraft-error and provides engine-specific conveniences.

pub use gamecraft_error::{Error, ErrorKind, ErrorStatus, Result};

/// Create a PolicyViolation error listing every violated rule
pub fn policy_violation(rules: &[String]) -> Error {
    Error::new(ErrorKind::PolicyViolation, rules.join("; "))
        .with_context("rules", rules.len().to_string())
}

/// Create a CompileFailed error, with the source position when known
pub fn compile_failed(message: impl Into<String>, position: Option<(usize, usize)>) -> Error {
    let err = Error::new(ErrorKind::CompileFailed, message);
    match position {
        Some((line, column)) => err
            .with_context("line", line.to_string())
            .with_context("column", column.to_string()),
        None => err,
    }
}

/// Create a SandboxFailed error
pub fn sandbox_failed(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::SandboxFailed, message)
}

/// Create an EditFailed error for one operation of a batch
pub fn edit_failed(index: usize, message: impl Into<String>) -> Error {
    Error::new(ErrorKind::EditFailed, message).with_context("edit", index.to_string())
}

/// Create an IoFailed error
pub fn io_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::IoFailed, message)
}

/// Create a SerializationFailed error
pub fn serialization_error(message: impl Into<String>) -> Error {
    Error::serialization_failed(message)
}

/// Create a StorageFailed error
pub fn storage_failed(reason: impl Into<String>) -> Error {
    Error::storage_failed(reason)
}
