//! Error kinds for gamecraft operations

use std::fmt;

/// The kind of error that occurred.
///
/// This enum categorizes errors to help callers write clear handling logic.
/// The orchestrator matches on ErrorKind to decide whether a failure is fatal
/// (design), recoverable through revision (build/parse/validation), or
/// terminal for the run (provider, storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Generation errors
    // =========================================================================
    /// The design step did not produce the minimally required spec fields
    DesignFailed,

    /// The build step did not produce a usable artifact
    BuildFailed,

    /// Failed to interpret model output as the expected payload
    ParseFailed,

    /// A structured config violated its renderer's schema rules
    ValidationFailed,

    /// The critic call failed or returned nothing usable
    CriticFailed,

    /// Iteration budget spent without a structurally valid candidate
    Exhausted,

    // =========================================================================
    // Sandbox errors
    // =========================================================================
    /// Component source violated the static policy
    PolicyViolation,

    /// Component source failed to compile
    CompileFailed,

    /// Component threw during the headless smoke render
    SandboxFailed,

    // =========================================================================
    // Edit errors
    // =========================================================================
    /// A proposed edit could not be applied
    EditFailed,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// Provider not available
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    /// Authentication with the provider failed
    AuthenticationFailed,

    // =========================================================================
    // Storage / IO errors
    // =========================================================================
    /// Storage operation failed
    StorageFailed,

    /// Serialization/deserialization failed
    SerializationFailed,

    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Generation
            ErrorKind::DesignFailed => "DesignFailed",
            ErrorKind::BuildFailed => "BuildFailed",
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::ValidationFailed => "ValidationFailed",
            ErrorKind::CriticFailed => "CriticFailed",
            ErrorKind::Exhausted => "Exhausted",

            // Sandbox
            ErrorKind::PolicyViolation => "PolicyViolation",
            ErrorKind::CompileFailed => "CompileFailed",
            ErrorKind::SandboxFailed => "SandboxFailed",

            // Edit
            ErrorKind::EditFailed => "EditFailed",

            // Inference
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",

            // Storage / IO
            ErrorKind::StorageFailed => "StorageFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
        )
    }

    /// Failures the revision loop can recover from by asking the model again
    pub fn is_revisable(&self) -> bool {
        matches!(
            self,
            ErrorKind::BuildFailed
                | ErrorKind::ParseFailed
                | ErrorKind::ValidationFailed
                | ErrorKind::PolicyViolation
                | ErrorKind::CompileFailed
                | ErrorKind::SandboxFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
