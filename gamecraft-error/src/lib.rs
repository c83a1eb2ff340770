//! # gamecraft-error
//!
//! Unified error handling for gamecraft, the learning-game generation pipeline.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., DesignFailed, PolicyViolation)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use gamecraft_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::DesignFailed, "model returned no rounds")
//!         .with_operation("pipeline::design")
//!         .with_context("run_id", "3f2a")
//!         .with_context("subject", "chemistry"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, gamecraft_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using gamecraft Error
pub type Result<T> = std::result::Result<T, Error>;
