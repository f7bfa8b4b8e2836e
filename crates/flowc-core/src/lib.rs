#![forbid(unsafe_code)]
//! flowc-core: shared vocabulary of the flowc batch DSL compiler.
//!
//! Design:
//! - Strongly-typed ids, declaration descriptions (classes, methods, values,
//!   annotations), diagnostics, configuration, and stable hashing.
//! - Pure data; no logging, no I/O. Higher crates map their failures into
//!   [`Error`] and report user-facing problems as [`Diagnostic`]s.

pub mod config;
pub mod description;
pub mod diagnostic;
pub mod error;
pub mod hash;
pub mod id;
pub mod location;
pub mod name;

pub use diagnostic::{Diagnostic, DiagnosticError, DiagnosticSink, EntityRef, Level};
pub use error::{Error, Result};

/// Compiler version recorded in compiled plans.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
