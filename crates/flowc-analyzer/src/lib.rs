#![forbid(unsafe_code)]
//! flowc-analyzer: resolves declarative metadata attached to operators.
//!
//! Design:
//! - The compiler never reflects over user code. Declarations are reached
//!   through an injected [`LoadContext`]; [`DeclarationTable`] is the
//!   in-memory implementation fed by the batch description loader.
//! - Family protocols (currently the master-join family) are pure functions
//!   over an operator plus a load context.

pub mod context;
pub mod master_join;

pub use context::{DeclarationTable, LoadContext, RoutineInfo};
pub use master_join::{is_supported, resolve_selection, MasterJoinKind};
