#![forbid(unsafe_code)]
//! flowc: the batch DSL compiler core.
//!
//! Re-exports the workspace crates under one name for integration tests
//! and benchmarks.

pub use flowc_analyzer as analyzer;
pub use flowc_compiler as compiler;
pub use flowc_core as core;
pub use flowc_graph as graph;
pub use flowc_optimizer as optimizer;
