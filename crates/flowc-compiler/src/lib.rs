#![forbid(unsafe_code)]
//! flowc-compiler: orchestration of jobflow and batch compilation.
//!
//! Design:
//! - [`JobflowCompiler`] runs a fixed sequence per jobflow: graph preparation,
//!   `before_jobflow`, the jobflow processor, the external-port processor
//!   (only when ports were registered), `after_jobflow`.
//! - [`BatchCompiler`] wraps it with batch hooks, blocker ordering, and the
//!   fail-fast / best-effort policy.
//! - Backends plug in through the processor traits and return
//!   `std::io::Result`; failures are wrapped into diagnostics naming the
//!   batch, jobflow, and stage.
//! - `dsl::yaml` and `plan` are small reference collaborators: a YAML batch
//!   description loader and a backend that records JSON plans.

pub mod batch;
pub mod context;
pub mod dsl;
pub mod extension;
pub mod jobflow;
pub mod model;
pub mod participant;
pub mod plan;
pub mod processor;
pub mod sink;

pub use batch::BatchCompiler;
pub use context::{
    BatchProcessorContext, CompilerContext, ExternalPortProcessorContext, JobflowProcessorContext,
};
pub use dsl::yaml::{parse_batch_description, BatchDescription};
pub use extension::Extensions;
pub use jobflow::JobflowCompiler;
pub use model::{
    Batch, BatchElement, BatchInfo, BatchParameter, BatchReference, ExternalInputReference,
    ExternalOutputReference, Jobflow, JobflowReference, Phase, TaskReference,
};
pub use participant::{
    CompilerParticipant, CompositeParticipant, ImplicitParameterList,
    ImplicitParameterListParticipant,
};
pub use plan::PlanBackend;
pub use processor::{BatchProcessor, CompilerTools, ExternalPortProcessor, JobflowProcessor};
pub use sink::TracingSink;
