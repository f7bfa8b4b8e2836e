//! Backend extension points.

use std::io;

use crate::context::{BatchProcessorContext, ExternalPortProcessorContext, JobflowProcessorContext};
use crate::model::{BatchReference, ExternalInputReference, ExternalOutputReference, Jobflow};
use crate::participant::{CompilerParticipant, CompositeParticipant};
use crate::plan::PlanBackend;

/// Turns a prepared jobflow graph into backend artifacts.
pub trait JobflowProcessor {
    fn process(&self, ctx: &mut JobflowProcessorContext<'_>, jobflow: &Jobflow) -> io::Result<()>;
}

/// Emits import/export artifacts for the ports registered by the jobflow
/// processor. Not invoked when no port was registered.
pub trait ExternalPortProcessor {
    fn process(
        &self,
        ctx: &mut ExternalPortProcessorContext<'_>,
        inputs: &[ExternalInputReference],
        outputs: &[ExternalOutputReference],
    ) -> io::Result<()>;
}

/// Emits batch-wide artifacts after every jobflow compiled.
pub trait BatchProcessor {
    fn process(&self, ctx: &mut BatchProcessorContext<'_>, batch: &BatchReference) -> io::Result<()>;
}

/// The pluggable pieces of one compiler.
pub struct CompilerTools {
    pub jobflow_processor: Box<dyn JobflowProcessor>,
    pub external_port_processor: Box<dyn ExternalPortProcessor>,
    pub batch_processor: Box<dyn BatchProcessor>,
    pub participant: Box<dyn CompilerParticipant>,
}

impl CompilerTools {
    pub fn new(
        jobflow_processor: impl JobflowProcessor + 'static,
        external_port_processor: impl ExternalPortProcessor + 'static,
        batch_processor: impl BatchProcessor + 'static,
    ) -> Self {
        Self {
            jobflow_processor: Box::new(jobflow_processor),
            external_port_processor: Box::new(external_port_processor),
            batch_processor: Box::new(batch_processor),
            participant: Box::new(CompositeParticipant::new()),
        }
    }

    /// The plan backend for every stage, without participants.
    pub fn plan_backend() -> Self {
        Self::new(PlanBackend, PlanBackend, PlanBackend)
    }

    pub fn with_participant(mut self, participant: impl CompilerParticipant + 'static) -> Self {
        self.participant = Box::new(participant);
        self
    }
}

impl std::fmt::Debug for CompilerTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerTools").finish_non_exhaustive()
    }
}
