//! Per-jobflow orchestration.

use std::io;

use flowc_core::diagnostic::{Diagnostic, DiagnosticError, EntityRef};
use flowc_core::error::{Error, Result};
use tracing::{debug, info_span};

use crate::context::{CompilerContext, ExternalPortProcessorContext, JobflowProcessorContext, JobflowState};
use crate::model::{BatchInfo, Jobflow, JobflowReference};
use crate::processor::CompilerTools;

/// Wraps a backend failure into an ERROR diagnostic naming where it happened.
pub(crate) fn wrap_io(entity: EntityRef, stage: &str, source: io::Error) -> Error {
    Error::Diagnostic(DiagnosticError::single(
        Diagnostic::error(format!("error occurred while processing {stage}: {source}"))
            .with_entity(entity),
    ))
}

#[derive(Debug, Clone, Copy)]
pub struct JobflowCompiler<'t> {
    tools: &'t CompilerTools,
}

impl<'t> JobflowCompiler<'t> {
    pub fn new(tools: &'t CompilerTools) -> Self {
        Self { tools }
    }

    /// Compiles one jobflow.
    ///
    /// The graph is validated and (when enabled) flattened in place; the
    /// processors see the prepared graph.
    pub fn compile(
        &self,
        ctx: &mut CompilerContext,
        batch: &BatchInfo,
        jobflow: &mut Jobflow,
    ) -> Result<JobflowReference> {
        let span = info_span!("jobflow", batch = %batch.batch_id, flow = %jobflow.flow_id);
        let _guard = span.enter();
        let entity = EntityRef::jobflow(&batch.batch_id, &jobflow.flow_id);

        jobflow.graph.validate()?;
        if ctx.config().flatten {
            jobflow.graph.flatten()?;
            debug!(operators = jobflow.graph.len(), "flattened");
        }

        self.tools.participant.before_jobflow(ctx, batch, jobflow)?;

        let mut state = JobflowState::default();
        {
            let mut adapter = JobflowProcessorContext::new(ctx, batch, &jobflow.flow_id, &mut state);
            self.tools
                .jobflow_processor
                .process(&mut adapter, jobflow)
                .map_err(|e| wrap_io(entity.clone(), "operator graph", e))?;
        }
        debug!(tasks = state.tasks.len(), "operator graph processed");
        fail_on_errors(&mut state)?;

        if state.has_ports() {
            let inputs = state.inputs.clone();
            let outputs = state.outputs.clone();
            let mut adapter =
                ExternalPortProcessorContext::new(ctx, batch, &jobflow.flow_id, &mut state);
            self.tools
                .external_port_processor
                .process(&mut adapter, &inputs, &outputs)
                .map_err(|e| wrap_io(entity.clone(), "external I/Os", e))?;
            debug!(inputs = inputs.len(), outputs = outputs.len(), "external ports processed");
            fail_on_errors(&mut state)?;
        } else {
            debug!("no external ports; skipping external port processor");
        }

        let reference = JobflowReference {
            flow_id: jobflow.flow_id.clone(),
            tasks: state.tasks,
            plan_hash: state.plan_hash,
        };
        self.tools
            .participant
            .after_jobflow(ctx, batch, jobflow, &reference)?;
        Ok(reference)
    }
}

fn fail_on_errors(state: &mut JobflowState) -> Result<()> {
    if state.errors.is_empty() {
        return Ok(());
    }
    Err(Error::Diagnostic(DiagnosticError::new(std::mem::take(
        &mut state.errors,
    ))))
}
