//! Batch-level orchestration and the failure policy.

use flowc_core::config::FailureMode;
use flowc_core::diagnostic::{Diagnostic, DiagnosticError, EntityRef};
use flowc_core::error::{Error, Result};
use tracing::{debug, info, info_span, warn};

use crate::context::{BatchProcessorContext, CompilerContext};
use crate::jobflow::{wrap_io, JobflowCompiler};
use crate::model::{Batch, BatchReference};
use crate::processor::CompilerTools;

#[derive(Debug)]
pub struct BatchCompiler {
    tools: CompilerTools,
}

impl BatchCompiler {
    pub fn new(tools: CompilerTools) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &CompilerTools {
        &self.tools
    }

    /// Compiles every jobflow in blocker order.
    ///
    /// Under [`FailureMode::FailFast`] the first failing jobflow ends the
    /// batch; under [`FailureMode::BestEffort`] the remaining jobflows are
    /// still compiled and every failure is returned together. The batch
    /// processor and `after_batch` run only when all jobflows succeeded.
    pub fn compile(&self, ctx: &mut CompilerContext, batch: &mut Batch) -> Result<BatchReference> {
        let span = info_span!("batch", batch = %batch.info.batch_id);
        let _guard = span.enter();
        let batch_entity = EntityRef::batch(&batch.info.batch_id);

        self.tools.participant.before_batch(ctx, batch)?;

        let order = batch.jobflow_order()?;
        let mode = ctx.config().failure_mode;
        let compiler = JobflowCompiler::new(&self.tools);
        let mut jobflows = Vec::with_capacity(order.len());
        let mut failures: Vec<Diagnostic> = Vec::new();

        let Batch { info, elements } = &mut *batch;
        for index in order {
            let Some(element) = elements.get_mut(index) else {
                continue;
            };
            let flow_entity = EntityRef::jobflow(&info.batch_id, &element.jobflow.flow_id);
            match compiler.compile(ctx, info, &mut element.jobflow) {
                Ok(reference) => {
                    info!(flow = %reference.flow_id, tasks = reference.tasks.len(), "jobflow compiled");
                    jobflows.push(reference);
                }
                Err(error) => {
                    let diagnostics = into_diagnostics(error, &flow_entity);
                    for d in &diagnostics {
                        // processor-reported errors already reached the sink
                        if !ctx.diagnostics().contains(d) {
                            ctx.report(d.clone());
                        }
                    }
                    failures.extend(diagnostics);
                    if mode == FailureMode::FailFast {
                        warn!(flow = %element.jobflow.flow_id, "jobflow failed; stopping (fail-fast)");
                        return Err(Error::Diagnostic(DiagnosticError::new(failures)));
                    }
                    warn!(flow = %element.jobflow.flow_id, "jobflow failed; continuing (best-effort)");
                }
            }
        }

        if !failures.is_empty() {
            return Err(Error::Diagnostic(DiagnosticError::new(failures)));
        }

        let mut reference = BatchReference {
            batch_id: batch.info.batch_id.clone(),
            jobflows,
            resources: ctx.resources().keys().cloned().collect(),
            diagnostics: ctx.diagnostics().to_vec(),
        };
        {
            let mut adapter = BatchProcessorContext::new(ctx, &batch.info);
            self.tools
                .batch_processor
                .process(&mut adapter, &reference)
                .map_err(|e| wrap_io(batch_entity.clone(), "batch", e))?;
        }
        reference.resources = ctx.resources().keys().cloned().collect();
        reference.diagnostics = ctx.diagnostics().to_vec();
        debug!(resources = reference.resources.len(), "batch processed");

        self.tools.participant.after_batch(ctx, batch, &reference)?;
        Ok(reference)
    }
}

/// The diagnostics describing a failed jobflow, each attributed to it.
fn into_diagnostics(error: Error, entity: &EntityRef) -> Vec<Diagnostic> {
    match error {
        Error::Diagnostic(inner) => inner
            .into_diagnostics()
            .into_iter()
            .map(|mut d| {
                if d.entity.is_none() {
                    d.entity = Some(entity.clone());
                }
                d
            })
            .collect(),
        other => vec![Diagnostic::error(other.to_string()).with_entity(entity.clone())],
    }
}
