//! Batch and jobflow orchestration: hook order, port skipping, failure modes.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use flowc::compiler::{
    Batch, BatchCompiler, BatchInfo, BatchProcessor, BatchProcessorContext, BatchReference,
    CompilerContext, CompilerParticipant, CompilerTools, ExternalInputReference,
    ExternalOutputReference, ExternalPortProcessor, ExternalPortProcessorContext, Jobflow,
    JobflowProcessor, JobflowProcessorContext, JobflowReference, Phase,
};
use flowc::core::config::{CompilerConfig, FailureMode};
use flowc::core::description::ClassDescription;
use flowc::core::diagnostic::{EntityRef, Level};
use flowc::core::error::{Error, Result};
use flowc::core::location::Location;
use flowc::graph::OperatorGraph;
use flowc::analyzer::DeclarationTable;

type Log = Rc<RefCell<Vec<String>>>;

struct Recorder(Log);

impl JobflowProcessor for Recorder {
    fn process(&self, ctx: &mut JobflowProcessorContext<'_>, jobflow: &Jobflow) -> io::Result<()> {
        self.0.borrow_mut().push(format!("jobflow:{}", jobflow.flow_id));
        if jobflow.flow_id.starts_with("bad") {
            return Err(io::Error::new(io::ErrorKind::Other, "backend exploded"));
        }
        if !jobflow.flow_id.starts_with("noport") {
            ctx.add_external_input("in", None)?;
        }
        let location = Location::root("jobflows").append(&jobflow.flow_id).append("main");
        ctx.add_resource(location.clone(), Vec::new())?;
        ctx.add_task(Phase::Main, "recorder", location);
        Ok(())
    }
}

impl ExternalPortProcessor for Recorder {
    fn process(
        &self,
        ctx: &mut ExternalPortProcessorContext<'_>,
        inputs: &[ExternalInputReference],
        _: &[ExternalOutputReference],
    ) -> io::Result<()> {
        self.0
            .borrow_mut()
            .push(format!("ports:{}:{}", ctx.flow_id(), inputs.len()));
        Ok(())
    }
}

impl BatchProcessor for Recorder {
    fn process(&self, _: &mut BatchProcessorContext<'_>, batch: &BatchReference) -> io::Result<()> {
        self.0
            .borrow_mut()
            .push(format!("batch:{}", batch.jobflows.len()));
        Ok(())
    }
}

impl CompilerParticipant for Recorder {
    fn before_batch(&self, _: &mut CompilerContext, batch: &Batch) -> Result<()> {
        self.0.borrow_mut().push(format!("before_batch:{}", batch.info.batch_id));
        Ok(())
    }

    fn after_batch(&self, _: &mut CompilerContext, _: &Batch, _: &BatchReference) -> Result<()> {
        self.0.borrow_mut().push("after_batch".into());
        Ok(())
    }

    fn before_jobflow(&self, _: &mut CompilerContext, _: &BatchInfo, jobflow: &Jobflow) -> Result<()> {
        self.0.borrow_mut().push(format!("before_jobflow:{}", jobflow.flow_id));
        Ok(())
    }

    fn after_jobflow(
        &self,
        _: &mut CompilerContext,
        _: &BatchInfo,
        jobflow: &Jobflow,
        reference: &JobflowReference,
    ) -> Result<()> {
        self.0.borrow_mut().push(format!(
            "after_jobflow:{}:{}",
            jobflow.flow_id,
            reference.tasks.len()
        ));
        Ok(())
    }
}

fn tools(log: &Log) -> CompilerTools {
    CompilerTools::new(Recorder(log.clone()), Recorder(log.clone()), Recorder(log.clone()))
        .with_participant(Recorder(log.clone()))
}

fn batch(flows: &[(&str, &[&str])]) -> Batch {
    let mut batch = Batch::new(BatchInfo::new("nightly", ClassDescription::new("x.Nightly")));
    for (id, blockers) in flows {
        batch.add(
            Jobflow::new(*id, ClassDescription::new("x.Flow"), OperatorGraph::new()),
            blockers.iter().map(|b| b.to_string()).collect(),
        );
    }
    batch
}

fn context(mode: FailureMode) -> CompilerContext {
    let config = CompilerConfig {
        failure_mode: mode,
        ..CompilerConfig::default()
    };
    CompilerContext::new(config, DeclarationTable::new())
}

#[test]
fn test_hooks_and_processors_run_in_order() {
    let log = Log::default();
    let mut ctx = context(FailureMode::FailFast);
    // "second" is declared first but blocked by "first"
    let mut b = batch(&[("second", &["first"]), ("first", &[])]);
    let reference = BatchCompiler::new(tools(&log)).compile(&mut ctx, &mut b).unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "before_batch:nightly",
            "before_jobflow:first",
            "jobflow:first",
            "ports:first:1",
            "after_jobflow:first:1",
            "before_jobflow:second",
            "jobflow:second",
            "ports:second:1",
            "after_jobflow:second:1",
            "batch:2",
            "after_batch",
        ]
    );
    let ids: Vec<_> = reference.jobflows.iter().map(|j| j.flow_id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second"]);
    assert_eq!(reference.resources.len(), 2);
}

#[test]
fn test_port_processor_skipped_without_ports() {
    let log = Log::default();
    let mut ctx = context(FailureMode::FailFast);
    let mut b = batch(&[("noport", &[])]);
    BatchCompiler::new(tools(&log)).compile(&mut ctx, &mut b).unwrap();
    assert!(!log.borrow().iter().any(|e| e.starts_with("ports:")));
}

#[test]
fn test_fail_fast_stops_at_first_failure() {
    let log = Log::default();
    let mut ctx = context(FailureMode::FailFast);
    let mut b = batch(&[("bad1", &[]), ("bad2", &[]), ("good", &[])]);
    let err = BatchCompiler::new(tools(&log)).compile(&mut ctx, &mut b).unwrap_err();

    let Error::Diagnostic(inner) = err else {
        panic!("expected diagnostics, got {err}");
    };
    assert_eq!(inner.diagnostics().len(), 1);
    let events = log.borrow();
    assert!(events.contains(&"jobflow:bad1".to_string()));
    assert!(!events.iter().any(|e| e == "jobflow:bad2" || e == "jobflow:good"));
    assert!(!events.iter().any(|e| e.starts_with("batch:") || e == "after_batch"));
}

#[test]
fn test_best_effort_collects_every_failure() {
    let log = Log::default();
    let mut ctx = context(FailureMode::BestEffort);
    let mut b = batch(&[("bad1", &[]), ("bad2", &[]), ("good", &[])]);
    let err = BatchCompiler::new(tools(&log)).compile(&mut ctx, &mut b).unwrap_err();

    let Error::Diagnostic(inner) = err else {
        panic!("expected diagnostics, got {err}");
    };
    assert_eq!(inner.diagnostics().len(), 2);
    assert!(log.borrow().contains(&"after_jobflow:good:1".to_string()));
    assert!(!log.borrow().iter().any(|e| e.starts_with("batch:")));
    assert_eq!(
        ctx.diagnostics()
            .iter()
            .filter(|d| d.level == Level::Error)
            .count(),
        2
    );
}

#[test]
fn test_backend_errors_name_stage_and_jobflow() {
    let log = Log::default();
    let mut ctx = context(FailureMode::FailFast);
    let mut b = batch(&[("bad", &[])]);
    let err = BatchCompiler::new(tools(&log)).compile(&mut ctx, &mut b).unwrap_err();
    let Error::Diagnostic(inner) = err else {
        panic!("expected diagnostics, got {err}");
    };
    let d = &inner.diagnostics()[0];
    assert_eq!(d.level, Level::Error);
    assert!(d.message.starts_with("error occurred while processing operator graph"));
    assert!(d.message.contains("backend exploded"));
    assert_eq!(d.entity, Some(EntityRef::jobflow("nightly", "bad")));
}

#[test]
fn test_cyclic_blockers_rejected_before_compiling() {
    let log = Log::default();
    let mut ctx = context(FailureMode::BestEffort);
    let mut b = batch(&[("a", &["b"]), ("b", &["a"])]);
    let err = BatchCompiler::new(tools(&log)).compile(&mut ctx, &mut b).unwrap_err();
    assert!(err.is_structural());
    assert!(!log.borrow().iter().any(|e| e.starts_with("jobflow:")));
}
