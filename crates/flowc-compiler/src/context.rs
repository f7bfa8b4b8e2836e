//! Compiler context and the narrowed views handed to processors.

use std::any::Any;
use std::collections::BTreeMap;
use std::io;

use flowc_analyzer::LoadContext;
use flowc_core::config::CompilerConfig;
use flowc_core::diagnostic::{Diagnostic, DiagnosticSink, EntityRef, Level};
use flowc_core::hash::Hash256;
use flowc_core::location::Location;
use flowc_graph::{ExternalInputInfo, ExternalOutputInfo};
use flowc_optimizer::Optimizer;

use crate::extension::Extensions;
use crate::model::{BatchInfo, ExternalInputReference, ExternalOutputReference, Phase, TaskReference};
use crate::sink::TracingSink;

/// State shared by every stage of one compiler invocation.
pub struct CompilerContext {
    config: CompilerConfig,
    load_context: Box<dyn LoadContext>,
    optimizer: Optimizer,
    extensions: Extensions,
    resources: BTreeMap<Location, Vec<u8>>,
    sink: Box<dyn DiagnosticSink>,
    reported: Vec<Diagnostic>,
}

impl CompilerContext {
    /// A context with the standard optimizer, logging diagnostics via `tracing`.
    pub fn new(config: CompilerConfig, load_context: impl LoadContext + 'static) -> Self {
        let optimizer = Optimizer::new(config.estimator_options());
        Self {
            config,
            load_context: Box::new(load_context),
            optimizer,
            extensions: Extensions::new(),
            resources: BTreeMap::new(),
            sink: Box::new(TracingSink),
            reported: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn load_context(&self) -> &dyn LoadContext {
        self.load_context.as_ref()
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    pub fn register_extension<T: Any>(&mut self, value: T) -> Option<T> {
        self.extensions.register(value)
    }

    pub fn extension<T: Any>(&self) -> Option<&T> {
        self.extensions.get()
    }

    /// Stores a generated resource. Each location may be written once.
    pub fn add_resource(&mut self, location: Location, contents: Vec<u8>) -> io::Result<()> {
        if self.resources.contains_key(&location) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("resource already exists: {location}"),
            ));
        }
        self.resources.insert(location, contents);
        Ok(())
    }

    pub fn resource(&self, location: &Location) -> Option<&[u8]> {
        self.resources.get(location).map(Vec::as_slice)
    }

    pub fn resources(&self) -> &BTreeMap<Location, Vec<u8>> {
        &self.resources
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.reported.push(diagnostic.clone());
        self.sink.report(diagnostic);
    }

    /// Everything reported so far, in order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.reported
    }
}

impl std::fmt::Debug for CompilerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerContext")
            .field("config", &self.config)
            .field("optimizer", &self.optimizer)
            .field("extensions", &self.extensions)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("reported", &self.reported.len())
            .finish()
    }
}

/// Per-jobflow results collected while the processors run.
#[derive(Debug, Default)]
pub(crate) struct JobflowState {
    pub(crate) tasks: Vec<TaskReference>,
    pub(crate) inputs: Vec<ExternalInputReference>,
    pub(crate) outputs: Vec<ExternalOutputReference>,
    pub(crate) plan_hash: Option<Hash256>,
    pub(crate) errors: Vec<Diagnostic>,
}

impl JobflowState {
    pub(crate) fn has_ports(&self) -> bool {
        !self.inputs.is_empty() || !self.outputs.is_empty()
    }
}

/// Root of every resource a jobflow produces: `jobflows/<flow_id>`.
pub fn jobflow_location(flow_id: &str) -> Location {
    Location::root("jobflows").append(flow_id)
}

fn report_for(
    compiler: &mut CompilerContext,
    state: &mut JobflowState,
    entity: EntityRef,
    mut diagnostic: Diagnostic,
) {
    if diagnostic.entity.is_none() {
        diagnostic.entity = Some(entity);
    }
    if diagnostic.level == Level::Error {
        state.errors.push(diagnostic.clone());
    }
    compiler.report(diagnostic);
}

/// What a [`JobflowProcessor`](crate::JobflowProcessor) may see and do.
pub struct JobflowProcessorContext<'a> {
    compiler: &'a mut CompilerContext,
    batch: &'a BatchInfo,
    flow_id: &'a str,
    state: &'a mut JobflowState,
}

impl<'a> JobflowProcessorContext<'a> {
    pub(crate) fn new(
        compiler: &'a mut CompilerContext,
        batch: &'a BatchInfo,
        flow_id: &'a str,
        state: &'a mut JobflowState,
    ) -> Self {
        Self {
            compiler,
            batch,
            flow_id,
            state,
        }
    }

    pub fn options(&self) -> &CompilerConfig {
        self.compiler.config()
    }

    pub fn load_context(&self) -> &dyn LoadContext {
        self.compiler.load_context()
    }

    pub fn optimizer(&self) -> &Optimizer {
        self.compiler.optimizer()
    }

    pub fn batch(&self) -> &BatchInfo {
        self.batch
    }

    pub fn flow_id(&self) -> &str {
        self.flow_id
    }

    pub fn entity(&self) -> EntityRef {
        EntityRef::jobflow(&self.batch.batch_id, self.flow_id)
    }

    pub fn extension<T: Any>(&self) -> Option<&T> {
        self.compiler.extension()
    }

    pub fn add_resource(&mut self, location: Location, contents: Vec<u8>) -> io::Result<()> {
        self.compiler.add_resource(location, contents)
    }

    pub fn add_task(&mut self, phase: Phase, module: impl Into<String>, location: Location) {
        self.state.tasks.push(TaskReference {
            phase,
            module: module.into(),
            location,
        });
    }

    /// Registers an external input for the external-port processor.
    pub fn add_external_input(
        &mut self,
        name: impl Into<String>,
        info: Option<ExternalInputInfo>,
    ) -> io::Result<ExternalInputReference> {
        let name = name.into();
        if self.state.inputs.iter().any(|i| i.name == name) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("external input '{name}' is already registered"),
            ));
        }
        let reference = ExternalInputReference {
            location: jobflow_location(self.flow_id).append("inputs").append(&name),
            name,
            info,
        };
        self.state.inputs.push(reference.clone());
        Ok(reference)
    }

    pub fn add_external_output(
        &mut self,
        name: impl Into<String>,
        info: Option<ExternalOutputInfo>,
    ) -> io::Result<ExternalOutputReference> {
        let name = name.into();
        if self.state.outputs.iter().any(|o| o.name == name) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("external output '{name}' is already registered"),
            ));
        }
        let reference = ExternalOutputReference {
            location: jobflow_location(self.flow_id).append("outputs").append(&name),
            name,
            info,
        };
        self.state.outputs.push(reference.clone());
        Ok(reference)
    }

    pub fn set_plan_hash(&mut self, hash: Hash256) {
        self.state.plan_hash = Some(hash);
    }

    /// Reports a diagnostic; an ERROR fails the jobflow once the processor
    /// returns.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        let entity = self.entity();
        report_for(self.compiler, self.state, entity, diagnostic);
    }
}

/// What an [`ExternalPortProcessor`](crate::ExternalPortProcessor) may see and do.
pub struct ExternalPortProcessorContext<'a> {
    compiler: &'a mut CompilerContext,
    batch: &'a BatchInfo,
    flow_id: &'a str,
    state: &'a mut JobflowState,
}

impl<'a> ExternalPortProcessorContext<'a> {
    pub(crate) fn new(
        compiler: &'a mut CompilerContext,
        batch: &'a BatchInfo,
        flow_id: &'a str,
        state: &'a mut JobflowState,
    ) -> Self {
        Self {
            compiler,
            batch,
            flow_id,
            state,
        }
    }

    pub fn options(&self) -> &CompilerConfig {
        self.compiler.config()
    }

    pub fn batch(&self) -> &BatchInfo {
        self.batch
    }

    pub fn flow_id(&self) -> &str {
        self.flow_id
    }

    pub fn add_resource(&mut self, location: Location, contents: Vec<u8>) -> io::Result<()> {
        self.compiler.add_resource(location, contents)
    }

    pub fn add_task(&mut self, phase: Phase, module: impl Into<String>, location: Location) {
        self.state.tasks.push(TaskReference {
            phase,
            module: module.into(),
            location,
        });
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        let entity = EntityRef::jobflow(&self.batch.batch_id, self.flow_id);
        report_for(self.compiler, self.state, entity, diagnostic);
    }
}

/// What a [`BatchProcessor`](crate::BatchProcessor) may see and do.
pub struct BatchProcessorContext<'a> {
    compiler: &'a mut CompilerContext,
    batch: &'a BatchInfo,
}

impl<'a> BatchProcessorContext<'a> {
    pub(crate) fn new(compiler: &'a mut CompilerContext, batch: &'a BatchInfo) -> Self {
        Self { compiler, batch }
    }

    pub fn options(&self) -> &CompilerConfig {
        self.compiler.config()
    }

    pub fn batch(&self) -> &BatchInfo {
        self.batch
    }

    pub fn extension<T: Any>(&self) -> Option<&T> {
        self.compiler.extension()
    }

    pub fn resources(&self) -> &BTreeMap<Location, Vec<u8>> {
        self.compiler.resources()
    }

    pub fn add_resource(&mut self, location: Location, contents: Vec<u8>) -> io::Result<()> {
        self.compiler.add_resource(location, contents)
    }

    pub fn report(&mut self, mut diagnostic: Diagnostic) {
        if diagnostic.entity.is_none() {
            diagnostic.entity = Some(EntityRef::batch(&self.batch.batch_id));
        }
        self.compiler.report(diagnostic);
    }
}
