//! YAML batch descriptions.
//!
//! A description declares the batch, optional configuration overrides, the
//! routines visible to the load context, reusable flow parts, and the
//! jobflows with their operators and connections.
//!
//! Example:
//! ```yaml
//! batch:
//!   id: daily
//!   class: com.example.DailyBatch
//!   parameters:
//!     - { key: date, mandatory: true }
//! config:
//!   failure_mode: fail_fast
//! declarations:
//!   com.example.StockOps:
//!     - name: joinStock
//!     - { name: pick, markers: [MasterSelection] }
//! jobflows:
//!   - id: stock
//!     class: com.example.StockJob
//!     inputs:
//!       - { name: items, type: com.example.Item, module: files, size: tiny,
//!           contents: "items/${date}.csv" }
//!       - { name: orders, type: com.example.Order }
//!     outputs:
//!       - { name: joined, type: com.example.Joined, module: files }
//!     operators:
//!       - id: join
//!         user: MasterJoin
//!         method: com.example.StockOps#joinStock
//!         elements: { selection: pick }
//!         inputs:
//!           - { name: master, type: com.example.Item, group: "=id" }
//!           - { name: tx, type: com.example.Order, group: "=itemId" }
//!         outputs:
//!           - { name: joined, type: com.example.Joined }
//!     connections:
//!       - items -> join.master
//!       - orders -> join.tx
//!       - join.joined -> joined
//! ```
//!
//! Short annotation and marker names are resolved against the operator
//! vocabulary package. A connection endpoint without a port uses the
//! operator's only output (upstream) or only input (downstream).

use std::collections::BTreeMap;

use flowc_analyzer::master_join::VOCABULARY_PACKAGE;
use flowc_analyzer::{DeclarationTable, RoutineInfo};
use flowc_core::config::{CompilerConfig, FailureMode};
use flowc_core::description::{
    AnnotationDescription, ClassDescription, MethodDescription, TypeDescription, ValueDescription,
};
use flowc_core::error::{Error, Result};
use flowc_core::id::OperatorId;
use flowc_graph::{
    CoreOperatorKind, DataSize, ExternalInputInfo, ExternalOutputInfo, Group, Operator,
    OperatorBuilder, OperatorConstraint, OperatorGraph,
};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;

use crate::model::{Batch, BatchInfo, BatchParameter, Jobflow};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub batch: BatchDef,
    #[serde(default)]
    pub config: ConfigOverrides,
    #[serde(default)]
    pub declarations: BTreeMap<String, Vec<RoutineDef>>,
    #[serde(default)]
    pub flowparts: Vec<FlowPartDef>,
    #[serde(default)]
    pub jobflows: Vec<JobflowDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDef {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub parameters: Vec<BatchParameter>,
}

/// Configuration set by the description; unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub build_id: Option<String>,
    pub failure_mode: Option<FailureMode>,
    pub flatten: Option<bool>,
    pub rewrite: Option<bool>,
    pub tiny_input_limit_bytes: Option<u64>,
    pub small_input_limit_bytes: Option<u64>,
    pub properties: BTreeMap<String, String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut CompilerConfig) {
        if let Some(v) = &self.build_id {
            config.build_id = v.clone();
        }
        if let Some(v) = self.failure_mode {
            config.failure_mode = v;
        }
        if let Some(v) = self.flatten {
            config.flatten = v;
        }
        if let Some(v) = self.rewrite {
            config.rewrite = v;
        }
        if let Some(v) = self.tiny_input_limit_bytes {
            config.tiny_input_limit_bytes = v;
        }
        if let Some(v) = self.small_input_limit_bytes {
            config.small_input_limit_bytes = v;
        }
        for (k, v) in &self.properties {
            config.properties.insert(k.clone(), v.clone());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineDef {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    /// Grouping terms, e.g. `"=id, +date"`.
    #[serde(default)]
    pub group: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    /// Importer/exporter module; external ports without one carry no info.
    #[serde(default)]
    pub module: Option<String>,
    /// Description class; defaults to the data model.
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub size: DataSize,
    #[serde(default)]
    pub contents: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorDef {
    pub id: String,
    #[serde(default)]
    pub core: Option<CoreOperatorKind>,
    /// Operator annotation type.
    #[serde(default)]
    pub user: Option<String>,
    /// Flow part id.
    #[serde(default)]
    pub flow: Option<String>,
    /// `Class#routine` of a user operator.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub implementation: Option<String>,
    /// Annotation elements of a user operator.
    #[serde(default)]
    pub elements: BTreeMap<String, Value>,
    #[serde(default)]
    pub inputs: Vec<PortDef>,
    #[serde(default)]
    pub outputs: Vec<PortDef>,
    #[serde(default)]
    pub arguments: BTreeMap<String, Value>,
    #[serde(default)]
    pub constraints: Vec<OperatorConstraint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowPartDef {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub inputs: Vec<PortDef>,
    #[serde(default)]
    pub outputs: Vec<PortDef>,
    #[serde(default)]
    pub arguments: BTreeMap<String, Value>,
    #[serde(default)]
    pub operators: Vec<OperatorDef>,
    #[serde(default)]
    pub connections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobflowDef {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<ExternalDef>,
    #[serde(default)]
    pub outputs: Vec<ExternalDef>,
    #[serde(default)]
    pub operators: Vec<OperatorDef>,
    #[serde(default)]
    pub connections: Vec<String>,
}

/// A loaded batch description.
#[derive(Debug)]
pub struct BatchDescription {
    pub batch: Batch,
    pub config: ConfigOverrides,
    pub declarations: DeclarationTable,
}

/// Parses a YAML batch description.
pub fn parse_batch_description(src: &str) -> Result<BatchDescription> {
    let doc: Document = serde_yaml::from_str(src).map_err(|e| Error::Parse(e.to_string()))?;
    doc.into_description()
}

impl Document {
    pub fn into_description(self) -> Result<BatchDescription> {
        let mut declarations = DeclarationTable::new();
        for (class, routines) in &self.declarations {
            let routines = routines
                .iter()
                .map(|r| {
                    let mut info = RoutineInfo::new(&r.name);
                    info.parameter_types = r.parameters.iter().map(|p| TypeDescription::parse(p)).collect();
                    info.markers = r.markers.iter().map(|m| vocabulary_class(m.as_str())).collect();
                    info
                })
                .collect();
            declarations.declare(ClassDescription::new(class), routines);
        }

        let parts: BTreeMap<&str, &FlowPartDef> =
            self.flowparts.iter().map(|p| (p.id.as_str(), p)).collect();
        if parts.len() != self.flowparts.len() {
            return Err(Error::Parse("duplicate flow part id".into()));
        }

        let mut info = BatchInfo::new(&self.batch.id, ClassDescription::new(&self.batch.class));
        info.comment = self.batch.comment.clone();
        info.parameters = self.batch.parameters.clone();
        let mut batch = Batch::new(info);

        for def in &self.jobflows {
            let mut builder = GraphBuilder::new(&parts);
            for input in &def.inputs {
                let op = Operator::external_input(
                    &input.name,
                    TypeDescription::parse(&input.data_type),
                    input_info(input)?,
                );
                builder.add(&input.name, op)?;
            }
            for output in &def.outputs {
                let op = Operator::external_output(
                    &output.name,
                    TypeDescription::parse(&output.data_type),
                    output_info(output)?,
                );
                builder.add(&output.name, op)?;
            }
            let graph = builder.finish(&def.operators, &def.connections, &mut Vec::new())?;
            debug!(flow = %def.id, operators = graph.len(), "jobflow loaded");
            batch.add(
                Jobflow::new(&def.id, ClassDescription::new(&def.class), graph),
                def.blockers.clone(),
            );
        }

        Ok(BatchDescription {
            batch,
            config: self.config,
            declarations,
        })
    }
}

/// A fully qualified class; bare names live in the vocabulary package.
fn vocabulary_class(name: &str) -> ClassDescription {
    if name.contains('.') {
        ClassDescription::new(name)
    } else {
        ClassDescription::new(format!("{VOCABULARY_PACKAGE}.{name}"))
    }
}

fn input_info(def: &ExternalDef) -> Result<Option<ExternalInputInfo>> {
    let Some(module) = &def.module else {
        return Ok(None);
    };
    let data_model = ClassDescription::new(&def.data_type);
    Ok(Some(ExternalInputInfo {
        description_class: def.class.as_ref().map_or_else(|| data_model.clone(), ClassDescription::new),
        module_name: module.clone(),
        data_model,
        data_size: def.size,
        contents: def.contents.as_ref().map(to_value).transpose()?,
    }))
}

fn output_info(def: &ExternalDef) -> Result<Option<ExternalOutputInfo>> {
    let Some(module) = &def.module else {
        return Ok(None);
    };
    let data_model = ClassDescription::new(&def.data_type);
    Ok(Some(ExternalOutputInfo {
        description_class: def.class.as_ref().map_or_else(|| data_model.clone(), ClassDescription::new),
        module_name: module.clone(),
        data_model,
        contents: def.contents.as_ref().map(to_value).transpose()?,
    }))
}

/// Converts a YAML value into a value description.
///
/// Scalars and sequences map directly; `{type: T}` is a type literal and
/// `{enum: E, constant: C}` an enum constant.
pub fn to_value(value: &Value) -> Result<ValueDescription> {
    Ok(match value {
        Value::Null => ValueDescription::Null,
        Value::Bool(b) => ValueDescription::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ValueDescription::Int(i),
            None => ValueDescription::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => ValueDescription::String(s.clone()),
        Value::Sequence(items) => {
            ValueDescription::Array(items.iter().map(to_value).collect::<Result<_>>()?)
        }
        Value::Mapping(map) => {
            let field = |key: &str| map.get(key).and_then(Value::as_str);
            match (field("type"), field("enum"), field("constant")) {
                (Some(t), None, None) if map.len() == 1 => {
                    ValueDescription::Type(TypeDescription::parse(t))
                }
                (None, Some(e), Some(c)) if map.len() == 2 => ValueDescription::Enum {
                    declaring_class: ClassDescription::new(e),
                    name: c.to_string(),
                },
                _ => {
                    return Err(Error::Parse(format!(
                        "unsupported value mapping: {}",
                        serde_yaml::to_string(value).unwrap_or_default().trim()
                    )))
                }
            }
        }
        Value::Tagged(tagged) => {
            return Err(Error::Parse(format!("unsupported value tag {}", tagged.tag)))
        }
    })
}

fn ports(mut builder: OperatorBuilder, inputs: &[PortDef], outputs: &[PortDef]) -> Result<OperatorBuilder> {
    for p in inputs {
        let group = p.group.as_deref().map(Group::parse).transpose()?;
        builder = builder.grouped_input(&p.name, TypeDescription::parse(&p.data_type), group);
    }
    for p in outputs {
        builder = builder.output(&p.name, TypeDescription::parse(&p.data_type));
    }
    Ok(builder)
}

type Endpoint<'a> = (&'a str, Option<&'a str>);

/// One `upstream[.port] -> downstream[.port]` line.
fn parse_connection(line: &str) -> Result<(Endpoint<'_>, Endpoint<'_>)> {
    let (from, to) = line
        .split_once("->")
        .ok_or_else(|| Error::Parse(format!("connection must be 'a.port -> b.port': {line:?}")))?;
    Ok((endpoint(from, line)?, endpoint(to, line)?))
}

fn endpoint<'a>(text: &'a str, line: &str) -> Result<Endpoint<'a>> {
    let text = text.trim();
    let (op, port) = match text.split_once('.') {
        Some((op, port)) => (op.trim(), Some(port.trim())),
        None => (text, None),
    };
    if op.is_empty() || port.is_some_and(str::is_empty) {
        return Err(Error::Parse(format!("malformed connection endpoint in {line:?}")));
    }
    Ok((op, port))
}

/// Builds one graph; operator ids name operators within it.
struct GraphBuilder<'d> {
    parts: &'d BTreeMap<&'d str, &'d FlowPartDef>,
    graph: OperatorGraph,
    names: BTreeMap<String, OperatorId>,
}

impl<'d> GraphBuilder<'d> {
    fn new(parts: &'d BTreeMap<&'d str, &'d FlowPartDef>) -> Self {
        Self {
            parts,
            graph: OperatorGraph::new(),
            names: BTreeMap::new(),
        }
    }

    fn add(&mut self, name: &str, op: Operator) -> Result<()> {
        if self.names.contains_key(name) {
            return Err(Error::Parse(format!("duplicate operator id '{name}'")));
        }
        let id = self.graph.add(op);
        self.names.insert(name.to_string(), id);
        Ok(())
    }

    /// Adds `operators`, wires `connections`, and returns the graph.
    /// `stack` holds the flow parts under construction.
    fn finish(
        mut self,
        operators: &[OperatorDef],
        connections: &[String],
        stack: &mut Vec<String>,
    ) -> Result<OperatorGraph> {
        for def in operators {
            let op = self.operator(def, stack)?;
            self.add(&def.id, op)?;
        }
        for line in connections {
            self.connect(line)?;
        }
        Ok(self.graph)
    }

    fn operator(&self, def: &OperatorDef, stack: &mut Vec<String>) -> Result<Operator> {
        let builder = match (&def.core, &def.user, &def.flow) {
            (Some(kind), None, None) => Operator::core(*kind),
            (None, Some(annotation), None) => self.user(def, annotation)?,
            (None, None, Some(part)) => return self.flow(def, part, stack),
            _ => {
                return Err(Error::Parse(format!(
                    "operator '{}' must set exactly one of core, user, or flow",
                    def.id
                )))
            }
        };
        let mut builder = ports(builder, &def.inputs, &def.outputs)?;
        for (name, value) in &def.arguments {
            builder = builder.argument(name, to_value(value)?);
        }
        builder.constraints(def.constraints.iter().copied()).build()
    }

    fn user(&self, def: &OperatorDef, annotation: &str) -> Result<OperatorBuilder> {
        let method = def
            .method
            .as_deref()
            .ok_or_else(|| Error::Parse(format!("user operator '{}' has no method", def.id)))?;
        let (class, routine) = method.split_once('#').ok_or_else(|| {
            Error::Parse(format!("method must be 'Class#routine': {method:?}"))
        })?;
        let mut description = AnnotationDescription::marker(vocabulary_class(annotation));
        for (name, value) in &def.elements {
            description = description.with_element(name, to_value(value)?);
        }
        let implementation = def
            .implementation
            .clone()
            .unwrap_or_else(|| format!("{class}Impl"));
        Ok(Operator::user(
            description,
            MethodDescription::new(ClassDescription::new(class), routine),
            ClassDescription::new(implementation),
        ))
    }

    fn flow(&self, def: &OperatorDef, part_id: &str, stack: &mut Vec<String>) -> Result<Operator> {
        let part = self
            .parts
            .get(part_id)
            .ok_or_else(|| Error::Parse(format!("unknown flow part '{part_id}' in operator '{}'", def.id)))?;
        if stack.iter().any(|s| s == part_id) {
            let mut path = stack.clone();
            path.push(part_id.to_string());
            return Err(Error::Structural(format!(
                "cyclic flow part reference: {}",
                path.join(" -> ")
            )));
        }

        stack.push(part_id.to_string());
        let mut inner = GraphBuilder::new(self.parts);
        for p in &part.inputs {
            inner.add(&p.name, Operator::external_input(&p.name, TypeDescription::parse(&p.data_type), None))?;
        }
        for p in &part.outputs {
            inner.add(&p.name, Operator::external_output(&p.name, TypeDescription::parse(&p.data_type), None))?;
        }
        let graph = inner.finish(&part.operators, &part.connections, stack)?;
        stack.pop();

        let mut builder = ports(Operator::flow(ClassDescription::new(&part.class), graph), &part.inputs, &part.outputs)?;
        // operator-level arguments override the part's defaults
        let mut arguments = part.arguments.clone();
        arguments.extend(def.arguments.clone());
        for (name, value) in &arguments {
            builder = builder.argument(name, to_value(value)?);
        }
        builder.constraints(def.constraints.iter().copied()).build()
    }

    fn resolve(&self, name: &str) -> Result<OperatorId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| Error::Parse(format!("unknown operator '{name}' in connection")))
    }

    fn connect(&mut self, line: &str) -> Result<()> {
        let ((from, out), (to, input)) = parse_connection(line)?;
        let (up, down) = (self.resolve(from)?, self.resolve(to)?);
        let out = match out {
            Some(port) => port.to_string(),
            None => self.only_port(up, true)?,
        };
        let input = match input {
            Some(port) => port.to_string(),
            None => self.only_port(down, false)?,
        };
        self.graph.connect_by_name(up, &out, down, &input)
    }

    fn only_port(&self, id: OperatorId, output: bool) -> Result<String> {
        let op = self
            .graph
            .get(id)
            .ok_or_else(|| Error::Parse(format!("unknown operator {id}")))?;
        let names: Vec<&str> = if output {
            op.outputs().into_iter().map(|p| p.name()).collect()
        } else {
            op.inputs().into_iter().map(|p| p.name()).collect()
        };
        match names.as_slice() {
            [only] => Ok(only.to_string()),
            _ => Err(Error::Parse(format!(
                "{op} has {} {} ports; name one explicitly",
                names.len(),
                if output { "output" } else { "input" }
            ))),
        }
    }
}
