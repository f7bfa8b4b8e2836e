//! Descriptions of user-program declarations.
//!
//! The compiler never loads user code. Everything it knows about classes,
//! routines, annotation values, and literals is carried by these plain data
//! types, and resolved against a load context only when a protocol asks for it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A declared type, identified by its fully qualified binary name
/// (e.g. `com.example.flow.StockJoin`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassDescription {
    name: String,
}

impl ClassDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The fully qualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name without its package prefix.
    pub fn simple_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(i) => &self.name[i + 1..],
            None => &self.name,
        }
    }

    /// The package prefix, or `None` for the default package.
    pub fn package_name(&self) -> Option<&str> {
        self.name.rfind('.').map(|i| &self.name[..i])
    }
}

impl fmt::Display for ClassDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasicType {
    Void,
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
}

impl BasicType {
    pub fn keyword(self) -> &'static str {
        match self {
            BasicType::Void => "void",
            BasicType::Boolean => "boolean",
            BasicType::Byte => "byte",
            BasicType::Short => "short",
            BasicType::Int => "int",
            BasicType::Long => "long",
            BasicType::Float => "float",
            BasicType::Double => "double",
            BasicType::Char => "char",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "void" => BasicType::Void,
            "boolean" => BasicType::Boolean,
            "byte" => BasicType::Byte,
            "short" => BasicType::Short,
            "int" => BasicType::Int,
            "long" => BasicType::Long,
            "float" => BasicType::Float,
            "double" => BasicType::Double,
            "char" => BasicType::Char,
            _ => return None,
        })
    }
}

/// Data-type descriptor carried by operator ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDescription {
    Basic(BasicType),
    Class(ClassDescription),
    Array(Box<TypeDescription>),
}

impl TypeDescription {
    pub fn class(name: impl Into<String>) -> Self {
        TypeDescription::Class(ClassDescription::new(name))
    }

    /// Parses `int`, `com.example.Model`, or `com.example.Model[]`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if let Some(component) = s.strip_suffix("[]") {
            return TypeDescription::Array(Box::new(Self::parse(component)));
        }
        match BasicType::from_keyword(s) {
            Some(basic) => TypeDescription::Basic(basic),
            None => TypeDescription::class(s),
        }
    }
}

impl fmt::Display for TypeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescription::Basic(b) => f.write_str(b.keyword()),
            TypeDescription::Class(c) => write!(f, "{c}"),
            TypeDescription::Array(component) => write!(f, "{component}[]"),
        }
    }
}

/// A declared routine (method) of a user class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodDescription {
    pub declaring_class: ClassDescription,
    pub name: String,
    #[serde(default)]
    pub parameter_types: Vec<TypeDescription>,
}

impl MethodDescription {
    pub fn new(declaring_class: ClassDescription, name: impl Into<String>) -> Self {
        Self {
            declaring_class,
            name: name.into(),
            parameter_types: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameter_types: Vec<TypeDescription>) -> Self {
        self.parameter_types = parameter_types;
        self
    }
}

impl fmt::Display for MethodDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}(", self.declaring_class, self.name)?;
        for (i, p) in self.parameter_types.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{p}")?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Null,
    Immediate,
    Type,
    Enum,
    Array,
    Annotation,
    Serialized,
}

/// A constant value as written in the user program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueDescription {
    Null,
    Boolean(bool),
    Int(i64),
    Double(f64),
    String(String),
    Type(TypeDescription),
    Enum {
        declaring_class: ClassDescription,
        name: String,
    },
    Array(Vec<ValueDescription>),
    Annotation(AnnotationDescription),
    /// An opaque serialized object; only the load context can reify it.
    Serialized {
        value_type: ClassDescription,
        bytes: Vec<u8>,
    },
}

impl ValueDescription {
    pub fn string(s: impl Into<String>) -> Self {
        ValueDescription::String(s.into())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ValueDescription::Null => ValueKind::Null,
            ValueDescription::Boolean(_)
            | ValueDescription::Int(_)
            | ValueDescription::Double(_)
            | ValueDescription::String(_) => ValueKind::Immediate,
            ValueDescription::Type(_) => ValueKind::Type,
            ValueDescription::Enum { .. } => ValueKind::Enum,
            ValueDescription::Array(_) => ValueKind::Array,
            ValueDescription::Annotation(_) => ValueKind::Annotation,
            ValueDescription::Serialized { .. } => ValueKind::Serialized,
        }
    }

    /// Returns the string literal, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ValueDescription::String(s) => Some(s),
            _ => None,
        }
    }

    /// Collects every string literal reachable from this value.
    pub fn strings(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_strings(&mut out);
        out
    }

    fn collect_strings<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ValueDescription::String(s) => out.push(s),
            ValueDescription::Array(items) => {
                for item in items {
                    item.collect_strings(out);
                }
            }
            ValueDescription::Annotation(a) => {
                for value in a.elements().values() {
                    value.collect_strings(out);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for ValueDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueDescription::Null => f.write_str("null"),
            ValueDescription::Boolean(v) => write!(f, "{v}"),
            ValueDescription::Int(v) => write!(f, "{v}"),
            ValueDescription::Double(v) => write!(f, "{v}"),
            ValueDescription::String(v) => write!(f, "{v:?}"),
            ValueDescription::Type(t) => write!(f, "{t}.class"),
            ValueDescription::Enum {
                declaring_class,
                name,
            } => write!(f, "{}.{}", declaring_class.simple_name(), name),
            ValueDescription::Array(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
            ValueDescription::Annotation(a) => write!(f, "{a}"),
            ValueDescription::Serialized { value_type, bytes } => {
                write!(f, "Serialized({value_type}, {} bytes)", bytes.len())
            }
        }
    }
}

/// An annotation instance: its declaring annotation type plus named elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDescription {
    declaring_class: ClassDescription,
    #[serde(default)]
    elements: BTreeMap<String, ValueDescription>,
}

impl AnnotationDescription {
    pub fn new(
        declaring_class: ClassDescription,
        elements: BTreeMap<String, ValueDescription>,
    ) -> Self {
        Self {
            declaring_class,
            elements,
        }
    }

    /// An annotation without elements.
    pub fn marker(declaring_class: ClassDescription) -> Self {
        Self::new(declaring_class, BTreeMap::new())
    }

    pub fn with_element(mut self, name: impl Into<String>, value: ValueDescription) -> Self {
        self.elements.insert(name.into(), value);
        self
    }

    pub fn declaring_class(&self) -> &ClassDescription {
        &self.declaring_class
    }

    pub fn elements(&self) -> &BTreeMap<String, ValueDescription> {
        &self.elements
    }

    pub fn element(&self, name: &str) -> Option<&ValueDescription> {
        self.elements.get(name)
    }
}

impl fmt::Display for AnnotationDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.declaring_class.simple_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_names() {
        let c = ClassDescription::new("com.example.flow.StockJoin");
        assert_eq!(c.simple_name(), "StockJoin");
        assert_eq!(c.package_name(), Some("com.example.flow"));

        let d = ClassDescription::new("Bare");
        assert_eq!(d.simple_name(), "Bare");
        assert_eq!(d.package_name(), None);
    }

    #[test]
    fn test_type_parse() {
        assert_eq!(TypeDescription::parse("int"), TypeDescription::Basic(BasicType::Int));
        assert_eq!(
            TypeDescription::parse("com.example.Stock[]").to_string(),
            "com.example.Stock[]"
        );
    }

    #[test]
    fn test_value_strings() {
        let v = ValueDescription::Array(vec![
            ValueDescription::string("a"),
            ValueDescription::Int(1),
            ValueDescription::Annotation(
                AnnotationDescription::marker(ClassDescription::new("x.A"))
                    .with_element("v", ValueDescription::string("b")),
            ),
        ]);
        assert_eq!(v.strings(), vec!["a", "b"]);
        assert_eq!(v.kind(), ValueKind::Array);
    }

    #[test]
    fn test_method_display() {
        let m = MethodDescription::new(ClassDescription::new("x.Ops"), "join")
            .with_parameters(vec![TypeDescription::class("x.A"), TypeDescription::parse("int")]);
        assert_eq!(m.to_string(), "x.Ops#join(x.A,int)");
    }
}
