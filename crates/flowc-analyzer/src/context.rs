//! Access to user-program declarations.

use std::collections::BTreeMap;

use flowc_core::description::{ClassDescription, MethodDescription, TypeDescription, ValueDescription};
use flowc_core::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A routine visible on a declaring type, with the marker annotations it
/// carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineInfo {
    pub name: String,
    #[serde(default)]
    pub parameter_types: Vec<TypeDescription>,
    #[serde(default)]
    pub markers: Vec<ClassDescription>,
}

impl RoutineInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_types: Vec::new(),
            markers: Vec::new(),
        }
    }

    pub fn with_marker(mut self, marker: ClassDescription) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn has_marker(&self, marker: &ClassDescription) -> bool {
        self.markers.contains(marker)
    }

    pub fn to_method(&self, declaring_class: &ClassDescription) -> MethodDescription {
        MethodDescription::new(declaring_class.clone(), self.name.clone())
            .with_parameters(self.parameter_types.clone())
    }
}

/// Resolves declarations of the program being compiled.
pub trait LoadContext {
    /// Visible routines of `declaring`, in declaration order.
    fn routines(&self, declaring: &ClassDescription) -> Result<Vec<RoutineInfo>>;

    /// Reifies a value description. Literals resolve to themselves; opaque
    /// serialized values need the program's own types and fail by default.
    fn resolve_value(&self, value: &ValueDescription) -> Result<ValueDescription> {
        match value {
            ValueDescription::Serialized { value_type, .. } => Err(Error::NotFound(format!(
                "cannot reify serialized value of type {value_type}"
            ))),
            other => Ok(other.clone()),
        }
    }
}

/// In-memory declarations keyed by type name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclarationTable {
    classes: BTreeMap<ClassDescription, Vec<RoutineInfo>>,
}

impl DeclarationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a type; routines keep insertion order.
    pub fn declare(&mut self, class: ClassDescription, routines: Vec<RoutineInfo>) {
        self.classes.entry(class).or_default().extend(routines);
    }

    pub fn with_class(mut self, class: ClassDescription, routines: Vec<RoutineInfo>) -> Self {
        self.declare(class, routines);
        self
    }

    pub fn merge(&mut self, other: DeclarationTable) {
        for (class, routines) in other.classes {
            self.declare(class, routines);
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl LoadContext for DeclarationTable {
    fn routines(&self, declaring: &ClassDescription) -> Result<Vec<RoutineInfo>> {
        self.classes
            .get(declaring)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("unknown type {declaring}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_from_json() {
        let table: DeclarationTable = serde_json::from_str(
            r#"{
                "com.example.Ops": [
                    {"name": "join"},
                    {"name": "pick", "markers": ["flowc.vocabulary.operator.MasterSelection"]}
                ]
            }"#,
        )
        .unwrap();
        let routines = table
            .routines(&ClassDescription::new("com.example.Ops"))
            .unwrap();
        assert_eq!(routines.len(), 2);
        assert!(routines[1].has_marker(&ClassDescription::new(
            "flowc.vocabulary.operator.MasterSelection"
        )));
    }

    #[test]
    fn test_unknown_type() {
        let table = DeclarationTable::new();
        let err = table.routines(&ClassDescription::new("x.Missing")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_serialized_values_do_not_resolve() {
        let table = DeclarationTable::new();
        let value = ValueDescription::Serialized {
            value_type: ClassDescription::new("x.Blob"),
            bytes: vec![1, 2],
        };
        assert!(table.resolve_value(&value).is_err());
        assert_eq!(
            table.resolve_value(&ValueDescription::string("a")).unwrap(),
            ValueDescription::string("a")
        );
    }
}
