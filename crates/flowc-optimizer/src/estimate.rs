//! Per-operator estimates.
//!
//! Missing keys mean "unknown". Sizes are in bytes and may be `+inf` for
//! inputs declared large.

use std::collections::BTreeMap;
use std::fmt;

use flowc_core::config::EstimatorOptions;
use flowc_core::id::OperatorId;
use flowc_graph::DataSize;
use serde::{Deserialize, Serialize};

/// Attribute holding the [`SizeClass`] of an operator's primary output.
pub const SIZE_CLASS: &str = "size-class";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Tiny,
    Small,
    Large,
    Unknown,
}

impl SizeClass {
    pub fn of_bytes(bytes: f64, options: &EstimatorOptions) -> SizeClass {
        if bytes.is_nan() {
            SizeClass::Unknown
        } else if bytes <= options.tiny_limit_bytes {
            SizeClass::Tiny
        } else if bytes <= options.small_limit_bytes {
            SizeClass::Small
        } else {
            SizeClass::Large
        }
    }

    pub fn of_hint(hint: DataSize) -> SizeClass {
        match hint {
            DataSize::Tiny => SizeClass::Tiny,
            DataSize::Small => SizeClass::Small,
            DataSize::Large => SizeClass::Large,
            DataSize::Unknown => SizeClass::Unknown,
        }
    }

    /// Upper bound in bytes for a class; `None` when unknown.
    pub fn upper_bound(self, options: &EstimatorOptions) -> Option<f64> {
        match self {
            SizeClass::Tiny => Some(options.tiny_limit_bytes),
            SizeClass::Small => Some(options.small_limit_bytes),
            SizeClass::Large => Some(f64::INFINITY),
            SizeClass::Unknown => None,
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SizeClass::Tiny => "tiny",
            SizeClass::Small => "small",
            SizeClass::Large => "large",
            SizeClass::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateKey {
    /// Bytes flowing into the named input port.
    InputSize(String),
    /// Bytes flowing out of the named output port.
    OutputSize(String),
    Attribute(String),
}

impl fmt::Display for EstimateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimateKey::InputSize(p) => write!(f, "input-size({p})"),
            EstimateKey::OutputSize(p) => write!(f, "output-size({p})"),
            EstimateKey::Attribute(a) => f.write_str(a),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateValue {
    Size(f64),
    Class(SizeClass),
    Count(u64),
    Flag(bool),
    Text(String),
}

impl fmt::Display for EstimateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimateValue::Size(v) if v.is_infinite() => f.write_str("inf"),
            EstimateValue::Size(v) => write!(f, "{v:.0}B"),
            EstimateValue::Class(c) => write!(f, "{c}"),
            EstimateValue::Count(n) => write!(f, "{n}"),
            EstimateValue::Flag(b) => write!(f, "{b}"),
            EstimateValue::Text(t) => f.write_str(t),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    values: BTreeMap<EstimateKey, EstimateValue>,
}

impl Estimate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EstimateKey) -> Option<&EstimateValue> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: EstimateKey, value: EstimateValue) {
        self.values.insert(key, value);
    }

    pub fn with(mut self, key: EstimateKey, value: EstimateValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Merges `other` into `self`; `other` wins on conflicting keys.
    pub fn merge(&mut self, other: Estimate) {
        self.values.extend(other.values);
    }

    pub fn input_size(&self, port: &str) -> Option<f64> {
        self.size(&EstimateKey::InputSize(port.to_string()))
    }

    pub fn output_size(&self, port: &str) -> Option<f64> {
        self.size(&EstimateKey::OutputSize(port.to_string()))
    }

    fn size(&self, key: &EstimateKey) -> Option<f64> {
        match self.values.get(key) {
            Some(EstimateValue::Size(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn size_class(&self) -> Option<SizeClass> {
        match self.values.get(&EstimateKey::Attribute(SIZE_CLASS.to_string())) {
            Some(EstimateValue::Class(c)) => Some(*c),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EstimateKey, &EstimateValue)> {
        self.values.iter()
    }
}

/// Estimates of one optimizer run, keyed by operator.
pub type EstimateMap = BTreeMap<OperatorId, Estimate>;
