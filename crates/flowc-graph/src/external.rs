//! Descriptions of external inputs/outputs (the jobflow's I/O boundary).

use flowc_core::description::{ClassDescription, ValueDescription};
use serde::{Deserialize, Serialize};

/// Declared size hint of an external input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSize {
    #[default]
    Unknown,
    Tiny,
    Small,
    Large,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalInputInfo {
    pub description_class: ClassDescription,
    pub module_name: String,
    pub data_model: ClassDescription,
    #[serde(default)]
    pub data_size: DataSize,
    /// Module-specific properties (paths, filters, ...).
    #[serde(default)]
    pub contents: Option<ValueDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalOutputInfo {
    pub description_class: ClassDescription,
    pub module_name: String,
    pub data_model: ClassDescription,
    #[serde(default)]
    pub contents: Option<ValueDescription>,
}
