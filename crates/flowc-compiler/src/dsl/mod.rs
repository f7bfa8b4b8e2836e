//! Textual batch descriptions.

pub mod yaml;
