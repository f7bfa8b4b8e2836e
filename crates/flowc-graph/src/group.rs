//! Grouping/ordering instructions attached to operator inputs.

use std::fmt;

use flowc_core::error::{Error, Result};
use flowc_core::name::PropertyName;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ascendant,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ordering {
    pub property: PropertyName,
    pub direction: Direction,
}

/// Key and ordering specification for correlated/grouped processing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Group {
    pub grouping: Vec<PropertyName>,
    pub ordering: Vec<Ordering>,
}

impl Group {
    pub fn new(grouping: Vec<PropertyName>, ordering: Vec<Ordering>) -> Self {
        Self { grouping, ordering }
    }

    /// Parses `"=key1, =key2, +order1, -order2"`: `=` marks a grouping key,
    /// `+`/`-` an ascending/descending ordering.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut group = Group::default();
        for term in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let mut chars = term.chars();
            let prefix = chars.next().unwrap_or_default();
            let property = PropertyName::of(chars.as_str().trim());
            if property.is_empty() {
                return Err(Error::Parse(format!("empty property in group term {term:?}")));
            }
            match prefix {
                '=' => group.grouping.push(property),
                '+' => group.ordering.push(Ordering {
                    property,
                    direction: Direction::Ascendant,
                }),
                '-' => group.ordering.push(Ordering {
                    property,
                    direction: Direction::Descendant,
                }),
                _ => {
                    return Err(Error::Parse(format!(
                        "group term must start with '=', '+', or '-': {term:?}"
                    )))
                }
            }
        }
        Ok(group)
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut sep = |f: &mut fmt::Formatter<'_>| {
            let r = if first { Ok(()) } else { f.write_str(", ") };
            first = false;
            r
        };
        for key in &self.grouping {
            sep(f)?;
            write!(f, "={key}")?;
        }
        for o in &self.ordering {
            sep(f)?;
            let mark = match o.direction {
                Direction::Ascendant => '+',
                Direction::Descendant => '-',
            };
            write!(f, "{mark}{}", o.property)?;
        }
        Ok(())
    }
}
