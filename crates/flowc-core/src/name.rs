//! Normalized data-model property names.
//!
//! `abc_de_fgh`, `ABC_DE_FGH`, `abcDeFgh`, and `AbcDeFgh` all denote the same
//! property: the words `[abc, de, fgh]`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PropertyName {
    words: Vec<String>,
}

impl PropertyName {
    pub fn new(words: Vec<String>) -> Self {
        Self {
            words: words
                .into_iter()
                .filter(|w| !w.is_empty())
                .map(|w| w.to_lowercase())
                .collect(),
        }
    }

    /// Splits a snake-case or camel-case identifier into words.
    pub fn of(name: &str) -> Self {
        let mut words = Vec::new();
        for segment in name.split('_').filter(|s| !s.is_empty()) {
            if !segment.chars().any(char::is_lowercase) {
                words.push(segment.to_lowercase());
                continue;
            }
            let mut current = String::new();
            let mut prev_lower = false;
            for c in segment.chars() {
                if c.is_uppercase() && prev_lower && !current.is_empty() {
                    words.push(std::mem::take(&mut current).to_lowercase());
                }
                prev_lower = c.is_lowercase() || c.is_ascii_digit();
                current.push(c);
            }
            if !current.is_empty() {
                words.push(current.to_lowercase());
            }
        }
        Self { words }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn add_first(&self, word: &str) -> Self {
        let mut words = Vec::with_capacity(self.words.len() + 1);
        words.push(word.to_lowercase());
        words.extend(self.words.iter().cloned());
        Self { words }
    }

    pub fn add_last(&self, word: &str) -> Self {
        let mut words = self.words.clone();
        words.push(word.to_lowercase());
        Self { words }
    }

    /// `hello_world`
    pub fn to_name(&self) -> String {
        self.words.join("_")
    }

    /// `helloWorld`
    pub fn to_member_name(&self) -> String {
        let mut out = String::new();
        for (i, w) in self.words.iter().enumerate() {
            if i == 0 {
                out.push_str(w);
                continue;
            }
            let mut chars = w.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
        out
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_name())
    }
}

impl From<String> for PropertyName {
    fn from(value: String) -> Self {
        PropertyName::of(&value)
    }
}

impl From<&str> for PropertyName {
    fn from(value: &str) -> Self {
        PropertyName::of(value)
    }
}

impl From<PropertyName> for String {
    fn from(value: PropertyName) -> Self {
        value.to_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(name: &str) -> Vec<String> {
        PropertyName::of(name).words().to_vec()
    }

    #[test]
    fn test_naming_conventions_agree() {
        let expected = vec!["abc".to_string(), "de".into(), "fgh".into()];
        assert_eq!(words("abc_de_fgh"), expected);
        assert_eq!(words("ABC_DE_FGH"), expected);
        assert_eq!(words("abcDeFgh"), expected);
        assert_eq!(words("AbcDeFgh"), expected);
        assert_eq!(words("_abc_de_fgh_"), expected);
        assert_eq!(words("_abcDeFgh_"), expected);
    }

    #[test]
    fn test_empty_name() {
        assert!(PropertyName::of("_").is_empty());
        assert_eq!(words("simple"), vec!["simple".to_string()]);
    }

    #[test]
    fn test_conversions() {
        let name = PropertyName::new(vec!["hello".into(), "world".into()]);
        assert_eq!(name.to_name(), "hello_world");
        assert_eq!(name.to_member_name(), "helloWorld");
    }

    #[test]
    fn test_manipulate() {
        let name = PropertyName::of("hello");
        let edit = name.add_first("get").add_last("option");
        assert_ne!(edit, name);
        assert_eq!(edit.to_name(), "get_hello_option");
    }
}
