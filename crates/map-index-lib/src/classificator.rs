//! Type dictionary mapping raw `key=value` tag pairs to compact type codes
//!
//! A [`Classificator`] is built explicitly by whoever composes the index and shared as an
//! `Arc<Classificator>`; there is no process-wide instance.

use std::collections::HashMap;

/// Compact internal code for a classified tag pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeCode(pub u32);

/// Dictionary of known tag pairs
#[derive(Debug, Clone, Default)]
pub struct Classificator {
    codes: HashMap<(String, String), TypeCode>,
    tags: Vec<(String, String)>,
}

impl Classificator {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dictionary pre-populated with the given tag pairs
    pub fn with_types<I, K, V>(types: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut classificator = Self::new();
        for (key, value) in types {
            classificator.register(key, value);
        }
        classificator
    }

    /// Register a tag pair, returning its code (existing pairs keep their code)
    pub fn register(&mut self, key: impl Into<String>, value: impl Into<String>) -> TypeCode {
        let pair = (key.into(), value.into());
        if let Some(code) = self.codes.get(&pair) {
            return *code;
        }
        let code = TypeCode(self.tags.len() as u32);
        self.tags.push(pair.clone());
        self.codes.insert(pair, code);
        code
    }

    /// Look up the code of a tag pair
    pub fn type_code(&self, key: &str, value: &str) -> Option<TypeCode> {
        self.codes
            .get(&(key.to_string(), value.to_string()))
            .copied()
    }

    /// Tag pair behind a code
    pub fn type_tags(&self, code: TypeCode) -> Option<(&str, &str)> {
        self.tags
            .get(code.0 as usize)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Human readable `key-value` name of a code
    pub fn type_name(&self, code: TypeCode) -> Option<String> {
        self.type_tags(code).map(|(k, v)| format!("{k}-{v}"))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
