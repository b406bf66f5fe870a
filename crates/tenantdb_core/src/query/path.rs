//! Paths into document data.

use crate::error::{CoreError, CoreResult};
use serde_json::Value;
use std::fmt;

const ARROW: &str = "->";

/// A path selecting a value inside a JSON document.
///
/// Steps are separated by `->`; a path without `->` is split on `.`.
/// `Foo->Bar` and `Foo.Bar` therefore select the same value. A step that
/// parses as an unsigned integer indexes arrays; every step looks up keys in
/// objects.
#[derive(Clone, PartialEq, Eq)]
pub struct ValuePath {
    raw: String,
    steps: Vec<String>,
}

impl ValuePath {
    /// Parses a path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if the path or any of its steps is empty.
    pub fn parse(path: &str) -> CoreResult<Self> {
        if path.is_empty() {
            return Err(CoreError::invalid_query("empty path"));
        }

        let steps: Vec<String> = if path.contains(ARROW) {
            path.split(ARROW).map(|s| s.trim().to_string()).collect()
        } else {
            path.split('.').map(|s| s.trim().to_string()).collect()
        };

        if steps.iter().any(String::is_empty) {
            return Err(CoreError::invalid_query(format!(
                "path '{path}' contains an empty step"
            )));
        }

        Ok(Self {
            raw: path.to_string(),
            steps,
        })
    }

    /// The path as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed steps.
    #[must_use]
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Resolves the path against a document.
    ///
    /// Any step that misses yields `Null` for the rest of the path.
    #[must_use]
    pub fn resolve<'a>(&self, document: &'a Value) -> &'a Value {
        let mut current = document;
        for step in &self.steps {
            let next = match current {
                Value::Object(map) => map.get(step),
                Value::Array(items) => step.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return &Value::Null,
            }
        }
        current
    }
}

impl fmt::Debug for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValuePath({})", self.raw)
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
