//! Append-only writer for the declarative (JSON) form of definitions and results.
//!
//! The writer only knows three operations: open an object, write a field, close
//! the object. Callers open the enclosing object, let a definition append its own
//! parameters, and close it again.
//!
//! ```
//! use shardagg::document::DocumentBuilder;
//!
//! let mut doc = DocumentBuilder::new();
//! doc.start_object().unwrap();
//! doc.start_object_field("stats").unwrap();
//! doc.field("field", "latency_ms").unwrap();
//! doc.end_object().unwrap();
//! doc.end_object().unwrap();
//! assert_eq!(doc.to_string().unwrap(), r#"{"stats":{"field":"latency_ms"}}"#);
//! ```

use crate::error::{AggregationError, Result};
use serde_json::{Map, Value};

/// Builds a `serde_json::Value` tree one field at a time.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    /// Open objects, innermost last, each with the key it will be stored under.
    stack: Vec<(Option<String>, Map<String, Value>)>,
    root: Option<Value>,
}

impl DocumentBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the root object.
    ///
    /// # Errors
    ///
    /// Fails if a root object was already opened.
    pub fn start_object(&mut self) -> Result<&mut Self> {
        if !self.stack.is_empty() || self.root.is_some() {
            return Err(AggregationError::Document(
                "root object already started".into(),
            ));
        }
        self.stack.push((None, Map::new()));
        Ok(self)
    }

    /// Open a nested object stored under `key` in the current object.
    ///
    /// # Errors
    ///
    /// Fails when no object is open.
    pub fn start_object_field(&mut self, key: impl Into<String>) -> Result<&mut Self> {
        if self.stack.is_empty() {
            return Err(AggregationError::Document(
                "cannot start a nested object outside an object".into(),
            ));
        }
        self.stack.push((Some(key.into()), Map::new()));
        Ok(self)
    }

    /// Write `key: value` into the current object.
    ///
    /// # Errors
    ///
    /// Fails when no object is open.
    pub fn field(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<&mut Self> {
        let (_, current) = self.stack.last_mut().ok_or_else(|| {
            AggregationError::Document("cannot write a field outside an object".into())
        })?;
        current.insert(key.into(), value.into());
        Ok(self)
    }

    /// Close the current object, attaching it to its parent or making it the root.
    ///
    /// # Errors
    ///
    /// Fails when no object is open.
    pub fn end_object(&mut self) -> Result<&mut Self> {
        let (key, map) = self
            .stack
            .pop()
            .ok_or_else(|| AggregationError::Document("no open object to end".into()))?;
        match (key, self.stack.last_mut()) {
            (Some(key), Some((_, parent))) => {
                parent.insert(key, Value::Object(map));
            }
            (None, None) => self.root = Some(Value::Object(map)),
            _ => {
                return Err(AggregationError::Document(
                    "object nesting is out of balance".into(),
                ));
            }
        }
        Ok(self)
    }

    /// Depth of currently open objects.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Take the finished document.
    ///
    /// # Errors
    ///
    /// Fails if objects are still open or nothing was written.
    pub fn finish(self) -> Result<Value> {
        if !self.stack.is_empty() {
            return Err(AggregationError::Document(format!(
                "{} objects left open",
                self.stack.len()
            )));
        }
        self.root
            .ok_or_else(|| AggregationError::Document("empty document".into()))
    }

    /// Finish and serialize to compact JSON bytes.
    ///
    /// # Errors
    ///
    /// See [`DocumentBuilder::finish`].
    pub fn to_bytes(self) -> Result<Vec<u8>> {
        let value = self.finish()?;
        serde_json::to_vec(&value).map_err(|e| AggregationError::Document(e.to_string()))
    }

    /// Finish and serialize to a compact JSON string.
    ///
    /// # Errors
    ///
    /// See [`DocumentBuilder::finish`].
    #[allow(clippy::inherent_to_string)]
    pub fn to_string(self) -> Result<String> {
        let value = self.finish()?;
        serde_json::to_string(&value).map_err(|e| AggregationError::Document(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use test_log::test;

    #[test]
    fn nested_objects_attach_to_parents() {
        let mut doc = DocumentBuilder::new();
        doc.start_object()
            .unwrap()
            .start_object_field("a")
            .unwrap()
            .field("x", 1)
            .unwrap()
            .end_object()
            .unwrap()
            .field("b", true)
            .unwrap()
            .end_object()
            .unwrap();
        assert_eq!(doc.finish().unwrap(), json!({"a": {"x": 1}, "b": true}));
    }

    #[test]
    fn unbalanced_use_is_rejected() {
        let mut doc = DocumentBuilder::new();
        assert!(doc.end_object().is_err());
        assert!(doc.field("x", 1).is_err());

        doc.start_object().unwrap();
        assert!(doc.start_object().is_err());
        doc.start_object_field("open").unwrap();
        assert_eq!(doc.depth(), 2);
        assert!(doc.finish().is_err());
    }

    #[test]
    fn empty_document_is_an_error() {
        assert!(DocumentBuilder::new().finish().is_err());
    }
}
