//! Field Encoder.
//!
//! Classifies one field value and decides what goes inline in the current
//! frame. Nested records and deferred computations are replaced by a fresh
//! token and queued as pending items; collections keep their shape and apply
//! the same rule per element.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{trace, warn};

use crate::progressive::placeholder::{PlaceholderContext, Token};
use crate::progressive::value::{Deferred, Node, Record};
use crate::utils::is_token;

#[derive(Debug, Error)]
pub enum EncodeError {
    /// The record declared a field but had no value for it.
    #[error("record declares field `{field}` but has no value for it")]
    MissingField { field: String },

    /// A deferred computation sits inside a collection.
    #[error("field `{field}`: deferred computations are not supported as collection elements")]
    DeferredInCollection { field: String },

    /// The root record's only field would make its frame read as a
    /// resolution or error frame.
    #[error("root record's only field `{field}` collides with a reserved frame shape")]
    ReservedRootShape { field: String },
}

/// A nested record waiting for its own frame.
pub struct RecordItem {
    pub token: Token,
    pub record: Box<dyn Record>,
}

/// A computation waiting to be invoked.
pub struct ComputationItem {
    pub token: Token,
    pub source: Deferred,
}

/// Pending items found while encoding one layer, in discovery order.
#[derive(Default)]
pub struct Discovered {
    pub records: Vec<RecordItem>,
    pub computations: Vec<ComputationItem>,
}

impl Discovered {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.computations.is_empty()
    }
}

pub struct FieldEncoder<'a> {
    context: &'a mut PlaceholderContext,
    discovered: Discovered,
}

impl<'a> FieldEncoder<'a> {
    pub fn new(context: &'a mut PlaceholderContext) -> Self {
        Self { context, discovered: Discovered::default() }
    }

    /// Encode every field of `record`, in declaration order, into one flat mapping.
    pub fn encode_record(&mut self, record: &mut dyn Record) -> Result<Map<String, Value>, EncodeError> {
        let mut fields = Map::new();
        for name in record.field_names() {
            let node = record
                .take(&name)
                .ok_or_else(|| EncodeError::MissingField { field: name.clone() })?;
            let value = self.encode_field(&name, node)?;
            fields.insert(name, value);
        }
        Ok(fields)
    }

    /// Encode one field's value.
    pub fn encode_field(&mut self, field: &str, node: Node) -> Result<Value, EncodeError> {
        trace!(field, kind = ?node.kind(), "encode field");
        match node {
            Node::Primitive(Value::String(s)) if is_token(&s) => {
                warn!(field, value = %s, "string value has placeholder shape; consumers will read it as a token");
                Ok(Value::String(s))
            }
            Node::Primitive(v) => Ok(v),
            Node::Record(record) => Ok(self.defer_record(record)),
            Node::Deferred(source) => Ok(self.defer_computation(source)),
            Node::List(_) | Node::Map(_) => self.encode_element(field, node),
        }
    }

    /// Collection rule: keep the container, tokenize record elements.
    fn encode_element(&mut self, field: &str, node: Node) -> Result<Value, EncodeError> {
        match node {
            Node::Primitive(v) => Ok(v),
            Node::Record(record) => Ok(self.defer_record(record)),
            Node::List(items) => items
                .into_iter()
                .map(|item| self.encode_element(field, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Node::Map(entries) => entries
                .into_iter()
                .map(|(k, item)| Ok::<_, EncodeError>((k, self.encode_element(field, item)?)))
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            Node::Deferred(_) => Err(EncodeError::DeferredInCollection { field: field.to_owned() }),
        }
    }

    fn defer_record(&mut self, record: Box<dyn Record>) -> Value {
        let token = self.context.allocate();
        self.discovered.records.push(RecordItem { token, record });
        token.into()
    }

    fn defer_computation(&mut self, source: Deferred) -> Value {
        let token = self.context.allocate();
        self.discovered.computations.push(ComputationItem { token, source });
        token.into()
    }

    /// Hand over everything queued while encoding.
    pub fn finish(self) -> Discovered {
        self.discovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progressive::value::RecordNode;
    use serde_json::json;

    #[test]
    fn primitives_pass_through() {
        let mut ctx = PlaceholderContext::new();
        let mut enc = FieldEncoder::new(&mut ctx);
        let mut r = RecordNode::new().field("a", 1).field("b", "x").field("c", ());
        let fields = enc.encode_record(&mut r).unwrap();
        assert_eq!(Value::Object(fields), json!({"a": 1, "b": "x", "c": null}));
        assert!(enc.finish().is_empty());
        assert_eq!(ctx.allocated(), 0);
    }

    #[test]
    fn records_and_computations_become_tokens_in_field_order() {
        let mut ctx = PlaceholderContext::new();
        let mut enc = FieldEncoder::new(&mut ctx);
        let mut r = RecordNode::new()
            .field("score", Deferred::from_fn(|| 1))
            .field("address", RecordNode::new().field("city", "x"))
            .field("tags", vec![Node::from("t"), RecordNode::new().into()]);
        let fields = enc.encode_record(&mut r).unwrap();
        assert_eq!(Value::Object(fields), json!({"score": "$1", "address": "$2", "tags": ["t", "$3"]}));

        let d = enc.finish();
        let records: Vec<u64> = d.records.iter().map(|i| i.token.index()).collect();
        let comps: Vec<u64> = d.computations.iter().map(|i| i.token.index()).collect();
        assert_eq!(records, [2, 3]);
        assert_eq!(comps, [1]);
    }

    #[test]
    fn deferred_in_collection_is_rejected() {
        let mut ctx = PlaceholderContext::new();
        let mut enc = FieldEncoder::new(&mut ctx);
        let node = Node::List(vec![Deferred::from_fn(|| 1).into()]);
        assert!(matches!(
            enc.encode_field("xs", node),
            Err(EncodeError::DeferredInCollection { .. })
        ));
    }
}
