//! Eager dump: the single atomic document a record tree stands for.
//!
//! Same classification and the same rejections as the streamed path, so
//! `assemble(stream(r))` and `dump(r)` agree for equivalent trees.

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::progressive::encoder::EncodeError;
use crate::progressive::value::{Node, Record};
use crate::types::StreamError;

pub fn dump<R: Record>(mut root: R) -> Result<Value, StreamError> {
    dump_record(&mut root)
}

/// Dump every field of `record`, invoking computations as they are met.
pub fn dump_record(record: &mut dyn Record) -> Result<Value, StreamError> {
    let mut out = Map::new();
    for name in record.field_names() {
        let node = take_field(record, &name)?;
        let value = dump_node(&name, node, false)?;
        out.insert(name, value);
    }
    Ok(Value::Object(out))
}

fn dump_node(field: &str, node: Node, in_collection: bool) -> Result<Value, StreamError> {
    match node {
        Node::Primitive(v) => Ok(v),
        Node::Record(mut record) => dump_record(record.as_mut()),
        Node::List(items) => items
            .into_iter()
            .map(|item| dump_node(field, item, true))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Node::Map(entries) => {
            let mut out = Map::new();
            for (k, item) in entries {
                out.insert(k, dump_node(field, item, true)?);
            }
            Ok(Value::Object(out))
        }
        Node::Deferred(_) if in_collection => {
            Err(EncodeError::DeferredInCollection { field: field.to_owned() }.into())
        }
        Node::Deferred(source) => dump_node(field, source.invoke_blocking()?, false),
    }
}

/// `dump` with computations awaited instead of blocked on.
pub async fn dump_async<R: Record + 'static>(root: R) -> Result<Value, StreamError> {
    dump_record_async(Box::new(root)).await
}

fn dump_record_async(mut record: Box<dyn Record>) -> BoxFuture<'static, Result<Value, StreamError>> {
    Box::pin(async move {
        let mut out = Map::new();
        for name in record.field_names() {
            let node = take_field(record.as_mut(), &name)?;
            let value = dump_node_async(name.clone(), node, false).await?;
            out.insert(name, value);
        }
        Ok(Value::Object(out))
    })
}

fn dump_node_async(
    field: String,
    node: Node,
    in_collection: bool,
) -> BoxFuture<'static, Result<Value, StreamError>> {
    Box::pin(async move {
        match node {
            Node::Primitive(v) => Ok(v),
            Node::Record(record) => dump_record_async(record).await,
            Node::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(dump_node_async(field.clone(), item, true).await?);
                }
                Ok(Value::Array(out))
            }
            Node::Map(entries) => {
                let mut out = Map::new();
                for (k, item) in entries {
                    out.insert(k, dump_node_async(field.clone(), item, true).await?);
                }
                Ok(Value::Object(out))
            }
            Node::Deferred(_) if in_collection => {
                Err(EncodeError::DeferredInCollection { field }.into())
            }
            Node::Deferred(source) => {
                let result = source.invoke().await?;
                dump_node_async(field, result, false).await
            }
        }
    })
}

fn take_field(record: &mut dyn Record, name: &str) -> Result<Node, EncodeError> {
    record
        .take(name)
        .ok_or_else(|| EncodeError::MissingField { field: name.to_owned() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progressive::value::{Deferred, RecordNode};
    use serde_json::json;

    fn sample() -> RecordNode {
        RecordNode::new()
            .field("id", 7)
            .field("address", RecordNode::new().field("city", "c"))
            .field("score", Deferred::from_fn(|| RecordNode::new().field("v", 95)))
            .field("later", Deferred::from_future(async { vec![1, 2] }))
    }

    #[test]
    fn dump_expands_everything() {
        let expected = json!({"id": 7, "address": {"city": "c"}, "score": {"v": 95}, "later": [1, 2]});
        assert_eq!(dump(sample()).unwrap(), expected);
    }

    #[test]
    fn async_dump_matches_blocking_dump() {
        let a = pollster::block_on(dump_async(sample())).unwrap();
        assert_eq!(a, dump(sample()).unwrap());
    }
}
