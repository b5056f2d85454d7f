//! Record model consumed by the producer.
//!
//! Responsibilities:
//! - `Node`: the closed classification of a field value
//! - `Record`: ordered field introspection (external collaborator seam)
//! - `Deferred`: a value obtainable later, sync or async, invoked at most once
//!
//! Non-responsibilities:
//! - Token allocation
//! - Framing

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub type ComputeResult = Result<Node, ComputeError>;

/// A deferred computation failed.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Source(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ComputeError {
    pub fn msg(message: impl Into<String>) -> Self {
        ComputeError::Failed(message.into())
    }
}

/// Ordered, named fields.
///
/// `field_names` gives declaration order and must be stable for the
/// lifetime of the record. `take` moves a field's current value out; it is
/// called at most once per field name.
pub trait Record: Send {
    fn field_names(&self) -> Vec<String>;

    fn take(&mut self, name: &str) -> Option<Node>;
}

/// One field's value, classified.
pub enum Node {
    /// String, number, bool, null (bytes-like values are arrays of numbers).
    Primitive(Value),
    /// Nested record, streamed in its own frame.
    Record(Box<dyn Record>),
    /// Order-preserving list.
    List(Vec<Node>),
    /// Keyed map, insertion order preserved.
    Map(IndexMap<String, Node>),
    /// Value produced later by a computation.
    Deferred(Deferred),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Primitive,
    NestedRecord,
    Collection,
    DeferredComputation,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Primitive(_) => NodeKind::Primitive,
            Node::Record(_) => NodeKind::NestedRecord,
            Node::List(_) | Node::Map(_) => NodeKind::Collection,
            Node::Deferred(_) => NodeKind::DeferredComputation,
        }
    }

    pub fn null() -> Self {
        Node::Primitive(Value::Null)
    }

    pub fn record<R: Record + 'static>(record: R) -> Self {
        Node::Record(Box::new(record))
    }

    pub fn bytes(bytes: &[u8]) -> Self {
        Node::Primitive(Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()))
    }

    /// Bridge from any serde-serializable value.
    /// JSON objects become `Map`, never `Record`: they are emitted inline.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Node::from(serde_json::to_value(value)?))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Primitive(v) => f.debug_tuple("Primitive").field(v).finish(),
            Node::Record(r) => f.debug_tuple("Record").field(&r.field_names()).finish(),
            Node::List(items) => f.debug_tuple("List").field(items).finish(),
            Node::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Node::Deferred(d) => f.debug_tuple("Deferred").field(d).finish(),
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Node::List(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => Node::Map(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect()),
            scalar => Node::Primitive(scalar),
        }
    }
}

macro_rules! scalar_into_node {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Node {
                fn from(v: $t) -> Self {
                    Node::Primitive(Value::from(v))
                }
            }
        )*
    };
}

scalar_into_node!(bool, u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, String, &str);

impl From<()> for Node {
    fn from(_: ()) -> Self {
        Node::null()
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(v: Option<T>) -> Self {
        v.map_or_else(Node::null, Into::into)
    }
}

impl<T: Into<Node>> From<Vec<T>> for Node {
    fn from(items: Vec<T>) -> Self {
        Node::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Node>> From<IndexMap<String, T>> for Node {
    fn from(entries: IndexMap<String, T>) -> Self {
        Node::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<RecordNode> for Node {
    fn from(record: RecordNode) -> Self {
        Node::Record(Box::new(record))
    }
}

impl From<Box<dyn Record>> for Node {
    fn from(record: Box<dyn Record>) -> Self {
        Node::Record(record)
    }
}

impl From<Deferred> for Node {
    fn from(source: Deferred) -> Self {
        Node::Deferred(source)
    }
}

// ---------------------------------------------------------------------------
// RecordNode
// ---------------------------------------------------------------------------

/// Generic ordered record built field by field.
#[derive(Debug, Default)]
pub struct RecordNode {
    fields: IndexMap<String, Option<Node>>,
}

impl RecordNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `insert`.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Node>) -> Self {
        self.insert(name, value);
        self
    }

    /// Declare a field. Re-declaring a name replaces its value but keeps
    /// its original position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Node>) {
        self.fields.insert(name.into(), Some(value.into()));
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Record for RecordNode {
    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn take(&mut self, name: &str) -> Option<Node> {
        self.fields.get_mut(name).and_then(Option::take)
    }
}

// ---------------------------------------------------------------------------
// Deferred
// ---------------------------------------------------------------------------

/// A value obtainable later. Consumed by invocation, so it runs at most once.
pub enum Deferred {
    Sync(Box<dyn FnOnce() -> ComputeResult + Send>),
    Async(BoxFuture<'static, ComputeResult>),
}

impl Deferred {
    /// Fallible blocking producer.
    pub fn sync<F, V>(f: F) -> Self
    where
        F: FnOnce() -> Result<V, ComputeError> + Send + 'static,
        V: Into<Node> + 'static,
    {
        Deferred::Sync(Box::new(move || f().map(Into::into)))
    }

    /// Infallible blocking producer.
    pub fn from_fn<F, V>(f: F) -> Self
    where
        F: FnOnce() -> V + Send + 'static,
        V: Into<Node> + 'static,
    {
        Deferred::Sync(Box::new(move || Ok(f().into())))
    }

    /// Fallible awaitable producer.
    pub fn future<Fut, V>(fut: Fut) -> Self
    where
        Fut: Future<Output = Result<V, ComputeError>> + Send + 'static,
        V: Into<Node> + Send + 'static,
    {
        Deferred::Async(Box::pin(async move { fut.await.map(Into::into) }))
    }

    /// Infallible awaitable producer.
    pub fn from_future<Fut, V>(fut: Fut) -> Self
    where
        Fut: Future<Output = V> + Send + 'static,
        V: Into<Node> + Send + 'static,
    {
        Deferred::Async(Box::pin(async move { Ok(fut.await.into()) }))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Deferred::Async(_))
    }

    /// Blocking invocation. Async sources are driven on the current thread,
    /// so they must not depend on a runtime-bound reactor (timers, sockets).
    pub fn invoke_blocking(self) -> ComputeResult {
        match self {
            Deferred::Sync(f) => f(),
            Deferred::Async(fut) => pollster::block_on(fut),
        }
    }

    /// Awaited invocation. Sync sources run inline.
    pub async fn invoke(self) -> ComputeResult {
        match self {
            Deferred::Sync(f) => f(),
            Deferred::Async(fut) => fut.await,
        }
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deferred::Sync(_) => f.write_str("Deferred::Sync(..)"),
            Deferred::Async(_) => f.write_str("Deferred::Async(..)"),
        }
    }
}
