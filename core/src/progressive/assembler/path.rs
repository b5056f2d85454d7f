//! Document paths: where a placeholder sits inside the working document.

use std::fmt;

use serde_json::{Map, Value};

use crate::progressive::placeholder::Token;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, ".{k}"),
            PathSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Ordered keys/indices from the document root to one slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DocPath(Vec<PathSegment>);

impl DocPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.0.push(PathSegment::Key(key.into()));
        next
    }

    pub fn index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.0.push(PathSegment::Index(index));
        next
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$doc")?;
        for seg in &self.0 {
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

/// The path does not lead to an existing slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMiss;

/// Overwrite the slot at `path`. Every segment, including the last, must
/// already exist: a resolution replaces a placeholder, it never creates one.
pub fn insert_at(doc: &mut Map<String, Value>, path: &DocPath, value: Value) -> Result<(), PathMiss> {
    let (last, parents) = path.segments().split_last().ok_or(PathMiss)?;

    let PathSegment::Key(first) = parents.first().unwrap_or(last) else {
        return Err(PathMiss);
    };

    if parents.is_empty() {
        let slot = doc.get_mut(first).ok_or(PathMiss)?;
        *slot = value;
        return Ok(());
    }

    let mut cursor = doc.get_mut(first).ok_or(PathMiss)?;
    for seg in &parents[1..] {
        cursor = step_mut(cursor, seg)?;
    }
    *step_mut(cursor, last)? = value;
    Ok(())
}

fn step_mut<'v>(value: &'v mut Value, seg: &PathSegment) -> Result<&'v mut Value, PathMiss> {
    match (value, seg) {
        (Value::Object(map), PathSegment::Key(k)) => map.get_mut(k).ok_or(PathMiss),
        (Value::Array(items), PathSegment::Index(i)) => items.get_mut(*i).ok_or(PathMiss),
        _ => Err(PathMiss),
    }
}

/// Collect every token-shaped string inside `value`, with its path below `base`.
/// Depth-first, document order.
pub fn collect_tokens(value: &Value, base: &DocPath, out: &mut Vec<(Token, DocPath)>) {
    match value {
        Value::String(s) => {
            if let Some(token) = Token::parse(s) {
                out.push((token, base.clone()));
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_tokens(item, &base.index(i), out);
            }
        }
        Value::Object(map) => {
            for (k, item) in map {
                collect_tokens(item, &base.key(k.as_str()), out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn insert_replaces_nested_slots() {
        let mut doc = obj(json!({"a": {"b": ["x", "$1"]}, "c": "$2"}));
        insert_at(&mut doc, &DocPath::root().key("a").key("b").index(1), json!(7)).unwrap();
        insert_at(&mut doc, &DocPath::root().key("c"), json!({"d": 1})).unwrap();
        assert_eq!(Value::Object(doc), json!({"a": {"b": ["x", 7]}, "c": {"d": 1}}));
    }

    #[test]
    fn insert_never_creates_slots() {
        let mut doc = obj(json!({"a": [1]}));
        assert_eq!(insert_at(&mut doc, &DocPath::root(), json!(1)), Err(PathMiss));
        assert_eq!(insert_at(&mut doc, &DocPath::root().key("z"), json!(1)), Err(PathMiss));
        assert_eq!(insert_at(&mut doc, &DocPath::root().key("a").index(3), json!(1)), Err(PathMiss));
        assert_eq!(insert_at(&mut doc, &DocPath::root().key("a").key("k"), json!(1)), Err(PathMiss));
        assert_eq!(Value::Object(doc), json!({"a": [1]}));
    }

    #[test]
    fn collects_tokens_at_any_depth() {
        let v = json!({"x": "$3", "y": [{"z": "$4"}, "plain", "$05"]});
        let mut out = Vec::new();
        collect_tokens(&v, &DocPath::root().key("r"), &mut out);
        let got: Vec<String> = out.iter().map(|(t, p)| format!("{t}@{p}")).collect();
        assert_eq!(got, ["$3@$doc.r.x", "$4@$doc.r.y[0].z"]);
    }
}
