//! Placeholder tokens and the per-stream allocation context.
//!
//! A token stands in for a value that a later frame will carry. Tokens are
//! handed out by one `PlaceholderContext` per stream, strictly increasing,
//! never reused. The pending item that owns a token carries it directly, so
//! there is no name-keyed lookup table to collide on.

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::FIRST_TOKEN_INDEX;
use crate::utils::{format_token, parse_token};

/// `$<n>` with `n >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(NonZeroU64);

impl Token {
    pub fn new(index: u64) -> Option<Self> {
        NonZeroU64::new(index).map(Token)
    }

    pub fn index(self) -> u64 {
        self.0.get()
    }

    /// Parse the canonical wire form.
    pub fn parse(s: &str) -> Option<Self> {
        parse_token(s).and_then(Token::new)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_token(self.index()))
    }
}

impl FromStr for Token {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Token::parse(s).ok_or_else(|| format!("not a placeholder token: {s:?}"))
    }
}

impl From<Token> for serde_json::Value {
    fn from(token: Token) -> Self {
        serde_json::Value::String(token.to_string())
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Monotonic token counter, exclusive to one stream session.
#[derive(Debug)]
pub struct PlaceholderContext {
    counter: u64,
}

impl Default for PlaceholderContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceholderContext {
    pub fn new() -> Self {
        Self { counter: FIRST_TOKEN_INDEX }
    }

    /// `next = counter; counter += 1`.
    pub fn allocate(&mut self) -> Token {
        let token = Token(NonZeroU64::MIN.saturating_add(self.counter - FIRST_TOKEN_INDEX));
        self.counter += 1;
        token
    }

    /// Number of tokens handed out so far.
    pub fn allocated(&self) -> u64 {
        self.counter - FIRST_TOKEN_INDEX
    }

    /// Position to return to if the tokens allocated after it are never announced.
    pub(crate) fn checkpoint(&self) -> u64 {
        self.counter
    }

    pub(crate) fn rewind(&mut self, checkpoint: u64) {
        debug_assert!(checkpoint <= self.counter);
        self.counter = checkpoint.min(self.counter);
    }

    /// The token the next `allocate` call will return.
    pub fn peek(&self) -> Token {
        Token(NonZeroU64::MIN.saturating_add(self.counter - FIRST_TOKEN_INDEX))
    }
}
