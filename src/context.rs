//! # Call Chains
//!
//! A [`CallChain`] is the token a dispatcher attaches to every inbound
//! invocation. It is a `:`-separated list of call segments; the first segment
//! names the top-level call and each further segment is one nested hop.
//!
//! ```text
//! "order_7"                 top-level call
//! "order_7:reserve"         the actor calling back into itself
//! "order_7:reserve:audit"   one hop deeper
//! ```
//!
//! The guard treats a token as reentrant when it [`extends`](CallChain::extends)
//! the token currently holding the lock. Matching happens on segment
//! boundaries, so `"AB"` is *not* an extension of `"A"`.

use crate::error::GuardError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between call segments.
pub const SEGMENT_DELIMITER: char = ':';

/// Hierarchical call-context token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CallChain(String);

impl CallChain {
    /// Parses and validates a token.
    pub fn new(token: impl Into<String>) -> Result<Self, GuardError> {
        let token = token.into();
        if token.is_empty() || token.split(SEGMENT_DELIMITER).any(str::is_empty) {
            return Err(GuardError::InvalidContext(token));
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The top-level segment.
    pub fn root(&self) -> &str {
        self.segments().next().unwrap_or(&self.0)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEGMENT_DELIMITER)
    }

    /// Number of segments; a top-level token has depth 1.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    pub fn is_top_level(&self) -> bool {
        !self.0.contains(SEGMENT_DELIMITER)
    }

    /// Appends one hop to the chain.
    pub fn child(&self, segment: &str) -> Result<Self, GuardError> {
        if segment.is_empty() || segment.contains(SEGMENT_DELIMITER) {
            return Err(GuardError::InvalidContext(segment.to_string()));
        }
        Ok(Self(format!("{}{}{}", self.0, SEGMENT_DELIMITER, segment)))
    }

    /// The chain one hop up, or `None` for a top-level token.
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rfind(SEGMENT_DELIMITER)
            .map(|idx| Self(self.0[..idx].to_string()))
    }

    /// True when `self` equals `ancestor` or continues it by whole segments.
    pub fn extends(&self, ancestor: &CallChain) -> bool {
        match self.0.strip_prefix(ancestor.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with(SEGMENT_DELIMITER),
            None => false,
        }
    }
}

impl fmt::Display for CallChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CallChain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CallChain {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for CallChain {
    type Error = GuardError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for CallChain {
    type Error = GuardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CallChain> for String {
    fn from(chain: CallChain) -> Self {
        chain.0
    }
}
