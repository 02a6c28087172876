//! Configuration for a story session.

use std::collections::BTreeSet;

use crate::tags::DEFAULT_RETAINED_TAG;

/// Configuration for a story session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Tag keys whose values persist across turns until overwritten.
    pub retained_tags: BTreeSet<String>,
    /// Whether save envelopes are pretty-printed.
    pub pretty_saves: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retained_tags: BTreeSet::from([DEFAULT_RETAINED_TAG.to_string()]),
            pretty_saves: true,
        }
    }
}

impl SessionConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a retained tag key.
    pub fn with_retained_tag(mut self, key: impl Into<String>) -> Self {
        self.retained_tags.insert(key.into());
        self
    }

    /// Replace the retained tag keys.
    pub fn with_retained_tags<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retained_tags = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Retain no tags at all.
    pub fn without_retained_tags(mut self) -> Self {
        self.retained_tags.clear();
        self
    }

    /// Set whether save envelopes are pretty-printed.
    pub fn with_pretty_saves(mut self, pretty: bool) -> Self {
        self.pretty_saves = pretty;
        self
    }
}
