//! Tag parsing and the turn-to-turn retention policy.
//!
//! A raw tag is either `key:value` or a bare `key`. Only the first `:` splits;
//! the value is trimmed and may itself contain colons. Bare tags map to
//! themselves.

use std::collections::{BTreeMap, BTreeSet};

/// Parsed tags keyed by tag name.
pub type TagMap = BTreeMap<String, String>;

/// The tag key retained across turns unless configured otherwise.
pub const DEFAULT_RETAINED_TAG: &str = "IMAGE";

/// Split one raw tag into its key and value.
pub fn parse_tag(raw: &str) -> (String, String) {
    match raw.split_once(':') {
        Some((key, value)) => (key.to_string(), value.trim().to_string()),
        None => (raw.to_string(), raw.to_string()),
    }
}

/// Parse a sequence of raw tags. Later duplicates overwrite earlier ones.
pub fn parse_tags<I, S>(raw: I) -> TagMap
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags = TagMap::new();
    merge_tags(&mut tags, raw);
    tags
}

/// Parse raw tags into an existing map, overwriting keys that repeat.
pub fn merge_tags<I, S>(tags: &mut TagMap, raw: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for tag in raw {
        let (key, value) = parse_tag(tag.as_ref());
        tags.insert(key, value);
    }
}

/// Decides which current-tag keys outlive the turn that set them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRetention {
    retained: BTreeSet<String>,
}

impl Default for TagRetention {
    fn default() -> Self {
        Self::new([DEFAULT_RETAINED_TAG])
    }
}

impl TagRetention {
    /// Retain the given keys.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            retained: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Retain nothing: every tag lives for one turn only.
    pub fn none() -> Self {
        Self {
            retained: BTreeSet::new(),
        }
    }

    /// The retained keys.
    pub fn keys(&self) -> &BTreeSet<String> {
        &self.retained
    }

    /// Whether `key` survives turn boundaries.
    pub fn retains(&self, key: &str) -> bool {
        self.retained.contains(key)
    }

    /// Drop every key of `previous` that is not retained.
    pub fn prune(&self, previous: &TagMap) -> TagMap {
        previous
            .iter()
            .filter(|(key, _)| self.retains(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Compute the next turn's current tags.
    ///
    /// Retained keys keep their previous value unless the new turn sets them
    /// again; everything else comes only from `raw`.
    pub fn next_turn<I, S>(&self, previous: &TagMap, raw: I) -> TagMap
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags = self.prune(previous);
        merge_tags(&mut tags, raw);
        tags
    }
}
