//! Save-state envelope and the escaped state token.
//!
//! The envelope pairs the engine's opaque state blob with the session's
//! current tags. The blob is never inspected here.

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};
use crate::tags::TagMap;

/// A portable snapshot of a running story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveState {
    /// Engine machine state, exactly as the engine produced it.
    pub json_state: String,
    /// Current tags at save time, after retention was applied.
    pub current_tags: TagMap,
}

impl SaveState {
    /// Pair an engine state blob with a tag snapshot.
    pub fn new(json_state: impl Into<String>, current_tags: TagMap) -> Self {
        Self {
            json_state: json_state.into(),
            current_tags,
        }
    }

    /// Render the envelope as JSON with `jsonState` before `currentTags`.
    pub fn encode(&self, pretty: bool) -> SessionResult<String> {
        let encoded = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        encoded.map_err(SessionError::Encode)
    }

    /// Parse an envelope produced by [`SaveState::encode`].
    pub fn decode(text: &str) -> SessionResult<Self> {
        serde_json::from_str(text).map_err(SessionError::Decode)
    }

    /// The state blob escaped into a single token for the engine.
    pub fn token(&self) -> StateToken {
        StateToken::escape(&self.json_state)
    }
}

/// An engine state blob escaped so it can travel as one quoted token.
///
/// Backslash, both quote characters, newline and carriage return are
/// backslash-escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateToken(String);

impl StateToken {
    /// Escape a raw state blob.
    pub fn escape(raw: &str) -> Self {
        let mut out = String::with_capacity(raw.len());
        for c in raw.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '"' => out.push_str("\\\""),
                '\'' => out.push_str("\\'"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                other => out.push(other),
            }
        }
        Self(out)
    }

    /// The escaped text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the raw blob.
    ///
    /// Unknown escape sequences are kept verbatim.
    pub fn unescape(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut chars = self.0.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('\'') => out.push('\''),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SaveState {
        let mut tags = TagMap::new();
        tags.insert("IMAGE".into(), "harbor.png".into());
        tags.insert("mood".into(), "calm".into());
        SaveState::new(r#"{"pc":4,"vars":{"name":"O'Brien"}}"#, tags)
    }

    #[test]
    fn envelope_rendering() {
        insta::assert_snapshot!(sample().encode(true).unwrap(), @r###"
        {
          "jsonState": "{\"pc\":4,\"vars\":{\"name\":\"O'Brien\"}}",
          "currentTags": {
            "IMAGE": "harbor.png",
            "mood": "calm"
          }
        }
        "###);
    }

    #[test]
    fn compact_rendering_keeps_field_order() {
        let text = sample().encode(false).unwrap();
        let state_at = text.find("jsonState").unwrap();
        let tags_at = text.find("currentTags").unwrap();
        assert!(state_at < tags_at);
        assert!(!text.contains('\n'));
    }

    #[test]
    fn decode_accepts_encoded() {
        let state = sample();
        let decoded = SaveState::decode(&state.encode(true).unwrap()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            SaveState::decode("not json"),
            Err(SessionError::Decode(_))
        ));
        assert!(matches!(
            SaveState::decode(r#"{"jsonState": "x"}"#),
            Err(SessionError::Decode(_))
        ));
    }

    #[test]
    fn token_escapes_each_special_character() {
        let token = StateToken::escape("a\\b\"c'd\ne\rf");
        assert_eq!(token.as_str(), r#"a\\b\"c\'d\ne\rf"#);
    }

    #[test]
    fn token_unescapes_to_the_raw_blob() {
        let raw = "{\"text\":\"line one\\nline two\"}\r\n'quoted'";
        assert_eq!(StateToken::escape(raw).unescape(), raw);
    }

    #[test]
    fn escaped_token_has_no_raw_breaks_or_quotes() {
        let token = sample().token();
        assert!(!token.as_str().contains('\n'));
        assert!(
            token
                .as_str()
                .match_indices('"')
                .all(|(i, _)| token.as_str()[..i].ends_with('\\'))
        );
    }
}
