//! Choices presented by the story.

use serde::Serialize;

use crate::value::Value;

/// A choice the story currently offers.
///
/// Choices only come out of the engine; the index is whatever the engine
/// assigned and is only meaningful for the turn that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    index: i64,
    text: String,
}

impl Choice {
    /// The engine-assigned index to pass back when choosing.
    pub fn index(&self) -> i64 {
        self.index
    }

    /// The display text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Build a choice from one raw engine record, if it has both an integer
    /// `index` and a string `text`.
    pub(crate) fn from_value(raw: &Value) -> Option<Self> {
        let index = raw.get("index").and_then(Value::as_int)?;
        let text = raw.get("text").and_then(Value::as_text)?;
        Some(Self {
            index,
            text: text.to_string(),
        })
    }
}

/// Convert the engine's raw choice list, dropping malformed records and
/// keeping emission order.
pub(crate) fn choices_from_value(raw: &Value) -> Vec<Choice> {
    raw.as_list()
        .map(|items| items.iter().filter_map(Choice::from_value).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn record(index: Option<Value>, text: Option<Value>) -> Value {
        let mut map = BTreeMap::new();
        if let Some(i) = index {
            map.insert("index".to_string(), i);
        }
        if let Some(t) = text {
            map.insert("text".to_string(), t);
        }
        Value::Map(map)
    }

    #[test]
    fn well_formed_records_convert() {
        let raw = Value::List(vec![
            record(Some(Value::Int(4)), Some(Value::from("Go left"))),
            record(Some(Value::Int(1)), Some(Value::from("Go right"))),
        ]);
        let choices = choices_from_value(&raw);
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[0].index(), 4);
        assert_eq!(choices[0].text(), "Go left");
        assert_eq!(choices[1].index(), 1);
    }

    #[test]
    fn malformed_records_are_dropped() {
        let raw = Value::List(vec![
            record(None, Some(Value::from("no index"))),
            record(Some(Value::Int(0)), None),
            record(Some(Value::from("zero")), Some(Value::from("bad index"))),
            Value::from("not a record"),
            record(Some(Value::Int(2)), Some(Value::from("ok"))),
        ]);
        let choices = choices_from_value(&raw);
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0].index(), 2);
    }

    #[test]
    fn non_list_yields_nothing() {
        assert!(choices_from_value(&Value::Null).is_empty());
        assert!(choices_from_value(&Value::from("x")).is_empty());
    }
}
