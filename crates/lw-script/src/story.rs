//! The compiled story: a flat instruction list plus lookup tables.
//!
//! This is the form `compile` writes to disk and the engine loads back. It is
//! plain JSON through serde.

use std::collections::BTreeMap;

use lw_session::Value;
use serde::{Deserialize, Serialize};

use crate::ast::{AssignOp, Expr, Segment};
use crate::error::ScriptError;

/// Version written into every compiled story.
pub const FORMAT_VERSION: u32 = 1;

/// Where a divert or choice leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// An instruction address.
    Address(usize),
    /// `END`: the story is over.
    End,
    /// `DONE`: this flow is over. Treated like `END`.
    Done,
}

/// One step of the story machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// Output a line of text with its tags.
    Line {
        /// The text to render.
        text: Vec<Segment>,
        /// Raw tags attached to the line.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
    },
    /// Update a variable.
    Assign {
        /// The variable written.
        var: String,
        /// How the value is combined.
        #[serde(rename = "assign")]
        op: AssignOp,
        /// The right-hand side.
        expr: Expr,
    },
    /// Jump.
    Divert {
        /// Where to go.
        target: Target,
    },
    /// Present a choice group.
    Choices {
        /// Index into [`Story::choice_groups`].
        group: usize,
    },
    /// Stop.
    End,
}

/// A single choice in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDef {
    /// Story-wide choice id, used to remember once-only choices.
    pub id: usize,
    /// Text shown in the choice list.
    pub display: Vec<Segment>,
    /// Whether the choice stays available after being taken.
    #[serde(default)]
    pub sticky: bool,
    /// Address of the choice body.
    pub target: usize,
}

/// The choices presented together at one point of the story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceGroup {
    /// Choices in presentation order.
    pub choices: Vec<ChoiceDef>,
    /// Where to go once every choice has been used up.
    pub fallthrough: usize,
}

/// A compiled story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// Compiled format version.
    pub format_version: u32,
    /// Raw story-wide tags.
    #[serde(default)]
    pub global_tags: Vec<String>,
    /// Declared variables and their initial values.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Knot and `knot.stitch` paths mapped to their addresses.
    #[serde(default)]
    pub paths: BTreeMap<String, usize>,
    /// The instruction list. Execution starts at address 0.
    pub instructions: Vec<Instruction>,
    /// Choice groups referenced by [`Instruction::Choices`].
    #[serde(default)]
    pub choice_groups: Vec<ChoiceGroup>,
}

impl Story {
    /// Parse a compiled story and check it is internally consistent.
    pub fn from_json(data: &str) -> Result<Self, ScriptError> {
        let story: Story =
            serde_json::from_str(data).map_err(|e| ScriptError::Format(e.to_string()))?;
        story.validate()?;
        Ok(story)
    }

    /// Render as compact JSON.
    pub fn to_json(&self) -> Result<String, ScriptError> {
        serde_json::to_string(self).map_err(|e| ScriptError::Format(e.to_string()))
    }

    /// Render as indented JSON.
    pub fn to_json_pretty(&self) -> Result<String, ScriptError> {
        serde_json::to_string_pretty(self).map_err(|e| ScriptError::Format(e.to_string()))
    }

    /// Look up a knot or `knot.stitch` path.
    pub fn resolve_path(&self, path: &str) -> Option<usize> {
        self.paths.get(path).copied()
    }

    /// Check version, addresses and group references.
    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.format_version != FORMAT_VERSION {
            return Err(ScriptError::Version {
                found: self.format_version,
                expected: FORMAT_VERSION,
            });
        }
        if self.instructions.is_empty() {
            return Err(ScriptError::Format("story has no instructions".into()));
        }

        let len = self.instructions.len();
        let check = |address: usize, what: &str| {
            if address < len {
                Ok(())
            } else {
                Err(ScriptError::Format(format!(
                    "{what} points past the end of the story ({address} >= {len})"
                )))
            }
        };

        for (path, &address) in &self.paths {
            check(address, &format!("path '{path}'"))?;
        }
        for instruction in &self.instructions {
            match instruction {
                Instruction::Divert {
                    target: Target::Address(address),
                } => check(*address, "divert")?,
                Instruction::Choices { group } if *group >= self.choice_groups.len() => {
                    return Err(ScriptError::Format(format!("unknown choice group {group}")));
                }
                _ => {}
            }
        }
        for group in &self.choice_groups {
            check(group.fallthrough, "choice fallthrough")?;
            for choice in &group.choices {
                check(choice.target, "choice target")?;
            }
        }
        Ok(())
    }
}
