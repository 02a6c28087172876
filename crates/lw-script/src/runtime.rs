//! The story machine and its [`StoryEngine`] implementation.

use std::collections::{BTreeMap, BTreeSet};

use lw_session::{EngineError, StateToken, StoryEngine, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ast::{AssignOp, Expr};
use crate::diagnostics::Diagnostic;
use crate::error::ScriptError;
use crate::eval;
use crate::story::{Instruction, Story, Target};

/// Instructions executed by one advance before the story is declared stuck.
const MAX_STEPS: usize = 10_000;

/// A choice currently offered to the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentedChoice {
    /// Position in the presented list.
    pub index: i64,
    /// Rendered choice text.
    pub text: String,
    /// Address of the choice body.
    pub target: usize,
    /// Story-wide choice id.
    pub id: usize,
    /// Whether taking it leaves it available.
    pub sticky: bool,
}

/// Everything that changes while a story runs. Saved and restored whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    /// Next instruction to execute.
    pub pc: usize,
    /// Current variable values.
    pub variables: BTreeMap<String, Value>,
    /// Text of the last produced line, with a trailing newline.
    pub current_text: String,
    /// Raw tags of the last produced line.
    pub current_tags: Vec<String>,
    /// Choices waiting for the reader.
    pub choices: Vec<PresentedChoice>,
    /// Whether another line can be produced without a choice.
    pub can_continue: bool,
    /// Ids of once-only choices already taken.
    pub consumed: BTreeSet<usize>,
    /// Errors raised by the last operation.
    pub errors: Vec<String>,
    /// Number of choices taken so far.
    pub turn: u64,
}

/// How a run of the machine stopped.
enum Stop {
    Line,
    Halt,
}

impl MachineState {
    fn start(story: &Story) -> Self {
        let mut state = Self {
            variables: story.variables.clone(),
            ..Default::default()
        };
        state.look_ahead(story);
        state
    }

    fn lookup(&self) -> impl Fn(&str) -> Option<Value> + '_ {
        move |name: &str| self.variables.get(name).cloned()
    }

    fn record(&mut self, err: ScriptError) {
        warn!(pc = self.pc, "story error: {err}");
        self.errors.push(err.to_string());
    }

    fn clear_output(&mut self) {
        self.current_text.clear();
        self.current_tags.clear();
        self.choices.clear();
        self.errors.clear();
    }

    /// The choices of a group the reader may still pick.
    fn available(&self, story: &Story, group: usize) -> Vec<PresentedChoice> {
        let Some(group) = story.choice_groups.get(group) else {
            return Vec::new();
        };
        let lookup = self.lookup();
        group
            .choices
            .iter()
            .filter(|def| def.sticky || !self.consumed.contains(&def.id))
            .enumerate()
            .map(|(index, def)| PresentedChoice {
                index: index as i64,
                text: eval::render(&def.display, &lookup),
                target: def.target,
                id: def.id,
                sticky: def.sticky,
            })
            .collect()
    }

    fn fallthrough(story: &Story, group: usize) -> usize {
        story
            .choice_groups
            .get(group)
            .map(|g| g.fallthrough)
            .unwrap_or(story.instructions.len())
    }

    fn assign(&mut self, var: &str, op: AssignOp, expr: &Expr) {
        let Some(old) = self.variables.get(var).cloned() else {
            self.record(ScriptError::UndeclaredVariable(var.to_string()));
            return;
        };
        let result = eval::evaluate(expr, &self.lookup()).and_then(|new| eval::assign(op, old, new));
        match result {
            Ok(value) => {
                debug!(var, %value, "assigned");
                self.variables.insert(var.to_string(), value);
            }
            Err(e) => self.record(e),
        }
    }

    /// Execute until a line is produced or the story halts.
    fn run(&mut self, story: &Story) -> Stop {
        for _ in 0..MAX_STEPS {
            let Some(instruction) = story.instructions.get(self.pc) else {
                return Stop::Halt;
            };
            match instruction {
                Instruction::Line { text, tags } => {
                    let mut rendered = eval::render(text, &self.lookup());
                    rendered.push('\n');
                    self.current_text = rendered;
                    self.current_tags = tags.clone();
                    self.pc += 1;
                    return Stop::Line;
                }
                Instruction::Assign { var, op, expr } => {
                    self.assign(var, *op, expr);
                    self.pc += 1;
                }
                Instruction::Divert {
                    target: Target::Address(address),
                } => self.pc = *address,
                Instruction::Divert {
                    target: Target::End | Target::Done,
                }
                | Instruction::End => return Stop::Halt,
                Instruction::Choices { group } => {
                    let choices = self.available(story, *group);
                    if !choices.is_empty() {
                        self.choices = choices;
                        return Stop::Halt;
                    }
                    self.pc = Self::fallthrough(story, *group);
                }
            }
        }
        self.record(ScriptError::Runtime(format!(
            "no output after {MAX_STEPS} steps"
        )));
        Stop::Halt
    }

    /// Decide whether another line is coming without running any logic.
    ///
    /// Only diverts and exhausted choice groups are followed. Available
    /// choices are presented here, so they appear with the line before them.
    fn look_ahead(&mut self, story: &Story) {
        let mut pc = self.pc;
        for _ in 0..MAX_STEPS {
            match story.instructions.get(pc) {
                None
                | Some(Instruction::End)
                | Some(Instruction::Divert {
                    target: Target::End | Target::Done,
                }) => {
                    self.can_continue = false;
                    return;
                }
                Some(Instruction::Divert {
                    target: Target::Address(address),
                }) => pc = *address,
                Some(Instruction::Choices { group }) => {
                    let choices = self.available(story, *group);
                    if choices.is_empty() {
                        pc = Self::fallthrough(story, *group);
                        continue;
                    }
                    self.pc = pc;
                    self.choices = choices;
                    self.can_continue = false;
                    return;
                }
                Some(Instruction::Line { .. } | Instruction::Assign { .. }) => {
                    self.can_continue = true;
                    return;
                }
            }
        }
        self.can_continue = false;
    }

    fn check(&self, story: &Story) -> Result<(), ScriptError> {
        let len = story.instructions.len();
        if self.pc > len {
            return Err(ScriptError::Format(format!(
                "position {} is outside the story",
                self.pc
            )));
        }
        if let Some(choice) = self.choices.iter().find(|c| c.target >= len) {
            return Err(ScriptError::Format(format!(
                "choice '{}' points outside the story",
                choice.text
            )));
        }
        if let Some(name) = self
            .variables
            .keys()
            .find(|name| !story.variables.contains_key(*name))
        {
            return Err(ScriptError::UndeclaredVariable(name.clone()));
        }
        Ok(())
    }
}

/// The reference story engine: compiler, interpreter and machine state.
#[derive(Debug, Clone, Default)]
pub struct ScriptEngine {
    story: Option<Story>,
    state: MachineState,
    diagnostics: Vec<Diagnostic>,
}

impl ScriptEngine {
    /// An engine with no story loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// The loaded story, if any.
    pub fn story(&self) -> Option<&Story> {
        self.story.as_ref()
    }

    /// The current machine state.
    pub fn machine(&self) -> &MachineState {
        &self.state
    }

    /// Errors and warnings from the last `load_source`, empty after a
    /// compiled story was loaded.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn install(&mut self, story: Story) {
        info!(
            instructions = story.instructions.len(),
            knots = story.paths.len(),
            "story loaded"
        );
        self.state = MachineState::start(&story);
        self.story = Some(story);
    }

    fn loaded(&self) -> Result<&Story, ScriptError> {
        self.story.as_ref().ok_or(ScriptError::NotLoaded)
    }

    fn present(choices: &[PresentedChoice]) -> Value {
        Value::List(
            choices
                .iter()
                .map(|c| {
                    Value::Map(BTreeMap::from([
                        ("index".to_string(), Value::Int(c.index)),
                        ("text".to_string(), Value::Str(c.text.clone())),
                    ]))
                })
                .collect(),
        )
    }

    fn strings(items: &[String]) -> Value {
        Value::List(items.iter().cloned().map(Value::Str).collect())
    }
}

impl StoryEngine for ScriptEngine {
    fn load_source(&mut self, source: &str) -> Result<(), EngineError> {
        let result = crate::compile_source(source);
        let messages = result.error_messages();
        self.diagnostics = result.diagnostics;
        match result.story {
            Some(story) if messages.is_empty() => {
                self.install(story);
                Ok(())
            }
            _ => {
                warn!(errors = messages.len(), "story failed to compile");
                Err(ScriptError::Compile(messages).into())
            }
        }
    }

    fn load_compiled(&mut self, data: &str) -> Result<(), EngineError> {
        let story = Story::from_json(data)?;
        self.diagnostics.clear();
        self.install(story);
        Ok(())
    }

    fn advance(&mut self) -> Result<(), EngineError> {
        let story = self.story.as_ref().ok_or(ScriptError::NotLoaded)?;
        let state = &mut self.state;
        if !state.can_continue {
            return Ok(());
        }
        state.clear_output();
        match state.run(story) {
            Stop::Line => state.look_ahead(story),
            Stop::Halt => state.can_continue = false,
        }
        debug!(pc = state.pc, can_continue = state.can_continue, "advanced");
        Ok(())
    }

    fn current_text(&self) -> Value {
        Value::Str(self.state.current_text.clone())
    }

    fn can_continue(&self) -> Value {
        Value::Bool(self.story.is_some() && self.state.can_continue)
    }

    fn current_choices(&self) -> Value {
        Self::present(&self.state.choices)
    }

    fn global_tags(&self) -> Value {
        self.story
            .as_ref()
            .map(|story| Self::strings(&story.global_tags))
            .unwrap_or_else(|| Value::List(Vec::new()))
    }

    fn current_tags(&self) -> Value {
        Self::strings(&self.state.current_tags)
    }

    fn current_errors(&self) -> Value {
        Self::strings(&self.state.errors)
    }

    fn choose_choice_index(&mut self, index: i64) -> Result<(), EngineError> {
        let story = self.story.as_ref().ok_or(ScriptError::NotLoaded)?;
        let state = &mut self.state;
        let choice = state
            .choices
            .iter()
            .find(|c| c.index == index)
            .cloned()
            .ok_or(ScriptError::InvalidChoice(index))?;

        if !choice.sticky {
            state.consumed.insert(choice.id);
        }
        state.clear_output();
        state.pc = choice.target;
        state.turn += 1;
        state.look_ahead(story);
        debug!(index, text = %choice.text, "choice taken");
        Ok(())
    }

    fn choose_path(&mut self, path: &str) -> Result<(), EngineError> {
        let story = self.story.as_ref().ok_or(ScriptError::NotLoaded)?;
        let address = story
            .resolve_path(path)
            .ok_or_else(|| ScriptError::UnknownPath(path.to_string()))?;
        let state = &mut self.state;
        state.clear_output();
        state.pc = address;
        state.look_ahead(story);
        debug!(path, address, "moved to path");
        Ok(())
    }

    fn variable(&self, name: &str) -> Value {
        self.state.variables.get(name).cloned().unwrap_or_default()
    }

    fn set_variable(&mut self, name: &str, value: Value) -> Result<(), EngineError> {
        self.loaded()?;
        if !self.state.variables.contains_key(name) {
            return Err(ScriptError::UndeclaredVariable(name.to_string()).into());
        }
        if matches!(value, Value::Null | Value::List(_) | Value::Map(_)) {
            return Err(ScriptError::Runtime(format!(
                "cannot store a {} in '{name}'",
                eval::kind(&value)
            ))
            .into());
        }
        self.state.variables.insert(name.to_string(), value);
        Ok(())
    }

    fn save_state(&self) -> Result<String, EngineError> {
        self.loaded()?;
        serde_json::to_string(&self.state).map_err(|e| EngineError::State(e.to_string()))
    }

    fn load_state(&mut self, token: &StateToken) -> Result<(), EngineError> {
        let story = self.loaded()?;
        let state: MachineState = serde_json::from_str(&token.unescape())
            .map_err(|e| EngineError::State(e.to_string()))?;
        state
            .check(story)
            .map_err(|e| EngineError::State(e.to_string()))?;
        self.state = state;
        info!(pc = self.state.pc, turn = self.state.turn, "machine state restored");
        Ok(())
    }
}
