use std::collections::BTreeMap;

use lw_session::Value;
use strsim::jaro_winkler;

use crate::ast::*;
use crate::diagnostics::{Diagnostic, Severity, Summary};
use crate::eval;
use crate::story::{ChoiceDef, ChoiceGroup, FORMAT_VERSION, Instruction, Story, Target};

/// Minimum similarity for a "did you mean" suggestion (0.0-1.0).
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Result of compiling story source.
#[derive(Debug)]
pub struct CompileResult {
    /// The compiled story, absent when any error was reported.
    pub story: Option<Story>,
    /// Errors and warnings produced during compilation.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileResult {
    /// Returns `true` if any diagnostic has error severity.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Error and warning counts.
    pub fn summary(&self) -> Summary {
        Summary::of(&self.diagnostics)
    }

    /// The messages of all error diagnostics.
    pub fn error_messages(&self) -> Vec<String> {
        self.diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| d.message.clone())
            .collect()
    }
}

/// Compile a parsed story into its instruction form.
///
/// Variables are collected first so `VAR` lines may appear anywhere. Diverts
/// are resolved after every knot and stitch is known.
pub fn compile(file: &StoryFile) -> CompileResult {
    let mut compiler = Compiler::default();
    compiler.declare_variables(file);
    for stmt in &file.statements {
        compiler.statement(stmt);
    }
    compiler.close_section();
    compiler.resolve_diverts();
    compiler.finish()
}

/// The knot or stitch currently receiving instructions.
#[derive(Default)]
struct Section {
    knot: Option<String>,
    stitch: Option<String>,
    start: usize,
    span: Span,
}

/// A choice group whose gather point is not known yet.
struct OpenGroup {
    group: usize,
    /// Divert placeholders at the end of every body but the last.
    body_exits: Vec<usize>,
}

/// A divert waiting for all paths to be defined.
struct PendingDivert {
    at: usize,
    target: Spanned<String>,
    knot: Option<String>,
}

#[derive(Default)]
struct Compiler {
    instructions: Vec<Instruction>,
    paths: BTreeMap<String, usize>,
    path_spans: BTreeMap<String, Span>,
    global_tags: Vec<String>,
    variables: BTreeMap<String, Value>,
    variable_spans: BTreeMap<String, Span>,
    choice_groups: Vec<ChoiceGroup>,
    diagnostics: Vec<Diagnostic>,
    section: Section,
    pending_tags: Vec<String>,
    open_group: Option<OpenGroup>,
    diverts: Vec<PendingDivert>,
    next_choice_id: usize,
    emitted_line: bool,
}

impl Compiler {
    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(span, message));
    }

    fn undeclared(&mut self, span: Span, name: &str) {
        self.diagnostics.push(
            Diagnostic::error(span, format!("variable '{name}' is not declared"))
                .with_help(format!("declare it with `VAR {name} = ...`")),
        );
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        let at = self.instructions.len();
        if matches!(instruction, Instruction::Line { .. }) {
            self.emitted_line = true;
        }
        self.instructions.push(instruction);
        at
    }

    // -- Variables --

    fn declare_variables(&mut self, file: &StoryFile) {
        for stmt in &file.statements {
            let Stmt::VarDecl { name, value } = &stmt.node else {
                continue;
            };
            if let Some(first) = self.variable_spans.get(name) {
                let diagnostic = Diagnostic::error(
                    stmt.span.clone(),
                    format!("variable '{name}' is declared more than once"),
                )
                .with_note(first.clone(), "first declared here");
                self.diagnostics.push(diagnostic);
                continue;
            }
            self.variable_spans.insert(name.clone(), stmt.span.clone());
            let initial = eval::evaluate(value, &|n: &str| self.variables.get(n).cloned());
            match initial {
                Ok(v) => {
                    self.variables.insert(name.clone(), v);
                }
                Err(e) => self.error(
                    stmt.span.clone(),
                    format!("cannot evaluate initial value of '{name}': {e}"),
                ),
            }
        }
    }

    fn check_expr(&mut self, expr: &Expr, span: &Span) {
        let unknown: Vec<String> = expr
            .variables()
            .into_iter()
            .filter(|name| !self.variables.contains_key(*name))
            .map(str::to_string)
            .collect();
        for name in unknown {
            self.undeclared(span.clone(), &name);
        }
    }

    fn check_segments(&mut self, segments: &[Segment], span: &Span) {
        for segment in segments {
            if let Segment::Var(name) = segment
                && !self.variables.contains_key(name)
            {
                self.undeclared(span.clone(), name);
            }
        }
    }

    // -- Statements --

    fn statement(&mut self, stmt: &Spanned<Stmt>) {
        let span = &stmt.span;
        match &stmt.node {
            Stmt::Knot(name) => self.knot(name, span),
            Stmt::Stitch(name) => self.stitch(name, span),
            Stmt::VarDecl { .. } => {}
            Stmt::Logic(assignment) => self.logic(assignment, span),
            Stmt::Content(content) => self.content(content, span),
            Stmt::Choice(choice) => self.choice(choice, span),
            Stmt::Gather(content) => {
                let gather = self.instructions.len();
                self.close_group(gather);
                self.content(content, span);
            }
            Stmt::Divert(target) => self.divert(target.clone()),
            Stmt::Tags(tags) => {
                if self.section.knot.is_none() && !self.emitted_line {
                    self.global_tags.extend(tags.iter().cloned());
                } else {
                    self.pending_tags.extend(tags.iter().cloned());
                }
            }
        }
    }

    fn define_path(&mut self, path: String, span: &Span) {
        if let Some(first) = self.path_spans.get(&path) {
            let diagnostic =
                Diagnostic::error(span.clone(), format!("'{path}' is defined more than once"))
                    .with_note(first.clone(), "first defined here");
            self.diagnostics.push(diagnostic);
            return;
        }
        self.path_spans.insert(path.clone(), span.clone());
        self.paths.insert(path, self.instructions.len());
    }

    fn knot(&mut self, name: &str, span: &Span) {
        self.close_section();
        self.define_path(name.to_string(), span);
        self.section = Section {
            knot: Some(name.to_string()),
            stitch: None,
            start: self.instructions.len(),
            span: span.clone(),
        };
    }

    fn stitch(&mut self, name: &str, span: &Span) {
        let Some(knot) = self.section.knot.clone() else {
            self.diagnostics.push(
                Diagnostic::error(span.clone(), format!("stitch '{name}' is not inside a knot"))
                    .with_help("start a knot with `=== name ===` before its stitches"),
            );
            return;
        };
        // A knot with no content of its own starts at its first stitch.
        let knot_is_empty =
            self.section.stitch.is_none() && self.instructions.len() == self.section.start;
        if !knot_is_empty {
            self.close_section();
        }
        self.define_path(format!("{knot}.{name}"), span);
        self.section = Section {
            knot: Some(knot),
            stitch: Some(name.to_string()),
            start: self.instructions.len(),
            span: span.clone(),
        };
    }

    fn close_section(&mut self) {
        if !self.pending_tags.is_empty() {
            let span = self.section.span.clone();
            self.pending_tags.clear();
            self.diagnostics.push(Diagnostic::warning(
                span,
                "tags at the end of a section are not attached to any line",
            ));
        }

        let empty = self.instructions.len() == self.section.start;
        let end = self.emit(Instruction::End);
        self.close_group(end);

        if empty && let Some(knot) = &self.section.knot {
            let message = match &self.section.stitch {
                Some(stitch) => format!("stitch '{knot}.{stitch}' has no content"),
                None => format!("knot '{knot}' has no content"),
            };
            self.diagnostics.push(
                Diagnostic::warning(self.section.span.clone(), message)
                    .with_help("add a line, or divert somewhere with `->`"),
            );
        }
    }

    fn logic(&mut self, assignment: &Assignment, span: &Span) {
        let name = &assignment.name.node;
        if !self.variables.contains_key(name) {
            self.undeclared(assignment.name.span.clone(), name);
        }
        self.check_expr(&assignment.expr, span);
        self.emit(Instruction::Assign {
            var: name.clone(),
            op: assignment.op,
            expr: assignment.expr.clone(),
        });
    }

    fn content(&mut self, content: &Content, span: &Span) {
        let mut tags = std::mem::take(&mut self.pending_tags);
        tags.extend(content.tags.iter().cloned());

        if !content.is_blank() {
            self.check_segments(&content.segments, span);
            self.emit(Instruction::Line {
                text: content.segments.clone(),
                tags,
            });
        } else {
            self.pending_tags = tags;
        }

        if let Some(target) = &content.divert {
            self.divert(target.clone());
        }
    }

    fn divert(&mut self, target: Spanned<String>) {
        let at = self.emit(Instruction::Divert {
            target: Target::End,
        });
        self.diverts.push(PendingDivert {
            at,
            target,
            knot: self.section.knot.clone(),
        });
    }

    // -- Choices --

    fn choice(&mut self, choice: &ChoiceLine, span: &Span) {
        let group = match self.open_group.as_ref().map(|open| open.group) {
            Some(group) => {
                let exit = self.emit(Instruction::Divert {
                    target: Target::End,
                });
                if let Some(open) = &mut self.open_group {
                    open.body_exits.push(exit);
                }
                group
            }
            None => {
                let group = self.choice_groups.len();
                self.choice_groups.push(ChoiceGroup {
                    choices: Vec::new(),
                    fallthrough: 0,
                });
                self.emit(Instruction::Choices { group });
                self.open_group = Some(OpenGroup {
                    group,
                    body_exits: Vec::new(),
                });
                group
            }
        };

        self.check_segments(&choice.display, span);
        let def = ChoiceDef {
            id: self.next_choice_id,
            display: choice.display.clone(),
            sticky: choice.sticky,
            target: self.instructions.len(),
        };
        self.next_choice_id += 1;
        if let Some(g) = self.choice_groups.get_mut(group) {
            g.choices.push(def);
        }

        self.content(&choice.echo, span);
    }

    fn close_group(&mut self, gather: usize) {
        let Some(open) = self.open_group.take() else {
            return;
        };
        for exit in open.body_exits {
            if let Some(slot) = self.instructions.get_mut(exit) {
                *slot = Instruction::Divert {
                    target: Target::Address(gather),
                };
            }
        }
        if let Some(group) = self.choice_groups.get_mut(open.group) {
            group.fallthrough = gather;
        }
    }

    // -- Diverts --

    fn resolve(&self, name: &str, knot: Option<&str>) -> Option<Target> {
        match name {
            "END" => return Some(Target::End),
            "DONE" => return Some(Target::Done),
            _ => {}
        }
        if !name.contains('.')
            && let Some(knot) = knot
            && let Some(&address) = self.paths.get(&format!("{knot}.{name}"))
        {
            return Some(Target::Address(address));
        }
        self.paths.get(name).map(|&address| Target::Address(address))
    }

    fn suggest(&self, name: &str) -> Option<String> {
        let lower = name.to_lowercase();
        self.paths
            .keys()
            .map(String::as_str)
            .chain(["END", "DONE"])
            .map(|candidate| (candidate, jaro_winkler(&lower, &candidate.to_lowercase())))
            .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(candidate, _)| candidate.to_string())
    }

    fn resolve_diverts(&mut self) {
        for pending in std::mem::take(&mut self.diverts) {
            let name = &pending.target.node;
            match self.resolve(name, pending.knot.as_deref()) {
                Some(target) => {
                    if let Some(slot) = self.instructions.get_mut(pending.at) {
                        *slot = Instruction::Divert { target };
                    }
                }
                None => {
                    let mut diagnostic = Diagnostic::error(
                        pending.target.span.clone(),
                        format!("unknown divert target '{name}'"),
                    )
                    .with_label("no knot or stitch with this name");
                    if let Some(s) = self.suggest(name) {
                        diagnostic = diagnostic.with_help(format!("did you mean '{s}'?"));
                    }
                    self.diagnostics.push(diagnostic);
                }
            }
        }
    }

    fn finish(self) -> CompileResult {
        let has_errors = self.diagnostics.iter().any(Diagnostic::is_error);
        let story = (!has_errors).then(|| Story {
            format_version: FORMAT_VERSION,
            global_tags: self.global_tags,
            variables: self.variables,
            paths: self.paths,
            instructions: self.instructions,
            choice_groups: self.choice_groups,
        });
        CompileResult {
            story,
            diagnostics: self.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn compile_str(source: &str) -> CompileResult {
        let (file, errors) = parse(source);
        assert!(errors.is_empty(), "parse errors: {errors:?}");
        compile(&file)
    }

    fn story(source: &str) -> Story {
        let result = compile_str(source);
        assert!(!result.has_errors(), "diagnostics: {:?}", result.diagnostics);
        result.story.unwrap()
    }

    fn line(text: &str) -> Instruction {
        Instruction::Line {
            text: vec![Segment::Text(text.into())],
            tags: vec![],
        }
    }

    #[test]
    fn hello_world() {
        let story = story("Hello, World!\n-> END\n");
        assert_eq!(
            story.instructions,
            vec![
                line("Hello, World!"),
                Instruction::Divert {
                    target: Target::End
                },
                Instruction::End,
            ]
        );
        assert!(story.validate().is_ok());
    }

    #[test]
    fn knots_and_stitches_get_paths() {
        let story = story("-> Tags\n=== Tags ===\n= EmptyTag\nA #testTag\n= ValueTag\nB\n");
        assert_eq!(story.resolve_path("Tags"), Some(2));
        assert_eq!(story.resolve_path("Tags.EmptyTag"), Some(2));
        assert_eq!(story.resolve_path("Tags.ValueTag"), Some(4));
        assert_eq!(
            story.instructions[2],
            Instruction::Line {
                text: vec![Segment::Text("A".into())],
                tags: vec!["testTag".into()],
            }
        );
    }

    #[test]
    fn stitch_names_resolve_within_their_knot() {
        let story = story("-> K\n=== K ===\nStart\n-> second\n= second\nMore\n");
        let second = story.resolve_path("K.second").unwrap();
        assert_eq!(
            story.instructions[3],
            Instruction::Divert {
                target: Target::Address(second)
            }
        );
    }

    #[test]
    fn choices_jump_to_the_gather() {
        let story = story(
            "Pick\n* [One]\n  First\n* [Two]\n  Second\n- Together\n-> END\n",
        );
        // 0 Line Pick, 1 Choices, 2 Line First, 3 Divert gather, 4 Line Second,
        // 5 Line Together, 6 Divert END, 7 End
        assert_eq!(story.instructions[1], Instruction::Choices { group: 0 });
        assert_eq!(
            story.instructions[3],
            Instruction::Divert {
                target: Target::Address(5)
            }
        );
        let group = &story.choice_groups[0];
        assert_eq!(group.choices.len(), 2);
        assert_eq!(group.choices[0].target, 2);
        assert_eq!(group.choices[1].target, 4);
        assert_eq!(group.fallthrough, 5);
    }

    #[test]
    fn choices_without_gather_end_the_section() {
        let story = story("* [One]\n  First\n* [Two]\n  Second\n=== Next ===\nN\n");
        let group = &story.choice_groups[0];
        assert_eq!(story.instructions[group.fallthrough], Instruction::End);
    }

    #[test]
    fn global_tags_come_before_the_first_line() {
        let story = story("# title: Harbor\n# author: Ann\nHello\n# mood: calm\nBye\n");
        assert_eq!(story.global_tags, vec!["title: Harbor", "author: Ann"]);
        assert_eq!(
            story.instructions[1],
            Instruction::Line {
                text: vec![Segment::Text("Bye".into())],
                tags: vec!["mood: calm".into()],
            }
        );
    }

    #[test]
    fn variables_are_folded() {
        let story = story(
            "VAR stringVar = \"Initial\"\nVAR intVar = 0\nVAR doubleVar = 0.1\nVAR twice = intVar * 2 + 1\nHi\n",
        );
        assert_eq!(story.variables["stringVar"], Value::from("Initial"));
        assert_eq!(story.variables["intVar"], Value::Int(0));
        assert_eq!(story.variables["doubleVar"], Value::Float(0.1));
        assert_eq!(story.variables["twice"], Value::Int(1));
    }

    #[test]
    fn unknown_divert_is_an_error() {
        let result = compile_str("Hello,\n-> Foo\n");
        assert!(result.has_errors());
        assert!(result.story.is_none());
        assert_eq!(result.error_messages(), vec!["unknown divert target 'Foo'"]);
    }

    #[test]
    fn misspelled_end_suggests_end() {
        let result = compile_str("-> End\n");
        assert!(result.has_errors());
        let diagnostic = &result.diagnostics[0];
        assert_eq!(diagnostic.span, 3..6);
        assert_eq!(diagnostic.help.as_deref(), Some("did you mean 'END'?"));
        assert_eq!(
            diagnostic.label.as_deref(),
            Some("no knot or stitch with this name")
        );
    }

    #[test]
    fn unrelated_divert_has_no_suggestion() {
        let result = compile_str("=== Harbor ===
Gulls.
-> Zephyr
");
        assert_eq!(result.diagnostics[0].help, None);
    }

    #[test]
    fn undeclared_and_duplicate_variables() {
        let result = compile_str("VAR a = 1\nVAR a = 2\n~ b = a\nYou have {c}\n");
        let messages = result.error_messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].contains("more than once"));
        assert!(messages[1].contains("'b'"));
        assert!(messages[2].contains("'c'"));
        assert_eq!(result.diagnostics[0].notes[0].span, 0..9);
        assert_eq!(result.diagnostics[1].help.as_deref(), Some("declare it with `VAR b = ...`"));
    }

    #[test]
    fn duplicate_knots_are_errors() {
        let result = compile_str("=== A ===\nx\n=== A ===\ny\n");
        assert!(result.has_errors());
        let duplicate = &result.diagnostics[0];
        assert_eq!(duplicate.span, 12..21);
        assert_eq!(duplicate.notes.len(), 1);
        assert_eq!(duplicate.notes[0].span, 0..9);
        assert_eq!(duplicate.notes[0].message, "first defined here");
        assert_eq!(result.summary().to_string(), "1 error, 0 warnings");
    }

    #[test]
    fn empty_knot_warns() {
        let result = compile_str("Hi\n=== Empty ===\n=== Full ===\nx\n");
        assert!(!result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.message == "knot 'Empty' has no content")
        );
    }

    #[test]
    fn stitch_outside_knot_is_an_error() {
        assert!(compile_str("= lonely\nx\n").has_errors());
    }
}
