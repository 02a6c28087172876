//! A small interactive-fiction language and the engine that runs it.
//!
//! Stories are written one statement per line: `=== knot ===` and `= stitch`
//! headers, text lines with `#tags` and `-> diverts`, `*`/`+` choices with
//! `-` gathers, `VAR` declarations and `~` assignments. [`compile_source`]
//! turns source into a [`Story`]; [`ScriptEngine`] runs one behind the
//! [`lw_session::StoryEngine`] handle.

/// Syntax tree for parsed story lines.
pub mod ast;
/// Story compilation: paths, choice groups and divert resolution.
pub mod compiler;
/// Diagnostics and their terminal rendering.
pub mod diagnostics;
/// Error type for the engine.
pub mod error;
/// Expression evaluation and text rendering.
pub mod eval;
/// Tokens for logic and `VAR` expressions.
pub mod lexer;
/// Line and expression parser.
pub mod parser;
/// The story machine.
pub mod runtime;
/// The compiled story format.
pub mod story;

pub use compiler::CompileResult;
pub use diagnostics::{Diagnostic, Note, Severity, Summary, render_diagnostics};
pub use error::ScriptError;
pub use runtime::{MachineState, ScriptEngine};
pub use story::{FORMAT_VERSION, Story};

/// Compile story source into a [`Story`].
///
/// Parse errors and compile errors are all reported as diagnostics; the story
/// is only produced when there are none.
pub fn compile_source(source: &str) -> CompileResult {
    let (file, parse_errors) = parser::parse(source);

    let diagnostics: Vec<Diagnostic> = parse_errors
        .into_iter()
        .map(|e| Diagnostic::error(e.span, e.message))
        .collect();

    let mut result = compiler::compile(&file);
    if !diagnostics.is_empty() {
        result.story = None;
        let mut all = diagnostics;
        all.append(&mut result.diagnostics);
        result.diagnostics = all;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_suppress_the_story() {
        let result = compile_source("VAR x = `\nHello\n");
        assert!(result.has_errors());
        assert!(result.story.is_none());
    }

    #[test]
    fn compiled_form_snapshot() {
        let story = compile_source("# title: Greeting\nHello, World! #IMAGE: hello.png\n-> END\n")
            .story
            .unwrap();
        insta::assert_snapshot!(story.to_json_pretty().unwrap(), @r#"
        {
          "format_version": 1,
          "global_tags": [
            "title: Greeting"
          ],
          "variables": {},
          "paths": {},
          "instructions": [
            {
              "op": "line",
              "text": [
                {
                  "text": "Hello, World!"
                }
              ],
              "tags": [
                "IMAGE: hello.png"
              ]
            },
            {
              "op": "divert",
              "target": "end"
            },
            {
              "op": "end"
            }
          ],
          "choice_groups": []
        }
        "#);
    }
}
