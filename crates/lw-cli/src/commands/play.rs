use std::io::{self, BufRead, Write};
use std::path::Path;

use colored::Colorize;
use miette::IntoDiagnostic;
use tracing::debug;

use lw_script::ScriptEngine;
use lw_session::{SessionConfig, SessionPhase, StorySession, Value};

type Session = StorySession<ScriptEngine>;

/// Flags of the `play` command.
pub struct PlayOptions {
    pub retain: Vec<String>,
    pub no_retain: bool,
    pub watch: Vec<String>,
    pub compact_saves: bool,
}

impl PlayOptions {
    fn config(&self) -> SessionConfig {
        let mut config = SessionConfig::new().with_pretty_saves(!self.compact_saves);
        if self.no_retain {
            config = config.without_retained_tags();
        }
        for key in &self.retain {
            config = config.with_retained_tag(key.clone());
        }
        config
    }
}

enum Action {
    Continue,
    Quit,
}

const HELP: &str = "\
  <Enter>             continue the story
  <number>            pick a choice
  goto <knot[.stitch]> jump to a knot or stitch
  set <var> <value>   change a story variable
  watch <var>         show a variable after every turn
  unwatch <var>       stop showing a variable
  vars                show watched variables
  tags                show global and current tags
  save <file>         write a save file
  load <file>         restore a save file
  quit                leave";

pub fn run(file: &Path, options: &PlayOptions) -> miette::Result<()> {
    let mut session = StorySession::with_config(ScriptEngine::new(), options.config());
    for name in &options.watch {
        session.register_observed_variable(name);
    }
    load(&mut session, file)?;

    println!("  {} {}", "Playing".bold(), file.display());
    println!("  Press Enter to continue, a number to choose, 'help' for commands.\n");
    print_turn(&session);

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush().into_diagnostic()?;

        line.clear();
        if reader.read_line(&mut line).into_diagnostic()? == 0 {
            break; // EOF
        }

        match handle(&mut session, line.trim()) {
            Ok(Action::Continue) => {}
            Ok(Action::Quit) => break,
            Err(message) => println!("{}\n", message.yellow()),
        }
    }

    Ok(())
}

/// Load source through the compiler, or a `.json` file as a compiled story.
fn load(session: &mut Session, file: &Path) -> miette::Result<()> {
    let data = super::read_source(file)?;
    if file.extension().is_some_and(|ext| ext == "json") {
        session
            .try_load_from_serialized_form(&data)
            .into_diagnostic()?;
    } else {
        let loaded = session.load_from_compiled_form(&data);
        super::print_diagnostics(session.engine().diagnostics(), &data, file);
        loaded.into_diagnostic()?;
    }
    Ok(())
}

fn handle(session: &mut Session, input: &str) -> Result<Action, String> {
    debug!(input, phase = ?session.phase(), "play command");

    if input.is_empty() {
        if !session.can_continue() {
            return Err("The story cannot continue. Pick a choice or type 'quit'.".into());
        }
        session.advance();
        print_turn(session);
        return Ok(Action::Continue);
    }

    if let Ok(number) = input.parse::<i64>() {
        let index = choice_index(number)?;
        session.choose_option(index);
        check_failure(session)?;
        print_turn(session);
        return Ok(Action::Continue);
    }

    let (command, rest) = match input.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (input, ""),
    };

    match command.to_ascii_lowercase().as_str() {
        "quit" | "q" => return Ok(Action::Quit),
        "help" | "h" | "?" => println!("{HELP}\n"),
        "goto" => {
            let target = required(rest, "goto <knot[.stitch]>")?;
            let (knot, stitch) = match target.split_once('.') {
                Some((knot, stitch)) => (knot, Some(stitch)),
                None => (target, None),
            };
            session.jump_to(knot, stitch);
            check_failure(session)?;
            print_turn(session);
        }
        "set" => {
            let usage = "set <var> <value>";
            let (name, raw) = required(rest, usage)?
                .split_once(char::is_whitespace)
                .ok_or_else(|| format!("usage: {usage}"))?;
            session.set_variable(name, parse_value(raw));
            check_failure(session)?;
            println!("  {name} = {}\n", session.read_variable(name));
        }
        "watch" => {
            let name = required(rest, "watch <var>")?;
            session.register_observed_variable(name);
            print_vars(session);
        }
        "unwatch" => {
            let name = required(rest, "unwatch <var>")?;
            session.deregister_observed_variable(name);
            print_vars(session);
        }
        "vars" => print_vars(session),
        "tags" => {
            println!("  global:  {}", format_tags(session.global_tags()));
            println!("  current: {}\n", format_tags(session.current_tags()));
        }
        "save" => {
            let path = required(rest, "save <file>")?;
            let text = session.try_save().map_err(|e| e.to_string())?;
            std::fs::write(path, text).map_err(|e| format!("cannot write {path}: {e}"))?;
            println!("  Saved to {path}\n");
        }
        "load" => {
            let path = required(rest, "load <file>")?;
            let text =
                std::fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?;
            session.try_restore(&text).map_err(|e| e.to_string())?;
            println!("  Restored {path}\n");
            print_turn(session);
        }
        other => return Err(format!("Unknown command '{other}'. Type 'help' for commands.")),
    }

    Ok(Action::Continue)
}

/// Map a 1-based choice number to the engine's index.
fn choice_index(number: i64) -> Result<i64, String> {
    match number.checked_sub(1) {
        Some(index) if index >= 0 => Ok(index),
        _ => Err(format!("Choice numbers start at 1, got {number}.")),
    }
}

fn required<'a>(arg: &'a str, usage: &str) -> Result<&'a str, String> {
    if arg.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(arg)
    }
}

fn check_failure(session: &Session) -> Result<(), String> {
    match &session.state().last_failure {
        Some(failure) => Err(failure.clone()),
        None => Ok(()),
    }
}

/// Interpret a typed value: integer, float, boolean, otherwise text.
fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Int(n);
    }
    if raw.chars().any(|c| c.is_ascii_digit())
        && let Ok(f) = raw.parse::<f64>()
    {
        return Value::Float(f);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Str(raw.trim_matches('"').to_string()),
    }
}

fn format_tags(tags: &lw_session::TagMap) -> String {
    if tags.is_empty() {
        return "(none)".into();
    }
    tags.iter()
        .map(|(key, value)| {
            if key == value {
                key.clone()
            } else {
                format!("{key}: {value}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_vars(session: &Session) {
    if session.observed_variables().is_empty() {
        println!("  No watched variables.\n");
        return;
    }
    for (name, value) in session.observed_variables() {
        println!("  {name} = {value}");
    }
    println!();
}

fn print_turn(session: &Session) {
    let state = session.state();

    let text = state.current_text.trim_end();
    if !text.is_empty() {
        println!("{text}");
    }
    if !state.current_tags.is_empty() {
        println!("  {}", format!("[{}]", format_tags(&state.current_tags)).dimmed());
    }
    for error in &state.current_errors {
        println!("  {}", error.red());
    }
    for choice in &state.options {
        println!("  {}. {}", choice.index() + 1, choice.text());
    }
    for (name, value) in &state.observed_variables {
        println!("  {}", format!("{name} = {value}").dimmed());
    }
    if session.phase() == SessionPhase::Ended {
        println!("  {}", "-- THE END --".dimmed());
    }
    println!();
}
