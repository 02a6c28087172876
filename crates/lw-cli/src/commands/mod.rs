pub mod check;
pub mod compile;
pub mod play;

use std::path::Path;

use lw_script::{Diagnostic, Story, Summary, render_diagnostics};
use miette::{IntoDiagnostic, WrapErr, bail};

/// Read a story file.
fn read_source(path: &Path) -> miette::Result<String> {
    std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot read {}", path.display()))
}

/// Compile a story file and print diagnostics.
/// Returns the compiled story if there are no errors.
fn compile_file(path: &Path) -> miette::Result<Story> {
    let source = read_source(path)?;
    let result = lw_script::compile_source(&source);
    print_diagnostics(&result.diagnostics, &source, path);

    match result.story {
        Some(story) if !result.has_errors() => Ok(story),
        _ => bail!("compilation failed with {}", result.summary()),
    }
}

/// Render diagnostics to stderr followed by their error and warning counts.
fn print_diagnostics(diagnostics: &[Diagnostic], source: &str, path: &Path) {
    let summary = Summary::of(diagnostics);
    if summary.is_clean() {
        return;
    }
    eprint!(
        "{}",
        render_diagnostics(source, &path.display().to_string(), diagnostics)
    );
    eprintln!("  {summary}");
}
