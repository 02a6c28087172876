use std::fmt;

use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::ast::Span;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The story cannot be compiled.
    Error,
    /// The story compiles but probably does not do what was meant.
    Warning,
}

impl Severity {
    fn kind(self) -> ReportKind<'static> {
        match self {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        }
    }

    fn color(self) -> Color {
        match self {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        }
    }
}

/// Another place in the story that explains a diagnostic, such as the first
/// definition of a duplicated knot.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Byte range in the story source.
    pub span: Span,
    /// Text shown at that place.
    pub message: String,
}

/// A problem found while compiling a story.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// How serious the problem is.
    pub severity: Severity,
    /// Byte range of the offending text.
    pub span: Span,
    /// What went wrong.
    pub message: String,
    /// Text attached to the offending span. Defaults to the message.
    pub label: Option<String>,
    /// A fix to try, e.g. the closest knot name for a mistyped divert.
    pub help: Option<String>,
    /// Related places in the story.
    pub notes: Vec<Note>,
}

impl Diagnostic {
    fn new(severity: Severity, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity,
            span,
            message: message.into(),
            label: None,
            help: None,
            notes: Vec::new(),
        }
    }

    /// An error at `span`.
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, span, message)
    }

    /// A warning at `span`.
    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, span, message)
    }

    /// Attach a label to the offending span.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Suggest a fix.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Point at a related place in the story.
    pub fn with_note(mut self, span: Span, message: impl Into<String>) -> Self {
        self.notes.push(Note {
            span,
            message: message.into(),
        });
        self
    }

    /// Whether this diagnostic stops compilation.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    fn report<'a>(&self, filename: &'a str) -> Report<'a, (&'a str, Span)> {
        let primary = Label::new((filename, self.span.clone()))
            .with_message(self.label.as_deref().unwrap_or(&self.message))
            .with_color(self.severity.color());

        let mut report = Report::build(self.severity.kind(), (filename, self.span.clone()))
            .with_message(&self.message)
            .with_label(primary);
        for note in &self.notes {
            report = report.with_label(
                Label::new((filename, note.span.clone()))
                    .with_message(&note.message)
                    .with_color(Color::Blue),
            );
        }
        if let Some(help) = &self.help {
            report = report.with_help(help);
        }
        report.finish()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{prefix}: {}", self.message)?;
        if let Some(help) = &self.help {
            write!(f, " ({help})")?;
        }
        Ok(())
    }
}

/// Error and warning counts of a compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Diagnostics that stop compilation.
    pub errors: usize,
    /// Diagnostics that do not.
    pub warnings: usize,
}

impl Summary {
    /// Count the diagnostics by severity.
    pub fn of(diagnostics: &[Diagnostic]) -> Self {
        diagnostics
            .iter()
            .fold(Self::default(), |mut summary, d| {
                match d.severity {
                    Severity::Error => summary.errors += 1,
                    Severity::Warning => summary.warnings += 1,
                }
                summary
            })
    }

    /// No errors and no warnings.
    pub fn is_clean(&self) -> bool {
        self.errors == 0 && self.warnings == 0
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.errors, self.warnings) {
            (0, 0) => write!(f, "no problems"),
            (0, w) => write!(f, "{}", plural(w, "warning")),
            (e, w) => write!(f, "{}, {}", plural(e, "error"), plural(w, "warning")),
        }
    }
}

/// Render diagnostics against the story source with ariadne.
pub fn render_diagnostics(source: &str, filename: &str, diagnostics: &[Diagnostic]) -> String {
    let mut output = Vec::new();
    for diag in diagnostics {
        diag.report(filename)
            .write((filename, Source::from(source)), &mut output)
            .ok();
    }
    String::from_utf8(output).unwrap_or_default()
}
