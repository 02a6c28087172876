use lw_session::Value;
use serde::{Deserialize, Serialize};

/// Byte range in the story source.
pub type Span = std::ops::Range<usize>;

/// A node with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    /// The node.
    pub node: T,
    /// Where it came from.
    pub span: Span,
}

/// One piece of a line of story text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    /// Literal text.
    Text(String),
    /// A `{name}` variable interpolation.
    Var(String),
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    /// `+`, also string concatenation.
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

/// An expression in a logic or `VAR` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A variable reference.
    Var(String),
    /// Arithmetic negation.
    Neg(Box<Expr>),
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Build a binary expression.
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Every variable this expression reads.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Literal(_) => {}
            Self::Var(name) => out.push(name),
            Self::Neg(inner) => inner.collect_variables(out),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }
}

/// How an assignment combines with the old value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOp {
    /// `=`
    Set,
    /// `+=` or `++`
    Add,
    /// `-=` or `--`
    Sub,
}

/// A `~` logic line.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// The variable written.
    pub name: Spanned<String>,
    /// How the value is combined.
    pub op: AssignOp,
    /// The right-hand side.
    pub expr: Expr,
}

/// Text, tags and an optional trailing divert.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Content {
    /// The text, split into literal and interpolated parts.
    pub segments: Vec<Segment>,
    /// Raw tags written after `#`.
    pub tags: Vec<String>,
    /// A trailing `-> target`.
    pub divert: Option<Spanned<String>>,
}

impl Content {
    /// Whether the line has no text.
    pub fn is_blank(&self) -> bool {
        self.segments.is_empty()
    }
}

/// A `*` or `+` choice line.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceLine {
    /// `+` choices can be picked repeatedly.
    pub sticky: bool,
    /// Text shown in the choice list.
    pub display: Vec<Segment>,
    /// Text output once the choice is taken (everything outside `[...]`).
    pub echo: Content,
}

/// One parsed story line.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `=== name ===`
    Knot(String),
    /// `= name`
    Stitch(String),
    /// `VAR name = expr`
    VarDecl {
        /// The variable.
        name: String,
        /// Its initial value expression.
        value: Expr,
    },
    /// `~ name op expr`
    Logic(Assignment),
    /// A line of text.
    Content(Content),
    /// `* choice` or `+ choice`.
    Choice(ChoiceLine),
    /// `-` gather, optionally followed by text.
    Gather(Content),
    /// `-> target` on its own line.
    Divert(Spanned<String>),
    /// `# tag` lines without text.
    Tags(Vec<String>),
}

/// A parsed story: one statement per meaningful line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoryFile {
    /// Statements in source order.
    pub statements: Vec<Spanned<Stmt>>,
}
