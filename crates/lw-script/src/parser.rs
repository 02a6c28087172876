use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use lw_session::Value;

use crate::ast::*;
use crate::lexer::{Token, lex};

/// Parse error with source span.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Byte range in the story source.
    pub span: Span,
    /// What went wrong.
    pub message: String,
}

impl ParseError {
    fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

type ParseResult<T> = Result<T, Vec<ParseError>>;

fn spanned<T>(node: T, span: SimpleSpan) -> Spanned<T> {
    Spanned {
        node,
        span: span.into_range(),
    }
}

/// Build the expression parser: literals, variables, unary minus and the
/// four arithmetic levels with the usual precedence.
fn expr_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let value = select! {
            Token::Integer(n) => Expr::Literal(Value::Int(n)),
            Token::Float(n) => Expr::Literal(Value::Float(n)),
            Token::Str(s) => Expr::Literal(Value::Str(s)),
            Token::Word(w) if w == "true" => Expr::Literal(Value::Bool(true)),
            Token::Word(w) if w == "false" => Expr::Literal(Value::Bool(false)),
            Token::Word(w) => Expr::Var(w),
        }
        .labelled("value");

        let atom = value.or(expr.delimited_by(just(Token::LParen), just(Token::RParen)));

        let unary = just(Token::Minus)
            .repeated()
            .foldr(atom, |_, operand| Expr::Neg(Box::new(operand)));

        let product_op = choice((
            just(Token::Star).to(BinOp::Mul),
            just(Token::Slash).to(BinOp::Div),
            just(Token::Percent).to(BinOp::Rem),
        ));
        let product = unary
            .clone()
            .foldl(product_op.then(unary).repeated(), |lhs, (op, rhs)| {
                Expr::binary(op, lhs, rhs)
            });

        let sum_op = choice((
            just(Token::Plus).to(BinOp::Add),
            just(Token::Minus).to(BinOp::Sub),
        ));
        product
            .clone()
            .foldl(sum_op.then(product).repeated(), |lhs, (op, rhs)| {
                Expr::binary(op, lhs, rhs)
            })
    })
    .labelled("expression")
}

/// Build the parser for the body of a `~` line.
fn assignment_parser<'a, I>() -> impl Parser<'a, I, Assignment, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let name = select! { Token::Word(w) => w }
        .labelled("variable name")
        .map_with(|w, e| spanned(w, e.span()));

    let step = name
        .clone()
        .then(choice((
            just(Token::Increment).to(AssignOp::Add),
            just(Token::Decrement).to(AssignOp::Sub),
        )))
        .map(|(name, op)| Assignment {
            name,
            op,
            expr: Expr::Literal(Value::Int(1)),
        });

    let compound = name
        .then(choice((
            just(Token::Assign).to(AssignOp::Set),
            just(Token::PlusAssign).to(AssignOp::Add),
            just(Token::MinusAssign).to(AssignOp::Sub),
        )))
        .then(expr_parser())
        .map(|((name, op), expr)| Assignment { name, op, expr });

    choice((step, compound))
}

fn rich_errors(errors: Vec<Rich<'_, Token>>) -> Vec<ParseError> {
    errors
        .into_iter()
        .map(|e| {
            let span = e.span();
            ParseError::new(span.into_range(), e.to_string())
        })
        .collect()
}

/// Lex and parse an expression fragment starting at byte `offset`.
pub fn parse_expression(fragment: &str, offset: usize) -> ParseResult<Expr> {
    let (tokens, lex_errors) = lex(fragment, offset);
    if !lex_errors.is_empty() {
        return Err(lex_errors
            .into_iter()
            .map(|e| ParseError::new(e.span, e.message))
            .collect());
    }

    let token_iter = tokens
        .iter()
        .map(|(tok, span)| (tok.clone(), SimpleSpan::from(span.clone())));
    let eoi_at = offset + fragment.len();
    let eoi: SimpleSpan = (eoi_at..eoi_at).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (output, errors) = expr_parser()
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();

    match output {
        Some(expr) if errors.is_empty() => Ok(expr),
        _ => Err(rich_errors(errors)),
    }
}

/// Lex and parse the body of a `~` line starting at byte `offset`.
pub fn parse_assignment(fragment: &str, offset: usize) -> ParseResult<Assignment> {
    let (tokens, lex_errors) = lex(fragment, offset);
    if !lex_errors.is_empty() {
        return Err(lex_errors
            .into_iter()
            .map(|e| ParseError::new(e.span, e.message))
            .collect());
    }

    let token_iter = tokens
        .iter()
        .map(|(tok, span)| (tok.clone(), SimpleSpan::from(span.clone())));
    let eoi_at = offset + fragment.len();
    let eoi: SimpleSpan = (eoi_at..eoi_at).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (output, errors) = assignment_parser()
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();

    match output {
        Some(assignment) if errors.is_empty() => Ok(assignment),
        _ => Err(rich_errors(errors)),
    }
}

// -- Line structure --

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_path(target: &str) -> bool {
    let mut parts = target.split('.');
    let knot = parts.next().is_some_and(is_identifier);
    let rest: Vec<_> = parts.collect();
    knot && rest.len() <= 1 && rest.iter().all(|p| is_identifier(p))
}

/// Split `{name}` interpolations out of a line of text.
///
/// Braces that do not enclose an identifier are kept as literal text.
pub fn split_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_identifier(after[..close].trim()) => {
                literal.push_str(&rest[..open]);
                if !literal.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Var(after[..close].trim().to_string()));
                rest = &after[close + 1..];
            }
            _ => {
                literal.push_str(&rest[..=open]);
                rest = after;
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Text(literal));
    }
    segments
}

/// A line split into its text, tags and trailing divert.
struct LineParts<'s> {
    text: &'s str,
    tags: Vec<String>,
    divert: Option<Spanned<String>>,
}

fn split_tags(body: &str) -> (&str, Vec<String>) {
    match body.find('#') {
        Some(i) => {
            let tags = body[i + 1..]
                .split('#')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            (&body[..i], tags)
        }
        None => (body, Vec::new()),
    }
}

fn parse_divert_target(raw: &str, start: usize) -> ParseResult<Spanned<String>> {
    let target = raw.trim();
    let target_start = start + (raw.len() - raw.trim_start().len());
    let span = target_start..target_start + target.len();
    if target.is_empty() {
        return Err(vec![ParseError::new(start..start, "divert has no target")]);
    }
    if !is_path(target) {
        return Err(vec![ParseError::new(
            span,
            format!("invalid divert target '{target}'"),
        )]);
    }
    Ok(Spanned {
        node: target.to_string(),
        span,
    })
}

fn split_line(body: &str, start: usize) -> ParseResult<LineParts<'_>> {
    let (before_tags, tags) = split_tags(body);
    match before_tags.find("->") {
        Some(i) => {
            let divert = parse_divert_target(&before_tags[i + 2..], start + i + 2)?;
            Ok(LineParts {
                text: before_tags[..i].trim(),
                tags,
                divert: Some(divert),
            })
        }
        None => Ok(LineParts {
            text: before_tags.trim(),
            tags,
            divert: None,
        }),
    }
}

fn parse_content(body: &str, start: usize) -> ParseResult<Content> {
    let parts = split_line(body, start)?;
    Ok(Content {
        segments: split_segments(parts.text),
        tags: parts.tags,
        divert: parts.divert,
    })
}

fn parse_choice(line: &str, start: usize) -> ParseResult<ChoiceLine> {
    let sticky = line.starts_with('+');
    let rest = line.trim_start_matches(['*', '+']).trim_start();
    let rest_start = start + (line.len() - rest.len());
    let parts = split_line(rest, rest_start)?;

    let (display, echo) = match (parts.text.find('['), parts.text.find(']')) {
        (Some(l), Some(r)) if l < r => {
            let before = &parts.text[..l];
            let inside = &parts.text[l + 1..r];
            let after = &parts.text[r + 1..];
            (format!("{before}{inside}"), format!("{before}{after}"))
        }
        _ => (parts.text.to_string(), parts.text.to_string()),
    };

    let display = display.trim();
    if display.is_empty() {
        return Err(vec![ParseError::new(start..start + line.len(), "choice has no text")]);
    }

    Ok(ChoiceLine {
        sticky,
        display: split_segments(display),
        echo: Content {
            segments: split_segments(echo.trim()),
            tags: parts.tags,
            divert: parts.divert,
        },
    })
}

fn parse_header_name(raw: &str, start: usize, what: &str) -> ParseResult<String> {
    let name = raw.trim_matches('=').trim();
    if is_identifier(name) {
        Ok(name.to_string())
    } else {
        Err(vec![ParseError::new(
            start..start + raw.len(),
            format!("invalid {what} name '{name}'"),
        )])
    }
}

fn parse_var_decl(rest: &str, start: usize) -> ParseResult<Stmt> {
    let Some((name, value)) = rest.split_once('=') else {
        return Err(vec![ParseError::new(
            start..start + rest.len(),
            "expected `VAR name = value`",
        )]);
    };
    let name = name.trim();
    if !is_identifier(name) {
        return Err(vec![ParseError::new(
            start..start + rest.len(),
            format!("invalid variable name '{name}'"),
        )]);
    }
    let value_start = start + rest.len() - value.len();
    let value = parse_expression(value, value_start)?;
    Ok(Stmt::VarDecl {
        name: name.to_string(),
        value,
    })
}

/// Parse one trimmed, non-empty line that starts at byte `start`.
fn parse_line(line: &str, start: usize) -> ParseResult<Stmt> {
    if line.starts_with("==") {
        return parse_header_name(line, start, "knot").map(Stmt::Knot);
    }
    if let Some(rest) = line.strip_prefix('=') {
        return parse_header_name(rest, start + 1, "stitch").map(Stmt::Stitch);
    }
    if let Some(rest) = line.strip_prefix("VAR ") {
        return parse_var_decl(rest, start + 4);
    }
    if let Some(rest) = line.strip_prefix('~') {
        return parse_assignment(rest, start + 1).map(Stmt::Logic);
    }
    if let Some(rest) = line.strip_prefix("->") {
        return parse_divert_target(rest, start + 2).map(Stmt::Divert);
    }
    if line.starts_with('*') || line.starts_with('+') {
        return parse_choice(line, start).map(Stmt::Choice);
    }
    if line.starts_with('-') {
        let rest = line.trim_start_matches('-');
        let rest_start = start + (line.len() - rest.len());
        return parse_content(rest, rest_start).map(Stmt::Gather);
    }
    if line.starts_with('#') {
        let (_, tags) = split_tags(line);
        return Ok(Stmt::Tags(tags));
    }
    parse_content(line, start).map(Stmt::Content)
}

/// Parse story source into statements, one per meaningful line.
///
/// Blank lines and `//` comment lines are skipped. Parsing continues past bad
/// lines so every error is reported.
pub fn parse(source: &str) -> (StoryFile, Vec<ParseError>) {
    let mut statements = Vec::new();
    let mut errors = Vec::new();
    let mut offset = 0;

    for raw_line in source.split_inclusive('\n') {
        let line_start = offset;
        offset += raw_line.len();

        let line = raw_line.trim_end_matches(['\n', '\r']);
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }

        let start = line_start + (line.len() - line.trim_start().len());
        let span = start..start + trimmed.len();
        match parse_line(trimmed, start) {
            Ok(node) => statements.push(Spanned { node, span }),
            Err(mut line_errors) => errors.append(&mut line_errors),
        }
    }

    (StoryFile { statements }, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> Stmt {
        let (file, errors) = parse(source);
        assert!(errors.is_empty(), "errors: {errors:?}");
        assert_eq!(file.statements.len(), 1);
        file.statements.into_iter().next().unwrap().node
    }

    fn text(s: &str) -> Segment {
        Segment::Text(s.to_string())
    }

    #[test]
    fn parse_headers() {
        assert_eq!(single("=== Knot1 ==="), Stmt::Knot("Knot1".into()));
        assert_eq!(single("== Knot1"), Stmt::Knot("Knot1".into()));
        assert_eq!(single("= stitch1"), Stmt::Stitch("stitch1".into()));
    }

    #[test]
    fn parse_content_with_tags_and_divert() {
        let Stmt::Content(content) = single("Move to knot1 #IMAGE: a.png #loud -> Knot2.stitch1")
        else {
            panic!("expected content");
        };
        assert_eq!(content.segments, vec![text("Move to knot1")]);
        assert_eq!(content.tags, vec!["IMAGE: a.png", "loud -> Knot2.stitch1"]);
        assert!(content.divert.is_none());

        let Stmt::Content(content) = single("Onward -> Knot2.stitch1 # mood: grim") else {
            panic!("expected content");
        };
        assert_eq!(content.segments, vec![text("Onward")]);
        assert_eq!(content.tags, vec!["mood: grim"]);
        assert_eq!(content.divert.unwrap().node, "Knot2.stitch1");
    }

    #[test]
    fn parse_interpolation() {
        assert_eq!(
            split_segments("You have {gold} coins {not a var}"),
            vec![
                text("You have "),
                Segment::Var("gold".into()),
                text(" coins {not a var}"),
            ]
        );
        assert!(split_segments("").is_empty());
    }

    #[test]
    fn parse_bracketed_choice() {
        let Stmt::Choice(choice) = single("* [Option 2] -> Second") else {
            panic!("expected choice");
        };
        assert!(!choice.sticky);
        assert_eq!(choice.display, vec![text("Option 2")]);
        assert!(choice.echo.is_blank());
        assert_eq!(choice.echo.divert.unwrap().node, "Second");
    }

    #[test]
    fn parse_echoed_sticky_choice() {
        let Stmt::Choice(choice) = single("+ Hello [back] there #wave") else {
            panic!("expected choice");
        };
        assert!(choice.sticky);
        assert_eq!(choice.display, vec![text("Hello back")]);
        assert_eq!(choice.echo.segments, vec![text("Hello  there")]);
        assert_eq!(choice.echo.tags, vec!["wave"]);
    }

    #[test]
    fn parse_gather_and_divert() {
        assert_eq!(single("-"), Stmt::Gather(Content::default()));
        let Stmt::Gather(content) = single("- They move on.") else {
            panic!("expected gather");
        };
        assert_eq!(content.segments, vec![text("They move on.")]);

        let Stmt::Divert(target) = single("-> END") else {
            panic!("expected divert");
        };
        assert_eq!(target.node, "END");
        assert_eq!(target.span, 3..6);
    }

    #[test]
    fn parse_tag_line() {
        assert_eq!(
            single("# title: The Harbor # author"),
            Stmt::Tags(vec!["title: The Harbor".into(), "author".into()])
        );
    }

    #[test]
    fn parse_var_declarations() {
        assert_eq!(
            single(r#"VAR stringVar = "Initial""#),
            Stmt::VarDecl {
                name: "stringVar".into(),
                value: Expr::Literal(Value::from("Initial")),
            }
        );
        assert_eq!(
            single("VAR debt = -5"),
            Stmt::VarDecl {
                name: "debt".into(),
                value: Expr::Neg(Box::new(Expr::Literal(Value::Int(5)))),
            }
        );
    }

    #[test]
    fn parse_logic_lines() {
        let Stmt::Logic(assign) = single("~ counter = counter + 2 * 3") else {
            panic!("expected logic");
        };
        assert_eq!(assign.name.node, "counter");
        assert_eq!(assign.name.span, 2..9);
        assert_eq!(assign.op, AssignOp::Set);
        assert_eq!(
            assign.expr,
            Expr::binary(
                BinOp::Add,
                Expr::Var("counter".into()),
                Expr::binary(
                    BinOp::Mul,
                    Expr::Literal(Value::Int(2)),
                    Expr::Literal(Value::Int(3)),
                ),
            )
        );

        let Stmt::Logic(assign) = single("~ visits++") else {
            panic!("expected logic");
        };
        assert_eq!(assign.op, AssignOp::Add);
        assert_eq!(assign.expr, Expr::Literal(Value::Int(1)));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let (file, errors) = parse("// intro\n\n   \nHello\n");
        assert!(errors.is_empty());
        assert_eq!(file.statements.len(), 1);
        assert_eq!(file.statements[0].span, 14..19);
    }

    #[test]
    fn errors_are_collected_per_line() {
        let (file, errors) = parse("=== bad name ===\n~ x = `1\n-> \nFine\n");
        assert_eq!(errors.len(), 3);
        assert_eq!(file.statements.len(), 1);
    }

    #[test]
    fn invalid_divert_target() {
        let (_, errors) = parse("Go -> not a target\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("invalid divert target"));
    }
}
