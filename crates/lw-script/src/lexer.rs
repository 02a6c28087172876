use logos::Logos;
use std::fmt;
use std::ops::Range;

/// Token type for logic and `VAR` expressions.
///
/// Story lines themselves are split by the line parser; only the expression
/// parts of `~` and `VAR` lines go through this lexer. `true` and `false` are
/// plain words and are recognised by the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Integer literal.
    Integer(i64),
    /// Floating-point literal.
    Float(f64),
    /// Double-quoted string literal.
    Str(String),
    /// Identifier, variable name or keyword.
    Word(String),
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `=`
    Assign,
    /// `+=`
    PlusAssign,
    /// `-=`
    MinusAssign,
    /// `++`
    Increment,
    /// `--`
    Decrement,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Integer(n) => write!(f, "{n}"),
            Token::Float(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Word(w) => write!(f, "{w}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Assign => write!(f, "="),
            Token::PlusAssign => write!(f, "+="),
            Token::MinusAssign => write!(f, "-="),
            Token::Increment => write!(f, "++"),
            Token::Decrement => write!(f, "--"),
        }
    }
}

/// Internal logos token, converted to an owned `Token` after lexing.
#[derive(Logos, Debug)]
#[logos(skip r"[ \t\r]+")]
enum RawToken {
    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("=")]
    Assign,

    #[token("+=")]
    PlusAssign,

    #[token("-=")]
    MinusAssign,

    #[token("++")]
    Increment,

    #[token("--")]
    Decrement,

    #[regex(r#""[^"\n]*""#)]
    Str,

    #[regex(r"[0-9]+\.[0-9]+")]
    Float,

    #[regex(r"[0-9]+")]
    Integer,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Word,
}

/// A lexer error with source location.
#[derive(Debug, Clone)]
pub struct LexError {
    /// Byte range of the erroneous input in the story source.
    pub span: Range<usize>,
    /// Human-readable description of the lexer error.
    pub message: String,
}

/// Lex an expression fragment that starts at byte `offset` of the story.
///
/// Spans in the result are absolute story positions. Lexing continues past
/// errors so every bad character is reported.
pub fn lex(fragment: &str, offset: usize) -> (Vec<(Token, Range<usize>)>, Vec<LexError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut lexer = RawToken::lexer(fragment);

    while let Some(result) = lexer.next() {
        let local = lexer.span();
        let span = local.start + offset..local.end + offset;
        match result {
            Ok(raw) => {
                let token = match raw {
                    RawToken::Plus => Token::Plus,
                    RawToken::Minus => Token::Minus,
                    RawToken::Star => Token::Star,
                    RawToken::Slash => Token::Slash,
                    RawToken::Percent => Token::Percent,
                    RawToken::LParen => Token::LParen,
                    RawToken::RParen => Token::RParen,
                    RawToken::Assign => Token::Assign,
                    RawToken::PlusAssign => Token::PlusAssign,
                    RawToken::MinusAssign => Token::MinusAssign,
                    RawToken::Increment => Token::Increment,
                    RawToken::Decrement => Token::Decrement,
                    RawToken::Str => {
                        let slice = lexer.slice();
                        Token::Str(slice[1..slice.len() - 1].to_string())
                    }
                    RawToken::Float => match lexer.slice().parse::<f64>() {
                        Ok(n) => Token::Float(n),
                        Err(_) => {
                            errors.push(LexError {
                                span,
                                message: format!("invalid float literal: {}", lexer.slice()),
                            });
                            continue;
                        }
                    },
                    RawToken::Integer => match lexer.slice().parse::<i64>() {
                        Ok(n) => Token::Integer(n),
                        Err(_) => {
                            errors.push(LexError {
                                span,
                                message: format!("invalid integer literal: {}", lexer.slice()),
                            });
                            continue;
                        }
                    },
                    RawToken::Word => Token::Word(lexer.slice().to_string()),
                };
                tokens.push((token, span));
            }
            Err(()) => {
                errors.push(LexError {
                    message: format!("unexpected character: {:?}", &fragment[local]),
                    span,
                });
            }
        }
    }

    (tokens, errors)
}
