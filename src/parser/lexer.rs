//! Lexer for template expressions using logos

use logos::Logos;

use crate::error::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Keyword literals
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("undefined")]
    Undefined,

    // Logical operators
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,

    // Equality (longer patterns first)
    #[token("===")]
    StrictEqual,
    #[token("!==")]
    StrictNotEqual,
    #[token("==")]
    Equal,
    #[token("!=")]
    NotEqual,

    // Ordering and shifts
    #[token("<=")]
    LessOrEqual,
    #[token(">=")]
    GreaterOrEqual,
    #[token("<<")]
    ShiftLeft,
    #[token(">>>")]
    UnsignedShiftRight,
    #[token(">>")]
    ShiftRight,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,

    // Update operators
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,

    // Arithmetic and bitwise
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
    #[token("&")]
    Ampersand,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,

    // Delimiters
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token("...")]
    Ellipsis,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    String(String),

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
}

impl Token {
    /// Opening delimiters raise nesting depth
    pub fn opens_group(&self) -> bool {
        matches!(self, Token::ParenOpen | Token::BracketOpen | Token::BraceOpen)
    }

    pub fn closes_group(&self) -> bool {
        matches!(
            self,
            Token::ParenClose | Token::BracketClose | Token::BraceClose
        )
    }
}

/// Strip the quotes from a string literal and resolve backslash escapes
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Lex input string into tokens with spans
///
/// Unrecognized input comes back as `Err(span)` so the caller can report it.
pub fn lex(input: &str) -> impl Iterator<Item = Result<(Token, Span), Span>> + '_ {
    Token::lexer(input)
        .spanned()
        .map(|(tok, span)| match tok {
            Ok(t) => Ok((t, span)),
            Err(()) => Err(span),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).filter_map(Result::ok).map(|(t, _)| t).collect()
    }

    #[test]
    fn test_keyword_literals() {
        assert_eq!(
            tokens("true false null undefined truthy"),
            vec![
                Token::True,
                Token::False,
                Token::Null,
                Token::Undefined,
                Token::Ident("truthy".to_string())
            ]
        );
    }

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(
            tokens("=== !== == != >>> >> >= ... ++ --"),
            vec![
                Token::StrictEqual,
                Token::StrictNotEqual,
                Token::Equal,
                Token::NotEqual,
                Token::UnsignedShiftRight,
                Token::ShiftRight,
                Token::GreaterOrEqual,
                Token::Ellipsis,
                Token::PlusPlus,
                Token::MinusMinus,
            ]
        );
    }

    #[test]
    fn test_double_bang_is_two_tokens() {
        assert_eq!(tokens("!!a"), vec![Token::Bang, Token::Bang, Token::Ident("a".to_string())]);
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            tokens(r#""a\"b" 'it\'s' "}""#),
            vec![
                Token::String("a\"b".to_string()),
                Token::String("it's".to_string()),
                Token::String("}".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("42 3.14 -10 1e3"),
            vec![
                Token::Number(42.0),
                Token::Number(3.14),
                Token::Minus,
                Token::Number(10.0),
                Token::Number(1000.0),
            ]
        );
    }

    #[test]
    fn test_member_chain() {
        assert_eq!(
            tokens("foo.bar[0]"),
            vec![
                Token::Ident("foo".to_string()),
                Token::Dot,
                Token::Ident("bar".to_string()),
                Token::BracketOpen,
                Token::Number(0.0),
                Token::BracketClose,
            ]
        );
    }

    #[test]
    fn test_unknown_character_is_error() {
        let results: Vec<_> = lex("a # b").collect();
        assert!(results.iter().any(|r| r.is_err()));
    }

    #[test]
    fn test_spans_are_byte_offsets() {
        let spans: Vec<_> = lex("a  + bb").filter_map(Result::ok).map(|(_, s)| s).collect();
        assert_eq!(spans, vec![0..1, 3..4, 5..7]);
    }
}
