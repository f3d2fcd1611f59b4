//! Expression sub-parser
//!
//! Expressions are lexed up to the first unbalanced `}` or `)` and then parsed
//! over token slices:
//!
//! - `&&`/`||` bind loosest and are split on their *last* top-level
//!   occurrence, so mixed chains group to the left regardless of operator.
//! - Binary operators take an already parsed left operand and parse the whole
//!   remainder as the right operand.
//! - An operand is an optional `!` prefix, an optional `++`/`--` prefix or
//!   postfix, and a literal, identifier or `.`/`[]` member chain.

use crate::error::{ParseError, Span};
use crate::parser::ast::*;
use crate::parser::cursor::Cursor;
use crate::parser::lexer::{lex, Token};

type PResult<T> = Result<T, ParseError>;

/// Lexed token with an absolute span
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tok {
    pub token: Token,
    pub span: Span,
}

/// Header of an `{:each}` block
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EachHeader {
    pub iterable: Spanned<Expr>,
    pub context: Spanned<Identifier>,
    pub index: Option<Spanned<Identifier>>,
}

/// Parse one expression starting at `cur`
///
/// The returned cursor sits on the terminating `}`/`)` (not consumed) or at
/// end of input.
pub(crate) fn parse_expression(cur: Cursor<'_>) -> PResult<(Spanned<Expr>, Cursor<'_>)> {
    let (tokens, end) = scan(cur)?;
    let parser = ExprParser { cursor: cur };
    let expr = parser.parse(&tokens, end.pos())?;
    Ok((expr, end))
}

/// Parse `iterable as context[, index]`
pub(crate) fn parse_each_header(cur: Cursor<'_>) -> PResult<(EachHeader, Cursor<'_>)> {
    let (tokens, end) = scan(cur)?;
    let parser = ExprParser { cursor: cur };

    let Some(as_index) = first_top_level(&tokens, |t| *t == Token::Ident("as".to_string()))
    else {
        let span = cur.pos()..end.pos();
        return Err(cur
            .error(span, "`:each` needs `as` followed by a context identifier")
            .with_hint("write {:each items as item} or {:each items as item, index}"));
    };

    let iterable = parser.parse(&tokens[..as_index], tokens[as_index].span.start)?;

    let bindings = &tokens[as_index + 1..];
    let (context_tokens, index_tokens) =
        match first_top_level(bindings, |t| *t == Token::Comma) {
            Some(comma) => (&bindings[..comma], Some(&bindings[comma + 1..])),
            None => (bindings, None),
        };

    let context_end = index_tokens
        .and_then(|_| first_top_level(bindings, |t| *t == Token::Comma))
        .map(|comma| bindings[comma].span.start)
        .unwrap_or(end.pos());
    let context = parser.binding(context_tokens, context_end, "context")?;
    let index = index_tokens
        .map(|toks| parser.binding(toks, end.pos(), "index"))
        .transpose()?;

    Ok((
        EachHeader {
            iterable,
            context,
            index,
        },
        end,
    ))
}

/// Lex from `cur` until an unbalanced `}` or `)`
fn scan(cur: Cursor<'_>) -> PResult<(Vec<Tok>, Cursor<'_>)> {
    let base = cur.pos();
    let mut depth = 0usize;
    let mut tokens = Vec::new();

    for item in lex(cur.rest()) {
        let (token, span) = item.map_err(|span| {
            cur.error(
                base + span.start..base + span.end,
                "unexpected character in expression",
            )
        })?;
        let span = base + span.start..base + span.end;

        if token.closes_group() {
            if depth == 0 {
                if matches!(token, Token::BraceClose | Token::ParenClose) {
                    return Ok((tokens, cur.at(span.start)));
                }
                return Err(cur.error(span, "unbalanced `]` in expression"));
            }
            depth -= 1;
        } else if token.opens_group() {
            depth += 1;
        }
        tokens.push(Tok { token, span });
    }

    Ok((tokens, cur.at(cur.source().len())))
}

/// Index of the first depth-0 token matching `pred`
fn first_top_level(tokens: &[Tok], pred: impl Fn(&Token) -> bool) -> Option<usize> {
    top_level(tokens)
        .find(|&(_, tok)| pred(&tok.token))
        .map(|(i, _)| i)
}

/// Index of the last depth-0 token matching `pred`
fn last_top_level(tokens: &[Tok], pred: impl Fn(&Token) -> bool) -> Option<usize> {
    top_level(tokens)
        .filter(|&(_, tok)| pred(&tok.token))
        .map(|(i, _)| i)
        .last()
}

/// Tokens outside any bracket pair, with their indices
fn top_level(tokens: &[Tok]) -> impl Iterator<Item = (usize, &Tok)> {
    let mut depth = 0usize;
    tokens.iter().enumerate().filter(move |(_, tok)| {
        if tok.token.opens_group() {
            depth += 1;
            false
        } else if tok.token.closes_group() {
            depth = depth.saturating_sub(1);
            false
        } else {
            depth == 0
        }
    })
}

struct ExprParser<'src> {
    cursor: Cursor<'src>,
}

impl ExprParser<'_> {
    fn error(&self, span: Span, message: impl Into<String>) -> ParseError {
        self.cursor.error(span, message)
    }

    /// `eof` is the offset just past `tokens`, used when the slice runs dry
    fn parse(&self, tokens: &[Tok], eof: usize) -> PResult<Spanned<Expr>> {
        if let Some(split) = last_top_level(tokens, |t| matches!(t, Token::AndAnd | Token::OrOr))
        {
            let operator = match tokens[split].token {
                Token::AndAnd => LogicalOperator::And,
                _ => LogicalOperator::Or,
            };
            let left = self.parse(&tokens[..split], tokens[split].span.start)?;
            let right = self.parse(&tokens[split + 1..], eof)?;
            let span = left.span.start..right.span.end;
            return Ok(Spanned::new(
                Expr::Logical {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            ));
        }

        self.parse_binary(tokens, eof)
    }

    fn parse_binary(&self, tokens: &[Tok], eof: usize) -> PResult<Spanned<Expr>> {
        let (left, rest) = self.parse_operand(tokens, eof)?;
        let Some(next) = rest.first() else {
            return Ok(left);
        };

        let Some(operator) = binary_operator(&next.token) else {
            return Err(self.error(
                next.span.clone(),
                format!("unexpected {} in expression", format_token(&next.token)),
            ));
        };
        let right = self.parse_binary(&rest[1..], eof)?;
        let span = left.span.start..right.span.end;
        Ok(Spanned::new(
            Expr::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        ))
    }

    fn parse_operand<'t>(
        &self,
        tokens: &'t [Tok],
        eof: usize,
    ) -> PResult<(Spanned<Expr>, &'t [Tok])> {
        let Some(first) = tokens.first() else {
            return Err(self.error(eof..eof, "expected an expression"));
        };

        match &first.token {
            Token::Bang => {
                let (argument, rest) = self.parse_operand(&tokens[1..], eof)?;
                let span = first.span.start..argument.span.end;
                Ok((
                    Spanned::new(
                        Expr::Unary {
                            operator: UnaryOperator::Not,
                            argument: Box::new(argument),
                        },
                        span,
                    ),
                    rest,
                ))
            }
            Token::ParenOpen => {
                let close = self.matching_close(tokens)?;
                let inner = self.parse(&tokens[1..close], tokens[close].span.start)?;
                let span = first.span.start..tokens[close].span.end;
                Ok((Spanned::new(inner.node, span), &tokens[close + 1..]))
            }
            Token::PlusPlus | Token::MinusMinus => {
                let operator = update_operator(&first.token);
                let (argument, rest) = self.parse_reference(&tokens[1..], eof)?;
                if let Some(postfix) = rest.first().filter(|t| is_update(&t.token)) {
                    return Err(self
                        .error(
                            first.span.start..postfix.span.end,
                            "an operand cannot take both a prefix and a postfix update operator",
                        )
                        .with_hint("use either ++x or x++, not both"));
                }
                let span = first.span.start..argument.span.end;
                Ok((
                    Spanned::new(
                        Expr::Update {
                            operator,
                            prefix: true,
                            argument: Box::new(argument),
                        },
                        span,
                    ),
                    rest,
                ))
            }
            Token::Minus => match tokens.get(1) {
                Some(Tok {
                    token: Token::Number(n),
                    span,
                }) => Ok((
                    Spanned::new(
                        Expr::Literal(Literal::Number(-n)),
                        first.span.start..span.end,
                    ),
                    &tokens[2..],
                )),
                _ => Err(self.error(
                    first.span.clone(),
                    "invalid operand: `-` must be followed by a number",
                )),
            },
            Token::Number(_)
            | Token::String(_)
            | Token::True
            | Token::False
            | Token::Null
            | Token::Undefined => {
                let literal = match &first.token {
                    Token::Number(n) => Literal::Number(*n),
                    Token::String(s) => Literal::String(s.clone()),
                    Token::True => Literal::Boolean(true),
                    Token::False => Literal::Boolean(false),
                    Token::Null => Literal::Null,
                    _ => Literal::Undefined,
                };
                Ok((
                    Spanned::new(Expr::Literal(literal), first.span.clone()),
                    &tokens[1..],
                ))
            }
            Token::Ident(_) => {
                let (reference, rest) = self.parse_reference(tokens, eof)?;
                match rest.first().filter(|t| is_update(&t.token)) {
                    Some(postfix) => {
                        let span = reference.span.start..postfix.span.end;
                        Ok((
                            Spanned::new(
                                Expr::Update {
                                    operator: update_operator(&postfix.token),
                                    prefix: false,
                                    argument: Box::new(reference),
                                },
                                span,
                            ),
                            &rest[1..],
                        ))
                    }
                    None => Ok((reference, rest)),
                }
            }
            other => Err(self.error(
                first.span.clone(),
                format!("unexpected {} in expression", format_token(other)),
            )),
        }
    }

    /// Identifier followed by any number of `.name` / `[expr]` accessors
    fn parse_reference<'t>(
        &self,
        tokens: &'t [Tok],
        eof: usize,
    ) -> PResult<(Spanned<Expr>, &'t [Tok])> {
        let first = match tokens.first() {
            Some(tok) => tok,
            None => return Err(self.error(eof..eof, "expected an identifier")),
        };
        let Token::Ident(name) = &first.token else {
            return Err(self.error(
                first.span.clone(),
                format!(
                    "invalid operand: expected an identifier or member expression, found {}",
                    format_token(&first.token)
                ),
            ));
        };

        let mut expr = Spanned::new(
            Expr::Identifier(Identifier::new(name.clone())),
            first.span.clone(),
        );
        let mut rest = &tokens[1..];

        loop {
            match rest.first().map(|t| &t.token) {
                Some(Token::Dot) => {
                    let property = match rest.get(1) {
                        Some(Tok {
                            token: Token::Ident(prop),
                            span,
                        }) => Spanned::new(
                            Expr::Identifier(Identifier::new(prop.clone())),
                            span.clone(),
                        ),
                        Some(other) => {
                            return Err(self.error(
                                other.span.clone(),
                                format!(
                                    "invalid operand: expected a property name after `.`, found {}",
                                    format_token(&other.token)
                                ),
                            ))
                        }
                        None => return Err(self.error(eof..eof, "expected a property name after `.`")),
                    };
                    let span = expr.span.start..property.span.end;
                    expr = Spanned::new(
                        Expr::Member {
                            object: Box::new(expr),
                            property: Box::new(property),
                            computed: false,
                        },
                        span,
                    );
                    rest = &rest[2..];
                }
                Some(Token::BracketOpen) => {
                    let close = self.matching_close(rest)?;
                    let property = self.parse(&rest[1..close], rest[close].span.start)?;
                    let span = expr.span.start..rest[close].span.end;
                    expr = Spanned::new(
                        Expr::Member {
                            object: Box::new(expr),
                            property: Box::new(property),
                            computed: true,
                        },
                        span,
                    );
                    rest = &rest[close + 1..];
                }
                _ => break,
            }
        }

        Ok((expr, rest))
    }

    /// Index of the token closing the group opened by `tokens[0]`
    fn matching_close(&self, tokens: &[Tok]) -> PResult<usize> {
        let open = &tokens[0];
        let expected = match open.token {
            Token::ParenOpen => Token::ParenClose,
            Token::BracketOpen => Token::BracketClose,
            _ => Token::BraceClose,
        };

        let mut depth = 0usize;
        for (i, tok) in tokens.iter().enumerate() {
            if tok.token.opens_group() {
                depth += 1;
            } else if tok.token.closes_group() {
                depth -= 1;
                if depth == 0 {
                    if tok.token == expected {
                        return Ok(i);
                    }
                    return Err(self.error(
                        tok.span.clone(),
                        format!(
                            "mismatched {}, expected {}",
                            format_token(&tok.token),
                            format_token(&expected)
                        ),
                    ));
                }
            }
        }
        Err(self.error(
            open.span.clone(),
            format!("unclosed {}", format_token(&open.token)),
        ))
    }

    /// `:each` context or index name; must be a bare identifier
    fn binding(&self, tokens: &[Tok], eof: usize, role: &str) -> PResult<Spanned<Identifier>> {
        let expr = self.parse(tokens, eof)?;
        match expr.node {
            Expr::Identifier(id) => Ok(Spanned::new(id, expr.span)),
            _ => Err(self.error(
                expr.span,
                format!("invalid operand: `:each` {role} must be an identifier"),
            )),
        }
    }
}

fn is_update(token: &Token) -> bool {
    matches!(token, Token::PlusPlus | Token::MinusMinus)
}

fn update_operator(token: &Token) -> UpdateOperator {
    match token {
        Token::PlusPlus => UpdateOperator::Increment,
        _ => UpdateOperator::Decrement,
    }
}

fn binary_operator(token: &Token) -> Option<BinaryOperator> {
    Some(match token {
        Token::StrictEqual => BinaryOperator::StrictEqual,
        Token::StrictNotEqual => BinaryOperator::StrictNotEqual,
        Token::Equal => BinaryOperator::Equal,
        Token::NotEqual => BinaryOperator::NotEqual,
        Token::Less => BinaryOperator::Less,
        Token::LessOrEqual => BinaryOperator::LessOrEqual,
        Token::Greater => BinaryOperator::Greater,
        Token::GreaterOrEqual => BinaryOperator::GreaterOrEqual,
        Token::Plus => BinaryOperator::Add,
        Token::Minus => BinaryOperator::Subtract,
        Token::Star => BinaryOperator::Multiply,
        Token::Slash => BinaryOperator::Divide,
        Token::Percent => BinaryOperator::Remainder,
        Token::Ampersand => BinaryOperator::BitAnd,
        Token::Pipe => BinaryOperator::BitOr,
        Token::Caret => BinaryOperator::BitXor,
        Token::ShiftLeft => BinaryOperator::ShiftLeft,
        Token::ShiftRight => BinaryOperator::ShiftRight,
        Token::UnsignedShiftRight => BinaryOperator::UnsignedShiftRight,
        _ => return None,
    })
}

/// Format a token for human-readable error messages
fn format_token(tok: &Token) -> String {
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::String(s) => format!("string \"{}\"", s),
        Token::Number(n) => format!("number {}", n),
        Token::True => "keyword 'true'".to_string(),
        Token::False => "keyword 'false'".to_string(),
        Token::Null => "keyword 'null'".to_string(),
        Token::Undefined => "keyword 'undefined'".to_string(),
        Token::AndAnd => "'&&'".to_string(),
        Token::OrOr => "'||'".to_string(),
        Token::PlusPlus => "'++'".to_string(),
        Token::MinusMinus => "'--'".to_string(),
        Token::Bang => "'!'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::BracketOpen => "'['".to_string(),
        Token::BracketClose => "']'".to_string(),
        Token::BraceOpen => "'{'".to_string(),
        Token::BraceClose => "'}'".to_string(),
        Token::Ellipsis => "'...'".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::Comma => "','".to_string(),
        other => match binary_operator(other) {
            Some(op) => format!("'{}'", op.as_str()),
            None => format!("{:?}", other),
        },
    }
}
