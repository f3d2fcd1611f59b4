//! Recursive-descent parser for markup, directives and flow-control blocks

use strsim::jaro_winkler;

use crate::error::{ParseError, Span};
use crate::parser::ast::*;
use crate::parser::config::ParserConfig;
use crate::parser::cursor::Cursor;
use crate::parser::expression::{parse_each_header, parse_expression};

type PResult<T> = Result<T, ParseError>;

/// Names accepted after `<:`
const DIRECTIVES: &[&str] = &[
    "component", "element", "layout", "router", "path", "data", "slot",
];

/// Names accepted after `{:`
const BLOCKS: &[&str] = &[
    "if", "elseif", "else", "skip", "when", "is", "each", "break", "continue",
];

/// Parse template source with the default configuration
pub fn parse(source: &str) -> PResult<Root> {
    parse_with(source, &ParserConfig::default())
}

/// Parse raw bytes; anything that is not UTF-8 is a construction error
pub fn parse_bytes(bytes: &[u8]) -> PResult<Root> {
    let source = std::str::from_utf8(bytes).map_err(|e| ParseError::Construction {
        message: e.to_string(),
    })?;
    parse(source)
}

/// Parse template source into a [`Root`]
///
/// Trailing whitespace is trimmed first; spans still index `source` since
/// only its end is cut.
pub fn parse_with(source: &str, config: &ParserConfig) -> PResult<Root> {
    let cur = Cursor::new(source.trim_end());
    let grammar = Grammar { config };
    let (nodes, _) = grammar.children(cur, &Until::Eof)?;
    group_root(cur, nodes)
}

/// Where a child list ends
enum Until<'a> {
    Eof,
    /// `</name>`, compared ASCII case-insensitively
    CloseTag { name: &'a str, open: Span },
    /// `{/:closer}` or any `{:stop}` in `stops`
    Block {
        closer: &'static str,
        stops: &'static [&'static str],
        open: Span,
    },
}

impl Until<'_> {
    fn is_close_tag(&self, tag: &str) -> bool {
        matches!(self, Until::CloseTag { name, .. } if *name == tag)
    }
}

/// Pending link of an if/elseif/else chain, folded into [`ElseBranch`] once
/// the whole chain has been read
enum ElseLink {
    ElseIf {
        test: Spanned<Expr>,
        children: Vec<Spanned<Node>>,
        span: Span,
    },
    Else {
        children: Vec<Spanned<Node>>,
        span: Span,
    },
}

struct Grammar<'c> {
    config: &'c ParserConfig,
}

impl Grammar<'_> {
    fn children<'s>(
        &self,
        mut cur: Cursor<'s>,
        until: &Until<'_>,
    ) -> PResult<(Vec<Spanned<Node>>, Cursor<'s>)> {
        let mut nodes = Vec::new();
        loop {
            if cur.is_eof() {
                return match until {
                    Until::Eof => Ok((nodes, cur)),
                    Until::CloseTag { name, open } => Err(cur
                        .error(open.clone(), format!("unclosed <{name}>"))
                        .with_hint(format!("add a matching </{name}>"))),
                    Until::Block { closer, open, .. } => Err(cur
                        .error(open.clone(), format!("unclosed {{:{closer}}} block"))
                        .with_hint(format!("add a matching {{/:{closer}}}"))),
                };
            }
            if at_terminator(cur, until) {
                return Ok((nodes, cur));
            }

            let (node, next) = self.node(cur, until)?;
            match &node.node {
                Node::Path(_) if !until.is_close_tag(":router") => {
                    return Err(cur.error(
                        node.span.clone(),
                        "<:path> is only allowed directly inside <:router>",
                    ))
                }
                Node::Router(_) if until.is_close_tag(":path") => {
                    return Err(cur.error(
                        node.span.clone(),
                        "<:router> cannot be nested inside <:path>",
                    ))
                }
                _ => {}
            }
            nodes.push(node);
            cur = next;
        }
    }

    /// Dispatch on the next characters of input
    fn node<'s>(
        &self,
        cur: Cursor<'s>,
        until: &Until<'_>,
    ) -> PResult<(Spanned<Node>, Cursor<'s>)> {
        if cur.starts_with("{/:") {
            let (_, name) = block_head(cur).unwrap_or((true, ""));
            return Err(cur.error(
                cur.pos()..cur.pos() + 3 + name.len(),
                format!("unexpected {{/:{name}}} without a matching opening block"),
            ));
        }
        if cur.starts_with("{:") {
            return self.block(cur);
        }
        if cur.starts_with("{") {
            return self.inline_expression(cur);
        }
        if cur.starts_with("<!--") {
            return self.comment(cur);
        }
        if cur.starts_with_ignore_case("<!doctype") {
            return self.doctype(cur);
        }
        if cur.starts_with("<!") {
            return Err(cur.error(cur.pos()..cur.pos() + 2, "unsupported markup declaration"));
        }
        if cur.starts_with("</") {
            return Err(self.stray_closer(cur, until));
        }
        if cur.starts_with("<:") {
            return self.directive(cur);
        }
        if cur.starts_with("<") && cur.peek_second().is_some_and(|c| c.is_ascii_alphabetic()) {
            return self.tag(cur);
        }
        Ok(self.text(cur))
    }

    fn stray_closer(&self, cur: Cursor<'_>, until: &Until<'_>) -> ParseError {
        let (name, after) = cur.advance(2).take_while(is_tag_name_char);
        let span = cur.pos()..after.pos();
        match until {
            Until::CloseTag { name: expected, .. } => cur
                .error(
                    span,
                    format!("mismatched closing tag </{name}>, expected </{expected}>"),
                )
                .with_hint(format!("close <{expected}> before </{name}>")),
            _ => cur.error(span, format!("unexpected closing tag </{name}>")),
        }
    }

    /// Text up to the next expression or markup
    fn text<'s>(&self, cur: Cursor<'s>) -> (Spanned<Node>, Cursor<'s>) {
        let rest = cur.rest();
        let len = rest
            .char_indices()
            .skip(1)
            .find(|&(i, c)| c == '{' || (c == '<' && starts_markup(&rest[i + 1..])))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let end = cur.advance(len);
        (
            Spanned::new(
                Node::Text(Text {
                    data: rest[..len].to_string(),
                }),
                cur.span_to(end),
            ),
            end,
        )
    }

    fn inline_expression<'s>(&self, cur: Cursor<'s>) -> PResult<(Spanned<Node>, Cursor<'s>)> {
        let (expr, end) = parse_expression(cur.advance(1))?;
        let end = end.expect("}", "expected `}` to close expression")?;
        Ok((
            Spanned::new(Node::Expression(expr.node), cur.span_to(end)),
            end,
        ))
    }

    fn comment<'s>(&self, cur: Cursor<'s>) -> PResult<(Spanned<Node>, Cursor<'s>)> {
        let Some((data, end)) = cur.advance(4).take_until("-->") else {
            return Err(cur
                .error(cur.pos()..cur.pos() + 4, "unclosed comment")
                .with_hint("add a matching -->"));
        };
        let end = end.advance(3);
        Ok((
            Spanned::new(
                Node::Comment(Comment {
                    data: data.to_string(),
                }),
                cur.span_to(end),
            ),
            end,
        ))
    }

    fn doctype<'s>(&self, cur: Cursor<'s>) -> PResult<(Spanned<Node>, Cursor<'s>)> {
        let Some((data, end)) = cur.advance(2).take_until(">") else {
            return Err(cur.error(cur.pos()..cur.pos() + 9, "unclosed <!DOCTYPE>"));
        };
        let end = end.advance(1);
        Ok((
            Spanned::new(
                Node::Doctype(Doctype {
                    data: data.to_string(),
                }),
                cur.span_to(end),
            ),
            end,
        ))
    }

    // ============================================
    // Tags
    // ============================================

    fn tag<'s>(&self, cur: Cursor<'s>) -> PResult<(Spanned<Node>, Cursor<'s>)> {
        let (name, after) = cur.advance(1).take_while(is_tag_name_char);
        let (attributes, body, self_closing) = self.attributes(after, cur.pos(), name)?;
        let (slot, attributes) = take_slot(attributes);
        let lower = name.to_ascii_lowercase();

        let leaf = |void: bool, attributes| {
            Spanned::new(
                Node::Tag(Tag {
                    data: name.to_string(),
                    attributes,
                    children: Vec::new(),
                    void,
                    slot: slot.clone(),
                }),
                cur.span_to(body),
            )
        };
        if self.config.is_void(&lower) {
            return Ok((leaf(true, attributes), body));
        }
        if self_closing {
            return Ok((leaf(false, attributes), body));
        }

        let (children, end) = if self.config.is_raw_text(&lower) {
            let Some((raw, end)) = body.take_until_ignore_case(&format!("</{name}")) else {
                return Err(cur
                    .error(cur.span_to(body), format!("unclosed <{name}>"))
                    .with_hint(format!("raw text runs until a literal </{name}>")));
            };
            let children = if raw.is_empty() {
                Vec::new()
            } else {
                vec![Spanned::new(
                    Node::Text(Text {
                        data: raw.to_string(),
                    }),
                    body.span_to(end),
                )]
            };
            (children, end)
        } else {
            let until = Until::CloseTag {
                name,
                open: cur.span_to(body),
            };
            self.children(body, &until)?
        };

        let end = close_tag(end, name)?;
        Ok((
            Spanned::new(
                Node::Tag(Tag {
                    data: name.to_string(),
                    attributes,
                    children,
                    void: false,
                    slot,
                }),
                cur.span_to(end),
            ),
            end,
        ))
    }

    /// Attribute list up to `>` or `/>`; the flag is true for `/>`
    fn attributes<'s>(
        &self,
        mut cur: Cursor<'s>,
        open: usize,
        owner: &str,
    ) -> PResult<(Vec<Spanned<Attribute>>, Cursor<'s>, bool)> {
        let mut attributes = Vec::new();
        loop {
            cur = cur.skip_whitespace();
            if cur.starts_with("/>") {
                return Ok((attributes, cur.advance(2), true));
            }
            if cur.starts_with(">") {
                return Ok((attributes, cur.advance(1), false));
            }
            if cur.is_eof() {
                return Err(cur
                    .error(open..cur.pos(), format!("unclosed <{owner}> tag"))
                    .with_hint("finish the tag with `>` or `/>`"));
            }
            let (attribute, next) = self.attribute(cur)?;
            attributes.push(attribute);
            cur = next;
        }
    }

    fn attribute<'s>(&self, cur: Cursor<'s>) -> PResult<(Spanned<Attribute>, Cursor<'s>)> {
        if cur.starts_with("{") {
            let inner = cur.advance(1).skip_whitespace();
            if inner.starts_with("...") {
                let (expr, end) = parse_expression(inner.advance(3))?;
                let end = end.expect("}", "expected `}` after spread expression")?;
                return Ok((
                    Spanned::new(Attribute::Spread(expr), cur.span_to(end)),
                    end,
                ));
            }

            let (expr, end) = parse_expression(inner)?;
            let end = end.expect("}", "expected `}` to close attribute expression")?;
            let Expr::Identifier(id) = &expr.node else {
                return Err(cur
                    .error(
                        expr.span,
                        "invalid operand: a shorthand attribute must be a plain identifier",
                    )
                    .with_hint("write name={expression} for computed values"));
            };
            let name = id.to_string();
            return Ok((
                Spanned::new(Attribute::Expression { name, value: expr }, cur.span_to(end)),
                end,
            ));
        }

        let (name, after) = cur.take_while(is_attr_name_char);
        if name.is_empty() {
            return Err(cur.error(
                cur.pos()..cur.pos() + cur.next_len(),
                format!("unexpected {:?} in tag", cur.peek().unwrap_or(' ')),
            ));
        }
        let name = name.to_string();

        let eq = after.skip_whitespace();
        if !eq.starts_with("=") {
            return Ok((
                Spanned::new(Attribute::Static { name, value: None }, cur.span_to(after)),
                after,
            ));
        }

        let value = eq.advance(1).skip_whitespace();
        match value.peek() {
            Some(q @ ('"' | '\'')) => {
                let quote = if q == '"' { "\"" } else { "'" };
                let Some((text, end)) = value.advance(1).take_until(quote) else {
                    return Err(value.error(
                        value.pos()..value.pos() + 1,
                        format!("unclosed value for attribute `{name}`"),
                    ));
                };
                let end = end.advance(1);
                Ok((
                    Spanned::new(
                        Attribute::Static {
                            name,
                            value: Some(text.to_string()),
                        },
                        cur.span_to(end),
                    ),
                    end,
                ))
            }
            Some('{') => {
                let (expr, end) = parse_expression(value.advance(1))?;
                let end = end.expect("}", "expected `}` to close attribute expression")?;
                Ok((
                    Spanned::new(
                        Attribute::Expression { name, value: expr },
                        cur.span_to(end),
                    ),
                    end,
                ))
            }
            _ => {
                let (text, end) = value.take_while(|c| !c.is_whitespace() && c != '>');
                if text.is_empty() {
                    return Err(value.error(
                        value.pos()..value.pos() + value.next_len(),
                        format!("expected a value for attribute `{name}`"),
                    ));
                }
                Ok((
                    Spanned::new(
                        Attribute::Static {
                            name,
                            value: Some(text.to_string()),
                        },
                        cur.span_to(end),
                    ),
                    end,
                ))
            }
        }
    }

    // ============================================
    // Directives
    // ============================================

    fn directive<'s>(&self, cur: Cursor<'s>) -> PResult<(Spanned<Node>, Cursor<'s>)> {
        let (name, after) = cur.advance(2).take_while(is_name_char);
        if !DIRECTIVES.contains(&name) {
            let span = cur.span_to(after);
            let err = cur.error(span, format!("unknown directive `:{name}`"));
            return Err(match did_you_mean(name, DIRECTIVES) {
                Some(known) => err.with_hint(format!("did you mean `:{known}`?")),
                None => err.with_hint(format!("known directives: {}", DIRECTIVES.join(", "))),
            });
        }

        let tag_name = format!(":{name}");
        let (attributes, body, self_closing) = self.attributes(after, cur.pos(), &tag_name)?;
        let open = cur.span_to(body);

        if name == "data" {
            return self.data(cur, attributes, body, self_closing, open);
        }

        let (children, end) = if self_closing {
            (Vec::new(), body)
        } else {
            let until = Until::CloseTag {
                name: &tag_name,
                open: open.clone(),
            };
            let (children, end) = self.children(body, &until)?;
            (children, close_tag(end, &tag_name)?)
        };

        let node = match name {
            "component" => {
                let (target, attributes) = take_target(cur, attributes, &open, name)?;
                let (slot, attributes) = take_slot(attributes);
                Node::Component(ComponentDirective {
                    target,
                    attributes,
                    children,
                    slot,
                })
            }
            "element" => {
                let (target, attributes) = take_target(cur, attributes, &open, name)?;
                let (slot, attributes) = take_slot(attributes);
                Node::Element(ElementDirective {
                    target,
                    attributes,
                    children,
                    slot,
                })
            }
            "layout" => {
                let (target, attributes) = take_target(cur, attributes, &open, name)?;
                Node::Layout(LayoutDirective {
                    target,
                    attributes,
                    children,
                })
            }
            "router" => Node::Router(router(cur, attributes, children)?),
            "path" => Node::Path(path(cur, attributes, children, &open)?),
            _ => {
                let (slot_name, attributes) = take_static(cur, attributes, "name", name)?;
                Node::Slot(SlotDirective {
                    name: slot_name.unwrap_or_else(|| "default".to_string()),
                    attributes,
                    children,
                })
            }
        };
        Ok((Spanned::new(node, cur.span_to(end)), end))
    }

    /// `:data` body is raw text up to `</:data>`
    fn data<'s>(
        &self,
        cur: Cursor<'s>,
        attributes: Vec<Spanned<Attribute>>,
        body: Cursor<'s>,
        self_closing: bool,
        open: Span,
    ) -> PResult<(Spanned<Node>, Cursor<'s>)> {
        let (processor, attributes) = take_target(cur, attributes, &open, "data")?;
        let (key, attributes) = take_static(cur, attributes, "key", "data")?;

        let (raw, end) = if self_closing {
            ("", body)
        } else {
            let Some((raw, end)) = body.take_until("</:data") else {
                return Err(cur
                    .error(open, "unclosed <:data>")
                    .with_hint("raw text runs until a literal </:data>"));
            };
            (raw, close_tag(end, ":data")?)
        };

        Ok((
            Spanned::new(
                Node::Data(DataDirective {
                    processor,
                    key: key.unwrap_or_else(|| "$".to_string()),
                    attributes,
                    body: raw.to_string(),
                }),
                cur.span_to(end),
            ),
            end,
        ))
    }

    // ============================================
    // Flow-control blocks
    // ============================================

    fn block<'s>(&self, cur: Cursor<'s>) -> PResult<(Spanned<Node>, Cursor<'s>)> {
        let (name, after) = cur.advance(2).take_while(is_name_char);
        match name {
            "if" => self.if_block(cur, after),
            "skip" => self.skip_block(cur, after),
            "when" => self.when_block(cur, after),
            "each" => self.each_block(cur, after),
            "break" | "continue" => {
                let end = close_brace(after, name)?;
                let node = if name == "break" {
                    Node::Break
                } else {
                    Node::Continue
                };
                Ok((Spanned::new(node, cur.span_to(end)), end))
            }
            "elseif" | "else" => Err(cur
                .error(
                    cur.span_to(after),
                    format!("{{:{name}}} without a matching opening block"),
                )
                .with_hint("{:elseif} belongs to {:if}; {:else} to {:if}, {:each} or {:when}")),
            "is" => Err(cur.error(
                cur.span_to(after),
                "{:is} is only allowed directly inside {:when}",
            )),
            _ => {
                let err = cur.error(cur.span_to(after), format!("unknown block `{{:{name}}}`"));
                Err(match did_you_mean(name, BLOCKS) {
                    Some(known) => err.with_hint(format!("did you mean `{{:{known}}}`?")),
                    None => err.with_hint(format!("known blocks: {}", BLOCKS.join(", "))),
                })
            }
        }
    }

    fn if_block<'s>(
        &self,
        open: Cursor<'s>,
        after: Cursor<'s>,
    ) -> PResult<(Spanned<Node>, Cursor<'s>)> {
        let (test, body) = block_header(after)?;
        let until = Until::Block {
            closer: "if",
            stops: &["elseif", "else"],
            open: open.span_to(body),
        };
        let (children, mut cur) = self.children(body, &until)?;

        let mut links = Vec::new();
        while let Some((false, name)) = block_head(cur) {
            let head = cur.advance(2 + name.len());
            if matches!(links.last(), Some(ElseLink::Else { .. })) {
                return Err(cur
                    .error(
                        cur.span_to(head),
                        format!("malformed else-chain: {{:{name}}} after {{:else}}"),
                    )
                    .with_hint("{:else} must be the last branch of an {:if}"));
            }
            if name == "elseif" {
                let (test, body) = block_header(head)?;
                let (children, next) = self.children(body, &until)?;
                links.push(ElseLink::ElseIf {
                    test,
                    children,
                    span: cur.span_to(next),
                });
                cur = next;
            } else {
                let body = close_brace(head, name)?;
                let (children, next) = self.children(body, &until)?;
                links.push(ElseLink::Else {
                    children,
                    span: cur.span_to(next),
                });
                cur = next;
            }
        }

        let end = close_block(cur, "if")?;
        Ok((
            Spanned::new(
                Node::If(IfBlock {
                    test,
                    children,
                    alternate: link_else_chain(links),
                }),
                open.span_to(end),
            ),
            end,
        ))
    }

    fn skip_block<'s>(
        &self,
        open: Cursor<'s>,
        after: Cursor<'s>,
    ) -> PResult<(Spanned<Node>, Cursor<'s>)> {
        let (test, body) = block_header(after)?;
        let until = Until::Block {
            closer: "skip",
            stops: &[],
            open: open.span_to(body),
        };
        let (children, cur) = self.children(body, &until)?;
        let end = close_block(cur, "skip")?;
        Ok((
            Spanned::new(Node::Skip(SkipBlock { test, children }), open.span_to(end)),
            end,
        ))
    }

    fn when_block<'s>(
        &self,
        open: Cursor<'s>,
        after: Cursor<'s>,
    ) -> PResult<(Spanned<Node>, Cursor<'s>)> {
        let (discriminant, body) = block_header(after)?;
        let until = Until::Block {
            closer: "when",
            stops: &["is", "else"],
            open: open.span_to(body),
        };

        let (prelude, mut cur) = self.children(body, &until)?;
        if let Some(stray) = prelude.iter().find(|n| !n.node.is_blank_text()) {
            return Err(open
                .error(
                    stray.span.clone(),
                    "only {:is} and {:else} blocks may appear directly inside {:when}",
                )
                .with_hint("wrap this content in an {:is} case"));
        }

        let mut cases = Vec::new();
        let mut fallback: Option<Spanned<ElseBlock>> = None;
        while let Some((false, name)) = block_head(cur) {
            let head = cur.advance(2 + name.len());
            if fallback.is_some() {
                return Err(cur
                    .error(
                        cur.span_to(head),
                        format!("malformed {{:when}}: {{:{name}}} after {{:else}}"),
                    )
                    .with_hint("{:else} must be the last case of a {:when}"));
            }
            if name == "is" {
                let (test, body) = block_header(head)?;
                let (children, next) = self.children(body, &until)?;
                cases.push(Spanned::new(IsBlock { test, children }, cur.span_to(next)));
                cur = next;
            } else {
                let body = close_brace(head, name)?;
                let (children, next) = self.children(body, &until)?;
                fallback = Some(Spanned::new(ElseBlock { children }, cur.span_to(next)));
                cur = next;
            }
        }

        let end = close_block(cur, "when")?;
        Ok((
            Spanned::new(
                Node::When(WhenBlock {
                    discriminant,
                    cases,
                    fallback,
                }),
                open.span_to(end),
            ),
            end,
        ))
    }

    fn each_block<'s>(
        &self,
        open: Cursor<'s>,
        after: Cursor<'s>,
    ) -> PResult<(Spanned<Node>, Cursor<'s>)> {
        let (header, body) = parse_each_header(after)?;
        let body = body.expect("}", "expected `}` to close {:each} header")?;
        let until = Until::Block {
            closer: "each",
            stops: &["else"],
            open: open.span_to(body),
        };
        let (children, mut cur) = self.children(body, &until)?;

        let mut fallback = None;
        if let Some((false, name)) = block_head(cur) {
            let head = cur.advance(2 + name.len());
            let body = close_brace(head, name)?;
            let (children, next) = self.children(body, &until)?;
            if let Some((false, again)) = block_head(next) {
                return Err(next.error(
                    next.pos()..next.pos() + 2 + again.len(),
                    "an {:each} block takes at most one {:else}",
                ));
            }
            fallback = Some(Spanned::new(ElseBlock { children }, cur.span_to(next)));
            cur = next;
        }

        let end = close_block(cur, "each")?;
        Ok((
            Spanned::new(
                Node::Each(EachBlock {
                    iterable: header.iterable,
                    context: header.context,
                    index: header.index,
                    children,
                    fallback,
                }),
                open.span_to(end),
            ),
            end,
        ))
    }
}

// ============================================
// Helpers
// ============================================

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_tag_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
}

fn is_attr_name_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '=' | '>' | '/' | '{' | '}' | '"' | '\'' | '<')
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// `<` opens markup when followed by a letter, `:`, `/` or `!`
fn starts_markup(after_lt: &str) -> bool {
    after_lt
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, ':' | '/' | '!'))
}

/// `{:name` or `{/:name` at the cursor; the flag is true for closers
fn block_head(cur: Cursor<'_>) -> Option<(bool, &str)> {
    let (closing, after) = if cur.starts_with("{/:") {
        (true, cur.advance(3))
    } else if cur.starts_with("{:") {
        (false, cur.advance(2))
    } else {
        return None;
    };
    let (name, _) = after.take_while(is_name_char);
    Some((closing, name))
}

fn at_terminator(cur: Cursor<'_>, until: &Until<'_>) -> bool {
    match until {
        Until::Eof => false,
        Until::CloseTag { name, .. } => {
            cur.starts_with("</")
                && cur
                    .advance(2)
                    .take_while(is_tag_name_char)
                    .0
                    .eq_ignore_ascii_case(name)
        }
        Until::Block { closer, stops, .. } => match block_head(cur) {
            Some((true, name)) => name == *closer,
            Some((false, name)) => stops.contains(&name),
            None => false,
        },
    }
}

/// Expression after a block name, up to and including `}`
fn block_header(after: Cursor<'_>) -> PResult<(Spanned<Expr>, Cursor<'_>)> {
    let (expr, end) = parse_expression(after)?;
    let end = end.expect("}", "expected `}` to close block header")?;
    Ok((expr, end))
}

/// `}` ending an argument-less block such as `{:else}`
fn close_brace<'s>(after: Cursor<'s>, name: &str) -> PResult<Cursor<'s>> {
    let cur = after.skip_whitespace();
    if cur.starts_with("}") {
        return Ok(cur.advance(1));
    }
    let err = cur.error(
        cur.pos()..cur.pos() + cur.next_len(),
        format!("{{:{name}}} takes no arguments"),
    );
    Err(if name == "else" {
        err.with_hint("use {:elseif expression} for a conditional branch")
    } else {
        err
    })
}

/// Consume `{/:name}` at the cursor
fn close_block<'s>(cur: Cursor<'s>, name: &str) -> PResult<Cursor<'s>> {
    cur.advance(3 + name.len())
        .skip_whitespace()
        .expect("}", "expected `}` to finish closing block")
}

/// Consume `</name>` at the cursor
fn close_tag<'s>(cur: Cursor<'s>, name: &str) -> PResult<Cursor<'s>> {
    cur.advance(2 + name.len())
        .skip_whitespace()
        .expect(">", "expected `>` to finish closing tag")
}

fn link_else_chain(links: Vec<ElseLink>) -> Option<Box<ElseBranch>> {
    links.into_iter().rev().fold(None, |tail, link| {
        let branch = match link {
            ElseLink::Else { children, span } => {
                ElseBranch::Else(Spanned::new(ElseBlock { children }, span))
            }
            ElseLink::ElseIf {
                test,
                children,
                span,
            } => {
                // Parent span covers the rest of the chain
                let end = tail.as_deref().map(branch_end).unwrap_or(span.end);
                ElseBranch::ElseIf(Spanned::new(
                    ElseIfBlock {
                        test,
                        children,
                        alternate: tail,
                    },
                    span.start..end,
                ))
            }
        };
        Some(Box::new(branch))
    })
}

fn branch_end(branch: &ElseBranch) -> usize {
    match branch {
        ElseBranch::ElseIf(b) => b.span.end,
        ElseBranch::Else(b) => b.span.end,
    }
}

/// Closest known name, if any is similar enough to suggest
fn did_you_mean(name: &str, known: &[&'static str]) -> Option<&'static str> {
    known
        .iter()
        .map(|k| (*k, jaro_winkler(name, k)))
        .filter(|(_, score)| *score > 0.7)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(k, _)| k)
}

/// Lift a static `slot="name"` attribute off a tag or call directive
fn take_slot(attributes: Vec<Spanned<Attribute>>) -> (Option<String>, Vec<Spanned<Attribute>>) {
    let mut slot = None;
    let rest = attributes
        .into_iter()
        .filter(|attr| match &attr.node {
            Attribute::Static {
                name,
                value: Some(value),
            } if name == "slot" => {
                slot = Some(value.clone());
                false
            }
            _ => true,
        })
        .collect();
    (slot, rest)
}

/// Remove the required `use` attribute, turning it into the target expression
fn take_target(
    cur: Cursor<'_>,
    mut attributes: Vec<Spanned<Attribute>>,
    open: &Span,
    directive: &str,
) -> PResult<(Spanned<Expr>, Vec<Spanned<Attribute>>)> {
    let Some(index) = attributes.iter().position(|a| a.node.name() == Some("use")) else {
        return Err(cur
            .error(
                open.clone(),
                format!("missing required attribute `use` on <:{directive}>"),
            )
            .with_hint(format!(r#"add use="name" to <:{directive}>"#)));
    };

    let attr = attributes.remove(index);
    let target = match attr.node {
        Attribute::Static {
            value: Some(value), ..
        } => Spanned::new(Expr::Literal(Literal::String(value)), attr.span),
        Attribute::Expression { value, .. } => value,
        _ => {
            return Err(cur.error(
                attr.span,
                format!("attribute `use` on <:{directive}> needs a value"),
            ))
        }
    };
    Ok((target, attributes))
}

/// Remove an optional attribute that must be a plain string
fn take_static(
    cur: Cursor<'_>,
    mut attributes: Vec<Spanned<Attribute>>,
    attr_name: &str,
    directive: &str,
) -> PResult<(Option<String>, Vec<Spanned<Attribute>>)> {
    let Some(index) = attributes.iter().position(|a| a.node.name() == Some(attr_name)) else {
        return Ok((None, attributes));
    };
    let attr = attributes.remove(index);
    match attr.node {
        Attribute::Static {
            value: Some(value), ..
        } => Ok((Some(value), attributes)),
        _ => Err(cur.error(
            attr.span,
            format!("attribute `{attr_name}` on <:{directive}> must be a quoted string"),
        )),
    }
}

fn router(
    cur: Cursor<'_>,
    attributes: Vec<Spanned<Attribute>>,
    children: Vec<Spanned<Node>>,
) -> PResult<RouterDirective> {
    let mut paths = Vec::new();
    for child in children {
        match child.node {
            Node::Path(path) => paths.push(Spanned::new(path, child.span)),
            ref other if other.is_blank_text() => {}
            _ => {
                return Err(cur
                    .error(child.span, "only <:path> directives are allowed inside <:router>")
                    .with_hint("move this content into a <:path>"))
            }
        }
    }
    Ok(RouterDirective { attributes, paths })
}

fn path(
    cur: Cursor<'_>,
    attributes: Vec<Spanned<Attribute>>,
    children: Vec<Spanned<Node>>,
    open: &Span,
) -> PResult<PathDirective> {
    let url_start = attributes
        .iter()
        .find(|a| a.node.name() == Some("url"))
        .map(|a| value_start(cur.source(), &a.span));
    let (url, attributes) = take_static(cur, attributes, "url", "path")?;
    let (Some(url), Some(url_start)) = (url, url_start) else {
        return Err(cur
            .error(open.clone(), "missing required attribute `url` on <:path>")
            .with_hint(r#"add url="/some/route""#));
    };

    let mut segments = Vec::new();
    let mut offset = url_start;
    for segment in url.split('/') {
        let span = offset..offset + segment.len();
        offset = span.end + 1;
        if segment.is_empty() {
            continue;
        }
        let node = match segment.strip_prefix(':') {
            Some(param) if is_identifier(param) => PathSegment::Dynamic(Identifier::new(param)),
            Some(param) => {
                return Err(cur.error(
                    span,
                    format!("invalid operand: path parameter `:{param}` is not an identifier"),
                ))
            }
            None => PathSegment::Static(segment.to_string()),
        };
        segments.push(Spanned::new(node, span));
    }

    Ok(PathDirective {
        url,
        segments,
        attributes,
        children,
    })
}

/// Byte offset where a static attribute's value starts; values always end
/// their attribute's span
fn value_start(source: &str, span: &Span) -> usize {
    let text = &source[span.clone()];
    let Some(eq) = text.find('=') else {
        return span.end;
    };
    let after = &text[eq + 1..];
    let value = after.trim_start();
    let quote = usize::from(value.starts_with(['"', '\'']));
    span.start + eq + 1 + (after.len() - value.len()) + quote
}

fn group_root(cur: Cursor<'_>, nodes: Vec<Spanned<Node>>) -> PResult<Root> {
    let mut root = Root::default();
    for Spanned { node, span } in nodes {
        match node {
            Node::Layout(layout) => root
                .layout
                .get_or_insert_with(Vec::new)
                .push(Spanned::new(layout, span)),
            Node::Router(router) => {
                if root.router.is_some() {
                    return Err(cur.error(span, "a template may declare only one <:router>"));
                }
                root.router = Some(Spanned::new(router, span));
                root.router_index = root.html.len();
            }
            other => root.html.push(Spanned::new(other, span)),
        }
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single(source: &str) -> Node {
        let root = parse(source).expect("should parse");
        assert_eq!(root.html.len(), 1, "expected one node in {source:?}");
        root.html.into_iter().next().map(|n| n.node).expect("one node")
    }

    fn message(source: &str) -> String {
        match parse(source) {
            Err(ParseError::Syntax { message, .. }) => message,
            other => panic!("expected syntax error for {source:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_void_tag() {
        let Node::Tag(tag) = single("<br/>") else {
            panic!("expected tag");
        };
        assert_eq!(tag.data, "br");
        assert!(tag.attributes.is_empty());
        assert!(tag.children.is_empty());
        assert!(tag.void);
    }

    #[test]
    fn test_parse_nested_tags_and_text() {
        let Node::Tag(div) = single(r#"<div class="a"><p>Hi {name}!</p></div>"#) else {
            panic!("expected tag");
        };
        assert_eq!(div.attributes.len(), 1);
        let Node::Tag(p) = &div.children[0].node else {
            panic!("expected <p>");
        };
        assert_eq!(p.children.len(), 3);
        assert!(matches!(&p.children[1].node, Node::Expression(Expr::Identifier(_))));
    }

    #[test]
    fn test_trailing_whitespace_trimmed() {
        let root = parse("<p>x</p>\n\n  ").expect("should parse");
        assert_eq!(root.html.len(), 1);
    }

    #[test]
    fn test_text_keeps_lone_angle_bracket() {
        let Node::Text(text) = single("a < b") else {
            panic!("expected text");
        };
        assert_eq!(text.data, "a < b");
    }

    #[test]
    fn test_doctype_and_comment() {
        let root = parse("<!doctype html><!-- note -->").expect("should parse");
        assert_eq!(
            root.html[0].node,
            Node::Doctype(Doctype {
                data: "doctype html".to_string()
            })
        );
        assert_eq!(
            root.html[1].node,
            Node::Comment(Comment {
                data: " note ".to_string()
            })
        );
    }

    #[test]
    fn test_unclosed_comment_fails() {
        assert_eq!(message("<!-- never closed"), "unclosed comment");
    }

    #[test]
    fn test_raw_text_is_verbatim() {
        let Node::Tag(script) = single("<script>if (a < b) { x(); }</script>") else {
            panic!("expected tag");
        };
        assert_eq!(
            script.children[0].node,
            Node::Text(Text {
                data: "if (a < b) { x(); }".to_string()
            })
        );
    }

    #[test]
    fn test_attribute_forms() {
        let Node::Tag(tag) =
            single(r#"<input disabled value='x' size=3 title={label} {name} {...rest}>"#)
        else {
            panic!("expected tag");
        };
        let names: Vec<_> = tag.attributes.iter().map(|a| a.node.name()).collect();
        assert_eq!(
            names,
            vec![
                Some("disabled"),
                Some("value"),
                Some("size"),
                Some("title"),
                Some("name"),
                None
            ]
        );
        assert!(matches!(tag.attributes[5].node, Attribute::Spread(_)));
    }

    #[test]
    fn test_slot_attribute_lifted() {
        let Node::Tag(tag) = single(r#"<h1 slot="header" class="t">Hi</h1>"#) else {
            panic!("expected tag");
        };
        assert_eq!(tag.slot.as_deref(), Some("header"));
        assert_eq!(tag.attributes.len(), 1);

        let Node::Component(c) = single(r#"<:component use="badge" slot="title" tone="info"/>"#) else {
            panic!("expected component");
        };
        assert_eq!(c.slot.as_deref(), Some("title"));
        let names: Vec<_> = c.attributes.iter().map(|a| a.node.name()).collect();
        assert_eq!(names, vec![Some("tone")]);
    }

    #[test]
    fn test_mismatched_closing_tag() {
        assert!(message("<div><span></div>").contains("mismatched closing tag"));
        assert!(message("<div>").contains("unclosed <div>"));
        assert!(message("</div>").contains("unexpected closing tag"));
    }

    #[test]
    fn test_unknown_directive_has_hint() {
        let err = parse("<:foobar/>").unwrap_err();
        assert!(err.to_string().contains("unknown directive"));
        let err = parse("<:componet use=\"x\"/>").unwrap_err();
        assert_eq!(err.hint(), Some("did you mean `:component`?"));
    }

    #[test]
    fn test_component_requires_use() {
        assert!(message("<:component/>").contains("missing required attribute `use`"));
        let Node::Component(c) = single(r#"<:component use="card" title="x"/>"#) else {
            panic!("expected component");
        };
        assert_eq!(c.target.node, Expr::Literal(Literal::String("card".to_string())));
        assert_eq!(c.attributes.len(), 1);
    }

    #[test]
    fn test_dynamic_component_target() {
        let Node::Component(c) = single("<:component use={widgets.current}></:component>") else {
            panic!("expected component");
        };
        assert!(matches!(c.target.node, Expr::Member { .. }));
    }

    #[test]
    fn test_data_directive_raw_body() {
        let Node::Data(data) = single(r#"<:data use="sql" key="rows">select * from t where a < 3</:data>"#)
        else {
            panic!("expected data");
        };
        assert_eq!(data.key, "rows");
        assert_eq!(data.body, "select * from t where a < 3");
        assert!(data.attributes.is_empty());

        let Node::Data(data) = single(r#"<:data use="feed"/>"#) else {
            panic!("expected data");
        };
        assert_eq!(data.key, "$");
    }

    #[test]
    fn test_slot_default_name() {
        let Node::Slot(slot) = single("<:slot>fallback</:slot>") else {
            panic!("expected slot");
        };
        assert_eq!(slot.name, "default");
        assert_eq!(slot.children.len(), 1);
    }

    #[test]
    fn test_router_and_paths() {
        let root = parse(
            r#"<:router>
  <:path url="/users/:id">user {params.id}</:path>
  <:path url="/">home</:path>
</:router>"#,
        )
        .expect("should parse");
        let router = root.router.expect("router grouped").node;
        assert_eq!(router.paths.len(), 2);
        assert_eq!(
            router.paths[0]
                .node
                .segments
                .iter()
                .map(|s| s.node.clone())
                .collect::<Vec<_>>(),
            vec![
                PathSegment::Static("users".to_string()),
                PathSegment::Dynamic(Identifier::new("id")),
            ]
        );
        assert!(root.html.is_empty());
    }

    #[test]
    fn test_path_segment_spans() {
        let source = r#"<:router><:path url="/users/:id">x</:path></:router>"#;
        let root = parse(source).expect("should parse");
        let router = root.router.expect("router grouped").node;
        let spans: Vec<&str> = router.paths[0]
            .node
            .segments
            .iter()
            .map(|s| &source[s.span.clone()])
            .collect();
        assert_eq!(spans, vec!["users", ":id"]);

        let source = "<:router><:path url='/a/:1'>x</:path></:router>";
        match parse(source) {
            Err(ParseError::Syntax { span, .. }) => assert_eq!(&source[span], ":1"),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_router_index_records_position() {
        let root = parse(r#"<header/><:router><:path url="/">x</:path></:router><footer/>"#)
            .expect("should parse");
        assert!(root.router.is_some());
        assert_eq!(root.router_index, 1);
        assert_eq!(root.html.len(), 2);
    }

    #[test]
    fn test_router_rejects_other_children() {
        assert!(message("<:router><p>x</p></:router>").contains("only <:path>"));
        assert!(message(r#"<:path url="/">x</:path>"#).contains("only allowed directly inside"));
        assert!(message("<:router><:path>x</:path></:router>").contains("`url`"));
    }

    #[test]
    fn test_second_router_rejected() {
        assert!(message("<:router></:router><:router></:router>").contains("only one"));
    }

    #[test]
    fn test_layouts_grouped() {
        let root = parse(r#"<:layout use="base"/><p>page</p>"#).expect("should parse");
        assert_eq!(root.layout.map(|l| l.len()), Some(1));
        assert_eq!(root.html.len(), 1);
    }

    #[test]
    fn test_if_else_chain() {
        let Node::If(block) =
            single("{:if a}A{:elseif b}B{:elseif c}C{:else}D{/:if}")
        else {
            panic!("expected if");
        };
        let Some(first) = block.alternate.as_deref() else {
            panic!("expected chain");
        };
        let ElseBranch::ElseIf(b) = first else {
            panic!("expected elseif");
        };
        let Some(ElseBranch::ElseIf(c)) = b.node.alternate.as_deref() else {
            panic!("expected second elseif");
        };
        assert!(matches!(c.node.alternate.as_deref(), Some(ElseBranch::Else(_))));
        // Link spans cover the remainder of the chain
        assert!(b.span.end >= c.span.end);
    }

    #[test]
    fn test_malformed_else_chain() {
        assert!(message("{:if a}A{:else}B{:elseif c}C{/:if}").contains("malformed else-chain"));
        assert!(message("{:if a}A{:else}B{:else}C{/:if}").contains("malformed else-chain"));
        assert!(message("{:else}").contains("without a matching"));
        assert!(message("{:if a}x").contains("unclosed {:if}"));
    }

    #[test]
    fn test_when_cases() {
        let Node::When(when) =
            single("{:when kind}\n  {:is 'a'}A{:is 'b'}B{:else}other{/:when}")
        else {
            panic!("expected when");
        };
        assert_eq!(when.cases.len(), 2);
        assert!(when.fallback.is_some());
    }

    #[test]
    fn test_when_rejects_stray_children() {
        assert!(message("{:when k}text{:is 1}x{/:when}").contains("directly inside {:when}"));
        assert!(message("{:is 1}").contains("only allowed directly inside {:when}"));
        assert!(message("{:when k}{:else}x{:is 1}y{/:when}").contains("after {:else}"));
    }

    #[test]
    fn test_each_with_fallback() {
        let Node::Each(each) = single("{:each rows as row, i}{row}{:else}none{/:each}") else {
            panic!("expected each");
        };
        assert_eq!(each.context.node, Identifier::new("row"));
        assert_eq!(each.index.map(|i| i.node), Some(Identifier::new("i")));
        assert_eq!(each.fallback.map(|f| f.node.children.len()), Some(1));
    }

    #[test]
    fn test_break_and_continue() {
        let Node::Each(each) = single("{:each xs as x}{:if x}{:break}{/:if}{:continue}{/:each}")
        else {
            panic!("expected each");
        };
        assert!(matches!(each.children[1].node, Node::Continue));
    }

    #[test]
    fn test_unknown_block_has_hint() {
        let err = parse("{:eachh xs as x}{/:eachh}").unwrap_err();
        assert_eq!(err.hint(), Some("did you mean `{:each}`?"));
    }

    #[test]
    fn test_parse_is_pure() {
        let source = r#"<div {...a} class="x">{:each xs as x}{x.y}{/:each}</div>"#;
        assert_eq!(parse(source), parse(source));
    }

    #[test]
    fn test_parse_bytes_rejects_non_utf8() {
        let err = parse_bytes(&[0x3c, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ParseError::Construction { .. }));
        assert!(parse_bytes(b"<p>ok</p>").is_ok());
    }

    #[test]
    fn test_child_spans_within_parent() {
        let source = "<ul>{:each xs as x}<li>{x}</li>{/:each}</ul>";
        let root = parse(source).expect("should parse");
        let outer = &root.html[0];
        assert_eq!(outer.span, 0..source.len());
        let Node::Tag(ul) = &outer.node else {
            panic!("expected tag");
        };
        for child in &ul.children {
            assert!(child.span.start >= outer.span.start && child.span.end <= outer.span.end);
        }
    }
}
