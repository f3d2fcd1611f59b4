//! Abstract Syntax Tree types for seed templates
//!
//! The tree is built once by [`crate::parse`] and never mutated afterwards;
//! the compiler only ever borrows it.

pub use crate::error::Span;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Valid identifier (letters, digits, `_` and `$`, not starting with a digit)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of parsing a whole template
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Root {
    /// Document content
    pub html: Vec<Spanned<Node>>,
    /// Top-level `<:layout>` directives, applied innermost first
    pub layout: Option<Vec<Spanned<LayoutDirective>>>,
    /// Top-level `<:router>` directive
    pub router: Option<Spanned<RouterDirective>>,
    /// Index into `html` the router renders at
    pub router_index: usize,
}

/// Any node that can appear in a child list
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Doctype(Doctype),
    Comment(Comment),
    Text(Text),
    Tag(Tag),
    /// Inline `{expression}`
    Expression(Expr),

    Component(ComponentDirective),
    Element(ElementDirective),
    Layout(LayoutDirective),
    Router(RouterDirective),
    Path(PathDirective),
    Data(DataDirective),
    Slot(SlotDirective),

    If(IfBlock),
    Skip(SkipBlock),
    When(WhenBlock),
    Each(EachBlock),
    Break,
    Continue,
}

impl Node {
    /// True for text nodes made only of whitespace
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Node::Text(text) if text.data.trim().is_empty())
    }
}

/// `<!DOCTYPE html>`; `data` holds everything between `<!` and `>`
#[derive(Debug, Clone, PartialEq)]
pub struct Doctype {
    pub data: String,
}

/// `<!-- ... -->`
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub data: String,
}

/// Plain markup element
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub data: String,
    pub attributes: Vec<Spanned<Attribute>>,
    pub children: Vec<Spanned<Node>>,
    /// Void elements never have children or a closing tag
    pub void: bool,
    /// Named slot this element fills when passed to a component or layout
    pub slot: Option<String>,
}

/// One entry of an attribute list, in source order
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// `name` or `name="value"`
    Static { name: String, value: Option<String> },
    /// `name={expr}` or `{ident}`
    Expression { name: String, value: Spanned<Expr> },
    /// `{...expr}`
    Spread(Spanned<Expr>),
}

impl Attribute {
    /// Attribute name, `None` for spreads
    pub fn name(&self) -> Option<&str> {
        match self {
            Attribute::Static { name, .. } | Attribute::Expression { name, .. } => Some(name),
            Attribute::Spread(_) => None,
        }
    }
}

// ============================================
// Directives
// ============================================

/// `<:component use="card" title={title}/>`
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDirective {
    pub target: Spanned<Expr>,
    pub attributes: Vec<Spanned<Attribute>>,
    pub children: Vec<Spanned<Node>>,
    /// Named slot the rendered component fills inside another call
    pub slot: Option<String>,
}

/// `<:element use="button" class="primary">` - a component whose first tag
/// receives the directive's attributes
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDirective {
    pub target: Spanned<Expr>,
    pub attributes: Vec<Spanned<Attribute>>,
    pub children: Vec<Spanned<Node>>,
    pub slot: Option<String>,
}

/// `<:layout use="base">`
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDirective {
    pub target: Spanned<Expr>,
    pub attributes: Vec<Spanned<Attribute>>,
    pub children: Vec<Spanned<Node>>,
}

/// `<:router>` holding only `<:path>` children
#[derive(Debug, Clone, PartialEq)]
pub struct RouterDirective {
    pub attributes: Vec<Spanned<Attribute>>,
    pub paths: Vec<Spanned<PathDirective>>,
}

/// `<:path url="/users/:id">`
#[derive(Debug, Clone, PartialEq)]
pub struct PathDirective {
    pub url: String,
    pub segments: Vec<Spanned<PathSegment>>,
    pub attributes: Vec<Spanned<Attribute>>,
    pub children: Vec<Spanned<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Static(String),
    /// `:name` segment, bound under `params.name`
    Dynamic(Identifier),
}

/// `<:data use="processor" key="rows">raw body</:data>`
#[derive(Debug, Clone, PartialEq)]
pub struct DataDirective {
    pub processor: Spanned<Expr>,
    pub key: String,
    pub attributes: Vec<Spanned<Attribute>>,
    pub body: String,
}

/// `<:slot name="header">fallback</:slot>`
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDirective {
    pub name: String,
    pub attributes: Vec<Spanned<Attribute>>,
    pub children: Vec<Spanned<Node>>,
}

// ============================================
// Flow control
// ============================================

#[derive(Debug, Clone, PartialEq)]
pub struct IfBlock {
    pub test: Spanned<Expr>,
    pub children: Vec<Spanned<Node>>,
    pub alternate: Option<Box<ElseBranch>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIfBlock {
    pub test: Spanned<Expr>,
    pub children: Vec<Spanned<Node>>,
    pub alternate: Option<Box<ElseBranch>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseBlock {
    pub children: Vec<Spanned<Node>>,
}

/// Link in an if/elseif/else chain; a chain always ends in `Else` or nothing
#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    ElseIf(Spanned<ElseIfBlock>),
    Else(Spanned<ElseBlock>),
}

/// `{:skip expr}` renders its children when `expr` is falsy
#[derive(Debug, Clone, PartialEq)]
pub struct SkipBlock {
    pub test: Spanned<Expr>,
    pub children: Vec<Spanned<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenBlock {
    pub discriminant: Spanned<Expr>,
    pub cases: Vec<Spanned<IsBlock>>,
    pub fallback: Option<Spanned<ElseBlock>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsBlock {
    pub test: Spanned<Expr>,
    pub children: Vec<Spanned<Node>>,
}

/// `{:each items as item, index}`
#[derive(Debug, Clone, PartialEq)]
pub struct EachBlock {
    pub iterable: Spanned<Expr>,
    pub context: Spanned<Identifier>,
    pub index: Option<Spanned<Identifier>>,
    pub children: Vec<Spanned<Node>>,
    pub fallback: Option<Spanned<ElseBlock>>,
}

// ============================================
// Expressions
// ============================================

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier(Identifier),
    Literal(Literal),
    Member {
        object: Box<Spanned<Expr>>,
        property: Box<Spanned<Expr>>,
        /// `a[b]` rather than `a.b`
        computed: bool,
    },
    Unary {
        operator: UnaryOperator,
        argument: Box<Spanned<Expr>>,
    },
    Update {
        operator: UpdateOperator,
        prefix: bool,
        argument: Box<Spanned<Expr>>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Spanned<Expr>>,
        right: Box<Spanned<Expr>>,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<Spanned<Expr>>,
        right: Box<Spanned<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    StrictEqual,
    StrictNotEqual,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::StrictEqual => "===",
            BinaryOperator::StrictNotEqual => "!==",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessOrEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterOrEqual => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Remainder => "%",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::ShiftLeft => "<<",
            BinaryOperator::ShiftRight => ">>",
            BinaryOperator::UnsignedShiftRight => ">>>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_text_detection() {
        let blank = Node::Text(Text {
            data: " \n\t".to_string(),
        });
        let text = Node::Text(Text {
            data: " x ".to_string(),
        });
        assert!(blank.is_blank_text());
        assert!(!text.is_blank_text());
        assert!(!Node::Break.is_blank_text());
    }

    #[test]
    fn test_attribute_name() {
        let attr = Attribute::Static {
            name: "class".to_string(),
            value: Some("x".to_string()),
        };
        assert_eq!(attr.name(), Some("class"));
        let spread = Attribute::Spread(Spanned::new(Expr::Identifier(Identifier::new("m")), 4..5));
        assert_eq!(spread.name(), None);
    }
}
