//! Seed - an HTML template language with directives and flow control
//!
//! This library provides the parser, the compiler and the resolver layer for
//! seed templates.
//!
//! # Example
//!
//! ```rust
//! use seed_template::{render, Value};
//! use serde_json::json;
//!
//! let context = Value::from(json!({"user": {"name": "Ada"}}));
//! let html = render("<p>Hello {user.name}</p>", &context).unwrap();
//! assert_eq!(html, "<p>Hello Ada</p>");
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod parser;
pub mod resolver;

pub use compiler::{CompileError, Compiler, CompilerConfig, Output, Value};
pub use config::{Config, ConfigError};
pub use error::ParseError;
pub use parser::{parse, parse_bytes, parse_with, ParserConfig, Root};

use thiserror::Error;

/// Errors that can occur during the render pipeline
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Render template source against `context` with default configuration
///
/// No resolvers are configured, so components, layouts and data directives
/// fail; use [`render_with`] for those.
///
/// # Example
///
/// ```rust
/// use seed_template::{render, Value};
/// use serde_json::json;
///
/// let context = Value::from(json!({"desserts": ["Ice Cream", "Brownie"]}));
/// let html = render("{:each desserts as d}<li>{d}</li>{/:each}", &context).unwrap();
/// assert_eq!(html, "<li>Ice Cream</li><li>Brownie</li>");
/// ```
pub fn render(source: &str, context: &Value) -> Result<String, RenderError> {
    let output = render_with(source, context, &ParserConfig::default(), &Compiler::default())?;
    Ok(output.source)
}

/// Parse with `parser` and render with `compiler`, keeping the metadata
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use seed_template::resolver::MemoryResolver;
/// use seed_template::{render_with, Compiler, ParserConfig, Value};
///
/// let components = MemoryResolver::new().with_template("badge", "<b class=\"badge\"><:slot/></b>");
/// let compiler = Compiler::default().with_component_resolver(Arc::new(components));
///
/// let output = render_with(
///     r#"<:component use="badge">new</:component>"#,
///     &Value::object(),
///     &ParserConfig::default(),
///     &compiler,
/// )
/// .unwrap();
/// assert_eq!(output.source, r#"<b class="badge">new</b>"#);
/// assert!(output.classes.contains("badge"));
/// ```
pub fn render_with(
    source: &str,
    context: &Value,
    parser: &ParserConfig,
    compiler: &Compiler,
) -> Result<Output, RenderError> {
    let root = parse_with(source, parser)?;
    Ok(compiler.compile_root(&root, context)?)
}
