//! Parser for seed templates

pub mod ast;
pub mod config;
mod cursor;
mod expression;
mod grammar;
pub mod lexer;

pub use ast::*;
pub use config::ParserConfig;
pub use grammar::{parse, parse_bytes, parse_with};
