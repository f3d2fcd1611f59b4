//! Error types for template parsing

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Widest snippet kept around an error position
const SNIPPET_WIDTH: usize = 60;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The input could not be read as template text at all
    #[error("template source is not text: {message}")]
    Construction { message: String },

    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        /// Source line around the error
        snippet: String,
        hint: Option<String>,
    },
}

impl ParseError {
    /// Build a syntax error, capturing the source line around `span.start`
    pub fn syntax(source: &str, span: Span, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            snippet: snippet_at(source, span.start),
            span,
            message: message.into(),
            hint: None,
        }
    }

    /// Attach a remediation hint
    pub fn with_hint(mut self, new_hint: impl Into<String>) -> Self {
        if let ParseError::Syntax { hint, .. } = &mut self {
            *hint = Some(new_hint.into());
        }
        self
    }

    pub fn span(&self) -> Option<&Span> {
        match self {
            ParseError::Syntax { span, .. } => Some(span),
            ParseError::Construction { .. } => None,
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            ParseError::Syntax { hint, .. } => hint.as_deref(),
            ParseError::Construction { .. } => None,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let (span, message, hint) = match self {
            ParseError::Construction { .. } => return self.to_string(),
            ParseError::Syntax {
                span,
                message,
                hint,
                ..
            } => (span, message, hint),
        };

        // ariadne wants the label inside the source
        let start = span.start.min(source.len());
        let end = span.end.clamp(start, source.len());

        let mut report = Report::build(ReportKind::Error, filename, start)
            .with_message(message)
            .with_label(
                Label::new((filename, start..end))
                    .with_message(message)
                    .with_color(Color::Red),
            );
        if let Some(hint) = hint {
            report = report.with_help(hint);
        }

        let mut buf = Vec::new();
        if report
            .finish()
            .write((filename, Source::from(source)), &mut buf)
            .is_err()
        {
            return self.to_string();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Extract the line containing `pos`, clipped to [`SNIPPET_WIDTH`] characters
fn snippet_at(source: &str, pos: usize) -> String {
    let pos = floor_char_boundary(source, pos.min(source.len()));
    let line_start = source[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[pos..]
        .find('\n')
        .map(|i| pos + i)
        .unwrap_or(source.len());
    let line = &source[line_start..line_end];

    let column = source[line_start..pos].chars().count();
    let skip = column.saturating_sub(SNIPPET_WIDTH / 2);
    line.chars()
        .skip(skip)
        .take(SNIPPET_WIDTH)
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
