use thiserror::Error;

// Modular parser structure
mod parser;
pub use parser::Parser;

/// Source code location for error reporting
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub length: usize,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

impl SourceLocation {
    pub fn from_span(file: &str, source: &str, span: std::ops::Range<usize>) -> Self {
        let before = source.get(..span.start).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let column = before
            .rsplit('\n')
            .next()
            .map_or(0, |l| l.chars().count())
            + 1;
        let length = span.end.saturating_sub(span.start);

        Self {
            file: file.to_string(),
            line,
            column,
            length,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
            length: 0,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error at {location}: {message}")]
    SyntaxError {
        location: SourceLocation,
        message: String,
    },
    #[error("Invalid token at {location}")]
    LexerError { location: SourceLocation },
}

impl ParseError {
    pub fn location(&self) -> &SourceLocation {
        match self {
            ParseError::SyntaxError { location, .. } => location,
            ParseError::LexerError { location } => location,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ParseError::SyntaxError { message, .. } => message.clone(),
            ParseError::LexerError { .. } => "invalid token".to_string(),
        }
    }
}

/// Parse one file's source text
pub fn parse_source(file: &str, source: &str) -> Result<unibox_ast::SourceFile, ParseError> {
    Parser::with_file(file, source)?.parse()
}
