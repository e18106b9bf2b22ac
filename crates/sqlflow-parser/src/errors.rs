use crate::lexer::LexError;

/// One parse failure with source position, matching the lexer's error shape
/// so the CLI can format both uniformly.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} at line {line}, column {column}")]
pub struct ParserError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParserError {
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Parsing does not stop at the first error: the parser synchronizes to the
/// next statement boundary and keeps going, so a single bad pipeline file
/// reports every problem it can find in one pass.
#[derive(Debug)]
pub struct ParseError(pub Vec<ParserError>);

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        write!(f, "{joined}")
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError(vec![ParserError::new(
            format!("lexer error: {}", e.message),
            e.line,
            e.column,
        )])
    }
}
