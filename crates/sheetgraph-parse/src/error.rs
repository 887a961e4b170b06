/// Failure while splitting formula text into tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("TokenizerError: {message} (at {pos})")]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

/// Failure while building the AST or resolving its references.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ParserError at position {position:?}: {message}")]
pub struct ParserError {
    pub message: String,
    pub position: Option<usize>,
}

impl ParserError {
    pub fn new(message: impl Into<String>, position: Option<usize>) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl From<TokenizerError> for ParserError {
    fn from(err: TokenizerError) -> Self {
        ParserError {
            message: err.message,
            position: Some(err.pos),
        }
    }
}

/// Errors raised while evaluating a compiled expression. Excel error values
/// (`#DIV/0!` and friends) are ordinary results, not `FormulaError`s.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    #[error("function {0} has not been implemented")]
    NotImplemented(String),
    #[error("{name}: {message}")]
    Arguments { name: String, message: String },
    #[error(transparent)]
    Parse(#[from] ParserError),
}

impl FormulaError {
    pub(crate) fn arguments(name: &str, message: impl Into<String>) -> Self {
        FormulaError::Arguments {
            name: name.to_string(),
            message: message.into(),
        }
    }
}
