pub mod builtins;
pub mod compile;
pub mod error;
mod interpreter;
pub mod parser;
pub mod tokenizer;

pub use compile::{CompiledExpression, EvaluationContext, REF_FUNCTION, reference_formula};
pub use error::{FormulaError, ParserError, TokenizerError};
pub use parser::{ASTNode, ASTNodeType, parse};
pub use tokenizer::{Token, TokenSubType, TokenType, Tokenizer};

// Re-export common types
pub use sheetgraph_common::{Address, CellAddress, ExcelError, ExcelErrorKind, LiteralValue, RangeAddress};
