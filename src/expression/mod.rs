//! The restricted expression language used by Condition nodes.

pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod value;

use thiserror::Error;

pub use interpreter::{evaluate, Bindings};
pub use lexer::REFERENCE_PATTERN;
pub use parser::{parse, Expr, Scope};
pub use value::Value;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Expression is empty")]
    Empty,

    #[error("Expression is {length} bytes long, the limit is {max}")]
    TooLong { length: usize, max: usize },

    #[error("Unexpected character '{found}' at position {position}")]
    UnexpectedCharacter { found: char, position: usize },

    #[error("Unterminated string starting at position {position}")]
    UnterminatedString { position: usize },

    #[error("Unexpected {0}")]
    UnexpectedToken(String),

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Expression nests deeper than {0} levels")]
    TooDeep(usize),

    #[error("Method '{0}' is not allowed")]
    MethodNotAllowed(String),

    #[error("Property '{0}' is not allowed")]
    PropertyNotAllowed(String),

    #[error("Unresolved reference {0}")]
    UnresolvedReference(String),

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("Cannot read '{member}' of {receiver}")]
    NullReceiver {
        member: String,
        receiver: &'static str,
    },

    #[error("'{method}' is not a method of {receiver}")]
    NotCallable {
        method: String,
        receiver: &'static str,
    },
}
