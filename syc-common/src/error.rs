//! Error handling for the SysY compiler
//!
//! The middle-end assumes well-typed input (type checking happens in the
//! front end), so the error surface is small: code generation problems,
//! output I/O, and internal invariant violations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main compiler error type that encompasses the back-end phases
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompilerError {
    #[error("Code generation error: {message}")]
    Codegen { message: String },

    #[error("IO error writing {path}: {message}")]
    Io { path: String, message: String },

    #[error("Internal compiler error: {message}")]
    Internal { message: String },
}

impl CompilerError {
    /// Create a codegen error
    pub fn codegen(message: impl Into<String>) -> Self {
        CompilerError::Codegen {
            message: message.into(),
        }
    }

    /// Create an internal invariant-violation error
    pub fn internal(message: impl Into<String>) -> Self {
        CompilerError::Internal {
            message: message.into(),
        }
    }

    /// Create an I/O error tagged with the destination path
    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        CompilerError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Convert from String (for simple error cases)
impl From<String> for CompilerError {
    fn from(message: String) -> Self {
        CompilerError::Internal { message }
    }
}
