//! Error handling for the Cinder compiler

use crate::utils::Span;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Compiler error
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ==================== Declaration Errors ====================

    #[error("redeclaration of '{name}'")]
    Redeclaration { name: String, span: Option<Span> },

    #[error("identifier does not exist: {name}")]
    IdentifierDoesNotExist { name: String, span: Option<Span> },

    #[error("class not defined: {name}")]
    ClassNotDefined { name: String },

    #[error("no main function defined")]
    MissingMainFunction,

    // ==================== Type Errors ====================

    #[error("cannot access {owner}::{name}{signature}")]
    IllegalAccess {
        owner: String,
        name: String,
        signature: String,
        span: Option<Span>,
    },

    #[error("illegal types for operation '{op}': {types}")]
    IllegalTypesForOperation {
        op: String,
        types: String,
        span: Option<Span>,
    },

    #[error("expression is not an lvalue")]
    IllegalLValue { span: Option<Span> },

    #[error("illegal cast from {from} to {to}")]
    IllegalCast {
        from: String,
        to: String,
        span: Option<Span>,
    },

    #[error("incorrect type: expected {expected}, got {got}")]
    IncorrectType {
        expected: String,
        got: String,
        span: Option<Span>,
    },

    #[error("no constructor {class}({signature})")]
    NoConstructor {
        class: String,
        signature: String,
        span: Option<Span>,
    },

    #[error("cannot dereference a void pointer")]
    VoidDereference { span: Option<Span> },

    #[error("invalid type: {name}")]
    InvalidType { name: String, span: Option<Span> },

    // ==================== Generic Errors ====================

    #[error("generic '{name}' with {arity} type parameters is already declared")]
    GenericRedeclaration { name: String, arity: usize },

    #[error("incorrect amount of parameter types: found {found}")]
    IncorrectParameterTypeCount {
        found: usize,
        expected: Option<usize>,
        span: Option<Span>,
    },

    #[error("illegal parameter types: {found}")]
    IllegalParameterTypes { found: String, span: Option<Span> },

    // ==================== Driver Errors ====================

    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Get the span associated with this error, if any
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Redeclaration { span, .. }
            | Self::IdentifierDoesNotExist { span, .. }
            | Self::IllegalAccess { span, .. }
            | Self::IllegalTypesForOperation { span, .. }
            | Self::IllegalLValue { span }
            | Self::IllegalCast { span, .. }
            | Self::IncorrectType { span, .. }
            | Self::NoConstructor { span, .. }
            | Self::VoidDereference { span }
            | Self::InvalidType { span, .. }
            | Self::IncorrectParameterTypeCount { span, .. }
            | Self::IllegalParameterTypes { span, .. } => *span,
            Self::ClassNotDefined { .. }
            | Self::MissingMainFunction
            | Self::GenericRedeclaration { .. }
            | Self::Io(_) => None,
        }
    }
}
