//! Token interface consumed from the external front end
//!
//! Lexing and preprocessing happen outside this crate; the analyzers only
//! ever see finished tokens carried on tree nodes.
#![allow(dead_code)]

use crate::utils::Span;
use serde::{Deserialize, Serialize};

/// A single token: its literal image and source position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Literal text as it appeared in the source
    pub image: String,
    /// Source position
    #[serde(default)]
    pub span: Span,
}

impl Token {
    pub fn new(image: impl Into<String>, span: Span) -> Self {
        Self { image: image.into(), span }
    }

    /// Token with a dummy span, used by tests and synthesized nodes
    pub fn synthetic(image: impl Into<String>) -> Self {
        Self { image: image.into(), span: Span::dummy() }
    }
}
