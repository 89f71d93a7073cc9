//! Shared foundation types for the Cm compiler.
//!
//! Everything downstream of the preprocessor speaks in terms of these types:
//! byte [`span::Span`]s into the unified source, [`token::Token`]s, the
//! preprocessor's [`source_map::SourceMap`], the active build
//! [`target::Target`], and stage [`diagnostics::Diagnostic`]s.

pub mod debug;
pub mod diagnostics;
pub mod error;
pub mod source_map;
pub mod span;
pub mod target;
pub mod token;

pub use span::{LineIndex, Span};
pub use target::Target;
pub use token::{Token, TokenKind, TokenValue};
