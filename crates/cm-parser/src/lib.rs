//! Recursive-descent parser for the Cm language.
//!
//! Consumes the token stream from `cm-lexer` and produces the [`ast::Program`]
//! for the unified source. Expressions use Pratt-style precedence climbing;
//! error recovery synchronizes at statement and declaration boundaries and
//! leaves `Error` nodes in the tree.

pub mod ast;
mod parser;
pub mod target_filter;

use cm_common::diagnostics::Diagnostic;
use cm_common::error::LexError;
use cm_common::token::Token;

pub use parser::Parser;

/// Parse a full unified source: lex, then parse.
///
/// Lexer errors are folded into the returned diagnostics so the caller sees
/// one combined list.
pub fn parse_source(source: &str, filename: &str) -> (ast::Program, Vec<Diagnostic>) {
    let (tokens, lex_errors) = cm_lexer::Lexer::tokenize(source);
    parse_tokens(tokens, lex_errors, filename)
}

/// Parse a pre-lexed token stream.
pub fn parse_tokens(
    tokens: Vec<Token>,
    lex_errors: Vec<LexError>,
    filename: &str,
) -> (ast::Program, Vec<Diagnostic>) {
    let mut diagnostics: Vec<Diagnostic> = lex_errors
        .into_iter()
        .map(|e| Diagnostic::error(e.to_string(), e.span))
        .collect();

    let mut parser = Parser::new(tokens);
    let program = parser.parse_program(filename);
    diagnostics.extend(parser.into_diagnostics());
    (program, diagnostics)
}
