use cm_common::error::LexErrorKind;
use cm_common::token::{TokenKind, TokenValue};
use cm_lexer::Lexer;

fn kinds(source: &str) -> Vec<TokenKind> {
    let (tokens, errors) = Lexer::tokenize(source);
    assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
    tokens.into_iter().map(|t| t.kind).collect()
}

#[test]
fn empty_source_is_just_eof() {
    assert_eq!(kinds(""), vec![TokenKind::Eof]);
    assert_eq!(kinds("   \n\t  "), vec![TokenKind::Eof]);
}

#[test]
fn keywords_and_identifiers() {
    assert_eq!(
        kinds("int main matches"),
        vec![TokenKind::KwInt, TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]
    );
    assert_eq!(
        kinds("match defer must move"),
        vec![
            TokenKind::KwMatch,
            TokenKind::KwDefer,
            TokenKind::KwMust,
            TokenKind::KwMove,
            TokenKind::Eof
        ]
    );
}

#[test]
fn hello_world_token_stream() {
    let toks = kinds("int main() { println(\"hello\"); return 0; }");
    assert_eq!(
        toks,
        vec![
            TokenKind::KwInt,
            TokenKind::Ident,
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::LBrace,
            TokenKind::Ident,
            TokenKind::LParen,
            TokenKind::StringLiteral,
            TokenKind::RParen,
            TokenKind::Semicolon,
            TokenKind::KwReturn,
            TokenKind::IntLiteral,
            TokenKind::Semicolon,
            TokenKind::RBrace,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn integer_radixes() {
    let (tokens, errors) = Lexer::tokenize("255 0xFF 0b11111111 0377");
    assert!(errors.is_empty());
    let values: Vec<i64> = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::IntLiteral)
        .map(|t| t.as_int())
        .collect();
    assert_eq!(values, vec![255, 255, 255, 255]);
}

#[test]
fn float_literals() {
    let (tokens, errors) = Lexer::tokenize("1.5 2e10 3.25e-2");
    assert!(errors.is_empty());
    let values: Vec<f64> = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::FloatLiteral)
        .map(|t| t.as_float())
        .collect();
    assert_eq!(values, vec![1.5, 2e10, 3.25e-2]);
}

#[test]
fn range_is_not_a_float() {
    assert_eq!(
        kinds("1..5"),
        vec![TokenKind::IntLiteral, TokenKind::DotDot, TokenKind::IntLiteral, TokenKind::Eof]
    );
    assert_eq!(
        kinds("1..=5"),
        vec![TokenKind::IntLiteral, TokenKind::DotDotEq, TokenKind::IntLiteral, TokenKind::Eof]
    );
}

#[test]
fn string_escapes_resolved() {
    let (tokens, errors) = Lexer::tokenize(r#""a\nb\t\"c\"""#);
    assert!(errors.is_empty());
    assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
    assert_eq!(tokens[0].as_str(), "a\nb\t\"c\"");
}

#[test]
fn raw_string_verbatim() {
    let (tokens, errors) = Lexer::tokenize(r#"r"a\nb""#);
    assert!(errors.is_empty());
    assert_eq!(tokens[0].as_str(), "a\\nb");
}

#[test]
fn triple_raw_string_indent_normalized() {
    let src = "r\"\"\"\n    line one\n      indented\n    line two\n\"\"\"";
    let (tokens, errors) = Lexer::tokenize(src);
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
    assert_eq!(tokens[0].as_str(), "\nline one\n  indented\nline two\n");
}

#[test]
fn comments_are_skipped() {
    assert_eq!(
        kinds("1 // comment\n2 /* block\nspanning */ 3"),
        vec![
            TokenKind::IntLiteral,
            TokenKind::IntLiteral,
            TokenKind::IntLiteral,
            TokenKind::Eof
        ]
    );
}

#[test]
fn compound_operators_maximal_munch() {
    assert_eq!(
        kinds("a <<= b >>= c && d || e"),
        vec![
            TokenKind::Ident,
            TokenKind::LtLtEq,
            TokenKind::Ident,
            TokenKind::GtGtEq,
            TokenKind::Ident,
            TokenKind::AmpAmp,
            TokenKind::Ident,
            TokenKind::PipePipe,
            TokenKind::Ident,
            TokenKind::Eof
        ]
    );
}

#[test]
fn nested_generics_produce_gtgt() {
    // The parser splits `>>` into two closing angle brackets; the lexer
    // reports the raw compound token.
    assert_eq!(
        kinds("Map<int, List<int>>"),
        vec![
            TokenKind::Ident,
            TokenKind::Lt,
            TokenKind::KwInt,
            TokenKind::Comma,
            TokenKind::Ident,
            TokenKind::Lt,
            TokenKind::KwInt,
            TokenKind::GtGt,
            TokenKind::Eof
        ]
    );
}

#[test]
fn char_literal_with_escape() {
    let (tokens, errors) = Lexer::tokenize(r"'a' '\n'");
    assert!(errors.is_empty());
    assert_eq!(tokens[0].kind, TokenKind::CharLiteral);
    assert_eq!(tokens[0].as_str(), "a");
    assert_eq!(tokens[1].as_str(), "\n");
}

#[test]
fn unterminated_string_is_an_error() {
    let (tokens, errors) = Lexer::tokenize("\"abc");
    assert_eq!(tokens[0].kind, TokenKind::Error);
    assert!(matches!(errors[0].kind, LexErrorKind::UnterminatedString));
}

#[test]
fn unexpected_character_recovers() {
    let (tokens, errors) = Lexer::tokenize("a @ b");
    assert_eq!(
        tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
        vec![TokenKind::Ident, TokenKind::Error, TokenKind::Ident, TokenKind::Eof]
    );
    assert!(matches!(errors[0].kind, LexErrorKind::UnexpectedCharacter('@')));
}

#[test]
fn int64_min_magnitude_is_representable() {
    // 9223372036854775808 == -INT64_MIN; it wraps to i64::MIN so a leading
    // unary minus in the parser round-trips exactly.
    let (tokens, errors) = Lexer::tokenize("9223372036854775808");
    assert!(errors.is_empty());
    assert_eq!(tokens[0].value, TokenValue::Int(i64::MIN));
}

#[test]
fn spans_cover_the_token_text() {
    let (tokens, _) = Lexer::tokenize("let xyz = 42;");
    let ident = &tokens[1];
    assert_eq!(ident.span.start, 4);
    assert_eq!(ident.span.end, 7);
}
