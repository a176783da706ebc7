use logos::Logos;

use crate::error::HuffError;
use crate::span::Span;

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip(r"[ \t\r\n\f]+"))]
pub enum TokenKind {
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("=")]
    Eq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,

    #[regex(r"#[A-Za-z_]+", parse_directive)]
    Directive(String),

    #[regex(r#""[^"\n]*""#, parse_string)]
    #[regex(r"'[^'\n]*'", parse_string)]
    String(String),

    #[regex(r"0x[0-9a-fA-F]+")]
    Hex,

    #[regex(r"[0-9]+")]
    Decimal,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", parse_ident)]
    Ident(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: String,
}

impl Token {
    pub fn is_ident(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(ident) if ident == word)
    }
}

/// Tokenizes `input`, whose first byte sits at absolute offset `base`.
pub fn lex(input: &str, base: usize) -> Result<Vec<Token>, HuffError> {
    let mut lexer = TokenKind::lexer(input);
    let mut tokens = Vec::new();

    while let Some(next) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(range.start, range.end).shifted(base);
        match next {
            Ok(kind) => tokens.push(Token {
                kind,
                span,
                text: lexer.slice().to_string(),
            }),
            Err(()) => {
                return Err(HuffError::Parse {
                    span,
                    found: format_token_for_message(lexer.slice()),
                });
            }
        }
    }

    Ok(tokens)
}

fn parse_directive(lex: &mut logos::Lexer<TokenKind>) -> String {
    lex.slice()[1..].to_string()
}

fn parse_ident(lex: &mut logos::Lexer<TokenKind>) -> String {
    lex.slice().to_string()
}

fn parse_string(lex: &mut logos::Lexer<TokenKind>) -> String {
    let slice = lex.slice();
    slice[1..slice.len() - 1].to_string()
}

fn format_token_for_message(token: &str) -> String {
    token.chars().flat_map(char::escape_default).collect()
}
