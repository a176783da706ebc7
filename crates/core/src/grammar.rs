//! Ordered matching rules over the token stream.
//!
//! At every step the rules of a context are tried in declaration order and the
//! first one that matches wins. A rule that does not match leaves the cursor
//! where it was; a rule that matches a prefix it owns and then finds garbage
//! reports the error itself.

use crate::error::HuffError;
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

pub(crate) struct Cursor<'a> {
    tokens: &'a [Token],
    text: &'a str,
    base: usize,
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// `text` starts at absolute offset `base`; token spans are absolute.
    pub(crate) fn new(tokens: &'a [Token], text: &'a str, base: usize) -> Self {
        Self {
            tokens,
            text,
            base,
            pos: 0,
        }
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub(crate) fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn eat(&mut self, kind: &TokenKind) -> Option<&'a Token> {
        if self.peek().is_some_and(|token| &token.kind == kind) {
            return self.bump();
        }
        None
    }

    fn eat_ident(&mut self) -> Option<(&'a str, &'a Token)> {
        let token = self.peek()?;
        let TokenKind::Ident(name) = &token.kind else {
            return None;
        };
        self.pos += 1;
        Some((name.as_str(), token))
    }

    fn eat_keyword(&mut self, word: &str) -> Option<&'a Token> {
        if self.peek().is_some_and(|token| token.is_ident(word)) {
            return self.bump();
        }
        None
    }

    /// Source text between two absolute offsets.
    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[start - self.base..end - self.base]
    }

    /// Consumes `<...>` up to the matching `>` and returns the raw text between
    /// the brackets.
    fn angle_args(&mut self) -> Option<&'a str> {
        let open = self.eat(&TokenKind::Lt)?;
        let mut depth = 1usize;
        while let Some(token) = self.bump() {
            match token.kind {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(self.slice(open.span.end, token.span.start));
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn unexpected(&self) -> HuffError {
        match self.peek() {
            Some(token) => HuffError::Parse {
                span: token.span,
                found: token.text.clone(),
            },
            None => {
                let end = self.base + self.text.len();
                HuffError::Parse {
                    span: Span::new(end, end),
                    found: "end of input".to_string(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopLevelLexeme {
    Template {
        params: Vec<String>,
        span: Span,
    },
    MacroDefinition {
        name: String,
        takes: usize,
        returns: usize,
        /// Absolute range of the text between the braces.
        body: Span,
        span: Span,
    },
    Include {
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopLevelRule {
    Template,
    MacroDefinition,
    Include,
}

pub const TOP_LEVEL_RULES: [TopLevelRule; 3] = [
    TopLevelRule::Template,
    TopLevelRule::MacroDefinition,
    TopLevelRule::Include,
];

impl TopLevelRule {
    pub(crate) fn try_match(
        self,
        cursor: &mut Cursor<'_>,
    ) -> Result<Option<TopLevelLexeme>, HuffError> {
        let start = cursor.pos;
        let matched = match self {
            Self::Template => match_template_decl(cursor),
            Self::MacroDefinition => return match_macro_definition(cursor),
            Self::Include => match_include(cursor),
        };
        if matched.is_none() {
            cursor.pos = start;
        }
        Ok(matched)
    }
}

fn match_template_decl(cursor: &mut Cursor<'_>) -> Option<TopLevelLexeme> {
    let keyword = cursor.eat_keyword("template")?;
    cursor.eat(&TokenKind::Lt)?;
    let mut params = Vec::new();
    if let Some(close) = cursor.eat(&TokenKind::Gt) {
        return Some(TopLevelLexeme::Template {
            params,
            span: Span::new(keyword.span.start, close.span.end),
        });
    }
    loop {
        let (param, _) = cursor.eat_ident()?;
        params.push(param.to_string());
        if let Some(close) = cursor.eat(&TokenKind::Gt) {
            return Some(TopLevelLexeme::Template {
                params,
                span: Span::new(keyword.span.start, close.span.end),
            });
        }
        cursor.eat(&TokenKind::Comma)?;
    }
}

fn match_macro_definition(cursor: &mut Cursor<'_>) -> Result<Option<TopLevelLexeme>, HuffError> {
    let Some(directive) = cursor.peek() else {
        return Ok(None);
    };
    if directive.kind != TokenKind::Directive("define".to_string()) {
        return Ok(None);
    }
    cursor.bump();

    let malformed = |cursor: &Cursor<'_>, expected: &str| {
        let span = cursor.peek().map_or(directive.span, |token| token.span);
        HuffError::MalformedDefinition {
            span,
            message: format!("malformed macro definition: expected {expected}"),
        }
    };

    cursor.eat_keyword("macro");
    let Some((name, _)) = cursor.eat_ident() else {
        return Err(malformed(cursor, "a macro name"));
    };
    if cursor.eat(&TokenKind::Eq).is_none() {
        return Err(malformed(cursor, "'='"));
    }
    let Some(takes) = arity(cursor, "takes") else {
        return Err(malformed(cursor, "'takes(N)'"));
    };
    let Some(returns) = arity(cursor, "returns") else {
        return Err(malformed(cursor, "'returns(N)'"));
    };
    let Some(open) = cursor.eat(&TokenKind::LBrace) else {
        return Err(malformed(cursor, "'{'"));
    };
    while let Some(token) = cursor.bump() {
        if token.kind == TokenKind::RBrace {
            return Ok(Some(TopLevelLexeme::MacroDefinition {
                name: name.to_string(),
                takes,
                returns,
                body: Span::new(open.span.end, token.span.start),
                span: Span::new(directive.span.start, token.span.end),
            }));
        }
    }
    Err(HuffError::MalformedDefinition {
        span: open.span,
        message: format!("macro '{name}' has no closing '}}'"),
    })
}

fn arity(cursor: &mut Cursor<'_>, keyword: &str) -> Option<usize> {
    cursor.eat_keyword(keyword)?;
    cursor.eat(&TokenKind::LParen)?;
    let count = cursor.eat(&TokenKind::Decimal)?;
    cursor.eat(&TokenKind::RParen)?;
    count.text.parse().ok()
}

fn match_include(cursor: &mut Cursor<'_>) -> Option<TopLevelLexeme> {
    let directive = cursor.bump()?;
    if directive.kind != TokenKind::Directive("include".to_string()) {
        return None;
    }
    let path = cursor.bump()?;
    matches!(path.kind, TokenKind::String(_)).then(|| TopLevelLexeme::Include {
        span: Span::new(directive.span.start, path.span.end),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyLexeme {
    MacroCall {
        name: String,
        raw_args: Vec<String>,
        span: Span,
    },
    Template {
        param: String,
        span: Span,
    },
    CodeSize {
        macro_name: String,
        raw_args: Vec<String>,
        span: Span,
    },
    JumpLabel {
        label: String,
        span: Span,
    },
    LiteralDecimal {
        text: String,
        span: Span,
    },
    LiteralHex {
        text: String,
        span: Span,
    },
    Token {
        word: String,
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRule {
    MacroCall,
    Template,
    CodeSize,
    JumpLabel,
    LiteralDecimal,
    LiteralHex,
    Token,
}

pub const BODY_RULES: [BodyRule; 7] = [
    BodyRule::MacroCall,
    BodyRule::Template,
    BodyRule::CodeSize,
    BodyRule::JumpLabel,
    BodyRule::LiteralDecimal,
    BodyRule::LiteralHex,
    BodyRule::Token,
];

impl BodyRule {
    pub(crate) fn try_match(self, cursor: &mut Cursor<'_>) -> Option<BodyLexeme> {
        let start = cursor.pos;
        let matched = match self {
            Self::MacroCall => match_macro_call(cursor),
            Self::Template => match_template_ref(cursor),
            Self::CodeSize => match_codesize(cursor),
            Self::JumpLabel => match_jump_label(cursor),
            Self::LiteralDecimal => match_literal(cursor, &TokenKind::Decimal)
                .map(|(text, span)| BodyLexeme::LiteralDecimal { text, span }),
            Self::LiteralHex => match_literal(cursor, &TokenKind::Hex)
                .map(|(text, span)| BodyLexeme::LiteralHex { text, span }),
            Self::Token => cursor.eat_ident().map(|(word, token)| BodyLexeme::Token {
                word: word.to_string(),
                span: token.span,
            }),
        };
        if matched.is_none() {
            cursor.pos = start;
        }
        matched
    }
}

fn raw_args(args: Option<&str>) -> Vec<String> {
    args.map(str::trim)
        .filter(|args| !args.is_empty())
        .map(|args| vec![args.to_string()])
        .unwrap_or_default()
}

fn match_macro_call(cursor: &mut Cursor<'_>) -> Option<BodyLexeme> {
    let (name, token) = cursor.eat_ident()?;
    let args = if cursor.peek().is_some_and(|next| next.kind == TokenKind::Lt) {
        Some(cursor.angle_args()?)
    } else {
        None
    };
    cursor.eat(&TokenKind::LParen)?;
    let close = cursor.eat(&TokenKind::RParen)?;
    Some(BodyLexeme::MacroCall {
        name: name.to_string(),
        raw_args: raw_args(args),
        span: Span::new(token.span.start, close.span.end),
    })
}

fn match_template_ref(cursor: &mut Cursor<'_>) -> Option<BodyLexeme> {
    let open = cursor.eat(&TokenKind::Lt)?;
    let (param, _) = cursor.eat_ident()?;
    let close = cursor.eat(&TokenKind::Gt)?;
    Some(BodyLexeme::Template {
        param: param.to_string(),
        span: Span::new(open.span.start, close.span.end),
    })
}

fn match_codesize(cursor: &mut Cursor<'_>) -> Option<BodyLexeme> {
    let keyword = cursor.eat_keyword("__codesize")?;
    cursor.eat(&TokenKind::LParen)?;
    let (macro_name, _) = cursor.eat_ident()?;
    let args = if cursor.peek().is_some_and(|next| next.kind == TokenKind::Lt) {
        Some(cursor.angle_args()?)
    } else {
        None
    };
    let close = cursor.eat(&TokenKind::RParen)?;
    Some(BodyLexeme::CodeSize {
        macro_name: macro_name.to_string(),
        raw_args: raw_args(args),
        span: Span::new(keyword.span.start, close.span.end),
    })
}

fn match_jump_label(cursor: &mut Cursor<'_>) -> Option<BodyLexeme> {
    let (label, token) = cursor.eat_ident()?;
    let colon = cursor.eat(&TokenKind::Colon)?;
    Some(BodyLexeme::JumpLabel {
        label: label.to_string(),
        span: Span::new(token.span.start, colon.span.end),
    })
}

fn match_literal(cursor: &mut Cursor<'_>, kind: &TokenKind) -> Option<(String, Span)> {
    let token = cursor.eat(kind)?;
    Some((token.text.clone(), token.span))
}

/// Applies the top-level rules until the input is exhausted.
pub(crate) fn top_level_lexemes(cursor: &mut Cursor<'_>) -> Result<Vec<TopLevelLexeme>, HuffError> {
    let mut lexemes = Vec::new();
    'outer: while !cursor.is_eof() {
        for rule in TOP_LEVEL_RULES {
            if let Some(lexeme) = rule.try_match(cursor)? {
                lexemes.push(lexeme);
                continue 'outer;
            }
        }
        return Err(cursor.unexpected());
    }
    Ok(lexemes)
}

/// Applies the macro body rules until the input is exhausted.
pub(crate) fn body_lexemes(cursor: &mut Cursor<'_>) -> Result<Vec<BodyLexeme>, HuffError> {
    let mut lexemes = Vec::new();
    'outer: while !cursor.is_eof() {
        for rule in BODY_RULES {
            if let Some(lexeme) = rule.try_match(cursor) {
                lexemes.push(lexeme);
                continue 'outer;
            }
        }
        return Err(cursor.unexpected());
    }
    Ok(lexemes)
}
