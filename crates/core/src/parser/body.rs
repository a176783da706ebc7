use rustc_hash::FxHashMap;

use huffc_eval::{EvalError, parse_number};
use huffc_isa::OpcodeTable;

use crate::ast::{MacroTable, Op, OpKind, flatten_args};
use crate::error::HuffError;
use crate::grammar::{BodyLexeme, Cursor, body_lexemes};
use crate::lexer::lex;
use crate::span::Span;

/// Parses one macro body whose first byte sits at absolute offset
/// `absolute_start`. `macros` holds the macros defined before this one.
pub fn parse_macro(
    body: &str,
    macros: &MacroTable,
    absolute_start: usize,
    opcodes: &OpcodeTable,
) -> Result<Vec<Op>, HuffError> {
    let tokens = lex(body, absolute_start)?;
    let mut cursor = Cursor::new(&tokens, body, absolute_start);
    let lexemes = body_lexemes(&mut cursor)?;

    let mut labels: FxHashMap<String, Span> = FxHashMap::default();
    let mut ops = Vec::with_capacity(lexemes.len());
    for lexeme in lexemes {
        let op = match lexeme {
            BodyLexeme::MacroCall {
                name,
                raw_args,
                span,
            } => {
                check_call_arity(macros, &name, &raw_args, span)?;
                Op::new(OpKind::MacroCall { name, raw_args }, span)
            }
            BodyLexeme::Template { param, span } => Op::new(OpKind::TemplateRef { param }, span),
            BodyLexeme::CodeSize {
                macro_name,
                raw_args,
                span,
            } => Op::new(
                OpKind::Codesize {
                    macro_name,
                    raw_args,
                },
                span,
            ),
            BodyLexeme::JumpLabel { label, span } => {
                if let Some(first) = labels.get(&label) {
                    return Err(HuffError::DuplicateJumpLabel {
                        label,
                        span,
                        first: *first,
                    });
                }
                labels.insert(label.clone(), span);
                Op::new(OpKind::JumpDest { label }, span)
            }
            BodyLexeme::LiteralDecimal { text, span } => {
                let value = parse_number(&text).ok_or_else(|| HuffError::Literal {
                    source: EvalError::UnknownLiteral {
                        literal: text.clone(),
                    },
                    span,
                })?;
                Op::new(OpKind::push(&value, &text, span)?, span)
            }
            BodyLexeme::LiteralHex { text, span } => Op::new(OpKind::hex_push(&text, span)?, span),
            BodyLexeme::Token { word, span } => match opcodes.opcode(&word) {
                Some(byte) => Op::new(OpKind::Opcode { byte }, span),
                None => Op::new(OpKind::PushJumpLabel { label: word }, span),
            },
        };
        ops.push(op);
    }

    Ok(ops)
}

/// Calls to macros already known that take no template arguments cannot be
/// given any.
fn check_call_arity(
    macros: &MacroTable,
    name: &str,
    raw_args: &[String],
    span: Span,
) -> Result<(), HuffError> {
    let Some(callee) = macros.get(name) else {
        return Ok(());
    };
    let got = flatten_args(raw_args).len();
    if callee.template_params.is_empty() && got > 0 {
        return Err(HuffError::TemplateArityMismatch {
            name: name.to_string(),
            expected: 0,
            got,
            span: Some(span),
        });
    }
    Ok(())
}
