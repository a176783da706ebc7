use std::sync::Arc;

use indexmap::IndexMap;
use num_bigint::{BigInt, Sign};

use huffc_eval::ConstantSource;
use huffc_isa::{MAX_PUSH_BYTES, push_opcode};

use crate::error::HuffError;
use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    pub kind: OpKind,
    pub span: Span,
}

impl Op {
    pub fn new(kind: OpKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Absolute offset of the op's first token.
    pub fn source_index(&self) -> usize {
        self.span.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    Opcode { byte: u8 },
    Push { opcode: u8, payload: Vec<u8> },
    JumpDest { label: String },
    PushJumpLabel { label: String },
    MacroCall { name: String, raw_args: Vec<String> },
    TemplateRef { param: String },
    Codesize { macro_name: String, raw_args: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    pub template_params: Vec<String>,
    pub takes: usize,
    pub returns: usize,
    pub ops: Vec<Op>,
    pub raw_body: String,
    pub span: Span,
}

impl Macro {
    /// Value of a macro whose body is exactly one push.
    pub fn constant_value(&self) -> Option<BigInt> {
        match self.ops.as_slice() {
            [
                Op {
                    kind: OpKind::Push { payload, .. },
                    ..
                },
            ] => Some(BigInt::from_bytes_be(Sign::Plus, payload)),
            _ => None,
        }
    }
}

/// Macros by name. Cloning is cheap: bodies are shared.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: IndexMap<String, Arc<Macro>>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Macro>> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Macros in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Macro> {
        self.macros.values().map(Arc::as_ref)
    }

    pub fn insert(&mut self, mac: Macro) -> Result<(), HuffError> {
        if let Some(existing) = self.macros.get(&mac.name) {
            return Err(HuffError::DuplicateMacro {
                name: mac.name,
                span: mac.span,
                first: existing.span,
            });
        }
        self.macros.insert(mac.name.clone(), Arc::new(mac));
        Ok(())
    }

    /// Copy of this table extended with a compiler-synthesized macro. The
    /// receiver is left untouched.
    pub fn with_ephemeral(&self, mac: Macro) -> MacroTable {
        let mut extended = self.clone();
        extended.macros.insert(mac.name.clone(), Arc::new(mac));
        extended
    }
}

impl ConstantSource for MacroTable {
    fn constant(&self, name: &str) -> Option<BigInt> {
        self.get(name).and_then(|mac| mac.constant_value())
    }
}

/// Splits raw template arguments at commas. Each raw entry may itself hold
/// several arguments.
pub fn flatten_args(raw_args: &[String]) -> Vec<String> {
    raw_args
        .iter()
        .flat_map(|raw| raw.split(','))
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(str::to_string)
        .collect()
}

/// Opcode and minimal big-endian payload pushing `value`.
pub fn encode_push(value: &BigInt, literal: &str, span: Span) -> Result<(u8, Vec<u8>), HuffError> {
    let (sign, payload) = value.to_bytes_be();
    if sign == Sign::Minus {
        return Err(HuffError::NegativeLiteral {
            literal: literal.to_string(),
            span,
        });
    }
    push_with_payload(payload, literal, span)
}

/// Opcode and payload for a `0x` literal. The written digits set the width:
/// an odd count gains one leading zero, leading zero bytes are kept.
pub fn encode_hex_push(literal: &str, span: Span) -> Result<(u8, Vec<u8>), HuffError> {
    let malformed = || HuffError::MalformedPush {
        reason: format!("'{literal}' is not a hex literal"),
        span,
    };
    let digits = literal.strip_prefix("0x").ok_or_else(malformed)?;
    let nibbles = digits
        .chars()
        .map(|ch| ch.to_digit(16).map(|digit| digit as u8))
        .collect::<Option<Vec<u8>>>()
        .filter(|nibbles| !nibbles.is_empty())
        .ok_or_else(malformed)?;

    let mut payload = Vec::with_capacity(nibbles.len().div_ceil(2));
    let mut rest = nibbles.as_slice();
    if rest.len() % 2 == 1 {
        payload.push(rest[0]);
        rest = &rest[1..];
    }
    payload.extend(rest.chunks_exact(2).map(|pair| (pair[0] << 4) | pair[1]));
    push_with_payload(payload, literal, span)
}

fn push_with_payload(
    payload: Vec<u8>,
    literal: &str,
    span: Span,
) -> Result<(u8, Vec<u8>), HuffError> {
    if payload.len() > MAX_PUSH_BYTES {
        return Err(HuffError::LiteralTooLarge {
            literal: literal.to_string(),
            bytes: payload.len(),
            span,
        });
    }
    let opcode = push_opcode(payload.len()).map_err(|err| HuffError::MalformedPush {
        reason: err.to_string(),
        span,
    })?;
    Ok((opcode, payload))
}

impl OpKind {
    pub fn push(value: &BigInt, literal: &str, span: Span) -> Result<Self, HuffError> {
        let (opcode, payload) = encode_push(value, literal, span)?;
        Ok(Self::Push { opcode, payload })
    }

    pub fn hex_push(literal: &str, span: Span) -> Result<Self, HuffError> {
        let (opcode, payload) = encode_hex_push(literal, span)?;
        Ok(Self::Push { opcode, payload })
    }
}
