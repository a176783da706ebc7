use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use rustc_hash::FxHashSet;
use tracing::trace;

use huffc_eval::{evaluate, is_expression, parse_number};
use huffc_isa::{JUMPDEST, OpcodeTable, PUSH2, push_width};

use crate::ast::{Macro, MacroTable, Op, OpKind, encode_push, flatten_args};
use crate::error::HuffError;
use crate::span::Span;

/// Largest byte count a literal template argument may stand for while
/// measuring. Offsets past it cannot be reached by a `PUSH2` jump.
const MAX_MEASURED_BYTES: usize = 0xFFFF;

/// Bytecode of one expansion with the absolute source offset of every byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    pub bytecode: Vec<u8>,
    pub source_indices: Vec<usize>,
}

impl Expansion {
    pub fn len(&self) -> usize {
        self.bytecode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytecode.is_empty()
    }

    /// Lowercase hex without a `0x` prefix.
    pub fn to_hex(&self) -> String {
        to_hex(&self.bytecode)
    }
}

/// Lowercase hex without a `0x` prefix.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Bytes produced by a single op.
#[derive(Debug)]
struct Fragment {
    bytes: Vec<u8>,
    source_indices: Vec<usize>,
    pending: Option<PendingJump>,
}

impl Fragment {
    fn from_op(bytes: Vec<u8>, op: &Op) -> Self {
        let source_indices = vec![op.source_index(); bytes.len()];
        Self {
            bytes,
            source_indices,
            pending: None,
        }
    }

    fn from_expansion(expansion: Expansion) -> Self {
        Self {
            bytes: expansion.bytecode,
            source_indices: expansion.source_indices,
            pending: None,
        }
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// A `PUSH2` placeholder waiting for the offset of its label.
#[derive(Debug)]
struct PendingJump {
    label: String,
    span: Span,
}

#[derive(Debug)]
struct JumpTarget {
    fragment: usize,
    span: Span,
}

/// Jump labels of one macro invocation. Nested invocations get their own.
#[derive(Debug, Default)]
struct JumpContext {
    /// Label -> fragment holding its `JUMPDEST`.
    jump_indices: IndexMap<String, JumpTarget>,
    referenced: FxHashSet<String>,
}

/// Template parameter bindings of one invocation.
struct Bindings<'m> {
    params: &'m [String],
    args: Vec<String>,
}

impl Bindings<'_> {
    fn get(&self, param: &str) -> Option<&str> {
        self.params
            .iter()
            .position(|name| name == param)
            .map(|index| self.args[index].as_str())
    }

    /// Whole-word, single-pass replacement of bound parameter names.
    fn substitute(&self, raw: &str) -> String {
        let bytes = raw.as_bytes();
        let mut out = String::with_capacity(raw.len());
        let mut i = 0;
        while i < bytes.len() {
            let byte = bytes[i];
            if byte.is_ascii_alphanumeric() || byte == b'_' {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let word = &raw[start..i];
                // Words starting with a digit are literals such as `0xab`.
                let replacement = if byte.is_ascii_digit() {
                    None
                } else {
                    self.get(word)
                };
                out.push_str(replacement.unwrap_or(word));
            } else {
                let Some(ch) = raw[i..].chars().next() else {
                    break;
                };
                out.push(ch);
                i += ch.len_utf8();
            }
        }
        out
    }
}

pub struct Expander<'a> {
    opcodes: &'a OpcodeTable,
    max_depth: usize,
}

impl<'a> Expander<'a> {
    pub fn new(opcodes: &'a OpcodeTable, max_depth: usize) -> Self {
        Self { opcodes, max_depth }
    }

    /// Expands `name` as if its first byte were emitted at `start_offset`.
    ///
    /// In measuring mode the result only has to have the right length: jump
    /// placeholders are left unpatched, labels are not checked, and literal
    /// template arguments stand for that many zero bytes.
    pub fn process_macro(
        &self,
        name: &str,
        start_offset: usize,
        template_args: &[String],
        macros: &MacroTable,
        measuring: bool,
    ) -> Result<Expansion, HuffError> {
        self.expand(name, start_offset, template_args, macros, measuring, 1)
    }

    fn expand(
        &self,
        name: &str,
        start_offset: usize,
        template_args: &[String],
        macros: &MacroTable,
        measuring: bool,
        depth: usize,
    ) -> Result<Expansion, HuffError> {
        if depth > self.max_depth {
            return Err(HuffError::RecursionLimitExceeded {
                name: name.to_string(),
                limit: self.max_depth,
                span: None,
            });
        }
        let mac = macros.get(name).ok_or_else(|| HuffError::UnknownMacro {
            name: name.to_string(),
            span: None,
        })?;

        let args = flatten_args(template_args);
        if args.len() != mac.template_params.len() {
            return Err(HuffError::TemplateArityMismatch {
                name: name.to_string(),
                expected: mac.template_params.len(),
                got: args.len(),
                span: None,
            });
        }
        let bindings = Bindings {
            params: &mac.template_params,
            args,
        };
        trace!(
            macro_name = name,
            start_offset,
            depth,
            measuring,
            "expanding macro"
        );

        let mut jumps = JumpContext::default();
        let mut fragments: Vec<Fragment> = Vec::with_capacity(mac.ops.len());
        let mut offset = start_offset;
        for op in &mac.ops {
            let index = fragments.len();
            let fragment = match &op.kind {
                OpKind::Opcode { byte } => Fragment::from_op(vec![*byte], op),
                OpKind::Push { opcode, payload } => {
                    if payload.is_empty() || push_width(*opcode) != payload.len() {
                        return Err(HuffError::MalformedPush {
                            reason: format!(
                                "opcode {opcode:#04x} cannot carry {} payload byte(s)",
                                payload.len()
                            ),
                            span: op.span,
                        });
                    }
                    let mut bytes = Vec::with_capacity(1 + payload.len());
                    bytes.push(*opcode);
                    bytes.extend_from_slice(payload);
                    Fragment::from_op(bytes, op)
                }
                OpKind::JumpDest { label } => {
                    jumps.jump_indices.insert(
                        label.clone(),
                        JumpTarget {
                            fragment: index,
                            span: op.span,
                        },
                    );
                    Fragment::from_op(vec![JUMPDEST], op)
                }
                OpKind::PushJumpLabel { label } => {
                    jumps.referenced.insert(label.clone());
                    let mut fragment = Fragment::from_op(vec![PUSH2, 0, 0], op);
                    fragment.pending = Some(PendingJump {
                        label: label.clone(),
                        span: op.span,
                    });
                    fragment
                }
                OpKind::MacroCall { name, raw_args } => {
                    let args = substitute_all(&bindings, raw_args);
                    let expansion = self
                        .expand(name, offset, &args, macros, measuring, depth + 1)
                        .map_err(|err| err.or_at(op.span))?;
                    Fragment::from_expansion(expansion)
                }
                OpKind::TemplateRef { param } => {
                    let arg = bindings.get(param).ok_or_else(|| {
                        HuffError::UnboundTemplateParameter {
                            param: param.clone(),
                            macro_name: mac.name.clone(),
                            span: op.span,
                        }
                    })?;
                    self.expand_template_ref(arg, op, offset, macros, measuring, depth)?
                }
                OpKind::Codesize {
                    macro_name,
                    raw_args,
                } => {
                    let args = substitute_all(&bindings, raw_args);
                    let measured = self
                        .expand(macro_name, offset, &args, macros, true, depth + 1)
                        .map_err(|err| err.or_at(op.span))?;
                    let (opcode, payload) =
                        encode_push(&BigInt::from(measured.len()), macro_name, op.span)?;
                    let mut bytes = vec![opcode];
                    bytes.extend(payload);
                    Fragment::from_op(bytes, op)
                }
            };
            offset += fragment.len();
            fragments.push(fragment);
        }

        let mut code_indices = Vec::with_capacity(fragments.len());
        let mut next = start_offset;
        for fragment in &fragments {
            code_indices.push(next);
            next += fragment.len();
        }

        if !measuring {
            backpatch(mac, &mut fragments, &code_indices, &jumps)?;
            check_labels_used(mac, &jumps)?;
        }

        let mut expansion = Expansion {
            bytecode: Vec::with_capacity(next - start_offset),
            source_indices: Vec::with_capacity(next - start_offset),
        };
        for fragment in fragments {
            expansion.bytecode.extend(fragment.bytes);
            expansion.source_indices.extend(fragment.source_indices);
        }
        Ok(expansion)
    }

    fn expand_template_ref(
        &self,
        arg: &str,
        op: &Op,
        offset: usize,
        macros: &MacroTable,
        measuring: bool,
        depth: usize,
    ) -> Result<Fragment, HuffError> {
        let is_literal = parse_number(arg).is_some() || is_expression(arg);

        if measuring && is_literal {
            let count = self.evaluate_arg(arg, op.span, macros)?;
            let count = count
                .to_usize()
                .filter(|count| *count <= MAX_MEASURED_BYTES)
                .ok_or_else(|| HuffError::InvalidByteCount {
                    arg: arg.to_string(),
                    span: op.span,
                })?;
            return Ok(Fragment::from_op(vec![0; count], op));
        }

        let expansion = if is_literal {
            let push = if arg.starts_with("0x") && parse_number(arg).is_some() {
                OpKind::hex_push(arg, op.span)?
            } else {
                let value = self.evaluate_arg(arg, op.span, macros)?;
                OpKind::push(&value, arg, op.span)?
            };
            let extended = macros.with_ephemeral(ephemeral_macro(arg, push, op.span));
            self.expand(&ephemeral_name(arg), offset, &[], &extended, measuring, depth + 1)
        } else if let Some(byte) = self.opcodes.opcode(arg) {
            let extended =
                macros.with_ephemeral(ephemeral_macro(arg, OpKind::Opcode { byte }, op.span));
            self.expand(&ephemeral_name(arg), offset, &[], &extended, measuring, depth + 1)
        } else {
            self.expand(arg, offset, &[], macros, measuring, depth + 1)
        };
        Ok(Fragment::from_expansion(
            expansion.map_err(|err| err.or_at(op.span))?,
        ))
    }

    fn evaluate_arg(&self, arg: &str, span: Span, macros: &MacroTable) -> Result<BigInt, HuffError> {
        evaluate(arg, macros).map_err(|source| HuffError::Literal { source, span })
    }
}

fn substitute_all(bindings: &Bindings<'_>, raw_args: &[String]) -> Vec<String> {
    raw_args.iter().map(|raw| bindings.substitute(raw)).collect()
}

/// Names of synthesized macros contain `<`, which no identifier can.
fn ephemeral_name(arg: &str) -> String {
    format!("<{arg}>")
}

fn ephemeral_macro(arg: &str, kind: OpKind, span: Span) -> Macro {
    Macro {
        name: ephemeral_name(arg),
        template_params: Vec::new(),
        takes: 0,
        returns: 0,
        ops: vec![Op::new(kind, span)],
        raw_body: arg.to_string(),
        span,
    }
}

fn backpatch(
    mac: &Macro,
    fragments: &mut [Fragment],
    code_indices: &[usize],
    jumps: &JumpContext,
) -> Result<(), HuffError> {
    for fragment in fragments.iter_mut() {
        let Some(pending) = fragment.pending.take() else {
            continue;
        };
        let Some(target) = jumps.jump_indices.get(&pending.label) else {
            return Err(HuffError::UndefinedJumpLabel {
                label: pending.label,
                macro_name: mac.name.clone(),
                span: pending.span,
            });
        };
        let offset = code_indices[target.fragment];
        let Ok(offset16) = u16::try_from(offset) else {
            return Err(HuffError::JumpTargetOutOfRange {
                label: pending.label,
                offset,
                span: pending.span,
            });
        };
        let [high, low] = offset16.to_be_bytes();
        fragment.bytes = vec![PUSH2, high, low];
    }
    Ok(())
}

fn check_labels_used(mac: &Macro, jumps: &JumpContext) -> Result<(), HuffError> {
    for (label, target) in &jumps.jump_indices {
        if !jumps.referenced.contains(label) {
            return Err(HuffError::UnusedJumpLabel {
                label: label.clone(),
                macro_name: mac.name.clone(),
                span: target.span,
            });
        }
    }
    Ok(())
}
