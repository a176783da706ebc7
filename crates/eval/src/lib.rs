mod expr;
#[cfg(test)]
mod test_support;

use num_bigint::BigInt;
use num_traits::Num;
use thiserror::Error;

/// Resolves named constants referenced from literal expressions.
pub trait ConstantSource {
    /// Value of the constant `name`, or `None` when `name` does not denote a
    /// single numeric constant.
    fn constant(&self, name: &str) -> Option<BigInt>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("missing operand in expression '{expr}'")]
    MissingOperand { expr: String },
    #[error("don't know how to process literal '{literal}'")]
    UnknownLiteral { literal: String },
}

/// Parses a hex (`0x` prefixed) or decimal literal.
pub fn parse_number(text: &str) -> Option<BigInt> {
    if let Some(hex) = text.strip_prefix("0x") {
        if hex.is_empty() || !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return None;
        }
        return BigInt::from_str_radix(hex, 16).ok();
    }
    if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    BigInt::from_str_radix(text, 10).ok()
}

/// True when `text` contains one of the arithmetic operators understood by
/// [`evaluate`].
pub fn is_expression(text: &str) -> bool {
    expr::OPERATORS
        .iter()
        .any(|(symbol, _)| text.contains(*symbol))
}

pub fn evaluate_literal(token: &str, constants: &dyn ConstantSource) -> Result<BigInt, EvalError> {
    let token = token.trim();
    if let Some(value) = parse_number(token) {
        return Ok(value);
    }
    constants
        .constant(token)
        .ok_or_else(|| EvalError::UnknownLiteral {
            literal: token.to_string(),
        })
}

pub fn evaluate(input: &str, constants: &dyn ConstantSource) -> Result<BigInt, EvalError> {
    expr::evaluate(input, constants)
}
