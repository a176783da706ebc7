use num_bigint::BigInt;

use crate::{ConstantSource, EvalError, evaluate_literal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Sub,
    Add,
    Mul,
}

impl BinaryOp {
    fn apply(self, lhs: BigInt, rhs: BigInt) -> BigInt {
        match self {
            Self::Sub => lhs - rhs,
            Self::Add => lhs + rhs,
            Self::Mul => lhs * rhs,
        }
    }
}

/// Checked in this order by substring presence; the first operator present
/// splits the whole expression. This is not precedence climbing: `A-B+C`
/// evaluates as `A-(B+C)`.
pub(crate) const OPERATORS: [(char, BinaryOp); 3] = [
    ('-', BinaryOp::Sub),
    ('+', BinaryOp::Add),
    ('*', BinaryOp::Mul),
];

pub(crate) fn evaluate(input: &str, constants: &dyn ConstantSource) -> Result<BigInt, EvalError> {
    let input = input.trim();
    for (symbol, op) in OPERATORS {
        if !input.contains(symbol) {
            continue;
        }
        let mut acc: Option<BigInt> = None;
        for operand in input.split(symbol) {
            if operand.trim().is_empty() {
                return Err(EvalError::MissingOperand {
                    expr: input.to_string(),
                });
            }
            let value = evaluate(operand, constants)?;
            acc = Some(match acc {
                Some(lhs) => op.apply(lhs, value),
                None => value,
            });
        }
        return acc.ok_or_else(|| EvalError::MissingOperand {
            expr: input.to_string(),
        });
    }
    evaluate_literal(input, constants)
}
