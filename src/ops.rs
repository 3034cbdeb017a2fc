//! Scalar operations submitted by the demo producers and the result-line format.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use thiserror::Error;

use crate::types::TaskId;

/// Range producers draw their arguments from.
pub const ARG_MIN: f64 = 0.1;
pub const ARG_MAX: f64 = 5.0;

/// Operation family a producer is responsible for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Sin,
    Sqrt,
    Pow,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Sin, Operation::Sqrt, Operation::Pow];

    pub fn name(self) -> &'static str {
        match self {
            Operation::Sin => "sin",
            Operation::Sqrt => "sqrt",
            Operation::Pow => "pow",
        }
    }

    /// Draw a call with arguments in `[ARG_MIN, ARG_MAX]`, rounded to one decimal.
    pub fn random_call<R: Rng + ?Sized>(self, rng: &mut R) -> Call {
        let mut arg = || (rng.gen_range(ARG_MIN..=ARG_MAX) * 10.0).round() / 10.0;
        match self {
            Operation::Sin => Call::Sin(arg()),
            Operation::Sqrt => Call::Sqrt(arg()),
            Operation::Pow => {
                let base = arg();
                let exponent = arg();
                Call::Pow { base, exponent }
            }
        }
    }
}

/// A concrete operation with its arguments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Call {
    Sin(f64),
    Sqrt(f64),
    Pow { base: f64, exponent: f64 },
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::Sin(_) => Operation::Sin,
            Call::Sqrt(_) => Operation::Sqrt,
            Call::Pow { .. } => Operation::Pow,
        }
    }

    pub fn evaluate(&self) -> f64 {
        match *self {
            Call::Sin(x) => x.sin(),
            Call::Sqrt(x) => x.sqrt(),
            Call::Pow { base, exponent } => base.powf(exponent),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("expected {expected} tokens, found {found}")]
    TooShort { expected: usize, found: usize },

    #[error("unexpected token '{found}' where '{expected}' belongs")]
    Layout { expected: &'static str, found: String },

    #[error("unsupported operation '{0}'")]
    UnknownOperation(String),

    #[error("invalid number '{0}'")]
    Number(String),
}

/// One line of a result file: the id, what was computed, and what came back.
///
/// `Task ID 3 operation: sin, number: 1.200000 result: 0.932039`
/// `Task ID 4 operation: pow, numbers: 1.200000 and 2.000000 result: 1.440000`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TaskRecord {
    pub id: TaskId,
    pub call: Call,
    pub result: f64,
}

impl TaskRecord {
    /// Absolute difference between the recorded and a fresh evaluation.
    pub fn deviation(&self) -> f64 {
        (self.call.evaluate() - self.result).abs()
    }
}

impl fmt::Display for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task ID {} operation: {}, ", self.id, self.call.operation().name())?;
        match self.call {
            Call::Sin(x) | Call::Sqrt(x) => write!(f, "number: {x:.6}")?,
            Call::Pow { base, exponent } => write!(f, "numbers: {base:.6} and {exponent:.6}")?,
        }
        write!(f, " result: {:.6}", self.result)
    }
}

fn expect_token(tokens: &[&str], index: usize, expected: &'static str) -> Result<(), RecordError> {
    if tokens[index] == expected {
        Ok(())
    } else {
        Err(RecordError::Layout {
            expected,
            found: tokens[index].to_string(),
        })
    }
}

fn number<T: FromStr>(token: &str) -> Result<T, RecordError> {
    token
        .parse()
        .map_err(|_| RecordError::Number(token.to_string()))
}

impl FromStr for TaskRecord {
    type Err = RecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 9 {
            return Err(RecordError::TooShort {
                expected: 9,
                found: tokens.len(),
            });
        }
        expect_token(&tokens, 0, "Task")?;
        expect_token(&tokens, 1, "ID")?;
        expect_token(&tokens, 3, "operation:")?;
        let id = number(tokens[2])?;
        let op = tokens[4].trim_end_matches(',');

        let (call, result_at) = match op {
            "sin" | "sqrt" => {
                expect_token(&tokens, 5, "number:")?;
                let x = number(tokens[6])?;
                let call = if op == "sin" { Call::Sin(x) } else { Call::Sqrt(x) };
                (call, 8)
            }
            "pow" => {
                if tokens.len() < 11 {
                    return Err(RecordError::TooShort {
                        expected: 11,
                        found: tokens.len(),
                    });
                }
                expect_token(&tokens, 5, "numbers:")?;
                expect_token(&tokens, 7, "and")?;
                let call = Call::Pow {
                    base: number(tokens[6])?,
                    exponent: number(tokens[8])?,
                };
                (call, 10)
            }
            other => return Err(RecordError::UnknownOperation(other.to_string())),
        };
        expect_token(&tokens, result_at - 1, "result:")?;
        let result = number(tokens[result_at])?;
        Ok(TaskRecord { id, call, result })
    }
}
