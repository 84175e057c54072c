use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Arithmetic applied between the n-back operand and the current one.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    #[default]
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    /// Expected answer for `nback (op) current`. Division by zero has no answer.
    pub fn apply(&self, nback: i32, current: i32) -> Option<f64> {
        let (a, b) = (f64::from(nback), f64::from(current));
        match self {
            Operation::Add => Some(a + b),
            Operation::Subtract => Some(a - b),
            Operation::Multiply => Some(a * b),
            Operation::Divide => (current != 0).then(|| a / b),
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Operation::Add => '+',
            Operation::Subtract => '-',
            Operation::Multiply => 'x',
            Operation::Divide => '/',
        }
    }
}

/// Which operations the player may be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledOperations {
    pub add: bool,
    pub subtract: bool,
    pub multiply: bool,
    pub divide: bool,
}

impl Default for EnabledOperations {
    fn default() -> Self {
        Self {
            add: true,
            subtract: true,
            multiply: true,
            divide: true,
        }
    }
}

impl EnabledOperations {
    pub fn enabled(&self) -> Vec<Operation> {
        [
            (self.add, Operation::Add),
            (self.subtract, Operation::Subtract),
            (self.multiply, Operation::Multiply),
            (self.divide, Operation::Divide),
        ]
        .into_iter()
        .filter_map(|(on, op)| on.then_some(op))
        .collect()
    }
}

/// Uniform choice among the enabled operations, `Add` when none are.
pub fn choose_arithmetic_operation<R: Rng + ?Sized>(
    enabled: &EnabledOperations,
    rng: &mut R,
) -> Operation {
    enabled
        .enabled()
        .choose(rng)
        .copied()
        .unwrap_or(Operation::Add)
}

/// A fractional part accepted as a division answer, held in exact thousandths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AcceptableDecimal(u32);

impl AcceptableDecimal {
    const SCALE: i64 = 1000;

    /// `fraction` must lie strictly between 0 and 1 (e.g. `0.25`).
    pub fn from_fraction(fraction: f64) -> Option<Self> {
        let thousandths = (fraction * Self::SCALE as f64).round();
        (thousandths > 0.0 && thousandths < Self::SCALE as f64)
            .then_some(AcceptableDecimal(thousandths as u32))
    }

    pub fn as_fraction(&self) -> f64 {
        f64::from(self.0) / Self::SCALE as f64
    }

    /// Whether `remainder / divisor` equals this fraction exactly.
    fn matches(&self, remainder: i64, divisor: i64) -> bool {
        remainder * Self::SCALE == i64::from(self.0) * divisor
    }
}

/// Fractions a player is expected to handle by default.
pub fn default_acceptable_decimals() -> Vec<f64> {
    vec![0.1, 0.2, 0.25, 0.3, 0.4, 0.5, 0.6, 0.7, 0.75, 0.8, 0.9]
}

/// Whether `dividend / divisor` is whole or ends in an acceptable fraction.
pub fn divides_cleanly(dividend: i32, divisor: i32, acceptable: &[AcceptableDecimal]) -> bool {
    if divisor == 0 {
        return false;
    }
    let (dividend, divisor) = (i64::from(dividend).abs(), i64::from(divisor).abs());
    let remainder = dividend % divisor;
    if remainder == 0 {
        return true;
    }
    acceptable.iter().any(|d| d.matches(remainder, divisor))
}

/// Draw a nonzero operand in `[min, max]`.
///
/// For division with a known n-back operand, only operands that divide it
/// cleanly are eligible; an empty pool falls back to any nonzero operand.
/// A range with no nonzero value yields 1.
pub fn generate_arithmetic_operand<R: Rng + ?Sized>(
    operation: Operation,
    min: i32,
    max: i32,
    acceptable: &[AcceptableDecimal],
    previous_result: Option<i32>,
    rng: &mut R,
) -> i32 {
    if min > max || (min == 0 && max == 0) {
        return 1;
    }

    if let (Operation::Divide, Some(previous)) = (operation, previous_result) {
        let pool: Vec<i32> = (min..=max)
            .filter(|x| divides_cleanly(previous, *x, acceptable))
            .collect();
        if let Some(operand) = pool.choose(rng) {
            return *operand;
        }
    }

    loop {
        let operand = rng.gen_range(min..=max);
        if operand != 0 {
            return operand;
        }
    }
}
