//! Stateless arithmetic behind the priced operations.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("division by zero is not allowed")]
    DivisionByZero,

    #[error("cannot calculate square root of a negative number")]
    NegativeOperand,

    #[error("result is too large to represent")]
    Overflow,
}

pub fn add(a: f64, b: f64) -> f64 {
    a + b
}

pub fn subtract(a: f64, b: f64) -> f64 {
    a - b
}

pub fn multiply(a: f64, b: f64) -> f64 {
    a * b
}

pub fn divide(a: f64, b: f64) -> Result<f64, ArithmeticError> {
    if b == 0.0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    Ok(a / b)
}

pub fn sqrt(a: f64) -> Result<f64, ArithmeticError> {
    if a < 0.0 {
        return Err(ArithmeticError::NegativeOperand);
    }
    Ok(a.sqrt())
}

/// Shortest decimal text that round-trips, without exponent notation.
/// Example: 8.0 -> "8", 2.5 -> "2.5", 1e21 -> "1000000000000000000000"
pub fn render(value: f64) -> String {
    // -0.0 compares equal to 0.0 but would print a sign.
    if value == 0.0 {
        return "0".to_string();
    }
    value.to_string()
}

/// A fully validated arithmetic expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expr {
    Add(f64, f64),
    Subtract(f64, f64),
    Multiply(f64, f64),
    Divide(f64, f64),
    SquareRoot(f64),
}

impl Expr {
    /// Results that are not finite numbers are rejected.
    pub fn evaluate(&self) -> Result<f64, ArithmeticError> {
        let value = match *self {
            Expr::Add(a, b) => add(a, b),
            Expr::Subtract(a, b) => subtract(a, b),
            Expr::Multiply(a, b) => multiply(a, b),
            Expr::Divide(a, b) => divide(a, b)?,
            Expr::SquareRoot(a) => sqrt(a)?,
        };
        if !value.is_finite() {
            return Err(ArithmeticError::Overflow);
        }
        Ok(value)
    }

    /// Evaluate and render in one step, as stored on the audit record.
    pub fn evaluate_to_string(&self) -> Result<String, ArithmeticError> {
        self.evaluate().map(render)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_operations() {
        assert_eq!(Expr::Add(5.0, 3.0).evaluate_to_string(), Ok("8".into()));
        assert_eq!(Expr::Subtract(5.0, 3.0).evaluate_to_string(), Ok("2".into()));
        assert_eq!(Expr::Multiply(5.0, 3.0).evaluate_to_string(), Ok("15".into()));
        assert_eq!(Expr::Divide(6.0, 3.0).evaluate_to_string(), Ok("2".into()));
        assert_eq!(Expr::Divide(5.0, 2.0).evaluate_to_string(), Ok("2.5".into()));
    }

    #[test]
    fn division_by_zero_fails() {
        assert_eq!(divide(5.0, 0.0), Err(ArithmeticError::DivisionByZero));
        assert_eq!(divide(5.0, -0.0), Err(ArithmeticError::DivisionByZero));
        assert_eq!(divide(0.0, 0.0), Err(ArithmeticError::DivisionByZero));
    }

    #[test]
    fn square_root() {
        assert_eq!(Expr::SquareRoot(9.0).evaluate_to_string(), Ok("3".into()));
        assert_eq!(Expr::SquareRoot(0.0).evaluate_to_string(), Ok("0".into()));
        assert_eq!(Expr::SquareRoot(2.25).evaluate_to_string(), Ok("1.5".into()));
        assert_eq!(sqrt(-9.0), Err(ArithmeticError::NegativeOperand));
    }

    #[test]
    fn render_has_no_exponent_or_trailing_zeros() {
        assert_eq!(render(8.0), "8");
        assert_eq!(render(2.5), "2.5");
        assert_eq!(render(-0.0), "0");
        assert_eq!(render(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(render(1e21), "1000000000000000000000");
        assert_eq!(render(0.000001), "0.000001");
    }

    #[test]
    fn overflow_is_an_error() {
        let overflowing = [
            Expr::Multiply(1e308, 10.0),
            Expr::Add(f64::MAX, f64::MAX),
            Expr::Divide(1e308, 1e-308),
        ];
        for expr in overflowing {
            assert_eq!(expr.evaluate(), Err(ArithmeticError::Overflow), "{expr:?}");
        }
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            ArithmeticError::DivisionByZero.to_string(),
            "division by zero is not allowed"
        );
        assert_eq!(
            ArithmeticError::NegativeOperand.to_string(),
            "cannot calculate square root of a negative number"
        );
    }
}
