use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{Cents, Expr};

pub type OperationId = Uuid;

/// Longest string the external provider will generate.
pub const MAX_RANDOM_STRING_LENGTH: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    SquareRoot,
    RandomString,
}

impl OperationType {
    pub const ALL: [OperationType; 6] = [
        OperationType::Addition,
        OperationType::Subtraction,
        OperationType::Multiplication,
        OperationType::Division,
        OperationType::SquareRoot,
        OperationType::RandomString,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Addition => "addition",
            OperationType::Subtraction => "subtraction",
            OperationType::Multiplication => "multiplication",
            OperationType::Division => "division",
            OperationType::SquareRoot => "square_root",
            OperationType::RandomString => "random_string",
        }
    }

    /// Operation names are matched exactly, as clients send them.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == s)
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A priced entry of the operation catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub id: OperationId,
    pub operation_type: OperationType,
    pub cost_cents: Cents,
}

impl OperationDefinition {
    pub fn new(operation_type: OperationType, cost_cents: Cents) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_type,
            cost_cents,
        }
    }
}

/// Seed pair for the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub operation_type: OperationType,
    pub cost_cents: Cents,
}

pub const DEFAULT_CATALOG: [CatalogEntry; 6] = [
    CatalogEntry {
        operation_type: OperationType::Addition,
        cost_cents: 100,
    },
    CatalogEntry {
        operation_type: OperationType::Subtraction,
        cost_cents: 100,
    },
    CatalogEntry {
        operation_type: OperationType::Multiplication,
        cost_cents: 150,
    },
    CatalogEntry {
        operation_type: OperationType::Division,
        cost_cents: 200,
    },
    CatalogEntry {
        operation_type: OperationType::SquareRoot,
        cost_cents: 250,
    },
    CatalogEntry {
        operation_type: OperationType::RandomString,
        cost_cents: 250,
    },
];

/// Raw operands as supplied by a caller; which ones are required depends on
/// the operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Operands {
    pub number1: Option<f64>,
    pub number2: Option<f64>,
    pub length: Option<i64>,
}

impl Operands {
    pub fn binary(a: f64, b: f64) -> Self {
        Self {
            number1: Some(a),
            number2: Some(b),
            length: None,
        }
    }

    pub fn unary(a: f64) -> Self {
        Self {
            number1: Some(a),
            ..Self::default()
        }
    }

    pub fn length(length: i64) -> Self {
        Self {
            length: Some(length),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperandError {
    #[error("{0}")]
    Missing(&'static str),

    #[error("length must be between 1 and {max}, got {given}")]
    InvalidLength { given: i64, max: u32 },
}

/// What a validated request will actually run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Computation {
    Arithmetic(Expr),
    RandomString { length: u32 },
}

impl Computation {
    /// Check that the operands fit the operation's shape.
    pub fn from_operands(
        operation_type: OperationType,
        operands: &Operands,
        default_length: u32,
    ) -> Result<Self, OperandError> {
        let pair = || match (operands.number1, operands.number2) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(OperandError::Missing(
                "Both number1 and number2 are required for this operation",
            )),
        };

        let computation: Computation = match operation_type {
            OperationType::Addition => pair().map(|(a, b)| Expr::Add(a, b))?.into(),
            OperationType::Subtraction => pair().map(|(a, b)| Expr::Subtract(a, b))?.into(),
            OperationType::Multiplication => pair().map(|(a, b)| Expr::Multiply(a, b))?.into(),
            OperationType::Division => pair().map(|(a, b)| Expr::Divide(a, b))?.into(),
            OperationType::SquareRoot => {
                let a = operands.number1.ok_or(OperandError::Missing(
                    "number1 is required for square root operation",
                ))?;
                Expr::SquareRoot(a).into()
            }
            OperationType::RandomString => {
                let requested = operands.length.unwrap_or(i64::from(default_length));
                let length = u32::try_from(requested)
                    .ok()
                    .filter(|len| (1..=MAX_RANDOM_STRING_LENGTH).contains(len))
                    .ok_or(OperandError::InvalidLength {
                        given: requested,
                        max: MAX_RANDOM_STRING_LENGTH,
                    })?;
                Computation::RandomString { length }
            }
        };

        Ok(computation)
    }
}

impl From<Expr> for Computation {
    fn from(expr: Expr) -> Self {
        Computation::Arithmetic(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_type_roundtrip() {
        for op in OperationType::ALL {
            assert_eq!(OperationType::from_str(op.as_str()), Some(op));
        }
        assert_eq!(OperationType::from_str("modulus"), None);
        assert_eq!(OperationType::from_str("Addition"), None);
    }

    #[test]
    fn default_catalog_covers_every_operation() {
        for op in OperationType::ALL {
            assert!(DEFAULT_CATALOG.iter().any(|e| e.operation_type == op));
        }
        let division = DEFAULT_CATALOG
            .iter()
            .find(|e| e.operation_type == OperationType::Division)
            .unwrap();
        assert_eq!(division.cost_cents, 200);
    }

    #[test]
    fn binary_operations_need_both_numbers() {
        let err = Computation::from_operands(OperationType::Division, &Operands::unary(6.0), 10)
            .unwrap_err();
        assert!(matches!(err, OperandError::Missing(_)));

        let ok = Computation::from_operands(
            OperationType::Division,
            &Operands::binary(6.0, 3.0),
            10,
        )
        .unwrap();
        assert_eq!(ok, Computation::Arithmetic(Expr::Divide(6.0, 3.0)));
    }

    #[test]
    fn square_root_needs_number1_only() {
        let ok = Computation::from_operands(OperationType::SquareRoot, &Operands::unary(9.0), 10)
            .unwrap();
        assert_eq!(ok, Computation::Arithmetic(Expr::SquareRoot(9.0)));

        let err =
            Computation::from_operands(OperationType::SquareRoot, &Operands::default(), 10)
                .unwrap_err();
        assert_eq!(
            err.to_string(),
            "number1 is required for square root operation"
        );
    }

    #[test]
    fn random_string_length_defaults_and_bounds() {
        let default =
            Computation::from_operands(OperationType::RandomString, &Operands::default(), 10)
                .unwrap();
        assert_eq!(default, Computation::RandomString { length: 10 });

        let explicit =
            Computation::from_operands(OperationType::RandomString, &Operands::length(20), 10)
                .unwrap();
        assert_eq!(explicit, Computation::RandomString { length: 20 });

        for bad in [0, -3, 21] {
            let err = Computation::from_operands(
                OperationType::RandomString,
                &Operands::length(bad),
                10,
            )
            .unwrap_err();
            assert_eq!(err, OperandError::InvalidLength { given: bad, max: 20 });
        }
    }
}
