use crate::dimension::DimensionContext;
use crate::expr::{self, ExprError};
use crate::spec::{DimensionValue, MachineCalculation};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalculationError {
    /// The formula did not parse or failed while evaluating.
    #[error(transparent)]
    Expression(#[from] ExprError),
    /// The formula evaluated to something other than a finite number.
    #[error("Formula did not return a valid number")]
    NotANumber,
}

/// Evaluates one calculation against the context.
///
/// Never panics on bad input: every failure comes back as a
/// [`CalculationError`]. Non-finite results (`Infinity`, `NaN`) count as
/// [`CalculationError::NotANumber`].
pub fn evaluate_calculation(
    calculation: &MachineCalculation,
    context: &DimensionContext,
) -> Result<f64, CalculationError> {
    let value = expr::evaluate(&calculation.formula, context)?;
    match value {
        DimensionValue::Number(n) if n.is_finite() => Ok(n),
        _ => Err(CalculationError::NotANumber),
    }
}

/// Either the numeric value or the error message of one calculation.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum CalculationOutcome {
    Value(f64),
    Error(String),
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub outcome: CalculationOutcome,
}

impl CalculationResult {
    pub fn value(&self) -> Option<f64> {
        match self.outcome {
            CalculationOutcome::Value(v) => Some(v),
            CalculationOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            CalculationOutcome::Value(_) => None,
            CalculationOutcome::Error(e) => Some(e),
        }
    }
}

/// Results keyed by calculation name.
pub type CalculationResults = BTreeMap<String, CalculationResult>;

/// Evaluates every calculation in order. A failing formula only affects its own
/// entry; when two calculations share a name the later one wins.
pub fn evaluate_all_calculations(
    calculations: &[MachineCalculation],
    context: &DimensionContext,
) -> CalculationResults {
    let mut results = CalculationResults::new();

    for calculation in calculations {
        let outcome = match evaluate_calculation(calculation, context) {
            Ok(value) => {
                debug!("{} = {} ({})", calculation.name, value, calculation.formula);
                CalculationOutcome::Value(value)
            }
            Err(e) => {
                warn!(
                    "calculation {} failed on formula {:?}: {}",
                    calculation.name, calculation.formula, e
                );
                CalculationOutcome::Error(e.to_string())
            }
        };

        if results.contains_key(&calculation.name) {
            debug!("calculation {} defined more than once, keeping the last", calculation.name);
        }
        results.insert(
            calculation.name.clone(),
            CalculationResult {
                display_name: calculation.display_name.clone(),
                unit: calculation.unit.clone(),
                outcome,
            },
        );
    }

    results
}
