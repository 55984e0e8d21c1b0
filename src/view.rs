use crate::calculation::{CalculationOutcome, CalculationResults, evaluate_all_calculations};
use crate::dimension::{DimensionContext, build_dimension_context};
use crate::expr;
use crate::format::format_dimension_value;
use crate::spec::{DimensionValue, MachineCalculation, MaterialSpec, ProductSpec, duplicate_names};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Per-machine selection of dimensions and calculations shown to the operator.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperatorView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,
    #[serde(default)]
    pub product_dimensions: Vec<String>,
    #[serde(default)]
    pub material_dimensions: Vec<String>,
    #[serde(default)]
    pub calculations: Vec<MachineCalculation>,
}

/// Something in a view or its specs that is legal but likely a mistake.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewIssue {
    DuplicateCalculation(String),
    OverlappingDimension(String),
    InvalidFormula { calculation: String, message: String },
    UnknownReference { calculation: String, name: String },
    DuplicateDimension { spec: String, name: String },
    TypeMismatch { spec: String, message: String },
}

impl fmt::Display for ViewIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewIssue::DuplicateCalculation(name) => {
                write!(f, "calculation {name} is defined more than once, the last one is used")
            }
            ViewIssue::OverlappingDimension(name) => {
                write!(f, "dimension {name} is requested from both specs, the material value is used")
            }
            ViewIssue::InvalidFormula {
                calculation,
                message,
            } => write!(f, "calculation {calculation} has an invalid formula: {message}"),
            ViewIssue::UnknownReference { calculation, name } => write!(
                f,
                "calculation {calculation} references {name}, which is not a configured dimension"
            ),
            ViewIssue::DuplicateDimension { spec, name } => {
                write!(f, "spec {spec} lists dimension {name} more than once, the first one is used")
            }
            ViewIssue::TypeMismatch { spec, message } => write!(f, "spec {spec}: {message}"),
        }
    }
}

/// Context and calculation results of one evaluation pass.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct OperatorViewReport {
    pub context: DimensionContext,
    pub results: CalculationResults,
    /// Calculation names in configuration order, each listed once.
    pub order: Vec<String>,
}

impl OperatorViewReport {
    /// One line per context entry followed by one line per calculation.
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .context
            .iter()
            .map(|(name, value)| format!("{name} = {}", format_dimension_value(Some(value), None)))
            .collect();

        for name in &self.order {
            let Some(result) = self.results.get(name) else {
                continue;
            };
            let line = match &result.outcome {
                CalculationOutcome::Value(v) => format!(
                    "{}: {}",
                    result.display_name,
                    format_dimension_value(Some(&DimensionValue::Number(*v)), result.unit.as_deref())
                ),
                CalculationOutcome::Error(e) => format!("{}: ERR {}", result.display_name, e),
            };
            lines.push(line);
        }
        lines
    }
}

impl OperatorView {
    pub fn build_context(
        &self,
        product: Option<&ProductSpec>,
        material: Option<&MaterialSpec>,
    ) -> DimensionContext {
        build_dimension_context(
            product,
            material,
            &self.product_dimensions,
            &self.material_dimensions,
        )
    }

    /// Builds a fresh context and evaluates every calculation against it.
    pub fn evaluate(
        &self,
        product: Option<&ProductSpec>,
        material: Option<&MaterialSpec>,
    ) -> OperatorViewReport {
        let context = self.build_context(product, material);
        let results = evaluate_all_calculations(&self.calculations, &context);

        let mut seen = BTreeSet::new();
        let order = self
            .calculations
            .iter()
            .filter(|c| seen.insert(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();

        OperatorViewReport {
            context,
            results,
            order,
        }
    }

    /// Static checks on the view. Evaluation does not depend on them.
    pub fn validate(&self) -> Vec<ViewIssue> {
        let mut issues = Vec::new();

        for name in duplicate_names(self.calculations.iter().map(|c| c.name.as_str())) {
            issues.push(ViewIssue::DuplicateCalculation(name));
        }

        let product: BTreeSet<&str> = self.product_dimensions.iter().map(String::as_str).collect();
        let material: BTreeSet<&str> =
            self.material_dimensions.iter().map(String::as_str).collect();
        for name in product.intersection(&material) {
            issues.push(ViewIssue::OverlappingDimension(name.to_string()));
        }

        for calculation in &self.calculations {
            match expr::parse(&calculation.formula) {
                Ok(parsed) => {
                    for name in parsed.variables() {
                        let known = product.contains(name.as_str())
                            || material.contains(name.as_str())
                            || expr::constant(&name).is_some();
                        if !known {
                            issues.push(ViewIssue::UnknownReference {
                                calculation: calculation.name.clone(),
                                name,
                            });
                        }
                    }
                }
                Err(e) => issues.push(ViewIssue::InvalidFormula {
                    calculation: calculation.name.clone(),
                    message: e.to_string(),
                }),
            }
        }

        issues
    }
}

/// Duplicate dimension names and declared type mismatches on the specs.
pub fn check_specs(product: Option<&ProductSpec>, material: Option<&MaterialSpec>) -> Vec<ViewIssue> {
    let mut issues = Vec::new();

    if let Some(product) = product {
        let spec = spec_label(&product.spec_name, &product.id);
        for name in product.duplicate_dimension_names() {
            issues.push(ViewIssue::DuplicateDimension {
                spec: spec.clone(),
                name,
            });
        }
        for message in product.dimensions.iter().filter_map(|d| d.type_mismatch()) {
            issues.push(ViewIssue::TypeMismatch {
                spec: spec.clone(),
                message,
            });
        }
    }

    if let Some(material) = material {
        let spec = spec_label(&material.spec_name, &material.id);
        for name in material.duplicate_dimension_names() {
            issues.push(ViewIssue::DuplicateDimension {
                spec: spec.clone(),
                name,
            });
        }
        for message in material.dimensions.iter().filter_map(|d| d.type_mismatch()) {
            issues.push(ViewIssue::TypeMismatch {
                spec: spec.clone(),
                message,
            });
        }
    }

    issues
}

fn spec_label(name: &str, id: &str) -> String {
    if name.is_empty() { id.to_string() } else { name.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{DataType, Dimension};

    fn view() -> OperatorView {
        OperatorView {
            machine_name: Some("Cutter 2".into()),
            product_dimensions: vec!["length".into(), "width".into()],
            material_dimensions: vec!["weightPerPiece".into()],
            calculations: vec![
                MachineCalculation::new("area", "Area", "length * width").with_unit("cm²"),
                MachineCalculation::new("mass", "Mass", "area_factor * weightPerPiece"),
                MachineCalculation::new("ratio", "Ratio", "length / width"),
            ],
        }
    }

    fn product() -> ProductSpec {
        ProductSpec::new(
            "p1",
            "Sheet",
            vec![Dimension::new("length", 30.0), Dimension::new("width", 20.0)],
        )
    }

    fn material() -> MaterialSpec {
        let mut spec = MaterialSpec::new("m1", "Board", vec![]);
        spec.weight_per_piece = Some(12.5);
        spec
    }

    #[test]
    fn evaluate_builds_context_and_results() {
        let report = view().evaluate(Some(&product()), Some(&material()));
        assert_eq!(report.context.len(), 3);
        assert_eq!(report.results["area"].value(), Some(600.0));
        assert_eq!(report.results["mass"].error(), Some("Undefined symbol area_factor"));
        assert_eq!(report.order, vec!["area", "mass", "ratio"]);
    }

    #[test]
    fn render_lines_in_configuration_order() {
        let report = view().evaluate(Some(&product()), Some(&material()));
        assert_eq!(
            report.render_lines(),
            vec![
                "length = 30",
                "weightPerPiece = 12.5000",
                "width = 20",
                "Area: 600 cm²",
                "Mass: ERR Undefined symbol area_factor",
                "Ratio: 1.5000",
            ]
        );
    }

    #[test]
    fn missing_specs_fail_calculations_not_the_view() {
        let report = view().evaluate(None, None);
        assert!(report.context.is_empty());
        assert_eq!(report.results.len(), 3);
        assert!(report.results.values().all(|r| r.error().is_some()));
    }

    #[test]
    fn validate_reports_unknown_references_and_duplicates() {
        let mut view = view();
        view.calculations
            .push(MachineCalculation::new("area", "Area again", "pi * length"));
        view.calculations.push(MachineCalculation::new("broken", "Broken", "length *"));
        view.material_dimensions.push("length".into());

        let issues = view.validate();
        assert!(issues.contains(&ViewIssue::DuplicateCalculation("area".into())));
        assert!(issues.contains(&ViewIssue::OverlappingDimension("length".into())));
        assert!(issues.contains(&ViewIssue::UnknownReference {
            calculation: "mass".into(),
            name: "area_factor".into()
        }));
        assert!(issues.iter().any(|i| matches!(
            i,
            ViewIssue::InvalidFormula { calculation, .. } if calculation == "broken"
        )));
        // pi is a constant, not an unknown reference
        assert!(!issues.iter().any(|i| matches!(
            i,
            ViewIssue::UnknownReference { name, .. } if name == "pi"
        )));
    }

    #[test]
    fn validate_does_not_change_evaluation() {
        let view = view();
        let before = view.evaluate(Some(&product()), Some(&material()));
        let _ = view.validate();
        assert_eq!(before, view.evaluate(Some(&product()), Some(&material())));
    }

    #[test]
    fn check_specs_flags_duplicates_and_mismatches() {
        let mut width = Dimension::new("width", "20");
        width.data_type = DataType::Number;
        let product = ProductSpec::new(
            "p1",
            "Sheet",
            vec![Dimension::new("length", 30.0), Dimension::new("length", 31.0), width],
        );
        let issues = check_specs(Some(&product), None);
        assert_eq!(issues.len(), 2);
        assert_eq!(
            issues[0].to_string(),
            "spec Sheet lists dimension length more than once, the first one is used"
        );
        assert!(matches!(issues[1], ViewIssue::TypeMismatch { .. }));
    }
}
