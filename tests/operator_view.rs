use operator_view::{
    CalculationError, DimensionValue, MachineCalculation, MaterialSpec, OperatorView, ProductSpec,
    build_dimension_context, evaluate_all_calculations, evaluate_calculation,
    extract_material_dimensions, extract_product_dimensions, format_dimension_value,
};
use serde_json::json;

fn product(dimensions: serde_json::Value) -> ProductSpec {
    serde_json::from_value(json!({"_id": "p1", "specName": "Product", "dimensions": dimensions}))
        .unwrap()
}

fn material(body: serde_json::Value) -> MaterialSpec {
    serde_json::from_value(body).unwrap()
}

fn ctx(pairs: &[(&str, f64)]) -> operator_view::DimensionContext {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), DimensionValue::Number(*v)))
        .collect()
}

#[test]
fn material_value_wins_on_name_collision() {
    let product = product(json!([{"name": "length", "value": 30}]));
    let material = material(json!({"_id": "m1", "dimensions": [{"name": "length", "value": 25}]}));

    let context = build_dimension_context(Some(&product), Some(&material), &["length"], &["length"]);
    assert_eq!(context, ctx(&[("length", 25.0)]));
}

#[test]
fn well_known_material_field_is_extracted() {
    let material = material(json!({"_id": "m1", "weightPerPiece": 12.5, "dimensions": []}));
    let context = extract_material_dimensions(Some(&material), &["weightPerPiece"]);
    assert_eq!(context, ctx(&[("weightPerPiece", 12.5)]));
}

#[test]
fn area_formula() {
    let calc = MachineCalculation::new("area", "Area", "length * width");
    let result = evaluate_calculation(&calc, &ctx(&[("length", 30.0), ("width", 20.0)]));
    assert_eq!(result, Ok(600.0));
}

#[test]
fn malformed_formula_fails_with_message() {
    let calc = MachineCalculation::new("bad", "Bad", "length / ");
    for context in [ctx(&[]), ctx(&[("length", 3.0)])] {
        let err = evaluate_calculation(&calc, &context).unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}

#[test]
fn string_result_is_not_a_valid_number() {
    let calc = MachineCalculation::new("text", "Text", "\"hello\"");
    let err = evaluate_calculation(&calc, &ctx(&[])).unwrap_err();
    assert_eq!(err, CalculationError::NotANumber);
    assert_eq!(err.to_string(), "Formula did not return a valid number");
}

#[test]
fn display_formatting() {
    let five = DimensionValue::Number(5.0);
    let five_one = DimensionValue::Number(5.1);
    assert_eq!(format_dimension_value(Some(&five), Some("kg")), "5 kg");
    assert_eq!(format_dimension_value(Some(&five_one), Some("kg")), "5.1000 kg");
    assert_eq!(format_dimension_value(None, None), "N/A");
    assert_eq!(format_dimension_value(Some(&DimensionValue::Boolean(true)), None), "Yes");
}

#[test]
fn duplicate_calculation_names_keep_the_second() {
    let calcs = vec![
        MachineCalculation::new("x", "X one", "1"),
        MachineCalculation::new("x", "X two", "2 * 3"),
    ];
    let results = evaluate_all_calculations(&calcs, &ctx(&[]));
    assert_eq!(results.len(), 1);
    assert_eq!(results["x"].display_name, "X two");
    assert_eq!(results["x"].value(), Some(6.0));
}

#[test]
fn null_specs_always_give_empty_contexts() {
    let names = ["length", "mol", "density", "weightPerPiece"];
    assert!(extract_product_dimensions(None, &names).is_empty());
    assert!(extract_material_dimensions(None, &names).is_empty());
}

#[test]
fn context_size_is_bounded_by_requested_names() {
    let product = product(json!([
        {"name": "length", "value": 30},
        {"name": "width", "value": 20}
    ]));
    let material = material(json!({"_id": "m1", "density": 0.9, "dimensions": [
        {"name": "thickness", "value": 0.4, "unit": "mm"}
    ]}));

    let all_resolve = build_dimension_context(
        Some(&product),
        Some(&material),
        &["length", "width"],
        &["density", "thickness"],
    );
    assert_eq!(all_resolve.len(), 4);

    let some_missing = build_dimension_context(
        Some(&product),
        Some(&material),
        &["length", "height"],
        &["mol", "thickness"],
    );
    assert_eq!(some_missing.len(), 2);
}

#[test]
fn full_view_from_json_config() {
    let view: OperatorView = serde_json::from_value(json!({
        "machineName": "Bag line 1",
        "productDimensions": ["length", "width"],
        "materialDimensions": ["weightPerPiece", "length"],
        "calculations": [
            {"name": "area", "displayName": "Area", "formula": "length * width", "unit": "cm²"},
            {"name": "pieces", "displayName": "Pieces per kg", "formula": "1000 / weightPerPiece"},
            {"name": "broken", "displayName": "Broken", "formula": "width *"}
        ]
    }))
    .unwrap();
    let product = product(json!([
        {"name": "length", "value": 30},
        {"name": "width", "value": 20}
    ]));
    let material = material(json!({"_id": "m1", "weightPerPiece": 12.5, "dimensions": [
        {"name": "length", "value": 25}
    ]}));

    let report = view.evaluate(Some(&product), Some(&material));
    assert_eq!(report.results["area"].value(), Some(500.0));
    assert_eq!(report.results["pieces"].value(), Some(80.0));
    assert!(report.results["broken"].error().is_some());
    assert_eq!(
        report.render_lines()[3..],
        [
            "Area: 500 cm²".to_string(),
            "Pieces per kg: 80".to_string(),
            "Broken: ERR Unexpected end of expression (char 8)".to_string(),
        ]
    );
}
