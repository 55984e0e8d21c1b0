use crate::spec::{DimensionValue, MaterialSpec, ProductSpec};
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat name to value mapping used as the variable scope of formulas.
pub type DimensionContext = BTreeMap<String, DimensionValue>;

/// Copies the requested product dimensions into a context.
///
/// Names that are not present on the spec are left out. A missing spec yields an
/// empty context.
pub fn extract_product_dimensions<S: AsRef<str>>(
    product: Option<&ProductSpec>,
    names: &[S],
) -> DimensionContext {
    let mut context = DimensionContext::new();
    let Some(product) = product else {
        return context;
    };

    for name in names {
        let name = name.as_ref();
        match product.dimension(name) {
            Some(dim) => {
                context.insert(name.to_string(), dim.value.clone());
            }
            None => trace!("product spec {} has no dimension {}", product.id, name),
        }
    }
    context
}

/// Copies the requested material dimensions into a context.
///
/// Resolution per name: the well-known scalars (`mol`, `weightPerPiece`, `density`)
/// when set, then the generic dimension list, else the name is left out.
pub fn extract_material_dimensions<S: AsRef<str>>(
    material: Option<&MaterialSpec>,
    names: &[S],
) -> DimensionContext {
    let mut context = DimensionContext::new();
    let Some(material) = material else {
        return context;
    };

    for name in names {
        let name = name.as_ref();
        if let Some(value) = material.core_value(name) {
            context.insert(name.to_string(), DimensionValue::Number(value));
        } else if let Some(dim) = material.dimension(name) {
            context.insert(name.to_string(), dim.value.clone());
        } else {
            trace!("material spec {} has no dimension {}", material.id, name);
        }
    }
    context
}

/// Merges the product and material subsets. Material values replace product
/// values of the same name.
pub fn build_dimension_context<P: AsRef<str>, M: AsRef<str>>(
    product: Option<&ProductSpec>,
    material: Option<&MaterialSpec>,
    product_names: &[P],
    material_names: &[M],
) -> DimensionContext {
    let mut context = extract_product_dimensions(product, product_names);
    context.extend(extract_material_dimensions(material, material_names));
    context
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DimensionSource {
    Product,
    Material,
    None,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct DimensionInfo {
    pub value: Option<DimensionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub source: DimensionSource,
}

/// Looks up a single dimension for display.
///
/// Unlike [`build_dimension_context`] the product spec is searched first.
pub fn get_dimension_info(
    name: &str,
    product: Option<&ProductSpec>,
    material: Option<&MaterialSpec>,
) -> DimensionInfo {
    if let Some(dim) = product.and_then(|p| p.dimension(name)) {
        return DimensionInfo {
            value: Some(dim.value.clone()),
            unit: dim.unit.clone(),
            source: DimensionSource::Product,
        };
    }

    if let Some(material) = material {
        if let Some(value) = material.core_value(name) {
            let unit = match name {
                "weightPerPiece" => Some("g".to_string()),
                "density" => Some("g/cm³".to_string()),
                _ => None,
            };
            return DimensionInfo {
                value: Some(DimensionValue::Number(value)),
                unit,
                source: DimensionSource::Material,
            };
        }
        if let Some(dim) = material.dimension(name) {
            return DimensionInfo {
                value: Some(dim.value.clone()),
                unit: dim.unit.clone(),
                source: DimensionSource::Material,
            };
        }
    }

    DimensionInfo {
        value: None,
        unit: None,
        source: DimensionSource::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Dimension;

    fn product() -> ProductSpec {
        ProductSpec::new(
            "p1",
            "Carton 300x200",
            vec![
                Dimension::new("length", 30.0).with_unit("cm"),
                Dimension::new("width", 20.0).with_unit("cm"),
                Dimension::new("density", 0.5),
            ],
        )
    }

    fn material() -> MaterialSpec {
        let mut spec = MaterialSpec::new(
            "m1",
            "Kraft liner",
            vec![
                Dimension::new("length", 25.0).with_unit("cm"),
                Dimension::new("density", 7.0),
                Dimension::new("grade", "A"),
            ],
        );
        spec.density = Some(0.92);
        spec.weight_per_piece = Some(12.5);
        spec
    }

    #[test]
    fn null_specs_yield_empty_context() {
        assert!(extract_product_dimensions(None, &["length"]).is_empty());
        assert!(extract_material_dimensions(None, &["length"]).is_empty());
        let none: &[&str] = &[];
        assert!(build_dimension_context(None, None, none, none).is_empty());
    }

    #[test]
    fn missing_names_are_omitted() {
        let ctx = extract_product_dimensions(Some(&product()), &["length", "height"]);
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx["length"], DimensionValue::Number(30.0));
        assert!(!ctx.contains_key("height"));
    }

    #[test]
    fn empty_name_list_yields_empty_context() {
        let none: &[String] = &[];
        assert!(extract_product_dimensions(Some(&product()), none).is_empty());
    }

    #[test]
    fn material_core_fields_beat_generic_dimensions() {
        let ctx = extract_material_dimensions(Some(&material()), &["density", "mol", "grade"]);
        assert_eq!(ctx["density"], DimensionValue::Number(0.92));
        assert_eq!(ctx["grade"], DimensionValue::Text("A".into()));
        // mol is unset and there is no generic dimension called mol
        assert!(!ctx.contains_key("mol"));
    }

    #[test]
    fn material_wins_on_collision() {
        let ctx = build_dimension_context(
            Some(&product()),
            Some(&material()),
            &["length", "width"],
            &["length"],
        );
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx["length"], DimensionValue::Number(25.0));
        assert_eq!(ctx["width"], DimensionValue::Number(20.0));
    }

    #[test]
    fn info_lookup_prefers_product() {
        let info = get_dimension_info("density", Some(&product()), Some(&material()));
        assert_eq!(info.source, DimensionSource::Product);
        assert_eq!(info.value, Some(DimensionValue::Number(0.5)));
    }

    #[test]
    fn info_lookup_uses_hardcoded_units_for_core_fields() {
        let info = get_dimension_info("weightPerPiece", None, Some(&material()));
        assert_eq!(info.source, DimensionSource::Material);
        assert_eq!(info.unit.as_deref(), Some("g"));

        let info = get_dimension_info("density", None, Some(&material()));
        assert_eq!(info.value, Some(DimensionValue::Number(0.92)));
        assert_eq!(info.unit.as_deref(), Some("g/cm³"));
    }

    #[test]
    fn info_lookup_falls_through_to_none() {
        let info = get_dimension_info("grade", Some(&product()), Some(&material()));
        assert_eq!(info.source, DimensionSource::Material);
        assert_eq!(info.unit, None);

        let info = get_dimension_info("height", Some(&product()), Some(&material()));
        assert_eq!(info.source, DimensionSource::None);
        assert_eq!(info.value, None);
    }
}
