use crate::saving::load_saved_operator_view;
use crate::spec::{MaterialSpec, ProductSpec};
use crate::view::OperatorView;
use serde::de::DeserializeOwned;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Read any JSON document into `T`
///
/// # Arguments
/// * `filepath` - Path to the JSON file to load
///
/// # Returns
/// * `Result<T, Box<dyn Error>>` - The parsed value or an error naming the file
pub fn load_json<T: DeserializeOwned>(filepath: impl AsRef<Path>) -> Result<T, Box<dyn Error>> {
    let path = filepath.as_ref();
    let file = File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let reader = BufReader::new(file);

    let value = serde_json::from_reader(reader)
        .map_err(|e| format!("cannot parse {}: {}", path.display(), e))?;
    Ok(value)
}

/// Load a product specification as returned by the backend
///
/// # Examples
/// ```no_run
/// use operator_view::loader::load_product_spec;
///
/// match load_product_spec("product.json") {
///     Ok(spec) => println!("Loaded {} with {} dimensions", spec.spec_name, spec.dimensions.len()),
///     Err(e) => eprintln!("Error loading spec: {}", e),
/// }
/// ```
pub fn load_product_spec(filepath: impl AsRef<Path>) -> Result<ProductSpec, Box<dyn Error>> {
    load_json(filepath)
}

pub fn load_material_spec(filepath: impl AsRef<Path>) -> Result<MaterialSpec, Box<dyn Error>> {
    load_json(filepath)
}

/// Load an operator view configuration
///
/// Plain `.json` files are read directly, `.gz` files are treated as views
/// written by [`crate::saving::save_operator_view`].
///
/// # Arguments
/// * `filepath` - Path to the view file
///
/// # Returns
/// * `Result<OperatorView, Box<dyn Error>>` - The loaded view or an error
pub fn load_operator_view(filepath: impl AsRef<Path>) -> Result<OperatorView, Box<dyn Error>> {
    let path = filepath.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("json") => load_json(path),
        Some("gz") => load_saved_operator_view(path),
        Some(ext) => Err(format!("Unsupported file extension: {}", ext).into()),
        None => Err("File has no extension".into()),
    }
}

/// `-` stands for "no spec", which evaluates like a spec with no dimensions.
pub fn load_optional<T: DeserializeOwned>(arg: Option<&str>) -> Result<Option<T>, Box<dyn Error>> {
    match arg {
        None | Some("-") => Ok(None),
        Some(path) => load_json(path).map(Some),
    }
}
