#![cfg(not(tarpaulin_include))]

use env_logger::Env;
use log::{info, warn};
use operator_view::loader::{load_operator_view, load_optional};
use operator_view::spec::{MaterialSpec, ProductSpec};
use operator_view::view::check_specs;
use std::env;
use std::process::ExitCode;

fn usage(program: &str) {
    eprintln!("Usage: {} <view.json|view.gz> [product.json|-] [material.json|-]", program);
    eprintln!("  A '-' or a missing argument means the order has no such spec.");
    eprintln!("  Set RUST_LOG=debug to see every evaluated formula.");
}

fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let view = load_operator_view(&args[1])?;
    let product: Option<ProductSpec> = load_optional(args.get(2).map(String::as_str))?;
    let material: Option<MaterialSpec> = load_optional(args.get(3).map(String::as_str))?;

    if let Some(machine) = &view.machine_name {
        info!("evaluating operator view for {}", machine);
    }
    for issue in view
        .validate()
        .into_iter()
        .chain(check_specs(product.as_ref(), material.as_ref()))
    {
        warn!("{}", issue);
    }

    let report = view.evaluate(product.as_ref(), material.as_ref());
    if report.context.is_empty() {
        println!("(no dimension data)");
    }
    for line in report.render_lines() {
        println!("{}", line);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 4 || args[1] == "help" || args[1] == "--help" {
        usage(args.first().map(String::as_str).unwrap_or("operator-view"));
        return ExitCode::from(2);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
