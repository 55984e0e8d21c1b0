/*!
# Operator View Engine

Dimension context building and formula evaluation for machine operator views.

## Overview

A machine's operator view shows a handful of dimensions taken from the product
and material specifications of the order being produced, together with values
derived from them by small arithmetic formulas (areas, masses, ratios). This
crate is the engine behind that view: it receives plain spec data and a view
configuration and produces plain data back. It knows nothing about HTTP,
storage or rendering.

## Pipeline

- **Spec Model** (`spec`) - Product and material specifications and their dimensions
- **Dimension Extractor** (`dimension`) - Picks the requested dimensions out of a spec
- **Context Builder** (`dimension`) - Merges product and material dimensions; material wins on a name clash
- **Formula Evaluator** (`calculation`, `expr`) - Evaluates one formula against the context
- **Batch Evaluator** (`calculation`) - Evaluates a list of formulas, isolating failures per item
- **Display Formatter** (`format`) - Turns values into display strings

```text
spec -> dimension (extract, merge) -> calculation (evaluate each) -> format
```

## Error Handling

Missing specs and missing dimensions are not errors: they simply leave names
out of the context. A formula that fails to parse, references an unknown name
or does not produce a finite number yields an error for that calculation only,
the rest of the batch is still evaluated.

## Modules

- **spec**: Data model and optional consistency checks
- **dimension**: Extraction, context building and single-dimension lookup
- **expr**: The restricted expression language formulas are written in
- **calculation**: Single and batch formula evaluation
- **format**: Value display formatting
- **view**: Operator view configuration and the full evaluation pass
- **loader**: JSON loading of specs and views
- **saving**: Compressed persistence of views
*/

pub mod calculation;
pub mod dimension;
pub mod expr;
pub mod format;
pub mod loader;
pub mod saving;
pub mod spec;
pub mod view;

/// Re-export everything from these modules to make it easier to use
pub use calculation::*;
pub use dimension::*;
pub use format::*;
pub use spec::*;
pub use view::*;
