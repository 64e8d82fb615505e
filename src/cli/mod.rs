//! # CLI Module
//!
//! Thin command-line front end over the compiler and linter.
//!
//! ## Commands
//!
//! ### `compile`
//!
//! ```bash
//! routeforge compile --input decls/ --out build/api [--config routeforge.yaml] [--no-prune]
//! ```
//!
//! Writes `openapi.json`, `manifest.json` and, in precompiled validation mode,
//! `validators.json`. Exits non-zero when no controllers or operations are found.
//!
//! ### `lint`
//!
//! ```bash
//! routeforge lint --input decls/ [--errors-only] [--fail-on-error]
//! ```
//!
//! ### `partition`
//!
//! ```bash
//! routeforge partition --input decls/ [--strategy controller]
//! ```

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{run_cli, Cli, Commands};
