use crate::compiler::Compiler;
use crate::config::CompilerConfig;
use crate::graph::PartitionStrategy;
use crate::linter::{self, LintSeverity};
use crate::source::load_units;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

/// Command-line interface for routeforge
#[derive(Parser)]
#[command(name = "routeforge")]
#[command(about = "Compile annotated handler declarations into OpenAPI and a binding manifest", long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "ROUTEFORGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile declaration units into openapi.json and manifest.json
    Compile {
        /// Declaration unit file, or a directory of them
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for the artifacts
        #[arg(short, long)]
        out: PathBuf,

        /// Compiler config (YAML, TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Keep schemas unreachable from any operation
        #[arg(long, default_value_t = false)]
        no_prune: bool,
    },
    /// Report diagnostics over the graph IR
    Lint {
        /// Declaration unit file, or a directory of them
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Exit with error code if any errors are found
        #[arg(long, default_value_t = false)]
        fail_on_error: bool,

        /// Show only errors (hide warnings and info)
        #[arg(long, default_value_t = false)]
        errors_only: bool,
    },
    /// Print how the compiled schemas would be split into files
    Partition {
        /// Declaration unit file, or a directory of them
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Force a strategy: none, dependency, controller, size
        #[arg(long)]
        strategy: Option<String>,
    },
}

fn compile(input: &Path, config: CompilerConfig) -> anyhow::Result<crate::compiler::CompileOutput> {
    let units = load_units(input)?;
    Compiler::new(config).compile(&units)
}

/// Run a parsed command line.
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Compile {
            input,
            out,
            config,
            no_prune,
        } => {
            let mut config = CompilerConfig::resolve(config.as_deref())?;
            if no_prune {
                config.prune_unused = false;
            }
            let output = compile(&input, config)?;
            let written = output.write_to(&out)?;
            info!(out = %out.display(), files = written.len(), "Artifacts written");
            for path in &written {
                println!("wrote {}", path.display());
            }
            println!(
                "{} operation(s), {} schema(s) pruned",
                output.report.operations,
                output.report.pruned.len()
            );
            println!(
                "partition: {} ({})",
                output.partition.strategy, output.partition.recommendation
            );
            Ok(())
        }
        Commands::Lint {
            input,
            config,
            fail_on_error,
            errors_only,
        } => {
            let config = CompilerConfig::resolve(config.as_deref())?;
            let mut issues = linter::lint_path(&input, &config)?;
            if errors_only {
                issues.retain(|i| i.severity == LintSeverity::Error);
            }
            linter::print_lint_issues(&issues);
            if fail_on_error {
                linter::fail_if_errors(&issues)?;
            }
            Ok(())
        }
        Commands::Partition {
            input,
            config,
            strategy,
        } => {
            let mut config = CompilerConfig::resolve(config.as_deref())?;
            if let Some(strategy) = strategy {
                config.partition.strategy = Some(strategy.parse::<PartitionStrategy>()?);
            }
            let plan = compile(&input, config)?.partition;
            println!(
                "strategy: {} (split: {})",
                plan.strategy, plan.should_split
            );
            println!(
                "schemas: {}, avg deps: {:.2}, controller groups: {}",
                plan.metrics.schema_count, plan.metrics.avg_deps, plan.metrics.controller_groups
            );
            println!("{}", plan.recommendation);
            for group in &plan.groups {
                let names: Vec<&str> = group.schemas.keys().map(String::as_str).collect();
                println!("  {} ({}): {}", group.name, names.len(), names.join(", "));
            }
            Ok(())
        }
    }
}
