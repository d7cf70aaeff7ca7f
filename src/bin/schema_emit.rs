//! Schema Emit CLI
//!
//! Analyzes API documents and writes emission manifests, singly or in batches.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use schema_emit::graph::{detect_cycles, validate_references};
use schema_emit::loader::load_document;
use schema_emit::{
    BatchCoordinator, DependencyGraph, EmitConfig, ExecutionMode, FileJob, Generator,
    GeneratorOptions,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-emit")]
#[command(about = "Plan schema emission order from OpenAPI documents")]
struct Cli {
    /// Config file (layered over schema-emit.toml and SCHEMA_EMIT__* variables)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log progress (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a manifest for one document
    Generate {
        /// Input document (.json, .yaml, .yml)
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        filter: FilterArgs,

        /// Custom string format as NAME=REGEX (repeatable)
        #[arg(long = "format", value_name = "NAME=REGEX")]
        formats: Vec<String>,

        /// Leave out schemas no operation uses
        #[arg(long)]
        skip_unused: bool,

        /// Print the operation filter report to stderr
        #[arg(long)]
        report: bool,
    },

    /// Run every job from the config file
    Batch {
        /// Run jobs one after another
        #[arg(long)]
        sequential: bool,

        /// Maximum concurrent jobs
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
    },

    /// Export the dependency graph as GraphViz DOT
    Graph {
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Default)]
struct FilterArgs {
    #[arg(long = "include-tag")]
    include_tags: Vec<String>,
    #[arg(long = "exclude-tag")]
    exclude_tags: Vec<String>,
    /// Path glob, e.g. /pets/**
    #[arg(long = "include-path")]
    include_paths: Vec<String>,
    #[arg(long = "exclude-path")]
    exclude_paths: Vec<String>,
    #[arg(long = "include-method")]
    include_methods: Vec<String>,
    #[arg(long = "exclude-method")]
    exclude_methods: Vec<String>,
    /// operationId glob
    #[arg(long = "include-operation-id")]
    include_operation_ids: Vec<String>,
    #[arg(long = "exclude-operation-id")]
    exclude_operation_ids: Vec<String>,
    #[arg(long)]
    exclude_deprecated: bool,
}

impl FilterArgs {
    /// Override the configured filter only in the dimensions given on the command line
    fn apply_to(self, options: &mut GeneratorOptions) {
        let filter = &mut options.filter;
        let replace = |target: &mut Vec<String>, values: Vec<String>| {
            if !values.is_empty() {
                *target = values;
            }
        };
        replace(&mut filter.include_tags, self.include_tags);
        replace(&mut filter.exclude_tags, self.exclude_tags);
        replace(&mut filter.include_paths, self.include_paths);
        replace(&mut filter.exclude_paths, self.exclude_paths);
        replace(&mut filter.include_methods, self.include_methods);
        replace(&mut filter.exclude_methods, self.exclude_methods);
        replace(&mut filter.include_operation_ids, self.include_operation_ids);
        replace(&mut filter.exclude_operation_ids, self.exclude_operation_ids);
        if self.exclude_deprecated {
            filter.exclude_deprecated = true;
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = EmitConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Generate {
            input,
            output,
            filter,
            formats,
            skip_unused,
            report,
        } => {
            let mut options = config.generator.clone();
            filter.apply_to(&mut options);
            for entry in formats {
                let (name, pattern) = entry
                    .split_once('=')
                    .with_context(|| format!("Expected NAME=REGEX, got '{}'", entry))?;
                options.custom_formats.insert(name.to_string(), pattern.to_string());
            }
            if skip_unused {
                options.emit_unused = false;
            }

            let generator = Generator::new(options)?;
            let analysis = match &output {
                Some(path) => generator.generate_file(&input, path)?,
                None => {
                    let doc = load_document(&input)?;
                    let (analysis, rendered) = generator.generate(&doc)?;
                    print!("{}", rendered);
                    analysis
                }
            };

            if report {
                eprintln!("{}", analysis.filter_stats.format_report());
            }
            if let Some(path) = output {
                eprintln!(
                    "✅ {} schemas ({} circular) written to {}",
                    analysis.plan.len(),
                    analysis.circular.len(),
                    path.display()
                );
            }
            Ok(0)
        }

        Commands::Batch {
            sequential,
            concurrency,
        } => {
            let mut settings = config.batch.clone();
            if sequential {
                settings.mode = ExecutionMode::Sequential;
            }
            if let Some(limit) = concurrency {
                settings.concurrency = limit;
            }
            config.generator.validate()?;

            let coordinator = BatchCoordinator::from_settings(&settings)?;
            let summary = coordinator.run(&config.jobs, |job| FileJob::from_config(&config, job))?;

            println!("{}", summary.format_text());
            Ok(summary.exit_code())
        }

        Commands::Graph { input, output } => {
            let doc = load_document(&input)?;
            validate_references(&doc)?;
            let graph = DependencyGraph::build(&doc);
            let circular = detect_cycles(&graph);
            let dot = graph.to_dot(&circular);

            match output {
                Some(path) => {
                    std::fs::write(&path, dot)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!(
                        "✅ Exported {} schemas, {} edges to {}",
                        graph.len(),
                        graph.edge_count(),
                        path.display()
                    );
                }
                None => print!("{}", dot),
            }
            Ok(0)
        }
    }
}
