//! DataLex CLI
//!
//! Validate, resolve, compile and diff model files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use datalex_core::config::OutputFormat;
use datalex_core::graph::resolve_relationship_edges;
use datalex_core::loader::{resolve_project, ProjectEntry};
use datalex_core::{
    validate_document, verify, CanonicalModel, ChangeReport, DatalexConfig, Issues,
    ModelDocument, Verified,
};

#[derive(Parser)]
#[command(name = "datalex")]
#[command(about = "Resolve, validate, canonicalize and diff DataLex models")]
struct Cli {
    /// Configuration file layered over the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Extra directory searched for imported models (repeatable)
    #[arg(short = 'I', long = "search-dir", global = true)]
    search_dirs: Vec<PathBuf>,

    /// Emit compact JSON
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Structurally and semantically validate a model and its imports
    Validate {
        model: PathBuf,
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Compile a model to its canonical form
    Compile {
        model: PathBuf,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print only the checksum
        #[arg(long)]
        checksum: bool,
    },

    /// Diff two models and classify breaking changes
    Diff {
        old: PathBuf,
        new: PathBuf,
        /// Inputs are stored canonical JSON rather than model documents
        #[arg(long)]
        canonical: bool,
        /// Exit 0 even when breaking changes are found
        #[arg(long)]
        allow_breaking: bool,
        /// Any change at all counts as breaking
        #[arg(long)]
        strict: bool,
    },

    /// Resolve imports and print the graph summary
    Resolve {
        model: PathBuf,
        /// Print the import graph in DOT format instead
        #[arg(long)]
        dot: bool,
        /// Include resolved relationship edges
        #[arg(long)]
        edges: bool,
    },

    /// Resolve every model file under a directory
    ResolveProject { directory: PathBuf },

    /// Diff two project directories model by model
    DiffAll {
        old: PathBuf,
        new: PathBuf,
        #[arg(long)]
        allow_breaking: bool,
    },

    /// Print statistics of a compiled model
    Stats { model: PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = DatalexConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;
    config.resolver.search_dirs.extend(cli.search_dirs.iter().cloned());
    if cli.compact {
        config.output.format = OutputFormat::Compact;
    }

    match cli.command {
        Commands::Validate { model, strict } => {
            let document = load(&model)?;
            let structural = validate_document(&document);
            if structural.has_errors() {
                print_issues(&model.display().to_string(), &structural);
                return Ok(ExitCode::from(1));
            }

            let issues = verify_file(&config, &document)?.issues;
            print_issues(&model.display().to_string(), &issues);

            let fail_on_warnings = strict || config.validation.warnings_as_errors;
            if issues.has_errors() || (fail_on_warnings && issues.warning_count() > 0) {
                println!("❌ Validation failed");
                Ok(ExitCode::from(1))
            } else {
                println!("✅ {} is valid", model.display());
                Ok(ExitCode::SUCCESS)
            }
        }

        Commands::Compile {
            model,
            output,
            checksum,
        } => {
            let canonical = compile_file(&config, &model)?;
            if checksum {
                println!("{}", canonical.checksum()?);
                return Ok(ExitCode::SUCCESS);
            }

            let text = render(&config, &canonical)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, text + "\n")
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    println!("✅ Wrote {} ({})", path.display(), canonical.checksum()?);
                }
                None => println!("{}", text),
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Diff {
            old,
            new,
            canonical,
            allow_breaking,
            strict,
        } => {
            let (old_model, new_model) = if canonical {
                (read_canonical(&old)?, read_canonical(&new)?)
            } else {
                (compile_file(&config, &old)?, compile_file(&config, &new)?)
            };

            let mut checker = config.checker();
            if strict {
                checker = checker.strict();
            }
            let report = checker.diff(&old_model, &new_model);
            println!("{}", render(&config, &report)?);
            print_report_summary(&report);

            if report.breaking && !allow_breaking && config.diff.fail_on_breaking {
                eprintln!("❌ Breaking changes detected. Use --allow-breaking to bypass.");
                return Ok(ExitCode::from(2));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Resolve { model, dot, edges } => {
            let document = load(&model)?;
            let verified = verify_file(&config, &document)?;

            if dot {
                print!("{}", verified.graph.to_dot());
            } else {
                println!("{}", render(&config, &verified.graph.summary())?);
                if edges {
                    let report = resolve_relationship_edges(&verified.graph);
                    println!("{}", render(&config, &report)?);
                }
            }
            print_issues(&model.display().to_string(), verified.graph.issues());

            if verified.graph.issues().has_errors() {
                Ok(ExitCode::from(1))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }

        Commands::ResolveProject { directory } => {
            let entries = resolve_project(&directory, &config.loader(), &config.resolve_options());
            println!("📁 Project: {}", directory.display());
            println!("   Models found: {}", entries.len());

            let mut failures = 0;
            for ProjectEntry { file, outcome } in &entries {
                match outcome {
                    Ok(graph) => {
                        let status = if graph.issues().is_empty() {
                            "OK".to_string()
                        } else {
                            format!("{} issues", graph.issues().len())
                        };
                        println!(
                            "  {} ({}): {} entities [{}]",
                            graph.root_name(),
                            file.display(),
                            graph.entity_count(),
                            status
                        );
                        if graph.issues().has_errors() {
                            failures += 1;
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        println!("  ❌ {}: {}", file.display(), e);
                    }
                }
            }

            Ok(if failures > 0 {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }

        Commands::DiffAll {
            old,
            new,
            allow_breaking,
        } => {
            let old_models = compile_project(&config, &old)?;
            let new_models = compile_project(&config, &new)?;
            let diff = config.checker().diff_projects(&old_models, &new_models);

            println!("{}", render(&config, &diff)?);
            println!(
                "Models: +{} -{} changed:{} unchanged:{}",
                diff.added_models.len(),
                diff.removed_models.len(),
                diff.changed_models.len(),
                diff.unchanged_models.len()
            );

            if diff.breaking && !allow_breaking && config.diff.fail_on_breaking {
                eprintln!("❌ Breaking changes detected. Use --allow-breaking to bypass.");
                for reason in &diff.breaking_reasons {
                    eprintln!("   - {}", reason);
                }
                return Ok(ExitCode::from(2));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Stats { model } => {
            let stats = compile_file(&config, &model)?.stats();

            println!("Model: {} v{}", stats.model_name, stats.version);
            let kinds: Vec<String> = stats
                .entity_types
                .iter()
                .map(|(kind, count)| format!("{} {}", count, kind))
                .collect();
            println!("Entities: {}  ({})", stats.entity_count, kinds.join(", "));
            println!(
                "Fields: {}  (PK: {}, FK: {}, nullable: {})",
                stats.total_fields, stats.primary_keys, stats.foreign_keys, stats.nullable_fields
            );
            println!("Relationships: {}", stats.relationship_count);
            println!("Indexes: {}", stats.index_count);
            println!("Glossary terms: {}", stats.glossary_terms);
            println!("Rules: {}", stats.rule_count);
            println!(
                "Description coverage: {}/{} ({:.0}%)",
                stats.described_fields,
                stats.total_fields,
                stats.description_coverage() * 100.0
            );
            if stats.deprecated_fields > 0 {
                println!("Deprecated fields: {}", stats.deprecated_fields);
            }
            if !stats.subject_areas.is_empty() {
                println!("Subject areas: {}", stats.subject_areas.join(", "));
            }
            if !stats.tags.is_empty() {
                println!("Tags: {}", stats.tags.join(", "));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load(path: &Path) -> anyhow::Result<ModelDocument> {
    ModelDocument::from_path(path).with_context(|| format!("cannot load {}", path.display()))
}

fn verify_file(config: &DatalexConfig, document: &ModelDocument) -> anyhow::Result<Verified> {
    let verified = verify(document, &config.loader(), &config.resolve_options())?;
    Ok(verified)
}

fn compile_file(config: &DatalexConfig, path: &Path) -> anyhow::Result<CanonicalModel> {
    let document = load(path)?;
    let verified = verify_file(config, &document)?;
    if verified.has_errors() {
        print_issues(&path.display().to_string(), &verified.issues);
        bail!("{} has validation errors", path.display());
    }
    Ok(verified.compile()?)
}

fn compile_project(
    config: &DatalexConfig,
    dir: &Path,
) -> anyhow::Result<BTreeMap<String, CanonicalModel>> {
    let mut models = BTreeMap::new();
    for entry in resolve_project(dir, &config.loader(), &config.resolve_options()) {
        let graph = entry
            .outcome
            .with_context(|| format!("cannot resolve {}", entry.file.display()))?;
        let verified = Verified::from_graph(graph);
        if verified.has_errors() {
            print_issues(&entry.file.display().to_string(), &verified.issues);
            bail!("{} has validation errors", entry.file.display());
        }
        models.insert(verified.graph.root_name().to_string(), verified.compile()?);
    }
    Ok(models)
}

fn read_canonical(path: &Path) -> anyhow::Result<CanonicalModel> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    CanonicalModel::from_json_str(&text)
        .with_context(|| format!("invalid canonical model {}", path.display()))
}

fn render<T: Serialize>(config: &DatalexConfig, value: &T) -> anyhow::Result<String> {
    let text = match config.output.format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        OutputFormat::Compact => serde_json::to_string(value)?,
    };
    Ok(text)
}

fn print_issues(label: &str, issues: &Issues) {
    if issues.is_empty() {
        return;
    }
    eprintln!(
        "{}: {} error(s), {} warning(s)",
        label,
        issues.error_count(),
        issues.warning_count()
    );
    for issue in issues {
        eprintln!("  {}", issue);
    }
}

fn print_report_summary(report: &ChangeReport) {
    for (name, changes) in report.collections() {
        if !changes.is_empty() {
            eprintln!(
                "  {:<14} +{} -{} ~{}",
                name,
                changes.added.len(),
                changes.removed.len(),
                changes.modified.len()
            );
        }
    }
    for reason in &report.breaking_reasons {
        eprintln!("  ⚠️  {}", reason);
    }
    for notice in &report.notices {
        eprintln!("  ℹ️  {}", notice);
    }
}
