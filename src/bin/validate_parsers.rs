use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use siem_parser_validator::analyzer::FieldAnalyzer;
use siem_parser_validator::config::{PairFile, ValidatorConfig};
use siem_parser_validator::generator::{draw_samples, GeneratorRegistry};
use siem_parser_validator::models::SampleEvent;
use siem_parser_validator::orchestrator::BatchOrchestrator;
use siem_parser_validator::query::QueryClient;
use siem_parser_validator::report::{self, JSON_REPORT_FILE, MARKDOWN_REPORT_FILE};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "validate_parsers",
    version,
    about = "Validate backend parser extraction against synthetic vendor samples"
)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate every (generator, parser) pair listed in a pairs file
    Run(RunArgs),
    /// List the registered generators
    Generators(GeneratorArgs),
    /// Flatten and classify the events in a local JSON or NDJSON file
    Analyze(AnalyzeArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
    All,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// YAML or JSON file listing the pairs to validate
    #[arg(long, value_name = "FILE")]
    pairs: PathBuf,
    /// TOML configuration file (defaults and environment otherwise)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Directory reports are written to
    #[arg(long, value_name = "DIR", default_value = ".")]
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = ReportFormat::All)]
    format: ReportFormat,
    /// Override the configured worker count
    #[arg(long)]
    workers: Option<usize>,
    /// Seed for the built-in generators
    #[arg(long, default_value_t = 1337u64)]
    seed: u64,
    /// Exit with status 2 when critical issues are found
    #[arg(long)]
    fail_on_critical: bool,
}

#[derive(Parser, Debug)]
struct GeneratorArgs {
    /// Print this many samples per generator
    #[arg(long, default_value_t = 0usize)]
    samples: usize,
    #[arg(long, default_value_t = 1337u64)]
    seed: u64,
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// JSON array, single JSON object, or one event per line
    #[arg(long, value_name = "FILE")]
    file: PathBuf,
    #[arg(long, default_value_t = 10usize)]
    max_depth: usize,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&Path>) -> Result<ValidatorConfig> {
    let config = match path {
        Some(path) => {
            let mut config = ValidatorConfig::from_file(path)?;
            config.apply_env()?;
            config.validate()?;
            config
        }
        None => ValidatorConfig::from_env()?,
    };
    Ok(config)
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.batch.workers = workers;
        config.validate()?;
    }

    let pairs = PairFile::load(&args.pairs)?;
    let registry = GeneratorRegistry::with_builtins(args.seed);
    let client = QueryClient::from_config(&config)?;
    let orchestrator = BatchOrchestrator::from_config(&config, client, registry)?;

    info!(
        "Validating {} pairs against {} (scope {})",
        pairs.len(),
        config.backend.url,
        config.backend.scope
    );
    let batch = orchestrator.run(&pairs).await?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory {:?}", args.output))?;
    match args.format {
        ReportFormat::All => report::write_reports(&batch, &args.output)?,
        ReportFormat::Markdown => {
            let path = args.output.join(MARKDOWN_REPORT_FILE);
            fs::write(&path, report::render_markdown(&batch))
                .with_context(|| format!("Failed to write {:?}", path))?;
        }
        ReportFormat::Json => {
            let path = args.output.join(JSON_REPORT_FILE);
            fs::write(&path, report::export_json(&batch)?)
                .with_context(|| format!("Failed to write {:?}", path))?;
        }
    }

    println!(
        "Validated {} pairs: {} ok, {} without events, {} without fields, {} failed ({:.1}% success)",
        batch.total,
        batch.validated,
        batch.no_events,
        batch.no_fields,
        batch.failed,
        batch.success_rate
    );
    for issue in &batch.critical_issues {
        println!("CRITICAL: {}", issue.message);
    }

    if args.fail_on_critical && batch.has_critical_issues() {
        std::process::exit(2);
    }
    Ok(())
}

fn list_generators(args: GeneratorArgs) -> Result<()> {
    let registry = GeneratorRegistry::with_builtins(args.seed);
    for generator in registry.iter() {
        println!(
            "{:<20} {:<20} {}",
            generator.id(),
            generator.category().unwrap_or("-"),
            generator.product_id()
        );
        if args.samples > 0 {
            for sample in draw_samples(generator.as_ref(), args.samples)? {
                println!("    {}", serde_json::to_string(&sample.to_wire_value())?);
            }
        }
    }
    Ok(())
}

fn read_events(path: &Path) -> Result<Vec<SampleEvent>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read events file {:?}", path))?;

    if let Ok(value) = serde_json::from_str::<Value>(&content) {
        return Ok(match value {
            Value::Array(items) => items.into_iter().map(SampleEvent::from).collect(),
            other => vec![SampleEvent::from(other)],
        });
    }

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match serde_json::from_str::<Value>(line) {
            Ok(value) => SampleEvent::from(value),
            Err(_) => SampleEvent::text(line),
        })
        .collect())
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
    let events = read_events(&args.file)?;
    if events.is_empty() {
        bail!("No events found in {:?}", args.file);
    }

    let analyzer = FieldAnalyzer::new(args.max_depth);
    let analysis = analyzer.aggregate(&events);

    println!("Status:               {}", analysis.status.as_str());
    println!("Events:               {}", analysis.fields.sample_count);
    println!("Fields:               {}", analysis.fields.len());
    println!("Richness:             {}", analysis.richness);
    println!("Format compatibility: {:.1}", analysis.format_compatibility());
    println!();

    for (path, stats) in &analysis.fields.fields {
        let observables: Vec<String> = stats.observables.keys().map(|o| o.to_string()).collect();
        println!(
            "{:<40} freq={:<4} consistency={:.2} {}",
            path,
            stats.frequency,
            stats.consistency,
            observables.join(",")
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Generators(args) => list_generators(args),
        Commands::Analyze(args) => analyze(args),
    }
}
