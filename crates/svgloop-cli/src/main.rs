use clap::Parser;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use svgloop::input::media_type_for_extension;
use svgloop::{
    BatchInput, BatchOptions, BatchReport, BatchResult, CostEstimator, DetailLevel, ErrorKind,
    OptimizeLevel, Provider, RunReport, Vectorizer, VectorizerConfig, write_json_report,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum CliError {
    Usage(String),
    Failed(String),
    Svgloop(svgloop::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Failed(msg) => write!(f, "Error: {msg}"),
            CliError::Svgloop(err) => write!(f, "Error: {err}"),
        }
    }
}

impl From<svgloop::Error> for CliError {
    fn from(value: svgloop::Error) -> Self {
        Self::Svgloop(value)
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Svgloop(value.into())
    }
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => 2,
            CliError::Failed(_) => 1,
            CliError::Svgloop(err) => match err.kind() {
                ErrorKind::InputValidation | ErrorKind::Config => 2,
                _ => 1,
            },
        }
    }
}

/// Vectorize a raster image into SVG with a vision-capable language model.
#[derive(Parser, Debug)]
#[command(name = "svgloop")]
#[command(version)]
struct Args {
    /// Input image (PNG, JPEG, GIF, BMP, WebP); with --batch a glob pattern or directory
    input: PathBuf,

    /// Output SVG file; with --batch the output directory
    output: PathBuf,

    /// Model name (defaults to the provider's default model)
    #[arg(short, long)]
    model: Option<String>,

    /// Maximum refinement iterations
    #[arg(short = 'i', long, value_parser = clap::value_parser!(u32).range(1..=100))]
    max_iterations: Option<u32>,

    /// Stop once the quality score reaches this value
    #[arg(short, long, value_parser = parse_unit)]
    quality_threshold: Option<f64>,

    /// Model provider: anthropic, openai, openrouter, google, ollama, lmstudio
    #[arg(short, long, value_parser = parse_provider)]
    provider: Option<Provider>,

    /// API key (defaults to the provider's environment variable)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Override the provider base URL
    #[arg(short, long)]
    base_url: Option<String>,

    /// Keep per-iteration renders under this directory
    #[arg(short, long)]
    temp_dir: Option<PathBuf>,

    /// JSON or YAML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Analysis detail: low, medium, high
    #[arg(long, value_parser = parse_detail)]
    detail_level: Option<DetailLevel>,

    /// Output optimization: low, medium, high
    #[arg(long, value_parser = parse_optimize)]
    optimize_level: Option<OptimizeLevel>,

    /// Cache image analyses on disk
    #[arg(long)]
    cache: bool,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    /// Print a cost estimate and exit
    #[arg(long)]
    estimate_cost: bool,

    /// Process many images: INPUT is a glob pattern or a directory, OUTPUT a directory
    #[arg(long)]
    batch: bool,

    /// Process batch items in parallel
    #[arg(long)]
    parallel: bool,

    /// Worker threads for --parallel
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=64))]
    max_workers: u32,

    /// Keep going after a failed batch item
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    continue_on_error: bool,

    /// Write a JSON report of the run
    #[arg(long)]
    report: Option<PathBuf>,
}

fn parse_unit(s: &str) -> Result<f64, String> {
    let v: f64 = s.trim().parse().map_err(|_| format!("'{s}' is not a number"))?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(format!("{v} is not in 0.0..=1.0"))
    }
}

fn parse_provider(s: &str) -> Result<Provider, String> {
    Provider::from_str(s).map_err(|err| err.to_string())
}

fn parse_detail(s: &str) -> Result<DetailLevel, String> {
    DetailLevel::from_str(s).map_err(|err| err.to_string())
}

fn parse_optimize(s: &str) -> Result<OptimizeLevel, String> {
    OptimizeLevel::from_str(s).map_err(|err| err.to_string())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<VectorizerConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => VectorizerConfig::from_path(path)?,
        None => VectorizerConfig::default(),
    };
    if let Some(provider) = args.provider {
        config.provider = provider;
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(n) = args.max_iterations {
        config.max_iterations = n;
    }
    if let Some(q) = args.quality_threshold {
        config.quality_threshold = q;
    }
    if let Some(key) = &args.api_key {
        config.api_key = Some(key.clone());
    }
    if let Some(url) = &args.base_url {
        config.base_url = Some(url.clone());
    }
    if let Some(dir) = &args.temp_dir {
        config.temp_dir = Some(dir.clone());
    }
    if let Some(level) = args.detail_level {
        config.detail_level = level;
    }
    if let Some(level) = args.optimize_level {
        config.optimize_level = level;
    }
    if args.cache {
        config.cache.enabled = true;
    }
    config.validate()?;
    Ok(config)
}

/// A directory expands to its supported images; anything else is a glob pattern.
fn batch_input(input: &Path) -> Result<BatchInput, CliError> {
    if !input.is_dir() {
        return Ok(BatchInput::Pattern(input.to_string_lossy().into_owned()));
    }
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(input)? {
        let path = entry?.path();
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(media_type_for_extension)
            .is_some();
        if path.is_file() && supported {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(BatchInput::Paths(paths))
}

fn print_estimate(args: &Args, config: &VectorizerConfig) -> Result<(), CliError> {
    let estimate = CostEstimator::new(config.provider, config.model_or_default())
        .estimate(config.max_iterations);
    let rule = "=".repeat(50);
    println!("{rule}");
    println!("{estimate}");
    if args.batch {
        let files = batch_input(&args.input)?.resolve()?.len();
        println!("Images: {files}");
        if files > 1 && !estimate.is_free() {
            println!("Estimated total: ${:.4}", estimate.total * files as f64);
        }
    }
    println!("{rule}");
    Ok(())
}

/// Reports are observational; a failed write only warns.
fn warn_on_report_error(path: &Path, outcome: svgloop::Result<()>) {
    if let Err(err) = outcome {
        tracing::warn!(path = %path.display(), error = %err, "failed to write report");
    }
}

fn run_single(args: &Args, vectorizer: &Vectorizer) -> Result<(), CliError> {
    let max = vectorizer.config().max_iterations;
    let mut on_progress = |iteration: u32, quality: f64| {
        println!("Iteration {iteration}/{max} - quality {quality:.4}");
    };
    let result = vectorizer.vectorize_sync(&args.input, &args.output, Some(&mut on_progress))?;

    let rule = "=".repeat(50);
    println!("{rule}");
    println!("Vectorization finished ({})", result.terminal_reason);
    println!("Iterations: {}", result.iterations);
    println!("Final quality: {:.4}", result.quality_score);
    println!("SSIM: {:.4}", result.metrics.structural_similarity);
    println!("SVG written to: {}", args.output.display());
    println!("{rule}");

    if let Some(path) = &args.report {
        let report = RunReport::new(&args.input, &args.output, &result);
        warn_on_report_error(path, write_json_report(path, &report));
    }
    Ok(())
}

fn print_batch_summary(result: &BatchResult, output: &Path) {
    let rule = "=".repeat(50);
    println!("{rule}");
    println!("Batch finished");
    println!("Total: {}", result.total);
    println!("Successful: {}", result.successful);
    println!("Failed: {}", result.failed);
    if result.skipped > 0 {
        println!("Skipped: {}", result.skipped);
    }
    println!("Time: {:.2}s", result.elapsed.as_secs_f64());
    if let Some(q) = result.average_quality() {
        println!("Average quality: {q:.4}");
    }
    if let Some(n) = result.average_iterations() {
        println!("Average iterations: {n:.1}");
    }
    if !result.errors.is_empty() {
        println!("Errors ({}):", result.errors.len());
        for err in result.errors.iter().take(5) {
            println!("  - {}: {}", err.filename, err.message);
        }
        if result.errors.len() > 5 {
            println!("  ... and {} more", result.errors.len() - 5);
        }
    }
    println!("SVGs written to: {}", output.display());
    println!("{rule}");
}

fn run_batch(args: &Args, vectorizer: &Vectorizer) -> Result<(), CliError> {
    let input = batch_input(&args.input)?;
    let options = BatchOptions {
        parallel: args.parallel,
        max_workers: args.max_workers as usize,
        continue_on_error: args.continue_on_error,
    };
    let on_item = |name: &str, done: usize, total: usize, quality: f64| {
        println!("[{done}/{total}] {name} - quality {quality:.4}");
    };
    let result = vectorizer.vectorize_batch(&input, &args.output, &options, Some(&on_item))?;
    print_batch_summary(&result, &args.output);
    if let Some(path) = &args.report {
        warn_on_report_error(path, write_json_report(path, &BatchReport::from(&result)));
    }

    match batch_failure(&result) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// A stopped batch or one with no successful item fails the command.
fn batch_failure(result: &BatchResult) -> Option<CliError> {
    if result.aborted {
        let skipped = match result.skipped {
            0 => String::new(),
            n => format!(", {n} skipped"),
        };
        return Some(CliError::Failed(format!(
            "batch stopped after a failed item ({} done{skipped})",
            result.successful
        )));
    }
    if result.successful == 0 && result.failed > 0 {
        return Some(CliError::Failed(format!(
            "all {} batch items failed",
            result.failed
        )));
    }
    None
}

fn run(args: Args) -> Result<(), CliError> {
    if args.parallel && !args.batch {
        return Err(CliError::Usage(
            "--parallel can only be used with --batch".to_string(),
        ));
    }
    let config = build_config(&args)?;

    if args.estimate_cost {
        return print_estimate(&args, &config);
    }

    tracing::info!(
        provider = %config.provider,
        model = %config.model_or_default(),
        max_iterations = config.max_iterations,
        quality_threshold = config.quality_threshold,
        "configured"
    );
    let vectorizer = Vectorizer::from_config(config)?;
    if args.batch {
        run_batch(&args, &vectorizer)
    } else {
        run_single(&args, &vectorizer)
    }
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(err) = run(args) {
        eprintln!("{err}");
        std::process::exit(err.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn batch(successful: usize, failed: usize, skipped: usize, aborted: bool) -> BatchResult {
        BatchResult {
            total: successful + failed + skipped,
            successful,
            failed,
            skipped,
            aborted,
            results: Vec::new(),
            errors: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn stopped_batch_fails_even_after_a_success() {
        let err = batch_failure(&batch(1, 1, 1, true)).unwrap();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("1 skipped"), "{err}");
    }

    #[test]
    fn partial_failures_pass_when_continuing() {
        assert!(batch_failure(&batch(2, 1, 0, false)).is_none());
        assert_eq!(batch_failure(&batch(0, 3, 0, false)).unwrap().exit_code(), 1);
    }
}
