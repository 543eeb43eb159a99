use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use vhash::{
    BatchOptions, CacheStatus, FfmpegLogLevel, FingerprintSequence, FingerprintStore,
    GenerateOptions, MatchConfig, MatchProfile, OperationType, PairOutcome, ProgressCallback,
    ProgressInfo, RatioConvention, SequenceAligner, Similarity, Thresholds,
};

const CLI_AFTER_HELP: &str = "Examples:\n  vhash gen movie.mp4 trailer.mkv\n  vhash match movie.mp4 reupload.mp4\n  vhash match library/ --profile loose --json\n  vhash completions zsh > _vhash";

/// Exit status for malformed invocations, matching clap's own usage errors.
const EXIT_USAGE: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "vhash",
    version,
    about = "Fingerprint videos and find near-duplicates",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone)]
struct GlobalOptions {
    /// Show debug logging (overridden by RUST_LOG).
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Tolerance profile (strict = 8 bits, loose = 15 bits).
    #[arg(long, global = true, default_value = "strict")]
    profile: String,

    /// Maximum differing bits for two fingerprints to match. Overrides --profile.
    #[arg(long, global = true)]
    tolerance: Option<u32>,

    /// Ratio convention: twice (2M/(m+n)) or longest (M/max(m,n)).
    #[arg(long, global = true, default_value = "twice")]
    convention: String,

    /// Category thresholds as VERY_HIGH,HIGH,MEDIUM (default 0.20,0.10,0.05).
    #[arg(long, global = true)]
    thresholds: Option<String>,

    /// Wall-clock budget in seconds for the pairwise comparison sweep.
    #[arg(long, global = true)]
    deadline: Option<f64>,

    /// Decoder output size as WIDTHxHEIGHT, e.g. 64x64.
    #[arg(long, global = true)]
    decode_size: Option<String>,

    /// Worker thread count for batch work.
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true, default_value = "error")]
    ffmpeg_log_level: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate (or reuse cached) fingerprints and write sidecars.
    #[command(
        name = "gen",
        after_help = "Examples:\n  vhash gen movie.mp4\n  vhash gen *.mkv --progress"
    )]
    Generate {
        /// Video files. Arguments that are not existing files are skipped.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Compare all pairs of videos, sidecars, or directories of sidecars.
    #[command(
        name = "match",
        after_help = "Examples:\n  vhash match a.mp4 b.mp4\n  vhash match library/ extra.vhs --deadline 60"
    )]
    Match {
        /// Videos, sidecar files, or directories whose sidecars are compared.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Failure of a whole command, as opposed to one item of a batch.
enum CommandError {
    Usage(String),
    Fatal(Box<dyn std::error::Error>),
}

impl From<vhash::VhashError> for CommandError {
    fn from(error: vhash::VhashError) -> Self {
        CommandError::Fatal(Box::new(error))
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(error: serde_json::Error) -> Self {
        CommandError::Fatal(Box::new(error))
    }
}

impl From<indicatif::style::TemplateError> for CommandError {
    fn from(error: indicatif::style::TemplateError) -> Self {
        CommandError::Fatal(Box::new(error))
    }
}

fn parse_convention(value: &str) -> Option<RatioConvention> {
    match value.to_ascii_lowercase().as_str() {
        "twice" | "2m" | "total" => Some(RatioConvention::TwiceMatchedOverTotal),
        "longest" | "max" => Some(RatioConvention::MatchedOverLongest),
        _ => None,
    }
}

fn parse_thresholds(value: &str) -> Option<Thresholds> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        &[very_high, high, medium] if very_high >= high && high >= medium => Some(Thresholds {
            very_high,
            high,
            medium,
        }),
        _ => None,
    }
}

fn parse_decode_size(value: &str) -> Option<(u32, u32)> {
    let (width, height) = value.to_ascii_lowercase().split_once('x').map(|(w, h)| {
        (w.trim().parse::<u32>(), h.trim().parse::<u32>())
    })?;
    match (width, height) {
        (Ok(width), Ok(height)) if width > 0 && height > 0 => Some((width, height)),
        _ => None,
    }
}

fn match_config(global: &GlobalOptions) -> Result<MatchConfig, CommandError> {
    let profile = global
        .profile
        .parse::<MatchProfile>()
        .map_err(CommandError::Usage)?;
    let convention = parse_convention(&global.convention).ok_or_else(|| {
        CommandError::Usage(format!("unsupported --convention: {}", global.convention))
    })?;

    let mut config = MatchConfig::from_profile(profile).with_convention(convention);
    if let Some(tolerance) = global.tolerance {
        config = config.with_tolerance(tolerance);
    }
    config
        .validate()
        .map_err(|error| CommandError::Usage(error.to_string()))?;
    Ok(config)
}

fn thresholds(global: &GlobalOptions) -> Result<Thresholds, CommandError> {
    match &global.thresholds {
        Some(value) => parse_thresholds(value).ok_or_else(|| {
            CommandError::Usage(format!(
                "unsupported --thresholds: {value} (expected three descending ratios)"
            ))
        }),
        None => Ok(Thresholds::default()),
    }
}

fn generate_options(
    global: &GlobalOptions,
    bar: Option<&ProgressBar>,
) -> Result<GenerateOptions, CommandError> {
    let mut options = GenerateOptions::new();
    if let Some(size) = &global.decode_size {
        let (width, height) = parse_decode_size(size)
            .ok_or_else(|| CommandError::Usage(format!("unsupported --decode-size: {size}")))?;
        options = options.with_decode_resolution(width, height);
    }
    if let Some(bar) = bar {
        options = options.with_progress(Arc::new(BarProgress {
            bar: bar.clone(),
            operation: OperationType::BatchGeneration,
        }));
    }
    Ok(options)
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), CommandError> {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let level = global
        .ffmpeg_log_level
        .parse::<FfmpegLogLevel>()
        .map_err(CommandError::Usage)?;
    vhash::set_ffmpeg_log_level(level);

    if let Some(threads) = global.threads {
        if threads > 0 {
            unsafe {
                std::env::set_var("RAYON_NUM_THREADS", threads.to_string());
            }
        }
    }

    Ok(())
}

/// Drives a progress bar from the reports of one kind of operation.
struct BarProgress {
    bar: ProgressBar,
    operation: OperationType,
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.operation != self.operation {
            return;
        }
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
    }
}

fn progress_bar(enabled: bool) -> Result<Option<ProgressBar>, CommandError> {
    if !enabled {
        return Ok(None);
    }
    let bar = ProgressBar::new(0);
    let style =
        ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
    bar.set_style(style.progress_chars("##-"));
    Ok(Some(bar))
}

fn report_item_error(path: &Path, error: &dyn std::fmt::Display) {
    eprintln!(
        "{} {}",
        "error:".red().bold(),
        format!("{}: {error}", path.display()).red()
    );
}

fn styled_similarity(similarity: Similarity, ratio: f64) -> ColoredString {
    let line = format!("{}: {:.2}%", similarity.label(), ratio * 100.0);
    match similarity {
        Similarity::VeryHigh => line.red(),
        Similarity::High => line.magenta(),
        Similarity::Medium => line.yellow(),
        Similarity::Low => line.normal(),
    }
}

/// Returns the number of failed items.
fn run_generate(global: &GlobalOptions, files: Vec<PathBuf>) -> Result<usize, CommandError> {
    let (existing, missing): (Vec<PathBuf>, Vec<PathBuf>) =
        files.into_iter().partition(|path| path.is_file());
    for path in &missing {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!("skipping {}: not an existing file", path.display()).yellow()
        );
    }
    if existing.is_empty() {
        return Ok(0);
    }

    let bar = progress_bar(global.progress)?;
    let options = generate_options(global, bar.as_ref())?;
    let store = FingerprintStore::new();
    let results = vhash::generate_all(&existing, &store, &options);
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let mut failures = 0;
    let mut report = Vec::new();
    for (path, result) in existing.iter().zip(results) {
        match result {
            Ok((sequence, status)) => {
                let note = match status {
                    CacheStatus::Hit => "cached",
                    CacheStatus::StaleHit => "cached (video changed since)",
                    CacheStatus::Stored => "written",
                    CacheStatus::Generated => "generated (sidecar already present)",
                };
                if global.json {
                    report.push(json!({
                        "path": path.display().to_string(),
                        "sidecar": vhash::sidecar_path(path).display().to_string(),
                        "fingerprints": sequence.len(),
                        "status": note,
                    }));
                } else {
                    println!(
                        "{} {} ({} fingerprints, {note})",
                        "processed".green().bold(),
                        path.display(),
                        sequence.len()
                    );
                }
            }
            Err(error) => {
                failures += 1;
                if global.json {
                    report.push(json!({
                        "path": path.display().to_string(),
                        "error": error.to_string(),
                    }));
                } else {
                    report_item_error(path, &error);
                }
            }
        }
    }

    if global.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(failures)
}

/// Expand `match` inputs into the list of sequences to compare.
fn expand_inputs(inputs: Vec<PathBuf>, failures: &mut usize) -> Vec<PathBuf> {
    let mut targets = Vec::new();
    for input in inputs {
        if input.is_dir() {
            match vhash::collect_sidecars(&input) {
                Ok(sidecars) => targets.extend(sidecars),
                Err(error) => {
                    *failures += 1;
                    report_item_error(&input, &error);
                }
            }
        } else if input.is_file() {
            targets.push(input);
        } else {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("skipping {}: no such file or directory", input.display()).yellow()
            );
        }
    }
    targets
}

/// Returns the number of failed items.
fn run_match(global: &GlobalOptions, inputs: Vec<PathBuf>) -> Result<usize, CommandError> {
    let config = match_config(global)?;
    let thresholds = thresholds(global)?;
    let aligner = SequenceAligner::new(config).map_err(|error| CommandError::Usage(error.to_string()))?;

    let mut failures = 0;
    let targets = expand_inputs(inputs, &mut failures);

    let store = FingerprintStore::new();
    let options = generate_options(global, None)?;
    let mut names: Vec<PathBuf> = Vec::new();
    let mut sequences: Vec<FingerprintSequence> = Vec::new();
    for target in targets {
        match vhash::resolve_sequence(&target, &store, &options) {
            Ok(sequence) => {
                names.push(target);
                sequences.push(sequence);
            }
            Err(error) => {
                failures += 1;
                report_item_error(&target, &error);
            }
        }
    }

    if sequences.len() < 2 {
        return Err(CommandError::Usage(format!(
            "match needs at least two fingerprint sequences, found {}",
            sequences.len()
        )));
    }

    if !global.json {
        println!("Start comparing {} files", sequences.len());
    }

    let bar = progress_bar(global.progress)?;
    let mut batch = BatchOptions::new();
    if let Some(seconds) = global.deadline {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(CommandError::Usage(format!("unsupported --deadline: {seconds}")));
        }
        batch = batch.with_deadline(Duration::from_secs_f64(seconds));
    }
    if let Some(bar) = &bar {
        batch = batch.with_progress(Arc::new(BarProgress {
            bar: bar.clone(),
            operation: OperationType::PairwiseComparison,
        }));
    }

    let comparisons = vhash::compare_all(&sequences, &aligner, &batch);
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let mut report = Vec::new();
    for comparison in &comparisons {
        let first = &names[comparison.first];
        let second = &names[comparison.second];
        match &comparison.outcome {
            PairOutcome::Compared(result) => {
                let similarity = thresholds.classify(result.ratio);
                if global.json {
                    report.push(json!({
                        "first": first.display().to_string(),
                        "second": second.display().to_string(),
                        "ratio": result.ratio,
                        "matched": result.matched,
                        "category": similarity.label(),
                        "tolerance": result.config.tolerance,
                    }));
                } else {
                    println!("Comparing:\n  {}\n  {}", first.display(), second.display());
                    println!("{}", styled_similarity(similarity, result.ratio));
                    log::debug!("{result}");
                }
            }
            PairOutcome::Skipped => {
                if global.json {
                    report.push(json!({
                        "first": first.display().to_string(),
                        "second": second.display().to_string(),
                        "skipped": true,
                    }));
                } else {
                    println!(
                        "Comparing:\n  {}\n  {}\n{}",
                        first.display(),
                        second.display(),
                        "skipped (deadline reached)".dimmed()
                    );
                }
            }
        }
    }

    if global.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(failures)
}

fn run(cli: Cli) -> Result<usize, CommandError> {
    match cli.command {
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "vhash", &mut std::io::stdout());
            Ok(0)
        }
        Commands::Generate { files } => {
            apply_global_options(&cli.global)?;
            run_generate(&cli.global, files)
        }
        Commands::Match { inputs } => {
            apply_global_options(&cli.global)?;
            run_match(&cli.global, inputs)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failures) => {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("{failures} item(s) failed").yellow()
            );
            ExitCode::FAILURE
        }
        Err(CommandError::Usage(message)) => {
            eprintln!("{} {message}\n", "error:".red().bold());
            let _ = Cli::command().print_help();
            ExitCode::from(EXIT_USAGE)
        }
        Err(CommandError::Fatal(error)) => {
            eprintln!("{} {error}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
