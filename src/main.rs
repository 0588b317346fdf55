use anyhow::Context;
use change_cadence::analyzer::{CommitErrorPolicy, PipelineOptions};
use change_cadence::report::{write_report, CsvSink, JsonSink, ReportSink};
use change_cadence::{AnalyzerOptions, CadenceAnalyzer};
use clap::{ArgAction, Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    version,
    about = "Reports how often each file in a Git repository changes and which files are overdue",
    long_about = None
)]
struct Cli {
    /// Path or URL of the Git repository
    source: String,

    /// Branch or reference to start from (defaults to HEAD)
    #[arg(short, long)]
    branch: Option<String>,

    /// Report file to write
    #[arg(short, long, default_value = "report.csv")]
    output: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Number of extraction threads (0 uses one per CPU)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// What to do when the changed files of a single commit cannot be computed
    #[arg(long, value_enum, default_value_t = OnCommitError::Fail)]
    on_commit_error: OnCommitError,

    /// Include only files matching these patterns (glob format, e.g., "*.rs", "src/**/*.py")
    #[arg(short = 'i', long = "include")]
    include_patterns: Vec<String>,

    /// Exclude files matching these patterns
    #[arg(short = 'e', long = "exclude")]
    exclude_patterns: Vec<String>,

    /// Increase log verbosity (-v, -vv, -vvv); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Csv,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OnCommitError {
    /// Abort the whole run
    Fail,
    /// Log a warning and treat the commit as changing nothing
    Skip,
}

impl Cli {
    fn analyzer_options(&self) -> AnalyzerOptions {
        let on_commit_error = match self.on_commit_error {
            OnCommitError::Fail => CommitErrorPolicy::FailFast,
            OnCommitError::Skip => CommitErrorPolicy::Skip,
        };

        AnalyzerOptions {
            reference: self.branch.clone(),
            include_patterns: self.include_patterns.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            pipeline: PipelineOptions {
                jobs: self.jobs,
                on_commit_error,
                ..PipelineOptions::default()
            },
        }
    }

    fn create_sink(&self) -> anyhow::Result<Box<dyn ReportSink>> {
        let sink: Box<dyn ReportSink> = match self.format {
            Format::Csv => Box::new(CsvSink::create(&self.output)?),
            Format::Json => Box::new(JsonSink::create(&self.output)?),
        };
        Ok(sink)
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn spinner(message: &'static str) -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let progress = spinner("Fetching history...");
    let analyzed = CadenceAnalyzer::open(&cli.source, cli.analyzer_options())
        .with_context(|| format!("Failed to open {}", cli.source))
        .and_then(|analyzer| {
            if let Some(pb) = &progress {
                pb.set_message("Analyzing commits...");
            }
            analyzer
                .analyze()
                .context("Failed to analyze repository")
        });
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let rows = analyzed?;

    let mut sink = cli.create_sink().context("Failed to create report")?;
    write_report(&rows, sink.as_mut())
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;

    let overdue: Vec<_> = rows.iter().filter(|row| row.overdue).collect();
    println!(
        "Wrote {} ({} files, {} overdue)",
        cli.output.display(),
        rows.len(),
        overdue.len()
    );
    for row in overdue {
        println!("  overdue: {}", row.path);
    }

    Ok(())
}
