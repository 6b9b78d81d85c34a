use clap::Parser;
use regexcount::config::{self, OutputFormat, Overrides};
use regexcount::{output, Aggregator};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Count log lines matching a regex, grouped by a metric-name template,
/// and print each metric as a per-second rate.
#[derive(Parser, Debug)]
#[command(name = "regexcount", version, about)]
pub struct Cli {
    /// Log file to read (default: stdin)
    #[arg(value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, default_value = "regexcount.toml")]
    config: PathBuf,

    /// Regular expression with named groups (overrides config)
    #[arg(short, long, allow_hyphen_values = true)]
    regex: Option<String>,

    /// Metric-name template using <group> placeholders (overrides config)
    #[arg(short = 't', long)]
    metric_template: Option<String>,

    /// Legacy parser option string, e.g. '-r <regex> -t <template>'
    #[arg(long, allow_hyphen_values = true)]
    parser_options: Option<String>,

    /// Seconds the input represents, used to compute rates (overrides config)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Output format (overrides config)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Prefix joined to every metric name with '.'
    #[arg(long)]
    metric_prefix: Option<String>,

    /// Suffix joined to every metric name with '.'
    #[arg(long)]
    metric_suffix: Option<String>,

    /// Validate config and print the resolved pattern and template, don't read input
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (per-line parse failures, resolved settings)
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    tracing::debug!(?cli, "parsed CLI arguments");

    let mut cfg = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };
    cfg.apply_overrides(Overrides {
        regex: cli.regex,
        metric_template: cli.metric_template,
        parser_options: cli.parser_options,
        duration_secs: cli.duration,
        format: cli.format,
        metric_prefix: cli.metric_prefix,
        metric_suffix: cli.metric_suffix,
    });

    let mut aggregator = match cfg.parser_config().and_then(|p| Aggregator::new(&p)) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "invalid parser configuration");
            return ExitCode::FAILURE;
        }
    };

    if cli.dry_run {
        println!("regex:    {}", aggregator.pattern().as_str());
        println!("template: {}", aggregator.template());
        println!("groups:   {}", aggregator.pattern().group_names().join(", "));
        println!("duration: {}s", cfg.window.duration_secs);
        return ExitCode::SUCCESS;
    }

    let reader: Box<dyn BufRead> = match &cli.log_file {
        Some(path) => match std::fs::File::open(path) {
            Ok(f) => Box::new(BufReader::new(f)),
            Err(e) => {
                tracing::error!(error = %e, path = %path.display(), "failed to open log file");
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(BufReader::new(std::io::stdin().lock())),
    };

    if let Err(e) = consume_all(&mut aggregator, reader) {
        tracing::error!(error = %e, "failed to read input");
        return ExitCode::FAILURE;
    }

    let samples = match aggregator.read_window(cfg.window.duration_secs) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "cannot compute rates");
            return ExitCode::FAILURE;
        }
    };
    aggregator.reset_window();

    let stdout = std::io::stdout();
    if let Err(e) = output::write_samples(&mut stdout.lock(), &cfg.output, &samples) {
        tracing::error!(error = %e, "failed to write metrics");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Feed every line of `reader` to the aggregator.
///
/// Lines whose metric name cannot be derived are logged and skipped.
fn consume_all<R: BufRead>(aggregator: &mut Aggregator, mut reader: R) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut lines = 0u64;
    let mut matched = 0u64;
    let mut failed = 0u64;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        lines += 1;
        match aggregator.consume_bytes(trim_line_ending(&buf)) {
            Ok(Some(_)) => matched += 1,
            Ok(None) => {}
            Err(e) => {
                failed += 1;
                tracing::warn!(error = %e, line_number = lines, "skipping line");
            }
        }
    }

    tracing::info!(lines, matched, failed, "finished reading input");
    Ok(())
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
