//! tuiscope - inspect, redact and merge devtools export files

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use tuiscope::export::codec::read_payload;
use tuiscope::export::{self, write_envelope_to, Envelope, SanitizeMode};
use tuiscope::sanitize::SanitizeOutcome;
use tuiscope::store::LogCapacities;
use tuiscope::{DevtoolsConfig, ExportOptions, Store};

#[derive(Parser)]
#[command(
    name = "tuiscope",
    version,
    about = "Inspect, redact and merge terminal UI devtools exports"
)]
struct Cli {
    /// Config file (defaults to ~/.tuiscope/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise a full or incremental export
    Inspect {
        file: PathBuf,
    },
    /// Write a redacted copy of an export
    Sanitize(SanitizeArgs),
    /// List what sanitizing would redact, without writing anything
    Preview {
        file: PathBuf,
        /// Truncate previews to this many characters
        #[arg(long)]
        max_len: Option<usize>,
    },
    /// Replay a full export and its deltas into one consolidated export.
    ///
    /// The output carries the source's last checkpoint, so the next delta
    /// from the same source can be taken against it.
    Merge(MergeArgs),
}

#[derive(Args)]
struct SanitizeArgs {
    input: PathBuf,
    #[arg(short, long)]
    output: PathBuf,
    /// Redact the serialized text in bounded chunks instead of the decoded tree
    #[arg(long)]
    stream: bool,
    /// Gzip the output
    #[arg(long)]
    compress: bool,
}

#[derive(Args)]
struct MergeArgs {
    full: PathBuf,
    deltas: Vec<PathBuf>,
    #[arg(short, long)]
    output: PathBuf,
    /// Gzip the output
    #[arg(long)]
    compress: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let config = match &cli.config {
        Some(path) => DevtoolsConfig::load_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DevtoolsConfig::load(),
    };

    match cli.command {
        Commands::Inspect { file } => inspect(&file, &config),
        Commands::Sanitize(args) => sanitize(args, &config),
        Commands::Preview { file, max_len } => preview(&file, max_len, &config),
        Commands::Merge(args) => merge(args, &config),
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

fn read(path: &Path, config: &DevtoolsConfig) -> Result<Envelope> {
    export::read_envelope_from_path(path, &config.import_options())
        .with_context(|| format!("reading {}", path.display()))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn inspect(path: &Path, config: &DevtoolsConfig) -> Result<()> {
    let mut out = io::stdout().lock();
    match read(path, config)? {
        Envelope::Full(data) => {
            writeln!(out, "full export  version {}  at {}", data.version, data.timestamp)?;
            let sections = [
                ("components", data.components.as_ref().map(Vec::len)),
                ("state", data.state.as_ref().map(Vec::len)),
                ("events", data.events.as_ref().map(Vec::len)),
                ("commands", data.commands.as_ref().map(Vec::len)),
                ("performance", data.performance.as_ref().map(Vec::len)),
            ];
            for (name, count) in sections {
                match count {
                    Some(count) => writeln!(out, "  {name:<12} {count}")?,
                    None => writeln!(out, "  {name:<12} -")?,
                }
            }
            if let Some(checkpoint) = data.checkpoint {
                writeln!(
                    out,
                    "  checkpoint   events={} state={} commands={}",
                    checkpoint.last_event_id, checkpoint.last_state_id, checkpoint.last_command_id
                )?;
            }
        }
        Envelope::Delta(delta) => {
            let checkpoint = &delta.checkpoint;
            writeln!(
                out,
                "incremental export  version {}  at {}",
                checkpoint.version, checkpoint.timestamp
            )?;
            writeln!(out, "  {:<12} {}", "events", delta.new_events.len())?;
            writeln!(out, "  {:<12} {}", "state", delta.new_state.len())?;
            writeln!(out, "  {:<12} {}", "commands", delta.new_commands.len())?;
            writeln!(
                out,
                "  checkpoint   events={} state={} commands={}",
                checkpoint.last_event_id, checkpoint.last_state_id, checkpoint.last_command_id
            )?;
        }
    }
    Ok(())
}

fn sanitize(args: SanitizeArgs, config: &DevtoolsConfig) -> Result<()> {
    let sanitizer = Arc::new(config.build_sanitizer()?);

    if args.stream && !args.compress {
        // Raw text pass: the input never has to decode.
        let input = File::open(&args.input)
            .with_context(|| format!("opening {}", args.input.display()))?;
        let payload = read_payload(input)?;
        let mut output = create(&args.output)?;
        let bytes = sanitizer
            .sanitize_stream(payload.as_slice(), &mut output, config.sanitize.stream_buffer_size)
            .context("sanitizing stream")?;
        output.flush()?;
        tracing::debug!(bytes, "stream sanitize finished");
    } else {
        let envelope = read(&args.input, config)?;
        let mut options = ExportOptions {
            compress: args.compress,
            ..config.export_options(Some(sanitizer.clone()))
        };
        if args.stream {
            options.sanitize_mode = SanitizeMode::Stream {
                buffer_size: config.sanitize.stream_buffer_size,
            };
        }
        write_envelope_to(&envelope, create(&args.output)?, &options)?;
    }

    let stats = sanitizer.stats();
    println!(
        "redacted {} value(s) in {:?} -> {}",
        stats.redacted_count,
        stats.duration,
        args.output.display()
    );
    for (rule, count) in &stats.per_rule {
        println!("  {rule:<16} {count}");
    }
    Ok(())
}

fn preview(path: &Path, max_len: Option<usize>, config: &DevtoolsConfig) -> Result<()> {
    let sanitizer = config.build_sanitizer()?;
    let envelope = read(path, config)?;
    let mut options = config.sanitize_options(true);
    if let Some(max_len) = max_len {
        options.max_preview_len = max_len;
    }

    let SanitizeOutcome::Preview(report) = sanitizer.sanitize_with_options(&envelope, options)
    else {
        anyhow::bail!("dry run produced sanitized output");
    };

    let mut out = io::stdout().lock();
    for hit in &report.matches {
        writeln!(out, "{}  [{}]", hit.path, hit.rule_name)?;
        writeln!(out, "  - {}", hit.original)?;
        writeln!(out, "  + {}", hit.redacted_preview)?;
    }
    writeln!(out, "{} value(s) would be redacted", report.would_redact_count)?;
    Ok(())
}

fn merge(args: MergeArgs, config: &DevtoolsConfig) -> Result<()> {
    let import_options = config.import_options();

    let Envelope::Full(full) = read(&args.full, config)? else {
        anyhow::bail!("{} is not a full export", args.full.display());
    };
    let mut deltas = Vec::with_capacity(args.deltas.len());
    for path in &args.deltas {
        match read(path, config)? {
            Envelope::Delta(delta) => deltas.push(delta),
            Envelope::Full(_) => anyhow::bail!("{} is not an incremental export", path.display()),
        }
    }

    // Size every log for the whole chain so nothing is evicted mid-replay.
    let mut capacities = LogCapacities {
        state: full.state.as_ref().map_or(0, Vec::len),
        events: full.events.as_ref().map_or(0, Vec::len),
        commands: full.commands.as_ref().map_or(0, Vec::len),
    };
    for delta in &deltas {
        capacities.state += delta.new_state.len();
        capacities.events += delta.new_events.len();
        capacities.commands += delta.new_commands.len();
    }
    let capacities = LogCapacities {
        state: capacities.state.max(config.state_capacity),
        events: capacities.events.max(config.event_capacity),
        commands: capacities.commands.max(config.command_capacity),
    };

    let source_checkpoint = deltas
        .last()
        .map(|delta| delta.checkpoint.clone())
        .or_else(|| full.checkpoint.clone());

    let store = Store::new(capacities);
    store.import_data(full, &import_options)?;
    for (delta, path) in deltas.into_iter().zip(&args.deltas) {
        store
            .import_delta_data(delta, &import_options)
            .with_context(|| format!("replaying {}", path.display()))?;
    }

    let options = ExportOptions {
        compress: args.compress,
        ..config.export_options(None)
    };
    // Local numbers only describe the merge store; keep the source's marks.
    let (mut data, local) = store.build_export(&options);
    let checkpoint = source_checkpoint.unwrap_or(local);
    data.checkpoint = Some(checkpoint.clone());
    write_envelope_to(&Envelope::Full(data), create(&args.output)?, &options)?;

    println!(
        "merged {} delta(s) -> {} (events={} state={} commands={})",
        args.deltas.len(),
        args.output.display(),
        checkpoint.last_event_id,
        checkpoint.last_state_id,
        checkpoint.last_command_id
    );
    Ok(())
}
