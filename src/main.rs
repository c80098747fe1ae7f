//! CLI entry point for `mailrelay`.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};

use mailrelay::config::{self, Config};
use mailrelay::i18n;
use mailrelay::relay::{self, RelayOptions};
use mailrelay::sink::open_sink;
use mailrelay::source::open_source;
use mailrelay::split::{BreakerSkip, Splitter, DEFAULT_MAX_LENGTH};
use mailrelay::state::StateStore;

#[derive(Parser)]
#[command(name = "mailrelay", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (overrides $MAILRELAY_CONFIG)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new messages and deliver them (one batch)
    Run {
        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the chunks a text would be split into
    Split {
        /// Text file to split; reads stdin when omitted
        path: Option<PathBuf>,
        /// Longest chunk, in characters
        #[arg(short = 'n', long, default_value_t = DEFAULT_MAX_LENGTH)]
        max_length: usize,
        /// Breaker, highest priority first (repeatable; defaults to newline and ", ")
        #[arg(short, long = "breaker", value_name = "TEXT")]
        breakers: Vec<String>,
        /// Drop the whole breaker instead of its first character
        #[arg(long)]
        full_breaker: bool,
    },
    /// Pack one .eml message into a ZIP archive
    Pack {
        /// Raw RFC 5322 message
        path: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Sequence id used to name unnamed parts
        #[arg(long, default_value_t = 0)]
        id: u64,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// Build a localized clap Command using i18n strings.
fn build_localized_command() -> clap::Command {
    let mut cmd = Cli::command();
    cmd = cmd
        .about(i18n::app_about())
        .long_about(i18n::app_long_about());

    let subcommands: Vec<clap::Command> = cmd
        .get_subcommands()
        .map(|sub| {
            let s = sub.clone();
            match s.get_name() {
                "run" => s.about(i18n::help_cmd_run()),
                "split" => s.about(i18n::help_cmd_split()),
                "pack" => s.about(i18n::help_cmd_pack()),
                "completions" => s.about(i18n::help_cmd_completions()),
                "manpage" => s.about(i18n::help_cmd_manpage()),
                _ => s,
            }
        })
        .collect();

    let mut cmd = cmd.mut_arg("verbose", |a| a.help(i18n::help_verbose()));
    cmd = cmd.mut_arg("config", |a| a.help(i18n::help_config()));
    for sub in subcommands {
        let name = sub.get_name().to_string();
        cmd = cmd.mut_subcommand(name, |_| sub);
    }
    cmd
}

fn main() -> anyhow::Result<()> {
    // Detect language BEFORE clap parsing so --help is localized
    i18n::set_lang(i18n::detect_system_lang());

    let cmd = build_localized_command();
    let matches = cmd.get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let config = config::load_config(cli.config.as_deref())?;

    // Configure logging: stderr + log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Run { json } => cmd_run(&config, json),
        Commands::Split {
            path,
            max_length,
            breakers,
            full_breaker,
        } => cmd_split(path.as_deref(), max_length, breakers, full_breaker),
        Commands::Pack { path, output, id } => cmd_pack(&config, &path, &output, id),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_target = log_path
        .parent()
        .zip(log_path.file_name())
        .filter(|(dir, _)| std::fs::create_dir_all(dir).is_ok());

    if let Some((log_dir, file_name)) = log_target {
        let file_appender = tracing_appender::rolling::never(log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Caption language: config first, then the detected system language.
fn caption_lang(config: &Config) -> i18n::Lang {
    config
        .general
        .lang
        .as_deref()
        .and_then(i18n::Lang::from_code)
        .unwrap_or_else(i18n::lang)
}

/// Run one relay batch.
fn cmd_run(config: &Config, json: bool) -> anyhow::Result<()> {
    config.validate()?;

    let mut source = open_source(&config.source)?;
    let mut sink = open_sink(&config.delivery)?;
    let state = StateStore::new(config::state_file_path(config));
    let options = RelayOptions::from_config(config, caption_lang(config));

    let report = relay::run_batch(source.as_mut(), &state, sink.as_mut(), &options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {}", i18n::cli_delivered(), report.delivered.len());
        println!("{}: {}", i18n::cli_failed(), report.failed.len());
        println!("{}: {}", i18n::cli_last_seen(), report.last_seen_id);
    }

    if !report.failed.is_empty() {
        anyhow::bail!("{} message(s) failed: {:?}", report.failed.len(), report.failed);
    }
    Ok(())
}

/// Split a file (or stdin) and print the chunks.
fn cmd_split(
    path: Option<&Path>,
    max_length: usize,
    breakers: Vec<String>,
    full_breaker: bool,
) -> anyhow::Result<()> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            text
        }
    };

    let mut splitter = Splitter::new(max_length);
    if !breakers.is_empty() {
        splitter = splitter.with_breakers(breakers);
    }
    if full_breaker {
        splitter = splitter.with_skip(BreakerSkip::FullBreaker);
    }

    let chunks = splitter.split(&text);
    for (i, chunk) in chunks.iter().enumerate() {
        println!(
            "----- {} {}/{} ({}) -----",
            i18n::cli_chunk(),
            i + 1,
            chunks.len(),
            chunk.chars().count()
        );
        println!("{chunk}");
    }
    Ok(())
}

/// Pack one raw message into `<output>/<name>.zip`.
fn cmd_pack(config: &Config, path: &Path, output: &Path, id: u64) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let raw = std::fs::read(path)?;
    let packed = relay::pack_message(id, &raw, config.general.spool_dir.as_deref())?;
    let entries = packed.archive.entries().to_vec();
    let dest = packed.archive.persist_into(output)?;

    println!("{}: {}", i18n::cli_archive_written(), dest.display());
    for entry in entries {
        println!("  {entry}");
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailrelay", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
