//! CLI entry point for `postbox`.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};

use postbox::builder;
use postbox::config::Config;
use postbox::negotiate;
use postbox::store::{EmailStore, MemoryStore, StoredEmail};

#[derive(Parser)]
#[command(
    name = "postbox",
    version,
    about = "Decode raw email messages and serve them by content negotiation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest message files and summarize the resulting records
    Receive {
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
        /// Collapse byte-identical messages into one record
        #[arg(long)]
        dedup: bool,
    },
    /// Negotiate a representation of a message and print it
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Accept header value
        #[arg(long, env = "POSTBOX_ACCEPT", value_name = "VALUE")]
        accept: Option<String>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = postbox::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Receive { files, json, dedup } => cmd_receive(&files, json, dedup, &config),
        Commands::Render { file, accept } => cmd_render(&file, accept.as_deref(), &config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and a log file in the cache directory.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = postbox::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "postbox.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "postbox", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}

/// Ingest each file into an in-memory store and print what was stored.
fn cmd_receive(files: &[PathBuf], json: bool, dedup: bool, config: &Config) -> anyhow::Result<()> {
    let decoder = config.parser.decoder();
    let mut store = if dedup {
        MemoryStore::deduplicating()
    } else {
        MemoryStore::new()
    };

    for path in files {
        let raw = builder::read_source(path, config.parser.max_message_size)?;
        let record = builder::ingest_with(&decoder, &raw, chrono::Utc::now())
            .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
        store.insert(record)?;
    }

    let stored: Vec<&StoredEmail> = store.iter().collect();

    if json {
        print_records_json(&stored)?;
    } else {
        print_records_table(&stored);
        if stored.len() < files.len() {
            println!(
                "  {} duplicate message(s) skipped",
                files.len() - stored.len()
            );
            println!();
        }
    }
    Ok(())
}

/// Negotiate against `accept` and print the chosen body.
fn cmd_render(path: &Path, accept: Option<&str>, config: &Config) -> anyhow::Result<()> {
    let raw = builder::read_source(path, config.parser.max_message_size)?;
    let record = builder::ingest_with(&config.parser.decoder(), &raw, chrono::Utc::now())?;

    let accept = config.render.accept(accept);
    let rendered = negotiate::render(&record, accept);
    if !rendered.is_success() {
        anyhow::bail!(
            "406 Not Acceptable: none of html={}, text={}, raw matches '{}'",
            record.has_html(),
            record.has_text(),
            accept.unwrap_or("*/*")
        );
    }

    if let Some(content_type) = &rendered.content_type {
        eprintln!("Content-Type: {content_type}");
    }
    let mut out = std::io::stdout();
    out.write_all(rendered.body.as_bytes())?;
    if !rendered.body.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Print stored records in a human-readable layout.
fn print_records_table(stored: &[&StoredEmail]) {
    println!();
    println!("  {} message(s)", stored.len());

    for entry in stored {
        let record = &entry.record;
        let from = if record.sender.name.is_empty() {
            record.sender.email.clone()
        } else {
            format!("{} <{}>", record.sender.name, record.sender.email)
        };
        let to: Vec<String> = record.recipients.iter().map(|a| a.to_string()).collect();
        let date = record
            .sent_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!();
        println!("  {:<14} {}", "Id", entry.id);
        println!("  {:<14} {}", "Subject", record.subject);
        println!("  {:<14} {}", "From", from);
        println!("  {:<14} {}", "To", to.join(", "));
        println!("  {:<14} {}", "Date", date);
        println!("  {:<14} {}", "HTML body", yes_no(record.has_html()));
        println!("  {:<14} {}", "Text body", yes_no(record.has_text()));
        println!(
            "  {:<14} {} ({})",
            "Attachments",
            record.attachments.len(),
            format_size(record.attachments_size(), BINARY)
        );
        for att in &record.attachments {
            println!(
                "    {:<40} {:<30} {:>10}",
                att.file_name,
                att.content_type,
                format_size(att.size_in_bytes, BINARY)
            );
        }
    }
    println!();
}

/// Print stored records as JSON.
fn print_records_json(stored: &[&StoredEmail]) -> anyhow::Result<()> {
    let items: Vec<serde_json::Value> = stored
        .iter()
        .map(|entry| {
            let r = &entry.record;
            serde_json::json!({
                "id": entry.id,
                "subject": r.subject,
                "from": r.sender,
                "inbox": r.inbox,
                "to": r.recipients,
                "message_id": r.message_id,
                "sent_at": r.sent_at.map(|d| d.to_rfc3339()),
                "received_at": r.received_at.to_rfc3339(),
                "has_html": r.has_html(),
                "has_text": r.has_text(),
                "size": r.raw_source.len(),
                "fingerprint": r.fingerprint(),
                "attachments": r.attachments,
            })
        })
        .collect();

    let output = serde_json::json!({
        "message_count": stored.len(),
        "messages": items,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
