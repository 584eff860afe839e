//! nsindex CLI
//!
//! Command-line front end for the namespace index:
//! - Ingest series lines and query them back
//! - Print a default configuration file

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use nsindex::config::{generate_default_config, Config, LoggingConfig};
use nsindex::index::{
    Id, InsertMode, NamespaceIndex, NamespaceMetadata, NamespaceOptions, OnIndexSeries, Query,
    QueryContext, QueryOptions, SeriesEntry, Tag, RESERVED_FIELD_NAME_ID,
};
use nsindex::segment::Filter;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Notify;
use tracing::Level;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "nsindex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Namespace series index")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index series from a file and query them back
    Ingest {
        /// Input file, one series per line: `id name=value ...` ("-" for stdin)
        #[arg(short, long)]
        file: String,
        /// Tag matcher in name=regex format; all must match
        #[arg(short = 'm', long = "match")]
        matchers: Vec<String>,
        /// Maximum number of series to return
        #[arg(short, long)]
        limit: Option<usize>,
        /// Wait for every write to be indexed before returning from it
        #[arg(long)]
        sync: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a default configuration file
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref(), std::io::stderr)?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Config => print!("{}", generate_default_config()),
        Commands::Ingest {
            file,
            matchers,
            limit,
            sync,
            json,
        } => {
            let filters = matchers
                .iter()
                .map(|m| parse_matcher(m))
                .collect::<anyhow::Result<Vec<_>>>()?;
            ingest(&config, &file, filters, limit, sync, json).await?;
        }
    }

    Ok(())
}

/// Load the config with a bootstrap subscriber in place
///
/// The configured subscriber depends on the config itself, so messages from
/// loading go through a plain stderr one.
fn load_config<W>(path: Option<&Path>, make_writer: W) -> anyhow::Result<Config>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();

    tracing::subscriber::with_default(bootstrap, || -> anyhow::Result<Config> {
        match path {
            Some(path) => {
                let config = Config::load_with_env(path)?;
                tracing::info!("Loaded config from {:?}", path);
                Ok(config)
            }
            None => Ok(Config::load_default()),
        }
    })
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("nsindex={}", logging.level)));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

/// Counts deliveries so async-mode ingest can wait for its writes
#[derive(Default)]
struct IngestProgress {
    indexed: AtomicUsize,
    finalized: AtomicUsize,
    notify: Notify,
}

impl OnIndexSeries for IngestProgress {
    fn on_index_success(&self, _ts: DateTime<Utc>) {
        self.indexed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_index_finalize(&self) {
        self.finalized.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

impl IngestProgress {
    async fn wait_finalized(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.finalized.load(Ordering::SeqCst) >= count {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Serialize)]
struct IngestReport {
    written: usize,
    indexed: usize,
    rejected: usize,
    exhaustive: bool,
    series: Vec<SeriesEntry>,
}

async fn ingest(
    config: &Config,
    file: &str,
    filters: Vec<Filter>,
    limit: Option<usize>,
    sync: bool,
    json: bool,
) -> anyhow::Result<()> {
    let input = read_input(file).await?;

    let mut opts = config.index.to_options();
    if sync {
        opts.insert_mode = InsertMode::Sync;
    }
    let md = NamespaceMetadata::new(config.index.namespace.as_str(), NamespaceOptions::default())?;
    let index = NamespaceIndex::open(md, opts)?;
    let progress = Arc::new(IngestProgress::default());

    let mut written = 0;
    let mut rejected = 0;
    for (lineno, line) in input.lines().enumerate() {
        let Some((id, tags)) =
            parse_series_line(line).with_context(|| format!("{}:{}", file, lineno + 1))?
        else {
            continue;
        };

        match index.write(&id, &tags, progress.clone()).await {
            Ok(()) => written += 1,
            Err(e) => {
                tracing::warn!(line = lineno + 1, series = %id, error = %e, "Series rejected");
                rejected += 1;
            }
        }
    }

    // Rejected writes are finalized too
    progress.wait_finalized(written + rejected).await;
    tracing::info!(written, rejected, "Ingest complete");

    // Without matchers, list every series
    let filters = if filters.is_empty() {
        vec![Filter::regexp(RESERVED_FIELD_NAME_ID, ".*")]
    } else {
        filters
    };
    let opts = QueryOptions { limit };
    let results = index
        .query(&QueryContext::new(), Query::and(filters), opts)
        .await?;
    let exhaustive = results.exhaustive;
    let series = results.iter.collect_series()?;

    index.close().await?;

    let report = IngestReport {
        written,
        indexed: progress.indexed.load(Ordering::SeqCst),
        rejected,
        exhaustive,
        series,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for entry in &report.series {
            println!("{}", format_series(entry));
        }
        println!(
            "{} series matched{} ({} written, {} indexed, {} rejected)",
            report.series.len(),
            if report.exhaustive { "" } else { " (truncated)" },
            report.written,
            report.indexed,
            report.rejected
        );
    }

    Ok(())
}

async fn read_input(file: &str) -> anyhow::Result<String> {
    if file == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("reading stdin")?;
        Ok(buf)
    } else {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("reading {}", file))
    }
}

/// Parse `id name=value ...`; blank lines and `#` comments yield `None`
fn parse_series_line(line: &str) -> anyhow::Result<Option<(Id, Vec<Tag>)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let id = match parts.next() {
        Some(id) => Id::from(id),
        None => return Ok(None),
    };

    let mut tags = Vec::new();
    for part in parts {
        match part.split_once('=') {
            Some((name, value)) => tags.push(Tag::new(name, value)),
            None => bail!("tag {:?} is not in name=value format", part),
        }
    }

    Ok(Some((id, tags)))
}

/// Parse a `name=regex` matcher
fn parse_matcher(s: &str) -> anyhow::Result<Filter> {
    match s.split_once('=') {
        Some((name, pattern)) if !name.is_empty() => Ok(Filter::regexp(name, pattern)),
        _ => bail!("matcher {:?} is not in name=regex format", s),
    }
}

fn format_series(entry: &SeriesEntry) -> String {
    let tags: Vec<String> = entry
        .tags
        .iter()
        .map(|t| format!("{}={}", t.name, t.value))
        .collect();
    format!("{} {}", entry.id, tags.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;

    /// Log sink shared with the test
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_load_config_logs_before_tracing_init() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[index]\nnamespace = \"metrics\"").unwrap();

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let config = load_config(Some(file.path()), move || writer.clone()).unwrap();
        assert_eq!(config.index.namespace, "metrics");

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("Loaded config from"), "captured: {:?}", output);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Some(Path::new("/nonexistent/nsindex.toml")), std::io::sink);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_series_line() {
        let (id, tags) = parse_series_line("cpu.web-01 host=web-01 dc=east")
            .unwrap()
            .unwrap();
        assert_eq!(id.to_string(), "cpu.web-01");
        assert_eq!(tags, vec![Tag::new("host", "web-01"), Tag::new("dc", "east")]);

        assert!(parse_series_line("").unwrap().is_none());
        assert!(parse_series_line("  # comment").unwrap().is_none());
        assert!(parse_series_line("cpu hostweb").is_err());

        // Values may contain '='
        let (_, tags) = parse_series_line("q expr=a=b").unwrap().unwrap();
        assert_eq!(tags, vec![Tag::new("expr", "a=b")]);
    }

    #[test]
    fn test_parse_matcher() {
        assert_eq!(parse_matcher("host=web-.*").unwrap(), Filter::regexp("host", "web-.*"));
        assert!(parse_matcher("host").is_err());
        assert!(parse_matcher("=x").is_err());
    }

    #[test]
    fn test_format_series() {
        let entry = SeriesEntry {
            namespace: Id::from("default"),
            id: Id::from("foo"),
            tags: vec![Tag::new("name", "value")],
        };
        assert_eq!(format_series(&entry), "foo name=value");
    }

    #[tokio::test]
    async fn test_progress_wait() {
        let progress = Arc::new(IngestProgress::default());
        let waiter = {
            let progress = Arc::clone(&progress);
            tokio::spawn(async move { progress.wait_finalized(2).await })
        };

        progress.on_index_finalize();
        progress.on_index_finalize();
        waiter.await.unwrap();
        assert_eq!(progress.finalized.load(Ordering::SeqCst), 2);
    }
}
