use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use iris_client::{CssExtractor, JsonFileSink, ReqwestFetcher};
use iris_core::models::{BatchResult, Record, Target};
use iris_core::traits::{BatchRunner, Extractor, Fetcher};
use iris_core::{
    Acquisition, BatchConsumer, DeliveryBridge, ExtractionSchema, Poller, PollerConfig,
    TargetSource,
};

const PREVIEW_ROWS: usize = 5;
const PREVIEW_FIELDS: usize = 3;

#[derive(Parser)]
#[command(name = "iris", version, about = "Scheduled structured-data extractor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch on a fixed interval until Ctrl+C
    Watch {
        #[command(flatten)]
        acquire: AcquireArgs,

        /// Seconds between batches
        #[arg(long, env = "IRIS_INTERVAL_SECS", default_value_t = 600)]
        interval: u64,

        /// Seconds to wait after a failed batch (defaults to the interval)
        #[arg(long, env = "IRIS_BACKOFF_SECS")]
        backoff: Option<u64>,
    },

    /// Run a single batch and print it as JSON
    Once {
        #[command(flatten)]
        acquire: AcquireArgs,
    },

    /// Extract records from a local HTML file
    Extract {
        /// Path to the extraction schema (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// HTML document to extract from
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Args)]
struct AcquireArgs {
    /// Path to the extraction schema (JSON)
    #[arg(short, long)]
    schema: PathBuf,

    /// Page to fetch (repeatable)
    #[arg(short, long)]
    url: Vec<String>,

    /// File with one URL per line, re-read before every batch
    #[arg(short, long, conflicts_with_all = ["url", "template"])]
    targets: Option<PathBuf>,

    /// URL template with a `{}` placeholder, expanded once per --code
    #[arg(long, requires = "code", conflicts_with = "url")]
    template: Option<String>,

    /// Code substituted into --template (repeatable)
    #[arg(long)]
    code: Vec<String>,

    /// Maximum number of pages fetched at once
    #[arg(short, long, env = "IRIS_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Directory for the JSON file written after each successful batch
    #[arg(short, long, env = "IRIS_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Per-page timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Render pages in headless Chromium (requires the `browser` feature)
    #[arg(long, default_value_t = false)]
    browser: bool,

    /// Scroll each page to the bottom before reading it (browser only)
    #[arg(long, default_value_t = false, requires = "browser")]
    scan_full_page: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("iris=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            acquire,
            interval,
            backoff,
        } => {
            let interval = Duration::from_secs(interval);
            let config = PollerConfig::default()
                .with_interval(interval)
                .with_error_backoff(backoff.map_or(interval, Duration::from_secs))
                .with_concurrency_limit(acquire.concurrency);
            config.validate()?;

            if acquire.browser {
                #[cfg(feature = "browser")]
                return cmd_watch(browser_fetcher(&acquire), &acquire, config).await;
                #[cfg(not(feature = "browser"))]
                anyhow::bail!(BROWSER_DISABLED);
            }
            cmd_watch(http_fetcher(&acquire)?, &acquire, config).await?;
        }
        Commands::Once { acquire } => {
            if acquire.browser {
                #[cfg(feature = "browser")]
                return cmd_once(browser_fetcher(&acquire), &acquire).await;
                #[cfg(not(feature = "browser"))]
                anyhow::bail!(BROWSER_DISABLED);
            }
            cmd_once(http_fetcher(&acquire)?, &acquire).await?;
        }
        Commands::Extract { schema, file } => {
            cmd_extract(&schema, &file).await?;
        }
    }

    Ok(())
}

#[cfg(not(feature = "browser"))]
const BROWSER_DISABLED: &str =
    "--browser needs a build with browser support (cargo build --features browser)";

fn http_fetcher(args: &AcquireArgs) -> Result<ReqwestFetcher> {
    ReqwestFetcher::with_timeout(Duration::from_secs(args.timeout))
        .context("Failed to create HTTP client")
}

#[cfg(feature = "browser")]
fn browser_fetcher(args: &AcquireArgs) -> iris_client::BrowserFetcher {
    let fetcher = iris_client::BrowserFetcher::with_timeout(Duration::from_secs(args.timeout));
    if args.scan_full_page {
        fetcher.scan_full_page(Duration::from_millis(500))
    } else {
        fetcher
    }
}

fn target_source(args: &AcquireArgs) -> Result<TargetSource> {
    if let Some(path) = &args.targets {
        return Ok(TargetSource::File(path.clone()));
    }
    if let Some(template) = &args.template {
        return Ok(TargetSource::from_template(template, &args.code)?);
    }
    if args.url.is_empty() {
        anyhow::bail!("No targets: pass --url, --targets or --template with --code");
    }
    Ok(TargetSource::Static(
        args.url.iter().map(Target::url).collect(),
    ))
}

fn build_acquisition<F: Fetcher>(
    fetcher: F,
    args: &AcquireArgs,
) -> Result<Acquisition<F, CssExtractor, JsonFileSink>> {
    let schema = ExtractionSchema::load(&args.schema)?;
    let acquisition = Acquisition::with_sink(
        target_source(args)?,
        schema,
        fetcher,
        CssExtractor::new(),
        JsonFileSink::new(&args.output_dir),
        args.concurrency,
    )?;
    Ok(acquisition)
}

async fn cmd_watch<F: Fetcher>(fetcher: F, args: &AcquireArgs, config: PollerConfig) -> Result<()> {
    let acquisition = build_acquisition(fetcher, args)?;
    let schema_name = acquisition.schema().name.clone();
    let interval = config.interval;

    let (tx, rx) = DeliveryBridge::channel(config.delivery_capacity);
    let poller = Poller::new(acquisition, config, tx);
    let consumer = tokio::spawn(rx.run(ConsoleConsumer::new(interval)));

    println!("{}", "=".repeat(60));
    println!("Iris watching '{schema_name}'");
    println!("Updating every {}; press Ctrl+C to stop", describe(interval));
    println!("{}", "=".repeat(60));

    poller.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    println!("\nStopping, waiting for the current batch to finish...");

    poller.stop();
    poller.stopped().await;
    drop(poller);

    let consumer = consumer.await.context("Console consumer panicked")?;
    println!("Stopped after {} runs", consumer.runs);
    Ok(())
}

async fn cmd_once<F: Fetcher>(fetcher: F, args: &AcquireArgs) -> Result<()> {
    let batch = build_acquisition(fetcher, args)?.run_batch().await?;

    println!("{}", serde_json::to_string_pretty(&batch)?);

    if !batch.success() {
        anyhow::bail!(
            "Batch failed: {}",
            batch.error().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn cmd_extract(schema_path: &Path, file: &Path) -> Result<()> {
    let records = extract_document(schema_path, file).await?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// Run the schema over a local document. Nothing is fetched.
async fn extract_document(schema_path: &Path, file: &Path) -> Result<Vec<Record>> {
    let schema = ExtractionSchema::load(schema_path)?;
    let html = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read document: {}", file.display()))?;

    let records = CssExtractor::new()
        .extract(&html, &schema)
        .with_context(|| format!("Extraction failed for {}", file.display()))?;
    Ok(records)
}

/// Prints every delivered batch to stdout.
struct ConsoleConsumer {
    runs: usize,
    interval: Duration,
}

impl ConsoleConsumer {
    fn new(interval: Duration) -> Self {
        Self { runs: 0, interval }
    }
}

impl BatchConsumer for ConsoleConsumer {
    fn on_batch_delivered(&mut self, batch: BatchResult) {
        self.runs += 1;
        let time = batch.timestamp().with_timezone(&chrono::Local);

        println!("\n{}", "=".repeat(60));
        println!("Run #{} - {}", self.runs, time.format("%Y-%m-%d %H:%M:%S"));
        println!("{}", "=".repeat(60));

        if batch.success() {
            println!("Fetched {} records", batch.count());
            if let Some(path) = batch.saved_to() {
                println!("Saved to: {}", path.display());
            }
            for failure in batch.failures() {
                println!("  failed: {} ({})", failure.target, failure.error);
            }
            for line in preview(batch.records()) {
                println!("{line}");
            }
        } else {
            println!(
                "Fetch failed: {}",
                batch.error().unwrap_or("unknown error")
            );
        }

        println!("\nNext update in {}", describe(self.interval));
    }
}

/// First rows of a batch, each showing its first few fields.
fn preview(records: &[Record]) -> Vec<String> {
    let mut lines: Vec<String> = records
        .iter()
        .take(PREVIEW_ROWS)
        .enumerate()
        .map(|(i, record)| {
            let fields: Vec<String> = record
                .iter()
                .take(PREVIEW_FIELDS)
                .map(|(k, v)| match v.as_str() {
                    Some(s) => format!("{k}: {s}"),
                    None => format!("{k}: {v}"),
                })
                .collect();
            format!("  {}. {}", i + 1, fields.join(" | "))
        })
        .collect();
    if records.len() > PREVIEW_ROWS {
        lines.push(format!("  ... and {} more", records.len() - PREVIEW_ROWS));
    }
    lines
}

fn describe(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{} minutes", secs / 60)
    } else {
        format!("{secs} seconds")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn args(extra: &[&str]) -> AcquireArgs {
        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            acquire: AcquireArgs,
        }
        let mut argv = vec!["iris", "--schema", "schema.json"];
        argv.extend_from_slice(extra);
        Wrapper::try_parse_from(argv).unwrap().acquire
    }

    fn row(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn urls_become_static_targets() {
        let source = target_source(&args(&["--url", "https://a", "--url", "https://b"])).unwrap();
        let TargetSource::Static(targets) = source else {
            panic!("expected static targets");
        };
        assert_eq!(targets, vec![Target::url("https://a"), Target::url("https://b")]);
    }

    #[test]
    fn template_expands_codes() {
        let source = target_source(&args(&[
            "--template",
            "https://example.com/stock/{}/technical-chart",
            "--code",
            "2330",
            "--code",
            "0050",
        ]))
        .unwrap();
        let TargetSource::Static(targets) = source else {
            panic!("expected static targets");
        };
        assert_eq!(targets[1], Target::url("https://example.com/stock/0050/technical-chart"));
    }

    #[test]
    fn targets_file_is_reread_source() {
        let source = target_source(&args(&["--targets", "pages.txt"])).unwrap();
        assert!(matches!(source, TargetSource::File(_)));
    }

    #[test]
    fn no_targets_is_an_error() {
        assert!(target_source(&args(&[])).is_err());
    }

    #[test]
    fn preview_shows_five_rows_and_three_fields() {
        let records: Vec<Record> = (0..7)
            .map(|i| {
                let n = i.to_string();
                row(&[("a", n.as_str()), ("b", "x"), ("c", "y"), ("d", "hidden")])
            })
            .collect();

        let lines = preview(&records);

        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "  1. a: 0 | b: x | c: y");
        assert_eq!(lines[5], "  ... and 2 more");
    }

    #[tokio::test]
    async fn extracts_local_document() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("rates.json");
        let page = dir.path().join("rates.html");
        std::fs::write(
            &schema,
            r#"{"name": "rates", "baseSelector": "tr",
                "fields": [{"name": "currency", "selector": "td", "type": "text"}]}"#,
        )
        .unwrap();
        std::fs::write(
            &page,
            "<table><tr><th>Currency</th></tr><tr><td>USD</td></tr><tr><td>JPY</td></tr></table>",
        )
        .unwrap();

        let records = extract_document(&schema, &page).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["currency"], "JPY");
    }

    #[tokio::test]
    async fn missing_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("rates.json");
        std::fs::write(
            &schema,
            r#"{"name": "rates", "baseSelector": "tr",
                "fields": [{"name": "currency", "selector": "td", "type": "text"}]}"#,
        )
        .unwrap();

        let err = extract_document(&schema, &dir.path().join("missing.html"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Failed to read document"));
    }

    #[test]
    fn describes_intervals() {
        assert_eq!(describe(Duration::from_secs(600)), "10 minutes");
        assert_eq!(describe(Duration::from_secs(45)), "45 seconds");
    }
}
