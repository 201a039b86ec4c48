//! CLI binary for invoice-extract.
//!
//! A thin shim over the library crate: each subcommand opens the record
//! store, maps flags onto library types and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use invoice_extract::{
    build_tables, default_field_configs, load_input, write_csv, write_xlsx, ApiConfig,
    FieldConfig, FileSnapshot, HttpExtractionClient, InvoiceProcessor, InvoiceRecord,
    PdfiumRasterizer, PipelineConfig, ProcessingObserver, RecordStatus, RecordStore,
    SUPERSEDED_MESSAGE,
};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal observer: one bar over the batch plus a log line per finished
/// file. Files finish out of order, so every line names its file.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ProcessingObserver for CliObserver {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} file(s)…"))
        ));
    }

    fn on_file_start(&self, _id: &str, file_name: &str) {
        self.bar.set_message(file_name.to_string());
    }

    fn on_pages_rasterized(&self, _id: &str, page_count: usize) {
        self.bar.set_message(format!("{page_count} page(s) → model"));
    }

    fn on_file_complete(&self, id: &str, file_name: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            file_name,
            dim(id)
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, _id: &str, file_name: &str, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), file_name, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_files.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} file(s) extracted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) extracted  ({} failed)",
                if failed == total_files {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a batch of invoices with the stored schema and endpoint
  invoice-extract process inv-001.pdf inv-002.pdf

  # Point at an OpenAI-compatible endpoint first
  invoice-extract api --base-url https://api.openai.com/v1 --model gpt-4.1-mini --api-key sk-...

  # Route model calls through a local proxy
  invoice-extract serve-proxy --listen 127.0.0.1:3001 &
  invoice-extract process --proxy-url http://127.0.0.1:3001/llm-proxy invoice.pdf

  # Inspect and export
  invoice-extract list
  invoice-extract export --format xlsx --output invoices.xlsx

  # Replace the field schema
  invoice-extract fields > fields.json
  invoice-extract fields --set fields.json

ENVIRONMENT VARIABLES:
  INVOICE_STORE_DIR   Directory holding invoice-processor-state.json
  INVOICE_API_KEY     API key for `invoice-extract api`
  PDFIUM_LIB_PATH     Path to libpdfium (file or directory); else the system library
  RUST_LOG            Override log filter (e.g. invoice_extract=debug)
"#;

/// Extract structured invoice data from PDFs with a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-extract",
    version,
    about = "Extract structured invoice data from PDFs with a vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory of the record store snapshot.
    #[arg(long, global = true, env = "INVOICE_STORE_DIR")]
    store: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the extraction pipeline on local files or URLs.
    Process {
        /// PDF file paths or HTTP/HTTPS URLs.
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Render scale relative to 72 dpi (0.5–4.0).
        #[arg(long, default_value_t = 2.0)]
        scale: f32,

        /// Send model requests through this proxy endpoint.
        #[arg(long, env = "INVOICE_PROXY_URL")]
        proxy_url: Option<String>,

        /// Extra attempts for 429/5xx/transport failures of the model call.
        #[arg(long, default_value_t = 0)]
        max_retries: u32,

        /// Files processed at once.
        #[arg(short, long, default_value_t = 4)]
        concurrency: usize,

        /// HTTP download timeout in seconds for URL inputs.
        #[arg(long, default_value_t = 120)]
        download_timeout: u64,

        /// Disable progress bar.
        #[arg(long)]
        no_progress: bool,
    },

    /// List stored records.
    List {
        /// Print the records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print one record as JSON.
    Show { id: String },

    /// Delete one record.
    Remove { id: String },

    /// Export completed records.
    Export {
        #[arg(long, value_enum, default_value = "xlsx")]
        format: ExportFormat,

        /// Workbook path (xlsx) or output directory (csv).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print or replace the field schema.
    Fields {
        /// JSON file holding a FieldConfig array.
        #[arg(long, conflicts_with = "reset")]
        set: Option<PathBuf>,

        /// Restore the stock invoice schema.
        #[arg(long)]
        reset: bool,
    },

    /// Print or update the model endpoint settings.
    Api {
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long, env = "INVOICE_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Remove the stored API key.
        #[arg(long, conflicts_with = "api_key")]
        clear_api_key: bool,
    },

    /// Run the model request proxy.
    ServeProxy {
        #[arg(long, default_value = "127.0.0.1:3001")]
        listen: SocketAddr,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportFormat {
    Csv,
    Xlsx,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = matches!(
        cli.command,
        Command::Process {
            no_progress: false,
            ..
        }
    ) && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let store_dir = cli.store.clone().unwrap_or_else(default_store_dir);

    match cli.command {
        Command::Process {
            inputs,
            scale,
            proxy_url,
            max_retries,
            concurrency,
            download_timeout,
            no_progress: _,
        } => {
            let store = open_store(&store_dir);
            let mut builder = PipelineConfig::builder()
                .scale(scale)
                .concurrency(concurrency)
                .max_retries(max_retries);
            if show_progress && !cli.verbose {
                builder = builder.observer(CliObserver::new() as Arc<dyn ProcessingObserver>);
            }
            let config = builder.build().context("Invalid configuration")?;

            // Unreadable inputs never reach the store.
            let mut files = Vec::with_capacity(inputs.len());
            for input in &inputs {
                match load_input(input, download_timeout).await {
                    Ok(file) => files.push(file),
                    Err(e) => eprintln!("{} {}  {}", red("✗"), input, red(&e.to_string())),
                }
            }
            let unreadable = inputs.len() - files.len();

            let processor = InvoiceProcessor::new(
                store,
                Arc::new(PdfiumRasterizer::new()),
                Arc::new(HttpExtractionClient::new(proxy_url)),
            )
            .with_config(config);
            let outcomes = processor.process_files(files).await;

            if !show_progress && !cli.quiet {
                for o in &outcomes {
                    match &o.error {
                        None => println!("{}  {}  {} page(s)", o.id, o.file_name, o.page_count),
                        // The superseded run's id no longer names a record.
                        Some(e) if e == SUPERSEDED_MESSAGE => eprintln!("-  {}  {}", o.file_name, e),
                        Some(e) => eprintln!("{}  {}  {}", o.id, o.file_name, e),
                    }
                }
            }

            let failed = outcomes
                .iter()
                .filter(|o| o.status == RecordStatus::Error)
                .count()
                + unreadable;
            if failed > 0 {
                anyhow::bail!("{} of {} input(s) failed", failed, inputs.len());
            }
        }

        Command::List { json } => {
            let invoices = open_store(&store_dir).invoices();
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&invoices).context("Failed to serialise records")?
                );
            } else {
                print_records(&invoices);
            }
        }

        Command::Show { id } => {
            let record = open_store(&store_dir)
                .get(&id)
                .with_context(|| format!("No record with id '{id}'"))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&record).context("Failed to serialise record")?
            );
        }

        Command::Remove { id } => {
            if !open_store(&store_dir).remove_invoice(&id) {
                anyhow::bail!("No record with id '{id}'");
            }
            if !cli.quiet {
                eprintln!("{} removed {}", green("✔"), id);
            }
        }

        Command::Export { format, output } => {
            let state = open_store(&store_dir).snapshot();
            let tables = build_tables(&state.invoices, &state.field_configs);
            let exported = tables[0].rows.len();

            let target = match format {
                ExportFormat::Csv => {
                    let dir = output.unwrap_or_else(|| PathBuf::from("."));
                    write_csv(&tables, &dir).context("CSV export failed")?;
                    dir
                }
                ExportFormat::Xlsx => {
                    let path = output.unwrap_or_else(|| PathBuf::from("invoice_export.xlsx"));
                    write_xlsx(&tables, &path).context("Excel export failed")?;
                    path
                }
            };
            if !cli.quiet {
                eprintln!(
                    "{} {} invoice(s)  →  {}",
                    green("✔"),
                    exported,
                    bold(&target.display().to_string())
                );
            }
        }

        Command::Fields { set, reset } => {
            let store = open_store(&store_dir);
            if let Some(path) = set {
                let raw = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read field schema from {:?}", path))?;
                let fields: Vec<FieldConfig> =
                    serde_json::from_str(&raw).context("Field schema is not valid JSON")?;
                store
                    .set_field_configs(fields)
                    .context("Field schema rejected")?;
            } else if reset {
                store
                    .set_field_configs(default_field_configs())
                    .context("Field schema rejected")?;
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&store.field_configs())
                    .context("Failed to serialise field schema")?
            );
        }

        Command::Api {
            base_url,
            model,
            max_tokens,
            temperature,
            api_key,
            clear_api_key,
        } => {
            let store = open_store(&store_dir);
            let current = store.api_config();
            let changed = base_url.is_some()
                || model.is_some()
                || max_tokens.is_some()
                || temperature.is_some()
                || api_key.is_some()
                || clear_api_key;

            if changed {
                let updated = ApiConfig {
                    base_url: base_url.unwrap_or(current.base_url),
                    model: model.unwrap_or(current.model),
                    max_tokens: max_tokens.unwrap_or(current.max_tokens),
                    temperature: temperature.unwrap_or(current.temperature),
                    api_key: if clear_api_key {
                        None
                    } else {
                        api_key.or(current.api_key)
                    },
                };
                store.set_api_config(updated).context("API settings rejected")?;
            }
            print_api_config(&store.api_config());
        }

        Command::ServeProxy { listen } => {
            if !cli.quiet {
                eprintln!("{} proxy on http://{}/llm-proxy", cyan("◆"), listen);
            }
            invoice_extract::proxy::serve(listen)
                .await
                .context("Proxy server failed")?;
        }
    }

    Ok(())
}

/// `<data dir>/invoice-extract`, or the working directory when the platform
/// has no data dir.
fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("invoice-extract"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn open_store(dir: &Path) -> Arc<RecordStore> {
    Arc::new(RecordStore::load(FileSnapshot::in_dir(dir)))
}

fn print_records(invoices: &[InvoiceRecord]) {
    if invoices.is_empty() {
        eprintln!("{}", dim("No records."));
        return;
    }
    for r in invoices {
        let status = match r.status {
            RecordStatus::Completed => green("completed "),
            RecordStatus::Processing => cyan("processing"),
            RecordStatus::Error => red("error     "),
        };
        println!(
            "{}  {}  {:>3}p  {}  {}",
            r.id,
            status,
            r.page_count,
            dim(&r.processed_at.format("%Y-%m-%d %H:%M").to_string()),
            r.file_name
        );
        if let Some(ref e) = r.error_message {
            println!("    {}", red(e));
        }
    }
}

fn print_api_config(api: &ApiConfig) {
    println!("Base URL:     {}", api.base_url);
    println!("Model:        {}", api.model);
    println!("Max tokens:   {}", api.max_tokens);
    println!("Temperature:  {}", api.temperature);
    println!(
        "API key:      {}",
        if api.api_key.is_some() { "set" } else { "not set" }
    );
}
