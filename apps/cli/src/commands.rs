//! CLI flag definitions, mode dispatch, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgGroup, Parser};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use leadscout_core::emails::EmailValidator;
use leadscout_core::maintenance;
use leadscout_core::pipeline::{PipelineDeps, PipelineReport, ProgressReporter, run_pipeline};
use leadscout_crawler::{ContactScraper, LinkVerifier};
use leadscout_provider::{
    ApifyClient, JobPoller, PollPolicy, ReviewRequest, TokioClock, fetch_reviews,
};
use leadscout_shared::{Settings, load_config, load_config_from};
use leadscout_storage::{GoogleAuth, GoogleSheetsBackend, LeadStore};

/// Timeout for each social link check.
const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// leadscout: find local businesses and keep a lead sheet up to date.
///
/// Without a mode flag, runs the full search → dedupe → enrich → append pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "leadscout",
    version,
    about = "Scrape business listings, enrich them with contact details and append new leads to a Google Sheet.",
    long_about = None,
)]
#[command(group(
    ArgGroup::new("mode")
        .multiple(false)
        .args(["dedupe", "verify", "emails", "import_from_sheet", "reviews"]),
))]
pub(crate) struct Cli {
    /// Remove rows whose business name repeats an earlier row.
    #[arg(long)]
    pub dedupe: bool,

    /// Check stored Instagram and Facebook links and clear dead ones.
    #[arg(long)]
    pub verify: bool,

    /// Validate stored emails (format and MX records) and print the results.
    #[arg(long)]
    pub emails: bool,

    /// Import leads from another worksheet of the same spreadsheet.
    #[arg(long, value_name = "SHEET")]
    pub import_from_sheet: Option<String>,

    /// Fetch reviews for the given place ids and print them as JSON.
    #[arg(long, value_name = "PLACE_ID", num_args = 1..)]
    pub reviews: Vec<String>,

    /// Maximum reviews per place for --reviews.
    #[arg(long, default_value_t = 20)]
    pub max_reviews: u32,

    /// Config file (defaults to ~/.leadscout/leadscout.toml).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// The one thing this invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mode {
    Pipeline,
    Dedupe,
    Verify,
    Emails,
    Import(String),
    Reviews(Vec<String>),
}

impl Cli {
    pub(crate) fn mode(&self) -> Mode {
        if self.dedupe {
            Mode::Dedupe
        } else if self.verify {
            Mode::Verify
        } else if self.emails {
            Mode::Emails
        } else if let Some(sheet) = &self.import_from_sheet {
            Mode::Import(sheet.clone())
        } else if !self.reviews.is_empty() {
            Mode::Reviews(self.reviews.clone())
        } else {
            Mode::Pipeline
        }
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadscout=info",
        1 => "leadscout=debug",
        _ => "leadscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Mode dispatch
// ---------------------------------------------------------------------------

/// Resolve settings and run the selected mode.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let file = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let settings = Settings::from_env(&file)?;

    match cli.mode() {
        Mode::Pipeline => cmd_pipeline(&settings).await,
        Mode::Dedupe => cmd_dedupe(&settings).await,
        Mode::Verify => cmd_verify(&settings).await,
        Mode::Emails => cmd_emails(&settings).await,
        Mode::Import(sheet) => cmd_import(&settings, &sheet).await,
        Mode::Reviews(place_ids) => cmd_reviews(&settings, place_ids, cli.max_reviews).await,
    }
}

fn open_store(settings: &Settings) -> Result<LeadStore> {
    let sheet_id = settings.require_sheet_id()?;
    let auth = GoogleAuth::from_settings(settings)?;
    let backend = GoogleSheetsBackend::new(sheet_id, auth)?;
    Ok(LeadStore::new(Arc::new(backend), settings.sheet_name.clone()))
}

fn provider_client(settings: &Settings) -> Result<ApifyClient> {
    let token = settings.require_provider_token()?;
    Ok(ApifyClient::new(token, &settings.provider_base_url)?)
}

async fn cmd_pipeline(settings: &Settings) -> Result<()> {
    // Both are checked before any network traffic.
    let provider = provider_client(settings)?;
    let store = open_store(settings)?;
    let contacts = ContactScraper::new(settings.fetch_timeout)?
        .follow_contact_page(settings.follow_contact_page);

    let deps = PipelineDeps {
        provider: Arc::new(provider),
        clock: Arc::new(TokioClock),
        contacts: Arc::new(contacts),
        store,
    };

    info!(
        term = %settings.search_term,
        location = %settings.location,
        max_results = settings.max_results,
        "searching"
    );

    let reporter = CliProgress::new();
    let report = run_pipeline(&deps, settings, &reporter).await;
    reporter.spinner.finish_and_clear();
    let report = report?;

    println!();
    println!("  Run {} finished", report.run_id);
    println!("  Scraped:      {}", report.scraped);
    if report.undecodable > 0 {
        println!("  Undecodable:  {}", report.undecodable);
    }
    println!("  Already held: {}", report.duplicates);
    if report.in_batch_duplicates > 0 {
        println!("  Repeated:     {}", report.in_batch_duplicates);
    }
    if report.unidentifiable > 0 {
        println!("  Nameless:     {}", report.unidentifiable);
    }
    println!(
        "  Enriched:     {} ({} with email, {} with social links, {} skipped, {} failed)",
        report.enrichment.enriched,
        report.enrichment.with_email,
        report.enrichment.with_social,
        report.enrichment.skipped,
        report.enrichment.failed,
    );
    println!("  Appended:     {} to '{}'", report.appended, settings.sheet_name);
    println!("  Time:         {:.1}s", report.elapsed.as_secs_f64());
    println!();
    Ok(())
}

async fn cmd_dedupe(settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;
    let spinner = spinner("Removing duplicate rows");
    let report = maintenance::dedupe_store(&store).await;
    spinner.finish_and_clear();
    let report = report?;

    if report.rewritten {
        println!(
            "Removed {} duplicate and {} blank rows; {} rows remain in '{}'.",
            report.removed,
            report.blank_dropped,
            report.kept,
            store.sheet_name()
        );
    } else {
        println!("No duplicates in '{}' ({} rows).", store.sheet_name(), report.kept);
    }
    Ok(())
}

async fn cmd_verify(settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;
    let verifier = LinkVerifier::new(VERIFY_TIMEOUT)?;
    let spinner = spinner("Verifying social links");
    let report = maintenance::verify_links(&store, &verifier).await;
    spinner.finish_and_clear();
    let report = report?;

    println!(
        "Checked {} links: cleared {} Instagram and {} Facebook links.",
        report.checked, report.instagram_cleared, report.facebook_cleared
    );
    Ok(())
}

async fn cmd_emails(settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;
    let validator = EmailValidator::with_system_dns();
    let spinner = spinner("Validating emails");
    let report = maintenance::validate_emails(&store, &validator).await;
    spinner.finish_and_clear();
    let report = report?;

    println!("VALIDATED EMAILS:");
    for email in &report.valid {
        println!("{email}");
    }
    println!();
    println!("INVALID EMAILS:");
    for (email, reason) in &report.invalid {
        println!("{email}  ({reason})");
    }
    println!();
    println!("{} valid, {} invalid.", report.valid.len(), report.invalid.len());
    Ok(())
}

async fn cmd_import(settings: &Settings, source: &str) -> Result<()> {
    let store = open_store(settings)?;
    let spinner = spinner(&format!("Importing from '{source}'"));
    let report = maintenance::import_from_sheet(&store, source).await;
    spinner.finish_and_clear();
    let report = report?;

    println!(
        "Imported {} of {} rows from '{source}' into '{}' ({} already present, {} repeated, {} without a name).",
        report.appended,
        report.source_rows,
        store.sheet_name(),
        report.duplicates,
        report.in_batch_duplicates,
        report.unidentifiable,
    );
    Ok(())
}

async fn cmd_reviews(settings: &Settings, place_ids: Vec<String>, max_reviews: u32) -> Result<()> {
    let request = ReviewRequest::new(place_ids, max_reviews)?.with_language(settings.language.clone());
    let poller = JobPoller::new(
        provider_client(settings)?,
        TokioClock,
        PollPolicy {
            interval: settings.poll_interval,
            timeout: settings.poll_timeout,
        },
    );

    let spinner = spinner("Fetching reviews");
    let reviews = fetch_reviews(&poller, &request).await;
    spinner.finish_and_clear();
    let reviews = reviews?;

    println!("{}", serde_json::to_string_pretty(&reviews)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            spinner: spinner("Starting"),
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn lead_enriched(&self, done: usize, total: usize) {
        self.spinner.set_message(format!("Enriching leads [{done}/{total}]"));
    }

    fn done(&self, _report: &PipelineReport) {
        self.spinner.finish_and_clear();
    }
}
