//! Cards CLI - Command-line interface for Synheart Cards
//!
//! Commands:
//! - card: Build one card from a rows file
//! - preset: Run a named preset
//! - presets: List presets
//! - catalog: Print the signal and goal catalogs
//! - history: Per-day values of any payload path
//! - doctor: Diagnose configuration and data files

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use synheart_cards::connector::{parse_json_array, parse_ndjson, Connector, MemoryRowSource};
use synheart_cards::extractor::signal_history;
use synheart_cards::request::parse_date;
use synheart_cards::{
    presets, CardBuilder, CardError, CardRequest, GoalCatalog, KernelConfig, SignalCatalog,
    SourceError, CARDS_VERSION, PRODUCER_NAME, SCHEMA_VERSION,
};
use tracing_subscriber::EnvFilter;

/// Cards - explainable health summary cards
#[derive(Parser)]
#[command(name = "cards")]
#[command(author = "Synheart AI Inc")]
#[command(version = CARDS_VERSION)]
#[command(about = "Build health summary cards from daily records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one card
    Card {
        /// Card type (daily_summary, weekly_overview, monthly_overview)
        #[arg(long = "type")]
        card_type: String,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Run a preset (daily_brief, weekly_health, monthly_overview)
    Preset {
        preset_id: String,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// List presets
    Presets {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the signal and goal catalogs
    Catalog {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Per-day history of a payload path
    History {
        /// Dot path into the payload (e.g. "body_metrics.weight_kg")
        #[arg(long)]
        path: String,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        /// Restrict to one device
        #[arg(long)]
        device_id: Option<String>,

        /// Rows file (.json array or .ndjson; use - for NDJSON on stdin)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Diagnose configuration and data files
    Doctor {
        /// Rows file to check (defaults to CARDS_DATA_PATH)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Anchor day (YYYY-MM-DD)
    #[arg(long)]
    from: String,

    /// End day (YYYY-MM-DD); validated, defaults to --from
    #[arg(long)]
    to: Option<String>,

    /// IANA timezone (defaults to CARDS_DEFAULT_TZ)
    #[arg(long)]
    tz: Option<String>,

    /// Restrict to one device
    #[arg(long)]
    device_id: Option<String>,

    /// Rows file (.json array or .ndjson; use - for NDJSON on stdin)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Output file path (use - for stdout)
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Output format
    #[arg(long, default_value = "json-pretty")]
    output_format: OutputFormat,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("synheart_cards=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CardsCliError> {
    let config = KernelConfig::from_env();

    match cli.command {
        Commands::Card { card_type, query } => cmd_card(&config, &card_type, &query),
        Commands::Preset { preset_id, query } => cmd_preset(&config, &preset_id, &query),
        Commands::Presets { json } => cmd_presets(json),
        Commands::Catalog { json } => cmd_catalog(json),
        Commands::History {
            path,
            from,
            to,
            device_id,
            data,
            output_format,
        } => cmd_history(
            &config,
            &path,
            &from,
            &to,
            device_id.as_deref(),
            data.as_ref(),
            &output_format,
        ),
        Commands::Doctor { data, json } => cmd_doctor(&config, data.as_ref(), json),
    }
}

fn parse_query(config: &KernelConfig, card_type: &str, query: &QueryArgs) -> Result<CardRequest, CardsCliError> {
    Ok(CardRequest::parse(
        card_type,
        &query.from,
        query.to.as_deref(),
        query.tz.as_deref(),
        query.device_id.as_deref(),
        config.default_timezone.name(),
    )?)
}

fn cmd_card(config: &KernelConfig, card_type: &str, query: &QueryArgs) -> Result<(), CardsCliError> {
    let request = parse_query(config, card_type, query)?;
    let source = load_source(config, query.data.as_ref())?;

    let envelope = CardBuilder::new(&source)
        .with_intraday_today(config.intraday_today)
        .build(&request)?;
    tracing::info!(card_type = request.card_type.as_str(), summary = %envelope.summary, "card built");

    write_output(&query.output, &format_json(&envelope, &query.output_format)?)
}

fn cmd_preset(config: &KernelConfig, preset_id: &str, query: &QueryArgs) -> Result<(), CardsCliError> {
    let preset = presets::get(preset_id).ok_or_else(|| CardError::UnknownPreset(preset_id.to_string()))?;
    let anchor_type = preset
        .card_types
        .first()
        .map_or("daily_summary", |card_type| card_type.as_str());
    let request = parse_query(config, anchor_type, query)?;
    let source = load_source(config, query.data.as_ref())?;

    let builder = CardBuilder::new(&source).with_intraday_today(config.intraday_today);
    let envelopes = presets::run(&builder, preset_id, &request)?;
    tracing::info!(preset = preset_id, cards = envelopes.len(), "preset complete");

    write_output(&query.output, &format_json(&envelopes, &query.output_format)?)
}

fn cmd_presets(json: bool) -> Result<(), CardsCliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(presets::list())?);
        return Ok(());
    }

    println!("Presets");
    println!("=======");
    for preset in presets::list() {
        let cards: Vec<&str> = preset.card_types.iter().map(|t| t.as_str()).collect();
        println!("  {:<18} {} [{}]", preset.id, preset.description, cards.join(", "));
    }
    Ok(())
}

fn cmd_catalog(json: bool) -> Result<(), CardsCliError> {
    let signals = SignalCatalog::builtin().describe();
    let goals = GoalCatalog::builtin().describe();

    if json {
        let catalog = serde_json::json!({ "signals": signals, "goals": goals });
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    println!("Signals");
    println!("=======");
    for signal in &signals {
        println!(
            "  {:<24} {:<36} {:<5} {}",
            signal.name,
            signal.path,
            signal.aggregation.as_str(),
            signal.unit.as_deref().unwrap_or("-")
        );
    }

    println!("\nGoals");
    println!("=====");
    for goal in &goals {
        println!(
            "  P{} {:<22} {} {} ({}-day window)",
            goal.priority,
            goal.signal_name,
            goal.target_type.as_str(),
            goal.target_value,
            goal.window_days
        );
    }
    Ok(())
}

fn cmd_history(
    config: &KernelConfig,
    path: &str,
    from: &str,
    to: &str,
    device_id: Option<&str>,
    data: Option<&PathBuf>,
    output_format: &OutputFormat,
) -> Result<(), CardsCliError> {
    let start = parse_date("from", from)?;
    let end = parse_date("to", to)?;
    if end < start {
        return Err(CardError::InvalidRange {
            from: from.to_string(),
            to: to.to_string(),
        }
        .into());
    }

    let source = load_source(config, data)?;
    let rows = Connector::new(&source).fetch(start, end + chrono::Duration::days(1), device_id)?;
    let history = signal_history(&rows, path);
    tracing::info!(path, points = history.len(), "history computed");

    println!("{}", format_json(&history, output_format)?);
    Ok(())
}

fn cmd_doctor(config: &KernelConfig, data: Option<&PathBuf>, json: bool) -> Result<(), CardsCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "cards_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Cards version {}", CARDS_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Envelope schema: {}", SCHEMA_VERSION),
    });

    checks.push(DoctorCheck {
        name: "catalogs".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "{} signals, {} goals",
            SignalCatalog::builtin().len(),
            GoalCatalog::builtin().len()
        ),
    });

    checks.push(DoctorCheck {
        name: "default_timezone".to_string(),
        status: CheckStatus::Ok,
        message: config.default_timezone.name().to_string(),
    });

    match data.or(config.data_path.as_ref()) {
        Some(path) => checks.push(check_rows_file("data", path)),
        None => checks.push(DoctorCheck {
            name: "data".to_string(),
            status: CheckStatus::Warning,
            message: "No data file configured (set CARDS_DATA_PATH or pass --data)".to_string(),
        }),
    }

    if let Some(path) = &config.intraday_path {
        checks.push(check_rows_file("intraday", path));
    } else if config.intraday_today {
        checks.push(DoctorCheck {
            name: "intraday".to_string(),
            status: CheckStatus::Warning,
            message: "CARDS_INTRADAY_TODAY is set but CARDS_INTRADAY_PATH is not".to_string(),
        });
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--data - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: CARDS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Cards Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CardsCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_rows_file(name: &str, path: &Path) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: format!("{} does not exist", path.display()),
        };
    }

    match MemoryRowSource::from_path(path) {
        Ok(source) => DoctorCheck {
            name: name.to_string(),
            status: if source.is_empty() { CheckStatus::Warning } else { CheckStatus::Ok },
            message: format!("{} rows in {}", source.len(), path.display()),
        },
        Err(e) => DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    }
}

/// Rows from `--data`, stdin (`-`) or the configured files
fn load_source(config: &KernelConfig, data: Option<&PathBuf>) -> Result<MemoryRowSource, CardsCliError> {
    if data.is_some_and(|path| path.as_os_str() == "-") {
        let mut content = String::new();
        io::stdin().read_to_string(&mut content)?;
        let trimmed = content.trim_start();
        let rows = if trimmed.starts_with('[') {
            parse_json_array(trimmed)?
        } else {
            parse_ndjson(&content)?
        };
        return Ok(MemoryRowSource::new(rows));
    }

    Ok(config.load_source(data)?)
}

fn format_json<T: serde::Serialize>(value: &T, format: &OutputFormat) -> Result<String, CardsCliError> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string(value)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(value)?,
    })
}

fn write_output(path: &Path, content: &str) -> Result<(), CardsCliError> {
    if path.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", content)?;
    } else {
        fs::write(path, format!("{}\n", content))?;
    }
    Ok(())
}

// Error handling

#[derive(Debug)]
enum CardsCliError {
    Io(io::Error),
    Card(CardError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<io::Error> for CardsCliError {
    fn from(e: io::Error) -> Self {
        CardsCliError::Io(e)
    }
}

impl From<CardError> for CardsCliError {
    fn from(e: CardError) -> Self {
        CardsCliError::Card(e)
    }
}

impl From<SourceError> for CardsCliError {
    fn from(e: SourceError) -> Self {
        CardsCliError::Card(CardError::Source(e))
    }
}

impl From<serde_json::Error> for CardsCliError {
    fn from(e: serde_json::Error) -> Self {
        CardsCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CardsCliError> for CliError {
    fn from(e: CardsCliError) -> Self {
        match e {
            CardsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CardsCliError::Card(CardError::UnknownPreset(id)) => CliError {
                code: "UNKNOWN_PRESET".to_string(),
                message: format!("Unknown preset: {}", id),
                hint: Some("Run 'cards presets' to list presets".to_string()),
            },
            CardsCliError::Card(e) if e.is_client_error() => CliError {
                code: "INVALID_REQUEST".to_string(),
                message: e.to_string(),
                hint: Some("Check --type, dates (YYYY-MM-DD) and --tz (IANA name)".to_string()),
            },
            CardsCliError::Card(e) => CliError {
                code: "SOURCE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check --data or CARDS_DATA_PATH; run 'cards doctor'".to_string()),
            },
            CardsCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CardsCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
