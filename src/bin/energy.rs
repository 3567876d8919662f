//! Energy CLI - Command-line interface for Energy Balance
//!
//! Commands:
//! - analyze: Build an energy report from a Garmin payload
//! - prompt: Print the chat messages for an external language-model client
//! - check-insights: Validate a recorded language-model response
//! - doctor: Diagnose configuration and environment

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use energy_balance::error::InsightError;
use energy_balance::types::InsightRequest;
use energy_balance::{
    parse_recommendations, AnalysisConfig, ComputeError, DateWindow, EnergyPipeline,
    GarminAdapter, InsightProvider, PayloadAdapter, ENGINE_VERSION,
};

/// Energy - correlate body battery, sleep and stress and ask for insights
#[derive(Parser)]
#[command(name = "energy")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Energy-balance correlation and insight engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an energy report from a Garmin payload
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        window: WindowArgs,

        /// Analysis configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Recorded language-model response to validate into the report
        #[arg(long)]
        insights: Option<PathBuf>,

        /// Free text passed to the language model with the data
        #[arg(long)]
        context: Option<String>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Print the chat messages for an external language-model client
    Prompt {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        window: WindowArgs,

        /// Analysis configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Free text passed to the language model with the data
        #[arg(long)]
        context: Option<String>,
    },

    /// Validate a recorded language-model response
    CheckInsights {
        /// Response file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output the validated recommendations as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check an analysis configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct WindowArgs {
    /// First day of the window (YYYY-MM-DD)
    #[arg(long, requires = "end")]
    start: Option<String>,

    /// Last day of the window (YYYY-MM-DD), defaults to today
    #[arg(long)]
    end: Option<String>,

    /// Window length in days when no start is given
    #[arg(long, conflicts_with = "start")]
    days: Option<u32>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    init_tracing();

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

/// Log to stderr so stdout stays machine-readable
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("energy_balance=info,energy=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), EnergyCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            window,
            config,
            insights,
            context,
            output,
            output_format,
        } => cmd_analyze(
            &input,
            &window,
            config.as_deref(),
            insights.as_deref(),
            context.as_deref(),
            &output,
            output_format,
        ),

        Commands::Prompt {
            input,
            window,
            config,
            context,
        } => cmd_prompt(&input, &window, config.as_deref(), context.as_deref()),

        Commands::CheckInsights { input, json } => cmd_check_insights(&input, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn cmd_analyze(
    input: &Path,
    window_args: &WindowArgs,
    config_path: Option<&Path>,
    insights: Option<&Path>,
    context: Option<&str>,
    output: &Path,
    output_format: OutputFormat,
) -> Result<(), EnergyCliError> {
    let pipeline = EnergyPipeline::new(load_config(config_path)?)?;
    let window = resolve_window(window_args, pipeline.config())?;
    let payload = GarminAdapter.parse(&read_input(input)?)?;

    let recorded = insights.map(RecordedResponse::from_file).transpose()?;
    let insight_provider = recorded.as_ref().map(|r| r as &dyn InsightProvider);

    let report = pipeline.run(&payload, &window, insight_provider, context)?;

    let output_data = match output_format {
        OutputFormat::Json => serde_json::to_string(&report)?,
        OutputFormat::JsonPretty => report.to_json()?,
    };
    write_output(output, &output_data)
}

fn cmd_prompt(
    input: &Path,
    window_args: &WindowArgs,
    config_path: Option<&Path>,
    context: Option<&str>,
) -> Result<(), EnergyCliError> {
    let pipeline = EnergyPipeline::new(load_config(config_path)?)?;
    let window = resolve_window(window_args, pipeline.config())?;
    let payload = GarminAdapter.parse(&read_input(input)?)?;

    let analysis = pipeline.analyze(&payload, &window);
    let request = pipeline.insight_request(&analysis, context);

    println!("{}", serde_json::to_string_pretty(&request.to_messages())?);
    Ok(())
}

fn cmd_check_insights(input: &Path, json: bool) -> Result<(), EnergyCliError> {
    let raw = read_input(input)?;
    let set = parse_recommendations(&raw)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&set)?);
    } else {
        println!("Recommendations");
        println!("===============");
        for recommendation in &set.recommendations {
            println!("  [{}] {}", recommendation.theme.as_str(), recommendation.text);
        }
    }

    Ok(())
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), EnergyCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Energy Balance version {}", ENGINE_VERSION),
    });

    match config_path {
        Some(path) if !path.exists() => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "Configuration file does not exist".to_string(),
        }),
        _ => {
            let check = match load_config(config_path) {
                Ok(config) => match config.validate() {
                    Ok(()) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Configuration valid ({} day window, |r| >= {}, n >= {})",
                            config.window_days, config.significance_threshold, config.min_sample_size
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    },
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: CliError::from(e).message,
                },
            };
            checks.push(check);
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass payloads with --input <file>)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--input - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Energy Doctor Report");
        println!("====================");
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
        Err(EnergyCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, EnergyCliError> {
    match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| EnergyCliError::Config(e.to_string()))
        }
        None => Ok(AnalysisConfig::default()),
    }
}

fn resolve_window(args: &WindowArgs, config: &AnalysisConfig) -> Result<DateWindow, EnergyCliError> {
    let end = match &args.end {
        Some(end) => energy_balance::config::parse_date(end)?,
        None => chrono::Local::now().date_naive(),
    };

    let window = match &args.start {
        Some(start) => DateWindow::new(energy_balance::config::parse_date(start)?, end)?,
        None => DateWindow::ending_on(end, args.days.unwrap_or(config.window_days))?,
    };

    tracing::debug!(start = %window.start, end = %window.end, "Resolved analysis window");
    Ok(window)
}

fn read_input(input: &Path) -> Result<String, EnergyCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), EnergyCliError> {
    if output.to_string_lossy() == "-" {
        println!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

/// Language-model response captured ahead of time, e.g. by an external client
/// fed with `energy prompt`
struct RecordedResponse {
    text: String,
}

impl RecordedResponse {
    fn from_file(path: &Path) -> Result<Self, EnergyCliError> {
        Ok(Self {
            text: fs::read_to_string(path)?,
        })
    }
}

impl InsightProvider for RecordedResponse {
    fn complete(&self, request: InsightRequest, _timeout: Duration) -> Result<String, InsightError> {
        tracing::debug!(request_id = %request.request_id, "Using recorded insight response");
        Ok(self.text.clone())
    }
}

#[derive(Debug)]
enum EnergyCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    Config(String),
    Insight(InsightError),
    DoctorFailed,
}

impl From<io::Error> for EnergyCliError {
    fn from(e: io::Error) -> Self {
        EnergyCliError::Io(e)
    }
}

impl From<ComputeError> for EnergyCliError {
    fn from(e: ComputeError) -> Self {
        EnergyCliError::Compute(e)
    }
}

impl From<serde_json::Error> for EnergyCliError {
    fn from(e: serde_json::Error) -> Self {
        EnergyCliError::Json(e)
    }
}

impl From<InsightError> for EnergyCliError {
    fn from(e: InsightError) -> Self {
        EnergyCliError::Insight(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<EnergyCliError> for CliError {
    fn from(e: EnergyCliError) -> Self {
        match e {
            EnergyCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            EnergyCliError::Compute(e) => {
                let hint = match &e {
                    ComputeError::InvalidWindow { .. } => "Pass --start on or before --end",
                    ComputeError::InvalidConfig(_) => "Run 'energy doctor --config <file>' for details",
                    ComputeError::DateParseError(_) => "Use YYYY-MM-DD dates",
                    _ => "Ensure input is a Garmin payload with bodyBattery, sleep and stress lists",
                };
                CliError {
                    code: "COMPUTE_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            EnergyCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            EnergyCliError::Config(message) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message,
                hint: Some("Check the TOML configuration file".to_string()),
            },
            EnergyCliError::Insight(e) => CliError {
                code: "INSIGHT_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(
                    "Responses must be {\"recommendations\": [{\"theme\", \"text\"}]} covering energy, sleep, stress and cross_correlation"
                        .to_string(),
                ),
            },
            EnergyCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more checks failed".to_string(),
                hint: Some("Fix the reported errors and retry".to_string()),
            },
        }
    }
}

#[derive(serde::Serialize)]
struct DoctorReport {
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
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
