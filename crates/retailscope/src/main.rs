mod report;
mod server;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use retailscope_core::aggregates::{daily_sales, profit_by_category, RankOrder};
use retailscope_core::config::{DashboardConfig, ENV_CONFIG};
use retailscope_core::export::export_csv;
use retailscope_core::forecast::{forecast_sales, CancelFlag, ForecastHorizon, Forecaster};
use retailscope_core::ingestion::{load_dataset, UploadedFile};
use retailscope_core::kpis::calculate_kpis;
use retailscope_core::pipelines::{
    build_full_report, configured_forecaster, export_selection, AnalysisRequest, SessionContext,
};
use retailscope_core::sample::{sample_dataset, sample_frame};
use retailscope_core::validation::validate_dataset;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Retail transactions dashboard: API server and CLI", long_about = None)]
struct Cli {
    /// TOML configuration file (falls back to RETAILSCOPE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API server
    Serve,
    /// Load a spreadsheet and print the dashboard for a selection
    Analyze(AnalyzeArgs),
    /// Write the selected rows of a spreadsheet to CSV
    Export(ExportArgs),
    /// Run the sample dataset through every pipeline stage
    Check,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// First order date to include (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last order date to include (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,
    /// Category to include; repeat for several (default: all)
    #[arg(long = "category")]
    categories: Vec<String>,
}

impl FilterArgs {
    fn into_request(self) -> AnalysisRequest {
        AnalysisRequest {
            start: self.start,
            end: self.end,
            categories: (!self.categories.is_empty()).then_some(self.categories),
            ..AnalysisRequest::default()
        }
    }
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Spreadsheet to load (.xlsx, .xls or .csv)
    #[arg(long)]
    file: PathBuf,
    #[command(flatten)]
    filters: FilterArgs,
    /// Forecast horizon in days (30-180)
    #[arg(long)]
    horizon: Option<u32>,
    /// Rank the least profitable products instead of the most profitable
    #[arg(long)]
    bottom: bool,
    /// Number of products to rank
    #[arg(long)]
    count: Option<usize>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Spreadsheet to load (.xlsx, .xls or .csv)
    #[arg(long)]
    file: PathBuf,
    /// Destination CSV path; a directory gets the default file name
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    filters: FilterArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Serve => {
            let forecaster = configured_forecaster(&config.forecast);
            server::serve(config, forecaster).await
        }
        Command::Analyze(args) => analyze(args, &config),
        Command::Export(args) => export(args),
        Command::Check => check(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<DashboardConfig> {
    let from_env = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
    let path = path.map(Path::to_path_buf).or(from_env);
    DashboardConfig::load(path.as_deref()).context("failed to load configuration")
}

fn open_session(path: &Path) -> Result<SessionContext> {
    let contents =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let loaded = load_dataset(UploadedFile {
        file_name: &file_name,
        contents: &contents,
    })
    .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(SessionContext::new(loaded))
}

fn analyze(args: AnalyzeArgs, config: &DashboardConfig) -> Result<()> {
    let ctx = open_session(&args.file)?;
    let request = AnalysisRequest {
        horizon_days: args.horizon,
        product_order: args.bottom.then_some(RankOrder::Bottom),
        product_count: args.count,
        ..args.filters.into_request()
    };

    let forecaster = configured_forecaster(&config.forecast);
    let report = build_full_report(
        &ctx,
        &request,
        config,
        forecaster.as_ref(),
        &CancelFlag::new(),
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report::render_summary(&ctx.summary));
        println!();
        println!("{}", report::render_report(&report));
    }
    Ok(())
}

fn export(args: ExportArgs) -> Result<()> {
    let ctx = open_session(&args.file)?;
    let export = export_selection(&ctx, &args.filters.into_request())?;

    let out = if args.out.is_dir() {
        args.out.join(&export.file_name)
    } else {
        args.out
    };
    std::fs::write(&out, &export.contents)
        .with_context(|| format!("failed to write {}", out.display()))?;
    info!(path = %out.display(), bytes = export.contents.len(), "export written");
    Ok(())
}

fn check(config: &DashboardConfig) -> Result<()> {
    let forecaster = configured_forecaster(&config.forecast);
    let results = vec![
        ("Schema validation", check_validation()),
        ("Dataset construction", check_dataset()),
        ("KPI aggregation", check_kpis()),
        ("Dimensional aggregation", check_aggregates()),
        ("Forecasting", check_forecast(config, forecaster.as_ref())),
        ("CSV export", check_export()),
    ];

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Capability", "Status", "Detail"]);
    let mut failures = 0;
    for (name, outcome) in &results {
        match outcome {
            Ok(detail) => table.add_row(vec![name.to_string(), "OK".to_string(), detail.clone()]),
            Err(err) => {
                failures += 1;
                table.add_row(vec![name.to_string(), "FAILED".to_string(), format!("{err:#}")])
            }
        };
    }
    println!("{table}");

    if failures > 0 {
        bail!("{failures} of {} checks failed", results.len());
    }
    Ok(())
}

fn check_validation() -> Result<String> {
    let report = validate_dataset(&sample_frame()?);
    if !report.ok {
        bail!(report.message);
    }
    Ok(report.message)
}

fn check_dataset() -> Result<String> {
    let dataset = sample_dataset()?;
    Ok(format!(
        "{} rows, {} categories",
        dataset.len(),
        dataset.categories().len()
    ))
}

fn check_kpis() -> Result<String> {
    let dataset = sample_dataset()?;
    let kpis = calculate_kpis(&dataset.view());
    Ok(format!(
        "sales {:.2}, profit {:.2}, margin {:.1}%",
        kpis.total_sales, kpis.total_profit, kpis.profit_margin
    ))
}

fn check_aggregates() -> Result<String> {
    let dataset = sample_dataset()?;
    let view = dataset.view();
    Ok(format!(
        "{} categories, {} sales days",
        profit_by_category(&view).len(),
        daily_sales(&view).len()
    ))
}

fn check_forecast(config: &DashboardConfig, forecaster: &dyn Forecaster) -> Result<String> {
    let dataset = sample_dataset()?;
    let horizon = ForecastHorizon::new(config.forecast.default_horizon_days)?;
    let result = forecast_sales(
        &dataset.view(),
        horizon,
        &config.forecast.seasonality,
        forecaster,
        &CancelFlag::new(),
    )?;
    Ok(format!(
        "{} model, {} future days",
        result.model,
        result.prediction.len()
    ))
}

fn check_export() -> Result<String> {
    let dataset = sample_dataset()?;
    let bytes = export_csv(&dataset.view())?;
    Ok(format!("{} bytes", bytes.len()))
}

