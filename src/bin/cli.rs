use anyhow::Context;
use clap::{Parser, Subcommand, Args, ValueEnum};
use snfkpi::prelude::*;
use snfkpi::cookbook;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "snfcli")]
#[command(about = "Skilled-nursing KPI CLI - Ingest income-statement workbooks, compute KPIs and trends", long_about = None)]
struct Cli {
    /// TOML configuration file (SNFKPI_* environment variables override it)
    #[arg(long, global = true, env = "SNFKPI_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a workbook, compute KPIs and store everything
    Ingest(IngestArgs),
    /// Print computed KPIs for a workbook
    Kpis(KpisArgs),
    /// Trailing-window statistics of a stored KPI
    Trend(TrendArgs),
    /// Correlate two stored KPIs of one facility
    Correlate(CorrelateArgs),
    /// Export computed KPIs to JSON, JSON Lines, CSV or SQL
    Export(ExportArgs),
    /// List the KPI registry
    Registry(RegistryArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Income-statement workbook (.xlsx)
    workbook: PathBuf,
    /// SQLite fact store (defaults to the configured path)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Args)]
struct KpisArgs {
    /// Income-statement workbook (.xlsx)
    workbook: PathBuf,
    /// Only this facility code
    #[arg(long)]
    facility: Option<String>,
    /// Only this period (YYYY-MM)
    #[arg(long)]
    period: Option<String>,
}

#[derive(Args)]
struct TrendArgs {
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(long)]
    facility: String,
    #[arg(long)]
    kpi: String,
    /// Months in the trailing window (defaults to the configured window)
    #[arg(long)]
    window: Option<usize>,
}

#[derive(Args)]
struct CorrelateArgs {
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(long)]
    facility: String,
    #[arg(long)]
    kpi_a: String,
    #[arg(long)]
    kpi_b: String,
}

#[derive(Args)]
struct ExportArgs {
    /// Income-statement workbook (.xlsx)
    workbook: PathBuf,
    /// Output file path
    #[arg(short, long)]
    output: PathBuf,
    /// Export format (defaults to the configured format)
    #[arg(long, value_enum)]
    format: Option<ExportFormatOpt>,
    /// Only export this facility
    #[arg(long)]
    facility: Option<String>,
}

#[derive(Args)]
struct RegistryArgs {
    /// Print the registry as TOML instead of a table
    #[arg(long)]
    toml: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum ExportFormatOpt {
    Json,
    Jsonl,
    Csv,
    Sql,
}

impl From<ExportFormatOpt> for ExportFormat {
    fn from(opt: ExportFormatOpt) -> Self {
        match opt {
            ExportFormatOpt::Json => ExportFormat::Json,
            ExportFormatOpt::Jsonl => ExportFormat::JsonLines,
            ExportFormatOpt::Csv => ExportFormat::Csv,
            ExportFormatOpt::Sql => ExportFormat::Sql,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        match e.downcast_ref::<SnfError>() {
            Some(snf) => eprintln!("Error: {}", snf.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::layered(cli.config.as_deref())?;
    snfkpi::config::set_global_config(config.clone());

    match cli.command {
        Commands::Ingest(args) => cmd_ingest(args, &config),
        Commands::Kpis(args) => cmd_kpis(args, &config),
        Commands::Trend(args) => cmd_trend(args, &config),
        Commands::Correlate(args) => cmd_correlate(args, &config),
        Commands::Export(args) => cmd_export(args, &config),
        Commands::Registry(args) => cmd_registry(args, &config),
    }
}

fn open_store(db: Option<PathBuf>, config: &PipelineConfig) -> anyhow::Result<FactStore> {
    let store = match db {
        Some(path) => FactStore::open(&path)
            .with_context(|| format!("failed to open fact store at {}", path.display()))?
            .with_transactional_replace(config.transactional_replace),
        None => FactStore::from_config(config)?,
    };
    Ok(store)
}

fn load_dataset(workbook: &Path, config: &PipelineConfig) -> anyhow::Result<PortfolioDataset> {
    let dataset = PortfolioDatasetBuilder::new()
        .workbook(workbook)
        .config(config.clone())
        .build()?;
    Ok(dataset)
}

fn cmd_ingest(args: IngestArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let mut store = open_store(args.db, config)?;
    let (dataset, summary) = cookbook::run_pipeline(&args.workbook, &mut store, config)?;

    for skipped in &dataset.facts.skipped_sheets {
        println!("skipped '{}': {}", skipped.sheet_name, skipped.reason);
    }
    println!(
        "Stored {} facilities, {} facility months ({} finance, {} census, {} occupancy, {} KPI rows)",
        summary.facilities,
        summary.periods_replaced,
        summary.finance_rows,
        summary.census_rows,
        summary.occupancy_rows,
        summary.kpi_rows
    );
    Ok(())
}

fn cmd_kpis(args: KpisArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let dataset = load_dataset(&args.workbook, config)?;
    let facility = args.facility.map(FacilityId::new).transpose()?;
    let period = args.period.map(PeriodId::new).transpose()?;

    let analytics = dataset.analytics();
    let mut query = analytics.query();
    if let Some(facility) = &facility {
        query = query.facility(facility);
    }
    if let Some(period) = &period {
        query = query.period(period);
    }

    let results = query.execute();
    for result in &results {
        let status = dataset.registry.get(&result.kpi_id)
            .map_or(KpiStatus::Unknown, |def| def.status(result.value));
        let value = result.value
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "null".to_string());
        println!(
            "{} | {} | {:<32} | {:>12} | {:?} | {}",
            result.facility_id,
            result.period_id,
            result.kpi_id,
            value,
            status,
            result.warnings.join("; ")
        );
    }
    println!("Total results: {}", results.len());
    Ok(())
}

fn cmd_trend(args: TrendArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let store = open_store(args.db, config)?;
    let registry = config.load_registry()?;
    registry.require(&args.kpi)?;

    let facility = FacilityId::new(&args.facility)?;
    let rows = store.kpi_series(&facility, &args.kpi)?;
    if rows.is_empty() {
        println!("No stored results for {} / {}", facility, args.kpi);
        return Ok(());
    }

    let window = args.window.unwrap_or(config.trailing_window);
    let analytics = PortfolioAnalytics::new(&rows);
    let stats = analytics.trailing(&facility, &args.kpi, window, config.trend_threshold);

    println!("{} / {} (last {} months)", facility, args.kpi, window);
    println!("  current: {:?}", stats.current);
    println!("  average: {:?}", stats.average);
    println!("  min/max: {:?} / {:?}", stats.min, stats.max);
    println!("  points:  {}", stats.count);
    match stats.trend {
        Some(trend) => println!(
            "  trend:   {:?} (slope {:.4}/month, r² {:.3}, next {:.2})",
            trend.direction,
            trend.slope,
            trend.r_squared,
            trend.forecast(1)
        ),
        None => println!("  trend:   not enough data"),
    }
    Ok(())
}

fn cmd_correlate(args: CorrelateArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let store = open_store(args.db, config)?;
    let registry = config.load_registry()?;
    registry.require(&args.kpi_a)?;
    registry.require(&args.kpi_b)?;

    let facility = FacilityId::new(&args.facility)?;
    let mut rows = store.kpi_series(&facility, &args.kpi_a)?;
    rows.extend(store.kpi_series(&facility, &args.kpi_b)?);

    let correlation = PortfolioAnalytics::new(&rows).correlate(&facility, &args.kpi_a, &args.kpi_b);
    match correlation.strength {
        Some(strength) => println!(
            "{} vs {}: r = {:.3} over {} months ({:?})",
            args.kpi_a, args.kpi_b, correlation.r, correlation.n, strength
        ),
        None => println!(
            "{} vs {}: undefined over {} months",
            args.kpi_a, args.kpi_b, correlation.n
        ),
    }
    Ok(())
}

fn cmd_export(args: ExportArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let dataset = load_dataset(&args.workbook, config)?;
    let format = args.format.map(ExportFormat::from).unwrap_or(config.default_export_format);
    let facility = args.facility.map(FacilityId::new).transpose()?;

    dataset.export_subset(
        &args.output,
        |r| facility.as_ref().map_or(true, |f| &r.facility_id == f),
        format,
    )?;
    println!("Exported to {}", args.output.display());
    Ok(())
}

fn cmd_registry(args: RegistryArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let registry = config.load_registry()?;
    if args.toml {
        print!("{}", registry.to_toml_string()?);
        return Ok(());
    }
    for def in registry.iter() {
        let thresholds = match (def.thresholds.target, def.thresholds.alert) {
            (Some(target), Some(alert)) => format!("target {} / alert {}", target, alert),
            (Some(target), None) => format!("target {}", target),
            (None, Some(alert)) => format!("alert {}", alert),
            (None, None) => String::new(),
        };
        println!("{:<32} {:<11} {} {}", def.kpi_id, def.unit, def.formula, thresholds);
    }
    println!("Total KPIs: {}", registry.len());
    Ok(())
}
