/*!
 * # Skilled-nursing portfolio KPI library
 *
 * Ingests facility income-statement workbooks (one sheet per facility named
 * `"<code> (<name>)"`), normalizes them into finance, census and occupancy
 * facts, and computes a registry of per-facility monthly KPIs with trend and
 * correlation statistics on top.
 *
 * ## Quick Start
 *
 * ```no_run
 * use snfkpi::prelude::*;
 *
 * # fn main() -> Result<()> {
 * let dataset = PortfolioDatasetBuilder::new()
 *     .workbook("uploads/2025_income_statements.xlsx")
 *     .build()?;
 *
 * let facility = FacilityId::new("101")?;
 * let period = PeriodId::new("2025-03")?;
 * for result in dataset.results_for(&facility, &period) {
 *     println!("{:<32} {:?}", result.kpi_id, result.value);
 * }
 *
 * dataset.export("kpis.csv", ExportFormat::Csv)?;
 * # Ok(())
 * # }
 * ```
 *
 * ## Computing KPIs directly
 *
 * The calculator takes an injected registry, so synthetic registries work
 * the same way as the standard one:
 *
 * ```
 * use snfkpi::prelude::*;
 *
 * let registry = KpiRegistry::standard();
 * let calculator = KpiCalculator::new(&registry);
 * let facility = FacilityId::new("101").unwrap();
 * let period = PeriodId::new("2025-01").unwrap();
 *
 * let output = calculator.calculate_all(&[], &[], &facility, &period, &[], None);
 * assert_eq!(output.results.len(), registry.len());
 * // Nothing to divide: null value plus warnings, never a panic
 * let revenue = output.get("total_revenue_ppd").unwrap();
 * assert_eq!(revenue.value, None);
 * assert!(!revenue.warnings.is_empty());
 * ```
 *
 * ## Trends
 *
 * ```no_run
 * # use snfkpi::prelude::*;
 * # fn main() -> Result<()> {
 * # let dataset = PortfolioDataset::load_directory("./uploads")?;
 * let analytics = dataset.analytics();
 * let facility = FacilityId::new("101")?;
 * let stats = analytics.trailing(&facility, "total_cost_ppd", 12, 0.01);
 * if let Some(trend) = stats.trend {
 *     println!("{:?} by {:.2}/month", trend.direction, trend.slope);
 * }
 * # Ok(())
 * # }
 * ```
 *
 * ## Persisting
 *
 * ```no_run
 * # use snfkpi::prelude::*;
 * # fn main() -> Result<()> {
 * # let dataset = PortfolioDataset::load_directory("./uploads")?;
 * let mut store = FactStore::open("facts.sqlite")?;
 * store.ingest_fact_set(&dataset.facts, dataset.results())?;
 * # Ok(())
 * # }
 * ```
 *
 * ## Configuration
 *
 * ```no_run
 * # use snfkpi::prelude::*;
 * let config = ConfigBuilder::new()
 *     .progress_bar(false)
 *     .trailing_window(6)
 *     .build();
 * snfkpi::config::set_global_config(config);
 * ```
 */

// Re-export error types from root
pub use error::{SnfError, Result, ErrorContext, ExportFormat};

// Public modules
pub mod data_types;
pub mod schema;
pub mod reader;
pub mod denominators;
pub mod kpi;
pub mod statistics;
pub mod error;
pub mod analytics;
pub mod dataset;
pub mod store;
pub mod export;
pub mod config;

/// Prelude module for convenient imports
///
/// Import everything you need with:
/// ```
/// use snfkpi::prelude::*;
/// ```
pub mod prelude {
    pub use crate::data_types::*;
    pub use crate::reader::{WorkbookReader, SheetFacts};
    pub use crate::denominators::Denominators;
    pub use crate::kpi::{KpiCalculator, KpiDefinition, KpiOutput, KpiRegistry, KpiStatus};
    pub use crate::statistics::{Correlation, TrailingStats, TrendDirection, TrendLine};
    pub use crate::error::{SnfError, Result};
    pub use crate::analytics::{PortfolioAnalytics, KpiSeries, PortfolioStats};
    pub use crate::dataset::{PortfolioDataset, PortfolioDatasetBuilder, DatasetStatistics};
    pub use crate::store::{FactStore, IngestSummary, PeriodFacts};
    pub use crate::export::{KpiExporter, JsonExporter, CsvExporter, SqlExporter};
    pub use crate::config::{ConfigBuilder, PipelineConfig};
    pub use crate::ExportFormat;
}

/// Portfolio constants
pub mod constants {
    /// Workbook extensions accepted for upload
    pub const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls"];

    /// Default upload cap in bytes
    pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

    /// Period id format
    pub const PERIOD_FORMAT: &str = "YYYY-MM";
}

/// Common recipes and utility functions
pub mod cookbook {
    use std::path::Path;

    use crate::prelude::*;

    /// Read a workbook, compute KPIs and persist everything in one pass
    ///
    /// Facilities already in the store contribute their master data before
    /// KPIs are computed.
    ///
    /// # Example
    /// ```no_run
    /// # use snfkpi::prelude::*;
    /// # use snfkpi::cookbook::run_pipeline;
    /// # fn main() -> Result<()> {
    /// let mut store = FactStore::open_in_memory()?;
    /// let config = PipelineConfig::default();
    /// let (dataset, summary) = run_pipeline("upload.xlsx", &mut store, &config)?;
    /// println!("{} facility months stored", summary.periods_replaced);
    /// # Ok(())
    /// # }
    /// ```
    pub fn run_pipeline<P: AsRef<Path>>(
        workbook: P,
        store: &mut FactStore,
        config: &PipelineConfig,
    ) -> Result<(PortfolioDataset, IngestSummary)> {
        let registry = config.load_registry()?;
        let mut facts = WorkbookReader::from_config(config).read_workbook_checked(workbook)?;
        // Stored master data supplies bed counts and settings; names follow the sheet
        let master: Vec<Facility> = store.facilities()?
            .into_iter()
            .map(|stored| match facts.facilities.iter().find(|f| f.facility_id == stored.facility_id) {
                Some(sheet) => Facility { name: sheet.name.clone(), ..stored },
                None => stored,
            })
            .collect();
        crate::dataset::apply_master_data(&mut facts, master);
        let dataset = PortfolioDataset::with_threads(facts, registry, config.parallel_threads);
        let summary = store.ingest_fact_set(&dataset.facts, dataset.results())?;
        Ok((dataset, summary))
    }

    /// KPI value and threshold status for one facility month
    pub fn facility_scorecard(
        dataset: &PortfolioDataset,
        facility_id: &FacilityId,
        period_id: &PeriodId,
    ) -> Vec<(String, Option<f64>, KpiStatus)> {
        dataset.results_for(facility_id, period_id)
            .into_iter()
            .map(|result| {
                let status = dataset.registry.get(&result.kpi_id)
                    .map_or(KpiStatus::Unknown, |def| def.status(result.value));
                (result.kpi_id.clone(), result.value, status)
            })
            .collect()
    }

    /// Facilities in alert on a KPI for one period, worst first
    pub fn facilities_in_alert(
        dataset: &PortfolioDataset,
        kpi_id: &str,
        period_id: &PeriodId,
    ) -> Vec<(FacilityId, f64)> {
        let mut ranked = dataset.analytics().ranking(kpi_id, period_id);
        ranked.reverse();
        ranked.into_iter()
            .filter(|entry| entry.status == KpiStatus::Alert)
            .map(|entry| (entry.facility_id, entry.value))
            .collect()
    }
}
