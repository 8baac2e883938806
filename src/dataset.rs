/*!
 * Portfolio dataset API
 *
 * Provides a builder that ingests one or more income-statement workbooks and
 * computes every registry KPI for every (facility, period) the facts cover.
 */

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::{
    Result, SnfError,
    analytics::PortfolioAnalytics,
    config::PipelineConfig,
    data_types::*,
    kpi::{KpiCalculator, KpiRegistry},
    reader::WorkbookReader,
};

/// Builder for loading a portfolio dataset
///
/// # Example
/// ```no_run
/// # use snfkpi::dataset::PortfolioDatasetBuilder;
/// let dataset = PortfolioDatasetBuilder::new()
///     .workbook("data/2025_income_statements.xlsx")
///     .build()?;
/// dataset.statistics().print_summary();
/// # Ok::<(), snfkpi::SnfError>(())
/// ```
pub struct PortfolioDatasetBuilder {
    workbook_paths: Vec<PathBuf>,
    registry: Option<KpiRegistry>,
    config: Option<PipelineConfig>,
    master_facilities: Vec<Facility>,
}

impl Default for PortfolioDatasetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PortfolioDatasetBuilder {
    pub fn new() -> Self {
        Self {
            workbook_paths: Vec::new(),
            registry: None,
            config: None,
            master_facilities: Vec::new(),
        }
    }

    /// Add a workbook; later workbooks replace the facility months they cover
    pub fn workbook<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.workbook_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Use a registry other than the configured one
    pub fn registry(mut self, registry: KpiRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use an explicit configuration instead of the global one
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Facility master data (bed counts, state, operator)
    pub fn facilities(mut self, facilities: Vec<Facility>) -> Self {
        self.master_facilities = facilities;
        self
    }

    /// Build the dataset, reading all workbooks and computing KPIs
    pub fn build(self) -> Result<PortfolioDataset> {
        if self.workbook_paths.is_empty() {
            return Err(SnfError::Custom {
                message: "No workbook specified".to_string(),
                suggestion: Some("Use .workbook() to add an income-statement workbook".to_string()),
            });
        }

        let config = self.config.unwrap_or_else(crate::config::global_config);
        let registry = match self.registry {
            Some(registry) => registry,
            None => config.load_registry()?,
        };
        let reader = WorkbookReader::from_config(&config);

        let mut facts = FactSet::new();
        for path in &self.workbook_paths {
            log::info!("Loading workbook {}", path.display());
            facts.merge(reader.read_workbook(path)?);
        }

        if facts.facility_ids.is_empty() || facts.is_empty() {
            return Err(SnfError::NoValidData {
                path: self.workbook_paths[0].clone(),
                sheets_seen: facts.skipped_sheets.len() + facts.facility_ids.len(),
            });
        }

        apply_master_data(&mut facts, self.master_facilities);
        Ok(PortfolioDataset::with_threads(facts, registry, config.parallel_threads))
    }

    /// Builder over every workbook file in a directory, in file-name order
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();

        if !dir.is_dir() {
            return Err(SnfError::Custom {
                message: format!("'{}' is not a directory", dir.display()),
                suggestion: Some("Provide a directory containing .xlsx workbooks".to_string()),
            });
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_workbook = path.extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "xlsx" | "xlsm" | "xls"))
                .unwrap_or(false);
            let is_lock_file = path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("~$"));
            if is_workbook && !is_lock_file {
                paths.push(path);
            }
        }
        paths.sort();

        Ok(paths.into_iter().fold(Self::new(), |builder, path| builder.workbook(path)))
    }
}

/// Replace sheet-derived facility records with master data where known
///
/// Facilities the fact set does not mention are ignored.
pub fn apply_master_data(facts: &mut FactSet, master: Vec<Facility>) {
    for record in master {
        if let Some(existing) = facts.facilities.iter_mut().find(|f| f.facility_id == record.facility_id) {
            *existing = record;
        }
    }
}

/// Parsed facts plus the KPI results derived from them
pub struct PortfolioDataset {
    pub facts: FactSet,
    pub registry: KpiRegistry,
    results: Vec<KpiResult>,
    parallel_threads: Option<usize>,
}

impl PortfolioDataset {
    /// Compute KPIs for a fact set using all available threads
    pub fn from_facts(facts: FactSet, registry: KpiRegistry) -> Self {
        Self::with_threads(facts, registry, None)
    }

    pub fn with_threads(facts: FactSet, registry: KpiRegistry, parallel_threads: Option<usize>) -> Self {
        let mut dataset = Self {
            facts,
            registry,
            results: Vec::new(),
            parallel_threads,
        };
        dataset.recompute();
        dataset
    }

    /// Load every workbook in a directory with default settings
    ///
    /// # Example
    /// ```no_run
    /// # use snfkpi::dataset::PortfolioDataset;
    /// let dataset = PortfolioDataset::load_directory("./uploads")?;
    /// # Ok::<(), snfkpi::SnfError>(())
    /// ```
    pub fn load_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        PortfolioDatasetBuilder::from_directory(dir)?.build()
    }

    /// Recompute all KPI results from the current facts
    ///
    /// Results are ordered by facility, then period, then registry order.
    pub fn recompute(&mut self) {
        self.results = compute_results(&self.facts, &self.registry, self.parallel_threads);
        log::info!(
            "Computed {} KPI results for {} facility months",
            self.results.len(),
            self.facts.keys().len()
        );
    }

    pub fn results(&self) -> &[KpiResult] {
        &self.results
    }

    /// Number of KPI results
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results for one facility month, in registry order
    pub fn results_for(&self, facility_id: &FacilityId, period_id: &PeriodId) -> Vec<&KpiResult> {
        self.results.iter()
            .filter(|r| &r.facility_id == facility_id && &r.period_id == period_id)
            .collect()
    }

    /// Periods with facts for one facility, ascending
    pub fn periods_for(&self, facility_id: &FacilityId) -> Vec<PeriodId> {
        self.facts.keys()
            .into_iter()
            .filter(|(f, _)| f == facility_id)
            .map(|(_, p)| p)
            .collect()
    }

    pub fn facility(&self, facility_id: &FacilityId) -> Option<&Facility> {
        self.facts.facilities.iter().find(|f| &f.facility_id == facility_id)
    }

    pub fn analytics(&self) -> PortfolioAnalytics<'_> {
        PortfolioAnalytics::new(&self.results)
            .with_registry(&self.registry)
            .with_facilities(&self.facts.facilities)
    }

    pub fn statistics(&self) -> DatasetStatistics {
        DatasetStatistics::from_dataset(self)
    }
}

/// Evaluate the registry for every key of the fact set
pub fn compute_results(facts: &FactSet, registry: &KpiRegistry, parallel_threads: Option<usize>) -> Vec<KpiResult> {
    let calculator = KpiCalculator::new(registry).with_facilities(&facts.facilities);
    let keys: Vec<(FacilityId, PeriodId)> = facts.keys().into_iter().collect();

    let evaluate = |(facility_id, period_id): &(FacilityId, PeriodId)| {
        calculator.calculate_all(
            &facts.finance_facts,
            &facts.census_facts,
            facility_id,
            period_id,
            &facts.occupancy_facts,
            None,
        ).results
    };

    #[cfg(feature = "parallel")]
    let results = {
        use rayon::prelude::*;

        let run = || keys.par_iter().flat_map_iter(evaluate).collect::<Vec<_>>();
        match parallel_threads {
            Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => pool.install(run),
                Err(e) => {
                    log::warn!("Could not build a {}-thread pool ({}); using the global pool", threads, e);
                    run()
                }
            },
            None => run(),
        }
    };

    #[cfg(not(feature = "parallel"))]
    let results = {
        let _ = parallel_threads;
        keys.iter().flat_map(evaluate).collect::<Vec<_>>()
    };

    results
}

/// Dataset statistics
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStatistics {
    pub facilities: usize,
    pub periods: usize,
    pub facility_months: usize,
    pub finance_facts: usize,
    pub census_facts: usize,
    pub occupancy_facts: usize,
    pub skipped_sheets: usize,
    pub kpi_results: usize,
    pub null_results: usize,
}

impl DatasetStatistics {
    pub fn from_dataset(dataset: &PortfolioDataset) -> Self {
        let keys = dataset.facts.keys();
        let periods: BTreeSet<&PeriodId> = keys.iter().map(|(_, p)| p).collect();

        Self {
            facilities: dataset.facts.facility_ids.len(),
            periods: periods.len(),
            facility_months: keys.len(),
            finance_facts: dataset.facts.finance_facts.len(),
            census_facts: dataset.facts.census_facts.len(),
            occupancy_facts: dataset.facts.occupancy_facts.len(),
            skipped_sheets: dataset.facts.skipped_sheets.len(),
            kpi_results: dataset.results.len(),
            null_results: dataset.results.iter().filter(|r| r.value.is_none()).count(),
        }
    }

    /// Print a formatted summary of the statistics
    pub fn print_summary(&self) {
        println!("=== Portfolio Dataset Statistics ===");
        println!("Facilities: {}", self.facilities);
        println!("Periods: {}", self.periods);
        println!("Facility Months: {}", self.facility_months);
        println!("Finance Facts: {}", self.finance_facts);
        println!("Census Facts: {}", self.census_facts);
        println!("Occupancy Facts: {}", self.occupancy_facts);
        if self.skipped_sheets > 0 {
            println!("Skipped Sheets: {}", self.skipped_sheets);
        }
        println!("KPI Results: {}", self.kpi_results);
        if self.kpi_results > 0 {
            println!("  Null: {} ({:.1}%)",
                self.null_results,
                (self.null_results as f64 / self.kpi_results as f64) * 100.0
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact_set() -> FactSet {
        let mut facts = FactSet::new();
        for (facility, period, revenue, days) in [
            ("202", "2025-02", 90_000.0, 900.0),
            ("101", "2025-01", 100_000.0, 1000.0),
            ("101", "2025-02", 110_000.0, 1000.0),
        ] {
            let facility_id = FacilityId::new(facility).unwrap();
            let period_id = PeriodId::new(period).unwrap();
            facts.finance_facts.push(FinanceFact {
                facility_id: facility_id.clone(),
                period_id: period_id.clone(),
                account_category: AccountCategory::Revenue,
                account_subcategory: "Total".to_string(),
                department: None,
                payer_category: None,
                amount: revenue,
                denominator_type: DenominatorType::ResidentDays,
                source_file: "book.xlsx".to_string(),
            });
            facts.census_facts.push(CensusFact {
                facility_id: facility_id.clone(),
                period_id,
                payer_category: PayerCategory::Medicaid,
                days,
                is_skilled: false,
                is_vent: false,
                source_file: "book.xlsx".to_string(),
            });
            if !facts.facility_ids.contains(&facility_id) {
                facts.facility_ids.push(facility_id.clone());
                facts.facilities.push(Facility::from_sheet(facility_id, "Test"));
            }
        }
        facts
    }

    #[test]
    fn test_results_are_sorted_and_complete() {
        let registry = KpiRegistry::standard();
        let per_key = registry.len();
        let dataset = PortfolioDataset::from_facts(fact_set(), registry);

        assert_eq!(dataset.len(), 3 * per_key);
        let first = &dataset.results()[0];
        assert_eq!((first.facility_id.as_str(), first.period_id.as_str()), ("101", "2025-01"));
        let last = &dataset.results()[dataset.len() - 1];
        assert_eq!(last.facility_id.as_str(), "202");

        let jan = dataset.results_for(&FacilityId::new("101").unwrap(), &PeriodId::new("2025-01").unwrap());
        assert_eq!(jan.len(), per_key);
        assert_eq!(jan[0].kpi_id, "total_revenue_ppd");
        assert_eq!(jan[0].value, Some(100.0));
    }

    #[test]
    fn test_thread_count_does_not_change_results() {
        let single = PortfolioDataset::with_threads(fact_set(), KpiRegistry::standard(), Some(1));
        let many = PortfolioDataset::with_threads(fact_set(), KpiRegistry::standard(), Some(4));
        assert_eq!(single.results(), many.results());
    }

    #[test]
    fn test_master_data_supplies_beds() {
        let mut facts = fact_set();
        let master = Facility {
            beds: Some(50),
            state: Some("OH".to_string()),
            ..Facility::from_sheet(FacilityId::new("101").unwrap(), "Maple Grove")
        };
        apply_master_data(&mut facts, vec![master]);
        let dataset = PortfolioDataset::from_facts(facts, KpiRegistry::standard());

        let facility = FacilityId::new("101").unwrap();
        let occupancy = dataset.analytics()
            .find(&facility, &PeriodId::new("2025-01").unwrap(), "operational_occupancy")
            .and_then(|r| r.value)
            .unwrap();
        // 1000 days over 50 beds x 31 days
        assert!((occupancy - 64.516).abs() < 0.001);
        assert_eq!(dataset.facility(&facility).unwrap().name, "Maple Grove");
        assert_eq!(dataset.periods_for(&facility).len(), 2);
    }

    #[test]
    fn test_builder_requires_workbook() {
        assert!(PortfolioDatasetBuilder::new().build().is_err());
        assert!(PortfolioDatasetBuilder::from_directory("/nonexistent/dir").is_err());
    }

    #[test]
    fn test_statistics() {
        let dataset = PortfolioDataset::from_facts(fact_set(), KpiRegistry::standard());
        let stats = dataset.statistics();
        assert_eq!(stats.facilities, 2);
        assert_eq!(stats.periods, 2);
        assert_eq!(stats.facility_months, 3);
        assert!(stats.null_results > 0);
    }
}
