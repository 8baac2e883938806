/*!
 * Analytics and querying over computed KPI results
 *
 * This module assembles per-facility KPI time series and derives trailing
 * statistics, trends, correlations and portfolio comparisons from them.
 */

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::{
    data_types::*,
    kpi::{KpiRegistry, KpiStatus},
    statistics::{self, Correlation, TrailingStats, TrendLine},
};

/// Analytics engine over a slice of KPI results
pub struct PortfolioAnalytics<'a> {
    results: &'a [KpiResult],
    registry: Option<&'a KpiRegistry>,
    facilities: Option<&'a [Facility]>,
}

impl<'a> PortfolioAnalytics<'a> {
    pub fn new(results: &'a [KpiResult]) -> Self {
        Self {
            results,
            registry: None,
            facilities: None,
        }
    }

    /// Registry used for ranking direction and threshold status
    pub fn with_registry(mut self, registry: &'a KpiRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Facility master data for display names
    pub fn with_facilities(mut self, facilities: &'a [Facility]) -> Self {
        self.facilities = Some(facilities);
        self
    }

    /// Basic statistics about the result set
    pub fn dataset_stats(&self) -> PortfolioStats {
        let facilities = self.results.iter().map(|r| &r.facility_id).collect::<BTreeSet<_>>();
        let periods = self.results.iter().map(|r| &r.period_id).collect::<BTreeSet<_>>();
        let kpis = self.results.iter().map(|r| r.kpi_id.as_str()).collect::<BTreeSet<_>>();

        PortfolioStats {
            total_results: self.results.len(),
            facilities: facilities.len(),
            periods: periods.len(),
            kpis: kpis.len(),
            first_period: periods.first().map(|p| (*p).clone()),
            last_period: periods.last().map(|p| (*p).clone()),
            null_results: self.results.iter().filter(|r| r.value.is_none()).count(),
            results_with_warnings: self.results.iter().filter(|r| !r.warnings.is_empty()).count(),
        }
    }

    /// One result by key
    pub fn find(&self, facility_id: &FacilityId, period_id: &PeriodId, kpi_id: &str) -> Option<&'a KpiResult> {
        self.results.iter()
            .find(|r| &r.facility_id == facility_id && &r.period_id == period_id && r.kpi_id == kpi_id)
    }

    /// Display name of a facility, falling back to its id
    pub fn facility_name(&self, facility_id: &FacilityId) -> String {
        self.facilities
            .and_then(|fs| fs.iter().find(|f| &f.facility_id == facility_id))
            .map(|f| f.name.clone())
            .unwrap_or_else(|| facility_id.to_string())
    }

    /// Monthly series of one KPI for one facility
    ///
    /// Missing months between the first and last observation are filled with
    /// `None` so positions line up with calendar months.
    pub fn series(&self, facility_id: &FacilityId, kpi_id: &str) -> KpiSeries {
        let observed: BTreeMap<&PeriodId, Option<f64>> = self.results.iter()
            .filter(|r| &r.facility_id == facility_id && r.kpi_id == kpi_id)
            .map(|r| (&r.period_id, r.value))
            .collect();

        let mut points = Vec::new();
        if let (Some(first), Some(last)) = (observed.keys().next(), observed.keys().next_back()) {
            let mut period = (*first).clone();
            while &period <= *last {
                let value = observed.get(&period).copied().flatten();
                let next = period.next();
                points.push(SeriesPoint { period_id: period, value });
                period = next;
            }
        }

        KpiSeries {
            facility_id: facility_id.clone(),
            kpi_id: kpi_id.to_string(),
            points,
        }
    }

    /// Trailing-window summary of one KPI
    pub fn trailing(&self, facility_id: &FacilityId, kpi_id: &str, window: usize, threshold: f64) -> TrailingStats {
        let series = self.series(facility_id, kpi_id);
        statistics::trailing_stats_with_threshold(&series.values(), window, threshold)
    }

    /// Linear trend over every non-null observation, positioned by calendar month
    pub fn trend(&self, facility_id: &FacilityId, kpi_id: &str, threshold: f64) -> Option<TrendLine> {
        let series = self.series(facility_id, kpi_id);
        statistics::linear_trend_series(&series.values(), threshold)
    }

    /// Correlate two KPIs of one facility over the months both were computed
    pub fn correlate(&self, facility_id: &FacilityId, kpi_a: &str, kpi_b: &str) -> Correlation {
        let a = self.values_by_period(facility_id, kpi_a);
        let b = self.values_by_period(facility_id, kpi_b);
        let periods: BTreeSet<&PeriodId> = a.keys().chain(b.keys()).copied().collect();

        let xs: Vec<Option<f64>> = periods.iter().map(|p| a.get(p).copied().flatten()).collect();
        let ys: Vec<Option<f64>> = periods.iter().map(|p| b.get(p).copied().flatten()).collect();
        statistics::pearson(&xs, &ys)
    }

    fn values_by_period(&self, facility_id: &FacilityId, kpi_id: &str) -> BTreeMap<&'a PeriodId, Option<f64>> {
        self.results.iter()
            .filter(|r| &r.facility_id == facility_id && r.kpi_id == kpi_id)
            .map(|r| (&r.period_id, r.value))
            .collect()
    }

    /// Unweighted mean across facilities for one KPI month
    pub fn portfolio_average(&self, kpi_id: &str, period_id: &PeriodId) -> Option<f64> {
        let values: Vec<f64> = self.results.iter()
            .filter(|r| r.kpi_id == kpi_id && &r.period_id == period_id)
            .filter_map(|r| r.value)
            .collect();
        (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Facilities ordered best first for one KPI month; nulls are left out
    pub fn ranking(&self, kpi_id: &str, period_id: &PeriodId) -> Vec<RankedFacility> {
        let definition = self.registry.and_then(|r| r.get(kpi_id));
        let higher_is_better = definition.map_or(true, |d| d.higher_is_better);

        let mut ranked: Vec<RankedFacility> = self.results.iter()
            .filter(|r| r.kpi_id == kpi_id && &r.period_id == period_id)
            .filter_map(|r| {
                let value = r.value?;
                Some(RankedFacility {
                    facility_id: r.facility_id.clone(),
                    name: self.facility_name(&r.facility_id),
                    value,
                    status: definition.map_or(KpiStatus::Unknown, |d| d.status(Some(value))),
                    rank: 0,
                })
            })
            .collect();

        ranked.sort_by(|a, b| {
            let order = a.value.partial_cmp(&b.value).unwrap_or(Ordering::Equal);
            let order = if higher_is_better { order.reverse() } else { order };
            order.then_with(|| a.facility_id.cmp(&b.facility_id))
        });
        for (i, entry) in ranked.iter_mut().enumerate() {
            entry.rank = i + 1;
        }
        ranked
    }

    /// Count of results per threshold status for one period
    pub fn status_counts(&self, period_id: &PeriodId) -> HashMap<KpiStatus, usize> {
        let mut counts = HashMap::new();
        for result in self.results.iter().filter(|r| &r.period_id == period_id) {
            let status = self.registry
                .and_then(|reg| reg.get(&result.kpi_id))
                .map_or(KpiStatus::Unknown, |d| d.status(result.value));
            *counts.entry(status).or_insert(0) += 1;
        }
        counts
    }

    /// Results grouped by facility
    pub fn create_facility_index(&self) -> HashMap<&'a FacilityId, Vec<&'a KpiResult>> {
        let mut index: HashMap<&FacilityId, Vec<&KpiResult>> = HashMap::new();
        for result in self.results {
            index.entry(&result.facility_id).or_default().push(result);
        }
        index
    }

    pub fn query(&'a self) -> ResultQuery<'a> {
        ResultQuery::new(self)
    }
}

/// Statistics about a KPI result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub total_results: usize,
    pub facilities: usize,
    pub periods: usize,
    pub kpis: usize,
    pub first_period: Option<PeriodId>,
    pub last_period: Option<PeriodId>,
    pub null_results: usize,
    pub results_with_warnings: usize,
}

impl PortfolioStats {
    /// Print formatted statistics
    pub fn print_summary(&self) {
        println!("=== Portfolio KPI Statistics ===");
        println!("KPI Results: {}", self.total_results);
        println!("Facilities: {}", self.facilities);
        println!("KPIs: {}", self.kpis);
        match (&self.first_period, &self.last_period) {
            (Some(first), Some(last)) => println!("Periods: {} ({} to {})", self.periods, first, last),
            _ => println!("Periods: {}", self.periods),
        }
        println!("Null Results: {}", self.null_results);
        println!("Results With Warnings: {}", self.results_with_warnings);

        if self.total_results > 0 {
            let computed = self.total_results - self.null_results;
            println!("Computed Percentage: {:.1}%", computed as f64 / self.total_results as f64 * 100.0);
        }
    }
}

/// One month of a KPI series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub period_id: PeriodId,
    pub value: Option<f64>,
}

/// A facility's monthly values for one KPI, ordered by period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSeries {
    pub facility_id: FacilityId,
    pub kpi_id: String,
    pub points: Vec<SeriesPoint>,
}

impl KpiSeries {
    pub fn values(&self) -> Vec<Option<f64>> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn present_values(&self) -> Vec<f64> {
        self.points.iter().filter_map(|p| p.value).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A facility's position in a KPI ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFacility {
    pub rank: usize,
    pub facility_id: FacilityId,
    pub name: String,
    pub value: f64,
    pub status: KpiStatus,
}

/// Query builder for KPI result searches
pub struct ResultQuery<'a> {
    analytics: &'a PortfolioAnalytics<'a>,
    filters: Vec<Box<dyn Fn(&KpiResult) -> bool + 'a>>,
}

impl<'a> ResultQuery<'a> {
    pub fn new(analytics: &'a PortfolioAnalytics<'a>) -> Self {
        Self {
            analytics,
            filters: Vec::new(),
        }
    }

    pub fn facility(mut self, facility_id: &FacilityId) -> Self {
        let facility_id = facility_id.clone();
        self.filters.push(Box::new(move |r| r.facility_id == facility_id));
        self
    }

    pub fn kpi<S: AsRef<str>>(mut self, kpi_id: S) -> Self {
        let kpi_id = kpi_id.as_ref().to_string();
        self.filters.push(Box::new(move |r| r.kpi_id == kpi_id));
        self
    }

    pub fn period(mut self, period_id: &PeriodId) -> Self {
        let period_id = period_id.clone();
        self.filters.push(Box::new(move |r| r.period_id == period_id));
        self
    }

    /// Inclusive period range
    pub fn period_between(mut self, start: &PeriodId, end: &PeriodId) -> Self {
        let (start, end) = (start.clone(), end.clone());
        self.filters.push(Box::new(move |r| r.period_id >= start && r.period_id <= end));
        self
    }

    pub fn with_value_only(mut self) -> Self {
        self.filters.push(Box::new(|r| r.value.is_some()));
        self
    }

    pub fn with_warnings_only(mut self) -> Self {
        self.filters.push(Box::new(|r| !r.warnings.is_empty()));
        self
    }

    /// Execute the query and return matching results
    pub fn execute(self) -> Vec<&'a KpiResult> {
        self.analytics.results.iter()
            .filter(|result| self.filters.iter().all(|filter| filter(result)))
            .collect()
    }

    pub fn count(self) -> usize {
        self.execute().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::TrendDirection;

    fn result(facility: &str, period: &str, kpi: &str, value: Option<f64>) -> KpiResult {
        KpiResult {
            facility_id: FacilityId::new(facility).unwrap(),
            period_id: PeriodId::new(period).unwrap(),
            kpi_id: kpi.to_string(),
            value,
            numerator_value: value.unwrap_or(0.0),
            denominator_value: if value.is_some() { 1.0 } else { 0.0 },
            denominator_type: DenominatorType::ResidentDays,
            payer_scope: None,
            unit: KpiUnit::Currency,
            warnings: if value.is_some() { Vec::new() } else { vec![format!("zero denominator for {}", kpi)] },
        }
    }

    fn sample() -> Vec<KpiResult> {
        vec![
            result("101", "2025-01", "total_cost_ppd", Some(300.0)),
            result("101", "2025-02", "total_cost_ppd", Some(290.0)),
            result("101", "2025-04", "total_cost_ppd", Some(270.0)),
            result("101", "2025-01", "total_revenue_ppd", Some(330.0)),
            result("101", "2025-02", "total_revenue_ppd", Some(320.0)),
            result("101", "2025-04", "total_revenue_ppd", None),
            result("202", "2025-01", "total_cost_ppd", Some(250.0)),
            result("303", "2025-01", "total_cost_ppd", None),
        ]
    }

    #[test]
    fn test_series_fills_gaps() {
        let results = sample();
        let analytics = PortfolioAnalytics::new(&results);
        let series = analytics.series(&FacilityId::new("101").unwrap(), "total_cost_ppd");

        let periods: Vec<&str> = series.points.iter().map(|p| p.period_id.as_str()).collect();
        assert_eq!(periods, vec!["2025-01", "2025-02", "2025-03", "2025-04"]);
        assert_eq!(series.values(), vec![Some(300.0), Some(290.0), None, Some(270.0)]);
        assert_eq!(series.present_values().len(), 3);
    }

    #[test]
    fn test_trailing_and_trend() {
        let results = sample();
        let analytics = PortfolioAnalytics::new(&results);
        let facility = FacilityId::new("101").unwrap();

        let stats = analytics.trailing(&facility, "total_cost_ppd", 12, 0.01);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.current, Some(270.0));
        assert_eq!(stats.min, Some(270.0));

        let trend = analytics.trend(&facility, "total_cost_ppd", 0.01).unwrap();
        assert_eq!(trend.direction, TrendDirection::Down);

        // March is missing, so April sits three months after January
        assert!((trend.slope + 10.0).abs() < 1e-9);
        assert!((trend.forecast(1) - 260.0).abs() < 1e-9);
        let trailing = stats.trend.unwrap();
        assert!((trailing.slope + 10.0).abs() < 1e-9);
        assert!((trailing.forecast(1) - 260.0).abs() < 1e-9);
    }

    #[test]
    fn test_correlate_aligns_on_period() {
        let results = sample();
        let analytics = PortfolioAnalytics::new(&results);
        let corr = analytics.correlate(&FacilityId::new("101").unwrap(), "total_cost_ppd", "total_revenue_ppd");
        // April revenue is null, so only two pairs remain
        assert_eq!(corr.n, 2);
        assert!((corr.r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ranking_and_average() {
        let results = sample();
        let registry = KpiRegistry::standard();
        let analytics = PortfolioAnalytics::new(&results).with_registry(&registry);
        let period = PeriodId::new("2025-01").unwrap();

        let ranked = analytics.ranking("total_cost_ppd", &period);
        assert_eq!(ranked.len(), 2);
        // Lower cost ranks first
        assert_eq!(ranked[0].facility_id.as_str(), "202");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].status, KpiStatus::OnTarget);
        assert_eq!(ranked[1].status, KpiStatus::Watch);

        assert_eq!(analytics.portfolio_average("total_cost_ppd", &period), Some(275.0));
        assert_eq!(analytics.portfolio_average("vent_mix", &period), None);
    }

    #[test]
    fn test_query_builder_and_stats() {
        let results = sample();
        let analytics = PortfolioAnalytics::new(&results);

        let facility = FacilityId::new("101").unwrap();
        assert_eq!(analytics.query().facility(&facility).kpi("total_cost_ppd").count(), 3);
        assert_eq!(analytics.query().with_warnings_only().count(), 2);
        assert_eq!(
            analytics.query()
                .period_between(&PeriodId::new("2025-02").unwrap(), &PeriodId::new("2025-04").unwrap())
                .with_value_only()
                .count(),
            3
        );

        let stats = analytics.dataset_stats();
        assert_eq!(stats.facilities, 3);
        assert_eq!(stats.kpis, 2);
        assert_eq!(stats.null_results, 2);
        assert_eq!(stats.first_period.unwrap().as_str(), "2025-01");
    }
}
