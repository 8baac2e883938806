/*!
 * Data type definitions for portfolio facts and KPI results
 *
 * This module contains type-safe representations of the facts scraped from
 * facility income-statement workbooks and the KPI rows derived from them.
 */

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Facility identifier (the numeric code that prefixes a facility sheet name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FacilityId(pub String);

impl FacilityId {
    /// Create a new facility id, validating format
    pub fn new(id: impl Into<String>) -> Result<Self, crate::SnfError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty()
            || !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(crate::SnfError::invalid_facility_id(&id));
        }
        Ok(FacilityId(trimmed.to_string()))
    }

    /// Get the facility id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reporting period in `YYYY-MM` form
///
/// Lexicographic order of the inner string is chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodId(String);

impl PeriodId {
    /// Parse a `YYYY-MM` period id
    pub fn new(period: impl Into<String>) -> Result<Self, crate::SnfError> {
        let period = period.into();
        let valid = period.len() == 7
            && period.as_bytes()[4] == b'-'
            && period[..4].chars().all(|c| c.is_ascii_digit())
            && period[5..].chars().all(|c| c.is_ascii_digit())
            && matches!(period[5..].parse::<u32>(), Ok(1..=12));
        if !valid {
            return Err(crate::SnfError::invalid_period(&period));
        }
        Ok(PeriodId(period))
    }

    /// Period containing the given date
    pub fn from_date(date: NaiveDate) -> Self {
        PeriodId(format!("{:04}-{:02}", date.year(), date.month()))
    }

    /// Build from year and month
    pub fn from_year_month(year: i32, month: u32) -> Result<Self, crate::SnfError> {
        Self::new(format!("{:04}-{:02}", year, month))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn year(&self) -> i32 {
        self.0[..4].parse().unwrap_or_default()
    }

    pub fn month(&self) -> u32 {
        self.0[5..].parse().unwrap_or(1)
    }

    /// First calendar day of the period
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year(), self.month(), 1)
    }

    /// Number of calendar days in the period
    pub fn days_in_month(&self) -> u32 {
        let next = self.next();
        match (self.first_day(), next.first_day()) {
            (Some(start), Some(end)) => (end - start).num_days() as u32,
            _ => 30,
        }
    }

    /// The following month
    pub fn next(&self) -> PeriodId {
        let (year, month) = if self.month() == 12 {
            (self.year() + 1, 1)
        } else {
            (self.year(), self.month() + 1)
        };
        PeriodId(format!("{:04}-{:02}", year, month))
    }

    /// The preceding month
    pub fn previous(&self) -> PeriodId {
        let (year, month) = if self.month() == 1 {
            (self.year() - 1, 12)
        } else {
            (self.year(), self.month() - 1)
        };
        PeriodId(format!("{:04}-{:02}", year, month))
    }
}

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger side of a finance fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountCategory {
    Revenue,
    Expense,
}

impl AccountCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountCategory::Revenue => "Revenue",
            AccountCategory::Expense => "Expense",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "Revenue" => Some(AccountCategory::Revenue),
            "Expense" => Some(AccountCategory::Expense),
            _ => None,
        }
    }
}

impl fmt::Display for AccountCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payer category for revenue lines and census days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PayerCategory {
    #[serde(rename = "Medicare A")]
    MedicareA,
    #[serde(rename = "Medicare B")]
    MedicareB,
    #[serde(rename = "Managed Care")]
    ManagedCare,
    Medicaid,
    Private,
    Hospice,
    #[serde(rename = "VA")]
    Va,
    Other,
}

impl PayerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayerCategory::MedicareA => "Medicare A",
            PayerCategory::MedicareB => "Medicare B",
            PayerCategory::ManagedCare => "Managed Care",
            PayerCategory::Medicaid => "Medicaid",
            PayerCategory::Private => "Private",
            PayerCategory::Hospice => "Hospice",
            PayerCategory::Va => "VA",
            PayerCategory::Other => "Other",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "Medicare A" => Some(PayerCategory::MedicareA),
            "Medicare B" => Some(PayerCategory::MedicareB),
            "Managed Care" => Some(PayerCategory::ManagedCare),
            "Medicaid" => Some(PayerCategory::Medicaid),
            "Private" => Some(PayerCategory::Private),
            "Hospice" => Some(PayerCategory::Hospice),
            "VA" => Some(PayerCategory::Va),
            "Other" => Some(PayerCategory::Other),
            _ => None,
        }
    }
}

impl fmt::Display for PayerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which volume a KPI (or a finance line's PPD figure) is divided by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenominatorType {
    ResidentDays,
    SkilledDays,
    VentDays,
    PayerDays,
    BedDays,
    CalendarDays,
    Revenue,
    Expense,
}

impl DenominatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenominatorType::ResidentDays => "resident_days",
            DenominatorType::SkilledDays => "skilled_days",
            DenominatorType::VentDays => "vent_days",
            DenominatorType::PayerDays => "payer_days",
            DenominatorType::BedDays => "bed_days",
            DenominatorType::CalendarDays => "calendar_days",
            DenominatorType::Revenue => "revenue",
            DenominatorType::Expense => "expense",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "resident_days" => Some(DenominatorType::ResidentDays),
            "skilled_days" => Some(DenominatorType::SkilledDays),
            "vent_days" => Some(DenominatorType::VentDays),
            "payer_days" => Some(DenominatorType::PayerDays),
            "bed_days" => Some(DenominatorType::BedDays),
            "calendar_days" => Some(DenominatorType::CalendarDays),
            "revenue" => Some(DenominatorType::Revenue),
            "expense" => Some(DenominatorType::Expense),
            _ => None,
        }
    }

    /// Infer the day-count from a workbook "PPD lookup" cell
    pub fn from_ppd_lookup(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("skilled") {
            DenominatorType::SkilledDays
        } else if lower.contains("vent") {
            DenominatorType::VentDays
        } else {
            DenominatorType::ResidentDays
        }
    }
}

impl fmt::Display for DenominatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Care setting of a facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FacilitySetting {
    #[default]
    #[serde(rename = "SNF")]
    Snf,
    #[serde(rename = "ALF")]
    Alf,
    #[serde(rename = "ILF")]
    Ilf,
}

impl FacilitySetting {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "SNF" => Some(FacilitySetting::Snf),
            "ALF" => Some(FacilitySetting::Alf),
            "ILF" => Some(FacilitySetting::Ilf),
            _ => None,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            FacilitySetting::Snf => "SNF",
            FacilitySetting::Alf => "ALF",
            FacilitySetting::Ilf => "ILF",
        }
    }
}

/// Facility master data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub facility_id: FacilityId,
    pub name: String,
    pub state: Option<String>,
    /// `None` when the source does not say, e.g. a workbook sheet name
    pub setting: Option<FacilitySetting>,
    pub beds: Option<u32>,
    pub parent_opco: Option<String>,
}

impl Facility {
    /// Minimal record as discovered from a workbook sheet name
    pub fn from_sheet(facility_id: FacilityId, name: impl Into<String>) -> Self {
        Self {
            facility_id,
            name: name.into(),
            state: None,
            setting: None,
            beds: None,
            parent_opco: None,
        }
    }
}

/// One labeled ledger line for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinanceFact {
    pub facility_id: FacilityId,
    pub period_id: PeriodId,
    pub account_category: AccountCategory,
    pub account_subcategory: String,
    pub department: Option<String>,
    pub payer_category: Option<PayerCategory>,
    pub amount: f64,
    pub denominator_type: DenominatorType,
    pub source_file: String,
}

/// Resident-days for one payer/acuity combination in one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensusFact {
    pub facility_id: FacilityId,
    pub period_id: PeriodId,
    pub payer_category: PayerCategory,
    pub days: f64,
    pub is_skilled: bool,
    pub is_vent: bool,
    pub source_file: String,
}

/// Bed counts and patient-day totals for one facility month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyFact {
    pub facility_id: FacilityId,
    pub period_id: PeriodId,
    pub operational_beds: f64,
    pub licensed_beds: f64,
    pub total_patient_days: f64,
    pub total_unit_days: f64,
    pub second_occupant_days: f64,
    pub operational_occupancy: f64,
}

/// Presentation unit of a KPI value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiUnit {
    Currency,
    Percentage,
    Hours,
    Number,
}

impl KpiUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            KpiUnit::Currency => "currency",
            KpiUnit::Percentage => "percentage",
            KpiUnit::Hours => "hours",
            KpiUnit::Number => "number",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "currency" => Some(KpiUnit::Currency),
            "percentage" => Some(KpiUnit::Percentage),
            "hours" => Some(KpiUnit::Hours),
            "number" => Some(KpiUnit::Number),
            _ => None,
        }
    }
}

impl fmt::Display for KpiUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One computed KPI for one facility month
///
/// `value` is `None` when the denominator is zero or the numerator facts are
/// missing; numerator and denominator are still populated for auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiResult {
    pub facility_id: FacilityId,
    pub period_id: PeriodId,
    pub kpi_id: String,
    pub value: Option<f64>,
    pub numerator_value: f64,
    pub denominator_value: f64,
    pub denominator_type: DenominatorType,
    pub payer_scope: Option<String>,
    pub unit: KpiUnit,
    pub warnings: Vec<String>,
}

impl KpiResult {
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

/// A sheet the ingestor declined to parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSheet {
    pub sheet_name: String,
    pub reason: String,
}

/// Everything parsed out of one or more workbooks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactSet {
    pub finance_facts: Vec<FinanceFact>,
    pub census_facts: Vec<CensusFact>,
    pub occupancy_facts: Vec<OccupancyFact>,
    pub facility_ids: Vec<FacilityId>,
    pub facilities: Vec<Facility>,
    pub skipped_sheets: Vec<SkippedSheet>,
}

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no facility produced any facts
    pub fn is_empty(&self) -> bool {
        self.finance_facts.is_empty()
            && self.census_facts.is_empty()
            && self.occupancy_facts.is_empty()
    }

    /// Every (facility, period) pair that has at least one fact
    pub fn keys(&self) -> BTreeSet<(FacilityId, PeriodId)> {
        let mut keys = BTreeSet::new();
        for fact in &self.finance_facts {
            keys.insert((fact.facility_id.clone(), fact.period_id.clone()));
        }
        for fact in &self.census_facts {
            keys.insert((fact.facility_id.clone(), fact.period_id.clone()));
        }
        for fact in &self.occupancy_facts {
            keys.insert((fact.facility_id.clone(), fact.period_id.clone()));
        }
        keys
    }

    /// Append another fact set; facility ids stay unique and in first-seen order
    ///
    /// The later set wins: every (facility, period) it covers drops the
    /// finance, census and occupancy rows already held for that month.
    pub fn merge(&mut self, other: FactSet) {
        let replaced = other.keys();
        let covered = |facility: &FacilityId, period: &PeriodId| {
            replaced.contains(&(facility.clone(), period.clone()))
        };
        self.finance_facts.retain(|f| !covered(&f.facility_id, &f.period_id));
        self.census_facts.retain(|c| !covered(&c.facility_id, &c.period_id));
        self.occupancy_facts.retain(|o| !covered(&o.facility_id, &o.period_id));

        self.finance_facts.extend(other.finance_facts);
        self.census_facts.extend(other.census_facts);
        self.occupancy_facts.extend(other.occupancy_facts);
        for facility in other.facilities {
            if !self.facility_ids.contains(&facility.facility_id) {
                self.facility_ids.push(facility.facility_id.clone());
                self.facilities.push(facility);
            }
        }
        for id in other.facility_ids {
            if !self.facility_ids.contains(&id) {
                self.facility_ids.push(id);
            }
        }
        self.skipped_sheets.extend(other.skipped_sheets);
    }

    /// Finance facts for one (facility, period)
    pub fn finance_for<'a>(&'a self, facility: &'a FacilityId, period: &'a PeriodId) -> impl Iterator<Item = &'a FinanceFact> + 'a {
        self.finance_facts.iter()
            .filter(move |f| &f.facility_id == facility && &f.period_id == period)
    }

    /// Occupancy row for one (facility, period), if any
    pub fn occupancy_for(&self, facility: &FacilityId, period: &PeriodId) -> Option<&OccupancyFact> {
        self.occupancy_facts.iter()
            .find(|o| &o.facility_id == facility && &o.period_id == period)
    }

    /// One-line summary of the parse
    pub fn summary(&self) -> String {
        format!(
            "{} facilities, {} finance facts, {} census facts, {} occupancy facts, {} sheets skipped",
            self.facility_ids.len(),
            self.finance_facts.len(),
            self.census_facts.len(),
            self.occupancy_facts.len(),
            self.skipped_sheets.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_validation() {
        assert!(PeriodId::new("2025-01").is_ok());
        assert!(PeriodId::new("2025-13").is_err());
        assert!(PeriodId::new("2025-1").is_err());
        assert!(PeriodId::new("25-01-01").is_err());
    }

    #[test]
    fn test_period_navigation() {
        let period = PeriodId::new("2024-12").unwrap();
        assert_eq!(period.next().as_str(), "2025-01");
        assert_eq!(period.previous().as_str(), "2024-11");
        assert_eq!(period.days_in_month(), 31);
        assert_eq!(PeriodId::new("2024-02").unwrap().days_in_month(), 29);
        assert_eq!(PeriodId::new("2025-02").unwrap().days_in_month(), 28);
    }

    #[test]
    fn test_facility_id_validation() {
        assert_eq!(FacilityId::new(" 101 ").unwrap().as_str(), "101");
        assert!(FacilityId::new("").is_err());
        assert!(FacilityId::new("10 1").is_err());
    }

    #[test]
    fn test_ppd_lookup_keywords() {
        assert_eq!(DenominatorType::from_ppd_lookup("Skilled PPD"), DenominatorType::SkilledDays);
        assert_eq!(DenominatorType::from_ppd_lookup("Vent PPD"), DenominatorType::VentDays);
        assert_eq!(DenominatorType::from_ppd_lookup("Total PPD"), DenominatorType::ResidentDays);
        assert_eq!(DenominatorType::from_ppd_lookup(""), DenominatorType::ResidentDays);
    }

    #[test]
    fn test_fact_set_merge_replaces_occupancy() {
        let facility = FacilityId::new("101").unwrap();
        let period = PeriodId::new("2025-01").unwrap();
        let occupancy = |beds: f64| OccupancyFact {
            facility_id: facility.clone(),
            period_id: period.clone(),
            operational_beds: beds,
            licensed_beds: beds,
            total_patient_days: 0.0,
            total_unit_days: 0.0,
            second_occupant_days: 0.0,
            operational_occupancy: 0.0,
        };

        let mut first = FactSet::new();
        first.occupancy_facts.push(occupancy(100.0));
        let mut second = FactSet::new();
        second.occupancy_facts.push(occupancy(120.0));

        first.merge(second);
        assert_eq!(first.occupancy_facts.len(), 1);
        assert_eq!(first.occupancy_facts[0].operational_beds, 120.0);
    }

    #[test]
    fn test_fact_set_merge_same_month_twice_is_idempotent() {
        let facility = FacilityId::new("101").unwrap();
        let january = PeriodId::new("2025-01").unwrap();
        let february = PeriodId::new("2025-02").unwrap();
        let census = |period: &PeriodId, days: f64| CensusFact {
            facility_id: facility.clone(),
            period_id: period.clone(),
            payer_category: PayerCategory::Medicaid,
            days,
            is_skilled: false,
            is_vent: false,
            source_file: "upload.xlsx".to_string(),
        };
        let revenue = |period: &PeriodId, amount: f64| FinanceFact {
            facility_id: facility.clone(),
            period_id: period.clone(),
            account_category: AccountCategory::Revenue,
            account_subcategory: "Total Revenue".to_string(),
            department: None,
            payer_category: None,
            amount,
            denominator_type: DenominatorType::ResidentDays,
            source_file: "upload.xlsx".to_string(),
        };

        let mut once = FactSet::new();
        once.census_facts.push(census(&january, 800.0));
        once.census_facts.push(census(&february, 700.0));
        once.finance_facts.push(revenue(&january, 100_000.0));

        let mut twice = once.clone();
        twice.merge(once.clone());
        assert_eq!(twice.census_facts.len(), 2);
        assert_eq!(twice.finance_facts.len(), 1);
        let january_days: f64 = twice.census_facts.iter()
            .filter(|c| c.period_id == january)
            .map(|c| c.days)
            .sum();
        assert_eq!(january_days, 800.0);

        // A corrected January leaves February alone
        let mut correction = FactSet::new();
        correction.census_facts.push(census(&january, 820.0));
        twice.merge(correction);
        let mut days: Vec<(String, f64)> = twice.census_facts.iter()
            .map(|c| (c.period_id.to_string(), c.days))
            .collect();
        days.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(days, vec![("2025-01".to_string(), 820.0), ("2025-02".to_string(), 700.0)]);
        // The correction replaces all of January, revenue included
        assert!(twice.finance_facts.is_empty());
    }
}
