/*!
 * KPI registry and calculator
 *
 * A [`KpiRegistry`] is a read-only table of named formulas. The
 * [`KpiCalculator`] evaluates every entry of an injected registry for one
 * facility month and always returns one [`KpiResult`] per entry; problems
 * such as a zero denominator become a null value plus a warning.
 */

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    Result, SnfError,
    data_types::*,
    denominators::{self, Denominators},
};

/// Selects finance facts by category, subcategory and optionally payer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactSelector {
    pub category: AccountCategory,
    pub subcategories: Vec<String>,
    #[serde(default)]
    pub payer: Option<PayerCategory>,
}

impl FactSelector {
    pub fn matches(&self, fact: &FinanceFact) -> bool {
        fact.account_category == self.category
            && self.subcategories.iter().any(|s| s == &fact.account_subcategory)
            && self.payer.map_or(true, |p| fact.payer_category == Some(p))
    }
}

/// One signed term of a finance operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinanceTerm {
    #[serde(flatten)]
    pub selector: FactSelector,
    #[serde(default)]
    pub subtract: bool,
}

/// Where a numerator or denominator value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Operand {
    /// Signed sum of matching finance amounts
    Finance { terms: Vec<FinanceTerm> },
    ResidentDays,
    SkilledDays,
    VentDays,
    PayerDays { payers: Vec<PayerCategory> },
    /// Operational beds times days in the month
    BedDays,
    CalendarDays,
}

impl Operand {
    /// The denominator type reported when this operand divides
    pub fn denominator_type(&self) -> DenominatorType {
        match self {
            Operand::Finance { terms } => match terms.first().map(|t| t.selector.category) {
                Some(AccountCategory::Expense) => DenominatorType::Expense,
                _ => DenominatorType::Revenue,
            },
            Operand::ResidentDays => DenominatorType::ResidentDays,
            Operand::SkilledDays => DenominatorType::SkilledDays,
            Operand::VentDays => DenominatorType::VentDays,
            Operand::PayerDays { .. } => DenominatorType::PayerDays,
            Operand::BedDays => DenominatorType::BedDays,
            Operand::CalendarDays => DenominatorType::CalendarDays,
        }
    }
}

/// Benchmark thresholds for a KPI
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiThresholds {
    #[serde(default)]
    pub target: Option<f64>,
    #[serde(default)]
    pub alert: Option<f64>,
}

/// Where a KPI value sits against its thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiStatus {
    OnTarget,
    Watch,
    Alert,
    Unknown,
}

/// A registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDefinition {
    pub kpi_id: String,
    pub name: String,
    pub description: String,
    pub formula: String,
    pub unit: KpiUnit,
    pub higher_is_better: bool,
    #[serde(default)]
    pub payer_scope: Option<String>,
    pub numerator: Operand,
    pub denominator: Operand,
    #[serde(default)]
    pub thresholds: KpiThresholds,
}

impl KpiDefinition {
    pub fn denominator_type(&self) -> DenominatorType {
        self.denominator.denominator_type()
    }

    /// Classify a value against the thresholds
    pub fn status(&self, value: Option<f64>) -> KpiStatus {
        let Some(value) = value else { return KpiStatus::Unknown };
        let KpiThresholds { target, alert } = self.thresholds;
        if target.is_none() && alert.is_none() {
            return KpiStatus::Unknown;
        }

        let better_or_equal = |v: f64, bound: f64| {
            if self.higher_is_better { v >= bound } else { v <= bound }
        };

        // At or past the alert bound in the bad direction
        if alert.is_some_and(|alert| better_or_equal(alert, value)) {
            return KpiStatus::Alert;
        }
        match target {
            Some(target) if better_or_equal(value, target) => KpiStatus::OnTarget,
            Some(_) => KpiStatus::Watch,
            None => KpiStatus::OnTarget,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RegistryFile {
    #[serde(rename = "kpi")]
    definitions: Vec<KpiDefinition>,
}

/// Read-only set of KPI definitions, in evaluation order
#[derive(Debug, Clone, PartialEq)]
pub struct KpiRegistry {
    definitions: Vec<KpiDefinition>,
    index: HashMap<String, usize>,
}

impl KpiRegistry {
    /// Build a registry; KPI ids must be unique
    pub fn from_definitions(definitions: Vec<KpiDefinition>) -> Result<Self> {
        let mut index = HashMap::with_capacity(definitions.len());
        for (i, def) in definitions.iter().enumerate() {
            if index.insert(def.kpi_id.clone(), i).is_some() {
                return Err(SnfError::Configuration {
                    message: format!("duplicate KPI id '{}' in registry", def.kpi_id),
                    suggestion: Some("Give every [[kpi]] entry a distinct kpi_id".to_string()),
                });
            }
        }
        Ok(Self { definitions, index })
    }

    /// Parse a registry from TOML (`[[kpi]]` tables)
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: RegistryFile = toml::from_str(contents)
            .map_err(|e| SnfError::Configuration {
                message: format!("Failed to parse KPI registry: {}", e),
                suggestion: Some("Check that the file is valid TOML with [[kpi]] entries".to_string()),
            })?;
        Self::from_definitions(file.definitions)
    }

    /// Serialize the registry to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        let file = RegistryFile { definitions: self.definitions.clone() };
        toml::to_string_pretty(&file)
            .map_err(|e| SnfError::Configuration {
                message: format!("Failed to serialize KPI registry: {}", e),
                suggestion: None,
            })
    }

    pub fn get(&self, kpi_id: &str) -> Option<&KpiDefinition> {
        self.index.get(kpi_id).map(|&i| &self.definitions[i])
    }

    /// Look up a KPI or fail with the list of known ids
    pub fn require(&self, kpi_id: &str) -> Result<&KpiDefinition> {
        self.get(kpi_id)
            .ok_or_else(|| SnfError::unknown_kpi(kpi_id, self.ids().map(str::to_string)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &KpiDefinition> {
        self.definitions.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.kpi_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// The standard skilled-nursing KPI set
    pub fn standard() -> Self {
        Self::from_definitions(standard_definitions()).unwrap_or_else(|e| {
            log::error!("standard KPI registry is invalid: {}", e);
            debug_assert!(false, "standard KPI registry is invalid: {}", e);
            Self { definitions: Vec::new(), index: HashMap::new() }
        })
    }
}

impl Default for KpiRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn finance_op(terms: &[(AccountCategory, &[&str], Option<PayerCategory>, bool)]) -> Operand {
    Operand::Finance {
        terms: terms.iter()
            .map(|(category, subs, payer, subtract)| FinanceTerm {
                selector: FactSelector {
                    category: *category,
                    subcategories: subs.iter().map(|s| s.to_string()).collect(),
                    payer: *payer,
                },
                subtract: *subtract,
            })
            .collect(),
    }
}

fn revenue(subs: &[&str]) -> Operand {
    finance_op(&[(AccountCategory::Revenue, subs, None, false)])
}

fn expense(subs: &[&str]) -> Operand {
    finance_op(&[(AccountCategory::Expense, subs, None, false)])
}

#[allow(clippy::too_many_arguments)]
fn define(
    kpi_id: &str,
    name: &str,
    description: &str,
    formula: &str,
    unit: KpiUnit,
    higher_is_better: bool,
    payer_scope: Option<&str>,
    numerator: Operand,
    denominator: Operand,
    target: Option<f64>,
    alert: Option<f64>,
) -> KpiDefinition {
    KpiDefinition {
        kpi_id: kpi_id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        formula: formula.to_string(),
        unit,
        higher_is_better,
        payer_scope: payer_scope.map(str::to_string),
        numerator,
        denominator,
        thresholds: KpiThresholds { target, alert },
    }
}

fn standard_definitions() -> Vec<KpiDefinition> {
    use AccountCategory::{Expense, Revenue};
    use KpiUnit::{Currency, Number, Percentage};
    use PayerCategory::{ManagedCare, MedicareA, Medicaid, Private};

    vec![
        define("total_revenue_ppd", "Total Revenue PPD",
            "Total operating revenue per resident day",
            "Revenue/Total ÷ resident days",
            Currency, true, None,
            revenue(&["Total"]), Operand::ResidentDays, Some(320.0), Some(280.0)),
        define("total_cost_ppd", "Total Cost PPD",
            "Total operating expense per resident day",
            "Expense/Total Operating ÷ resident days",
            Currency, false, None,
            expense(&["Total Operating"]), Operand::ResidentDays, Some(280.0), Some(320.0)),
        define("nursing_cost_ppd", "Nursing Cost PPD",
            "Nursing wages and benefits per resident day",
            "Expense/Nursing ÷ resident days",
            Currency, false, None,
            expense(&["Nursing"]), Operand::ResidentDays, Some(120.0), Some(150.0)),
        define("therapy_cost_ppd", "Therapy Cost PPD",
            "Therapy expense per resident day",
            "Expense/Therapy ÷ resident days",
            Currency, false, None,
            expense(&["Therapy"]), Operand::ResidentDays, Some(25.0), Some(40.0)),
        define("dietary_cost_ppd", "Dietary Cost PPD",
            "Dietary expense per resident day",
            "Expense/Dietary ÷ resident days",
            Currency, false, None,
            expense(&["Dietary"]), Operand::ResidentDays, Some(15.0), Some(20.0)),
        define("skilled_revenue_psd", "Skilled Revenue PSD",
            "Medicare A and managed care revenue per skilled day",
            "Revenue/(Medicare A + Managed Care) ÷ skilled days",
            Currency, true, Some("Medicare A + Managed Care"),
            revenue(&["Medicare A", "Managed Care"]), Operand::SkilledDays, Some(650.0), Some(550.0)),
        define("medicare_a_revenue_ppd", "Medicare A Revenue PPD",
            "Medicare Part A revenue per Medicare A day",
            "Revenue/Medicare A ÷ Medicare A days",
            Currency, true, Some("Medicare A"),
            revenue(&["Medicare A"]), Operand::PayerDays { payers: vec![MedicareA] }, Some(650.0), Some(550.0)),
        define("managed_care_revenue_ppd", "Managed Care Revenue PPD",
            "Managed care revenue per managed care day",
            "Revenue/Managed Care ÷ Managed Care days",
            Currency, true, Some("Managed Care"),
            revenue(&["Managed Care"]), Operand::PayerDays { payers: vec![ManagedCare] }, Some(500.0), Some(420.0)),
        define("medicaid_revenue_ppd", "Medicaid Revenue PPD",
            "Medicaid revenue per Medicaid day",
            "Revenue/Medicaid ÷ Medicaid days",
            Currency, true, Some("Medicaid"),
            revenue(&["Medicaid"]), Operand::PayerDays { payers: vec![Medicaid] }, Some(260.0), Some(230.0)),
        define("private_revenue_ppd", "Private Pay Revenue PPD",
            "Private pay revenue per private day",
            "Revenue/Private ÷ Private days",
            Currency, true, Some("Private"),
            revenue(&["Private"]), Operand::PayerDays { payers: vec![Private] }, Some(330.0), Some(290.0)),
        define("ebitdar_margin", "EBITDAR Margin",
            "Operating margin before rent",
            "(Revenue/Total − Expense/Total Operating) ÷ Revenue/Total",
            Percentage, true, None,
            finance_op(&[
                (Revenue, &["Total"], None, false),
                (Expense, &["Total Operating"], None, true),
            ]),
            revenue(&["Total"]), Some(15.0), Some(8.0)),
        define("ebitda_margin", "EBITDA Margin",
            "Operating margin after rent",
            "(Revenue/Total − Expense/Total Operating − Expense/Rent) ÷ Revenue/Total",
            Percentage, true, None,
            finance_op(&[
                (Revenue, &["Total"], None, false),
                (Expense, &["Total Operating"], None, true),
                (Expense, &["Rent"], None, true),
            ]),
            revenue(&["Total"]), Some(8.0), Some(2.0)),
        define("contract_labor_pct", "Contract Labor %",
            "Agency labor as a share of nursing expense",
            "Expense/Contract Labor ÷ Expense/Nursing",
            Percentage, false, None,
            expense(&["Contract Labor"]), expense(&["Nursing"]), Some(5.0), Some(15.0)),
        define("skilled_mix", "Skilled Mix",
            "Skilled days as a share of resident days",
            "skilled days ÷ resident days",
            Percentage, true, None,
            Operand::SkilledDays, Operand::ResidentDays, Some(20.0), Some(12.0)),
        define("medicare_a_mix", "Medicare A Mix",
            "Medicare A days as a share of resident days",
            "Medicare A days ÷ resident days",
            Percentage, true, Some("Medicare A"),
            Operand::PayerDays { payers: vec![MedicareA] }, Operand::ResidentDays, Some(12.0), Some(6.0)),
        define("medicaid_mix", "Medicaid Mix",
            "Medicaid days as a share of resident days",
            "Medicaid days ÷ resident days",
            Percentage, false, Some("Medicaid"),
            Operand::PayerDays { payers: vec![Medicaid] }, Operand::ResidentDays, None, None),
        define("vent_mix", "Vent Mix",
            "Ventilator days as a share of resident days",
            "vent days ÷ resident days",
            Percentage, true, None,
            Operand::VentDays, Operand::ResidentDays, None, None),
        define("operational_occupancy", "Operational Occupancy",
            "Resident days over available operational bed days",
            "resident days ÷ (operational beds × days in month)",
            Percentage, true, None,
            Operand::ResidentDays, Operand::BedDays, Some(90.0), Some(80.0)),
        define("revenue_per_available_bed_day", "Revenue per Available Bed Day",
            "Total revenue over available operational bed days",
            "Revenue/Total ÷ (operational beds × days in month)",
            Currency, true, None,
            revenue(&["Total"]), Operand::BedDays, Some(280.0), Some(240.0)),
        define("average_daily_census", "Average Daily Census",
            "Average residents in house per day",
            "resident days ÷ days in month",
            Number, true, None,
            Operand::ResidentDays, Operand::CalendarDays, None, None),
    ]
}

/// Every KPI for one (facility, period), in registry order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiOutput {
    pub results: Vec<KpiResult>,
}

impl KpiOutput {
    pub fn get(&self, kpi_id: &str) -> Option<&KpiResult> {
        self.results.iter().find(|r| r.kpi_id == kpi_id)
    }

    /// Value of one KPI, `None` when absent or null
    pub fn value(&self, kpi_id: &str) -> Option<f64> {
        self.get(kpi_id).and_then(|r| r.value)
    }

    /// Number of results that carry at least one warning
    pub fn warning_count(&self) -> usize {
        self.results.iter().filter(|r| !r.warnings.is_empty()).count()
    }
}

/// Evaluated operand plus whether any backing fact existed
#[derive(Debug, Clone, Copy)]
struct OperandValue {
    value: f64,
    has_facts: bool,
}

struct Evaluation<'a> {
    finance: Vec<&'a FinanceFact>,
    denominators: Denominators,
    operational_beds: Option<f64>,
    days_in_month: f64,
}

impl Evaluation<'_> {
    fn operand(&self, operand: &Operand) -> OperandValue {
        let days = |value: f64| OperandValue { value, has_facts: true };
        match operand {
            Operand::Finance { terms } => {
                let mut value = 0.0;
                let mut has_facts = false;
                for term in terms {
                    for fact in self.finance.iter().filter(|f| term.selector.matches(f)) {
                        has_facts = true;
                        value += if term.subtract { -fact.amount } else { fact.amount };
                    }
                }
                OperandValue { value, has_facts }
            }
            Operand::ResidentDays => days(self.denominators.resident_days),
            Operand::SkilledDays => days(self.denominators.skilled_days),
            Operand::VentDays => days(self.denominators.vent_days),
            Operand::PayerDays { payers } => days(self.denominators.payers(payers)),
            Operand::BedDays => match self.operational_beds {
                Some(beds) => days(beds * self.days_in_month),
                None => OperandValue { value: 0.0, has_facts: false },
            },
            Operand::CalendarDays => days(self.days_in_month),
        }
    }
}

/// Evaluates a registry against facts
pub struct KpiCalculator<'r> {
    registry: &'r KpiRegistry,
    facility_beds: HashMap<FacilityId, u32>,
}

impl<'r> KpiCalculator<'r> {
    pub fn new(registry: &'r KpiRegistry) -> Self {
        Self {
            registry,
            facility_beds: HashMap::new(),
        }
    }

    /// Use master-data bed counts when a month has no occupancy row
    pub fn with_facilities(mut self, facilities: &[Facility]) -> Self {
        for facility in facilities {
            if let Some(beds) = facility.beds {
                self.facility_beds.insert(facility.facility_id.clone(), beds);
            }
        }
        self
    }

    pub fn registry(&self) -> &KpiRegistry {
        self.registry
    }

    /// Compute every registry KPI for one facility month
    ///
    /// Facts for other keys are ignored. `days_in_month` defaults to the
    /// calendar length of `period_id`.
    pub fn calculate_all(
        &self,
        finance_facts: &[FinanceFact],
        census_facts: &[CensusFact],
        facility_id: &FacilityId,
        period_id: &PeriodId,
        occupancy_facts: &[OccupancyFact],
        days_in_month: Option<u32>,
    ) -> KpiOutput {
        let finance = finance_facts.iter()
            .filter(|f| &f.facility_id == facility_id && &f.period_id == period_id)
            .collect();
        let denominators = denominators::resolve(census_facts, facility_id, period_id);
        let operational_beds = occupancy_facts.iter()
            .find(|o| &o.facility_id == facility_id && &o.period_id == period_id)
            .map(|o| o.operational_beds)
            .filter(|beds| *beds > 0.0)
            .or_else(|| self.facility_beds.get(facility_id).map(|b| *b as f64));

        let evaluation = Evaluation {
            finance,
            denominators,
            operational_beds,
            days_in_month: days_in_month.unwrap_or_else(|| period_id.days_in_month()) as f64,
        };

        let results = self.registry.iter()
            .map(|def| evaluate(def, &evaluation, facility_id, period_id))
            .collect();

        KpiOutput { results }
    }
}

fn evaluate(def: &KpiDefinition, evaluation: &Evaluation<'_>, facility_id: &FacilityId, period_id: &PeriodId) -> KpiResult {
    let numerator = evaluation.operand(&def.numerator);
    let denominator = evaluation.operand(&def.denominator);
    let mut warnings = Vec::new();

    if !numerator.has_facts {
        warnings.push(format!("missing numerator facts for {}", def.kpi_id));
    }
    if matches!(def.denominator, Operand::BedDays) && evaluation.operational_beds.is_none() {
        warnings.push(format!("missing bed count for {}", def.kpi_id));
    }
    if denominator.value == 0.0 {
        warnings.push(format!("zero denominator for {}", def.kpi_id));
    }

    let value = if warnings.is_empty() {
        let ratio = numerator.value / denominator.value;
        Some(match def.unit {
            KpiUnit::Currency => round_cents(ratio),
            KpiUnit::Percentage => ratio * 100.0,
            KpiUnit::Hours | KpiUnit::Number => ratio,
        })
    } else {
        log::debug!("{} {} {}: {}", facility_id, period_id, def.kpi_id, warnings.join("; "));
        None
    };

    KpiResult {
        facility_id: facility_id.clone(),
        period_id: period_id.clone(),
        kpi_id: def.kpi_id.clone(),
        value: value.filter(|v| v.is_finite()),
        numerator_value: numerator.value,
        denominator_value: denominator.value,
        denominator_type: def.denominator_type(),
        payer_scope: def.payer_scope.clone(),
        unit: def.unit,
        warnings,
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// KPI ids referenced by a registry that no fact in the set can feed
///
/// Useful to spot registry entries that only ever produce nulls.
pub fn unreachable_kpis<'a>(registry: &'a KpiRegistry, facts: &FactSet) -> Vec<&'a str> {
    let present: HashSet<(AccountCategory, &str)> = facts.finance_facts.iter()
        .map(|f| (f.account_category, f.account_subcategory.as_str()))
        .collect();
    registry.iter()
        .filter(|def| match &def.numerator {
            Operand::Finance { terms } => !terms.iter().any(|t| {
                t.selector.subcategories.iter()
                    .any(|s| present.contains(&(t.selector.category, s.as_str())))
            }),
            _ => false,
        })
        .map(|def| def.kpi_id.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facility() -> FacilityId {
        FacilityId::new("101").unwrap()
    }

    fn period() -> PeriodId {
        PeriodId::new("2025-01").unwrap()
    }

    fn finance(category: AccountCategory, sub: &str, payer: Option<PayerCategory>, amount: f64) -> FinanceFact {
        FinanceFact {
            facility_id: facility(),
            period_id: period(),
            account_category: category,
            account_subcategory: sub.to_string(),
            department: None,
            payer_category: payer,
            amount,
            denominator_type: DenominatorType::ResidentDays,
            source_file: "test.xlsx".to_string(),
        }
    }

    fn census(payer: PayerCategory, days: f64, is_skilled: bool) -> CensusFact {
        CensusFact {
            facility_id: facility(),
            period_id: period(),
            payer_category: payer,
            days,
            is_skilled,
            is_vent: false,
            source_file: "test.xlsx".to_string(),
        }
    }

    #[test]
    fn test_standard_registry_is_complete() {
        let registry = KpiRegistry::standard();
        assert_eq!(registry.len(), 20);
        assert!(registry.get("total_revenue_ppd").is_some());
        assert!(registry.require("nope").is_err());

        // Validation must accept the built-in set rather than fall back to empty
        assert!(KpiRegistry::from_definitions(standard_definitions()).is_ok());
    }

    #[test]
    fn test_ppd_scenario() {
        let registry = KpiRegistry::standard();
        let calculator = KpiCalculator::new(&registry);
        let finance = vec![
            finance(AccountCategory::Revenue, "Total", None, 100_000.0),
            finance(AccountCategory::Expense, "Total Operating", None, 80_000.0),
        ];
        let census = vec![census(PayerCategory::Medicaid, 1000.0, false)];

        let output = calculator.calculate_all(&finance, &census, &facility(), &period(), &[], None);
        assert_eq!(output.results.len(), registry.len());
        assert_eq!(output.value("total_revenue_ppd"), Some(100.0));
        assert_eq!(output.value("total_cost_ppd"), Some(80.0));
        assert_eq!(output.value("ebitdar_margin"), Some(20.0));
        assert_eq!(output.value("average_daily_census").map(|v| (v * 100.0).round()), Some(3226.0));
    }

    #[test]
    fn test_zero_denominator_is_null_with_warning() {
        let registry = KpiRegistry::standard();
        let calculator = KpiCalculator::new(&registry);
        let finance = vec![finance(AccountCategory::Revenue, "Total", None, 50_000.0)];

        let output = calculator.calculate_all(&finance, &[], &facility(), &period(), &[], Some(31));
        let revenue = output.get("total_revenue_ppd").unwrap();
        assert_eq!(revenue.value, None);
        assert_eq!(revenue.numerator_value, 50_000.0);
        assert_eq!(revenue.denominator_value, 0.0);
        assert!(revenue.warnings.contains(&"zero denominator for total_revenue_ppd".to_string()));

        // Every entry is present even when it cannot be computed
        assert_eq!(output.results.len(), registry.len());
        assert!(output.results.iter().filter(|r| r.value.is_none()).all(|r| !r.warnings.is_empty()));
    }

    #[test]
    fn test_missing_numerator_is_null_with_warning() {
        let registry = KpiRegistry::standard();
        let calculator = KpiCalculator::new(&registry);
        let census = vec![census(PayerCategory::Medicaid, 500.0, false)];

        let output = calculator.calculate_all(&[], &census, &facility(), &period(), &[], None);
        let nursing = output.get("nursing_cost_ppd").unwrap();
        assert_eq!(nursing.value, None);
        assert_eq!(nursing.warnings, vec!["missing numerator facts for nursing_cost_ppd".to_string()]);
        // Day-based ratios still resolve
        assert_eq!(output.value("medicaid_mix"), Some(100.0));
        assert_eq!(output.value("skilled_mix"), Some(0.0));
    }

    #[test]
    fn test_payer_scoped_and_bed_day_kpis() {
        let registry = KpiRegistry::standard();
        let beds = Facility {
            beds: Some(40),
            ..Facility::from_sheet(facility(), "Maple Grove")
        };
        let calculator = KpiCalculator::new(&registry).with_facilities(&[beds]);
        let finance = vec![
            finance(AccountCategory::Revenue, "Medicare A", Some(PayerCategory::MedicareA), 61_000.0),
            finance(AccountCategory::Revenue, "Total", None, 186_000.0),
        ];
        let census = vec![
            census(PayerCategory::MedicareA, 100.0, true),
            census(PayerCategory::Medicaid, 830.0, false),
        ];

        let output = calculator.calculate_all(&finance, &census, &facility(), &period(), &[], None);
        let medicare = output.get("medicare_a_revenue_ppd").unwrap();
        assert_eq!(medicare.value, Some(610.0));
        assert_eq!(medicare.denominator_type, DenominatorType::PayerDays);
        assert_eq!(medicare.payer_scope.as_deref(), Some("Medicare A"));

        // 930 days over 40 beds x 31 days
        assert_eq!(output.value("operational_occupancy"), Some(75.0));
        assert_eq!(output.value("revenue_per_available_bed_day"), Some(150.0));
    }

    #[test]
    fn test_status_thresholds() {
        let registry = KpiRegistry::standard();
        let cost = registry.get("total_cost_ppd").unwrap();
        assert_eq!(cost.status(Some(250.0)), KpiStatus::OnTarget);
        assert_eq!(cost.status(Some(300.0)), KpiStatus::Watch);
        assert_eq!(cost.status(Some(340.0)), KpiStatus::Alert);
        assert_eq!(cost.status(None), KpiStatus::Unknown);

        let margin = registry.get("ebitdar_margin").unwrap();
        assert_eq!(margin.status(Some(18.0)), KpiStatus::OnTarget);
        assert_eq!(margin.status(Some(10.0)), KpiStatus::Watch);
        assert_eq!(margin.status(Some(5.0)), KpiStatus::Alert);

        assert_eq!(registry.get("vent_mix").unwrap().status(Some(3.0)), KpiStatus::Unknown);
    }

    #[test]
    fn test_registry_toml_round_trip_and_duplicates() {
        let registry = KpiRegistry::standard();
        let toml = registry.to_toml_string().unwrap();
        let parsed = KpiRegistry::from_toml_str(&toml).unwrap();
        assert_eq!(parsed.len(), registry.len());
        assert_eq!(parsed.get("ebitda_margin"), registry.get("ebitda_margin"));

        let def = registry.get("skilled_mix").unwrap().clone();
        assert!(KpiRegistry::from_definitions(vec![def.clone(), def]).is_err());
    }

    #[test]
    fn test_synthetic_registry_injection() {
        let custom = KpiDefinition {
            kpi_id: "pharmacy_ppd".to_string(),
            name: "Pharmacy PPD".to_string(),
            description: String::new(),
            formula: "Expense/Pharmacy ÷ resident days".to_string(),
            unit: KpiUnit::Currency,
            higher_is_better: false,
            payer_scope: None,
            numerator: expense(&["Pharmacy"]),
            denominator: Operand::ResidentDays,
            thresholds: KpiThresholds::default(),
        };
        let registry = KpiRegistry::from_definitions(vec![custom]).unwrap();
        let calculator = KpiCalculator::new(&registry);
        let finance = vec![finance(AccountCategory::Expense, "Pharmacy", None, 1234.567)];
        let census = vec![census(PayerCategory::Private, 100.0, false)];

        let output = calculator.calculate_all(&finance, &census, &facility(), &period(), &[], None);
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.value("pharmacy_ppd"), Some(12.35));
    }
}
