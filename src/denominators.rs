/*!
 * Volume denominators for ratio KPIs
 *
 * Resolves the day counts (total, skilled, vent and per-payer) that every
 * per-day KPI divides by, from the census facts of one facility month.
 */

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data_types::{CensusFact, FacilityId, PayerCategory, PeriodId};

/// Day counts for one (facility, period)
///
/// Vent rows count toward their payer and the totals like any other row and
/// are additionally summed into `vent_days`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Denominators {
    pub resident_days: f64,
    pub skilled_days: f64,
    pub vent_days: f64,
    pub payer_days: BTreeMap<PayerCategory, f64>,
}

impl Denominators {
    /// All-zero denominators
    pub fn zero() -> Self {
        Self::default()
    }

    /// Days for one payer (zero when the payer had no census)
    pub fn payer(&self, payer: PayerCategory) -> f64 {
        self.payer_days.get(&payer).copied().unwrap_or(0.0)
    }

    /// Days for a set of payers
    pub fn payers(&self, payers: &[PayerCategory]) -> f64 {
        payers.iter().map(|p| self.payer(*p)).sum()
    }

    pub fn is_zero(&self) -> bool {
        self.resident_days == 0.0
    }

    /// Skilled share of resident days, `None` when there are no days
    pub fn skilled_mix(&self) -> Option<f64> {
        (self.resident_days != 0.0).then(|| self.skilled_days / self.resident_days)
    }
}

/// Resolve denominators for one facility month
///
/// Never fails: a key with no census facts yields [`Denominators::zero`].
pub fn resolve(census_facts: &[CensusFact], facility_id: &FacilityId, period_id: &PeriodId) -> Denominators {
    resolve_iter(
        census_facts.iter()
            .filter(|c| &c.facility_id == facility_id && &c.period_id == period_id),
    )
}

/// Resolve denominators over census facts that are already filtered to one key
pub fn resolve_iter<'a, I>(census_facts: I) -> Denominators
where
    I: IntoIterator<Item = &'a CensusFact>,
{
    let mut denominators = Denominators::zero();
    for fact in census_facts {
        denominators.resident_days += fact.days;
        if fact.is_skilled {
            denominators.skilled_days += fact.days;
        }
        if fact.is_vent {
            denominators.vent_days += fact.days;
        }
        *denominators.payer_days.entry(fact.payer_category).or_insert(0.0) += fact.days;
    }
    denominators
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(payer: PayerCategory, days: f64, is_skilled: bool, is_vent: bool) -> CensusFact {
        CensusFact {
            facility_id: FacilityId::new("101").unwrap(),
            period_id: PeriodId::new("2025-01").unwrap(),
            payer_category: payer,
            days,
            is_skilled,
            is_vent,
            source_file: "test.xlsx".to_string(),
        }
    }

    #[test]
    fn test_resolve_sums_by_class() {
        let facts = vec![
            fact(PayerCategory::MedicareA, 200.0, true, false),
            fact(PayerCategory::MedicareA, 30.0, true, true),
            fact(PayerCategory::Medicaid, 700.0, false, false),
            fact(PayerCategory::Private, 70.0, false, false),
        ];
        let facility = FacilityId::new("101").unwrap();
        let period = PeriodId::new("2025-01").unwrap();

        let d = resolve(&facts, &facility, &period);
        assert_eq!(d.resident_days, 1000.0);
        assert_eq!(d.skilled_days, 230.0);
        assert_eq!(d.vent_days, 30.0);
        assert_eq!(d.payer(PayerCategory::MedicareA), 230.0);
        assert_eq!(d.payer(PayerCategory::Hospice), 0.0);
        assert_eq!(d.payer_days.values().sum::<f64>(), d.resident_days);
        assert_eq!(d.skilled_mix(), Some(0.23));
    }

    #[test]
    fn test_resolve_missing_key_is_zero() {
        let facts = vec![fact(PayerCategory::Medicaid, 10.0, false, false)];
        let other = PeriodId::new("2025-02").unwrap();
        let d = resolve(&facts, &FacilityId::new("101").unwrap(), &other);
        assert_eq!(d, Denominators::zero());
        assert!(d.is_zero());
        assert_eq!(d.skilled_mix(), None);
    }
}
