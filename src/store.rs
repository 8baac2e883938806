/*!
 * SQLite fact store
 *
 * Persists facilities, parsed facts and KPI results. Re-ingesting a
 * (facility, period) replaces every row stored for that key; deleting a
 * facility cascades to all of its facts and results.
 */

use std::path::Path;

use rusqlite::{params, types::Type, Connection, OptionalExtension as _, Row};

use crate::{
    Result,
    config::PipelineConfig,
    data_types::*,
};

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS facilities (
    facility_id  TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    state        TEXT,
    setting      TEXT NOT NULL DEFAULT 'SNF',   -- 'SNF' | 'ALF' | 'ILF'
    beds         INTEGER,
    parent_opco  TEXT
);

-- Many rows per (facility, period): one per labeled ledger line.
CREATE TABLE IF NOT EXISTS finance_facts (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    facility_id          TEXT NOT NULL REFERENCES facilities(facility_id) ON DELETE CASCADE,
    period_id            TEXT NOT NULL,   -- YYYY-MM
    account_category     TEXT NOT NULL,   -- 'Revenue' | 'Expense'
    account_subcategory  TEXT NOT NULL,
    department           TEXT,
    payer_category       TEXT,
    amount               REAL NOT NULL,
    denominator_type     TEXT NOT NULL,
    source_file          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS census_facts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    facility_id     TEXT NOT NULL REFERENCES facilities(facility_id) ON DELETE CASCADE,
    period_id       TEXT NOT NULL,
    payer_category  TEXT NOT NULL,
    days            REAL NOT NULL,
    is_skilled      INTEGER NOT NULL,
    is_vent         INTEGER NOT NULL,
    source_file     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS occupancy_facts (
    facility_id            TEXT NOT NULL REFERENCES facilities(facility_id) ON DELETE CASCADE,
    period_id              TEXT NOT NULL,
    operational_beds       REAL NOT NULL,
    licensed_beds          REAL NOT NULL,
    total_patient_days     REAL NOT NULL,
    total_unit_days        REAL NOT NULL,
    second_occupant_days   REAL NOT NULL,
    operational_occupancy  REAL NOT NULL,
    PRIMARY KEY (facility_id, period_id)
);

CREATE TABLE IF NOT EXISTS kpi_results (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    facility_id        TEXT NOT NULL REFERENCES facilities(facility_id) ON DELETE CASCADE,
    period_id          TEXT NOT NULL,
    kpi_id             TEXT NOT NULL,
    value              REAL,            -- NULL when not computable
    numerator_value    REAL NOT NULL,
    denominator_value  REAL NOT NULL,
    denominator_type   TEXT NOT NULL,
    payer_scope        TEXT,
    unit               TEXT NOT NULL,
    warnings           TEXT NOT NULL DEFAULT '[]',   -- JSON array
    UNIQUE (facility_id, period_id, kpi_id)
);

CREATE INDEX IF NOT EXISTS finance_key_idx ON finance_facts(facility_id, period_id);
CREATE INDEX IF NOT EXISTS census_key_idx  ON census_facts(facility_id, period_id);
CREATE INDEX IF NOT EXISTS kpi_series_idx  ON kpi_results(facility_id, kpi_id, period_id);

PRAGMA user_version = 1;
";

/// Rows written by one ingest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub facilities: usize,
    pub periods_replaced: usize,
    pub finance_rows: usize,
    pub census_rows: usize,
    pub occupancy_rows: usize,
    pub kpi_rows: usize,
}

/// The facts and results for one (facility, period)
#[derive(Debug, Clone, Copy)]
pub struct PeriodFacts<'a> {
    pub finance: &'a [FinanceFact],
    pub census: &'a [CensusFact],
    pub occupancy: Option<&'a OccupancyFact>,
    pub kpis: &'a [KpiResult],
}

/// Fact store backed by a single SQLite file
pub struct FactStore {
    conn: Connection,
    transactional_replace: bool,
}

impl FactStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open the configured database with the configured replace policy
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::open(config.resolved_database_path())?
            .with_transactional_replace(config.transactional_replace))
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, transactional_replace: true })
    }

    /// Wrap each replace in a transaction (the default)
    pub fn with_transactional_replace(mut self, enabled: bool) -> Self {
        self.transactional_replace = enabled;
        self
    }

    fn write<T>(&mut self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if self.transactional_replace {
            let tx = self.conn.transaction()?;
            let out = f(&*tx)?;
            tx.commit()?;
            Ok(out)
        } else {
            f(&self.conn)
        }
    }

    /// Insert or update a facility; unknown master fields keep stored values
    pub fn upsert_facility(&mut self, facility: &Facility) -> Result<()> {
        upsert_facility(&self.conn, facility)
    }

    /// Replace everything stored for one (facility, period)
    ///
    /// Prior finance, census, occupancy and KPI rows for the key are deleted
    /// and the given rows inserted.
    pub fn replace_period(
        &mut self,
        facility_id: &FacilityId,
        period_id: &PeriodId,
        facts: PeriodFacts<'_>,
    ) -> Result<IngestSummary> {
        self.write(|conn| {
            ensure_facility(conn, facility_id)?;
            replace_period(conn, facility_id, period_id, facts)
        })
    }

    /// Upsert the facilities of a fact set and replace every key it covers
    ///
    /// With transactional replace enabled the whole ingest commits at once.
    pub fn ingest_fact_set(&mut self, facts: &FactSet, results: &[KpiResult]) -> Result<IngestSummary> {
        let summary = self.write(|conn| {
            let mut summary = IngestSummary::default();
            for facility in &facts.facilities {
                upsert_facility(conn, facility)?;
                summary.facilities += 1;
            }
            for facility_id in &facts.facility_ids {
                ensure_facility(conn, facility_id)?;
            }

            for (facility_id, period_id) in facts.keys() {
                let key = |f: &FacilityId, p: &PeriodId| f == &facility_id && p == &period_id;
                let finance: Vec<FinanceFact> = facts.finance_facts.iter()
                    .filter(|f| key(&f.facility_id, &f.period_id))
                    .cloned()
                    .collect();
                let census: Vec<CensusFact> = facts.census_facts.iter()
                    .filter(|c| key(&c.facility_id, &c.period_id))
                    .cloned()
                    .collect();
                let kpis: Vec<KpiResult> = results.iter()
                    .filter(|r| key(&r.facility_id, &r.period_id))
                    .cloned()
                    .collect();
                let period_facts = PeriodFacts {
                    finance: &finance,
                    census: &census,
                    occupancy: facts.occupancy_for(&facility_id, &period_id),
                    kpis: &kpis,
                };

                let written = replace_period(conn, &facility_id, &period_id, period_facts)?;
                summary.periods_replaced += 1;
                summary.finance_rows += written.finance_rows;
                summary.census_rows += written.census_rows;
                summary.occupancy_rows += written.occupancy_rows;
                summary.kpi_rows += written.kpi_rows;
            }
            Ok(summary)
        })?;

        log::info!(
            "Stored {} facility months ({} finance, {} census, {} occupancy, {} KPI rows)",
            summary.periods_replaced,
            summary.finance_rows,
            summary.census_rows,
            summary.occupancy_rows,
            summary.kpi_rows
        );
        Ok(summary)
    }

    /// Delete a facility and, by cascade, all of its rows
    pub fn delete_facility(&mut self, facility_id: &FacilityId) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM facilities WHERE facility_id = ?1",
            params![facility_id.as_str()],
        )?;
        Ok(deleted > 0)
    }

    pub fn facilities(&self) -> Result<Vec<Facility>> {
        let mut stmt = self.conn.prepare(
            "SELECT facility_id, name, state, setting, beds, parent_opco
             FROM facilities ORDER BY facility_id",
        )?;
        let rows = stmt.query_map([], decode_facility)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn facility(&self, facility_id: &FacilityId) -> Result<Option<Facility>> {
        Ok(self.conn
            .query_row(
                "SELECT facility_id, name, state, setting, beds, parent_opco
                 FROM facilities WHERE facility_id = ?1",
                params![facility_id.as_str()],
                decode_facility,
            )
            .optional()?)
    }

    pub fn finance_facts_for(&self, facility_id: &FacilityId, period_id: &PeriodId) -> Result<Vec<FinanceFact>> {
        let mut stmt = self.conn.prepare(
            "SELECT facility_id, period_id, account_category, account_subcategory, department,
                    payer_category, amount, denominator_type, source_file
             FROM finance_facts WHERE facility_id = ?1 AND period_id = ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![facility_id.as_str(), period_id.as_str()], decode_finance)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn census_facts_for(&self, facility_id: &FacilityId, period_id: &PeriodId) -> Result<Vec<CensusFact>> {
        let mut stmt = self.conn.prepare(
            "SELECT facility_id, period_id, payer_category, days, is_skilled, is_vent, source_file
             FROM census_facts WHERE facility_id = ?1 AND period_id = ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![facility_id.as_str(), period_id.as_str()], decode_census)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn occupancy_for(&self, facility_id: &FacilityId, period_id: &PeriodId) -> Result<Option<OccupancyFact>> {
        Ok(self.conn
            .query_row(
                "SELECT facility_id, period_id, operational_beds, licensed_beds, total_patient_days,
                        total_unit_days, second_occupant_days, operational_occupancy
                 FROM occupancy_facts WHERE facility_id = ?1 AND period_id = ?2",
                params![facility_id.as_str(), period_id.as_str()],
                decode_occupancy,
            )
            .optional()?)
    }

    /// KPI rows for one facility month, in insertion (registry) order
    pub fn kpi_results_for(&self, facility_id: &FacilityId, period_id: &PeriodId) -> Result<Vec<KpiResult>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE facility_id = ?1 AND period_id = ?2 ORDER BY id",
            KPI_SELECT
        ))?;
        let rows = stmt.query_map(params![facility_id.as_str(), period_id.as_str()], decode_kpi)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every stored month of one KPI for one facility, ascending by period
    pub fn kpi_series(&self, facility_id: &FacilityId, kpi_id: &str) -> Result<Vec<KpiResult>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE facility_id = ?1 AND kpi_id = ?2 ORDER BY period_id",
            KPI_SELECT
        ))?;
        let rows = stmt.query_map(params![facility_id.as_str(), kpi_id], decode_kpi)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All stored KPI rows
    pub fn all_kpi_results(&self) -> Result<Vec<KpiResult>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} ORDER BY facility_id, period_id, id",
            KPI_SELECT
        ))?;
        let rows = stmt.query_map([], decode_kpi)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Periods with any stored fact or result for a facility, ascending
    pub fn periods_for(&self, facility_id: &FacilityId) -> Result<Vec<PeriodId>> {
        let mut stmt = self.conn.prepare(
            "SELECT period_id FROM finance_facts WHERE facility_id = ?1
             UNION SELECT period_id FROM census_facts WHERE facility_id = ?1
             UNION SELECT period_id FROM occupancy_facts WHERE facility_id = ?1
             UNION SELECT period_id FROM kpi_results WHERE facility_id = ?1
             ORDER BY period_id",
        )?;
        let rows = stmt.query_map(params![facility_id.as_str()], |row| period_at(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Row count of a store table, for diagnostics
    pub fn row_count(&self, table: StoreTable) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// The five store tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTable {
    Facilities,
    FinanceFacts,
    CensusFacts,
    OccupancyFacts,
    KpiResults,
}

impl StoreTable {
    pub fn name(&self) -> &'static str {
        match self {
            StoreTable::Facilities => "facilities",
            StoreTable::FinanceFacts => "finance_facts",
            StoreTable::CensusFacts => "census_facts",
            StoreTable::OccupancyFacts => "occupancy_facts",
            StoreTable::KpiResults => "kpi_results",
        }
    }
}

const KPI_SELECT: &str =
    "SELECT facility_id, period_id, kpi_id, value, numerator_value, denominator_value,
            denominator_type, payer_scope, unit, warnings
     FROM kpi_results";

fn upsert_facility(conn: &Connection, facility: &Facility) -> Result<()> {
    conn.execute(
        "INSERT INTO facilities (facility_id, name, state, setting, beds, parent_opco)
         VALUES (?1, ?2, ?3, COALESCE(?4, 'SNF'), ?5, ?6)
         ON CONFLICT(facility_id) DO UPDATE SET
             name = excluded.name,
             state = COALESCE(excluded.state, facilities.state),
             setting = COALESCE(?4, facilities.setting),
             beds = COALESCE(excluded.beds, facilities.beds),
             parent_opco = COALESCE(excluded.parent_opco, facilities.parent_opco)",
        params![
            facility.facility_id.as_str(),
            facility.name,
            facility.state,
            facility.setting.map(|s| s.as_code()),
            facility.beds,
            facility.parent_opco,
        ],
    )?;
    Ok(())
}

/// Make sure a facility row exists so fact rows satisfy the foreign key
fn ensure_facility(conn: &Connection, facility_id: &FacilityId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO facilities (facility_id, name) VALUES (?1, ?1)",
        params![facility_id.as_str()],
    )?;
    Ok(())
}

fn replace_period(
    conn: &Connection,
    facility_id: &FacilityId,
    period_id: &PeriodId,
    facts: PeriodFacts<'_>,
) -> Result<IngestSummary> {
    let key = params![facility_id.as_str(), period_id.as_str()];
    for table in ["finance_facts", "census_facts", "occupancy_facts", "kpi_results"] {
        conn.execute(
            &format!("DELETE FROM {} WHERE facility_id = ?1 AND period_id = ?2", table),
            key,
        )?;
    }

    let mut summary = IngestSummary::default();

    let mut stmt = conn.prepare_cached(
        "INSERT INTO finance_facts (facility_id, period_id, account_category, account_subcategory,
             department, payer_category, amount, denominator_type, source_file)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for fact in facts.finance {
        stmt.execute(params![
            facility_id.as_str(),
            period_id.as_str(),
            fact.account_category.as_str(),
            fact.account_subcategory,
            fact.department,
            fact.payer_category.map(|p| p.as_str()),
            fact.amount,
            fact.denominator_type.as_str(),
            fact.source_file,
        ])?;
        summary.finance_rows += 1;
    }

    let mut stmt = conn.prepare_cached(
        "INSERT INTO census_facts (facility_id, period_id, payer_category, days, is_skilled, is_vent, source_file)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for fact in facts.census {
        stmt.execute(params![
            facility_id.as_str(),
            period_id.as_str(),
            fact.payer_category.as_str(),
            fact.days,
            fact.is_skilled,
            fact.is_vent,
            fact.source_file,
        ])?;
        summary.census_rows += 1;
    }

    if let Some(occupancy) = facts.occupancy {
        conn.execute(
            "INSERT INTO occupancy_facts (facility_id, period_id, operational_beds, licensed_beds,
                 total_patient_days, total_unit_days, second_occupant_days, operational_occupancy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(facility_id, period_id) DO UPDATE SET
                 operational_beds = excluded.operational_beds,
                 licensed_beds = excluded.licensed_beds,
                 total_patient_days = excluded.total_patient_days,
                 total_unit_days = excluded.total_unit_days,
                 second_occupant_days = excluded.second_occupant_days,
                 operational_occupancy = excluded.operational_occupancy",
            params![
                facility_id.as_str(),
                period_id.as_str(),
                occupancy.operational_beds,
                occupancy.licensed_beds,
                occupancy.total_patient_days,
                occupancy.total_unit_days,
                occupancy.second_occupant_days,
                occupancy.operational_occupancy,
            ],
        )?;
        summary.occupancy_rows += 1;
    }

    let mut stmt = conn.prepare_cached(
        "INSERT INTO kpi_results (facility_id, period_id, kpi_id, value, numerator_value,
             denominator_value, denominator_type, payer_scope, unit, warnings)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for result in facts.kpis {
        stmt.execute(params![
            facility_id.as_str(),
            period_id.as_str(),
            result.kpi_id,
            result.value,
            result.numerator_value,
            result.denominator_value,
            result.denominator_type.as_str(),
            result.payer_scope,
            result.unit.as_str(),
            serde_json::to_string(&result.warnings)?,
        ])?;
        summary.kpi_rows += 1;
    }

    summary.periods_replaced = 1;
    Ok(summary)
}

// ─── Row decoding ────────────────────────────────────────────────────────────

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn code_at<T>(row: &Row<'_>, idx: usize, parse: impl Fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    parse(&text).ok_or_else(|| conversion_error(idx, format!("unknown code '{}'", text)))
}

fn period_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<PeriodId> {
    let text: String = row.get(idx)?;
    PeriodId::new(text).map_err(|e| conversion_error(idx, e.to_string()))
}

fn decode_facility(row: &Row<'_>) -> rusqlite::Result<Facility> {
    Ok(Facility {
        facility_id: FacilityId(row.get(0)?),
        name: row.get(1)?,
        state: row.get(2)?,
        setting: Some(code_at(row, 3, FacilitySetting::from_code)?),
        beds: row.get(4)?,
        parent_opco: row.get(5)?,
    })
}

fn decode_finance(row: &Row<'_>) -> rusqlite::Result<FinanceFact> {
    let payer: Option<String> = row.get(5)?;
    Ok(FinanceFact {
        facility_id: FacilityId(row.get(0)?),
        period_id: period_at(row, 1)?,
        account_category: code_at(row, 2, AccountCategory::from_code)?,
        account_subcategory: row.get(3)?,
        department: row.get(4)?,
        payer_category: payer
            .map(|p| PayerCategory::from_code(&p).ok_or_else(|| conversion_error(5, format!("unknown payer '{}'", p))))
            .transpose()?,
        amount: row.get(6)?,
        denominator_type: code_at(row, 7, DenominatorType::from_code)?,
        source_file: row.get(8)?,
    })
}

fn decode_census(row: &Row<'_>) -> rusqlite::Result<CensusFact> {
    Ok(CensusFact {
        facility_id: FacilityId(row.get(0)?),
        period_id: period_at(row, 1)?,
        payer_category: code_at(row, 2, PayerCategory::from_code)?,
        days: row.get(3)?,
        is_skilled: row.get(4)?,
        is_vent: row.get(5)?,
        source_file: row.get(6)?,
    })
}

fn decode_occupancy(row: &Row<'_>) -> rusqlite::Result<OccupancyFact> {
    Ok(OccupancyFact {
        facility_id: FacilityId(row.get(0)?),
        period_id: period_at(row, 1)?,
        operational_beds: row.get(2)?,
        licensed_beds: row.get(3)?,
        total_patient_days: row.get(4)?,
        total_unit_days: row.get(5)?,
        second_occupant_days: row.get(6)?,
        operational_occupancy: row.get(7)?,
    })
}

fn decode_kpi(row: &Row<'_>) -> rusqlite::Result<KpiResult> {
    let warnings: String = row.get(9)?;
    Ok(KpiResult {
        facility_id: FacilityId(row.get(0)?),
        period_id: period_at(row, 1)?,
        kpi_id: row.get(2)?,
        value: row.get(3)?,
        numerator_value: row.get(4)?,
        denominator_value: row.get(5)?,
        denominator_type: code_at(row, 6, DenominatorType::from_code)?,
        payer_scope: row.get(7)?,
        unit: code_at(row, 8, KpiUnit::from_code)?,
        warnings: serde_json::from_str(&warnings).map_err(|e| conversion_error(9, e.to_string()))?,
    })
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

    fn finance(amount: f64) -> FinanceFact {
        FinanceFact {
            facility_id: facility(),
            period_id: period(),
            account_category: AccountCategory::Revenue,
            account_subcategory: "Medicare A".to_string(),
            department: None,
            payer_category: Some(PayerCategory::MedicareA),
            amount,
            denominator_type: DenominatorType::SkilledDays,
            source_file: "book.xlsx".to_string(),
        }
    }

    fn kpi(value: Option<f64>) -> KpiResult {
        KpiResult {
            facility_id: facility(),
            period_id: period(),
            kpi_id: "total_revenue_ppd".to_string(),
            value,
            numerator_value: 100.0,
            denominator_value: if value.is_some() { 1.0 } else { 0.0 },
            denominator_type: DenominatorType::ResidentDays,
            payer_scope: None,
            unit: KpiUnit::Currency,
            warnings: if value.is_some() { vec![] } else { vec!["zero denominator for total_revenue_ppd".to_string()] },
        }
    }

    #[test]
    fn test_replace_period_replaces_rows() {
        let mut store = FactStore::open_in_memory().unwrap();
        let first = vec![finance(1.0), finance(2.0), finance(3.0)];
        store.replace_period(&facility(), &period(), PeriodFacts {
            finance: &first,
            census: &[],
            occupancy: None,
            kpis: &[kpi(Some(100.0))],
        }).unwrap();

        let second = vec![finance(5.0)];
        store.replace_period(&facility(), &period(), PeriodFacts {
            finance: &second,
            census: &[],
            occupancy: None,
            kpis: &[kpi(None)],
        }).unwrap();

        assert_eq!(store.finance_facts_for(&facility(), &period()).unwrap(), second);
        let kpis = store.kpi_results_for(&facility(), &period()).unwrap();
        assert_eq!(kpis, vec![kpi(None)]);
        assert_eq!(store.periods_for(&facility()).unwrap(), vec![period()]);
    }

    #[test]
    fn test_occupancy_upsert_and_cascade() {
        let mut store = FactStore::open_in_memory().unwrap().with_transactional_replace(false);
        let occupancy = OccupancyFact {
            facility_id: facility(),
            period_id: period(),
            operational_beds: 100.0,
            licensed_beds: 120.0,
            total_patient_days: 2800.0,
            total_unit_days: 3100.0,
            second_occupant_days: 0.0,
            operational_occupancy: 0.9,
        };
        for _ in 0..2 {
            store.replace_period(&facility(), &period(), PeriodFacts {
                finance: &[finance(1.0)],
                census: &[],
                occupancy: Some(&occupancy),
                kpis: &[],
            }).unwrap();
        }
        assert_eq!(store.occupancy_for(&facility(), &period()).unwrap(), Some(occupancy));
        assert_eq!(store.row_count(StoreTable::OccupancyFacts).unwrap(), 1);

        assert!(store.delete_facility(&facility()).unwrap());
        assert_eq!(store.row_count(StoreTable::FinanceFacts).unwrap(), 0);
        assert_eq!(store.row_count(StoreTable::OccupancyFacts).unwrap(), 0);
        assert!(!store.delete_facility(&facility()).unwrap());
    }

    #[test]
    fn test_facility_upsert_keeps_master_fields() {
        let mut store = FactStore::open_in_memory().unwrap();
        let master = Facility {
            beds: Some(120),
            state: Some("OH".to_string()),
            setting: Some(FacilitySetting::Alf),
            ..Facility::from_sheet(facility(), "Maple Grove")
        };
        store.upsert_facility(&master).unwrap();
        store.upsert_facility(&Facility::from_sheet(facility(), "Maple Grove SNF")).unwrap();

        let stored = store.facility(&facility()).unwrap().unwrap();
        assert_eq!(stored.name, "Maple Grove SNF");
        assert_eq!(stored.beds, Some(120));
        assert_eq!(stored.state.as_deref(), Some("OH"));
        assert_eq!(stored.setting, Some(FacilitySetting::Alf));
        assert_eq!(store.facilities().unwrap().len(), 1);

        // Sheet-only facilities default to SNF
        let other = FacilityId::new("202").unwrap();
        store.upsert_facility(&Facility::from_sheet(other.clone(), "Birch Hill")).unwrap();
        assert_eq!(store.facility(&other).unwrap().unwrap().setting, Some(FacilitySetting::Snf));
    }
}
