/*!
 * Workbook reader for facility income statements
 *
 * This module scrapes the fixed-layout income-statement and census blocks of
 * every facility sheet in a workbook and emits finance, census and occupancy
 * facts. Sheets that do not fit the template are skipped, never fatal.
 */

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{Datelike, Duration, NaiveDate};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    Result, SnfError,
    data_types::*,
    error::ErrorContext,
    schema::{self, layout, OccupancyField, SheetKind},
};

/// Facts scraped from a single facility sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SheetFacts {
    pub facility: Facility,
    pub periods: Vec<PeriodId>,
    pub finance_facts: Vec<FinanceFact>,
    pub census_facts: Vec<CensusFact>,
    pub occupancy_facts: Vec<OccupancyFact>,
}

/// Reader for income-statement workbooks
pub struct WorkbookReader {
    /// Refuse files larger than this many bytes
    max_file_bytes: Option<u64>,
    /// Skip facility sheets that fail to parse instead of failing the workbook
    skip_invalid_sheets: bool,
    /// Whether to show a progress bar over sheets
    #[cfg(feature = "progress")]
    show_progress_bar: bool,
}

impl Default for WorkbookReader {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkbookReader {
    /// Create a reader with default settings
    pub fn new() -> Self {
        Self {
            max_file_bytes: None,
            skip_invalid_sheets: true,
            #[cfg(feature = "progress")]
            show_progress_bar: false,
        }
    }

    /// Create a reader from the pipeline configuration
    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        let reader = Self::new()
            .with_max_file_bytes(Some(config.max_upload_bytes))
            .with_skip_invalid_sheets(config.skip_invalid_sheets);
        #[cfg(feature = "progress")]
        let reader = reader.with_progress_bar(config.enable_progress_bar);
        reader
    }

    /// Limit accepted workbook size
    pub fn with_max_file_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_file_bytes = limit;
        self
    }

    /// Fail on the first malformed facility sheet when `false`
    pub fn with_skip_invalid_sheets(mut self, skip: bool) -> Self {
        self.skip_invalid_sheets = skip;
        self
    }

    #[cfg(feature = "progress")]
    /// Enable or disable the progress bar
    pub fn with_progress_bar(mut self, show: bool) -> Self {
        self.show_progress_bar = show;
        self
    }

    /// Parse every facility sheet of the workbook at `path`
    ///
    /// Returns whatever could be parsed; an empty [`FactSet`] is not an error.
    pub fn read_workbook<P: AsRef<Path>>(&self, path: P) -> Result<FactSet> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SnfError::file_not_found_with_suggestion(path.to_path_buf()));
        }

        if let Some(limit) = self.max_file_bytes {
            let size = std::fs::metadata(path)?.len();
            if size > limit {
                return Err(SnfError::FileTooLarge {
                    path: path.to_path_buf(),
                    size,
                    limit,
                });
            }
        }

        let start_time = Instant::now();
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| SnfError::workbook(path, e.to_string()))?;
        let source_file = path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let sheet_names = workbook.sheet_names().to_vec();

        #[cfg(feature = "progress")]
        let progress_bar = if self.show_progress_bar {
            let pb = ProgressBar::new(sheet_names.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sheets {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            Some(pb)
        } else {
            None
        };

        let mut facts = FactSet::new();
        for name in &sheet_names {
            #[cfg(feature = "progress")]
            if let Some(ref pb) = progress_bar {
                pb.set_message(name.clone());
                pb.inc(1);
            }

            // Cheap name check before loading the sheet
            if !matches!(schema::classify_sheet_name(name), SheetKind::Facility { .. }) {
                self.record_skip(&mut facts, name, skip_reason_for_name(name));
                continue;
            }

            match workbook.worksheet_range(name) {
                Ok(range) => self.collect_sheet(&mut facts, name, &range, &source_file)?,
                Err(e) => self.reject_sheet(&mut facts, name, format!("unreadable sheet: {}", e), &source_file)?,
            }
        }

        #[cfg(feature = "progress")]
        if let Some(pb) = progress_bar {
            pb.finish_and_clear();
        }

        log::info!(
            "Parsed {} in {:.2}s: {}",
            source_file,
            start_time.elapsed().as_secs_f64(),
            facts.summary()
        );

        Ok(facts)
    }

    /// Like [`read_workbook`](Self::read_workbook) but fails when nothing was parsed
    pub fn read_workbook_checked<P: AsRef<Path>>(&self, path: P) -> Result<FactSet> {
        let path = path.as_ref();
        let facts = self.read_workbook(path)?;
        if facts.facility_ids.is_empty() || facts.is_empty() {
            return Err(SnfError::NoValidData {
                path: path.to_path_buf(),
                sheets_seen: facts.skipped_sheets.len() + facts.facility_ids.len(),
            });
        }
        Ok(facts)
    }

    /// Parse already-loaded sheets, e.g. from an in-memory workbook
    pub fn parse_sheets<I, S>(&self, sheets: I, source_file: &str) -> Result<FactSet>
    where
        I: IntoIterator<Item = (S, Range<Data>)>,
        S: AsRef<str>,
    {
        let mut facts = FactSet::new();
        for (name, range) in sheets {
            self.collect_sheet(&mut facts, name.as_ref(), &range, source_file)?;
        }
        Ok(facts)
    }

    /// Parse one sheet, or explain why it does not qualify
    pub fn parse_sheet(
        &self,
        sheet_name: &str,
        range: &Range<Data>,
        source_file: &str,
    ) -> std::result::Result<SheetFacts, String> {
        let (code, display_name) = match schema::classify_sheet_name(sheet_name) {
            SheetKind::Facility { code, name } => (code, name),
            _ => return Err(skip_reason_for_name(sheet_name)),
        };
        let facility_id = FacilityId::new(code)
            .map_err(|e| format!("unusable facility code: {}", e))?;

        let used_rows = range.end().map(|(row, _)| row + 1).unwrap_or(0);
        if range.is_empty() || used_rows < layout::MIN_SHEET_ROWS {
            return Err(format!("too few rows ({})", used_rows));
        }

        let periods = discover_periods(range);
        if periods.is_empty() {
            return Err("no resolvable periods in date row".to_string());
        }

        let census_start = find_census_start(range);
        let finance_end = match census_start {
            Some(start) if start <= layout::FINANCE_LAST_ROW => start.saturating_sub(1),
            _ => layout::FINANCE_LAST_ROW,
        };

        let finance_facts = extract_finance(range, &periods, finance_end, &facility_id, source_file);
        let (census_facts, occupancy_facts) = match census_start {
            Some(start) => extract_census(range, &periods, start, &facility_id, source_file),
            None => (Vec::new(), Vec::new()),
        };

        log::debug!(
            "Sheet '{}': {} periods, {} finance, {} census, {} occupancy facts",
            sheet_name,
            periods.len(),
            finance_facts.len(),
            census_facts.len(),
            occupancy_facts.len()
        );

        Ok(SheetFacts {
            facility: Facility::from_sheet(facility_id, display_name),
            periods: periods.into_iter().map(|(_, p)| p).collect(),
            finance_facts,
            census_facts,
            occupancy_facts,
        })
    }

    fn collect_sheet(&self, facts: &mut FactSet, name: &str, range: &Range<Data>, source_file: &str) -> Result<()> {
        match self.parse_sheet(name, range, source_file) {
            Ok(sheet) => {
                let mut parsed = FactSet::new();
                parsed.facility_ids.push(sheet.facility.facility_id.clone());
                parsed.facilities.push(sheet.facility);
                parsed.finance_facts = sheet.finance_facts;
                parsed.census_facts = sheet.census_facts;
                parsed.occupancy_facts = sheet.occupancy_facts;
                facts.merge(parsed);
                Ok(())
            }
            Err(reason) => self.reject_sheet(facts, name, reason, source_file),
        }
    }

    /// Skip a facility-named sheet, or fail when skipping is disabled
    fn reject_sheet(&self, facts: &mut FactSet, name: &str, reason: String, source_file: &str) -> Result<()> {
        let facility_named = matches!(schema::classify_sheet_name(name), SheetKind::Facility { .. });
        if facility_named && !self.skip_invalid_sheets {
            return Err(SnfError::DataValidation {
                message: format!("sheet '{}' does not fit the template: {}", name, reason),
                field: None,
                value: None,
                context: ErrorContext {
                    file_path: Some(source_file.into()),
                    sheet_name: Some(name.to_string()),
                    ..Default::default()
                },
            });
        }
        self.record_skip(facts, name, reason);
        Ok(())
    }

    fn record_skip(&self, facts: &mut FactSet, name: &str, reason: String) {
        log::debug!("Skipping sheet '{}': {}", name, reason);
        facts.skipped_sheets.push(SkippedSheet {
            sheet_name: name.to_string(),
            reason,
        });
    }
}

fn skip_reason_for_name(name: &str) -> String {
    match schema::classify_sheet_name(name) {
        SheetKind::NonFacility => "non-facility sheet".to_string(),
        SheetKind::Unrecognized => "name does not match '<code> (<name>)'".to_string(),
        SheetKind::Facility { .. } => String::new(),
    }
}

/// Period columns of the date row, in column order
fn discover_periods(range: &Range<Data>) -> Vec<(u32, PeriodId)> {
    (layout::FIRST_PERIOD_COL..=layout::LAST_PERIOD_COL)
        .filter_map(|col| {
            range.get_value((layout::DATE_ROW, col))
                .and_then(parse_period_cell)
                .map(|period| (col, period))
        })
        .collect()
}

fn find_census_start(range: &Range<Data>) -> Option<u32> {
    (layout::CENSUS_SEARCH_FIRST_ROW..=layout::CENSUS_SEARCH_LAST_ROW)
        .find(|&row| label_at(range, row).as_deref() == Some(layout::CENSUS_SENTINEL))
}

fn extract_finance(
    range: &Range<Data>,
    periods: &[(u32, PeriodId)],
    last_row: u32,
    facility_id: &FacilityId,
    source_file: &str,
) -> Vec<FinanceFact> {
    let mut facts = Vec::new();

    for row in layout::FINANCE_FIRST_ROW..=last_row {
        let Some(label) = label_at(range, row) else { continue };
        let Some(line) = schema::finance_line(&label) else { continue };

        let lookup = range.get_value((row, layout::PPD_LOOKUP_COL))
            .and_then(cell_text)
            .unwrap_or_default();
        let denominator_type = DenominatorType::from_ppd_lookup(&lookup);

        for (col, period) in periods {
            let amount = range.get_value((row, *col)).and_then(cell_number).unwrap_or(0.0);
            if amount == 0.0 {
                continue;
            }
            facts.push(FinanceFact {
                facility_id: facility_id.clone(),
                period_id: period.clone(),
                account_category: line.category,
                account_subcategory: line.subcategory.to_string(),
                department: line.department.map(str::to_string),
                payer_category: line.payer,
                amount,
                denominator_type,
                source_file: source_file.to_string(),
            });
        }
    }

    facts
}

#[derive(Debug, Default, Clone, Copy)]
struct OccupancyAccumulator {
    operational_beds: f64,
    licensed_beds: f64,
    total_patient_days: f64,
    total_unit_days: f64,
    second_occupant_days: f64,
    operational_occupancy: f64,
}

impl OccupancyAccumulator {
    fn set(&mut self, field: OccupancyField, value: f64) {
        match field {
            OccupancyField::OperationalBeds => self.operational_beds = value,
            OccupancyField::LicensedBeds => self.licensed_beds = value,
            OccupancyField::TotalPatientDays => self.total_patient_days = value,
            OccupancyField::TotalUnitDays => self.total_unit_days = value,
            OccupancyField::OperationalOccupancy => self.operational_occupancy = value,
            OccupancyField::SecondOccupantDays => self.second_occupant_days = value,
        }
    }

    fn is_reportable(&self) -> bool {
        self.operational_beds != 0.0 || self.licensed_beds != 0.0 || self.total_patient_days != 0.0
    }
}

fn extract_census(
    range: &Range<Data>,
    periods: &[(u32, PeriodId)],
    sentinel_row: u32,
    facility_id: &FacilityId,
    source_file: &str,
) -> (Vec<CensusFact>, Vec<OccupancyFact>) {
    let mut census = Vec::new();
    let mut occupancy: BTreeMap<PeriodId, OccupancyAccumulator> = BTreeMap::new();

    let last_row = sentinel_row.saturating_add(layout::CENSUS_BLOCK_ROWS);
    for row in (sentinel_row + 1)..=last_row {
        let Some(label) = label_at(range, row) else { continue };

        if let Some(line) = schema::census_line(&label) {
            for (col, period) in periods {
                let days = range.get_value((row, *col)).and_then(cell_number).unwrap_or(0.0);
                if days > 0.0 {
                    census.push(CensusFact {
                        facility_id: facility_id.clone(),
                        period_id: period.clone(),
                        payer_category: line.payer,
                        days,
                        is_skilled: line.is_skilled,
                        is_vent: line.is_vent,
                        source_file: source_file.to_string(),
                    });
                }
            }
        } else if let Some(field) = schema::occupancy_field(&label) {
            for (col, period) in periods {
                if let Some(value) = range.get_value((row, *col)).and_then(cell_number) {
                    occupancy.entry(period.clone()).or_default().set(field, value);
                }
            }
        }
    }

    let occupancy_facts = occupancy.into_iter()
        .filter(|(_, acc)| acc.is_reportable())
        .map(|(period_id, acc)| OccupancyFact {
            facility_id: facility_id.clone(),
            period_id,
            operational_beds: acc.operational_beds,
            licensed_beds: acc.licensed_beds,
            total_patient_days: acc.total_patient_days,
            total_unit_days: acc.total_unit_days,
            second_occupant_days: acc.second_occupant_days,
            operational_occupancy: acc.operational_occupancy,
        })
        .collect();

    (census, occupancy_facts)
}

fn label_at(range: &Range<Data>, row: u32) -> Option<String> {
    range.get_value((row, layout::LABEL_COL)).and_then(cell_text)
}

/// Trimmed, non-empty text of a string cell
pub fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

/// Numeric value of a cell; accounting-formatted strings are accepted
pub fn cell_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) if f.is_finite() => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => parse_accounting_number(s),
        _ => None,
    }
}

/// Parse `"1,234.50"`, `"$1,234"` or `"(1,234)"` (negative)
fn parse_accounting_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return None;
    }
    let negative = trimmed.starts_with('(') && trimmed.ends_with(')');
    let cleaned: String = trimmed.chars()
        .filter(|c| !matches!(c, ',' | '$' | '(' | ')' | ' '))
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Resolve a date-row cell to its reporting period
pub fn parse_period_cell(cell: &Data) -> Option<PeriodId> {
    match cell {
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()).map(PeriodId::from_date),
        Data::DateTimeIso(s) => parse_period_text(s),
        Data::Float(f) => excel_serial_to_date(*f).map(PeriodId::from_date),
        Data::Int(i) => excel_serial_to_date(*i as f64).map(PeriodId::from_date),
        Data::String(s) => parse_period_text(s),
        _ => None,
    }
}

/// Excel serials accepted as dates (1954-10-03 through 2119-01-09)
const SERIAL_DATE_RANGE: std::ops::RangeInclusive<f64> = 20_000.0..=80_000.0;

/// Convert a 1900-system Excel serial to a date
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !SERIAL_DATE_RANGE.contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Parse textual period headers such as `2025-01-31`, `2025-01`, `1/31/2025` or `Jan-25`
pub fn parse_period_text(text: &str) -> Option<PeriodId> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    // ISO datetime strings carry the date in the first ten characters
    if let Some(prefix) = text.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(PeriodId::from_date(date));
        }
    }

    for format in ["%m/%d/%Y", "%m/%d/%y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            if date.year() >= 1900 {
                return Some(PeriodId::from_date(date));
            }
        }
    }

    if let Ok(period) = PeriodId::new(text) {
        return Some(period);
    }

    let normalized = format!("01 {}", text.replace(['-', '/'], " "));
    for format in ["%d %b %Y", "%d %B %Y", "%d %b %y", "%d %B %y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&normalized, format) {
            if date.year() >= 1900 {
                return Some(PeriodId::from_date(date));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    fn sample_sheet() -> Range<Data> {
        let mut range = Range::new((0, 0), (40, layout::LAST_PERIOD_COL));
        range.set_value((layout::DATE_ROW, layout::FIRST_PERIOD_COL), text("2025-01-31"));
        range.set_value((layout::DATE_ROW, layout::FIRST_PERIOD_COL + 1), text("Feb-25"));
        range.set_value((5, layout::LABEL_COL), text("Total Revenue"));
        range.set_value((5, layout::FIRST_PERIOD_COL), Data::Float(100_000.0));
        range.set_value((5, layout::FIRST_PERIOD_COL + 1), Data::Float(0.0));
        range.set_value((6, layout::LABEL_COL), text("Medicare A Revenue"));
        range.set_value((6, layout::PPD_LOOKUP_COL), text("Skilled PPD"));
        range.set_value((6, layout::FIRST_PERIOD_COL), text("$40,000"));
        range.set_value((7, layout::LABEL_COL), text("Unmapped Line"));
        range.set_value((7, layout::FIRST_PERIOD_COL), Data::Float(5.0));
        range.set_value((25, layout::LABEL_COL), text("Patient Days"));
        range.set_value((26, layout::LABEL_COL), text("Medicare A"));
        range.set_value((26, layout::FIRST_PERIOD_COL), Data::Float(200.0));
        range.set_value((27, layout::LABEL_COL), text("Medicaid"));
        range.set_value((27, layout::FIRST_PERIOD_COL), Data::Float(800.0));
        range.set_value((27, layout::FIRST_PERIOD_COL + 1), Data::Float(0.0));
        range.set_value((28, layout::LABEL_COL), text("Operational Beds"));
        range.set_value((28, layout::FIRST_PERIOD_COL), Data::Float(40.0));
        range
    }

    #[test]
    fn test_parse_period_text_formats() {
        assert_eq!(parse_period_text("2025-01-31").unwrap().as_str(), "2025-01");
        assert_eq!(parse_period_text("2025-03").unwrap().as_str(), "2025-03");
        assert_eq!(parse_period_text("1/31/2025").unwrap().as_str(), "2025-01");
        assert_eq!(parse_period_text("Jan-25").unwrap().as_str(), "2025-01");
        assert_eq!(parse_period_text("September 2024").unwrap().as_str(), "2024-09");
        assert!(parse_period_text("Total").is_none());
        assert!(parse_period_text("").is_none());
    }

    #[test]
    fn test_parse_period_serial() {
        // 45688 is 2025-01-31 in the 1900 date system
        assert_eq!(parse_period_cell(&Data::Float(45_688.0)).unwrap().as_str(), "2025-01");
        assert!(parse_period_cell(&Data::Float(2025.0)).is_none());
        assert!(parse_period_cell(&Data::Empty).is_none());
    }

    #[test]
    fn test_accounting_numbers() {
        assert_eq!(cell_number(&text("1,234.50")), Some(1234.5));
        assert_eq!(cell_number(&text("(500)")), Some(-500.0));
        assert_eq!(cell_number(&text("-")), None);
        assert_eq!(cell_number(&Data::Int(7)), Some(7.0));
        assert_eq!(cell_number(&Data::Bool(true)), None);
    }

    #[test]
    fn test_parse_sheet_extracts_blocks() {
        let reader = WorkbookReader::new();
        let sheet = reader.parse_sheet("101 (Maple Grove)", &sample_sheet(), "book.xlsx").unwrap();

        assert_eq!(sheet.facility.facility_id.as_str(), "101");
        assert_eq!(sheet.facility.name, "Maple Grove");
        assert_eq!(sheet.periods.len(), 2);

        // Zero amounts and unmapped labels produce nothing
        assert_eq!(sheet.finance_facts.len(), 2);
        let medicare = sheet.finance_facts.iter()
            .find(|f| f.account_subcategory == "Medicare A")
            .unwrap();
        assert_eq!(medicare.amount, 40_000.0);
        assert_eq!(medicare.denominator_type, DenominatorType::SkilledDays);
        assert_eq!(medicare.payer_category, Some(PayerCategory::MedicareA));

        assert_eq!(sheet.census_facts.len(), 2);
        assert!(sheet.census_facts.iter().all(|c| c.period_id.as_str() == "2025-01"));

        // February has no beds or days, so no occupancy row
        assert_eq!(sheet.occupancy_facts.len(), 1);
        assert_eq!(sheet.occupancy_facts[0].operational_beds, 40.0);
    }

    #[test]
    fn test_parse_sheet_rejects_structural_problems() {
        let reader = WorkbookReader::new();
        assert!(reader.parse_sheet("Summary", &sample_sheet(), "book.xlsx").is_err());

        let mut no_dates = sample_sheet();
        no_dates.set_value((layout::DATE_ROW, layout::FIRST_PERIOD_COL), text("Actual"));
        no_dates.set_value((layout::DATE_ROW, layout::FIRST_PERIOD_COL + 1), Data::Empty);
        let err = reader.parse_sheet("101 (Maple Grove)", &no_dates, "book.xlsx").unwrap_err();
        assert!(err.contains("no resolvable periods"));

        let tiny: Range<Data> = Range::new((0, 0), (2, 2));
        assert!(reader.parse_sheet("101 (Maple Grove)", &tiny, "book.xlsx").is_err());
    }

    #[test]
    fn test_strict_reader_fails_on_malformed_facility_sheet() {
        let tiny: Range<Data> = Range::new((0, 0), (2, 2));
        let sheets = vec![("Summary", sample_sheet()), ("102 (Oak Hill)", tiny)];

        let lenient = WorkbookReader::new().parse_sheets(sheets.clone(), "book.xlsx").unwrap();
        assert_eq!(lenient.skipped_sheets.len(), 2);
        assert!(lenient.facility_ids.is_empty());

        let strict = WorkbookReader::new().with_skip_invalid_sheets(false);
        let err = strict.parse_sheets(sheets, "book.xlsx").unwrap_err();
        assert!(matches!(err, SnfError::DataValidation { .. }));
    }

    #[test]
    fn test_census_labels_in_finance_band_are_ignored() {
        let reader = WorkbookReader::new();
        let mut range = sample_sheet();
        // A revenue label placed after the sentinel belongs to the census block
        range.set_value((29, layout::LABEL_COL), text("Total Revenue"));
        range.set_value((29, layout::FIRST_PERIOD_COL), Data::Float(1.0));
        let sheet = reader.parse_sheet("101 (Maple Grove)", &range, "book.xlsx").unwrap();
        assert_eq!(
            sheet.finance_facts.iter().filter(|f| f.account_subcategory == "Total").count(),
            1
        );
    }
}
