/*!
 * Export functionality for KPI results
 *
 * Provides JSON, JSON Lines, CSV and SQL exports of computed KPI rows.
 */

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::{ExportFormat, Result};
use crate::data_types::*;
use crate::dataset::PortfolioDataset;

/// Trait for implementing KPI result exporters
pub trait KpiExporter {
    /// Write the results to any writer
    fn write_to(&self, results: &[KpiResult], writer: &mut dyn Write) -> Result<()>;

    /// Get the export format
    fn format(&self) -> ExportFormat;

    /// Export the results to a file
    fn export(&self, results: &[KpiResult], path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(results, &mut writer)?;
        writer.flush()?;
        log::info!("Exported {} KPI results as {} to {}", results.len(), self.format(), path.display());
        Ok(())
    }
}

/// Exporter for a format with default settings
pub fn exporter_for(format: ExportFormat) -> Box<dyn KpiExporter> {
    match format {
        ExportFormat::Json => Box::new(JsonExporter::new()),
        ExportFormat::JsonLines => Box::new(JsonExporter::new().as_json_lines()),
        ExportFormat::Csv => Box::new(CsvExporter::new()),
        ExportFormat::Sql => Box::new(SqlExporter::new()),
    }
}

/// JSON exporter
pub struct JsonExporter {
    /// Whether to pretty-print the JSON
    pub pretty_print: bool,
    /// Whether to export as JSON Lines (one record per line)
    pub json_lines: bool,
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self {
            pretty_print: true,
            json_lines: false,
        }
    }
}

impl JsonExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    /// Set JSON Lines format
    pub fn as_json_lines(mut self) -> Self {
        self.json_lines = true;
        self.pretty_print = false;
        self
    }
}

impl KpiExporter for JsonExporter {
    fn write_to(&self, results: &[KpiResult], writer: &mut dyn Write) -> Result<()> {
        if self.json_lines {
            for result in results {
                let json = serde_json::to_string(result)?;
                writeln!(writer, "{}", json)?;
            }
        } else if self.pretty_print {
            serde_json::to_writer_pretty(&mut *writer, results)?;
        } else {
            serde_json::to_writer(&mut *writer, results)?;
        }
        Ok(())
    }

    fn format(&self) -> ExportFormat {
        if self.json_lines { ExportFormat::JsonLines } else { ExportFormat::Json }
    }
}

/// One flat CSV row
#[derive(Serialize)]
struct CsvRow<'a> {
    facility_id: &'a str,
    period_id: &'a str,
    kpi_id: &'a str,
    value: Option<f64>,
    numerator_value: f64,
    denominator_value: f64,
    denominator_type: &'static str,
    payer_scope: Option<&'a str>,
    unit: &'static str,
    warnings: String,
}

/// CSV exporter; warnings are joined with `"; "`
pub struct CsvExporter {
    pub include_headers: bool,
    pub delimiter: u8,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self {
            include_headers: true,
            delimiter: b',',
        }
    }
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_headers(mut self, include: bool) -> Self {
        self.include_headers = include;
        self
    }
}

impl KpiExporter for CsvExporter {
    fn write_to(&self, results: &[KpiResult], writer: &mut dyn Write) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.include_headers)
            .from_writer(writer);

        for result in results {
            csv_writer.serialize(CsvRow {
                facility_id: result.facility_id.as_str(),
                period_id: result.period_id.as_str(),
                kpi_id: &result.kpi_id,
                value: result.value,
                numerator_value: result.numerator_value,
                denominator_value: result.denominator_value,
                denominator_type: result.denominator_type.as_str(),
                payer_scope: result.payer_scope.as_deref(),
                unit: result.unit.as_str(),
                warnings: result.warnings.join("; "),
            })?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
    }
}

/// SQL exporter producing a `kpi_results` table and batched inserts
pub struct SqlExporter {
    pub dialect: SqlDialect,
    pub table_name: String,
    /// Rows per INSERT statement
    pub batch_size: usize,
    /// Whether to include CREATE TABLE statements
    pub include_schema: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    SQLite,
}

impl Default for SqlExporter {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::PostgreSQL,
            table_name: "kpi_results".to_string(),
            batch_size: 1000,
            include_schema: true,
        }
    }
}

impl SqlExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SQL dialect
    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub fn with_schema(mut self, include: bool) -> Self {
        self.include_schema = include;
        self
    }

    fn write_schema(&self, writer: &mut dyn Write) -> Result<()> {
        let (id_column, real) = match self.dialect {
            SqlDialect::PostgreSQL => ("id SERIAL PRIMARY KEY", "DOUBLE PRECISION"),
            SqlDialect::SQLite => ("id INTEGER PRIMARY KEY AUTOINCREMENT", "REAL"),
        };
        writeln!(writer, "CREATE TABLE IF NOT EXISTS {} (", self.table_name)?;
        writeln!(writer, "  {},", id_column)?;
        writeln!(writer, "  facility_id VARCHAR(32) NOT NULL,")?;
        writeln!(writer, "  period_id CHAR(7) NOT NULL,")?;
        writeln!(writer, "  kpi_id VARCHAR(64) NOT NULL,")?;
        writeln!(writer, "  value {},", real)?;
        writeln!(writer, "  numerator_value {} NOT NULL,", real)?;
        writeln!(writer, "  denominator_value {} NOT NULL,", real)?;
        writeln!(writer, "  denominator_type VARCHAR(32) NOT NULL,")?;
        writeln!(writer, "  payer_scope VARCHAR(64),")?;
        writeln!(writer, "  unit VARCHAR(16) NOT NULL,")?;
        writeln!(writer, "  warnings TEXT NOT NULL DEFAULT '[]',")?;
        writeln!(writer, "  UNIQUE (facility_id, period_id, kpi_id)")?;
        writeln!(writer, ");\n")?;
        writeln!(writer, "CREATE INDEX IF NOT EXISTS idx_{0}_series ON {0}(facility_id, kpi_id, period_id);\n",
            self.table_name)?;
        Ok(())
    }
}

impl KpiExporter for SqlExporter {
    fn write_to(&self, results: &[KpiResult], writer: &mut dyn Write) -> Result<()> {
        if self.include_schema {
            self.write_schema(writer)?;
        }

        for chunk in results.chunks(self.batch_size.max(1)) {
            writeln!(writer, "INSERT INTO {} (facility_id, period_id, kpi_id, value, numerator_value, denominator_value, denominator_type, payer_scope, unit, warnings) VALUES",
                self.table_name)?;

            for (i, result) in chunk.iter().enumerate() {
                let values = format!("({}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
                    sql_string(Some(result.facility_id.as_str())),
                    sql_string(Some(result.period_id.as_str())),
                    sql_string(Some(&result.kpi_id)),
                    sql_number(result.value),
                    sql_number(Some(result.numerator_value)),
                    sql_number(Some(result.denominator_value)),
                    sql_string(Some(result.denominator_type.as_str())),
                    sql_string(result.payer_scope.as_deref()),
                    sql_string(Some(result.unit.as_str())),
                    sql_string(Some(&serde_json::to_string(&result.warnings)?)),
                );
                let terminator = if i + 1 < chunk.len() { "," } else { ";" };
                writeln!(writer, "  {}{}", values, terminator)?;
            }
        }
        Ok(())
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Sql
    }
}

// SQL helper functions
fn sql_string(opt: Option<&str>) -> String {
    match opt {
        Some(s) => format!("'{}'", s.replace('\'', "''")),
        None => "NULL".to_string(),
    }
}

fn sql_number(opt: Option<f64>) -> String {
    match opt {
        Some(v) if v.is_finite() => v.to_string(),
        _ => "NULL".to_string(),
    }
}

// Export convenience functions for PortfolioDataset
impl PortfolioDataset {
    /// Export every KPI result in the given format
    pub fn export<P: AsRef<Path>>(&self, path: P, format: ExportFormat) -> Result<()> {
        exporter_for(format).export(self.results(), path.as_ref())
    }

    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.export(path, ExportFormat::Json)
    }

    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.export(path, ExportFormat::Csv)
    }

    /// Export the results that match a filter
    pub fn export_subset<P: AsRef<Path>, F>(&self, path: P, filter: F, format: ExportFormat) -> Result<()>
    where
        F: Fn(&KpiResult) -> bool,
    {
        let subset: Vec<KpiResult> = self.results().iter()
            .filter(|r| filter(r))
            .cloned()
            .collect();
        exporter_for(format).export(&subset, path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> Vec<KpiResult> {
        vec![
            KpiResult {
                facility_id: FacilityId::new("101").unwrap(),
                period_id: PeriodId::new("2025-01").unwrap(),
                kpi_id: "total_revenue_ppd".to_string(),
                value: Some(100.0),
                numerator_value: 100_000.0,
                denominator_value: 1000.0,
                denominator_type: DenominatorType::ResidentDays,
                payer_scope: None,
                unit: KpiUnit::Currency,
                warnings: vec![],
            },
            KpiResult {
                facility_id: FacilityId::new("101").unwrap(),
                period_id: PeriodId::new("2025-01").unwrap(),
                kpi_id: "medicare_a_revenue_ppd".to_string(),
                value: None,
                numerator_value: 0.0,
                denominator_value: 0.0,
                denominator_type: DenominatorType::PayerDays,
                payer_scope: Some("Medicare A".to_string()),
                unit: KpiUnit::Currency,
                warnings: vec![
                    "missing numerator facts for medicare_a_revenue_ppd".to_string(),
                    "zero denominator for medicare_a_revenue_ppd".to_string(),
                ],
            },
        ]
    }

    fn render(exporter: &dyn KpiExporter) -> String {
        let mut buffer = Vec::new();
        exporter.write_to(&results(), &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_json_and_json_lines() {
        let json = render(&JsonExporter::new());
        let parsed: Vec<KpiResult> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, results());

        let lines = render(&JsonExporter::new().as_json_lines());
        assert_eq!(lines.lines().count(), 2);
        assert!(lines.lines().nth(1).unwrap().contains("\"value\":null"));
    }

    #[test]
    fn test_csv_rows() {
        let csv = render(&CsvExporter::new());
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("facility_id,period_id,kpi_id,value"));
        assert!(lines.next().unwrap().starts_with("101,2025-01,total_revenue_ppd,100.0,"));
        let null_row = lines.next().unwrap();
        assert!(null_row.contains("medicare_a_revenue_ppd,,"));
        assert!(null_row.contains("missing numerator facts for medicare_a_revenue_ppd; zero denominator"));
    }

    #[test]
    fn test_sql_inserts() {
        let sql = render(&SqlExporter::new().with_dialect(SqlDialect::SQLite));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS kpi_results"));
        assert!(sql.contains("AUTOINCREMENT"));
        assert!(sql.contains("('101', '2025-01', 'total_revenue_ppd', 100, 100000, 1000, 'resident_days', NULL, 'currency', '[]'),"));
        assert!(sql.contains("NULL, 0, 0, 'payer_days', 'Medicare A'"));
        assert!(sql.trim_end().ends_with(";"));

        // The generated script loads into SQLite as-is
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&sql).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM kpi_results", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_exporter_for_matches_format() {
        for format in [ExportFormat::Json, ExportFormat::JsonLines, ExportFormat::Csv, ExportFormat::Sql] {
            assert_eq!(exporter_for(format).format(), format);
        }
    }
}
