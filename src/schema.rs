/*!
 * Workbook template definitions
 *
 * The income-statement workbook has no embedded schema: every facility sheet
 * follows the same fixed layout, and ledger lines are recognised by their
 * exact label text. This module holds the layout offsets and the label lookup
 * tables so both can be audited and tested in isolation.
 */

use lazy_static::lazy_static;
use regex::Regex;

use crate::data_types::{AccountCategory, PayerCategory};

/// Fixed cell offsets of the facility sheet template (all 0-based)
///
/// ```text
///        col B (1)            col C (2)     col D (3) .. col O (14)
/// row 4  (3)                                Jan-25 ... Dec-25       <- DATE_ROW
/// row 6  (5)  Medicare A Revenue  Skilled PPD  120000 ...
///  ...        ... income statement band up to FINANCE_LAST_ROW ...
///        Patient Days                                               <- CENSUS_SENTINEL
///        Medicare A                         620 ...
///        Operational Beds                   120 ...
/// ```
pub mod layout {
    /// Row holding the month-end dates for every period column
    pub const DATE_ROW: u32 = 3;

    /// Column holding ledger and census labels
    pub const LABEL_COL: u32 = 1;

    /// Side column whose text says which day-count a line's PPD uses
    pub const PPD_LOOKUP_COL: u32 = 2;

    /// First monthly column
    pub const FIRST_PERIOD_COL: u32 = 3;

    /// Last monthly column (inclusive); twelve months in total
    pub const LAST_PERIOD_COL: u32 = 14;

    /// First row of the income-statement band
    pub const FINANCE_FIRST_ROW: u32 = 5;

    /// Last row of the income-statement band (inclusive)
    pub const FINANCE_LAST_ROW: u32 = 150;

    /// Window scanned for the census sentinel (inclusive)
    pub const CENSUS_SEARCH_FIRST_ROW: u32 = 20;
    pub const CENSUS_SEARCH_LAST_ROW: u32 = 400;

    /// Label that opens the census block
    pub const CENSUS_SENTINEL: &str = "Patient Days";

    /// Number of rows read after the sentinel
    pub const CENSUS_BLOCK_ROWS: u32 = 60;

    /// Sheets with fewer used rows than this cannot hold a statement
    pub const MIN_SHEET_ROWS: u32 = 6;
}

/// A labeled income-statement line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinanceLine {
    pub label: &'static str,
    pub category: AccountCategory,
    pub subcategory: &'static str,
    pub department: Option<&'static str>,
    pub payer: Option<PayerCategory>,
}

/// A labeled census line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CensusLine {
    pub label: &'static str,
    pub payer: PayerCategory,
    pub is_skilled: bool,
    pub is_vent: bool,
}

/// Scalar occupancy rows inside the census block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OccupancyField {
    OperationalBeds,
    LicensedBeds,
    TotalPatientDays,
    TotalUnitDays,
    OperationalOccupancy,
    SecondOccupantDays,
}

const fn revenue(label: &'static str, subcategory: &'static str, payer: Option<PayerCategory>) -> FinanceLine {
    FinanceLine { label, category: AccountCategory::Revenue, subcategory, department: None, payer }
}

const fn expense(label: &'static str, subcategory: &'static str, department: &'static str) -> FinanceLine {
    FinanceLine { label, category: AccountCategory::Expense, subcategory, department: Some(department), payer: None }
}

const fn census(label: &'static str, payer: PayerCategory, is_skilled: bool, is_vent: bool) -> CensusLine {
    CensusLine { label, payer, is_skilled, is_vent }
}

/// Revenue lines recognised in the income-statement band
pub const REVENUE_LINES: &[FinanceLine] = &[
    revenue("Medicare A Revenue", "Medicare A", Some(PayerCategory::MedicareA)),
    revenue("Managed Care Revenue", "Managed Care", Some(PayerCategory::ManagedCare)),
    revenue("Medicaid Revenue", "Medicaid", Some(PayerCategory::Medicaid)),
    revenue("Private Pay Revenue", "Private", Some(PayerCategory::Private)),
    revenue("Hospice Revenue", "Hospice", Some(PayerCategory::Hospice)),
    revenue("VA Revenue", "VA", Some(PayerCategory::Va)),
    revenue("Medicare B Revenue", "Ancillary", Some(PayerCategory::MedicareB)),
    revenue("Other Revenue", "Other", None),
    revenue("Total Revenue", "Total", None),
];

/// Expense lines recognised in the income-statement band
pub const EXPENSE_LINES: &[FinanceLine] = &[
    expense("Nursing", "Nursing", "Nursing"),
    expense("Contract Labor", "Contract Labor", "Nursing"),
    expense("Therapy", "Therapy", "Therapy"),
    expense("Pharmacy", "Pharmacy", "Ancillary"),
    expense("Dietary", "Dietary", "Dietary"),
    expense("Housekeeping", "Housekeeping", "Environmental"),
    expense("Laundry", "Laundry", "Environmental"),
    expense("Activities", "Activities", "Resident Services"),
    expense("Social Services", "Social Services", "Resident Services"),
    expense("Plant Operations", "Plant", "Environmental"),
    expense("Administrative & General", "G&A", "Administration"),
    expense("Management Fees", "Management Fee", "Administration"),
    expense("Bad Debt", "Bad Debt", "Administration"),
    expense("Property Tax", "Property Tax", "Property"),
    expense("Rent / Lease", "Rent", "Property"),
    expense("Total Operating Expenses", "Total Operating", "Total"),
];

/// Census lines recognised inside the census block
pub const CENSUS_LINES: &[CensusLine] = &[
    census("Medicare A", PayerCategory::MedicareA, true, false),
    census("Managed Care", PayerCategory::ManagedCare, true, false),
    census("Medicaid", PayerCategory::Medicaid, false, false),
    census("Private", PayerCategory::Private, false, false),
    census("Hospice", PayerCategory::Hospice, false, false),
    census("VA", PayerCategory::Va, false, false),
    census("Medicare A Vent", PayerCategory::MedicareA, true, true),
    census("Managed Care Vent", PayerCategory::ManagedCare, true, true),
    census("Medicaid Vent", PayerCategory::Medicaid, false, true),
];

/// Occupancy scalar labels inside the census block
pub const OCCUPANCY_LINES: &[(&str, OccupancyField)] = &[
    ("Operational Beds", OccupancyField::OperationalBeds),
    ("Licensed Beds", OccupancyField::LicensedBeds),
    ("Total Patient Days", OccupancyField::TotalPatientDays),
    ("Total Unit Days", OccupancyField::TotalUnitDays),
    ("Operational Occupancy", OccupancyField::OperationalOccupancy),
    ("Second Occupant Days", OccupancyField::SecondOccupantDays),
];

/// Look up an income-statement label (revenue first, then expense)
pub fn finance_line(label: &str) -> Option<&'static FinanceLine> {
    REVENUE_LINES.iter()
        .chain(EXPENSE_LINES.iter())
        .find(|line| line.label == label)
}

/// Look up a census label
pub fn census_line(label: &str) -> Option<&'static CensusLine> {
    CENSUS_LINES.iter().find(|line| line.label == label)
}

/// Look up an occupancy scalar label
pub fn occupancy_field(label: &str) -> Option<OccupancyField> {
    OCCUPANCY_LINES.iter()
        .find(|(l, _)| *l == label)
        .map(|(_, field)| *field)
}

lazy_static! {
    static ref FACILITY_SHEET: Regex =
        Regex::new(r"^\s*(\d+)\s*\((.+)\)\s*$").expect("valid facility sheet pattern");
    static ref NON_FACILITY_SHEET: Regex =
        Regex::new(r"(?i)^\s*(summary|total|consolidated|portfolio|template|lookup|instructions|sheet\s*\d*$)")
            .expect("valid non-facility sheet pattern");
}

/// How a sheet name classifies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetKind {
    /// `"<code> (<name>)"`
    Facility { code: String, name: String },
    /// Summary, total or system sheet
    NonFacility,
    /// Anything else
    Unrecognized,
}

/// Classify a sheet by its name
pub fn classify_sheet_name(name: &str) -> SheetKind {
    if NON_FACILITY_SHEET.is_match(name) {
        return SheetKind::NonFacility;
    }
    match FACILITY_SHEET.captures(name) {
        Some(caps) => SheetKind::Facility {
            code: caps[1].to_string(),
            name: caps[2].trim().to_string(),
        },
        None => SheetKind::Unrecognized,
    }
}
