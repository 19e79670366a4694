//! Visit date parsing.
//!
//! Upstream stages normalize visit dates to `YYYY-MM-DD`, but raw submissions
//! still arrive in a couple of other layouts.

use chrono::NaiveDate;

use crate::errors::CoreError;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse a visit date in any accepted layout.
///
/// # Errors
///
/// Returns `CoreError::Validation` if no layout matches.
pub fn parse_visit_date(value: &str) -> Result<NaiveDate, CoreError> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .ok_or_else(|| CoreError::Validation(format!("Invalid visit date '{value}'")))
}

/// Render a date the way it is stored on visit rows.
#[must_use]
pub fn format_visit_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
