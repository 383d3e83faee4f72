/*!
CSV export of query results.

An export is an ordered list of (column label, extractor) pairs applied to
a slice of records. The whole file is built in memory and only handed back
on success, so a failure partway through can never ship a truncated
download to the browser.
*/
use time::{Date, OffsetDateTime};

use crate::{DATE_FMT, DATETIME_FMT};

#[derive(Debug, PartialEq)]
pub struct ExportError(String);

impl ExportError {
    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> ExportError {
        ExportError(format!("Error writing CSV: {}", &e))
    }
}

/// One output column: header label plus how to pull the cell from a record.
pub type Column<R> = (&'static str, fn(&R) -> String);

/// Render `records` as a CSV byte buffer with exactly the columns of
/// `columns`, in order. The `csv` writer handles quoting of embedded
/// commas, quotes, and newlines in free-text fields.
pub fn to_csv<R>(records: &[R], columns: &[Column<R>]) -> Result<Vec<u8>, ExportError> {
    log::trace!(
        "to_csv( [ {} records ], [ {} columns ] ) called.",
        records.len(), columns.len()
    );

    let mut w = csv::Writer::from_writer(Vec::new());

    w.write_record(columns.iter().map(|(label, _)| *label))?;
    for record in records.iter() {
        w.write_record(columns.iter().map(|(_, get)| get(record)))?;
    }

    w.into_inner().map_err(|e| ExportError(
        format!("Error finalizing CSV buffer: {}", &e)
    ))
}

/// Fixed day-first date rendering for exports. Formatting a valid `Date`
/// with a constant description can't fail, so a blank cell stands in for
/// the unrepresentable case.
pub fn fmt_date(d: &Date) -> String {
    d.format(DATE_FMT).unwrap_or_default()
}

pub fn fmt_opt_date(d: &Option<Date>) -> String {
    match d {
        Some(d) => fmt_date(d),
        None => String::new(),
    }
}

pub fn fmt_datetime(t: &OffsetDateTime) -> String {
    t.format(DATETIME_FMT).unwrap_or_default()
}

// Serde helpers so record structs render dates in the fixed display
// format when handed to templates.

pub fn ser_opt_date<S>(d: &Option<Date>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&fmt_opt_date(d))
}

pub fn ser_date<S>(d: &Date, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&fmt_date(d))
}

pub fn ser_datetime<S>(t: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&fmt_datetime(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    struct Row {
        name: String,
        note: String,
    }

    static COLUMNS: &[Column<Row>] = &[
        ("Name", |r| r.name.clone()),
        ("Note", |r| r.note.clone()),
    ];

    #[test]
    fn columns_in_field_map_order() {
        let rows = vec![
            Row { name: "Alice Smith".to_owned(), note: "none".to_owned() },
            Row { name: "Bob Jones".to_owned(), note: "peanuts".to_owned() },
        ];
        let bytes = to_csv(&rows, COLUMNS).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "Name,Note\nAlice Smith,none\nBob Jones,peanuts\n"
        );
    }

    #[test]
    fn free_text_is_escaped() {
        let rows = vec![
            Row {
                name: "Quote \"Me\"".to_owned(),
                note: "painting, music\nand a nap".to_owned(),
            },
        ];
        let bytes = to_csv(&rows, COLUMNS).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.splitn(2, '\n');
        assert_eq!(lines.next().unwrap(), "Name,Note");
        assert_eq!(
            lines.next().unwrap(),
            "\"Quote \"\"Me\"\"\",\"painting, music\nand a nap\"\n"
        );
    }

    #[test]
    fn empty_record_set_still_has_headers() {
        let bytes = to_csv(&[], COLUMNS).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "Name,Note\n");
    }

    #[test]
    fn fixed_date_formats() {
        assert_eq!(fmt_date(&date!(2025 - 07 - 09)), "09/07/2025");
        assert_eq!(fmt_opt_date(&None), "");
        assert_eq!(
            fmt_datetime(&datetime!(2025-07-09 14:05 UTC)),
            "09/07/2025 14:05"
        );
    }
}
