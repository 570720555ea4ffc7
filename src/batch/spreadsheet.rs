//! Keyword spreadsheets: CSV parsing, de-duplication and publication scheduling.

use ahash::AHashSet;
use chrono::{Days, NaiveDate};
use csv::{ReaderBuilder, Trim};

use crate::db::PlannedPost;
use crate::error::ForgeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub keyword: String,
    pub title: Option<String>,
    pub scheduled_for: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSheet {
    pub rows: Vec<SheetRow>,
    /// Blank or duplicate keywords that were dropped.
    pub skipped: usize,
}

impl ParsedSheet {
    fn push(&mut self, seen: &mut AHashSet<String>, row: SheetRow) {
        let keyword = row.keyword.trim();
        if keyword.is_empty() || !seen.insert(keyword.to_lowercase()) {
            self.skipped += 1;
            return;
        }
        self.rows.push(SheetRow {
            keyword: keyword.to_string(),
            ..row
        });
    }
}

/// Reads a CSV with a header row. `keyword` is required; `title` and `scheduled_for`
/// (`YYYY-MM-DD`) are optional. Header names are matched case-insensitively.
pub fn parse_csv(data: &[u8]) -> Result<ParsedSheet, ForgeError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(data);

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
    };
    let keyword_col = column("keyword")
        .ok_or_else(|| ForgeError::BadRequest("CSV is missing a `keyword` column".to_string()))?;
    let title_col = column("title");
    let date_col = column("scheduled_for");

    let mut sheet = ParsedSheet::default();
    let mut seen = AHashSet::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let field = |col: Option<usize>| {
            col.and_then(|c| record.get(c))
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let scheduled_for = match field(date_col) {
            Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
                // Header is line 1.
                ForgeError::BadRequest(format!(
                    "line {}: invalid scheduled_for {raw:?}: {e}",
                    index + 2
                ))
            })?),
            None => None,
        };

        sheet.push(
            &mut seen,
            SheetRow {
                keyword: field(Some(keyword_col)).unwrap_or_default().to_string(),
                title: field(title_col).map(str::to_string),
                scheduled_for,
            },
        );
    }

    Ok(sheet)
}

/// Same de-duplication as `parse_csv`, for a plain keyword list.
pub fn from_keywords<S: AsRef<str>>(keywords: &[S]) -> ParsedSheet {
    let mut sheet = ParsedSheet::default();
    let mut seen = AHashSet::new();
    for keyword in keywords {
        sheet.push(
            &mut seen,
            SheetRow {
                keyword: keyword.as_ref().to_string(),
                title: None,
                scheduled_for: None,
            },
        );
    }
    sheet
}

/// Fills in missing dates, `posts_per_day` rows per day starting at `start`.
/// Rows that carry their own date keep it.
pub fn schedule(rows: Vec<SheetRow>, start: NaiveDate, posts_per_day: u32) -> Vec<PlannedPost> {
    let per_day = u64::from(posts_per_day.max(1));
    let mut undated = 0u64;

    rows.into_iter()
        .map(|row| {
            let scheduled_for = row.scheduled_for.unwrap_or_else(|| {
                let offset = undated / per_day;
                undated += 1;
                start.checked_add_days(Days::new(offset)).unwrap_or(start)
            });
            PlannedPost {
                keyword: row.keyword,
                title: row.title,
                scheduled_for,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn csv_skips_blank_and_duplicate_keywords() {
        let csv = "Keyword,Title,scheduled_for\n\
                   hiking lisbon,Best trails,2025-03-01\n\
                   ,ignored,\n\
                   HIKING LISBON ,dupe,\n\
                   surf peniche,,\n";
        let sheet = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(sheet.skipped, 2);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].title.as_deref(), Some("Best trails"));
        assert_eq!(sheet.rows[0].scheduled_for, Some(date("2025-03-01")));
        assert_eq!(sheet.rows[1].keyword, "surf peniche");
        assert_eq!(sheet.rows[1].title, None);
    }

    #[test]
    fn csv_requires_keyword_column() {
        let err = parse_csv(b"title\nfoo\n").unwrap_err();
        assert!(matches!(err, ForgeError::BadRequest(_)));
    }

    #[test]
    fn csv_rejects_bad_dates_with_line_number() {
        let err = parse_csv(b"keyword,scheduled_for\na,2025-13-40\n").unwrap_err();
        match err {
            ForgeError::BadRequest(msg) => assert!(msg.contains("line 2"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn keyword_lists_share_dedupe_rules() {
        let sheet = from_keywords(&["a", " A", "", "b"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.skipped, 2);
    }

    #[test]
    fn schedule_spreads_undated_rows_per_day() {
        let rows = vec![
            SheetRow { keyword: "a".into(), title: None, scheduled_for: None },
            SheetRow { keyword: "b".into(), title: None, scheduled_for: Some(date("2030-01-01")) },
            SheetRow { keyword: "c".into(), title: None, scheduled_for: None },
            SheetRow { keyword: "d".into(), title: None, scheduled_for: None },
        ];
        let planned = schedule(rows, date("2025-05-10"), 2);

        let dates: Vec<_> = planned.iter().map(|p| p.scheduled_for).collect();
        assert_eq!(
            dates,
            vec![
                date("2025-05-10"),
                date("2030-01-01"),
                date("2025-05-10"),
                date("2025-05-11"),
            ]
        );
    }
}
