//! CSV writer for the refresh history.
//!
//! One file per distinct set of tracked items, named after the sorted item
//! name prefixes. Each finished session appends one row; the file is opened
//! in append mode for every write so earlier sessions are never rewritten.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::automation::stats::{ItemTally, SessionRecord};

/// Leading characters of each item name used in the file name.
const NAME_PREFIX_LEN: usize = 4;

/// Column headers for the two currency columns.
#[derive(Clone, Debug)]
pub struct CurrencyLabels {
    pub refresh: String,
    pub items: String,
}

/// Builds the history file name for a set of item names.
///
/// `["Mystic medal", "Covenant bookmark"]` -> `refreshAttemptCoveMyst.csv`
pub fn history_file_name(names: &[String]) -> String {
    let mut prefixes: Vec<String> = names
        .iter()
        .map(|name| name.chars().take(NAME_PREFIX_LEN).collect())
        .collect();
    prefixes.sort();
    format!("refreshAttempt{}.csv", prefixes.concat())
}

/// Writes the header if the file doesn't exist or is empty.
///
/// If the file exists and has content, this does nothing (preserves existing data).
pub fn init_csv(path: &Path, labels: &CurrencyLabels, item_names: &[String]) -> Result<()> {
    if path.exists() {
        let file = File::open(path).context("Failed to open existing CSV")?;
        let reader = BufReader::new(file);
        if reader.lines().next().is_some() {
            return Ok(());
        }
    }

    let mut header = vec![
        "Time".to_string(),
        "Duration".to_string(),
        "Refresh count".to_string(),
        labels.refresh.clone(),
        labels.items.clone(),
    ];
    header.extend(item_names.iter().cloned());

    let mut file = File::create(path).context("Failed to create CSV file")?;
    writeln!(file, "{}", join_row(&header)).context("Failed to write CSV header")?;
    Ok(())
}

/// Appends one session row to the CSV file.
pub fn append_to_csv(path: &Path, record: &SessionRecord, items: &[ItemTally]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open CSV for append")?;

    // Format: time,duration,refresh count,refresh spend,item spend,counts...
    let mut row = vec![
        record.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        format_duration(record.duration),
        record.refresh_count.to_string(),
        record.refresh_currency_spent.to_string(),
        record.total_cost().to_string(),
    ];
    row.extend(items.iter().map(|tally| tally.purchased.to_string()));

    writeln!(file, "{}", join_row(&row)).context("Failed to write CSV row")?;
    Ok(())
}

/// Persists a finished session under `history_dir` and returns the file path.
///
/// Item columns are ordered by name so the same item set always maps onto
/// the same columns.
pub fn write_session(history_dir: &Path, record: &SessionRecord, labels: &CurrencyLabels) -> Result<PathBuf> {
    fs::create_dir_all(history_dir)
        .with_context(|| format!("Failed to create {}", history_dir.display()))?;

    let mut items = record.items.clone();
    items.sort_by(|a, b| a.name.cmp(&b.name));
    let names: Vec<String> = items.iter().map(|tally| tally.name.clone()).collect();

    let path = history_dir.join(history_file_name(&names));
    init_csv(&path, labels, &names)?;
    append_to_csv(&path, record, &items)?;
    Ok(path)
}

/// Formats a duration as `H:MM:SS`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

fn join_row(fields: &[String]) -> String {
    fields
        .iter()
        .map(|field| escape_field(field))
        .collect::<Vec<_>>()
        .join(",")
}

/// Quotes a field containing separators, quotes or line breaks.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use tempfile::tempdir;

    fn labels() -> CurrencyLabels {
        CurrencyLabels {
            refresh: "Skystone spent".to_string(),
            items: "Gold spent".to_string(),
        }
    }

    fn record(bookmarks: u32, medals: u32) -> SessionRecord {
        SessionRecord {
            started_at: Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap(),
            duration: Duration::from_secs(3725),
            refresh_count: 3,
            refresh_currency_spent: 9,
            items: vec![
                ItemTally {
                    name: "Mystic medal".to_string(),
                    price: 280_000,
                    purchased: medals,
                },
                ItemTally {
                    name: "Covenant bookmark".to_string(),
                    price: 184_000,
                    purchased: bookmarks,
                },
            ],
        }
    }

    #[test]
    fn test_history_file_name_sorted_prefixes() {
        let names = vec!["Mystic medal".to_string(), "Covenant bookmark".to_string()];
        assert_eq!(history_file_name(&names), "refreshAttemptCoveMyst.csv");
        assert_eq!(history_file_name(&["Gem".to_string()]), "refreshAttemptGem.csv");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(format_duration(Duration::from_millis(59_999)), "0:00:59");
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_write_session_creates_header_and_row() {
        let dir = tempdir().unwrap();
        let history = dir.path().join("ShopRefreshHistory");

        let path = write_session(&history, &record(2, 0), &labels()).unwrap();
        assert!(path.ends_with("refreshAttemptCoveMyst.csv"));

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Time,Duration,Refresh count,Skystone spent,Gold spent,Covenant bookmark,Mystic medal",
                "2024-03-09 14:05:00,1:02:05,3,9,368000,2,0",
            ]
        );
    }

    #[test]
    fn test_write_session_appends() {
        let dir = tempdir().unwrap();

        write_session(dir.path(), &record(1, 0), &labels()).unwrap();
        let path = write_session(dir.path(), &record(0, 1), &labels()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 sessions
        assert!(lines[2].ends_with(",280000,0,1"));
    }

    #[test]
    fn test_init_csv_preserves_existing() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("test.csv");
        fs::write(&csv_path, "existing,data\n1,2,3\n").unwrap();

        init_csv(&csv_path, &labels(), &[]).unwrap();

        let content = fs::read_to_string(&csv_path).unwrap();
        assert!(content.starts_with("existing,data"));
    }
}
