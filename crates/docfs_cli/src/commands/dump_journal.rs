//! Dump journal command implementation.

use super::CommandResult;
use docfs_core::journal::parse;
use docfs_core::{JournalOperation, JournalRecord, JOURNAL_FILE};
use serde::Serialize;
use std::path::Path;

/// Journal record representation for output.
#[derive(Debug, Serialize)]
pub struct JournalRecordInfo {
    /// Line number in the journal file.
    pub line: usize,
    /// Operation name.
    pub operation: JournalOperation,
    /// Record timestamp in milliseconds.
    pub timestamp: u64,
    /// Entity set of the affected document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_set: Option<String>,
    /// Id of the affected document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Journal handle that wrote the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer: Option<String>,
}

impl JournalRecordInfo {
    fn new(line: usize, record: &JournalRecord) -> Self {
        Self {
            line,
            operation: record.operation,
            timestamp: record.timestamp.0,
            entity_set: record.doc.as_ref().and_then(|d| d.entity_set.clone()),
            id: record.doc.as_ref().map(|d| d.id.clone()),
            writer: record.writer.clone(),
        }
    }
}

/// Runs the dump-journal command.
pub async fn run(path: &Path, limit: Option<usize>, format: &str) -> CommandResult<()> {
    let journal_path = path.join(JOURNAL_FILE);
    if !tokio::fs::try_exists(&journal_path).await? {
        return Err("Journal file not found".into());
    }

    let contents = tokio::fs::read_to_string(&journal_path).await?;
    let records = read_records(&contents, limit)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ => print_text_output(&records),
    }
    Ok(())
}

fn read_records(contents: &str, limit: Option<usize>) -> CommandResult<Vec<JournalRecordInfo>> {
    let records = parse(contents)?;
    Ok(records
        .iter()
        .enumerate()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(i, record)| JournalRecordInfo::new(i + 1, record))
        .collect())
}

fn print_text_output(records: &[JournalRecordInfo]) {
    println!("{:<6} {:<8} {:<15} {:<16} Id", "Line", "Op", "Timestamp", "Entity set");
    for record in records {
        println!(
            "{:<6} {:<8} {:<15} {:<16} {}",
            record.line,
            format!("{:?}", record.operation).to_lowercase(),
            record.timestamp,
            record.entity_set.as_deref().unwrap_or("-"),
            record.id.as_deref().unwrap_or("-"),
        );
    }
    println!();
    println!("Total: {} records", records.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_and_numbers_records() {
        let contents = concat!(
            "{\"operation\":\"insert\",\"timestamp\":5,\"doc\":{\"_id\":\"a\",\"$entitySet\":\"settings\"}}\n",
            "{\"operation\":\"reload\",\"timestamp\":6}\n",
            "{\"operation\":\"remove\",\"timestamp\":7,\"doc\":{\"_id\":\"a\",\"$entitySet\":\"settings\"}}\n",
        );
        let records = read_records(contents, Some(2)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 1);
        assert_eq!(records[0].id.as_deref(), Some("a"));
        assert_eq!(records[0].entity_set.as_deref(), Some("settings"));
        assert_eq!(records[1].operation, JournalOperation::Reload);
        assert!(records[1].id.is_none());
    }

    #[test]
    fn corrupt_journal_is_an_error() {
        assert!(read_records("not json\n", None).is_err());
    }
}
