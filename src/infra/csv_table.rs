use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::{OccurrencePoint, Record, Table, Value};
use crate::error::{Result, TaxaError};
use crate::observability::metrics;

/// Read a CSV file with a header row into a [`Table`]. Empty cells become
/// nulls; every other cell is kept as text. Lines starting with
/// `comment_prefix` are skipped.
pub fn read_table(path: &Path, comment_prefix: Option<char>) -> Result<Table> {
    if !path.exists() {
        return Err(TaxaError::MissingInput { path: path.to_path_buf() });
    }

    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .comment(comment_prefix.and_then(|c| u8::try_from(c).ok()))
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut table = Table::new(headers.iter().cloned());

    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (column, cell) in headers.iter().zip(row.iter()) {
            let value = if cell.is_empty() { Value::Null } else { Value::text(cell) };
            record.set(column.clone(), value);
        }
        table.push(record);
    }

    debug!(path = %path.display(), rows = table.len(), columns = headers.len(), "Read CSV table");
    Ok(table)
}

/// Write a table as UTF-8 CSV with a header row. The file appears only once
/// fully written, so a failed run never leaves a truncated artifact.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    write_atomically(path, |writer| {
        writer.write_record(table.columns())?;
        for row in table {
            writer.write_record(table.columns().iter().map(|c| row.get(c).to_cell()))?;
        }
        Ok(())
    })?;

    info!(path = %path.display(), rows = table.len(), "Wrote table");
    metrics::output::rows_written(table.len());
    Ok(())
}

pub fn write_occurrences(path: &Path, points: &[OccurrencePoint]) -> Result<()> {
    write_atomically(path, |writer| {
        for point in points {
            writer.serialize(point)?;
        }
        Ok(())
    })?;

    info!(path = %path.display(), points = points.len(), "Wrote occurrences");
    metrics::output::rows_written(points.len());
    Ok(())
}

pub fn read_occurrences(path: &Path) -> Result<Vec<OccurrencePoint>> {
    if !path.exists() {
        return Err(TaxaError::MissingInput { path: path.to_path_buf() });
    }
    let mut reader = csv::Reader::from_path(path)?;
    let points = reader
        .deserialize()
        .collect::<std::result::Result<Vec<OccurrencePoint>, _>>()?;
    Ok(points)
}

/// Write text output (rendered SVG) through the same temp-file-and-rename path
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    ensure_parent(path)?;
    let tmp = temp_path(path);
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    info!(path = %path.display(), bytes = content.len(), "Wrote artifact");
    Ok(())
}

fn write_atomically(
    path: &Path,
    body: impl FnOnce(&mut csv::Writer<File>) -> Result<()>,
) -> Result<()> {
    ensure_parent(path)?;
    let tmp = temp_path(path);
    let mut writer = csv::Writer::from_path(&tmp)?;
    if let Err(e) = body(&mut writer).and_then(|_| writer.flush().map_err(TaxaError::from)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    drop(writer);
    fs::rename(&tmp, path)?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
