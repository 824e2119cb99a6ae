use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::app::ports::IntegratedOutputPort;
use crate::constants::{OUTPUT_LEADING_COLUMNS, OUTPUT_YIELD_COLUMN};
use crate::domain::IntegratedRecord;
use crate::error::Result;

/// Header of the output table: fixed leading columns, then `middle`
/// (enrichment and auxiliary columns), then the yield column.
pub fn output_header(middle: &[String]) -> Vec<String> {
    OUTPUT_LEADING_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(middle.iter().cloned())
        .chain(std::iter::once(OUTPUT_YIELD_COLUMN.to_string()))
        .collect()
}

/// Append-only CSV output table.
///
/// An existing file with the same header is appended to. One with a
/// different header is rewritten once under the union of both headers,
/// with blank cells where a row has no value for a column.
pub struct CsvTableSink {
    writer: Mutex<csv::Writer<File>>,
    columns: Vec<String>,
    path: PathBuf,
}

impl CsvTableSink {
    pub fn open(path: &Path, middle: &[String]) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let wanted = output_header(middle);
        let existing = read_existing(path)?;

        let (columns, writer) = match existing {
            Some((header, _)) if header == wanted => {
                info!("Appending to existing output {}", path.display());
                let mut file = OpenOptions::new().read(true).append(true).open(path)?;
                terminate_last_line(&mut file)?;
                (wanted, csv::WriterBuilder::new().has_headers(false).from_writer(file))
            }
            Some((header, rows)) => {
                let columns = union_header(&header, &wanted);
                warn!(
                    "Output {} has a different header; rewriting {} existing rows with {} columns",
                    path.display(),
                    rows.len(),
                    columns.len()
                );
                let writer = rewrite(path, &header, &rows, &columns)?;
                (columns, writer)
            }
            None => {
                info!("Creating output {}", path.display());
                let mut writer = csv::Writer::from_writer(File::create(path)?);
                writer.write_record(&wanted)?;
                writer.flush()?;
                (wanted, writer)
            }
        };

        Ok(Self {
            writer: Mutex::new(writer),
            columns,
            path: path.to_path_buf(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn format_row(&self, record: &IntegratedRecord) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| match column.as_str() {
                "district" => record.district.clone(),
                "region" => record.region.clone().unwrap_or_default(),
                "year" => record.year.to_string(),
                "crop" => record.crop.clone(),
                "latitude" => record.latitude.to_string(),
                "longitude" => record.longitude.to_string(),
                OUTPUT_YIELD_COLUMN => record.yield_value.to_string(),
                other => record.field(other).map(|v| v.to_string()).unwrap_or_default(),
            })
            .collect()
    }
}

#[async_trait]
impl IntegratedOutputPort for CsvTableSink {
    async fn write_integrated_record(&self, record: &IntegratedRecord) -> Result<()> {
        let row = self.format_row(record);
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.write_record(&row)?;
        writer.flush()?;
        debug!("Wrote {} / {} {} to {}", record.district, record.crop, record.year, self.path.display());
        Ok(())
    }

    async fn finish(&self) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.flush()?;
        Ok(())
    }
}

/// Add a newline to a non-empty file whose last line is unterminated, so
/// appended rows never continue an existing record
fn terminate_last_line(file: &mut File) -> Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
        file.flush()?;
    }
    Ok(())
}

type ExistingTable = (Vec<String>, Vec<csv::StringRecord>);

/// Header and rows of a non-empty existing output file
fn read_existing(path: &Path) -> Result<Option<ExistingTable>> {
    if !path.exists() || fs::metadata(path)?.len() == 0 {
        return Ok(None);
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if header.iter().all(|h| h.is_empty()) {
        return Ok(None);
    }
    let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Some((header, rows)))
}

/// Leading columns, then every other column of `existing` followed by the
/// new ones from `wanted`, then yield
fn union_header(existing: &[String], wanted: &[String]) -> Vec<String> {
    let is_fixed = |c: &String| OUTPUT_LEADING_COLUMNS.contains(&c.as_str()) || c == OUTPUT_YIELD_COLUMN;

    let mut middle: Vec<String> = Vec::new();
    for column in existing.iter().chain(wanted.iter()).filter(|c| !is_fixed(c)) {
        if !middle.contains(column) {
            middle.push(column.clone());
        }
    }
    output_header(&middle)
}

/// Rewrite `path` under `columns` through a temporary file, returning a
/// writer positioned after the migrated rows
fn rewrite(
    path: &Path,
    old_header: &[String],
    rows: &[csv::StringRecord],
    columns: &[String],
) -> Result<csv::Writer<File>> {
    let positions: HashMap<&str, usize> = old_header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let tmp_path = path.with_extension("csv.tmp");
    {
        let mut tmp = csv::Writer::from_writer(File::create(&tmp_path)?);
        tmp.write_record(columns)?;
        for row in rows {
            let migrated: Vec<&str> = columns
                .iter()
                .map(|c| positions.get(c.as_str()).and_then(|&i| row.get(i)).unwrap_or(""))
                .collect();
            tmp.write_record(&migrated)?;
        }
        tmp.flush()?;
    }
    fs::rename(&tmp_path, path)?;

    let file = OpenOptions::new().append(true).open(path)?;
    Ok(csv::WriterBuilder::new().has_headers(false).from_writer(file))
}
