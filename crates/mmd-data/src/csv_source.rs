//! Streaming source reading one sample per CSV record

use crate::source::DataSource;
use mmd_core::{DenseFeatures, Error, Features, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

fn csv_error(err: csv::Error) -> Error {
    let position = err.position().map(|p| p.line());
    match err.into_kind() {
        csv::ErrorKind::Io(io) => Error::Io(io),
        kind => match position {
            Some(line) => Error::Parse(format!("line {line}: {kind:?}")),
            None => Error::Parse(format!("{kind:?}")),
        },
    }
}

/// Reads samples from a CSV file, one record per sample
///
/// The file is opened by `start()` and closed by `end()`. Only one chunk of
/// samples is held in memory at a time.
#[derive(Debug)]
pub struct CsvSource {
    path: PathBuf,
    num_samples: usize,
    dim: usize,
    has_headers: bool,
    delimiter: u8,
    reader: Option<csv::Reader<File>>,
    emitted: usize,
}

impl CsvSource {
    /// Source over the first `num_samples` records of `path`, each with `dim` fields
    pub fn new(path: impl AsRef<Path>, num_samples: usize, dim: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            num_samples,
            dim,
            has_headers: false,
            delimiter: b',',
            reader: None,
            emitted: 0,
        }
    }

    /// Source over `path` whose shape is taken from the file by [`scan`](Self::scan)
    ///
    /// Set the header and delimiter options first, since scanning parses the
    /// file with them.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::new(path, 0, 0)
    }

    /// Read the whole file once to determine sample count and dimension
    pub fn scan(self) -> Result<Self> {
        if self.is_active() {
            return Err(Error::State("cannot scan a csv source during a pass".to_string()));
        }
        let mut reader = self.reader_builder().from_path(&self.path).map_err(csv_error)?;
        let mut record = csv::StringRecord::new();
        let mut num_samples = 0;
        let mut dim = None;
        while reader.read_record(&mut record).map_err(csv_error)? {
            match dim {
                None => dim = Some(record.len()),
                Some(d) if d != record.len() => {
                    return Err(Error::Parse(format!(
                        "record {num_samples} has {} fields, expected {d}",
                        record.len()
                    )))
                }
                Some(_) => {}
            }
            num_samples += 1;
        }
        let dim = dim.ok_or(Error::InsufficientData {
            expected: 1,
            actual: 0,
        })?;
        debug!(path = %self.path.display(), num_samples, dim, "scanned csv source");
        Ok(Self {
            num_samples,
            dim,
            ..self
        })
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder.has_headers(self.has_headers).delimiter(self.delimiter);
        builder
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_chunk(&mut self, reader: &mut csv::Reader<File>, wanted: usize) -> Result<Vec<f64>> {
        let mut data = Vec::with_capacity(wanted * self.dim);
        let mut record = csv::StringRecord::new();
        let mut read = 0;
        while read < wanted && reader.read_record(&mut record).map_err(csv_error)? {
            self.parse_record(&record, &mut data)?;
            read += 1;
            self.emitted += 1;
        }
        Ok(data)
    }

    fn parse_record(&self, record: &csv::StringRecord, data: &mut Vec<f64>) -> Result<()> {
        if record.len() != self.dim {
            return Err(Error::Parse(format!(
                "record {} has {} fields, expected {}",
                self.emitted,
                record.len(),
                self.dim
            )));
        }
        for field in record.iter() {
            let value = field.trim().parse::<f64>().map_err(|e| {
                Error::Parse(format!("record {}: '{field}': {e}", self.emitted))
            })?;
            data.push(value);
        }
        Ok(())
    }
}

impl DataSource for CsvSource {
    fn num_samples(&self) -> usize {
        self.num_samples
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn start(&mut self) -> Result<()> {
        let reader = self.reader_builder().from_path(&self.path).map_err(csv_error)?;
        self.reader = Some(reader);
        self.emitted = 0;
        debug!(path = %self.path.display(), "opened csv source");
        Ok(())
    }

    fn next_chunk(&mut self, max_samples: usize) -> Result<Option<Arc<dyn Features>>> {
        let mut reader = self
            .reader
            .take()
            .ok_or_else(|| Error::State("csv source read before start()".to_string()))?;
        let wanted = max_samples.min(self.num_samples - self.emitted);
        let chunk = self.read_chunk(&mut reader, wanted);
        self.reader = Some(reader);

        let data = chunk?;
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(DenseFeatures::new(self.dim, data)?.into_shared()))
    }

    fn end(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            debug!(path = %self.path.display(), "closed csv source");
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.reader.is_some()
    }
}
