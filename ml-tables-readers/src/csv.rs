//! CSV sources and sinks
//!
//! [`read`] builds a lazy record stream over CSV text. The source is opened
//! again for every realization of the stream, so a recipe over a file can
//! be drained any number of times. Rows are parsed strictly in index order,
//! which keeps the stream usable under `parallel`. A grouped column reads
//! every header matching its pattern and writes back one header per tensor
//! element.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ::csv::{ReaderBuilder, StringRecord, WriterBuilder};
use ml_tables_core::order::OrderGate;
use ml_tables_core::{Bitmap, Lazy, Pattern, Pull, Record, Stream, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::resolver::Column;

/// Options for CSV reading and writing
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter
    pub delimiter: u8,

    /// Quote character
    pub quote: u8,

    /// Whether to trim whitespace around fields when reading
    pub trim: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            trim: false,
        }
    }
}

impl CsvOptions {
    fn reader<R: Read>(&self, source: R) -> ::csv::Reader<R> {
        let trim = if self.trim {
            ::csv::Trim::All
        } else {
            ::csv::Trim::None
        };
        ReaderBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .has_headers(true)
            .trim(trim)
            .from_reader(source)
    }

    fn writer<W: Write>(&self, sink: W) -> ::csv::Writer<W> {
        WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .from_writer(sink)
    }
}

struct Opened<R: Read> {
    reader: ::csv::Reader<R>,
    /// Header positions of every column
    positions: Vec<Vec<usize>>,
    record: StringRecord,
}

enum Cursor<R: Read> {
    Pending,
    Open(Opened<R>),
    Ended,
}

struct CsvStream<R: Read, O> {
    opener: Arc<O>,
    columns: Arc<Vec<Column>>,
    /// Placeholder row whose names every parsed row shares
    template: Record,
    options: CsvOptions,
    gate: OrderGate,
    cursor: Mutex<Cursor<R>>,
}

impl<R, O> CsvStream<R, O>
where
    R: Read,
    O: Fn() -> io::Result<R>,
{
    fn open(&self) -> Result<Opened<R>> {
        let mut reader = self.options.reader((self.opener)()?);
        let headers = reader.headers()?.clone();
        let positions = self
            .columns
            .iter()
            .map(|c| locate(&headers, c))
            .collect::<Result<Vec<_>>>()?;
        debug!(columns = positions.len(), fields = headers.len(), "CSV header resolved");
        Ok(Opened {
            reader,
            positions,
            record: StringRecord::new(),
        })
    }

    fn next_row(&self, cursor: &mut Cursor<R>) -> Result<Option<Record>> {
        if matches!(cursor, Cursor::Pending) {
            *cursor = Cursor::Open(self.open()?);
        }
        let Cursor::Open(opened) = cursor else {
            return Ok(None);
        };
        if !opened.reader.read_record(&mut opened.record)? {
            return Ok(None);
        }
        let line = opened.record.position().map_or(0, ::csv::Position::line);
        let mut values = Vec::with_capacity(self.columns.len());
        let mut na = Bitmap::new();
        for (i, (column, cells)) in self.columns.iter().zip(&opened.positions).enumerate() {
            let texts = cells
                .iter()
                .map(|&pos| {
                    opened.record.get(pos).ok_or_else(|| {
                        Error::Format(format!("line {line}: missing field '{}'", column.source()))
                    })
                })
                .collect::<Result<Vec<&str>>>()?;
            let (value, null) = match texts.as_slice() {
                [text] if !column.is_group() => column.convert(text)?,
                _ => column.convert_group(&texts)?,
            };
            na.set(i, null);
            values.push(value);
        }
        Ok(Some(self.template.sibling(values, na)?))
    }
}

impl<R, O> Stream<Record> for CsvStream<R, O>
where
    R: Read + Send,
    O: Fn() -> io::Result<R> + Send + Sync,
{
    fn pull(&self, index: u64) -> ml_tables_core::Result<Pull<Record>> {
        let Some(_turn) = self.gate.enter(index) else {
            return Ok(Pull::End);
        };
        let mut cursor = lock(&self.cursor);
        match self.next_row(&mut cursor) {
            Ok(Some(row)) => Ok(Pull::Row(row)),
            Ok(None) => {
                *cursor = Cursor::Ended;
                Ok(Pull::End)
            }
            Err(e) => {
                *cursor = Cursor::Ended;
                Err(e.into())
            }
        }
    }

    fn stop(&self) {
        self.gate.stop();
    }
}

/// Stream CSV rows from sources produced by `opener`
pub fn read<O, R>(opener: O, columns: &[Column]) -> Lazy<Record>
where
    O: Fn() -> io::Result<R> + Send + Sync + 'static,
    R: Read + Send + 'static,
{
    read_with(opener, columns, &CsvOptions::default())
}

/// Like [`read`] with explicit CSV options
pub fn read_with<O, R>(opener: O, columns: &[Column], options: &CsvOptions) -> Lazy<Record>
where
    O: Fn() -> io::Result<R> + Send + Sync + 'static,
    R: Read + Send + 'static,
{
    let names = columns.iter().map(|c| c.name().to_string()).collect();
    let zeros = columns.iter().map(|c| Value::zero(c.data_type())).collect();
    let template = match Record::new(names, zeros) {
        Ok(r) => r,
        Err(e) => {
            let message = match e {
                ml_tables_core::Error::InvalidArgument(message) => message,
                other => other.to_string(),
            };
            return Lazy::from_error(move || ml_tables_core::Error::InvalidArgument(message.clone()));
        }
    };
    let opener = Arc::new(opener);
    let columns = Arc::new(columns.to_vec());
    let options = options.clone();
    Lazy::new(move || {
        Box::new(CsvStream {
            opener: Arc::clone(&opener),
            columns: Arc::clone(&columns),
            template: template.clone(),
            options: options.clone(),
            gate: OrderGate::new(),
            cursor: Mutex::new(Cursor::Pending),
        })
    })
}

/// Stream CSV rows from the file at `path`
pub fn read_file(path: impl AsRef<Path>, columns: &[Column]) -> Lazy<Record> {
    let path = path.as_ref().to_path_buf();
    read(move || File::open(&path), columns)
}

/// Write the rows of `lazy` as CSV, returning the number of rows written
///
/// The header is written with the first row, which fixes the width of
/// grouped columns. An empty stream writes a header naming each grouped
/// column once.
pub fn write<W: Write>(lazy: &Lazy<Record>, sink: W, columns: &[Column]) -> Result<usize> {
    write_with(lazy, sink, columns, &CsvOptions::default())
}

/// Like [`write`] with explicit CSV options
pub fn write_with<W: Write>(
    lazy: &Lazy<Record>,
    sink: W,
    columns: &[Column],
    options: &CsvOptions,
) -> Result<usize> {
    let mut out = options.writer(sink);
    let mut layout: Option<Layout> = None;
    let mut rows = 0usize;
    lazy.drain(|row| {
        if layout.is_none() {
            let resolved = Layout::resolve(&row, columns)?;
            out.write_record(&resolved.header).map_err(Error::from)?;
            layout = Some(resolved);
        }
        let Some(layout) = &layout else {
            return Ok(());
        };
        let mut cells = Vec::with_capacity(layout.header.len());
        for ((c, &p), &width) in columns.iter().zip(&layout.positions).zip(&layout.widths) {
            let (value, na) = (row.value_at(p), row.is_na_at(p));
            if c.is_group() {
                cells.extend(c.format_group(value, na, width)?);
            } else {
                cells.push(c.format(value, na)?);
            }
        }
        out.write_record(&cells).map_err(Error::from)?;
        rows += 1;
        Ok(())
    })?;
    if layout.is_none() {
        out.write_record(columns.iter().map(|c| if c.is_group() { c.name() } else { c.source() }))?;
    }
    out.flush()?;
    debug!(rows, columns = columns.len(), "CSV written");
    Ok(rows)
}

/// Header positions of a column; every match of the pattern for a group
fn locate(headers: &StringRecord, column: &Column) -> Result<Vec<usize>> {
    if column.is_group() {
        let pattern = Pattern::new(column.source())?;
        let found: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|&(_, h)| pattern.matches(h))
            .map(|(i, _)| i)
            .collect();
        if found.is_empty() {
            return Err(Error::Schema(format!(
                "CSV header has no column matching '{}'",
                column.source()
            )));
        }
        return Ok(found);
    }
    headers
        .iter()
        .position(|h| h == column.source())
        .map(|p| vec![p])
        .ok_or_else(|| Error::Schema(format!("CSV header has no column '{}'", column.source())))
}

/// Output header and record positions fixed by the first written row
struct Layout {
    header: Vec<String>,
    positions: Vec<usize>,
    widths: Vec<usize>,
}

impl Layout {
    fn resolve(row: &Record, columns: &[Column]) -> Result<Self> {
        let mut layout = Layout {
            header: Vec::with_capacity(columns.len()),
            positions: Vec::with_capacity(columns.len()),
            widths: Vec::with_capacity(columns.len()),
        };
        for c in columns {
            let p = row
                .pos(c.name())
                .ok_or_else(|| Error::Schema(format!("record has no column '{}'", c.name())))?;
            if c.is_group() {
                let Some(tensor) = row.value_at(p).as_tensor() else {
                    return Err(Error::Schema(format!("record column '{}' is not a tensor", c.name())));
                };
                let width = tensor.volume();
                layout.header.extend((1..=width).map(|k| format!("{}{k}", c.name())));
                layout.widths.push(width);
            } else {
                layout.header.push(c.source().to_string());
                layout.widths.push(1);
            }
            layout.positions.push(p);
        }
        debug!(fields = layout.header.len(), "CSV output header resolved");
        Ok(layout)
    }
}

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
