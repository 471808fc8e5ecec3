//! Methods for reading character separated files while keeping track of all info needed for
//! good error messages. (Internal use mostly).

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    ops::Range,
    path::Path,
    str::FromStr,
    sync::Arc,
};

use tracing::debug;

use crate::error::IdentError;

/// Open a file for reading, returns the buffered file and its size in bytes
pub(crate) fn open_file(path: &Path) -> Result<(BufReader<File>, u64), IdentError> {
    let file = File::open(path).map_err(|e| IdentError::io(path.display(), e))?;
    let size = file
        .metadata()
        .map_err(|e| IdentError::io(path.display(), e))?
        .len();
    Ok((BufReader::new(file), size))
}

/// The header of a file, maps column names to their index
#[derive(Clone, Debug, Default)]
pub struct Header {
    names: Vec<Arc<str>>,
    index: HashMap<Arc<str>, usize>,
}

impl Header {
    fn new(line: &str, separator: char) -> Self {
        let names: Vec<Arc<str>> = line.split(separator).map(|n| Arc::from(n.trim())).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            // The first occurrence of a duplicated header wins
            index.entry(name.clone()).or_insert(i);
        }
        Self { names, index }
    }

    /// The column names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(AsRef::as_ref)
    }

    /// If the header contains the given column
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<Column> {
        self.index.get(name).map(|i| Column {
            index: *i,
            name: self.names[*i].clone(),
        })
    }
}

/// A resolved column, see [`TsvReader::column`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Column {
    index: usize,
    name: Arc<str>,
}

impl Column {
    /// The column header
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The 0 based index of the column
    pub const fn index(&self) -> usize {
        self.index
    }
}

/// A single data line
#[derive(Clone, Debug)]
pub struct TsvLine {
    line_index: usize,
    line: String,
    fields: Vec<Range<usize>>,
    source: Arc<str>,
}

impl TsvLine {
    fn new(line_index: usize, line: String, separator: char, source: Arc<str>) -> Self {
        let mut fields = Vec::new();
        let mut start = 0;
        for (index, _) in line.match_indices(separator) {
            fields.push(start..index);
            start = index + separator.len_utf8();
        }
        fields.push(start..line.len());
        Self {
            line_index,
            line,
            fields,
            source,
        }
    }

    /// The line number (1 based)
    pub const fn line_number(&self) -> usize {
        self.line_index + 1
    }

    /// The full line
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The number of fields on this line
    pub fn number_of_fields(&self) -> usize {
        self.fields.len()
    }

    /// Get the text of the given column, trimmed
    /// # Errors
    /// If this line does not contain the column
    pub fn get(&self, column: &Column) -> Result<&str, IdentError> {
        self.fields
            .get(column.index)
            .map(|range| self.line[range.clone()].trim())
            .ok_or_else(|| IdentError::ShortRow {
                file: self.source.to_string(),
                line: self.line_number(),
                column: column.name.to_string(),
            })
    }

    /// Get the text of an optional column, missing columns and short lines give `None`
    pub fn get_optional(&self, column: Option<&Column>) -> Option<&str> {
        column.and_then(|c| self.get(c).ok())
    }

    /// Parse the given column
    /// # Errors
    /// If the column is missing on this line or is not a valid `T`
    pub fn parse<T: FromStr>(&self, column: &Column) -> Result<T, IdentError> {
        let text = self.get(column)?;
        text.parse().map_err(|_| self.parse_error(column, text))
    }

    /// Parse an optional column, `None` if the column does not exist or is empty
    /// # Errors
    /// If the value is not a valid `T`
    pub fn parse_optional<T: FromStr>(
        &self,
        column: Option<&Column>,
    ) -> Result<Option<T>, IdentError> {
        match self.get_optional(column) {
            Some(text) if !text.is_empty() => column.map(|c| self.parse(c)).transpose(),
            _ => Ok(None),
        }
    }

    /// Build a parse error for the given column
    pub fn parse_error(&self, column: &Column, value: &str) -> IdentError {
        IdentError::ParseField {
            file: self.source.to_string(),
            line: self.line_number(),
            column: column.name.to_string(),
            value: value.to_string(),
            source_line: self
                .fields
                .get(column.index)
                .map(|range| (self.line.clone(), range.clone())),
        }
    }
}

/// Reads a separated file line by line. The first non blank line is the header, blank lines
/// are skipped. Progress is tracked as the number of bytes consumed, estimated as the line
/// length plus two for the line ending.
#[derive(Debug)]
pub struct TsvReader<R: BufRead> {
    lines: std::iter::Enumerate<std::io::Lines<R>>,
    header: Header,
    separator: char,
    source: Arc<str>,
    consumed: u64,
    total: Option<u64>,
}

impl<R: BufRead> TsvReader<R> {
    /// Start reading, this reads the header line.
    /// # Errors
    /// If the underlying reader fails.
    pub fn new(
        reader: R,
        separator: char,
        source: impl Into<Arc<str>>,
        total_bytes: Option<u64>,
    ) -> Result<Self, IdentError> {
        let source = source.into();
        let mut lines = reader.lines().enumerate();
        let mut consumed = 0;
        let mut header = Header::default();
        for (_, line) in lines.by_ref() {
            let line = line.map_err(|e| IdentError::io(&source, e))?;
            consumed += line.len() as u64 + 2;
            // Files saved by spreadsheet programs often start with a byte order mark
            let line = line.strip_prefix('\u{feff}').unwrap_or(&line);
            if !line.trim().is_empty() {
                header = Header::new(line, separator);
                break;
            }
        }
        debug!(file = %source, columns = header.names.len(), "read header");
        Ok(Self {
            lines,
            header,
            separator,
            source,
            consumed,
            total: total_bytes,
        })
    }

    /// The header
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// The name of the source used in errors
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Check that all given columns are present
    /// # Errors
    /// A missing column error naming the first missing column
    pub fn require(&self, columns: &[&str]) -> Result<(), IdentError> {
        columns.iter().try_for_each(|c| self.column(c).map(|_| ()))
    }

    /// Resolve a column by name
    /// # Errors
    /// A missing column error if the header does not contain it
    pub fn column(&self, name: &str) -> Result<Column, IdentError> {
        self.header
            .get(name)
            .ok_or_else(|| IdentError::MissingColumn {
                column: name.to_string(),
                file: self.source.to_string(),
            })
    }

    /// Resolve the first of the given columns that is present
    pub fn first_present(&self, names: &[&str]) -> Option<Column> {
        names.iter().find_map(|n| self.header.get(n))
    }

    /// Resolve the first of the given columns that is present
    /// # Errors
    /// A missing column error naming the first option if none are present
    pub fn first_required(&self, names: &[&str]) -> Result<Column, IdentError> {
        self.first_present(names)
            .ok_or_else(|| IdentError::MissingColumn {
                column: names.first().copied().unwrap_or_default().to_string(),
                file: self.source.to_string(),
            })
    }

    /// The estimated progress as a percentage (0-100), `None` if the total size is not known
    pub fn percent(&self) -> Option<f64> {
        self.total
            .filter(|t| *t > 0)
            .map(|t| (self.consumed as f64 / t as f64 * 100.0).min(100.0))
    }
}

impl<R: BufRead> Iterator for TsvReader<R> {
    type Item = Result<TsvLine, IdentError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (line_index, line) = self.lines.next()?;
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(IdentError::io(&self.source, e))),
            };
            self.consumed += line.len() as u64 + 2;
            if line.trim().is_empty() {
                continue;
            }
            return Some(Ok(TsvLine::new(
                line_index,
                line,
                self.separator,
                self.source.clone(),
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(text: &str) -> TsvReader<&[u8]> {
        TsvReader::new(text.as_bytes(), '\t', "test.tsv", Some(text.len() as u64)).unwrap()
    }

    #[test]
    fn header_after_blank_lines() {
        let tsv = reader("\n  \nA\tB\tC\n1\t2\t3\n\n4\t5\t6\n");
        assert_eq!(tsv.header().names().collect::<Vec<_>>(), ["A", "B", "C"]);
        let b = tsv.column("B").unwrap();
        let lines: Vec<_> = tsv.collect::<Result<_, _>>().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].get(&b).unwrap(), "2");
        assert_eq!(lines[1].line_number(), 6);
        assert_eq!(lines[1].parse::<u32>(&b).unwrap(), 5);
    }

    #[test]
    fn missing_and_fallback_columns() {
        let tsv = reader("Scan\tSpecEValue\n1\t0.5\n");
        assert!(tsv.require(&["Scan", "SpecEValue"]).is_ok());
        let error = tsv.require(&["Scan", "Charge"]).unwrap_err();
        assert_eq!(error.missing_column(), Some("Charge"));
        assert_eq!(
            tsv.first_present(&["ScanNum", "Scan"]).unwrap().name(),
            "Scan"
        );
        assert_eq!(
            tsv.first_required(&["MSGFDB_SpecEValue", "Other"])
                .unwrap_err()
                .missing_column(),
            Some("MSGFDB_SpecEValue")
        );
    }

    #[test]
    fn parse_errors_carry_context() {
        let mut tsv = reader("Scan\tCharge\nabc\t2\n7\n");
        let scan = tsv.column("Scan").unwrap();
        let charge = tsv.column("Charge").unwrap();
        let first = tsv.next().unwrap().unwrap();
        match first.parse::<usize>(&scan).unwrap_err() {
            IdentError::ParseField {
                file,
                line,
                column,
                value,
                source_line,
            } => {
                assert_eq!(file, "test.tsv");
                assert_eq!(line, 2);
                assert_eq!(column, "Scan");
                assert_eq!(value, "abc");
                assert_eq!(source_line.unwrap().1, 0..3);
            }
            other => panic!("unexpected error {other}"),
        }
        let second = tsv.next().unwrap().unwrap();
        assert!(matches!(
            second.get(&charge),
            Err(IdentError::ShortRow { line: 3, .. })
        ));
        assert_eq!(second.get_optional(Some(&charge)), None);
    }

    #[test]
    fn byte_order_mark() {
        let tsv = reader("\u{feff}Scan\tCharge\n1\t2\n");
        assert_eq!(tsv.header().names().collect::<Vec<_>>(), ["Scan", "Charge"]);
        assert!(tsv.require(&["Scan", "Charge"]).is_ok());
        let tsv = reader("\u{feff}\n\u{feff}Scan\n1\n");
        assert_eq!(tsv.column("Scan").unwrap().index(), 0);
    }

    #[test]
    fn progress() {
        let text = "A\n1\n2\n";
        let mut tsv = reader(text);
        let start = tsv.percent().unwrap();
        assert!(start > 0.0);
        while tsv.next().is_some() {}
        assert!((tsv.percent().unwrap() - 100.0).abs() < f64::EPSILON);
        let unknown = TsvReader::new("A\n".as_bytes(), '\t', "x", None).unwrap();
        assert_eq!(unknown.percent(), None);
    }
}
