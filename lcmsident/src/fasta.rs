//! Reading and writing FASTA protein databases.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IdentError;

/// The number of residues per line when writing
const LINE_WIDTH: usize = 60;

/// A single protein from a FASTA file
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct FastaEntry {
    /// The identifier, the header up to the first space
    pub protein_name: String,
    /// The second space separated token of the header, empty if there is none
    pub description: String,
    /// The full sequence
    pub sequence: String,
}

impl FastaEntry {
    /// Create a new entry
    pub fn new(
        protein_name: impl Into<String>,
        description: impl Into<String>,
        sequence: impl Into<String>,
    ) -> Self {
        Self {
            protein_name: protein_name.into(),
            description: description.into(),
            sequence: sequence.into(),
        }
    }

    fn from_header(line_index: usize, line: &str) -> Result<Self, IdentError> {
        let mut tokens = line.split(' ');
        let name = tokens.next().unwrap_or_default();
        if name.len() <= 1 {
            return Err(IdentError::MalformedFasta {
                line: line_index + 1,
                text: line.to_string(),
            });
        }
        Ok(Self {
            protein_name: name[1..].to_string(),
            description: tokens
                .find(|t| !t.is_empty())
                .unwrap_or_default()
                .to_string(),
            sequence: String::new(),
        })
    }
}

/// Parse a FASTA file
/// # Errors
/// If the file could not be read or contains a header without identifier
pub fn read_fasta(path: impl AsRef<Path>) -> Result<Vec<FastaEntry>, IdentError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| IdentError::io(path.display(), e))?;
    parse_fasta(BufReader::new(file), &path.display().to_string())
}

/// Parse FASTA formatted text from a reader, `source` is used in error messages. Lines before
/// the first header are ignored.
/// # Errors
/// If the reader fails or a header has no identifier
pub fn parse_fasta(reader: impl BufRead, source: &str) -> Result<Vec<FastaEntry>, IdentError> {
    let mut entries = Vec::new();
    let mut current: Option<FastaEntry> = None;
    for (line_index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| IdentError::io(source, e))?;
        let line = line.trim_end();
        if line.starts_with('>') {
            entries.extend(current.take());
            current = Some(FastaEntry::from_header(line_index, line)?);
        } else if let Some(entry) = current.as_mut() {
            entry
                .sequence
                .extend(line.chars().filter(|c| !c.is_whitespace()));
        }
    }
    entries.extend(current);
    debug!(source, entries = entries.len(), "read fasta");
    Ok(entries)
}

/// Write the entries as FASTA, creating the parent directory if needed. Nothing is written if
/// any description contains whitespace, as it would not read back the same.
/// # Errors
/// If a description contains whitespace or the directory or file could not be created or
/// written
pub fn write_fasta(path: impl AsRef<Path>, entries: &[FastaEntry]) -> Result<(), IdentError> {
    let path = path.as_ref();
    if let Some(entry) = entries
        .iter()
        .find(|e| e.description.contains(char::is_whitespace))
    {
        return Err(IdentError::FastaDescription {
            protein: entry.protein_name.clone(),
            description: entry.description.clone(),
        });
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| IdentError::io(parent.display(), e))?;
    }
    let file = File::create(path).map_err(|e| IdentError::io(path.display(), e))?;
    let mut writer = BufWriter::new(file);
    write_entries(&mut writer, entries).map_err(|e| IdentError::io(path.display(), e))
}

fn write_entries(writer: &mut impl Write, entries: &[FastaEntry]) -> std::io::Result<()> {
    for entry in entries {
        if entry.description.is_empty() {
            writeln!(writer, ">{}", entry.protein_name)?;
        } else {
            writeln!(writer, ">{} {}", entry.protein_name, entry.description)?;
        }
        for chunk in entry.sequence.as_bytes().chunks(LINE_WIDTH) {
            writer.write_all(chunk)?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers() {
        let entries = parse_fasta(
            ">sp|P1|A first second\nPEPT\nIDE\n\n>P2\nAAA\n".as_bytes(),
            "test",
        )
        .unwrap();
        assert_eq!(
            entries,
            vec![
                FastaEntry::new("sp|P1|A", "first", "PEPTIDE"),
                FastaEntry::new("P2", "", "AAA")
            ]
        );
    }

    #[test]
    fn malformed_header() {
        let error = parse_fasta(">P1\nAAA\n> P2\nCCC\n".as_bytes(), "test").unwrap_err();
        assert!(matches!(error, IdentError::MalformedFasta { line: 3, .. }));
        assert!(parse_fasta(">\n".as_bytes(), "test").is_err());
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.fasta");
        let entries = vec![
            FastaEntry::new("P1", "desc", "A".repeat(150)),
            FastaEntry::new("P2", "", "PEPTIDE"),
        ];
        write_fasta(&path, &entries).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.lines().all(|l| l.len() <= LINE_WIDTH));
        assert_eq!(read_fasta(&path).unwrap(), entries);
    }

    #[test]
    fn descriptions_with_spaces_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.fasta");
        let entries = vec![
            FastaEntry::new("P1", "desc", "PEPTIDE"),
            FastaEntry::new("P2", "Some protein", "PEPTIDE"),
        ];
        assert!(matches!(
            write_fasta(&path, &entries),
            Err(IdentError::FastaDescription { protein, description })
                if protein == "P2" && description == "Some protein"
        ));
        assert!(!path.exists());
        assert!(write_fasta(&path, &[FastaEntry::new("P1", "tab\tseparated", "A")]).is_err());
    }
}
