//! Writing identifications as MSPathFinder style tab separated files.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use lcmscore::averagine::most_abundant_isotope_mz;
use tracing::info;

use crate::{
    error::IdentError,
    prsm::{PrSm, modification_text},
};

/// The columns written, a superset of what the MSPathFinder reader needs
const HEADER: [&str; 13] = [
    "Scan",
    "Pre",
    "Sequence",
    "Post",
    "Modifications",
    "ProteinName",
    "ProteinDesc",
    "Charge",
    "MostAbundantIsotopeMz",
    "Mass",
    "#MatchedFragments",
    "IcScore",
    "QValue",
];

/// Writes records in the MSPathFinder `_IcTda.tsv` layout so they can be read back with the
/// MSPathFinder reader. Every record is written on its own line. The score goes into `IcScore`
/// and, rounded, into `#MatchedFragments`.
#[derive(Clone, Debug)]
pub struct TsvIdentificationWriter {
    path: PathBuf,
}

impl TsvIdentificationWriter {
    /// Create a writer for the given path, nothing is written until [`Self::write`]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file that is written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write all records, replacing the file if it exists
    /// # Errors
    /// If the file could not be created or written
    pub fn write(&self, records: &[PrSm]) -> Result<(), IdentError> {
        let file = File::create(&self.path).map_err(|e| IdentError::io(self.path.display(), e))?;
        let mut writer = BufWriter::new(file);
        write_records(&mut writer, records).map_err(|e| IdentError::io(self.path.display(), e))?;
        info!(path = %self.path.display(), records = records.len(), "wrote identifications");
        Ok(())
    }
}

/// Write the records with a header line to any writer
/// # Errors
/// If the writer fails
pub fn write_records(writer: &mut impl Write, records: &[PrSm]) -> std::io::Result<()> {
    writeln!(writer, "{}", HEADER.join("\t"))?;
    for record in records {
        let mass = record.mass();
        writeln!(
            writer,
            "{}\t-\t{}\t-\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            record.scan,
            record.sequence.unmodified(),
            modification_text(&record.sequence),
            clean(&record.protein_name),
            clean(&record.protein_desc),
            record.charge,
            most_abundant_isotope_mz(mass, record.charge),
            mass,
            record.score.round(),
            record.score,
            record.q_value,
        )?;
    }
    writer.flush()
}

/// Separators in free text would break the layout
fn clean(text: &str) -> String {
    text.replace(['\t', '\n', '\r', ';'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let record = PrSm {
            scan: 12,
            charge: 2,
            sequence: lcmscore::sequence::Sequence::from_unmodified("PEPTIDE").unwrap(),
            protein_name: "P1".to_string(),
            protein_desc: "a\tb;c".to_string(),
            score: 12.4,
            q_value: 0.01,
            ..PrSm::default()
        };
        let mut buffer = Vec::new();
        write_records(&mut buffer, &[record]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let fields: Vec<_> = lines[1].split('\t').collect();
        assert_eq!(fields.len(), HEADER.len());
        assert_eq!(fields[2], "PEPTIDE");
        assert_eq!(fields[6], "a b c");
        assert_eq!(fields[10], "12");
        assert_eq!(fields[11], "12.4");
    }
}
