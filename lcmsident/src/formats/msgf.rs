use std::{
    io::BufRead,
    path::{Path, PathBuf},
    sync::Arc,
};

use lcmscore::{
    modification::{ModificationLog, ModificationRegistry},
    sequence::{ParseOptions, parse_annotated},
};
use tracing::instrument;

use crate::{
    error::IdentError,
    format::IdFileFormat,
    ignore::IgnoreMatch,
    prsm::{PrSm, fan_out},
    reader::{IdentificationReader, Progress, ReadOptions, ReadOutcome, check_extension},
    tsv::{Column, TsvLine, TsvReader, open_file},
};

/// Reads MS-GF+ tab separated results. The score is the spectral E-value, lower is better.
#[derive(Debug)]
pub struct MsgfPlusReader {
    path: PathBuf,
    registry: Arc<ModificationRegistry>,
}

struct Columns {
    scan: Column,
    charge: Column,
    peptide: Column,
    protein: Column,
    score: Column,
    q_value: Column,
}

impl MsgfPlusReader {
    /// Create a reader for a `.tsv` or `.txt` file
    /// # Errors
    /// If the file has any other extension
    pub fn new(
        path: impl Into<PathBuf>,
        registry: Arc<ModificationRegistry>,
    ) -> Result<Self, IdentError> {
        let path = path.into();
        check_extension(&path, &["tsv", "txt"])?;
        Ok(Self { path, registry })
    }

    /// Files passed through PHRP carry the flanking residues in the peptide column
    fn parse_options(&self) -> ParseOptions {
        if self.path.to_string_lossy().contains("_syn") {
            ParseOptions::trimmed()
        } else {
            ParseOptions::default()
        }
    }

    fn columns<R: BufRead>(tsv: &TsvReader<R>) -> Result<Columns, IdentError> {
        tsv.require(&["Protein", "Peptide", "Charge", "QValue"])?;
        Ok(Columns {
            scan: tsv.first_required(&["ScanNum", "Scan"])?,
            charge: tsv.column("Charge")?,
            peptide: tsv.column("Peptide")?,
            protein: tsv.column("Protein")?,
            score: tsv.first_required(&["SpecEValue", "MSGFDB_SpecEValue"])?,
            q_value: tsv.column("QValue")?,
        })
    }

    fn parse_line(
        &self,
        line: &TsvLine,
        columns: &Columns,
        options: &ReadOptions,
        log: &mut ModificationLog,
    ) -> Result<Vec<PrSm>, IdentError> {
        let scan = line.parse(&columns.scan)?;
        let peptide = line.get(&columns.peptide)?;
        if !options.accepts_scan(scan)
            || IgnoreMatch::Substring.is_ignored(peptide, &options.ignore_list)
        {
            return Ok(Vec::new());
        }
        let sequence = parse_annotated(peptide, &self.registry, log, self.parse_options())
            .map_err(|e| IdentError::sequence(self.path.display(), line.line_number(), e))?;
        let template = PrSm {
            scan,
            charge: line.parse(&columns.charge)?,
            raw_sequence: peptide.to_string(),
            sequence,
            score: line.parse(&columns.score)?,
            q_value: line.parse(&columns.q_value)?,
            use_golf_scoring: true,
            ..PrSm::default()
        };
        Ok(fan_out(
            template,
            line.get(&columns.protein)?
                .split(';')
                .map(protein_accession)
                .filter(|p| !p.is_empty())
                .map(|p| (p.to_string(), String::new())),
        ))
    }
}

/// Remove the `(pre=K,post=R)` annotation MS-GF+ adds to protein names
fn protein_accession(protein: &str) -> &str {
    protein
        .find("(pre=")
        .map_or(protein, |index| &protein[..index])
        .trim()
}

impl IdentificationReader for MsgfPlusReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> IdFileFormat {
        IdFileFormat::MsgfPlusTsv
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    fn read_with_progress(
        &self,
        options: &ReadOptions,
        progress: &mut dyn Progress,
    ) -> Result<ReadOutcome, IdentError> {
        let (reader, size) = open_file(&self.path)?;
        let mut tsv = TsvReader::new(reader, '\t', self.path.display().to_string(), Some(size))?;
        let columns = Self::columns(&tsv)?;
        let mut log = ModificationLog::default();
        let mut records = Vec::new();
        while let Some(line) = tsv.next() {
            records.extend(self.parse_line(&line?, &columns, options, &mut log)?);
            if let Some(percent) = tsv.percent() {
                progress.report(percent);
            }
        }
        Ok(ReadOutcome::new(records, log, &self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "#SpecFile\tSpecID\tScanNum\tFragMethod\tPrecursor\tIsotopeError\tPrecursorError(ppm)\tCharge\tPeptide\tProtein\tDeNovoScore\tMSGFScore\tSpecEValue\tEValue\tQValue\tPepQValue";

    fn read(name: &str, body: &str, options: &ReadOptions) -> Result<ReadOutcome, IdentError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, format!("{HEADER}\n{body}")).unwrap();
        let registry = Arc::new(ModificationRegistry::with_defaults());
        MsgfPlusReader::new(path, registry)?.read(options)
    }

    #[test]
    fn accessions() {
        assert_eq!(protein_accession("sp|P1|A_HUMAN(pre=K,post=R)"), "sp|P1|A_HUMAN");
        assert_eq!(protein_accession("XXX_P2"), "XXX_P2");
    }

    #[test]
    fn read_rows() {
        let outcome = read(
            "a.tsv",
            "a.mzML\tindex=1\t1234\tHCD\t500.0\t0\t1.0\t2\tPEPM+15.995TIDE\tP1(pre=K,post=R);P2(pre=R,post=-)\t50\t40\t1e-12\t1e-8\t0.001\t0.002\n",
            &ReadOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome.records.len(), 2);
        let first = &outcome.records[0];
        assert_eq!(first.scan, 1234);
        assert_eq!(first.charge, 2);
        assert_eq!(first.protein_name, "P1");
        assert_eq!(outcome.records[1].protein_name, "P2");
        assert_eq!(first.sequence.to_string(), "PEPM[Oxidation]TIDE");
        assert!(first.use_golf_scoring);
        assert!((first.score - 1e-12).abs() < f64::EPSILON);
    }

    #[test]
    fn flanking_residues_in_synopsis_files() {
        let outcome = read(
            "a_syn.tsv",
            "a.mzML\tindex=1\t7\tHCD\t500.0\t0\t1.0\t2\tK.PEPTIDE.R\tP1\t50\t40\t1e-12\t1e-8\t0.001\t0.002\n",
            &ReadOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome.records[0].sequence.unmodified(), "PEPTIDE");
        assert_eq!(outcome.records[0].raw_sequence, "K.PEPTIDE.R");
    }

    #[test]
    fn ignore_is_a_substring_match() {
        let body = "a.mzML\tindex=1\t7\tHCD\t500.0\t0\t1.0\t2\tPEPM+15.995TIDE\tP1\t50\t40\t1e-12\t1e-8\t0.001\t0.002\n";
        assert!(read("a.tsv", body, &ReadOptions::ignoring(["+15.99"]))
            .unwrap()
            .records
            .is_empty());
        assert_eq!(
            read("a.tsv", body, &ReadOptions::ignoring(["+79.966"]))
                .unwrap()
                .records
                .len(),
            1
        );
    }
}
