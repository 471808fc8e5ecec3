use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
};

use itertools::Itertools;
use lcmscore::{
    modification::{ModificationLog, ModificationRegistry},
    sequence::{ParseOptions, parse_annotated},
};
use tracing::{instrument, warn};

use crate::{
    error::IdentError,
    format::IdFileFormat,
    ignore::IgnoreMatch,
    prsm::{PrSm, fan_out, split_proteins},
    reader::{IdentificationReader, Progress, ReadOptions, ReadOutcome, check_extension},
    tsv::{Column, TsvLine, TsvReader, open_file},
};

/// The columns every MSPathFinder result file has
const REQUIRED_COLUMNS: [&str; 8] = [
    "#MatchedFragments",
    "ProteinName",
    "Modifications",
    "Sequence",
    "Scan",
    "Charge",
    "ProteinDesc",
    "QValue",
];

/// Reads MSPathFinder `_IcTda.tsv` files, either directly or from a `_IcTsv.zip` archive.
/// Scores are `IcScore` when present and the number of matched fragments otherwise, higher is
/// better.
#[derive(Debug)]
pub struct MsPathFinderReader {
    path: PathBuf,
    registry: Arc<ModificationRegistry>,
}

impl MsPathFinderReader {
    /// Create a reader for a `.tsv` or `.zip` file
    /// # Errors
    /// If the file has any other extension
    pub fn new(
        path: impl Into<PathBuf>,
        registry: Arc<ModificationRegistry>,
    ) -> Result<Self, IdentError> {
        let path = path.into();
        check_extension(&path, &["tsv", "zip"])?;
        Ok(Self { path, registry })
    }

    fn is_zip(&self) -> bool {
        check_extension(&self.path, &["zip"]).is_ok()
    }

    /// The name of the results file inside a zip archive: the archive name with a trailing
    /// `_IcTsv` removed followed by `_IcTda.tsv`
    pub fn zip_entry_name(path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = stem.strip_suffix("_IcTsv").unwrap_or(&stem);
        format!("{stem}_IcTda.tsv")
    }

    fn read_zip(
        &self,
        options: &ReadOptions,
        progress: &mut dyn Progress,
    ) -> Result<ReadOutcome, IdentError> {
        let zip_error = |source| IdentError::Zip {
            file: self.path.display().to_string(),
            source,
        };
        let file = File::open(&self.path).map_err(|e| IdentError::io(self.path.display(), e))?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(zip_error)?;
        let expected = Self::zip_entry_name(&self.path);
        let Some(name) = archive
            .file_names()
            .find(|name| *name == expected || name.ends_with(&format!("/{expected}")))
            .map(str::to_string)
        else {
            warn!(
                path = %self.path.display(),
                entry = %expected,
                "zip archive does not contain the results file"
            );
            return Ok(ReadOutcome::default());
        };
        let entry = archive.by_name(&name).map_err(zip_error)?;
        let size = entry.size();
        let tsv = TsvReader::new(
            BufReader::new(entry),
            '\t',
            format!("{}/{name}", self.path.display()),
            Some(size),
        )?;
        self.read_rows(tsv, options, progress)
    }

    fn read_rows<R: BufRead>(
        &self,
        mut tsv: TsvReader<R>,
        options: &ReadOptions,
        progress: &mut dyn Progress,
    ) -> Result<ReadOutcome, IdentError> {
        tsv.require(&REQUIRED_COLUMNS)?;
        let columns = Columns::new(&tsv)?;
        let mut log = ModificationLog::default();
        let mut records = Vec::new();
        while let Some(line) = tsv.next() {
            let line = line?;
            records.extend(self.parse_line(&line, &columns, options, &mut log)?);
            if let Some(percent) = tsv.percent() {
                progress.report(percent);
            }
        }
        Ok(ReadOutcome::new(records, log, &self.path))
    }

    fn parse_line(
        &self,
        line: &TsvLine,
        columns: &Columns,
        options: &ReadOptions,
        log: &mut ModificationLog,
    ) -> Result<Vec<PrSm>, IdentError> {
        let scan = line.parse(&columns.scan)?;
        let modifications = line.get(&columns.modifications)?;
        if !options.accepts_scan(scan)
            || IgnoreMatch::TokenBoundary.is_ignored(modifications, &options.ignore_list)
        {
            return Ok(Vec::new());
        }
        let raw_sequence = line.get(&columns.sequence)?;
        let annotated = annotate(raw_sequence, modifications, line, &columns.modifications)?;
        let sequence = parse_annotated(&annotated, &self.registry, log, ParseOptions::default())
            .map_err(|e| IdentError::sequence(self.path.display(), line.line_number(), e))?;
        let template = PrSm {
            scan,
            charge: line.parse(&columns.charge)?,
            raw_sequence: raw_sequence.to_string(),
            sequence,
            modifications: modifications.to_string(),
            score: line.parse(&columns.score)?,
            q_value: line.parse(&columns.q_value)?,
            use_golf_scoring: false,
            ..PrSm::default()
        };
        Ok(fan_out(
            template,
            split_proteins(
                line.get(&columns.protein_name)?,
                line.get(&columns.protein_desc)?,
            ),
        ))
    }
}

/// Insert the modifications as `[name]` annotations into the plain sequence. The modification
/// text is a comma separated list of `name position` with 1 based positions, 0 is the
/// N-terminus. Insertion happens from the highest position down so earlier positions stay valid.
fn annotate(
    sequence: &str,
    modifications: &str,
    line: &TsvLine,
    column: &Column,
) -> Result<String, IdentError> {
    let mut placed = Vec::new();
    for item in modifications.split(',').map(str::trim).filter(|i| !i.is_empty()) {
        let (name, position) = item
            .rsplit_once(' ')
            .ok_or_else(|| line.parse_error(column, item))?;
        let position: usize = position
            .trim()
            .parse()
            .map_err(|_| line.parse_error(column, item))?;
        if position > sequence.len() || !sequence.is_char_boundary(position) {
            return Err(line.parse_error(column, item));
        }
        placed.push((name.trim(), position));
    }
    let mut annotated = sequence.to_string();
    for (name, position) in placed.into_iter().sorted_by(|a, b| b.1.cmp(&a.1)) {
        annotated.insert_str(position, &format!("[{name}]"));
    }
    Ok(annotated)
}

struct Columns {
    scan: Column,
    charge: Column,
    sequence: Column,
    modifications: Column,
    protein_name: Column,
    protein_desc: Column,
    score: Column,
    q_value: Column,
}

impl Columns {
    fn new<R: BufRead>(tsv: &TsvReader<R>) -> Result<Self, IdentError> {
        Ok(Self {
            scan: tsv.column("Scan")?,
            charge: tsv.column("Charge")?,
            sequence: tsv.column("Sequence")?,
            modifications: tsv.column("Modifications")?,
            protein_name: tsv.column("ProteinName")?,
            protein_desc: tsv.column("ProteinDesc")?,
            score: tsv.first_required(&["IcScore", "#MatchedFragments"])?,
            q_value: tsv.column("QValue")?,
        })
    }
}

impl IdentificationReader for MsPathFinderReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> IdFileFormat {
        if self.is_zip() {
            IdFileFormat::MsPathFinderZip
        } else {
            IdFileFormat::MsPathFinderTsv
        }
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    fn read_with_progress(
        &self,
        options: &ReadOptions,
        progress: &mut dyn Progress,
    ) -> Result<ReadOutcome, IdentError> {
        if self.is_zip() {
            self.read_zip(options, progress)
        } else {
            let (reader, size) = open_file(&self.path)?;
            let tsv = TsvReader::new(reader, '\t', self.path.display().to_string(), Some(size))?;
            self.read_rows(tsv, options, progress)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "Scan\tSequence\tModifications\tProteinName\tProteinDesc\tCharge\t#MatchedFragments\tQValue";

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn modifications_are_inserted_from_the_back() {
        let mut tsv = TsvReader::new("M\nx".as_bytes(), '\t', "t", None).unwrap();
        let column = tsv.column("M").unwrap();
        let line = tsv.next().unwrap().unwrap();
        assert_eq!(
            annotate("PEPTIDE", "Ox 3,Ph 5", &line, &column).unwrap(),
            "PEP[Ox]TI[Ph]DE"
        );
        assert_eq!(
            annotate("PEPTIDE", "Ph 5, Ox 3 ", &line, &column).unwrap(),
            "PEP[Ox]TI[Ph]DE"
        );
        assert_eq!(
            annotate("PEPTIDE", "Acetyl 0", &line, &column).unwrap(),
            "[Acetyl]PEPTIDE"
        );
        assert_eq!(annotate("PEPTIDE", "", &line, &column).unwrap(), "PEPTIDE");
        assert!(matches!(
            annotate("PEPTIDE", "Ox 30", &line, &column),
            Err(IdentError::ParseField { .. })
        ));
        assert!(matches!(
            annotate("PEPTIDE", "Ox", &line, &column),
            Err(IdentError::ParseField { .. })
        ));
    }

    #[test]
    fn zip_entry_names() {
        assert_eq!(
            MsPathFinderReader::zip_entry_name(Path::new("a/Dataset_IcTsv.zip")),
            "Dataset_IcTda.tsv"
        );
        assert_eq!(
            MsPathFinderReader::zip_entry_name(Path::new("Dataset.zip")),
            "Dataset_IcTda.tsv"
        );
    }

    #[test]
    fn wrong_extension() {
        let registry = Arc::new(ModificationRegistry::with_defaults());
        assert!(matches!(
            MsPathFinderReader::new("results.csv", registry),
            Err(IdentError::UnsupportedExtension { .. })
        ));
    }

    #[test]
    fn icscore_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "a_IcTda.tsv",
            &format!(
                "{HEADER}\tIcScore\n5\tPEPTIDE\t\tP1\tD1\t1\t10\t0.5\t123.5\n"
            ),
        );
        let registry = Arc::new(ModificationRegistry::with_defaults());
        let reader = MsPathFinderReader::new(path, registry).unwrap();
        let outcome = reader.read(&ReadOptions::default()).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert!((outcome.records[0].score - 123.5).abs() < f64::EPSILON);
        assert!(!reader.use_golf_scoring());
    }

    #[test]
    fn unknown_modification_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "a_IcTda.tsv",
            &format!("{HEADER}\n5\tPEPTIDE\tFoo 2\tP1\tD1\t1\t10\t0.5\n"),
        );
        let registry = Arc::new(ModificationRegistry::with_defaults());
        let error = MsPathFinderReader::new(path, registry)
            .unwrap()
            .read(&ReadOptions::default())
            .unwrap_err();
        assert_eq!(error.modification_name(), Some("Foo"));
    }

    #[test]
    fn progress_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "a_IcTda.tsv",
            &format!(
                "{HEADER}\n5\tPEPTIDE\t\tP1\tD1\t1\t10\t0.5\n6\tPEPTIDE\t\tP1\tD1\t1\t10\t0.5\n"
            ),
        );
        let registry = Arc::new(ModificationRegistry::with_defaults());
        let mut seen = Vec::new();
        let mut sink = |p: f64| seen.push(p);
        MsPathFinderReader::new(path, registry)
            .unwrap()
            .read_with_progress(&ReadOptions::default(), &mut sink)
            .unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0] < seen[1]);
        assert!(seen[1] <= 100.0);
    }
}
