use std::{
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
    prsm::{PrSm, fan_out, split_proteins},
    reader::{IdentificationReader, Progress, ReadOptions, ReadOutcome, check_extension},
    tsv::{TsvReader, open_file},
};

/// Reads generic tab separated results with the columns `Score`, `Protein`, `Description`,
/// `Sequence` and `Scan`. These files carry no charge, every record gets charge 1. Higher
/// scores are better.
#[derive(Debug)]
pub struct BruteForceReader {
    path: PathBuf,
    registry: Arc<ModificationRegistry>,
}

impl BruteForceReader {
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
}

impl IdentificationReader for BruteForceReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> IdFileFormat {
        IdFileFormat::BruteForceTsv
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    fn read_with_progress(
        &self,
        options: &ReadOptions,
        progress: &mut dyn Progress,
    ) -> Result<ReadOutcome, IdentError> {
        let (reader, size) = open_file(&self.path)?;
        let mut tsv = TsvReader::new(reader, '\t', self.path.display().to_string(), Some(size))?;
        tsv.require(&["Score", "Protein", "Description", "Sequence", "Scan"])?;
        let score = tsv.column("Score")?;
        let protein = tsv.column("Protein")?;
        let description = tsv.column("Description")?;
        let sequence_column = tsv.column("Sequence")?;
        let scan_column = tsv.column("Scan")?;

        let mut log = ModificationLog::default();
        let mut records = Vec::new();
        while let Some(line) = tsv.next() {
            let line = line?;
            let scan = line.parse(&scan_column)?;
            let text = line.get(&sequence_column)?;
            if options.accepts_scan(scan)
                && !IgnoreMatch::Substring.is_ignored(text, &options.ignore_list)
            {
                let sequence =
                    parse_annotated(text, &self.registry, &mut log, ParseOptions::default())
                        .map_err(|e| {
                            IdentError::sequence(self.path.display(), line.line_number(), e)
                        })?;
                let template = PrSm {
                    scan,
                    charge: 1,
                    raw_sequence: text.to_string(),
                    sequence,
                    score: line.parse(&score)?,
                    heavy: false,
                    use_golf_scoring: false,
                    ..PrSm::default()
                };
                records.extend(fan_out(
                    template,
                    split_proteins(line.get(&protein)?, line.get(&description)?),
                ));
            }
            if let Some(percent) = tsv.percent() {
                progress.report(percent);
            }
        }
        Ok(ReadOutcome::new(records, log, &self.path))
    }
}
