//! The common interface of all identification readers and the entry point that picks the right
//! reader for a file.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use lcmscore::modification::{Modification, ModificationLog, ModificationRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::IdentError,
    format::{IdFileFormat, sniff},
    formats::{
        BruteForceReader, MsPathFinderReader, MsgfPlusReader, MtdbReader, MzIdentMlReader,
        PhrpSynopsisReader,
    },
    prsm::PrSm,
};

/// Receives the progress of a read as a percentage (0-100). Any `FnMut(f64)` closure is a
/// progress sink.
pub trait Progress {
    /// Report the current progress
    fn report(&mut self, percent: f64);
}

impl<F: FnMut(f64)> Progress for F {
    fn report(&mut self, percent: f64) {
        self(percent);
    }
}

/// A progress sink that ignores everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _percent: f64) {}
}

/// The settings for a single read
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Records with any of these modifications are left out
    pub ignore_list: Vec<String>,
    /// Only keep records with a scan number in this inclusive range
    pub scan_range: Option<(usize, usize)>,
}

impl ReadOptions {
    /// Options with the given ignore list
    pub fn ignoring(ignore_list: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            ignore_list: ignore_list.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Load the options from a JSON file
    /// # Errors
    /// If the file could not be read or is not valid JSON for these options
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self, IdentError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IdentError::io(path.display(), e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| IdentError::Json {
            file: path.display().to_string(),
            source,
        })
    }

    /// If the scan is within the scan range (always true without a range)
    pub fn accepts_scan(&self, scan: usize) -> bool {
        self.scan_range
            .is_none_or(|(start, end)| (start..=end).contains(&scan))
    }
}

/// The result of a read
#[derive(Clone, Debug, Default)]
pub struct ReadOutcome {
    /// All records in file order
    pub records: Vec<PrSm>,
    /// Modifications that were not known to the registry before this read
    pub new_modifications: Vec<Arc<Modification>>,
}

impl ReadOutcome {
    pub(crate) fn new(records: Vec<PrSm>, log: ModificationLog, path: &Path) -> Self {
        info!(
            path = %path.display(),
            records = records.len(),
            new_modifications = log.modifications().len(),
            "read identifications"
        );
        Self {
            records,
            new_modifications: log.into_inner(),
        }
    }
}

/// A reader for one identification file, the path is fixed at construction
pub trait IdentificationReader: Send + Sync {
    /// The file that is read
    fn path(&self) -> &Path;

    /// The format of the file
    fn format(&self) -> IdFileFormat;

    /// If lower scores are better for the records from this reader
    fn use_golf_scoring(&self) -> bool {
        self.format().use_golf_scoring()
    }

    /// Read all records while reporting progress
    /// # Errors
    /// Any error is fatal to the read, no partial results are returned
    fn read_with_progress(
        &self,
        options: &ReadOptions,
        progress: &mut dyn Progress,
    ) -> Result<ReadOutcome, IdentError>;

    /// Read all records
    /// # Errors
    /// Any error is fatal to the read, no partial results are returned
    fn read(&self, options: &ReadOptions) -> Result<ReadOutcome, IdentError> {
        self.read_with_progress(options, &mut NoProgress)
    }
}

impl std::fmt::Debug for dyn IdentificationReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentificationReader")
            .field("path", &self.path())
            .field("format", &self.format())
            .finish()
    }
}

/// Construct the reader for the given format
/// # Errors
/// If the reader does not support the extension of the path
pub fn reader_for(
    format: IdFileFormat,
    path: impl Into<PathBuf>,
    registry: Arc<ModificationRegistry>,
) -> Result<Box<dyn IdentificationReader>, IdentError> {
    let path = path.into();
    Ok(match format {
        IdFileFormat::MsPathFinderTsv | IdFileFormat::MsPathFinderZip => {
            Box::new(MsPathFinderReader::new(path, registry)?)
        }
        IdFileFormat::MsgfPlusTsv => Box::new(MsgfPlusReader::new(path, registry)?),
        IdFileFormat::PhrpSynopsis => Box::new(PhrpSynopsisReader::new(path, registry)?),
        IdFileFormat::BruteForceTsv => Box::new(BruteForceReader::new(path, registry)?),
        IdFileFormat::MzIdentMl => Box::new(MzIdentMlReader::new(path, registry)?),
        IdFileFormat::Mtdb => Box::new(MtdbReader::new(path, registry)?),
    })
}

/// Detect the format of the file and open the matching reader. An empty path or a file that no
/// reader supports gives `Ok(None)`.
/// # Errors
/// If the header line of a tab separated file could not be read.
pub fn open_reader(
    path: impl AsRef<Path>,
    registry: Arc<ModificationRegistry>,
) -> Result<Option<Box<dyn IdentificationReader>>, IdentError> {
    let path = path.as_ref();
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Ok(None);
    }
    match sniff(path)? {
        Some(format) => {
            debug!(path = %path.display(), %format, "opening reader");
            reader_for(format, path, registry).map(Some)
        }
        None => Ok(None),
    }
}

/// Read multiple files in parallel, all sharing the same registry. The results are in the same
/// order as the paths, `None` for files without a matching reader.
#[cfg(feature = "rayon")]
pub fn read_many<P: AsRef<Path> + Sync>(
    paths: &[P],
    registry: &Arc<ModificationRegistry>,
    options: &ReadOptions,
) -> Vec<Result<Option<ReadOutcome>, IdentError>> {
    use rayon::prelude::*;

    paths
        .par_iter()
        .map(|path| {
            open_reader(path, registry.clone())?
                .map(|reader| reader.read(options))
                .transpose()
        })
        .collect()
}

/// Check that the file has one of the given extensions (case insensitive, compound extensions
/// like `mzid.gz` are supported)
pub(crate) fn check_extension(
    path: &Path,
    extensions: &[&str],
) -> Result<(), IdentError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if extensions
        .iter()
        .any(|extension| name.ends_with(&format!(".{extension}")))
    {
        Ok(())
    } else {
        Err(IdentError::UnsupportedExtension {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_range() {
        let all = ReadOptions::default();
        assert!(all.accepts_scan(0));
        let range = ReadOptions {
            scan_range: Some((10, 20)),
            ..ReadOptions::default()
        };
        assert!(range.accepts_scan(10));
        assert!(range.accepts_scan(20));
        assert!(!range.accepts_scan(21));
        assert!(!range.accepts_scan(9));
    }

    #[test]
    fn options_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"ignore_list": ["Ox"]}"#).unwrap();
        let options = ReadOptions::from_json(&path).unwrap();
        assert_eq!(options, ReadOptions::ignoring(["Ox"]));
        std::fs::write(&path, r#"{"ignore_list": 5}"#).unwrap();
        assert!(matches!(
            ReadOptions::from_json(&path),
            Err(IdentError::Json { .. })
        ));
    }

    #[test]
    fn empty_paths_have_no_reader() {
        let registry = Arc::new(ModificationRegistry::with_defaults());
        assert!(open_reader("", registry.clone()).unwrap().is_none());
        assert!(open_reader("   ", registry.clone()).unwrap().is_none());
        assert!(open_reader("data.raw", registry).unwrap().is_none());
    }

    #[test]
    fn extension_checks() {
        assert!(check_extension(Path::new("a/b.TSV"), &["tsv", "zip"]).is_ok());
        assert!(check_extension(Path::new("b.mzid.gz"), &["mzid", "mzid.gz"]).is_ok());
        assert!(matches!(
            check_extension(Path::new("b.csv"), &["tsv"]),
            Err(IdentError::UnsupportedExtension { .. })
        ));
    }

    #[test]
    fn closures_report_progress() {
        let mut seen = Vec::new();
        {
            let mut sink = |p: f64| seen.push(p);
            let progress: &mut dyn Progress = &mut sink;
            progress.report(50.0);
        }
        assert_eq!(seen, [50.0]);
    }
}
