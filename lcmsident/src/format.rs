//! Detect the format of an identification file from its name and header line.

use std::{io::BufRead, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::IdentError, tsv::open_file};

/// All supported identification file formats
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum IdFileFormat {
    /// MSPathFinder `_IcTda.tsv` results
    MsPathFinderTsv,
    /// MSPathFinder results zipped as `<stem>_IcTsv.zip`
    MsPathFinderZip,
    /// MS-GF+ tab separated results
    MsgfPlusTsv,
    /// PHRP synopsis files (`_syn.txt`)
    PhrpSynopsis,
    /// Generic tab separated results with a `Score` column
    BruteForceTsv,
    /// mzIdentML, optionally gzipped
    MzIdentMl,
    /// MTDB SQLite databases
    Mtdb,
}

impl IdFileFormat {
    /// The name of the format
    pub const fn name(self) -> &'static str {
        match self {
            Self::MsPathFinderTsv => "MSPathFinder TSV",
            Self::MsPathFinderZip => "MSPathFinder ZIP",
            Self::MsgfPlusTsv => "MS-GF+ TSV",
            Self::PhrpSynopsis => "PHRP synopsis",
            Self::BruteForceTsv => "Brute force TSV",
            Self::MzIdentMl => "mzIdentML",
            Self::Mtdb => "MTDB",
        }
    }

    /// If lower scores are better for this format (E-values and probabilities)
    pub const fn use_golf_scoring(self) -> bool {
        match self {
            Self::MsPathFinderTsv | Self::MsPathFinderZip | Self::BruteForceTsv => false,
            Self::MsgfPlusTsv | Self::PhrpSynopsis | Self::MzIdentMl | Self::Mtdb => true,
        }
    }
}

impl std::fmt::Display for IdFileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The lower cased extension of a file name without the leading dot. A `.gz` extension is
/// combined with the extension before it, so `Results.mzid.gz` gives `mzid.gz`.
pub fn extension_of(file_name: &str) -> Option<String> {
    let path = Path::new(file_name);
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if extension == "gz" {
        let inner = Path::new(path.file_stem()?)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        Some(inner.map_or(extension, |inner| format!("{inner}.gz")))
    } else {
        Some(extension)
    }
}

/// If the format of a file with this name can only be decided by looking at its header line
pub fn needs_header(file_name: &str) -> bool {
    matches!(extension_of(file_name).as_deref(), Some("tsv" | "txt"))
        && !is_synopsis(file_name)
}

fn is_synopsis(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with("_syn.txt")
}

/// Decide the format based on the file name and, for tab separated files, the header line.
/// This does not touch the filesystem. `None` means no reader supports this file.
pub fn classify(file_name: &str, header: Option<&str>) -> Option<IdFileFormat> {
    match extension_of(file_name)?.as_str() {
        "zip" => Some(IdFileFormat::MsPathFinderZip),
        "tsv" | "txt" if is_synopsis(file_name) => Some(IdFileFormat::PhrpSynopsis),
        "tsv" | "txt" => {
            let header = header?;
            if header.contains("MSGFScore") {
                Some(IdFileFormat::MsgfPlusTsv)
            } else if header.contains("#MatchedFragments") {
                Some(IdFileFormat::MsPathFinderTsv)
            } else if header.contains("Score") {
                Some(IdFileFormat::BruteForceTsv)
            } else {
                None
            }
        }
        "mzid" | "mzid.gz" => Some(IdFileFormat::MzIdentMl),
        "mtdb" => Some(IdFileFormat::Mtdb),
        _ => None,
    }
}

/// Detect the format of the given file. For tab separated files only the first line is read,
/// the file is closed before returning. Unknown formats give `Ok(None)`.
/// # Errors
/// If a tab separated file could not be opened or read.
pub fn sniff(path: impl AsRef<Path>) -> Result<Option<IdFileFormat>, IdentError> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let header = if needs_header(&file_name) {
        let (mut reader, _) = open_file(path)?;
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|e| IdentError::io(path.display(), e))?;
        Some(line)
    } else {
        None
    };
    let format = classify(&file_name, header.as_deref());
    debug!(path = %path.display(), ?format, "detected format");
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions() {
        assert_eq!(extension_of("Results.mzid.gz").as_deref(), Some("mzid.gz"));
        assert_eq!(extension_of("Results.MZID").as_deref(), Some("mzid"));
        assert_eq!(extension_of("archive.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("no_extension"), None);
    }

    #[test]
    fn classification() {
        assert_eq!(
            classify("Dataset_IcTsv.zip", None),
            Some(IdFileFormat::MsPathFinderZip)
        );
        assert_eq!(
            classify("Dataset_msgfplus_syn.txt", None),
            Some(IdFileFormat::PhrpSynopsis)
        );
        assert_eq!(
            classify("a.tsv", Some("#SpecFile\tScanNum\tMSGFScore\tSpecEValue")),
            Some(IdFileFormat::MsgfPlusTsv)
        );
        assert_eq!(
            classify("a.tsv", Some("Scan\t#MatchedFragments\tIcScore")),
            Some(IdFileFormat::MsPathFinderTsv)
        );
        assert_eq!(
            classify("a.txt", Some("Scan\tScore\tProtein")),
            Some(IdFileFormat::BruteForceTsv)
        );
        assert_eq!(classify("a.tsv", Some("Scan\tProtein")), None);
        assert_eq!(classify("a.tsv", None), None);
        assert_eq!(
            classify("Results.mzid.gz", None),
            Some(IdFileFormat::MzIdentMl)
        );
        assert_eq!(classify("targets.mtdb", None), Some(IdFileFormat::Mtdb));
        assert_eq!(classify("data.raw", None), None);
        assert_eq!(classify("data.tsv.gz", None), None);
    }

    #[test]
    fn scoring_direction() {
        assert!(!IdFileFormat::MsPathFinderTsv.use_golf_scoring());
        assert!(!IdFileFormat::BruteForceTsv.use_golf_scoring());
        assert!(IdFileFormat::MsgfPlusTsv.use_golf_scoring());
        assert!(IdFileFormat::MzIdentMl.use_golf_scoring());
    }
}
