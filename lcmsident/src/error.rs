//! The error type for all reading and writing operations.

use std::{ops::Range, path::PathBuf};

use context_error::*;
use lcmscore::sequence::SequenceError;
use thiserror::Error;

/// Everything that can go wrong while reading an identification, FASTA or feature file. All
/// errors are fatal to the read in progress, no partial results are returned.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdentError {
    /// A required column is missing from the header line
    #[error("missing expected column '{column}' in '{file}'")]
    MissingColumn {
        /// The missing header
        column: String,
        /// The file that was read
        file: String,
    },
    /// A modification could not be resolved by name
    #[error("unknown modification '{name}'")]
    InvalidModification {
        /// The modification as written in the file
        name: String,
    },
    /// A reader was constructed for a file it does not support
    #[error("unsupported file extension for this reader: '{}'", path.display())]
    UnsupportedExtension {
        /// The path given
        path: PathBuf,
    },
    /// A FASTA header line without an identifier
    #[error("malformed FASTA header on line {line}: '{text}'")]
    MalformedFasta {
        /// The line number (1 based)
        line: usize,
        /// The header line
        text: String,
    },
    /// A FASTA description that would not read back as written, only the first token after
    /// the identifier is read as the description
    #[error("the description of '{protein}' contains whitespace: '{description}'")]
    FastaDescription {
        /// The protein identifier
        protein: String,
        /// The offending description
        description: String,
    },
    /// A field could not be converted into the expected type
    #[error("could not parse '{value}' in column '{column}' on line {line} of '{file}'")]
    ParseField {
        /// The file that was read
        file: String,
        /// The line number (1 based)
        line: usize,
        /// The column name
        column: String,
        /// The offending value
        value: String,
        /// The full line and the byte range of the value within it
        source_line: Option<(String, Range<usize>)>,
    },
    /// A data line has fewer fields than the header
    #[error("line {line} of '{file}' has no value for column '{column}'")]
    ShortRow {
        /// The file that was read
        file: String,
        /// The line number (1 based)
        line: usize,
        /// The column name
        column: String,
    },
    /// A sequence could not be parsed
    #[error("invalid sequence in '{file}' on line {line}: {source}")]
    Sequence {
        /// The file that was read
        file: String,
        /// The line number (1 based), 0 if not line based
        line: usize,
        /// The underlying problem
        source: SequenceError,
    },
    /// The file could not be opened or read
    #[error("could not read '{file}': {source}")]
    Io {
        /// The file
        file: String,
        /// The underlying error
        source: std::io::Error,
    },
    /// The zip archive is invalid
    #[error("invalid zip archive '{file}': {source}")]
    Zip {
        /// The file
        file: String,
        /// The underlying error
        source: zip::result::ZipError,
    },
    /// The XML document is invalid
    #[error("invalid XML in '{file}': {source}")]
    Xml {
        /// The file
        file: String,
        /// The underlying error
        source: roxmltree::Error,
    },
    /// The database could not be queried
    #[error("could not read database '{file}': {source}")]
    Database {
        /// The file
        file: String,
        /// The underlying error
        source: rusqlite::Error,
    },
    /// A settings file is invalid
    #[error("invalid settings in '{file}': {source}")]
    Json {
        /// The file
        file: String,
        /// The underlying error
        source: serde_json::Error,
    },
}

impl IdentError {
    /// Create an IO error for the given file
    pub(crate) fn io(file: impl std::fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            file: file.to_string(),
            source,
        }
    }

    /// Lift a sequence error, an unknown modification stays its own error so callers can
    /// tell it apart from other failures
    pub(crate) fn sequence(
        file: impl std::fmt::Display,
        line: usize,
        source: SequenceError,
    ) -> Self {
        match source {
            SequenceError::InvalidModification { name } => Self::InvalidModification { name },
            source => Self::Sequence {
                file: file.to_string(),
                line,
                source,
            },
        }
    }

    /// The name of the unresolvable modification, if this is an invalid modification error
    pub fn modification_name(&self) -> Option<&str> {
        match self {
            Self::InvalidModification { name } => Some(name),
            _ => None,
        }
    }

    /// The missing column, if this is a missing column error
    pub fn missing_column(&self) -> Option<&str> {
        match self {
            Self::MissingColumn { column, .. } => Some(column),
            _ => None,
        }
    }

    /// Render this error as a diagnostic with the offending line highlighted when known
    pub fn diagnostic(&self) -> BoxedError<'static, BasicKind> {
        let (short, context) = match self {
            Self::ParseField {
                file,
                line,
                column,
                source_line: Some((text, range)),
                ..
            } => (
                "Invalid value",
                Context::none()
                    .line_index(line.saturating_sub(1) as u32)
                    .lines(0, text.as_str())
                    .add_highlight((0, range.clone(), column.as_str()))
                    .source(file.as_str())
                    .to_owned(),
            ),
            Self::ParseField { file, .. } | Self::ShortRow { file, .. } => (
                "Invalid line",
                Context::default().source(file.as_str()).to_owned(),
            ),
            Self::MissingColumn { file, .. } => (
                "Missing column",
                Context::default().source(file.as_str()).to_owned(),
            ),
            Self::MalformedFasta { line, text } => (
                "Invalid FASTA header",
                Context::none()
                    .line_index(line.saturating_sub(1) as u32)
                    .lines(0, text.as_str())
                    .to_owned(),
            ),
            Self::InvalidModification { .. } => ("Unknown modification", Context::none()),
            Self::FastaDescription { .. } => ("Invalid FASTA description", Context::none()),
            Self::UnsupportedExtension { path } => (
                "Unsupported file",
                Context::default()
                    .source(path.to_string_lossy())
                    .to_owned(),
            ),
            Self::Sequence { file, .. }
            | Self::Io { file, .. }
            | Self::Zip { file, .. }
            | Self::Xml { file, .. }
            | Self::Database { file, .. }
            | Self::Json { file, .. } => (
                "Could not read file",
                Context::default().source(file.as_str()).to_owned(),
            ),
        };
        BoxedError::new(BasicKind::Error, short, self.to_string(), context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_modifications_stay_distinct() {
        let error = IdentError::sequence(
            "a.tsv",
            3,
            SequenceError::InvalidModification {
                name: "Foo".to_string(),
            },
        );
        assert_eq!(error.modification_name(), Some("Foo"));
        let error = IdentError::sequence(
            "a.tsv",
            3,
            SequenceError::UnclosedBracket {
                sequence: "PEP[Ox".to_string(),
            },
        );
        assert!(matches!(error, IdentError::Sequence { line: 3, .. }));
        assert_eq!(error.modification_name(), None);
        assert!(error.to_string().contains("a.tsv"));
    }
}
