//! Peptide sequences with modifications and the parser for annotated sequence strings.

use std::{fmt::Write, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    aminoacid::AminoAcid,
    constants::WATER,
    modification::{DEFAULT_MASS_TOLERANCE, Modification, ModificationLog, ModificationRegistry},
};

/// A single residue in a sequence, with at most one modification
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Residue {
    /// The amino acid
    pub amino_acid: AminoAcid,
    /// The modification placed on this residue
    pub modification: Option<Arc<Modification>>,
}

impl Residue {
    /// An unmodified residue
    pub const fn new(amino_acid: AminoAcid) -> Self {
        Self {
            amino_acid,
            modification: None,
        }
    }

    /// The mass of the residue including its modification
    pub fn mass(&self) -> f64 {
        self.amino_acid.monoisotopic_mass() + self.modification.as_ref().map_or(0.0, |m| m.mass())
    }
}

/// An ordered list of residues, each possibly modified, plus an N-terminal modification.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Sequence {
    n_term: Option<Arc<Modification>>,
    residues: Vec<Residue>,
}

/// Errors while building or parsing a sequence
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SequenceError {
    /// A modification name was not known to the registry
    #[error("unknown modification '{name}'")]
    InvalidModification {
        /// The modification as written in the source
        name: String,
    },
    /// A character that is not an amino acid
    #[error("invalid residue '{residue}' at position {position} in '{sequence}'")]
    InvalidResidue {
        /// The offending character
        residue: char,
        /// Byte offset in the text
        position: usize,
        /// The text that was parsed
        sequence: String,
    },
    /// A numeric mass shift that could not be read
    #[error("invalid mass shift '{text}' in '{sequence}'")]
    InvalidMass {
        /// The mass text
        text: String,
        /// The text that was parsed
        sequence: String,
    },
    /// A bracket was opened but not closed
    #[error("unclosed modification bracket in '{sequence}'")]
    UnclosedBracket {
        /// The text that was parsed
        sequence: String,
    },
    /// A modification position outside of the sequence
    #[error("modification position {position} is outside of a sequence of length {length}")]
    InvalidPosition {
        /// The requested position
        position: usize,
        /// The length of the sequence
        length: usize,
    },
}

impl Sequence {
    /// Build a sequence from plain residues
    /// # Errors
    /// If any character is not a known amino acid
    pub fn from_unmodified(text: &str) -> Result<Self, SequenceError> {
        let residues = text
            .char_indices()
            .map(|(position, c)| {
                AminoAcid::try_from(c)
                    .map(Residue::new)
                    .map_err(|()| SequenceError::InvalidResidue {
                        residue: c,
                        position,
                        sequence: text.to_string(),
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            n_term: None,
            residues,
        })
    }

    /// The number of residues
    pub fn len(&self) -> usize {
        self.residues.len()
    }

    /// If there are no residues
    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    /// The residues
    pub fn residues(&self) -> &[Residue] {
        &self.residues
    }

    /// The N-terminal modification
    pub const fn n_term(&self) -> Option<&Arc<Modification>> {
        self.n_term.as_ref()
    }

    /// Place a modification. Position 0 is the N-terminus, 1 up to and including the length are
    /// the residues (1 based). An existing modification at that spot is replaced.
    /// # Errors
    /// If the position is past the end of the sequence
    pub fn set_modification(
        &mut self,
        position: usize,
        modification: Arc<Modification>,
    ) -> Result<(), SequenceError> {
        if position == 0 {
            self.n_term = Some(modification);
            Ok(())
        } else if let Some(residue) = self.residues.get_mut(position - 1) {
            residue.modification = Some(modification);
            Ok(())
        } else {
            Err(SequenceError::InvalidPosition {
                position,
                length: self.residues.len(),
            })
        }
    }

    /// All modifications with their position (0 for the N-terminus, 1 based for residues)
    pub fn modifications(&self) -> impl Iterator<Item = (usize, &Arc<Modification>)> {
        self.n_term.iter().map(|m| (0, m)).chain(
            self.residues
                .iter()
                .enumerate()
                .filter_map(|(i, r)| r.modification.as_ref().map(|m| (i + 1, m))),
        )
    }

    /// The sequence without any modifications as one letter codes
    pub fn unmodified(&self) -> String {
        self.residues
            .iter()
            .map(|r| r.amino_acid.one_letter_code())
            .collect()
    }

    /// The monoisotopic neutral mass, including water and all modifications. An empty
    /// sequence has mass 0.
    pub fn monoisotopic_mass(&self) -> f64 {
        if self.residues.is_empty() {
            return 0.0;
        }
        self.residues.iter().map(Residue::mass).sum::<f64>()
            + WATER
            + self.n_term.as_ref().map_or(0.0, |m| m.mass())
    }
}

impl FromIterator<Residue> for Sequence {
    fn from_iter<T: IntoIterator<Item = Residue>>(iter: T) -> Self {
        Self {
            n_term: None,
            residues: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for Sequence {
    /// Bracketed notation, for example `[Acetyl]PEPM[Oxidation]TIDE`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(n_term) = &self.n_term {
            write!(f, "[{n_term}]")?;
        }
        for residue in &self.residues {
            f.write_char(residue.amino_acid.one_letter_code())?;
            if let Some(modification) = &residue.modification {
                write!(f, "[{modification}]")?;
            }
        }
        Ok(())
    }
}

/// Settings for [`parse_annotated`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParseOptions {
    /// Remove the flanking residues (`K.PEPTIDE.R`) before parsing
    pub trim_flanking: bool,
    /// The tolerance used when resolving numeric mass shifts
    pub mass_tolerance: f64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            trim_flanking: false,
            mass_tolerance: DEFAULT_MASS_TOLERANCE,
        }
    }
}

impl ParseOptions {
    /// Options that trim the flanking residues
    pub fn trimmed() -> Self {
        Self {
            trim_flanking: true,
            ..Self::default()
        }
    }
}

/// Remove the flanking residue annotation from a sequence: everything up to and including the
/// first `.` and from the last `.` onwards, as in `K.PEPTIDE.R` or `-.PEPTIDE.-`. The dots have
/// to be the second and second to last character, otherwise the text is returned unchanged
/// (numeric mass shifts contain dots as well).
pub fn strip_flanking(text: &str) -> &str {
    let bytes = text.as_bytes();
    let length = bytes.len();
    if length >= 4 && bytes[1] == b'.' && bytes[length - 2] == b'.' {
        &text[2..length - 2]
    } else {
        text
    }
}

/// Parse a sequence with embedded modifications.
///
/// Supported annotations, all placed on the preceding residue or the N-terminus when nothing
/// precedes them:
/// * `[Name]` a named modification, resolved by name or alias,
/// * `[+15.995]` / `+15.995` / `-17.027` a mass shift, resolved by mass or registered as a new
///   mass only modification.
///
/// Modifications registered along the way are recorded in `log`.
/// # Errors
/// * [`SequenceError::InvalidModification`] if a name is not known.
/// * [`SequenceError::InvalidResidue`] for characters that are not amino acids.
/// * [`SequenceError::InvalidMass`] if a mass shift is not a number.
pub fn parse_annotated(
    text: &str,
    registry: &ModificationRegistry,
    log: &mut ModificationLog,
    options: ParseOptions,
) -> Result<Sequence, SequenceError> {
    let text = text.trim();
    let text = if options.trim_flanking {
        strip_flanking(text)
    } else {
        text
    };
    let mut sequence = Sequence::default();
    let bytes = text.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'[' => {
                let end = text[index..]
                    .find(']')
                    .map(|e| index + e)
                    .ok_or_else(|| SequenceError::UnclosedBracket {
                        sequence: text.to_string(),
                    })?;
                let name = &text[index + 1..end];
                let modification = if let Some(m) = registry.resolve_by_name(name) {
                    m
                } else if name.starts_with(['+', '-']) {
                    resolve_mass(name, text, registry, log, options.mass_tolerance)?
                } else {
                    return Err(SequenceError::InvalidModification {
                        name: name.to_string(),
                    });
                };
                sequence.set_modification(sequence.len(), modification)?;
                index = end + 1;
            }
            b'+' | b'-' => {
                let length = text[index + 1..]
                    .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                    .unwrap_or(text.len() - index - 1);
                let number = &text[index..=index + length];
                let modification =
                    resolve_mass(number, text, registry, log, options.mass_tolerance)?;
                sequence.set_modification(sequence.len(), modification)?;
                index += length + 1;
            }
            c if c.is_ascii_whitespace() => index += 1,
            c => {
                let residue = char::from(c);
                let amino_acid =
                    AminoAcid::try_from(residue).map_err(|()| SequenceError::InvalidResidue {
                        residue,
                        position: index,
                        sequence: text.to_string(),
                    })?;
                sequence.residues.push(Residue::new(amino_acid));
                index += 1;
            }
        }
    }
    Ok(sequence)
}

fn resolve_mass(
    number: &str,
    text: &str,
    registry: &ModificationRegistry,
    log: &mut ModificationLog,
    tolerance: f64,
) -> Result<Arc<Modification>, SequenceError> {
    let mass: f64 = number.parse().map_err(|_| SequenceError::InvalidMass {
        text: number.to_string(),
        sequence: text.to_string(),
    })?;
    Ok(registry
        .resolve_by_mass(mass, tolerance)
        .unwrap_or_else(|| registry.register_unnamed_tracked(mass, log)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str, options: ParseOptions) -> Result<Sequence, SequenceError> {
        let registry = ModificationRegistry::with_defaults();
        let mut log = ModificationLog::default();
        parse_annotated(text, &registry, &mut log, options)
    }

    #[test]
    fn plain_mass() {
        let peptide = Sequence::from_unmodified("PEPTIDE").unwrap();
        assert!((peptide.monoisotopic_mass() - 799.359_964).abs() < 1e-3);
        assert!(Sequence::default().monoisotopic_mass().abs() < f64::EPSILON);
        assert!(Sequence::from_unmodified("PEPXIDE").is_err());
    }

    #[test]
    fn named_modifications() {
        let sequence = parse("[Acetyl]PEPM[Oxidation]TIDE", ParseOptions::default()).unwrap();
        assert_eq!(sequence.len(), 8);
        assert_eq!(sequence.n_term().unwrap().name(), "Acetyl");
        assert_eq!(
            sequence.residues()[3].modification.as_ref().unwrap().name(),
            "Oxidation"
        );
        assert!(
            sequence
                .residues()
                .iter()
                .enumerate()
                .all(|(i, r)| i == 3 || r.modification.is_none())
        );
        let modifications: Vec<_> = sequence
            .modifications()
            .map(|(p, m)| (p, m.name().to_string()))
            .collect();
        assert_eq!(
            modifications,
            vec![(0, "Acetyl".to_string()), (4, "Oxidation".to_string())]
        );
        assert_eq!(sequence.to_string(), "[Acetyl]PEPM[Oxidation]TIDE");
        assert_eq!(sequence.unmodified(), "PEPMTIDE");
    }

    #[test]
    fn mass_shifts() {
        let registry = ModificationRegistry::with_defaults();
        let mut log = ModificationLog::default();
        let sequence = parse_annotated(
            "K.+42.011PEPM+15.995TIDEC+57.021-3.5.R",
            &registry,
            &mut log,
            ParseOptions::trimmed(),
        )
        .unwrap();
        assert_eq!(sequence.unmodified(), "PEPMTIDEC");
        assert_eq!(sequence.n_term().unwrap().name(), "Acetyl");
        assert_eq!(
            sequence.residues()[3].modification.as_ref().unwrap().name(),
            "Oxidation"
        );
        // The last shift on a residue wins, the unknown one got registered
        let last = sequence.residues()[8].modification.as_ref().unwrap();
        assert_eq!(last.name(), "-3.5000");
        assert_eq!(log.modifications().len(), 1);
    }

    #[test]
    fn unknown_name() {
        assert_eq!(
            parse("PEP[Unknown]TIDE", ParseOptions::default()),
            Err(SequenceError::InvalidModification {
                name: "Unknown".to_string()
            })
        );
        assert!(matches!(
            parse("PEP[Oxidation", ParseOptions::default()),
            Err(SequenceError::UnclosedBracket { .. })
        ));
    }

    #[test]
    fn flanking() {
        assert_eq!(strip_flanking("K.PEPTIDE.R"), "PEPTIDE");
        assert_eq!(strip_flanking("-.PEPTIDE.-"), "PEPTIDE");
        assert_eq!(strip_flanking("PEPM+15.995TIDE"), "PEPM+15.995TIDE");
        assert_eq!(strip_flanking("PE"), "PE");
    }
}
