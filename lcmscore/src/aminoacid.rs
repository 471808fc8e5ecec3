//! Amino acids and their residue masses.

use serde::{Deserialize, Serialize};

/// An amino acid as found in identification result sequences.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[allow(missing_docs)]
pub enum AminoAcid {
    Alanine,
    Arginine,
    Asparagine,
    AsparticAcid,
    Cysteine,
    GlutamicAcid,
    Glutamine,
    Glycine,
    Histidine,
    Isoleucine,
    Leucine,
    Lysine,
    Methionine,
    Phenylalanine,
    Proline,
    Pyrrolysine,
    Selenocysteine,
    Serine,
    Threonine,
    Tryptophan,
    Tyrosine,
    Valine,
}

impl AminoAcid {
    /// All amino acids known to this crate
    pub const ALL: [Self; 22] = [
        Self::Alanine,
        Self::Arginine,
        Self::Asparagine,
        Self::AsparticAcid,
        Self::Cysteine,
        Self::GlutamicAcid,
        Self::Glutamine,
        Self::Glycine,
        Self::Histidine,
        Self::Isoleucine,
        Self::Leucine,
        Self::Lysine,
        Self::Methionine,
        Self::Phenylalanine,
        Self::Proline,
        Self::Pyrrolysine,
        Self::Selenocysteine,
        Self::Serine,
        Self::Threonine,
        Self::Tryptophan,
        Self::Tyrosine,
        Self::Valine,
    ];

    /// The one letter code
    pub const fn one_letter_code(self) -> char {
        match self {
            Self::Alanine => 'A',
            Self::Arginine => 'R',
            Self::Asparagine => 'N',
            Self::AsparticAcid => 'D',
            Self::Cysteine => 'C',
            Self::GlutamicAcid => 'E',
            Self::Glutamine => 'Q',
            Self::Glycine => 'G',
            Self::Histidine => 'H',
            Self::Isoleucine => 'I',
            Self::Leucine => 'L',
            Self::Lysine => 'K',
            Self::Methionine => 'M',
            Self::Phenylalanine => 'F',
            Self::Proline => 'P',
            Self::Pyrrolysine => 'O',
            Self::Selenocysteine => 'U',
            Self::Serine => 'S',
            Self::Threonine => 'T',
            Self::Tryptophan => 'W',
            Self::Tyrosine => 'Y',
            Self::Valine => 'V',
        }
    }

    /// The monoisotopic residue mass in Dalton (the amino acid minus water)
    pub const fn monoisotopic_mass(self) -> f64 {
        match self {
            Self::Glycine => 57.021_463_72,
            Self::Alanine => 71.037_113_79,
            Self::Serine => 87.032_028_41,
            Self::Proline => 97.052_763_85,
            Self::Valine => 99.068_413_91,
            Self::Threonine => 101.047_678_5,
            Self::Cysteine => 103.009_184_5,
            Self::Leucine | Self::Isoleucine => 113.084_064_0,
            Self::Asparagine => 114.042_927_5,
            Self::AsparticAcid => 115.026_943_1,
            Self::Glutamine => 128.058_577_5,
            Self::Lysine => 128.094_963_0,
            Self::GlutamicAcid => 129.042_593_1,
            Self::Methionine => 131.040_484_6,
            Self::Histidine => 137.058_911_9,
            Self::Phenylalanine => 147.068_413_9,
            Self::Selenocysteine => 150.953_633_4,
            Self::Arginine => 156.101_111_0,
            Self::Tyrosine => 163.063_328_5,
            Self::Tryptophan => 186.079_313_0,
            Self::Pyrrolysine => 237.147_726_9,
        }
    }
}

impl TryFrom<char> for AminoAcid {
    type Error = ();
    fn try_from(value: char) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|aa| aa.one_letter_code() == value)
            .ok_or(())
    }
}

impl std::fmt::Display for AminoAcid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.one_letter_code())
    }
}
