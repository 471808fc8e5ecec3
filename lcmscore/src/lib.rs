#![doc = include_str!("../README.md")]

pub mod aminoacid;
pub mod averagine;
pub mod constants;
pub mod modification;
/// Contains sequences, residues and the parser for sequences with embedded modifications.
pub mod sequence;

/// A subset of the types and traits that are envisioned to be used the most, importing this is a good starting point for working with the crate
pub mod prelude {
    pub use crate::aminoacid::AminoAcid;
    pub use crate::modification::{Modification, ModificationLog, ModificationRegistry};
    pub use crate::sequence::{ParseOptions, Residue, Sequence, SequenceError, parse_annotated};
}
