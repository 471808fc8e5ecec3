#![doc = include_str!("../README.md")]

pub mod error;
pub mod fasta;
pub mod features;
pub mod format;
pub mod formats;
pub mod ignore;
pub mod prsm;
pub mod reader;
pub mod tsv;
pub mod writer;

/// A subset of the types and traits that are envisioned to be used the most, importing this is a good starting point for working with the crate
pub mod prelude {
    pub use crate::error::IdentError;
    pub use crate::format::{IdFileFormat, sniff};
    pub use crate::prsm::PrSm;
    #[cfg(feature = "rayon")]
    pub use crate::reader::read_many;
    pub use crate::reader::{
        IdentificationReader, NoProgress, Progress, ReadOptions, ReadOutcome, open_reader,
    };
    pub use lcmscore::prelude::*;
}
