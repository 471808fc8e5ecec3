//! The readers for all supported identification formats.

mod brute_force;
mod ms_path_finder;
mod msgf;
mod mtdb;
mod mzid;
mod phrp;

pub use brute_force::BruteForceReader;
pub use ms_path_finder::MsPathFinderReader;
pub use msgf::MsgfPlusReader;
pub use mtdb::MtdbReader;
pub use mzid::{MzIdentMlReader, MzIdentMlThresholds};
pub use phrp::PhrpSynopsisReader;
