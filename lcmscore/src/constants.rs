//! Physical constants used in mass calculations, all in Dalton.

/// Mass of a proton
pub const PROTON: f64 = 1.007_276_466_88;

/// Monoisotopic mass of water, added once to the residue sum of a peptide
pub const WATER: f64 = 18.010_564_684;

/// Mass difference between a carbon 13 and a carbon 12 atom, the spacing of isotope peaks
pub const C13_C12_DIFFERENCE: f64 = 1.003_354_835;
