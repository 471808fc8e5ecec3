//! The averagine model: an average amino acid composition that approximates the elemental
//! composition, and with that the isotope envelope, of a peptide or protein of a given mass.

use crate::constants::{C13_C12_DIFFERENCE, PROTON};

/// Monoisotopic mass of one averagine unit
const AVERAGINE_MASS: f64 = 111.1254;

/// Elements in one averagine unit with the chance of the +1 heavy isotope per atom
const AVERAGINE_UNIT: [(f64, f64); 5] = [
    (4.9384, 0.010_7),   // C
    (7.7583, 0.000_115), // H
    (1.3577, 0.003_64),  // N
    (1.4773, 0.000_38),  // O
    (0.0417, 0.007_5),   // S
];

/// The number of isotope peaks considered when looking for the most abundant one
const MAX_ISOTOPES: usize = 100;

/// The expected number of heavy isotope atoms for a molecule of the given mass, which is the
/// mean of the Poisson approximation of the isotope envelope.
fn heavy_isotope_mean(monoisotopic_mass: f64) -> f64 {
    let units = monoisotopic_mass.max(0.0) / AVERAGINE_MASS;
    AVERAGINE_UNIT
        .iter()
        .map(|(count, heavy)| units * count * heavy)
        .sum()
}

/// The theoretical isotope envelope for the given mass, relative to the most abundant peak.
/// Peaks are cut off once they drop below 0.1% of the most abundant peak.
pub fn isotope_envelope(monoisotopic_mass: f64) -> Vec<f64> {
    let lambda = heavy_isotope_mean(monoisotopic_mass);
    let mut probabilities = Vec::new();
    let mut probability = (-lambda).exp();
    for k in 0..MAX_ISOTOPES {
        if k > 0 {
            probability *= lambda / k as f64;
        }
        probabilities.push(probability);
    }
    let max = probabilities.iter().copied().fold(f64::MIN, f64::max);
    let mut envelope: Vec<f64> = probabilities.into_iter().map(|p| p / max).collect();
    let last = envelope
        .iter()
        .rposition(|r| *r >= 0.001)
        .map_or(1, |i| i + 1);
    envelope.truncate(last);
    envelope
}

/// The index of the most abundant isotope peak (0 is monoisotopic)
pub fn most_abundant_isotope_index(monoisotopic_mass: f64) -> usize {
    isotope_envelope(monoisotopic_mass)
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(index, _)| index)
}

/// The m/z of the given isotope peak for the given charge. A charge of 0 gives the neutral mass
/// of the isotope.
pub fn isotope_mz(monoisotopic_mass: f64, charge: u32, isotope_index: usize) -> f64 {
    let mass = (isotope_index as f64).mul_add(C13_C12_DIFFERENCE, monoisotopic_mass);
    if charge == 0 {
        mass
    } else {
        let charge = f64::from(charge);
        charge.mul_add(PROTON, mass) / charge
    }
}

/// The m/z of the most abundant isotope peak for the given mass and charge
pub fn most_abundant_isotope_mz(monoisotopic_mass: f64, charge: u32) -> f64 {
    isotope_mz(
        monoisotopic_mass,
        charge,
        most_abundant_isotope_index(monoisotopic_mass),
    )
}
