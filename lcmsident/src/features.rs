//! Reading MS1 feature files: isotope envelopes tracked over a range of scans.

use std::{io::BufRead, path::Path};

use lcmscore::averagine::most_abundant_isotope_mz;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::IdentError,
    tsv::{TsvReader, open_file},
};

/// One peak of an observed isotope envelope
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Isotope {
    /// The isotope index, 0 is monoisotopic
    pub index: usize,
    /// The intensity relative to the most abundant peak
    pub ratio: f64,
}

/// One end of a feature
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FeaturePoint {
    /// The feature ID, -1 when the file has none
    pub id: i64,
    /// The scan number
    pub scan: usize,
    /// The monoisotopic mass
    pub mass: f64,
    /// The m/z of the most abundant isotope at this charge
    pub mz: f64,
    /// The charge
    pub charge: u32,
    /// The abundance of the whole feature
    pub abundance: f64,
    /// The likelihood ratio or probability of the feature
    pub score: f64,
    /// The summed correlation of the envelope, 0 when the file has none
    pub correlation: f64,
    /// The envelope, malformed entries are `None`
    pub isotopes: Vec<Option<Isotope>>,
}

/// A feature bounded by its first and last scan
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Feature {
    /// The point at the first scan, with the lowest charge
    pub min_point: FeaturePoint,
    /// The point at the last scan, with the highest charge
    pub max_point: FeaturePoint,
}

impl Feature {
    /// The feature ID
    pub const fn id(&self) -> i64 {
        self.min_point.id
    }

    /// The monoisotopic mass
    pub const fn mass(&self) -> f64 {
        self.min_point.mass
    }
}

/// Parse an envelope written as `index,ratio` entries separated by `;`
pub fn parse_envelope(text: &str) -> Vec<Option<Isotope>> {
    text.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let isotope = entry.split_once(',').and_then(|(index, ratio)| {
                Some(Isotope {
                    index: index.trim().parse().ok()?,
                    ratio: ratio.trim().parse().ok()?,
                })
            });
            if isotope.is_none() {
                warn!(entry, "malformed isotope entry");
            }
            isotope
        })
        .collect()
}

/// Read a feature file with the given delimiter
/// # Errors
/// If the file could not be read, a column is missing or a value is invalid
pub fn read_features(path: impl AsRef<Path>, delimiter: char) -> Result<Vec<Feature>, IdentError> {
    let path = path.as_ref();
    let (reader, size) = open_file(path)?;
    parse_features(reader, delimiter, &path.display().to_string(), Some(size))
}

/// Parse features from a reader, `source` is used in error messages
/// # Errors
/// If the reader fails, a column is missing or a value is invalid
pub fn parse_features(
    reader: impl BufRead,
    delimiter: char,
    source: &str,
    total_bytes: Option<u64>,
) -> Result<Vec<Feature>, IdentError> {
    let tsv = TsvReader::new(reader, delimiter, source, total_bytes)?;
    let mass_column = tsv.column("MonoMass")?;
    let abundance = tsv.column("Abundance")?;
    let score = tsv.first_required(&["LikelihoodRatio", "Probability"])?;
    let envelope = tsv.column("Envelope")?;
    let min_charge_column = tsv.column("MinCharge")?;
    let max_charge_column = tsv.column("MaxCharge")?;
    let min_scan = tsv.column("MinScan")?;
    let max_scan = tsv.column("MaxScan")?;
    let id = tsv.first_present(&["FeatureID"]);
    let correlation = tsv.first_present(&["SummedCorr"]);

    let mut features = Vec::new();
    for line in tsv {
        let line = line?;
        let mass: f64 = line.parse(&mass_column)?;
        let min_charge: u32 = line.parse(&min_charge_column)?;
        let max_charge: u32 = line.parse(&max_charge_column)?;
        let min_point = FeaturePoint {
            id: line.parse_optional(id.as_ref())?.unwrap_or(-1),
            scan: line.parse(&min_scan)?,
            mass,
            mz: most_abundant_isotope_mz(mass, min_charge),
            charge: min_charge,
            abundance: line.parse(&abundance)?,
            score: line.parse(&score)?,
            correlation: line.parse_optional(correlation.as_ref())?.unwrap_or(0.0),
            isotopes: parse_envelope(line.get(&envelope)?),
        };
        let max_point = FeaturePoint {
            scan: line.parse(&max_scan)?,
            mz: most_abundant_isotope_mz(mass, max_charge),
            charge: max_charge,
            ..min_point.clone()
        };
        features.push(Feature {
            min_point,
            max_point,
        });
    }
    info!(source, features = features.len(), "read features");
    Ok(features)
}
