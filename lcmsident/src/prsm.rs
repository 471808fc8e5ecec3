//! The uniform identification record all readers produce.

use std::collections::BTreeMap;

use itertools::Itertools;
use lcmscore::{constants::PROTON, sequence::Sequence};
use serde::{Deserialize, Serialize};

/// A protein-spectrum match: one peptide (or proteoform) matched to one spectrum for one protein
/// accession. A line in an identification file listing multiple proteins results in one
/// `PrSm` per protein, see [`fan_out`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PrSm {
    /// The scan number of the matched spectrum
    pub scan: usize,
    /// The precursor charge, 0 means there is no identification
    pub charge: u32,
    /// The sequence as written in the file, including any modification annotation
    pub raw_sequence: String,
    /// The parsed sequence
    pub sequence: Sequence,
    /// The modification text as written in the file (format dependent)
    pub modifications: String,
    /// The protein accession
    pub protein_name: String,
    /// The protein description
    pub protein_desc: String,
    /// The score, see [`Self::use_golf_scoring`] for its direction
    pub score: f64,
    /// The q-value (0-1)
    pub q_value: f64,
    /// The raw file this match belongs to, set by the caller
    pub raw_file_name: Option<String>,
    /// If this is a heavy labelled match
    pub heavy: bool,
    /// If a lower score is better
    pub use_golf_scoring: bool,
}

impl PrSm {
    /// The monoisotopic mass of the sequence
    pub fn mass(&self) -> f64 {
        self.sequence.monoisotopic_mass()
    }

    /// The monoisotopic precursor m/z, `None` for charge 0
    pub fn precursor_mz(&self) -> Option<f64> {
        (self.charge > 0).then(|| {
            let charge = f64::from(self.charge);
            charge.mul_add(PROTON, self.mass()) / charge
        })
    }

    /// If this match scores better than the other one, taking the scoring direction into
    /// account. Matches with charge 0 are never better.
    pub fn is_better_than(&self, other: &Self) -> bool {
        if self.charge == 0 {
            false
        } else if other.charge == 0 {
            true
        } else if self.use_golf_scoring {
            self.score < other.score
        } else {
            self.score > other.score
        }
    }
}

/// The modifications of a sequence in MSPathFinder notation: `name position` separated by
/// commas, position 0 is the N-terminus
pub fn modification_text(sequence: &Sequence) -> String {
    sequence
        .modifications()
        .map(|(position, modification)| format!("{modification} {position}"))
        .join(",")
}

/// Split a `;` separated protein list with its matching description list into pairs. Empty
/// accessions are dropped, missing descriptions are empty.
pub fn split_proteins(proteins: &str, descriptions: &str) -> Vec<(String, String)> {
    let mut descriptions = descriptions.split(';');
    proteins
        .split(';')
        .map(|protein| {
            (
                protein.trim().to_string(),
                descriptions.next().unwrap_or_default().trim().to_string(),
            )
        })
        .filter(|(protein, _)| !protein.is_empty())
        .collect()
}

/// Create one record per protein from the template record. Without any protein a single record
/// with an empty accession is returned.
pub fn fan_out(
    template: PrSm,
    proteins: impl IntoIterator<Item = (String, String)>,
) -> Vec<PrSm> {
    let mut proteins = proteins.into_iter().peekable();
    if proteins.peek().is_none() {
        return vec![template];
    }
    proteins
        .map(|(protein_name, protein_desc)| PrSm {
            protein_name,
            protein_desc,
            ..template.clone()
        })
        .collect()
}

/// Keep the best scoring record for each scan, sorted by scan number. Ties keep the first.
pub fn best_per_scan(records: &[PrSm]) -> Vec<PrSm> {
    let mut best: BTreeMap<usize, &PrSm> = BTreeMap::new();
    for record in records {
        best.entry(record.scan)
            .and_modify(|current| {
                if record.is_better_than(*current) {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    best.into_values().cloned().collect()
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn record(scan: usize, score: f64, golf: bool) -> PrSm {
        PrSm {
            scan,
            charge: 2,
            score,
            use_golf_scoring: golf,
            ..PrSm::default()
        }
    }

    #[test]
    fn protein_lists() {
        assert_eq!(
            split_proteins("PROT1;PROT2", "Desc1;Desc2"),
            vec![
                ("PROT1".to_string(), "Desc1".to_string()),
                ("PROT2".to_string(), "Desc2".to_string())
            ]
        );
        assert_eq!(
            split_proteins("PROT1;;PROT2;", "Desc1"),
            vec![
                ("PROT1".to_string(), "Desc1".to_string()),
                ("PROT2".to_string(), String::new())
            ]
        );
    }

    #[test]
    fn fan_out_copies_everything_but_the_protein() {
        let template = record(100, 12.0, false);
        let records = fan_out(template.clone(), split_proteins("A;B;C", "a;b;c"));
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].protein_name, "A");
        assert_eq!(records[1].protein_desc, "b");
        assert!(records.iter().all(|r| r.scan == 100 && r.score == 12.0));
        assert_eq!(fan_out(template, Vec::new()).len(), 1);
    }

    #[test]
    fn modification_notation() {
        let registry = lcmscore::modification::ModificationRegistry::with_defaults();
        let mut sequence = Sequence::from_unmodified("PEPTIDE").unwrap();
        assert_eq!(modification_text(&sequence), "");
        sequence
            .set_modification(3, registry.resolve_by_name("Oxidation").unwrap())
            .unwrap();
        sequence
            .set_modification(0, registry.resolve_by_name("Acetyl").unwrap())
            .unwrap();
        assert_eq!(modification_text(&sequence), "Acetyl 0,Oxidation 3");
    }

    #[test]
    fn scoring_direction() {
        assert!(record(1, 10.0, false).is_better_than(&record(1, 5.0, false)));
        assert!(record(1, 1e-10, true).is_better_than(&record(1, 1e-5, true)));
        let mut empty = record(1, 100.0, false);
        empty.charge = 0;
        assert!(!empty.is_better_than(&record(1, 1.0, false)));
        assert!(record(1, 1.0, false).is_better_than(&empty));
        assert_eq!(empty.precursor_mz(), None);
    }

    #[test]
    fn best_scoring_per_scan() {
        let records = vec![
            record(7, 1.0, false),
            record(3, 2.0, false),
            record(7, 5.0, false),
            record(3, 1.0, false),
        ];
        let best = best_per_scan(&records);
        assert_eq!(best.len(), 2);
        assert_eq!((best[0].scan, best[0].score), (3, 2.0));
        assert_eq!((best[1].scan, best[1].score), (7, 5.0));
    }
}
