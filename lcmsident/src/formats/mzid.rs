use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use flate2::read::GzDecoder;
use lcmscore::{
    modification::{DEFAULT_MASS_TOLERANCE, Modification, ModificationLog, ModificationRegistry},
    sequence::Sequence,
};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::IdentError,
    format::IdFileFormat,
    ignore::IgnoreMatch,
    prsm::{PrSm, fan_out, modification_text},
    reader::{IdentificationReader, Progress, ReadOptions, ReadOutcome, check_extension},
};

/// The quality thresholds applied while reading mzIdentML files. Identifications with a higher
/// q-value or spectral E-value are left out.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct MzIdentMlThresholds {
    /// The maximal q-value
    pub max_q_value: f64,
    /// The maximal spectral E-value (spectral probability)
    pub max_spec_e_value: f64,
}

impl Default for MzIdentMlThresholds {
    fn default() -> Self {
        Self {
            max_q_value: 1.0,
            max_spec_e_value: 1.0,
        }
    }
}

/// Reads bottom-up mzIdentML files (`.mzid` or `.mzid.gz`). The score is the spectral E-value,
/// lower is better.
#[derive(Debug)]
pub struct MzIdentMlReader {
    path: PathBuf,
    registry: Arc<ModificationRegistry>,
    thresholds: MzIdentMlThresholds,
}

const SPEC_E_VALUE: (&[&str], &[&str]) = (
    &["MS-GF:SpecEValue", "MS-GF:SpecProb"],
    &["MS:1002052", "MS:1002050"],
);
const Q_VALUE: (&[&str], &[&str]) = (
    &["MS-GF:QValue", "PSM-level q-value"],
    &["MS:1002054", "MS:1002354"],
);
const SCAN_NUMBER: (&[&str], &[&str]) = (&["scan number(s)"], &["MS:1000797"]);
const PROTEIN_DESCRIPTION: (&[&str], &[&str]) = (&["protein description"], &["MS:1001088"]);

struct PeptideEntry {
    sequence: Sequence,
    modifications: String,
}

struct Evidence<'a> {
    protein: &'a str,
    pre: &'a str,
    post: &'a str,
}

impl MzIdentMlReader {
    /// Create a reader for a `.mzid` or `.mzid.gz` file with the default thresholds
    /// # Errors
    /// If the file has any other extension
    pub fn new(
        path: impl Into<PathBuf>,
        registry: Arc<ModificationRegistry>,
    ) -> Result<Self, IdentError> {
        let path = path.into();
        check_extension(&path, &["mzid", "mzid.gz"])?;
        Ok(Self {
            path,
            registry,
            thresholds: MzIdentMlThresholds::default(),
        })
    }

    /// Use different quality thresholds
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: MzIdentMlThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    fn load(&self) -> Result<String, IdentError> {
        let file = File::open(&self.path).map_err(|e| IdentError::io(self.path.display(), e))?;
        let mut text = String::new();
        let read = if check_extension(&self.path, &["gz"]).is_ok() {
            GzDecoder::new(BufReader::new(file)).read_to_string(&mut text)
        } else {
            BufReader::new(file).read_to_string(&mut text)
        };
        read.map_err(|e| IdentError::io(self.path.display(), e))?;
        Ok(text)
    }

    fn file(&self) -> String {
        self.path.display().to_string()
    }

    fn resolve(
        &self,
        name: Option<&str>,
        mass: Option<f64>,
        log: &mut ModificationLog,
    ) -> Option<Arc<Modification>> {
        name.and_then(|n| self.registry.resolve_by_name(n))
            .or_else(|| {
                mass.and_then(|m| self.registry.resolve_by_mass(m, DEFAULT_MASS_TOLERANCE))
            })
            .or_else(|| match (name, mass) {
                (Some(name), Some(mass)) => Some(self.registry.register_tracked(name, mass, log)),
                (None, Some(mass)) => Some(self.registry.register_unnamed_tracked(mass, log)),
                _ => None,
            })
    }

    fn parse_peptide(
        &self,
        node: Node<'_, '_>,
        log: &mut ModificationLog,
    ) -> Result<PeptideEntry, IdentError> {
        let plain: String = node
            .children()
            .find(|c| c.has_tag_name("PeptideSequence"))
            .and_then(|c| c.text())
            .unwrap_or_default()
            .split_whitespace()
            .collect();
        let line = line_of(node);
        let mut sequence = Sequence::from_unmodified(&plain)
            .map_err(|e| IdentError::sequence(self.file(), line, e))?;
        for modification in node.children().filter(|c| c.has_tag_name("Modification")) {
            let location: usize = self.attribute(modification, "location")?.unwrap_or(0);
            let mass: Option<f64> = self.attribute(modification, "monoisotopicMassDelta")?;
            let name = modification
                .children()
                .filter(|c| c.has_tag_name("cvParam"))
                .filter_map(|c| c.attribute("name"))
                .find(|n| *n != "unknown modification");
            let Some(resolved) = self.resolve(name, mass, log) else {
                return Err(IdentError::InvalidModification {
                    name: name.unwrap_or_default().to_string(),
                });
            };
            // Location length + 1 is the C-terminus, placed on the last residue
            let position = if location == sequence.len() + 1 {
                sequence.len()
            } else {
                location
            };
            sequence
                .set_modification(position, resolved)
                .map_err(|e| IdentError::sequence(self.file(), line, e))?;
        }
        Ok(PeptideEntry {
            modifications: modification_text(&sequence),
            sequence,
        })
    }

    fn attribute<T: FromStr>(
        &self,
        node: Node<'_, '_>,
        name: &str,
    ) -> Result<Option<T>, IdentError> {
        node.attribute(name)
            .map(|value| {
                value.trim().parse().map_err(|_| IdentError::ParseField {
                    file: self.file(),
                    line: line_of(node),
                    column: name.to_string(),
                    value: value.to_string(),
                    source_line: None,
                })
            })
            .transpose()
    }

    fn cv_value<T: FromStr>(
        &self,
        node: Node<'_, '_>,
        (names, accessions): (&[&str], &[&str]),
    ) -> Result<Option<T>, IdentError> {
        node.children()
            .filter(|c| c.has_tag_name("cvParam") || c.has_tag_name("userParam"))
            .find(|c| {
                c.attribute("name").is_some_and(|n| names.contains(&n))
                    || c.attribute("accession").is_some_and(|a| accessions.contains(&a))
            })
            .map(|c| self.attribute(c, "value"))
            .transpose()
            .map(Option::flatten)
    }

    fn scan_number(&self, result: Node<'_, '_>) -> Result<usize, IdentError> {
        if let Some(scan) = self.cv_value::<String>(result, SCAN_NUMBER)? {
            // Multiple scans are space separated, the first one is used
            if let Some(scan) = scan.split_whitespace().next().and_then(|s| s.parse().ok()) {
                return Ok(scan);
            }
        }
        let id = result.attribute("spectrumID").unwrap_or_default();
        Ok(id
            .split_whitespace()
            .find_map(|part| part.strip_prefix("scan="))
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| {
                debug!(spectrum = id, "no scan number for spectrum");
                0
            }))
    }

    fn parse(
        &self,
        document: &Document<'_>,
        options: &ReadOptions,
        progress: &mut dyn Progress,
    ) -> Result<ReadOutcome, IdentError> {
        let mut log = ModificationLog::default();
        let root = document.root_element();

        let mut proteins = HashMap::new();
        for node in root.descendants().filter(|n| n.has_tag_name("DBSequence")) {
            let description = self
                .cv_value::<String>(node, PROTEIN_DESCRIPTION)?
                .unwrap_or_default();
            proteins.insert(
                node.attribute("id").unwrap_or_default(),
                (node.attribute("accession").unwrap_or_default(), description),
            );
        }

        let mut peptides = HashMap::new();
        for node in root.descendants().filter(|n| n.has_tag_name("Peptide")) {
            peptides.insert(
                node.attribute("id").unwrap_or_default(),
                self.parse_peptide(node, &mut log)?,
            );
        }

        let evidences: HashMap<&str, Evidence<'_>> = root
            .descendants()
            .filter(|n| n.has_tag_name("PeptideEvidence"))
            .map(|node| {
                (
                    node.attribute("id").unwrap_or_default(),
                    Evidence {
                        protein: node.attribute("dBSequence_ref").unwrap_or_default(),
                        pre: node.attribute("pre").unwrap_or("-"),
                        post: node.attribute("post").unwrap_or("-"),
                    },
                )
            })
            .collect();

        let results: Vec<_> = root
            .descendants()
            .filter(|n| n.has_tag_name("SpectrumIdentificationResult"))
            .collect();
        let mut records = Vec::new();
        for (index, result) in results.iter().enumerate() {
            let scan = self.scan_number(*result)?;
            if !options.accepts_scan(scan) {
                continue;
            }
            for item in result
                .children()
                .filter(|c| c.has_tag_name("SpectrumIdentificationItem"))
            {
                let score: f64 = self.cv_value(item, SPEC_E_VALUE)?.unwrap_or_default();
                let q_value: f64 = self.cv_value(item, Q_VALUE)?.unwrap_or_default();
                if q_value > self.thresholds.max_q_value
                    || score > self.thresholds.max_spec_e_value
                {
                    continue;
                }
                let Some(peptide) = item.attribute("peptide_ref").and_then(|p| peptides.get(p))
                else {
                    debug!(line = line_of(item), "identification without a known peptide");
                    continue;
                };
                if IgnoreMatch::Substring.is_ignored(&peptide.modifications, &options.ignore_list)
                {
                    continue;
                }
                let item_evidences: Vec<&Evidence<'_>> = item
                    .children()
                    .filter(|c| c.has_tag_name("PeptideEvidenceRef"))
                    .filter_map(|c| c.attribute("peptideEvidence_ref"))
                    .filter_map(|id| evidences.get(id))
                    .collect();
                let (pre, post) = item_evidences.first().map_or(("-", "-"), |e| (e.pre, e.post));
                let template = PrSm {
                    scan,
                    charge: self.attribute(item, "chargeState")?.unwrap_or_default(),
                    raw_sequence: format!("{pre}.{}.{post}", peptide.sequence),
                    sequence: peptide.sequence.clone(),
                    modifications: peptide.modifications.clone(),
                    score,
                    q_value,
                    use_golf_scoring: true,
                    ..PrSm::default()
                };
                records.extend(fan_out(
                    template,
                    item_evidences.iter().filter_map(|e| {
                        proteins
                            .get(e.protein)
                            .map(|(accession, description)| {
                                ((*accession).to_string(), description.clone())
                            })
                    }),
                ));
            }
            #[allow(clippy::cast_precision_loss)]
            let percent = (index + 1) as f64 / results.len() as f64 * 100.0;
            progress.report(percent);
        }
        Ok(ReadOutcome::new(records, log, &self.path))
    }
}

/// The line (1 based) a node starts on
fn line_of(node: Node<'_, '_>) -> usize {
    node.document().text_pos_at(node.range().start).row as usize
}

impl IdentificationReader for MzIdentMlReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> IdFileFormat {
        IdFileFormat::MzIdentMl
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    fn read_with_progress(
        &self,
        options: &ReadOptions,
        progress: &mut dyn Progress,
    ) -> Result<ReadOutcome, IdentError> {
        let text = self.load()?;
        let document = Document::parse(&text).map_err(|source| IdentError::Xml {
            file: self.file(),
            source,
        })?;
        self.parse(&document, options, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mzid");
        std::fs::write(
            &path,
            r#"<MzIdentML xmlns="http://psidev.info/psi/pi/mzIdentML/1.1">
<SequenceCollection>
  <DBSequence id="DBSeq1" accession="P1"/>
  <Peptide id="Pep1"><PeptideSequence>PEPTIDE</PeptideSequence></Peptide>
  <PeptideEvidence id="PE1" dBSequence_ref="DBSeq1" peptide_ref="Pep1" pre="K" post="R"/>
</SequenceCollection>
<DataCollection><AnalysisData><SpectrumIdentificationList id="SIL1">
  <SpectrumIdentificationResult id="SIR1" spectrumID="scan=5">
    <SpectrumIdentificationItem id="SII1" chargeState="2" peptide_ref="Pep1" rank="1">
      <PeptideEvidenceRef peptideEvidence_ref="PE1"/>
      <cvParam accession="MS:1002052" name="MS-GF:SpecEValue" value="1e-10"/>
      <cvParam accession="MS:1002054" name="MS-GF:QValue" value="0.2"/>
    </SpectrumIdentificationItem>
  </SpectrumIdentificationResult>
</SpectrumIdentificationList></AnalysisData></DataCollection>
</MzIdentML>"#,
        )
        .unwrap();
        let registry = Arc::new(ModificationRegistry::with_defaults());
        let reader = MzIdentMlReader::new(&path, registry.clone()).unwrap();
        let outcome = reader.read(&ReadOptions::default()).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].scan, 5);
        assert_eq!(outcome.records[0].raw_sequence, "K.PEPTIDE.R");

        let strict = MzIdentMlReader::new(&path, registry)
            .unwrap()
            .with_thresholds(MzIdentMlThresholds {
                max_q_value: 0.01,
                ..MzIdentMlThresholds::default()
            });
        assert!(strict.read(&ReadOptions::default()).unwrap().records.is_empty());
    }

    #[test]
    fn invalid_xml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mzid");
        std::fs::write(&path, "<MzIdentML><Peptide></MzIdentML>").unwrap();
        let registry = Arc::new(ModificationRegistry::with_defaults());
        assert!(matches!(
            MzIdentMlReader::new(&path, registry)
                .unwrap()
                .read(&ReadOptions::default()),
            Err(IdentError::Xml { .. })
        ));
    }
}
