use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use lcmscore::{
    modification::{ModificationLog, ModificationRegistry},
    sequence::Sequence,
};
use rusqlite::{Connection, OpenFlags, Row};
use tracing::instrument;

use crate::{
    error::IdentError,
    format::IdFileFormat,
    ignore::IgnoreMatch,
    prsm::{PrSm, fan_out, modification_text},
    reader::{IdentificationReader, Progress, ReadOptions, ReadOutcome, check_extension},
};

/// A table row that can be read from an MTDB database
trait FromSql: Sized {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error>;

    fn get_sql() -> &'static str;

    fn read_from(connection: &Connection) -> Result<Vec<Self>, rusqlite::Error> {
        let mut statement = connection.prepare(Self::get_sql())?;
        let rows = statement.query_map([], |row| Self::from_row(row))?;
        rows.collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
struct SqlEvidence {
    consensus: i64,
    scan: usize,
    charge: u32,
    spec_prob: f64,
    sequence: String,
}

impl FromSql for SqlEvidence {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            consensus: row.get(0)?,
            scan: row.get(1)?,
            charge: row.get(2)?,
            spec_prob: row.get::<_, Option<f64>>(3)?.unwrap_or_default(),
            sequence: row.get(4)?,
        })
    }

    fn get_sql() -> &'static str {
        "SELECT e.ConsensusId, e.Scan, e.Charge, e.SpecProb, c.Sequence FROM Evidence e JOIN ConsensusTarget c ON c.Id = e.ConsensusId ORDER BY e.Id"
    }
}

#[derive(Clone, Debug, PartialEq)]
struct SqlProtein {
    consensus: i64,
    name: String,
}

impl FromSql for SqlProtein {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            consensus: row.get(0)?,
            name: row.get(1)?,
        })
    }

    fn get_sql() -> &'static str {
        "SELECT cp.ConsensusId, p.ProteinName FROM ConsensusProteinPair cp JOIN ProteinInformation p ON p.Id = cp.ProteinId ORDER BY cp.ConsensusId, p.Id"
    }
}

#[derive(Clone, Debug, PartialEq)]
struct SqlPtm {
    consensus: i64,
    name: String,
    mass: f64,
    location: usize,
}

impl FromSql for SqlPtm {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            consensus: row.get(0)?,
            name: row.get(1)?,
            mass: row.get(2)?,
            location: row.get(3)?,
        })
    }

    fn get_sql() -> &'static str {
        "SELECT cp.ConsensusId, m.Name, m.Mass, cp.Location FROM ConsensusPtmPair cp JOIN PostTranslationalModification m ON m.Id = cp.PtmId"
    }
}

/// Reads MTDB (mass and time tag database) files, SQLite databases with consensus targets,
/// their evidences, proteins and modifications. The score is the spectral probability, lower
/// is better.
///
/// Target sequences are stored with two flanking characters on both ends (`K.PEPTIDE.R`).
/// Modification locations are 1 based residue indices into the sequence without flanking
/// residues, 0 is the N-terminus.
#[derive(Debug)]
pub struct MtdbReader {
    path: PathBuf,
    registry: Arc<ModificationRegistry>,
}

impl MtdbReader {
    /// Create a reader for a `.mtdb` file
    /// # Errors
    /// If the file has any other extension
    pub fn new(
        path: impl Into<PathBuf>,
        registry: Arc<ModificationRegistry>,
    ) -> Result<Self, IdentError> {
        let path = path.into();
        check_extension(&path, &["mtdb"])?;
        Ok(Self { path, registry })
    }

    fn database_error(&self, source: rusqlite::Error) -> IdentError {
        IdentError::Database {
            file: self.path.display().to_string(),
            source,
        }
    }
}

/// Remove the two flanking characters on both ends
fn strip_target_flanks(sequence: &str) -> &str {
    if sequence.len() > 4
        && sequence.is_char_boundary(2)
        && sequence.is_char_boundary(sequence.len() - 2)
    {
        &sequence[2..sequence.len() - 2]
    } else {
        sequence
    }
}

impl IdentificationReader for MtdbReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> IdFileFormat {
        IdFileFormat::Mtdb
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    fn read_with_progress(
        &self,
        options: &ReadOptions,
        progress: &mut dyn Progress,
    ) -> Result<ReadOutcome, IdentError> {
        let (evidences, proteins, ptms) = {
            let connection =
                Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                    .map_err(|e| self.database_error(e))?;
            (
                SqlEvidence::read_from(&connection).map_err(|e| self.database_error(e))?,
                SqlProtein::read_from(&connection).map_err(|e| self.database_error(e))?,
                SqlPtm::read_from(&connection).map_err(|e| self.database_error(e))?,
            )
        };
        let mut proteins_by_target: HashMap<i64, Vec<String>> = HashMap::new();
        for protein in proteins {
            proteins_by_target
                .entry(protein.consensus)
                .or_default()
                .push(protein.name);
        }
        let mut ptms_by_target: HashMap<i64, Vec<SqlPtm>> = HashMap::new();
        for ptm in ptms {
            ptms_by_target.entry(ptm.consensus).or_default().push(ptm);
        }

        let mut log = ModificationLog::default();
        let mut targets: HashMap<i64, Sequence> = HashMap::new();
        let mut records = Vec::new();
        let file = self.path.display().to_string();
        for (index, evidence) in evidences.iter().enumerate() {
            if options.accepts_scan(evidence.scan) {
                let sequence = if let Some(sequence) = targets.get(&evidence.consensus) {
                    sequence.clone()
                } else {
                    let mut sequence =
                        Sequence::from_unmodified(strip_target_flanks(&evidence.sequence))
                            .map_err(|e| IdentError::sequence(&file, 0, e))?;
                    for ptm in ptms_by_target.get(&evidence.consensus).into_iter().flatten() {
                        let modification = self
                            .registry
                            .register_tracked(ptm.name.as_str(), ptm.mass, &mut log);
                        sequence
                            .set_modification(ptm.location, modification)
                            .map_err(|e| IdentError::sequence(&file, 0, e))?;
                    }
                    targets.insert(evidence.consensus, sequence.clone());
                    sequence
                };
                let modifications = modification_text(&sequence);
                if !IgnoreMatch::Substring.is_ignored(&modifications, &options.ignore_list) {
                    let template = PrSm {
                        scan: evidence.scan,
                        charge: evidence.charge,
                        raw_sequence: evidence.sequence.clone(),
                        sequence,
                        modifications,
                        score: evidence.spec_prob,
                        use_golf_scoring: true,
                        ..PrSm::default()
                    };
                    records.extend(fan_out(
                        template,
                        proteins_by_target
                            .get(&evidence.consensus)
                            .into_iter()
                            .flatten()
                            .map(|p| (p.clone(), String::new())),
                    ));
                }
            }
            #[allow(clippy::cast_precision_loss)]
            let percent = (index + 1) as f64 / evidences.len() as f64 * 100.0;
            progress.report(percent);
        }
        Ok(ReadOutcome::new(records, log, &self.path))
    }
}

#[cfg(test)]
mod tests {
    use lcmscore::aminoacid::AminoAcid;

    use super::*;

    #[test]
    fn flanks() {
        assert_eq!(strip_target_flanks("K.PEPTIDE.R"), "PEPTIDE");
        assert_eq!(strip_target_flanks("-.PEPTIDE.-"), "PEPTIDE");
        assert_eq!(strip_target_flanks("PEP"), "PEP");
    }

    #[test]
    fn locations_count_residues_after_the_flanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.mtdb");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE ConsensusTarget (Id INTEGER PRIMARY KEY, Sequence TEXT);
                 CREATE TABLE Evidence (Id INTEGER PRIMARY KEY, ConsensusId INTEGER, Scan INTEGER, Charge INTEGER, SpecProb REAL);
                 CREATE TABLE ProteinInformation (Id INTEGER PRIMARY KEY, ProteinName TEXT);
                 CREATE TABLE ConsensusProteinPair (ConsensusId INTEGER, ProteinId INTEGER);
                 CREATE TABLE PostTranslationalModification (Id INTEGER PRIMARY KEY, Name TEXT, Mass REAL);
                 CREATE TABLE ConsensusPtmPair (ConsensusId INTEGER, PtmId INTEGER, Location INTEGER);
                 INSERT INTO ConsensusTarget VALUES (1, 'R.GMSK.A');
                 INSERT INTO Evidence VALUES (1, 1, 5, 2, 1e-9);
                 INSERT INTO PostTranslationalModification VALUES (1, 'Oxidation', 15.994915), (2, 'Carbamyl', 43.005814);
                 INSERT INTO ConsensusPtmPair VALUES (1, 1, 2), (1, 2, 4);",
            )
            .unwrap();
        let reader =
            MtdbReader::new(&path, Arc::new(ModificationRegistry::with_defaults())).unwrap();
        let outcome = reader.read(&ReadOptions::default()).unwrap();
        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.raw_sequence, "R.GMSK.A");
        let residues = record.sequence.residues();
        assert_eq!(residues.len(), 4);
        // Location 2 is the methionine, not the glycine at index 2 of the flanked text
        assert!(residues[0].modification.is_none());
        assert_eq!(residues[1].amino_acid, AminoAcid::Methionine);
        assert_eq!(residues[1].modification.as_ref().unwrap().name(), "Oxidation");
        assert!(residues[2].modification.is_none());
        assert_eq!(residues[3].amino_acid, AminoAcid::Lysine);
        assert_eq!(residues[3].modification.as_ref().unwrap().name(), "Carbamyl");
        assert!(record.sequence.n_term().is_none());
    }

    #[test]
    fn wrong_extension() {
        let registry = Arc::new(ModificationRegistry::new());
        assert!(matches!(
            MtdbReader::new("targets.db", registry),
            Err(IdentError::UnsupportedExtension { .. })
        ));
    }
}
