use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use lcmscore::{
    aminoacid::AminoAcid,
    modification::{DEFAULT_MASS_TOLERANCE, Modification, ModificationLog, ModificationRegistry},
    sequence::{Residue, Sequence, SequenceError, strip_flanking},
};
use tracing::{debug, instrument};

use crate::{
    error::IdentError,
    format::IdFileFormat,
    ignore::IgnoreMatch,
    prsm::{PrSm, fan_out, modification_text},
    reader::{IdentificationReader, Progress, ReadOptions, ReadOutcome, check_extension},
    tsv::{TsvReader, open_file},
};

/// Reads PHRP synopsis files (`<dataset>_syn.txt`) together with their companion files when
/// present:
/// * `<dataset>_syn_ModSummary.txt` defines the modification symbols used in the peptides,
/// * `<dataset>_syn_ResultToSeqMap.txt` and `<dataset>_syn_SeqToProteinMap.txt` list all
///   proteins for each result, without them only the `Protein` column is used.
///
/// Lower scores are better.
#[derive(Debug)]
pub struct PhrpSynopsisReader {
    path: PathBuf,
    registry: Arc<ModificationRegistry>,
}

/// How a modification from the summary file is placed on a peptide
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Placement {
    /// Marked by its symbol after the modified residue
    Dynamic,
    /// On every residue of the target residues
    Static,
    /// On the N or C terminal residue
    Terminal,
    /// Isotopic labels are not modifications of single residues
    Isotopic,
}

#[derive(Clone, Debug)]
struct SummaryEntry {
    modification: Arc<Modification>,
    placement: Placement,
    targets: String,
}

#[derive(Debug, Default)]
struct ModSummary {
    dynamic: HashMap<char, SummaryEntry>,
    fixed: Vec<SummaryEntry>,
}

impl PhrpSynopsisReader {
    /// Create a reader for a `_syn.txt` file
    /// # Errors
    /// If the file is not a `.txt` file
    pub fn new(
        path: impl Into<PathBuf>,
        registry: Arc<ModificationRegistry>,
    ) -> Result<Self, IdentError> {
        let path = path.into();
        check_extension(&path, &["txt"])?;
        Ok(Self { path, registry })
    }

    /// The path of a companion file with the given suffix, eg `ModSummary`
    fn companion(&self, suffix: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!("{stem}_{suffix}.txt"))
    }

    /// Resolve a modification by name and mass, by mass alone, or register a new mass only
    /// modification
    fn resolve(&self, name: &str, mass: f64, log: &mut ModificationLog) -> Arc<Modification> {
        self.registry
            .resolve_by_name(name)
            .filter(|m| (m.mass() - mass).abs() <= DEFAULT_MASS_TOLERANCE)
            .or_else(|| self.registry.resolve_by_mass(mass, DEFAULT_MASS_TOLERANCE))
            .unwrap_or_else(|| self.registry.register_unnamed_tracked(mass, log))
    }

    fn read_mod_summary(&self, log: &mut ModificationLog) -> Result<ModSummary, IdentError> {
        let path = self.companion("ModSummary");
        let mut summary = ModSummary::default();
        if !path.exists() {
            debug!(path = %path.display(), "no modification summary");
            return Ok(summary);
        }
        let (reader, _) = open_file(&path)?;
        let tsv = TsvReader::new(reader, '\t', path.display().to_string(), None)?;
        let symbol = tsv.column("Modification_Symbol")?;
        let mass = tsv.column("Modification_Mass")?;
        let targets = tsv.column("Target_Residues")?;
        let kind = tsv.column("Modification_Type")?;
        let name = tsv.first_present(&["Mass_Correction_Tag"]);
        for line in tsv {
            let line = line?;
            let mass_value: f64 = line.parse(&mass)?;
            let placement = match line.get(&kind)? {
                "D" => Placement::Dynamic,
                "S" => Placement::Static,
                "T" | "P" => Placement::Terminal,
                "I" => Placement::Isotopic,
                other => return Err(line.parse_error(&kind, other)),
            };
            let entry = SummaryEntry {
                modification: self.resolve(
                    line.get_optional(name.as_ref()).unwrap_or_default(),
                    mass_value,
                    log,
                ),
                placement,
                targets: line.get(&targets)?.to_string(),
            };
            match (placement, line.get(&symbol)?.chars().next()) {
                (Placement::Dynamic, Some(character)) => {
                    summary.dynamic.insert(character, entry);
                }
                (Placement::Dynamic, None) => {
                    return Err(line.parse_error(&symbol, ""));
                }
                (Placement::Isotopic, _) => (),
                _ => summary.fixed.push(entry),
            }
        }
        Ok(summary)
    }

    /// All proteins for each result ID, only if both map files exist
    fn read_protein_maps(&self) -> Result<HashMap<usize, Vec<String>>, IdentError> {
        let result_path = self.companion("ResultToSeqMap");
        let protein_path = self.companion("SeqToProteinMap");
        let mut proteins = HashMap::new();
        if !result_path.exists() || !protein_path.exists() {
            return Ok(proteins);
        }

        let (reader, _) = open_file(&protein_path)?;
        let tsv = TsvReader::new(reader, '\t', protein_path.display().to_string(), None)?;
        let sequence_id = tsv.column("Unique_Seq_ID")?;
        let protein = tsv.column("Protein_Name")?;
        let mut by_sequence: HashMap<usize, Vec<String>> = HashMap::new();
        for line in tsv {
            let line = line?;
            by_sequence
                .entry(line.parse(&sequence_id)?)
                .or_default()
                .push(line.get(&protein)?.to_string());
        }

        let (reader, _) = open_file(&result_path)?;
        let tsv = TsvReader::new(reader, '\t', result_path.display().to_string(), None)?;
        let result_id = tsv.column("Result_ID")?;
        let sequence_id = tsv.column("Unique_Seq_ID")?;
        for line in tsv {
            let line = line?;
            let sequence: usize = line.parse(&sequence_id)?;
            if let Some(list) = by_sequence.get(&sequence) {
                proteins.insert(line.parse(&result_id)?, list.clone());
            }
        }
        Ok(proteins)
    }

    fn parse_peptide(peptide: &str, summary: &ModSummary) -> Result<Sequence, SequenceError> {
        let text = strip_flanking(peptide);
        let mut residues: Vec<Residue> = Vec::with_capacity(text.len());
        let mut n_term = None;
        for (position, c) in text.char_indices() {
            if let Ok(amino_acid) = AminoAcid::try_from(c) {
                residues.push(Residue::new(amino_acid));
            } else if let Some(entry) = summary.dynamic.get(&c) {
                match residues.last_mut() {
                    Some(residue) if entry.targets != "<" => {
                        residue.modification = Some(entry.modification.clone());
                    }
                    _ => n_term = Some(entry.modification.clone()),
                }
            } else if c.is_ascii_uppercase() {
                return Err(SequenceError::InvalidResidue {
                    residue: c,
                    position,
                    sequence: peptide.to_string(),
                });
            } else {
                return Err(SequenceError::InvalidModification {
                    name: c.to_string(),
                });
            }
        }
        let mut sequence: Sequence = residues.into_iter().collect();
        for entry in &summary.fixed {
            apply_fixed(&mut sequence, entry)?;
        }
        if let Some(n_term) = n_term {
            sequence.set_modification(0, n_term)?;
        }
        Ok(sequence)
    }
}

/// Place a static or terminal modification on all matching residues that are not yet modified
fn apply_fixed(sequence: &mut Sequence, entry: &SummaryEntry) -> Result<(), SequenceError> {
    let length = sequence.len();
    let mut positions = Vec::new();
    for target in entry.targets.chars() {
        match target {
            '<' | '[' if sequence.n_term().is_none() => positions.push(0),
            '>' | ']' if length > 0 => positions.push(length),
            _ if entry.placement == Placement::Static => positions.extend(
                sequence
                    .residues()
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.amino_acid.one_letter_code() == target)
                    .map(|(i, _)| i + 1),
            ),
            _ => (),
        }
    }
    for position in positions {
        let free = position == 0
            || sequence.residues()[position - 1].modification.is_none();
        if free {
            sequence.set_modification(position, entry.modification.clone())?;
        }
    }
    Ok(())
}

impl IdentificationReader for PhrpSynopsisReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> IdFileFormat {
        IdFileFormat::PhrpSynopsis
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    fn read_with_progress(
        &self,
        options: &ReadOptions,
        progress: &mut dyn Progress,
    ) -> Result<ReadOutcome, IdentError> {
        let mut log = ModificationLog::default();
        let summary = self.read_mod_summary(&mut log)?;
        let protein_map = self.read_protein_maps()?;

        let (reader, size) = open_file(&self.path)?;
        let mut tsv = TsvReader::new(reader, '\t', self.path.display().to_string(), Some(size))?;
        tsv.require(&["ResultID", "Scan", "Charge", "Peptide", "Protein"])?;
        let result_id = tsv.column("ResultID")?;
        let scan_column = tsv.column("Scan")?;
        let charge = tsv.column("Charge")?;
        let peptide = tsv.column("Peptide")?;
        let protein = tsv.column("Protein")?;
        let score = tsv.first_required(&[
            "MSGFDB_SpecEValue",
            "SpecEValue",
            "MSGFDB_SpecProb",
            "SpecProb",
            "EValue",
        ])?;
        let q_value = tsv.first_present(&["QValue", "PepQValue"]);

        let mut records = Vec::new();
        while let Some(line) = tsv.next() {
            let line = line?;
            let scan = line.parse(&scan_column)?;
            if options.accepts_scan(scan) {
                let raw_sequence = line.get(&peptide)?;
                let sequence = Self::parse_peptide(raw_sequence, &summary).map_err(|e| {
                    IdentError::sequence(self.path.display(), line.line_number(), e)
                })?;
                let modifications = modification_text(&sequence);
                if !IgnoreMatch::Substring.is_ignored(&modifications, &options.ignore_list) {
                    let id: usize = line.parse(&result_id)?;
                    let listed = line.get(&protein)?.to_string();
                    let mut proteins = vec![listed.clone()];
                    if let Some(mapped) = protein_map.get(&id) {
                        proteins.extend(mapped.iter().filter(|p| **p != listed).cloned());
                    }
                    let template = PrSm {
                        scan,
                        charge: line.parse(&charge)?,
                        raw_sequence: raw_sequence.to_string(),
                        sequence,
                        modifications,
                        score: line.parse(&score)?,
                        q_value: line.parse_optional(q_value.as_ref())?.unwrap_or_default(),
                        use_golf_scoring: true,
                        ..PrSm::default()
                    };
                    records.extend(fan_out(
                        template,
                        proteins.into_iter().map(|p| (p, String::new())),
                    ));
                }
            }
            if let Some(percent) = tsv.percent() {
                progress.report(percent);
            }
        }
        Ok(ReadOutcome::new(records, log, &self.path))
    }
}
