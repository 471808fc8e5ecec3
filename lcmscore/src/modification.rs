//! Modifications and the registry used to resolve them while reading identification files.

use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// The default tolerance (in Dalton) used when a modification is looked up by mass only
pub const DEFAULT_MASS_TOLERANCE: f64 = 0.005;

/// A named, mass-bearing chemical change to a residue.
///
/// Modifications are shared as `Arc<Modification>`; a [`ModificationRegistry`] hands out the
/// same instance every time the same name is resolved or registered.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Modification {
    name: String,
    mass: f64,
    #[serde(default = "named_default")]
    named: bool,
}

const fn named_default() -> bool {
    true
}

impl Modification {
    /// Create a new named modification
    pub fn new(name: impl Into<String>, mass: f64) -> Self {
        Self {
            name: name.into(),
            mass,
            named: true,
        }
    }

    /// Create a modification only known by its mass, its name is the signed mass
    pub fn mass_only(mass: f64) -> Self {
        Self {
            name: mass_name(mass),
            mass,
            named: false,
        }
    }

    /// The name of this modification
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The monoisotopic mass shift in Dalton
    pub const fn mass(&self) -> f64 {
        self.mass
    }

    /// If this modification has a real name (false for mass only modifications)
    pub const fn is_named(&self) -> bool {
        self.named
    }
}

impl std::fmt::Display for Modification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The name given to a mass only modification
pub fn mass_name(mass: f64) -> String {
    format!("{mass:+.4}")
}

/// Errors while loading or storing a registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The file could not be opened or written
    #[error("could not access modification file '{path}': {source}")]
    Io {
        /// The file
        path: String,
        /// The underlying error
        source: std::io::Error,
    },
    /// The file did not contain a valid modification list
    #[error("invalid modification file '{path}': {source}")]
    Json {
        /// The file
        path: String,
        /// The underlying error
        source: serde_json::Error,
    },
}

/// The JSON layout of a stored registry
#[derive(Debug, Default, Deserialize, Serialize)]
struct RegistryFile {
    modifications: Vec<Modification>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_name: HashMap<String, Arc<Modification>>,
    aliases: HashMap<String, String>,
    /// Insertion order, used for stable mass lookups and for storing
    order: Vec<Arc<Modification>>,
}

impl RegistryInner {
    fn get(&self, name: &str) -> Option<Arc<Modification>> {
        let key = name.to_ascii_lowercase();
        self.by_name
            .get(&key)
            .or_else(|| self.aliases.get(&key).and_then(|n| self.by_name.get(n)))
            .cloned()
    }
}

/// A synchronised table of known modifications.
///
/// Readers get one of these injected (usually behind an `Arc`) and resolve modification tokens
/// against it. Modifications that are not yet known are registered into it, after which every
/// later lookup of the same name returns the same instance.
#[derive(Debug, Default)]
pub struct ModificationRegistry {
    inner: RwLock<RegistryInner>,
}

/// Commonly used modifications, name and monoisotopic mass
const DEFAULT_MODIFICATIONS: &[(&str, f64)] = &[
    ("Carbamidomethyl", 57.021_464),
    ("Oxidation", 15.994_915),
    ("Phospho", 79.966_331),
    ("Acetyl", 42.010_565),
    ("Deamidated", 0.984_016),
    ("Methyl", 14.015_650),
    ("Dimethyl", 28.031_300),
    ("Trimethyl", 42.046_950),
    ("GlyGly", 114.042_927),
    ("Amidated", -0.984_016),
    ("Gln->pyro-Glu", -17.026_549),
    ("Glu->pyro-Glu", -18.010_565),
    ("Pyro-carbamidomethyl", 39.994_915),
    ("Nitrosyl", 28.990_164),
    ("Dehydro", -1.007_825),
    ("Cysteinyl", 119.004_099),
    ("Glutathione", 305.068_156),
    ("Formyl", 27.994_915),
    ("Carbamyl", 43.005_814),
    ("Dioxidation", 31.989_829),
    ("Trioxidation", 47.984_744),
    ("Sulfo", 79.956_815),
    ("HexNAc", 203.079_373),
    ("Hex", 162.052_824),
    ("Nethylmaleimide", 125.047_679),
    ("TMT6plex", 229.162_932),
    ("iTRAQ4plex", 144.102_063),
];

/// Short names seen in result files and the modification they refer to
const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("Ox", "Oxidation"),
    ("Ph", "Phospho"),
    ("Carb", "Carbamidomethyl"),
    ("Ac", "Acetyl"),
    ("Deam", "Deamidated"),
    ("Me", "Methyl"),
    ("Me2", "Dimethyl"),
    ("Me3", "Trimethyl"),
    ("Pyro_glu", "Gln->pyro-Glu"),
    ("PyroGlu", "Gln->pyro-Glu"),
];

impl ModificationRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry filled with the commonly used modifications and their short aliases
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for (name, mass) in DEFAULT_MODIFICATIONS {
            registry.register(*name, *mass);
        }
        for (alias, name) in DEFAULT_ALIASES {
            registry.add_alias(*alias, *name);
        }
        registry
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The number of registered modifications (aliases not counted)
    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    /// If there are no modifications registered
    pub fn is_empty(&self) -> bool {
        self.read().order.is_empty()
    }

    /// All registered modifications in registration order
    pub fn modifications(&self) -> Vec<Arc<Modification>> {
        self.read().order.clone()
    }

    /// Find a modification by name or alias, case insensitive
    pub fn resolve_by_name(&self, name: &str) -> Option<Arc<Modification>> {
        self.read().get(name.trim())
    }

    /// Find the modification closest in mass to the given mass, as long as it is within the
    /// tolerance
    pub fn resolve_by_mass(&self, mass: f64, tolerance: f64) -> Option<Arc<Modification>> {
        let inner = self.read();
        inner
            .order
            .iter()
            .map(|m| ((m.mass - mass).abs(), m))
            .filter(|(diff, _)| *diff <= tolerance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, m)| m.clone())
    }

    /// Register a named modification. If the name is already known the existing instance is
    /// returned and the given mass is ignored.
    pub fn register(&self, name: impl Into<String>, mass: f64) -> Arc<Modification> {
        self.insert(Modification::new(name, mass)).0
    }

    /// Register a modification only known by its mass. If a modification with the same (rounded)
    /// mass name was registered before that instance is returned.
    pub fn register_unnamed(&self, mass: f64) -> Arc<Modification> {
        self.insert(Modification::mass_only(mass)).0
    }

    /// Register a named modification and record it in the log if it was not known before
    pub fn register_tracked(
        &self,
        name: impl Into<String>,
        mass: f64,
        log: &mut ModificationLog,
    ) -> Arc<Modification> {
        let (modification, new) = self.insert(Modification::new(name, mass));
        if new {
            log.record(modification.clone());
        }
        modification
    }

    /// Register a mass only modification and record it in the log if it was not known before
    pub fn register_unnamed_tracked(
        &self,
        mass: f64,
        log: &mut ModificationLog,
    ) -> Arc<Modification> {
        let (modification, new) = self.insert(Modification::mass_only(mass));
        if new {
            log.record(modification.clone());
        }
        modification
    }

    /// Insert under a single write lock so that two concurrent registrations of the same name
    /// end up with one instance.
    fn insert(&self, modification: Modification) -> (Arc<Modification>, bool) {
        let key = modification.name.to_ascii_lowercase();
        let mut inner = self.write();
        if let Some(existing) = inner.get(&key) {
            if (existing.mass - modification.mass).abs() > DEFAULT_MASS_TOLERANCE {
                debug!(
                    name = %modification.name,
                    known = existing.mass,
                    given = modification.mass,
                    "modification already registered with a different mass"
                );
            }
            return (existing, false);
        }
        let modification = Arc::new(modification);
        inner.by_name.insert(key, modification.clone());
        inner.order.push(modification.clone());
        (modification, true)
    }

    /// Make `alias` resolve to the modification registered as `name`. Returns false if `name` is
    /// unknown.
    pub fn add_alias(&self, alias: impl AsRef<str>, name: impl AsRef<str>) -> bool {
        let mut inner = self.write();
        let name = name.as_ref().to_ascii_lowercase();
        if inner.by_name.contains_key(&name) {
            inner
                .aliases
                .insert(alias.as_ref().to_ascii_lowercase(), name);
            true
        } else {
            false
        }
    }

    /// Add all modifications and aliases stored in the given JSON file to this registry
    /// # Errors
    /// If the file could not be read or is not a valid modification list
    pub fn extend_from_json(&self, path: impl AsRef<Path>) -> Result<usize, RegistryError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let stored: RegistryFile =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| {
                RegistryError::Json {
                    path: path.display().to_string(),
                    source,
                }
            })?;
        let mut added = 0;
        for modification in stored.modifications {
            if self.insert(modification).1 {
                added += 1;
            }
        }
        for (alias, name) in stored.aliases {
            self.add_alias(alias, name);
        }
        debug!(path = %path.display(), added, "loaded modifications");
        Ok(added)
    }

    /// Store all modifications and aliases in this registry as a JSON file
    /// # Errors
    /// If the file could not be written
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
        let path = path.as_ref();
        let stored = {
            let inner = self.read();
            RegistryFile {
                modifications: inner.order.iter().map(|m| (**m).clone()).collect(),
                aliases: inner
                    .aliases
                    .iter()
                    .map(|(a, n)| (a.clone(), n.clone()))
                    .collect(),
            }
        };
        let file = File::create(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), &stored).map_err(|source| {
            RegistryError::Json {
                path: path.display().to_string(),
                source,
            }
        })
    }
}

/// The modifications newly registered during a single read
#[derive(Clone, Debug, Default)]
pub struct ModificationLog {
    discovered: Vec<Arc<Modification>>,
}

impl ModificationLog {
    /// Record a newly registered modification, duplicates are ignored
    pub fn record(&mut self, modification: Arc<Modification>) {
        if !self
            .discovered
            .iter()
            .any(|m| Arc::ptr_eq(m, &modification))
        {
            self.discovered.push(modification);
        }
    }

    /// The recorded modifications
    pub fn modifications(&self) -> &[Arc<Modification>] {
        &self.discovered
    }

    /// If nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.discovered.is_empty()
    }

    /// Take the recorded modifications
    pub fn into_inner(self) -> Vec<Arc<Modification>> {
        self.discovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_aliases() {
        let registry = ModificationRegistry::with_defaults();
        let oxidation = registry.resolve_by_name("Oxidation").unwrap();
        assert!(Arc::ptr_eq(
            &oxidation,
            &registry.resolve_by_name("ox").unwrap()
        ));
        assert!(Arc::ptr_eq(
            &oxidation,
            &registry.resolve_by_name("OXIDATION").unwrap()
        ));
        assert!(registry.resolve_by_name("NotAModification").is_none());
    }

    #[test]
    fn registering_reuses_instances() {
        let registry = ModificationRegistry::new();
        let first = registry.register("Custom", 12.0);
        let second = registry.register("custom", 13.0);
        assert!(Arc::ptr_eq(&first, &second));
        assert!((second.mass() - 12.0).abs() < f64::EPSILON);
        assert_eq!(registry.len(), 1);

        let mut log = ModificationLog::default();
        let third = registry.register_tracked("Custom", 12.0, &mut log);
        assert!(Arc::ptr_eq(&first, &third));
        assert!(log.is_empty());
        registry.register_tracked("Other", 1.0, &mut log);
        assert_eq!(log.modifications().len(), 1);
    }

    #[test]
    fn mass_lookup() {
        let registry = ModificationRegistry::with_defaults();
        assert_eq!(
            registry
                .resolve_by_mass(15.995, DEFAULT_MASS_TOLERANCE)
                .unwrap()
                .name(),
            "Oxidation"
        );
        assert!(registry.resolve_by_mass(15.9, DEFAULT_MASS_TOLERANCE).is_none());

        let unnamed = registry.register_unnamed(3.1234);
        assert!(!unnamed.is_named());
        assert_eq!(unnamed.name(), "+3.1234");
        assert!(Arc::ptr_eq(&unnamed, &registry.register_unnamed(3.12341)));
        assert!(Arc::ptr_eq(
            &unnamed,
            &registry.resolve_by_mass(3.123, DEFAULT_MASS_TOLERANCE).unwrap()
        ));
    }

    #[test]
    fn concurrent_registration() {
        let registry = Arc::new(ModificationRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register("Shared", 7.0))
            })
            .collect();
        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(instances.iter().all(|m| Arc::ptr_eq(m, &instances[0])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mods.json");
        let registry = ModificationRegistry::new();
        registry.register("Custom", 12.5);
        registry.register_unnamed(-3.25);
        registry.add_alias("Cu", "Custom");
        registry.save_json(&path).unwrap();

        let loaded = ModificationRegistry::new();
        assert_eq!(loaded.extend_from_json(&path).unwrap(), 2);
        assert_eq!(loaded.resolve_by_name("cu").unwrap().name(), "Custom");
        assert!(!loaded.resolve_by_name("-3.2500").unwrap().is_named());
        assert!(matches!(
            loaded.extend_from_json(dir.path().join("missing.json")),
            Err(RegistryError::Io { .. })
        ));
    }
}
