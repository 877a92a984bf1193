//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/clonetree/clonetree.toml`
//! 3. Local config: a file named by the caller
//! 4. Environment variables: `CLONETREE_*` prefix, `__` between section and key

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::merge::{MergeOptions, DEFAULT_BOUNDARY_RESOLUTION};
use crate::application::{ApplicationError, TreeLoader};
use crate::domain::ClusterRegistry;
use crate::infrastructure::ChromosomeTable;

/// Merge tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MergeSettings {
    /// Secondary subclones below this fraction are not placed
    pub min_fraction: f64,
    /// Tolerance in bases when comparing event boundaries
    pub boundary_resolution: u64,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            min_fraction: 0.0,
            boundary_resolution: DEFAULT_BOUNDARY_RESOLUTION,
        }
    }
}

/// Reference genome used to validate event extents on load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct GenomeSettings {
    /// Chromosome name -> length; empty disables extent validation
    pub chromosomes: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PersistSettings {
    /// Reject loaded trees whose child fractions exceed their parent's
    pub validate_fractions: bool,
}

/// Raw merge section (fields are Option to detect "not specified").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawMergeSettings {
    pub min_fraction: Option<f64>,
    pub boundary_resolution: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawGenomeSettings {
    pub chromosomes: Option<BTreeMap<String, u64>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawPersistSettings {
    pub validate_fractions: Option<bool>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub merge: RawMergeSettings,
    pub genome: RawGenomeSettings,
    pub persist: RawPersistSettings,
}

/// Unified configuration for clonetree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub merge: MergeSettings,
    pub genome: GenomeSettings,
    pub persist: PersistSettings,
}

/// Get the XDG config directory for clonetree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "clonetree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("clonetree.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Overlay scalars where specified; chromosome tables are combined, overlay wins per name.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        let mut chromosomes = self.genome.chromosomes.clone();
        if let Some(extra) = &overlay.genome.chromosomes {
            chromosomes.extend(extra.iter().map(|(k, v)| (k.clone(), *v)));
        }
        Self {
            merge: MergeSettings {
                min_fraction: overlay
                    .merge
                    .min_fraction
                    .unwrap_or(self.merge.min_fraction),
                boundary_resolution: overlay
                    .merge
                    .boundary_resolution
                    .unwrap_or(self.merge.boundary_resolution),
            },
            genome: GenomeSettings { chromosomes },
            persist: PersistSettings {
                validate_fractions: overlay
                    .persist
                    .validate_fractions
                    .unwrap_or(self.persist.validate_fractions),
            },
        }
    }

    /// Apply global config onto defaults; a global chromosome table replaces the default one.
    fn apply_global(&self, global: &RawSettings) -> Self {
        let mut settings = self.merge_with(global);
        if let Some(chromosomes) = &global.genome.chromosomes {
            settings.genome.chromosomes = chromosomes.clone();
        }
        settings
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local` - Optional explicit config file; it must exist when given
    pub fn load(local: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_from(global_config_path().as_deref(), local)
    }

    /// Same as [`load`](Self::load) with an explicit global config location.
    pub fn load_from(global: Option<&Path>, local: Option<&Path>) -> Result<Self, ApplicationError> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config, skipped when absent
        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("config: global {}", global_path.display());
                let raw = load_raw_settings(global_path)?;
                current = current.apply_global(&raw);
            }
        }

        // 3. Local config named by the caller
        if let Some(local_path) = local {
            if !local_path.exists() {
                return Err(ApplicationError::Config {
                    message: format!("config file not found: {}", local_path.display()),
                });
            }
            debug!("config: local {}", local_path.display());
            let raw = load_raw_settings(local_path)?;
            current = current.merge_with(&raw);
        }

        // 4. Environment variables
        current = Self::apply_env_overrides(current)?;
        current.check()?;
        Ok(current)
    }

    /// Apply CLONETREE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("CLONETREE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_float("merge.min_fraction") {
            settings.merge.min_fraction = val;
        }
        if let Ok(val) = config.get::<u64>("merge.boundary_resolution") {
            settings.merge.boundary_resolution = val;
        }
        if let Ok(val) = config.get_bool("persist.validate_fractions") {
            settings.persist.validate_fractions = val;
        }

        Ok(settings)
    }

    fn check(&self) -> Result<(), ApplicationError> {
        let min = self.merge.min_fraction;
        if !(0.0..=1.0).contains(&min) {
            return Err(ApplicationError::Config {
                message: format!("merge.min_fraction must lie in [0, 1], got {}", min),
            });
        }
        Ok(())
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            min_fraction: self.merge.min_fraction,
            boundary_resolution: self.merge.boundary_resolution,
        }
    }

    pub fn chromosome_table(&self) -> ChromosomeTable {
        ChromosomeTable::from(self.genome.chromosomes.clone())
    }

    /// A loader configured from the persist and genome sections.
    ///
    /// `genome` is only consulted when it lists at least one chromosome.
    pub fn tree_loader<'a>(
        &self,
        registry: &'a mut ClusterRegistry,
        genome: &'a ChromosomeTable,
    ) -> TreeLoader<'a> {
        let loader =
            TreeLoader::new(registry).validate_fractions(self.persist.validate_fractions);
        if genome.is_empty() {
            loader
        } else {
            loader.with_genome(genome)
        }
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# clonetree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/clonetree/clonetree.toml
#   Local:  file passed explicitly by the caller
#   Env:    CLONETREE_<SECTION>__<KEY>, e.g. CLONETREE_MERGE__MIN_FRACTION=0.01

[merge]
# Secondary subclones below this fraction are not placed during merge
# min_fraction = 0.0

# Tolerance in bases when comparing event boundaries of same-named clusters
# boundary_resolution = 20000000

[persist]
# Reject loaded trees whose child fractions exceed the parent's
# validate_fractions = false

[genome.chromosomes]
# Lengths used to validate event extents on load (empty disables validation)
# "1" = 248956422
# "2" = 242193529
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
