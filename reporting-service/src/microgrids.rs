use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use chrono_tz::Tz;
use reporting_client::domain::{ComponentKind, ComponentRef, Metric, MicrogridDescriptor};
use serde::Deserialize;

use crate::error::ConfigError;

/// On-disk schema of one microgrid file.
///
/// ```toml
/// id = 241
/// name = "Depot North"
/// timezone = "Europe/Berlin"
///
/// [[components]]
/// id = 1
/// type = "pv"
/// label = "Roof PV"
/// ```
#[derive(Debug, Deserialize)]
struct MicrogridFile {
    id: u64,
    name: String,
    timezone: String,
    #[serde(default)]
    components: Vec<ComponentEntry>,
}

#[derive(Debug, Deserialize)]
struct ComponentEntry {
    id: u64,
    #[serde(rename = "type")]
    kind: ComponentKind,
    label: Option<String>,
    #[serde(default = "default_metrics")]
    metrics: Vec<Metric>,
}

fn default_metrics() -> Vec<Metric> {
    vec![Metric::AcActivePower]
}

fn parse_file(path: &Path) -> Result<MicrogridDescriptor, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: MicrogridFile = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let timezone: Tz = file
        .timezone
        .parse()
        .map_err(|_| ConfigError::UnknownTimezone {
            path: path.to_path_buf(),
            timezone: file.timezone.clone(),
        })?;

    let mut seen = HashSet::new();
    let mut components = Vec::with_capacity(file.components.len());
    for entry in file.components {
        if !seen.insert(entry.id) {
            return Err(ConfigError::DuplicateComponent {
                path: path.to_path_buf(),
                component_id: entry.id,
            });
        }
        components.push(ComponentRef {
            id: entry.id,
            kind: entry.kind,
            label: entry
                .label
                .unwrap_or_else(|| format!("{} #{}", entry.kind, entry.id)),
            metrics: entry.metrics,
        });
    }

    Ok(MicrogridDescriptor {
        id: file.id,
        name: file.name,
        timezone,
        components,
    })
}

/// Read every `*.toml` file in `dir`, one microgrid per file.
pub fn load_configs(dir: &Path) -> Result<BTreeMap<u64, MicrogridDescriptor>, ConfigError> {
    if !dir.is_dir() {
        return Err(ConfigError::MissingDirectory(dir.to_path_buf()));
    }

    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut origins: BTreeMap<u64, PathBuf> = BTreeMap::new();
    let mut microgrids = BTreeMap::new();
    for path in paths {
        let descriptor = parse_file(&path)?;
        if let Some(first) = origins.get(&descriptor.id) {
            return Err(ConfigError::DuplicateMicrogrid {
                id: descriptor.id,
                first: first.clone(),
                second: path,
            });
        }
        tracing::debug!(
            microgrid_id = descriptor.id,
            components = descriptor.components.len(),
            path = %path.display(),
            "loaded microgrid config"
        );
        origins.insert(descriptor.id, path);
        microgrids.insert(descriptor.id, descriptor);
    }

    Ok(microgrids)
}

/// Immutable set of configured microgrids.
#[derive(Debug, Clone, Default)]
pub struct MicrogridRegistry {
    microgrids: BTreeMap<u64, MicrogridDescriptor>,
}

impl MicrogridRegistry {
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let microgrids = load_configs(dir)?;
        tracing::info!(count = microgrids.len(), dir = %dir.display(), "microgrid configs loaded");
        Ok(Self { microgrids })
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = MicrogridDescriptor>) -> Self {
        Self {
            microgrids: descriptors.into_iter().map(|d| (d.id, d)).collect(),
        }
    }

    /// Configured ids, ascending.
    pub fn microgrid_ids(&self) -> Vec<u64> {
        self.microgrids.keys().copied().collect()
    }

    pub fn get(&self, id: u64) -> Option<&MicrogridDescriptor> {
        self.microgrids.get(&id)
    }

    pub fn component_kinds(&self, id: u64) -> Option<Vec<ComponentKind>> {
        self.get(id).map(MicrogridDescriptor::component_kinds)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MicrogridDescriptor> {
        self.microgrids.values()
    }

    pub fn is_empty(&self) -> bool {
        self.microgrids.is_empty()
    }
}
