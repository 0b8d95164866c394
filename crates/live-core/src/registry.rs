//! The ordered channel list and its durable snapshot.
//!
//! The snapshot is a pretty-printed JSON array of `{"name", "live"}` records,
//! rewritten whole after every sweep. Saves go through a sibling temp file and
//! a rename, so a reader sees either the previous or the next complete file.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::channel::{names_match, Channel};
use crate::probe::{StatusProbe, Verdict};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Malformed snapshot {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RegistryError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads a snapshot strictly. A missing file is an empty registry; anything
/// else that goes wrong is an error.
pub fn read_snapshot(path: &Path) -> Result<Vec<Channel>, RegistryError> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RegistryError::io(path, e)),
    };
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&data).map_err(|source| RegistryError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a newline-delimited channel list. Blank lines and case-insensitive
/// repeats are skipped. A missing or unreadable file yields an empty list.
pub fn read_seed_list(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let names = parse_name_list(&content);
            info!(path = %path.display(), count = names.len(), "Loaded seed channel list");
            names
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read seed channel list");
            Vec::new()
        }
    }
}

pub fn parse_name_list(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !names.iter().any(|n| names_match(n, line)) {
            names.push(line.to_string());
        }
    }
    names
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    pub fn new(channels: Vec<Channel>) -> Self {
        let mut registry = Self::default();
        for c in channels {
            if registry.contains(c.name()) {
                warn!(channel = c.name(), "Dropping duplicate channel");
                continue;
            }
            registry.channels.push(c);
        }
        registry
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(Channel::new).collect())
    }

    /// Loads the snapshot at `path`, failing open: a missing or malformed
    /// snapshot is logged and yields an empty list.
    pub fn load(path: &Path) -> Vec<Channel> {
        match read_snapshot(path) {
            Ok(channels) if channels.is_empty() && !path.exists() => {
                warn!(path = %path.display(), "No previous snapshot found, starting fresh");
                channels
            }
            Ok(channels) => {
                info!(path = %path.display(), count = channels.len(), "Loaded channel snapshot");
                channels
            }
            Err(e) => {
                error!(error = %e, "Ignoring unreadable snapshot");
                Vec::new()
            }
        }
    }

    /// Snapshot first, then the seed list when the snapshot has nothing.
    pub fn open(snapshot: &Path, seed: Option<&Path>) -> Self {
        Self::or_seed(Self::load(snapshot), seed)
    }

    /// Like [`ChannelRegistry::open`], but an unreadable snapshot is an error
    /// instead of an empty list. Used by writers that must not replace a
    /// snapshot they could not parse.
    pub fn open_strict(snapshot: &Path, seed: Option<&Path>) -> Result<Self, RegistryError> {
        Ok(Self::or_seed(read_snapshot(snapshot)?, seed))
    }

    fn or_seed(loaded: Vec<Channel>, seed: Option<&Path>) -> Self {
        if !loaded.is_empty() {
            return Self::new(loaded);
        }
        match seed {
            Some(seed) => Self::from_names(read_seed_list(seed)),
            None => Self::default(),
        }
    }

    /// Writes `channels` to `path` via temp file and rename.
    pub fn save(channels: &[Channel], path: &Path) -> Result<(), RegistryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RegistryError::io(parent, e))?;
        }

        let data = serde_json::to_vec_pretty(channels).map_err(RegistryError::Serialize)?;
        let tmp = tmp_path(path);
        {
            let mut file = std::fs::File::create(&tmp).map_err(|e| RegistryError::io(&tmp, e))?;
            file.write_all(&data).map_err(|e| RegistryError::io(&tmp, e))?;
            file.sync_all().map_err(|e| RegistryError::io(&tmp, e))?;
        }
        std::fs::rename(&tmp, path).map_err(|e| RegistryError::io(path, e))?;

        debug!(path = %path.display(), count = channels.len(), "Snapshot saved");
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), RegistryError> {
        Self::save(&self.channels, path)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.iter().any(|c| c.matches(name))
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.matches(name))
    }

    /// Appends `name` unless a channel with that name already exists.
    pub fn append_if_absent(&mut self, name: &str, live: bool) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.channels.push(Channel::with_live(name, live));
        true
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub(crate) fn channels_mut(&mut self) -> &mut [Channel] {
        &mut self.channels
    }

    pub fn names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn live_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_live()).count()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added { name: String, live: bool },
    AlreadyPresent { name: String },
    Rejected { name: String },
}

/// Appends every absent name, seeding `live` from an immediate probe.
///
/// Only a conclusive [`Verdict::Live`] seeds `live = true`.
pub async fn add_channels(
    registry: &mut ChannelRegistry,
    names: &[String],
    probe: &dyn StatusProbe,
) -> Vec<AddOutcome> {
    let mut outcomes = Vec::with_capacity(names.len());
    for raw in names {
        let name = raw.trim();
        if name.is_empty() {
            outcomes.push(AddOutcome::Rejected { name: raw.clone() });
            continue;
        }
        if registry.contains(name) {
            warn!(channel = name, "Channel is already in the list");
            outcomes.push(AddOutcome::AlreadyPresent {
                name: name.to_string(),
            });
            continue;
        }

        let live = probe.probe(name).await == Verdict::Live;
        registry.append_if_absent(name, live);
        info!(channel = name, live, "Added channel");
        outcomes.push(AddOutcome::Added {
            name: name.to_string(),
            live,
        });
    }
    outcomes
}
