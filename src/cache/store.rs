use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::compile::fingerprint::Fingerprint;
use crate::foundation::error::{VeditError, VeditResult};

/// Index file name inside the cache directory.
pub const INDEX_FILE: &str = "cachedb.json";
const INDEX_VERSION: u32 = 1;

/// A previously produced artifact and what it looked like when it was recorded.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheEntry {
    /// Artifact file.
    pub artifact: PathBuf,
    /// Artifact size when recorded; a different size on disk invalidates the entry.
    pub bytes: u64,
    /// Seconds since the Unix epoch when the entry was recorded.
    pub created_unix: u64,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct CacheIndex {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

/// Outcome shared by every caller waiting on one production.
#[derive(Clone, Debug)]
enum Failure {
    /// The cache itself could not take the artifact; callers may still transcode without it.
    Cache(String),
    /// The producer failed or wrote nothing usable.
    Produce(String),
}

impl From<VeditError> for Failure {
    fn from(e: VeditError) -> Self {
        match e {
            VeditError::Cache(msg) => Failure::Cache(msg),
            VeditError::Render(msg) => Failure::Produce(msg),
            other => Failure::Produce(other.to_string()),
        }
    }
}

impl From<Failure> for VeditError {
    fn from(f: Failure) -> Self {
        match f {
            Failure::Cache(msg) => VeditError::Cache(msg),
            Failure::Produce(msg) => VeditError::Render(msg),
        }
    }
}

type Flight = Arc<OnceLock<Result<PathBuf, Failure>>>;

/// Content-addressable store of transcoded excerpts, persisted across runs.
///
/// Artifacts live in the cache directory as `<fingerprint>.mp4`, next to a JSON index. An
/// artifact is renamed into place only after it was fully written, and the index only ever
/// names published artifacts. Entries are never expired automatically; [`FingerprintCache::clear`]
/// is the only invalidation.
pub struct FingerprintCache {
    dir: PathBuf,
    entries: Mutex<BTreeMap<Fingerprint, CacheEntry>>,
    /// Entries found stale since opening; kept out of the index when it is rewritten.
    dropped: Mutex<BTreeMap<Fingerprint, CacheEntry>>,
    in_flight: Mutex<HashMap<Fingerprint, Flight>>,
}

impl FingerprintCache {
    /// `<system temp dir>/vedit/<$USER or "default">`.
    pub fn default_dir() -> PathBuf {
        let user = std::env::var("USER")
            .ok()
            .filter(|u| !u.is_empty() && !u.contains(['/', '\\']))
            .unwrap_or_else(|| "default".to_string());
        std::env::temp_dir().join("vedit").join(user)
    }

    /// Open (creating if needed) the cache in `dir`.
    ///
    /// An unreadable or corrupt index is logged and treated as empty.
    pub fn open(dir: impl Into<PathBuf>) -> VeditResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            VeditError::cache(format!("create cache dir '{}': {e}", dir.display()))
        })?;
        let entries = match load_index(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "ignoring unusable cache index");
                BTreeMap::new()
            }
        };
        tracing::debug!(dir = %dir.display(), entries = entries.len(), "opened fingerprint cache");
        Ok(Self {
            dir,
            entries: Mutex::new(entries),
            dropped: Mutex::new(BTreeMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the artifact for `fp` is published.
    pub fn artifact_path(&self, fp: Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.mp4", fp.to_hex()))
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the entry for `fp`, valid or not.
    pub fn entry(&self, fp: Fingerprint) -> Option<CacheEntry> {
        lock(&self.entries).get(&fp).cloned()
    }

    /// Artifact for `fp` if it is recorded and still intact on disk.
    ///
    /// A recorded artifact that disappeared or changed size is dropped and reported as a miss.
    pub fn lookup(&self, fp: Fingerprint) -> Option<PathBuf> {
        let mut entries = lock(&self.entries);
        let entry = entries.get(&fp)?;
        let intact = std::fs::metadata(&entry.artifact)
            .map(|m| m.is_file() && m.len() == entry.bytes)
            .unwrap_or(false);
        if intact {
            return Some(entry.artifact.clone());
        }
        tracing::warn!(fingerprint = %fp, artifact = %entry.artifact.display(), "dropping stale cache entry");
        if let Some(stale) = entries.remove(&fp) {
            lock(&self.dropped).insert(fp, stale);
        }
        None
    }

    /// Return the artifact for `fp`, producing it with `produce` on a miss.
    ///
    /// `produce` receives a scratch path in the cache directory to write into. Concurrent calls
    /// for the same fingerprint run `produce` once; every caller observes that single outcome.
    /// With `force`, recorded artifacts are ignored and replaced.
    ///
    /// Fails with [`VeditError::Cache`] when the cache directory cannot take the artifact, in
    /// which case `produce` may not have run; any other failure is a [`VeditError::Render`].
    pub fn get_or_create<F>(&self, fp: Fingerprint, force: bool, produce: F) -> VeditResult<PathBuf>
    where
        F: FnOnce(&Path) -> VeditResult<()>,
    {
        if !force && let Some(hit) = self.lookup(fp) {
            tracing::debug!(fingerprint = %fp, "cache hit");
            return Ok(hit);
        }

        let flight = Arc::clone(
            lock(&self.in_flight)
                .entry(fp)
                .or_insert_with(|| Arc::new(OnceLock::new())),
        );
        let outcome = flight.get_or_init(|| {
            if !force && let Some(hit) = self.lookup(fp) {
                return Ok(hit);
            }
            tracing::debug!(fingerprint = %fp, "cache miss");
            self.produce_and_publish(fp, produce).map_err(Failure::from)
        });
        let result = outcome.clone().map_err(VeditError::from);

        let mut in_flight = lock(&self.in_flight);
        if in_flight.get(&fp).is_some_and(|f| Arc::ptr_eq(f, &flight)) {
            in_flight.remove(&fp);
        }
        result
    }

    fn produce_and_publish<F>(&self, fp: Fingerprint, produce: F) -> VeditResult<PathBuf>
    where
        F: FnOnce(&Path) -> VeditResult<()>,
    {
        let scratch = tempfile::Builder::new()
            .prefix(".partial-")
            .suffix(".mp4")
            .tempfile_in(&self.dir)
            .map_err(|e| VeditError::cache(format!("create scratch artifact: {e}")))?;
        produce(scratch.path()).map_err(|e| match e {
            VeditError::Cache(msg) => VeditError::Render(msg),
            other => other,
        })?;

        let bytes = std::fs::metadata(scratch.path())
            .map(|m| m.len())
            .map_err(|e| VeditError::render(format!("artifact for {fp} missing after produce: {e}")))?;
        if bytes == 0 {
            return Err(VeditError::render(format!("backend produced an empty artifact for {fp}")));
        }

        let target = self.artifact_path(fp);
        match scratch.persist(&target) {
            Ok(_) => {}
            Err(e) => {
                // Unpublishable artifacts are still usable for this run.
                tracing::warn!(fingerprint = %fp, error = %e.error, "could not publish artifact to cache");
                return e
                    .file
                    .into_temp_path()
                    .keep()
                    .map_err(|e| VeditError::cache(format!("keep scratch artifact: {e}")));
            }
        }

        let entry = CacheEntry {
            artifact: target.clone(),
            bytes,
            created_unix: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        lock(&self.dropped).remove(&fp);
        lock(&self.entries).insert(fp, entry);
        if let Err(e) = self.persist_index() {
            tracing::warn!(error = %e, "cache index not updated");
        }
        Ok(target)
    }

    /// Merge the in-memory entries over the on-disk index and atomically replace it.
    fn persist_index(&self) -> VeditResult<()> {
        let mut merged = load_index(&self.dir).unwrap_or_default();
        {
            let dropped = lock(&self.dropped);
            merged.retain(|fp, entry| dropped.get(fp) != Some(entry));
        }
        merged.extend(lock(&self.entries).iter().map(|(k, v)| (*k, v.clone())));

        let index = CacheIndex {
            version: INDEX_VERSION,
            entries: merged.into_iter().map(|(k, v)| (k.to_hex(), v)).collect(),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(".cachedb-")
            .tempfile_in(&self.dir)
            .map_err(|e| VeditError::cache(format!("create index scratch file: {e}")))?;
        serde_json::to_writer_pretty(&mut tmp, &index)
            .map_err(|e| VeditError::serde(format!("encode cache index: {e}")))?;
        tmp.flush()
            .map_err(|e| VeditError::cache(format!("write cache index: {e}")))?;
        tmp.persist(self.dir.join(INDEX_FILE))
            .map_err(|e| VeditError::cache(format!("publish cache index: {}", e.error)))?;
        Ok(())
    }

    /// Discard every entry and every file in the cache directory.
    pub fn clear(&self) -> VeditResult<usize> {
        lock(&self.entries).clear();
        lock(&self.dropped).clear();
        clear_dir(&self.dir)
    }
}

/// Delete every regular file in `dir`; returns how many were removed. A missing directory is
/// already clear.
pub fn clear_dir(dir: &Path) -> VeditResult<usize> {
    let read = match std::fs::read_dir(dir) {
        Ok(r) => r,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(VeditError::cache(format!(
                "read cache dir '{}': {e}",
                dir.display()
            )));
        }
    };
    let mut removed = 0;
    for entry in read {
        let entry = entry.map_err(|e| VeditError::cache(format!("read cache dir: {e}")))?;
        let path = entry.path();
        if path.is_file() {
            std::fs::remove_file(&path).map_err(|e| {
                VeditError::cache(format!("remove '{}': {e}", path.display()))
            })?;
            removed += 1;
        }
    }
    tracing::info!(dir = %dir.display(), removed, "cleared cache");
    Ok(removed)
}

fn load_index(dir: &Path) -> VeditResult<BTreeMap<Fingerprint, CacheEntry>> {
    let path = dir.join(INDEX_FILE);
    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => {
            return Err(VeditError::cache(format!(
                "read '{}': {e}",
                path.display()
            )));
        }
    };
    let index: CacheIndex = serde_json::from_str(&text)
        .map_err(|e| VeditError::cache(format!("parse '{}': {e}", path.display())))?;
    if index.version != INDEX_VERSION {
        return Err(VeditError::cache(format!(
            "unsupported cache index version {}",
            index.version
        )));
    }
    let mut out = BTreeMap::new();
    for (key, entry) in index.entries {
        match key.parse::<Fingerprint>() {
            Ok(fp) => {
                out.insert(fp, entry);
            }
            Err(e) => tracing::warn!(error = %e, "skipping cache index entry"),
        }
    }
    Ok(out)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
#[path = "../../tests/unit/cache/store.rs"]
mod tests;
