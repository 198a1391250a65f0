use crate::config::CacheConfig;
use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const KEY_DIGEST_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache io failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache payload could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
    #[error("cached payload has kind {found}, expected {expected}")]
    KindMismatch {
        expected: &'static str,
        found: String,
    },
}

pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    fn set_with_ttl(&self, key: &str, payload: &[u8], ttl_secs: u64) -> Result<(), CacheError>;
    /// Returns whether a live entry was removed.
    fn delete(&self, key: &str) -> Result<bool, CacheError>;
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
    fn describe(&self) -> String;
}

pub trait CachePayload: Serialize + DeserializeOwned {
    const KIND: &'static str;

    fn is_cacheable(&self) -> bool {
        true
    }
}

#[derive(Serialize)]
struct TaggedRef<'a, T> {
    kind: &'a str,
    data: &'a T,
}

#[derive(Deserialize)]
struct Tagged<T> {
    kind: String,
    data: T,
}

pub fn encode_payload<T: CachePayload>(value: &T) -> Result<Vec<u8>, CacheError> {
    Ok(serde_json::to_vec(&TaggedRef {
        kind: T::KIND,
        data: value,
    })?)
}

pub fn decode_payload<T: CachePayload>(bytes: &[u8]) -> Result<T, CacheError> {
    let header: Tagged<Value> = serde_json::from_slice(bytes)?;
    if header.kind != T::KIND {
        return Err(CacheError::KindMismatch {
            expected: T::KIND,
            found: header.kind,
        });
    }
    Ok(serde_json::from_value(header.data)?)
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    key: String,
    expires_at: DateTime<Utc>,
    payload_hex: String,
}

#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.root.join(format!("{}.json", hex::encode(digest)))
    }

    fn read_envelope(path: &Path) -> Result<Option<CacheEnvelope>, CacheError> {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let envelope: CacheEnvelope = serde_json::from_slice(&content)?;
        // A zero TTL is already expired here.
        if envelope.expires_at <= Utc::now() {
            Self::remove(path)?;
            return Ok(None);
        }
        Ok(Some(envelope))
    }

    fn remove(path: &Path) -> Result<bool, CacheError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl CacheStore for FsCacheStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let Some(envelope) = Self::read_envelope(&self.entry_path(key))? else {
            return Ok(None);
        };
        if envelope.key != key {
            return Err(CacheError::Corrupt(format!(
                "entry for {key} holds key {}",
                envelope.key
            )));
        }
        hex::decode(&envelope.payload_hex)
            .map(Some)
            .map_err(|err| CacheError::Corrupt(format!("{key}: {err}")))
    }

    fn set_with_ttl(&self, key: &str, payload: &[u8], ttl_secs: u64) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.root).map_err(|source| CacheError::Io {
            path: self.root.clone(),
            source,
        })?;

        let now = Utc::now();
        let expires_at = i64::try_from(ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let envelope = CacheEnvelope {
            key: key.to_string(),
            expires_at,
            payload_hex: hex::encode(payload),
        };

        let path = self.entry_path(key);
        std::fs::write(&path, serde_json::to_vec(&envelope)?)
            .map_err(|source| CacheError::Io { path, source })
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Self::remove(&self.entry_path(key))
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|err| CacheError::Unavailable(err.to_string()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|s| s.to_str()) != Some("json")
            {
                continue;
            }
            match Self::read_envelope(path) {
                Ok(Some(envelope)) if envelope.key.starts_with(prefix) => keys.push(envelope.key),
                Ok(_) => {}
                Err(err) => debug!(file = %path.display(), error = %err, "skipping unreadable cache entry"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn describe(&self) -> String {
        format!("fs:{}", self.root.display())
    }
}

struct FallbackEntry {
    payload: Vec<u8>,
    expires_at: Option<Instant>,
}

impl FallbackEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub backend: String,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_keys: usize,
    pub keys_by_query: BTreeMap<String, usize>,
}

pub struct CachedQueryRunner {
    store: Option<Box<dyn CacheStore>>,
    prefix: String,
    default_ttl_secs: u64,
    fallback: Mutex<HashMap<String, FallbackEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedQueryRunner {
    pub fn new(store: Option<Box<dyn CacheStore>>, prefix: &str, default_ttl_secs: u64) -> Self {
        Self {
            store,
            prefix: prefix.to_string(),
            default_ttl_secs,
            fallback: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig, cache_dir: &Path) -> Self {
        let store: Option<Box<dyn CacheStore>> = if config.enabled {
            Some(Box::new(FsCacheStore::new(cache_dir)))
        } else {
            None
        };
        Self::new(store, &config.prefix, config.default_ttl_secs)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `prefix + name` without parameters, `prefix + name + ":" + digest` with them. The
    /// digest covers the canonical JSON text of `params`, whose object keys are always sorted.
    pub fn cache_key(&self, query_name: &str, params: Option<&Value>) -> String {
        match params {
            Some(params) => {
                let digest = Sha256::digest(params.to_string().as_bytes());
                let digest = hex::encode(digest);
                format!("{}{}:{}", self.prefix, query_name, &digest[..KEY_DIGEST_LEN])
            }
            None => format!("{}{}", self.prefix, query_name),
        }
    }

    pub fn get_or_compute<T, F>(
        &self,
        query_name: &str,
        params: Option<&Value>,
        ttl_secs: Option<u64>,
        compute: F,
    ) -> Result<T>
    where
        T: CachePayload,
        F: FnOnce() -> Result<T>,
    {
        let key = self.cache_key(query_name, params);
        if let Some(value) = self.lookup::<T>(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(query = query_name, key = %key, "cache hit");
            return Ok(value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let value = compute()?;
        info!(
            query = query_name,
            key = %key,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query computed"
        );

        if value.is_cacheable() {
            self.remember(&key, &value, ttl_secs.unwrap_or(self.default_ttl_secs));
        }
        Ok(value)
    }

    pub fn invalidate(&self, query_name: &str, params: Option<&Value>) -> bool {
        let key = self.cache_key(query_name, params);
        let mut removed = self.lock_fallback().remove(&key).is_some();

        if let Some(store) = &self.store {
            match store.delete(&key) {
                Ok(deleted) => removed |= deleted,
                Err(err) => warn!(key = %key, error = %err, "cache delete failed"),
            }
        }

        debug!(key = %key, removed, "cache key invalidated");
        removed
    }

    pub fn clear_all(&self) -> usize {
        let mut removed = HashSet::new();

        {
            let mut fallback = self.lock_fallback();
            let keys = fallback
                .keys()
                .filter(|key| key.starts_with(&self.prefix))
                .cloned()
                .collect::<Vec<_>>();
            for key in keys {
                fallback.remove(&key);
                removed.insert(key);
            }
        }

        if let Some(store) = &self.store {
            match store.keys_with_prefix(&self.prefix) {
                Ok(keys) => {
                    for key in keys {
                        match store.delete(&key) {
                            Ok(_) => {
                                removed.insert(key);
                            }
                            Err(err) => warn!(key = %key, error = %err, "cache delete failed"),
                        }
                    }
                }
                Err(err) => warn!(error = %err, "cache key listing failed; store not cleared"),
            }
        }

        info!(prefix = %self.prefix, removed = removed.len(), "cache cleared");
        removed.len()
    }

    pub fn stats(&self) -> CacheStats {
        let mut keys = HashSet::new();
        {
            let now = Instant::now();
            let fallback = self.lock_fallback();
            keys.extend(
                fallback
                    .iter()
                    .filter(|(key, entry)| key.starts_with(&self.prefix) && !entry.is_expired(now))
                    .map(|(key, _)| key.clone()),
            );
        }
        if let Some(store) = &self.store {
            match store.keys_with_prefix(&self.prefix) {
                Ok(stored) => keys.extend(stored),
                Err(err) => warn!(error = %err, "cache key listing failed"),
            }
        }

        let mut keys_by_query = BTreeMap::new();
        for key in &keys {
            let rest = key.strip_prefix(&self.prefix).unwrap_or(key);
            let query = rest.split(':').next().unwrap_or(rest);
            *keys_by_query.entry(query.to_string()).or_insert(0) += 1;
        }

        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            backend: self
                .store
                .as_ref()
                .map(|store| store.describe())
                .unwrap_or_else(|| "in-process".to_string()),
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            total_keys: keys.len(),
            keys_by_query,
        }
    }

    fn lookup<T: CachePayload>(&self, key: &str) -> Option<T> {
        if let Some(store) = &self.store {
            match store.get(key) {
                Ok(Some(bytes)) if !bytes.is_empty() => match decode_payload::<T>(&bytes) {
                    Ok(value) => return Some(value),
                    Err(err) => warn!(key = %key, error = %err, "cached payload unusable; recomputing"),
                },
                Ok(_) => {}
                Err(err) => warn!(key = %key, error = %err, "cache store read failed"),
            }
        }

        let now = Instant::now();
        let mut fallback = self.lock_fallback();
        let entry = fallback.get(key)?;
        if entry.is_expired(now) {
            fallback.remove(key);
            return None;
        }
        match decode_payload::<T>(&entry.payload) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key = %key, error = %err, "fallback payload unusable; recomputing");
                fallback.remove(key);
                None
            }
        }
    }

    fn remember<T: CachePayload>(&self, key: &str, value: &T, ttl_secs: u64) {
        let payload = match encode_payload(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key = %key, error = %err, "result not cached; encoding failed");
                return;
            }
        };

        if let Some(store) = &self.store {
            match store.set_with_ttl(key, &payload, ttl_secs) {
                Ok(()) => return,
                Err(err) => {
                    warn!(key = %key, error = %err, "cache store write failed; using in-process fallback");
                }
            }
        }

        let expires_at = Instant::now().checked_add(Duration::from_secs(ttl_secs));
        self.lock_fallback().insert(
            key.to_string(),
            FallbackEntry {
                payload,
                expires_at,
            },
        );
    }

    fn lock_fallback(&self) -> MutexGuard<'_, HashMap<String, FallbackEntry>> {
        self.fallback.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Numbers(Vec<u32>);

    impl CachePayload for Numbers {
        const KIND: &'static str = "numbers";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Words(Vec<String>);

    impl CachePayload for Words {
        const KIND: &'static str = "words";
    }

    struct DownStore;

    impl CacheStore for DownStore {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
        fn set_with_ttl(&self, _key: &str, _payload: &[u8], _ttl: u64) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
        fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
        fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
        fn describe(&self) -> String {
            "down".to_string()
        }
    }

    fn counted(calls: &Cell<u32>, value: Vec<u32>) -> impl FnOnce() -> Result<Numbers> + '_ {
        move || {
            calls.set(calls.get() + 1);
            Ok(Numbers(value))
        }
    }

    #[test]
    fn second_call_is_served_from_store_until_invalidated() {
        let dir = tempdir().unwrap();
        let runner =
            CachedQueryRunner::new(Some(Box::new(FsCacheStore::new(dir.path()))), "theater:", 60);
        let calls = Cell::new(0);
        let params = json!({"days": 7});

        let first = runner
            .get_or_compute("upcoming", Some(&params), None, counted(&calls, vec![1, 2]))
            .unwrap();
        let second = runner
            .get_or_compute("upcoming", Some(&params), None, counted(&calls, vec![9]))
            .unwrap();
        assert_eq!(first, Numbers(vec![1, 2]));
        assert_eq!(second, Numbers(vec![1, 2]));
        assert_eq!(calls.get(), 1);

        assert!(runner.invalidate("upcoming", Some(&params)));
        let third = runner
            .get_or_compute("upcoming", Some(&params), None, counted(&calls, vec![3]))
            .unwrap();
        assert_eq!(third, Numbers(vec![3]));
        assert_eq!(calls.get(), 2);

        let stats = runner.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn unavailable_store_degrades_to_in_process_fallback() {
        let runner = CachedQueryRunner::new(Some(Box::new(DownStore)), "theater:", 60);
        let calls = Cell::new(0);

        runner
            .get_or_compute("genre_stats", None, None, counted(&calls, vec![4]))
            .unwrap();
        let cached = runner
            .get_or_compute("genre_stats", None, None, counted(&calls, vec![5]))
            .unwrap();
        assert_eq!(cached, Numbers(vec![4]));
        assert_eq!(calls.get(), 1);
        assert_eq!(runner.clear_all(), 1);
    }

    #[test]
    fn compute_errors_propagate_and_are_not_cached() {
        let runner = CachedQueryRunner::new(None, "theater:", 60);
        let err = runner
            .get_or_compute::<Numbers, _>("broken", None, None, || anyhow::bail!("store offline"))
            .unwrap_err();
        assert_eq!(err.to_string(), "store offline");

        let calls = Cell::new(0);
        runner
            .get_or_compute("broken", None, None, counted(&calls, vec![1]))
            .unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_ttl_entries_expire_immediately() {
        let dir = tempdir().unwrap();
        let runner =
            CachedQueryRunner::new(Some(Box::new(FsCacheStore::new(dir.path()))), "theater:", 60);
        let calls = Cell::new(0);

        runner
            .get_or_compute("flash", None, Some(0), counted(&calls, vec![1]))
            .unwrap();
        runner
            .get_or_compute("flash", None, Some(0), counted(&calls, vec![1]))
            .unwrap();
        assert_eq!(calls.get(), 2);

        let in_process = CachedQueryRunner::new(None, "theater:", 60);
        in_process
            .get_or_compute("flash", None, Some(0), counted(&calls, vec![1]))
            .unwrap();
        in_process
            .get_or_compute("flash", None, Some(0), counted(&calls, vec![1]))
            .unwrap();
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn keys_ignore_parameter_order() {
        let runner = CachedQueryRunner::new(None, "theater:", 60);
        let a = runner.cache_key("top_actors", Some(&json!({"limit": 10, "min": 1})));
        let b = runner.cache_key("top_actors", Some(&json!({"min": 1, "limit": 10})));
        let c = runner.cache_key("top_actors", Some(&json!({"limit": 20, "min": 1})));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("theater:top_actors:"));
        assert_eq!(a.len(), "theater:top_actors:".len() + 16);
        assert_eq!(runner.cache_key("genre_stats", None), "theater:genre_stats");
    }

    #[test]
    fn kind_mismatch_reads_as_miss() {
        let dir = tempdir().unwrap();
        let runner =
            CachedQueryRunner::new(Some(Box::new(FsCacheStore::new(dir.path()))), "theater:", 60);
        runner
            .get_or_compute("shared", None, None, || Ok(Numbers(vec![1])))
            .unwrap();

        let words = runner
            .get_or_compute("shared", None, None, || Ok(Words(vec!["a".to_string()])))
            .unwrap();
        assert_eq!(words, Words(vec!["a".to_string()]));
    }

    #[test]
    fn stats_group_keys_by_query_and_clear_removes_them() {
        let dir = tempdir().unwrap();
        let runner =
            CachedQueryRunner::new(Some(Box::new(FsCacheStore::new(dir.path()))), "theater:", 60);
        for days in [7, 14] {
            runner
                .get_or_compute("upcoming", Some(&json!({"days": days})), None, || {
                    Ok(Numbers(vec![days]))
                })
                .unwrap();
        }
        runner
            .get_or_compute("genre_stats", None, None, || Ok(Numbers(vec![])))
            .unwrap();

        let stats = runner.stats();
        assert_eq!(stats.total_keys, 3);
        assert_eq!(stats.keys_by_query["upcoming"], 2);
        assert_eq!(stats.keys_by_query["genre_stats"], 1);

        assert_eq!(runner.clear_all(), 3);
        assert_eq!(runner.stats().total_keys, 0);
    }

    #[test]
    fn fs_store_round_trips_and_expires() {
        let dir = tempdir().unwrap();
        let store = FsCacheStore::new(dir.path().join("nested"));
        assert_eq!(store.get("theater:x").unwrap(), None);

        store.set_with_ttl("theater:x", b"payload", 60).unwrap();
        assert_eq!(store.get("theater:x").unwrap(), Some(b"payload".to_vec()));
        assert_eq!(store.keys_with_prefix("theater:").unwrap(), vec!["theater:x"]);
        assert!(store.keys_with_prefix("other:").unwrap().is_empty());

        store.set_with_ttl("theater:y", b"gone", 0).unwrap();
        assert_eq!(store.get("theater:y").unwrap(), None);

        assert!(store.delete("theater:x").unwrap());
        assert!(!store.delete("theater:x").unwrap());
    }
}
