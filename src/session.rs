//! Inference session caching.
//!
//! Sessions are heavyweight: building one reads the model from disk and
//! initializes the inference engine. The cache constructs them lazily, keyed
//! by model name, and hands out shared handles. The map lock covers lookups
//! and inserts only — construction and inference run outside it, so two
//! first-use calls for the same key may both build a session and the last
//! writer wins the slot. Handles are read-only views of identical model
//! bytes, so the duplicated work is harmless, but callers must not depend on
//! handle identity surviving such a race.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("no model file found in {0}")]
    ModelNotFound(PathBuf),
    #[error("tokens file not found: {0}")]
    TokensNotFound(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),
}

/// Names one model variant: the cache key plus the directory holding its
/// model file and `tokens.txt`.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub name: String,
    pub dir: PathBuf,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }
}

/// Builds a cache entry from a model descriptor.
///
/// The production loader constructs an ONNX session together with the
/// symbol table matching that on-disk model version; tests inject counting
/// or scripted loaders through the same seam.
pub trait ModelLoader: Send + Sync {
    type Handle: Send + Sync;

    fn load(&self, descriptor: &ModelDescriptor) -> Result<Self::Handle, SessionError>;
}

/// Lazy per-model-variant cache of loaded handles.
pub struct SessionCache<L: ModelLoader> {
    loader: L,
    entries: Mutex<HashMap<String, Arc<L::Handle>>>,
}

impl<L: ModelLoader> SessionCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the handle for a model variant, loading it on first use.
    ///
    /// A failed load is returned to the caller and never cached; the next
    /// call retries from scratch.
    pub fn get(&self, descriptor: &ModelDescriptor) -> Result<Arc<L::Handle>, SessionError> {
        if let Some(handle) = self.entries.lock().get(&descriptor.name) {
            return Ok(Arc::clone(handle));
        }

        // Loading is slow; run it outside the lock so other keys stay
        // reachable. Racing first-use calls for one key both land here.
        let handle = Arc::new(self.loader.load(descriptor)?);

        let mut entries = self.entries.lock();
        if entries
            .insert(descriptor.name.clone(), Arc::clone(&handle))
            .is_some()
        {
            log::debug!(
                "duplicate load for model {:?}, keeping the newest",
                descriptor.name
            );
        }
        Ok(handle)
    }

    /// Drop the cache entry for one model variant.
    ///
    /// In-flight calls holding the handle finish with their own reference;
    /// only the cache slot is cleared.
    pub fn invalidate(&self, name: &str) -> bool {
        let removed = self.entries.lock().remove(name).is_some();
        if removed {
            log::info!("invalidated cached model {:?}", name);
        }
        removed
    }

    /// Drop every cache entry.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.lock();
        if !entries.is_empty() {
            log::info!("releasing {} cached model(s)", entries.len());
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct FakeHandle {
        dir: PathBuf,
        serial: usize,
    }

    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CountingLoader {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let loads = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    loads: Arc::clone(&loads),
                    fail: false,
                },
                loads,
            )
        }
    }

    impl ModelLoader for CountingLoader {
        type Handle = FakeHandle;

        fn load(&self, descriptor: &ModelDescriptor) -> Result<FakeHandle, SessionError> {
            if self.fail {
                return Err(SessionError::ModelNotFound(descriptor.dir.clone()));
            }
            let serial = self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(FakeHandle {
                dir: descriptor.dir.clone(),
                serial,
            })
        }
    }

    #[test]
    fn sequential_gets_reuse_one_load() {
        let (loader, loads) = CountingLoader::new();
        let cache = SessionCache::new(loader);
        let descriptor = ModelDescriptor::new("modelA", "/models/a");

        let first = cache.get(&descriptor).unwrap();
        let second = cache.get(&descriptor).unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.dir, Path::new("/models/a"));
    }

    #[test]
    fn invalidate_forces_a_fresh_load() {
        let (loader, loads) = CountingLoader::new();
        let cache = SessionCache::new(loader);
        let descriptor = ModelDescriptor::new("modelA", "/models/a");

        let first = cache.get(&descriptor).unwrap();
        assert!(cache.invalidate("modelA"));
        let second = cache.get(&descriptor).unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_ne!(first.serial, second.serial);
        // the first handle outlives its eviction
        assert_eq!(first.dir, Path::new("/models/a"));
    }

    #[test]
    fn invalidating_an_unknown_key_is_a_no_op() {
        let (loader, _) = CountingLoader::new();
        let cache = SessionCache::new(loader);
        assert!(!cache.invalidate("nothing"));
    }

    #[test]
    fn distinct_keys_load_independently() {
        let (loader, loads) = CountingLoader::new();
        let cache = SessionCache::new(loader);

        let a = cache
            .get(&ModelDescriptor::new("modelA", "/models/a"))
            .unwrap();
        let b = cache
            .get(&ModelDescriptor::new("modelB", "/models/b"))
            .unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_ne!(a.dir, b.dir);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_all_clears_every_entry() {
        let (loader, loads) = CountingLoader::new();
        let cache = SessionCache::new(loader);

        cache
            .get(&ModelDescriptor::new("modelA", "/models/a"))
            .unwrap();
        cache
            .get(&ModelDescriptor::new("modelB", "/models/b"))
            .unwrap();
        cache.invalidate_all();

        assert!(cache.is_empty());
        cache
            .get(&ModelDescriptor::new("modelA", "/models/a"))
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_loads_are_not_cached() {
        let loader = CountingLoader {
            loads: Arc::new(AtomicUsize::new(0)),
            fail: true,
        };
        let cache = SessionCache::new(loader);
        let descriptor = ModelDescriptor::new("modelA", "/models/a");

        assert!(cache.get(&descriptor).is_err());
        assert!(cache.get(&descriptor).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_first_use_keeps_one_intact_entry() {
        let (loader, loads) = CountingLoader::new();
        let cache = Arc::new(SessionCache::new(loader));
        let descriptor = ModelDescriptor::new("modelA", "/models/a");

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let descriptor = descriptor.clone();
                thread::spawn(move || cache.get(&descriptor).unwrap())
            })
            .collect();
        let handles: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        // every racer got a usable handle bound to the right model
        assert!(handles.iter().all(|h| h.dir == Path::new("/models/a")));
        assert_eq!(cache.len(), 1);

        // the surviving slot is one of the raced handles and later calls
        // reuse it without loading again
        let before = loads.load(Ordering::SeqCst);
        let again = cache.get(&descriptor).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), before);
        assert!(handles.iter().any(|h| h.serial == again.serial));
    }
}
