use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::GenerationServiceError;
use crate::option::GeometryParams;
use crate::services::{GeometryGenerationService, MeshBlob};

// Keys are millimetre-quantised so float noise in option rows cannot split a key.
const KEY_SCALE: f64 = 1000.0;

/// Canonical generation parameters: width, depth, height in whole millimetres.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GeometryKey {
    width_mm: i64,
    depth_mm: i64,
    height_mm: i64,
}

impl GeometryKey {
    pub fn from_params(params: &GeometryParams) -> Self {
        Self {
            width_mm: quantize(params.width),
            depth_mm: quantize(params.depth),
            height_mm: quantize(params.height),
        }
    }

    /// The parameters this key stands for, as handed to the generator.
    pub fn params(&self) -> GeometryParams {
        GeometryParams {
            width: self.width_mm as f64 / KEY_SCALE,
            depth: self.depth_mm as f64 / KEY_SCALE,
            height: self.height_mm as f64 / KEY_SCALE,
        }
    }
}

impl fmt::Display for GeometryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.params();
        write!(f, "{}x{}x{}", p.width, p.depth, p.height)
    }
}

#[inline]
fn quantize(v: f64) -> i64 {
    (v * KEY_SCALE).round() as i64
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeometryCacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Successful generator calls; equals the number of distinct keys stored.
    pub generations: u64,
    pub failures: u64,
    pub entries: usize,
}

type Slot = Arc<Mutex<Option<Arc<MeshBlob>>>>;

/// Run-scoped memo of generated candidate geometry.
///
/// Each key owns a slot lock. The first caller for a key generates while holding it;
/// concurrent callers for the same key block on the slot and then read the stored
/// blob, so a key is generated once. Failed generations are not stored, and the next
/// caller for that key tries again.
pub struct GeometryCache {
    generator: Arc<dyn GeometryGenerationService>,
    slots: Mutex<HashMap<GeometryKey, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
    generations: AtomicU64,
    failures: AtomicU64,
    entries: AtomicUsize,
}

impl GeometryCache {
    pub fn new(generator: Arc<dyn GeometryGenerationService>) -> Self {
        Self {
            generator,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            generations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            entries: AtomicUsize::new(0),
        }
    }

    pub fn get_or_create(
        &self,
        params: &GeometryParams,
    ) -> Result<(GeometryKey, Arc<MeshBlob>), GenerationServiceError> {
        params.validate()?;
        let key = GeometryKey::from_params(params);
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key).or_default())
        };

        let mut entry = slot.lock();
        if let Some(blob) = entry.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!(target: "cache", "hit {key}");
            return Ok((key, Arc::clone(blob)));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let t0 = Instant::now();
        match self.generator.generate(&key.params()) {
            Ok(blob) => {
                let blob = Arc::new(blob);
                *entry = Some(Arc::clone(&blob));
                self.generations.fetch_add(1, Ordering::Relaxed);
                self.entries.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    target: "cache",
                    "generated {key}: {} bytes of {} in {} ms",
                    blob.len(),
                    blob.format,
                    t0.elapsed().as_millis()
                );
                Ok((key, blob))
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!(target: "cache", "generating {key} failed: {e}");
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> GeometryCacheStats {
        GeometryCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            generations: self.generations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            entries: self.entries.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeolus_mesh::MeshFormat;
    use std::sync::atomic::AtomicU32;

    struct Counting {
        calls: AtomicU32,
        fail_first: bool,
    }

    impl GeometryGenerationService for Counting {
        fn generate(&self, params: &GeometryParams) -> Result<MeshBlob, GenerationServiceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(GenerationServiceError::Failed("flaky".into()));
            }
            let tag = format!("{}/{}/{}", params.width, params.depth, params.height);
            Ok(MeshBlob::new(tag.into_bytes(), MeshFormat::Stl))
        }
    }

    fn params(w: f64, d: f64, h: f64) -> GeometryParams {
        GeometryParams {
            width: w,
            depth: d,
            height: h,
        }
    }

    #[test]
    fn identical_params_generate_once() {
        let generator = Arc::new(Counting {
            calls: AtomicU32::new(0),
            fail_first: false,
        });
        let cache = GeometryCache::new(generator.clone());
        let (k1, a) = cache.get_or_create(&params(30.0, 30.0, 100.0)).unwrap();
        let (k2, b) = cache.get_or_create(&params(30.0, 30.0, 100.0)).unwrap();
        assert_eq!(k1, k2);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        let s = cache.stats();
        assert_eq!((s.hits, s.misses, s.generations, s.entries), (1, 1, 1, 1));
    }

    #[test]
    fn rounding_folds_float_noise_into_one_key() {
        let a = GeometryKey::from_params(&params(30.0, 30.0, 100.0));
        let b = GeometryKey::from_params(&params(30.000_000_1, 29.999_999_9, 100.0));
        assert_eq!(a, b);
        assert_ne!(a, GeometryKey::from_params(&params(30.0, 31.0, 100.0)));
        assert_eq!(a.to_string(), "30x30x100");
    }

    #[test]
    fn failed_generation_is_not_cached() {
        let generator = Arc::new(Counting {
            calls: AtomicU32::new(0),
            fail_first: true,
        });
        let cache = GeometryCache::new(generator.clone());
        assert!(cache.get_or_create(&params(1.0, 2.0, 3.0)).is_err());
        assert!(cache.get_or_create(&params(1.0, 2.0, 3.0)).is_ok());
        let s = cache.stats();
        assert_eq!((s.failures, s.generations, s.entries), (1, 1, 1));
    }

    #[test]
    fn invalid_params_never_reach_the_generator() {
        let generator = Arc::new(Counting {
            calls: AtomicU32::new(0),
            fail_first: false,
        });
        let cache = GeometryCache::new(generator.clone());
        let err = cache.get_or_create(&params(-1.0, 2.0, 3.0)).unwrap_err();
        assert!(matches!(err, GenerationServiceError::InvalidParams(_)));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats(), GeometryCacheStats::default());
    }
}
