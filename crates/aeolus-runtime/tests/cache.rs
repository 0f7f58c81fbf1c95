use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use aeolus_mesh::MeshFormat;
use aeolus_runtime::{
    GenerationServiceError, GeometryCache, GeometryGenerationService, GeometryKey, GeometryParams,
    MeshBlob,
};
use proptest::prelude::*;

struct Slow {
    calls: AtomicU32,
}

impl GeometryGenerationService for Slow {
    fn generate(&self, params: &GeometryParams) -> Result<MeshBlob, GenerationServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        Ok(MeshBlob::new(
            format!("{}", params.height).into_bytes(),
            MeshFormat::Stl,
        ))
    }
}

fn params(width: f64, depth: f64, height: f64) -> GeometryParams {
    GeometryParams {
        width,
        depth,
        height,
    }
}

#[test]
fn concurrent_misses_on_one_key_generate_once() {
    let generator = Arc::new(Slow {
        calls: AtomicU32::new(0),
    });
    let cache = GeometryCache::new(generator.clone());
    let blobs: Vec<Arc<MeshBlob>> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| cache.get_or_create(&params(30.0, 30.0, 100.0)).unwrap().1))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert!(blobs.iter().all(|b| Arc::ptr_eq(b, &blobs[0])));
    let stats = cache.stats();
    assert_eq!((stats.misses, stats.hits, stats.generations), (1, 7, 1));
}

#[test]
fn distinct_keys_generate_independently() {
    let generator = Arc::new(Slow {
        calls: AtomicU32::new(0),
    });
    let cache = GeometryCache::new(generator.clone());
    thread::scope(|s| {
        for h in [10.0, 20.0, 30.0, 10.0, 20.0, 30.0] {
            let cache = &cache;
            s.spawn(move || cache.get_or_create(&params(5.0, 5.0, h)).unwrap());
        }
    });
    assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    assert_eq!(cache.stats().entries, 3);
}

proptest! {
    // a key's own parameters map back to the same key
    #[test]
    fn key_is_idempotent(w in 0.001f64..1e4, d in 0.001f64..1e4, h in 0.001f64..1e4) {
        let key = GeometryKey::from_params(&params(w, d, h));
        prop_assert_eq!(GeometryKey::from_params(&key.params()), key);
    }

    // sub-micrometre noise never splits a key
    #[test]
    fn key_absorbs_float_noise(w in 1u32..100_000, noise in -1e-7f64..1e-7) {
        let base = w as f64 / 1000.0;
        let a = GeometryKey::from_params(&params(base, 1.0, 1.0));
        let b = GeometryKey::from_params(&params(base + noise, 1.0, 1.0));
        prop_assert_eq!(a, b);
    }
}
