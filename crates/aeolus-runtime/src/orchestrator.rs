use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use aeolus_geom::{Aabb, Vec3};
use aeolus_mesh::{LoadOptions, Mesh, load_mesh_with};
use aeolus_raster::{DEFAULT_WINDOW, HeightMap, RasterSettings, Rasterizer, crop, merge};
use crossbeam_channel::unbounded;
use rayon::ThreadPoolBuilder;
use serde::Deserialize;

use crate::cache::{GeometryCache, GeometryCacheStats};
use crate::error::{OptionError, RunError, Stage, StageError};
use crate::option::{DesignOption, OptionResult};
use crate::retry::RetryPolicy;
use crate::score::{ScoreOrder, mean_unmasked, rank};
use crate::services::{
    AnalysisRequest, AssetKind, FullResultsSink, MeshBlob, MeshFetchService, TopNSink,
    WindComfortAnalysisService, WindRose,
};

/// What a failed option does to the rest of the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure, keep going, rank and store the options that succeeded.
    #[default]
    Isolate,
    /// Cancel options that have not finished and fail the run with the first error.
    Abort,
}

/// Worker count used when none is configured: available cores, at most 4.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(4)
}

#[derive(Clone, Debug)]
pub struct RunSettings {
    pub raster: RasterSettings,
    /// How terrain and surroundings are read. Candidates are always read Z-up.
    pub load: LoadOptions,
    /// Side of the square window sent to analysis.
    pub window: usize,
    /// Options evaluated at once; bounds in-flight analysis requests.
    pub workers: usize,
    pub top_n: usize,
    pub rank_order: ScoreOrder,
    pub failure_policy: FailurePolicy,
    /// Score given to an option whose heatmap is fully masked.
    pub empty_score: f64,
    pub wind_rose: WindRose,
    pub retry: RetryPolicy,
}

impl RunSettings {
    pub fn new(rank_order: ScoreOrder) -> Self {
        Self {
            raster: RasterSettings::default(),
            load: LoadOptions::default(),
            window: DEFAULT_WINDOW,
            workers: default_workers(),
            top_n: 5,
            rank_order,
            failure_policy: FailurePolicy::default(),
            empty_score: 0.0,
            wind_rose: WindRose::default(),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct Collaborators {
    pub fetch: Arc<dyn MeshFetchService>,
    pub analysis: Arc<dyn WindComfortAnalysisService>,
    pub top_sink: Arc<dyn TopNSink>,
    pub results_sink: Arc<dyn FullResultsSink>,
}

#[derive(Debug)]
pub struct RunReport {
    /// Successful options, best first.
    pub ranked: Vec<OptionResult>,
    /// Option indices handed to the top-N sink, best first.
    pub top: Vec<usize>,
    /// Failed options in option order.
    pub failed: Vec<OptionError>,
    pub cache_stats: GeometryCacheStats,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn best(&self) -> Option<&OptionResult> {
        self.ranked.first()
    }
}

// Shared, read-only state of one run.
struct Site {
    bbox: Aabb,
    terrain: HeightMap,
    surroundings: HeightMap,
    /// Terrain alone, cropped to the analysis window.
    plain: HeightMap,
}

/// Drives one analysis run: rasterize the site once, evaluate every design option on
/// a bounded worker pool, rank, and hand the results to the storage sinks.
pub struct Orchestrator {
    settings: RunSettings,
    services: Collaborators,
    cache: Arc<GeometryCache>,
    rasterizer: Rasterizer,
}

impl Orchestrator {
    pub fn new(settings: RunSettings, services: Collaborators, cache: Arc<GeometryCache>) -> Self {
        let rasterizer = Rasterizer::new(settings.raster);
        Self {
            settings,
            services,
            cache,
            rasterizer,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn cache(&self) -> &GeometryCache {
        &self.cache
    }

    pub fn run(&self, options: &[DesignOption]) -> Result<RunReport, RunError> {
        let t0 = Instant::now();
        let site = self.prepare_site()?;
        log::info!(
            target: "orchestrator",
            "site {}x{} cells, evaluating {} options on {} workers",
            site.terrain.width(),
            site.terrain.height(),
            options.len(),
            self.settings.workers.max(1)
        );

        let (results, failed) = self.evaluate_all(&site, options)?;
        for e in &failed {
            log::warn!(target: "orchestrator", "{e}");
        }

        let ranked = rank(results, self.settings.rank_order);
        let top_count = self.settings.top_n.min(ranked.len());
        let top_geometry: Vec<Arc<MeshBlob>> = ranked[..top_count]
            .iter()
            .map(|r| Arc::clone(&r.geometry))
            .collect();
        self.services
            .top_sink
            .store_top(&top_geometry)
            .map_err(|source| RunError::Store {
                sink: "top-n",
                source,
            })?;
        self.services
            .results_sink
            .store_all(&ranked)
            .map_err(|source| RunError::Store {
                sink: "full",
                source,
            })?;

        let report = RunReport {
            top: ranked[..top_count].iter().map(|r| r.index).collect(),
            ranked,
            failed,
            cache_stats: self.cache.stats(),
            elapsed: t0.elapsed(),
        };
        log::info!(
            target: "orchestrator",
            "run done in {} ms: {} scored, {} failed, {} generations for {} lookups",
            report.elapsed.as_millis(),
            report.ranked.len(),
            report.failed.len(),
            report.cache_stats.generations,
            report.cache_stats.hits + report.cache_stats.misses
        );
        Ok(report)
    }

    fn load_asset(&self, asset: AssetKind) -> Result<Mesh, RunError> {
        let blob = self.services.fetch.fetch(asset)?;
        let mesh = load_mesh_with(&blob.bytes, blob.format, &self.settings.load)
            .map_err(|source| RunError::Load { asset, source })?;
        log::info!(
            target: "orchestrator",
            "{asset}: {} {} bytes, {} faces",
            blob.format,
            blob.len(),
            mesh.face_count()
        );
        Ok(mesh)
    }

    fn prepare_site(&self) -> Result<Site, RunError> {
        let terrain = self.load_asset(AssetKind::Terrain)?;
        let surroundings = self.load_asset(AssetKind::Surroundings)?;
        let bbox = terrain.bounds().ok_or(RunError::EmptyTerrain)?;

        let raster = |asset: AssetKind, mesh: &Mesh| {
            self.rasterizer
                .rasterize(mesh, Some(&bbox))
                .map_err(|source| RunError::Rasterize { asset, source })
        };
        let terrain_map = raster(AssetKind::Terrain, &terrain)?;
        let surroundings_map = raster(AssetKind::Surroundings, &surroundings)?;
        let plain = crop(&terrain_map, self.settings.window).map_err(RunError::Crop)?;
        log::debug!(
            target: "orchestrator",
            "site window {}x{}: {} of {} cells hit, mean depth {:?}",
            plain.width(),
            plain.height(),
            plain.hit_count(),
            plain.width() * plain.height(),
            plain.mean()
        );
        Ok(Site {
            bbox,
            terrain: terrain_map,
            surroundings: surroundings_map,
            plain,
        })
    }

    // Results come back over a channel tagged with the option index, so completion
    // order never leaks into the output.
    fn evaluate_all(
        &self,
        site: &Site,
        options: &[DesignOption],
    ) -> Result<(Vec<OptionResult>, Vec<OptionError>), RunError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.settings.workers.max(1))
            .thread_name(|i| format!("aeolus-option-{i}"))
            .build()?;
        let (tx, rx) = unbounded::<(usize, Result<OptionResult, OptionError>)>();
        let cancel = AtomicBool::new(false);
        let abort = self.settings.failure_policy == FailurePolicy::Abort;

        pool.scope(|s| {
            for (index, option) in options.iter().enumerate() {
                let tx = tx.clone();
                let cancel = &cancel;
                s.spawn(move |_| {
                    let out = self.evaluate(site, index, option, cancel);
                    if abort && out.as_ref().is_err_and(|e| !e.is_cancelled()) {
                        cancel.store(true, Ordering::Relaxed);
                    }
                    let _ = tx.send((index, out));
                });
            }
        });
        drop(tx);

        let mut results = Vec::with_capacity(options.len());
        let mut failed = Vec::new();
        let mut cause: Option<usize> = None;
        for (index, out) in rx.iter() {
            match out {
                Ok(r) => results.push(r),
                Err(e) => {
                    if abort && cause.is_none() && !e.is_cancelled() {
                        cause = Some(index);
                    }
                    failed.push(e);
                }
            }
        }

        if let Some(index) = cause {
            let skipped = failed.iter().filter(|e| e.is_cancelled()).count();
            log::error!(
                target: "orchestrator",
                "option {index} failed, aborting run ({} completed, {skipped} cancelled)",
                results.len()
            );
            if let Some(pos) = failed.iter().position(|e| e.option == index) {
                return Err(RunError::Aborted(failed.swap_remove(pos)));
            }
        }

        results.sort_by_key(|r| r.index);
        failed.sort_by_key(|e| e.option);
        Ok((results, failed))
    }

    fn evaluate(
        &self,
        site: &Site,
        index: usize,
        option: &DesignOption,
        cancel: &AtomicBool,
    ) -> Result<OptionResult, OptionError> {
        let enter = |stage: Stage| {
            if cancel.load(Ordering::Relaxed) {
                return Err(OptionError::new(index, stage, StageError::Cancelled));
            }
            log::debug!(target: "orchestrator", "option {index}: {stage}");
            Ok(())
        };

        enter(Stage::Generate)?;
        let (key, geometry) = self
            .cache
            .get_or_create(&option.geometry_params())
            .map_err(at(index, Stage::Generate))?;

        enter(Stage::Load)?;
        // generated geometry is always Z-up; `settings.load` describes the site assets
        let mesh = load_mesh_with(&geometry.bytes, geometry.format, &LoadOptions::default())
            .map_err(at(index, Stage::Load))?;
        let mesh = place(&mesh, &site.bbox, option);

        enter(Stage::Rasterize)?;
        let candidate = self
            .rasterizer
            .rasterize(&mesh, Some(&site.bbox))
            .map_err(at(index, Stage::Rasterize))?;

        enter(Stage::Merge)?;
        let composite =
            merge(&site.terrain, &[&site.surroundings, &candidate]).map_err(at(index, Stage::Merge))?;

        enter(Stage::Crop)?;
        let augmented = crop(&composite, self.settings.window).map_err(at(index, Stage::Crop))?;

        enter(Stage::Analyze)?;
        let request = AnalysisRequest::from_maps(index, &site.plain, &augmented, &self.settings.wind_rose)
            .map_err(at(index, Stage::Analyze))?;
        let label = format!("option {index} analysis");
        let heatmap = self
            .settings
            .retry
            .run(
                &label,
                |_| self.services.analysis.analyze(&request),
                |e| e.transient,
            )
            .map_err(at(index, Stage::Analyze))?;

        enter(Stage::Score)?;
        let (score, scored_cells) = match mean_unmasked(&heatmap) {
            Some(scored) => scored,
            None => {
                log::warn!(
                    target: "orchestrator",
                    "option {index}: heatmap fully masked, scoring {}",
                    self.settings.empty_score
                );
                (self.settings.empty_score, 0)
            }
        };
        log::info!(target: "orchestrator", "option {index} ({key}) scored {score:.4}");

        Ok(OptionResult {
            index,
            option: *option,
            key,
            geometry,
            score,
            scored_cells,
        })
    }
}

fn at<E: Into<StageError>>(index: usize, stage: Stage) -> impl FnOnce(E) -> OptionError {
    move |e| OptionError::new(index, stage, e)
}

/// Move a candidate so its footprint centre sits at the site centre offset by the
/// option's (x, y). Heights are left as generated.
pub fn place(mesh: &Mesh, site: &Aabb, option: &DesignOption) -> Mesh {
    let Some(bounds) = mesh.bounds() else {
        return mesh.clone();
    };
    let target = site.center();
    let from = bounds.center();
    mesh.translated(Vec3::new(
        target.x + option.x as f32 - from.x,
        target.y + option.y as f32 - from.y,
        0.0,
    ))
}
