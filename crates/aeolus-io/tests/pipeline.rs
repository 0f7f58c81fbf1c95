use std::fs;
use std::sync::Arc;
use std::time::Duration;

use aeolus_io::{BoxGenerator, DirectoryFetch, DirectoryStorage, RESULTS_FILE, parse_config};
use aeolus_runtime::{
    AnalysisRequest, AnalysisServiceError, Collaborators, GeometryCache, Heatmap, Orchestrator,
    RetryPolicy, WindComfortAnalysisService,
};

const CONFIG: &str = r#"
options = [
    { height = 80.0, depth = 20.0, width = 20.0 },
    { height = 10.0, depth = 20.0, width = 20.0 },
    { x = 5.0, height = 80.0, depth = 20.0, width = 20.0 },
]

[analysis]
window = 50

[run]
workers = 2
top_n = 2
rank_order = "ascending"
"#;

const TERRAIN: &str = "\
v -0.3 -0.2 0
v 100.3 -0.2 0
v 100.3 100.4 10
v -0.3 100.4 10
f 1 2 3
f 1 3 4
";

const SURROUNDINGS: &str = "\
v 5 5 0
v 9 5 0
v 9 9 0
v 5 9 0
v 5 5 15
v 9 5 15
v 9 9 15
v 5 9 15
f 5 6 7
f 5 7 8
";

/// Fixed score per option index; every cell of the window reads the same.
struct Table(Vec<f64>);

impl WindComfortAnalysisService for Table {
    fn analyze(&self, req: &AnalysisRequest) -> Result<Heatmap, AnalysisServiceError> {
        assert_eq!(req.terrain.len(), 50 * 50);
        assert_eq!(req.augmented.len(), req.terrain.len());
        Ok(Heatmap::unmasked(vec![self.0[req.option]; req.terrain.len()]))
    }
}

#[test]
fn local_adapters_drive_a_full_run() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("terrain.obj"), TERRAIN).unwrap();
    fs::write(dir.path().join("context.obj"), SURROUNDINGS).unwrap();
    let cfg = parse_config(CONFIG, &dir.path().join("aeolus.toml")).unwrap();

    let mut settings = cfg.run_settings();
    settings.retry = RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };
    let out = dir.path().join("out");
    let storage = Arc::new(DirectoryStorage::new(&out));
    let services = Collaborators {
        fetch: Arc::new(DirectoryFetch::new(
            dir.path().join("terrain.obj"),
            dir.path().join("context.obj"),
        )),
        analysis: Arc::new(Table(vec![3.0, 1.0, 2.0])),
        top_sink: storage.clone(),
        results_sink: storage,
    };
    let cache = Arc::new(GeometryCache::new(Arc::new(BoxGenerator)));
    let report = Orchestrator::new(settings, services, cache)
        .run(&cfg.options)
        .unwrap();

    assert!(report.failed.is_empty());
    assert_eq!(report.ranked.len(), 3);
    // two options share a massing
    assert_eq!(report.cache_stats.generations, 2);
    let order: Vec<usize> = report.ranked.iter().map(|r| r.index).collect();
    assert_eq!(order, vec![1, 2, 0]);
    assert_eq!(report.ranked[0].score, 1.0);

    assert!(out.join("alternative-0.stl").exists());
    assert!(out.join("alternative-1.stl").exists());
    assert!(!out.join("alternative-2.stl").exists());
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join(RESULTS_FILE)).unwrap()).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 3);
    assert_eq!(json[0]["index"], 1);
}
