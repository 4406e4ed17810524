//! End-to-end harness runs against the mock engine over a temp data tree.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use odharness::config::HarnessConfig;
use odharness::engine::coordinator::Batch;
use odharness::engine::runner::Harness;
use odharness::storage;
use odharness::types::{FilterVariant, HarnessError, Job};
use odharness::validation::PairingPolicy;

use crate::mock_engine::{EngineEvent, MockEngine};

struct DataTree {
    root: PathBuf,
}

impl DataTree {
    fn new() -> Self {
        let mut root = std::env::temp_dir();
        root.push(format!("odharness_it_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    fn write(&self, rel: &str, value: &Value) {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        storage::write_json(&path, value).unwrap();
    }

    /// A scenario directory with one simulation and one estimation config.
    fn scenario(&self, name: &str, samples: u64, delay_ms: u64) {
        self.write(
            &format!("{name}/{name}_sim_cfg.json"),
            &json!({"Name": name, "X0": 7000.0, "Samples": samples, "DelayMs": delay_ms}),
        );
        self.write(
            &format!("{name}/{name}_od_cfg.json"),
            &json!({
                "Name": name,
                "DelayMs": delay_ms,
                "Estimation": {"Filter": "EKF", "ProcessNoise": [1e-8, 1e-8]}
            }),
        );
    }

    fn output(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn config(&self) -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.harness.data_dir = self.root.clone();
        config.harness.batch_timeout_secs = Some(10);
        config
    }
}

impl Drop for DataTree {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn read(path: &Path) -> Vec<Value> {
    storage::read_json(path).unwrap()
}

#[tokio::test]
async fn test_full_pipeline_writes_verdicts() {
    let tree = DataTree::new();
    tree.scenario("leo", 3, 40);
    tree.scenario("geo", 6, 5);

    let engine = Arc::new(MockEngine::new());
    let harness = Harness::new(engine.clone(), tree.config());
    let report = harness.run().await.unwrap();

    assert_eq!(report.simulations, 2);
    assert_eq!(report.estimations, 4);
    assert_eq!(report.verdicts.len(), 4);

    for name in ["leo", "geo"] {
        assert!(tree.output(&format!("{name}/output/{name}_obs.json")).is_file());
        for filter in ["EKF", "UKF"] {
            assert!(tree.output(&format!("{name}/output/{name}_{filter}_fit.json")).is_file());
            assert!(tree.output(&format!("{name}/output/{name}_{filter}_diff.json")).is_file());
        }
    }

    let leo_ekf = read(&tree.output("leo/output/leo_EKF_diff.json"));
    assert_eq!(leo_ekf.len(), 3);
    assert_eq!(leo_ekf[0]["Time"], 60.0);
    assert_eq!(leo_ekf[0]["Station"], "GS1");
    assert_eq!(leo_ekf[1]["Station"], "GS2");
    assert!(leo_ekf[2]["Station"].is_null());
    assert_eq!(leo_ekf[0]["StateResidual"][0], 0.5);
    assert_eq!(leo_ekf[0]["Covariance3Sigma"][0], 3.0);
    assert_eq!(leo_ekf[0]["WithinBounds"], json!([true, true, true, true, true, true]));

    let geo_ukf = read(&tree.output("geo/output/geo_UKF_diff.json"));
    assert_eq!(geo_ukf.len(), 6);
    for row in &geo_ukf {
        assert_eq!(row["StateResidual"][0], 4.0);
        assert_eq!(row["WithinBounds"][0], false);
        assert_eq!(row["WithinBounds"][1], true);
    }

    let geo_ekf = report
        .verdicts
        .iter()
        .find(|v| v.scenario == "geo_od_cfg.json" && v.filter == FilterVariant::Ekf)
        .unwrap();
    assert_eq!(geo_ekf.summary.samples, 6);
    assert_eq!(geo_ekf.summary.fully_within, 6);
}

#[tokio::test]
async fn test_estimation_starts_after_all_simulations_finish() {
    let tree = DataTree::new();
    tree.scenario("slow", 2, 80);
    tree.scenario("fast", 2, 0);

    let engine = Arc::new(MockEngine::new());
    Harness::new(engine.clone(), tree.config()).run().await.unwrap();

    let events = engine.events();
    let last_sim_done = events
        .iter()
        .rposition(|e| matches!(e, EngineEvent::SimulateFinished(_)))
        .unwrap();
    let first_od_start = events
        .iter()
        .position(|e| matches!(e, EngineEvent::EstimateStarted { .. }))
        .unwrap();
    assert!(last_sim_done < first_od_start, "{events:?}");
}

#[tokio::test]
async fn test_each_filter_variant_requested_once_per_config() {
    let tree = DataTree::new();
    tree.scenario("leo", 2, 0);

    let engine = Arc::new(MockEngine::new());
    Harness::new(engine.clone(), tree.config()).run().await.unwrap();

    let mut filters: Vec<String> = engine
        .events()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::EstimateStarted { filter, .. } => Some(filter),
            _ => None,
        })
        .collect();
    filters.sort();
    assert_eq!(filters, vec!["EKF", "UKF"]);

    // The config on disk still selects EKF; overrides are per job.
    let on_disk: Value = storage::read_json(&tree.output("leo/leo_od_cfg.json")).unwrap();
    assert_eq!(on_disk["Estimation"]["Filter"], "EKF");
}

#[tokio::test]
async fn test_engine_failure_stops_before_estimation() {
    let tree = DataTree::new();
    tree.scenario("leo", 2, 0);

    let engine = Arc::new(MockEngine::new());
    engine.set_error("license server unreachable");
    let err = Harness::new(engine.clone(), tree.config()).run().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<HarnessError>(),
        Some(HarnessError::JobsFailed { failed: 1, expected: 1, .. })
    ));
    assert!(format!("{err:#}").contains("license server unreachable"));
    assert!(!engine
        .events()
        .iter()
        .any(|e| matches!(e, EngineEvent::EstimateStarted { .. })));
    assert!(!tree.output("leo/output/leo_EKF_fit.json").exists());
}

#[tokio::test]
async fn test_empty_data_dir_completes() {
    let tree = DataTree::new();
    let engine = Arc::new(MockEngine::new());
    let report = Harness::new(engine.clone(), tree.config()).run().await.unwrap();

    assert_eq!(report.simulations, 0);
    assert_eq!(report.estimations, 0);
    assert!(report.verdicts.is_empty());
    assert!(engine.events().is_empty());
}

#[tokio::test]
async fn test_single_filter_config() {
    let tree = DataTree::new();
    tree.scenario("leo", 2, 0);

    let mut config = tree.config();
    config.harness.filters = vec![FilterVariant::Ukf];
    config.harness.pairing = PairingPolicy::Truncate;
    let report = Harness::new(Arc::new(MockEngine::new()), config)
        .run()
        .await
        .unwrap();

    assert_eq!(report.estimations, 1);
    assert!(tree.output("leo/output/leo_UKF_diff.json").is_file());
    assert!(!tree.output("leo/output/leo_EKF_fit.json").exists());
}

#[tokio::test]
async fn test_independent_batches_wait_concurrently() {
    let tree = DataTree::new();
    let engine: Arc<MockEngine> = Arc::new(MockEngine::new());

    let batches: Vec<Batch> = (0..3)
        .map(|b| {
            let batch = Batch::new(4);
            for j in 0..4 {
                let config = json!({"Name": format!("b{b}-j{j}"), "DelayMs": 10 * j, "Samples": 1});
                let out = tree.output(&format!("b{b}_j{j}_obs.json"));
                batch
                    .submit(engine.clone(), Job::simulate(format!("b{b}-j{j}"), config, out))
                    .unwrap();
            }
            batch
        })
        .collect();

    let reports = futures::future::join_all(
        batches
            .into_iter()
            .map(|b| b.wait(Some(Duration::from_secs(10)))),
    )
    .await;

    for report in reports {
        let report = report.unwrap();
        assert_eq!(report.outcomes.len(), 4);
        report.ensure_success().unwrap();
    }
    assert_eq!(engine.events().len(), 24);
}
