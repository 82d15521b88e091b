//! End-to-end scenarios: orchestrator, backends and reconciler against the
//! fake lifecycle manager.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use upgrade_test::client::ResourceClient;
use upgrade_test::config::{Config, DEFAULT_PREPARE_COMMAND, DEFAULT_UPGRADE_COMMAND};
use upgrade_test::operator::build_backend;
use upgrade_test::orchestrator::{RunReport, UpgradeRunner};
use upgrade_test::resources::manifests;
use upgrade_test::resources::{ResourceKind, status};

use crate::common::fixtures::{ConfigBuilder, VersionBuilder, two_version_path};
use crate::fake_cluster::{Behavior, FakeCluster};
use crate::recording_runner::RecordingRunner;

const OPERATOR: &str = "demo";
const SYSTEM_NS: &str = "cpaas-system";
const ARTIFACT: &str = "operatorhub-demo";

fn cluster(behavior: Behavior) -> Arc<FakeCluster> {
    let cluster = FakeCluster::new(OPERATOR, behavior);
    cluster.insert(
        ResourceKind::Artifact,
        manifests::artifact(ARTIFACT, SYSTEM_NS, "registry.local", "devops/demo-bundle"),
    );
    Arc::new(cluster)
}

async fn run_with(
    config: Config,
    cluster: Option<Arc<FakeCluster>>,
    runner: Arc<RecordingRunner>,
    cancel: CancellationToken,
) -> RunReport {
    let client = cluster.map(|c| c as Arc<dyn ResourceClient>);
    let backend = build_backend(&config, client, runner.clone(), cancel.clone()).unwrap();
    UpgradeRunner::new(config, backend, runner, cancel).run().await
}

async fn run(config: Config, cluster: Arc<FakeCluster>, runner: Arc<RecordingRunner>) -> RunReport {
    run_with(config, Some(cluster), runner, CancellationToken::new()).await
}

fn position(log: &[String], entry: &str, from: usize) -> Option<usize> {
    log.iter()
        .skip(from)
        .position(|l| l == entry)
        .map(|p| p + from)
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_two_version_path_prepares_then_upgrades() {
    let cluster = cluster(Behavior::default());
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .path("v1.0-to-v1.1", two_version_path())
        .build();

    let report = run(config, cluster.clone(), runner.clone()).await;

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        runner.commands(),
        vec![DEFAULT_PREPARE_COMMAND, DEFAULT_UPGRADE_COMMAND]
    );

    // Bundle version needed two observations before it was present
    let log = cluster.log();
    assert!(log.contains(&"observe ArtifactVersion operatorhub-demo.v1.0.0 2".to_string()));

    // One subscription per version, the first replaced by the second
    assert_eq!(cluster.count("create Subscription demo"), 2);
    assert_eq!(cluster.count("delete Subscription demo"), 1);

    // Each generated plan approved exactly once
    assert_eq!(cluster.count("patch InstallPlan install-1"), 1);
    assert_eq!(cluster.count("patch InstallPlan install-2"), 1);

    // Namespace created once, the second attempt tolerated
    assert_eq!(cluster.count("create Namespace demo-ns"), 1);

    let csv = cluster
        .object(ResourceKind::ClusterServiceVersion, "demo-ns", "demo.v1.1.0")
        .unwrap();
    assert_eq!(status::phase(&csv), Some("Succeeded"));
}

#[tokio::test(start_paused = true)]
async fn test_tests_run_in_workspace_sub_path() {
    let cluster = cluster(Behavior::default());
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .path(
            "p",
            vec![
                VersionBuilder::new("v1.0").test_sub_path("testing/gitlab").build(),
                VersionBuilder::new("v1.1").test_command("make smoke").build(),
            ],
        )
        .build();

    assert!(run(config, cluster, runner.clone()).await.is_success());

    let calls = runner.calls();
    assert_eq!(calls[0].command, DEFAULT_PREPARE_COMMAND);
    assert_eq!(calls[0].dir.as_deref(), Some(std::path::Path::new("/work/testing/gitlab")));
    assert_eq!(calls[1].command, "make smoke");
    assert_eq!(calls[1].dir.as_deref(), Some(std::path::Path::new("/work")));
}

// ============================================================================
// Failure policy
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_bundle_never_present_aborts_run_when_immediate() {
    let cluster = cluster(Behavior {
        present_after: None,
        ..Default::default()
    });
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .path("first", two_version_path())
        .path("second", two_version_path())
        .immediate(true)
        .build();

    let report = run(config, cluster, runner.clone()).await;

    assert!(report.aborted);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.exit_code(), 1);
    assert!(runner.calls().is_empty());

    let err = report.outcomes[0].error.as_ref().unwrap();
    assert!(err.is_timeout());
    assert!(
        err.to_string()
            .contains("ArtifactVersion cpaas-system/operatorhub-demo.v1.0.0")
    );
}

#[tokio::test(start_paused = true)]
async fn test_bundle_never_present_continues_to_next_path() {
    let cluster = cluster(Behavior {
        present_after: None,
        ..Default::default()
    });
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .path("first", two_version_path())
        .path("second", two_version_path())
        .build();

    let report = run(config, cluster, runner).await;

    assert!(!report.aborted);
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.failed(), 2);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_present_without_version_is_protocol_violation() {
    let cluster = cluster(Behavior {
        reports_version: false,
        ..Default::default()
    });
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .path("p", two_version_path())
        .build();

    let report = run(config, cluster.clone(), runner).await;

    let err = report.outcomes[0].error.as_ref().unwrap();
    assert_eq!(err.category(), "protocol_violation");
    assert_eq!(cluster.count("create Subscription demo"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_upgrade_test_aborts_path() {
    let cluster = cluster(Behavior::default());
    let runner = Arc::new(RecordingRunner::new().failing_on(DEFAULT_UPGRADE_COMMAND));
    let config = ConfigBuilder::new(OPERATOR)
        .path(
            "p",
            vec![
                VersionBuilder::new("v1.0").build(),
                VersionBuilder::new("v1.1").build(),
                VersionBuilder::new("v1.2").build(),
            ],
        )
        .build();

    let report = run(config, cluster.clone(), runner.clone()).await;

    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        runner.commands(),
        vec![DEFAULT_PREPARE_COMMAND, DEFAULT_UPGRADE_COMMAND]
    );
    // v1.2 was never published
    assert_eq!(cluster.count("create ArtifactVersion operatorhub-demo.v1.2.0"), 0);

    let err = report.outcomes[0].error.as_ref().unwrap();
    assert_eq!(err.category(), "external_command");
    assert!(err.to_string().starts_with("version v1.1"));
}

// ============================================================================
// Subscription creation backoff
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_subscription_create_survives_transient_failures() {
    let cluster = cluster(Behavior {
        failing_subscription_creates: 2,
        ..Default::default()
    });
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .path("p", vec![VersionBuilder::new("v1.0").build()])
        .build();

    let report = run(config, cluster.clone(), runner).await;

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(cluster.subscription_create_attempts(), 3);
    assert_eq!(cluster.count("create-failed Subscription demo"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_subscription_create_gives_up_after_three_attempts() {
    let cluster = cluster(Behavior {
        failing_subscription_creates: 10,
        ..Default::default()
    });
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .path("p", vec![VersionBuilder::new("v1.0").build()])
        .build();

    let report = run(config, cluster.clone(), runner.clone()).await;

    assert_eq!(cluster.subscription_create_attempts(), 3);
    let err = report.outcomes[0].error.as_ref().unwrap();
    assert!(err.to_string().contains("failed after 3 attempts"));
    assert!(runner.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_subscription_attempts_follow_operator_config() {
    let cluster = cluster(Behavior {
        failing_subscription_creates: 4,
        ..Default::default()
    });
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .subscription_retries(5)
        .path("p", vec![VersionBuilder::new("v1.0").build()])
        .build();

    let report = run(config, cluster.clone(), runner).await;

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(cluster.subscription_create_attempts(), 5);
}

// ============================================================================
// Lifecycle waits
// ============================================================================

fn single_version() -> Config {
    ConfigBuilder::new(OPERATOR)
        .path("p", vec![VersionBuilder::new("v1.0").build()])
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_subscribes_only_after_catalog_offers_version() {
    let cluster = cluster(Behavior {
        catalog_after: Some(3),
        ..Default::default()
    });
    let runner = Arc::new(RecordingRunner::new());

    let report = run(single_version(), cluster.clone(), runner).await;
    assert!(report.is_success(), "{:?}", report);

    let log = cluster.log();
    let offered = position(&log, "offer demo.v1.0.0", 0).unwrap();
    assert!(position(&log, "observe PackageManifest demo 3", 0).unwrap() < offered);
    assert!(position(&log, "observe PackageManifest demo 4", 0).is_none());
    assert!(position(&log, "create Subscription demo", offered).is_some());
    assert!(position(&log, "create Subscription demo", 0).unwrap() > offered);
}

#[tokio::test(start_paused = true)]
async fn test_catalog_never_offering_version_times_out() {
    let cluster = cluster(Behavior {
        catalog_after: None,
        ..Default::default()
    });
    let runner = Arc::new(RecordingRunner::new());

    let report = run(single_version(), cluster.clone(), runner.clone()).await;

    let err = report.outcomes[0].error.as_ref().unwrap();
    assert!(err.is_timeout(), "{}", err);
    assert!(
        err.to_string()
            .contains("PackageManifest cpaas-system/demo offering demo.v1.0.0"),
        "{}",
        err
    );
    assert_eq!(cluster.count("create Subscription demo"), 0);
    assert!(runner.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_install_plan_and_csv() {
    let cluster = cluster(Behavior {
        plan_after: Some(3),
        csv_after: Some(2),
        ..Default::default()
    });
    let runner = Arc::new(RecordingRunner::new());

    let report = run(single_version(), cluster.clone(), runner.clone()).await;
    assert!(report.is_success(), "{:?}", report);

    let log = cluster.log();
    let generated = position(&log, "generate InstallPlan install-1", 0).unwrap();
    assert_eq!(log[generated - 1], "observe Subscription demo 3");
    assert!(position(&log, "patch InstallPlan install-1", generated).is_some());
    assert_eq!(runner.commands(), vec![DEFAULT_PREPARE_COMMAND]);
}

#[tokio::test(start_paused = true)]
async fn test_install_plan_never_generated_times_out() {
    let cluster = cluster(Behavior {
        plan_after: None,
        ..Default::default()
    });
    let runner = Arc::new(RecordingRunner::new());

    let report = run(single_version(), cluster.clone(), runner.clone()).await;

    let err = report.outcomes[0].error.as_ref().unwrap();
    assert!(err.is_timeout(), "{}", err);
    assert!(
        err.to_string()
            .contains("install plan of Subscription demo-ns/demo"),
        "{}",
        err
    );
    assert_eq!(cluster.count("create Subscription demo"), 1);
    assert!(runner.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_csv_never_succeeding_times_out() {
    let cluster = cluster(Behavior {
        csv_after: None,
        ..Default::default()
    });
    let runner = Arc::new(RecordingRunner::new());

    let report = run(single_version(), cluster.clone(), runner.clone()).await;

    let err = report.outcomes[0].error.as_ref().unwrap();
    assert!(err.is_timeout(), "{}", err);
    assert!(
        err.to_string()
            .contains("ClusterServiceVersion demo-ns/demo.v1.0.0"),
        "{}",
        err
    );
    assert_eq!(cluster.count("patch InstallPlan install-1"), 1);
    assert!(runner.calls().is_empty());
}

// ============================================================================
// Bundle images
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_bundle_image_provisions_artifact() {
    let cluster = Arc::new(FakeCluster::new(OPERATOR, Behavior::default()));
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .path(
            "p",
            vec![
                VersionBuilder::new("v2.0")
                    .bundle_image("registry.local/devops/demo-bundle:v2.0.0")
                    .build(),
            ],
        )
        .build();

    assert!(run(config, cluster.clone(), runner).await.is_success());

    let artifact = cluster.object(ResourceKind::Artifact, SYSTEM_NS, ARTIFACT).unwrap();
    assert_eq!(
        status::artifact_location(&artifact),
        (Some("registry.local"), Some("devops/demo-bundle"))
    );
    let av = cluster
        .object(ResourceKind::ArtifactVersion, SYSTEM_NS, "operatorhub-demo.v2.0.0")
        .unwrap();
    assert_eq!(
        av.metadata.labels.as_ref().unwrap()[manifests::LIBRARY_LABEL],
        manifests::CUSTOM_LIBRARY
    );
}

#[tokio::test(start_paused = true)]
async fn test_recreated_bundle_version_passes_present_again() {
    let cluster = cluster(Behavior::default());
    let runner = Arc::new(RecordingRunner::new());
    let image = VersionBuilder::new("v2.0")
        .bundle_image("registry.other/devops/demo-bundle:v2.0.0")
        .build();
    let config = ConfigBuilder::new(OPERATOR)
        .path("first", vec![image.clone()])
        .path("second", vec![image])
        .build();

    let report = run(config, cluster.clone(), runner).await;
    assert!(report.is_success(), "{:?}", report);

    // Registry drift updated the pre-provisioned artifact in place, once
    assert_eq!(cluster.count("update Artifact operatorhub-demo"), 1);

    let av = "operatorhub-demo.v2.0.0";
    assert_eq!(cluster.count(&format!("create ArtifactVersion {}", av)), 2);
    assert_eq!(cluster.count(&format!("delete ArtifactVersion {}", av)), 1);

    // After the second create the version was observed from scratch
    let log = cluster.log();
    let recreated = position(&log, &format!("delete ArtifactVersion {}", av), 0).unwrap();
    let recreated = position(&log, &format!("create ArtifactVersion {}", av), recreated).unwrap();
    assert!(position(&log, &format!("observe ArtifactVersion {} 1", av), recreated).is_some());
    assert!(position(&log, &format!("observe ArtifactVersion {} 2", av), recreated).is_some());
}

// ============================================================================
// Source builds and the local backend
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_revision_without_repository_skips_source_build() {
    let cluster = cluster(Behavior::default());
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .path(
            "p",
            vec![
                VersionBuilder::new("v1.0")
                    .revision_only("main", "make bundle")
                    .build(),
            ],
        )
        .build();

    assert!(run(config, cluster.clone(), runner.clone()).await.is_success());
    assert_eq!(runner.commands(), vec![DEFAULT_PREPARE_COMMAND]);
    assert_eq!(cluster.count("create ArtifactVersion operatorhub-demo.v1.0.0"), 1);
}

#[tokio::test]
async fn test_local_backend_deploys_before_each_test() {
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .local("make deploy")
        .path("p", two_version_path())
        .build();

    let report = run_with(config, None, runner.clone(), CancellationToken::new()).await;

    assert!(report.is_success());
    assert_eq!(
        runner.commands(),
        vec![
            "make deploy",
            DEFAULT_PREPARE_COMMAND,
            "make deploy",
            DEFAULT_UPGRADE_COMMAND
        ]
    );
}

#[tokio::test]
async fn test_source_build_runs_in_checkout_and_tests_in_workspace() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .local("make deploy")
        .workspace(workspace.path())
        .cleanup(true)
        .path(
            "release/1.x",
            vec![
                VersionBuilder::new("v1.0!")
                    .source("https://git.local/ops/demo.git", "v1.0.0", "make bundle")
                    .test_sub_path("testing")
                    .build(),
            ],
        )
        .build();

    let report = run_with(config, None, runner.clone(), CancellationToken::new()).await;
    assert!(report.is_success(), "{:?}", report);

    let checkout = workspace.path().join("release_1.x").join("v1.0_");
    let calls = runner.calls();
    assert_eq!(
        calls.iter().map(|c| c.command.as_str()).collect::<Vec<_>>(),
        vec![
            "git init",
            "git remote add origin https://git.local/ops/demo.git",
            "git fetch origin v1.0.0",
            "git checkout FETCH_HEAD",
            "make bundle",
            "make deploy",
            DEFAULT_PREPARE_COMMAND,
        ]
    );
    // Only the build runs in the checkout; deploy and test use the workspace
    assert_eq!(calls[4].dir.as_deref(), Some(checkout.as_path()));
    assert_eq!(calls[5].dir.as_deref(), Some(workspace.path()));
    assert_eq!(calls[6].dir, Some(workspace.path().join("testing")));
    assert!(!checkout.exists());
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_polling_promptly() {
    let cluster = cluster(Behavior {
        present_after: None,
        ..Default::default()
    });
    let runner = Arc::new(RecordingRunner::new());
    let config = ConfigBuilder::new(OPERATOR)
        .timeout(Duration::from_secs(600))
        .path("first", two_version_path())
        .path("second", two_version_path())
        .build();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let start = tokio::time::Instant::now();
    let report = run_with(config, Some(cluster), runner, cancel).await;

    assert!(start.elapsed() < Duration::from_secs(60));
    assert!(report.aborted);
    assert_eq!(report.outcomes.len(), 1);
    assert!(report.outcomes[0].error.as_ref().unwrap().is_cancelled());
}
