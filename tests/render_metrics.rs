#![cfg(unix)]

use std::{collections::HashSet, fs, os::unix::fs::PermissionsExt, path::Path};

use hugo_preview::{
    application::render::{RenderQueue, RenderQueueConfig},
    infra::{
        git::GitClient,
        telemetry::{self, RENDER_DURATION_MS, RENDER_JOBS_TOTAL},
    },
};
use metrics_util::debugging::DebuggingRecorder;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("set perms");
    path
}

#[tokio::test]
async fn render_jobs_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let dir = TempDir::new().expect("temp dir");
    let git = write_script(
        dir.path(),
        "fake-git",
        r#"case "$1" in
  clone) for last; do :; done; mkdir -p "$last" ;;
  -C) case "$3" in rev-parse) case "$6" in bad*) exit 1 ;; *) echo abcd ;; esac ;; esac ;;
esac"#,
    );
    let hugo = write_script(dir.path(), "fake-hugo", "echo built");

    let (queue, worker) = RenderQueue::new(RenderQueueConfig {
        hugo_path: hugo,
        base_url: "http://localhost:8080/".to_string(),
        git: GitClient::new(git),
    });
    let cancel = CancellationToken::new();
    let worker = worker.start(cancel.clone());

    for commit in ["abcd", "bad0"] {
        queue
            .render("https://example.invalid/site.git", commit, dir.path().join(commit))
            .await
            .await
            .expect("result");
    }
    cancel.cancel();
    worker.await.expect("worker task");

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();
    for metric in [RENDER_JOBS_TOTAL, RENDER_DURATION_MS] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let results: HashSet<String> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| composite_key.key().name() == RENDER_JOBS_TOTAL)
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .filter(|label| label.key() == "result")
                .map(|label| label.value().to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    assert!(results.contains("success"));
    assert!(results.contains("failure"));
}
