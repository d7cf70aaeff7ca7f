//! Batch tests over real fixture files

use std::fs;
use std::path::{Path, PathBuf};

use schema_emit::{BatchCoordinator, EmitConfig, ExecutionMode, FileJob, JobSpec};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn config_for(out: &Path) -> EmitConfig {
    let mut config = EmitConfig::default();
    config.jobs = vec![
        JobSpec::new(fixture("petstore.yaml"), out.join("petstore.json")),
        JobSpec::new(fixture("broken_ref.json"), out.join("broken.json")),
        JobSpec::new(fixture("catalog.json"), out.join("catalog.json")),
    ];
    config
}

#[test]
fn test_broken_document_fails_alone() {
    for mode in [ExecutionMode::Sequential, ExecutionMode::Concurrent] {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());

        let summary = BatchCoordinator::new(mode, 2)
            .unwrap()
            .run(&config.jobs, |job| FileJob::from_config(&config, job))
            .unwrap();

        assert_eq!(summary.total, 3, "mode {}", mode);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exit_code(), 1);

        assert!(summary.results[0].success);
        assert!(!summary.results[1].success);
        assert!(summary.results[2].success);
        let message = summary.results[1].error.as_deref().unwrap();
        assert!(message.contains("Person"), "unexpected error: {}", message);

        assert!(dir.path().join("petstore.json").exists());
        assert!(dir.path().join("catalog.json").exists());
        assert!(!dir.path().join("broken.json").exists());
    }
}

#[test]
fn test_modes_write_identical_manifests() {
    let sequential_dir = tempfile::tempdir().unwrap();
    let concurrent_dir = tempfile::tempdir().unwrap();

    for (mode, dir) in [
        (ExecutionMode::Sequential, &sequential_dir),
        (ExecutionMode::Concurrent, &concurrent_dir),
    ] {
        let config = config_for(dir.path());
        BatchCoordinator::new(mode, 3)
            .unwrap()
            .run(&config.jobs, |job| FileJob::from_config(&config, job))
            .unwrap();
    }

    for name in ["petstore.json", "catalog.json"] {
        let a = fs::read_to_string(sequential_dir.path().join(name)).unwrap();
        let b = fs::read_to_string(concurrent_dir.path().join(name)).unwrap();
        assert_eq!(a, b, "{} differs between modes", name);
    }
}

#[test]
fn test_invalid_job_option_fails_only_that_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(dir.path());
    config.jobs[0].format_cache_capacity = Some(0);
    config.jobs[2]
        .custom_formats
        .insert("sku".into(), "[unclosed".into());
    config.jobs[1] = JobSpec::new(fixture("petstore.yaml"), dir.path().join("ok.json"));

    let summary = BatchCoordinator::new(ExecutionMode::Concurrent, 2)
        .unwrap()
        .run(&config.jobs, |job| FileJob::from_config(&config, job))
        .unwrap();

    assert_eq!(summary.failed, 2);
    assert!(summary.results[1].success);
    assert!(dir.path().join("ok.json").exists());
}
