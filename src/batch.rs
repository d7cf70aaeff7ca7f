//! Batch Execution
//!
//! Runs many generation jobs, each through its own pipeline instance, and
//! reports one result per job in submission order. A failing or panicking
//! job never stops the others.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, info_span};

use crate::config::{BatchSettings, JobSpec};
use crate::error::{EmitError, Result};

/// How jobs are scheduled. Never affects outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Concurrent,
    Sequential,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concurrent => write!(f, "concurrent"),
            Self::Sequential => write!(f, "sequential"),
        }
    }
}

/// One isolated generation run, from loading through emission
pub trait Pipeline {
    fn execute(&mut self) -> Result<()>;
}

/// Human-readable identity of a job for logs and summaries
pub trait JobLabel {
    fn label(&self) -> String;
}

impl JobLabel for JobSpec {
    fn label(&self) -> String {
        self.input.display().to_string()
    }
}

impl JobLabel for String {
    fn label(&self) -> String {
        self.clone()
    }
}

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJobResult {
    /// Position in the submitted job list
    pub index: usize,
    pub input: String,
    pub success: bool,
    /// Error message only, never a backtrace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// In submission order
    pub results: Vec<BatchJobResult>,
}

impl BatchSummary {
    fn from_results(results: Vec<BatchJobResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }

    /// 0 iff every job succeeded
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 {
            0
        } else {
            1
        }
    }

    /// One line per job plus a totals line
    pub fn format_text(&self) -> String {
        let mut lines: Vec<String> = self
            .results
            .iter()
            .map(|r| match &r.error {
                None => format!("  ok     [{}] {}", r.index + 1, r.input),
                Some(message) => format!("  FAILED [{}] {}: {}", r.index + 1, r.input, message),
            })
            .collect();
        lines.push(format!(
            "{} jobs: {} succeeded, {} failed",
            self.total, self.successful, self.failed
        ));
        lines.join("\n")
    }
}

// =============================================================================
// Coordinator
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCoordinator {
    mode: ExecutionMode,
    concurrency: usize,
}

impl BatchCoordinator {
    pub fn new(mode: ExecutionMode, concurrency: usize) -> Result<Self> {
        Self::from_settings(&BatchSettings { mode, concurrency })
    }

    pub fn from_settings(settings: &BatchSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            mode: settings.mode,
            concurrency: settings.concurrency.max(1),
        })
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Run every job through a fresh pipeline from `factory`.
    ///
    /// An empty job list is rejected before anything runs. Factory errors
    /// count as job failures.
    pub fn run<J, P, F>(&self, jobs: &[J], factory: F) -> Result<BatchSummary>
    where
        J: JobLabel + Sync,
        P: Pipeline,
        F: Fn(&J) -> Result<P> + Sync,
    {
        if jobs.is_empty() {
            return Err(EmitError::EmptyBatch);
        }

        info!(jobs = jobs.len(), mode = %self.mode, "starting batch");

        let results: Vec<BatchJobResult> = match self.mode {
            ExecutionMode::Sequential => jobs
                .iter()
                .enumerate()
                .map(|(index, job)| run_job(index, job, &factory))
                .collect(),
            ExecutionMode::Concurrent => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(self.concurrency)
                    .build()
                    .map_err(|e| EmitError::InvalidOption(format!("cannot start worker pool: {}", e)))?;
                pool.install(|| {
                    jobs.par_iter()
                        .enumerate()
                        .map(|(index, job)| run_job(index, job, &factory))
                        .collect()
                })
            }
        };

        let summary = BatchSummary::from_results(results);
        info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "batch finished"
        );
        Ok(summary)
    }
}

fn run_job<J, P, F>(index: usize, job: &J, factory: &F) -> BatchJobResult
where
    J: JobLabel,
    P: Pipeline,
    F: Fn(&J) -> Result<P>,
{
    let input = job.label();
    let span = info_span!("job", index, input = %input);
    let _guard = span.enter();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut pipeline = factory(job)?;
        pipeline.execute()
    }));

    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(payload) => Some(format!("job panicked: {}", panic_message(payload.as_ref()))),
    };

    match &error {
        None => info!("job succeeded"),
        Some(message) => error!(error = %message, "job failed"),
    }

    BatchJobResult {
        index,
        input,
        success: error.is_none(),
        error,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    struct StubPipeline {
        name: String,
        delay_ms: u64,
    }

    impl Pipeline for StubPipeline {
        fn execute(&mut self) -> Result<()> {
            thread::sleep(Duration::from_millis(self.delay_ms));
            match self.name.as_str() {
                "broken" => Err(EmitError::UnresolvedRef {
                    name: "Missing".into(),
                    schema: "Pet".into(),
                    path: ".owner".into(),
                }),
                "panics" => panic!("emitter blew up"),
                _ => Ok(()),
            }
        }
    }

    fn stub(name: &String) -> Result<StubPipeline> {
        Ok(StubPipeline {
            name: name.clone(),
            delay_ms: 0,
        })
    }

    fn jobs(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_failing_job_isolated_in_both_modes() {
        let jobs = jobs(&["first", "broken", "third"]);
        let sequential = BatchCoordinator::new(ExecutionMode::Sequential, 1)
            .unwrap()
            .run(&jobs, stub)
            .unwrap();
        let concurrent = BatchCoordinator::new(ExecutionMode::Concurrent, 3)
            .unwrap()
            .run(&jobs, stub)
            .unwrap();

        for summary in [&sequential, &concurrent] {
            assert_eq!((summary.total, summary.successful, summary.failed), (3, 2, 1));
            assert!(summary.results[0].success);
            assert!(!summary.results[1].success);
            assert!(summary.results[2].success);
            assert!(summary.results[1]
                .error
                .as_deref()
                .unwrap()
                .contains("Unresolved reference to schema 'Missing'"));
            assert_eq!(summary.exit_code(), 1);
        }
        assert_eq!(sequential, concurrent);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let calls = AtomicUsize::new(0);
        let coordinator = BatchCoordinator::new(ExecutionMode::Concurrent, 2).unwrap();
        let result = coordinator.run(&Vec::<String>::new(), |name| {
            calls.fetch_add(1, Ordering::SeqCst);
            stub(name)
        });
        assert!(matches!(result, Err(EmitError::EmptyBatch)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_results_keep_submission_order() {
        let jobs = jobs(&["slow", "medium", "fast", "instant"]);
        let summary = BatchCoordinator::new(ExecutionMode::Concurrent, 4)
            .unwrap()
            .run(&jobs, |name: &String| {
                let delay_ms = match name.as_str() {
                    "slow" => 60,
                    "medium" => 30,
                    "fast" => 10,
                    _ => 0,
                };
                Ok(StubPipeline {
                    name: name.clone(),
                    delay_ms,
                })
            })
            .unwrap();

        let order: Vec<&str> = summary.results.iter().map(|r| r.input.as_str()).collect();
        assert_eq!(order, vec!["slow", "medium", "fast", "instant"]);
        assert_eq!(summary.exit_code(), 0);
    }

    struct CountingPipeline<'a> {
        in_flight: &'a AtomicUsize,
        peak: &'a AtomicUsize,
    }

    impl Pipeline for CountingPipeline<'_> {
        fn execute(&mut self) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_concurrency_limit_bounds_jobs_in_flight() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let jobs: Vec<String> = (0..8).map(|i| format!("job-{}", i)).collect();

        let summary = BatchCoordinator::new(ExecutionMode::Concurrent, 2)
            .unwrap()
            .run(&jobs, |_: &String| {
                Ok(CountingPipeline {
                    in_flight: &in_flight,
                    peak: &peak,
                })
            })
            .unwrap();

        assert_eq!(summary.successful, 8);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
        let peak = peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "{} jobs ran at once", peak);
    }

    #[test]
    fn test_panicking_job_reported_as_failure() {
        let jobs = jobs(&["ok", "panics"]);
        let summary = BatchCoordinator::new(ExecutionMode::Concurrent, 2)
            .unwrap()
            .run(&jobs, stub)
            .unwrap();
        assert!(summary.results[0].success);
        assert_eq!(
            summary.results[1].error.as_deref(),
            Some("job panicked: emitter blew up")
        );
    }

    #[test]
    fn test_factory_error_fails_only_that_job() {
        let jobs = jobs(&["a", "bad-options", "c"]);
        let summary = BatchCoordinator::new(ExecutionMode::Sequential, 1)
            .unwrap()
            .run(&jobs, |name: &String| {
                if name == "bad-options" {
                    Err(EmitError::InvalidOption("format_cache_capacity must be at least 1".into()))
                } else {
                    stub(name)
                }
            })
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert!(!summary.results[1].success);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(matches!(
            BatchCoordinator::new(ExecutionMode::Concurrent, 0),
            Err(EmitError::InvalidOption(_))
        ));
    }

    #[test]
    fn test_format_text() {
        let summary = BatchSummary::from_results(vec![
            BatchJobResult {
                index: 0,
                input: "a.yaml".into(),
                success: true,
                error: None,
            },
            BatchJobResult {
                index: 1,
                input: "b.yaml".into(),
                success: false,
                error: Some("boom".into()),
            },
        ]);
        let text = summary.format_text();
        assert!(text.contains("FAILED [2] b.yaml: boom"));
        assert!(text.ends_with("2 jobs: 1 succeeded, 1 failed"));
    }
}
