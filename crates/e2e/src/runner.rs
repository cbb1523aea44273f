//! Main test runner that orchestrates the application target and Playwright

use std::path::PathBuf;
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::E2eResult;
use crate::playwright::{artifact_stem, PlaywrightConfig, PlaywrightHandle, StepResult};
use crate::server::{self, ServerConfig, ServerHandle};
use crate::spec::{SuiteSpec, TestSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
}

impl TestResult {
    fn skipped(spec: &TestSpec) -> Self {
        Self {
            name: spec.name.clone(),
            status: TestStatus::Skipped,
            duration_ms: 0,
            steps: vec![],
            error: None,
            skip_reason: spec.skip.clone(),
            screenshot_path: None,
        }
    }

    fn errored(spec: &TestSpec, error: String, duration_ms: u64) -> Self {
        Self {
            name: spec.name.clone(),
            status: TestStatus::Failed,
            duration_ms,
            steps: vec![],
            error: Some(error),
            skip_reason: None,
            screenshot_path: None,
        }
    }
}

/// Results for one suite, in declaration order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub name: String,
    pub file: String,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<TestResult>,
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub suites: Vec<SuiteResult>,
}

impl TestRunResult {
    /// Skipped tests never count against the run
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Which tests to run
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub tag: Option<String>,
    /// Substring of the test name
    pub name: Option<String>,
    /// Exact suite name
    pub suite: Option<String>,
}

impl Selection {
    pub fn matches(&self, suite: &SuiteSpec, test: &TestSpec) -> bool {
        self.suite.as_ref().map_or(true, |s| &suite.name == s)
            && self.tag.as_ref().map_or(true, |t| test.has_tag(t))
            && self.name.as_ref().map_or(true, |n| test.name.contains(n.as_str()))
    }
}

/// Where the application under test lives
#[derive(Debug, Clone)]
pub enum Target {
    /// Already running, e.g. a staging deployment
    External { base_url: String },
    /// Spawned and stopped by the runner
    Spawn(ServerConfig),
}

/// Main E2E test runner
pub struct TestRunner {
    target: Target,

    /// Playwright configuration (base URL is filled in from the target)
    playwright_config: PlaywrightConfig,

    /// Readiness settings for external targets
    ready_path: String,
    startup_timeout: Duration,

    /// Maximum number of tests in flight
    workers: usize,

    /// Output directory for results
    output_dir: PathBuf,

    /// Running server handle (if any)
    server: Option<ServerHandle>,

    playwright: Option<PlaywrightHandle>,
}

impl TestRunner {
    /// Create a test runner with custom configuration
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            target: config.target,
            playwright_config: config.playwright,
            ready_path: config.ready_path,
            startup_timeout: config.startup_timeout,
            workers: config.workers.max(1),
            output_dir: config.output_dir,
            server: None,
            playwright: None,
        }
    }

    /// Bring up the target and the browser driver, once
    async fn prepare(&mut self) -> E2eResult<()> {
        if self.playwright.is_some() {
            return Ok(());
        }

        let base_url = match &self.target {
            Target::External { base_url } => {
                server::wait_for_ready(base_url, &self.ready_path, self.startup_timeout).await?;
                base_url.clone()
            }
            Target::Spawn(config) => {
                let server = ServerHandle::spawn(config.clone()).await?;
                let base_url = server.base_url().to_string();
                self.server = Some(server);
                base_url
            }
        };

        self.playwright_config.base_url = base_url;
        self.playwright = Some(PlaywrightHandle::new(self.playwright_config.clone())?);
        Ok(())
    }

    /// Stop the server
    pub fn stop_server(&mut self) -> E2eResult<()> {
        if let Some(mut server) = self.server.take() {
            server.stop()?;
        }
        Ok(())
    }

    /// Run the selected tests of every suite
    pub async fn run_suites(
        &mut self,
        suites: &[SuiteSpec],
        selection: &Selection,
    ) -> E2eResult<TestRunResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        let selected: Vec<(&SuiteSpec, Vec<&TestSpec>)> = suites
            .iter()
            .map(|suite| {
                let tests: Vec<&TestSpec> =
                    suite.tests.iter().filter(|t| selection.matches(suite, t)).collect();
                (suite, tests)
            })
            .filter(|(_, tests)| !tests.is_empty())
            .collect();

        let runnable: Vec<Job> = selected
            .iter()
            .enumerate()
            .flat_map(|(si, (suite, tests))| {
                tests
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| !t.is_skipped())
                    .map(move |(ti, t)| Job {
                        suite_index: si,
                        test_index: ti,
                        stem: artifact_stem(si, ti, &suite.name, &t.name),
                        spec: *t,
                    })
            })
            .collect();

        let total: usize = selected.iter().map(|(_, tests)| tests.len()).sum();
        info!("Running {} test(s), {} runnable...", total, runnable.len());

        let mut executed = Vec::new();
        if !runnable.is_empty() {
            self.prepare().await?;
            if let Some(playwright) = &self.playwright {
                executed = execute(playwright, runnable, self.workers).await;
            }
        }

        let mut suite_results: Vec<SuiteResult> = selected
            .iter()
            .map(|(suite, tests)| SuiteResult {
                name: suite.name.clone(),
                file: suite.file.clone(),
                passed: 0,
                failed: 0,
                skipped: 0,
                results: tests.iter().map(|t| TestResult::skipped(t)).collect(),
            })
            .collect();

        for (si, ti, result) in executed {
            suite_results[si].results[ti] = result;
        }

        let (mut passed, mut failed, mut skipped) = (0, 0, 0);
        for suite in &mut suite_results {
            for result in &suite.results {
                match result.status {
                    TestStatus::Passed => suite.passed += 1,
                    TestStatus::Failed => suite.failed += 1,
                    TestStatus::Skipped => {
                        info!(
                            "- {} › {} (skipped: {})",
                            suite.name,
                            result.name,
                            result.skip_reason.as_deref().unwrap_or("not selected")
                        );
                        suite.skipped += 1;
                    }
                }
            }
            passed += suite.passed;
            failed += suite.failed;
            skipped += suite.skipped;
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!("Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms);

        Ok(TestRunResult {
            started_at,
            total,
            passed,
            failed,
            skipped,
            duration_ms,
            suites: suite_results,
        })
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestRunResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        let _ = self.stop_server();
    }
}

/// A runnable test and where its result goes
struct Job<'a> {
    suite_index: usize,
    test_index: usize,
    stem: String,
    spec: &'a TestSpec,
}

/// Run tests with at most `workers` browsers alive at once
async fn execute(
    playwright: &PlaywrightHandle,
    jobs: Vec<Job<'_>>,
    workers: usize,
) -> Vec<(usize, usize, TestResult)> {
    stream::iter(jobs)
        .map(|job| async move {
            let result = run_spec(playwright, job.spec, &job.stem).await;
            (job.suite_index, job.test_index, result)
        })
        .buffer_unordered(workers)
        .collect()
        .await
}

/// Run a single test spec
async fn run_spec(playwright: &PlaywrightHandle, spec: &TestSpec, stem: &str) -> TestResult {
    let start = Instant::now();
    debug!("Running test: {}", spec.name);

    let result = match playwright.run_test(spec, stem).await {
        Ok(run) => TestResult {
            name: spec.name.clone(),
            status: if run.success() { TestStatus::Passed } else { TestStatus::Failed },
            duration_ms: start.elapsed().as_millis() as u64,
            steps: run.steps,
            error: run.error,
            skip_reason: None,
            screenshot_path: run.screenshot_path,
        },
        Err(e) => TestResult::errored(spec, e.to_string(), start.elapsed().as_millis() as u64),
    };

    match result.status {
        TestStatus::Passed => info!("✓ {} ({} ms)", result.name, result.duration_ms),
        _ => error!("✗ {} - {}", result.name, result.error.as_deref().unwrap_or("unknown error")),
    }

    result
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub target: Target,
    pub playwright: PlaywrightConfig,
    pub ready_path: String,
    pub startup_timeout: Duration,
    pub workers: usize,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            target: Target::External { base_url: "http://127.0.0.1:4242".to_string() },
            playwright: PlaywrightConfig::default(),
            ready_path: "/".to_string(),
            startup_timeout: Duration::from_secs(30),
            workers: 1,
            output_dir: PathBuf::from("test-results"),
        }
    }
}
