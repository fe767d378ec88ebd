//! Main test runner that orchestrates the browser, sessions and visual regression

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::browser::TestBrowser;
use crate::client::ApiClient;
use crate::commands::Session;
use crate::config::RunnerConfig;
use crate::error::{E2eError, E2eResult};
use crate::executor::StepResult;
use crate::fixtures::{FixtureContext, FixtureStore};
use crate::scenario::{Scenario, Step};
use crate::visual::{VisualDiff, VisualTester};
use crate::wait::WaitConfig;

/// Result of one case of a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

impl CaseResult {
    fn blocked(name: &str, setup_error: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            duration_ms: 0,
            steps: vec![],
            error: Some(format!("before hook failed: {setup_error}")),
        }
    }
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub user: Option<String>,
    pub before: Vec<StepResult>,
    pub cases: Vec<CaseResult>,
    pub after: Vec<StepResult>,
    pub visual_diffs: Vec<VisualDiff>,
    pub error: Option<String>,
}

impl TestResult {
    fn errored(name: &str, e: &E2eError) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            duration_ms: 0,
            user: None,
            before: vec![],
            cases: vec![],
            after: vec![],
            visual_diffs: vec![],
            error: Some(e.to_string()),
        }
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub started_at: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn from_results(started_at: String, duration_ms: u64, results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            started_at,
            total: results.len(),
            passed,
            failed: results.len() - passed,
            skipped: 0,
            duration_ms,
            results,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Steps run in order; the first failure ends the block.
struct BlockOutcome {
    steps: Vec<StepResult>,
    error: Option<String>,
    screenshots: Vec<String>,
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,
    client: ApiClient,

    /// Shared by every scenario in the suite
    browser: Option<TestBrowser>,
}

impl TestRunner {
    /// Create a test runner with custom configuration
    pub fn with_config(config: RunnerConfig) -> E2eResult<Self> {
        let client = ApiClient::new(&config.target)?;
        Ok(Self {
            config,
            client,
            browser: None,
        })
    }

    /// Wait for the server and launch the browser
    pub async fn start(&mut self) -> E2eResult<()> {
        if self.browser.is_some() {
            return Ok(());
        }

        info!("Waiting for {} to come up...", self.client.base_url());
        self.client
            .wait_until_ready(self.config.target.startup_timeout)
            .await?;

        self.browser = Some(TestBrowser::launch(&self.config.browser).await?);
        Ok(())
    }

    /// Close the browser
    pub async fn shutdown(&mut self) -> E2eResult<()> {
        if let Some(browser) = self.browser.take() {
            browser.close().await?;
        }
        Ok(())
    }

    /// Run all scenarios in the scenarios directory
    pub async fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        self.run_scenarios(&scenarios).await
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        let filtered: Vec<Scenario> = Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_scenarios(&filtered).await
    }

    /// Run a specific scenario by name
    pub async fn run_test(&mut self, name: &str) -> E2eResult<TestResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        let scenario = scenarios
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::ScenarioParse(format!("Scenario not found: {}", name)))?;

        self.start().await?;
        self.run_scenario(&scenario).await
    }

    /// Run a list of scenarios
    pub async fn run_scenarios(&mut self, scenarios: &[Scenario]) -> E2eResult<TestSuiteResult> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let start = Instant::now();
        let mut results = Vec::new();

        self.start().await?;

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            match self.run_scenario(scenario).await {
                Ok(result) => {
                    if result.success {
                        info!("✓ {} ({} ms)", result.name, result.duration_ms);
                    } else {
                        error!(
                            "✗ {} - {}",
                            result.name,
                            result.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    results.push(result);
                }
                Err(e) => {
                    error!("✗ {} - {}", scenario.name, e);
                    results.push(TestResult::errored(&scenario.name, &e));
                }
            }
        }

        let suite =
            TestSuiteResult::from_results(started_at, start.elapsed().as_millis() as u64, results);

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.skipped, suite.duration_ms
        );

        Ok(suite)
    }

    /// Run one scenario on a fresh page with a fresh fixture context
    pub async fn run_scenario(&self, scenario: &Scenario) -> E2eResult<TestResult> {
        let start = Instant::now();
        debug!(
            "Running scenario: {} ({} steps)",
            scenario.name,
            scenario.step_count()
        );

        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| E2eError::BrowserLaunch("runner not started".to_string()))?;

        let visual = VisualTester::new(self.config.visual.clone())?;
        let page = browser
            .new_page(
                self.client.base_url(),
                WaitConfig::with_timeout(self.config.assertion_timeout),
            )
            .await?;
        let viewport = page
            .set_viewport(scenario.viewport.width, scenario.viewport.height)
            .await;
        if let Err(e) = viewport {
            if let Err(close_err) = page.close().await {
                debug!("Closing page failed: {}", close_err);
            }
            return Err(e);
        }

        let context = FixtureContext::generate(&self.config.target.user_password);
        let user = context.user.username.clone();
        let mut session = Session::new(
            page,
            self.client.clone(),
            FixtureStore::new(self.config.fixtures_dir.clone()),
            visual,
            context,
        );

        let before = run_block(&mut session, &scenario.before).await;
        let mut screenshots = before.screenshots;
        let mut test_error = before.error.clone();

        let mut cases = Vec::with_capacity(scenario.cases.len());
        for (index, case) in scenario.cases.iter().enumerate() {
            if let Some(setup_error) = &before.error {
                cases.push(CaseResult::blocked(&case.name, setup_error));
                continue;
            }

            if index > 0 {
                if let Err(e) = session.reset_between_cases().await {
                    warn!("Could not reset cookies before '{}': {}", case.name, e);
                }
            }

            let case_start = Instant::now();
            let outcome = run_block(&mut session, &case.steps).await;
            screenshots.extend(outcome.screenshots);

            match &outcome.error {
                None => info!("  ✓ {}", case.name),
                Some(e) => {
                    error!("  ✗ {} - {}", case.name, e);
                    test_error.get_or_insert_with(|| format!("{}: {}", case.name, e));
                }
            }

            cases.push(CaseResult {
                name: case.name.clone(),
                success: outcome.error.is_none(),
                duration_ms: case_start.elapsed().as_millis() as u64,
                steps: outcome.steps,
                error: outcome.error,
            });
        }

        let after = run_block(&mut session, &scenario.after).await;
        if let Some(e) = &after.error {
            warn!("after hook of '{}' failed: {}", scenario.name, e);
        }

        // Visual regression testing
        let mut visual_diffs = Vec::new();
        if scenario.visual_regression && test_error.is_none() {
            let visual_tester = session.visual();

            for screenshot_name in &screenshots {
                match visual_tester.compare(screenshot_name, Some(scenario.visual_threshold)) {
                    Ok(diff) => {
                        if !diff.matches {
                            test_error = Some(format!(
                                "Visual regression in '{}': {:.2}% pixels differ",
                                screenshot_name, diff.diff_percent
                            ));
                        }
                        visual_diffs.push(diff);
                    }
                    Err(E2eError::BaselineNotFound(_)) => {
                        info!(
                            "No baseline for '{}' - will be created on next run with --update-baselines",
                            screenshot_name
                        );
                    }
                    Err(e) => {
                        test_error = Some(format!("Visual comparison error: {}", e));
                    }
                }
            }
        }

        if let Err(e) = session.close().await {
            debug!("Closing page failed: {}", e);
        }

        Ok(TestResult {
            name: scenario.name.clone(),
            success: test_error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            user: Some(user),
            before: before.steps,
            cases,
            after: after.steps,
            visual_diffs,
            error: test_error,
        })
    }

    /// Update all visual baselines from current screenshots
    pub fn update_baselines(&self) -> E2eResult<Vec<String>> {
        let visual_tester = VisualTester::new(self.config.visual.clone())?;
        let updated = visual_tester.update_all_baselines()?;
        info!("Updated {} baseline(s)", updated.len());
        Ok(updated)
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

async fn run_block(session: &mut Session, steps: &[Step]) -> BlockOutcome {
    let mut outcome = BlockOutcome {
        steps: Vec::with_capacity(steps.len()),
        error: None,
        screenshots: Vec::new(),
    };

    for step in steps {
        let result = session.execute_step(step).await;

        if !result.success {
            outcome.error = result.error.clone();
            outcome.steps.push(result);
            break;
        }

        if let Some(name) = compared_screenshot(step, &result) {
            outcome.screenshots.push(name.to_string());
        }

        outcome.steps.push(result);
    }

    outcome
}

/// Only plain screenshots are compared after the run.
fn compared_screenshot<'a>(step: &Step, result: &'a StepResult) -> Option<&'a str> {
    match step {
        Step::Screenshot { .. } => result.screenshot.as_deref(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, success: bool) -> TestResult {
        TestResult {
            name: name.to_string(),
            success,
            duration_ms: 1,
            user: Some("abcdefghij".to_string()),
            before: vec![],
            cases: vec![],
            after: vec![],
            visual_diffs: vec![],
            error: (!success).then(|| "boom".to_string()),
        }
    }

    #[test]
    fn suite_counts_passes_and_failures() {
        let suite = TestSuiteResult::from_results(
            "2026-01-01T00:00:00Z".to_string(),
            42,
            vec![result("a", true), result("b", false), result("c", true)],
        );
        assert_eq!(suite.total, 3);
        assert_eq!(suite.passed, 2);
        assert_eq!(suite.failed, 1);
        assert!(!suite.all_passed());
    }

    #[test]
    fn blocked_case_carries_setup_error() {
        let case = CaseResult::blocked("See first audio", "user creation failed");
        assert!(!case.success);
        assert!(case.steps.is_empty());
        assert_eq!(
            case.error.as_deref(),
            Some("before hook failed: user creation failed")
        );
    }

    #[test]
    fn errored_result_has_no_user() {
        let e = E2eError::BrowserLaunch("no chrome".into());
        let r = TestResult::errored("audios", &e);
        assert!(!r.success);
        assert!(r.user.is_none());
        assert!(r.error.unwrap().contains("no chrome"));
    }

    #[test]
    fn writes_results_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig {
            output_dir: dir.path().join("out"),
            ..RunnerConfig::default()
        };
        let runner = TestRunner::with_config(config).unwrap();
        let suite = TestSuiteResult::from_results(
            "2026-01-01T00:00:00Z".to_string(),
            5,
            vec![result("audios", true)],
        );

        let path = runner.write_results(&suite).unwrap();
        let written: TestSuiteResult =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written.total, 1);
        assert_eq!(written.results[0].user.as_deref(), Some("abcdefghij"));
    }

    fn screenshot_result(name: &str, path: PathBuf) -> StepResult {
        StepResult {
            success: true,
            step_name: format!("screenshot {name}"),
            duration_ms: 3,
            error: None,
            screenshot: Some(name.to_string()),
            screenshot_path: Some(path),
        }
    }

    #[test]
    fn screenshot_is_compared_under_its_step_name() {
        let dir = tempfile::tempdir().unwrap();
        let tester = VisualTester::new(crate::visual::VisualConfig {
            baseline_dir: dir.path().join("base"),
            actual_dir: dir.path().join("actual"),
            diff_dir: dir.path().join("diff"),
            ..Default::default()
        })
        .unwrap();
        let image = image::RgbaImage::from_pixel(4, 4, image::Rgba([9, 9, 9, 255]));
        image.save(tester.actual_path("audios.v2")).unwrap();
        image.save(tester.baseline_path("audios.v2")).unwrap();

        let step = Step::Screenshot {
            name: "audios.{{version}}".to_string(),
        };
        let result = screenshot_result("audios.v2", tester.actual_path("audios.v2"));
        let name = compared_screenshot(&step, &result).unwrap();
        assert_eq!(name, "audios.v2");
        assert!(tester.compare(name, None).unwrap().matches);
    }

    #[test]
    fn snapshot_steps_are_not_compared_again() {
        let step = Step::CompareSnapshot {
            name: "audios-mp3".to_string(),
            threshold: None,
        };
        let result = screenshot_result("audios-mp3", PathBuf::from("audios-mp3.png"));
        assert_eq!(compared_screenshot(&step, &result), None);
    }

    #[tokio::test]
    #[ignore] // Requires Chrome to be installed
    async fn failed_viewport_setup_closes_the_tab() {
        let mut runner = TestRunner::with_config(RunnerConfig::default()).unwrap();
        runner.browser = Some(
            TestBrowser::launch(&runner.config.browser)
                .await
                .expect("failed to launch browser"),
        );
        let mut scenario =
            Scenario::from_yaml("name: s\ncases:\n  - name: c\n    steps: [{ action: logout }]\n")
                .unwrap();
        scenario.viewport.width = 20_000_000;

        let browser = runner.browser.as_ref().unwrap();
        let before = browser.open_tabs().await;
        assert!(runner.run_scenario(&scenario).await.is_err());
        assert_eq!(browser.open_tabs().await, before);

        runner.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn run_scenario_requires_start() {
        let runner = TestRunner::with_config(RunnerConfig::default()).unwrap();
        let scenario =
            Scenario::from_yaml("name: s\ncases:\n  - name: c\n    steps: [{ action: logout }]\n")
                .unwrap();
        assert!(matches!(
            runner.run_scenario(&scenario).await,
            Err(E2eError::BrowserLaunch(_))
        ));
    }
}
