//! Scenario runner: probes REDCap, opens the store and drives each scenario

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rcsel_common::{record, store, LogQuery, LogTimestamp, RecordScope, RedcapStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::SuiteConfig;
use crate::error::{E2eError, E2eResult};
use crate::navigation::expected_form_page;
use crate::probe::AppProbe;
use crate::replay::FormReplayer;
use crate::session::Session;
use crate::spec::{FormSource, RecordRef, ScenarioSpec, ScenarioStep};

/// Result of executing a scenario step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    /// Record created by a `data_entry` step
    pub record_number: Option<u32>,
    pub error: Option<String>,
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn single(result: TestResult) -> Self {
        Self {
            total: 1,
            passed: usize::from(result.success),
            failed: usize::from(!result.success),
            skipped: 0,
            duration_ms: result.duration_ms,
            results: vec![result],
        }
    }
}

/// State carried between the steps of one scenario
#[derive(Debug, Clone, Default)]
pub struct ScenarioContext {
    /// Record number the form showed during data entry
    pub record_number: Option<u32>,
    /// Wall-clock time right after the form was saved
    pub entered_at: Option<LogTimestamp>,
}

/// Main scenario runner
pub struct TestRunner {
    config: SuiteConfig,

    /// Skip the reachability probe
    skip_probe: bool,

    /// Store shared by every scenario in the run
    store: Option<Arc<dyn RedcapStore>>,

    /// Scenario directory
    specs_dir: PathBuf,

    /// Output directory for results
    output_dir: PathBuf,
}

impl TestRunner {
    /// Create a new runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a runner with custom configuration
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config: config.suite,
            skip_probe: config.skip_probe,
            store: None,
            specs_dir: config.specs_dir,
            output_dir: config.output_dir,
        }
    }

    /// Use an already-open store instead of connecting from the config
    pub fn with_store(mut self, store: Arc<dyn RedcapStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Wait for REDCap and open the store.
    ///
    /// A store that cannot be opened is logged and replaced by one that
    /// fails every query, so browser-only steps still run and database
    /// steps fail one by one.
    pub async fn start(&mut self) -> E2eResult<()> {
        if self.store.is_some() {
            return Ok(());
        }

        if !self.skip_probe {
            AppProbe::new(
                &self.config.redcap.base_url,
                self.config.browser.accept_invalid_certs,
            )
            .wait_until_reachable(self.config.timeouts.startup())
            .await?;
        }

        self.store = Some(store::connect_or_unavailable(&self.config.database.url).await);
        Ok(())
    }

    /// Close the store. Failures are logged.
    pub async fn shutdown(&mut self) {
        if let Some(opened) = self.store.take() {
            store::close_quietly(opened.as_ref()).await;
            info!("Store closed");
        }
    }

    /// Run all scenarios in the specs directory
    pub async fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let specs = ScenarioSpec::load_all(&self.specs_dir)?;
        self.run_specs(&specs).await
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        let specs = ScenarioSpec::load_all(&self.specs_dir)?;
        let filtered: Vec<ScenarioSpec> = ScenarioSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_specs(&filtered).await
    }

    /// Run a specific scenario by name
    pub async fn run_test(&mut self, name: &str) -> E2eResult<TestResult> {
        let specs = ScenarioSpec::load_all(&self.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))?;

        self.start().await?;
        self.run_spec(&spec).await
    }

    /// Run a list of scenarios, one after another
    pub async fn run_specs(&mut self, specs: &[ScenarioSpec]) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;
        let skipped = 0;

        self.start().await?;

        info!("Running {} scenario(s)...", specs.len());

        for spec in specs {
            match self.run_spec(spec).await {
                Ok(result) => {
                    if result.success {
                        passed += 1;
                        info!("✓ {} ({} ms)", result.name, result.duration_ms);
                    } else {
                        failed += 1;
                        error!(
                            "✗ {} - {}",
                            result.name,
                            result.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    results.push(result);
                }
                Err(e) => {
                    failed += 1;
                    error!("✗ {} - {}", spec.name, e);
                    results.push(TestResult {
                        name: spec.name.clone(),
                        success: false,
                        duration_ms: 0,
                        steps: vec![],
                        record_number: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(TestSuiteResult {
            total: specs.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        })
    }

    /// Run a single scenario in a fresh browser session
    pub async fn run_spec(&mut self, spec: &ScenarioSpec) -> E2eResult<TestResult> {
        let start = Instant::now();
        debug!("Running scenario: {}", spec.name);

        let store = self
            .store
            .clone()
            .ok_or_else(|| E2eError::Config("runner not started".to_string()))?;
        let session = Session::open(self.config.clone(), store).await?;

        let mut ctx = ScenarioContext::default();
        let mut step_results = Vec::new();
        let mut test_error: Option<String> = None;

        for step in &spec.steps {
            let step_start = Instant::now();
            let outcome = execute_step(&session, spec, step, &mut ctx).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            let error = outcome.err().map(|e| e.to_string());
            step_results.push(StepResult {
                success: error.is_none(),
                step_name: step.name(),
                duration_ms,
                error: error.clone(),
            });
            if let Some(e) = error {
                test_error = Some(format!("{}: {}", step.name(), e));
                break; // Stop on first failure
            }
        }

        session.close().await;

        Ok(TestResult {
            name: spec.name.clone(),
            success: test_error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            steps: step_results,
            record_number: ctx.record_number,
            error: test_error,
        })
    }

    /// Write results to a JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn record_ref<'a>(spec: &'a ScenarioSpec, step: &ScenarioStep) -> E2eResult<&'a RecordRef> {
    spec.record.as_ref().ok_or_else(|| E2eError::StepFailed {
        step: step.name(),
        reason: "scenario has no record section".to_string(),
    })
}

/// Execute one step against a session
pub async fn execute_step(
    session: &Session,
    spec: &ScenarioSpec,
    step: &ScenarioStep,
    ctx: &mut ScenarioContext,
) -> E2eResult<()> {
    let nav = session.navigator();

    match step {
        ScenarioStep::LandingPage { expected_title } => {
            nav.open_landing_page().await?;
            let title = session.browser().title().await?;
            debug!("Page title = {}", title);
            if &title != expected_title {
                return Err(E2eError::AssertionFailed(format!(
                    "landing page title {:?}, expected {:?}",
                    title, expected_title
                )));
            }
        }

        ScenarioStep::Login { username, password } => {
            let redcap = &session.config().redcap;
            nav.login(
                username.as_deref().unwrap_or(&redcap.username),
                password.as_deref().unwrap_or(&redcap.password),
            )
            .await?;
            nav.wait_for_logout_link().await.map_err(|_| {
                E2eError::AssertionFailed("no \"Log out\" link after login".to_string())
            })?;
        }

        ScenarioStep::Logout => nav.logout().await?,

        ScenarioStep::ProjectPage => {
            nav.load_project_page(spec.project.pid).await?;
            let title = session.browser().title().await?;
            if !title.contains(&spec.project.title) {
                return Err(E2eError::AssertionFailed(format!(
                    "project page title {:?} lacks {:?}",
                    title, spec.project.title
                )));
            }
        }

        ScenarioStep::AddNewRecord => {
            let record = record_ref(spec, step)?;
            nav.select_add_new_record().await?;
            let expected = expected_form_page(&record.form_name);
            let url = session.browser().current_url().await?;
            if !url.contains(&expected) {
                return Err(E2eError::AssertionFailed(format!(
                    "URL {} does not contain {}",
                    url, expected
                )));
            }
        }

        ScenarioStep::SelectExistingRecord { record, select_id } => {
            nav.select_existing_record(*record, select_id).await?;
        }

        ScenarioStep::OpenForm { from } => {
            let record = record_ref(spec, step)?;
            match from {
                FormSource::Grid => nav.select_form_from_grid(&record.form_name).await?,
                FormSource::Sidebar => nav.select_form_from_sidebar(&record.form_name).await?,
            }
        }

        ScenarioStep::ClickLink { text } => nav.click_link(text).await?,

        ScenarioStep::DataEntry => {
            let record = record_ref(spec, step)?;
            let source = RecordScope::new(spec.project.pid, record.source_record, record.event_id)?;
            let replayer =
                FormReplayer::new(record.record_id_field.clone(), record.save_button.clone());

            let report = session.enter_form(&source, &replayer).await?;
            let entered_at = LogTimestamp::now();
            info!(
                "Form '{}' entered for Record #{} at {}",
                record.form_name, report.record_number, entered_at
            );
            if report.record_number == 0 {
                return Err(E2eError::AssertionFailed(
                    "form showed record number 0".to_string(),
                ));
            }
            ctx.record_number = Some(report.record_number);
            ctx.entered_at = Some(entered_at);
        }

        ScenarioStep::LogEntry {
            sql_log,
            data_values,
            description,
            change_reason,
            within_secs,
        } => {
            let record = record_ref(spec, step)?;
            let (Some(pk), Some(entered_at)) = (ctx.record_number, ctx.entered_at) else {
                return Err(E2eError::StepFailed {
                    step: step.name(),
                    reason: "no preceding data_entry step".to_string(),
                });
            };

            let query = LogQuery::new(spec.project.pid, pk, record.event_id, entered_at)
                .with_sql_log(sql_log.as_str())
                .with_data_values(data_values.as_str())
                .with_description(description.as_str())
                .with_change_reason(change_reason.as_str())
                .within_secs(*within_secs);

            match session.check_recent_log_entry(&query).await {
                Some(id) => info!("Log entry for ID={} found in last {} seconds", id, within_secs),
                None => {
                    return Err(E2eError::AssertionFailed(format!(
                        "no {:?} log entry for record {} within {} s of {}",
                        description, pk, within_secs, entered_at
                    )))
                }
            }
        }

        ScenarioStep::DbValue { query, expected } => {
            let value = record::lookup_value(session.store(), query).await;
            match (value, expected) {
                (None, _) => {
                    return Err(E2eError::AssertionFailed(format!(
                        "query returned no single value: {}",
                        query
                    )))
                }
                (Some(actual), Some(expected)) if &actual != expected => {
                    return Err(E2eError::AssertionFailed(format!(
                        "query returned {:?}, expected {:?}",
                        actual, expected
                    )))
                }
                (Some(actual), _) => debug!("{} = {:?}", query, actual),
            }
        }

        ScenarioStep::Log { message } => info!("[SCENARIO] {}", message),
    }

    Ok(())
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub suite: SuiteConfig,
    pub skip_probe: bool,
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            suite: SuiteConfig::default(),
            skip_probe: false,
            specs_dir: PathBuf::from("tests/specs"),
            output_dir: PathBuf::from("test-results"),
        }
    }
}
