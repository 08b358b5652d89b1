//! Case discovery, execution and classification for one run
//!
//! The suite owns the only server instance. Every exit path of `run` stops
//! the server before returning.

use camino::{Utf8Path, Utf8PathBuf};
use obtest_core::case::{CaseLister, TestCase};
use obtest_core::config::Config;
use obtest_core::report::{CaseOutcome, EvalReport, SuiteSummary};
use obtest_core::transcript::{Transcript, compare_files};
use obtest_core::{Endpoint, ObtestError, Result};
use obtest_protocol::CommandInterpreter;
use obtest_server::{ServerOptions, ServerSupervisor};
use std::fs;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

pub struct TestSuite {
    lister: CaseLister,
    test_dir: Utf8PathBuf,
    result_dir: Utf8PathBuf,
    output_dir: Utf8PathBuf,
    test_cases: Vec<String>,
    report_only: bool,
    restart_each_case: bool,
    endpoint: Endpoint,
    receive_timeout: Duration,
    case_timeout: Option<Duration>,
    /// None when attaching to a server started elsewhere
    supervisor: Option<ServerSupervisor>,
}

impl TestSuite {
    pub fn new(config: &Config) -> Self {
        let supervisor = config
            .server
            .start_server
            .then(|| ServerSupervisor::new(ServerOptions::from_config(config)));

        Self {
            lister: CaseLister::new(config.suite.suffix.as_str()),
            test_dir: config.test_dir(),
            result_dir: config.result_dir(),
            output_dir: config.output_dir(),
            test_cases: config.suite.test_cases.clone(),
            report_only: config.suite.report_only,
            restart_each_case: config.server.restart_each_case,
            endpoint: config.endpoint(),
            receive_timeout: config.receive_timeout(),
            case_timeout: config.case_timeout(),
            supervisor,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn discover(&self) -> Result<Vec<TestCase>> {
        self.lister.discover(&self.test_dir, &self.test_cases)
    }

    /// Run every discovered case in order.
    ///
    /// Case failures and timeouts only show up in the summary and report.
    /// An error is returned when the server cannot be started or a case hits
    /// an infrastructure failure; the run stops there.
    pub async fn run(&mut self, report: &mut EvalReport) -> Result<SuiteSummary> {
        let cases = self.discover()?;
        let mut summary = SuiteSummary::default();

        if cases.is_empty() {
            info!("Cannot find any test cases");
            return Ok(summary);
        }
        fs::create_dir_all(&self.output_dir)?;

        for case in &cases {
            if self.restart_each_case {
                self.shutdown_server().await;
            }
            if let Err(e) = self.ensure_server().await {
                report.append_message("Failed to start server.");
                return Err(e);
            }

            info!("{} starting ...", case.name());
            match self.run_case(case).await {
                Ok(outcome) => {
                    info!("Case {}: {}", outcome, case.name());
                    summary.record(outcome);
                    report.record_case(case.name(), outcome);
                }
                Err(e) => {
                    error!("Failed to run case {}: {}", case.name(), e);
                    self.shutdown_server().await;
                    return Err(e);
                }
            }
        }

        info!(
            "All done. {} passed, {} failed, {} timeout",
            summary.success, summary.failure, summary.timeout
        );
        debug!("{}", report.message());
        self.shutdown_server().await;
        Ok(summary)
    }

    /// Run one case and classify it.
    ///
    /// The actual transcript, complete or partial, is always written to the
    /// output directory first.
    pub async fn run_case(&self, case: &TestCase) -> Result<CaseOutcome> {
        let tmp_file = case.tmp_result_file(&self.output_dir);
        let (transcript, executed) = self.execute(case).await;
        transcript.persist(&tmp_file)?;

        match executed {
            Ok(()) => {}
            Err(e) if e.is_timeout() => {
                warn!("Case {} timed out: {}", case.name(), e);
                return Ok(CaseOutcome::Timeout);
            }
            Err(e) if e.is_case_local() => {
                error!("Failed to run case {}: {}", case.name(), e);
                return Ok(CaseOutcome::Failure);
            }
            Err(e) => return Err(e),
        }

        let result_file = case.result_file(&self.result_dir);
        if self.report_only {
            promote(&tmp_file, &result_file)?;
            return Ok(CaseOutcome::Success);
        }

        match compare_files(&tmp_file, &result_file) {
            Ok(()) => Ok(CaseOutcome::Success),
            Err(ObtestError::CompareMismatch(detail)) => {
                info!("Case {} does not match its result file: {}", case.name(), detail);
                Ok(CaseOutcome::Failure)
            }
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, case: &TestCase) -> (Transcript, Result<()>) {
        let mut interpreter =
            match CommandInterpreter::connect(&self.endpoint, self.receive_timeout).await {
                Ok(interpreter) => interpreter,
                Err(e) => return (Transcript::new(), Err(e)),
            };

        let executed = match self.case_timeout {
            Some(limit) => timeout(limit, interpreter.run_lines(case.lines()))
                .await
                .unwrap_or(Err(ObtestError::CaseTimeout(limit))),
            None => interpreter.run_lines(case.lines()).await,
        };

        (interpreter.into_transcript(), executed)
    }

    async fn ensure_server(&mut self) -> Result<()> {
        let Some(supervisor) = self.supervisor.as_mut() else {
            return Ok(());
        };
        if supervisor.is_ready() {
            return Ok(());
        }
        if supervisor.has_exited() {
            warn!("Server exited unexpectedly, restarting it");
            supervisor.shutdown().await;
        }

        info!("Starting observer server");
        if let Err(e) = supervisor.start().await {
            error!("Failed to start db server: {}", e);
            supervisor.shutdown().await;
            return Err(e);
        }
        Ok(())
    }

    async fn shutdown_server(&mut self) {
        if let Some(supervisor) = self.supervisor.as_mut() {
            supervisor.shutdown().await;
        }
    }
}

/// Make the actual transcript the new expected fixture.
fn promote(tmp_file: &Utf8Path, result_file: &Utf8Path) -> Result<()> {
    if let Some(parent) = result_file.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(tmp_file, result_file).is_err() {
        // Output and fixtures may live on different filesystems.
        fs::copy(tmp_file, result_file)?;
        fs::remove_file(tmp_file)?;
    }
    debug!("promoted {} to {}", tmp_file, result_file);
    Ok(())
}
