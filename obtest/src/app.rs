use anyhow::{Context, Result};
use obtest_core::ObtestError;
use obtest_core::config::Config;
use obtest_core::report::EvalReport;
use obtest_suite::{Builder, TestSuite};
use tokio::signal;
use tracing::{error, info, warn};

/// Build, run the suite, and render the report.
///
/// The flag is false only when the run itself could not complete; failing
/// cases and compile errors are reported but still count as a completed run.
pub async fn run(config: &Config) -> (bool, String) {
    let mut report = EvalReport::new();

    let outcome = tokio::select! {
        result = run_suite(config, &mut report) => result,
        interrupted = signal::ctrl_c() => match interrupted {
            Ok(()) => {
                warn!("Received SIGINT, stopping");
                Err(anyhow::anyhow!("interrupted"))
            }
            Err(e) => Err(anyhow::anyhow!("unable to listen for shutdown signal: {e}")),
        },
    };

    let ok = match outcome {
        Ok(()) => true,
        Err(e) => {
            error!("{:#}", e);
            report.append_message(format!("{e:#}"));
            false
        }
    };
    (ok, report.to_json_string())
}

async fn run_suite(config: &Config, report: &mut EvalReport) -> Result<()> {
    if config.build.enabled {
        match Builder::from_config(config).build().await {
            Ok(()) => {}
            Err(ObtestError::Build { diagnostics }) => {
                error!("Failed to compile source code");
                for line in diagnostics {
                    report.append_message(line);
                }
                return Ok(());
            }
            Err(e) => return Err(e).context("failed to prepare the build directory"),
        }
    }

    let mut suite = TestSuite::new(config);
    let summary = suite.run(report).await.context("test suite aborted")?;
    info!(
        "{} cases: {} passed, {} failed, {} timeout",
        summary.total(),
        summary.success,
        summary.failure,
        summary.timeout
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn scratch_config(dir: &tempfile::TempDir) -> Config {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let mut config = Config::default();
        config.general.project_dir = root.join("project");
        config.general.work_dir = root.join("work");
        config.build.enabled = false;
        config.server.start_server = false;
        config
    }

    #[tokio::test]
    async fn test_empty_case_directory_completes() {
        let dir = tempfile::tempdir().unwrap();
        let config = scratch_config(&dir);
        std::fs::create_dir_all(config.test_dir()).unwrap();

        let (ok, evaluation) = run(&config).await;
        assert!(ok);
        assert_eq!(evaluation, r#"{"message":""}"#);
    }

    #[tokio::test]
    async fn test_missing_case_directory_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = scratch_config(&dir);

        let (ok, evaluation) = run(&config).await;
        assert!(!ok);
        assert!(evaluation.contains("test suite aborted"));
    }

    #[tokio::test]
    async fn test_compile_failure_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = scratch_config(&dir);
        config.build.enabled = true;
        // No project directory: the build fails before invoking cmake.

        let (ok, evaluation) = run(&config).await;
        assert!(ok);
        assert!(evaluation.contains("does not exist"));
    }
}
