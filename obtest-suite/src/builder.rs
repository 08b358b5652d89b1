//! Compiles the server from source with cmake and make
//!
//! The build is a black box: only the exit status and stderr are used.

use camino::{Utf8Path, Utf8PathBuf};
use obtest_core::config::Config;
use obtest_core::{ObtestError, Result};
use std::fs;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info};

const DEFAULT_MAKE_JOBS: &str = "-j16";

#[derive(Debug, Clone)]
pub struct Builder {
    project_dir: Utf8PathBuf,
    build_dir: Utf8PathBuf,
    cmake_args: String,
    make_args: String,
    rebuild: bool,
    cmake_program: Utf8PathBuf,
    make_program: Utf8PathBuf,
}

impl Builder {
    pub fn new(project_dir: impl Into<Utf8PathBuf>, build_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            build_dir: build_dir.into(),
            cmake_args: String::new(),
            make_args: String::new(),
            rebuild: false,
            cmake_program: "cmake".into(),
            make_program: "make".into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.general.project_dir, config.build_dir())
            .cmake_args(&config.build.cmake_args)
            .make_args(&config.build.make_args)
            .rebuild(config.build.rebuild)
    }

    /// `;`-separated extra arguments for cmake.
    pub fn cmake_args(mut self, args: &str) -> Self {
        self.cmake_args = args.to_owned();
        self
    }

    /// `;`-separated extra arguments for make. Empty means `-j16`.
    pub fn make_args(mut self, args: &str) -> Self {
        self.make_args = args.to_owned();
        self
    }

    pub fn rebuild(mut self, rebuild: bool) -> Self {
        self.rebuild = rebuild;
        self
    }

    /// Use other executables in place of `cmake` and `make`.
    pub fn programs(mut self, cmake: impl Into<Utf8PathBuf>, make: impl Into<Utf8PathBuf>) -> Self {
        self.cmake_program = cmake.into();
        self.make_program = make.into();
        self
    }

    pub fn build_dir(&self) -> &Utf8Path {
        &self.build_dir
    }

    /// Configure and compile. Failures carry the tools' stderr lines.
    pub async fn build(&self) -> Result<()> {
        if !self.project_dir.exists() {
            error!(
                "The project dir {} doesn't exist, please provide a valid path",
                self.project_dir
            );
            return Err(ObtestError::Build {
                diagnostics: vec![format!("project directory {} does not exist", self.project_dir)],
            });
        }

        if self.rebuild && self.build_dir.exists() {
            info!("build directory will be cleaned before compile: {}", self.build_dir);
            fs::remove_dir_all(&self.build_dir)?;
        }
        fs::create_dir_all(&self.build_dir)?;

        info!("start compiling ... build path={}", self.build_dir);
        if let Err(first) = self.run_cmake().await {
            // Retry once from an empty build directory.
            info!("cmake failed ({} lines), retrying with an empty build directory", first.len());
            fs::remove_dir_all(&self.build_dir)?;
            fs::create_dir_all(&self.build_dir)?;
            if let Err(diagnostics) = self.run_cmake().await {
                return Err(ObtestError::Build { diagnostics });
            }
        }

        let (ok, outputs) = run_command(&self.make_program, &self.make_command())
            .await
            .unwrap_or_else(|e| (false, vec![e.to_string()]));
        if !ok {
            error!("Compile failed");
            for line in &outputs {
                error!("{}", line);
            }
            return Err(ObtestError::Build {
                diagnostics: outputs,
            });
        }

        info!("compile source code done");
        Ok(())
    }

    async fn run_cmake(&self) -> std::result::Result<(), Vec<String>> {
        let outputs = match run_command(&self.cmake_program, &self.cmake_command()).await {
            Ok((true, _)) => return Ok(()),
            Ok((false, outputs)) => outputs,
            Err(e) => vec![e.to_string()],
        };

        error!("Failed to run cmake command");
        for line in &outputs {
            error!("{}", line);
        }
        Err(outputs)
    }

    fn cmake_command(&self) -> Vec<String> {
        let mut args = vec![
            "-B".to_owned(),
            self.build_dir.to_string(),
            "--log-level=WARNING".to_owned(),
        ];
        args.extend(split_args(&self.cmake_args));
        args.push(self.project_dir.to_string());
        args
    }

    fn make_command(&self) -> Vec<String> {
        let mut args = vec![
            "--silent".to_owned(),
            "-C".to_owned(),
            self.build_dir.to_string(),
        ];
        if self.make_args.is_empty() {
            args.push(DEFAULT_MAKE_JOBS.to_owned());
        } else {
            args.extend(split_args(&self.make_args));
        }
        args
    }
}

fn split_args(args: &str) -> impl Iterator<Item = String> + '_ {
    args.split(';')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(str::to_owned)
}

/// Run a tool to completion; returns its success flag and non-empty stderr lines.
async fn run_command(program: &Utf8Path, args: &[String]) -> std::io::Result<(bool, Vec<String>)> {
    info!("running command: '{} {}'", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let lines = String::from_utf8_lossy(&output.stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();
    Ok((output.status.success(), lines))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmake_command() {
        let builder = Builder::new("/src/miniob", "/tmp/miniob/build")
            .cmake_args("-DDEBUG=ON; ;-DWITH_UNIT_TESTS=OFF");

        assert_eq!(
            builder.cmake_command(),
            vec![
                "-B",
                "/tmp/miniob/build",
                "--log-level=WARNING",
                "-DDEBUG=ON",
                "-DWITH_UNIT_TESTS=OFF",
                "/src/miniob",
            ]
        );
    }

    #[test]
    fn test_make_command_defaults_to_parallel_jobs() {
        let builder = Builder::new("/src/miniob", "/tmp/miniob/build");
        assert_eq!(
            builder.make_command(),
            vec!["--silent", "-C", "/tmp/miniob/build", "-j16"]
        );
    }

    #[test]
    fn test_make_command_with_args() {
        let builder = Builder::new("/src/miniob", "/tmp/miniob/build").make_args("-j4;observer");
        assert_eq!(
            builder.make_command(),
            vec!["--silent", "-C", "/tmp/miniob/build", "-j4", "observer"]
        );
    }

    #[test]
    fn test_from_config() {
        let config = Config::from_toml(
            r#"
            [general]
            project_dir = "/src/miniob"
            work_dir = "/tmp/ob"
            [build]
            make_args = "-j2"
            rebuild = true
            "#,
        )
        .unwrap();

        let builder = Builder::from_config(&config);
        assert_eq!(builder.build_dir().as_str(), "/tmp/ob/build");
        assert!(builder.rebuild);
        assert_eq!(builder.make_command().last().unwrap(), "-j2");
    }
}
