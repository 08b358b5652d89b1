use crate::endpoint::Endpoint;
use crate::error::{ObtestError, Result};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub suite: SuiteConfig,
    #[serde(default)]
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Source tree of the database under test
    #[serde(default = "default_project_dir")]
    pub project_dir: Utf8PathBuf,
    /// Scratch area for the build, server data and actual transcripts
    #[serde(default = "default_work_dir")]
    pub work_dir: Utf8PathBuf,
    /// Debug mode keeps the server data directory for post-mortem inspection
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub binary: Option<Utf8PathBuf>,
    pub config_file: Option<Utf8PathBuf>,
    pub data_dir: Option<Utf8PathBuf>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub use_unix_socket: bool,
    /// When false the cases run against a server someone else started
    #[serde(default = "default_true")]
    pub start_server: bool,
    /// Stop and restart (with a clean data dir) before every case
    #[serde(default)]
    pub restart_each_case: bool,
    #[serde(default)]
    pub retain_data: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Seconds to wait for each readiness notification while receiving
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SuiteConfig {
    pub test_dir: Option<Utf8PathBuf>,
    pub result_dir: Option<Utf8PathBuf>,
    pub output_dir: Option<Utf8PathBuf>,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Run only these cases; empty means every case in `test_dir`
    #[serde(default)]
    pub test_cases: Vec<String>,
    /// Promote actual transcripts to fixtures instead of comparing
    #[serde(default)]
    pub report_only: bool,
    /// Wall-clock limit in seconds for a whole case
    pub case_timeout: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub cmake_args: String,
    #[serde(default)]
    pub make_args: String,
    #[serde(default)]
    pub rebuild: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            work_dir: default_work_dir(),
            debug: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary: None,
            config_file: None,
            data_dir: None,
            port: default_port(),
            use_unix_socket: true,
            start_server: true,
            restart_each_case: false,
            retain_data: false,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            receive_timeout: default_receive_timeout(),
        }
    }
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            test_dir: None,
            result_dir: None,
            output_dir: None,
            suffix: default_suffix(),
            test_cases: Vec::new(),
            report_only: false,
            case_timeout: None,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cmake_args: String::new(),
            make_args: String::new(),
            rebuild: false,
        }
    }
}

// Default value functions
fn default_project_dir() -> Utf8PathBuf {
    std::env::current_dir()
        .ok()
        .and_then(|p| Utf8PathBuf::try_from(p).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("."))
}

fn default_work_dir() -> Utf8PathBuf {
    Utf8PathBuf::try_from(std::env::temp_dir().join("miniob"))
        .unwrap_or_else(|_| Utf8PathBuf::from("/tmp/miniob"))
}

const fn default_port() -> u16 {
    6789
}

const fn default_receive_timeout() -> u64 {
    10
}

fn default_suffix() -> String {
    ".test".to_owned()
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::find_config_file()?;
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ObtestError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| ObtestError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    fn find_config_file() -> Result<PathBuf> {
        let candidates = [
            dirs::config_dir().map(|p| p.join("obtest/obtest.toml")),
            Some(PathBuf::from("/etc/obtest/obtest.toml")),
        ];

        for candidate in candidates.into_iter().flatten() {
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        Err(ObtestError::Config("Config file not found".to_owned()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.suite.suffix.is_empty() {
            return Err(ObtestError::Config("Case suffix must not be empty".to_owned()));
        }
        if self.client.receive_timeout == 0 {
            return Err(ObtestError::Config(
                "Receive timeout must be at least one second".to_owned(),
            ));
        }
        if self.suite.case_timeout == Some(0) {
            return Err(ObtestError::Config(
                "Case timeout must be at least one second".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn build_dir(&self) -> Utf8PathBuf {
        self.general.work_dir.join("build")
    }

    pub fn server_binary(&self) -> Utf8PathBuf {
        self.server
            .binary
            .clone()
            .unwrap_or_else(|| self.build_dir().join("bin/observer"))
    }

    pub fn server_config_file(&self) -> Utf8PathBuf {
        self.server
            .config_file
            .clone()
            .unwrap_or_else(|| self.general.project_dir.join("etc/observer.ini"))
    }

    pub fn data_dir(&self) -> Utf8PathBuf {
        self.server
            .data_dir
            .clone()
            .unwrap_or_else(|| self.general.work_dir.join("data"))
    }

    /// The single bind method shared by the server and every client.
    pub fn endpoint(&self) -> Endpoint {
        if self.server.use_unix_socket {
            Endpoint::unix(self.data_dir().join("miniob.sock"))
        } else {
            Endpoint::tcp(self.server.port)
        }
    }

    pub fn retain_data(&self) -> bool {
        self.general.debug || self.server.retain_data
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.client.receive_timeout)
    }

    pub fn case_timeout(&self) -> Option<Duration> {
        self.suite.case_timeout.map(Duration::from_secs)
    }

    pub fn test_dir(&self) -> Utf8PathBuf {
        self.suite
            .test_dir
            .clone()
            .unwrap_or_else(|| self.general.project_dir.join("test/case/test"))
    }

    pub fn result_dir(&self) -> Utf8PathBuf {
        self.suite
            .result_dir
            .clone()
            .unwrap_or_else(|| self.general.project_dir.join("test/case/result"))
    }

    pub fn output_dir(&self) -> Utf8PathBuf {
        self.suite
            .output_dir
            .clone()
            .unwrap_or_else(|| self.general.work_dir.join("result_output"))
    }
}
