use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use obtest_core::config::Config;
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

mod app;

#[derive(Parser, Debug)]
#[command(author, version, about = "obtest - end-to-end case runner for MiniOB", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Source tree of the database under test
    #[arg(long)]
    project_dir: Option<Utf8PathBuf>,

    /// Scratch directory for the build, server data and actual results
    #[arg(long)]
    work_dir: Option<Utf8PathBuf>,

    /// Comma-separated case names to run instead of the whole directory
    #[arg(long, value_delimiter = ',')]
    test_cases: Vec<String>,

    /// TCP port, used with --not-use-unix-socket
    #[arg(long)]
    server_port: Option<u16>,

    #[arg(long)]
    not_use_unix_socket: bool,

    /// Record actual results as the new expected results
    #[arg(long)]
    report_only: bool,

    /// Log destination: stdout, stderr or a file path
    #[arg(long, default_value = "stdout")]
    log: String,

    /// Debug logging; also keeps the server data directory
    #[arg(short, long)]
    debug: bool,

    /// `;`-separated cmake arguments
    #[arg(long)]
    compile_cmake_args: Option<String>,

    /// `;`-separated make arguments
    #[arg(long)]
    compile_make_args: Option<String>,

    /// Wipe the build directory before compiling
    #[arg(long)]
    compile_rebuild: bool,

    #[arg(long)]
    skip_build: bool,

    /// Run against a server that is already listening
    #[arg(long)]
    no_start_server: bool,

    #[arg(long)]
    restart_each_case: bool,

    /// Seconds to wait for each response
    #[arg(long)]
    receive_timeout: Option<u64>,

    /// Wall-clock seconds allowed for a whole case
    #[arg(long)]
    case_timeout: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.project_dir {
            config.general.project_dir = dir.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.general.work_dir = dir.clone();
        }
        config.general.debug |= self.debug;

        if let Some(port) = self.server_port {
            config.server.port = port;
        }
        if self.not_use_unix_socket {
            config.server.use_unix_socket = false;
        }
        if self.no_start_server {
            config.server.start_server = false;
        }
        config.server.restart_each_case |= self.restart_each_case;

        if let Some(secs) = self.receive_timeout {
            config.client.receive_timeout = secs;
        }

        if !self.test_cases.is_empty() {
            config.suite.test_cases = self.test_cases.clone();
        }
        config.suite.report_only |= self.report_only;
        if self.case_timeout.is_some() {
            config.suite.case_timeout = self.case_timeout;
        }

        if let Some(args) = &self.compile_cmake_args {
            config.build.cmake_args = args.clone();
        }
        if let Some(args) = &self.compile_make_args {
            config.build.make_args = args.clone();
        }
        config.build.rebuild |= self.compile_rebuild;
        if self.skip_build {
            config.build.enabled = false;
        }
    }
}

fn init_logging(target: &str, debug: bool) -> Result<()> {
    let log_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let (writer, ansi) = match target {
        "stdout" => (BoxMakeWriter::new(std::io::stdout), true),
        "stderr" => (BoxMakeWriter::new(std::io::stderr), true),
        path => {
            let path = Utf8Path::new(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args.log, args.debug)?;

    info!("obtest v{} starting ...", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load_or_default(),
    };
    args.apply(&mut config);
    config.validate()?;

    info!("Project directory: {}", config.general.project_dir);
    info!("Work directory: {}", config.general.work_dir);

    let (ok, evaluation) = app::run(&config).await;
    println!("{evaluation}");

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
