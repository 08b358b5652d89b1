//! Scratch project layout for suite tests

#![allow(dead_code)]

use camino::Utf8PathBuf;
use obtest_core::config::Config;
use obtest_core::test_utils::MockServer;
use obtest_core::Endpoint;
use tempfile::TempDir;

pub struct Workspace {
    _dir: TempDir,
    pub root: Utf8PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join("project/test/case/test")).unwrap();
        std::fs::create_dir_all(root.join("project/test/case/result")).unwrap();
        Self { _dir: dir, root }
    }

    pub fn project_dir(&self) -> Utf8PathBuf {
        self.root.join("project")
    }

    pub fn work_dir(&self) -> Utf8PathBuf {
        self.root.join("work")
    }

    pub fn add_case(&self, name: &str, script: &str) {
        std::fs::write(
            self.project_dir().join(format!("test/case/test/{name}.test")),
            script,
        )
        .unwrap();
    }

    pub fn add_result(&self, name: &str, transcript: &str) {
        std::fs::write(self.result_file(name), transcript).unwrap();
    }

    pub fn result_file(&self, name: &str) -> Utf8PathBuf {
        self.project_dir()
            .join(format!("test/case/result/{name}.result"))
    }

    pub fn output_file(&self, name: &str) -> Utf8PathBuf {
        self.work_dir().join(format!("result_output/{name}.result.tmp"))
    }

    /// Config that attaches to `server` instead of starting one.
    pub fn attach_config(&self, server: &MockServer) -> Config {
        let Endpoint::Tcp { port } = server.endpoint() else {
            panic!("suite tests expect a TCP mock");
        };

        let mut config = Config::default();
        config.general.project_dir = self.project_dir();
        config.general.work_dir = self.work_dir();
        config.server.start_server = false;
        config.server.use_unix_socket = false;
        config.server.port = *port;
        config
    }
}
