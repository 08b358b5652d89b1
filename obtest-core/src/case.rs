//! Test cases and their discovery on disk
//!
//! A case is a named script of interpreter lines (`<name>.test`) paired with
//! an expected transcript fixture (`<name>.result`).

use crate::error::{ObtestError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

/// One named, ordered script of interpreter commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    name: String,
    lines: Vec<String>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            name: name.into(),
            lines,
        }
    }

    pub fn from_file(name: impl Into<String>, path: &Utf8Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(
            name,
            content.lines().map(str::to_owned).collect(),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Path of the expected transcript fixture.
    pub fn result_file(&self, result_dir: &Utf8Path) -> Utf8PathBuf {
        result_dir.join(format!("{}.result", self.name))
    }

    /// Path the actual transcript is written to before comparison or promotion.
    pub fn tmp_result_file(&self, output_dir: &Utf8Path) -> Utf8PathBuf {
        output_dir.join(format!("{}.result.tmp", self.name))
    }
}

/// Finds cases by file suffix, or resolves an explicit list of names.
#[derive(Debug, Clone)]
pub struct CaseLister {
    suffix: String,
}

impl CaseLister {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    /// List the cases in `case_dir`, or only the named ones when `names` is non-empty.
    ///
    /// A named case whose file is missing fails the whole discovery.
    pub fn discover(&self, case_dir: &Utf8Path, names: &[String]) -> Result<Vec<TestCase>> {
        if !case_dir.is_dir() {
            return Err(ObtestError::Config(format!(
                "Failed to list test cases. {case_dir} is not a directory"
            )));
        }

        if names.is_empty() {
            self.list_directory(case_dir)
        } else {
            self.list_named(case_dir, names)
        }
    }

    fn list_directory(&self, case_dir: &Utf8Path) -> Result<Vec<TestCase>> {
        let mut case_files = Vec::new();
        for entry in case_dir.read_dir_utf8()? {
            let entry = entry?;
            let file_name = entry.file_name();
            debug!("find file {}", file_name);

            if file_name.starts_with('.') || !entry.path().is_file() {
                continue;
            }
            if let Some(name) = file_name.strip_suffix(self.suffix.as_str()) {
                case_files.push((name.to_owned(), entry.path().to_owned()));
            }
        }
        // Directory order is unspecified; keep runs reproducible.
        case_files.sort();

        case_files
            .into_iter()
            .map(|(name, path)| {
                debug!("got a test case file {}", path);
                TestCase::from_file(name, &path)
            })
            .collect()
    }

    fn list_named(&self, case_dir: &Utf8Path, names: &[String]) -> Result<Vec<TestCase>> {
        names
            .iter()
            .map(|name| {
                let path = case_dir.join(format!("{name}{}", self.suffix));
                if !path.is_file() {
                    return Err(ObtestError::Config(format!(
                        "No such test case with name '{name}': {path} is not a file"
                    )));
                }
                debug!("got a test case {}", name);
                TestCase::from_file(name.as_str(), &path)
            })
            .collect()
    }
}

impl Default for CaseLister {
    fn default() -> Self {
        Self::new(".test")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn case_dir() -> (TempDir, Utf8PathBuf) {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        std::fs::write(dir.join("basic.test"), "select * from t;\n").unwrap();
        std::fs::write(dir.join("aggregation.test"), "-- echo agg\nselect count(*) from t;\n")
            .unwrap();
        std::fs::write(dir.join("notes.txt"), "not a case\n").unwrap();
        std::fs::write(dir.join(".hidden.test"), "select 1;\n").unwrap();
        std::fs::create_dir(dir.join("nested.test")).unwrap();
        (tmp, dir)
    }

    #[test]
    fn test_list_directory_by_suffix() {
        let (_tmp, dir) = case_dir();
        let cases = CaseLister::default().discover(&dir, &[]).unwrap();

        let names: Vec<_> = cases.iter().map(TestCase::name).collect();
        assert_eq!(names, vec!["aggregation", "basic"]);
        assert_eq!(
            cases[0].lines(),
            &["-- echo agg".to_owned(), "select count(*) from t;".to_owned()]
        );
    }

    #[test]
    fn test_list_named_preserves_order() {
        let (_tmp, dir) = case_dir();
        let names = vec!["basic".to_owned(), "aggregation".to_owned()];
        let cases = CaseLister::default().discover(&dir, &names).unwrap();

        let found: Vec<_> = cases.iter().map(TestCase::name).collect();
        assert_eq!(found, vec!["basic", "aggregation"]);
    }

    #[test]
    fn test_missing_named_case_fails_discovery() {
        let (_tmp, dir) = case_dir();
        let names = vec!["basic".to_owned(), "missing".to_owned()];
        let err = CaseLister::default().discover(&dir, &names).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_not_a_directory() {
        let err = CaseLister::default()
            .discover(Utf8Path::new("/nonexistent/cases"), &[])
            .unwrap_err();
        assert!(matches!(err, ObtestError::Config(_)));
    }

    #[test]
    fn test_fixture_paths() {
        let case = TestCase::new("select_basic", vec![]);
        assert_eq!(
            case.result_file(Utf8Path::new("/r")),
            "/r/select_basic.result"
        );
        assert_eq!(
            case.tmp_result_file(Utf8Path::new("/out")),
            "/out/select_basic.result.tmp"
        );
    }

    #[test]
    fn test_duplicate_lines_are_kept() {
        let case = TestCase::new("dup", vec!["select 1;".into(), "select 1;".into()]);
        assert_eq!(case.lines().len(), 2);
    }
}
