//! Test execution for the tool belt
//!
//! Detects the repository's test framework from its project files, runs it
//! (optionally scoped to one path) under a timeout, and parses the summary
//! line into counts.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

use super::SKIP_DIRS;

/// Supported test frameworks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFramework {
    Cargo,
    Pytest,
    PythonUnittest,
    Jest,
    Mocha,
    Vitest,
    Go,
}

impl TestFramework {
    /// Detect the test framework from project files in the given directory
    pub fn detect(path: &Path) -> Option<Self> {
        if path.join("Cargo.toml").exists() {
            return Some(Self::Cargo);
        }

        if path.join("go.mod").exists() {
            return Some(Self::Go);
        }

        if path.join("pytest.ini").exists()
            || path.join("conftest.py").exists()
            || file_contains(&path.join("pyproject.toml"), "[tool.pytest")
            || file_contains(&path.join("setup.cfg"), "[tool:pytest]")
        {
            return Some(Self::Pytest);
        }

        if path.join("setup.py").exists()
            || path.join("pyproject.toml").exists()
            || path.join("requirements.txt").exists()
        {
            return Some(Self::detect_python_style(path));
        }

        if path.join("package.json").exists() {
            return Some(Self::detect_js_framework(path));
        }

        if !python_test_files(path).is_empty() {
            return Some(Self::detect_python_style(path));
        }

        None
    }

    /// Plain unittest only when the suite imports `unittest` and never
    /// `pytest`; pytest also runs unittest-style suites
    fn detect_python_style(path: &Path) -> Self {
        if file_contains(&path.join("requirements.txt"), "pytest") {
            return Self::Pytest;
        }

        let sources: Vec<String> = python_test_files(path)
            .iter()
            .filter_map(|f| std::fs::read_to_string(f).ok())
            .collect();
        if imports(&sources, "unittest") && !imports(&sources, "pytest") {
            Self::PythonUnittest
        } else {
            Self::Pytest
        }
    }

    fn detect_js_framework(path: &Path) -> Self {
        let content = std::fs::read_to_string(path.join("package.json")).unwrap_or_default();
        if content.contains("vitest") {
            Self::Vitest
        } else if content.contains("mocha") {
            Self::Mocha
        } else {
            Self::Jest
        }
    }

    /// Build the command that runs the suite, scoped to `target` when given
    pub fn command(&self, target: Option<&str>) -> Command {
        let (program, args): (&str, &[&str]) = match self {
            Self::Cargo => ("cargo", &["test", "--no-fail-fast"]),
            Self::Pytest => ("python", &["-m", "pytest", "--tb=short", "-q"]),
            Self::PythonUnittest => ("python", &["-m", "unittest", "discover", "-v"]),
            Self::Jest => ("npx", &["jest", "--passWithNoTests"]),
            Self::Mocha => ("npx", &["mocha"]),
            Self::Vitest => ("npx", &["vitest", "run"]),
            Self::Go => ("go", &["test", "-v"]),
        };

        let mut cmd = Command::new(program);
        cmd.args(args);

        match (self, target) {
            (Self::Go, Some(t)) => {
                cmd.arg(format!("./{}/...", t.trim_start_matches("./")));
            }
            (Self::Go, None) => {
                cmd.arg("./...");
            }
            (Self::PythonUnittest, Some(t)) => {
                cmd.args(["-s", t]);
            }
            // cargo takes a name filter, not a path
            (Self::Cargo, Some(_)) | (_, None) => {}
            (_, Some(t)) => {
                cmd.arg(t);
            }
        }

        cmd
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cargo => "cargo test",
            Self::Pytest => "pytest",
            Self::PythonUnittest => "unittest",
            Self::Jest => "jest",
            Self::Mocha => "mocha",
            Self::Vitest => "vitest",
            Self::Go => "go test",
        }
    }
}

/// `test_*.py` and `*_test.py` files within a few levels of `path`
fn python_test_files(path: &Path) -> Vec<PathBuf> {
    WalkDir::new(path)
        .max_depth(3)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && SKIP_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy();
            name.ends_with(".py") && (name.starts_with("test_") || name.ends_with("_test.py"))
        })
        .map(|e| e.into_path())
        .collect()
}

fn imports(sources: &[String], module: &str) -> bool {
    let plain = format!("import {}", module);
    let from = format!("from {} ", module);
    sources.iter().flat_map(|s| s.lines()).any(|line| {
        let line = line.trim_start();
        line.starts_with(&plain) || line.starts_with(&from)
    })
}

fn file_contains(path: &Path, needle: &str) -> bool {
    std::fs::read_to_string(path)
        .map(|c| c.contains(needle))
        .unwrap_or(false)
}

/// Results of a test run
#[derive(Debug, Clone, Default)]
pub struct TestResults {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub duration_ms: u64,
    /// Combined stdout and stderr
    pub output: String,
    /// Set when the command could not run or timed out
    pub execution_error: Option<String>,
}

impl TestResults {
    /// Create results indicating an execution error
    pub fn with_error(error: impl Into<String>) -> Self {
        Self {
            execution_error: Some(error.into()),
            ..Default::default()
        }
    }

    /// All tests passing and at least one ran
    pub fn is_green(&self) -> bool {
        self.execution_error.is_none() && self.failed == 0 && self.passed > 0
    }

    pub fn no_tests_found(&self) -> bool {
        self.execution_error.is_none() && self.passed == 0 && self.failed == 0 && self.skipped == 0
    }

    pub fn summary(&self) -> String {
        if let Some(ref error) = self.execution_error {
            return format!("Execution error: {}", error);
        }
        if self.no_tests_found() {
            return "No tests found".to_string();
        }
        format!(
            "{} passed, {} failed, {} skipped ({}ms)",
            self.passed, self.failed, self.skipped, self.duration_ms
        )
    }
}

/// Runs a repository's tests and parses results
#[derive(Debug, Clone)]
pub struct TestRunner {
    workdir: PathBuf,
    framework: Option<TestFramework>,
    timeout: Duration,
}

impl TestRunner {
    /// Create a runner for `workdir`, detecting the framework
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        let framework = TestFramework::detect(&workdir);
        Self {
            workdir,
            framework,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_framework(mut self, framework: TestFramework) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn framework(&self) -> Option<TestFramework> {
        self.framework
    }

    /// Run the suite, scoped to `target` (relative to the workdir) when given
    pub async fn run(&self, target: Option<&str>) -> TestResults {
        let framework = self.framework.unwrap_or(TestFramework::Pytest);

        let mut cmd = framework.command(target);
        cmd.current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(framework = framework.name(), target = ?target, "Running tests");

        let start = Instant::now();
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return TestResults::with_error(format!(
                    "Failed to run {}: {}",
                    framework.name(),
                    e
                ))
            }
            Err(_) => {
                return TestResults::with_error(format!(
                    "{} timed out after {}s",
                    framework.name(),
                    self.timeout.as_secs()
                ))
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{}\n{}", stdout, stderr);

        let mut results = match framework {
            TestFramework::Cargo => parse_summary_lines(&combined, "test result:", &["ignored"]),
            TestFramework::Pytest => parse_pytest_output(&combined),
            TestFramework::PythonUnittest => parse_unittest_output(&combined),
            TestFramework::Jest | TestFramework::Vitest => {
                parse_summary_lines(&combined, "Tests:", &["skipped", "pending", "todo"])
            }
            TestFramework::Mocha => parse_mocha_output(&combined),
            TestFramework::Go => parse_go_output(&combined),
        };

        results.duration_ms = duration_ms;
        results.output = combined;

        // Unparseable output with a failing exit code still counts as a failure
        if !output.status.success() && results.failed == 0 {
            results.failed = 1;
        }

        results
    }
}

/// Add up "<n> passed", "<n> failed" and "<n> <skip word>" on lines
/// containing `marker`
fn parse_summary_lines(output: &str, marker: &str, skip_words: &[&str]) -> TestResults {
    let mut results = TestResults::default();

    for line in output.lines() {
        let Some(rest) = line.split(marker).nth(1) else {
            continue;
        };
        tally(rest, skip_words, &mut results);
    }

    results
}

fn tally(text: &str, skip_words: &[&str], results: &mut TestResults) {
    let words: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|w| !w.is_empty())
        .collect();

    for pair in words.windows(2) {
        let Ok(n) = pair[0].parse::<u32>() else {
            continue;
        };
        let word = pair[1].trim_end_matches(|c: char| !c.is_alphabetic());
        match word {
            "passed" => results.passed += n,
            "failed" | "error" | "errors" => results.failed += n,
            w if skip_words.contains(&w) => results.skipped += n,
            _ => {}
        }
    }
}

/// pytest: "===== 5 passed, 2 failed, 1 skipped in 0.12s =====" or the
/// quiet form "5 passed, 1 skipped in 0.12s"
fn parse_pytest_output(output: &str) -> TestResults {
    let mut results = TestResults::default();

    if let Some(line) = output
        .lines()
        .rev()
        .find(|l| l.contains(" passed") || l.contains(" failed") || l.contains(" error"))
    {
        tally(line.trim().trim_matches('='), &["skipped", "xfailed"], &mut results);
    }

    results
}

fn parse_unittest_output(output: &str) -> TestResults {
    let mut results = TestResults::default();
    let mut total = 0u32;

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("Ran ") {
            total = rest
                .split_whitespace()
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
        }
        if let Some(inner) = line
            .strip_prefix("FAILED (")
            .or_else(|| line.strip_prefix("OK ("))
            .and_then(|s| s.strip_suffix(')'))
        {
            for part in inner.split(',') {
                let Some((key, value)) = part.trim().split_once('=') else {
                    continue;
                };
                let n: u32 = value.parse().unwrap_or(0);
                match key {
                    "failures" | "errors" => results.failed += n,
                    "skipped" => results.skipped += n,
                    _ => {}
                }
            }
        }
    }

    results.passed = total.saturating_sub(results.failed + results.skipped);
    results
}

fn parse_mocha_output(output: &str) -> TestResults {
    let mut results = TestResults::default();

    for line in output.lines() {
        let mut words = line.split_whitespace();
        let (Some(n), Some(word)) = (words.next(), words.next()) else {
            continue;
        };
        let Ok(n) = n.parse::<u32>() else {
            continue;
        };
        match word {
            "passing" => results.passed = n,
            "failing" => results.failed = n,
            "pending" => results.skipped = n,
            _ => {}
        }
    }

    results
}

fn parse_go_output(output: &str) -> TestResults {
    let mut results = TestResults::default();

    for line in output.lines() {
        if line.contains("--- PASS:") {
            results.passed += 1;
        } else if line.contains("--- FAIL:") {
            results.failed += 1;
        } else if line.contains("--- SKIP:") {
            results.skipped += 1;
        }
    }

    results
}
