//! Sandboxed tool belt exposed to agents
//!
//! Every operation is scoped to a workspace root and returns a plain string
//! the calling agent can read. Rejected paths and failed operations come back
//! as descriptive error strings, never as `Err`, so the agent can correct
//! itself and carry on.

mod test_runner;

pub use test_runner::{TestFramework, TestResults, TestRunner};

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directories never listed
const SKIP_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".venv",
    "venv",
    "target",
    ".pytest_cache",
];

/// Maximum entries returned by `list_files`
pub const LIST_LIMIT: usize = 100;

/// Test output handed back to agents is cut to this many trailing bytes
const MAX_TEST_OUTPUT: usize = 20_000;

const DEFAULT_STANDARDS: &str = "\
# Unit Testing Standards

- Use the test framework the project already uses.
- Name test files after the module under test (test_<module> / <module>_test / <module>.test).
- One behaviour per test; name tests after the behaviour they check.
- Cover the happy path, boundary values and every error path.
- Tests must be deterministic: no network, no wall-clock sleeps, no shared global state.
- Prefer real objects over mocks; mock only at process or network boundaries.
- Every new test must pass before it is proposed for review.
";

/// Result of `run_tests`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunOutput {
    pub passed: bool,
    pub output: String,
}

/// File and test primitives confined to a workspace root
#[derive(Debug, Clone)]
pub struct ToolBelt {
    root: PathBuf,
    standards_path: Option<PathBuf>,
    test_timeout: Duration,
    writable: bool,
}

impl ToolBelt {
    /// Create a tool belt rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            standards_path: None,
            test_timeout: Duration::from_secs(300),
            writable: true,
        }
    }

    /// Serve this file from `fetch_standards_doc`
    pub fn with_standards_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.standards_path = Some(path.into());
        self
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    /// A copy of this belt without `write_file`
    pub fn read_only(&self) -> Self {
        Self {
            writable: false,
            ..self.clone()
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Resolve a relative path against the root
    ///
    /// Absolute paths and any `..` component are rejected, as is a path
    /// whose deepest existing ancestor resolves outside the root through a
    /// symlink.
    pub fn resolve(&self, rel: &str) -> std::result::Result<PathBuf, String> {
        let candidate = Path::new(rel);
        for component in candidate.components() {
            match component {
                Component::ParentDir => {
                    return Err(format!(
                        "Error: path '{}' is not allowed: \
                         '..' segments may not leave the workspace",
                        rel
                    ))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(format!(
                        "Error: path '{}' is not allowed: \
                         use a path relative to the workspace root",
                        rel
                    ))
                }
                Component::CurDir | Component::Normal(_) => {}
            }
        }

        let joined = self.root.join(candidate);
        self.confine(&joined, rel)?;
        Ok(joined)
    }

    fn confine(&self, path: &Path, rel: &str) -> std::result::Result<(), String> {
        let outside = || {
            format!(
                "Error: path '{}' is not allowed: it resolves outside the workspace",
                rel
            )
        };
        let root = self
            .root
            .canonicalize()
            .map_err(|e| format!("Error: workspace root unavailable: {}", e))?;

        // A dangling symlink exists but does not canonicalize; refuse it
        // rather than let a write create its target.
        let existing = path
            .ancestors()
            .find(|a| a.symlink_metadata().is_ok())
            .ok_or_else(outside)?;
        match existing.canonicalize() {
            Ok(real) if real.starts_with(&root) => Ok(()),
            _ => Err(outside()),
        }
    }

    /// Read a UTF-8 file
    pub async fn read_file(&self, rel: &str) -> String {
        let path = match self.resolve(rel) {
            Ok(p) => p,
            Err(msg) => return reject(msg),
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => format!("Error: could not read '{}': {}", rel, e),
        }
    }

    /// Write a file, creating parent directories
    pub async fn write_file(&self, rel: &str, content: &str) -> String {
        if !self.writable {
            return reject(format!("Error: writing '{}' is not allowed for this agent", rel));
        }
        let path = match self.resolve(rel) {
            Ok(p) => p,
            Err(msg) => return reject(msg),
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return format!("Error: could not create directory for '{}': {}", rel, e);
            }
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => format!("Wrote {} bytes to {}", content.len(), rel),
            Err(e) => format!("Error: could not write '{}': {}", rel, e),
        }
    }

    /// List files under `dir` whose relative path matches `pattern`
    ///
    /// `pattern` is a glob such as `**/*.py`; a pattern without `/` also
    /// matches against the bare file name.
    pub async fn list_files(&self, dir: &str, pattern: Option<&str>) -> String {
        let dir = if dir.trim().is_empty() { "." } else { dir };
        let base = match self.resolve(dir) {
            Ok(p) => p,
            Err(msg) => return reject(msg),
        };
        let matcher = match pattern.filter(|p| !p.trim().is_empty()) {
            Some(p) => match Glob::new(p) {
                Ok(g) => Some(g.compile_matcher()),
                Err(e) => return format!("Error: invalid pattern '{}': {}", p, e),
            },
            None => None,
        };

        let root = self.root.clone();
        let listing =
            tokio::task::spawn_blocking(move || collect_files(&root, &base, matcher.as_ref()))
                .await;

        match listing {
            Ok(Ok((files, _))) if files.is_empty() => format!("No files found in '{}'", dir),
            Ok(Ok((files, truncated))) => {
                let mut out = files.join("\n");
                if truncated {
                    out.push_str(&format!("\n... (truncated at {} entries)", LIST_LIMIT));
                }
                out
            }
            Ok(Err(e)) => format!("Error: could not list '{}': {}", dir, e),
            Err(e) => format!("Error: listing '{}' failed: {}", dir, e),
        }
    }

    /// Run the repository's tests, scoped to `rel` when non-empty
    pub async fn run_tests(&self, rel: &str) -> TestRunOutput {
        let target = rel.trim();
        let target = if target.is_empty() || target == "." {
            None
        } else {
            if let Err(msg) = self.resolve(target) {
                return TestRunOutput {
                    passed: false,
                    output: reject(msg),
                };
            }
            Some(target)
        };

        let results = TestRunner::new(&self.root)
            .with_timeout(self.test_timeout)
            .run(target)
            .await;

        let mut output = format!("{}\n\n", results.summary());
        output.push_str(tail(&results.output, MAX_TEST_OUTPUT));

        TestRunOutput {
            passed: results.is_green(),
            output,
        }
    }

    /// The team's testing standards document
    pub async fn fetch_standards_doc(&self) -> String {
        let Some(path) = &self.standards_path else {
            return DEFAULT_STANDARDS.to_string();
        };
        match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Standards document unavailable, using built-in default"
                );
                DEFAULT_STANDARDS.to_string()
            }
        }
    }

    /// Function-tool definitions for chat APIs
    pub fn definitions(&self) -> Vec<Value> {
        let mut tools = vec![
            function(
                "read_file",
                "Read a text file. The path is relative to the repository root.",
                json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                    "required": ["path"]
                }),
            ),
            function(
                "list_files",
                "List files under a directory relative to the repository root, \
                 optionally filtered by a glob such as **/*.py.",
                json!({
                    "type": "object",
                    "properties": {
                        "directory": { "type": "string" },
                        "pattern": { "type": "string" }
                    },
                    "required": ["directory"]
                }),
            ),
            function(
                "run_tests",
                "Run the test suite, optionally scoped to a test file or directory \
                 relative to the repository root.",
                json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" } }
                }),
            ),
            function(
                "fetch_standards_doc",
                "Fetch the team's unit testing standards.",
                json!({ "type": "object", "properties": {} }),
            ),
        ];

        if self.writable {
            tools.insert(
                1,
                function(
                    "write_file",
                    "Create or overwrite a text file. The path is relative to the repository root.",
                    json!({
                        "type": "object",
                        "properties": {
                            "path": { "type": "string" },
                            "content": { "type": "string" }
                        },
                        "required": ["path", "content"]
                    }),
                ),
            );
        }

        tools
    }

    /// Dispatch a tool call by name; always returns a string result
    pub async fn invoke(&self, name: &str, args: &Value) -> String {
        let arg = |key: &str| args.get(key).and_then(Value::as_str);
        debug!(tool = name, "Invoking tool");

        match name {
            "read_file" => match arg("path") {
                Some(path) => self.read_file(path).await,
                None => "Error: read_file requires 'path'".to_string(),
            },
            "write_file" => match (arg("path"), arg("content")) {
                (Some(path), Some(content)) => self.write_file(path, content).await,
                _ => "Error: write_file requires 'path' and 'content'".to_string(),
            },
            "list_files" => {
                self.list_files(arg("directory").unwrap_or("."), arg("pattern"))
                    .await
            }
            "run_tests" => {
                let result = self.run_tests(arg("path").unwrap_or("")).await;
                serde_json::to_string(&result).unwrap_or(result.output)
            }
            "fetch_standards_doc" => self.fetch_standards_doc().await,
            other => format!("Error: unknown tool '{}'", other),
        }
    }
}

fn reject(msg: String) -> String {
    warn!(reason = %msg, "Tool call rejected");
    msg
}

fn function(name: &str, description: &str, parameters: Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters
        }
    })
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

fn collect_files(
    root: &Path,
    base: &Path,
    matcher: Option<&GlobMatcher>,
) -> std::io::Result<(Vec<String>, bool)> {
    let mut files = Vec::new();
    let walker = WalkDir::new(base)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && SKIP_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(path);
        let matched = match matcher {
            Some(m) => m.is_match(rel) || m.is_match(entry.file_name()),
            None => true,
        };
        if matched {
            if files.len() == LIST_LIMIT {
                files.sort();
                return Ok((files, true));
            }
            files.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    files.sort();
    Ok((files, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn belt() -> (TempDir, ToolBelt) {
        let dir = TempDir::new().unwrap();
        let belt = ToolBelt::new(dir.path());
        (dir, belt)
    }

    #[tokio::test]
    async fn test_parent_traversal_not_allowed() {
        let (dir, belt) = belt();
        std::fs::write(dir.path().join("inside.txt"), "fine").unwrap();

        let out = belt.read_file("../secret").await;
        assert!(out.contains("not allowed"));

        let out = belt.read_file("src/../../secret").await;
        assert!(out.contains("not allowed"));
    }

    #[tokio::test]
    async fn test_absolute_path_not_allowed() {
        let (_dir, belt) = belt();
        assert!(belt.read_file("/etc/passwd").await.contains("not allowed"));
        assert!(belt
            .write_file("/tmp/evil.txt", "x")
            .await
            .contains("not allowed"));
        assert!(belt.resolve("/tmp/evil.txt").is_err());
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_reads_back() {
        let (dir, belt) = belt();
        let out = belt.write_file("tests/unit/test_calc.py", "def test_add(): pass\n").await;
        assert!(out.starts_with("Wrote"));
        assert!(dir.path().join("tests/unit/test_calc.py").exists());

        let content = belt.read_file("./tests/unit/test_calc.py").await;
        assert_eq!(content, "def test_add(): pass\n");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_message() {
        let (_dir, belt) = belt();
        let out = belt.read_file("nope.py").await;
        assert!(out.starts_with("Error: could not read 'nope.py'"));
    }

    #[tokio::test]
    async fn test_read_only_belt_refuses_writes() {
        let (dir, belt) = belt();
        let ro = belt.read_only();
        assert!(ro.write_file("a.txt", "x").await.contains("not allowed"));
        assert!(!dir.path().join("a.txt").exists());
        assert!(!ro
            .definitions()
            .iter()
            .any(|d| d["function"]["name"] == "write_file"));
    }

    #[tokio::test]
    async fn test_list_files_skips_vendor_dirs_and_filters() {
        let (dir, belt) = belt();
        for f in [
            "calc.py",
            "README.md",
            "pkg/ops.py",
            ".git/config",
            "node_modules/x/index.js",
            "__pycache__/calc.cpython-311.pyc",
        ] {
            let path = dir.path().join(f);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }

        let all = belt.list_files(".", None).await;
        assert!(all.contains("calc.py"));
        assert!(all.contains("pkg/ops.py"));
        assert!(!all.contains(".git"));
        assert!(!all.contains("node_modules"));
        assert!(!all.contains("__pycache__"));

        let py = belt.list_files("", Some("*.py")).await;
        assert_eq!(py.lines().collect::<Vec<_>>(), vec!["calc.py", "pkg/ops.py"]);

        let sub = belt.list_files("pkg", Some("**/*.py")).await;
        assert_eq!(sub, "pkg/ops.py");

        assert!(belt.list_files("..", None).await.contains("not allowed"));
    }

    #[tokio::test]
    async fn test_list_files_limit() {
        let (dir, belt) = belt();
        for i in 0..(LIST_LIMIT + 5) {
            std::fs::write(dir.path().join(format!("f{:03}.txt", i)), "").unwrap();
        }
        let out = belt.list_files(".", None).await;
        assert_eq!(out.lines().filter(|l| l.starts_with('f')).count(), LIST_LIMIT);
        assert!(out.contains("truncated"));
    }

    #[tokio::test]
    async fn test_standards_doc_fallback_and_file() {
        let (dir, belt) = belt();
        assert!(belt.fetch_standards_doc().await.contains("Unit Testing Standards"));

        let doc = dir.path().join("standards.md");
        std::fs::write(&doc, "# House rules").unwrap();
        let belt = belt.with_standards_path(&doc);
        assert_eq!(belt.fetch_standards_doc().await, "# House rules");
    }

    #[tokio::test]
    async fn test_run_tests_rejects_traversal() {
        let (_dir, belt) = belt();
        let out = belt.run_tests("../elsewhere").await;
        assert!(!out.passed);
        assert!(out.output.contains("not allowed"));
    }

    #[tokio::test]
    async fn test_invoke_dispatch() {
        let (_dir, belt) = belt();
        let out = belt
            .invoke("write_file", &json!({"path": "a.txt", "content": "hi"}))
            .await;
        assert!(out.starts_with("Wrote"));
        assert_eq!(belt.invoke("read_file", &json!({"path": "a.txt"})).await, "hi");
        assert!(belt.invoke("read_file", &json!({})).await.contains("requires"));
        assert!(belt.invoke("rm_rf", &json!({})).await.contains("unknown tool"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_workspace_not_allowed() {
        let (dir, belt) = belt();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret"), "TOP-SECRET").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let out = belt.read_file("link/secret").await;
        assert!(out.contains("not allowed"));
        assert!(!out.contains("TOP-SECRET"));

        let out = belt.write_file("link/planted.txt", "x").await;
        assert!(out.contains("not allowed"));
        assert!(!outside.path().join("planted.txt").exists());

        std::os::unix::fs::symlink(outside.path().join("missing"), dir.path().join("dangling"))
            .unwrap();
        assert!(belt.write_file("dangling", "x").await.contains("not allowed"));
        assert!(!outside.path().join("missing").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_inside_workspace_allowed() {
        let (dir, belt) = belt();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/calc.py"), "x = 1\n").unwrap();
        std::os::unix::fs::symlink(dir.path().join("src"), dir.path().join("alias")).unwrap();

        assert_eq!(belt.read_file("alias/calc.py").await, "x = 1\n");
        // Symlinked directories are not descended when listing
        assert_eq!(belt.list_files(".", Some("*.py")).await, "src/calc.py");
    }

    #[tokio::test]
    async fn test_list_files_missing_dir_is_message() {
        let (_dir, belt) = belt();
        let out = belt.list_files("nowhere", None).await;
        assert!(out.starts_with("Error: could not list 'nowhere'"));
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let s = "ééééé";
        let t = tail(s, 3);
        assert!(s.ends_with(t));
        assert!(t.len() <= 3);
    }
}
