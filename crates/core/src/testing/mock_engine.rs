//! Mock codec engine for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{validate_name, CodecEngine, EngineError, EngineFactory, ExecOutcome};

/// A recorded engine invocation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedExec {
    /// Namespace the invocation ran in.
    pub namespace: String,
    /// Arguments passed to the engine.
    pub args: Vec<String>,
}

impl RecordedExec {
    /// Whether any argument contains `pattern`.
    pub fn mentions(&self, pattern: &str) -> bool {
        self.args.iter().any(|arg| arg.contains(pattern))
    }

    /// Whether this is a stream-copy concatenation.
    pub fn is_concat(&self) -> bool {
        self.args
            .windows(2)
            .any(|w| w[0] == "-f" && w[1] == "concat")
    }
}

/// Scripted behavior shared by every engine created from one factory.
#[derive(Debug, Default)]
struct Script {
    fail_patterns: Mutex<Vec<String>>,
    panic_patterns: Mutex<Vec<String>>,
    delays: Mutex<Vec<(String, Duration)>>,
    probe_duration: Mutex<Option<f64>>,
    execs: Mutex<Vec<RecordedExec>>,
    running: AtomicUsize,
    peak_running: AtomicUsize,
}

impl Script {
    fn first_match(patterns: &[String], args: &[String]) -> Option<String> {
        patterns
            .iter()
            .find(|p| args.iter().any(|arg| arg.contains(p.as_str())))
            .cloned()
    }

    fn delay_for(&self, args: &[String]) -> Option<Duration> {
        self.delays
            .lock()
            .iter()
            .find(|(p, _)| args.iter().any(|arg| arg.contains(p.as_str())))
            .map(|(_, d)| *d)
    }
}

/// Decrements the running counter even when the exec future is dropped.
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory implementation of [`CodecEngine`].
///
/// Files live in a map; `exec` interprets the argument shapes the pipeline
/// produces:
/// - `-ss <start> ... <out>` writes `cut@<start>` to `<out>`
/// - `-f concat -i <manifest> ... <out>` joins the listed entries in order
/// - `-i <in> -f null -` logs a `Duration:` line
/// - anything else with `-i <in> ... <out>` writes `<` + input + `>` to `<out>`
///
/// A missing input yields exit code 1, like the real engine.
///
/// # Example
///
/// ```rust,ignore
/// use segcast_core::testing::MockEngine;
///
/// let engine = MockEngine::new("main");
/// engine.fail_exec_matching("seg_3_");
/// engine.delay_exec_matching("seg_0_", Duration::from_millis(50));
///
/// // ... run code under test ...
///
/// assert_eq!(engine.exec_count_matching("seg_"), 6);
/// ```
#[derive(Debug)]
pub struct MockEngine {
    namespace: String,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    script: Arc<Script>,
}

impl MockEngine {
    /// Creates a standalone engine with its own script.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_script(namespace, Arc::new(Script::default()))
    }

    fn with_script(namespace: impl Into<String>, script: Arc<Script>) -> Self {
        Self {
            namespace: namespace.into(),
            files: Mutex::new(BTreeMap::new()),
            script,
        }
    }

    /// Makes every invocation mentioning `pattern` exit with code 1.
    pub fn fail_exec_matching(&self, pattern: &str) {
        self.script.fail_patterns.lock().push(pattern.to_string());
    }

    /// Makes every invocation mentioning `pattern` panic.
    pub fn panic_exec_matching(&self, pattern: &str) {
        self.script.panic_patterns.lock().push(pattern.to_string());
    }

    /// Delays every invocation mentioning `pattern`.
    pub fn delay_exec_matching(&self, pattern: &str, delay: Duration) {
        self.script.delays.lock().push((pattern.to_string(), delay));
    }

    /// Duration reported by null-output probes (default 10s).
    pub fn set_probe_duration(&self, secs: f64) {
        *self.script.probe_duration.lock() = Some(secs);
    }

    /// Every invocation so far, in call order.
    pub fn recorded_execs(&self) -> Vec<RecordedExec> {
        self.script.execs.lock().clone()
    }

    /// Number of invocations mentioning `pattern`.
    pub fn exec_count_matching(&self, pattern: &str) -> usize {
        self.script
            .execs
            .lock()
            .iter()
            .filter(|e| e.mentions(pattern))
            .count()
    }

    /// Highest number of invocations running at once.
    pub fn peak_concurrent_execs(&self) -> usize {
        self.script.peak_running.load(Ordering::SeqCst)
    }

    /// Snapshot of the entries currently present.
    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        self.files.lock().clone()
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|arg| arg == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    fn missing(name: &str) -> ExecOutcome {
        ExecOutcome {
            exit_code: 1,
            log: format!("{}: No such file or directory", name),
        }
    }

    fn format_duration(secs: f64) -> String {
        let centis = (secs * 100.0).round() as u64;
        let (whole, frac) = (centis / 100, centis % 100);
        format!(
            "Duration: {:02}:{:02}:{:02}.{:02}, start: 0.000000, bitrate: 1000 kb/s",
            whole / 3600,
            (whole % 3600) / 60,
            whole % 60,
            frac
        )
    }

    /// Parses `file '<name>'` lines, undoing `'\''` escapes.
    fn manifest_entries(manifest: &str) -> Vec<String> {
        manifest
            .lines()
            .filter_map(|line| line.trim().strip_prefix("file '"))
            .filter_map(|rest| rest.strip_suffix('\''))
            .map(|name| name.replace("'\\''", "'"))
            .collect()
    }

    fn interpret(&self, args: &[String]) -> ExecOutcome {
        let Some(output) = args.last().cloned() else {
            return ExecOutcome {
                exit_code: 1,
                log: "no arguments".to_string(),
            };
        };
        let Some(input) = Self::value_after(args, "-i") else {
            return ExecOutcome {
                exit_code: 1,
                log: "no input".to_string(),
            };
        };

        let mut files = self.files.lock();
        let Some(source) = files.get(input).cloned() else {
            return Self::missing(input);
        };

        if Self::value_after(args, "-f") == Some("null") {
            let secs = self.script.probe_duration.lock().unwrap_or(10.0);
            return ExecOutcome {
                exit_code: 0,
                log: format!("Input #0, from '{}':\n  {}\n", input, Self::format_duration(secs)),
            };
        }

        let bytes = if Self::value_after(args, "-f") == Some("concat") {
            let listing = String::from_utf8_lossy(&source).to_string();
            let mut joined = Vec::new();
            for name in Self::manifest_entries(&listing) {
                match files.get(&name) {
                    Some(part) => joined.extend_from_slice(part),
                    None => return Self::missing(&name),
                }
            }
            joined
        } else if let Some(start) = Self::value_after(args, "-ss") {
            format!("cut@{}", start).into_bytes()
        } else {
            let mut wrapped = Vec::with_capacity(source.len() + 2);
            wrapped.push(b'<');
            wrapped.extend_from_slice(&source);
            wrapped.push(b'>');
            wrapped
        };

        files.insert(output.clone(), bytes);
        ExecOutcome {
            exit_code: 0,
            log: format!("Output #0, to '{}'", output),
        }
    }
}

#[async_trait]
impl CodecEngine for MockEngine {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        validate_name(name)?;
        self.files.lock().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        validate_name(name)?;
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::file_not_found(name))
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        validate_name(name)?;
        self.files
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::file_not_found(name))
    }

    async fn list_files(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.files.lock().keys().cloned().collect())
    }

    async fn exec(&self, args: &[String]) -> Result<ExecOutcome, EngineError> {
        self.script.execs.lock().push(RecordedExec {
            namespace: self.namespace.clone(),
            args: args.to_vec(),
        });

        let now = self.script.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.script.peak_running.fetch_max(now, Ordering::SeqCst);
        let _guard = RunningGuard(&self.script.running);

        if let Some(delay) = self.script.delay_for(args) {
            tokio::time::sleep(delay).await;
        }

        let panic_on = Script::first_match(&self.script.panic_patterns.lock(), args);
        if let Some(pattern) = panic_on {
            panic!("mock engine panic on '{}'", pattern);
        }

        let fail_on = Script::first_match(&self.script.fail_patterns.lock(), args);
        if let Some(pattern) = fail_on {
            return Ok(ExecOutcome {
                exit_code: 1,
                log: format!("Error while processing: scripted failure on '{}'", pattern),
            });
        }

        Ok(self.interpret(args))
    }
}

/// Mock implementation of [`EngineFactory`].
///
/// Every engine it creates shares one script, so failures and delays can be
/// configured before the code under test creates its namespaces. Created
/// engines stay inspectable after their scope is released.
#[derive(Debug)]
pub struct MockEngineFactory {
    script: Arc<Script>,
    engines: Mutex<Vec<(String, Arc<MockEngine>)>>,
    live: Mutex<BTreeSet<String>>,
    releases: Mutex<Vec<(String, usize)>>,
}

impl Default for MockEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngineFactory {
    /// Creates a new factory with an empty script.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Script::default()),
            engines: Mutex::new(Vec::new()),
            live: Mutex::new(BTreeSet::new()),
            releases: Mutex::new(Vec::new()),
        }
    }

    /// See [`MockEngine::fail_exec_matching`].
    pub fn fail_exec_matching(&self, pattern: &str) {
        self.script.fail_patterns.lock().push(pattern.to_string());
    }

    /// See [`MockEngine::panic_exec_matching`].
    pub fn panic_exec_matching(&self, pattern: &str) {
        self.script.panic_patterns.lock().push(pattern.to_string());
    }

    /// See [`MockEngine::delay_exec_matching`].
    pub fn delay_exec_matching(&self, pattern: &str, delay: Duration) {
        self.script.delays.lock().push((pattern.to_string(), delay));
    }

    /// See [`MockEngine::set_probe_duration`].
    pub fn set_probe_duration(&self, secs: f64) {
        *self.script.probe_duration.lock() = Some(secs);
    }

    /// Every invocation across all engines, in call order.
    pub fn recorded_execs(&self) -> Vec<RecordedExec> {
        self.script.execs.lock().clone()
    }

    /// Number of invocations mentioning `pattern` across all engines.
    pub fn exec_count_matching(&self, pattern: &str) -> usize {
        self.script
            .execs
            .lock()
            .iter()
            .filter(|e| e.mentions(pattern))
            .count()
    }

    /// Number of concat invocations across all engines.
    pub fn concat_count(&self) -> usize {
        self.script
            .execs
            .lock()
            .iter()
            .filter(|e| e.is_concat())
            .count()
    }

    /// Highest number of invocations running at once across all engines.
    pub fn peak_concurrent_execs(&self) -> usize {
        self.script.peak_running.load(Ordering::SeqCst)
    }

    /// Invocations still running when `scope` was last released.
    pub fn execs_running_at_release(&self, scope: &str) -> Option<usize> {
        self.releases
            .lock()
            .iter()
            .rev()
            .find(|(s, _)| s == scope)
            .map(|(_, running)| *running)
    }

    /// Scopes created and not yet released.
    pub fn live_scopes(&self) -> Vec<String> {
        self.live.lock().iter().cloned().collect()
    }

    /// Namespaces created under `scope`, in creation order.
    pub fn namespaces(&self, scope: &str) -> Vec<String> {
        self.engines
            .lock()
            .iter()
            .filter(|(s, _)| s == scope)
            .map(|(_, e)| e.namespace.clone())
            .collect()
    }

    /// The engine created for `namespace` under `scope`, if any.
    pub fn engine(&self, scope: &str, namespace: &str) -> Option<Arc<MockEngine>> {
        self.engines
            .lock()
            .iter()
            .find(|(s, e)| s == scope && e.namespace == namespace)
            .map(|(_, e)| Arc::clone(e))
    }
}

#[async_trait]
impl EngineFactory for MockEngineFactory {
    async fn create(
        &self,
        scope: &str,
        namespace: &str,
    ) -> Result<Arc<dyn CodecEngine>, EngineError> {
        validate_name(scope)?;
        validate_name(namespace)?;

        let engine = Arc::new(MockEngine::with_script(namespace, Arc::clone(&self.script)));
        self.engines
            .lock()
            .push((scope.to_string(), Arc::clone(&engine)));
        self.live.lock().insert(scope.to_string());
        Ok(engine)
    }

    async fn release_scope(&self, scope: &str) -> Result<(), EngineError> {
        let running = self.script.running.load(Ordering::SeqCst);
        self.releases.lock().push((scope.to_string(), running));
        self.live.lock().remove(scope);
        Ok(())
    }
}
