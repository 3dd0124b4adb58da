// src/test_utils/fake_runtime.rs
//! In-memory `ContainerRuntime` that simulates containers without Docker.
//!
//! Programs are "run" by reading the delivered entry file and recognising a few
//! call shapes line by line: `print(...)` / `console.log(...)` write stdout,
//! `error(...)` / `console.error(...)` write stderr, `sleep(N)` (any prefix such
//! as `time.`) delays for N seconds, and `exit(N)` (any prefix such as `sys.`
//! or `process.`) sets the exit code. Delays use tokio time, so tests can run
//! with a paused clock.

use crate::errors::RuntimeError;
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerStatus, ExecOutcome, ProcessOutput};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

const INTERPRETERS: [&str; 2] = ["python", "node"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub output: ProcessOutput,
    pub exit_code: i64,
    pub delay: Duration,
}

fn call_argument<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let start = line.find(&format!("{}(", name))? + name.len() + 1;
    // Only match whole call names, so `exit(` does not fire inside `sys_exit(`.
    let before = line[..start - name.len() - 1].chars().last();
    if matches!(before, Some(c) if c.is_alphanumeric() || c == '_') {
        return None;
    }
    let end = line[start..].rfind(')')? + start;
    Some(line[start..end].trim())
}

fn unquote(arg: &str) -> &str {
    arg.trim_matches(|c| c == '\'' || c == '"')
}

pub fn simulate(code: &str) -> Script {
    let mut script = Script::default();
    for line in code.lines().map(str::trim) {
        if let Some(arg) = call_argument(line, "print").or_else(|| call_argument(line, "log")) {
            script.output.push_stdout(&format!("{}\n", unquote(arg)));
        } else if let Some(arg) = call_argument(line, "error") {
            script.output.push_stderr(&format!("{}\n", unquote(arg)));
        } else if let Some(arg) = call_argument(line, "sleep") {
            let secs: f64 = arg.parse().unwrap_or(0.0);
            script.delay += Duration::from_secs_f64(secs);
        } else if let Some(arg) = call_argument(line, "exit") {
            script.exit_code = arg.parse().unwrap_or(1);
            break;
        }
    }
    script
}

#[derive(Debug)]
struct FakeContainer {
    spec: ContainerSpec,
    files: HashMap<String, String>,
    started: bool,
    killed: bool,
    finishes_at: Option<Instant>,
    entry_result: Option<Script>,
}

impl FakeContainer {
    fn is_running(&self) -> bool {
        if !self.started || self.killed {
            return false;
        }
        match self.finishes_at {
            Some(at) => Instant::now() < at,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    containers: HashMap<String, FakeContainer>,
    next_id: u64,
    created: Vec<String>,
    removed: Vec<String>,
    killed: Vec<String>,
    inspections: usize,
    fail_next_start: bool,
    fail_next_exec: bool,
    fail_next_create: bool,
    fail_next_inspect: bool,
    fail_next_logs: bool,
    drop_exit_code: bool,
    exec_exit_override: Option<i64>,
}

#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    missing_images: HashSet<String>,
    create_delay: Duration,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missing_image(mut self, image: &str) -> Self {
        self.missing_images.insert(image.to_string());
        self
    }

    /// Make each container creation take `delay`, to widen race windows.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn fail_next_start(&self) {
        self.state.lock().unwrap().fail_next_start = true;
    }

    pub fn fail_next_create(&self) {
        self.state.lock().unwrap().fail_next_create = true;
    }

    pub fn fail_next_exec(&self) {
        self.state.lock().unwrap().fail_next_exec = true;
    }

    pub fn fail_next_inspect(&self) {
        self.state.lock().unwrap().fail_next_inspect = true;
    }

    pub fn fail_next_logs(&self) {
        self.state.lock().unwrap().fail_next_logs = true;
    }

    /// Report execs without an exit code.
    pub fn drop_exit_codes(&self) {
        self.state.lock().unwrap().drop_exit_code = true;
    }

    /// Force every exec to report `code`, whatever the program does.
    pub fn override_exec_exit(&self, code: i64) {
        self.state.lock().unwrap().exec_exit_override = Some(code);
    }

    /// Remove a container behind the engine's back.
    pub fn vanish(&self, id: &str) {
        self.state.lock().unwrap().containers.remove(id);
    }

    pub fn spec_of(&self, id: &str) -> Option<ContainerSpec> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(id)
            .map(|c| c.spec.clone())
    }

    pub fn file_in(&self, id: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(id)
            .and_then(|c| c.files.get(path).cloned())
    }

    pub fn exists(&self, id: &str) -> bool {
        self.state.lock().unwrap().containers.contains_key(id)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(id)
            .map(FakeContainer::is_running)
            .unwrap_or(false)
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().unwrap().created.len()
    }

    pub fn created_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn was_removed(&self, id: &str) -> bool {
        self.state.lock().unwrap().removed.iter().any(|r| r == id)
    }

    pub fn was_killed(&self, id: &str) -> bool {
        self.state.lock().unwrap().killed.iter().any(|k| k == id)
    }

    pub fn inspections(&self) -> usize {
        self.state.lock().unwrap().inspections
    }
}

fn not_found(id: &str) -> RuntimeError {
    RuntimeError::ContainerNotFound(id.to_string())
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        Ok(!self.missing_images.contains(image))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        if self.missing_images.contains(&spec.image) {
            return Err(RuntimeError::ImageNotFound(spec.image.clone()));
        }

        let mut files = HashMap::new();
        for bind in &spec.binds {
            let mut parts = bind.split(':');
            if let (Some(host), Some(target)) = (parts.next(), parts.next()) {
                let content = std::fs::read_to_string(host)
                    .map_err(|e| RuntimeError::Api(format!("bind source {}: {}", host, e)))?;
                files.insert(target.to_string(), content);
            }
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_next_create {
            state.fail_next_create = false;
            return Err(RuntimeError::Api("daemon refused to create container".into()));
        }
        state.next_id += 1;
        let id = format!("fake-{:04}", state.next_id);
        state.created.push(id.clone());
        state.containers.insert(
            id.clone(),
            FakeContainer {
                spec: spec.clone(),
                files,
                started: false,
                killed: false,
                finishes_at: None,
                entry_result: None,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_start {
            state.fail_next_start = false;
            return Err(RuntimeError::Api("OCI runtime create failed".into()));
        }
        let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
        container.started = true;

        let command = &container.spec.command;
        if command.len() == 2 && INTERPRETERS.contains(&command[0].as_str()) {
            let script = match container.files.get(&command[1]) {
                Some(code) => simulate(code),
                None => missing_file_script(&command[1]),
            };
            container.finishes_at = Some(Instant::now() + script.delay);
            container.entry_result = Some(script);
        }
        Ok(())
    }

    async fn upload_archive(&self, id: &str, path: &str, archive: Vec<u8>) -> Result<(), RuntimeError> {
        let mut unpacked = Vec::new();
        let mut tar = tar::Archive::new(archive.as_slice());
        let entries = tar
            .entries()
            .map_err(|e| RuntimeError::Api(format!("bad archive: {}", e)))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| RuntimeError::Api(format!("bad entry: {}", e)))?;
            let name = entry
                .path()
                .map_err(|e| RuntimeError::Api(e.to_string()))?
                .display()
                .to_string();
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| RuntimeError::Api(e.to_string()))?;
            unpacked.push((format!("{}/{}", path.trim_end_matches('/'), name), content));
        }

        let mut state = self.state.lock().unwrap();
        let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
        if !container.is_running() {
            return Err(RuntimeError::Api(format!("container {} is not running", id)));
        }
        container.files.extend(unpacked);
        Ok(())
    }

    async fn exec(
        &self,
        id: &str,
        command: Vec<String>,
        _working_dir: &str,
    ) -> Result<ExecOutcome, RuntimeError> {
        let (script, drop_exit_code, exit_override) = {
            let mut state = self.state.lock().unwrap();
            if state.fail_next_exec {
                state.fail_next_exec = false;
                return Err(RuntimeError::Api("exec channel hijack failed".into()));
            }
            let drop_exit_code = state.drop_exit_code;
            let exit_override = state.exec_exit_override;
            let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
            if !container.is_running() {
                return Err(RuntimeError::Api(format!("container {} is not running", id)));
            }
            let script = if command.len() != 2 || !INTERPRETERS.contains(&command[0].as_str()) {
                let mut output = ProcessOutput::default();
                output.push_stderr(&format!("{}: command not found\n", command.join(" ")));
                Script {
                    output,
                    exit_code: 127,
                    delay: Duration::ZERO,
                }
            } else {
                match container.files.get(&command[1]) {
                    Some(code) => simulate(code),
                    None => missing_file_script(&command[1]),
                }
            };
            (script, drop_exit_code, exit_override)
        };

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        Ok(ExecOutcome {
            exit_code: if drop_exit_code {
                None
            } else {
                Some(exit_override.unwrap_or(script.exit_code))
            },
            output: script.output,
        })
    }

    async fn inspect(&self, id: &str) -> Result<ContainerStatus, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.inspections += 1;
        if state.fail_next_inspect {
            state.fail_next_inspect = false;
            return Err(RuntimeError::Api("inspect failed".to_string()));
        }
        let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
        let running = container.is_running();
        let exit_code = if running || !container.started {
            None
        } else if container.killed {
            Some(137)
        } else {
            container.entry_result.as_ref().map(|s| s.exit_code)
        };
        Ok(ContainerStatus {
            running,
            exit_code,
            oom_killed: false,
        })
    }

    async fn logs(&self, id: &str) -> Result<ProcessOutput, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_logs {
            state.fail_next_logs = false;
            return Err(RuntimeError::Api("log stream closed".to_string()));
        }
        let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
        if container.is_running() {
            return Ok(ProcessOutput::default());
        }
        Ok(container
            .entry_result
            .as_ref()
            .map(|s| s.output.clone())
            .unwrap_or_default())
    }

    async fn kill_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
        if !container.is_running() {
            return Err(RuntimeError::Api(format!("container {} is not running", id)));
        }
        container.killed = true;
        state.killed.push(id.to_string());
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
        if container.is_running() {
            container.killed = true;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.containers.remove(id).ok_or_else(|| not_found(id))?;
        state.removed.push(id.to_string());
        Ok(())
    }
}

fn missing_file_script(path: &str) -> Script {
    let mut output = ProcessOutput::default();
    output.push_stderr(&format!("can't open file '{}': No such file or directory\n", path));
    Script {
        output,
        exit_code: 2,
        delay: Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulate_recognises_calls() {
        let script = simulate("import sys\nprint('hello')\ntime.sleep(2)\nsys.exit(3)\nprint('never')");
        assert_eq!(script.output.stdout, "hello\n");
        assert_eq!(script.exit_code, 3);
        assert_eq!(script.delay, Duration::from_secs(2));
    }

    #[test]
    fn test_simulate_javascript() {
        let script = simulate("console.log(\"hi\");\nconsole.error('bad');\nprocess.exit(0);");
        assert_eq!(script.output.stdout, "hi\n");
        assert_eq!(script.output.stderr, "bad\n");
        assert_eq!(script.output.combined, "hi\nbad\n");
        assert_eq!(script.exit_code, 0);
    }
}
