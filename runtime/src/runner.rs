use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use uuid::Uuid;

use axon_core::inputs::ResolvedInputState;

/// Startup-fixed execution parameters. Each invocation builds one fresh
/// [`Runner`] from these; nothing here changes after serving begins.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Binary that owns the `run` subcommand (the execution engine). Defaults
    /// to the current executable at the CLI layer.
    pub runner_bin: PathBuf,
    pub agent_path: PathBuf,
    pub generator: String,
    pub conversation_strategy: String,
    /// 0 disables the step limit.
    pub max_steps: u32,
    /// 0 disables the cost limit.
    pub max_cost: f64,
    /// Seconds; enforced by the runner process itself.
    pub timeout: Option<u64>,
    pub quiet: bool,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn runner process")]
    Spawn(#[source] std::io::Error),
    #[error("runner produced no readable event trace")]
    Trace(#[source] std::io::Error),
    #[error("invalid event in runner trace")]
    TraceParse(#[source] serde_json::Error),
}

/// One isolated agent execution: a fresh child process writing to its own
/// event trace file. Runners share no state, so concurrent invocations
/// cannot observe each other.
pub struct Runner {
    id: Uuid,
    events_file: PathBuf,
    command_line: Vec<String>,
    input_state: ResolvedInputState,
}

impl Runner {
    pub fn new(settings: &RunnerSettings, mut input_state: ResolvedInputState) -> Self {
        let id = Uuid::now_v7();
        let events_file = std::env::temp_dir().join(format!("axon-runner-{id}.jsonl"));
        let command_line = build_command_line(settings, &mut input_state, &events_file);
        Self {
            id,
            events_file,
            command_line,
            input_state,
        }
    }

    pub fn command_line(&self) -> &[String] {
        &self.command_line
    }

    /// Run the child process to completion and assemble the output state:
    /// `command_line`, `output`, `exit_code`, `stdout`, `stderr`, `events`.
    pub async fn run(self) -> Result<Map<String, Value>, RunnerError> {
        tracing::info!(runner = %self.id, inputs = ?self.input_state, "spawning runner");

        let mut child = Command::new(&self.command_line[0])
            .args(&self.command_line[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RunnerError::Spawn)?;

        let stdout_task = capture_lines(child.stdout.take());
        let stderr_task = capture_lines(child.stderr.take());

        let status = child.wait().await.map_err(RunnerError::Spawn)?;
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        tracing::debug!(runner = %self.id, exit_code = ?status.code(), "runner exited, reading events");

        let raw = tokio::fs::read_to_string(&self.events_file)
            .await
            .map_err(RunnerError::Trace)?;
        let _ = tokio::fs::remove_file(&self.events_file).await;

        let mut events = Vec::new();
        for line in raw.lines().filter(|line| !line.trim().is_empty()) {
            events.push(serde_json::from_str::<Value>(line).map_err(RunnerError::TraceParse)?);
        }

        tracing::debug!(runner = %self.id, count = events.len(), "read events");

        let output_object = match output_object(&self.input_state, &events) {
            Some(output) => output,
            None => {
                tracing::warn!(runner = %self.id, "could not get raw output value from runner");
                if !stderr.is_empty() {
                    json!({ "output": stderr.join("\n") })
                } else if !stdout.is_empty() {
                    json!({ "output": stdout.join("\n") })
                } else {
                    json!({ "output": "the run did not write any output" })
                }
            }
        };

        let mut output_state = Map::new();
        output_state.insert("command_line".to_string(), json!(self.command_line));
        output_state.insert("output".to_string(), output_object);
        output_state.insert("exit_code".to_string(), json!(status.code()));
        output_state.insert("stdout".to_string(), json!(stdout));
        output_state.insert("stderr".to_string(), json!(stderr));
        output_state.insert("events".to_string(), Value::Array(events));

        Ok(output_state)
    }
}

fn build_command_line(
    settings: &RunnerSettings,
    input_state: &mut ResolvedInputState,
    events_file: &Path,
) -> Vec<String> {
    let mut command_line = vec![
        settings.runner_bin.display().to_string(),
        "run".to_string(),
        settings.agent_path.display().to_string(),
        "--generator".to_string(),
        settings.generator.clone(),
        "--conversation".to_string(),
        settings.conversation_strategy.clone(),
        "--max-steps".to_string(),
        settings.max_steps.to_string(),
        "--max-cost".to_string(),
        settings.max_cost.to_string(),
    ];

    if let Some(timeout) = settings.timeout {
        command_line.push("--timeout".to_string());
        command_line.push(timeout.to_string());
    }

    if settings.quiet {
        command_line.push("--quiet".to_string());
    }

    // A resolved `task` input travels as its own flag, not as start state.
    if let Some(task) = input_state.remove("task") {
        command_line.push("--task".to_string());
        command_line.push(value_as_string(&task));
    }

    command_line.push("--start-state".to_string());
    command_line
        .push(serde_json::to_string(input_state).unwrap_or_else(|_| "{}".to_string()));

    command_line.push("--trace".to_string());
    command_line.push(events_file.display().to_string());

    command_line
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn capture_lines<R>(stream: Option<R>) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = Vec::new();
        let Some(stream) = stream else {
            return lines;
        };
        let mut reader = BufReader::new(stream).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            lines.push(line);
        }
        lines
    })
}

fn last_event<'a>(events: &'a [Value], name: &str) -> Option<&'a Value> {
    events
        .iter()
        .rev()
        .find(|event| event.get("name").and_then(Value::as_str) == Some(name))
}

fn non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Extract the output object from the event trace. Precedence: explicit task
/// completion, task failure, leftover flow variables, then the last textual
/// or tool response.
fn output_object(inputs: &ResolvedInputState, events: &[Value]) -> Option<Value> {
    // one of the tools wrote an output variable and marked the task complete
    for name in ["task_complete", "task_failed"] {
        if let Some(event) = last_event(events, name) {
            if let Some(reason) = event.pointer("/data/reason") {
                if non_empty(reason) {
                    return Some(reason.clone());
                }
            }
        }
    }

    // the flow completed and a variable was written to the output state
    if let Some(event) = last_event(events, "flow_complete") {
        if let Some(variables) = event.pointer("/data/state/variables").and_then(Value::as_object) {
            let outputs: Map<String, Value> = variables
                .iter()
                .filter(|(name, _)| !inputs.contains_key(*name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            if !outputs.is_empty() {
                return Some(Value::Object(outputs));
            }
        }
    }

    // fallback to the latest tool call output or text response
    for event in events.iter().rev() {
        match event.get("name").and_then(Value::as_str) {
            Some("text_response") => {
                let response = event.pointer("/data/response").cloned().unwrap_or(Value::Null);
                return Some(json!({ "response": response }));
            }
            Some("tool_called") => {
                let result = event.pointer("/data/result").cloned().unwrap_or(Value::Null);
                return Some(json!({ "output": result }));
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(runner_bin: &Path) -> RunnerSettings {
        RunnerSettings {
            runner_bin: runner_bin.to_path_buf(),
            agent_path: PathBuf::from("/agents/demo"),
            generator: "openai/gpt-4o".to_string(),
            conversation_strategy: "full".to_string(),
            max_steps: 50,
            max_cost: 2.5,
            timeout: None,
            quiet: false,
        }
    }

    fn state(pairs: &[(&str, Value)]) -> ResolvedInputState {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn command_line_carries_limits_and_start_state() {
        let runner = Runner::new(
            &settings(Path::new("/usr/bin/axon")),
            state(&[("topic", json!("rust"))]),
        );
        let command_line = runner.command_line();

        assert_eq!(command_line[0], "/usr/bin/axon");
        assert_eq!(command_line[1], "run");
        assert_eq!(command_line[2], "/agents/demo");
        assert!(command_line.contains(&"--max-steps".to_string()));
        assert!(command_line.contains(&"50".to_string()));
        assert!(!command_line.contains(&"--timeout".to_string()));
        assert!(!command_line.contains(&"--quiet".to_string()));

        let start_state_at = command_line.iter().position(|a| a == "--start-state").unwrap();
        let parsed: Value = serde_json::from_str(&command_line[start_state_at + 1]).unwrap();
        assert_eq!(parsed, json!({ "topic": "rust" }));
    }

    #[test]
    fn task_input_travels_as_its_own_flag() {
        let runner = Runner::new(
            &settings(Path::new("axon")),
            state(&[("task", json!("summarize this")), ("lang", json!("en"))]),
        );
        let command_line = runner.command_line();

        let task_at = command_line.iter().position(|a| a == "--task").unwrap();
        assert_eq!(command_line[task_at + 1], "summarize this");

        let start_state_at = command_line.iter().position(|a| a == "--start-state").unwrap();
        let parsed: Value = serde_json::from_str(&command_line[start_state_at + 1]).unwrap();
        assert_eq!(parsed, json!({ "lang": "en" }));
    }

    #[test]
    fn timeout_and_quiet_are_emitted_when_set() {
        let mut with_timeout = settings(Path::new("axon"));
        with_timeout.timeout = Some(30);
        with_timeout.quiet = true;
        let runner = Runner::new(&with_timeout, ResolvedInputState::new());
        let command_line = runner.command_line();

        let timeout_at = command_line.iter().position(|a| a == "--timeout").unwrap();
        assert_eq!(command_line[timeout_at + 1], "30");
        assert!(command_line.contains(&"--quiet".to_string()));
    }

    fn event(name: &str, data: Value) -> Value {
        json!({ "name": name, "data": data })
    }

    #[test]
    fn task_complete_reason_wins() {
        let events = vec![
            event("tool_called", json!({ "result": "intermediate" })),
            event("task_complete", json!({ "reason": { "output": "done" } })),
        ];
        assert_eq!(
            output_object(&ResolvedInputState::new(), &events),
            Some(json!({ "output": "done" }))
        );
    }

    #[test]
    fn empty_completion_reason_falls_through_to_failure() {
        let events = vec![
            event("task_failed", json!({ "reason": { "error": "boom" } })),
            event("task_complete", json!({ "reason": {} })),
        ];
        assert_eq!(
            output_object(&ResolvedInputState::new(), &events),
            Some(json!({ "error": "boom" }))
        );
    }

    #[test]
    fn flow_variables_exclude_declared_inputs() {
        let events = vec![event(
            "flow_complete",
            json!({ "state": { "variables": { "topic": "rust", "summary": "short" } } }),
        )];
        let inputs = state(&[("topic", json!("rust"))]);
        assert_eq!(
            output_object(&inputs, &events),
            Some(json!({ "summary": "short" }))
        );
    }

    #[test]
    fn last_text_response_is_the_fallback() {
        let events = vec![
            event("text_response", json!({ "response": "first" })),
            event("text_response", json!({ "response": "second" })),
        ];
        assert_eq!(
            output_object(&ResolvedInputState::new(), &events),
            Some(json!({ "response": "second" }))
        );
    }

    #[test]
    fn no_usable_events_yields_none() {
        let events = vec![event("step", json!({}))];
        assert_eq!(output_object(&ResolvedInputState::new(), &events), None);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_runner(dir: &Path, script_body: &str) -> PathBuf {
            let path = dir.join("fake-runner.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        // Finds --trace (last argument) and writes one completion event.
        const COMPLETING_RUNNER: &str = r#"
for arg do last="$arg"; done
printf '{"name":"task_complete","data":{"reason":{"output":"done"}}}\n' > "$last"
"#;

        #[tokio::test]
        async fn run_collects_output_state_from_the_trace() {
            let dir = tempfile::tempdir().unwrap();
            let bin = fake_runner(dir.path(), COMPLETING_RUNNER);

            let runner = Runner::new(&settings(&bin), ResolvedInputState::new());
            let output_state = runner.run().await.unwrap();

            assert_eq!(output_state["output"], json!({ "output": "done" }));
            assert_eq!(output_state["exit_code"], json!(0));
            assert!(output_state.contains_key("command_line"));
            assert!(output_state.contains_key("stdout"));
            assert!(output_state.contains_key("stderr"));
            assert_eq!(output_state["events"].as_array().unwrap().len(), 1);
        }

        #[tokio::test]
        async fn missing_trace_is_a_runner_error() {
            let dir = tempfile::tempdir().unwrap();
            let bin = fake_runner(dir.path(), "exit 0");

            let runner = Runner::new(&settings(&bin), ResolvedInputState::new());
            let err = runner.run().await.unwrap_err();
            assert!(matches!(err, RunnerError::Trace(_)));
        }

        #[tokio::test]
        async fn missing_binary_is_a_spawn_error() {
            let runner = Runner::new(
                &settings(Path::new("/nonexistent/axon-runner")),
                ResolvedInputState::new(),
            );
            let err = runner.run().await.unwrap_err();
            assert!(matches!(err, RunnerError::Spawn(_)));
        }
    }
}
