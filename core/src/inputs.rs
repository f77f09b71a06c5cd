use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::AgentConfig;

/// Declared inputs: input name to optional default value. Inputs without a
/// usable default are required.
pub type InputDeclaration = BTreeMap<String, Option<Value>>;

/// A fully resolved per-request input state. Contains exactly the declared
/// key set; every value is non-null.
pub type ResolvedInputState = BTreeMap<String, Value>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("input '{0}' is required")]
    MissingRequired(String),
}

/// Collect `{{ name }}` placeholders from a directive or command template.
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|captures| captures[1].to_string())
        .collect()
}

/// Substitute `{{ name }}` placeholders with values from `values`. A missing
/// or null value renders as the empty string.
pub fn render(template: &str, values: &Map<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(template, |captures: &regex::Captures| {
            match values.get(&captures[1]) {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

/// Derive the input declaration for an agent: placeholders referenced by the
/// agent directive, the task directive, and tool command templates, minus
/// tool names and tool argument names, with defaults attached. An agent
/// without a baked-in task directive takes a required `task` input per
/// request.
pub fn declared_inputs(config: &AgentConfig) -> InputDeclaration {
    let tool_names: HashSet<&str> = config.tools.iter().map(|tool| tool.name.as_str()).collect();
    let mut names: BTreeSet<String> = BTreeSet::new();

    for directive in [config.agent.as_deref(), config.task.as_deref()].into_iter().flatten() {
        for name in placeholders(directive) {
            if !tool_names.contains(name.as_str()) {
                names.insert(name);
            }
        }
    }

    for tool in &config.tools {
        let Some(command) = tool.tool.as_deref() else {
            continue;
        };
        let arg_names: HashSet<&str> = tool.arguments.iter().map(|arg| arg.name.as_str()).collect();
        for name in placeholders(command) {
            if !arg_names.contains(name.as_str()) && !tool_names.contains(name.as_str()) {
                names.insert(name);
            }
        }
    }

    if config.task.is_none() {
        names.insert("task".to_string());
    }

    names
        .into_iter()
        .map(|name| {
            let default = config.defaults.get(&name).cloned();
            (name, default)
        })
        .collect()
}

/// Merge caller-supplied values over declared defaults. Pure: the output
/// preserves exactly the declared key set, extra supplied keys are ignored,
/// and a null (supplied or default) counts as absent.
pub fn resolve(
    declared: &InputDeclaration,
    supplied: &Map<String, Value>,
) -> Result<ResolvedInputState, InputError> {
    let mut state = ResolvedInputState::new();
    for (name, default) in declared {
        let value = supplied
            .get(name)
            .filter(|value| !value.is_null())
            .cloned()
            .or_else(|| default.clone().filter(|value| !value.is_null()));
        match value {
            Some(value) => {
                state.insert(name.clone(), value);
            }
            None => return Err(InputError::MissingRequired(name.clone())),
        }
    }
    Ok(state)
}

/// Names of inputs that must be supplied by the caller.
pub fn required_inputs(declared: &InputDeclaration) -> Vec<&str> {
    declared
        .iter()
        .filter(|(_, default)| !matches!(default, Some(value) if !value.is_null()))
        .map(|(name, _)| name.as_str())
        .collect()
}
