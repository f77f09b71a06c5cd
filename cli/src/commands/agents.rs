use std::path::Path;

use axon_core::config::LoadedAgent;

/// List the agent configurations found directly under `path`.
pub fn run(path: &Path) -> i32 {
    if !path.is_dir() {
        eprintln!("'{}' is not a directory", path.display());
        return 1;
    }

    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("failed to read '{}': {err}", path.display());
            return 1;
        }
    };

    let mut items: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .collect();
    items.sort();

    let mut anything = false;
    println!("{}", path.display());
    for item in items {
        if let Ok(agent) = LoadedAgent::load(&item) {
            let description = if agent.config.description.is_empty() {
                String::new()
            } else {
                format!(" — {}", agent.config.description)
            };
            println!("   {} v{}{description}", agent.name, agent.config.version);
            anything = true;
        }
    }

    if !anything {
        println!("no agents found in {}", path.display());
    }
    0
}
