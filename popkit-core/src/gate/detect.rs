//! Auto-detection of quality gates from the working directory, overridable
//! by a `quality-gates.json` configuration file.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateDefinition {
    pub name: String,
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub optional: bool,
}

/// Overrides read from `quality-gates.json`: disable a gate by name, or
/// replace its definition entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateOverrides {
    #[serde(default)]
    pub disabled: Vec<String>,
    #[serde(default)]
    pub replace: Vec<GateDefinition>,
}

fn package_json_scripts(working_dir: &Path) -> Vec<String> {
    let path = working_dir.join("package.json");
    let Ok(contents) = std::fs::read_to_string(path) else { return Vec::new() };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&contents) else { return Vec::new() };
    value
        .get("scripts")
        .and_then(|s| s.as_object())
        .map(|scripts| scripts.keys().cloned().collect())
        .unwrap_or_default()
}

/// Scan `working_dir` for the gates the project supports, then apply
/// `overrides` (disable-by-name or full replacement).
pub fn detect(working_dir: &Path, overrides: &GateOverrides) -> Vec<GateDefinition> {
    let mut gates = Vec::new();

    if working_dir.join("tsconfig.json").exists() {
        gates.push(GateDefinition {
            name: "typescript".to_string(),
            command: vec!["tsc".to_string(), "--noEmit".to_string()],
            timeout_secs: 60,
            optional: false,
        });
    }

    let scripts = package_json_scripts(working_dir);
    if scripts.iter().any(|s| s == "build") {
        gates.push(GateDefinition {
            name: "build".to_string(),
            command: vec!["npm".to_string(), "run".to_string(), "build".to_string()],
            timeout_secs: 120,
            optional: false,
        });
    }
    if scripts.iter().any(|s| s == "lint") {
        gates.push(GateDefinition {
            name: "lint".to_string(),
            command: vec!["npm".to_string(), "run".to_string(), "lint".to_string()],
            timeout_secs: 60,
            optional: false,
        });
    }
    if scripts.iter().any(|s| s == "test") {
        gates.push(GateDefinition {
            name: "test".to_string(),
            command: vec!["npm".to_string(), "run".to_string(), "test".to_string()],
            timeout_secs: 300,
            optional: true,
        });
    }

    gates.retain(|g| !overrides.disabled.contains(&g.name));
    for replacement in &overrides.replace {
        if let Some(existing) = gates.iter_mut().find(|g| g.name == replacement.name) {
            *existing = replacement.clone();
        } else {
            gates.push(replacement.clone());
        }
    }

    gates
}
