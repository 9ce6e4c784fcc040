//! Pack loading: a pack is a directory with `pack.yaml` (identity and
//! system prompt) and `cases.yaml` (the case list). Validation happens
//! here, before any model call.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct PackManifest {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    system_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCase {
    id: String,
    #[serde(default)]
    scheme: Option<String>,
    #[serde(default)]
    task_family: Option<String>,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    carrier_text: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    expected: Option<String>,
    #[serde(default)]
    expected_watermark: Option<String>,
    #[serde(default)]
    expected_message: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct CaseConfig {
    pub id: String,
    pub prompt: String,
    pub expected: Option<String>,
    pub scheme: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct PackConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub cases: Vec<CaseConfig>,
}

pub fn load_pack(pack_name: &str, packs_dir: &Path) -> anyhow::Result<PackConfig> {
    let pack_path = packs_dir.join(pack_name);

    let manifest_path = pack_path.join("pack.yaml");
    let manifest: PackManifest = serde_yaml::from_str(
        &std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("pack config not found: {}", manifest_path.display()))?,
    )
    .with_context(|| format!("invalid pack config: {}", manifest_path.display()))?;

    let cases_path = pack_path.join("cases.yaml");
    let raw_cases: Vec<RawCase> = serde_yaml::from_str(
        &std::fs::read_to_string(&cases_path)
            .with_context(|| format!("cases file not found: {}", cases_path.display()))?,
    )
    .with_context(|| format!("invalid cases file: {}", cases_path.display()))?;

    let mut cases = Vec::with_capacity(raw_cases.len());
    let mut seen = HashSet::new();
    for raw in raw_cases {
        if raw.id.trim().is_empty() {
            anyhow::bail!("pack '{}': case with empty id", manifest.id);
        }
        if !seen.insert(raw.id.clone()) {
            anyhow::bail!("pack '{}': duplicate case id '{}'", manifest.id, raw.id);
        }
        cases.push(build_case(raw)?);
    }
    if cases.is_empty() {
        anyhow::bail!("pack '{}': no cases defined", manifest.id);
    }

    Ok(PackConfig {
        name: manifest.name.unwrap_or_else(|| manifest.id.clone()),
        id: manifest.id,
        description: manifest.description,
        system_prompt: manifest.system_prompt,
        cases,
    })
}

fn build_case(raw: RawCase) -> anyhow::Result<CaseConfig> {
    let prompt = match (&raw.instruction, &raw.carrier_text) {
        (Some(instruction), Some(carrier)) if !instruction.is_empty() && !carrier.is_empty() => {
            format!("{}\n\n{}", instruction, carrier)
        }
        _ => raw.prompt.clone().unwrap_or_default(),
    };
    if prompt.is_empty() {
        anyhow::bail!(
            "case '{}': needs either prompt or instruction + carrier_text",
            raw.id
        );
    }

    let expected = raw
        .expected
        .or(raw.expected_watermark)
        .or(raw.expected_message);

    // Fold loader-level fields into metadata so graders see one mapping.
    let mut metadata = match raw.metadata {
        Some(serde_json::Value::Object(m)) => m,
        Some(other) => anyhow::bail!("case '{}': metadata must be a mapping, got {}", raw.id, other),
        None => serde_json::Map::new(),
    };
    if let Some(tf) = raw.task_family {
        metadata.insert("task_family".into(), serde_json::Value::String(tf));
    }
    if let Some(s) = &raw.scheme {
        metadata.insert("scheme".into(), serde_json::Value::String(s.clone()));
    }
    if let Some(c) = &raw.carrier_text {
        metadata.insert("carrier_text".into(), serde_json::Value::String(c.clone()));
    }

    Ok(CaseConfig {
        id: raw.id,
        prompt,
        expected,
        scheme: raw.scheme,
        metadata: serde_json::Value::Object(metadata),
    })
}

pub fn list_packs(packs_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(packs_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir() && e.path().join("pack.yaml").exists())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}
