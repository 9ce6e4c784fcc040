use sha2::{Digest, Sha256};

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Deterministic fingerprint over a case's persisted content.
///
/// Used to detect a case id being re-loaded with different content; the
/// first-persisted content wins and the mismatch is logged.
pub fn case_fingerprint(
    pack_id: &str,
    case_id: &str,
    prompt: &str,
    expected: Option<&str>,
    metadata: &serde_json::Value,
) -> String {
    let raw = format!(
        "pack={}\ncase={}\nprompt={}\nexpected={}\nmetadata={}",
        pack_id,
        case_id,
        prompt,
        expected.unwrap_or(""),
        metadata
    );
    sha256_hex(&raw)
}

/// Current git revision of the working tree, if one is resolvable.
pub fn git_revision() -> Option<String> {
    let out = std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let sha = String::from_utf8(out.stdout).ok()?;
    let sha = sha.trim();
    if sha.is_empty() {
        None
    } else {
        Some(sha.to_string())
    }
}
