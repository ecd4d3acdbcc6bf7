//! Transcript parsing for session import.

use serde::Deserialize;
use tiller_domain::{EngineError, EngineResult, LocationId, ProjectId, Role};

/// Parameters for importing a transcript as a new thread.
#[derive(Debug, Clone)]
pub struct ImportParams {
    pub project_id: ProjectId,
    pub location_id: LocationId,
    pub transcript_path: String,
    pub name: String,
    pub provider: String,
    pub model: String,
}

/// One parsed transcript entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

#[derive(Deserialize)]
struct RawEntry {
    role: String,
    content: String,
}

/// Parse a JSONL transcript.
///
/// One JSON object per line with `role` and `content` fields. Blank
/// lines and `#`-prefixed comment lines are skipped. Any other
/// malformed line fails the whole import.
pub fn parse_transcript(raw: &str) -> EngineResult<Vec<TranscriptEntry>> {
    let mut entries = Vec::new();

    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entry: RawEntry = serde_json::from_str(trimmed)
            .map_err(|e| EngineError::Import(format!("line {}: {e}", idx + 1)))?;
        let role = parse_role(&entry.role)
            .ok_or_else(|| EngineError::Import(format!("line {}: unknown role '{}'", idx + 1, entry.role)))?;

        entries.push(TranscriptEntry {
            role,
            content: entry.content,
        });
    }

    if entries.is_empty() {
        return Err(EngineError::Import("transcript contains no entries".to_string()));
    }

    Ok(entries)
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "tool" => Some(Role::Tool),
        "system" => Some(Role::System),
        _ => None,
    }
}
