//! Findings and their extraction from free-form reviewer output.
//!
//! Extraction never fails: output with no usable JSON array contributes zero
//! findings.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::roles::AgentRole;

/// Finding severity, P0 most severe
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(alias = "p0")]
    P0,
    #[serde(alias = "p1")]
    P1,
    #[default]
    #[serde(alias = "p2")]
    P2,
    #[serde(alias = "p3")]
    P3,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
        };
        f.write_str(s)
    }
}

/// A structured, severity-tagged claim from one reviewer role
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// `<ROLE>-<NNN>`, assigned at extraction
    pub id: String,
    pub agent_role: AgentRole,
    pub category: String,
    pub severity: Severity,
    /// 0.0 to 1.0
    pub confidence: f32,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub claim: String,
    pub evidence: String,
    pub impact: String,
    pub fix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tradeoff: Option<String>,
}

/// Shape accepted from the model. Any `id` or `agentRole` it sends is ignored.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFinding {
    #[serde(default, deserialize_with = "lenient_string")]
    category: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default = "default_confidence", deserialize_with = "lenient_confidence")]
    confidence: f32,
    #[serde(default, rename = "where", deserialize_with = "lenient_option")]
    location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    claim: String,
    #[serde(default, deserialize_with = "lenient_string")]
    evidence: String,
    #[serde(default, deserialize_with = "lenient_string")]
    impact: String,
    #[serde(default, deserialize_with = "lenient_string")]
    fix: String,
    #[serde(default, alias = "patch_snippet", deserialize_with = "lenient_option")]
    patch_snippet: Option<String>,
    #[serde(default, deserialize_with = "lenient_option")]
    tradeoff: Option<String>,
}

const fn default_confidence() -> f32 {
    0.5
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(value_to_text)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(value_to_text(Value::deserialize(de)?).unwrap_or_default())
}

fn lenient_option<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(value_to_text(Value::deserialize(de)?).filter(|s| !s.is_empty()))
}

fn lenient_confidence<'de, D: Deserializer<'de>>(de: D) -> Result<f32, D::Error> {
    let parsed = match Value::deserialize(de)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    #[allow(clippy::cast_possible_truncation)]
    let confidence = parsed.map_or(default_confidence(), |c| {
        // Percentages are accepted
        let c = if c > 1.0 { c / 100.0 } else { c };
        c.clamp(0.0, 1.0) as f32
    });
    Ok(confidence)
}

/// Scan from `start` (a `[`) to its matching `]`, honouring JSON strings
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// First balanced, well-formed JSON array of objects in `text`
pub fn find_json_array(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut from = 0;

    while let Some(rel) = text[from..].find('[') {
        let start = from + rel;
        if let Some(end) = balanced_end(bytes, start) {
            let candidate = &text[start..=end];
            if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(candidate) {
                if items.iter().all(Value::is_object) {
                    return Some(candidate);
                }
            }
        }
        from = start + 1;
    }
    None
}

/// Extract findings from one role's raw output, stamping role and ids
pub fn extract_findings(role: AgentRole, raw: &str) -> Vec<Finding> {
    let Some(array) = find_json_array(raw) else {
        tracing::debug!(role = %role, "No findings array in output");
        return Vec::new();
    };

    let parsed: Vec<RawFinding> = match serde_json::from_str(array) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(role = %role, error = %e, "Findings array did not decode");
            return Vec::new();
        }
    };

    let tag = role.tag();
    parsed
        .into_iter()
        .enumerate()
        .map(|(i, raw)| Finding {
            id: format!("{tag}-{:03}", i + 1),
            agent_role: role,
            category: raw.category,
            severity: raw.severity,
            confidence: raw.confidence,
            location: raw.location,
            claim: raw.claim,
            evidence: raw.evidence,
            impact: raw.impact,
            fix: raw.fix,
            patch_snippet: raw.patch_snippet,
            tradeoff: raw.tradeoff,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_finding_with_noise() {
        let raw = r#"noise [ {"claim":"X","severity":"P1"} ] trailing"#;
        let findings = extract_findings(AgentRole::Sentinel, raw);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].id, "SENTINEL-001");
        assert_eq!(findings[0].agent_role, AgentRole::Sentinel);
        assert_eq!(findings[0].claim, "X");
        assert_eq!(findings[0].severity, Severity::P1);
    }

    #[test]
    fn test_model_supplied_id_and_role_are_overridden() {
        let raw = r#"[{"id":"mine","agentRole":"verifier","claim":"a"},{"claim":"b","severity":"P0"}]"#;
        let findings = extract_findings(AgentRole::Architect, raw);
        let ids: Vec<_> = findings.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["ARCHITECT-001", "ARCHITECT-002"]);
        assert!(findings.iter().all(|f| f.agent_role == AgentRole::Architect));
    }

    #[test]
    fn test_no_array_yields_nothing() {
        assert!(extract_findings(AgentRole::Optimizer, "Looks fine to me.").is_empty());
        assert!(extract_findings(AgentRole::Optimizer, "[ {broken json ]").is_empty());
        assert!(extract_findings(AgentRole::Optimizer, r#"[{"severity": "P9"}]"#).is_empty());
    }

    #[test]
    fn test_skips_prose_brackets_and_nested_arrays() {
        let raw = r#"See [1] and [the docs](x). Findings:
[{"claim": "uses [] in a string", "evidence": ["line 3", "line 9"], "confidence": "80%"}]
Extra: [{"claim": "second array"}]"#;
        let findings = extract_findings(AgentRole::Maintainer, raw);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].claim, "uses [] in a string");
        assert_eq!(findings[0].evidence, "line 3\nline 9");
        assert!((findings[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let raw = r#"```json
[{"claim":"A","severity":"P2","category":"perf"},{"claim":"B","where":"lib.rs:10"}]
```"#;
        let first = extract_findings(AgentRole::Optimizer, raw);
        let second = extract_findings(AgentRole::Optimizer, raw);
        assert_eq!(first, second);
        assert_eq!(first[1].location.as_deref(), Some("lib.rs:10"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::P0 < Severity::P3);
        assert_eq!(Severity::default(), Severity::P2);
    }
}
