use serde::{Deserialize, Serialize};

/// Tunable heuristics for the overlay scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScannerProfile {
    /// Stacking order at or above which an element counts as floating.
    pub min_z_index: i64,
    /// Inclusive translucency band typical of see-through assistance panels.
    pub min_opacity: f64,
    pub max_opacity: f64,
    /// Rendered size gate; smaller elements are never flagged.
    pub min_width: f64,
    pub min_height: f64,
    /// Case-insensitive substrings matched against id and class names.
    pub suspicious_tokens: Vec<String>,
    /// Matched against whole `-`/`_` separated segments of id and class
    /// names. Matching any of these overrides every other signal.
    pub whitelist_tokens: Vec<String>,
}

impl Default for ScannerProfile {
    fn default() -> Self {
        Self {
            min_z_index: 1000,
            min_opacity: 0.1,
            max_opacity: 0.9,
            min_width: 50.0,
            min_height: 50.0,
            suspicious_tokens: [
                "assist", "helper", "copilot", "cheat", "answer", "hint",
                "prompt", "chatgpt", "gpt", "interview-coder", "overlay",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            whitelist_tokens: [
                "cookie", "consent", "gdpr", "toast", "notification", "tooltip", "zoom",
                "teams", "meet", "webex", "video-call",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl ScannerProfile {
    pub fn matches_any(tokens: &[String], candidate: &str) -> bool {
        let candidate = candidate.to_ascii_lowercase();
        tokens
            .iter()
            .filter(|token| !token.is_empty())
            .any(|token| candidate.contains(&token.to_ascii_lowercase()))
    }

    /// True when some token's segments appear as consecutive whole segments
    /// of `candidate`: `toast` matches `toast-top` but not `toaster`.
    pub fn matches_segments(tokens: &[String], candidate: &str) -> bool {
        let candidate = segments(candidate);
        tokens.iter().any(|token| {
            let token = segments(token);
            !token.is_empty()
                && candidate
                    .windows(token.len())
                    .any(|window| window == token.as_slice())
        })
    }
}

fn segments(name: &str) -> Vec<String> {
    name.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|segment| !segment.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}
