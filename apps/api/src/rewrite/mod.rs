// Challenge-Action-Result rewrite of rough win notes.

pub mod handlers;
pub mod prompts;

use serde::Serialize;
use tracing::warn;

pub const UNPARSED_WARNING: &str =
    "Could not parse the model response; the full text is in `challenge`";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CarDraft {
    pub challenge: String,
    pub action: String,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Splits model output on the `Challenge:` / `Action:` / `Result:` markers
/// (case-insensitive). Each section is found independently; a section whose
/// terminating marker is missing comes back empty.
pub fn parse_car(raw: &str) -> CarDraft {
    // ASCII lowering keeps byte offsets aligned with `raw`.
    let lowered = raw.to_ascii_lowercase();

    let challenge = section(raw, &lowered, "challenge:", Some("action:"));
    let action = section(raw, &lowered, "action:", Some("result:"));
    let result = section(raw, &lowered, "result:", None);

    if challenge.is_empty() && action.is_empty() && result.is_empty() {
        warn!("Failed to parse CAR format from model response");
        return CarDraft {
            challenge: raw.trim().to_string(),
            warning: Some(UNPARSED_WARNING.to_string()),
            ..Default::default()
        };
    }

    CarDraft {
        challenge,
        action,
        result,
        warning: None,
    }
}

fn section(raw: &str, lowered: &str, marker: &str, until: Option<&str>) -> String {
    let Some(at) = lowered.find(marker) else {
        return String::new();
    };
    let start = at + marker.len();
    let end = match until {
        Some(next) => match lowered[start..].find(next) {
            Some(offset) => start + offset,
            None => return String::new(),
        },
        None => raw.len(),
    };
    raw[start..end].trim().to_string()
}
