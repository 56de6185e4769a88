use serde::{Deserialize, Serialize};

/// Well-known key of the facilitator's active session.
pub const CURRENT_SESSION_KEY: &str = "current-session";

/// Sticky-note palette.
pub const NOTE_COLORS: [&str; 7] = [
    "#FFE5B4", "#FFB6C1", "#B4E7FF", "#D4FFB4", "#FFD4E5", "#E5D4FF", "#FFFACD",
];

/// Key holding the JSON array of a session's contributions.
pub fn contributions_key(session_id: &str) -> String {
    format!("contributions-{session_id}")
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub question: String,
}

/// One participant note. Positions are percentages of the board; rotation is
/// in degrees.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub id: u64,
    pub text: String,
    pub color: String,
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_score: Option<f64>,
}
