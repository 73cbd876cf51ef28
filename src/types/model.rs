use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reasoning budget attached to requests made with [`ModelVariant::Thinking`].
pub const THINKING_BUDGET: u32 = 1024;

/// A user-facing model choice.
///
/// Three variants map onto two backing models: `Flash` and `Thinking` both run on the fast
/// model, and `Thinking` differs only by carrying a fixed reasoning budget.  The mapping is a
/// static table; nothing is negotiated with the API.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelVariant {
    /// Fast, low-effort responses.
    #[serde(rename = "gemini-2.5-flash")]
    Flash,

    /// The most capable model; the default.
    #[default]
    #[serde(rename = "gemini-3-pro-preview")]
    Pro,

    /// The fast model with a reasoning budget.
    #[serde(rename = "gemini-2.5-flash-thinking")]
    Thinking,
}

impl ModelVariant {
    /// All variants in menu order.
    pub const ALL: [ModelVariant; 3] = [ModelVariant::Pro, ModelVariant::Flash, ModelVariant::Thinking];

    /// The identifier persisted for this variant.
    pub fn id(&self) -> &'static str {
        match self {
            ModelVariant::Flash => "gemini-2.5-flash",
            ModelVariant::Pro => "gemini-3-pro-preview",
            ModelVariant::Thinking => "gemini-2.5-flash-thinking",
        }
    }

    /// The model name sent to the API.
    pub fn api_model(&self) -> &'static str {
        match self {
            ModelVariant::Flash => "gemini-2.5-flash",
            ModelVariant::Pro => "gemini-3-pro-preview",
            ModelVariant::Thinking => "gemini-2.5-flash",
        }
    }

    /// The reasoning budget for this variant, if it has one.
    pub fn thinking_budget(&self) -> Option<u32> {
        match self {
            ModelVariant::Thinking => Some(THINKING_BUDGET),
            ModelVariant::Flash | ModelVariant::Pro => None,
        }
    }

    /// Short name accepted on the command line.
    pub fn short_name(&self) -> &'static str {
        match self {
            ModelVariant::Flash => "flash",
            ModelVariant::Pro => "pro",
            ModelVariant::Thinking => "thinking",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelVariant::Flash => "Gemini 2.5 Flash",
            ModelVariant::Pro => "Gemini 3 Pro",
            ModelVariant::Thinking => "Flash Thinking",
        }
    }

    /// One-line description for model menus.
    pub fn description(&self) -> &'static str {
        match self {
            ModelVariant::Flash => "Fast & efficient",
            ModelVariant::Pro => "Complex coding & reasoning",
            ModelVariant::Thinking => "Deep reasoning with a thinking budget",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    /// Parses a persisted identifier or a short name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ModelVariant::ALL
            .into_iter()
            .find(|variant| {
                s.eq_ignore_ascii_case(variant.id()) || s.eq_ignore_ascii_case(variant.short_name())
            })
            .ok_or_else(|| format!("unknown model: {s} (expected flash, pro, or thinking)"))
    }
}
