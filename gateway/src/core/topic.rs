//! Conversation topics and the non-identifying learner context.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversation topic selected before a session starts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub title: String,
}

impl Topic {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }

    /// Free-form topic typed by the learner.
    ///
    /// The id is derived from the title so the same title always maps to the
    /// same topic.
    pub fn custom(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: format!("custom:{}", title.to_lowercase()),
            title,
        }
    }

    pub fn is_custom(&self) -> bool {
        self.id.starts_with("custom:")
    }

    /// Ordered preset topics offered on the home screen
    pub fn presets() -> &'static [Topic] {
        &PRESETS
    }

    pub fn preset(id: &str) -> Option<&'static Topic> {
        PRESETS.iter().find(|topic| topic.id == id)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

static PRESETS: Lazy<Vec<Topic>> = Lazy::new(|| {
    [
        ("classroom-talk", "Classroom talk"),
        ("friends", "Friends"),
        ("making-plans", "Making plans"),
        ("sorry-and-solutions", "Sorry & solutions"),
        ("school-day", "My school day"),
        ("food-ordering", "Food & ordering"),
        ("shopping-clothes", "Shopping (clothes)"),
        ("my-town", "My town"),
        ("public-transport", "Getting around"),
        ("directions", "Directions"),
        ("animals-nature", "Animals & nature"),
        ("trips-holidays", "Trips & holidays"),
    ]
    .into_iter()
    .map(|(id, title)| Topic::new(id, title))
    .collect()
});

/// Coarse age band chosen during onboarding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeBand {
    #[serde(rename = "4–6")]
    Preschool,
    #[serde(rename = "7–9")]
    EarlyElementary,
    #[serde(rename = "10–12")]
    LateElementary,
}

impl AgeBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeBand::Preschool => "4–6",
            AgeBand::EarlyElementary => "7–9",
            AgeBand::LateElementary => "10–12",
        }
    }

    pub fn all() -> &'static [AgeBand] {
        &[
            AgeBand::Preschool,
            AgeBand::EarlyElementary,
            AgeBand::LateElementary,
        ]
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnglishLevel {
    Beginner,
    Intermediate,
}

impl EnglishLevel {
    pub fn display_name(&self) -> &'static str {
        match self {
            EnglishLevel::Beginner => "Beginner",
            EnglishLevel::Intermediate => "Intermediate",
        }
    }
}

impl fmt::Display for EnglishLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Non-identifying facts about the learner, embedded into the system prompt.
///
/// Only coarse, voluntarily supplied data lives here. Names, schools and exact
/// locations are never part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearnerContext {
    pub age: Option<u8>,
    pub age_band: Option<AgeBand>,
    pub english_level: Option<EnglishLevel>,
    pub school_type: Option<String>,
    pub country: Option<String>,
    pub region_subdivision: Option<String>,
}

impl LearnerContext {
    pub fn is_empty(&self) -> bool {
        self.render_snippet().is_empty()
    }

    /// Short key/value block for the system prompt, or `""` when nothing is known.
    pub fn render_snippet(&self) -> String {
        let mut lines = Vec::new();

        if let Some(age) = self.age {
            lines.push(format!("- Age: {age}"));
        }
        if let Some(band) = self.age_band {
            lines.push(format!("- Age band: {band}"));
        }
        if let Some(level) = self.english_level {
            lines.push(format!("- English level: {level}"));
        }
        if let Some(school_type) = non_blank(&self.school_type) {
            lines.push(format!("- School type: {school_type}"));
        }
        if let Some(country) = non_blank(&self.country) {
            match non_blank(&self.region_subdivision) {
                Some(region) => lines.push(format!("- Location: {country} ({region})")),
                None => lines.push(format!("- Location: {country}")),
            }
        }

        if lines.is_empty() {
            return String::new();
        }
        format!("Learner context (non-identifying):\n{}", lines.join("\n"))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
