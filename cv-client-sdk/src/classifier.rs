//! Query classification and response-format mapping
//!
//! Coarse keyword matching used only to enrich the request payload.

use serde::{Deserialize, Serialize};

/// Query categories understood by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Skills,
    Experience,
    Education,
    Projects,
    Summary,
    Contact,
    Technical,
    General,
}

impl QueryType {
    /// Wire name of this query type
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Skills => "skills",
            QueryType::Experience => "experience",
            QueryType::Education => "education",
            QueryType::Projects => "projects",
            QueryType::Summary => "summary",
            QueryType::Contact => "contact",
            QueryType::Technical => "technical",
            QueryType::General => "general",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order; the first set with a hit wins.
const KEYWORD_SETS: &[(QueryType, &[&str])] = &[
    (QueryType::Technical, &["skill", "technology", "programming", "python", "sql"]),
    (QueryType::Experience, &["experience", "work", "job", "company"]),
    (QueryType::Education, &["education", "degree", "university"]),
    (QueryType::Projects, &["project", "built", "created", "developed"]),
    (QueryType::Summary, &["summary", "overview", "about"]),
    (QueryType::Contact, &["contact", "email", "phone"]),
];

/// Map free text to a coarse query category
pub fn classify_query(text: &str) -> QueryType {
    let lowered = text.to_lowercase();
    KEYWORD_SETS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
        .map(|(query_type, _)| *query_type)
        .unwrap_or(QueryType::General)
}

/// Answer styles the backend can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Detailed,
    Summary,
    BulletPoints,
    Technical,
    Conversational,
}

impl ResponseFormat {
    /// Map a UI label ("Bullet points", "Summary", ...) to a format.
    /// Unknown labels fall back to `Detailed`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "summary" => ResponseFormat::Summary,
            "bullet points" | "bullet_points" => ResponseFormat::BulletPoints,
            "technical" => ResponseFormat::Technical,
            "conversational" => ResponseFormat::Conversational,
            _ => ResponseFormat::Detailed,
        }
    }

    /// Wire name of this format
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Detailed => "detailed",
            ResponseFormat::Summary => "summary",
            ResponseFormat::BulletPoints => "bullet_points",
            ResponseFormat::Technical => "technical",
            ResponseFormat::Conversational => "conversational",
        }
    }
}

/// Confidence buckets used when presenting a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceBand {
    /// Bucket a 0..1 confidence score
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            ConfidenceBand::VeryHigh
        } else if score >= 0.8 {
            ConfidenceBand::High
        } else if score >= 0.65 {
            ConfidenceBand::Medium
        } else if score >= 0.5 {
            ConfidenceBand::Low
        } else {
            ConfidenceBand::VeryLow
        }
    }
}
