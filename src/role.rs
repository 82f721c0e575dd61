//! Interview target roles and the resume keyword classifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Keywords that mark a resume as software engineering, checked first.
pub const SOFTWARE_KEYWORDS: &[&str] = &[
    "python",
    "javascript",
    "developer",
    "engineer",
    "react",
    "backend",
];

/// Keywords that mark a resume as sales, checked second.
pub const SALES_KEYWORDS: &[&str] = &["sales", "crm", "leads", "negotiation", "quota", "marketing"];

/// Role the interview is tailored to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobRole {
    /// Software engineering interviews.
    SoftwareEngineer,
    /// Sales interviews.
    SalesExecutive,
    /// Fallback when nothing more specific is known.
    #[default]
    General,
    /// Caller-supplied role outside the built-in set.
    Custom(String),
}

impl JobRole {
    /// Display label, also used inside prompts.
    pub fn as_str(&self) -> &str {
        match self {
            Self::SoftwareEngineer => "Software Engineer",
            Self::SalesExecutive => "Sales Executive",
            Self::General => "General",
            Self::Custom(label) => label,
        }
    }

    /// Parses a caller-supplied label; known labels match case-insensitively
    /// and a blank label means [`JobRole::General`].
    pub fn from_label(label: &str) -> Self {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return Self::General;
        }
        [Self::SoftwareEngineer, Self::SalesExecutive, Self::General]
            .into_iter()
            .find(|known| known.as_str().eq_ignore_ascii_case(trimmed))
            .unwrap_or_else(|| Self::Custom(trimmed.to_string()))
    }

    /// Classifies free text by keyword containment; first matching category wins.
    pub fn classify(text: &str) -> Self {
        let lowered = text.to_lowercase();
        if SOFTWARE_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            Self::SoftwareEngineer
        } else if SALES_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            Self::SalesExecutive
        } else {
            Self::General
        }
    }
}

impl fmt::Display for JobRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for JobRole {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<JobRole> for String {
    fn from(role: JobRole) -> Self {
        role.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engineering_terms_win() {
        let text = "Built React dashboards and a Go backend; also owned a sales quota";
        assert_eq!(JobRole::classify(text), JobRole::SoftwareEngineer);
    }

    #[test]
    fn sales_terms_without_engineering() {
        let text = "Exceeded QUOTA by 140% and rolled out a new CRM for the team";
        assert_eq!(JobRole::classify(text), JobRole::SalesExecutive);
    }

    #[test]
    fn neither_keyword_set_is_general() {
        assert_eq!(JobRole::classify("Registered nurse, ICU"), JobRole::General);
    }

    #[test]
    fn labels_round_trip() {
        assert_eq!(JobRole::from_label("software engineer"), JobRole::SoftwareEngineer);
        assert_eq!(JobRole::from_label("  "), JobRole::General);
        assert_eq!(
            JobRole::from_label("Data Scientist"),
            JobRole::Custom("Data Scientist".into())
        );
        let json = serde_json::to_string(&JobRole::SalesExecutive).unwrap();
        assert_eq!(json, "\"Sales Executive\"");
        let back: JobRole = serde_json::from_str(&json).unwrap();
        assert_eq!(back, JobRole::SalesExecutive);
    }
}
