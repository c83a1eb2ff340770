//! Learner profile: who the game is for

use gamecraft_error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearnerProfile {
    pub name: String,
    pub subject: String,
    pub level: String,
    pub context: String,
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub misconceptions: Vec<String>,
    pub preferred_modalities: Vec<String>,
    pub recent_performance: Vec<PerformanceRecord>,
    pub current_topic: String,
    pub completed_topics: Vec<String>,
    pub upcoming_topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub exercise: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl LearnerProfile {
    pub fn new(name: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// A run needs at least a name and a subject
    pub fn check(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.subject.trim().is_empty() {
            missing.push("subject");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "learner profile is missing: {}",
                missing.join(", ")
            ))
            .with_operation("profile::check"))
        }
    }

    /// Topic to design for: an explicit hint wins over the profile's current topic
    pub fn topic<'a>(&'a self, hint: Option<&'a str>) -> Option<&'a str> {
        hint.map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| Some(self.current_topic.trim()).filter(|t| !t.is_empty()))
    }

    /// Render as a markdown section for prompts. Empty fields are skipped.
    pub fn to_prompt(&self) -> String {
        let mut out = format!("## Learner\n- Name: {}\n- Subject: {}\n", self.name, self.subject);
        let scalar = |out: &mut String, label: &str, value: &str| {
            if !value.trim().is_empty() {
                out.push_str(&format!("- {}: {}\n", label, value.trim()));
            }
        };
        let list = |out: &mut String, label: &str, values: &[String]| {
            if !values.is_empty() {
                out.push_str(&format!("- {}: {}\n", label, values.join("; ")));
            }
        };

        scalar(&mut out, "Level", &self.level);
        scalar(&mut out, "Context", &self.context);
        scalar(&mut out, "Current topic", &self.current_topic);
        list(&mut out, "Strengths", &self.strengths);
        list(&mut out, "Gaps", &self.gaps);
        list(&mut out, "Misconceptions", &self.misconceptions);
        list(&mut out, "Preferred modalities", &self.preferred_modalities);
        list(&mut out, "Completed topics", &self.completed_topics);
        list(&mut out, "Upcoming topics", &self.upcoming_topics);

        if !self.recent_performance.is_empty() {
            out.push_str("- Recent performance:\n");
            for record in &self.recent_performance {
                out.push_str(&format!("  - {}: {:.0}%", record.exercise, record.score * 100.0));
                if let Some(notes) = &record.notes {
                    out.push_str(&format!(" ({})", notes));
                }
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamecraft_error::ErrorKind;

    #[test]
    fn test_camel_case_json() {
        let profile: LearnerProfile = serde_json::from_str(
            r#"{
                "name": "Ada",
                "subject": "physics",
                "preferredModalities": ["visual"],
                "recentPerformance": [{ "exercise": "levers quiz", "score": 0.4, "notes": "mixed up effort and load" }],
                "currentTopic": "simple machines"
            }"#,
        )
        .unwrap();
        assert_eq!(profile.preferred_modalities, vec!["visual"]);
        assert_eq!(profile.recent_performance[0].score, 0.4);
        assert!(profile.gaps.is_empty());

        let prompt = profile.to_prompt();
        assert!(prompt.contains("levers quiz: 40% (mixed up effort and load)"));
        assert!(!prompt.contains("Gaps"));
    }

    #[test]
    fn test_presence_check() {
        assert!(LearnerProfile::new("Ada", "physics").check().is_ok());
        let err = LearnerProfile::new(" ", "").check().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.message().contains("name, subject"));
    }

    #[test]
    fn test_topic_preference() {
        let mut profile = LearnerProfile::new("Ada", "physics");
        assert_eq!(profile.topic(None), None);
        profile.current_topic = "levers".into();
        assert_eq!(profile.topic(None), Some("levers"));
        assert_eq!(profile.topic(Some("pulleys")), Some("pulleys"));
        assert_eq!(profile.topic(Some("  ")), Some("levers"));
    }
}
