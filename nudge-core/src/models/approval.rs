//! Approval request data structures

use crate::models::MessageHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Callback token of the implicit free-text entry.
pub const OTHER_OPTION_TOKEN: &str = "other";

/// Label reported as `selected` when the operator typed a custom answer.
pub const OTHER_OPTION_LABEL: &str = "Other";

/// One selectable answer supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalOption {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ApprovalOption {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Entry of an interactive prompt as rendered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptChoice {
    pub label: String,
    pub description: Option<String>,
    /// Opaque value echoed back by the provider when this entry is chosen.
    pub token: String,
}

/// Interactive message payload handed to the chat gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractivePrompt {
    pub header: Option<String>,
    pub question: String,
    pub choices: Vec<PromptChoice>,
}

impl InteractivePrompt {
    /// Build a prompt from caller options. The free-text entry is always appended last.
    pub fn from_options(
        header: Option<String>,
        question: impl Into<String>,
        options: &[ApprovalOption],
    ) -> Self {
        let mut choices: Vec<PromptChoice> = options
            .iter()
            .enumerate()
            .map(|(index, option)| PromptChoice {
                label: option.label.clone(),
                description: option.description.clone(),
                token: index.to_string(),
            })
            .collect();
        choices.push(PromptChoice {
            label: OTHER_OPTION_LABEL.to_string(),
            description: Some("Type a custom answer".to_string()),
            token: OTHER_OPTION_TOKEN.to_string(),
        });
        Self {
            header,
            question: question.into(),
            choices,
        }
    }

    /// Plain text body: header, question, then one line per described choice.
    pub fn render_text(&self) -> String {
        let mut lines = Vec::new();
        if let Some(header) = self.header.as_deref().filter(|h| !h.trim().is_empty()) {
            lines.push(header.to_string());
            lines.push(String::new());
        }
        lines.push(self.question.clone());
        let described: Vec<String> = self
            .choices
            .iter()
            .filter_map(|choice| {
                choice
                    .description
                    .as_ref()
                    .map(|d| format!("• {}: {}", choice.label, d))
            })
            .collect();
        if !described.is_empty() {
            lines.push(String::new());
            lines.extend(described);
        }
        lines.join("\n")
    }
}

/// What a callback token refers to on a given request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceSelection {
    Option(String),
    FreeText,
}

/// A pending approval request tracked by the coordinator.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    /// `approval_<message handle>`
    pub id: String,
    pub source_message: MessageHandle,
    pub header: Option<String>,
    pub question: String,
    pub options: Vec<ApprovalOption>,
    /// Monotonic creation time, used by the retention sweep.
    pub created_at: Instant,
    /// Wall-clock creation time, for display.
    pub requested_at: DateTime<Utc>,
    /// True while a `wait()` call owns this request.
    pub awaited: bool,
    /// Distinguishes two requests that were ever stored under the same id.
    pub(crate) instance: Uuid,
}

impl ApprovalRequest {
    pub fn new(
        source_message: MessageHandle,
        header: Option<String>,
        question: impl Into<String>,
        options: Vec<ApprovalOption>,
    ) -> Self {
        Self {
            id: Self::id_for(&source_message),
            source_message,
            header,
            question: question.into(),
            options,
            created_at: Instant::now(),
            requested_at: Utc::now(),
            awaited: false,
            instance: Uuid::new_v4(),
        }
    }

    /// Request id derived from the gateway's message handle.
    pub fn id_for(handle: &MessageHandle) -> String {
        format!("approval_{}", handle)
    }

    /// Resolve callback data from the provider into a selection on this request.
    pub fn selection_for(&self, token: &str) -> Option<ChoiceSelection> {
        if token == OTHER_OPTION_TOKEN {
            return Some(ChoiceSelection::FreeText);
        }
        let index: usize = token.parse().ok()?;
        self.options
            .get(index)
            .map(|option| ChoiceSelection::Option(option.label.clone()))
    }
}

/// Result of `create()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalTicket {
    pub id: String,
    pub success: bool,
}

/// Result of `wait()`. A timeout is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Answered {
        selected: String,
        custom_text: Option<String>,
    },
    TimedOut,
}

impl ApprovalOutcome {
    pub fn selected(&self) -> Option<&str> {
        match self {
            ApprovalOutcome::Answered { selected, .. } => Some(selected.as_str()),
            ApprovalOutcome::TimedOut => None,
        }
    }

    pub fn custom_text(&self) -> Option<&str> {
        match self {
            ApprovalOutcome::Answered { custom_text, .. } => custom_text.as_deref(),
            ApprovalOutcome::TimedOut => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, ApprovalOutcome::TimedOut)
    }

    /// `{"selected": ..., "custom_text": ..., "timed_out": ...}`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "selected": self.selected(),
            "custom_text": self.custom_text(),
            "timed_out": self.is_timed_out(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yes_no() -> Vec<ApprovalOption> {
        vec![
            ApprovalOption::new("Yes").with_description("Proceed with the deploy"),
            ApprovalOption::new("No"),
        ]
    }

    #[test]
    fn test_prompt_appends_free_text_choice() {
        let prompt = InteractivePrompt::from_options(None, "Proceed?", &yes_no());
        let tokens: Vec<&str> = prompt.choices.iter().map(|c| c.token.as_str()).collect();
        assert_eq!(tokens, vec!["0", "1", OTHER_OPTION_TOKEN]);
        assert_eq!(prompt.choices[2].label, OTHER_OPTION_LABEL);
    }

    #[test]
    fn test_render_text_includes_header_and_descriptions() {
        let prompt =
            InteractivePrompt::from_options(Some("Deploy".to_string()), "Proceed?", &yes_no());
        let text = prompt.render_text();
        assert!(text.starts_with("Deploy\n\nProceed?"));
        assert!(text.contains("• Yes: Proceed with the deploy"));
        assert!(!text.contains("• No"));
    }

    #[tokio::test]
    async fn test_request_id_and_selection() {
        let request = ApprovalRequest::new(MessageHandle::from(42), None, "Proceed?", yes_no());
        assert_eq!(request.id, "approval_42");
        assert_eq!(
            request.selection_for("1"),
            Some(ChoiceSelection::Option("No".to_string()))
        );
        assert_eq!(
            request.selection_for(OTHER_OPTION_TOKEN),
            Some(ChoiceSelection::FreeText)
        );
        assert_eq!(request.selection_for("7"), None);
        assert_eq!(request.selection_for("garbage"), None);
    }

    #[test]
    fn test_outcome_json() {
        let timed_out = ApprovalOutcome::TimedOut.to_json();
        assert_eq!(timed_out["selected"], serde_json::Value::Null);
        assert_eq!(timed_out["timed_out"], true);

        let answered = ApprovalOutcome::Answered {
            selected: "Other".to_string(),
            custom_text: Some("tomorrow".to_string()),
        }
        .to_json();
        assert_eq!(answered["selected"], "Other");
        assert_eq!(answered["custom_text"], "tomorrow");
        assert_eq!(answered["timed_out"], false);
    }
}
