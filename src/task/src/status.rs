//! Task status: the 4-state lifecycle machine plus the legacy `new` synonym.

use serde::{Deserialize, Serialize};

/// `enqueued` (submitted, no meaningful delay), `delayed` (one-shot delay
/// pending), `scheduled` (recurring, waiting for next fire), `running`
/// (dispatch in progress). Historical records may use `new` as a synonym
/// of `enqueued` on read; `Enqueued` always *writes* back as `"enqueued"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[serde(alias = "new")]
    Enqueued,
    Scheduled,
    Delayed,
    Running,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Enqueued => "enqueued",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Delayed => "delayed",
            TaskStatus::Running => "running",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_new_decodes_as_enqueued() {
        let decoded: TaskStatus = serde_json::from_str("\"new\"").unwrap();
        assert_eq!(decoded, TaskStatus::Enqueued);
    }

    #[test]
    fn enqueued_encodes_as_enqueued_not_new() {
        let encoded = serde_json::to_string(&TaskStatus::Enqueued).unwrap();
        assert_eq!(encoded, "\"enqueued\"");
    }
}
