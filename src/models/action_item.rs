use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single task, optionally nested under another item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub id: String,
    pub content: String,
    pub completed: bool,
    /// Display order among siblings.
    pub ordinal: i64,
    pub parent_id: Option<String>,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActionItem {
    pub content: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub ordinal: i64,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Partial update. `parent_id: null` detaches the item to the top level.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionItemPatch {
    pub content: Option<String>,
    pub completed: Option<bool>,
    pub ordinal: Option<i64>,
    #[serde(default, deserialize_with = "super::double_option")]
    pub parent_id: Option<Option<String>>,
}

impl ActionItemPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.completed.is_none()
            && self.ordinal.is_none()
            && self.parent_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_distinguishes_null_parent_from_missing() {
        let detach: ActionItemPatch = serde_json::from_str(r#"{"parentId": null}"#).unwrap();
        assert_eq!(detach.parent_id, Some(None));

        let untouched: ActionItemPatch = serde_json::from_str(r#"{"completed": true}"#).unwrap();
        assert_eq!(untouched.parent_id, None);
        assert_eq!(untouched.completed, Some(true));
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let result = serde_json::from_str::<ActionItemPatch>(r#"{"colour": "red"}"#);
        assert!(result.is_err());
    }
}
