use crate::models::{ActionItem, Conversation, Message, Role};

fn push_items(output: &mut String, items: &[ActionItem], parent: Option<&str>, depth: usize) {
    for item in items.iter().filter(|i| i.parent_id.as_deref() == parent) {
        let mark = if item.completed { "x" } else { " " };
        output.push_str(&format!(
            "{}- [{}] {}\n",
            "  ".repeat(depth),
            mark,
            item.content
        ));
        push_items(output, items, Some(&item.id), depth + 1);
    }
}

/// Markdown transcript; `items` are rendered as a nested checklist.
pub fn export_to_markdown(
    conversation: &Conversation,
    messages: &[Message],
    items: &[ActionItem],
) -> String {
    let mut output = format!("# {}\n\n", conversation.title);
    output.push_str(&format!(
        "> Date: {}\n\n",
        conversation.created_at.format("%Y-%m-%d %H:%M")
    ));

    if let Some(prompt) = &conversation.system_prompt {
        output.push_str(&format!("> System Prompt: {}\n\n", prompt));
    }

    output.push_str("---\n\n");

    for msg in messages {
        let role_label = match msg.role {
            Role::User => "You",
            Role::Assistant => "Coach",
            Role::System => "System",
        };
        output.push_str(&format!("### {}\n\n{}\n\n", role_label, msg.content));
    }

    if !items.is_empty() {
        output.push_str("---\n\n## Action Items\n\n");
        let ids: std::collections::HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
        let mut sorted = items.to_vec();
        // Items whose parent lives elsewhere are shown at the top level.
        for item in &mut sorted {
            if item.parent_id.as_deref().is_some_and(|p| !ids.contains(p)) {
                item.parent_id = None;
            }
        }
        sorted.sort_by_key(|i| (i.ordinal, i.created_at));
        push_items(&mut output, &sorted, None, 0);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(
        id: &str,
        content: &str,
        parent: Option<&str>,
        ordinal: i64,
        completed: bool,
    ) -> ActionItem {
        let now = Utc::now();
        ActionItem {
            id: id.to_string(),
            content: content.to_string(),
            completed,
            ordinal,
            parent_id: parent.map(str::to_string),
            message_id: None,
            conversation_id: Some("c1".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_export_transcript_and_checklist() {
        let conversation = Conversation::new("Bakery launch", None);
        let messages = vec![
            Message::new(&conversation.id, Role::User, "Where do I start?"),
            Message::new(&conversation.id, Role::Assistant, "1. Buy supplies"),
        ];
        let items = vec![
            item("b", "Hire a baker", None, 1, false),
            item("a", "Buy supplies", None, 0, true),
            item("a1", "Flour", Some("a"), 0, false),
        ];

        let md = export_to_markdown(&conversation, &messages, &items);
        assert!(md.starts_with("# Bakery launch\n\n"));
        assert!(md.contains("### You\n\nWhere do I start?"));
        assert!(md.contains("### Coach\n\n1. Buy supplies"));
        assert!(md.ends_with(
            "## Action Items\n\n- [x] Buy supplies\n  - [ ] Flour\n- [ ] Hire a baker\n"
        ));
    }

    #[test]
    fn test_export_without_items_has_no_checklist() {
        let conversation = Conversation::new("Empty", Some("Be brief".to_string()));
        let md = export_to_markdown(&conversation, &[], &[]);
        assert!(md.contains("> System Prompt: Be brief"));
        assert!(!md.contains("Action Items"));
    }
}
