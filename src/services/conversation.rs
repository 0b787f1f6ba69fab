use std::collections::HashSet;

use anyhow::{Context, Result};

use crate::models::{ActionItem, BreakEvenData, Conversation, Message, Role};
use crate::providers::ResponseFormat;
use crate::services::break_even::{clean_response, format_break_even, merge_from_response};
use crate::services::chat::ChatGateway;
use crate::services::database::{Database, ItemFilter};
use crate::services::extract::{extract_action_items, likely_contains_action_items};
use crate::services::hierarchy::normalize;
use crate::services::settings::{AppSettings, SettingsService};

pub const DEFAULT_TITLE: &str = "New conversation";

pub const DEFAULT_COACH_PROMPT: &str = "You are an experienced small-business coach. \
Give practical, specific advice. When you recommend next steps, list them as short \
numbered actions the owner can take this week.";

const BREAK_EVEN_PROMPT: &str = "You are helping a small-business owner work out their \
break-even point. Ask for any missing numbers one or two at a time. Whenever the owner \
gives or changes a figure, end your reply with a ```json code block holding only the \
changed fields, using the keys fixedCosts, variableCosts, unitPrice, breakEvenPoint and \
assumptions. Costs are a number or an object of named amounts.";

const BREAK_EVEN_FALLBACK_REPLY: &str = "Break-even figures updated.";

/// A user message with the coach's reply.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub user_message: Message,
    pub assistant_message: Message,
    pub action_items: Vec<ActionItem>,
}

#[derive(Debug, Clone)]
pub struct BreakEvenTurn {
    pub user_message: Message,
    pub assistant_message: Message,
    pub data: BreakEvenData,
}

/// Truncate text to a short title for conversations.
pub fn truncate_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or(text).trim();
    if first_line.len() > 50 {
        let boundary = first_line
            .char_indices()
            .take_while(|(i, _)| *i < 47)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(47);
        format!("{}...", &first_line[..boundary])
    } else {
        first_line.to_string()
    }
}

/// Conversation prompt, then the settings persona, then the built-in one.
pub fn coach_prompt(conversation: &Conversation, settings: &AppSettings) -> String {
    conversation
        .system_prompt
        .as_deref()
        .or(settings.coach_prompt.as_deref())
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_COACH_PROMPT)
        .to_string()
}

fn assistant_message(conversation_id: &str, response: crate::providers::ChatResponse) -> Message {
    let mut message = Message::new(conversation_id, Role::Assistant, response.content);
    message.model = Some(response.model);
    message.tokens_in = response.tokens_in;
    message.tokens_out = response.tokens_out;
    message
}

/// Store both sides of a turn; a failed LLM call stores nothing.
async fn record_turn(
    db: &Database,
    conversation: &Conversation,
    user_message: &Message,
    assistant: &Message,
    first_turn: bool,
) -> Result<()> {
    db.insert_message(user_message).await?;
    db.insert_message(assistant).await?;
    if first_turn && conversation.title == DEFAULT_TITLE {
        let title = truncate_title(&user_message.content);
        if !title.is_empty() {
            db.update_conversation(&conversation.id, Some(title.as_str()), None)
                .await?;
        }
    }
    db.update_conversation_timestamp(&conversation.id).await
}

/// Send a user message and store the coach's reply with its action items.
pub async fn send_turn(
    db: &Database,
    gateway: &ChatGateway,
    conversation: &Conversation,
    content: &str,
) -> Result<TurnOutcome> {
    let settings = SettingsService::load(db).await;

    let mut history = db.list_messages(&conversation.id).await?;
    let first_turn = history.is_empty();
    let user_message = Message::new(&conversation.id, Role::User, content);
    history.push(user_message.clone());

    let response = gateway
        .complete(
            Some(coach_prompt(conversation, &settings)),
            &history,
            &settings,
            ResponseFormat::Text,
        )
        .await
        .context("Coach reply failed")?;

    let assistant = assistant_message(&conversation.id, response);
    record_turn(db, conversation, &user_message, &assistant, first_turn).await?;

    let action_items = if settings.auto_extract {
        extract_from_message(db, &assistant).await?
    } else {
        Vec::new()
    };

    Ok(TurnOutcome {
        user_message,
        assistant_message: assistant,
        action_items,
    })
}

/// Extract action items from a stored message and append them to its
/// conversation. Items already stored for the message are not duplicated.
pub async fn extract_from_message(db: &Database, message: &Message) -> Result<Vec<ActionItem>> {
    if !likely_contains_action_items(message.role, &message.content) {
        return Ok(Vec::new());
    }

    let existing: HashSet<String> = db
        .list_action_items(ItemFilter {
            message_id: Some(message.id.clone()),
            ..Default::default()
        })
        .await?
        .into_iter()
        .map(|item| item.content)
        .collect();

    let candidates: Vec<String> = extract_action_items(message.role, &message.content)
        .into_iter()
        .filter(|candidate| !existing.contains(candidate))
        .collect();
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let start = db.next_item_ordinal(&message.conversation_id).await?;
    let rows = normalize(
        candidates,
        Some(&message.id),
        Some(&message.conversation_id),
        start,
    );
    let stored = db.insert_action_items(rows).await?;

    tracing::info!(
        message_id = %message.id,
        count = stored.len(),
        "stored extracted action items"
    );
    Ok(stored)
}

fn break_even_system_prompt(current: &BreakEvenData) -> String {
    let state = if current.is_empty() {
        "No figures yet.".to_string()
    } else {
        format_break_even(current)
    };
    format!("{}\n\nCurrent break-even data:\n{}", BREAK_EVEN_PROMPT, state)
}

/// One break-even coaching turn: the stored figures go out as context and
/// any figures in the reply are merged back.
pub async fn send_break_even_turn(
    db: &Database,
    gateway: &ChatGateway,
    conversation: &Conversation,
    content: &str,
) -> Result<BreakEvenTurn> {
    let settings = SettingsService::load(db).await;
    let existing = db
        .get_break_even(&conversation.id)
        .await?
        .unwrap_or_default();

    let mut history = db.list_messages(&conversation.id).await?;
    let first_turn = history.is_empty();
    let user_message = Message::new(&conversation.id, Role::User, content);
    history.push(user_message.clone());

    let response = gateway
        .complete(
            Some(break_even_system_prompt(&existing)),
            &history,
            &settings,
            ResponseFormat::Text,
        )
        .await
        .context("Break-even reply failed")?;

    let data = merge_from_response(&response.content, &existing);
    if data != existing {
        db.save_break_even(&conversation.id, &data).await?;
        tracing::info!(conversation_id = %conversation.id, "break-even data updated");
    }

    let cleaned = clean_response(&response.content);
    let mut response = response;
    response.content = if cleaned.is_empty() {
        BREAK_EVEN_FALLBACK_REPLY.to_string()
    } else {
        cleaned
    };
    let assistant = assistant_message(&conversation.id, response);
    record_turn(db, conversation, &user_message, &assistant, first_turn).await?;

    Ok(BreakEvenTurn {
        user_message,
        assistant_message: assistant,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_title() {
        assert_eq!(truncate_title("Pricing help\nmore text"), "Pricing help");
        let long = "a".repeat(80);
        let title = truncate_title(&long);
        assert_eq!(title.len(), 50);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_truncate_title_respects_char_boundaries() {
        let long = "é".repeat(40);
        let title = truncate_title(&long);
        assert!(title.ends_with("..."));
        assert!(title.is_char_boundary(title.len() - 3));
    }

    #[test]
    fn test_coach_prompt_precedence() {
        let mut settings = AppSettings::default();
        let mut conversation = Conversation::new(DEFAULT_TITLE, None);
        assert_eq!(coach_prompt(&conversation, &settings), DEFAULT_COACH_PROMPT);

        settings.coach_prompt = Some("Persona".to_string());
        assert_eq!(coach_prompt(&conversation, &settings), "Persona");

        conversation.system_prompt = Some("Per conversation".to_string());
        assert_eq!(coach_prompt(&conversation, &settings), "Per conversation");
    }

    #[test]
    fn test_break_even_prompt_carries_state() {
        let empty = break_even_system_prompt(&BreakEvenData::default());
        assert!(empty.ends_with("No figures yet."));

        let data = BreakEvenData {
            unit_price: Some(12.0),
            ..Default::default()
        };
        assert!(break_even_system_prompt(&data).ends_with("Unit Price: $12.00"));
    }

    #[tokio::test]
    async fn test_extract_from_message_appends_without_duplicates() {
        let db = Database::new_in_memory().unwrap();
        let conversation = Conversation::new("Bakery", None);
        db.insert_conversation(&conversation).await.unwrap();

        let reply = Message::new(
            &conversation.id,
            Role::Assistant,
            "Next steps:\n1. Buy supplies\n2. Hire a baker",
        );
        db.insert_message(&reply).await.unwrap();

        let first = extract_from_message(&db, &reply).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].content, "Buy supplies");
        assert_eq!(first[0].ordinal, 0);
        assert_eq!(first[1].ordinal, 1);

        let again = extract_from_message(&db, &reply).await.unwrap();
        assert!(again.is_empty());

        let later = Message::new(&conversation.id, Role::Assistant, "1. Open a bank account");
        db.insert_message(&later).await.unwrap();
        let appended = extract_from_message(&db, &later).await.unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].ordinal, 2);
    }

    #[tokio::test]
    async fn test_user_messages_are_never_extracted() {
        let db = Database::new_in_memory().unwrap();
        let conversation = Conversation::new("Bakery", None);
        db.insert_conversation(&conversation).await.unwrap();
        let question = Message::new(&conversation.id, Role::User, "1. Buy supplies");
        db.insert_message(&question).await.unwrap();

        assert!(extract_from_message(&db, &question).await.unwrap().is_empty());
    }
}
