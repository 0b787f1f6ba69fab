use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{BusinessPlan, PlanSection, Role, SectionKey};
use crate::providers::{ChatMessage, ResponseFormat};
use crate::services::break_even::find_json_candidate;
use crate::services::chat::ChatGateway;
use crate::services::database::Database;
use crate::services::settings::SettingsService;

const SECTION_SYSTEM_PROMPT: &str = "You are a business plan writer for small businesses. \
Write clear, concrete prose in Markdown. Reply with a JSON object of the form \
{\"content\": \"<section markdown>\"}.";

/// Context from other sections is cut to this many characters each.
const CONTEXT_CHARS: usize = 1500;

#[derive(Deserialize)]
struct SectionDraft {
    content: String,
}

fn section_brief(key: SectionKey) -> &'static str {
    match key {
        SectionKey::ExecutiveSummary => {
            "Summarize the business, its offer, target customers and financial outlook in a few paragraphs."
        }
        SectionKey::CompanyDescription => {
            "Describe the company, its mission, legal structure, location and what sets it apart."
        }
        SectionKey::MarketAnalysis => {
            "Analyze the target market, customer segments, market size and main competitors."
        }
        SectionKey::Organization => {
            "Describe the ownership, management team, key roles and hiring plans."
        }
        SectionKey::ProductsServices => {
            "Describe the products or services, pricing and how they meet customer needs."
        }
        SectionKey::MarketingSales => {
            "Lay out the marketing channels, sales process and customer retention strategy."
        }
        SectionKey::FinancialProjections => {
            "Outline startup costs, revenue projections for three years and the break-even outlook."
        }
    }
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Prompt for one section, with the plan's other written sections as context.
pub fn section_prompt(plan: &BusinessPlan, key: SectionKey, guidance: Option<&str>) -> String {
    let mut prompt = format!(
        "Write the \"{}\" section of the business plan \"{}\".\n{}\n",
        key.title(),
        plan.title,
        section_brief(key)
    );

    if let Some(description) = plan.description.as_deref().filter(|d| !d.trim().is_empty()) {
        prompt.push_str(&format!("\nAbout the business: {}\n", description.trim()));
    }

    let context: Vec<&PlanSection> = plan
        .sections
        .iter()
        .filter(|s| s.section_key != key && !s.content.trim().is_empty())
        .collect();
    if !context.is_empty() {
        prompt.push_str("\nSections written so far:\n");
        for section in context {
            prompt.push_str(&format!(
                "\n## {}\n{}\n",
                section.title,
                clip(section.content.trim(), CONTEXT_CHARS)
            ));
        }
    }

    if let Some(guidance) = guidance.filter(|g| !g.trim().is_empty()) {
        prompt.push_str(&format!("\nOwner's notes: {}\n", guidance.trim()));
    }

    prompt
}

/// Section text from a reply: the `content` field when the reply is the
/// expected JSON, otherwise the raw text.
pub fn parse_section_reply(text: &str) -> String {
    let parsed = serde_json::from_str::<SectionDraft>(text.trim()).ok().or_else(|| {
        find_json_candidate(text).and_then(|c| serde_json::from_str::<SectionDraft>(&c).ok())
    });

    match parsed {
        Some(draft) => draft.content.trim().to_string(),
        None => {
            tracing::warn!("Section reply was not the expected JSON, storing raw text");
            text.trim().to_string()
        }
    }
}

pub async fn generate_section(
    db: &Database,
    gateway: &ChatGateway,
    plan: &BusinessPlan,
    key: SectionKey,
    guidance: Option<&str>,
) -> Result<PlanSection> {
    let settings = SettingsService::load(db).await;
    let messages = vec![ChatMessage {
        role: Role::User,
        content: section_prompt(plan, key, guidance),
    }];

    let response = gateway
        .send(
            Some(SECTION_SYSTEM_PROMPT.to_string()),
            messages,
            &settings,
            ResponseFormat::Json,
        )
        .await
        .with_context(|| format!("Generating {} failed", key.as_str()))?;

    let content = parse_section_reply(&response.content);
    let section = db.upsert_section(&plan.id, key, &content).await?;
    tracing::info!(plan_id = %plan.id, section = key.as_str(), "generated plan section");
    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn plan_with(sections: Vec<(SectionKey, &str)>) -> BusinessPlan {
        let now = Utc::now();
        BusinessPlan {
            id: "p1".to_string(),
            title: "Corner Bakery".to_string(),
            description: Some("Sourdough and coffee".to_string()),
            sections: sections
                .into_iter()
                .map(|(key, content)| PlanSection {
                    id: format!("s-{}", key.as_str()),
                    plan_id: "p1".to_string(),
                    section_key: key,
                    title: key.title().to_string(),
                    content: content.to_string(),
                    ordinal: key.ordinal(),
                    updated_at: now,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_prompt_includes_other_sections_only() {
        let plan = plan_with(vec![
            (SectionKey::ExecutiveSummary, "Old summary"),
            (SectionKey::MarketAnalysis, "Students nearby"),
            (SectionKey::Organization, "  "),
        ]);
        let prompt = section_prompt(&plan, SectionKey::ExecutiveSummary, Some("Keep it short"));

        assert!(prompt
            .contains("\"Executive Summary\" section of the business plan \"Corner Bakery\""));
        assert!(prompt.contains("About the business: Sourdough and coffee"));
        assert!(prompt.contains("## Market Analysis\nStudents nearby"));
        assert!(!prompt.contains("Old summary"));
        assert!(!prompt.contains("## Organization"));
        assert!(prompt.contains("Owner's notes: Keep it short"));
    }

    #[test]
    fn test_parse_section_reply() {
        assert_eq!(parse_section_reply(r#"{"content": "We bake."}"#), "We bake.");
        assert_eq!(
            parse_section_reply("Sure!\n```json\n{\"content\": \"Fenced.\"}\n```"),
            "Fenced."
        );
        assert_eq!(parse_section_reply("  Plain prose.  "), "Plain prose.");
    }

    #[test]
    fn test_clip_counts_chars() {
        assert_eq!(clip("héllo", 2), "hé");
        assert_eq!(clip("hi", 10), "hi");
    }
}
