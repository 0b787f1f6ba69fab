use std::ops::Range;
use std::sync::OnceLock;

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use regex::Regex;

use crate::models::{BreakEvenData, BreakEvenUpdate, CostBreakdown};

struct FencedBlock {
    language: Option<String>,
    code: String,
    span: Range<usize>,
}

fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<FencedBlock> = None;

    for (event, range) in Parser::new(text).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang))) => {
                let lang = lang.trim().to_lowercase();
                current = Some(FencedBlock {
                    language: (!lang.is_empty()).then_some(lang),
                    code: String::new(),
                    span: range,
                });
            }
            Event::Text(t) => {
                if let Some(block) = current.as_mut() {
                    block.code.push_str(&t);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
            }
            _ => {}
        }
    }

    blocks
}

/// End of the balanced `{...}` opening at `start`, if it closes.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte range of the first balanced `{...}` starting at or after `from`.
/// An opening brace that never closes is skipped.
fn brace_span(text: &str, from: usize) -> Option<Range<usize>> {
    let mut search = from;
    while let Some(found) = text[search..].find('{') {
        let start = search + found;
        if let Some(end) = balanced_end(text, start) {
            return Some(start..end);
        }
        search = start + 1;
    }
    None
}

/// The best JSON candidate in a reply: a `json` fence, any fence, then the
/// first brace-delimited substring.
pub fn find_json_candidate(text: &str) -> Option<String> {
    let blocks = fenced_blocks(text);

    if let Some(block) = blocks
        .iter()
        .find(|b| b.language.as_deref() == Some("json"))
    {
        return Some(block.code.trim().to_string());
    }
    if let Some(block) = blocks.first() {
        return Some(block.code.trim().to_string());
    }

    brace_span(text, 0).map(|span| text[span].to_string())
}

/// Merge any embedded update over `existing`; on failure return it unchanged.
pub fn merge_from_response(text: &str, existing: &BreakEvenData) -> BreakEvenData {
    let Some(candidate) = find_json_candidate(text) else {
        return existing.clone();
    };

    match serde_json::from_str::<BreakEvenUpdate>(&candidate) {
        Ok(update) => {
            let mut merged = existing.clone();
            merged.merge(update);
            merged
        }
        Err(e) => {
            tracing::warn!("Ignoring unusable break-even data in reply: {}", e);
            existing.clone()
        }
    }
}

fn lead_in_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)^[ \t]*(?:here(?:'s| is| are)|below is|i've updated|updated)\b[^\n]*\b(?:json|data|numbers|figures|values|information)\b[^\n]*:[ \t]*$",
        )
        .unwrap()
    })
}

fn blank_runs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").unwrap())
}

/// Remove embedded JSON and its lead-in phrases from a reply.
pub fn clean_response(text: &str) -> String {
    let mut spans: Vec<Range<usize>> = fenced_blocks(text).into_iter().map(|b| b.span).collect();

    let mut from = 0;
    while from < text.len() {
        let Some(span) = brace_span(text, from) else {
            break;
        };
        let inside_fence = spans
            .iter()
            .any(|s| s.start <= span.start && span.end <= s.end);
        if !inside_fence && serde_json::from_str::<serde_json::Value>(&text[span.clone()]).is_ok()
        {
            spans.push(span.clone());
        }
        from = span.end;
    }
    spans.sort_by_key(|s| s.start);

    let mut cleaned = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        if span.start < cursor {
            continue;
        }
        cleaned.push_str(&text[cursor..span.start]);
        cursor = span.end;
    }
    cleaned.push_str(&text[cursor..]);

    let cleaned = lead_in_re().replace_all(&cleaned, "");
    let cleaned = blank_runs_re().replace_all(&cleaned, "\n\n");
    cleaned.trim().to_string()
}

fn group_thousands(whole: u64) -> String {
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn format_money(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, group_thousands(cents / 100), cents % 100)
}

fn format_units(units: f64) -> String {
    if units.fract() == 0.0 && units.abs() < u64::MAX as f64 {
        let sign = if units < 0.0 { "-" } else { "" };
        format!("{}{}", sign, group_thousands(units.abs() as u64))
    } else {
        format!("{:.2}", units)
    }
}

fn push_costs(out: &mut String, label: &str, costs: &CostBreakdown) {
    match costs {
        CostBreakdown::Total(amount) => {
            out.push_str(&format!("{}: {}\n", label, format_money(*amount)));
        }
        CostBreakdown::Itemized(items) => {
            out.push_str(&format!("{}: {} total\n", label, format_money(costs.total())));
            for (name, amount) in items {
                out.push_str(&format!("  - {}: {}\n", name, format_money(*amount)));
            }
        }
    }
}

/// Render the state in a fixed order, skipping empty sections.
pub fn format_break_even(data: &BreakEvenData) -> String {
    let mut out = String::new();

    if let Some(fixed) = &data.fixed_costs {
        push_costs(&mut out, "Fixed Costs", fixed);
    }
    if let Some(variable) = &data.variable_costs {
        push_costs(&mut out, "Variable Costs (per unit)", variable);
    }
    if let Some(price) = data.unit_price {
        out.push_str(&format!("Unit Price: {}\n", format_money(price)));
    }

    match &data.break_even_point {
        Some(point) => {
            let units = point.units().map(|u| format!("{} units", format_units(u)));
            let revenue = point.revenue().map(format_money);
            let line = match (units, revenue) {
                (Some(u), Some(r)) => Some(format!("{} ({} revenue)", u, r)),
                (Some(u), None) => Some(u),
                (None, Some(r)) => Some(format!("{} revenue", r)),
                (None, None) => None,
            };
            if let Some(line) = line {
                out.push_str(&format!("Break-Even Point: {}\n", line));
            }
        }
        None => {
            if let Some(computed) = data.computed_point() {
                out.push_str(&format!(
                    "Break-Even Point: {} units ({} revenue)\n",
                    format_units(computed.units),
                    format_money(computed.revenue)
                ));
            }
        }
    }

    if let Some(assumptions) = data.assumptions.as_ref().filter(|a| !a.is_empty()) {
        out.push_str("Assumptions:\n");
        for assumption in assumptions {
            out.push_str(&format!("  - {}\n", assumption));
        }
    }

    out.trim_end().to_string()
}
