use std::collections::HashSet;
use std::sync::OnceLock;

use regex::{Regex, RegexSet};

use crate::models::Role;

const MIN_WORDS: usize = 2;
const MAX_CHARS: usize = 200;

const ACTION_VERBS: &[&str] = &[
    "Create",
    "Develop",
    "Research",
    "Build",
    "Set up",
    "Establish",
    "Identify",
    "Define",
    "Write",
    "Contact",
    "Schedule",
    "Review",
    "Analyze",
    "Prepare",
    "Launch",
    "Hire",
    "Register",
    "Apply",
    "Update",
    "Implement",
    "Design",
    "Plan",
    "Calculate",
    "Track",
    "Reach out",
    "Sign up",
    "Complete",
    "Draft",
    "Test",
    "Meet",
    "Secure",
    "Obtain",
    "Start",
    "Focus",
    "Consider",
    "Talk",
];

const OBLIGATION_PHRASES: &[&str] = &[
    "You should",
    "You need to",
    "You must",
    "Make sure to",
    "Be sure to",
    "It's important to",
];

/// A named matcher over the full message text.
pub struct Rule {
    pub name: &'static str,
    pub scan: fn(&str) -> Vec<String>,
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "numbered_list",
        scan: scan_numbered,
    },
    Rule {
        name: "bulleted_list",
        scan: scan_bulleted,
    },
    Rule {
        name: "header_content",
        scan: scan_header_content,
    },
    Rule {
        name: "explicit_marker",
        scan: scan_markers,
    },
    Rule {
        name: "step_marker",
        scan: scan_steps,
    },
    Rule {
        name: "action_verb",
        scan: scan_action_verbs,
    },
    Rule {
        name: "obligation",
        scan: scan_obligations,
    },
];

fn re_numbered() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*\d{1,3}[.)][ \t]+(.+)$").unwrap())
}

fn re_bulleted() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*[-*•+][ \t]+(.+)$").unwrap())
}

fn re_header_content() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:[-*•+][ \t]+|\d{1,3}[.)][ \t]+)?\**([A-Z][^:\n]{0,49}?)\**:\**[ \t]+(.+)$").unwrap()
    })
}

fn re_markers() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:action(?:\s+item)?|task|to-?do)\s*:\**[ \t]*([^\n]+)").unwrap()
    })
}

fn re_steps() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bstep\s+\d+\s*[:.)-]\**[ \t]*([^\n]+)").unwrap())
}

fn alternation(words: &[&str]) -> String {
    words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|")
}

fn re_action_verbs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(
            r"(?m)(?:^|[.!?][ \t]+)[ \t]*(?:[-*•+][ \t]+|\d{{1,3}}[.)][ \t]+)?\**((?:{})\b[^.!?\n]*)",
            alternation(ACTION_VERBS)
        );
        Regex::new(&pattern).unwrap()
    })
}

fn re_obligations() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(
            r"(?im)(?:^|[.!?][ \t]+)[ \t]*(?:{})[ \t]+([^.!?\n]+)",
            alternation(OBLIGATION_PHRASES)
        );
        Regex::new(&pattern).unwrap()
    })
}

fn captures(re: &Regex, text: &str, group: usize) -> Vec<String> {
    re.captures_iter(text)
        .filter_map(|caps| caps.get(group))
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn scan_numbered(text: &str) -> Vec<String> {
    captures(re_numbered(), text, 1)
}

pub fn scan_bulleted(text: &str) -> Vec<String> {
    captures(re_bulleted(), text, 1)
}

pub fn scan_header_content(text: &str) -> Vec<String> {
    captures(re_header_content(), text, 2)
}

pub fn scan_markers(text: &str) -> Vec<String> {
    captures(re_markers(), text, 1)
}

pub fn scan_steps(text: &str) -> Vec<String> {
    captures(re_steps(), text, 1)
}

pub fn scan_action_verbs(text: &str) -> Vec<String> {
    captures(re_action_verbs(), text, 1)
}

pub fn scan_obligations(text: &str) -> Vec<String> {
    captures(re_obligations(), text, 1)
        .into_iter()
        .map(|rest| capitalize(&rest))
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Strip markdown markers and trailing punctuation; `None` if the candidate
/// is too short or too long to be a task.
pub fn clean_candidate(raw: &str) -> Option<String> {
    let without_markup: String = raw.chars().filter(|c| !matches!(c, '*' | '`')).collect();
    let without_markup = without_markup.replace("__", "");
    let trimmed = without_markup
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() && c != ')' && c != '%')
        .trim();

    if trimmed.chars().count() <= 1 || trimmed.chars().count() > MAX_CHARS {
        return None;
    }
    if trimmed.split_whitespace().count() < MIN_WORDS {
        return None;
    }
    Some(trimmed.to_string())
}

/// Run every rule over an assistant message. Other roles yield nothing.
pub fn extract_action_items(role: Role, text: &str) -> Vec<String> {
    if role != Role::Assistant {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for rule in RULES {
        let matches = (rule.scan)(text);
        tracing::trace!(rule = rule.name, matches = matches.len(), "ran extraction rule");
        for raw in matches {
            let Some(candidate) = clean_candidate(&raw) else {
                continue;
            };
            if seen.insert(candidate.clone()) {
                items.push(candidate);
            }
        }
    }

    tracing::debug!(count = items.len(), "extracted action item candidates");
    items
}

fn likely_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([
            re_numbered().as_str(),
            re_bulleted().as_str(),
            re_header_content().as_str(),
            re_markers().as_str(),
            re_steps().as_str(),
            re_action_verbs().as_str(),
            re_obligations().as_str(),
        ])
        .unwrap()
    })
}

/// Cheap pre-check used to decide whether full extraction is worthwhile.
pub fn likely_contains_action_items(role: Role, text: &str) -> bool {
    role == Role::Assistant && likely_set().is_match(text)
}
