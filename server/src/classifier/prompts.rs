use chrono::{DateTime, Utc};
use indoc::{formatdoc, indoc};
use serde_json::json;

use crate::{
    conf::AppConfig,
    engine::thread::ThreadContext,
    llm::ToolDefinition,
};

pub const PRIORITY_P1: &str = "P1 - Urgent Important";
pub const PRIORITY_P2: &str = "P2 - Important";
pub const PRIORITY_P3: &str = "P3 - Routine";
pub const PRIORITY_P4: &str = "P4 - Low";

pub const PRIORITIES: [&str; 4] = [PRIORITY_P1, PRIORITY_P2, PRIORITY_P3, PRIORITY_P4];

pub const ACTION_NEEDS_REPLY: &str = "Needs Reply";
pub const ACTION_REVIEW: &str = "Review";
pub const ACTION_FILE: &str = "File";
pub const ACTION_FYI: &str = "FYI";
pub const ACTION_WAITING_FOR: &str = "Waiting For";

pub const ACTION_TYPES: [&str; 5] = [
    ACTION_NEEDS_REPLY,
    ACTION_REVIEW,
    ACTION_FILE,
    ACTION_FYI,
    ACTION_WAITING_FOR,
];

pub fn classify_email_tool() -> ToolDefinition {
    ToolDefinition {
        name: "classify_email".to_string(),
        description:
            "Record the classification decision for the target email. Call exactly once."
                .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "folder": {
                    "type": "string",
                    "description": "Destination folder path from the taxonomy, e.g. 'Projects/Steelworks'"
                },
                "priority": {
                    "type": "string",
                    "enum": PRIORITIES,
                },
                "action_type": {
                    "type": "string",
                    "enum": ACTION_TYPES,
                },
                "confidence": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                },
                "reasoning": {
                    "type": "string",
                    "description": "One sentence explaining the decision"
                }
            },
            "required": ["folder", "priority", "action_type", "confidence", "reasoning"]
        }),
    }
}

pub fn generate_digest_tool() -> ToolDefinition {
    ToolDefinition {
        name: "generate_digest".to_string(),
        description: "Produce the daily digest sections from the provided processing data."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string" },
                "overdue_replies_section": { "type": "string" },
                "waiting_for_section": { "type": "string" },
                "activity_section": { "type": "string" },
                "pending_section": { "type": "string" }
            },
            "required": ["summary"]
        }),
    }
}

pub const DIGEST_SYSTEM_PROMPT: &str = indoc! {"
    You format daily email-management digests. You receive processing data as
    JSON and respond by calling the generate_digest tool. Be concise: each
    section is a few short lines, most important items first. Omit sections
    that have nothing to report.
"};

/// System prompt for triage classification. Rebuilt whenever the config
/// snapshot or the learned preferences change.
pub fn build_system_prompt(cfg: &AppConfig, preferences: &str, now: DateTime<Utc>) -> String {
    let mut taxonomy = String::new();
    if !cfg.projects.is_empty() {
        taxonomy.push_str("Projects (active work with an end state):\n");
        for project in &cfg.projects {
            taxonomy.push_str(&format!("- {} -> {}", project.name, project.folder));
            if !project.signals.is_empty() {
                taxonomy.push_str(&format!("  (signals: {})", project.signals.join(", ")));
            }
            taxonomy.push('\n');
        }
    }
    if !cfg.areas.is_empty() {
        taxonomy.push_str("Areas (ongoing responsibilities):\n");
        for area in &cfg.areas {
            taxonomy.push_str(&format!("- {} -> {}", area.name, area.folder));
            if !area.signals.is_empty() {
                taxonomy.push_str(&format!("  (signals: {})", area.signals.join(", ")));
            }
            taxonomy.push('\n');
        }
    }
    if taxonomy.is_empty() {
        taxonomy.push_str("No taxonomy configured yet; prefer 'Inbox' as the folder.\n");
    }

    let key_contacts = if cfg.key_contacts.is_empty() {
        "None configured.".to_string()
    } else {
        cfg.key_contacts
            .iter()
            .map(|c| format!("- {} <{}>", c.name, c.email))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let preferences = if preferences.trim().is_empty() {
        "No preferences learned yet."
    } else {
        preferences
    };

    formatdoc! {"
        You are an email triage assistant for a single mailbox. For each email
        you are shown, decide the destination folder, a priority, and an
        action type, then record the decision with the classify_email tool.

        Today's date: {today}

        FOLDER TAXONOMY
        {taxonomy}
        PRIORITIES
        - {p1}: time-critical and consequential, needs attention today
        - {p2}: consequential but not time-critical
        - {p3}: ordinary correspondence
        - {p4}: newsletters, notifications, bulk mail

        ACTION TYPES
        - {needs_reply}: the user owes a response
        - {review}: the user should read and judge
        - {file}: archive into the folder, no action needed
        - {fyi}: informational only
        - {waiting_for}: the user is owed a response by someone else

        KEY CONTACTS
        {key_contacts}

        LEARNED PREFERENCES FROM PAST CORRECTIONS
        {preferences}

        When an inherited folder hint is present, prefer it unless the email
        clearly belongs elsewhere; overriding the hint should lower your
        confidence. Emails from key contacts are rarely {p4}.
        ",
        today = now.format("%Y-%m-%d"),
        taxonomy = taxonomy,
        p1 = PRIORITY_P1,
        p2 = PRIORITY_P2,
        p3 = PRIORITY_P3,
        p4 = PRIORITY_P4,
        needs_reply = ACTION_NEEDS_REPLY,
        review = ACTION_REVIEW,
        file = ACTION_FILE,
        fyi = ACTION_FYI,
        waiting_for = ACTION_WAITING_FOR,
        key_contacts = key_contacts,
        preferences = preferences,
    }
}

/// User message carrying the target email plus the assembled context.
pub fn build_user_message(email: &entity::email::Model, ctx: &ThreadContext) -> String {
    let mut message = formatdoc! {"
        Classify this email:

        Subject: {subject}
        From: {sender_name} <{sender_email}>
        Received: {received}
        Thread depth: {depth}

        Body snippet:
        {snippet}
        ",
        subject = email.subject.as_deref().unwrap_or("(no subject)"),
        sender_name = email.sender_name.as_deref().unwrap_or(""),
        sender_email = email.sender_email.as_deref().unwrap_or("unknown"),
        received = email
            .received_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string()),
        depth = ctx.thread_depth,
        snippet = email.snippet.as_deref().unwrap_or("(empty)"),
    };

    if let Some(folder) = &ctx.inherited_folder {
        message.push_str(&format!(
            "\nInherited folder hint: an earlier email in this thread was approved into '{folder}'.\n"
        ));
    }

    if let Some(history) = &ctx.sender_history {
        if let Some(summary) = history.format_for_prompt() {
            message.push_str(&format!("\nSender history: {summary}\n"));
        }
    }

    if !ctx.messages.is_empty() {
        message.push_str("\nEarlier messages in this thread (newest first):\n");
        for thread_message in &ctx.messages {
            message.push_str(&format!(
                "- [{}] {}: {}\n",
                thread_message
                    .received_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                thread_message.sender_email.as_deref().unwrap_or("unknown"),
                thread_message.snippet.as_deref().unwrap_or(""),
            ));
        }
    }

    message
}

/// Prompt asking the model to revise the stored natural-language preferences
/// in light of recent corrections.
pub fn build_preference_update_prompt(
    lookback_days: i64,
    corrections_formatted: &str,
    current_preferences: &str,
    max_words: usize,
) -> String {
    formatdoc! {"
        The user corrected these email classifications over the last {lookback_days} days:

        {corrections}

        Current classification preferences:
        {current}

        Update the preferences so future classifications better match the
        user's observed choices. Keep rules that still hold, drop ones the
        corrections contradict, and add new ones the corrections support.
        Respond with ONLY the updated preferences text, at most {max_words}
        words, as plain prose or short bullet lines.
        ",
        lookback_days = lookback_days,
        corrections = corrections_formatted,
        current = current_preferences,
        max_words = max_words,
    }
}
