use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

/// Primary snippet budget for classification.
pub const DEFAULT_MAX_LENGTH: usize = 1000;
/// Budget for snippets included as thread context.
pub const DEFAULT_CONTEXT_MAX_LENGTH: usize = 500;

/// Hard wall-clock bound per cleaning step. The regex engine is linear-time,
/// so a step that overruns this is treated as hostile input and the pipeline
/// stops with whatever it has.
const STEP_TIMEOUT: Duration = Duration::from_secs(1);

static RE_FORWARD_BANNER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^-{2,}\s*(original message|forwarded message|begin forwarded message)\s*-{0,}\s*$").unwrap()
});
static RE_FORWARD_HEADER_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^from:[^\n]*\n(?:(?:sent|date|to|cc|subject):[^\n]*\n?){1,5}").unwrap()
});
static RE_REPLY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^on [^\n]{0,200}wrote:\s*$").unwrap());
static RE_QUOTED_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*>[^\n]*\n?").unwrap());
static RE_SIGNATURE_DELIM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^--[ \t]*$").unwrap());
static RE_SIGNATURE_CLOSER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^(best regards|kind regards|warm regards|regards|many thanks|thanks|cheers|sincerely)[,.!]?[ \t]*$").unwrap()
});
static RE_DISCLAIMER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(this (?:e-?mail|message)(?: and any attachments)? (?:is|are|may (?:be|contain))[^\n]{0,120}(?:confidential|privileged)|if you are not the intended recipient)").unwrap()
});
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

#[derive(Debug, Clone)]
pub struct CleaningResult {
    pub cleaned_text: String,
    pub steps_completed: Vec<&'static str>,
    /// Step that hit the wall-clock bound, if any. The result then carries
    /// the partial text cleaned up to that point (still truncated).
    pub timed_out_step: Option<&'static str>,
}

/// Six-step email body normalization.
///
/// The one hard contract: output is at most `max_length` characters,
/// contains no HTML, and is safe to interpolate into a prompt.
pub struct SnippetCleaner {
    max_length: usize,
}

impl SnippetCleaner {
    pub fn new(max_length: usize) -> Self {
        SnippetCleaner { max_length }
    }

    pub fn clean(&self, body: &str, is_html: bool) -> CleaningResult {
        let mut steps_completed = Vec::with_capacity(6);
        let mut timed_out_step = None;
        let started = Instant::now();

        // 1. HTML to text
        let mut text = if is_html {
            html_to_text(body)
        } else {
            body.to_string()
        };
        steps_completed.push("html_to_text");

        let steps: [(&'static str, fn(&str) -> String); 4] = [
            ("strip_forwarded_headers", strip_forwarded_headers),
            ("strip_quoted_text", strip_quoted_text),
            ("strip_signature", strip_signature),
            ("strip_disclaimers", strip_disclaimers),
        ];

        for (name, step) in steps {
            if started.elapsed() > STEP_TIMEOUT {
                tracing::warn!(step = name, "snippet cleaning step budget exceeded, returning partial result");
                timed_out_step = Some(name);
                break;
            }
            text = step(&text);
            steps_completed.push(name);
        }

        // 6. Whitespace normalize and truncate. Always runs so the length
        // bound holds even on timeout.
        text = normalize_whitespace(&text);
        text = truncate_chars(&text, self.max_length);
        steps_completed.push("normalize_and_truncate");

        CleaningResult {
            cleaned_text: text,
            steps_completed,
            timed_out_step,
        }
    }
}

pub fn clean_snippet(body: &str, is_html: bool, max_length: usize) -> String {
    SnippetCleaner::new(max_length).clean(body, is_html).cleaned_text
}

fn html_to_text(body: &str) -> String {
    // Wide render width keeps html2text from injecting mid-sentence breaks
    html2text::from_read(body.as_bytes(), 400)
}

fn strip_forwarded_headers(text: &str) -> String {
    let text = match RE_FORWARD_BANNER.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    };
    RE_FORWARD_HEADER_BLOCK.replace_all(text, "").into_owned()
}

fn strip_quoted_text(text: &str) -> String {
    let text = match RE_REPLY_MARKER.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    };
    RE_QUOTED_LINE.replace_all(text, "").into_owned()
}

fn strip_signature(text: &str) -> String {
    if let Some(m) = RE_SIGNATURE_DELIM.find(text) {
        return text[..m.start()].to_string();
    }
    // Closer lines only count in the trailing half so a "thanks" mid-body
    // does not wipe the message
    if let Some(m) = RE_SIGNATURE_CLOSER
        .find_iter(text)
        .filter(|m| m.start() >= text.len() / 2)
        .next()
    {
        return text[..m.start()].to_string();
    }
    text.to_string()
}

fn strip_disclaimers(text: &str) -> String {
    match RE_DISCLAIMER.find(text) {
        Some(m) => text[..m.start()].to_string(),
        None => text.to_string(),
    }
}

fn normalize_whitespace(text: &str) -> String {
    let text = text.replace('\r', "");
    let text = RE_SPACES.replace_all(&text, " ");
    let text = RE_BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
