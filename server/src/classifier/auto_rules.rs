use wildmatch::WildMatch;

use crate::conf::AutoRuleConfig;

/// Result of an auto-rule match, carrying the rule that fired and a
/// human-readable reason for the suggestion record.
#[derive(Debug, Clone)]
pub struct AutoRuleMatch<'a> {
    pub rule: &'a AutoRuleConfig,
    pub match_reason: String,
}

/// Deterministic fast-path matcher that bypasses the LLM entirely.
///
/// Rules are evaluated in configured order; the first match wins. Sender
/// patterns are glob-style (`*@domain.com`), subjects are case-insensitive
/// substring searches. No regex, so no pathological inputs.
pub struct AutoRulesEngine;

impl AutoRulesEngine {
    pub fn match_rules<'a>(
        &self,
        sender_email: &str,
        subject: &str,
        rules: &'a [AutoRuleConfig],
    ) -> Option<AutoRuleMatch<'a>> {
        if rules.is_empty() {
            return None;
        }

        let sender_lower = sender_email.to_lowercase();
        let subject_lower = subject.to_lowercase();

        for rule in rules {
            let has_sender_patterns = !rule.matcher.senders.is_empty();
            let has_subject_patterns = !rule.matcher.subjects.is_empty();

            // A rule with no patterns is misconfigured; skip it
            if !has_sender_patterns && !has_subject_patterns {
                continue;
            }

            let sender_matched = match_senders(&sender_lower, &rule.matcher.senders);
            let subject_matched = match_subjects(&subject_lower, &rule.matcher.subjects);

            let (matched, match_type) = if has_sender_patterns && has_subject_patterns {
                (sender_matched && subject_matched, "sender+subject")
            } else if has_sender_patterns {
                (sender_matched, "sender")
            } else {
                (subject_matched, "subject")
            };

            if matched {
                tracing::debug!(rule = %rule.name, match_type, "auto rule matched");
                let reason = match match_type {
                    "sender+subject" => format!(
                        "Rule '{}': sender matched pattern and subject matched keyword",
                        rule.name
                    ),
                    "sender" => format!("Rule '{}': sender matched pattern", rule.name),
                    _ => format!("Rule '{}': subject matched keyword", rule.name),
                };
                return Some(AutoRuleMatch {
                    rule,
                    match_reason: reason,
                });
            }
        }

        None
    }
}

fn match_senders(sender_lower: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .any(|pattern| WildMatch::new(&pattern.to_lowercase()).matches(sender_lower))
}

fn match_subjects(subject_lower: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|keyword| subject_lower.contains(&keyword.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::{RuleAction, RulePatterns};

    fn rule(name: &str, senders: &[&str], subjects: &[&str]) -> AutoRuleConfig {
        AutoRuleConfig {
            name: name.to_string(),
            matcher: RulePatterns {
                senders: senders.iter().map(|s| s.to_string()).collect(),
                subjects: subjects.iter().map(|s| s.to_string()).collect(),
            },
            action: RuleAction {
                folder: "Reference/Newsletters".to_string(),
                priority: "P4 - Low".to_string(),
                action_type: "FYI".to_string(),
            },
        }
    }

    #[test]
    fn sender_glob_matches_domain() {
        let rules = vec![rule("news", &["*@news.example.com"], &[])];
        let engine = AutoRulesEngine;
        let matched = engine
            .match_rules("Digest@News.Example.Com", "Weekly roundup", &rules)
            .unwrap();
        assert_eq!(matched.rule.name, "news");
        assert!(matched.match_reason.contains("sender matched pattern"));
    }

    #[test]
    fn subject_substring_matches_case_insensitive() {
        let rules = vec![rule("invoices", &[], &["invoice"])];
        let engine = AutoRulesEngine;
        assert!(engine
            .match_rules("billing@vendor.example", "Your INVOICE #42", &rules)
            .is_some());
    }

    #[test]
    fn both_patterns_require_both_to_match() {
        let rules = vec![rule("strict", &["*@vendor.example"], &["invoice"])];
        let engine = AutoRulesEngine;
        assert!(engine
            .match_rules("billing@vendor.example", "Status update", &rules)
            .is_none());
        assert!(engine
            .match_rules("other@elsewhere.example", "Invoice attached", &rules)
            .is_none());
        assert!(engine
            .match_rules("billing@vendor.example", "Invoice attached", &rules)
            .is_some());
    }

    #[test]
    fn rule_without_patterns_is_skipped() {
        let rules = vec![rule("empty", &[], &[]), rule("news", &["*@news.example.com"], &[])];
        let engine = AutoRulesEngine;
        let matched = engine
            .match_rules("a@news.example.com", "anything", &rules)
            .unwrap();
        assert_eq!(matched.rule.name, "news");
    }

    #[test]
    fn first_match_wins_in_order() {
        let rules = vec![
            rule("first", &["*@example.com"], &[]),
            rule("second", &["*@example.com"], &[]),
        ];
        let engine = AutoRulesEngine;
        for _ in 0..10 {
            let matched = engine
                .match_rules("a@example.com", "subject", &rules)
                .unwrap();
            assert_eq!(matched.rule.name, "first");
        }
    }

    #[test]
    fn exact_sender_pattern_matches_only_that_sender() {
        let rules = vec![rule("one", &["boss@corp.example"], &[])];
        let engine = AutoRulesEngine;
        assert!(engine.match_rules("boss@corp.example", "hi", &rules).is_some());
        assert!(engine
            .match_rules("not-boss@corp.example", "hi", &rules)
            .is_none());
    }
}
