pub mod auto_rules;
pub mod engine;
pub mod preference_learner;
pub mod prompts;
pub mod snippet;

pub use auto_rules::{AutoRuleMatch, AutoRulesEngine};
pub use engine::{ClassificationResult, EmailClassifier};
pub use preference_learner::PreferenceLearner;
pub use snippet::{CleaningResult, SnippetCleaner};
