//! Episode Classification - Ordered Predicate Chain
//!
//! `TigerStyle`: Classification rules are pluggable trait objects evaluated
//! in a fixed order; the first match wins. Explicit metadata flags are
//! checked before keyword heuristics within each classifier, so callers can
//! always override the text signals.

use serde_json::Value;

use crate::store::EpisodeType;

// =============================================================================
// Signal
// =============================================================================

/// The signals a classifier may inspect.
#[derive(Debug, Clone, Copy)]
pub struct ClassifySignal<'a> {
    /// Lowercased JSON-encoded content text
    pub content_text: &'a str,
    /// Caller-supplied metadata
    pub metadata: &'a Value,
}

impl<'a> ClassifySignal<'a> {
    /// Whether a metadata flag is set to true.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.metadata.get(key).and_then(Value::as_bool) == Some(true)
    }

    /// Whether any keyword occurs in the content text.
    #[must_use]
    pub fn any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|kw| self.content_text.contains(kw))
    }
}

// =============================================================================
// Classifier trait and chain
// =============================================================================

/// One link in the classification chain.
pub trait EpisodeClassifier: Send + Sync {
    /// The type this classifier detects.
    fn episode_type(&self) -> EpisodeType;

    /// Whether the signal matches this classifier.
    fn matches(&self, signal: &ClassifySignal<'_>) -> bool;
}

/// Detects error episodes.
///
/// An explicit `is_error` flag matches; a false flag does not veto the
/// keyword heuristic, so error text still classifies as an error.
#[derive(Debug, Default)]
pub struct ErrorClassifier;

impl EpisodeClassifier for ErrorClassifier {
    fn episode_type(&self) -> EpisodeType {
        EpisodeType::Error
    }

    fn matches(&self, signal: &ClassifySignal<'_>) -> bool {
        signal.flag("is_error")
            || signal.any_keyword(&["error", "failed", "failure", "exception", "crash", "broken"])
    }
}

/// Detects success episodes.
#[derive(Debug, Default)]
pub struct SuccessClassifier;

impl EpisodeClassifier for SuccessClassifier {
    fn episode_type(&self) -> EpisodeType {
        EpisodeType::Success
    }

    fn matches(&self, signal: &ClassifySignal<'_>) -> bool {
        signal.flag("task_completed")
            || signal.flag("problem_solved")
            || signal.any_keyword(&["success", "succeeded", "completed", "solved", "accomplished"])
    }
}

/// Detects task episodes.
#[derive(Debug, Default)]
pub struct TaskClassifier;

impl EpisodeClassifier for TaskClassifier {
    fn episode_type(&self) -> EpisodeType {
        EpisodeType::Task
    }

    fn matches(&self, signal: &ClassifySignal<'_>) -> bool {
        signal.flag("is_task")
            || signal.metadata.get("task").is_some()
            || signal.any_keyword(&["task", "execute", "perform", "run this", "command"])
    }
}

/// Detects learning episodes.
#[derive(Debug, Default)]
pub struct LearningClassifier;

impl EpisodeClassifier for LearningClassifier {
    fn episode_type(&self) -> EpisodeType {
        EpisodeType::Learning
    }

    fn matches(&self, signal: &ClassifySignal<'_>) -> bool {
        signal.flag("learning_moment")
            || signal.any_keyword(&["learn", "how to", "explain", "understand", "teach me"])
    }
}

/// Detects discovery episodes.
#[derive(Debug, Default)]
pub struct DiscoveryClassifier;

impl EpisodeClassifier for DiscoveryClassifier {
    fn episode_type(&self) -> EpisodeType {
        EpisodeType::Discovery
    }

    fn matches(&self, signal: &ClassifySignal<'_>) -> bool {
        signal.flag("is_discovery")
            || signal.any_keyword(&["found", "discovered", "interesting", "did not know"])
    }
}

/// The default chain in detection order.
///
/// Order is significant: error wins over success, success over task, and so
/// on down to the conversation fallback.
#[must_use]
pub fn default_chain() -> Vec<Box<dyn EpisodeClassifier>> {
    vec![
        Box::new(ErrorClassifier),
        Box::new(SuccessClassifier),
        Box::new(TaskClassifier),
        Box::new(LearningClassifier),
        Box::new(DiscoveryClassifier),
    ]
}

/// Classify content and metadata against a chain.
///
/// Falls back to [`EpisodeType::Conversation`] when nothing matches.
#[must_use]
pub fn classify(
    chain: &[Box<dyn EpisodeClassifier>],
    content: &Value,
    metadata: &Value,
) -> EpisodeType {
    let content_text = content.to_string().to_lowercase();
    let signal = ClassifySignal {
        content_text: &content_text,
        metadata,
    };

    chain
        .iter()
        .find(|classifier| classifier.matches(&signal))
        .map_or(EpisodeType::Conversation, |classifier| {
            classifier.episode_type()
        })
}
