//! LLM-backed task vagueness evaluation.
//!
//! Verdicts are memoized per (title, description) for 24 hours so repeated
//! scan ticks do not re-ask the model about unchanged cards. When the model
//! is unreachable or over quota, a deterministic length heuristic stands in;
//! heuristic verdicts are never cached, so a transient outage cannot pin a
//! judgment for a full TTL. Parse failures fail open (not vague) rather than
//! blocking the pipeline on malformed upstream output.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::llm::CompletionClient;

/// How long a cached verdict stays live.
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the background sweep evicts expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Classifier output for one task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VaguenessVerdict {
    #[serde(rename = "isVague")]
    pub is_vague: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl VaguenessVerdict {
    fn clear() -> Self {
        Self {
            is_vague: false,
            reason: None,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    verdict: VaguenessVerdict,
    cached_at: DateTime<Utc>,
}

/// Cached, fallible-upstream vagueness evaluator.
pub struct VaguenessEvaluator {
    client: Arc<dyn CompletionClient>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: chrono::Duration,
}

impl VaguenessEvaluator {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::from_std(CACHE_TTL).expect("ttl fits"),
        }
    }

    /// Evaluate whether a task is too vague to start work on.
    ///
    /// Never fails: upstream errors degrade to [`fallback_heuristic`].
    pub async fn evaluate(
        &self,
        title: &str,
        description: Option<&str>,
        list_name: &str,
        now: DateTime<Utc>,
    ) -> VaguenessVerdict {
        let key = cache_key(title, description);

        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(&key) {
                if now - entry.cached_at < self.ttl {
                    return entry.verdict.clone();
                }
            }
        }

        let prompt = build_prompt(title, description, list_name);
        match self.client.complete(&prompt).await {
            Ok(text) => match parse_verdict(&text) {
                Some(verdict) => {
                    let mut cache = self.cache.lock().unwrap();
                    cache.insert(
                        key,
                        CacheEntry {
                            verdict: verdict.clone(),
                            cached_at: now,
                        },
                    );
                    verdict
                }
                None => {
                    // Fail open but uncached: the next tick re-asks instead
                    // of pinning a garbled response for a full TTL
                    tracing::error!(response = %text, "Failed to parse vagueness response");
                    VaguenessVerdict::clear()
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "Vagueness evaluation failed, using heuristic");
                fallback_heuristic(title, description)
            }
        }
    }

    /// Drop cache entries past TTL. Run by the scheduler on its own
    /// interval so long uptimes do not grow the cache without bound.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut cache = self.cache.lock().unwrap();
        let before = cache.len();
        cache.retain(|_, entry| now - entry.cached_at < self.ttl);
        before - cache.len()
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

impl std::fmt::Debug for VaguenessEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaguenessEvaluator")
            .field("cached", &self.cache.lock().unwrap().len())
            .finish()
    }
}

fn cache_key(title: &str, description: Option<&str>) -> String {
    format!("{}::{}", title, description.unwrap_or(""))
}

fn build_prompt(title: &str, description: Option<&str>, list_name: &str) -> String {
    let description = match description {
        Some(d) if !d.trim().is_empty() => format!("\"{d}\""),
        _ => "(none)".to_string(),
    };

    format!(
        r#"Evaluate if this task is clear enough for someone to start working on it.

Task title: "{title}"
Description: {description}
List: {list_name}

Respond with JSON only: {{"isVague": true/false, "reason": "brief reason if vague, null if clear"}}

A task is vague if:
- It's unclear what the deliverable is
- Missing key details needed to start work
- Too broad without specifics

A task is NOT vague if:
- The title is self-explanatory (e.g., "Fix typo in README")
- It's a well-known type of task (e.g., "Weekly standup notes")
- The context from the list name makes it clear"#
    )
}

/// Extract the first well-formed JSON verdict embedded in the response.
pub fn parse_verdict(text: &str) -> Option<VaguenessVerdict> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Deterministic stand-in when the classifier is unavailable: short title
/// plus short (or no) description reads as vague.
pub fn fallback_heuristic(title: &str, description: Option<&str>) -> VaguenessVerdict {
    let desc_len = description.map(|d| d.trim().len()).unwrap_or(0);
    VaguenessVerdict {
        is_vague: desc_len < 30 && title.len() < 20,
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{KanbotError, Result};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeClient {
        response: Mutex<Result<String>>,
        calls: AtomicUsize,
    }

    impl FakeClient {
        fn returning(text: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Ok(text.to_string())),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Err(KanbotError::Classifier("down".to_string()))),
                calls: AtomicUsize::new(0),
            })
        }

        fn set_response(&self, response: Result<String>) {
            *self.response.lock().unwrap() = response;
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionClient for FakeClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &*self.response.lock().unwrap() {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(KanbotError::Classifier("down".to_string())),
            }
        }
    }

    fn at_hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap() + chrono::Duration::hours(h as i64)
    }

    #[test]
    fn test_parse_verdict_plain_json() {
        let verdict = parse_verdict(r#"{"isVague": true, "reason": "no deliverable"}"#).unwrap();
        assert!(verdict.is_vague);
        assert_eq!(verdict.reason.as_deref(), Some("no deliverable"));
    }

    #[test]
    fn test_parse_verdict_embedded_json() {
        let text = "Here is my verdict:\n{\"isVague\": false, \"reason\": null}\nThanks!";
        let verdict = parse_verdict(text).unwrap();
        assert!(!verdict.is_vague);
        assert!(verdict.reason.is_none());
    }

    #[test]
    fn test_parse_verdict_garbage() {
        assert!(parse_verdict("I can't help with that").is_none());
        assert!(parse_verdict("} backwards {").is_none());
        assert!(parse_verdict("{not json}").is_none());
    }

    #[test]
    fn test_fallback_heuristic() {
        // Short title, no description: vague
        assert!(fallback_heuristic("Fix stuff", None).is_vague);
        // Long title is enough signal
        assert!(!fallback_heuristic("Migrate billing exports to the new S3 bucket", None).is_vague);
        // Long description is enough signal
        assert!(
            !fallback_heuristic("Fix stuff", Some("The login page 500s when the session cookie expired"))
                .is_vague
        );
        // Whitespace-only description counts as empty
        assert!(fallback_heuristic("Fix stuff", Some("   \n  ")).is_vague);
    }

    #[test]
    fn test_prompt_contents() {
        let prompt = build_prompt("Fix login", Some("500 on expired cookie"), "In Progress");
        assert!(prompt.contains("Task title: \"Fix login\""));
        assert!(prompt.contains("\"500 on expired cookie\""));
        assert!(prompt.contains("List: In Progress"));

        let no_desc = build_prompt("Fix login", None, "To Do");
        assert!(no_desc.contains("Description: (none)"));
        let blank_desc = build_prompt("Fix login", Some("  "), "To Do");
        assert!(blank_desc.contains("Description: (none)"));
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let client = FakeClient::returning(r#"{"isVague": true, "reason": "too broad"}"#);
        let evaluator = VaguenessEvaluator::new(client.clone());

        let first = evaluator.evaluate("Do things", None, "To Do", at_hour(0)).await;
        let second = evaluator.evaluate("Do things", None, "To Do", at_hour(12)).await;

        assert!(first.is_vague);
        assert_eq!(first, second);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let client = FakeClient::returning(r#"{"isVague": false, "reason": null}"#);
        let evaluator = VaguenessEvaluator::new(client.clone());

        evaluator.evaluate("Do things", None, "To Do", at_hour(0)).await;
        evaluator.evaluate("Do things", None, "To Do", at_hour(25)).await;

        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_distinct_tasks_are_distinct_keys() {
        let client = FakeClient::returning(r#"{"isVague": false, "reason": null}"#);
        let evaluator = VaguenessEvaluator::new(client.clone());

        evaluator.evaluate("Task A", None, "To Do", at_hour(0)).await;
        evaluator.evaluate("Task B", None, "To Do", at_hour(0)).await;
        evaluator.evaluate("Task A", Some("details"), "To Do", at_hour(0)).await;

        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failure_falls_back_and_is_not_cached() {
        let client = FakeClient::failing();
        let evaluator = VaguenessEvaluator::new(client.clone());

        let verdict = evaluator.evaluate("Fix it", None, "To Do", at_hour(0)).await;
        assert!(verdict.is_vague); // heuristic: short title, no description
        assert_eq!(evaluator.cached_len(), 0);

        // Service recovers; the next call must hit the classifier again
        client.set_response(Ok(r#"{"isVague": false, "reason": null}"#.to_string()));
        let verdict = evaluator.evaluate("Fix it", None, "To Do", at_hour(1)).await;
        assert!(!verdict.is_vague);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unparsable_response_fails_open() {
        let client = FakeClient::returning("I am not JSON");
        let evaluator = VaguenessEvaluator::new(client.clone());

        let verdict = evaluator.evaluate("Fix it", None, "To Do", at_hour(0)).await;
        assert!(!verdict.is_vague);
        assert!(verdict.reason.is_none());
    }

    #[tokio::test]
    async fn test_unparsable_response_is_not_cached() {
        let client = FakeClient::returning("sorry, I cannot produce JSON right now");
        let evaluator = VaguenessEvaluator::new(client.clone());

        let verdict = evaluator.evaluate("Fix it", None, "To Do", at_hour(0)).await;
        assert!(!verdict.is_vague);
        assert_eq!(evaluator.cached_len(), 0);

        // Upstream recovers within TTL; the classifier must be re-asked
        // rather than serving the garbled fail-open default from cache
        client.set_response(Ok(r#"{"isVague": true, "reason": "too broad"}"#.to_string()));
        let verdict = evaluator.evaluate("Fix it", None, "To Do", at_hour(1)).await;
        assert!(verdict.is_vague);
        assert_eq!(client.call_count(), 2);
        assert_eq!(evaluator.cached_len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_expired() {
        let client = FakeClient::returning(r#"{"isVague": false, "reason": null}"#);
        let evaluator = VaguenessEvaluator::new(client.clone());

        evaluator.evaluate("Old task", None, "To Do", at_hour(0)).await;
        evaluator.evaluate("New task", None, "To Do", at_hour(20)).await;
        assert_eq!(evaluator.cached_len(), 2);

        let evicted = evaluator.sweep_expired(at_hour(30));
        assert_eq!(evicted, 1);
        assert_eq!(evaluator.cached_len(), 1);
    }
}
