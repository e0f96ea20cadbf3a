//! Reconciliation loop primitives.
//!
//! This library provides helpers for implementing reconciliation loops
//! that converge observed state to declared state. Key concepts:
//!
//! - **Declared state**: What the group should look like (from its group spec).
//! - **Observed state**: What the instance plugin reports.
//! - **Convergence**: Repeatedly acting on the difference until none is left.
//!
//! # Invariants
//!
//! - All operations are idempotent
//! - Decisions are deterministic given the same inputs
//! - Cancellation is sticky: once stopped, every waiter observes it

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::watch;

/// A spec hash for deterministic comparison.
///
/// Used to detect when instance configuration has changed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecHash(String);

impl SpecHash {
    /// Compute a spec hash from canonical JSON.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let canonical = canonical_json(json);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&result[..16]))) // First 16 bytes (128 bits)
    }

    /// Get the hash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SpecHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("\"{}\":{}", escape_json_string(k), canonical_json(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        serde_json::Value::Array(arr) => {
            let inner: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        serde_json::Value::String(s) => format!("\"{}\"", escape_json_string(s)),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Split instances into those matching the desired spec hash and the rest.
///
/// Instances without a recorded hash are never desired.
pub fn classify_instances<I, F>(
    instances: I,
    desired_spec_hash: &SpecHash,
    get_spec_hash: F,
) -> (Vec<I::Item>, Vec<I::Item>)
where
    I: IntoIterator,
    F: Fn(&I::Item) -> Option<&str>,
{
    let mut desired = Vec::new();
    let mut undesired = Vec::new();

    for instance in instances {
        if get_spec_hash(&instance) == Some(desired_spec_hash.as_str()) {
            desired.push(instance);
        } else {
            undesired.push(instance);
        }
    }

    (desired, undesired)
}

/// One-shot broadcast cancellation.
///
/// Cloning shares the signal. `stop` may be called any number of times;
/// waiters that arrive after the signal fired return immediately.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    /// Create a signal that has not fired.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once the signal has fired.
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal fires.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Default interval between reconciliation passes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_spec_hash_deterministic() {
        let json1 = serde_json::json!({"b": 2, "a": 1});
        let json2 = serde_json::json!({"a": 1, "b": 2});

        let hash1 = SpecHash::from_json(&json1);
        let hash2 = SpecHash::from_json(&json2);

        assert_eq!(hash1, hash2);
        assert!(hash1.as_str().starts_with("sha256:"));
    }

    #[test]
    fn test_spec_hash_detects_nested_change() {
        let a = serde_json::json!({"Instance": {"Properties": {"OpaqueValue": "data"}}});
        let b = serde_json::json!({"Instance": {"Properties": {"OpaqueValue": "data2"}}});

        assert_ne!(SpecHash::from_json(&a), SpecHash::from_json(&b));
    }

    #[test]
    fn test_classify_instances() {
        let desired = SpecHash("sha256:abc".to_string());
        let instances = vec![
            ("i1", Some("sha256:abc")),
            ("i2", Some("sha256:old")),
            ("i3", Some("sha256:abc")),
            ("i4", None),
        ];

        let (matching, old) = classify_instances(instances, &desired, |(_, h)| *h);

        assert_eq!(matching.len(), 2);
        assert_eq!(old.len(), 2);
        assert_eq!(old[0].0, "i2");
        assert_eq!(old[1].0, "i4");
    }

    #[tokio::test]
    async fn test_stop_signal_late_waiter() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());

        signal.stop();
        signal.stop();

        // A waiter arriving after the fact must not block.
        signal.clone().stopped().await;
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_stop_signal_wakes_waiter() {
        let signal = StopSignal::new();
        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.stopped().await }
        });

        tokio::task::yield_now().await;
        signal.stop();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    proptest! {
        #[test]
        fn prop_spec_hash_ignores_key_order(a in any::<i64>(), b in ".{0,16}") {
            let forward = serde_json::json!({"a": a, "b": b});
            let mut map = serde_json::Map::new();
            map.insert("b".to_string(), serde_json::json!(b));
            map.insert("a".to_string(), serde_json::json!(a));
            let reversed = serde_json::Value::Object(map);

            prop_assert_eq!(SpecHash::from_json(&forward), SpecHash::from_json(&reversed));
        }
    }
}
