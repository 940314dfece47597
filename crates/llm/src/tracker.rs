use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::info;

const DEFAULT_CAPACITY: usize = 1000;
const HIGH_COST_THRESHOLD_USD: f64 = 0.01;

#[derive(Clone, Debug, PartialEq)]
pub struct UsageEntry {
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub duration_ms: i64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelUsage {
    pub calls: u64,
    pub cost_usd: f64,
    pub tokens: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsageSummary {
    pub total_calls: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_usd: f64,
    pub avg_duration_ms: f64,
    pub by_model: BTreeMap<String, ModelUsage>,
}

/// Bounded in-process usage accounting for reasoning calls. Advisory
/// observability only; the authoritative spend record is the run table.
#[derive(Default)]
pub struct UsageTracker {
    entries: Mutex<Vec<UsageEntry>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed call. Never blocks the caller's result and
    /// never fails; a poisoned lock is recovered.
    pub fn record(&self, entry: UsageEntry) {
        if entry.cost_usd > HIGH_COST_THRESHOLD_USD {
            info!(
                model = %entry.model,
                tokens = entry.input_tokens + entry.output_tokens,
                cost_usd = format!("{:.6}", entry.cost_usd),
                duration_ms = entry.duration_ms,
                "high-cost reasoning call"
            );
        }

        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push(entry);
        if entries.len() > DEFAULT_CAPACITY {
            let excess = DEFAULT_CAPACITY * 3 / 10;
            entries.drain(0..excess);
        }
    }

    pub fn summary(&self) -> UsageSummary {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut summary = UsageSummary::default();
        let mut total_duration_ms = 0i64;

        for entry in entries.iter() {
            summary.total_calls += 1;
            summary.total_input_tokens += u64::from(entry.input_tokens);
            summary.total_output_tokens += u64::from(entry.output_tokens);
            summary.total_cost_usd += entry.cost_usd;
            total_duration_ms += entry.duration_ms;

            let per_model = summary.by_model.entry(entry.model.clone()).or_default();
            per_model.calls += 1;
            per_model.cost_usd += entry.cost_usd;
            per_model.tokens += u64::from(entry.input_tokens) + u64::from(entry.output_tokens);
        }

        if summary.total_calls > 0 {
            summary.avg_duration_ms = total_duration_ms as f64 / summary.total_calls as f64;
        }

        summary
    }

    pub fn reset(&self) {
        match self.entries.lock() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{UsageEntry, UsageTracker};

    fn entry(model: &str, cost_usd: f64, duration_ms: i64) -> UsageEntry {
        UsageEntry {
            model: model.to_string(),
            input_tokens: 100,
            output_tokens: 50,
            cost_usd,
            duration_ms,
        }
    }

    #[test]
    fn summarizes_per_model_usage() {
        let tracker = UsageTracker::new();
        tracker.record(entry("gpt-4o-mini", 0.001, 200));
        tracker.record(entry("gpt-4o-mini", 0.002, 400));
        tracker.record(entry("claude-sonnet", 0.02, 600));

        let summary = tracker.summary();
        assert_eq!(summary.total_calls, 3);
        assert_eq!(summary.total_input_tokens, 300);
        assert_eq!(summary.total_output_tokens, 150);
        assert!((summary.total_cost_usd - 0.023).abs() < 1e-9);
        assert!((summary.avg_duration_ms - 400.0).abs() < 1e-9);
        assert_eq!(summary.by_model["gpt-4o-mini"].calls, 2);
        assert_eq!(summary.by_model["claude-sonnet"].tokens, 150);
    }

    #[test]
    fn stays_bounded_under_sustained_recording() {
        let tracker = UsageTracker::new();
        for _ in 0..2500 {
            tracker.record(entry("gpt-4o-mini", 0.0001, 10));
        }
        assert!(tracker.summary().total_calls <= 1000);
    }

    #[test]
    fn reset_clears_the_session() {
        let tracker = UsageTracker::new();
        tracker.record(entry("gpt-4o-mini", 0.001, 100));
        tracker.reset();
        assert_eq!(tracker.summary().total_calls, 0);
    }
}
