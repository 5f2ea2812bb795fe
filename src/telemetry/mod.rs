//! Telemetry for DeskPilot
//!
//! Collects cache, retrieval, task and feedback-loop events and prints a
//! session summary.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    CacheLookup {
        hit: bool,
        timestamp: Instant,
    },
    RetrievalCompleted {
        /// Hits across both prefetch lists before fusion
        candidates: usize,
        returned: usize,
        timestamp: Instant,
    },
    TaskCompleted {
        task: String,
        duration_ms: u64,
        success: bool,
        timestamp: Instant,
    },
    FeedbackRetry {
        task: String,
        attempt: u32,
        timestamp: Instant,
    },
    FeedbackFallback {
        task: String,
        timestamp: Instant,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default)]
pub struct TelemetryStats {
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub retrievals: usize,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    pub feedback_retries: usize,
    pub feedback_fallbacks: usize,
}

/// Telemetry collector
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

// A panic while holding the lock leaves counters usable; keep going.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        {
            let mut stats = lock(&self.stats);
            match &event {
                TelemetryEvent::CacheLookup { hit: true, .. } => stats.cache_hits += 1,
                TelemetryEvent::CacheLookup { hit: false, .. } => stats.cache_misses += 1,
                TelemetryEvent::RetrievalCompleted { .. } => stats.retrievals += 1,
                TelemetryEvent::TaskCompleted { success: true, .. } => stats.tasks_succeeded += 1,
                TelemetryEvent::TaskCompleted { success: false, .. } => stats.tasks_failed += 1,
                TelemetryEvent::FeedbackRetry { .. } => stats.feedback_retries += 1,
                TelemetryEvent::FeedbackFallback { .. } => stats.feedback_fallbacks += 1,
            }
        }

        lock(&self.events).push(event);
    }

    pub fn cache_lookup(&self, hit: bool) {
        self.record(TelemetryEvent::CacheLookup {
            hit,
            timestamp: Instant::now(),
        });
    }

    pub fn retrieval(&self, candidates: usize, returned: usize) {
        self.record(TelemetryEvent::RetrievalCompleted {
            candidates,
            returned,
            timestamp: Instant::now(),
        });
    }

    pub fn task_completed(&self, task: &str, duration_ms: u64, success: bool) {
        self.record(TelemetryEvent::TaskCompleted {
            task: task.to_string(),
            duration_ms,
            success,
            timestamp: Instant::now(),
        });
    }

    pub fn feedback_retry(&self, task: &str, attempt: u32) {
        self.record(TelemetryEvent::FeedbackRetry {
            task: task.to_string(),
            attempt,
            timestamp: Instant::now(),
        });
    }

    pub fn feedback_fallback(&self, task: &str) {
        self.record(TelemetryEvent::FeedbackFallback {
            task: task.to_string(),
            timestamp: Instant::now(),
        });
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        lock(&self.stats).clone()
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = lock(&self.events);
        let start = events.len().saturating_sub(n);
        events[start..].to_vec()
    }

    /// Share of cache lookups that hit (0 when nothing was looked up)
    pub fn cache_hit_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        let total = stats.cache_hits + stats.cache_misses;
        if total == 0 {
            0.0
        } else {
            stats.cache_hits as f64 / total as f64
        }
    }

    /// Calculate task success rate
    pub fn task_success_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        let total = stats.tasks_succeeded + stats.tasks_failed;
        if total == 0 {
            1.0
        } else {
            stats.tasks_succeeded as f64 / total as f64
        }
    }

    /// Print the session summary
    pub fn display_summary(&self) {
        let stats = self.get_stats();

        println!("\n📊 Session Summary");
        println!("─────────────────────────────────────");
        println!("Duration:          {:?}", self.elapsed());
        println!(
            "Cache hit rate:    {:.1}% ({} lookups)",
            self.cache_hit_rate() * 100.0,
            stats.cache_hits + stats.cache_misses
        );
        println!("Retrievals:        {}", stats.retrievals);
        println!("Task success rate: {:.1}%", self.task_success_rate() * 100.0);
        println!("Feedback retries:  {}", stats.feedback_retries);
        println!("Fallbacks:         {}", stats.feedback_fallbacks);
        println!();
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}
