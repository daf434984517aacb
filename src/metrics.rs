//! Process-wide counters rendered in the Prometheus text format.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::AnalysisError;
use crate::pipeline::Analysis;

/// Fixed latency bucket upper bounds in milliseconds.
const LATENCY_BUCKETS_MS: [u64; 11] = [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000];

const OUTCOMES: [&str; 5] = ["ok", "validation", "envelope", "classification", "history"];

pub struct Metrics {
    requests_total: AtomicU64,
    // index aligned with OUTCOMES
    outcomes: [AtomicU64; 5],
    hist_counts: Vec<AtomicU64>,
    hist_sum_ms: AtomicU64,
    hist_count: AtomicU64,
    process_start_epoch: f64,
    process_start_instant: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let start_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            requests_total: AtomicU64::new(0),
            outcomes: Default::default(),
            hist_counts: LATENCY_BUCKETS_MS.iter().map(|_| AtomicU64::new(0)).collect(),
            hist_sum_ms: AtomicU64::new(0),
            hist_count: AtomicU64::new(0),
            process_start_epoch: start_time.as_secs_f64(),
            process_start_instant: Instant::now(),
        }
    }

    pub fn record(&self, result: &Result<Analysis, AnalysisError>, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let outcome = match result {
            Ok(_) => "ok",
            Err(err) => err.stage(),
        };
        if let Some(idx) = OUTCOMES.iter().position(|o| *o == outcome) {
            self.outcomes[idx].fetch_add(1, Ordering::Relaxed);
        }
        self.hist_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.hist_count.fetch_add(1, Ordering::Relaxed);
        // find first bucket >= value
        for (idx, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
            if latency_ms <= *ub {
                self.hist_counts[idx].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn outcome_total(&self, outcome: &str) -> u64 {
        OUTCOMES
            .iter()
            .position(|o| *o == outcome)
            .map(|idx| self.outcomes[idx].load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn render(&self) -> String {
        let mut buf = String::new();
        writeln!(
            &mut buf,
            "# HELP sentio_requests_total Total analysis invocations\n# TYPE sentio_requests_total counter"
        )
        .ok();
        writeln!(&mut buf, "sentio_requests_total {}", self.requests_total()).ok();

        writeln!(
            &mut buf,
            "# HELP sentio_outcomes_total Invocations by outcome\n# TYPE sentio_outcomes_total counter"
        )
        .ok();
        for outcome in OUTCOMES {
            writeln!(
                &mut buf,
                "sentio_outcomes_total{{outcome=\"{}\"}} {}",
                outcome,
                self.outcome_total(outcome)
            )
            .ok();
        }

        writeln!(
            &mut buf,
            "# HELP sentio_request_latency_ms Invocation latency histogram milliseconds\n# TYPE sentio_request_latency_ms histogram"
        )
        .ok();
        let count = self.hist_count.load(Ordering::Relaxed);
        let mut cumulative: u64 = 0;
        for (i, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
            cumulative += self.hist_counts[i].load(Ordering::Relaxed);
            writeln!(
                &mut buf,
                "sentio_request_latency_ms_bucket{{le=\"{}\"}} {}",
                ub, cumulative
            )
            .ok();
        }
        writeln!(
            &mut buf,
            "sentio_request_latency_ms_bucket{{le=\"+Inf\"}} {}",
            count
        )
        .ok();
        writeln!(
            &mut buf,
            "sentio_request_latency_ms_sum {}",
            self.hist_sum_ms.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(&mut buf, "sentio_request_latency_ms_count {}", count).ok();

        writeln!(
            &mut buf,
            "# HELP sentio_build_info Build information\n# TYPE sentio_build_info gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "sentio_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP sentio_process_start_time_seconds Process start time (Unix epoch seconds)\n# TYPE sentio_process_start_time_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "sentio_process_start_time_seconds {}",
            self.process_start_epoch
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP sentio_process_uptime_seconds Process uptime seconds\n# TYPE sentio_process_uptime_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "sentio_process_uptime_seconds {}",
            self.process_start_instant.elapsed().as_secs_f64()
        )
        .ok();
        buf
    }
}
