//! Injected diagnostics for the map core.
//!
//! A single [`MapDiagnostics`] resource collects fetch/event counters, the
//! rolling chunk-load timing window, and a lightweight section profiler for
//! stress runs (wire it up with the `profile` feature). Nothing here is a
//! process-wide singleton; the resource is created with the world and passed
//! to whoever records into it.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

/// Samples kept per rolling metric window.
const METRIC_WINDOW: usize = 10;

/// Rolling window over the most recent `METRIC_WINDOW` samples, in seconds.
#[derive(Debug, Default, Clone)]
pub struct MetricRing {
    samples: Vec<f32>,
}

/// Aggregates over one metric window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub latest: f32,
    pub average: f32,
    pub min: f32,
    pub max: f32,
    pub samples: usize,
}

impl MetricRing {
    pub fn record(&mut self, value: f32) {
        self.samples.push(value);
        if self.samples.len() > METRIC_WINDOW {
            self.samples.remove(0);
        }
    }

    pub fn summary(&self) -> Option<MetricSummary> {
        let latest = *self.samples.last()?;
        let sum: f32 = self.samples.iter().sum();
        let min = self.samples.iter().copied().fold(f32::INFINITY, f32::min);
        let max = self.samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        Some(MetricSummary {
            latest,
            average: sum / self.samples.len() as f32,
            min,
            max,
            samples: self.samples.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Counter snapshot exported with render snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsCounters {
    pub fetches_issued: u64,
    pub fetches_completed: u64,
    pub fetches_failed: u64,
    pub fetches_cancelled: u64,
    pub chunk_updates: u64,
    pub events_emitted: u64,
    pub resident_hexes: usize,
    pub ground_instances: usize,
}

/// Diagnostics context shared by the streamer, managers, and facade.
#[derive(Resource, Debug, Default)]
pub struct MapDiagnostics {
    pub fetches_issued: u64,
    pub fetches_completed: u64,
    pub fetches_failed: u64,
    pub fetches_cancelled: u64,
    pub chunk_updates: u64,
    pub events_emitted: u64,
    pub resident_hexes: usize,
    pub ground_instances: usize,
    chunk_load: MetricRing,
    pub profiler: SectionProfiler,
}

impl MapDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one chunk load (fetch issue to delivery), in seconds.
    pub fn record_chunk_load(&mut self, seconds: f32) {
        self.chunk_load.record(seconds);
    }

    pub fn chunk_load_summary(&self) -> Option<MetricSummary> {
        self.chunk_load.summary()
    }

    pub fn counters(&self) -> DiagnosticsCounters {
        DiagnosticsCounters {
            fetches_issued: self.fetches_issued,
            fetches_completed: self.fetches_completed,
            fetches_failed: self.fetches_failed,
            fetches_cancelled: self.fetches_cancelled,
            chunk_updates: self.chunk_updates,
            events_emitted: self.events_emitted,
            resident_hexes: self.resident_hexes,
            ground_instances: self.ground_instances,
        }
    }
}

/// Statistics for one profiled section.
#[derive(Default, Clone, Debug)]
pub struct SectionStats {
    pub total_time: Duration,
    pub call_count: u64,
    pub min_time: Option<Duration>,
    pub max_time: Option<Duration>,
}

impl SectionStats {
    pub fn avg_time(&self) -> Duration {
        if self.call_count == 0 {
            Duration::ZERO
        } else {
            self.total_time / self.call_count as u32
        }
    }
}

/// Wall-clock profiler for named sections of the frame, aggregated across
/// frames. Intended for stress runs behind the `profile` feature; recording
/// into an unused profiler costs one hash insert per section.
#[derive(Default, Debug)]
pub struct SectionProfiler {
    sections: HashMap<String, SectionStats>,
    current: Option<(String, Instant)>,
    frame_count: u64,
}

impl SectionProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing a named section. Close it with `end_section`.
    pub fn begin_section(&mut self, name: &str) {
        self.current = Some((name.to_string(), Instant::now()));
    }

    /// End the current section and fold its duration into the stats.
    pub fn end_section(&mut self) {
        if let Some((name, start)) = self.current.take() {
            let elapsed = start.elapsed();
            let stats = self.sections.entry(name).or_default();
            stats.total_time += elapsed;
            stats.call_count += 1;
            stats.min_time = Some(stats.min_time.map_or(elapsed, |m| m.min(elapsed)));
            stats.max_time = Some(stats.max_time.map_or(elapsed, |m| m.max(elapsed)));
        }
    }

    /// Time a section around a closure.
    pub fn time_section<F, R>(&mut self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.begin_section(name);
        let result = f();
        self.end_section();
        result
    }

    /// Count one frame against the aggregates.
    pub fn frame(&mut self) {
        self.frame_count += 1;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn section(&self, name: &str) -> Option<&SectionStats> {
        self.sections.get(name)
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.keys().map(|s| s.as_str()).collect()
    }

    /// Render a sorted per-section table, heaviest first.
    pub fn format_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Map profiler ({} frames) ===", self.frame_count);

        let mut sections: Vec<_> = self.sections.iter().collect();
        sections.sort_by(|a, b| b.1.total_time.cmp(&a.1.total_time));
        let total: Duration = sections.iter().map(|(_, s)| s.total_time).sum();

        let _ = writeln!(
            out,
            "{:<24} {:>10} {:>10} {:>10} {:>10}",
            "Section", "Total", "Avg", "Min", "Max"
        );
        for (name, stats) in &sections {
            let _ = writeln!(
                out,
                "{:<24} {:>10.2?} {:>10.2?} {:>10.2?} {:>10.2?}",
                name,
                stats.total_time,
                stats.avg_time(),
                stats.min_time.unwrap_or(Duration::ZERO),
                stats.max_time.unwrap_or(Duration::ZERO),
            );
        }
        let _ = writeln!(out, "{:<24} {:>10.2?}", "TOTAL", total);
        out
    }

    pub fn reset(&mut self) {
        self.sections.clear();
        self.current = None;
        self.frame_count = 0;
    }
}
