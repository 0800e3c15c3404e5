use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;

#[derive(Debug, Default, Clone)]
pub struct RuntimeMetrics {
    ticks: u64,
    renders: u64,
    timers_fired: u64,
    pause_toggles: u64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    /// One tick rendered `displays` surfaces.
    pub fn record_render(&mut self, displays: usize) {
        self.renders = self.renders.saturating_add(displays as u64);
    }

    pub fn record_timer_fired(&mut self) {
        self.timers_fired = self.timers_fired.saturating_add(1);
    }

    pub fn record_pause_toggle(&mut self) {
        self.pause_toggles = self.pause_toggles.saturating_add(1);
    }

    pub fn snapshot(&self, uptime_ms: f64) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime_ms.max(0.0) as u64,
            ticks: self.ticks,
            renders: self.renders,
            timers_fired: self.timers_fired,
            pause_toggles: self.pause_toggles,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub ticks: u64,
    pub renders: u64,
    pub timers_fired: u64,
    pub pause_toggles: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "runtime_metrics", self.as_fields())
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("ticks".to_string(), json!(self.ticks));
        map.insert("renders".to_string(), json!(self.renders));
        map.insert("timers_fired".to_string(), json!(self.timers_fired));
        map.insert("pause_toggles".to_string(), json!(self.pause_toggles));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_counters_as_fields() {
        let mut metrics = RuntimeMetrics::new();
        metrics.record_tick();
        metrics.record_tick();
        metrics.record_render(3);
        metrics.record_timer_fired();
        metrics.record_pause_toggle();
        let snapshot = metrics.snapshot(1250.7);
        assert_eq!(snapshot.uptime_ms, 1250);
        assert_eq!(snapshot.renders, 3);

        let event = snapshot.to_log_event("stage::runtime.metrics");
        assert_eq!(event.message, "runtime_metrics");
        assert_eq!(event.field("ticks"), Some(&json!(2)));
        assert_eq!(event.field("pause_toggles"), Some(&json!(1)));
    }
}
