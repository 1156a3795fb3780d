//! Per-component render statistics.

use std::collections::HashMap;
use std::time::Duration;

use crate::model::{ComponentPerformance, RenderSample};

#[derive(Debug, Default)]
pub(crate) struct PerformanceData {
    components: HashMap<String, ComponentPerformance>,
}

impl PerformanceData {
    pub fn record(&mut self, sample: &RenderSample) {
        let entry = self
            .components
            .entry(sample.component_id.clone())
            .or_insert_with(|| ComponentPerformance {
                component_id: sample.component_id.clone(),
                component_name: sample.component_name.clone(),
                render_count: 0,
                total_render_time: Duration::ZERO,
                min_render_time: sample.duration,
                max_render_time: sample.duration,
                avg_render_time: Duration::ZERO,
                last_update: sample.timestamp,
            });

        entry.render_count += 1;
        entry.total_render_time += sample.duration;
        entry.min_render_time = entry.min_render_time.min(sample.duration);
        entry.max_render_time = entry.max_render_time.max(sample.duration);
        let count = u32::try_from(entry.render_count).unwrap_or(u32::MAX);
        entry.avg_render_time = entry.total_render_time / count.max(1);
        entry.last_update = sample.timestamp;
        if !sample.component_name.is_empty() {
            entry.component_name = sample.component_name.clone();
        }
    }

    /// All entries, slowest total first.
    pub fn snapshot(&self) -> Vec<ComponentPerformance> {
        let mut all: Vec<_> = self.components.values().cloned().collect();
        all.sort_by(|a, b| {
            b.total_render_time
                .cmp(&a.total_render_time)
                .then_with(|| a.component_id.cmp(&b.component_id))
        });
        all
    }

    pub fn get(&self, component_id: &str) -> Option<&ComponentPerformance> {
        self.components.get(component_id)
    }

    pub fn remove(&mut self, component_id: &str) {
        self.components.remove(component_id);
    }

    pub fn replace(&mut self, entries: Vec<ComponentPerformance>) {
        self.components = entries
            .into_iter()
            .map(|e| (e.component_id.clone(), e))
            .collect();
    }

    pub fn clear(&mut self) {
        self.components.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_samples_into_min_max_avg() {
        let mut perf = PerformanceData::default();
        for ms in [4, 2, 6] {
            perf.record(&RenderSample::new(
                "list",
                "List",
                Duration::from_millis(ms),
            ));
        }

        let entry = perf.get("list").unwrap();
        assert_eq!(entry.render_count, 3);
        assert_eq!(entry.min_render_time, Duration::from_millis(2));
        assert_eq!(entry.max_render_time, Duration::from_millis(6));
        assert_eq!(entry.avg_render_time, Duration::from_millis(4));
        assert_eq!(entry.total_render_time, Duration::from_millis(12));
    }
}
