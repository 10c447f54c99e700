//! Filter and FilterGroup

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use contracts::{FilterConfig, FilterStageConfig, TrackableKey};
use nalgebra::Vector3;
use tracing::debug;

use super::{build_stage, FilterStage};

/// Smoothing state of one trackable key
pub struct Filter {
    stages: Vec<Box<dyn FilterStage>>,
    position: Option<Vector3<f32>>,
    last_seen: Instant,
    samples: u64,
}

impl Filter {
    pub fn new(stages: Vec<Box<dyn FilterStage>>, now: Instant) -> Self {
        Self {
            stages,
            position: None,
            last_seen: now,
            samples: 0,
        }
    }

    fn run(&mut self, input: Option<Vector3<f32>>) {
        let mut value = input;
        for stage in &mut self.stages {
            value = stage.process(value);
        }
        if value.is_some() {
            self.position = value;
        }
    }

    /// Feed one new sample
    pub fn process(&mut self, position: Vector3<f32>, now: Instant) {
        self.samples += 1;
        self.last_seen = now;
        self.run(Some(position));
    }

    /// Advance one tick without data
    pub fn process_remaining(&mut self) {
        self.run(None);
    }

    /// True once the chain has produced a position and every stage agrees
    pub fn is_data_valid(&self) -> bool {
        self.position.is_some() && self.stages.iter().all(|s| s.is_valid())
    }

    /// Latest filtered position
    pub fn position(&self) -> Option<Vector3<f32>> {
        self.position
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Samples fed since creation
    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// All filters of one postprocessor, keyed by trackable key.
///
/// Only touched from the owning postprocessor's worker thread.
pub struct FilterGroup {
    stages: Vec<FilterStageConfig>,
    filters: HashMap<TrackableKey, Filter>,
    fed: HashSet<TrackableKey>,
    inactivity_timeout: Duration,
    cull_period: Duration,
    last_cull: Option<Instant>,
}

impl FilterGroup {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            stages: config.stages.clone(),
            filters: HashMap::new(),
            fed: HashSet::new(),
            inactivity_timeout: Duration::from_millis(config.inactivity_timeout_ms),
            cull_period: Duration::from_millis(config.cull_period_ms),
            last_cull: None,
        }
    }

    /// Filter for `key`, created with a fresh stage chain on first use
    pub fn get_filter(&mut self, key: &TrackableKey, now: Instant) -> &mut Filter {
        let stages = &self.stages;
        self.filters
            .entry(key.clone())
            .or_insert_with(|| Filter::new(stages.iter().map(build_stage).collect(), now))
    }

    pub fn get(&self, key: &str) -> Option<&Filter> {
        self.filters.get(key)
    }

    /// Feed a sample for `key` and mark it as seen this tick
    pub fn process(&mut self, key: &TrackableKey, position: Vector3<f32>, now: Instant) {
        self.get_filter(key, now).process(position, now);
        self.fed.insert(key.clone());
    }

    /// Advance every filter that got no data this tick, then start a new tick
    pub fn process_remaining(&mut self) {
        for (key, filter) in self.filters.iter_mut() {
            if !self.fed.contains(key) {
                filter.process_remaining();
            }
        }
        self.fed.clear();
    }

    /// Drop filters whose last data is older than the inactivity timeout.
    /// Returns the number removed.
    pub fn remove_unused(&mut self, now: Instant) -> usize {
        let timeout = self.inactivity_timeout;
        let before = self.filters.len();
        self.filters
            .retain(|_, f| now.saturating_duration_since(f.last_seen()) <= timeout);
        let removed = before - self.filters.len();
        if removed > 0 {
            debug!(removed, remaining = self.filters.len(), "culled inactive filters");
        }
        removed
    }

    /// `remove_unused` at most once per cull period
    pub fn maybe_cull(&mut self, now: Instant) -> usize {
        let due = self
            .last_cull
            .map_or(true, |last| now.saturating_duration_since(last) >= self.cull_period);
        if !due {
            return 0;
        }
        self.last_cull = Some(now);
        self.remove_unused(now)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TrackableKey, &Filter)> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.filters.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.filters.clear();
        self.fed.clear();
        self.last_cull = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(stages: Vec<FilterStageConfig>) -> FilterConfig {
        FilterConfig {
            stages,
            cull_period_ms: 1000,
            inactivity_timeout_ms: 500,
        }
    }

    fn p(x: f32) -> Vector3<f32> {
        Vector3::new(x, 0.0, 0.0)
    }

    #[test]
    fn test_filter_created_lazily() {
        let mut group = FilterGroup::new(&FilterConfig::default());
        assert!(group.is_empty());
        let key = TrackableKey::from("15");
        group.process(&key, p(1.0), Instant::now());
        assert!(group.contains("15"));
        assert_eq!(group.get("15").unwrap().samples(), 1);
    }

    #[test]
    fn test_validity_follows_age_gate() {
        let stages = vec![FilterStageConfig::AgeGate {
            min_samples: 2,
            max_missing: 2,
        }];
        let mut group = FilterGroup::new(&config(stages));
        let key = TrackableKey::from("2abc");
        let now = Instant::now();

        group.process(&key, p(0.0), now);
        group.process_remaining();
        assert!(!group.get("2abc").unwrap().is_data_valid());

        group.process(&key, p(0.0), now);
        group.process_remaining();
        assert!(group.get("2abc").unwrap().is_data_valid());

        group.process_remaining();
        group.process_remaining();
        assert!(!group.get("2abc").unwrap().is_data_valid());
    }

    #[test]
    fn test_remaining_only_advances_unfed_filters() {
        let stages = vec![FilterStageConfig::AgeGate {
            min_samples: 1,
            max_missing: 1,
        }];
        let mut group = FilterGroup::new(&config(stages));
        let a = TrackableKey::from("1a");
        let b = TrackableKey::from("1b");
        let now = Instant::now();
        group.process(&a, p(0.0), now);
        group.process(&b, p(0.0), now);
        group.process_remaining();

        group.process(&a, p(0.0), now);
        group.process_remaining();
        assert!(group.get("1a").unwrap().is_data_valid());
        assert!(!group.get("1b").unwrap().is_data_valid());
    }

    #[test]
    fn test_cull_removes_stale_and_recreates_fresh() {
        let mut group = FilterGroup::new(&config(vec![FilterStageConfig::Easing { factor: 0.5 }]));
        let key = TrackableKey::from("3wand");
        let start = Instant::now();

        group.process(&key, p(0.0), start);
        group.process(&key, p(1.0), start);
        assert_eq!(group.get("3wand").unwrap().position(), Some(p(0.5)));

        let later = start + Duration::from_millis(600);
        assert_eq!(group.remove_unused(later), 1);
        assert!(!group.contains("3wand"));

        // New filter, no memory of the eased state
        group.process(&key, p(4.0), later);
        assert_eq!(group.get("3wand").unwrap().position(), Some(p(4.0)));
        assert_eq!(group.get("3wand").unwrap().samples(), 1);
    }

    #[test]
    fn test_maybe_cull_respects_period() {
        let mut group = FilterGroup::new(&config(vec![]));
        let start = Instant::now();
        group.process(&TrackableKey::from("1x"), p(0.0), start);

        assert_eq!(group.maybe_cull(start), 0);
        // Stale, but the period has not elapsed since the last pass
        assert_eq!(group.maybe_cull(start + Duration::from_millis(700)), 0);
        assert_eq!(group.maybe_cull(start + Duration::from_millis(1000)), 1);
    }
}
