use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

pub const DEFAULT_SERIES_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub at: DateTime<Utc>,
    pub value: f64,
}

/// Bounded, time-ordered sample sequence. Once full, every push evicts
/// exactly one sample: the oldest.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl MetricSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Appends a sample and returns the evicted one, if any.
    ///
    /// A timestamp earlier than the newest sample is clamped up to it so
    /// insertion order and time order never disagree.
    pub fn push(&mut self, at: DateTime<Utc>, value: f64) -> Option<Sample> {
        let at = match self.samples.back() {
            Some(last) if last.at > at => last.at,
            _ => at,
        };
        let evicted = if self.samples.len() >= self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(Sample { at, value });
        evicted
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for MetricSeries {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY)
    }
}

/// Named series sharing one capacity, keyed for stable iteration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSet {
    capacity: usize,
    series: BTreeMap<String, MetricSeries>,
}

impl SeriesSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, key: &str, at: DateTime<Utc>, value: f64) -> Option<Sample> {
        let capacity = self.capacity;
        self.series
            .entry(key.to_string())
            .or_insert_with(|| MetricSeries::new(capacity))
            .push(at, value)
    }

    pub fn get(&self, key: &str) -> Option<&MetricSeries> {
        self.series.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Vec<Sample>> {
        self.series
            .iter()
            .map(|(key, series)| (key.clone(), series.snapshot()))
            .collect()
    }
}

impl Default for SeriesSet {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY)
    }
}
