//! Rolling bandwidth stats.

use std::collections::VecDeque;
use std::time::Duration;

const BITS_PER_MBIT: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsSample {
    pub current_mbps: f32,
    pub average_mbps: f32,
    /// The missed-packet counter should be zeroed this tick.
    pub reset_missed: bool,
}

#[derive(Debug)]
pub struct StatsAggregator {
    period: Duration,
    window: VecDeque<f32>,
    capacity: usize,
    missed_reset_ticks: u32,
    ticks: u32,
    last: StatsSample,
}

impl StatsAggregator {
    pub fn new(period: Duration, capacity: usize, missed_reset_ticks: u32) -> Self {
        Self {
            period,
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            missed_reset_ticks: missed_reset_ticks.max(1),
            ticks: 0,
            last: StatsSample::default(),
        }
    }

    /// Close one period in which `bytes` were sent.
    pub fn tick(&mut self, bytes: u64) -> StatsSample {
        let secs = self.period.as_secs_f64();
        let current = if secs > 0.0 {
            (bytes as f64 * 8.0 / secs / BITS_PER_MBIT) as f32
        } else {
            0.0
        };

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(current);
        let average = self.window.iter().sum::<f32>() / self.window.len() as f32;

        self.ticks = self.ticks.wrapping_add(1);
        self.last = StatsSample {
            current_mbps: current,
            average_mbps: average,
            reset_missed: self.ticks % self.missed_reset_ticks == 0,
        };
        self.last
    }

    pub fn last(&self) -> StatsSample {
        self.last
    }
}
