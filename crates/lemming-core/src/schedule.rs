//! The firing predicate and the deterministic same-tick ordering.
//!
//! Both are pure functions of `(period, phase_offset, id)`. Nothing here
//! touches the clock or any store.

use std::cmp::Ordering;

use lemming_contracts::agent::{AgentDescriptor, Schedule};

/// True when an agent with `schedule` fires at `tick`.
///
/// `tick mod N == phase_offset mod N` with `N = max(run_every_n_ticks, 1)`.
pub fn should_run(schedule: &Schedule, tick: u64) -> bool {
    tick % schedule.period() == schedule.phase()
}

/// A rational in `[0, 1)` that orders agents firing on the same tick.
///
/// Compared exactly by cross-multiplication, so `1/2` and `2/4` are equal.
#[derive(Debug, Clone, Copy)]
pub struct FirePoint {
    numerator: u64,
    denominator: u64,
}

impl FirePoint {
    /// `((-phase_offset) mod N) / N`.
    pub fn of(schedule: &Schedule) -> Self {
        let n = schedule.period();
        // (-offset) mod N, computed without negating an i64.
        let numerator = (n - schedule.phase()) % n;
        Self { numerator, denominator: n }
    }

    pub fn numerator(&self) -> u64 {
        self.numerator
    }

    pub fn denominator(&self) -> u64 {
        self.denominator
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl Ord for FirePoint {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.numerator as u128 * other.denominator as u128;
        let rhs = other.numerator as u128 * self.denominator as u128;
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for FirePoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FirePoint {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FirePoint {}

/// Shorthand for `FirePoint::of`.
pub fn fire_point(schedule: &Schedule) -> FirePoint {
    FirePoint::of(schedule)
}

/// The agents that fire at `tick`, in the order their turns must run.
///
/// Ascending fire point, ties broken by ascending agent id.
pub fn firing_order(agents: &[AgentDescriptor], tick: u64) -> Vec<&AgentDescriptor> {
    let mut firing: Vec<&AgentDescriptor> =
        agents.iter().filter(|a| should_run(&a.schedule, tick)).collect();

    firing.sort_by(|a, b| {
        fire_point(&a.schedule)
            .cmp(&fire_point(&b.schedule))
            .then_with(|| a.id.cmp(&b.id))
    });
    firing
}
