use std::time::{Duration, Instant};

/// Shared leaky bucket bounding the outbound action rate of all actors.
///
/// Refills linearly at `max` points per `window`. Consumption never drives
/// `points` below zero and refill never pushes it above `max`.
#[derive(Debug, Clone)]
pub struct RateBudget {
    points: f64,
    max: f64,
    window: Duration,
    threshold: f64,
    last_refill: Instant,
}

impl RateBudget {
    /// Starts full.
    pub fn new(max: f64, window: Duration, threshold: f64, now: Instant) -> Self {
        let max = max.max(0.0);
        Self {
            points: max,
            max,
            window,
            threshold,
            last_refill: now,
        }
    }

    pub fn with_points(mut self, points: f64) -> Self {
        self.points = points.clamp(0.0, self.max);
        self
    }

    pub fn points(&self) -> f64 {
        self.points
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn fill_ratio(&self) -> f64 {
        if self.max <= 0.0 {
            0.0
        } else {
            self.points / self.max
        }
    }

    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.last_refill = self.last_refill.max(now);
        if self.window.is_zero() {
            self.points = self.max;
            return;
        }
        let gained = self.max * elapsed.as_secs_f64() / self.window.as_secs_f64();
        self.points = (self.points + gained).min(self.max);
    }

    /// True when at least `threshold` points are available. Deducts nothing
    /// and reserves nothing: the per-action [`spend`](Self::spend) is the
    /// only charge, so a passing batch must not be billed a second time here.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.points >= self.threshold
    }

    pub fn spend(&mut self, n: f64) {
        self.points = (self.points - n.max(0.0)).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_below_threshold_without_side_effects() {
        let now = Instant::now();
        let mut budget = RateBudget::new(5.0, Duration::from_secs(6), 1.0, now).with_points(0.5);
        assert!(!budget.try_consume(now));
        assert_eq!(budget.points(), 0.5);
    }

    #[test]
    fn accepts_at_threshold() {
        let now = Instant::now();
        let mut budget = RateBudget::new(5.0, Duration::from_secs(6), 1.0, now).with_points(1.0);
        assert!(budget.try_consume(now));
        assert_eq!(budget.points(), 1.0);
    }

    #[test]
    fn spend_never_goes_negative() {
        let now = Instant::now();
        let mut budget = RateBudget::new(3.0, Duration::from_secs(6), 1.0, now);
        for _ in 0..10 {
            budget.spend(1.0);
            assert!(budget.points() >= 0.0 && budget.points() <= budget.max());
        }
        assert_eq!(budget.points(), 0.0);
        budget.spend(-4.0);
        assert_eq!(budget.points(), 0.0);
    }

    #[test]
    fn refills_linearly_and_caps_at_max() {
        let start = Instant::now();
        let mut budget =
            RateBudget::new(600.0, Duration::from_secs(6), 1.0, start).with_points(0.0);

        budget.refill(start + Duration::from_secs(1));
        assert!((budget.points() - 100.0).abs() < 1e-6);

        budget.refill(start + Duration::from_secs(60));
        assert_eq!(budget.points(), 600.0);
    }

    #[test]
    fn steady_state_throughput_is_capacity_per_window() {
        let start = Instant::now();
        let mut budget = RateBudget::new(10.0, Duration::from_secs(1), 1.0, start);
        let mut accepted = 0;
        // one attempt per millisecond for ten seconds
        for ms in 0..10_000u64 {
            if budget.try_consume(start + Duration::from_millis(ms)) {
                budget.spend(1.0);
                accepted += 1;
            }
        }
        assert!((100..=111).contains(&accepted), "accepted {}", accepted);
    }

    #[test]
    fn fill_ratio_tracks_points() {
        let now = Instant::now();
        let budget = RateBudget::new(8.0, Duration::from_secs(6), 1.0, now).with_points(2.0);
        assert_eq!(budget.fill_ratio(), 0.25);
        let empty = RateBudget::new(0.0, Duration::from_secs(6), 1.0, now);
        assert_eq!(empty.fill_ratio(), 0.0);
    }

    #[test]
    fn stale_instants_do_not_refill() {
        let start = Instant::now();
        let later = start + Duration::from_secs(2);
        let mut budget = RateBudget::new(6.0, Duration::from_secs(6), 1.0, later).with_points(0.0);
        budget.refill(start);
        assert_eq!(budget.points(), 0.0);
    }
}
