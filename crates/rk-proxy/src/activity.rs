use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Last time a tunnel moved bytes, shared between the tunnel and the pool.
#[derive(Debug)]
pub struct Activity {
    epoch: Instant,
    // nanos since `epoch`
    last: AtomicU64,
}

impl Activity {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last: AtomicU64::new(0),
        }
    }

    pub fn touch(&self) {
        self.touch_at(Instant::now())
    }

    pub fn touch_at(&self, at: Instant) {
        let nanos = at.saturating_duration_since(self.epoch).as_nanos() as u64;
        self.last.fetch_max(nanos, Ordering::Relaxed);
    }

    pub fn last_active(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.last.load(Ordering::Relaxed))
    }

    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active())
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_touch_moves_forward() {
        let activity = Activity::new();
        let start = activity.last_active();
        let later = start + Duration::from_millis(20);
        activity.touch_at(later);
        assert_eq!(activity.last_active(), later);
        // an older timestamp never rewinds it
        activity.touch_at(start);
        assert_eq!(activity.last_active(), later);
        assert_eq!(activity.idle(later + Duration::from_secs(1)), Duration::from_secs(1));
        assert_eq!(activity.idle(start), Duration::ZERO);
    }

    #[test]
    fn test_touch_keeps_exact_instant() {
        let activity = Activity::new();
        let at = Instant::now() + Duration::new(0, 1_234_567);
        activity.touch_at(at);
        assert_eq!(activity.last_active(), at);
        let cutoff = Duration::from_millis(500);
        assert_eq!(activity.idle(at + cutoff), cutoff);
    }
}
