//! Frame admission cadence.
//!
//! The scheduler decides, per arriving frame, whether it is eligible for
//! recognition: every Nth frame is admitted, independent of processing
//! latency. This is a backpressure mechanism, not an accuracy one; accuracy
//! is recovered downstream by the aggregator requiring corroborating
//! observations. The companion policy (drop an eligible frame when a
//! recognition unit is already in flight) lives in `pipeline`, at the
//! hand-off point.

/// Every-Nth-frame admission policy.
#[derive(Clone, Copy, Debug)]
pub struct FrameScheduler {
    skip_factor: u64,
}

impl FrameScheduler {
    /// `skip_factor` of 1 admits every frame. Must be >= 1 (validated by the
    /// config layer).
    pub fn new(skip_factor: u64) -> Self {
        Self {
            skip_factor: skip_factor.max(1),
        }
    }

    /// Whether the frame with this sequence number is eligible for recognition.
    pub fn admit(&self, seq: u64) -> bool {
        seq % self.skip_factor == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_every_frame_at_factor_one() {
        let sched = FrameScheduler::new(1);
        assert!((0..100).all(|seq| sched.admit(seq)));
    }

    #[test]
    fn admits_floor_of_n_over_factor() {
        for factor in [2u64, 3, 7] {
            let sched = FrameScheduler::new(factor);
            let admitted = (1..=100).filter(|&seq| sched.admit(seq)).count() as u64;
            assert_eq!(admitted, 100 / factor, "factor {}", factor);
        }
    }

    #[test]
    fn zero_factor_clamps_to_one() {
        let sched = FrameScheduler::new(0);
        assert!(sched.admit(0));
        assert!(sched.admit(1));
    }
}
