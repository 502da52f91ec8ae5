//! Scaling decision engine.
//!
//! Turns one (queue metrics, replica count) observation into at most one
//! replica change of exactly one step. Scale-up is evaluated first and
//! wins outright; scale-down is only considered when scale-up produced
//! nothing.
//!
//! ```text
//! if visible >= up_threshold:
//!     cooling down (elapsed <= up_cooldown)  -> no action
//!     current < max                          -> ScaleUp(current + 1)
//!     otherwise                              -> no action (ceiling)
//! if visible <= down_threshold:
//!     invisible > 0 and current <= invisible -> no action (in flight)
//!     cooling down (elapsed <= down_cooldown)-> no action
//!     current > min                          -> ScaleDown(current - 1)
//!     otherwise                              -> no action (floor)
//! ```
//!
//! Nothing here performs I/O or touches the clock; recording an applied
//! action is the caller's job, and only after the write succeeded.

use std::fmt;
use std::time::Instant;

use queuescale_core::{QueueMetrics, ScalingAction, ScalingPolicy};

use crate::clock::CooldownClock;

/// Why the engine produced its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Backlog at or above the up-threshold, cooldown elapsed, room to grow.
    BacklogHigh,
    /// Backlog at or below the down-threshold, nothing blocking.
    BacklogLow,
    ScaleUpCoolingDown,
    AtCeiling,
    /// At least as many messages in flight as replicas.
    InFlight,
    ScaleDownCoolingDown,
    AtFloor,
    /// Backlog between the two thresholds.
    WithinBand,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::BacklogHigh => "backlog above scale-up threshold",
            Reason::BacklogLow => "backlog below scale-down threshold",
            Reason::ScaleUpCoolingDown => "waiting for scale up cooldown",
            Reason::AtCeiling => "max replicas reached",
            Reason::InFlight => "not scaling down because messages are still in flight",
            Reason::ScaleDownCoolingDown => "waiting for scale down cooldown",
            Reason::AtFloor => "min replicas reached",
            Reason::WithinBand => "backlog within target band",
        };
        f.write_str(s)
    }
}

/// An action together with the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: ScalingAction,
    pub reason: Reason,
}

impl Decision {
    fn new(action: ScalingAction, reason: Reason) -> Self {
        Self { action, reason }
    }

    fn hold(reason: Reason) -> Self {
        Self::new(ScalingAction::NoAction, reason)
    }
}

/// Decide the scaling action for one cycle.
pub fn decide(
    metrics: &QueueMetrics,
    current_replicas: u32,
    policy: &ScalingPolicy,
    clock: &CooldownClock,
    now: Instant,
) -> ScalingAction {
    evaluate(metrics, current_replicas, policy, clock, now).action
}

/// Same as [`decide`], but also reports which rule fired.
pub fn evaluate(
    metrics: &QueueMetrics,
    current_replicas: u32,
    policy: &ScalingPolicy,
    clock: &CooldownClock,
    now: Instant,
) -> Decision {
    // A held scale-up falls through to scale-down; with validated
    // thresholds the down branch cannot match the same depth.
    let mut held = None;

    if metrics.visible >= policy.scale_up_threshold {
        if clock.since_scale_up(now) <= policy.scale_up_cooldown {
            held = Some(Reason::ScaleUpCoolingDown);
        } else if current_replicas < policy.max_replicas {
            return Decision::new(
                ScalingAction::ScaleUp {
                    to: current_replicas + 1,
                },
                Reason::BacklogHigh,
            );
        } else {
            held = Some(Reason::AtCeiling);
        }
    }

    if metrics.visible <= policy.scale_down_threshold {
        if metrics.invisible > 0 && u64::from(current_replicas) <= metrics.invisible {
            return Decision::hold(Reason::InFlight);
        }
        if clock.since_scale_down(now) <= policy.scale_down_cooldown {
            return Decision::hold(Reason::ScaleDownCoolingDown);
        }
        if current_replicas > policy.min_replicas {
            return Decision::new(
                ScalingAction::ScaleDown {
                    to: current_replicas - 1,
                },
                Reason::BacklogLow,
            );
        }
        return Decision::hold(Reason::AtFloor);
    }

    Decision::hold(held.unwrap_or(Reason::WithinBand))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy() -> ScalingPolicy {
        ScalingPolicy {
            scale_up_threshold: 10,
            scale_down_threshold: 0,
            scale_up_cooldown: Duration::from_secs(60),
            scale_down_cooldown: Duration::from_secs(60),
            min_replicas: 0,
            max_replicas: 5,
            poll_period: Duration::from_secs(5),
        }
    }

    /// A clock whose cooldowns elapsed long ago, and the matching `now`.
    fn cooled() -> (CooldownClock, Instant) {
        let t0 = Instant::now();
        (CooldownClock::new(t0), t0 + Duration::from_secs(3600))
    }

    #[test]
    fn scales_up_one_step_above_threshold() {
        let (clock, now) = cooled();
        let action = decide(&QueueMetrics::new(15, 0), 2, &policy(), &clock, now);
        assert_eq!(action, ScalingAction::ScaleUp { to: 3 });
    }

    #[test]
    fn threshold_is_inclusive_for_scale_up() {
        let (clock, now) = cooled();
        let action = decide(&QueueMetrics::new(10, 0), 2, &policy(), &clock, now);
        assert_eq!(action, ScalingAction::ScaleUp { to: 3 });
    }

    #[test]
    fn no_scale_up_at_ceiling() {
        let (clock, now) = cooled();
        let decision = evaluate(&QueueMetrics::new(20, 0), 5, &policy(), &clock, now);
        assert_eq!(decision.action, ScalingAction::NoAction);
        assert_eq!(decision.reason, Reason::AtCeiling);
    }

    #[test]
    fn replicas_above_ceiling_are_not_scaled_up() {
        let (clock, now) = cooled();
        let action = decide(&QueueMetrics::new(20, 0), 7, &policy(), &clock, now);
        assert_eq!(action, ScalingAction::NoAction);
    }

    #[test]
    fn scale_up_waits_for_cooldown() {
        let t0 = Instant::now();
        let clock = CooldownClock::new(t0);
        let decision = evaluate(
            &QueueMetrics::new(50, 0),
            1,
            &policy(),
            &clock,
            t0 + Duration::from_secs(30),
        );
        assert_eq!(decision.reason, Reason::ScaleUpCoolingDown);
        assert!(decision.action.is_no_action());
    }

    #[test]
    fn cooldown_boundary_is_still_cooling() {
        let t0 = Instant::now();
        let clock = CooldownClock::new(t0);
        let at_boundary = t0 + Duration::from_secs(60);
        assert_eq!(
            decide(&QueueMetrics::new(50, 0), 1, &policy(), &clock, at_boundary),
            ScalingAction::NoAction
        );
        assert_eq!(
            decide(
                &QueueMetrics::new(50, 0),
                1,
                &policy(),
                &clock,
                at_boundary + Duration::from_millis(1)
            ),
            ScalingAction::ScaleUp { to: 2 }
        );
    }

    #[test]
    fn scales_down_to_zero_when_idle() {
        let (clock, now) = cooled();
        let action = decide(&QueueMetrics::new(0, 0), 1, &policy(), &clock, now);
        assert_eq!(action, ScalingAction::ScaleDown { to: 0 });
    }

    #[test]
    fn in_flight_messages_block_scale_down() {
        let (clock, now) = cooled();
        let decision = evaluate(&QueueMetrics::new(0, 3), 3, &policy(), &clock, now);
        assert_eq!(decision.action, ScalingAction::NoAction);
        assert_eq!(decision.reason, Reason::InFlight);
    }

    #[test]
    fn fewer_in_flight_than_replicas_allows_scale_down() {
        let (clock, now) = cooled();
        let action = decide(&QueueMetrics::new(0, 2), 3, &policy(), &clock, now);
        assert_eq!(action, ScalingAction::ScaleDown { to: 2 });
    }

    #[test]
    fn in_flight_protection_applies_at_floor() {
        let (clock, now) = cooled();
        let mut p = policy();
        p.min_replicas = 1;
        let decision = evaluate(&QueueMetrics::new(0, 4), 1, &p, &clock, now);
        assert_eq!(decision.reason, Reason::InFlight);
    }

    #[test]
    fn no_scale_down_at_floor() {
        let (clock, now) = cooled();
        let mut p = policy();
        p.min_replicas = 2;
        let decision = evaluate(&QueueMetrics::new(0, 0), 2, &p, &clock, now);
        assert_eq!(decision.action, ScalingAction::NoAction);
        assert_eq!(decision.reason, Reason::AtFloor);
    }

    #[test]
    fn scale_down_waits_for_cooldown() {
        let t0 = Instant::now();
        let mut clock = CooldownClock::new(t0);
        clock.record_scale_down(t0 + Duration::from_secs(100));
        let decision = evaluate(
            &QueueMetrics::new(0, 0),
            3,
            &policy(),
            &clock,
            t0 + Duration::from_secs(130),
        );
        assert_eq!(decision.reason, Reason::ScaleDownCoolingDown);
    }

    #[test]
    fn scale_up_cooldown_does_not_gate_scale_down() {
        let t0 = Instant::now();
        let mut clock = CooldownClock::new(t0);
        let now = t0 + Duration::from_secs(120);
        clock.record_scale_up(now - Duration::from_secs(1));
        let action = decide(&QueueMetrics::new(0, 0), 3, &policy(), &clock, now);
        assert_eq!(action, ScalingAction::ScaleDown { to: 2 });
    }

    #[test]
    fn within_band_holds() {
        let (clock, now) = cooled();
        let mut p = policy();
        p.scale_down_threshold = 2;
        let decision = evaluate(&QueueMetrics::new(5, 0), 3, &p, &clock, now);
        assert_eq!(decision, Decision::hold(Reason::WithinBand));
    }

    #[test]
    fn no_action_is_deterministic() {
        let (clock, now) = cooled();
        let metrics = QueueMetrics::new(20, 0);
        let first = evaluate(&metrics, 5, &policy(), &clock, now);
        for _ in 0..10 {
            assert_eq!(evaluate(&metrics, 5, &policy(), &clock, now), first);
        }
    }

    #[test]
    fn scale_up_and_down_properties_over_all_replica_counts() {
        let (clock, now) = cooled();
        let mut p = policy();
        p.min_replicas = 1;
        p.scale_down_threshold = 2;

        for current in p.min_replicas..=p.max_replicas {
            let up = decide(&QueueMetrics::new(p.scale_up_threshold, 0), current, &p, &clock, now);
            if current < p.max_replicas {
                assert_eq!(up, ScalingAction::ScaleUp { to: current + 1 });
            } else {
                assert_eq!(up, ScalingAction::NoAction);
            }

            let down = decide(
                &QueueMetrics::new(p.scale_down_threshold, 0),
                current,
                &p,
                &clock,
                now,
            );
            if current > p.min_replicas {
                assert_eq!(down, ScalingAction::ScaleDown { to: current - 1 });
            } else {
                assert_eq!(down, ScalingAction::NoAction);
            }
        }
    }

    #[test]
    fn in_flight_property_over_grid() {
        let (clock, now) = cooled();
        for invisible in 1..=6u64 {
            for current in 0..=invisible as u32 {
                for visible in 0..=1 {
                    let action = decide(
                        &QueueMetrics::new(visible, invisible),
                        current,
                        &policy(),
                        &clock,
                        now,
                    );
                    assert!(
                        !matches!(action, ScalingAction::ScaleDown { .. }),
                        "scaled down with {current} replicas and {invisible} in flight"
                    );
                }
            }
        }
    }

    #[test]
    fn misconfigured_overlap_prefers_scale_up() {
        let (clock, now) = cooled();
        let mut p = policy();
        p.scale_down_threshold = 20;
        let action = decide(&QueueMetrics::new(15, 0), 2, &p, &clock, now);
        assert_eq!(action, ScalingAction::ScaleUp { to: 3 });
    }
}
