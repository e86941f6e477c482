mod common;

use common::strategies::*;
use gatewatch_core::probe::{security_score, HeaderFindings};
use gatewatch_core::models::Scheme;
use gatewatch_core::resilience::BackoffTracker;
use gatewatch_core::usage::compute_delta;
use proptest::prelude::*;
use std::time::Duration;
use tokio::time::Instant;

proptest! {
    /// Property: a delta is never negative
    #[test]
    fn delta_is_never_negative(
        previous in previous_reading_strategy(),
        current in used_bytes_strategy(),
    ) {
        let delta = compute_delta(previous.unwrap_or(0), current);
        prop_assert!(delta >= 0);
    }

    /// Property: growth is reported exactly, resets report zero
    #[test]
    fn delta_matches_growth_or_zero(
        previous in used_bytes_strategy(),
        current in used_bytes_strategy(),
    ) {
        let delta = compute_delta(previous, current);
        if current >= previous {
            prop_assert_eq!(delta, current - previous);
        } else {
            prop_assert_eq!(delta, 0);
        }
    }

    /// Property: summed deltas equal the growth observed between resets
    #[test]
    fn summed_deltas_equal_positive_steps(readings in reading_sequence_strategy()) {
        let mut previous = 0i64;
        let mut summed = 0i64;
        let mut positive_steps = 0i64;
        for current in readings {
            summed += compute_delta(previous, current);
            positive_steps += (current - previous).max(0);
            previous = current;
        }
        prop_assert_eq!(summed, positive_steps);
    }

    /// Property: backoff delays stay within [floor, cap] and never shrink while failing
    #[test]
    fn backoff_delays_are_bounded_and_monotonic(
        (floor, cap) in backoff_bounds_strategy(),
        failures in 1usize..40,
    ) {
        let tracker = BackoffTracker::new(Duration::from_secs(floor), Duration::from_secs(cap));
        let now = Instant::now();
        let mut last = Duration::ZERO;
        for _ in 0..failures {
            let delay = tracker.record_failure_at("srv", now);
            prop_assert!(delay >= Duration::from_secs(floor));
            prop_assert!(delay <= Duration::from_secs(cap));
            prop_assert!(delay >= last);
            last = delay;
        }
        prop_assert!(tracker.should_skip_at("srv", now));
        prop_assert!(!tracker.should_skip_at("srv", now + last));
    }

    /// Property: success always clears the backoff entry
    #[test]
    fn backoff_success_resets(failures in 1usize..10) {
        let tracker = BackoffTracker::new(Duration::from_secs(30), Duration::from_secs(1800));
        let now = Instant::now();
        for _ in 0..failures {
            tracker.record_failure_at("srv", now);
        }
        tracker.record_success("srv");
        prop_assert!(tracker.is_empty());
        prop_assert_eq!(tracker.record_failure_at("srv", now), Duration::from_secs(30));
    }

    /// Property: the security score stays within 0..=100
    #[test]
    fn security_score_is_bounded(
        https in any::<bool>(),
        flags in prop::collection::vec(any::<bool>(), 7),
    ) {
        let findings = HeaderFindings {
            has_hsts: flags[0],
            hsts_max_age: None,
            has_secure_cookies: flags[1],
            has_http_only_cookies: flags[2],
            has_same_site_cookies: flags[3],
            has_csp: flags[4],
            csp_directives: None,
            has_x_frame_options: flags[5],
            has_x_content_type_options: flags[6],
        };
        let scheme = if https { Scheme::Https } else { Scheme::Http };
        let score = security_score(scheme, &findings);
        prop_assert!(score <= 100);
        if !https {
            prop_assert!(score < 100);
        }
    }
}
