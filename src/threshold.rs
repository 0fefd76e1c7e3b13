//! Threshold engine deciding when a change notification fires.
//!
//! A failure resets the success count at once, but a notification only
//! fires when a streak reaches exactly `threshold + 1`. The failure
//! count survives short runs of successes and is only cleared by a
//! confirmed recovery. Notifications alternate: a crossing of the same
//! kind as the last notification is recorded but stays quiet.

use chrono::{DateTime, Utc};

use crate::db::CheckResult;
use crate::probe::ProbeOutcome;

/// The only status counted as a successful check.
pub const SUCCESS_STATUS: u16 = 200;

pub const DOWN_DESCRIPTION: &str = "is down";
pub const RECOVERED_DESCRIPTION: &str = "has recovered";

/// Consecutive outcomes tolerated before a state change is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub success: u32,
    pub failure: u32,
}

/// The updated record and whether it crossed a threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub result: CheckResult,
    pub should_notify: bool,
}

/// Fold a new probe outcome into the previous record.
pub fn evaluate(
    prior: &CheckResult,
    outcome: ProbeOutcome,
    thresholds: Thresholds,
    name: &str,
    url: &str,
    now: DateTime<Utc>,
) -> Evaluation {
    let mut result = CheckResult {
        name: name.to_string(),
        url: url.to_string(),
        status: outcome.status,
        description: outcome.description,
        response_time: outcome.response_time,
        body: outcome.body,
        last_check_time: Some(now),
        last_notification_time: prior.last_notification_time,
        change_description: prior.change_description.clone(),
        ..Default::default()
    };

    let crossed = if result.status == SUCCESS_STATUS {
        result.last_success_time = Some(now);
        result.last_failure_time = prior.last_failure_time;
        result.success_count = prior.success_count.saturating_add(1);
        result.failure_count = prior.failure_count;
        if result.success_count == crossing(thresholds.success) {
            result.failure_count = 0;
            true
        } else {
            false
        }
    } else {
        result.success_count = 0;
        result.last_failure_time = Some(now);
        result.last_success_time = prior.last_success_time;
        result.failure_count = prior.failure_count.saturating_add(1);
        result.failure_count == crossing(thresholds.failure)
    };

    let kind = if result.status == SUCCESS_STATUS {
        RECOVERED_DESCRIPTION
    } else {
        DOWN_DESCRIPTION
    };
    let should_notify = crossed && prior.change_description != kind;

    if should_notify {
        result.last_notification_time = Some(now);
        result.change_description = kind.to_string();
    }

    Evaluation {
        result,
        should_notify,
    }
}

fn crossing(threshold: u32) -> u64 {
    u64::from(threshold) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const URL: &str = "https://svc.example.com/health";

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn outcome(status: u16) -> ProbeOutcome {
        ProbeOutcome {
            status,
            description: "desc".to_string(),
            response_time: "1ms".to_string(),
            body: String::new(),
        }
    }

    fn thresholds(success: u32, failure: u32) -> Thresholds {
        Thresholds { success, failure }
    }

    fn prior(success_count: u64, failure_count: u64) -> CheckResult {
        CheckResult {
            name: "svc".to_string(),
            url: URL.to_string(),
            success_count,
            failure_count,
            ..Default::default()
        }
    }

    /// Feed `statuses` through the engine and return the notify flags.
    fn run(statuses: &[u16], t: Thresholds) -> (CheckResult, Vec<bool>) {
        let mut state = CheckResult::default();
        let mut fired = Vec::new();
        for (i, status) in statuses.iter().enumerate() {
            let eval = evaluate(&state, outcome(*status), t, "svc", URL, at(i as i64));
            fired.push(eval.should_notify);
            state = eval.result;
        }
        (state, fired)
    }

    #[test]
    fn test_failure_crossing_notifies_down() {
        let eval = evaluate(&prior(0, 4), outcome(500), thresholds(2, 4), "svc", URL, at(0));
        assert_eq!(eval.result.failure_count, 5);
        assert!(eval.should_notify);
        assert_eq!(eval.result.change_description, DOWN_DESCRIPTION);
        assert_eq!(eval.result.last_notification_time, Some(at(0)));
    }

    #[test]
    fn test_past_crossing_does_not_renotify() {
        let mut p = prior(0, 5);
        p.change_description = DOWN_DESCRIPTION.to_string();
        p.last_notification_time = Some(at(-10));

        let eval = evaluate(&p, outcome(500), thresholds(2, 4), "svc", URL, at(0));
        assert_eq!(eval.result.failure_count, 6);
        assert!(!eval.should_notify);
        assert_eq!(eval.result.last_notification_time, Some(at(-10)));
        assert_eq!(eval.result.change_description, DOWN_DESCRIPTION);
    }

    #[test]
    fn test_recovery_needs_sustained_successes() {
        let t = thresholds(2, 4);
        let first = evaluate(&prior(0, 6), outcome(200), t, "svc", URL, at(0));
        assert_eq!(first.result.success_count, 1);
        assert_eq!(first.result.failure_count, 6);
        assert!(!first.should_notify);

        let second = evaluate(&first.result, outcome(200), t, "svc", URL, at(1));
        assert_eq!(second.result.success_count, 2);
        assert!(!second.should_notify);

        let third = evaluate(&second.result, outcome(200), t, "svc", URL, at(2));
        assert_eq!(third.result.success_count, 3);
        assert_eq!(third.result.failure_count, 0);
        assert!(third.should_notify);
        assert_eq!(third.result.change_description, RECOVERED_DESCRIPTION);
    }

    #[test]
    fn test_first_check_with_zero_threshold_notifies() {
        let eval = evaluate(
            &CheckResult::default(),
            outcome(200),
            thresholds(0, 0),
            "svc",
            URL,
            at(0),
        );
        assert_eq!(eval.result.success_count, 1);
        assert!(eval.should_notify);
        assert_eq!(eval.result.change_description, RECOVERED_DESCRIPTION);
    }

    #[test]
    fn test_failure_resets_success_count() {
        let mut p = prior(7, 0);
        p.last_success_time = Some(at(-5));
        let eval = evaluate(&p, outcome(404), thresholds(3, 5), "svc", URL, at(0));
        assert_eq!(eval.result.success_count, 0);
        assert_eq!(eval.result.failure_count, 1);
        assert_eq!(eval.result.last_failure_time, Some(at(0)));
        assert_eq!(eval.result.last_success_time, Some(at(-5)));
    }

    #[test]
    fn test_success_carries_failure_time() {
        let mut p = prior(0, 2);
        p.last_failure_time = Some(at(-3));
        let eval = evaluate(&p, outcome(200), thresholds(3, 5), "svc", URL, at(0));
        assert_eq!(eval.result.last_success_time, Some(at(0)));
        assert_eq!(eval.result.last_failure_time, Some(at(-3)));
        assert_eq!(eval.result.last_check_time, Some(at(0)));
    }

    #[test]
    fn test_non_200_success_codes_count_as_failures() {
        let eval = evaluate(&prior(3, 0), outcome(204), thresholds(1, 0), "svc", URL, at(0));
        assert_eq!(eval.result.success_count, 0);
        assert_eq!(eval.result.failure_count, 1);
        assert!(eval.should_notify);
        assert_eq!(eval.result.change_description, DOWN_DESCRIPTION);
    }

    #[test]
    fn test_seeds_fields_from_outcome() {
        let o = ProbeOutcome {
            status: 503,
            description: "connection refused".to_string(),
            response_time: "3ms".to_string(),
            body: "".to_string(),
        };
        let eval = evaluate(&CheckResult::default(), o, thresholds(1, 1), "Name", URL, at(0));
        assert_eq!(eval.result.name, "Name");
        assert_eq!(eval.result.url, URL);
        assert_eq!(eval.result.status, 503);
        assert_eq!(eval.result.description, "connection refused");
        assert_eq!(eval.result.response_time, "3ms");
    }

    #[test]
    fn test_brief_flapping_stays_quiet() {
        let statuses = [500, 200, 500, 200];
        let (state, fired) = run(&statuses, thresholds(2, 2));
        assert!(fired.iter().all(|f| !f));
        // failures keep accumulating until a confirmed recovery
        assert_eq!(state.failure_count, 2);
        assert_eq!(state.success_count, 1);
    }

    #[test]
    fn test_no_premature_notify() {
        for t in 1..6u32 {
            let statuses = vec![500u16; t as usize];
            let (state, fired) = run(&statuses, thresholds(t, t));
            assert_eq!(state.failure_count, u64::from(t));
            assert!(fired.iter().all(|f| !f), "threshold {}", t);
        }
    }

    #[test]
    fn test_notifies_once_per_sustained_transition() {
        let t = thresholds(1, 2);
        let mut statuses = vec![500u16; 6];
        statuses.extend(vec![200; 4]);
        statuses.extend(vec![500; 4]);
        let (_, fired) = run(&statuses, t);

        let fired_at: Vec<usize> = fired
            .iter()
            .enumerate()
            .filter(|(_, f)| **f)
            .map(|(i, _)| i)
            .collect();
        // down at the 3rd failure, recovered at the 2nd success, down again
        assert_eq!(fired_at, vec![2, 7, 12]);
    }

    #[test]
    fn test_short_recovery_does_not_renotify_down() {
        // down, then one success (below threshold), then failures again
        let statuses = [500, 500, 200, 500, 500, 500];
        let (state, fired) = run(&statuses, thresholds(2, 1));
        assert_eq!(fired, vec![false, true, false, false, false, false]);
        assert_eq!(state.failure_count, 5);
    }

    #[test]
    fn test_recovery_after_brief_failure_does_not_repeat() {
        let t = thresholds(1, 5);
        let mut statuses = vec![500u16; 6];
        statuses.extend([200, 200, 500, 200, 200]);

        let mut state = CheckResult::default();
        let mut fired = Vec::new();
        for (i, status) in statuses.iter().enumerate() {
            let eval = evaluate(&state, outcome(*status), t, "svc", URL, at(i as i64));
            if eval.should_notify {
                fired.push((i, eval.result.change_description.clone()));
            }
            state = eval.result;
        }

        assert_eq!(
            fired,
            vec![
                (5, DOWN_DESCRIPTION.to_string()),
                (7, RECOVERED_DESCRIPTION.to_string()),
            ]
        );
        // the repeated crossing still confirms recovery
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.success_count, 2);
        assert_eq!(state.last_notification_time, Some(at(7)));
    }

    #[test]
    fn test_same_kind_crossing_is_quiet() {
        let mut p = prior(0, 0);
        p.change_description = DOWN_DESCRIPTION.to_string();
        p.last_notification_time = Some(at(-10));

        let eval = evaluate(&p, outcome(500), thresholds(1, 0), "svc", URL, at(0));
        assert_eq!(eval.result.failure_count, 1);
        assert!(!eval.should_notify);
        assert_eq!(eval.result.last_notification_time, Some(at(-10)));
    }

    #[test]
    fn test_zero_threshold_every_flip_notifies() {
        let statuses = [500, 200, 500, 200];
        let (_, fired) = run(&statuses, thresholds(0, 0));
        assert_eq!(fired, vec![true, true, true, true]);
    }

    #[test]
    fn test_counter_reset_on_kind_change() {
        for (first, second) in [(200u16, 500u16), (500, 200)] {
            let (state, _) = run(&[first, first, first, second], thresholds(0, 0));
            if second == SUCCESS_STATUS {
                assert_eq!(state.success_count, 1);
                assert_eq!(state.failure_count, 0);
            } else {
                assert_eq!(state.failure_count, 1);
                assert_eq!(state.success_count, 0);
            }
        }
    }

    #[test]
    fn test_counters_saturate() {
        let eval = evaluate(
            &prior(u64::MAX, 0),
            outcome(200),
            thresholds(u32::MAX, u32::MAX),
            "svc",
            URL,
            at(0),
        );
        assert_eq!(eval.result.success_count, u64::MAX);
        assert!(!eval.should_notify);
    }
}
