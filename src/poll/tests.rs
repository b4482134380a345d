//! Unit tests for the stabilization poller.

use std::time::Duration;

use rstest::rstest;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::test_support::{ScriptedError, ScriptedRefresh};

const PROVISIONING: &str = "Provisioning";
const READY: &str = "Ready";

fn provisioning_spec(deadline: Deadline) -> PollSpecBuilder<&'static str> {
    PollSpec::builder("vault-1")
        .pending([PROVISIONING])
        .target([READY])
        .min_interval(Duration::from_secs(1))
        .deadline(deadline)
}

#[tokio::test(start_paused = true)]
async fn first_target_observation_succeeds_after_one_refresh() {
    let script = ScriptedRefresh::new();
    script.push_found(7_u32, READY);

    let spec = provisioning_spec(Deadline::after(Duration::from_secs(30)))
        .build(script.refresh_fn());
    let outcome = run(spec)
        .await
        .unwrap_or_else(|err| panic!("run should converge: {err}"));

    assert_eq!(
        outcome,
        PollOutcome {
            payload: Some(7),
            label: READY,
            attempts: 1
        }
    );
    assert_eq!(script.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn pending_until_deadline_times_out_without_late_refreshes() {
    let script = ScriptedRefresh::new();
    script.repeat_found(0_u32, PROVISIONING);
    let deadline = Deadline::after(Duration::from_millis(3_500));
    let expiry = deadline.instant();

    let err = run(provisioning_spec(deadline).build(script.refresh_fn()))
        .await
        .expect_err("pending forever should time out");

    assert!(
        matches!(err, ConvergeError::Timeout { ref last_label, .. } if last_label.as_deref() == Some(PROVISIONING)),
        "unexpected error: {err:?}"
    );
    assert_eq!(script.call_count(), 4);
    assert!(script.calls().iter().all(|call| *call < expiry));
}

#[tokio::test(start_paused = true)]
async fn five_second_interval_within_twenty_seconds_issues_four_refreshes() {
    let script = ScriptedRefresh::new();
    script.repeat_found(0_u32, PROVISIONING);
    let start = Instant::now();

    let spec = PollSpec::builder("vault-1")
        .pending([PROVISIONING])
        .target([READY])
        .min_interval(Duration::from_secs(5))
        .deadline(Deadline::after(Duration::from_secs(20)))
        .build(script.refresh_fn());
    let err = run(spec).await.expect_err("expected timeout");

    assert!(matches!(err, ConvergeError::Timeout { .. }));
    let offsets = script
        .calls()
        .iter()
        .map(|call| call.duration_since(start).as_secs())
        .collect::<Vec<_>>();
    assert_eq!(offsets, vec![0, 5, 10, 15]);
    assert!(start.elapsed() <= Duration::from_millis(20_001));
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(5)]
#[tokio::test(start_paused = true)]
async fn succeeds_on_exactly_the_nth_consecutive_target(#[case] occurrences: u32) {
    let script = ScriptedRefresh::new();
    script.push_found(0_u32, PROVISIONING);
    script.repeat_found(1_u32, READY);

    let spec = provisioning_spec(Deadline::after(Duration::from_secs(60)))
        .continuous_target_occurrences(occurrences)
        .build(script.refresh_fn());
    let outcome = run(spec)
        .await
        .unwrap_or_else(|err| panic!("run should converge: {err}"));

    assert_eq!(outcome.attempts, occurrences + 1);
    assert_eq!(script.call_count(), usize::try_from(occurrences + 1).unwrap_or(usize::MAX));
}

#[tokio::test(start_paused = true)]
async fn pending_observation_resets_the_target_streak() {
    let script = ScriptedRefresh::new();
    script.push_found(1_u32, READY);
    script.push_found(0_u32, PROVISIONING);
    script.push_found(1_u32, READY);
    script.push_found(1_u32, READY);

    let spec = provisioning_spec(Deadline::after(Duration::from_secs(60)))
        .continuous_target_occurrences(2)
        .build(script.refresh_fn());
    let outcome = run(spec)
        .await
        .unwrap_or_else(|err| panic!("run should converge: {err}"));

    assert_eq!(outcome.attempts, 4);
}

#[tokio::test(start_paused = true)]
async fn refresh_failure_aborts_without_retry() {
    let script = ScriptedRefresh::<u32, &str>::new();
    script.push_found(0, PROVISIONING);
    script.push_failure("403 forbidden");
    script.repeat_found(1, READY);

    let err = run(provisioning_spec(Deadline::after(Duration::from_secs(60))).build(script.refresh_fn()))
        .await
        .expect_err("refresh failure should abort");

    assert_eq!(
        err,
        ConvergeError::RefreshFailed {
            resource: ResourceId::from("vault-1"),
            last_label: LastObserved::label(&PROVISIONING),
            source: ScriptedError::Failure(String::from("403 forbidden")),
        }
    );
    assert_eq!(script.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn label_outside_both_sets_is_unexpected() {
    let script = ScriptedRefresh::new();
    script.push_found(0_u32, "Deleting");

    let err = run(provisioning_spec(Deadline::after(Duration::from_secs(60))).build(script.refresh_fn()))
        .await
        .expect_err("unknown label should abort");

    let ConvergeError::UnexpectedState { label, pending, target, .. } = err else {
        panic!("expected UnexpectedState, got {err:?}");
    };
    assert_eq!(label, "Deleting");
    assert_eq!(pending, PROVISIONING);
    assert_eq!(target, READY);
}

#[tokio::test(start_paused = true)]
async fn missing_deadline_is_a_configuration_error() {
    let script = ScriptedRefresh::<u32, &str>::new();
    let spec = PollSpec::builder("vault-1")
        .pending([PROVISIONING])
        .target([READY])
        .build(script.refresh_fn());

    let err = run(spec).await.expect_err("missing deadline");

    assert!(matches!(err, ConvergeError::Configuration { .. }));
    assert_eq!(script.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_deadline_fails_fast_without_refreshing() {
    let script = ScriptedRefresh::<u32, &str>::new();
    script.repeat_found(1, READY);

    let err = run(provisioning_spec(Deadline::at(Instant::now())).build(script.refresh_fn()))
        .await
        .expect_err("expired deadline");

    let ConvergeError::Configuration { reason, .. } = err else {
        panic!("expected Configuration, got {err:?}");
    };
    assert!(reason.contains("already passed"), "reason: {reason}");
    assert_eq!(script.call_count(), 0);
}

#[rstest]
#[case::empty_target(Vec::new(), 1, "target state set is empty")]
#[case::zero_occurrences(vec![READY], 0, "at least 1")]
#[tokio::test(start_paused = true)]
async fn invalid_specs_are_rejected(
    #[case] target: Vec<&'static str>,
    #[case] occurrences: u32,
    #[case] expected: &str,
) {
    let script = ScriptedRefresh::<u32, &str>::new();
    let spec = PollSpec::builder("vault-1")
        .pending([PROVISIONING])
        .target(target)
        .continuous_target_occurrences(occurrences)
        .deadline(Deadline::after(Duration::from_secs(60)))
        .build(script.refresh_fn());

    let err = run(spec).await.expect_err("invalid spec");

    assert!(
        matches!(err, ConvergeError::Configuration { ref reason, .. } if reason.contains(expected)),
        "unexpected error: {err:?}"
    );
    assert_eq!(script.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_wakes_the_sleep_immediately() {
    let script = ScriptedRefresh::new();
    script.repeat_found(0_u32, PROVISIONING);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(7)).await;
        trigger.cancel();
    });
    let start = Instant::now();

    let spec = PollSpec::builder("vault-1")
        .pending([PROVISIONING])
        .target([READY])
        .min_interval(Duration::from_secs(60))
        .deadline(Deadline::after(Duration::from_secs(300)).with_cancellation(token))
        .build(script.refresh_fn());
    let err = run(spec).await.expect_err("cancelled run");

    assert!(matches!(err, ConvergeError::Canceled { .. }), "unexpected error: {err:?}");
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(7) && elapsed < Duration::from_secs(8),
        "cancellation observed after {elapsed:?}"
    );
    assert_eq!(script.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_still_running_at_deadline_times_out() {
    let refresh = || std::future::pending::<Result<Observation<u32, &'static str>, ScriptedError>>();
    let spec = provisioning_spec(Deadline::after(Duration::from_secs(10))).build(refresh);

    let err = run(spec).await.expect_err("hung refresh");

    assert!(
        matches!(err, ConvergeError::Timeout { ref last_label, .. } if last_label.as_deref().is_none()),
        "unexpected error: {err:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn not_found_budget_is_enforced_while_waiting_for_presence() {
    let script = ScriptedRefresh::<(), Presence>::new();
    script.push_absent(Presence::Absent);
    script.push_absent(Presence::Absent);
    script.push_absent(Presence::Absent);
    script.repeat_found((), Presence::Present);

    let spec = PollSpec::until_present("secret-1")
        .min_interval(Duration::from_secs(1))
        .not_found_checks(Some(2))
        .deadline(Deadline::after(Duration::from_secs(60)))
        .build(script.refresh_fn());
    let err = run(spec).await.expect_err("not-found budget");

    assert_eq!(
        err,
        ConvergeError::NotFound {
            resource: ResourceId::from("secret-1"),
            checks: 3
        }
    );
}

#[tokio::test(start_paused = true)]
async fn target_observation_resets_the_not_found_budget() {
    let script = ScriptedRefresh::<(), Presence>::new();
    script.push_absent(Presence::Absent);
    script.push_absent(Presence::Absent);
    script.push_found((), Presence::Present);
    script.push_absent(Presence::Absent);
    script.push_absent(Presence::Absent);
    script.repeat_found((), Presence::Present);

    let spec = PollSpec::until_present("secret-1")
        .min_interval(Duration::from_secs(1))
        .continuous_target_occurrences(2)
        .not_found_checks(Some(2))
        .deadline(Deadline::after(Duration::from_secs(60)))
        .build(script.refresh_fn());
    let outcome = run(spec)
        .await
        .unwrap_or_else(|err| panic!("budget should restart after a sighting: {err}"));

    assert_eq!(outcome.label, Presence::Present);
    assert_eq!(outcome.attempts, 7);
}

#[rstest]
#[case::interval(Duration::MAX, Duration::ZERO, 1)]
#[case::delay(Duration::from_secs(1), Duration::MAX, 0)]
#[tokio::test(start_paused = true)]
async fn unrepresentable_waits_end_at_the_deadline(
    #[case] interval: Duration,
    #[case] delay: Duration,
    #[case] expected_calls: usize,
) {
    let script = ScriptedRefresh::new();
    script.repeat_found(1_u32, PROVISIONING);
    let start = Instant::now();

    let spec = provisioning_spec(Deadline::after(Duration::from_secs(20)))
        .min_interval(interval)
        .delay(delay)
        .build(script.refresh_fn());
    let err = run(spec).await.expect_err("resource never settles");

    assert!(matches!(err, ConvergeError::Timeout { .. }), "unexpected error: {err:?}");
    assert_eq!(script.call_count(), expected_calls);
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(20) && elapsed <= Duration::from_millis(20_001),
        "timed out after {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn until_absent_converges_once_the_resource_disappears() {
    let script = ScriptedRefresh::<(), Presence>::new();
    script.push_found((), Presence::Present);
    script.push_absent(Presence::Absent);

    let spec = PollSpec::until_absent("secret-1")
        .min_interval(Duration::from_secs(1))
        .deadline(Deadline::after(Duration::from_secs(60)))
        .build(script.refresh_fn());
    let outcome = run(spec)
        .await
        .unwrap_or_else(|err| panic!("delete should be confirmed: {err}"));

    assert_eq!(outcome.label, Presence::Absent);
    assert_eq!(outcome.payload, None);
    assert_eq!(outcome.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn initial_delay_precedes_the_first_refresh() {
    let script = ScriptedRefresh::new();
    script.push_found(1_u32, READY);
    let start = Instant::now();

    let spec = provisioning_spec(Deadline::after(Duration::from_secs(60)))
        .delay(Duration::from_secs(30))
        .build(script.refresh_fn());
    run(spec)
        .await
        .unwrap_or_else(|err| panic!("run should converge: {err}"));

    let calls = script.calls();
    assert_eq!(calls.len(), 1);
    assert!(
        calls
            .iter()
            .all(|call| call.duration_since(start).as_secs() == 30)
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_runs_against_a_converged_resource_only_read() {
    let script = ScriptedRefresh::new();
    script.repeat_found(1_u32, READY);

    for _ in 0..2 {
        let spec =
            provisioning_spec(Deadline::after(Duration::from_secs(60))).build(script.refresh_fn());
        let outcome = run(spec)
            .await
            .unwrap_or_else(|err| panic!("run should converge: {err}"));
        assert_eq!(outcome.attempts, 1);
    }

    assert_eq!(script.call_count(), 2);
}

#[test]
fn label_sets_render_in_stable_order() {
    let labels = ["Succeeded", "Canceled", "Failed"]
        .into_iter()
        .collect::<HashSet<_>>();
    assert_eq!(render_labels(&labels), "Canceled, Failed, Succeeded");
}
