//! End-to-end runs against an in-process mock service.

mod utils;
#[allow(unused)]
use utils::*;

use stampede::prelude::*;
use stampede::MetricSummary;
use std::time::Duration;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn short_ramp(name: &str, exec: &str, vus: u32) -> ScenarioSpec {
    ScenarioSpec::new(name, exec)
        .start_vus(vus)
        .stage(secs(1), vus)
        .stage(secs(1), 0)
        .graceful_stop(secs(5))
}

fn rate_of(report: &TestReport, name: &str) -> (u64, u64) {
    match report.metrics.get(name) {
        Some(MetricSummary::Rate(r)) => (r.hits, r.total),
        other => panic!("expected rate series `{name}`, got {other:?}"),
    }
}

fn count_of(report: &TestReport, name: &str) -> u64 {
    match report.metrics.get(name) {
        Some(MetricSummary::Counter(c)) => c.total,
        other => panic!("expected counter series `{name}`, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cookie_round_trip_is_isolated_per_virtual_user() {
    init();
    let addr = mock_service::spawn().await;

    let plan = TestPlan::new(&format!("http://{addr}/"));
    let journey = Journey::new("login_whoami", |cx| {
        Box::pin(async move {
            cx.group("Login");
            let res = cx
                .post_form(
                    "/php/traitementIndex.php",
                    &[
                        ("password", mock_service::PASSWORD),
                        ("phone", mock_service::PHONE),
                    ],
                    "login_request",
                )
                .await?;
            cx.check("successful login", &res, |r| r.status() == StatusCode::OK);

            // The session issued above must be the one echoed back, and
            // no other virtual user's.
            let session = cx.cookie("session").map(str::to_string);
            let res = cx.get("/whoami", "whoami").await?;
            cx.check("whoami sees own session", &res, move |r| match &session {
                Some(s) => r.body() == format!("session:{s}"),
                None => false,
            });
            Ok(())
        })
    });

    let report = plan
        .journey(journey)
        .scenario(short_ramp("cookies", "login_whoami", 5))
        .run()
        .await
        .unwrap();

    let (hits, total) = rate_of(&report, "checks");
    assert!(total >= 10, "expected many checks, got {total}");
    assert_eq!(hits, total, "a virtual user saw a foreign session cookie");

    let (errors, groups) = rate_of(&report, "group_errors");
    assert_eq!(errors, 0);
    assert!(groups > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn passing_thresholds_produce_a_green_report() {
    init();
    let addr = mock_service::spawn().await;

    let plan = TestPlan::new(&format!("http://{addr}/"));
    let journey = Journey::new("ping", |cx| {
        Box::pin(async move {
            cx.group("Ping");
            let res = cx.get("/delay/ms/5", "delay").await?;
            cx.check("status is 200", &res, |r| r.status() == StatusCode::OK);
            Ok(())
        })
    });

    let report = plan
        .journey(journey)
        .scenario(short_ramp("ping", "ping", 3))
        .threshold("http_req_duration", "p(95)<5000")
        .threshold("checks", "rate>=1")
        .threshold("group_errors", "rate<0.05")
        .threshold("iterations", "count>0")
        .run()
        .await
        .unwrap();

    assert!(report.passed(), "unexpected failures:\n{report}");
    assert_eq!(report.exit_code(), 0);
    assert!(count_of(&report, "http_reqs") > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn impossible_latency_threshold_fails_the_run() {
    init();
    let addr = mock_service::spawn().await;

    let plan = TestPlan::new(&format!("http://{addr}/"));
    let journey = Journey::new("ping", |cx| {
        Box::pin(async move {
            let res = cx.get("/delay/ms/5", "delay").await?;
            cx.check("status is 200", &res, |r| r.status() == StatusCode::OK);
            Ok(())
        })
    });

    let report = plan
        .journey(journey)
        .scenario(short_ramp("ping", "ping", 2))
        .threshold("http_req_duration", "p(95)<0.000001")
        .threshold("iterations", "count>0")
        .run()
        .await
        .unwrap();

    assert!(!report.passed());
    assert_eq!(report.exit_code(), 1);
    // The other threshold was still evaluated on its own.
    assert_eq!(report.failed_thresholds().count(), 1);
    let failed = report.failed_thresholds().next().unwrap();
    assert_eq!(failed.metric, "http_req_duration");
    assert!(failed.measured.unwrap() > 0.000001);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_checks_drive_error_series_and_thresholds() {
    init();
    let addr = mock_service::spawn().await;

    let plan = TestPlan::new(&format!("http://{addr}/"));
    let registry = plan.registry();
    let error_rate = registry.rate("error_rate").unwrap();

    let journey_errors = error_rate.clone();
    let journey = Journey::new("always_down", move |cx| {
        let error_rate = journey_errors.clone();
        Box::pin(async move {
            cx.group("Down");
            let res = cx.get("/flaky/100", "flaky").await?;
            let ok = cx.check("status is 200", &res, |r| r.status() == StatusCode::OK);
            error_rate.add(!ok);
            Ok(())
        })
    });

    let report = plan
        .journey(journey)
        .scenario(short_ramp("down", "always_down", 3))
        .threshold("error_rate", "rate<0.05")
        .run()
        .await
        .unwrap();

    let (hits, total) = rate_of(&report, "checks");
    assert!(total > 0);
    assert_eq!(hits, 0, "every check should have failed");

    let (errors, groups) = rate_of(&report, "group_errors");
    assert_eq!(errors, groups, "every group should be marked failed");

    assert!(!report.passed());
    let failed = report.failed_thresholds().next().unwrap();
    assert_eq!(failed.metric, "error_rate");
    assert_eq!(failed.measured, Some(1.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn transport_failures_are_recovered_per_iteration() {
    init();
    // Nothing listens on this port: every request is a transport error.
    let plan = TestPlan::new("http://127.0.0.1:9/");
    let journey = Journey::new("unreachable", |cx| {
        Box::pin(async move {
            cx.group("Unreachable");
            let res = cx.get("/", "unreachable").await;
            // Pace the loop so the failure path doesn't spin hot.
            cx.think(Duration::from_millis(100)..=Duration::from_millis(100))
                .await;
            res.map(|_| ())
        })
    });

    let report = plan
        .journey(journey)
        .scenario(short_ramp("unreachable", "unreachable", 2))
        .request_timeout(Duration::from_millis(250))
        .run()
        .await
        .unwrap();

    let iterations = count_of(&report, "iterations");
    let iteration_errors = count_of(&report, "iteration_errors");
    assert!(iterations > 1, "virtual users should keep iterating");
    assert_eq!(iterations, iteration_errors);

    let (errors, groups) = rate_of(&report, "group_errors");
    assert_eq!(errors, groups, "transport failure must fail the group");
}
