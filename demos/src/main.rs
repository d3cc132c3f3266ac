//! Combined load, stress, and spike test against the bundled mock
//! service: three scenarios with staggered start offsets, an
//! authentication flow with per-virtual-user cookies, and custom
//! metrics judged by thresholds at the end.
//!
//! Targets are scaled down from the production profile so the demo
//! finishes in a couple of minutes on a laptop.

use rand::Rng;
use stampede::prelude::*;
use stampede::Error;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing_subscriber::FmtSubscriber;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn think_secs(min: u64, max: u64) -> RangeInclusive<Duration> {
    secs(min)..=secs(max)
}

#[derive(Clone)]
struct DemoMetrics {
    page_load_time: Trend,
    error_rate: Rate,
    successful_logins: Counter,
}

impl DemoMetrics {
    fn register(registry: &Registry) -> Result<Self, Error> {
        Ok(Self {
            page_load_time: registry.trend("page_load_time")?,
            error_rate: registry.rate("error_rate")?,
            successful_logins: registry.counter("successful_logins")?,
        })
    }
}

#[tokio::main]
async fn main() {
    FmtSubscriber::builder()
        .with_env_filter("stampede=info,advanced_load_profile=info")
        .init();

    let addr = mock_service::spawn().await;
    let plan = TestPlan::new(&format!("http://{addr}/"));
    let metrics = DemoMetrics::register(&plan.registry()).expect("metric registration");

    let report = plan
        .journey(login_user(metrics.clone()))
        .journey(authenticated_user_journey(metrics.clone()))
        .journey(mixed_user_actions(metrics.clone()))
        // Scenario 1: normal load, ramp / steady / ramp down.
        .scenario(
            ScenarioSpec::new("normal_load", "authenticatedUserJourney")
                .start_vus(1)
                .stage(secs(10), 15)
                .stage(secs(30), 15)
                .stage(secs(10), 0)
                .graceful_stop(secs(5)),
        )
        // Scenario 2: stress test, starts after the normal load.
        .scenario(
            ScenarioSpec::new("stress_test", "loginUser")
                .start_vus(2)
                .stage(secs(15), 40)
                .stage(secs(25), 40)
                .stage(secs(10), 0)
                .graceful_stop(secs(5))
                .start_time(secs(55)),
        )
        // Scenario 3: spike test with a sudden surge and recovery.
        .scenario(
            ScenarioSpec::new("spike_test", "mixedUserActions")
                .start_vus(1)
                .stage(secs(10), 5)
                .stage(secs(3), 50)
                .stage(secs(10), 50)
                .stage(secs(3), 5)
                .stage(secs(20), 5)
                .graceful_stop(secs(5))
                .start_time(secs(110)),
        )
        .threshold("page_load_time", "p(95)<3000")
        .threshold("error_rate", "rate<0.05")
        .threshold("http_req_duration", "p(95)<1500")
        .run()
        .await
        .expect("test run failed to start");

    println!("{report}");
    std::process::exit(report.exit_code());
}

/// Visit the login page, then authenticate; cookies land in the
/// virtual user's jar and ride along on every later request.
async fn login(cx: &mut VuContext, m: &DemoMetrics) -> Result<(), Error> {
    cx.group("Login");
    let res = cx.get("/index.html", "login_page").await?;
    let ok = cx.check("login page status is 200", &res, |r| {
        r.status() == StatusCode::OK
    }) & cx.check("login form exists", &res, |r| {
        r.body_contains("password") || r.body_contains("login")
    });
    m.error_rate.add(!ok);
    m.page_load_time.record(res.duration_ms());
    cx.think(think_secs(1, 2)).await;

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
    if cx.check("successful login", &res, |r| r.status() == StatusCode::OK) {
        m.successful_logins.add(1);
    } else {
        m.error_rate.add(true);
    }
    cx.think(think_secs(1, 2)).await;
    Ok(())
}

async fn visit(
    cx: &mut VuContext,
    m: &DemoMetrics,
    group: &'static str,
    path: &'static str,
    tag: &'static str,
    check: &'static str,
    marker: &'static str,
    think: RangeInclusive<Duration>,
) -> Result<(), Error> {
    cx.group(group);
    let res = cx.get(path, tag).await?;
    let ok = cx.check(check, &res, |r| {
        r.status() == StatusCode::OK && r.body_contains(marker)
    });
    m.error_rate.add(!ok);
    m.page_load_time.record(res.duration_ms());
    cx.think(think).await;
    Ok(())
}

fn login_user(m: DemoMetrics) -> Journey {
    Journey::new("loginUser", move |cx| {
        let m = m.clone();
        Box::pin(async move { login(cx, &m).await })
    })
}

fn authenticated_user_journey(m: DemoMetrics) -> Journey {
    Journey::new("authenticatedUserJourney", move |cx| {
        let m = m.clone();
        Box::pin(async move {
            login(cx, &m).await?;
            visit(
                cx,
                &m,
                "View Dashboard",
                "/home.php",
                "dashboard_page",
                "dashboard page loaded",
                "Dashboard",
                think_secs(3, 6),
            )
            .await?;
            visit(
                cx,
                &m,
                "View Profile",
                "/users-profile.php",
                "profile_page",
                "profile page loaded",
                "Profile",
                think_secs(2, 5),
            )
            .await?;
            visit(
                cx,
                &m,
                "View Tasks",
                "/tasks.php",
                "tasks_page",
                "tasks page loaded",
                "Tasks",
                think_secs(3, 7),
            )
            .await
        })
    })
}

/// One random authenticated action per iteration: varied load for the
/// spike scenario.
fn mixed_user_actions(m: DemoMetrics) -> Journey {
    Journey::new("mixedUserActions", move |cx| {
        let m = m.clone();
        Box::pin(async move {
            login(cx, &m).await?;
            match cx.rng().gen_range(0..3) {
                0 => {
                    visit(
                        cx,
                        &m,
                        "Spike - Dashboard",
                        "/home.php",
                        "spike_dashboard",
                        "dashboard loaded during spike",
                        "Dashboard",
                        think_secs(1, 3),
                    )
                    .await
                }
                1 => {
                    visit(
                        cx,
                        &m,
                        "Spike - Profile",
                        "/users-profile.php",
                        "spike_profile",
                        "profile loaded during spike",
                        "Profile",
                        think_secs(1, 2),
                    )
                    .await
                }
                _ => {
                    visit(
                        cx,
                        &m,
                        "Spike - Tasks",
                        "/tasks.php",
                        "spike_tasks",
                        "tasks loaded during spike",
                        "Tasks",
                        think_secs(1, 2),
                    )
                    .await
                }
            }
        })
    })
}
