//! Virtual-user population management for one scenario.
//!
//! A scheduler ticks once a second, derives the target count from the
//! stage timeline, and reconciles the pool: spawn fresh virtual users
//! to ramp up, mark the excess for retirement to ramp down. A retiring
//! virtual user finishes its current iteration; a reaper cancels it if
//! it overruns the graceful-stop deadline.

use crate::http::HttpClient;
use crate::journey::{Journey, VuContext};
use crate::metrics::BuiltinMetrics;
use futures::FutureExt;
use stampede_core::{ScenarioSpec, TICK_INTERVAL};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

pub(crate) struct Scheduler {
    spec: ScenarioSpec,
    scenario_name: Arc<str>,
    journey: Journey,
    http: HttpClient,
    builtins: BuiltinMetrics,
    seed: u64,
    pool: Vec<Vu>,
    reapers: Vec<JoinHandle<()>>,
    active: Arc<AtomicUsize>,
    next_vu_id: u64,
}

struct Vu {
    id: u64,
    retire: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    pub fn new(
        spec: ScenarioSpec,
        journey: Journey,
        http: HttpClient,
        builtins: BuiltinMetrics,
        seed: u64,
    ) -> Self {
        let scenario_name: Arc<str> = spec.name.as_str().into();
        Self {
            spec,
            scenario_name,
            journey,
            http,
            builtins,
            seed,
            pool: vec![],
            reapers: vec![],
            active: Arc::new(AtomicUsize::new(0)),
            next_vu_id: 0,
        }
    }

    /// Number of currently active virtual users; updated on every
    /// reconciliation.
    pub fn active_count(&self) -> Arc<AtomicUsize> {
        self.active.clone()
    }

    #[instrument(name = "scenario", skip_all, fields(name = %self.spec.name))]
    pub async fn run(mut self) {
        info!(
            journey = self.journey.name(),
            stages = self.spec.stages.len(),
            "scenario starting"
        );

        let total = self.spec.total_duration();
        let start = Instant::now();
        let mut ticker = interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // First tick completes instantly, so start_vus spawn at t=0.
            ticker.tick().await;
            let elapsed = start.elapsed();
            let target = self.spec.target_at(elapsed.min(total)) as usize;
            self.reconcile(target);
            if elapsed >= total {
                break;
            }
        }

        self.drain().await;
        info!("scenario complete");
    }

    fn reconcile(&mut self, target: usize) {
        // Tasks that exited on their own (force-cancelled stragglers)
        // are dropped from the pool first.
        self.pool.retain(|vu| !vu.handle.is_finished());

        let active = self.pool.len();
        if target > active {
            for _ in active..target {
                self.spawn_vu();
            }
            debug!(active = target, spawned = target - active, "ramping up");
        } else if target < active {
            self.retire(active - target);
            debug!(active = target, retired = active - target, "ramping down");
        }
        self.active.store(self.pool.len(), Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::gauge!("vus", "scenario" => self.spec.name.clone()).set(self.pool.len() as f64);
    }

    fn spawn_vu(&mut self) {
        let id = self.next_vu_id;
        self.next_vu_id += 1;

        let retire = Arc::new(AtomicBool::new(false));
        let flag = retire.clone();
        let journey = self.journey.clone();
        let builtins = self.builtins.clone();
        let mut cx = VuContext::new(
            id,
            self.scenario_name.clone(),
            self.http.clone(),
            self.builtins.clone(),
            vu_seed(self.seed, id),
        );

        let handle = tokio::spawn(async move {
            while !flag.load(Ordering::Relaxed) {
                builtins.iterations.add(1);
                // Each iteration is isolated: a failing or panicking
                // journey is recorded and the virtual user moves on.
                match AssertUnwindSafe(journey.run(&mut cx)).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        builtins.iteration_errors.add(1);
                        debug!(vu = id, %err, "iteration failed");
                    }
                    Err(_) => {
                        builtins.iteration_errors.add(1);
                        error!(vu = id, journey = journey.name(), "iteration panicked");
                    }
                }
                cx.end_iteration();
            }
        });

        self.pool.push(Vu { id, retire, handle });
    }

    fn retire(&mut self, excess: usize) {
        let keep = self.pool.len() - excess;
        let graceful_stop = self.spec.graceful_stop;
        for vu in self.pool.drain(keep..) {
            vu.retire.store(true, Ordering::Relaxed);
            let Vu { id, mut handle, .. } = vu;
            self.reapers.push(tokio::spawn(async move {
                if timeout(graceful_stop, &mut handle).await.is_err() {
                    warn!(vu = id, "graceful-stop deadline exceeded, cancelling");
                    handle.abort();
                    let _ = handle.await;
                }
            }));
        }
    }

    /// Retire every remaining virtual user and wait until each has
    /// fully exited. Only then is the scenario complete.
    async fn drain(&mut self) {
        let remaining = self.pool.len();
        if remaining > 0 {
            debug!(remaining, "draining virtual users");
            self.retire(remaining);
        }
        self.active.store(0, Ordering::Relaxed);
        for reaper in self.reapers.drain(..) {
            let _ = reaper.await;
        }
    }
}

fn vu_seed(run_seed: u64, vu_id: u64) -> u64 {
    run_seed ^ vu_id.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
