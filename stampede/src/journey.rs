//! The journey API: everything a virtual user can do inside one
//! iteration. A journey function receives `&mut VuContext` and walks
//! its grouped request/check/think-time steps in order.

use crate::error::Error;
use crate::http::{CookieJar, HttpClient, PageResponse};
use crate::metrics::BuiltinMetrics;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use reqwest::Method;
use std::future::Future;
use std::ops::RangeInclusive;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, trace, warn};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A named journey function: the sequence of grouped request, check,
/// and think-time steps one virtual user performs per iteration.
///
/// The closure must clone its captured state into the future it
/// returns, so that the future borrows nothing but the context:
///
/// ```ignore
/// let logins = registry.counter("successful_logins")?;
/// let journey = Journey::new("loginUser", move |cx| {
///     let logins = logins.clone();
///     Box::pin(async move {
///         cx.group("Login");
///         let res = cx.post_form("/login", &[("user", "a")], "login").await?;
///         if cx.check("login ok", &res, |r| r.status().is_success()) {
///             logins.add(1);
///         }
///         Ok(())
///     })
/// });
/// ```
#[derive(Clone)]
pub struct Journey {
    name: &'static str,
    func: Arc<dyn for<'a> Fn(&'a mut VuContext) -> BoxFuture<'a, Result<(), Error>> + Send + Sync>,
}

impl Journey {
    pub fn new<F>(name: &'static str, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut VuContext) -> BoxFuture<'a, Result<(), Error>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn run<'a>(&self, cx: &'a mut VuContext) -> BoxFuture<'a, Result<(), Error>> {
        (self.func)(cx)
    }
}

/// Mutable per-virtual-user state threaded through every iteration:
/// the cookie jar, a seedable RNG for think-time and branching, and the
/// current group's check outcome.
pub struct VuContext {
    vu: u64,
    scenario: Arc<str>,
    http: HttpClient,
    jar: CookieJar,
    rng: SmallRng,
    builtins: BuiltinMetrics,
    current_group: Option<&'static str>,
    step_failed: bool,
}

impl VuContext {
    pub(crate) fn new(
        vu: u64,
        scenario: Arc<str>,
        http: HttpClient,
        builtins: BuiltinMetrics,
        seed: u64,
    ) -> Self {
        Self {
            vu,
            scenario,
            http,
            jar: CookieJar::new(),
            rng: SmallRng::seed_from_u64(seed),
            builtins,
            current_group: None,
            step_failed: false,
        }
    }

    pub fn vu(&self) -> u64 {
        self.vu
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// The per-virtual-user RNG. Seeded deterministically when the plan
    /// has a fixed seed, so journey branching replays identically.
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// A cookie currently held in this virtual user's jar.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.jar.get(name)
    }

    /// Open a named group of related requests, closing the previous one
    /// (if any) and recording its 1/0 error sample from the aggregate
    /// check outcome. The final group closes at the iteration boundary.
    pub fn group(&mut self, name: &'static str) {
        self.close_group();
        self.current_group = Some(name);
        trace!(group = name, vu = self.vu, "group start");
    }

    fn close_group(&mut self) {
        if let Some(name) = self.current_group.take() {
            self.builtins.group_errors.add(self.step_failed);
            trace!(group = name, failed = self.step_failed, vu = self.vu, "group end");
        }
        self.step_failed = false;
    }

    pub(crate) fn end_iteration(&mut self) {
        self.close_group();
    }

    /// Run a named boolean check against a response, recording pass or
    /// fail to the `checks` series. A failed check marks the current
    /// group failed but never aborts the iteration.
    pub fn check(
        &mut self,
        name: &'static str,
        response: &PageResponse,
        pred: impl FnOnce(&PageResponse) -> bool,
    ) -> bool {
        let ok = pred(response);
        self.builtins.checks.add(ok);
        if !ok {
            self.step_failed = true;
            debug!(
                check = name,
                vu = self.vu,
                status = %response.status(),
                "check failed"
            );
        }
        ok
    }

    pub async fn get(&mut self, path: &str, tag: &'static str) -> Result<PageResponse, Error> {
        self.request(Method::GET, path, None, tag).await
    }

    pub async fn post_form(
        &mut self,
        path: &str,
        form: &[(&str, &str)],
        tag: &'static str,
    ) -> Result<PageResponse, Error> {
        self.request(Method::POST, path, Some(form), tag).await
    }

    async fn request(
        &mut self,
        method: Method,
        path: &str,
        form: Option<&[(&str, &str)]>,
        tag: &'static str,
    ) -> Result<PageResponse, Error> {
        match self.http.request(&mut self.jar, method, path, form, tag).await {
            Ok(response) => Ok(response),
            Err(err) => {
                // Transport failure: the step is failed regardless of
                // whether the journey recovers or bails out with `?`.
                self.step_failed = true;
                warn!(tag, vu = self.vu, %err, "request failed");
                Err(err)
            }
        }
    }

    /// Cooperative think-time pause for a uniformly random duration
    /// within `range`.
    pub async fn think(&mut self, range: RangeInclusive<Duration>) {
        let min = range.start().as_millis() as u64;
        let max = range.end().as_millis() as u64;
        let ms = if min >= max {
            min
        } else {
            self.rng.gen_range(min..=max)
        };
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
