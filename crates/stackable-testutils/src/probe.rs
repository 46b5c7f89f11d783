//! The polling primitive all assertions are built on.
//!
//! A probe repeatedly takes a *sample* (usually one read against the external
//! store) and evaluates a predicate against it. It runs in one of two
//! [`Mode`]s:
//!
//! - [`eventually`]: succeeds as soon as the predicate holds once and fails if
//!   the timeout elapses without that happening.
//! - [`consistently`]: fails at the first sample for which the predicate does
//!   not hold and succeeds only if it held for every sample across the whole
//!   window.
//!
//! Samples are taken immediately and then at a fixed interval. There is no
//! backoff. The last sleep is clamped to the deadline, so the final sample of
//! a window is taken exactly when the timeout expires.
//!
//! ```
//! # use std::time::Duration;
//! use stackable_testutils::probe::{Schedule, eventually};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let schedule = Schedule::new(Duration::from_secs(1), Duration::from_millis(10)).unwrap();
//!
//! let mut attempts = 0;
//! let satisfied = eventually(
//!     &schedule,
//!     || {
//!         attempts += 1;
//!         std::future::ready(attempts)
//!     },
//!     |attempts| *attempts >= 3,
//! )
//! .await
//! .unwrap();
//!
//! assert_eq!(satisfied.samples, 3);
//! # }
//! ```
use std::{fmt::Debug, time::Duration};

use snafu::{Snafu, ensure};
use tokio::time::Instant;

/// Upper bound for the rendered observation attached to failures.
const MAX_OBSERVATION_LEN: usize = 2048;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the poll interval must not be zero"))]
    ZeroInterval,

    #[snafu(display("the poll interval {interval:?} must be shorter than the timeout {timeout:?}"))]
    IntervalNotShorterThanTimeout {
        interval: Duration,
        timeout: Duration,
    },

    #[snafu(display(
        "condition was not met within {timeout:?} ({samples} samples, elapsed {elapsed:?}), last observed: {last_observed}"
    ))]
    Timeout {
        timeout: Duration,
        elapsed: Duration,
        samples: usize,
        last_observed: String,
    },

    #[snafu(display(
        "condition was violated at sample {samples} (elapsed {elapsed:?}), observed: {observed}"
    ))]
    Violation {
        elapsed: Duration,
        samples: usize,
        observed: String,
    },
}

impl Error {
    /// Returns the time that passed between the first sample and the failure,
    /// if this is a polling failure.
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Self::Timeout { elapsed, .. } | Self::Violation { elapsed, .. } => Some(*elapsed),
            Self::ZeroInterval | Self::IntervalNotShorterThanTimeout { .. } => None,
        }
    }
}

/// The two polling modes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// The predicate has to become true at least once within the timeout.
    Eventually,

    /// The predicate has to stay true for the whole timeout.
    Consistently,
}

/// A validated pair of timeout and poll interval.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Schedule {
    timeout: Duration,
    interval: Duration,
}

impl Schedule {
    /// Creates a new [`Schedule`].
    ///
    /// The `interval` must be non-zero and strictly shorter than the `timeout`.
    pub fn new(timeout: Duration, interval: Duration) -> Result<Self, Error> {
        ensure!(!interval.is_zero(), ZeroIntervalSnafu);
        ensure!(
            interval < timeout,
            IntervalNotShorterThanTimeoutSnafu { interval, timeout }
        );

        Ok(Self { timeout, interval })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Returned when a probe succeeded.
#[derive(Debug)]
pub struct Satisfied<O> {
    /// The last sampled observation. For [`eventually`] this is the first
    /// observation that satisfied the predicate, for [`eventually_map`] the
    /// value extracted from it.
    pub observed: O,

    /// Time between the first and the last sample.
    pub elapsed: Duration,

    /// Number of samples taken.
    pub samples: usize,
}

/// State of one poll. Lives for exactly one [`eventually`] or
/// [`consistently`] call.
struct PollSession {
    schedule: Schedule,
    mode: Mode,
    started: Instant,
    samples: usize,
}

impl PollSession {
    fn start(schedule: &Schedule, mode: Mode) -> Self {
        tracing::trace!(
            %mode,
            timeout = ?schedule.timeout,
            interval = ?schedule.interval,
            "starting poll session"
        );

        Self {
            schedule: *schedule,
            mode,
            started: Instant::now(),
            samples: 0,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn deadline_reached(&self) -> bool {
        self.elapsed() >= self.schedule.timeout
    }

    async fn sample<O, F, Fut>(&mut self, sampler: &mut F) -> O
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = O>,
    {
        let observed = sampler().await;
        self.samples += 1;
        observed
    }

    /// Sleeps for one interval, but never past the deadline.
    async fn tick(&self) {
        let deadline = self.started + self.schedule.timeout;
        let next = Instant::now() + self.schedule.interval;
        tokio::time::sleep_until(next.min(deadline)).await;
    }

    fn satisfied<O>(&self, observed: O) -> Satisfied<O> {
        let elapsed = self.elapsed();
        tracing::debug!(mode = %self.mode, samples = self.samples, ?elapsed, "condition satisfied");

        Satisfied {
            observed,
            elapsed,
            samples: self.samples,
        }
    }
}

/// Polls `sample` until `predicate` holds for an observation.
///
/// Fails with [`Error::Timeout`] carrying the last observation if the timeout
/// of the `schedule` elapses first.
pub async fn eventually<O, F, Fut, P>(
    schedule: &Schedule,
    sample: F,
    predicate: P,
) -> Result<Satisfied<O>, Error>
where
    O: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = O>,
    P: Fn(&O) -> bool,
{
    eventually_map(schedule, sample, |observed| {
        if predicate(&observed) {
            Ok(observed)
        } else {
            Err(observed)
        }
    })
    .await
}

/// Like [`eventually`], but `extract` decides by consuming the observation.
///
/// An observation which satisfies the condition is turned into `Ok` and
/// returned as [`Satisfied::observed`]. Any other observation is handed back
/// as `Err` and kept for the timeout diagnostics.
pub async fn eventually_map<O, T, F, Fut, X>(
    schedule: &Schedule,
    mut sample: F,
    extract: X,
) -> Result<Satisfied<T>, Error>
where
    O: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = O>,
    X: Fn(O) -> Result<T, O>,
{
    let mut session = PollSession::start(schedule, Mode::Eventually);

    loop {
        let observed = match extract(session.sample(&mut sample).await) {
            Ok(value) => return Ok(session.satisfied(value)),
            Err(observed) => observed,
        };

        if session.deadline_reached() {
            let elapsed = session.elapsed();
            tracing::debug!(samples = session.samples, ?elapsed, ?observed, "poll timed out");

            return TimeoutSnafu {
                timeout: schedule.timeout,
                elapsed,
                samples: session.samples,
                last_observed: message::render(&observed),
            }
            .fail();
        }

        tracing::trace!(samples = session.samples, ?observed, "condition not met yet");
        session.tick().await;
    }
}

/// Polls `sample` for the whole timeout of the `schedule` and requires
/// `predicate` to hold for every observation.
///
/// Fails with [`Error::Violation`] at the first observation for which the
/// predicate doesn't hold.
pub async fn consistently<O, F, Fut, P>(
    schedule: &Schedule,
    mut sample: F,
    predicate: P,
) -> Result<Satisfied<O>, Error>
where
    O: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = O>,
    P: Fn(&O) -> bool,
{
    let mut session = PollSession::start(schedule, Mode::Consistently);

    loop {
        let observed = session.sample(&mut sample).await;

        if !predicate(&observed) {
            let elapsed = session.elapsed();
            tracing::debug!(samples = session.samples, ?elapsed, ?observed, "condition violated");

            return ViolationSnafu {
                elapsed,
                samples: session.samples,
                observed: message::render(&observed),
            }
            .fail();
        }

        if session.deadline_reached() {
            return Ok(session.satisfied(observed));
        }

        session.tick().await;
    }
}

mod message {
    use std::fmt::Debug;

    use super::MAX_OBSERVATION_LEN;

    pub fn render(observed: &impl Debug) -> String {
        let mut msg = format!("{observed:?}");
        truncate_with_ellipsis(&mut msg, MAX_OBSERVATION_LEN);
        msg
    }

    /// Ensures that `msg` is at most `max_len` _bytes_ long
    pub fn truncate_with_ellipsis(msg: &mut String, max_len: usize) {
        const ELLIPSIS: char = '…';
        const ELLIPSIS_LEN: usize = ELLIPSIS.len_utf8();

        if msg.len() > max_len {
            let mut end = max_len.saturating_sub(ELLIPSIS_LEN);
            while !msg.is_char_boundary(end) {
                end -= 1;
            }

            msg.truncate(end);
            if ELLIPSIS_LEN <= max_len {
                msg.push(ELLIPSIS);
            }
        }
    }

}
