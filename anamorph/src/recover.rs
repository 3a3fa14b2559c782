//! Recovery of a token's covert value by searching for its ephemeral scalar.
//!
//! A token carrying `cm` has the ephemeral key `R = (t + cm)·G`. Knowing `t`, the covert value is
//! the smallest `g` with `(t + g)·G = R`, which is found by walking `t·G + g·G` for increasing
//! `g`. Three strategies are available:
//!
//! * [`Strategy::Linear`]: one point addition per guess on the calling thread.
//! * [`Strategy::Parallel`]: the range is split into chunks which are walked on the rayon pool.
//!   The lowest-index hit wins, so the result is the same as a linear walk.
//! * [`Strategy::BabySteps`]: baby-step giant-step over a table of `j·G` for `j < ⌈√(max+1)⌉`,
//!   capped at [`MAX_BABY_STEPS`] entries. The table only depends on `max`, so a [`StepTable`] can
//!   be built once and reused.

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::ecc::{Curve, NistP256, Scalar};
use crate::token::Token;
use crate::Error;

/// The largest covert value searched for when a policy has no explicit maximum.
pub const DEFAULT_MAX_SEARCH: u64 = 1000;

/// The number of guesses in each chunk of a parallel search.
pub const CHUNK_LEN: u64 = 4096;

/// The largest number of entries in a baby-step table. Past this, searches take more giant steps.
pub const MAX_BABY_STEPS: u64 = 1 << 20;

/// The number of guesses between deadline checks.
const CHECK_INTERVAL: u64 = 1024;

/// The search algorithm used to recover a covert value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Walk the range on the calling thread.
    #[default]
    Linear,

    /// Walk chunks of the range on the rayon thread pool.
    Parallel,

    /// Baby-step giant-step.
    BabySteps,
}

/// How to search for a covert value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchPolicy {
    /// The inclusive upper bound of the search; [`DEFAULT_MAX_SEARCH`] if `None`.
    pub max: Option<u64>,

    /// The search algorithm.
    pub strategy: Strategy,

    /// How long to search before giving up; unlimited if `None`.
    pub timeout: Option<Duration>,
}

impl SearchPolicy {
    /// Returns a linear search up to [`DEFAULT_MAX_SEARCH`] with no timeout.
    #[must_use]
    pub const fn new() -> SearchPolicy {
        SearchPolicy { max: None, strategy: Strategy::Linear, timeout: None }
    }

    /// Sets the inclusive upper bound of the search.
    #[must_use]
    pub const fn with_max(self, max: u64) -> SearchPolicy {
        SearchPolicy { max: Some(max), ..self }
    }

    /// Sets the search algorithm.
    #[must_use]
    pub const fn with_strategy(self, strategy: Strategy) -> SearchPolicy {
        SearchPolicy { strategy, ..self }
    }

    /// Sets the search timeout.
    #[must_use]
    pub const fn with_timeout(self, timeout: Duration) -> SearchPolicy {
        SearchPolicy { timeout: Some(timeout), ..self }
    }

    /// Returns the effective inclusive upper bound of the search.
    #[must_use]
    pub const fn bound(&self) -> u64 {
        match self.max {
            Some(max) => max,
            None => DEFAULT_MAX_SEARCH,
        }
    }
}

/// Recovers the smallest covert value carried by `token` for the shared scalar `t`.
///
/// # Errors
///
/// Returns [`Error::InvalidPoint`] if the token's ephemeral key is invalid,
/// [`Error::CovertValueNotFound`] if no value in range matches, or [`Error::SearchTimedOut`] if
/// the policy's timeout passes first.
#[instrument(skip_all, fields(strategy = ?policy.strategy, max = policy.bound()))]
pub fn recover(t: &Scalar, token: &Token, policy: &SearchPolicy) -> Result<u64, Error> {
    let target = token.ephemeral_key()?;
    let start = Instant::now();
    let result = search::<NistP256>(t, &target, policy);
    debug!(elapsed = ?start.elapsed(), found = result.is_ok(), "covert value search finished");
    result
}

/// Searches `[0, policy.bound()]` for the smallest `g` with `(t + g)·G = target` in the group `C`.
///
/// # Errors
///
/// Returns [`Error::CovertValueNotFound`] if no value in range matches, or
/// [`Error::SearchTimedOut`] if the policy's timeout passes first.
pub fn search<C: Curve>(
    t: &C::Scalar,
    target: &C::Point,
    policy: &SearchPolicy,
) -> Result<u64, Error> {
    let max = policy.bound();
    let deadline = Deadline::after(policy.timeout);
    match policy.strategy {
        Strategy::Linear => linear::<C>(t, target, max, deadline),
        Strategy::Parallel => parallel::<C>(t, target, max, deadline, CHUNK_LEN),
        Strategy::BabySteps => {
            StepTable::<C>::new_until(max, deadline)?.search_until(t, target, deadline)
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Deadline(Option<Instant>);

impl Deadline {
    fn after(timeout: Option<Duration>) -> Deadline {
        Deadline(timeout.and_then(|timeout| Instant::now().checked_add(timeout)))
    }

    fn expired(&self) -> bool {
        self.0.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

fn linear<C: Curve>(
    t: &C::Scalar,
    target: &C::Point,
    max: u64,
    deadline: Deadline,
) -> Result<u64, Error> {
    walk::<C>(C::mul_gen(t), target, 0, max, deadline)
        .unwrap_or(Err(Error::CovertValueNotFound { max }))
}

fn parallel<C: Curve>(
    t: &C::Scalar,
    target: &C::Point,
    max: u64,
    deadline: Deadline,
    chunk_len: u64,
) -> Result<u64, Error> {
    let t_g = C::mul_gen(t);
    (0..=max / chunk_len)
        .into_par_iter()
        .find_map_first(|i| {
            let start = i * chunk_len;
            let end = start.saturating_add(chunk_len - 1).min(max);
            walk::<C>(t_g + C::mul_gen(&C::scalar(start)), target, start, end, deadline)
        })
        .unwrap_or(Err(Error::CovertValueNotFound { max }))
}

/// Walks `guess, guess + G, …` over `[start, end]`, returning the first index which matches
/// `target`, or a timeout.
fn walk<C: Curve>(
    mut guess: C::Point,
    target: &C::Point,
    start: u64,
    end: u64,
    deadline: Deadline,
) -> Option<Result<u64, Error>> {
    let g = C::generator();
    for cm in start..=end {
        if (cm - start) % CHECK_INTERVAL == 0 && deadline.expired() {
            return Some(Err(Error::SearchTimedOut { searched: cm }));
        }
        if C::points_eq(&guess, target) {
            return Some(Ok(cm));
        }
        guess = guess + g;
    }
    None
}

/// A precomputed baby-step table for searches up to a fixed maximum.
pub struct StepTable<C: Curve> {
    max: u64,
    m: u64,
    baby_steps: HashMap<Vec<u8>, u64>,
    giant_step: C::Point,
}

impl<C: Curve> StepTable<C> {
    /// Builds the table of `j·G` for `j < min(⌈√(max+1)⌉, MAX_BABY_STEPS)`.
    #[must_use]
    pub fn new(max: u64) -> StepTable<C> {
        match StepTable::new_until(max, Deadline(None)) {
            Ok(table) => table,
            Err(_) => unreachable!("tables without a deadline always finish"),
        }
    }

    fn new_until(max: u64, deadline: Deadline) -> Result<StepTable<C>, Error> {
        let m = ceil_sqrt(u128::from(max) + 1).min(MAX_BABY_STEPS);
        let g = C::generator();

        let mut baby_steps = HashMap::with_capacity(usize::try_from(m).unwrap_or_default());
        let mut step = C::mul_gen(&C::scalar(0));
        for j in 0..m {
            if j % CHECK_INTERVAL == 0 && deadline.expired() {
                return Err(Error::SearchTimedOut { searched: 0 });
            }
            // In groups smaller than the table, keep the smallest index of each point.
            baby_steps.entry(C::point_key(&step)).or_insert(j);
            step = step + g;
        }

        Ok(StepTable { max, m, baby_steps, giant_step: C::mul_gen(&C::scalar(m)) })
    }

    /// The inclusive upper bound of searches using this table.
    #[must_use]
    pub const fn max(&self) -> u64 {
        self.max
    }

    /// Searches `[0, max]` for the smallest `g` with `(t + g)·G = target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CovertValueNotFound`] if no value in range matches.
    pub fn search(&self, t: &C::Scalar, target: &C::Point) -> Result<u64, Error> {
        self.search_until(t, target, Deadline(None))
    }

    fn search_until(
        &self,
        t: &C::Scalar,
        target: &C::Point,
        deadline: Deadline,
    ) -> Result<u64, Error> {
        // g = i·m + j iff target - t·G - i·m·G = j·G.
        let mut y = *target - C::mul_gen(t);
        for i in 0..=self.max / self.m {
            if i % CHECK_INTERVAL == 0 && deadline.expired() {
                return Err(Error::SearchTimedOut { searched: i * self.m });
            }
            if let Some(&j) = self.baby_steps.get(&C::point_key(&y)) {
                if let Some(g) = (i * self.m).checked_add(j).filter(|&g| g <= self.max) {
                    return Ok(g);
                }
            }
            y = y - self.giant_step;
        }
        Err(Error::CovertValueNotFound { max: self.max })
    }
}

impl<C: Curve> Debug for StepTable<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepTable").field("max", &self.max).field("m", &self.m).finish()
    }
}

/// Returns `⌈√n⌉` for `n ≤ 2^64`.
fn ceil_sqrt(n: u128) -> u64 {
    let mut m = (n as f64).sqrt() as u128;
    while m * m < n {
        m += 1;
    }
    while m > 0 && (m - 1) * (m - 1) >= n {
        m -= 1;
    }
    u64::try_from(m).expect("square roots of values ≤ 2^64 fit in 64 bits")
}
