//! # Outcome
//!
//! Two-variant result used at every boundary of the data layer.
//!
//! `Outcome<T>` is `Result<T, Failure>`, so the standard combinators carry the
//! monadic surface directly: `map`, `and_then` (flat-map), `or_else` and `?`.
//! [`OutcomeExt`] adds the remaining combinators (`fold`, `zip`, `recover`,
//! `tap`, `tap_failure`) and the free functions below cover
//! `zip3`, `sequence` and `traverse`.
//!
//! A failure is inert: `map`/`and_then` hand the original failure value back
//! without running the supplied closure.
//!
//! ```rust
//! use strata_core::outcome::{Outcome, OutcomeExt};
//! use strata_core::Failure;
//!
//! let price: Outcome<u32> = Ok(40);
//! let total = price
//!     .and_then(|p| if p > 0 { Ok(p + 2) } else { Err(Failure::validation("free", vec![])) })
//!     .fold(|t| t.to_string(), |f| f.to_string());
//! assert_eq!(total, "42");
//! ```

use crate::error::{Failure, FailureKind};

/// Success(`T`) or Failure([`Failure`])
pub type Outcome<T> = Result<T, Failure>;

/// Combinators on [`Outcome`] beyond what `Result` already provides
pub trait OutcomeExt<T>: Sized {
    /// Collapse both variants into one value
    fn fold<R>(self, on_success: impl FnOnce(T) -> R, on_failure: impl FnOnce(Failure) -> R) -> R;

    /// Turn any failure into a success computed from it
    fn recover(self, f: impl FnOnce(Failure) -> T) -> Outcome<T>;

    /// Recover only failures of the given kind; other failures pass through
    fn recover_kind(self, kind: FailureKind, f: impl FnOnce(Failure) -> T) -> Outcome<T>;

    /// Observe a success without changing the outcome
    fn tap(self, f: impl FnOnce(&T)) -> Outcome<T>;

    /// Observe a failure without changing the outcome
    fn tap_failure(self, f: impl FnOnce(&Failure)) -> Outcome<T>;

    /// Pair two outcomes; the first failure (left to right) wins
    fn zip<U>(self, other: Outcome<U>) -> Outcome<(T, U)>;

    fn failure_kind(&self) -> Option<FailureKind>;
}

impl<T> OutcomeExt<T> for Outcome<T> {
    fn fold<R>(self, on_success: impl FnOnce(T) -> R, on_failure: impl FnOnce(Failure) -> R) -> R {
        match self {
            Ok(value) => on_success(value),
            Err(failure) => on_failure(failure),
        }
    }

    fn recover(self, f: impl FnOnce(Failure) -> T) -> Outcome<T> {
        match self {
            Ok(value) => Ok(value),
            Err(failure) => Ok(f(failure)),
        }
    }

    fn recover_kind(self, kind: FailureKind, f: impl FnOnce(Failure) -> T) -> Outcome<T> {
        match self {
            Err(failure) if failure.kind() == kind => Ok(f(failure)),
            other => other,
        }
    }

    fn tap(self, f: impl FnOnce(&T)) -> Outcome<T> {
        if let Ok(value) = &self {
            f(value);
        }
        self
    }

    fn tap_failure(self, f: impl FnOnce(&Failure)) -> Outcome<T> {
        if let Err(failure) = &self {
            f(failure);
        }
        self
    }

    fn zip<U>(self, other: Outcome<U>) -> Outcome<(T, U)> {
        match (self, other) {
            (Ok(a), Ok(b)) => Ok((a, b)),
            (Err(failure), _) | (_, Err(failure)) => Err(failure),
        }
    }

    fn failure_kind(&self) -> Option<FailureKind> {
        self.as_ref().err().map(Failure::kind)
    }
}

/// Three-way [`OutcomeExt::zip`]
pub fn zip3<A, B, C>(a: Outcome<A>, b: Outcome<B>, c: Outcome<C>) -> Outcome<(A, B, C)> {
    let ((a, b), c) = a.zip(b).zip(c)?;
    Ok((a, b, c))
}

/// Collect outcomes into one; the first failure in iteration order wins
pub fn sequence<T, I>(outcomes: I) -> Outcome<Vec<T>>
where
    I: IntoIterator<Item = Outcome<T>>,
{
    outcomes.into_iter().collect()
}

/// Map every item through `f`, stopping at the first failure.
///
/// Items after a failing one are never passed to `f`.
pub fn traverse<A, B, I, F>(items: I, mut f: F) -> Outcome<Vec<B>>
where
    I: IntoIterator<Item = A>,
    F: FnMut(A) -> Outcome<B>,
{
    let iter = items.into_iter();
    let mut collected = Vec::with_capacity(iter.size_hint().0);
    for item in iter {
        collected.push(f(item)?);
    }
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn half(n: i64) -> Outcome<i64> {
        if n % 2 == 0 {
            Ok(n / 2)
        } else {
            Err(Failure::validation(format!("{n} is odd"), vec![]))
        }
    }

    #[test]
    fn test_failure_is_inert_under_map_and_and_then() {
        let calls = Cell::new(0);
        let original = Failure::network("socket closed").with_code("ECONNRESET");

        let result: Outcome<i64> = Err(original.clone())
            .map(|n: i64| {
                calls.set(calls.get() + 1);
                n + 1
            })
            .and_then(|n| {
                calls.set(calls.get() + 1);
                half(n)
            })
            .map(|n| {
                calls.set(calls.get() + 1);
                n * 3
            });

        assert_eq!(calls.get(), 0);
        assert_eq!(result, Err(original));
    }

    #[test]
    fn test_fold_and_recover() {
        assert_eq!(half(8).fold(|n| n, |_| -1), 4);
        assert_eq!(half(7).fold(|n| n, |_| -1), -1);

        assert_eq!(half(7).recover(|_| 0), Ok(0));
        assert_eq!(half(6).recover(|_| 0), Ok(3));
    }

    #[test]
    fn test_recover_kind_only_touches_matching_failures() {
        let not_found: Outcome<i64> = Err(Failure::not_found("gone"));
        assert_eq!(not_found.recover_kind(FailureKind::NotFound, |_| 0), Ok(0));

        let offline: Outcome<i64> = Err(Failure::network("offline"));
        let passed = offline.recover_kind(FailureKind::NotFound, |_| 0);
        assert_eq!(passed.failure_kind(), Some(FailureKind::Network));
    }

    #[test]
    fn test_tap_and_tap_failure_observe_without_changing() {
        let seen = Cell::new(0);
        let ok = half(10).tap(|n| seen.set(*n)).tap_failure(|_| seen.set(-1));
        assert_eq!(ok, Ok(5));
        assert_eq!(seen.get(), 5);

        let err = half(3).tap(|_| seen.set(100)).tap_failure(|_| seen.set(-1));
        assert!(err.is_err());
        assert_eq!(seen.get(), -1);
    }

    #[test]
    fn test_zip_prefers_first_failure() {
        assert_eq!(half(2).zip(half(4)), Ok((1, 2)));

        let first = half(1).zip(Err::<i64, _>(Failure::timeout("late")));
        assert_eq!(first.failure_kind(), Some(FailureKind::Validation));

        assert_eq!(zip3(half(2), half(4), half(6)), Ok((1, 2, 3)));
        assert!(zip3(half(2), half(5), half(6)).is_err());
    }

    #[test]
    fn test_sequence_and_traverse() {
        assert_eq!(sequence(vec![half(2), half(4)]), Ok(vec![1, 2]));
        assert!(sequence(vec![half(2), half(3), half(4)]).is_err());

        let visited = Cell::new(0);
        let result = traverse(vec![2, 4, 5, 6, 8], |n| {
            visited.set(visited.get() + 1);
            half(n)
        });
        assert!(result.is_err());
        assert_eq!(visited.get(), 3);

        assert_eq!(traverse(Vec::<i64>::new(), half), Ok(vec![]));
    }

    #[test]
    fn test_or_else_switches_to_alternative() {
        let fallback = half(3).or_else(|_| half(10));
        assert_eq!(fallback, Ok(5));
    }
}
