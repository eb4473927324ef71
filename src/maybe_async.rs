//! Values that are usually available right away but may have to be awaited.
//!
//! Lifecycle hooks almost always finish synchronously. [`MaybeAsync`] lets
//! them return a plain result in that case and a boxed future only when they
//! really have to wait on something, so a hook wave where nothing is pending
//! completes without touching the executor.

use std::fmt;
use std::future::{Future, IntoFuture};

use futures_util::future::{self, Either, FutureExt, LocalBoxFuture};

use crate::error::{QueryError, Result};

pub enum MaybeAsync<T> {
    Ready(Result<T>),
    Pending(LocalBoxFuture<'static, Result<T>>),
}

impl<T: 'static> MaybeAsync<T> {
    #[inline]
    pub fn ok(value: T) -> Self {
        Self::Ready(Ok(value))
    }

    #[inline]
    pub fn err(error: impl Into<QueryError>) -> Self {
        Self::Ready(Err(error.into()))
    }

    /// Wraps a future. Use this only when there is actually something to await.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + 'static,
    {
        Self::Pending(future.boxed_local())
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Maps the eventual value, synchronously when it is already available.
    pub fn map<U, F>(self, f: F) -> MaybeAsync<U>
    where
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        match self {
            Self::Ready(result) => MaybeAsync::Ready(result.map(f)),
            Self::Pending(fut) => MaybeAsync::Pending(fut.map(move |r| r.map(f)).boxed_local()),
        }
    }

    /// Runs `f` after the value is available. `f` runs synchronously if the
    /// value already is.
    pub fn and_then<U, F>(self, f: F) -> MaybeAsync<U>
    where
        U: 'static,
        F: FnOnce(T) -> MaybeAsync<U> + 'static,
    {
        match self {
            Self::Ready(Ok(value)) => f(value),
            Self::Ready(Err(e)) => MaybeAsync::Ready(Err(e)),
            Self::Pending(fut) => MaybeAsync::pending(async move { f(fut.await?).await }),
        }
    }

    /// Discards the value and yields `value` once this one is done.
    pub fn after_return<U: 'static>(self, value: U) -> MaybeAsync<U> {
        self.map(move |_| value)
    }

    /// Gathers many values. Stays synchronous when none of them is pending,
    /// otherwise awaits all pending ones together.
    pub fn join_all<I>(items: I) -> MaybeAsync<Vec<T>>
    where
        I: IntoIterator<Item = MaybeAsync<T>>,
    {
        let mut iter = items.into_iter();
        let mut ready = Vec::with_capacity(iter.size_hint().0);

        while let Some(item) = iter.next() {
            match item {
                Self::Ready(result) => ready.push(result),
                Self::Pending(fut) => {
                    let rest: Vec<LocalBoxFuture<'static, Result<T>>> = std::iter::once(fut)
                        .chain(iter.map(Self::boxed))
                        .collect();

                    return MaybeAsync::pending(async move {
                        let mut values = ready.into_iter().collect::<Result<Vec<_>>>()?;
                        values.extend(future::try_join_all(rest).await?);
                        Ok(values)
                    });
                }
            }
        }

        MaybeAsync::Ready(ready.into_iter().collect())
    }

    /// Runs every item and then returns `value`.
    pub fn map_after_all_return<U, I>(items: I, value: U) -> MaybeAsync<U>
    where
        U: 'static,
        I: IntoIterator<Item = MaybeAsync<T>>,
    {
        Self::join_all(items).after_return(value)
    }

    fn boxed(self) -> LocalBoxFuture<'static, Result<T>> {
        match self {
            Self::Ready(result) => future::ready(result).boxed_local(),
            Self::Pending(fut) => fut,
        }
    }
}

impl<T> From<Result<T>> for MaybeAsync<T> {
    fn from(result: Result<T>) -> Self {
        Self::Ready(result)
    }
}

impl<T> IntoFuture for MaybeAsync<T> {
    type Output = Result<T>;
    type IntoFuture = Either<future::Ready<Result<T>>, LocalBoxFuture<'static, Result<T>>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Self::Ready(result) => Either::Left(future::ready(result)),
            Self::Pending(fut) => Either::Right(fut),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MaybeAsync<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn ready_values_stay_synchronous() {
        let joined = MaybeAsync::join_all([MaybeAsync::ok(1), MaybeAsync::ok(2)]).map(|v| v.len());
        assert!(joined.is_ready());
        assert!(matches!(joined, MaybeAsync::Ready(Ok(2))));
    }

    #[test]
    fn and_then_runs_inline_when_ready() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let out = MaybeAsync::ok(3).and_then(move |v| {
            flag.set(true);
            MaybeAsync::ok(v * 2)
        });
        assert!(ran.get());
        assert!(matches!(out, MaybeAsync::Ready(Ok(6))));
    }

    #[tokio::test]
    async fn one_pending_item_makes_the_whole_join_pending() {
        let items = vec![
            MaybeAsync::ok(1),
            MaybeAsync::pending(async { Ok(2) }),
            MaybeAsync::ok(3),
        ];
        let joined = MaybeAsync::join_all(items);
        assert!(!joined.is_ready());
        assert_eq!(joined.await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn errors_propagate_through_pending_chains() {
        let out: MaybeAsync<i32> = MaybeAsync::pending(async { Ok(1) })
            .and_then(|_| MaybeAsync::err(QueryError::Hook("boom".into())));
        let err = out.await.unwrap_err();
        assert_eq!(err.to_string(), "hook error: boom");
    }
}
