//! Ordered fallback between alternative ways of producing the same resource.

use std::fmt::Display;

use futures_util::future::BoxFuture;

use crate::core::errors::RagError;

/// A value together with the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Built<S, T> {
    pub strategy_used: S,
    pub value: T,
}

/// Tries `strategies` in order and returns the first success.
///
/// On total failure every attempt's error is returned, in order.
pub async fn first_successful<'a, S, T>(
    strategies: &[S],
    mut attempt: impl FnMut(S) -> BoxFuture<'a, Result<T, RagError>>,
) -> Result<Built<S, T>, Vec<(S, RagError)>>
where
    S: Copy + Display,
{
    let mut failures = Vec::with_capacity(strategies.len());

    for &strategy in strategies {
        match attempt(strategy).await {
            Ok(value) => {
                if !failures.is_empty() {
                    tracing::info!(
                        "Strategy '{}' succeeded after {} failed attempt(s)",
                        strategy,
                        failures.len()
                    );
                }
                return Ok(Built {
                    strategy_used: strategy,
                    value,
                });
            }
            Err(err) => {
                tracing::warn!("Strategy '{}' failed: {}", strategy, err);
                failures.push((strategy, err));
            }
        }
    }

    Err(failures)
}
