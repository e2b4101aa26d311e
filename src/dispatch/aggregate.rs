//! Result folding for fan-out and broadcast

use crate::error::{DispatchError, DispatchResult};
use crate::models::response::ResponseModel;

/// Left fold in input order starting from "no opinion". A `None` result
/// merges as identity.
pub fn fold_merge<R, I>(merge: fn(R, Option<R>) -> R, results: I) -> Option<R>
where
    I: IntoIterator<Item = Option<R>>,
{
    results.into_iter().fold(None, |acc, next| match acc {
        None => next,
        Some(acc) => Some(merge(acc, next)),
    })
}

/// First non-null, non-empty result in input order.
pub fn first_useful<R, I>(results: I) -> Option<R>
where
    R: ResponseModel,
    I: IntoIterator<Item = Option<R>>,
{
    results
        .into_iter()
        .flatten()
        .find(|response| !response.is_empty())
}

/// How a failed plugin contribution is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginFailureMode {
    /// Fail the call.
    Propagate,
    /// Drop the contribution and keep going.
    Drop,
}

/// Turns per-handler outcomes into contributions, in input order.
///
/// Cancellation and in-process failures always fail the call; plugin
/// failures follow `mode`.
pub fn collect_contributions<R>(
    endpoint: &str,
    outcomes: Vec<(String, DispatchResult<Option<R>>)>,
    mode: PluginFailureMode,
) -> DispatchResult<Vec<Option<R>>> {
    if outcomes
        .iter()
        .any(|(_, outcome)| matches!(outcome, Err(e) if e.is_cancelled()))
    {
        return Err(DispatchError::Cancelled);
    }

    let mut contributions = Vec::with_capacity(outcomes.len());
    for (origin, outcome) in outcomes {
        match outcome {
            Ok(response) => contributions.push(response),
            Err(e) if e.is_plugin_failure() && mode == PluginFailureMode::Drop => {
                tracing::warn!("Dropping {} contribution to {}: {}", origin, endpoint, e);
                contributions.push(None);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(contributions)
}
