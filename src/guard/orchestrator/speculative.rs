//! Speculative batches: several copies of the request in flight at once,
//! first acceptable answer wins, the rest are aborted.

use super::policy::BatchPolicy;
use super::{AttemptOutcome, AttemptResult, Attempter, Phase, RetryAttempt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

#[derive(Debug)]
struct Winner {
    index: u32,
    thought: Option<String>,
    reply: String,
}

/// Batches of growing size over attempts `first..=last`.
pub(super) async fn run(
    attempter: &Attempter,
    policy: &BatchPolicy,
    first: u32,
    last: u32,
    trace: &mut Vec<RetryAttempt>,
) -> Phase {
    let mut next = first;
    let mut batch = 0;
    while next <= last {
        batch += 1;
        let size = policy.batch_size(batch, last - next + 1);
        tracing::info!(batch, size, first_attempt = next, "issuing speculative batch");
        let phase = run_batch(attempter, next, size, policy.timeout, trace).await;
        if !matches!(phase, Phase::Continue) {
            return phase;
        }
        next += size;
    }
    Phase::Continue
}

pub(super) async fn run_batch(
    attempter: &Attempter,
    first: u32,
    size: u32,
    timeout: Duration,
    trace: &mut Vec<RetryAttempt>,
) -> Phase {
    let winner: Arc<Mutex<Option<Winner>>> = Arc::new(Mutex::new(None));
    let mut tasks = JoinSet::new();
    for index in first..first + size {
        let attempter = attempter.clone();
        let winner = Arc::clone(&winner);
        tasks.spawn(async move {
            let result = attempter.attempt(index).await;
            if let AttemptResult::Accepted { thought, reply } = &result {
                let mut slot = winner.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.is_none() {
                    *slot = Some(Winner {
                        index,
                        thought: thought.clone(),
                        reply: reply.clone(),
                    });
                }
            }
            (index, result)
        });
    }

    let deadline = Instant::now() + timeout;
    let mut finished = HashSet::new();
    let mut terminal = None;
    let mut timed_out = false;
    loop {
        match tokio::time::timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok((index, result)))) => {
                finished.insert(index);
                let outcome = match result {
                    AttemptResult::Accepted { .. } => AttemptOutcome::Success,
                    AttemptResult::Terminal(reason) => {
                        terminal.get_or_insert((index, reason));
                        AttemptOutcome::Failure
                    }
                    AttemptResult::Failed(_) => AttemptOutcome::Failure,
                };
                trace.push(RetryAttempt {
                    index,
                    delay_before: Duration::ZERO,
                    outcome,
                });
                if winner.lock().unwrap_or_else(PoisonError::into_inner).is_some() {
                    break;
                }
            }
            Ok(Some(Err(error))) => {
                tracing::warn!(%error, "speculative attempt task failed");
            }
            Ok(None) => break,
            Err(_) => {
                timed_out = true;
                tracing::warn!(timeout_secs = timeout.as_secs(), "speculative batch timed out");
                break;
            }
        }
    }

    let in_flight = tasks.len();
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    if in_flight > 0 {
        tracing::debug!(in_flight, "aborted remaining speculative attempts");
    }
    for index in first..first + size {
        if !finished.contains(&index) {
            trace.push(RetryAttempt {
                index,
                delay_before: Duration::ZERO,
                outcome: if timed_out {
                    AttemptOutcome::Timeout
                } else {
                    AttemptOutcome::Cancelled
                },
            });
        }
    }

    // Every task is gone; nothing can write the slot any more.
    let winner = winner.lock().unwrap_or_else(PoisonError::into_inner).take();
    match (winner, terminal) {
        (Some(w), _) => Phase::Accepted {
            attempt: w.index,
            thought: w.thought,
            reply: w.reply,
        },
        (None, Some((attempt, reason))) => Phase::Terminal { attempt, reason },
        (None, None) => Phase::Continue,
    }
}
