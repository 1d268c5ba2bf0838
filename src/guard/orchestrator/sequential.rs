use super::policy::RetryPolicy;
use super::{AttemptOutcome, AttemptResult, Attempter, Phase, RetryAttempt};
use std::time::Duration;

/// Attempts `first..=last` one at a time; attempt N+1 starts only after N's
/// outcome is known.
pub(super) async fn run(
    attempter: &Attempter,
    policy: &RetryPolicy,
    first: u32,
    last: u32,
    trace: &mut Vec<RetryAttempt>,
) -> Phase {
    let mut delay_before = Duration::ZERO;
    for index in first..=last {
        match attempter.attempt(index).await {
            AttemptResult::Accepted { thought, reply } => {
                trace.push(RetryAttempt {
                    index,
                    delay_before,
                    outcome: AttemptOutcome::Success,
                });
                return Phase::Accepted {
                    attempt: index,
                    thought,
                    reply,
                };
            }
            AttemptResult::Terminal(reason) => {
                trace.push(RetryAttempt {
                    index,
                    delay_before,
                    outcome: AttemptOutcome::Failure,
                });
                return Phase::Terminal {
                    attempt: index,
                    reason,
                };
            }
            AttemptResult::Failed(_) => {
                trace.push(RetryAttempt {
                    index,
                    delay_before,
                    outcome: AttemptOutcome::Failure,
                });
            }
        }
        if index < policy.max_attempts {
            delay_before = policy.delay_after(index);
            tokio::time::sleep(delay_before).await;
        }
    }
    Phase::Continue
}
