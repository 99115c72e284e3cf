//! Join combinators over many deferred results.
//!
//! - [`reduce`]: fail-fast. Succeeds with every value once all inputs
//!   succeed, fails with the first error and cancels the rest.
//! - [`pessimistic_reduce`]: wait-for-all. Never fails; hands back the input
//!   tokens once every one of them is ready.
//!
//! Aborting an aggregate aborts every input it wraps.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::deferred::DeferredResult;

struct Slots<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

/// Fail-fast join.
///
/// The aggregate succeeds with the input values in input order (not
/// completion order) once every input has succeeded. The first failure fails
/// the aggregate with that error and aborts it, which aborts every input that
/// is still pending. An empty input succeeds immediately with an empty `Vec`.
pub fn reduce<T, E>(inputs: Vec<DeferredResult<T, E>>) -> DeferredResult<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let result = DeferredResult::new();
    if inputs.is_empty() {
        result.succeed(Vec::new());
        return result;
    }

    let inputs: Arc<[DeferredResult<T, E>]> = inputs.into();
    forward_abort(&result, &inputs);

    let slots = Arc::new(Mutex::new(Slots {
        values: vec![None; inputs.len()],
        remaining: inputs.len(),
    }));

    for (index, input) in inputs.iter().enumerate() {
        let result = result.clone();
        let slots = Arc::clone(&slots);
        input.on_ready(move |token| match token.result() {
            Some(Ok(value)) => {
                let values = {
                    let mut slots = slots.lock();
                    slots.values[index] = Some(value);
                    slots.remaining -= 1;
                    if slots.remaining > 0 {
                        return;
                    }
                    std::mem::take(&mut slots.values)
                };
                result.succeed(values.into_iter().flatten().collect());
            }
            Some(Err(error)) => {
                if result.fail(error) {
                    result.abort();
                }
            }
            None => {}
        });
    }
    result
}

/// Wait-for-all join.
///
/// Waits until every input is ready, whatever its outcome, then succeeds with
/// the input tokens themselves so each can be inspected. Inputs that are
/// aborted before readiness keep the aggregate pending. An empty input
/// succeeds immediately with an empty `Vec`.
pub fn pessimistic_reduce<T, E>(
    inputs: Vec<DeferredResult<T, E>>,
) -> DeferredResult<Vec<DeferredResult<T, E>>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let result = DeferredResult::new();
    if inputs.is_empty() {
        result.succeed(Vec::new());
        return result;
    }

    let inputs: Arc<[DeferredResult<T, E>]> = inputs.into();
    forward_abort(&result, &inputs);

    let remaining = Arc::new(Mutex::new(inputs.len()));
    for input in inputs.iter() {
        let result = result.clone();
        let remaining = Arc::clone(&remaining);
        let all = Arc::clone(&inputs);
        input.on_ready(move |_| {
            let done = {
                let mut remaining = remaining.lock();
                *remaining -= 1;
                *remaining == 0
            };
            if done {
                result.succeed(all.to_vec());
            }
        });
    }
    result
}

/// Fail-fast join for tokens without a meaningful value.
pub fn reduce_void<T, E>(inputs: Vec<DeferredResult<T, E>>) -> DeferredResult<(), E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    reduce(inputs).map(|_| ())
}

/// Whether every token in `tokens` is ready and succeeded.
///
/// Used to read the outcome of a [`pessimistic_reduce`] aggregate.
pub fn all_succeeded<T, E>(tokens: &[DeferredResult<T, E>]) -> bool
where
    T: Send + 'static,
    E: Send + 'static,
{
    tokens.iter().all(DeferredResult::is_succeeded)
}

fn forward_abort<A, T, E>(aggregate: &DeferredResult<A, E>, inputs: &Arc<[DeferredResult<T, E>]>)
where
    A: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let inputs = Arc::clone(inputs);
    aggregate.on_abort(move || {
        for input in inputs.iter() {
            input.abort();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    type Token = DeferredResult<char, String>;

    fn tokens(n: usize) -> Vec<Token> {
        (0..n).map(|_| Token::new()).collect()
    }

    #[test]
    fn reduce_preserves_input_order() {
        let inputs = tokens(3);
        let all = reduce(inputs.clone());

        inputs[2].succeed('c');
        inputs[0].succeed('a');
        assert!(!all.is_ready());
        inputs[1].succeed('b');

        assert_eq!(all.value(), Some(vec!['a', 'b', 'c']));
    }

    #[test]
    fn reduce_fails_fast_and_aborts_siblings() {
        let inputs = tokens(3);
        let all = reduce(inputs.clone());

        inputs[1].fail("second".into());

        assert_eq!(all.error().as_deref(), Some("second"));
        assert!(inputs[0].is_aborted());
        assert!(inputs[2].is_aborted());
        assert!(!inputs[1].is_aborted());
    }

    #[test]
    fn reduce_observes_only_first_failure() {
        let inputs = tokens(2);
        let all = reduce(inputs.clone());

        inputs[0].fail("first".into());
        inputs[1].fail("second".into());

        assert_eq!(all.error().as_deref(), Some("first"));
    }

    #[test]
    fn reduce_with_already_failed_input() {
        let inputs = vec![Token::new(), Token::failed("early".into()), Token::new()];
        let all = reduce(inputs.clone());

        assert_eq!(all.error().as_deref(), Some("early"));
        assert!(inputs[0].is_aborted());
        assert!(inputs[2].is_aborted());
    }

    #[test]
    fn aborting_reduce_aborts_inputs() {
        let inputs = tokens(2);
        let all = reduce(inputs.clone());
        all.abort();

        assert!(inputs.iter().all(Token::is_aborted));
        assert!(!all.is_ready());
    }

    #[test]
    fn pessimistic_reduce_waits_for_all_and_never_fails() {
        let inputs = tokens(3);
        let all = pessimistic_reduce(inputs.clone());

        inputs[0].fail("first".into());
        assert!(!all.is_ready());
        assert!(!inputs[1].is_aborted());
        inputs[1].succeed('b');
        inputs[2].succeed('c');

        let settled = all.value().expect("aggregate should succeed");
        assert_eq!(settled.len(), 3);
        assert_eq!(settled.iter().filter(|t| t.is_failed()).count(), 1);
        assert!(settled[0].ptr_eq(&inputs[0]));
        assert!(!all_succeeded(&settled));
    }

    #[test]
    fn aborting_pessimistic_reduce_aborts_inputs() {
        let inputs = tokens(2);
        let all = pessimistic_reduce(inputs.clone());
        all.abort();

        assert!(inputs.iter().all(Token::is_aborted));
    }

    #[test]
    fn empty_inputs_succeed_synchronously() {
        let all = reduce(Vec::<Token>::new());
        assert_eq!(all.value(), Some(vec![]));
        assert_eq!(all.pending_continuations(), 0);

        let settled = pessimistic_reduce(Vec::<Token>::new());
        assert!(settled.is_succeeded());
        assert_eq!(settled.value().map(|v| v.len()), Some(0));

        assert!(reduce_void(Vec::<Token>::new()).is_succeeded());
    }

    #[test]
    fn reduce_void_follows_reduce() {
        let inputs = tokens(2);
        let done = reduce_void(inputs.clone());
        inputs[0].succeed('x');
        inputs[1].succeed('y');
        assert!(done.is_succeeded());

        let inputs = tokens(2);
        let done = reduce_void(inputs.clone());
        done.abort();
        assert!(inputs.iter().all(Token::is_aborted));
    }
}
