//! Handle for retrieving the results of a job submitted with
//! [`ThreadPool::add_with_results()`][crate::ThreadPool::add_with_results].

use std::any::Any;
use std::mem;
use std::panic;

use crate::JobAbandoned;
use crate::panic_trap::describe_panic;

pub(crate) type SlotResult<R> = Result<R, Box<dyn Any + Send>>;

/// Receives the return values of the slots of one job.
///
/// If a slot panicked, [`join()`][Self::join] re-throws the panic on the joining thread. If the
/// handle is dropped without being joined and a slot panicked, the panic is logged and discarded.
#[derive(Debug)]
pub struct JobHandle<R> {
    receivers: Vec<oneshot::Receiver<SlotResult<R>>>,
}

impl<R> JobHandle<R> {
    pub(crate) fn new(receivers: Vec<oneshot::Receiver<SlotResult<R>>>) -> Self {
        Self { receivers }
    }

    /// Blocks until every slot of the job has finished and returns their results in slot order.
    ///
    /// # Errors
    ///
    /// Returns [`JobAbandoned`] if the pool was closed without finishing the queue before the job
    /// started.
    ///
    /// # Panics
    ///
    /// If a slot panicked, the panic of the lowest numbered failed slot is resumed here after all
    /// slots have finished.
    pub fn join(mut self) -> Result<Vec<R>, JobAbandoned> {
        let outcomes = mem::take(&mut self.receivers)
            .into_iter()
            .map(oneshot::Receiver::recv)
            .collect::<Vec<_>>();

        let mut values = Vec::with_capacity(outcomes.len());
        let mut first_panic = None;
        let mut abandoned = false;

        for outcome in outcomes {
            match outcome {
                Ok(Ok(value)) => values.push(value),
                Ok(Err(payload)) => {
                    first_panic.get_or_insert(payload);
                }
                Err(oneshot::RecvError) => abandoned = true,
            }
        }

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }

        if abandoned {
            return Err(JobAbandoned);
        }

        Ok(values)
    }
}

impl<R> Drop for JobHandle<R> {
    fn drop(&mut self) {
        for receiver in &self.receivers {
            if let Ok(Err(payload)) = receiver.try_recv() {
                tracing::warn!(
                    panic_message = %describe_panic(&*payload),
                    "job slot panicked but its JobHandle was dropped without being joined"
                );
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::panic::AssertUnwindSafe;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(JobHandle<u32>: Send);

    fn handle_with<R>(
        count: usize,
    ) -> (Vec<oneshot::Sender<SlotResult<R>>>, JobHandle<R>) {
        let (senders, receivers) = std::iter::repeat_with(oneshot::channel)
            .take(count)
            .unzip();
        (senders, JobHandle::new(receivers))
    }

    #[test]
    fn results_come_back_in_slot_order() {
        let (senders, handle) = handle_with::<usize>(3);

        for (index, sender) in senders.into_iter().enumerate().rev() {
            sender.send(Ok(index * 10)).unwrap();
        }

        assert_eq!(handle.join().unwrap(), vec![0, 10, 20]);
    }

    #[test]
    fn dropped_senders_mean_abandoned() {
        let (senders, handle) = handle_with::<()>(2);
        drop(senders);

        assert_eq!(handle.join(), Err(JobAbandoned));
    }

    #[test]
    fn slot_panic_is_resumed() {
        let (mut senders, handle) = handle_with::<()>(2);

        senders.pop().unwrap().send(Err(Box::new("second failed"))).unwrap();
        senders.pop().unwrap().send(Ok(())).unwrap();

        let payload = panic::catch_unwind(AssertUnwindSafe(|| handle.join())).unwrap_err();
        assert_eq!(describe_panic(&*payload), "second failed");
    }

    #[test]
    fn dropping_unjoined_handle_with_panic_is_quiet() {
        let (mut senders, handle) = handle_with::<()>(1);

        senders.pop().unwrap().send(Err(Box::new("ignored"))).unwrap();

        drop(handle);
    }
}
