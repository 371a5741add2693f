//! Trims and journal rebuilds run on one dedicated background thread,
//! so that `get`, `commit`, and `remove` never pay for them inline.
//!
//! The queue has room for a single pending request: submitting while
//! a request is already pending is a no-op, since the pending cleanup
//! will observe the latest state anyway.  A request submitted while
//! the worker is busy stays pending, and triggers one more run.
use std::io::Result;
use std::sync::mpsc::sync_channel;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::SyncSender;

use parking_lot::Mutex;

const WORKER_THREAD_NAME: &str = "disk-journal-cache-cleanup";

/// The submission side of the cleanup queue.
#[derive(Debug)]
pub(crate) struct CleanupQueue {
    // `None` once shut down.
    sender: Mutex<Option<SyncSender<()>>>,
}

/// The receiving side, until [`CleanupReceiver::spawn`] hands it to
/// the worker thread.
#[derive(Debug)]
pub(crate) struct CleanupReceiver {
    receiver: Receiver<()>,
}

/// Returns a fresh capacity-one cleanup queue.
pub(crate) fn channel() -> (CleanupQueue, CleanupReceiver) {
    let (sender, receiver) = sync_channel(1);

    (
        CleanupQueue {
            sender: Mutex::new(Some(sender)),
        },
        CleanupReceiver { receiver },
    )
}

impl CleanupQueue {
    /// Requests one run of the cleanup job.  Returns whether the
    /// request was queued: false if one is already pending, or if the
    /// queue was shut down.
    pub fn submit(&self) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.try_send(()).is_ok(),
            None => false,
        }
    }

    /// Stops accepting requests.  The worker thread exits once it has
    /// drained any pending request.
    pub fn shutdown(&self) {
        self.sender.lock().take();
    }
}

impl CleanupReceiver {
    /// Spawns the worker thread.  It calls `job` once per request,
    /// until `job` returns false or the queue is shut down (or
    /// dropped).
    pub fn spawn(self, mut job: impl FnMut() -> bool + Send + 'static) -> Result<()> {
        let receiver = self.receiver;

        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                while receiver.recv().is_ok() {
                    if !job() {
                        break;
                    }
                }
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::cleanup::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::sync::Barrier;
    use std::time::Duration;

    /// Every submitted request eventually runs the job.
    #[test]
    fn smoke_test() {
        let (queue, receiver) = channel();
        let (done_tx, done_rx) = mpsc::channel();

        receiver
            .spawn(move || done_tx.send(()).is_ok())
            .expect("spawn must succeed");

        assert!(queue.submit());
        done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("job must run");
    }

    /// While the worker is busy, at most one request stays pending.
    #[test]
    fn test_capacity_one() {
        let (queue, receiver) = channel();
        let barrier = Arc::new(Barrier::new(2));
        let (done_tx, done_rx) = mpsc::channel();

        {
            let barrier = barrier.clone();
            receiver
                .spawn(move || {
                    barrier.wait();
                    done_tx.send(()).is_ok()
                })
                .expect("spawn must succeed");
        }

        // The first request is picked up by the worker, which then
        // blocks on the barrier.
        assert!(queue.submit());
        // Retry until the worker has dequeued the first request.
        let mut queued = false;
        for _ in 0..1000 {
            if queue.submit() {
                queued = true;
                break;
            }

            std::thread::sleep(Duration::from_millis(1));
        }

        assert!(queued);
        // The queue is now full.
        assert!(!queue.submit());

        barrier.wait();
        done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("first job must run");
        barrier.wait();
        done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("pending job must run");
    }

    /// Nothing is queued after a shutdown.
    #[test]
    fn test_shutdown() {
        let (queue, receiver) = channel();

        receiver
            .spawn(|| unreachable!("no job should run after shutdown"))
            .expect("spawn must succeed");

        queue.shutdown();
        assert!(!queue.submit());
    }
}
