use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Task<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Producer side of the serialized execution queue.
///
/// Everything that mutates the election state (decoded datagrams, timer
/// callbacks, diagnostic blacklist commands) is enqueued here and executed
/// one task at a time by the single consumer, which makes the state machine
/// single-threaded from its own perspective.
pub struct QueueHandle<S> {
    tx: mpsc::UnboundedSender<Task<S>>,
}

impl<S> Clone for QueueHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S> QueueHandle<S> {
    pub fn enqueue(&self, task: impl FnOnce(&mut S) + Send + 'static) {
        // The consumer only goes away at process teardown; late tasks from
        // still-armed timers are simply dropped then.
        let _ = self.tx.send(Box::new(task));
    }
}

/// Consumer side. [`SerialQueue::spawn`] takes ownership of the state and
/// runs each task to completion, in FIFO order, before taking the next.
pub struct SerialQueue<S> {
    rx: mpsc::UnboundedReceiver<Task<S>>,
}

impl<S: Send + 'static> SerialQueue<S> {
    pub fn channel() -> (QueueHandle<S>, SerialQueue<S>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (QueueHandle { tx }, SerialQueue { rx })
    }

    pub fn spawn(mut self, mut state: S) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(task) = self.rx.recv().await {
                task(&mut state);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_tasks_run_in_fifo_order() {
        let (handle, queue) = SerialQueue::channel();
        let (done_tx, done_rx) = oneshot::channel();

        for i in 0..100u32 {
            handle.enqueue(move |log: &mut Vec<u32>| log.push(i));
        }
        handle.enqueue(move |log: &mut Vec<u32>| {
            done_tx.send(log.clone()).unwrap();
        });

        let _consumer = queue.spawn(Vec::new());

        let log = done_rx.await.unwrap();
        assert_eq!(log, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_tasks_from_many_producers_are_serialized() {
        let (handle, queue) = SerialQueue::channel();
        let handle = Arc::new(handle);

        // Each task increments a plain counter; racing producers would lose
        // updates without the single-consumer discipline.
        let mut producers = Vec::new();
        for _ in 0..8 {
            let handle = handle.clone();
            producers.push(tokio::spawn(async move {
                for _ in 0..250 {
                    handle.enqueue(|count: &mut u32| *count += 1);
                }
            }));
        }
        for p in producers {
            p.await.unwrap();
        }

        let (done_tx, done_rx) = oneshot::channel();
        handle.enqueue(move |count: &mut u32| {
            done_tx.send(*count).unwrap();
        });

        let _consumer = queue.spawn(0u32);

        assert_eq!(done_rx.await.unwrap(), 2000);
    }
}
