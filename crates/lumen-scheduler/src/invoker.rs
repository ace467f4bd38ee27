use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;

use lumen_core::panic_payload_to_str;

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Task),
    RunAfter(Instant, Task),
}

/// A single-threaded serialized executor.
///
/// All tasks submitted to an invoker run on one dedicated thread, strictly one
/// at a time. Ready tasks run in submission order; delayed tasks run in
/// deadline order, with submission order breaking ties. A task submitted via
/// [`Invoker::spawn`] while a delayed task is due runs after every task whose
/// deadline has already passed.
///
/// Panics inside a task are caught and logged; the invoker thread keeps
/// running. Dropping the last handle shuts the thread down: queued tasks that
/// are already due may still run, delayed tasks that are not yet due are
/// dropped, and the thread is joined.
#[derive(Clone)]
pub struct Invoker {
    inner: Arc<InvokerShared>,
}

struct InvokerShared {
    name: String,
    // `Option` so `Drop` can disconnect the channel before joining.
    tx: Option<channel::Sender<Command>>,
    thread_id: thread::ThreadId,
    join: Option<thread::JoinHandle<()>>,
}

impl Invoker {
    /// Spawns the invoker thread.
    ///
    /// Panics if the OS refuses to create the thread; an invoker without its
    /// thread cannot uphold any of its contracts.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (tx, rx) = channel::unbounded();

        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || worker_loop(&thread_name, rx))
            .unwrap_or_else(|err| panic!("failed to spawn invoker thread {name:?}: {err}"));
        let thread_id = handle.thread().id();

        Self {
            inner: Arc::new(InvokerShared {
                name,
                tx: Some(tx),
                thread_id,
                join: Some(handle),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Enqueues `task` for serialized execution.
    pub fn spawn(&self, task: impl FnOnce() + Send + 'static) {
        self.send(Command::Run(Box::new(task)));
    }

    /// Enqueues `task` to run no earlier than `delay` from now.
    pub fn spawn_after(&self, delay: Duration, task: impl FnOnce() + Send + 'static) {
        self.send(Command::RunAfter(Instant::now() + delay, Box::new(task)));
    }

    /// Runs `task` inline when already on the invoker thread, otherwise
    /// enqueues it.
    pub fn run_or_invoke_later(&self, task: impl FnOnce() + Send + 'static) {
        if self.is_invoker_thread() {
            task();
        } else {
            self.spawn(task);
        }
    }

    /// Returns whether the calling thread is this invoker's thread.
    pub fn is_invoker_thread(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    fn send(&self, command: Command) {
        // A send failure means the worker is gone (shutdown already started);
        // late tasks are dropped silently by contract.
        if let Some(tx) = &self.inner.tx {
            let _ = tx.send(command);
        }
    }
}

impl Drop for InvokerShared {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.join.take() {
            // A task can own the last Invoker handle; joining from the worker
            // thread itself would deadlock.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

struct DelayedTask {
    deadline: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for DelayedTask {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for DelayedTask {}

impl PartialOrd for DelayedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

fn worker_loop(name: &str, rx: channel::Receiver<Command>) {
    let mut delayed: BinaryHeap<Reverse<DelayedTask>> = BinaryHeap::new();
    let mut next_seq = 0_u64;

    loop {
        let now = Instant::now();
        while delayed
            .peek()
            .is_some_and(|Reverse(entry)| entry.deadline <= now)
        {
            if let Some(Reverse(entry)) = delayed.pop() {
                run_task(name, entry.task);
            }
        }

        let received = match delayed.peek() {
            Some(Reverse(entry)) => match rx.recv_deadline(entry.deadline) {
                Ok(command) => Some(command),
                Err(channel::RecvTimeoutError::Timeout) => continue,
                Err(channel::RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(command) => Some(command),
                Err(channel::RecvError) => break,
            },
        };

        match received {
            Some(Command::Run(task)) => run_task(name, task),
            Some(Command::RunAfter(deadline, task)) => {
                let seq = next_seq;
                next_seq += 1;
                delayed.push(Reverse(DelayedTask {
                    deadline,
                    seq,
                    task,
                }));
            }
            None => break,
        }
    }
}

fn run_task(name: &str, task: Task) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
        tracing::error!(
            target = "lumen.invoker",
            invoker = name,
            panic = %panic_payload_to_str(&*panic),
            "invoker task panicked"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn tasks_run_in_submission_order() {
        let invoker = Invoker::new("test-order");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = channel::bounded(1);

        for i in 0..32 {
            let seen = Arc::clone(&seen);
            invoker.spawn(move || seen.lock().push(i));
        }
        invoker.spawn(move || {
            let _ = done_tx.send(());
        });

        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("invoker should drain the queue");
        assert_eq!(*seen.lock(), (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn delayed_tasks_run_in_deadline_order() {
        let invoker = Invoker::new("test-delay");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = channel::bounded(2);

        for (label, delay_ms) in [("slow", 120), ("fast", 20)] {
            let seen = Arc::clone(&seen);
            let done_tx = done_tx.clone();
            invoker.spawn_after(Duration::from_millis(delay_ms), move || {
                seen.lock().push(label);
                let _ = done_tx.send(());
            });
        }

        for _ in 0..2 {
            done_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("delayed task should fire");
        }
        assert_eq!(*seen.lock(), vec!["fast", "slow"]);
    }

    #[test]
    fn equal_deadlines_preserve_submission_order() {
        // Heap level: identical deadlines must fall back to the sequence
        // number.
        let deadline = Instant::now() + Duration::from_secs(60);
        let mut heap = BinaryHeap::new();
        for seq in [2_u64, 0, 1] {
            heap.push(Reverse(DelayedTask {
                deadline,
                seq,
                task: Box::new(|| {}),
            }));
        }
        let popped: Vec<u64> =
            std::iter::from_fn(|| heap.pop().map(|Reverse(entry)| entry.seq)).collect();
        assert_eq!(popped, vec![0, 1, 2]);

        // End to end: equal delays dispatch in submission order, including on
        // platforms where the clock is coarse enough for deadlines to collide.
        let invoker = Invoker::new("test-ties");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = channel::bounded(1);

        for i in 0..8 {
            let seen = Arc::clone(&seen);
            invoker.spawn_after(Duration::from_millis(30), move || seen.lock().push(i));
        }
        invoker.spawn_after(Duration::from_millis(150), move || {
            let _ = done_tx.send(());
        });

        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(*seen.lock(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn run_or_invoke_later_is_inline_on_invoker_thread() {
        let invoker = Invoker::new("test-inline");
        let (tx, rx) = channel::bounded(1);

        let inner = invoker.clone();
        invoker.spawn(move || {
            let ran_inline = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&ran_inline);
            inner.run_or_invoke_later(move || flag.store(true, Ordering::SeqCst));
            // Inline execution means the effect is observable immediately.
            let _ = tx.send(ran_inline.load(Ordering::SeqCst) && inner.is_invoker_thread());
        });

        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(!invoker.is_invoker_thread());
    }

    #[test]
    fn panicking_task_does_not_kill_the_invoker() {
        let invoker = Invoker::new("test-panic");
        let (tx, rx) = channel::bounded(1);

        invoker.spawn(|| panic!("intentional"));
        invoker.spawn(move || {
            let _ = tx.send(());
        });

        rx.recv_timeout(Duration::from_secs(5))
            .expect("invoker should survive a panicking task");
    }

    #[test]
    fn drop_joins_the_worker_thread() {
        let invoker = Invoker::new("test-drop");
        let (tx, rx) = channel::bounded(1);
        invoker.spawn(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drop(invoker);
    }
}
