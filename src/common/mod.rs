use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::context::Context;

/// Background thread bound to its own cancellation scope.
#[derive(Debug)]
pub struct Worker {
    pub join_handle: JoinHandle<()>,
    pub context: Context,
}

impl Worker {
    pub fn terminate(&self) {
        self.context.cancel();
    }

    pub fn join(self) {
        if self.join_handle.join().is_err() {
            error!("Worker panicked")
        }
    }
}

pub fn run_worker<T: Send + 'static, F: FnOnce(T, Context) + Send + 'static>(worker: F, params: T) -> Worker {
    let context = Context::new();
    let worker_context = context.clone();

    let join_handle = thread::spawn(move || worker(params, worker_context));

    Worker { join_handle, context }
}

#[derive(Debug, Default)]
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn new(workers: Vec<Worker>) -> WorkerPool {
        WorkerPool { workers }
    }

    pub fn push(&mut self, worker: Worker) {
        self.workers.push(worker);
    }

    pub fn terminate(&self) {
        for worker in &self.workers {
            worker.terminate();
        }
    }

    pub fn join(self) {
        for worker in self.workers {
            worker.join();
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum Winner {
    First,
    Second,
}

/// Results of two raced activities. `None` marks an activity that panicked.
#[derive(Debug)]
pub struct RaceOutcome<A, B> {
    pub winner: Winner,
    pub first: Option<A>,
    pub second: Option<B>,
}

/// Runs two activities concurrently on a shared child scope of `ctx`.
///
/// Whichever activity returns first cancels the scope, which must make the other one return
/// promptly. Both are joined before `race` returns, so neither outlives the call.
pub fn race<A, B, Fa, Fb>(ctx: &Context, first: Fa, second: Fb) -> RaceOutcome<A, B>
where
    A: Send,
    B: Send,
    Fa: FnOnce(&Context) -> A + Send,
    Fb: FnOnce(&Context) -> B + Send,
{
    let scope = ctx.child();
    let (finished_tx, finished_rx): (Sender<Winner>, Receiver<Winner>) = crossbeam_channel::bounded(2);

    let (first, second) = thread::scope(|s| {
        let first_handle = s.spawn(|| {
            let _guard = FinishGuard::new(&scope, &finished_tx, Winner::First);
            first(&scope)
        });
        let second_handle = s.spawn(|| {
            let _guard = FinishGuard::new(&scope, &finished_tx, Winner::Second);
            second(&scope)
        });

        let first = first_handle.join().ok();
        let second = second_handle.join().ok();
        (first, second)
    });

    if first.is_none() {
        error!("First raced activity panicked");
    }
    if second.is_none() {
        error!("Second raced activity panicked");
    }

    let winner = finished_rx.try_recv().unwrap_or(Winner::First);
    RaceOutcome { winner, first, second }
}

// Reports completion and cancels the shared scope, also when the activity unwinds.
struct FinishGuard<'a> {
    scope: &'a Context,
    finished_tx: &'a Sender<Winner>,
    activity: Winner,
}

impl<'a> FinishGuard<'a> {
    fn new(scope: &'a Context, finished_tx: &'a Sender<Winner>, activity: Winner) -> FinishGuard<'a> {
        FinishGuard {
            scope,
            finished_tx,
            activity,
        }
    }
}

impl<'a> Drop for FinishGuard<'a> {
    fn drop(&mut self) {
        let _ = self.finished_tx.try_send(self.activity);
        self.scope.cancel();
    }
}
