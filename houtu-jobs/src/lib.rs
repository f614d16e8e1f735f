#![warn(
    clippy::unwrap_used,
    clippy::cast_lossless,
    clippy::unimplemented,
    clippy::indexing_slicing,
    clippy::expect_used
)]
use std::{collections::VecDeque, fmt, future, pin, time::Duration};

#[cfg(not(target_arch = "wasm32"))]
pub type AsyncReturn<Output> = pin::Pin<Box<dyn future::Future<Output = Output> + Send + 'static>>;
#[cfg(target_arch = "wasm32")]
pub type AsyncReturn<Output> = pin::Pin<Box<dyn future::Future<Output = Output> + 'static>>;

pub trait Job: Sized + Send + 'static {
    type Outcome: Send + 'static;

    fn name(&self) -> String;

    fn perform(self, context: Context) -> AsyncReturn<Self::Outcome>;
}

/// Request identifier handed out by a [`JobQueue`]. Tokens only grow, so a
/// response carrying an old token can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct JobToken(pub u64);

impl fmt::Display for JobToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Context {
    pub token: JobToken,
}

pub struct Finished<O> {
    pub token: JobToken,
    pub outcome: O,
    pub elapsed: Duration,
}

/// Runs jobs of one kind on the async compute pool with at most
/// `max_workers` of them in flight. Extra jobs wait in a FIFO.
pub struct JobQueue<J: Job> {
    name: &'static str,
    max_workers: usize,
    in_flight: usize,
    next_token: u64,
    pending: VecDeque<(JobToken, J)>,
    outcome_tx: async_channel::Sender<Finished<J::Outcome>>,
    outcome_recv: async_channel::Receiver<Finished<J::Outcome>>,
}

impl<J: Job> JobQueue<J> {
    pub fn new(name: &'static str, max_workers: usize) -> Self {
        let (outcome_tx, outcome_recv) = async_channel::unbounded();
        JobQueue {
            name,
            max_workers: max_workers.max(1),
            in_flight: 0,
            next_token: 0,
            pending: VecDeque::new(),
            outcome_tx,
            outcome_recv,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn next_token(&mut self) -> JobToken {
        self.next_token += 1;
        JobToken(self.next_token)
    }

    /// Queues a job under a fresh token.
    pub fn submit(&mut self, job: J) -> JobToken {
        let token = self.next_token();
        self.submit_with_token(token, job);
        token
    }

    pub fn submit_with_token(&mut self, token: JobToken, job: J) {
        self.pending.push_back((token, job));
        self.dispatch();
    }

    /// Removes a job that has not started yet. Started jobs cannot be
    /// recalled; their outcome still arrives through [`JobQueue::poll`].
    pub fn cancel(&mut self, token: JobToken) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(t, _)| *t != token);
        before != self.pending.len()
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.pending.is_empty()
    }

    /// Drains finished jobs without blocking and starts waiting ones.
    pub fn poll(&mut self) -> Vec<Finished<J::Outcome>> {
        let mut finished = vec![];
        while let Ok(outcome) = self.outcome_recv.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            finished.push(outcome);
        }
        self.dispatch();
        finished
    }

    /// Polls until the queue is idle or `timeout` runs out.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<Finished<J::Outcome>> {
        let deadline = instant::Instant::now() + timeout;
        let mut finished = self.poll();
        while !self.is_idle() && instant::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
            finished.extend(self.poll());
        }
        finished
    }

    fn dispatch(&mut self) {
        while self.in_flight < self.max_workers {
            let Some((token, job)) = self.pending.pop_front() else {
                break;
            };
            self.in_flight += 1;
            self.spawn(token, job);
        }
    }

    fn spawn(&self, token: JobToken, job: J) {
        let outcome_tx = self.outcome_tx.clone();
        let job_name = job.name();
        bevy::tasks::AsyncComputeTaskPool::get()
            .spawn(async move {
                let instant = instant::Instant::now();
                let outcome = job.perform(Context { token }).await;
                if let Err(e) = outcome_tx
                    .send(Finished {
                        token,
                        outcome,
                        elapsed: instant.elapsed(),
                    })
                    .await
                {
                    bevy::log::error!(
                        "Failed to send result from job {} {} back to main thread: {:?}",
                        job_name,
                        token,
                        e.to_string()
                    );
                }
            })
            .detach();
    }
}
