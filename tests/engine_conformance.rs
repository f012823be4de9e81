//! End-to-end scenarios driving jobs through the store, pool and watchdog
//! together, with a scripted executor standing in for the shell.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use jobkit::{
    CommandExecutor, ConfigStore, JobEvent, JobFailure, JobState, JobStore, WorkerPool,
};

/// One scripted outcome for a single execution of a command
#[derive(Clone)]
enum Outcome {
    Succeed,
    Fail,
    Sleep(Duration),
}

/// Plays back a queue of outcomes per command; once the queue is empty every
/// further execution succeeds. Also records execution order and checks that
/// no command is ever executed by two workers at once.
struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    executed: Mutex<Vec<String>>,
    in_flight: Mutex<HashSet<String>>,
    overlap_seen: AtomicBool,
}

impl ScriptedExecutor {
    fn new(scripts: &[(&str, &[Outcome])]) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(
                scripts
                    .iter()
                    .map(|(cmd, outcomes)| (cmd.to_string(), outcomes.iter().cloned().collect()))
                    .collect(),
            ),
            executed: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashSet::new()),
            overlap_seen: AtomicBool::new(false),
        })
    }

    fn execution_order(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    fn saw_overlap(&self) -> bool {
        self.overlap_seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, command: &str, _timeout: Duration) -> Result<(), JobFailure> {
        if !self.in_flight.lock().insert(command.to_string()) {
            self.overlap_seen.store(true, Ordering::SeqCst);
        }
        self.executed.lock().push(command.to_string());

        let outcome = self
            .scripts
            .lock()
            .get_mut(command)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Outcome::Succeed);

        let result = match outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Fail => Err(JobFailure::failed("scripted failure")),
            Outcome::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        };

        self.in_flight.lock().remove(command);
        result
    }
}

fn engine(executor: Arc<ScriptedExecutor>) -> (Arc<JobStore>, Arc<ConfigStore>, WorkerPool) {
    let store = Arc::new(JobStore::new());
    let config = Arc::new(ConfigStore::new());
    // Tight intervals and flat backoff so scenarios finish in seconds
    config.set("worker_poll_interval", &json!(0.01)).unwrap();
    config.set("backoff_base", &json!(1.0)).unwrap();
    let pool = WorkerPool::with_executor(store.clone(), config.clone(), executor);
    (store, config, pool)
}

async fn wait_for_state(store: &JobStore, id: &str, state: JobState) {
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        if store.get(id).map(|j| j.state) == Ok(state) {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "job '{id}' never reached {state}, currently {:?}",
            store.get(id)
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn three_failures_exhaust_a_two_retry_budget() {
    let executor = ScriptedExecutor::new(&[(
        "job-a",
        &[Outcome::Fail, Outcome::Fail, Outcome::Fail],
    )]);
    let (store, _, pool) = engine(executor);

    store
        .create(Some("a".to_string()), "job-a".to_string(), 2)
        .unwrap();

    pool.start(1).unwrap();
    wait_for_state(&store, "a", JobState::Dead).await;
    pool.stop().await.unwrap();

    let job = store.get("a").unwrap();
    assert_eq!(job.attempts, 3);
    assert!(job
        .error_message
        .as_deref()
        .unwrap()
        .contains("max retries (2) exceeded"));
    assert_eq!(store.dead_jobs().len(), 1);
}

#[tokio::test]
async fn one_failure_then_success_completes_on_second_attempt() {
    let executor = ScriptedExecutor::new(&[("job-b", &[Outcome::Fail])]);
    let (store, _, pool) = engine(executor);

    store
        .create(Some("b".to_string()), "job-b".to_string(), 3)
        .unwrap();

    pool.start(1).unwrap();
    wait_for_state(&store, "b", JobState::Completed).await;
    pool.stop().await.unwrap();

    let job = store.get("b").unwrap();
    assert_eq!(job.attempts, 2);
    assert!(job.error_message.is_none());
}

#[tokio::test]
async fn zero_retry_budget_goes_straight_to_the_dlq() {
    let executor = ScriptedExecutor::new(&[("job-c", &[Outcome::Fail])]);
    let (store, _, pool) = engine(executor);

    store
        .create(Some("c".to_string()), "job-c".to_string(), 0)
        .unwrap();

    pool.start(1).unwrap();
    wait_for_state(&store, "c", JobState::Dead).await;
    pool.stop().await.unwrap();

    assert_eq!(store.get("c").unwrap().attempts, 1);
}

#[tokio::test]
async fn concurrent_workers_never_share_a_job() {
    let executor = ScriptedExecutor::new(&[]);
    let (store, _, pool) = engine(executor.clone());

    for i in 0..20 {
        store
            .create(Some(format!("job-{i:02}")), format!("cmd-{i:02}"), 3)
            .unwrap();
    }

    pool.start(4).unwrap();
    for i in 0..20 {
        wait_for_state(&store, &format!("job-{i:02}"), JobState::Completed).await;
    }
    pool.stop().await.unwrap();

    assert!(!executor.saw_overlap(), "a job ran on two workers at once");
    // Every command executed exactly once
    let order = executor.execution_order();
    assert_eq!(order.len(), 20);
    assert_eq!(order.iter().collect::<HashSet<_>>().len(), 20);
}

#[tokio::test]
async fn single_worker_dispatches_in_enqueue_order() {
    let executor = ScriptedExecutor::new(&[]);
    let (store, _, pool) = engine(executor.clone());

    let commands: Vec<String> = (0..5).map(|i| format!("cmd-{i}")).collect();
    for (i, command) in commands.iter().enumerate() {
        store
            .create(Some(format!("job-{i}")), command.clone(), 3)
            .unwrap();
    }

    pool.start(1).unwrap();
    for i in 0..5 {
        wait_for_state(&store, &format!("job-{i}"), JobState::Completed).await;
    }
    pool.stop().await.unwrap();

    assert_eq!(executor.execution_order(), commands);
}

#[tokio::test]
async fn watchdog_reclaims_a_hung_worker_and_the_job_recovers() {
    // First execution hangs well past the 1s timeout lease; the watchdog
    // returns the job to pending and a second worker finishes it.
    let executor = ScriptedExecutor::new(&[("job-h", &[Outcome::Sleep(Duration::from_secs(9))])]);
    let (store, config, pool) = engine(executor);
    config.set("job_timeout", &json!(1)).unwrap();

    store
        .create(Some("h".to_string()), "job-h".to_string(), 3)
        .unwrap();
    let mut events = store.subscribe();

    pool.start(2).unwrap();
    wait_for_state(&store, "h", JobState::Completed).await;

    let mut reclaimed = false;
    while let Ok(event) = events.try_recv() {
        if let JobEvent::Retrying { error, .. } = &event {
            if error == "worker unresponsive" {
                reclaimed = true;
            }
        }
    }
    assert!(reclaimed, "watchdog never reclaimed the hung job");

    let job = store.get("h").unwrap();
    assert_eq!(job.attempts, 2);
    assert!(job.error_message.is_none());

    pool.stop().await.unwrap();
}

#[tokio::test]
async fn dead_job_retried_manually_runs_again() {
    let executor = ScriptedExecutor::new(&[("job-d", &[Outcome::Fail])]);
    let (store, _, pool) = engine(executor);

    store
        .create(Some("d".to_string()), "job-d".to_string(), 0)
        .unwrap();

    pool.start(1).unwrap();
    wait_for_state(&store, "d", JobState::Dead).await;

    store.retry_dead("d").unwrap();
    wait_for_state(&store, "d", JobState::Completed).await;
    pool.stop().await.unwrap();

    // The spent budget stays on the record
    assert_eq!(store.get("d").unwrap().attempts, 2);
}
