use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use tokio::runtime::{self, Runtime};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{self, JoinHandle, JoinSet};

use crate::db::get_connection;
use crate::error::{BudgeryError, Result};
use crate::importer;

/// An uploaded file bound to the job that tracks it.
pub struct ImportRequest {
    pub job_id: i64,
    pub account_id: i64,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Finished { job_id: i64, rows: usize },
    Failed { job_id: i64, reason: String, detail: String },
}

impl JobOutcome {
    pub fn job_id(&self) -> i64 {
        match self {
            Self::Finished { job_id, .. } | Self::Failed { job_id, .. } => *job_id,
        }
    }

    fn lost(job_id: i64) -> Self {
        Self::Failed {
            job_id,
            reason: "worker_lost".into(),
            detail: "import worker exited without reporting".into(),
        }
    }
}

/// Returned by [`ImportQueue::submit`]; resolves once a worker is done with the job.
pub struct JobHandle {
    pub job_id: i64,
    done: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    /// Blocks until the job reaches a terminal state. Must not be called from
    /// inside an async context.
    pub fn wait(self) -> JobOutcome {
        let job_id = self.job_id;
        self.done
            .blocking_recv()
            .unwrap_or_else(|_| JobOutcome::lost(job_id))
    }

    /// Non-blocking poll.
    pub fn try_outcome(&mut self) -> Option<JobOutcome> {
        match self.done.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(JobOutcome::lost(self.job_id)),
        }
    }
}

struct Task {
    request: ImportRequest,
    done: oneshot::Sender<JobOutcome>,
}

type Runner = fn(&Connection, &ImportRequest) -> Result<usize>;

fn run_request(conn: &Connection, request: &ImportRequest) -> Result<usize> {
    importer::run_job(conn, request.job_id, request.account_id, &request.content)
}

/// Background import queue. Jobs arrive on one task channel and run on the
/// blocking pool, at most `workers` at a time, each on its own connection.
pub struct ImportQueue {
    runtime: Runtime,
    sender: Option<mpsc::UnboundedSender<Task>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl ImportQueue {
    pub fn start(db_path: &Path, workers: usize) -> Result<Self> {
        Self::start_with(db_path, workers, run_request)
    }

    fn start_with(db_path: &Path, workers: usize, runner: Runner) -> Result<Self> {
        let workers = workers.max(1);
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("import-queue")
            .build()?;
        let (sender, tasks) = mpsc::unbounded_channel::<Task>();
        let slots = Arc::new(Semaphore::new(workers));
        let dispatcher = runtime.spawn(dispatch(tasks, slots, db_path.to_path_buf(), runner));
        tracing::debug!(workers, "import queue started");
        Ok(Self {
            runtime,
            sender: Some(sender),
            dispatcher: Some(dispatcher),
        })
    }

    pub fn submit(&self, request: ImportRequest) -> Result<JobHandle> {
        let job_id = request.job_id;
        let (done, outcome) = oneshot::channel();
        self.sender
            .as_ref()
            .ok_or_else(|| BudgeryError::Other("import queue is shut down".into()))?
            .send(Task { request, done })
            .map_err(|_| BudgeryError::Other("import dispatcher is gone".into()))?;
        tracing::debug!(job_id, "import job queued");
        Ok(JobHandle {
            job_id,
            done: outcome,
        })
    }

    /// Stops accepting work and waits for every queued job to finish.
    pub fn shutdown(mut self) {
        self.drain();
    }

    fn drain(&mut self) {
        self.sender.take();
        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(err) = self.runtime.block_on(dispatcher) {
                tracing::error!(error = %err, "import dispatcher failed");
            }
        }
    }
}

impl Drop for ImportQueue {
    fn drop(&mut self) {
        self.drain();
    }
}

/// Hands each task to the blocking pool once a slot frees up. Returns after the
/// channel closes and every started job has reported.
async fn dispatch(
    mut tasks: mpsc::UnboundedReceiver<Task>,
    slots: Arc<Semaphore>,
    db_path: PathBuf,
    runner: Runner,
) {
    let mut running = JoinSet::new();
    while let Some(Task { request, done }) = tasks.recv().await {
        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
            break;
        };
        let db_path = db_path.clone();
        running.spawn(async move {
            let outcome = run_task(db_path, request, runner).await;
            drop(permit);
            // The submitter may have stopped listening; the database has the result either way.
            let _ = done.send(outcome);
        });
    }
    while let Some(joined) = running.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "import task failed to report");
        }
    }
    tracing::debug!("import queue drained");
}

async fn run_task(db_path: PathBuf, request: ImportRequest, runner: Runner) -> JobOutcome {
    let job_id = request.job_id;
    let path = db_path.clone();
    let joined = task::spawn_blocking(move || execute(&path, &request, runner)).await;
    match joined {
        Ok(outcome) => outcome,
        Err(err) => {
            let (reason, detail) = if err.is_panic() {
                ("worker_panic", panic_message(err.into_panic().as_ref()))
            } else {
                ("worker_lost", err.to_string())
            };
            tracing::error!(job_id, reason, detail = %detail, "import worker died");
            record_failure(db_path, job_id, reason, detail.clone()).await;
            JobOutcome::Failed {
                job_id,
                reason: reason.into(),
                detail,
            }
        }
    }
}

fn execute(db_path: &Path, request: &ImportRequest, runner: Runner) -> JobOutcome {
    let job_id = request.job_id;
    match get_connection(db_path).and_then(|conn| runner(&conn, request)) {
        Ok(rows) => JobOutcome::Finished { job_id, rows },
        Err(err) => JobOutcome::Failed {
            job_id,
            reason: err.reason_code().to_string(),
            detail: err.to_string(),
        },
    }
}

async fn record_failure(db_path: PathBuf, job_id: i64, reason: &'static str, detail: String) {
    let recorded = task::spawn_blocking(move || {
        let conn = get_connection(&db_path)?;
        crate::jobs::fail(&conn, job_id, reason, &detail)
    })
    .await;
    match recorded {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::error!(job_id, error = %err, "could not record worker failure"),
        Err(err) => tracing::error!(job_id, error = %err, "could not record worker failure"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::jobs;
    use crate::ledger::{account_create, sourcink_list, transactions_for_job};
    use crate::models::ImportJobStatus;

    fn setup() -> (tempfile::TempDir, std::path::PathBuf, i64) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let conn = get_connection(&path).unwrap();
        init_db(&conn).unwrap();
        let account_id = account_create(&conn, "America First Checking", None).unwrap();
        (dir, path, account_id)
    }

    fn request(conn: &Connection, account_id: i64, name: &str, content: &[u8]) -> ImportRequest {
        let job_id = jobs::create(conn, account_id, "alice", name, "sum").unwrap();
        ImportRequest {
            job_id,
            account_id,
            content: content.to_vec(),
        }
    }

    #[test]
    fn test_concurrent_imports_reach_terminal_states() {
        let (_dir, path, account_id) = setup();
        let conn = get_connection(&path).unwrap();
        let queue = ImportQueue::start(&path, 3).unwrap();

        let files: [(&str, &[u8]); 4] = [
            ("ally.csv", include_bytes!("../tests/import_data/ally.csv")),
            ("afcu.csv", include_bytes!("../tests/import_data/afcu.csv")),
            ("every_dollar.csv", include_bytes!("../tests/import_data/every_dollar.csv")),
            ("every_dollar_again.csv", include_bytes!("../tests/import_data/every_dollar.csv")),
        ];
        let handles: Vec<JobHandle> = files
            .iter()
            .map(|(name, content)| queue.submit(request(&conn, account_id, name, content)).unwrap())
            .collect();
        let outcomes: Vec<JobOutcome> = handles.into_iter().map(JobHandle::wait).collect();

        let rows: Vec<usize> = outcomes
            .iter()
            .map(|o| match o {
                JobOutcome::Finished { rows, .. } => *rows,
                other => panic!("unexpected outcome {other:?}"),
            })
            .collect();
        assert_eq!(rows, vec![5, 6, 8, 8]);

        for outcome in &outcomes {
            let job = jobs::get(&conn, outcome.job_id()).unwrap();
            assert_eq!(job.status, ImportJobStatus::Finished);
        }
        // Both EveryDollar imports raced on the same payee names.
        let smiths = sourcink_list(&conn, Some("Smith's Marketplace")).unwrap();
        assert_eq!(smiths.len(), 1);
        assert_eq!(transactions_for_job(&conn, outcomes[3].job_id()).unwrap().len(), 8);
    }

    #[test]
    fn test_failed_import_reports_reason() {
        let (_dir, path, account_id) = setup();
        let conn = get_connection(&path).unwrap();
        let queue = ImportQueue::start(&path, 1).unwrap();
        let handle = queue
            .submit(request(&conn, account_id, "weird.csv", b"Foo,Bar\n1,2\n"))
            .unwrap();
        let job_id = handle.job_id;
        match handle.wait() {
            JobOutcome::Failed { reason, .. } => assert_eq!(reason, "unrecognized_schema"),
            other => panic!("unexpected outcome {other:?}"),
        }
        let job = jobs::get(&conn, job_id).unwrap();
        assert_eq!(job.status, ImportJobStatus::Error);
        assert_eq!(job.error_reason.as_deref(), Some("unrecognized_schema"));
    }

    #[test]
    fn test_panicking_job_is_recorded_and_queue_keeps_serving() {
        fn explode(_conn: &Connection, request: &ImportRequest) -> Result<usize> {
            if request.content == b"boom" {
                panic!("parser exploded");
            }
            Ok(0)
        }

        let (_dir, path, account_id) = setup();
        let conn = get_connection(&path).unwrap();
        let queue = ImportQueue::start_with(&path, 1, explode).unwrap();

        let first = queue.submit(request(&conn, account_id, "a", b"boom")).unwrap();
        let first_id = first.job_id;
        match first.wait() {
            JobOutcome::Failed { reason, detail, .. } => {
                assert_eq!(reason, "worker_panic");
                assert_eq!(detail, "parser exploded");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let job = jobs::get(&conn, first_id).unwrap();
        assert_eq!(job.status, ImportJobStatus::Error);
        assert_eq!(job.error_reason.as_deref(), Some("worker_panic"));

        let second = queue.submit(request(&conn, account_id, "b", b"fine")).unwrap();
        assert!(matches!(second.wait(), JobOutcome::Finished { rows: 0, .. }));
    }

    #[test]
    fn test_shutdown_drains_submitted_jobs() {
        let (_dir, path, account_id) = setup();
        let conn = get_connection(&path).unwrap();
        let queue = ImportQueue::start(&path, 2).unwrap();
        let ids: Vec<i64> = (0..4)
            .map(|i| {
                let req = request(
                    &conn,
                    account_id,
                    &format!("ally-{i}.csv"),
                    include_bytes!("../tests/import_data/ally.csv"),
                );
                queue.submit(req).unwrap().job_id
            })
            .collect();
        queue.shutdown();
        for id in ids {
            assert_eq!(jobs::get(&conn, id).unwrap().status, ImportJobStatus::Finished);
        }
    }

    #[test]
    fn test_try_outcome_eventually_resolves() {
        let (_dir, path, account_id) = setup();
        let conn = get_connection(&path).unwrap();
        let queue = ImportQueue::start(&path, 1).unwrap();
        let mut handle = queue
            .submit(request(&conn, account_id, "ally.csv", include_bytes!("../tests/import_data/ally.csv")))
            .unwrap();
        let outcome = loop {
            if let Some(outcome) = handle.try_outcome() {
                break outcome;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        };
        assert_eq!(outcome, JobOutcome::Finished { job_id: handle.job_id, rows: 5 });
    }
}
