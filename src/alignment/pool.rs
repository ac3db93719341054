//! Bounded fan-out of per-read work over a run's pooled connections.
//!
//! One scoped worker thread is started per connection; tasks go through a
//! bounded channel and every worker is joined before `fan_out` returns, so
//! tasks may borrow from the caller's stack.

use crossbeam::channel::bounded;
use parking_lot::Mutex;

use crate::storage::traits::StoreConnection;
use crate::{PoreflowError, Result};

type Job<'env> = Box<dyn FnOnce(&mut dyn StoreConnection) -> Result<()> + Send + 'env>;

/// A unit of work run against one pooled connection
pub struct Task<'env> {
    pub label: String,
    job: Job<'env>,
}

impl<'env> Task<'env> {
    pub fn new<F>(label: impl Into<String>, job: F) -> Self
    where
        F: FnOnce(&mut dyn StoreConnection) -> Result<()> + Send + 'env,
    {
        Self {
            label: label.into(),
            job: Box::new(job),
        }
    }
}

/// A task that returned an error; its siblings are unaffected
#[derive(Debug)]
pub struct TaskFailure {
    pub label: String,
    pub error: PoreflowError,
}

/// Run every task on the pool and wait for all of them
pub fn fan_out<'env>(
    pool: &mut [Box<dyn StoreConnection>],
    tasks: Vec<Task<'env>>,
) -> Vec<TaskFailure> {
    if tasks.is_empty() {
        return Vec::new();
    }
    if pool.is_empty() {
        return tasks
            .into_iter()
            .map(|task| TaskFailure {
                label: task.label,
                error: PoreflowError::Storage("no worker connections are open".to_string()),
            })
            .collect();
    }

    let failures = Mutex::new(Vec::new());
    let (send, recv) = bounded::<Task<'env>>(pool.len());

    let joined = crossbeam::scope(|scope| {
        for conn in pool.iter_mut() {
            let recv = recv.clone();
            let failures = &failures;
            scope.spawn(move |_| {
                for task in recv.iter() {
                    if let Err(error) = (task.job)(conn.as_mut()) {
                        tracing::debug!("Task {} failed: {}", task.label, error);
                        failures.lock().push(TaskFailure {
                            label: task.label,
                            error,
                        });
                    }
                }
            });
        }
        drop(recv);

        for task in tasks {
            if send.send(task).is_err() {
                break;
            }
        }
        drop(send);
    });

    let mut failures = failures.into_inner();
    if joined.is_err() {
        failures.push(TaskFailure {
            label: "worker".to_string(),
            error: PoreflowError::Storage("a pool worker panicked".to_string()),
        });
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{ColumnType, TableSpec};
    use crate::storage::sqlite::{SqliteConnection, SqliteGateway};
    use crate::storage::traits::StorageGateway;
    use crate::storage::value::row;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_every_task_runs_once() {
        let mut pool: Vec<Box<dyn StoreConnection>> = (0..3)
            .map(|_| Box::new(SqliteConnection::open_in_memory().unwrap()) as Box<dyn StoreConnection>)
            .collect();
        let counter = AtomicUsize::new(0);

        let tasks = (0..20)
            .map(|i| {
                let counter = &counter;
                Task::new(format!("task {}", i), move |_conn| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        let failures = fan_out(&mut pool, tasks);

        assert!(failures.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_failure_leaves_siblings_alone() {
        let dir = TempDir::new().unwrap();
        let gateway = SqliteGateway::open(dir.path(), Duration::from_millis(2000)).unwrap();
        gateway.create_schema("run").unwrap();
        let mut setup = gateway.connect("run").unwrap();
        setup
            .create_table(&TableSpec::new("hits").serial("id").column("n", ColumnType::Integer))
            .unwrap();

        let mut pool: Vec<Box<dyn StoreConnection>> =
            (0..2).map(|_| gateway.connect("run").unwrap()).collect();
        let tasks = (0..6)
            .map(|i: i64| {
                Task::new(format!("read {}", i), move |conn| {
                    if i == 3 {
                        return Err(PoreflowError::Alignment("aligner exited with status 1".into()));
                    }
                    conn.insert("hits", &row([("n", i.into())]))?;
                    Ok(())
                })
            })
            .collect();

        let failures = fan_out(&mut pool, tasks);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].label, "read 3");
        assert_eq!(setup.select("hits", &row([])).unwrap().len(), 5);
    }

    #[test]
    fn test_empty_pool_reports_every_task() {
        let tasks = vec![Task::new("a", |_| Ok(())), Task::new("b", |_| Ok(()))];
        let failures = fan_out(&mut [], tasks);
        assert_eq!(failures.len(), 2);
    }
}
