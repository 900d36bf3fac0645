//! End-to-end scheduling scenarios against the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ordo_scheduler::{MetricsSnapshot, Priority, Scheduler, Task, TaskId};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn recorder(log: &Log, label: &'static str) -> impl FnOnce() + Send + 'static {
    let log = Arc::clone(log);
    move || log.lock().unwrap().push(label)
}

/// Occupy the single worker until the returned sender fires, so every task
/// submitted in between is queued before the first pop.
fn hold_worker(scheduler: &Scheduler) -> mpsc::Sender<()> {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    scheduler
        .submit_fn(move || {
            entered_tx.send(()).unwrap();
            let _ = release_rx.recv();
        })
        .unwrap();
    entered_rx.recv().unwrap();
    release_tx
}

fn run_gated(submit: impl FnOnce(&Scheduler, &Log)) -> Vec<&'static str> {
    let scheduler = Scheduler::new(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let release = hold_worker(&scheduler);
    submit(&scheduler, &log);
    release.send(()).unwrap();
    scheduler.shutdown_graceful();
    let order = log.lock().unwrap().clone();
    order
}

#[test]
fn five_tasks_two_workers_graceful_shutdown() {
    let scheduler = Scheduler::new(2);
    let runs: Vec<Arc<AtomicUsize>> = (0..5).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    for counter in &runs {
        let counter = Arc::clone(counter);
        scheduler
            .submit_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    scheduler.shutdown_graceful();

    assert!(runs.iter().all(|c| c.load(Ordering::SeqCst) == 1));
    assert!(!scheduler.is_running());
}

#[test]
fn priority_order_on_single_worker() {
    let order = run_gated(|s, log| {
        let submissions = [
            ("normal", Priority::Normal),
            ("high", Priority::High),
            ("low", Priority::Low),
            ("critical", Priority::Critical),
        ];
        for (label, priority) in submissions {
            s.submit(Task::new(recorder(log, label)).with_priority(priority))
                .unwrap();
        }
    });
    assert_eq!(order, vec!["critical", "high", "normal", "low"]);
}

#[test]
fn equal_priority_is_fifo() {
    let order = run_gated(|s, log| {
        for label in ["t1", "t2", "t3"] {
            s.submit(Task::new(recorder(log, label))).unwrap();
        }
    });
    assert_eq!(order, vec!["t1", "t2", "t3"]);
}

#[test]
fn earlier_deadline_first() {
    let order = run_gated(|s, log| {
        let now = Instant::now();
        for (label, ms) in [("d", 100), ("e", 300), ("f", 200)] {
            s.submit(Task::new(recorder(log, label)).with_deadline(now + Duration::from_millis(ms)))
                .unwrap();
        }
    });
    assert_eq!(order, vec!["d", "f", "e"]);
}

#[test]
fn deadline_beats_priority() {
    let order = run_gated(|s, log| {
        s.submit(Task::new(recorder(log, "critical")).with_priority(Priority::Critical))
            .unwrap();
        s.submit(
            Task::new(recorder(log, "low-deadline"))
                .with_priority(Priority::Low)
                .with_timeout(Duration::from_secs(60)),
        )
        .unwrap();
    });
    assert_eq!(order, vec!["low-deadline", "critical"]);
}

#[test]
fn equal_deadline_falls_back_to_priority_then_fifo() {
    let order = run_gated(|s, log| {
        let deadline = Instant::now() + Duration::from_secs(1);
        s.submit(Task::new(recorder(log, "normal-1")).with_deadline(deadline)).unwrap();
        s.submit(Task::new(recorder(log, "normal-2")).with_deadline(deadline)).unwrap();
        s.submit(
            Task::new(recorder(log, "high"))
                .with_deadline(deadline)
                .with_priority(Priority::High),
        )
        .unwrap();
    });
    assert_eq!(order, vec!["high", "normal-1", "normal-2"]);
}

#[test]
fn dependents_run_after_predecessors() {
    let scheduler = Scheduler::new(4);
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let slow_log = Arc::clone(&log);
    let a = scheduler
        .submit_fn(move || {
            std::thread::sleep(Duration::from_millis(20));
            slow_log.lock().unwrap().push("a");
        })
        .unwrap();
    let b = scheduler.submit(Task::new(recorder(&log, "b"))).unwrap();
    scheduler
        .submit(Task::new(recorder(&log, "c")).after([a, b]))
        .unwrap();
    scheduler.shutdown_graceful();

    let order = log.lock().unwrap().clone();
    assert_eq!(order.len(), 3);
    assert_eq!(order[2], "c");
}

#[test]
fn diamond_dependencies() {
    let scheduler = Scheduler::new(3);
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let root = scheduler.submit(Task::new(recorder(&log, "root"))).unwrap();
    let left = scheduler.submit(Task::new(recorder(&log, "left")).after([root])).unwrap();
    let right = scheduler.submit(Task::new(recorder(&log, "right")).after([root])).unwrap();
    scheduler
        .submit(Task::new(recorder(&log, "join")).after([left, right, left]))
        .unwrap();
    scheduler.shutdown_graceful();

    let order = log.lock().unwrap().clone();
    assert_eq!(order.first(), Some(&"root"));
    assert_eq!(order.last(), Some(&"join"));
    assert_eq!(order.len(), 4);
}

#[test]
fn cancelled_task_releases_dependents() {
    let scheduler = Scheduler::new(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let release = hold_worker(&scheduler);

    let doomed = scheduler.submit(Task::new(recorder(&log, "doomed"))).unwrap();
    let waiting = scheduler
        .submit(Task::new(recorder(&log, "dependent")).after([doomed]))
        .unwrap();
    assert!(scheduler.cancel(doomed));
    assert_ne!(waiting, TaskId::UNASSIGNED);

    release.send(()).unwrap();
    scheduler.shutdown_graceful();

    assert_eq!(*log.lock().unwrap(), vec!["dependent"]);
    assert_eq!(scheduler.metrics_snapshot().cancelled_tasks, 1);
}

#[test]
fn cancel_waiting_task() {
    let scheduler = Scheduler::new(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let release = hold_worker(&scheduler);

    let first = scheduler.submit(Task::new(recorder(&log, "first"))).unwrap();
    let second = scheduler
        .submit(Task::new(recorder(&log, "second")).after([first]))
        .unwrap();
    scheduler
        .submit(Task::new(recorder(&log, "third")).after([second]))
        .unwrap();
    assert!(scheduler.cancel(second));

    release.send(()).unwrap();
    scheduler.shutdown_graceful();

    assert_eq!(*log.lock().unwrap(), vec!["first", "third"]);
}

#[test]
fn metrics_count_and_reset() {
    let scheduler = Scheduler::new(2);
    for _ in 0..8 {
        scheduler
            .submit_fn(|| std::thread::sleep(Duration::from_millis(1)))
            .unwrap();
    }
    scheduler.shutdown_graceful();

    let snapshot = scheduler.metrics_snapshot();
    assert_eq!(snapshot.completed_tasks, 8);
    assert_eq!(snapshot.active_workers, 0);
    assert!(snapshot.min_execution_time_ms > 0.0);
    assert!(snapshot.min_execution_time_ms <= snapshot.avg_execution_time_ms);
    assert!(snapshot.avg_execution_time_ms <= snapshot.max_execution_time_ms);

    scheduler.reset_metrics();
    assert_eq!(scheduler.metrics_snapshot(), MetricsSnapshot::default());
}

#[test]
fn concurrent_submitters() {
    let scheduler = Arc::new(Scheduler::new(4));
    let counter = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            let counter = Arc::clone(&counter);
            std::thread::spawn(move || {
                let mut previous = None;
                for _ in 0..50 {
                    let counter = Arc::clone(&counter);
                    let mut task = Task::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    });
                    if let Some(id) = previous {
                        task = task.after([id]);
                    }
                    previous = Some(scheduler.submit(task).unwrap());
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    scheduler.shutdown_graceful();

    assert_eq!(counter.load(Ordering::SeqCst), 200);
    assert_eq!(scheduler.metrics_snapshot().completed_tasks, 200);
    assert_eq!(scheduler.pending_count(), 0);
}
