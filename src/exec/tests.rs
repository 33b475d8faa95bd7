use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use super::bridge::CompletionBridge;
use super::dispatcher::Dispatcher;
use super::record::RecordId;
use super::worker::WorkerLoop;
use super::*;

const WAIT: Duration = Duration::from_secs(10);

struct Harness {
    worker: WorkerLoop,
    dispatcher: Dispatcher,
    bridge: CompletionBridge,
    history: History,
    redraw: RedrawSignal,
    exit: ExitSignal,
}

impl Harness {
    fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let redraw = RedrawSignal::new();
        let exit = ExitSignal::new();
        let worker =
            WorkerLoop::spawn(WorkerConfig::default(), tx, redraw.clone()).expect("spawn worker");
        let dispatcher = Dispatcher::new(worker.queue(), exit.clone());
        Self {
            worker,
            dispatcher,
            bridge: CompletionBridge::new(rx, redraw.clone()),
            history: History::default(),
            redraw,
            exit,
        }
    }

    fn submit(&mut self, text: &str) -> ExecutionHandle {
        match self.dispatcher.submit(text, &mut self.history) {
            Ok(SubmitOutcome::Submitted(handle)) => handle,
            other => panic!("expected a submission, got {other:?}"),
        }
    }

    async fn settle(&mut self, id: RecordId) -> &ExecutionRecord {
        tokio::time::timeout(WAIT, async {
            while self.history.get(id).is_some_and(ExecutionRecord::is_pending) {
                self.bridge.next(&mut self.history).await.expect("completion");
            }
        })
        .await
        .expect("submission should settle");
        self.history.get(id).expect("record")
    }
}

#[tokio::test]
async fn submit_returns_while_guest_code_is_still_running() {
    let mut harness = Harness::start();

    let started = Instant::now();
    let handle = harness.submit("sleep(5)");
    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(harness.history.get(handle.id()).expect("row").is_pending());

    // The UI keeps draining while the worker is busy.
    assert_eq!(harness.bridge.drain(&mut harness.history).expect("drain"), 0);

    handle.cancel();
    let record = harness.settle(handle.id()).await;
    assert!(matches!(
        record.status(),
        RecordStatus::Failed | RecordStatus::Cancelled
    ));
}

#[tokio::test]
async fn stdout_and_value_are_recorded_separately() {
    let mut harness = Harness::start();
    let handle = harness.submit("write(\"A\")\n42");
    let record = harness.settle(handle.id()).await;

    assert_eq!(record.status(), RecordStatus::Completed);
    assert_eq!(record.stdout_capture(), "A");
    assert_eq!(record.result_text(), Some("42"));
    assert_eq!(record.exception_text(), None);
    assert_eq!(record.result_object().map(|r| r.type_name.as_str()), Some("int"));
    assert!(harness.redraw.take());
}

#[tokio::test]
async fn failure_is_recorded_and_worker_keeps_serving() {
    let mut harness = Harness::start();
    let failing = harness.submit("print(\"before\")\nfail(\"boom\")");
    let record = harness.settle(failing.id()).await;

    assert_eq!(record.status(), RecordStatus::Failed);
    assert_eq!(record.result_text(), None);
    assert!(record.exception_text().expect("exception").contains("boom"));
    assert_eq!(record.stdout_capture(), "before\n");

    let next = harness.submit("1 + 1");
    let record = harness.settle(next.id()).await;
    assert_eq!(record.result_text(), Some("2"));
    assert!(harness.worker.is_alive());
}

#[tokio::test]
async fn rows_stay_in_submission_order() {
    let mut harness = Harness::start();
    let ids: Vec<_> = ["a = 1", "a + 1", "a + 2"]
        .into_iter()
        .map(|text| harness.submit(text).id())
        .collect();
    for id in &ids {
        harness.settle(*id).await;
    }

    let rows: Vec<_> = harness
        .history
        .iter()
        .map(|r| (r.input_text().to_string(), r.result_text().map(str::to_string)))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("a = 1".to_string(), None),
            ("a + 1".to_string(), Some("2".to_string())),
            ("a + 2".to_string(), Some("3".to_string())),
        ]
    );
}

#[tokio::test]
async fn blank_and_exit_inputs_never_reach_the_worker() {
    let mut harness = Harness::start();
    assert!(matches!(
        harness.dispatcher.submit("  ", &mut harness.history),
        Ok(SubmitOutcome::Ignored)
    ));
    assert!(matches!(
        harness.dispatcher.submit("quit", &mut harness.history),
        Ok(SubmitOutcome::Exit)
    ));
    assert!(harness.exit.is_requested());
    assert!(harness.history.is_empty());
}

#[tokio::test]
async fn output_after_a_failed_window_is_not_captured() {
    let mut harness = Harness::start();
    let failing = harness.submit("write(\"x\")\nfail(\"boom\")");
    harness.settle(failing.id()).await;

    // A fresh window starts empty: nothing leaked from the failed run.
    let next = harness.submit("write(\"y\")");
    let record = harness.settle(next.id()).await;
    assert_eq!(record.stdout_capture(), "y");
}

#[tokio::test]
async fn queued_work_is_cancelled_on_shutdown() {
    let mut harness = Harness::start();
    let running = harness.submit("sleep(0.5)");
    let queued = harness.submit("1");
    harness.worker.shutdown();

    harness.settle(queued.id()).await;
    harness.settle(running.id()).await;
    assert_eq!(
        harness.history.get(queued.id()).expect("row").status(),
        RecordStatus::Cancelled
    );
    assert!(queued.is_finished());
}

#[tokio::test]
async fn last_result_is_bound_across_submissions() {
    let mut harness = Harness::start();
    let first = harness.submit("[1, 2, 3]");
    harness.settle(first.id()).await;
    let second = harness.submit("len(_)");
    let record = harness.settle(second.id()).await;
    assert_eq!(record.result_text(), Some("3"));
    assert_eq!(
        harness.history.last_result().map(ExecutionRecord::id),
        Some(second.id())
    );
}

#[tokio::test]
async fn console_shutdown_cancels_unfinished_work() {
    let mut console =
        Console::start(WorkerConfig::default(), RedrawSignal::new(), ExitSignal::new())
            .expect("start console");
    let mut history = History::default();
    let Ok(SubmitOutcome::Submitted(running)) = console.submit("sleep(30)", &mut history) else {
        panic!("submission rejected");
    };
    let Ok(SubmitOutcome::Submitted(queued)) = console.submit("2", &mut history) else {
        panic!("submission rejected");
    };

    let started = Instant::now();
    console.shutdown(&mut history, WAIT).await;
    assert!(started.elapsed() < WAIT);
    assert_eq!(history.pending_count(), 0);
    assert!(running.is_cancelled());
    assert_eq!(
        history.get(queued.id()).expect("row").status(),
        RecordStatus::Cancelled
    );
}

#[tokio::test]
async fn console_wait_for_returns_the_settled_record() {
    let mut console =
        Console::start(WorkerConfig::default(), RedrawSignal::new(), ExitSignal::new())
            .expect("start console");
    let mut history = History::default();
    let Ok(SubmitOutcome::Submitted(handle)) = console.submit("'a' * 3", &mut history) else {
        panic!("submission rejected");
    };
    let record = tokio::time::timeout(WAIT, console.wait_for(handle.id(), &mut history))
        .await
        .expect("settles")
        .expect("worker alive")
        .expect("record kept");
    assert_eq!(record.result_text(), Some("\"aaa\""));
    assert!(console.drain(&mut history).is_ok());
}
