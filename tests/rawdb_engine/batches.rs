//! Batch scheduling tests

use crate::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::thread;
use std::time::{Duration, Instant};

/// Counts its steps into page 0 of file 0.
pub struct CountingBatch {
    pub steps: u32,
    pub done: u32,
    pub locks: Vec<BatchLock>,
    pub fail_validate: bool,
    pub fail_at: Option<u32>,
    pub yield_in_first_step: bool,
    pub validated: Option<Sender<()>>,
    pub first_step: Option<Sender<()>>,
    pub locks_queried: AtomicU32,
    pub events: Vec<String>,
}

impl CountingBatch {
    pub fn new(steps: u32) -> Self {
        CountingBatch {
            steps,
            done: 0,
            locks: vec![BatchLock::exclusive("")],
            fail_validate: false,
            fail_at: None,
            yield_in_first_step: false,
            validated: None,
            first_step: None,
            locks_queried: AtomicU32::new(0),
            events: Vec::new(),
        }
    }

    pub fn with_locks(mut self, locks: Vec<BatchLock>) -> Self {
        self.locks = locks;
        self
    }
}

impl RawBatchOperation for CountingBatch {
    fn locks(&self) -> Vec<BatchLock> {
        self.locks_queried.fetch_add(1, Ordering::SeqCst);
        self.locks.clone()
    }

    fn validate(&mut self, transaction: &mut dyn RawTransaction) -> RawResult<()> {
        self.events.push("validate".into());
        transaction.bind_file(0, Some("values"))?;
        transaction.write_region(0, 0, 0, 8)?.write_long(0, 0)?;
        if self.fail_validate {
            return Err(RawDatabaseError::aborted("nothing to do"));
        }
        if let Some(validated) = self.validated.take() {
            validated.send(()).unwrap();
        }
        Ok(())
    }

    fn run(
        &mut self,
        transaction: &mut dyn RawTransaction,
        control: &dyn RawBatchControl,
    ) -> RawResult<bool> {
        self.done += 1;
        self.events.push(format!("run {}", self.done));
        transaction
            .write_region(0, 0, 0, 8)?
            .write_long(0, i64::from(self.done))?;
        if self.fail_at == Some(self.done) {
            return Err(RawDatabaseError::invalid_state("step failed"));
        }
        if self.done == 1 {
            if let Some(first_step) = self.first_step.take() {
                first_step.send(()).unwrap();
            }
            if self.yield_in_first_step {
                while control.can_continue() {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
        Ok(self.done >= self.steps)
    }

    fn on_committed(&mut self, completed: bool) {
        self.events.push(format!("committed {}", completed));
    }

    fn on_before_rolled_back(&mut self) {
        self.events.push("before_rolled_back".into());
    }

    fn on_rolled_back(&mut self) {
        self.events.push("rolled_back".into());
    }
}

/// Configuration whose run steps only yield to queued transactions
fn patient_config() -> RawDatabaseConfig {
    RawDatabaseConfig {
        batch_run_period_ms: 60_000,
        batch_yield_timeout_ms: 60_000,
        ..test_config()
    }
}

#[test]
fn batch_runs_until_done() {
    let (db, _) = create_db();
    let mut batch = CountingBatch::new(3);
    db.transaction_batch(&mut batch).unwrap();

    assert_eq!(
        batch.events,
        [
            "validate",
            "run 1",
            "committed false",
            "run 2",
            "committed false",
            "run 3",
            "committed true"
        ]
    );
    assert_eq!(read_value(&db, 0), Some(3));
    // Once on activation, then between every pair of steps
    assert_eq!(batch.locks_queried.load(Ordering::SeqCst), 3);
}

#[test]
fn step_error_ends_the_batch_as_completed() {
    let (db, _) = create_db();
    let mut batch = CountingBatch::new(5);
    batch.fail_at = Some(2);
    db.transaction_batch(&mut batch).unwrap();

    assert_eq!(
        batch.events,
        ["validate", "run 1", "committed false", "run 2", "committed true"]
    );
    // The failing step's writes are committed
    assert_eq!(read_value(&db, 0), Some(2));
}

#[test]
fn validate_error_aborts_and_rolls_back() {
    let (db, _) = create_db();
    let mut batch = CountingBatch::new(3);
    batch.fail_validate = true;
    let err = db.transaction_batch(&mut batch).unwrap_err();

    assert!(matches!(err, Error::Aborted(_)));
    assert_eq!(batch.events, ["validate", "before_rolled_back", "rolled_back"]);
    assert_eq!(read_value(&db, 0), None);
}

#[test]
fn conflicting_transaction_waits_for_exclusive_batch() {
    let (db, _) = create_db();
    let (validated, on_validated) = channel();
    let mut batch = CountingBatch::new(3).with_locks(vec![BatchLock::exclusive("a")]);
    batch.validated = Some(validated);

    thread::scope(|s| {
        let runner = s.spawn(|| db.transaction_batch(&mut batch));
        on_validated.recv().unwrap();

        let mut seen = None;
        let mut op = FnOperation::read(|tx: &mut dyn RawTransaction| {
            seen = Some(tx.read_region(0, 0, 0, 8)?.read_long(0)?);
            Ok(())
        })
        .with_predicates(&["a.b"]);
        db.transaction(&mut op).unwrap();
        assert_eq!(seen, Some(3));

        runner.join().unwrap().unwrap();
    });
}

#[test]
fn non_conflicting_transaction_runs_between_steps() {
    let store = Arc::new(MemoryPageStore::new());
    let db = open_on(store, patient_config());
    let (first_step, on_first_step) = channel();
    let mut batch = CountingBatch::new(3).with_locks(vec![BatchLock::exclusive("a")]);
    batch.first_step = Some(first_step);
    batch.yield_in_first_step = true;

    thread::scope(|s| {
        let runner = s.spawn(|| db.transaction_batch(&mut batch));
        on_first_step.recv().unwrap();

        let mut seen = None;
        let mut op = FnOperation::write(|tx: &mut dyn RawTransaction| {
            seen = Some(tx.read_region(0, 0, 0, 8)?.read_long(0)?);
            tx.write_region(0, 1, 0, 8)?.write_long(0, -1)
        })
        .with_predicates(&["b"]);
        db.transaction(&mut op).unwrap();
        // Ran after the first step committed and before the second began
        assert_eq!(seen, Some(1));

        runner.join().unwrap().unwrap();
    });
    assert_eq!(read_value(&db, 0), Some(3));
    assert_eq!(read_value(&db, 1), Some(-1));
}

#[test]
fn shared_batch_lets_read_only_transactions_through() {
    let store = Arc::new(MemoryPageStore::new());
    let db = open_on(store, patient_config());
    let (first_step, on_first_step) = channel();
    let mut batch = CountingBatch::new(2).with_locks(vec![BatchLock::shared("a")]);
    batch.first_step = Some(first_step);
    batch.yield_in_first_step = true;

    thread::scope(|s| {
        let runner = s.spawn(|| db.transaction_batch(&mut batch));
        on_first_step.recv().unwrap();

        let mut seen = None;
        let mut op = FnOperation::read(|tx: &mut dyn RawTransaction| {
            seen = Some(tx.read_region(0, 0, 0, 8)?.read_long(0)?);
            Ok(())
        })
        .with_predicates(&["a.x"]);
        db.transaction(&mut op).unwrap();
        assert_eq!(seen, Some(1));

        runner.join().unwrap().unwrap();
    });
}

#[test]
fn step_yields_after_its_time_slice() {
    let (db, _) = create_db();
    let mut batch = CountingBatch::new(2);
    batch.yield_in_first_step = true;

    let started = Instant::now();
    db.transaction_batch(&mut batch).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(test_config().batch_run_period_ms));
    assert_eq!(read_value(&db, 0), Some(2));
}
