//! Ordinary transaction tests

use crate::*;
use std::panic::{catch_unwind, AssertUnwindSafe};

#[test]
fn committed_write_is_visible() {
    let (db, _) = create_db();
    write_value(&db, 0, 41, OperationOptions::NONE);
    write_value(&db, 2, 43, OperationOptions::NONE);

    assert_eq!(read_value(&db, 0), Some(41));
    assert_eq!(read_value(&db, 1), Some(0));
    assert_eq!(read_value(&db, 2), Some(43));
    assert_eq!(read_value(&db, 3), None);
}

#[test]
fn rollback_restores_pages_and_files() {
    let (db, _) = create_db();
    write_value(&db, 0, 1, OperationOptions::NONE);

    let mut op = FnOperation::write(|tx: &mut dyn RawTransaction| {
        tx.write_region(0, 0, 0, 8)?.write_long(0, 2)?;
        tx.write_region(0, 5, 0, 8)?.write_long(0, 5)?;
        tx.bind_file(7, Some("scratch"))?;
        Err(RawDatabaseError::aborted("changed my mind"))
    });
    let err = db.transaction(&mut op).unwrap_err();
    assert!(matches!(err, Error::Aborted(_)));

    assert_eq!(read_value(&db, 0), Some(1));
    assert_eq!(read_value(&db, 5), None);
    let mut probe = FnOperation::read(|tx: &mut dyn RawTransaction| {
        assert!(!tx.is_file_bound(7));
        assert_eq!(tx.page_count(0)?, 1);
        Ok(())
    });
    db.transaction(&mut probe).unwrap();
}

#[test]
fn panicking_operation_leaves_database_usable() {
    let (db, _) = create_db();
    write_value(&db, 0, 10, OperationOptions::NONE);

    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut op = FnOperation::write(|tx: &mut dyn RawTransaction| {
            tx.write_region(0, 0, 0, 8)?.write_long(0, 99)?;
            panic!("operation bug");
        });
        let _ = db.transaction(&mut op);
    }));
    assert!(result.is_err());

    assert_eq!(read_value(&db, 0), Some(10));
    write_value(&db, 0, 11, OperationOptions::NONE);
    assert_eq!(read_value(&db, 0), Some(11));
}

#[test]
fn durable_commit_survives_reopen() {
    let (db, store) = create_db();
    write_value(&db, 0, 7, OperationOptions::DURABLE);
    write_value(&db, 1, 8, OperationOptions::NONE);
    drop(db);

    let reopened = open_on(store, test_config());
    assert_eq!(read_value(&reopened, 0), Some(7));
    // Cached-only commit never reached the store
    assert_eq!(read_value(&reopened, 1), None);
}

#[test]
fn flush_option_syncs_the_store() {
    let (db, store) = create_db();
    write_value(&db, 0, 1, OperationOptions::DURABLE);
    assert_eq!(store.sync_count(), 0);
    write_value(&db, 0, 2, OperationOptions::FLUSH);
    assert_eq!(store.sync_count(), 1);

    write_value(&db, 1, 3, OperationOptions::NONE);
    db.flush().unwrap();
    assert_eq!(store.sync_count(), 2);
}

#[test]
fn operations_in_one_transaction_share_parameters() {
    let (db, _) = create_db();
    let mut first = FnOperation::write(|tx: &mut dyn RawTransaction| {
        tx.parameters().insert("next_page".into(), Box::new(3u64));
        Ok(())
    });
    let mut seen = None;
    let mut second = FnOperation::write(|tx: &mut dyn RawTransaction| {
        seen = tx
            .parameters()
            .get("next_page")
            .and_then(|v| v.downcast_ref::<u64>())
            .copied();
        Ok(())
    });
    db.database()
        .transaction_all(&mut [&mut first as &mut dyn RawOperation, &mut second])
        .unwrap();
    assert_eq!(seen, Some(3));
}

#[test]
fn read_only_transaction_cannot_write() {
    let (db, _) = create_db();
    write_value(&db, 0, 1, OperationOptions::NONE);

    let mut op = FnOperation::read(|tx: &mut dyn RawTransaction| {
        tx.write_region(0, 0, 0, 8)?;
        Ok(())
    });
    let err = db.transaction(&mut op).unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[test]
fn out_of_bounds_region_is_invalid_argument() {
    let (db, _) = create_db();
    write_value(&db, 0, 1, OperationOptions::NONE);

    let mut op = FnOperation::read(|tx: &mut dyn RawTransaction| {
        let page_size = tx.page_size();
        tx.read_region(0, 0, page_size - 4, 8)?;
        Ok(())
    });
    assert!(db.transaction(&mut op).unwrap_err().is_invalid_argument());
}

#[test]
fn start_time_comes_from_the_time_service() {
    let time = Arc::new(tessera::rawdb::ManualTimeService::new(5_000));
    let db = Tessera::builder()
        .config(test_config())
        .time_service(time.clone())
        .open()
        .unwrap();

    time.advance(250);
    let mut started = 0;
    let mut op = FnOperation::read(|tx: &mut dyn RawTransaction| {
        started = tx.start_time();
        Ok(())
    });
    db.transaction(&mut op).unwrap();
    assert_eq!(started, 5_250);
}
