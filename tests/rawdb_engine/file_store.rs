//! Directory-backed store tests

use crate::*;
use tessera::rawdb::FilePageStore;

#[test]
fn data_survives_reopen_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Tessera::builder()
            .path(dir.path())
            .config(test_config())
            .open()
            .unwrap();
        assert!(!db.is_ephemeral());
        write_value(&db, 0, 12, OperationOptions::NONE);
        write_value(&db, 3, 15, OperationOptions::NONE);
        db.flush().unwrap();
    }

    let db = Tessera::builder()
        .path(dir.path())
        .config(test_config())
        .open()
        .unwrap();
    assert_eq!(read_value(&db, 0), Some(12));
    assert_eq!(read_value(&db, 3), Some(15));

    let mut name = None;
    let mut op = FnOperation::read(|tx: &mut dyn RawTransaction| {
        name = tx.file_name(0)?;
        Ok(())
    });
    db.transaction(&mut op).unwrap();
    assert_eq!(name.as_deref(), Some("values"));
}

#[test]
fn unflushed_writes_are_lost() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Tessera::builder()
            .path(dir.path())
            .config(test_config())
            .open()
            .unwrap();
        write_value(&db, 0, 1, OperationOptions::FLUSH);
        write_value(&db, 0, 2, OperationOptions::NONE);
    }

    let db = Tessera::builder()
        .path(dir.path())
        .config(test_config())
        .open()
        .unwrap();
    assert_eq!(read_value(&db, 0), Some(1));
}

#[test]
fn store_lists_files_written_by_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = Tessera::builder()
        .path(dir.path())
        .config(test_config())
        .open()
        .unwrap();
    write_value(&db, 1, 5, OperationOptions::DURABLE);
    drop(db);

    let store = FilePageStore::open(dir.path()).unwrap();
    let files = store.list_files().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].index, 0);
    assert_eq!(files[0].name.as_deref(), Some("values"));
    assert_eq!(files[0].length, 2 * 512);
}

#[test]
fn configuration_loads_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tessera.toml");
    std::fs::write(&path, "page_size = 1024\nmax_cached_pages = 8\n").unwrap();

    let db = Tessera::builder().config_file(&path).unwrap().open().unwrap();
    let config = db.database().config();
    assert_eq!(config.page_size, 1024);
    assert_eq!(config.max_cached_pages, 8);
    assert_eq!(config.batch_run_period_ms, 100);

    let mut page_size = 0;
    let mut op = FnOperation::read(|tx: &mut dyn RawTransaction| {
        page_size = tx.page_size();
        Ok(())
    });
    db.transaction(&mut op).unwrap();
    assert_eq!(page_size, 1024);
}

#[test]
fn out_of_range_configuration_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tessera.toml");
    std::fs::write(&path, "page_size = 100\n").unwrap();

    let err = Tessera::builder()
        .config_file(&path)
        .unwrap()
        .open()
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
