use super::*;
use crate::store::ProgressStore;

#[tokio::test]
async fn test_get_last_on_fresh_database_is_none() {
    let (_temp_file, db) = open_db().await;

    assert!(db.get_last().await.unwrap().is_none());
    assert_eq!(db.count_sync_fetches().await.unwrap(), 0);

    db.close().await;
}

#[tokio::test]
async fn test_commit_advance_records_progress_and_artifacts() {
    let (_temp_file, db) = open_db().await;
    let before = CursorTriple::default();
    let after = cursors(Some("o2"), Some("i1"), None);

    db.commit_advance(
        &[voucher(1, 1), notice(1, 2), input(1)],
        &before,
        &after,
    )
    .await
    .unwrap();

    assert_eq!(db.get_last().await.unwrap(), Some(after.clone()));

    let record = db.get_last_sync_fetch().await.unwrap().unwrap();
    assert_eq!(record.before, before);
    assert_eq!(record.after, after);
    assert_eq!(record.output_ids, "1:1;1:2");
    assert!(record.timestamp_ms > 0);

    assert!(db.get_voucher(1, 1).await.unwrap().is_some());
    assert!(db.get_notice(1, 2).await.unwrap().is_some());
    assert!(db.get_input(1).await.unwrap().is_some());

    db.close().await;
}

#[tokio::test]
async fn test_commit_without_cursor_move_writes_no_record() {
    let (_temp_file, db) = open_db().await;
    let same = cursors(None, None, Some("r1"));

    db.commit_advance(&[report(5, 2)], &same, &same).await.unwrap();

    assert_eq!(db.count_sync_fetches().await.unwrap(), 0);
    assert_eq!(db.list_reports(None).await.unwrap().len(), 1);

    db.close().await;
}

#[tokio::test]
async fn test_idempotent_redelivery() {
    let (_temp_file, db) = open_db().await;
    let page = [voucher(1, 1), notice(1, 2), input(1), report(1, 1)];
    let after = cursors(Some("o2"), Some("i1"), Some("r1"));

    // Crash after commit but before the caller learned about it: same page again
    db.commit_advance(&page, &CursorTriple::default(), &after)
        .await
        .unwrap();
    db.commit_advance(&page, &CursorTriple::default(), &after)
        .await
        .unwrap();

    assert_eq!(db.list_vouchers(100, 0).await.unwrap().len(), 1);
    assert_eq!(db.list_notices(100, 0).await.unwrap().len(), 1);
    assert_eq!(db.list_inputs(100, 0).await.unwrap().len(), 1);
    assert_eq!(db.list_reports(None).await.unwrap().len(), 1);
    assert_eq!(db.get_last().await.unwrap(), Some(after));

    db.close().await;
}

#[tokio::test]
async fn test_failed_commit_is_all_or_nothing() {
    let (_temp_file, db) = open_db().await;
    let start = cursors(Some("o1"), None, None);
    db.commit_advance(&[voucher(0, 0)], &CursorTriple::default(), &start)
        .await
        .unwrap();

    // The last artifact cannot be stored, after earlier ones were already written
    let page = [voucher(1, 1), input(1), notice(1, u64::MAX)];
    let result = db
        .commit_advance(&page, &start, &cursors(Some("o9"), Some("i1"), None))
        .await;

    assert!(
        matches!(
            result,
            Err(crate::Error::Database(DatabaseError::OutOfRange {
                column: "notices.output_index",
                ..
            }))
        ),
        "got {:?}",
        result
    );
    assert_eq!(db.get_last().await.unwrap(), Some(start), "cursor must not move");
    assert!(db.get_voucher(1, 1).await.unwrap().is_none());
    assert!(db.get_input(1).await.unwrap().is_none());
    assert_eq!(db.count_sync_fetches().await.unwrap(), 1);

    db.close().await;
}

#[tokio::test]
async fn test_resume_reads_latest_record() {
    let temp_file = NamedTempFile::new().unwrap();
    let first = cursors(Some("o1"), None, None);
    let second = cursors(Some("o2"), Some("i1"), None);

    {
        let db = Database::new(temp_file.path()).await.unwrap();
        db.commit_advance(&[voucher(1, 1)], &CursorTriple::default(), &first)
            .await
            .unwrap();
        db.commit_advance(&[voucher(2, 2), input(1)], &first, &second)
            .await
            .unwrap();
        db.close().await;
    }

    let db = Database::new(temp_file.path()).await.unwrap();
    assert_eq!(db.get_last().await.unwrap(), Some(second));

    db.close().await;
}

#[tokio::test]
async fn test_record_sync_fetch_returns_increasing_ids() {
    let (_temp_file, db) = open_db().await;
    let a = cursors(Some("a"), None, None);
    let b = cursors(Some("b"), None, None);

    let first = db
        .record_sync_fetch(&CursorTriple::default(), &a, "")
        .await
        .unwrap();
    let second = db.record_sync_fetch(&a, &b, "3:4").await.unwrap();

    assert!(second > first);
    let last = db.get_last_sync_fetch().await.unwrap().unwrap();
    assert_eq!(last.id, second);
    assert_eq!(last.output_ids, "3:4");

    db.close().await;
}

#[tokio::test]
async fn test_purge_keeps_latest_record() {
    let (_temp_file, db) = open_db().await;
    let mut before = CursorTriple::default();
    for n in 1..=3 {
        let after = cursors(Some(&format!("o{n}")), None, None);
        db.record_sync_fetch(&before, &after, "").await.unwrap();
        before = after;
    }

    // Cutoff in the future: everything is "old"
    let cutoff = chrono::Utc::now().timestamp_millis() + 60_000;
    let deleted = db.purge_sync_fetches_before(cutoff).await.unwrap();

    assert_eq!(deleted, 2);
    assert_eq!(db.count_sync_fetches().await.unwrap(), 1);
    assert_eq!(db.get_last().await.unwrap(), Some(before));

    // Nothing left to purge but the resume point
    assert_eq!(db.purge_sync_fetches_before(cutoff).await.unwrap(), 0);

    db.close().await;
}

#[tokio::test]
async fn test_purge_ignores_recent_records() {
    let (_temp_file, db) = open_db().await;
    db.record_sync_fetch(&CursorTriple::default(), &cursors(Some("o1"), None, None), "")
        .await
        .unwrap();
    db.record_sync_fetch(
        &cursors(Some("o1"), None, None),
        &cursors(Some("o2"), None, None),
        "",
    )
    .await
    .unwrap();

    let cutoff = chrono::Utc::now().timestamp_millis() - 60_000;
    assert_eq!(db.purge_sync_fetches_before(cutoff).await.unwrap(), 0);
    assert_eq!(db.count_sync_fetches().await.unwrap(), 2);

    db.close().await;
}
