use anyhow::Result;

use quartzdb::catalog::{DataValue, Tuple};
use quartzdb::query::executor::operators::{
    AggregateType, AggregationExecutor, DeleteExecutor, HashJoinExecutor, IndexScanExecutor,
    InsertExecutor, JoinType, LimitExecutor, NestedIndexJoinExecutor, NestedLoopJoinExecutor,
    OrderDirection, SeqScanExecutor, SortExecutor, TopNExecutor, UpdateExecutor, ValuesExecutor,
};
use quartzdb::query::executor::collect;
use quartzdb::transaction::{IsolationLevel, LockMode, TransactionState};

mod common;
use common::{create_test_db, person, TestDb};

fn int(v: i64) -> DataValue {
    DataValue::Integer(v)
}

fn seed_people(db: &TestDb, table: &str, rows: Vec<Tuple>) -> Result<()> {
    db.create_people_table(table)?;
    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);
    let mut insert = InsertExecutor::new(ctx, table, Box::new(ValuesExecutor::new(rows)));
    collect(&mut insert)?;
    db.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_insert_reports_count_and_scan_reads_back() -> Result<()> {
    let db = create_test_db()?;
    db.create_people_table("people")?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let rows = vec![person(1, "ada"), person(2, "grace"), person(3, "edsger")];
    let mut insert = InsertExecutor::new(
        db.context(&txn),
        "people",
        Box::new(ValuesExecutor::new(rows)),
    );
    let output = collect(&mut insert)?;
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].value(0), Some(&int(3)));
    db.txn_manager.commit(&txn)?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let mut scan = SeqScanExecutor::new(db.context(&txn), "people");
    let rows = collect(&mut scan)?;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], person(1, "ada"));
    db.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_seq_scan_predicate_pushdown() -> Result<()> {
    let db = create_test_db()?;
    seed_people(
        &db,
        "people",
        (1..=10).map(|i| person(i, "p")).collect(),
    )?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let mut scan = SeqScanExecutor::new(db.context(&txn), "people").with_predicate(Box::new(
        |tuple| matches!(tuple.value(0), Some(DataValue::Integer(id)) if id % 2 == 0),
    ));
    let rows = collect(&mut scan)?;
    assert_eq!(rows.len(), 5);
    db.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_index_maintained_by_dml() -> Result<()> {
    let db = create_test_db()?;
    db.create_people_table("people")?;
    db.catalog
        .write()
        .create_index("people_pk", "people", 0, 8, 8)?;

    // Insert out of order
    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let rows = vec![person(30, "c"), person(10, "a"), person(20, "b")];
    let mut insert = InsertExecutor::new(
        db.context(&txn),
        "people",
        Box::new(ValuesExecutor::new(rows)),
    );
    collect(&mut insert)?;
    db.txn_manager.commit(&txn)?;

    // The index scan sees them in key order
    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let mut scan = IndexScanExecutor::new(db.context(&txn), "people_pk");
    let rows = collect(&mut scan)?;
    assert_eq!(
        rows.iter().map(|t| t.value(0).cloned()).collect::<Vec<_>>(),
        vec![Some(int(10)), Some(int(20)), Some(int(30))]
    );
    db.txn_manager.commit(&txn)?;

    // Update rewrites index entries (delete-then-insert)
    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);
    let scan = SeqScanExecutor::new(ctx.clone(), "people").with_predicate(Box::new(|tuple| {
        tuple.value(0) == Some(&DataValue::Integer(20))
    }));
    let mut update = UpdateExecutor::new(
        ctx,
        "people",
        Box::new(scan),
        Box::new(|old| {
            Tuple::new(vec![int(25), old.value(1).cloned().unwrap_or(DataValue::Null)])
        }),
    );
    let output = collect(&mut update)?;
    assert_eq!(output[0].value(0), Some(&int(1)));
    db.txn_manager.commit(&txn)?;

    let index = db.catalog.read().index("people_pk").unwrap();
    assert!(index.tree.get_value(&20)?.is_none());
    assert!(index.tree.get_value(&25)?.is_some());

    // Delete removes index entries
    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);
    let scan = SeqScanExecutor::new(ctx.clone(), "people").with_predicate(Box::new(|tuple| {
        tuple.value(0) == Some(&DataValue::Integer(10))
    }));
    let mut delete = DeleteExecutor::new(ctx, "people", Box::new(scan));
    let output = collect(&mut delete)?;
    assert_eq!(output[0].value(0), Some(&int(1)));
    db.txn_manager.commit(&txn)?;

    assert!(index.tree.get_value(&10)?.is_none());
    assert!(index.tree.get_value(&30)?.is_some());
    Ok(())
}

#[test]
fn test_abort_undoes_heap_and_index() -> Result<()> {
    let db = create_test_db()?;
    db.create_people_table("people")?;
    db.catalog
        .write()
        .create_index("people_pk", "people", 0, 8, 8)?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let rows = vec![person(1, "ghost"), person(2, "phantom")];
    let mut insert = InsertExecutor::new(
        db.context(&txn),
        "people",
        Box::new(ValuesExecutor::new(rows)),
    );
    collect(&mut insert)?;
    assert!(txn.write_set_len() > 0);
    db.txn_manager.abort(&txn)?;
    assert_eq!(txn.state(), TransactionState::Aborted);

    // Nothing survives the abort
    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let mut scan = SeqScanExecutor::new(db.context(&txn), "people");
    assert!(collect(&mut scan)?.is_empty());
    db.txn_manager.commit(&txn)?;

    let index = db.catalog.read().index("people_pk").unwrap();
    assert!(index.tree.get_value(&1)?.is_none());
    assert!(index.tree.get_value(&2)?.is_none());
    Ok(())
}

#[test]
fn test_abort_restores_deleted_and_updated_rows() -> Result<()> {
    let db = create_test_db()?;
    seed_people(&db, "people", vec![person(1, "ada"), person(2, "grace")])?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);
    let scan = SeqScanExecutor::new(ctx.clone(), "people");
    let mut delete = DeleteExecutor::new(ctx, "people", Box::new(scan));
    collect(&mut delete)?;
    db.txn_manager.abort(&txn)?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let mut scan = SeqScanExecutor::new(db.context(&txn), "people");
    let rows = collect(&mut scan)?;
    assert_eq!(rows.len(), 2);
    db.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_read_committed_scan_releases_row_locks() -> Result<()> {
    let db = create_test_db()?;
    seed_people(&db, "people", vec![person(1, "ada"), person(2, "grace")])?;

    let txn = db.txn_manager.begin(IsolationLevel::ReadCommitted);
    let table_id = db.catalog.read().table("people").unwrap().id;
    let mut scan = SeqScanExecutor::new(db.context(&txn), "people");
    let rows = collect(&mut scan)?;
    assert_eq!(rows.len(), 2);

    // Row S locks were taken and released per row; the table IS remains
    assert!(!txn.has_row_locks_on(table_id));
    assert_eq!(txn.table_lock_mode(table_id), Some(LockMode::IntentionShared));
    assert_eq!(txn.state(), TransactionState::Growing);
    db.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_nested_loop_join_inner_and_left() -> Result<()> {
    let db = create_test_db()?;
    seed_people(&db, "left_t", vec![person(1, "a"), person(2, "b"), person(3, "c")])?;
    seed_people(&db, "right_t", vec![person(2, "x"), person(3, "y")])?;

    let predicate = |l: &Tuple, r: &Tuple| l.value(0) == r.value(0);

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);
    let mut join = NestedLoopJoinExecutor::new(
        Box::new(SeqScanExecutor::new(ctx.clone(), "left_t")),
        Box::new(SeqScanExecutor::new(ctx.clone(), "right_t")),
        Box::new(predicate),
        JoinType::Inner,
        2,
    );
    let rows = collect(&mut join)?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].values().len(), 4);

    let mut join = NestedLoopJoinExecutor::new(
        Box::new(SeqScanExecutor::new(ctx.clone(), "left_t")),
        Box::new(SeqScanExecutor::new(ctx, "right_t")),
        Box::new(predicate),
        JoinType::Left,
        2,
    );
    let rows = collect(&mut join)?;
    assert_eq!(rows.len(), 3);
    // Row with id 1 has no match: right side is null-padded
    let unmatched = rows
        .iter()
        .find(|t| t.value(0) == Some(&int(1)))
        .expect("left row present");
    assert_eq!(unmatched.value(2), Some(&DataValue::Null));
    assert_eq!(unmatched.value(3), Some(&DataValue::Null));
    db.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_hash_join_builds_right_probes_left() -> Result<()> {
    let db = create_test_db()?;
    seed_people(
        &db,
        "orders",
        vec![person(1, "o1"), person(2, "o2"), person(2, "o3"), person(9, "o4")],
    )?;
    seed_people(&db, "users", vec![person(1, "ada"), person(2, "grace")])?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);

    let mut join = HashJoinExecutor::new(
        Box::new(SeqScanExecutor::new(ctx.clone(), "orders")),
        Box::new(SeqScanExecutor::new(ctx.clone(), "users")),
        0,
        0,
        JoinType::Inner,
        2,
    );
    let rows = collect(&mut join)?;
    assert_eq!(rows.len(), 3);

    let mut join = HashJoinExecutor::new(
        Box::new(SeqScanExecutor::new(ctx.clone(), "orders")),
        Box::new(SeqScanExecutor::new(ctx, "users")),
        0,
        0,
        JoinType::Left,
        2,
    );
    let rows = collect(&mut join)?;
    assert_eq!(rows.len(), 4);
    let unmatched = rows
        .iter()
        .find(|t| t.value(0) == Some(&int(9)))
        .expect("unmatched order");
    assert_eq!(unmatched.value(2), Some(&DataValue::Null));
    db.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_nested_index_join() -> Result<()> {
    let db = create_test_db()?;
    seed_people(&db, "orders", vec![person(2, "o1"), person(7, "o2")])?;
    seed_people(&db, "users", vec![person(1, "ada"), person(2, "grace")])?;
    db.catalog.write().create_index("users_pk", "users", 0, 8, 8)?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);

    let mut join = NestedIndexJoinExecutor::new(
        ctx.clone(),
        Box::new(SeqScanExecutor::new(ctx.clone(), "orders")),
        "users_pk",
        0,
        JoinType::Left,
    );
    let rows = collect(&mut join)?;
    assert_eq!(rows.len(), 2);

    let matched = rows.iter().find(|t| t.value(0) == Some(&int(2))).unwrap();
    assert_eq!(matched.value(3), Some(&DataValue::Text("grace".into())));
    let unmatched = rows.iter().find(|t| t.value(0) == Some(&int(7))).unwrap();
    assert_eq!(unmatched.value(2), Some(&DataValue::Null));
    db.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_aggregation_with_groups() -> Result<()> {
    let db = create_test_db()?;
    seed_people(
        &db,
        "people",
        vec![person(1, "a"), person(1, "b"), person(2, "c")],
    )?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let mut agg = AggregationExecutor::new(
        Box::new(SeqScanExecutor::new(db.context(&txn), "people")),
        vec![0],
        vec![
            (AggregateType::CountStar, None),
            (AggregateType::Min, Some(1)),
        ],
    );
    let rows = collect(&mut agg)?;
    // Groups come out in first-seen order
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].values()[..2], [int(1), int(2)]);
    assert_eq!(rows[1].values()[..2], [int(2), int(1)]);
    db.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_aggregation_empty_input_no_groups() -> Result<()> {
    let db = create_test_db()?;
    seed_people(&db, "people", vec![])?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let mut agg = AggregationExecutor::new(
        Box::new(SeqScanExecutor::new(db.context(&txn), "people")),
        vec![],
        vec![
            (AggregateType::CountStar, None),
            (AggregateType::Sum, Some(0)),
            (AggregateType::Max, Some(0)),
        ],
    );
    let rows = collect(&mut agg)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].values(),
        &[int(0), DataValue::Null, DataValue::Null]
    );
    db.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_sort_is_stable_and_multi_key() -> Result<()> {
    let db = create_test_db()?;
    seed_people(
        &db,
        "people",
        vec![person(2, "b"), person(1, "z"), person(2, "a"), person(1, "y")],
    )?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    // Single key: duplicates keep their input order (stable tie)
    let mut sort = SortExecutor::new(
        Box::new(SeqScanExecutor::new(db.context(&txn), "people")),
        vec![(0, OrderDirection::Default)],
    );
    let rows = collect(&mut sort)?;
    assert_eq!(rows[0], person(1, "z"));
    assert_eq!(rows[1], person(1, "y"));
    assert_eq!(rows[2], person(2, "b"));
    assert_eq!(rows[3], person(2, "a"));

    // Second key breaks the tie
    let mut sort = SortExecutor::new(
        Box::new(SeqScanExecutor::new(db.context(&txn), "people")),
        vec![(0, OrderDirection::Asc), (1, OrderDirection::Desc)],
    );
    let rows = collect(&mut sort)?;
    assert_eq!(rows[0], person(1, "z"));
    assert_eq!(rows[1], person(1, "y"));
    assert_eq!(rows[2], person(2, "b"));
    assert_eq!(rows[3], person(2, "a"));
    db.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_limit() -> Result<()> {
    let db = create_test_db()?;
    seed_people(&db, "people", (1..=10).map(|i| person(i, "p")).collect())?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let mut limit = LimitExecutor::new(
        Box::new(SeqScanExecutor::new(db.context(&txn), "people")),
        4,
    );
    assert_eq!(collect(&mut limit)?.len(), 4);

    let mut limit = LimitExecutor::new(
        Box::new(SeqScanExecutor::new(db.context(&txn), "people")),
        100,
    );
    assert_eq!(collect(&mut limit)?.len(), 10);
    db.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_topn_matches_sort_plus_limit() -> Result<()> {
    let db = create_test_db()?;
    let rows: Vec<Tuple> = [5, 3, 9, 1, 7, 3, 8, 2]
        .iter()
        .enumerate()
        .map(|(i, &id)| person(id, &format!("p{}", i)))
        .collect();
    seed_people(&db, "people", rows)?;

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead);
    let order = vec![(0, OrderDirection::Desc)];

    let mut sorted = SortExecutor::new(
        Box::new(SeqScanExecutor::new(db.context(&txn), "people")),
        order.clone(),
    );
    let mut expected = collect(&mut sorted)?;
    expected.truncate(3);

    let mut topn = TopNExecutor::new(
        Box::new(SeqScanExecutor::new(db.context(&txn), "people")),
        order,
        3,
    );
    let actual = collect(&mut topn)?;
    assert_eq!(actual, expected);
    db.txn_manager.commit(&txn)?;
    Ok(())
}
