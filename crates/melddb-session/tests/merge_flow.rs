//! End-to-end merge orchestration: branching, the merge state machine,
//! conflict resolution, and referential integrity across merges.

use melddb_commons::{
    CheckConstraint, ColumnDefinition, DataType, ForeignKeyConstraint, IndexDefinition,
    ReferentialAction, Row, RowKey, SessionSettings, TableName, TableSchema, Value,
};
use melddb_session::{MergeOptions, MergeOutcome, Session, SessionError};
use melddb_versioning::{Database, MergeState, DEFAULT_BRANCH};

fn new_session() -> Session {
    Session::new(Database::init("alice"), SessionSettings::default())
}

fn parent() -> TableName {
    TableName::new("parent")
}

fn child() -> TableName {
    TableName::new("child")
}

fn parent_schema() -> TableSchema {
    TableSchema::new(
        parent(),
        vec![
            ColumnDefinition::primary_key("id", 1, DataType::BigInt),
            ColumnDefinition::simple("label", 2, DataType::Text),
        ],
    )
    .unwrap()
}

fn child_schema(on_delete: ReferentialAction, on_update: ReferentialAction) -> TableSchema {
    let mut schema = TableSchema::new(
        child(),
        vec![
            ColumnDefinition::primary_key("id", 1, DataType::BigInt),
            ColumnDefinition::simple("parent_id", 2, DataType::BigInt),
        ],
    )
    .unwrap();
    schema
        .add_index(IndexDefinition::new("idx_parent_id", vec!["parent_id".into()]))
        .unwrap();
    schema
        .add_foreign_key(
            ForeignKeyConstraint::new(
                "fk_parent",
                child(),
                vec!["parent_id".into()],
                parent(),
                vec!["id".into()],
            )
            .on_delete(on_delete)
            .on_update(on_update),
        )
        .unwrap();
    schema
}

fn parent_row(id: i64, label: &str) -> Row {
    Row::from_pairs([("id", Value::BigInt(id)), ("label", Value::from(label))])
}

fn child_row(id: i64, parent_id: i64) -> Row {
    Row::from_pairs([("id", Value::BigInt(id)), ("parent_id", Value::BigInt(parent_id))])
}

fn pk(id: i64) -> RowKey {
    RowKey::primary(vec![Value::BigInt(id)])
}

/// Seed parent/child tables with one parent and one child row, committed
/// on main.
fn seed_parent_child(s: &Session, on_delete: ReferentialAction, on_update: ReferentialAction) {
    s.create_table(parent_schema()).unwrap();
    s.create_table(child_schema(on_delete, on_update)).unwrap();
    s.insert_row(&parent(), parent_row(3, "three")).unwrap();
    s.insert_row(&child(), child_row(1, 3)).unwrap();
    s.commit("seed parent and child").unwrap();
}

#[test]
fn test_on_update_cascade_merges_clean_across_branches() {
    let s = new_session();
    seed_parent_child(&s, ReferentialAction::Restrict, ReferentialAction::Cascade);

    // Feature branch rewrites the parent primary key; the cascade follows.
    s.create_branch("feature").unwrap();
    s.checkout("feature").unwrap();
    s.update_row(&parent(), &pk(3), parent_row(30, "three")).unwrap();
    s.commit("renumber parent").unwrap();

    let snap = s.read_working_table(&child()).unwrap();
    assert_eq!(snap.get(&pk(1)).unwrap().get("parent_id"), &Value::BigInt(30));

    // Main moves independently.
    s.checkout(DEFAULT_BRANCH).unwrap();
    s.insert_row(&parent(), parent_row(4, "four")).unwrap();
    s.commit("add another parent").unwrap();

    let outcome = s.merge(&"feature".into(), MergeOptions::default()).unwrap();
    assert_eq!(outcome, MergeOutcome::Clean);

    let parent_snap = s.read_working_table(&parent()).unwrap();
    assert!(parent_snap.get(&pk(3)).is_none());
    assert!(parent_snap.get(&pk(30)).is_some());
    assert!(parent_snap.get(&pk(4)).is_some());

    let child_snap = s.read_working_table(&child()).unwrap();
    assert_eq!(
        child_snap.get(&pk(1)).unwrap().get("parent_id"),
        &Value::BigInt(30)
    );

    assert!(s.constraint_violations().is_empty());
    assert!(s.verify_constraints(None).unwrap().is_empty());

    let commit = s.commit("").unwrap();
    assert_eq!(commit.parents.len(), 2);
    assert_eq!(commit.message, "Merge branch 'feature'");
    assert_eq!(s.merge_state().unwrap(), MergeState::Clean);
}

#[test]
fn test_fast_forward_and_already_up_to_date() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.commit("setup").unwrap();

    s.create_branch("dev").unwrap();
    s.checkout("dev").unwrap();
    s.insert_row(&parent(), parent_row(1, "one")).unwrap();
    let dev_head = s.commit("add row").unwrap();

    s.checkout(DEFAULT_BRANCH).unwrap();
    let outcome = s.merge(&"dev".into(), MergeOptions::default()).unwrap();
    assert_eq!(outcome, MergeOutcome::FastForward(dev_head.hash.clone()));
    assert_eq!(s.current_branch_head().unwrap().hash, dev_head.hash);
    assert!(!s.read_working_table(&parent()).unwrap().rows().is_empty());

    // Nothing left to merge in either direction of this history.
    let outcome = s.merge(&"dev".into(), MergeOptions::default()).unwrap();
    assert_eq!(outcome, MergeOutcome::AlreadyUpToDate);
    assert_eq!(outcome.to_string(), "already up to date");
}

#[test]
fn test_no_ff_creates_a_merge_commit() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.commit("setup").unwrap();

    s.create_branch("dev").unwrap();
    s.checkout("dev").unwrap();
    s.insert_row(&parent(), parent_row(1, "one")).unwrap();
    let dev_head = s.commit("add row").unwrap();

    s.checkout(DEFAULT_BRANCH).unwrap();
    let main_head = s.current_branch_head().unwrap();
    let outcome = s
        .merge(
            &"dev".into(),
            MergeOptions {
                no_ff: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Clean);

    let commit = s.commit("").unwrap();
    assert_eq!(commit.parents, vec![main_head.hash.clone(), dev_head.hash.clone()]);
}

#[test]
fn test_squash_merge_has_single_parent() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.commit("setup").unwrap();

    s.create_branch("dev").unwrap();
    s.checkout("dev").unwrap();
    s.insert_row(&parent(), parent_row(1, "one")).unwrap();
    s.commit("add row").unwrap();

    s.checkout(DEFAULT_BRANCH).unwrap();
    let main_head = s.current_branch_head().unwrap();
    let outcome = s
        .merge(
            &"dev".into(),
            MergeOptions {
                squash: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Clean);

    let commit = s.commit("squashed dev").unwrap();
    assert_eq!(commit.parents, vec![main_head.hash.clone()]);
    assert!(s.read_working_table(&parent()).unwrap().get(&pk(1)).is_some());
}

#[test]
fn test_disjoint_row_additions_union() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.insert_row(&parent(), parent_row(1, "one")).unwrap();
    s.commit("seed").unwrap();

    s.create_branch("dev").unwrap();
    s.checkout("dev").unwrap();
    s.insert_row(&parent(), parent_row(2, "two")).unwrap();
    s.commit("dev adds 2").unwrap();

    s.checkout(DEFAULT_BRANCH).unwrap();
    s.insert_row(&parent(), parent_row(3, "three")).unwrap();
    s.commit("main adds 3").unwrap();

    let outcome = s.merge(&"dev".into(), MergeOptions::default()).unwrap();
    assert_eq!(outcome, MergeOutcome::Clean);
    assert!(s.conflicts_summary().is_empty());

    let snap = s.read_working_table(&parent()).unwrap();
    assert_eq!(snap.row_count(), 3);
    for id in [1, 2, 3] {
        assert!(snap.get(&pk(id)).is_some(), "row {id} missing after merge");
    }
}

#[test]
fn test_divergent_rows_conflict_resolve_then_commit() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.insert_row(&parent(), parent_row(1, "base")).unwrap();
    s.commit("seed").unwrap();

    s.create_branch("dev").unwrap();
    s.checkout("dev").unwrap();
    s.update_row(&parent(), &pk(1), parent_row(1, "theirs")).unwrap();
    let dev_head = s.commit("dev edit").unwrap();

    s.checkout(DEFAULT_BRANCH).unwrap();
    s.update_row(&parent(), &pk(1), parent_row(1, "ours")).unwrap();
    let main_head = s.commit("main edit").unwrap();

    let outcome = s.merge(&"dev".into(), MergeOptions::default()).unwrap();
    assert_eq!(
        outcome,
        MergeOutcome::Conflicts {
            conflicts: 1,
            violations: 0
        }
    );
    assert_eq!(s.merge_state().unwrap(), MergeState::MergingWithConflicts);
    assert_eq!(s.conflicts_summary(), vec![(parent(), 1)]);

    // Our version stays in place until the conflict is resolved.
    let snap = s.read_working_table(&parent()).unwrap();
    assert_eq!(snap.get(&pk(1)).unwrap().get("label"), &Value::from("ours"));

    let err = s.commit("too early").unwrap_err();
    assert!(matches!(err, SessionError::UnresolvedConflicts));

    let entries = s.conflicts_for(&parent());
    assert_eq!(entries.len(), 1);
    let theirs = entries[0].theirs.clone().unwrap();
    assert_eq!(theirs.get("label"), &Value::from("theirs"));

    s.resolve_conflict(&parent(), &pk(1), Some(theirs)).unwrap();
    assert_eq!(s.merge_state().unwrap(), MergeState::Merging);
    assert!(s.conflicts_summary().is_empty());

    let commit = s.commit("").unwrap();
    assert_eq!(commit.parents, vec![main_head.hash.clone(), dev_head.hash.clone()]);
    assert_eq!(s.merge_state().unwrap(), MergeState::Clean);

    let snap = s.read_working_table(&parent()).unwrap();
    assert_eq!(snap.get(&pk(1)).unwrap().get("label"), &Value::from("theirs"));
}

#[test]
fn test_merge_requires_clean_working_set() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.commit("setup").unwrap();
    s.create_branch("dev").unwrap();

    s.insert_row(&parent(), parent_row(1, "dirty")).unwrap();
    let err = s.merge(&"dev".into(), MergeOptions::default()).unwrap_err();
    assert!(matches!(err, SessionError::DirtyWorkingSet));
    assert_eq!(err.to_string(), "cannot merge with uncommitted changes");
}

#[test]
fn test_second_merge_blocked_until_committed() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.commit("setup").unwrap();

    s.create_branch("dev").unwrap();
    s.checkout("dev").unwrap();
    s.insert_row(&parent(), parent_row(1, "one")).unwrap();
    s.commit("dev work").unwrap();

    s.checkout(DEFAULT_BRANCH).unwrap();
    s.merge(
        &"dev".into(),
        MergeOptions {
            no_ff: true,
            ..Default::default()
        },
    )
    .unwrap();

    let err = s.merge(&"dev".into(), MergeOptions::default()).unwrap_err();
    assert!(matches!(err, SessionError::MergeInProgress));
    assert_eq!(
        err.to_string(),
        "merging is not possible because you have not committed an active merge"
    );
}

#[test]
fn test_abort_merge_discards_everything() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.insert_row(&parent(), parent_row(1, "base")).unwrap();
    s.commit("seed").unwrap();

    s.create_branch("dev").unwrap();
    s.checkout("dev").unwrap();
    s.update_row(&parent(), &pk(1), parent_row(1, "theirs")).unwrap();
    s.commit("dev edit").unwrap();

    s.checkout(DEFAULT_BRANCH).unwrap();
    s.update_row(&parent(), &pk(1), parent_row(1, "ours")).unwrap();
    s.commit("main edit").unwrap();

    let outcome = s.merge(&"dev".into(), MergeOptions::default()).unwrap();
    assert!(matches!(outcome, MergeOutcome::Conflicts { .. }));

    s.abort_merge().unwrap();
    assert_eq!(s.merge_state().unwrap(), MergeState::Clean);
    assert!(s.conflicts_summary().is_empty());

    let snap = s.read_working_table(&parent()).unwrap();
    assert_eq!(snap.get(&pk(1)).unwrap().get("label"), &Value::from("ours"));

    let err = s.abort_merge().unwrap_err();
    assert!(matches!(err, SessionError::NoActiveMerge));
}

#[test]
fn test_duplicate_check_names_abort_the_merge() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.commit("setup").unwrap();

    s.create_branch("dev").unwrap();
    s.checkout("dev").unwrap();
    s.alter_table(&parent(), |schema| {
        schema.add_check(CheckConstraint::new("chk_id", "id < 100", vec!["id".into()]))
    })
    .unwrap();
    s.commit("dev check").unwrap();

    s.checkout(DEFAULT_BRANCH).unwrap();
    s.alter_table(&parent(), |schema| {
        schema.add_check(CheckConstraint::new("chk_id", "id > 0", vec!["id".into()]))
    })
    .unwrap();
    s.commit("main check").unwrap();

    let err = s.merge(&"dev".into(), MergeOptions::default()).unwrap_err();
    assert!(
        err.to_string()
            .contains("two checks with the name 'chk_id' but different definitions"),
        "{err}"
    );
    // An aborted merge leaves no staged state behind.
    assert_eq!(s.merge_state().unwrap(), MergeState::Clean);
}

#[test]
fn test_merge_records_dangling_reference_as_violation() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.create_table(child_schema(
        ReferentialAction::Restrict,
        ReferentialAction::Restrict,
    ))
    .unwrap();
    s.insert_row(&parent(), parent_row(3, "three")).unwrap();
    s.commit("seed").unwrap();

    // Dev references the parent row main is about to delete.
    s.create_branch("dev").unwrap();
    s.checkout("dev").unwrap();
    s.insert_row(&child(), child_row(1, 3)).unwrap();
    s.commit("dev child").unwrap();

    s.checkout(DEFAULT_BRANCH).unwrap();
    s.delete_row(&parent(), &pk(3)).unwrap();
    s.commit("main delete").unwrap();

    let outcome = s.merge(&"dev".into(), MergeOptions::default()).unwrap();
    assert_eq!(
        outcome,
        MergeOutcome::Conflicts {
            conflicts: 0,
            violations: 1
        }
    );
    assert_eq!(s.merge_state().unwrap(), MergeState::MergingWithConflicts);

    let violations = s.constraint_violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].constraint_name, "fk_parent");
    assert_eq!(
        violations[0].detail,
        "Foreign key violation on fk: `fk_parent`, table: `child`, referenced table: `parent`, key: `[3]`"
    );
    assert_eq!(s.violations_summary(), vec![(child(), 1)]);
}

#[test]
fn test_violations_only_merge_resolves_to_clean_commit() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.create_table(child_schema(
        ReferentialAction::Restrict,
        ReferentialAction::Restrict,
    ))
    .unwrap();
    s.insert_row(&parent(), parent_row(3, "three")).unwrap();
    s.commit("seed").unwrap();

    s.create_branch("dev").unwrap();
    s.checkout("dev").unwrap();
    s.insert_row(&child(), child_row(1, 3)).unwrap();
    s.commit("dev child").unwrap();

    s.checkout(DEFAULT_BRANCH).unwrap();
    s.delete_row(&parent(), &pk(3)).unwrap();
    s.commit("main delete").unwrap();

    let outcome = s.merge(&"dev".into(), MergeOptions::default()).unwrap();
    assert_eq!(
        outcome,
        MergeOutcome::Conflicts {
            conflicts: 0,
            violations: 1
        }
    );

    // Repair the data, then destroy the ledger row individually.
    s.insert_row(&parent(), parent_row(3, "three")).unwrap();
    assert!(s.verify_constraints(None).unwrap().is_empty());

    let err = s.commit("too early").unwrap_err();
    assert!(matches!(err, SessionError::UnresolvedConflicts));

    let resolved = s.resolve_violation(&child(), &pk(1), "fk_parent").unwrap();
    assert_eq!(resolved.constraint_name, "fk_parent");
    assert_eq!(s.merge_state().unwrap(), MergeState::Merging);
    assert!(s.constraint_violations().is_empty());

    let commit = s.commit("").unwrap();
    assert_eq!(commit.parents.len(), 2);
    assert_eq!(s.merge_state().unwrap(), MergeState::Clean);

    // An unknown entry is a hard error, not a silent no-op.
    let err = s.resolve_violation(&child(), &pk(1), "fk_parent").unwrap_err();
    assert!(err.to_string().contains("not found"), "{err}");
}

#[test]
fn test_deferred_checks_allow_forward_table_references() {
    let s = new_session();
    s.set_foreign_key_checks(false);

    // The referenced table does not exist yet; DDL and the child write
    // both go through unchecked.
    s.create_table(child_schema(
        ReferentialAction::Restrict,
        ReferentialAction::Restrict,
    ))
    .unwrap();
    s.insert_row(&child(), child_row(1, 3)).unwrap();

    // Creating the parent with a matching row afterward makes the data
    // valid; re-enabled checks accept further child writes.
    s.create_table(parent_schema()).unwrap();
    s.insert_row(&parent(), parent_row(3, "three")).unwrap();
    s.set_foreign_key_checks(true);

    s.insert_row(&child(), child_row(2, 3)).unwrap();
    assert!(s.verify_constraints(None).unwrap().is_empty());

    let err = s.insert_row(&child(), child_row(9, 99)).unwrap_err();
    assert!(err.to_string().contains("fk_parent"), "{err}");
}

#[test]
fn test_carried_ledger_survives_checkout() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.insert_row(&parent(), parent_row(1, "base")).unwrap();
    s.commit("seed").unwrap();

    s.create_branch("dev").unwrap();
    s.checkout("dev").unwrap();
    s.update_row(&parent(), &pk(1), parent_row(1, "theirs")).unwrap();
    s.commit("dev edit").unwrap();

    s.checkout(DEFAULT_BRANCH).unwrap();
    s.update_row(&parent(), &pk(1), parent_row(1, "ours")).unwrap();
    s.commit("main edit").unwrap();

    s.merge(&"dev".into(), MergeOptions::default()).unwrap();
    s.set_allow_commit_with_conflicts(true);
    s.commit("merge with open conflicts").unwrap();

    // The carried ledger is branch state: invisible elsewhere, intact on
    // return.
    s.create_branch("other").unwrap();
    s.checkout("other").unwrap();
    assert!(s.conflicts_summary().is_empty());

    s.checkout(DEFAULT_BRANCH).unwrap();
    assert_eq!(s.conflicts_summary(), vec![(parent(), 1)]);

    // Still individually resolvable after the commit.
    let entries = s.conflicts_for(&parent());
    let theirs = entries[0].theirs.clone().unwrap();
    s.resolve_conflict(&parent(), &pk(1), Some(theirs)).unwrap();
    assert!(s.conflicts_summary().is_empty());
}

#[test]
fn test_commit_with_conflicts_when_allowed() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.insert_row(&parent(), parent_row(1, "base")).unwrap();
    s.commit("seed").unwrap();

    s.create_branch("dev").unwrap();
    s.checkout("dev").unwrap();
    s.update_row(&parent(), &pk(1), parent_row(1, "theirs")).unwrap();
    s.commit("dev edit").unwrap();

    s.checkout(DEFAULT_BRANCH).unwrap();
    s.update_row(&parent(), &pk(1), parent_row(1, "ours")).unwrap();
    s.commit("main edit").unwrap();

    s.merge(&"dev".into(), MergeOptions::default()).unwrap();
    s.set_allow_commit_with_conflicts(true);
    let commit = s.commit("merge with open conflicts").unwrap();
    assert_eq!(commit.parents.len(), 2);

    // The unresolved ledger rides along past the commit.
    assert_eq!(s.conflicts_summary(), vec![(parent(), 1)]);
    assert_eq!(s.merge_state().unwrap(), MergeState::Clean);
}

#[test]
fn test_deferred_checks_report_only_the_broken_constraint() {
    let s = new_session();
    s.create_table(parent_schema()).unwrap();
    s.create_table(TableSchema::new(
        TableName::new("other"),
        vec![ColumnDefinition::primary_key("id", 1, DataType::BigInt)],
    )
    .unwrap())
    .unwrap();

    // A child with two foreign keys: one will hold NULL, one will dangle.
    let mut schema = TableSchema::new(
        TableName::new("link"),
        vec![
            ColumnDefinition::primary_key("id", 1, DataType::BigInt),
            ColumnDefinition::simple("parent_id", 2, DataType::BigInt),
            ColumnDefinition::simple("other_id", 3, DataType::BigInt),
        ],
    )
    .unwrap();
    schema
        .add_index(IndexDefinition::new("idx_parent_id", vec!["parent_id".into()]))
        .unwrap();
    schema
        .add_index(IndexDefinition::new("idx_other_id", vec!["other_id".into()]))
        .unwrap();
    schema
        .add_foreign_key(ForeignKeyConstraint::new(
            "fk_parent",
            TableName::new("link"),
            vec!["parent_id".into()],
            parent(),
            vec!["id".into()],
        ))
        .unwrap();
    schema
        .add_foreign_key(ForeignKeyConstraint::new(
            "fk_other",
            TableName::new("link"),
            vec!["other_id".into()],
            TableName::new("other"),
            vec!["id".into()],
        ))
        .unwrap();
    s.create_table(schema).unwrap();

    s.set_foreign_key_checks(false);
    s.insert_row(
        &TableName::new("link"),
        Row::from_pairs([
            ("id", Value::BigInt(1)),
            ("parent_id", Value::Null),
            ("other_id", Value::BigInt(42)),
        ]),
    )
    .unwrap();
    s.set_foreign_key_checks(true);

    // NULL exempts fk_parent; only the dangling fk_other reports.
    let violations = s.verify_constraints(None).unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].constraint_name, "fk_other");
}

#[test]
fn test_restrict_blocks_parent_delete_across_tables() {
    let s = new_session();
    seed_parent_child(&s, ReferentialAction::Restrict, ReferentialAction::Restrict);

    let err = s.delete_row(&parent(), &pk(3)).unwrap_err();
    assert!(err.to_string().contains("fk_parent"), "{err}");

    // RESTRICT left both tables untouched.
    assert_eq!(s.read_working_table(&parent()).unwrap().row_count(), 1);
    assert_eq!(s.read_working_table(&child()).unwrap().row_count(), 1);
}

#[test]
fn test_on_delete_cascade_removes_children() {
    let s = new_session();
    seed_parent_child(&s, ReferentialAction::Cascade, ReferentialAction::Restrict);

    s.delete_row(&parent(), &pk(3)).unwrap();
    assert_eq!(s.read_working_table(&parent()).unwrap().row_count(), 0);
    assert_eq!(s.read_working_table(&child()).unwrap().row_count(), 0);
}
