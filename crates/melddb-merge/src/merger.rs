//! Root-level three-way merge.
//!
//! Matches tables across the base, ours, and theirs roots by table id (so a
//! rename is not a drop-and-create), merges every schema first, then merges
//! rows per table in foreign key dependency order, and finishes with an FK
//! verification pass over the touched tables. Schema conflicts abort the
//! whole merge with every conflict enumerated; row conflicts and dangling
//! references land in the returned ledger.

use crate::dep_order::merge_order;
use crate::error::MergeError;
use crate::ledger::ConflictLedger;
use crate::row_merge::merge_rows;
use crate::schema_merge::{merge_table_schemas, SchemaConflict};
use melddb_commons::{Row, TableName, TableSchema, PRIMARY_INDEX_NAME};
use melddb_constraints::{verify_foreign_keys, TableSet};
use melddb_versioning::{RootValue, TableSnapshot, VersioningError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug)]
pub struct MergeResult {
    pub root: RootValue,
    pub ledger: ConflictLedger,
}

/// Identity used to match one logical table across the three roots: the
/// stable table id when assigned, the name otherwise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum TableKey {
    Id(u64),
    Name(TableName),
}

fn key_of(schema: &TableSchema) -> TableKey {
    if schema.table_id != 0 {
        TableKey::Id(schema.table_id)
    } else {
        TableKey::Name(schema.table_name.clone())
    }
}

fn index_root(root: &RootValue) -> BTreeMap<TableKey, Arc<TableSnapshot>> {
    root.tables()
        .values()
        .map(|snap| (key_of(snap.schema()), snap.clone()))
        .collect()
}

/// Rewrite a side schema's FK parent references into base-side names, so the
/// table-level merge compares foreign keys rename-immune. The inverse
/// rewrite to merged names happens in `finalize_parent_refs`.
fn canonicalize_parent_refs(
    schema: &TableSchema,
    side_root: &RootValue,
    base_root: &RootValue,
) -> TableSchema {
    let mut schema = schema.clone();
    for fk in &mut schema.foreign_keys {
        let Some(parent) = side_root.table(&fk.referenced_table) else {
            continue;
        };
        let pschema = parent.schema();
        let Some((_, base_parent)) = base_root.table_by_id(pschema.table_id) else {
            continue;
        };
        let bschema = base_parent.schema();
        fk.referenced_table = bschema.table_name.clone();
        for col in &mut fk.referenced_columns {
            if let Some(side_col) = pschema.column(col) {
                if let Some(base_col) = bschema.column_by_tag(side_col.tag) {
                    *col = base_col.column_name.clone();
                }
            }
        }
    }
    schema
}

/// Column-level structural equality for tables created independently on
/// both branches: same names and definitions in order, same constraints.
/// Tags are branch-local for new tables and are ignored.
fn schemas_structurally_equal(a: &TableSchema, b: &TableSchema) -> bool {
    a.table_name == b.table_name
        && a.columns.len() == b.columns.len()
        && a.columns
            .iter()
            .zip(&b.columns)
            .all(|(x, y)| x.column_name == y.column_name && x.equal_defs(y))
        && a.indexes == b.indexes
        && a.checks == b.checks
        && a.foreign_keys == b.foreign_keys
}

/// Re-express a side snapshot's rows under the merged schema: base-derived
/// columns are matched by tag (so renames re-key), side-added columns by
/// name, and columns dropped by the merge disappear.
fn adapt_snapshot(
    snap: &TableSnapshot,
    merged: &TableSchema,
    base: Option<&TableSchema>,
) -> Result<TableSnapshot, VersioningError> {
    let side = snap.schema();
    let mut rows = Vec::with_capacity(snap.row_count());
    for row in snap.rows().values() {
        let mut out = Row::default();
        for col in &side.columns {
            let target = match base {
                Some(b) if b.column_by_tag(col.tag).is_some() => merged.column_by_tag(col.tag),
                _ => merged.column(&col.column_name),
            };
            if let Some(target) = target {
                out.set(target.column_name.clone(), row.get(&col.column_name).clone());
            }
        }
        rows.push(out);
    }
    TableSnapshot::from_rows(merged.clone(), rows)
}

pub fn merge_roots(
    base: &RootValue,
    ours: &RootValue,
    theirs: &RootValue,
) -> Result<MergeResult, MergeError> {
    let base_idx = index_root(base);
    let ours_idx = index_root(ours);
    let theirs_idx = index_root(theirs);

    let keys: BTreeSet<TableKey> = base_idx
        .keys()
        .chain(ours_idx.keys())
        .chain(theirs_idx.keys())
        .cloned()
        .collect();

    let mut conflicts: Vec<SchemaConflict> = Vec::new();
    let mut merged_schemas: BTreeMap<TableKey, TableSchema> = BTreeMap::new();

    // Phase 1: schema merge per logical table.
    for key in &keys {
        let b = base_idx.get(key);
        let o = ours_idx.get(key);
        let t = theirs_idx.get(key);
        match (b, o, t) {
            (Some(b), Some(o), Some(t)) => {
                let our_schema = canonicalize_parent_refs(o.schema(), ours, base);
                let their_schema = canonicalize_parent_refs(t.schema(), theirs, base);
                match merge_table_schemas(b.schema(), &our_schema, &their_schema) {
                    Ok(schema) => {
                        merged_schemas.insert(key.clone(), schema);
                    }
                    Err(found) => conflicts.extend(found),
                }
            }
            (Some(b), Some(kept), None) | (Some(b), None, Some(kept)) => {
                // Dropped on one side: the drop wins only if the other side
                // left the table alone.
                if kept.schema() == b.schema() && kept.rows() == b.rows() {
                    log::debug!("table '{}' dropped by merge", b.schema().table_name);
                } else {
                    conflicts.push(SchemaConflict::new(
                        b.schema().table_name.clone(),
                        "table deleted on one side and modified on the other",
                    ));
                }
            }
            (Some(_), None, None) => {}
            (None, Some(o), Some(t)) => {
                if schemas_structurally_equal(o.schema(), t.schema()) {
                    merged_schemas.insert(key.clone(), o.schema().clone());
                } else {
                    conflicts.push(SchemaConflict::new(
                        o.schema().table_name.clone(),
                        "table added on both branches with different definitions",
                    ));
                }
            }
            (None, Some(side), None) | (None, None, Some(side)) => {
                merged_schemas.insert(key.clone(), side.schema().clone());
            }
            (None, None, None) => {}
        }
    }

    // Tables created independently on both branches carry different
    // identities but may share a name. Structurally equal twins collapse to
    // one table; the alias map routes the other branch's rows into the row
    // merge below.
    let mut aliases: BTreeMap<TableKey, Vec<TableKey>> = BTreeMap::new();
    {
        let mut by_name: BTreeMap<TableName, Vec<TableKey>> = BTreeMap::new();
        for (key, schema) in &merged_schemas {
            by_name
                .entry(schema.table_name.clone())
                .or_default()
                .push(key.clone());
        }
        for (name, claimants) in by_name {
            if claimants.len() < 2 {
                continue;
            }
            let first = &merged_schemas[&claimants[0]];
            let all_equal = claimants[1..]
                .iter()
                .all(|k| schemas_structurally_equal(first, &merged_schemas[k]));
            if all_equal {
                for extra in &claimants[1..] {
                    merged_schemas.remove(extra);
                }
                aliases.insert(claimants[0].clone(), claimants[1..].to_vec());
            } else {
                conflicts.push(SchemaConflict::new(
                    name,
                    "table added on both branches with different definitions",
                ));
            }
        }
    }

    // Phase 2: rewrite canonical FK parent references to merged names and
    // verify parents survive with support.
    let parent_view = merged_schemas.clone();
    let merged_names: BTreeSet<TableName> = parent_view
        .values()
        .map(|s| s.table_name.clone())
        .collect();
    for schema in merged_schemas.values_mut() {
        for fk in &mut schema.foreign_keys {
            let canonical_table = fk.referenced_table.clone();
            let canonical_cols = fk.referenced_columns.clone();
            if let Some(base_parent) = base.table(&canonical_table) {
                let pkey = key_of(base_parent.schema());
                let Some(merged_parent) = parent_view.get(&pkey) else {
                    conflicts.push(SchemaConflict::new(
                        schema.table_name.clone(),
                        format!(
                            "foreign key constraint `{}` references a table that will be deleted after merge",
                            fk.name
                        ),
                    ));
                    continue;
                };
                fk.referenced_table = merged_parent.table_name.clone();
                let mut dangling = false;
                for col in &mut fk.referenced_columns {
                    match base_parent
                        .schema()
                        .column(col)
                        .and_then(|c| merged_parent.column_by_tag(c.tag))
                    {
                        Some(merged_col) => *col = merged_col.column_name.clone(),
                        None => dangling = true,
                    }
                }
                if dangling {
                    conflicts.push(SchemaConflict::new(
                        schema.table_name.clone(),
                        format!(
                            "foreign key constraint `{}` references a column that will be deleted after merge",
                            fk.name
                        ),
                    ));
                    continue;
                }
                if merged_parent.supporting_index(&fk.referenced_columns).is_none() {
                    let description = match base_parent.schema().supporting_index(&canonical_cols)
                    {
                        Some(idx) if idx != PRIMARY_INDEX_NAME => format!(
                            "unable to drop index `{}`: it is required by foreign key constraint `{}`",
                            idx, fk.name
                        ),
                        _ => format!(
                            "foreign key constraint `{}` has no supporting index on referenced table '{}'",
                            fk.name, merged_parent.table_name
                        ),
                    };
                    conflicts.push(SchemaConflict::new(schema.table_name.clone(), description));
                }
            } else if !merged_names.contains(&canonical_table) {
                conflicts.push(SchemaConflict::new(
                    schema.table_name.clone(),
                    format!(
                        "foreign key constraint `{}` references unknown table '{}'",
                        fk.name, canonical_table
                    ),
                ));
            }
        }
    }

    if !conflicts.is_empty() {
        return Err(MergeError::SchemaConflicts(conflicts));
    }

    // Phase 3: row merge per table, parents first.
    let key_by_name: BTreeMap<TableName, TableKey> = merged_schemas
        .iter()
        .map(|(key, schema)| (schema.table_name.clone(), key.clone()))
        .collect();
    let order = merge_order(merged_schemas.values());

    let mut root = RootValue::new();
    let mut ledger = ConflictLedger::new();
    let lookup = |idx: &BTreeMap<TableKey, Arc<TableSnapshot>>,
                  key: &TableKey|
     -> Option<Arc<TableSnapshot>> {
        idx.get(key).cloned().or_else(|| {
            aliases
                .get(key)
                .and_then(|alts| alts.iter().find_map(|k| idx.get(k).cloned()))
        })
    };
    for name in order {
        let key = &key_by_name[&name];
        let merged_schema = &merged_schemas[key];
        let base_snap = lookup(&base_idx, key);
        let base_schema = base_snap.as_ref().map(|s| s.schema().clone());

        let empty = TableSnapshot::empty(merged_schema.clone());
        let adapt = |side: Option<Arc<TableSnapshot>>| -> Result<TableSnapshot, VersioningError> {
            match side {
                Some(snap) => adapt_snapshot(&snap, merged_schema, base_schema.as_ref()),
                None => Ok(empty.clone()),
            }
        };
        let b = adapt(base_snap.clone())?;
        let o = adapt(lookup(&ours_idx, key))?;
        let t = adapt(lookup(&theirs_idx, key))?;

        let outcome = merge_rows(&name, &b, &o, &t);
        ledger.record_conflicts(outcome.conflicts);
        root = root.with_table(name, Arc::new(outcome.snapshot));
    }

    // Phase 4: FK verification over touched tables and their children.
    let table_set: TableSet = root
        .tables()
        .iter()
        .map(|(name, snap)| (name.clone(), (**snap).clone()))
        .collect();
    let mut touched: BTreeSet<TableName> = BTreeSet::new();
    for (name, snap) in root.tables() {
        match ours.table(name) {
            Some(old) if old.schema() == snap.schema() && old.rows() == snap.rows() => {}
            _ => {
                touched.insert(name.clone());
            }
        }
    }
    let mut affected = touched.clone();
    for (name, snap) in &table_set {
        if snap
            .schema()
            .foreign_keys
            .iter()
            .any(|fk| touched.contains(&fk.referenced_table))
        {
            affected.insert(name.clone());
        }
    }
    let violations = verify_foreign_keys(&table_set)
        .into_iter()
        .filter(|v| affected.contains(&v.table));
    ledger.record_violations(violations);

    log::info!(
        "merged {} table(s): {} conflict(s), {} violation(s)",
        root.tables().len(),
        ledger.conflict_count(),
        ledger.violations().len()
    );
    Ok(MergeResult { root, ledger })
}
