//! Three-way table schema merge.
//!
//! Columns are matched across branches by tag, which is what distinguishes
//! a rename from a drop-and-add; indexes, checks, and foreign keys are
//! matched by name, with column references normalized through the rename
//! map before comparison so a pure rename never reads as a modification.
//!
//! The merge never stops at the first problem: every conflict found is
//! collected and the whole list is returned. No partial schema escapes.

use melddb_commons::{
    CheckConstraint, ColumnDefinition, ForeignKeyConstraint, IndexDefinition, TableName,
    TableSchema,
};
use std::collections::{BTreeMap, BTreeSet};

/// One structural divergence found while merging a table's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaConflict {
    pub table: TableName,
    pub description: String,
}

impl SchemaConflict {
    pub fn new(table: TableName, description: impl Into<String>) -> Self {
        Self {
            table,
            description: description.into(),
        }
    }
}

/// Merge one table's schema three ways. Returns the merged schema, or every
/// conflict that prevents merging.
pub fn merge_table_schemas(
    base: &TableSchema,
    ours: &TableSchema,
    theirs: &TableSchema,
) -> Result<TableSchema, Vec<SchemaConflict>> {
    let mut conflicts: Vec<String> = Vec::new();

    let merged_name = if ours.table_name == base.table_name {
        theirs.table_name.clone()
    } else if theirs.table_name == base.table_name || ours.table_name == theirs.table_name {
        ours.table_name.clone()
    } else {
        conflicts.push(format!(
            "table renamed to '{}' and '{}' on different branches",
            ours.table_name, theirs.table_name
        ));
        base.table_name.clone()
    };

    let base_by_tag: BTreeMap<u64, &ColumnDefinition> =
        base.columns.iter().map(|c| (c.tag, c)).collect();
    let ours_by_tag: BTreeMap<u64, &ColumnDefinition> =
        ours.columns.iter().map(|c| (c.tag, c)).collect();
    let theirs_by_tag: BTreeMap<u64, &ColumnDefinition> =
        theirs.columns.iter().map(|c| (c.tag, c)).collect();

    let mut merged_columns: Vec<ColumnDefinition> = Vec::new();

    // Columns present in base, matched by tag.
    for bc in &base.columns {
        match (ours_by_tag.get(&bc.tag), theirs_by_tag.get(&bc.tag)) {
            (None, None) => {}
            (None, Some(tc)) => {
                if tc.column_name != bc.column_name || !tc.equal_defs(bc) {
                    conflicts.push(format!(
                        "column '{}' deleted on one side and modified on the other",
                        bc.column_name
                    ));
                }
            }
            (Some(oc), None) => {
                if oc.column_name != bc.column_name || !oc.equal_defs(bc) {
                    conflicts.push(format!(
                        "column '{}' deleted on one side and modified on the other",
                        bc.column_name
                    ));
                }
            }
            (Some(oc), Some(tc)) => {
                let name = if oc.column_name == bc.column_name {
                    tc.column_name.clone()
                } else if tc.column_name == bc.column_name || oc.column_name == tc.column_name {
                    oc.column_name.clone()
                } else {
                    conflicts.push(format!(
                        "column '{}' renamed to '{}' and '{}' on different branches",
                        bc.column_name, oc.column_name, tc.column_name
                    ));
                    continue;
                };
                let chosen = if oc.equal_defs(bc) {
                    (*tc).clone()
                } else if tc.equal_defs(bc) || oc.equal_defs(tc) {
                    (*oc).clone()
                } else {
                    conflicts.push(format!(
                        "divergent changes to column '{}'",
                        bc.column_name
                    ));
                    continue;
                };
                let mut col = chosen;
                col.column_name = name;
                col.tag = bc.tag;
                merged_columns.push(col);
            }
        }
    }

    // Columns added since base, matched across sides by name.
    let ours_added: Vec<&ColumnDefinition> = ours
        .columns
        .iter()
        .filter(|c| !base_by_tag.contains_key(&c.tag))
        .collect();
    let theirs_added: Vec<&ColumnDefinition> = theirs
        .columns
        .iter()
        .filter(|c| !base_by_tag.contains_key(&c.tag))
        .collect();
    let theirs_added_names: BTreeMap<&str, &ColumnDefinition> = theirs_added
        .iter()
        .map(|c| (c.column_name.as_str(), *c))
        .collect();
    let ours_added_names: BTreeSet<&str> =
        ours_added.iter().map(|c| c.column_name.as_str()).collect();

    for oc in &ours_added {
        match theirs_added_names.get(oc.column_name.as_str()) {
            Some(tc) => {
                if oc.equal_defs(tc) {
                    merged_columns.push((*oc).clone());
                } else {
                    conflicts.push(format!(
                        "column '{}' added on both sides with different definitions",
                        oc.column_name
                    ));
                }
            }
            None => merged_columns.push((*oc).clone()),
        }
    }
    for tc in &theirs_added {
        if !ours_added_names.contains(tc.column_name.as_str()) {
            merged_columns.push((*tc).clone());
        }
    }

    // Name and tag uniqueness of the merged column set. Tags from columns
    // added independently on both branches can collide; the colliding copy
    // gets a fresh tag on reconstruction.
    let mut seen_names: BTreeSet<&str> = BTreeSet::new();
    for col in &merged_columns {
        if !seen_names.insert(col.column_name.as_str()) {
            conflicts.push(format!(
                "duplicate column name '{}' after merge",
                col.column_name
            ));
        }
    }
    let mut seen_tags: BTreeSet<u64> = BTreeSet::new();
    for col in &mut merged_columns {
        if !seen_tags.insert(col.tag) {
            col.tag = 0;
        }
        col.ordinal_position = 0;
    }
    for (idx, col) in merged_columns.iter_mut().enumerate() {
        col.ordinal_position = (idx + 1) as u32;
    }

    let merged_names: BTreeSet<String> = merged_columns
        .iter()
        .map(|c| c.column_name.clone())
        .collect();
    let merged_name_by_tag: BTreeMap<u64, String> = merged_columns
        .iter()
        .map(|c| (c.tag, c.column_name.clone()))
        .collect();

    // Rewrite a side-local column list into merged column names, so entity
    // comparison is immune to renames. Columns whose tag did not survive
    // keep their base-side name, which stays out of `merged_names` and is
    // caught by the dropped-column scans below.
    let remap = |names: &[String], side: &TableSchema| -> Vec<String> {
        names
            .iter()
            .map(|name| match side.column(name) {
                Some(col) if base_by_tag.contains_key(&col.tag) => merged_name_by_tag
                    .get(&col.tag)
                    .cloned()
                    .unwrap_or_else(|| base_by_tag[&col.tag].column_name.clone()),
                _ => name.clone(),
            })
            .collect()
    };

    let normalize_indexes = |schema: &TableSchema| -> BTreeMap<String, IndexDefinition> {
        schema
            .indexes
            .iter()
            .map(|idx| {
                let mut idx = idx.clone();
                idx.columns = remap(&idx.columns, schema);
                (idx.name.clone(), idx)
            })
            .collect()
    };
    let normalize_checks = |schema: &TableSchema| -> BTreeMap<String, CheckConstraint> {
        schema
            .checks
            .iter()
            .map(|check| {
                let mut check = check.clone();
                check.columns = remap(&check.columns, schema);
                (check.name.clone(), check)
            })
            .collect()
    };
    let normalize_fks = |schema: &TableSchema| -> BTreeMap<String, ForeignKeyConstraint> {
        schema
            .foreign_keys
            .iter()
            .map(|fk| {
                let mut fk = fk.clone();
                fk.columns = remap(&fk.columns, schema);
                fk.table = merged_name.clone();
                (fk.name.clone(), fk)
            })
            .collect()
    };

    // Indexes, by name.
    let base_indexes = normalize_indexes(base);
    let our_indexes = normalize_indexes(ours);
    let their_indexes = normalize_indexes(theirs);
    let mut merged_indexes: Vec<IndexDefinition> = Vec::new();

    for (name, bi) in &base_indexes {
        match (our_indexes.get(name), their_indexes.get(name)) {
            (None, None) => {}
            (None, Some(side)) | (Some(side), None) => {
                if !side.equal_defs(bi) {
                    conflicts.push(format!(
                        "index `{}` deleted on one side and modified on the other",
                        name
                    ));
                }
            }
            (Some(oi), Some(ti)) => {
                if oi.equal_defs(bi) {
                    merged_indexes.push(ti.clone());
                } else if ti.equal_defs(bi) || oi.equal_defs(ti) {
                    merged_indexes.push(oi.clone());
                } else {
                    conflicts.push(format!("divergent changes to index `{}`", name));
                }
            }
        }
    }
    for (name, oi) in &our_indexes {
        if base_indexes.contains_key(name) {
            continue;
        }
        match their_indexes.get(name) {
            Some(ti) => {
                if oi.equal_defs(ti) {
                    merged_indexes.push(oi.clone());
                } else {
                    conflicts.push(format!(
                        "two indexes with the name `{}` but different definitions",
                        name
                    ));
                }
            }
            None => merged_indexes.push(oi.clone()),
        }
    }
    for (name, ti) in &their_indexes {
        if !base_indexes.contains_key(name) && !our_indexes.contains_key(name) {
            merged_indexes.push(ti.clone());
        }
    }
    for idx in &merged_indexes {
        if idx.columns.iter().any(|c| !merged_names.contains(c)) {
            conflicts.push(format!(
                "index `{}` references a column that will be deleted after merge",
                idx.name
            ));
        }
    }

    // Check constraints, by name.
    let base_checks = normalize_checks(base);
    let our_checks = normalize_checks(ours);
    let their_checks = normalize_checks(theirs);
    let mut merged_checks: Vec<CheckConstraint> = Vec::new();

    for (name, bc) in &base_checks {
        match (our_checks.get(name), their_checks.get(name)) {
            (None, None) => {}
            (None, Some(side)) | (Some(side), None) => {
                if !side.equal_defs(bc) {
                    conflicts.push(format!(
                        "check constraint '{}' deleted on one side and modified on the other",
                        name
                    ));
                }
            }
            (Some(oc), Some(tc)) => {
                if oc.equal_defs(bc) {
                    merged_checks.push(tc.clone());
                } else if tc.equal_defs(bc) || oc.equal_defs(tc) {
                    merged_checks.push(oc.clone());
                } else {
                    conflicts.push(format!(
                        "two checks with the name '{}' but different definitions",
                        name
                    ));
                }
            }
        }
    }
    for (name, oc) in &our_checks {
        if base_checks.contains_key(name) {
            continue;
        }
        match their_checks.get(name) {
            Some(tc) => {
                if oc.equal_defs(tc) {
                    merged_checks.push(oc.clone());
                } else {
                    conflicts.push(format!(
                        "two checks with the name '{}' but different definitions",
                        name
                    ));
                }
            }
            None => merged_checks.push(oc.clone()),
        }
    }
    for (name, tc) in &their_checks {
        if !base_checks.contains_key(name) && !our_checks.contains_key(name) {
            merged_checks.push(tc.clone());
        }
    }
    for check in &merged_checks {
        if check.columns.iter().any(|c| !merged_names.contains(c)) {
            conflicts.push(format!(
                "check constraint '{}' references a column that will be deleted after merge",
                check.name
            ));
        }
    }

    // Foreign keys, by name, then deduplicated by structural identity for
    // the same constraint added under two names.
    let base_fks = normalize_fks(base);
    let our_fks = normalize_fks(ours);
    let their_fks = normalize_fks(theirs);
    let mut merged_fks: Vec<ForeignKeyConstraint> = Vec::new();

    for (name, bf) in &base_fks {
        match (our_fks.get(name), their_fks.get(name)) {
            (None, None) => {}
            (None, Some(side)) | (Some(side), None) => {
                if !side.equal_defs(bf) {
                    conflicts.push(format!(
                        "foreign key constraint `{}` deleted on one side and modified on the other",
                        name
                    ));
                }
            }
            (Some(of), Some(tf)) => {
                if of.equal_defs(bf) {
                    merged_fks.push(tf.clone());
                } else if tf.equal_defs(bf) || of.equal_defs(tf) {
                    merged_fks.push(of.clone());
                } else {
                    conflicts.push(format!(
                        "divergent changes to foreign key constraint `{}`",
                        name
                    ));
                }
            }
        }
    }
    for (name, of) in &our_fks {
        if base_fks.contains_key(name) {
            continue;
        }
        match their_fks.get(name) {
            Some(tf) => {
                if of.equal_defs(tf) {
                    merged_fks.push(of.clone());
                } else {
                    conflicts.push(format!(
                        "two foreign key constraints with the name `{}` but different definitions",
                        name
                    ));
                }
            }
            None => merged_fks.push(of.clone()),
        }
    }
    for (name, tf) in &their_fks {
        if base_fks.contains_key(name) || our_fks.contains_key(name) {
            continue;
        }
        // Same constraint added under two names merges once.
        let duplicate = merged_fks.iter().any(|f| {
            f.same_structure(tf) && f.on_delete == tf.on_delete && f.on_update == tf.on_update
        });
        if !duplicate {
            merged_fks.push(tf.clone());
        }
    }
    for fk in &merged_fks {
        if fk.columns.iter().any(|c| !merged_names.contains(c)) {
            conflicts.push(format!(
                "foreign key constraint `{}` references a column that will be deleted after merge",
                fk.name
            ));
        }
    }

    if !conflicts.is_empty() {
        return Err(into_conflicts(base, conflicts));
    }

    let mut schema = match TableSchema::new(merged_name, merged_columns) {
        Ok(schema) => schema.with_table_id(base.table_id),
        Err(err) => return Err(into_conflicts(base, vec![err.to_string()])),
    };
    schema.indexes = merged_indexes;
    schema.checks = merged_checks;
    schema.foreign_keys = merged_fks;

    // A live FK must keep a supporting index through the merge. A drop that
    // would be a hard error as direct DDL surfaces here as a conflict.
    for fk in &schema.foreign_keys {
        if schema.supporting_index(&fk.columns).is_none() {
            let dropped = base_indexes
                .values()
                .find(|i| i.supports_prefix(&fk.columns));
            let description = match dropped {
                Some(idx) => format!(
                    "unable to drop index `{}`: it is required by foreign key constraint `{}`",
                    idx.name, fk.name
                ),
                None => format!(
                    "foreign key constraint `{}` has no supporting index after merge",
                    fk.name
                ),
            };
            conflicts.push(description);
        }
    }
    if !conflicts.is_empty() {
        return Err(into_conflicts(base, conflicts));
    }

    Ok(schema)
}

fn into_conflicts(base: &TableSchema, descriptions: Vec<String>) -> Vec<SchemaConflict> {
    descriptions
        .into_iter()
        .map(|d| SchemaConflict::new(base.table_name.clone(), d))
        .collect()
}
