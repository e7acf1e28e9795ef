//! The conflict ledger: recorded defects a merge chose to carry.
//!
//! Backs the queryable relations: `conflicts` (per-table summary),
//! `conflicts_<table>` (typed base/our/their detail rows), and
//! `constraint_violations`. Resolution removes entries; a drained ledger is
//! what lets a merging working set return to a clean state.

use melddb_commons::{
    ColumnDefinition, CommonError, ConflictEntry, ConstraintViolation, Row, RowKey, TableName,
    TableSchema, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConflictLedger {
    conflicts: BTreeMap<TableName, Vec<ConflictEntry>>,
    violations: Vec<ConstraintViolation>,
}

impl ConflictLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_conflict(&mut self, entry: ConflictEntry) {
        self.conflicts.entry(entry.table.clone()).or_default().push(entry);
    }

    pub fn record_conflicts(&mut self, entries: impl IntoIterator<Item = ConflictEntry>) {
        for entry in entries {
            self.record_conflict(entry);
        }
    }

    pub fn record_violations(&mut self, violations: impl IntoIterator<Item = ConstraintViolation>) {
        self.violations.extend(violations);
    }

    pub fn has_conflicts(&self) -> bool {
        self.conflicts.values().any(|v| !v.is_empty())
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_conflicts() && !self.has_violations()
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.values().map(Vec::len).sum()
    }

    /// Rows of the `conflicts` relation: (table, number of conflicts).
    /// Tables with zero remaining conflicts are omitted.
    pub fn summary(&self) -> Vec<(TableName, usize)> {
        self.conflicts
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(table, entries)| (table.clone(), entries.len()))
            .collect()
    }

    pub fn conflicts_for(&self, table: &TableName) -> &[ConflictEntry] {
        self.conflicts.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn violations(&self) -> &[ConstraintViolation] {
        &self.violations
    }

    /// Rows of the `constraint_violations` summary: (table, count).
    pub fn violations_summary(&self) -> Vec<(TableName, usize)> {
        let mut counts: BTreeMap<TableName, usize> = BTreeMap::new();
        for v in &self.violations {
            *counts.entry(v.table.clone()).or_default() += 1;
        }
        counts.into_iter().collect()
    }

    /// Remove and return the conflict recorded for a key. Resolving a
    /// conflict means writing the final row to the real table and then
    /// deleting the ledger entry through here.
    pub fn resolve(&mut self, table: &TableName, key: &RowKey) -> Option<ConflictEntry> {
        let entries = self.conflicts.get_mut(table)?;
        let position = entries.iter().position(|e| &e.key == key)?;
        let entry = entries.remove(position);
        if entries.is_empty() {
            self.conflicts.remove(table);
        }
        Some(entry)
    }

    /// Drop every conflict recorded for a table.
    pub fn resolve_table(&mut self, table: &TableName) -> Vec<ConflictEntry> {
        self.conflicts.remove(table).unwrap_or_default()
    }

    /// Remove and return one recorded violation. The caller repairs the
    /// offending data first; this only destroys the ledger row.
    pub fn resolve_violation(
        &mut self,
        table: &TableName,
        key: &RowKey,
        constraint: &str,
    ) -> Option<ConstraintViolation> {
        let position = self
            .violations
            .iter()
            .position(|v| &v.table == table && &v.key == key && v.constraint_name == constraint)?;
        Some(self.violations.remove(position))
    }

    pub fn clear(&mut self) {
        self.conflicts.clear();
        self.violations.clear();
    }

    /// Schema of the `conflicts_<table>` detail relation: for every column
    /// of the merged table, typed nullable `base_*`, `our_*`, `their_*`
    /// columns.
    pub fn view_schema(table_schema: &TableSchema) -> Result<TableSchema, CommonError> {
        let mut columns = Vec::with_capacity(table_schema.columns.len() * 3);
        let mut ordinal = 0u32;
        for col in &table_schema.columns {
            for prefix in ["base_", "our_", "their_"] {
                ordinal += 1;
                columns.push(ColumnDefinition::simple(
                    format!("{}{}", prefix, col.column_name),
                    ordinal,
                    col.data_type,
                ));
            }
        }
        let name = TableName::new(format!("conflicts_{}", table_schema.table_name));
        TableSchema::new(name, columns)
    }

    /// Rows of the `conflicts_<table>` detail relation, in key order.
    /// Absent sides (a deletion) read as all-NULL.
    pub fn detail_rows(&self, table: &TableName, table_schema: &TableSchema) -> Vec<Row> {
        let mut rows = Vec::new();
        for entry in self.conflicts_for(table) {
            let mut row = Row::default();
            for col in &table_schema.columns {
                for (prefix, side) in [
                    ("base_", &entry.base),
                    ("our_", &entry.ours),
                    ("their_", &entry.theirs),
                ] {
                    let value = side
                        .as_ref()
                        .map(|r| r.get(&col.column_name).clone())
                        .unwrap_or(Value::Null);
                    row.set(format!("{}{}", prefix, col.column_name), value);
                }
            }
            rows.push(row);
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use melddb_commons::{DataType, ViolationKind};

    fn schema() -> TableSchema {
        TableSchema::new(
            TableName::new("t"),
            vec![
                ColumnDefinition::primary_key("id", 1, DataType::BigInt),
                ColumnDefinition::simple("v", 2, DataType::Text),
            ],
        )
        .unwrap()
    }

    fn entry(id: i64, ours: Option<&str>, theirs: Option<&str>) -> ConflictEntry {
        let make = |v: &str| {
            Row::from_pairs([("id", Value::BigInt(id)), ("v", Value::from(v))])
        };
        ConflictEntry::new(
            TableName::new("t"),
            RowKey::primary(vec![Value::BigInt(id)]),
            Some(make("base")),
            ours.map(make),
            theirs.map(make),
        )
    }

    #[test]
    fn test_summary_and_resolution() {
        let mut ledger = ConflictLedger::new();
        ledger.record_conflict(entry(1, Some("a"), Some("b")));
        ledger.record_conflict(entry(2, None, Some("b")));

        assert_eq!(ledger.summary(), vec![(TableName::new("t"), 2)]);
        assert_eq!(ledger.conflict_count(), 2);

        let resolved = ledger
            .resolve(&TableName::new("t"), &RowKey::primary(vec![Value::BigInt(1)]))
            .unwrap();
        assert_eq!(resolved.key, RowKey::primary(vec![Value::BigInt(1)]));
        assert_eq!(ledger.conflict_count(), 1);

        ledger
            .resolve(&TableName::new("t"), &RowKey::primary(vec![Value::BigInt(2)]))
            .unwrap();
        assert!(ledger.is_empty());
        assert!(ledger.summary().is_empty());
    }

    #[test]
    fn test_detail_rows_have_typed_sides() {
        let mut ledger = ConflictLedger::new();
        ledger.record_conflict(entry(1, Some("ours"), None));

        let view = ConflictLedger::view_schema(&schema()).unwrap();
        assert_eq!(view.table_name.as_str(), "conflicts_t");
        assert_eq!(view.columns.len(), 6);
        assert_eq!(view.column("our_v").unwrap().data_type, DataType::Text);
        assert!(view.is_keyless());

        let rows = ledger.detail_rows(&TableName::new("t"), &schema());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("base_v"), &Value::from("base"));
        assert_eq!(rows[0].get("our_v"), &Value::from("ours"));
        // Deleted on their side: all their_* columns are NULL.
        assert_eq!(rows[0].get("their_v"), &Value::Null);
        assert_eq!(rows[0].get("their_id"), &Value::Null);
    }

    #[test]
    fn test_violations_summary() {
        let mut ledger = ConflictLedger::new();
        ledger.record_violations(vec![
            ConstraintViolation::new(
                TableName::new("a"),
                RowKey::primary(vec![Value::BigInt(1)]),
                "fk1",
                ViolationKind::ForeignKey,
                "dangling",
            ),
            ConstraintViolation::new(
                TableName::new("a"),
                RowKey::primary(vec![Value::BigInt(2)]),
                "fk1",
                ViolationKind::ForeignKey,
                "dangling",
            ),
        ]);
        assert_eq!(ledger.violations_summary(), vec![(TableName::new("a"), 2)]);
        assert!(ledger.has_violations());
        ledger.clear();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_resolve_violation_individually() {
        let mut ledger = ConflictLedger::new();
        ledger.record_violations(vec![ConstraintViolation::new(
            TableName::new("a"),
            RowKey::primary(vec![Value::BigInt(1)]),
            "fk1",
            ViolationKind::ForeignKey,
            "dangling",
        )]);

        // Wrong constraint name leaves the entry in place.
        assert!(ledger
            .resolve_violation(
                &TableName::new("a"),
                &RowKey::primary(vec![Value::BigInt(1)]),
                "fk2",
            )
            .is_none());
        assert!(ledger.has_violations());

        let resolved = ledger
            .resolve_violation(
                &TableName::new("a"),
                &RowKey::primary(vec![Value::BigInt(1)]),
                "fk1",
            )
            .unwrap();
        assert_eq!(resolved.constraint_name, "fk1");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_ledger_serializes_to_json() {
        let mut ledger = ConflictLedger::new();
        ledger.record_conflict(entry(1, Some("a"), Some("b")));
        let json = serde_json::to_string(&ledger).unwrap();
        assert!(json.contains("conflicts"));
    }
}
