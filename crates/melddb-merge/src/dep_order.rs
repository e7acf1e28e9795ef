//! Foreign key dependency ordering.
//!
//! Merge processes tables parents-first so referenced tables reach their
//! merged state before the children that point at them. Kahn's algorithm
//! over the FK edges; ties and cycles fall back to name order, and the
//! post-merge verification pass covers whatever a cycle ordering could not.

use melddb_commons::{TableName, TableSchema};
use std::collections::{BTreeMap, BTreeSet};

/// Order table names so every table appears after the tables it references.
/// Self-references are ignored; tables in an FK cycle come out in name
/// order relative to each other.
pub fn merge_order<'a, I>(schemas: I) -> Vec<TableName>
where
    I: IntoIterator<Item = &'a TableSchema>,
{
    let schemas: Vec<&TableSchema> = schemas.into_iter().collect();
    let names: BTreeSet<TableName> = schemas.iter().map(|s| s.table_name.clone()).collect();

    // child → set of parents it references (within the known set).
    let mut parents_of: BTreeMap<TableName, BTreeSet<TableName>> = BTreeMap::new();
    let mut children_of: BTreeMap<TableName, BTreeSet<TableName>> = BTreeMap::new();
    for schema in &schemas {
        let child = &schema.table_name;
        parents_of.entry(child.clone()).or_default();
        for fk in &schema.foreign_keys {
            let parent = &fk.referenced_table;
            if parent == child || !names.contains(parent) {
                continue;
            }
            parents_of
                .entry(child.clone())
                .or_default()
                .insert(parent.clone());
            children_of
                .entry(parent.clone())
                .or_default()
                .insert(child.clone());
        }
    }

    let mut ready: BTreeSet<TableName> = parents_of
        .iter()
        .filter(|(_, parents)| parents.is_empty())
        .map(|(name, _)| name.clone())
        .collect();
    let mut order = Vec::with_capacity(names.len());

    while order.len() < names.len() {
        let next = match ready.iter().next().cloned() {
            Some(name) => name,
            // Remaining tables form one or more cycles: take the
            // name-smallest unordered table and keep going.
            None => match parents_of
                .keys()
                .find(|name| !order.contains(*name))
                .cloned()
            {
                Some(name) => name,
                None => break,
            },
        };
        ready.remove(&next);
        order.push(next.clone());

        if let Some(children) = children_of.get(&next) {
            for child in children.clone() {
                if order.contains(&child) {
                    continue;
                }
                let parents = parents_of.entry(child.clone()).or_default();
                parents.remove(&next);
                if parents.is_empty() {
                    ready.insert(child);
                }
            }
        }
    }
    order
}
