//! Schema differ.
//!
//! Compares a live table against its desired shape and yields the ordered
//! operations that reconcile them: every `AddColumn`, then every
//! `AlterColumn`, then every `DropColumn`.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::operations::Operation;
use crate::schema::TableSchema;

/// Computes the operations that turn `current` into `desired`.
///
/// A missing `current` table is treated as empty, so every desired field is
/// added. Adds and alters follow the desired declaration order; drops are
/// sorted by column name.
#[must_use]
pub fn diff_table(current: Option<&TableSchema>, desired: &TableSchema) -> Vec<Operation> {
    let table = if desired.name.is_empty() {
        current.map(|c| c.name.as_str()).unwrap_or_default()
    } else {
        desired.name.as_str()
    };
    if table.is_empty() {
        warn!("Cannot diff a table without a name, skipping");
        return Vec::new();
    }
    if desired.is_empty() {
        warn!(table = %table, "Desired schema has no fields, skipping");
        return Vec::new();
    }

    let mut added = Vec::new();
    let mut altered = Vec::new();
    for field in &desired.fields {
        match current.and_then(|c| c.get_field(&field.name)) {
            None => added.push(Operation::add_column(table, field.clone())),
            Some(existing) if !field.is_equivalent(existing) => {
                altered.push(Operation::alter_column(table, field.clone(), existing.clone()));
            }
            Some(_) => {}
        }
    }

    let mut dropped: Vec<_> = current
        .map(|c| {
            c.fields
                .iter()
                .filter(|f| desired.get_field(&f.name).is_none())
                .collect()
        })
        .unwrap_or_default();
    dropped.sort_by(|a, b| a.name.cmp(&b.name));

    debug!(
        table = %table,
        added = added.len(),
        altered = altered.len(),
        dropped = dropped.len(),
        "Diffed table"
    );

    added
        .into_iter()
        .chain(altered)
        .chain(
            dropped
                .into_iter()
                .map(|f| Operation::drop_column(table, f.clone())),
        )
        .collect()
}

/// Diffs every desired table against the live schema, in the order given.
#[must_use]
pub fn diff_schemas(
    current: &BTreeMap<String, TableSchema>,
    desired: &[TableSchema],
) -> Vec<Operation> {
    desired
        .iter()
        .flat_map(|table| diff_table(current.get(&table.name), table))
        .collect()
}
