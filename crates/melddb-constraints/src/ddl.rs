//! DDL-time validation of foreign key declarations.

use crate::error::ConstraintError;
use melddb_commons::{CommonError, ForeignKeyConstraint, ReferentialAction, TableSchema};

/// Validate a foreign key declaration against the child and parent schemas.
/// All failures here are hard errors: they never enter a ledger.
pub fn validate_foreign_key(
    fk: &ForeignKeyConstraint,
    child: &TableSchema,
    parent: &TableSchema,
) -> Result<(), ConstraintError> {
    if fk.name.is_empty() {
        return Err(CommonError::invalid_input("foreign key constraint must be named").into());
    }
    if fk.columns.is_empty() {
        return Err(CommonError::invalid_input(format!(
            "foreign key constraint `{}` has no columns",
            fk.name
        ))
        .into());
    }
    if fk.columns.len() != fk.referenced_columns.len() {
        return Err(CommonError::invalid_input(format!(
            "foreign key constraint `{}` has {} child column(s) but {} referenced column(s)",
            fk.name,
            fk.columns.len(),
            fk.referenced_columns.len()
        ))
        .into());
    }

    for (child_col, parent_col) in fk.columns.iter().zip(&fk.referenced_columns) {
        let child_def = child.column(child_col).ok_or_else(|| {
            CommonError::not_found(format!(
                "column '{}' in table '{}' for foreign key `{}`",
                child_col, child.table_name, fk.name
            ))
        })?;
        let parent_def = parent.column(parent_col).ok_or_else(|| {
            CommonError::not_found(format!(
                "column '{}' in referenced table '{}' for foreign key `{}`",
                parent_col, parent.table_name, fk.name
            ))
        })?;

        if child_def.data_type.is_text_or_blob() || parent_def.data_type.is_text_or_blob() {
            return Err(CommonError::invalid_input(format!(
                "foreign key `{}`: TEXT and BLOB columns cannot participate in foreign keys",
                fk.name
            ))
            .into());
        }
        if child_def.data_type != parent_def.data_type {
            return Err(CommonError::invalid_input(format!(
                "foreign key `{}`: type mismatch between '{}' ({}) and '{}' ({})",
                fk.name, child_col, child_def.data_type, parent_col, parent_def.data_type
            ))
            .into());
        }
        if fk.uses_set_null() && !child_def.is_nullable {
            return Err(CommonError::invalid_input(format!(
                "foreign key `{}`: SET NULL is not valid on NOT NULL column '{}'",
                fk.name, child_col
            ))
            .into());
        }
    }

    // Referential actions are already constrained by the enum; restrict has
    // no extra requirements beyond the above.
    debug_assert!(matches!(
        fk.on_delete,
        ReferentialAction::Restrict | ReferentialAction::Cascade | ReferentialAction::SetNull
    ));

    if child.supporting_index(&fk.columns).is_none() {
        return Err(CommonError::invalid_input(format!(
            "foreign key `{}`: no supporting index on table '{}' for columns {:?}",
            fk.name, child.table_name, fk.columns
        ))
        .into());
    }
    if parent.supporting_index(&fk.referenced_columns).is_none() {
        return Err(CommonError::invalid_input(format!(
            "foreign key `{}`: no supporting index on referenced table '{}' for columns {:?}",
            fk.name, parent.table_name, fk.referenced_columns
        ))
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use melddb_commons::{ColumnDefinition, DataType, IndexDefinition, TableName};

    fn parent_schema() -> TableSchema {
        TableSchema::new(
            TableName::new("parent"),
            vec![
                ColumnDefinition::primary_key("id", 1, DataType::BigInt),
                ColumnDefinition::simple("note", 2, DataType::Text),
            ],
        )
        .unwrap()
    }

    fn child_schema() -> TableSchema {
        let mut schema = TableSchema::new(
            TableName::new("child"),
            vec![
                ColumnDefinition::primary_key("id", 1, DataType::BigInt),
                ColumnDefinition::simple("parent_id", 2, DataType::BigInt),
                ColumnDefinition::simple("note", 3, DataType::Text),
            ],
        )
        .unwrap();
        schema
            .add_index(IndexDefinition::new("idx_parent", vec!["parent_id".into()]))
            .unwrap();
        schema
    }

    fn sample_fk() -> ForeignKeyConstraint {
        ForeignKeyConstraint::new(
            "fk1",
            TableName::new("child"),
            vec!["parent_id".into()],
            TableName::new("parent"),
            vec!["id".into()],
        )
    }

    #[test]
    fn test_valid_fk_passes() {
        validate_foreign_key(&sample_fk(), &child_schema(), &parent_schema()).unwrap();
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let mut fk = sample_fk();
        fk.referenced_columns.push("note".into());
        let err = validate_foreign_key(&fk, &child_schema(), &parent_schema()).unwrap_err();
        assert!(err.to_string().contains("referenced column"));
    }

    #[test]
    fn test_text_blob_rejected() {
        let mut fk = sample_fk();
        fk.columns = vec!["note".into()];
        fk.referenced_columns = vec!["note".into()];
        let err = validate_foreign_key(&fk, &child_schema(), &parent_schema()).unwrap_err();
        assert!(err.to_string().contains("TEXT and BLOB"));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut child = child_schema();
        child.drop_index("idx_parent").unwrap();
        child.drop_column("parent_id").unwrap();
        child
            .add_column(ColumnDefinition::simple("parent_id", 4, DataType::Int))
            .unwrap();
        child
            .add_index(IndexDefinition::new("idx_parent", vec!["parent_id".into()]))
            .unwrap();

        let err = validate_foreign_key(&sample_fk(), &child, &parent_schema()).unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn test_missing_supporting_index_rejected() {
        let mut child = child_schema();
        // Index removal is blocked once the FK is recorded, so test with the
        // FK not yet added to the schema.
        child.drop_index("idx_parent").unwrap();
        let err = validate_foreign_key(&sample_fk(), &child, &parent_schema()).unwrap_err();
        assert!(err.to_string().contains("no supporting index"), "{err}");
    }

    #[test]
    fn test_set_null_on_not_null_column_rejected() {
        let mut child = TableSchema::new(
            TableName::new("child"),
            vec![
                ColumnDefinition::primary_key("id", 1, DataType::BigInt),
                ColumnDefinition::simple("parent_id", 2, DataType::BigInt).not_null(),
            ],
        )
        .unwrap();
        child
            .add_index(IndexDefinition::new("idx_parent", vec!["parent_id".into()]))
            .unwrap();

        let fk = sample_fk().on_delete(ReferentialAction::SetNull);
        let err = validate_foreign_key(&fk, &child, &parent_schema()).unwrap_err();
        assert!(err.to_string().contains("SET NULL is not valid"));
    }

    #[test]
    fn test_pk_counts_as_supporting_index() {
        // FK over the child's own primary key, no secondary index needed.
        let child = TableSchema::new(
            TableName::new("child"),
            vec![ColumnDefinition::primary_key("id", 1, DataType::BigInt)],
        )
        .unwrap();
        let fk = ForeignKeyConstraint::new(
            "fk_id",
            TableName::new("child"),
            vec!["id".into()],
            TableName::new("parent"),
            vec!["id".into()],
        );
        validate_foreign_key(&fk, &child, &parent_schema()).unwrap();
    }
}
