//! The session: branch-scoped access to the database and the merge
//! orchestrator.
//!
//! A session holds one checked-out branch at a time. Table writes go through
//! the working set as copy-on-write staged snapshots; row writes run the
//! constraint engine when foreign key checking is enabled. Merge drives the
//! state machine: Clean → Merging → (MergingWithConflicts) → commit/abort.

use crate::error::SessionError;
use melddb_commons::{
    BranchName, CommonError, ConflictEntry, ConstraintViolation, Row, RowKey, SessionSettings,
    TableName, TableSchema,
};
use melddb_constraints::{
    insert_rows_skipping_violations, validate_foreign_key, verify_all, BulkInsertOutcome,
    CascadeEngine, CheckEvaluator, TableSet,
};
use melddb_merge::{merge_roots, ConflictLedger};
use melddb_versioning::{
    Commit, CommitHash, Database, MergeState, RootValue, TableSnapshot, WorkingSet, DEFAULT_BRANCH,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Options for [`Session::merge`].
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Stage the source branch's changes without recording the source head
    /// as a second parent of the eventual commit.
    pub squash: bool,
    /// Create a merge commit even when a fast-forward would suffice.
    pub no_ff: bool,
    /// Overrides the default merge commit message.
    pub message: Option<String>,
}

/// What a merge did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The branch head moved to the source head; nothing to commit.
    FastForward(CommitHash),
    /// The source is already an ancestor; nothing happened.
    AlreadyUpToDate,
    /// Merge staged with an empty ledger, awaiting commit.
    Clean,
    /// Merge staged with ledger entries to resolve.
    Conflicts { conflicts: usize, violations: usize },
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FastForward(hash) => write!(f, "fast-forward to {}", hash.short()),
            Self::AlreadyUpToDate => f.write_str("already up to date"),
            Self::Clean => f.write_str("merge staged"),
            Self::Conflicts {
                conflicts,
                violations,
            } => write!(
                f,
                "merge staged with {} conflict(s) and {} violation(s)",
                conflicts, violations
            ),
        }
    }
}

/// Merge bookkeeping that lives outside the working set: the ledger plus
/// the options the eventual commit needs to honor. Kept per branch so a
/// ledger carried past a commit survives checkouts; entries die only by
/// resolution or abort.
#[derive(Default)]
struct MergeScratch {
    ledger: ConflictLedger,
    squash: bool,
    message: Option<String>,
}

pub struct Session {
    db: Arc<Database>,
    branch: Mutex<BranchName>,
    settings: Mutex<SessionSettings>,
    scratch: Mutex<BTreeMap<BranchName, MergeScratch>>,
}

impl Session {
    pub fn new(db: Arc<Database>, settings: SessionSettings) -> Self {
        Self {
            db,
            branch: Mutex::new(BranchName::new(DEFAULT_BRANCH)),
            settings: Mutex::new(settings),
            scratch: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn current_branch(&self) -> BranchName {
        self.branch.lock().clone()
    }

    pub fn foreign_key_checks(&self) -> bool {
        self.settings.lock().foreign_key_checks
    }

    /// The `FOREIGN_KEY_CHECKS` toggle. Disabling skips live checks and
    /// cascades; nothing is re-validated when checking is re-enabled.
    pub fn set_foreign_key_checks(&self, enabled: bool) {
        self.settings.lock().foreign_key_checks = enabled;
    }

    pub fn set_allow_commit_with_conflicts(&self, allowed: bool) {
        self.settings.lock().merge.allow_commit_with_conflicts = allowed;
    }

    fn working_set(&self) -> Result<Arc<Mutex<WorkingSet>>, SessionError> {
        Ok(self.db.working_set(&self.current_branch())?)
    }

    fn head_root(&self, ws: &WorkingSet) -> Result<Arc<RootValue>, SessionError> {
        Ok(self.db.graph.must_get(ws.head())?.root.clone())
    }

    fn resolve_working_root(&self, ws: &WorkingSet) -> Result<RootValue, SessionError> {
        let head_root = self.head_root(ws)?;
        Ok(ws.resolve_root(&head_root))
    }

    // ---- reads ------------------------------------------------------

    pub fn current_branch_head(&self) -> Result<Arc<Commit>, SessionError> {
        Ok(self.db.head_commit(&self.current_branch())?)
    }

    /// A table snapshot as of an arbitrary commit.
    pub fn read_table_at(
        &self,
        commit: &CommitHash,
        name: &TableName,
    ) -> Result<Arc<TableSnapshot>, SessionError> {
        let commit = self.db.graph.must_get(commit)?;
        commit
            .root
            .table(name)
            .cloned()
            .ok_or_else(|| melddb_versioning::VersioningError::TableNotFound(name.to_string()).into())
    }

    /// A table snapshot as the working set currently sees it.
    pub fn read_working_table(&self, name: &TableName) -> Result<Arc<TableSnapshot>, SessionError> {
        let ws_arc = self.working_set()?;
        let ws = ws_arc.lock();
        let root = self.resolve_working_root(&ws)?;
        root.table(name)
            .cloned()
            .ok_or_else(|| melddb_versioning::VersioningError::TableNotFound(name.to_string()).into())
    }

    pub fn working_table_names(&self) -> Result<Vec<TableName>, SessionError> {
        let ws_arc = self.working_set()?;
        let ws = ws_arc.lock();
        Ok(self.resolve_working_root(&ws)?.table_names())
    }

    // ---- table writes -----------------------------------------------

    /// Stage a whole table snapshot into the working set.
    pub fn write_working_table(
        &self,
        name: TableName,
        snapshot: TableSnapshot,
    ) -> Result<(), SessionError> {
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        ws.stage_table(name, Arc::new(snapshot));
        Ok(())
    }

    /// Create a table, validating its foreign keys and allocating its
    /// stable id.
    pub fn create_table(&self, mut schema: TableSchema) -> Result<(), SessionError> {
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        let root = self.resolve_working_root(&ws)?;
        if root.has_table(&schema.table_name) {
            return Err(
                CommonError::already_exists(format!("table '{}'", schema.table_name)).into(),
            );
        }
        // With checking disabled, foreign keys are declared unresolved: the
        // referenced table may not exist yet and nothing is validated until
        // checking is back on.
        if self.foreign_key_checks() {
            for fk in &schema.foreign_keys {
                if fk.referenced_table == schema.table_name {
                    validate_foreign_key(fk, &schema, &schema)?;
                } else {
                    let parent = root.table(&fk.referenced_table).ok_or_else(|| {
                        CommonError::not_found(format!(
                            "referenced table '{}' for foreign key `{}`",
                            fk.referenced_table, fk.name
                        ))
                    })?;
                    validate_foreign_key(fk, &schema, parent.schema())?;
                }
            }
        }
        if schema.table_id == 0 {
            schema = schema.with_table_id(self.db.allocate_table_id());
        }
        let name = schema.table_name.clone();
        ws.stage_table(name, Arc::new(TableSnapshot::empty(schema)));
        Ok(())
    }

    /// Drop a table. Hard error while another table's foreign key still
    /// references it.
    pub fn drop_table(&self, name: &TableName) -> Result<(), SessionError> {
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        let root = self.resolve_working_root(&ws)?;
        if !root.has_table(name) {
            return Err(melddb_versioning::VersioningError::TableNotFound(name.to_string()).into());
        }
        for (child, snap) in root.tables() {
            if child == name {
                continue;
            }
            if let Some(fk) = snap
                .schema()
                .foreign_keys
                .iter()
                .find(|fk| &fk.referenced_table == name)
            {
                return Err(CommonError::invalid_input(format!(
                    "unable to drop table '{}': it is referenced by foreign key constraint `{}`",
                    name, fk.name
                ))
                .into());
            }
        }
        ws.drop_table(name.clone());
        Ok(())
    }

    /// Apply a schema change to a working table, re-addressing its rows
    /// under the new schema. DDL guards (index drops blocked by FKs, column
    /// drops blocked by references) surface through the closure's error.
    pub fn alter_table<F>(&self, name: &TableName, alter: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut TableSchema) -> Result<(), CommonError>,
    {
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        let root = self.resolve_working_root(&ws)?;
        let snap = root
            .table(name)
            .ok_or_else(|| melddb_versioning::VersioningError::TableNotFound(name.to_string()))?;
        let mut schema = snap.schema().clone();
        alter(&mut schema)?;
        let rekeyed = snap.rekey_with_schema(schema)?;
        let new_name = rekeyed.schema().table_name.clone();
        if &new_name != name {
            ws.drop_table(name.clone());
        }
        ws.stage_table(new_name, Arc::new(rekeyed));
        Ok(())
    }

    /// Declare a foreign key on an existing table, fully validated.
    pub fn add_foreign_key(
        &self,
        fk: melddb_commons::ForeignKeyConstraint,
    ) -> Result<(), SessionError> {
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        let root = self.resolve_working_root(&ws)?;
        let child = root
            .table(&fk.table)
            .ok_or_else(|| melddb_versioning::VersioningError::TableNotFound(fk.table.to_string()))?;
        if self.foreign_key_checks() {
            let parent = root.table(&fk.referenced_table).ok_or_else(|| {
                CommonError::not_found(format!(
                    "referenced table '{}' for foreign key `{}`",
                    fk.referenced_table, fk.name
                ))
            })?;
            validate_foreign_key(&fk, child.schema(), parent.schema())?;
        }

        let mut schema = child.schema().clone();
        schema.add_foreign_key(fk)?;
        let name = schema.table_name.clone();
        ws.stage_table(name, Arc::new(child.rekey_with_schema(schema)?));
        Ok(())
    }

    // ---- row writes -------------------------------------------------

    fn table_set(root: &RootValue) -> TableSet {
        root.tables()
            .iter()
            .map(|(name, snap)| (name.clone(), (**snap).clone()))
            .collect()
    }

    fn stage_changed(ws: &mut WorkingSet, before: &RootValue, set: TableSet) {
        for (name, snap) in set {
            match before.table(&name) {
                Some(old) if **old == snap => {}
                _ => ws.stage_table(name, Arc::new(snap)),
            }
        }
    }

    pub fn insert_row(&self, table: &TableName, row: Row) -> Result<RowKey, SessionError> {
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        let root = self.resolve_working_root(&ws)?;
        let mut set = Self::table_set(&root);

        let key = if self.foreign_key_checks() {
            CascadeEngine::new(&mut set).insert_row_checked(table, row)?
        } else {
            let snap = set.get_mut(table).ok_or_else(|| {
                melddb_versioning::VersioningError::TableNotFound(table.to_string())
            })?;
            snap.insert_row(row)?
        };
        Self::stage_changed(&mut ws, &root, set);
        Ok(key)
    }

    /// Replace the row at `key`. With checks enabled this validates the new
    /// row's own foreign keys and applies on-update actions of referencing
    /// constraints; RESTRICT leaves every table unchanged.
    pub fn update_row(
        &self,
        table: &TableName,
        key: &RowKey,
        row: Row,
    ) -> Result<RowKey, SessionError> {
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        let root = self.resolve_working_root(&ws)?;
        let mut set = Self::table_set(&root);

        let new_key = if self.foreign_key_checks() {
            melddb_constraints::check_row(table, &row, &set)?;
            CascadeEngine::new(&mut set).update_row(table, key, row)?
        } else {
            let snap = set.get_mut(table).ok_or_else(|| {
                melddb_versioning::VersioningError::TableNotFound(table.to_string())
            })?;
            snap.update(key, row)?
        };
        Self::stage_changed(&mut ws, &root, set);
        Ok(new_key)
    }

    pub fn delete_row(&self, table: &TableName, key: &RowKey) -> Result<(), SessionError> {
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        let root = self.resolve_working_root(&ws)?;
        let mut set = Self::table_set(&root);

        if self.foreign_key_checks() {
            CascadeEngine::new(&mut set).delete_row(table, key)?;
        } else {
            let snap = set.get_mut(table).ok_or_else(|| {
                melddb_versioning::VersioningError::TableNotFound(table.to_string())
            })?;
            snap.delete(key);
        }
        Self::stage_changed(&mut ws, &root, set);
        Ok(())
    }

    /// Bulk load skipping violating rows, one warning per skip.
    pub fn insert_rows_ignore_errors(
        &self,
        table: &TableName,
        rows: Vec<Row>,
    ) -> Result<BulkInsertOutcome, SessionError> {
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        let root = self.resolve_working_root(&ws)?;
        let mut set = Self::table_set(&root);
        let outcome = insert_rows_skipping_violations(&mut set, table, rows)?;
        Self::stage_changed(&mut ws, &root, set);
        Ok(outcome)
    }

    /// On-demand verification over the working set. Returns violations
    /// instead of failing; the checks pass runs only when an evaluator is
    /// supplied.
    pub fn verify_constraints(
        &self,
        evaluator: Option<&dyn CheckEvaluator>,
    ) -> Result<Vec<ConstraintViolation>, SessionError> {
        let ws_arc = self.working_set()?;
        let ws = ws_arc.lock();
        let root = self.resolve_working_root(&ws)?;
        Ok(verify_all(&Self::table_set(&root), evaluator))
    }

    // ---- commit -----------------------------------------------------

    pub fn commit(&self, message: &str) -> Result<Arc<Commit>, SessionError> {
        let branch = self.current_branch();
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        let mut scratches = self.scratch.lock();
        let scratch = scratches.entry(branch.clone()).or_default();
        let settings = self.settings.lock().clone();

        if ws.merge_state() == MergeState::MergingWithConflicts
            && !settings.merge.allow_commit_with_conflicts
        {
            return Err(SessionError::UnresolvedConflicts);
        }
        if !ws.is_dirty() && ws.merge_state() == MergeState::Clean {
            return Err(CommonError::invalid_input("nothing to commit").into());
        }

        let head_root = self.head_root(&ws)?;
        let root = ws.resolve_root(&head_root);
        let mut parents = vec![ws.head().clone()];
        if let Some(source) = ws.merge_source() {
            if !scratch.squash {
                parents.push(source.clone());
            }
        }
        let message = if message.is_empty() {
            scratch.message.take().unwrap_or_else(|| message.to_string())
        } else {
            message.to_string()
        };

        let commit = self.db.graph.insert(Commit::new(
            parents,
            Arc::new(root),
            &settings.author,
            message,
        ));
        self.db.branches.set_head(&branch, commit.hash.clone())?;
        ws.complete_commit(commit.hash.clone());

        // Committing with conflicts carries the ledger forward; a clean
        // commit drains the scratch entirely.
        if !settings.merge.allow_commit_with_conflicts || scratch.ledger.is_empty() {
            scratch.ledger.clear();
        }
        scratch.squash = false;
        scratch.message = None;

        log::info!("commit {} on '{}'", commit.hash.short(), branch);
        Ok(commit)
    }

    // ---- merge ------------------------------------------------------

    pub fn merge(
        &self,
        source: &BranchName,
        opts: MergeOptions,
    ) -> Result<MergeOutcome, SessionError> {
        let branch = self.current_branch();
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();

        if ws.merge_state() != MergeState::Clean {
            return Err(SessionError::MergeInProgress);
        }
        if ws.is_dirty() {
            return Err(SessionError::DirtyWorkingSet);
        }

        let source_head = self.db.branches.head(source)?;
        let our_head = ws.head().clone();

        if self.db.graph.is_ancestor(&source_head, &our_head)? {
            log::info!("merge of '{}' into '{}': already up to date", source, branch);
            return Ok(MergeOutcome::AlreadyUpToDate);
        }
        if self.db.graph.is_ancestor(&our_head, &source_head)?
            && !opts.no_ff
            && !opts.squash
        {
            self.db.branches.set_head(&branch, source_head.clone())?;
            ws.reset_to(source_head.clone());
            log::info!(
                "merge of '{}' into '{}': fast-forward to {}",
                source,
                branch,
                source_head.short()
            );
            return Ok(MergeOutcome::FastForward(source_head));
        }

        let base_hash = self
            .db
            .graph
            .merge_base(&our_head, &source_head)?
            .ok_or_else(|| CommonError::internal("branches share no common ancestor"))?;
        let base_root = self.db.graph.must_get(&base_hash)?.root.clone();
        let our_root = self.db.graph.must_get(&our_head)?.root.clone();
        let their_root = self.db.graph.must_get(&source_head)?.root.clone();

        let result = merge_roots(&base_root, &our_root, &their_root)?;

        for (name, snap) in result.root.tables() {
            match our_root.table(name) {
                Some(old) if **old == **snap => {}
                _ => ws.stage_table(name.clone(), snap.clone()),
            }
        }
        for name in our_root.table_names() {
            if !result.root.has_table(&name) {
                ws.drop_table(name);
            }
        }

        ws.begin_merge(source_head);
        let mut scratches = self.scratch.lock();
        let conflicts = result.ledger.conflict_count();
        let violations = result.ledger.violations().len();
        let scratch = scratches.entry(branch.clone()).or_default();
        scratch.ledger = result.ledger;
        scratch.squash = opts.squash;
        scratch.message = Some(
            opts.message
                .unwrap_or_else(|| format!("Merge branch '{}'", source)),
        );

        if scratch.ledger.is_empty() {
            Ok(MergeOutcome::Clean)
        } else {
            ws.mark_conflicts();
            Ok(MergeOutcome::Conflicts {
                conflicts,
                violations,
            })
        }
    }

    /// Discard the staged merge and its ledger atomically.
    pub fn abort_merge(&self) -> Result<(), SessionError> {
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        if ws.merge_state() == MergeState::Clean {
            return Err(SessionError::NoActiveMerge);
        }
        ws.abort_merge();
        self.scratch.lock().remove(&self.current_branch());
        Ok(())
    }

    // ---- ledger relations -------------------------------------------

    fn with_ledger<T>(&self, f: impl FnOnce(&ConflictLedger) -> T) -> T {
        let scratches = self.scratch.lock();
        match scratches.get(&self.current_branch()) {
            Some(scratch) => f(&scratch.ledger),
            None => f(&ConflictLedger::new()),
        }
    }

    /// Rows of the `conflicts` relation: (table, unresolved count).
    pub fn conflicts_summary(&self) -> Vec<(TableName, usize)> {
        self.with_ledger(|ledger| ledger.summary())
    }

    pub fn conflicts_for(&self, table: &TableName) -> Vec<ConflictEntry> {
        self.with_ledger(|ledger| ledger.conflicts_for(table).to_vec())
    }

    /// Rows of the `conflicts_<table>` detail relation, with typed
    /// `base_*`/`our_*`/`their_*` columns per original column.
    pub fn conflict_detail_rows(&self, table: &TableName) -> Result<Vec<Row>, SessionError> {
        let snapshot = self.read_working_table(table)?;
        Ok(self.with_ledger(|ledger| ledger.detail_rows(table, snapshot.schema())))
    }

    pub fn constraint_violations(&self) -> Vec<ConstraintViolation> {
        self.with_ledger(|ledger| ledger.violations().to_vec())
    }

    pub fn violations_summary(&self) -> Vec<(TableName, usize)> {
        self.with_ledger(|ledger| ledger.violations_summary())
    }

    /// Resolve one conflict: write the chosen row (or delete for `None`)
    /// into the working table and drop the ledger entry. When the last
    /// entry drains, the working set leaves MergingWithConflicts.
    pub fn resolve_conflict(
        &self,
        table: &TableName,
        key: &RowKey,
        resolution: Option<Row>,
    ) -> Result<(), SessionError> {
        let branch = self.current_branch();
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        let mut scratches = self.scratch.lock();
        let scratch = scratches.entry(branch).or_default();
        scratch.ledger.resolve(table, key).ok_or_else(|| {
            CommonError::not_found(format!("conflict on table '{}', key {}", table, key))
        })?;

        let root = self.resolve_working_root(&ws)?;
        let snap = root
            .table(table)
            .ok_or_else(|| melddb_versioning::VersioningError::TableNotFound(table.to_string()))?;
        let mut snap = (**snap).clone();
        snap.delete(key);
        if let Some(row) = resolution {
            snap.insert_row(row)?;
        }
        ws.stage_table(table.clone(), Arc::new(snap));

        if scratch.ledger.is_empty() {
            ws.mark_conflicts_resolved();
        }
        Ok(())
    }

    /// Destroy one recorded constraint violation. The caller is expected to
    /// have repaired the offending data first (this does not re-verify);
    /// when the last ledger entry drains, the working set leaves
    /// MergingWithConflicts.
    pub fn resolve_violation(
        &self,
        table: &TableName,
        key: &RowKey,
        constraint: &str,
    ) -> Result<ConstraintViolation, SessionError> {
        let branch = self.current_branch();
        let ws_arc = self.working_set()?;
        let mut ws = ws_arc.lock();
        let mut scratches = self.scratch.lock();
        let scratch = scratches.entry(branch).or_default();
        let violation = scratch
            .ledger
            .resolve_violation(table, key, constraint)
            .ok_or_else(|| {
                CommonError::not_found(format!(
                    "violation of `{}` on table '{}', key {}",
                    constraint, table, key
                ))
            })?;
        if scratch.ledger.is_empty() {
            ws.mark_conflicts_resolved();
        }
        Ok(violation)
    }

    pub fn merge_state(&self) -> Result<MergeState, SessionError> {
        Ok(self.working_set()?.lock().merge_state())
    }

    // ---- branches ---------------------------------------------------

    pub fn create_branch(&self, name: &str) -> Result<(), SessionError> {
        let head = self.current_branch_head()?;
        self.db.create_branch(BranchName::new(name), head.hash.clone())?;
        Ok(())
    }

    pub fn delete_branch(&self, name: &str) -> Result<(), SessionError> {
        let name = BranchName::new(name);
        if name == self.current_branch() {
            return Err(CommonError::invalid_input("cannot delete the checked-out branch").into());
        }
        self.db.delete_branch(&name)?;
        self.scratch.lock().remove(&name);
        Ok(())
    }

    /// Switch the session to another branch. Requires a clean working set.
    pub fn checkout(&self, name: &str) -> Result<(), SessionError> {
        let target = BranchName::new(name);
        self.db.branches.head(&target)?;
        {
            let ws_arc = self.working_set()?;
            let ws = ws_arc.lock();
            if ws.is_dirty() || ws.merge_state() != MergeState::Clean {
                return Err(
                    CommonError::invalid_input("cannot checkout with uncommitted changes").into(),
                );
            }
        }
        *self.branch.lock() = target;
        Ok(())
    }

    pub fn branch_names(&self) -> Vec<BranchName> {
        self.db.branches.names()
    }

    /// Whether `ancestor` is reachable from `descendant`.
    pub fn is_ancestor(
        &self,
        ancestor: &CommitHash,
        descendant: &CommitHash,
    ) -> Result<bool, SessionError> {
        Ok(self.db.graph.is_ancestor(ancestor, descendant)?)
    }

    pub fn merge_base(
        &self,
        a: &CommitHash,
        b: &CommitHash,
    ) -> Result<Option<CommitHash>, SessionError> {
        Ok(self.db.graph.merge_base(a, b)?)
    }
}
