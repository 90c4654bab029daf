use crate::error::Result;
use crate::sql::{Fragment, QueryExecutor};

/// A temporary table of entity ids (`cid`) materialized for one report run.
///
/// The table is dropped when the handle goes out of scope, on success and
/// on every error path alike. Concurrent runs never collide because each
/// table gets a random name.
pub struct PrefilterTable<'e, E: QueryExecutor + ?Sized> {
    executor: &'e E,
    name: String,
    len: usize,
}

fn unique_name() -> String {
    format!("rpt_lybunt_{:016x}", rand::random::<u64>())
}

impl<'e, E: QueryExecutor + ?Sized> PrefilterTable<'e, E> {
    /// Run `query` (which must select a single `cid` column) into a new
    /// temporary table.
    pub fn materialize(executor: &'e E, query: &Fragment) -> Result<Self> {
        let name = unique_name();
        let create = query.wrap(&format!("CREATE TEMP TABLE {name} AS "), "");
        executor.execute_fragment(&create)?;

        let mut table = Self { executor, name, len: 0 };
        let counted = executor.query(&format!("SELECT COUNT(*) AS n FROM {}", table.name), &[])?;
        table.len = counted
            .first()
            .and_then(|r| r.i64("n"))
            .unwrap_or(0)
            .max(0) as usize;
        tracing::debug!(target: "lybunt::prefilter", table = %table.name, entities = table.len, "materialized");
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn entity_ids(&self) -> Result<Vec<i64>> {
        let rows = self
            .executor
            .query(&format!("SELECT cid FROM {} ORDER BY cid", self.name), &[])?;
        Ok(rows.iter().filter_map(|r| r.i64("cid")).collect())
    }
}

impl<E: QueryExecutor + ?Sized> Drop for PrefilterTable<'_, E> {
    fn drop(&mut self) {
        let sql = format!("DROP TABLE IF EXISTS temp.{}", self.name);
        match self.executor.execute(&sql, &[]) {
            Ok(_) => tracing::debug!(target: "lybunt::prefilter", table = %self.name, "dropped"),
            Err(e) => tracing::warn!(target: "lybunt::prefilter", table = %self.name, "failed to drop prefilter table: {e}"),
        }
    }
}
