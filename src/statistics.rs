use crate::assembler::{column_expr, Plan, ReportQuery};
use crate::error::Result;
use crate::sql::{Fragment, QueryExecutor, Row};
use crate::window::WindowKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatValue {
    Count(i64),
    Money(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statistic {
    pub key: String,
    pub title: String,
    pub value: StatValue,
}

/// Summary figures for one run, in display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsResult {
    pub entries: Vec<Statistic>,
    /// True when the totals were read off the rollup row.
    pub from_rollup: bool,
}

impl StatisticsResult {
    fn push(&mut self, key: &str, title: &str, value: StatValue) {
        self.entries.push(Statistic {
            key: key.to_string(),
            title: title.to_string(),
            value,
        });
    }

    pub fn get(&self, key: &str) -> Option<&Statistic> {
        self.entries.iter().find(|s| s.key == key)
    }

    pub fn count(&self, key: &str) -> Option<i64> {
        match self.get(key)?.value {
            StatValue::Count(n) => Some(n),
            StatValue::Money(_) => None,
        }
    }

    pub fn money(&self, key: &str) -> Option<f64> {
        match self.get(key)?.value {
            StatValue::Money(v) => Some(v),
            StatValue::Count(_) => None,
        }
    }
}

struct Total {
    key: &'static str,
    title: String,
    alias: String,
    expr: String,
}

fn totals(plan: &Plan<'_>) -> Result<Vec<Total>> {
    let registry = plan.registry();
    let txn = registry.transaction();
    let windows = plan.windows();
    let mut totals = Vec::new();
    for (key, window) in [("current_total", WindowKind::Current), ("prior_total", WindowKind::Prior)] {
        if let Some(spec) = registry.windowed_column(window) {
            totals.push(Total {
                key,
                title: windows.title(window),
                alias: spec.alias(),
                expr: column_expr(windows, txn, spec)?,
            });
        }
    }
    if let Some(spec) = registry.lifetime_column() {
        totals.push(Total {
            key: "lifetime_total",
            title: "Total LifeTime".to_string(),
            alias: spec.alias(),
            expr: column_expr(windows, txn, spec)?,
        });
    }
    Ok(totals)
}

fn count_rows<E: QueryExecutor + ?Sized>(executor: &E, query: &ReportQuery) -> Result<i64> {
    let counted = query.grouped().wrap("SELECT COUNT(*) AS n FROM (", ") AS counted");
    let rows = executor.query_fragment(&counted)?;
    Ok(rows.first().and_then(|r| r.i64("n")).unwrap_or(0))
}

/// Same FROM and WHERE as the main query, aggregated without grouping.
fn fallback<E: QueryExecutor + ?Sized>(executor: &E, query: &ReportQuery, totals: &[Total]) -> Result<Row> {
    let items: Vec<String> = totals.iter().map(|t| format!("{} AS {}", t.expr, t.alias)).collect();
    let select = Fragment::new(format!("SELECT {}", items.join(", ")));
    let sql = Fragment::join([&select, &query.from, &query.where_clause], " ");
    let rows = executor.query_fragment(&sql)?;
    Ok(rows.into_iter().next().unwrap_or_else(|| Row::new(Vec::new())))
}

/// Row count plus the current, prior and lifetime totals. Totals come from
/// the rollup row when it carries all of them; otherwise one extra query
/// computes them. With no rows only the count is reported.
pub fn compute<E: QueryExecutor + ?Sized>(
    executor: &E,
    plan: &Plan<'_>,
    query: &ReportQuery,
    rows: &[Row],
    rollup: Option<&Row>,
) -> Result<StatisticsResult> {
    let row_count = if query.limit.is_empty() {
        rows.len() as i64
    } else {
        count_rows(executor, query)?
    };

    let mut result = StatisticsResult::default();
    result.push("row_count", "Row(s) Listed", StatValue::Count(row_count));
    if row_count == 0 {
        return Ok(result);
    }

    let totals = totals(plan)?;
    let source = match rollup {
        Some(row) if totals.iter().all(|t| !row.is_null(&t.alias)) => {
            result.from_rollup = true;
            row.clone()
        }
        Some(row) => {
            let missing: Vec<&str> = totals
                .iter()
                .filter(|t| row.is_null(&t.alias))
                .map(|t| t.alias.as_str())
                .collect();
            tracing::warn!(
                target: "lybunt::statistics",
                "rollup row is missing {}; recomputing totals",
                missing.join(", ")
            );
            fallback(executor, query, &totals)?
        }
        None => {
            tracing::debug!(target: "lybunt::statistics", "no rollup row; computing totals");
            fallback(executor, query, &totals)?
        }
    };

    for t in &totals {
        result.push(t.key, &t.title, StatValue::Money(source.f64(&t.alias).unwrap_or(0.0)));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{at, insert_contact, insert_contribution, test_db};
    use crate::models::{NewContact, NewContribution};
    use crate::registry::Registry;
    use crate::report::{run_report, EntitySelection, ReportRequest};
    use crate::window::FiscalYearStart;
    use rusqlite::Connection;

    fn seed(conn: &Connection) {
        let gifts = [
            ("Ann", vec![(2022, 10.5), (2021, 4.25)]),
            ("Bob", vec![(2022, 20.25), (2023, 8.0)]),
            ("Cy", vec![(2022, 7.75)]),
            ("Dee", vec![(2022, 1.0), (2022, 2.0), (2019, 100.0)]),
        ];
        for (name, list) in gifts {
            let id = insert_contact(conn, &NewContact::individual(name, "Donor")).unwrap();
            for (year, amount) in list {
                insert_contribution(conn, &NewContribution::donation(id, at(year, 6, 15), amount)).unwrap();
            }
        }
    }

    fn run(conn: &Connection, request: ReportRequest) -> StatisticsResult {
        let reg = Registry::standard().unwrap();
        run_report(conn, &reg, &request, FiscalYearStart::default())
            .unwrap()
            .statistics
    }

    #[test]
    fn test_rollup_and_fallback_agree() {
        let (_dir, conn) = test_db();
        seed(&conn);
        for selection in [EntitySelection::Lapsed, EntitySelection::ActiveIn(WindowKind::Prior)] {
            let base = ReportRequest::new(2023).selection(selection);
            let with_rollup = run(&conn, base.clone());
            let without = run(&conn, base.without_rollup());
            assert!(with_rollup.from_rollup);
            assert!(!without.from_rollup);
            assert_eq!(with_rollup.entries, without.entries, "{selection:?}");
        }
    }

    #[test]
    fn test_lapsed_totals() {
        let (_dir, conn) = test_db();
        seed(&conn);
        let stats = run(&conn, ReportRequest::new(2023));
        assert_eq!(stats.count("row_count"), Some(3));
        assert_eq!(stats.money("prior_total"), Some(10.5 + 7.75 + 3.0));
        assert_eq!(stats.money("current_total"), Some(0.0));
        assert_eq!(stats.money("lifetime_total"), Some(10.5 + 4.25 + 7.75 + 103.0));
        assert_eq!(stats.get("prior_total").unwrap().title, "Total for 2022");
        assert_eq!(stats.get("lifetime_total").unwrap().title, "Total LifeTime");
    }

    #[test]
    fn test_incomplete_rollup_falls_back() {
        let (_dir, conn) = test_db();
        seed(&conn);
        // current-year total is not required, so this selection drops it
        let request = ReportRequest::new(2023).column("sort_name");
        let stats = run(&conn, request);
        assert!(!stats.from_rollup);
        assert_eq!(stats.money("current_total"), Some(0.0));
        assert_eq!(stats.money("prior_total"), Some(21.25));
    }

    #[test]
    fn test_no_rows_reports_only_the_count() {
        let (_dir, conn) = test_db();
        let stats = run(&conn, ReportRequest::new(2023));
        assert_eq!(stats.entries.len(), 1);
        assert_eq!(stats.count("row_count"), Some(0));
        assert_eq!(stats.money("row_count"), None);
    }
}
