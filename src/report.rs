use crate::assembler::{main_query, prefilter_query, Plan, Source};
use crate::error::Result;
use crate::prefilter::PrefilterTable;
use crate::registry::{DataKind, FilterValue, Registry, SortDirection};
use crate::sql::{QueryExecutor, Row};
use crate::statistics::{self, StatisticsResult};
use crate::window::{resolve_windows, FiscalYearStart, WindowKind, YearMode, YearWindows};

/// Which entities make it into the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitySelection {
    /// Anyone with a live transaction inside the window.
    ActiveIn(WindowKind),
    /// Gave in the prior window but not in the current one.
    Lapsed,
}

impl EntitySelection {
    /// The window an entity must have given in.
    pub fn anchor(self) -> WindowKind {
        match self {
            EntitySelection::ActiveIn(window) => window,
            EntitySelection::Lapsed => WindowKind::Prior,
        }
    }

    /// The window an entity must NOT have given in, if any.
    pub fn excluded(self) -> Option<WindowKind> {
        match self {
            EntitySelection::ActiveIn(_) => None,
            EntitySelection::Lapsed => Some(WindowKind::Current),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub rows: u32,
    pub offset: u32,
}

/// What the caller asked for. Names are `table.key` or a bare key that is
/// unique across the registry.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub year: i32,
    pub mode: YearMode,
    pub selection: EntitySelection,
    pub columns: Vec<String>,
    pub filters: Vec<(String, FilterValue)>,
    pub sorts: Vec<(String, Option<SortDirection>)>,
    pub rollup: bool,
    pub page: Option<Page>,
    /// Materialize the entity set first (the default). When false the
    /// report joins entities to transactions in one pass.
    pub prefilter: bool,
}

impl ReportRequest {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            mode: YearMode::Calendar,
            selection: EntitySelection::Lapsed,
            columns: Vec::new(),
            filters: Vec::new(),
            sorts: Vec::new(),
            rollup: true,
            page: None,
            prefilter: true,
        }
    }

    pub fn mode(mut self, mode: YearMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn selection(mut self, selection: EntitySelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn column(mut self, name: &str) -> Self {
        self.columns.push(name.to_string());
        self
    }

    pub fn filter(mut self, name: &str, value: FilterValue) -> Self {
        self.filters.push((name.to_string(), value));
        self
    }

    pub fn sort(mut self, name: &str, direction: Option<SortDirection>) -> Self {
        self.sorts.push((name.to_string(), direction));
        self
    }

    pub fn without_rollup(mut self) -> Self {
        self.rollup = false;
        self
    }

    pub fn page(mut self, rows: u32, offset: u32) -> Self {
        self.page = Some(Page { rows, offset });
        self
    }

    pub fn direct(mut self) -> Self {
        self.prefilter = false;
        self
    }
}

/// A column as the display layer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub key: String,
    pub alias: String,
    pub title: String,
    pub kind: DataKind,
}

#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub windows: YearWindows,
    pub selection: EntitySelection,
    /// Visible columns in select order.
    pub columns: Vec<OutputColumn>,
    pub rows: Vec<Row>,
    pub rollup: Option<Row>,
    pub statistics: StatisticsResult,
    pub entity_alias: String,
    pub anchor_alias: String,
    /// Size of the materialized entity set; `None` for direct runs.
    pub prefiltered: Option<usize>,
    pub sql: String,
}

impl ReportOutput {
    pub fn anchor_label(&self) -> String {
        self.windows.label(self.selection.anchor())
    }
}

/// Run one report: resolve windows, materialize the entity set, execute
/// the main query, then total it up. The prefilter table lives until
/// statistics are done and is dropped on every exit path.
pub fn run_report<E: QueryExecutor + ?Sized>(
    executor: &E,
    registry: &Registry,
    request: &ReportRequest,
    fiscal: FiscalYearStart,
) -> Result<ReportOutput> {
    let windows = resolve_windows(request.year, request.mode, fiscal)?;
    let plan = Plan::resolve(registry, request, windows)?;

    let prefilter = if request.prefilter {
        let seed = prefilter_query(&plan)?;
        let table = PrefilterTable::materialize(executor, &seed)?;
        if table.is_empty() {
            tracing::debug!(target: "lybunt::report", "no entities matched the filters");
        }
        Some(table)
    } else {
        None
    };
    let source = match &prefilter {
        Some(table) => Source::Prefiltered { table: table.name() },
        None => Source::Direct,
    };

    let query = main_query(&plan, source)?;
    let sql = query.sql();
    let mut rows = executor.query_fragment(&sql)?;
    let rollup = take_rollup(&mut rows, plan.entity_alias());
    tracing::debug!(
        target: "lybunt::report",
        rows = rows.len(),
        rollup = rollup.is_some(),
        "main query done"
    );

    let statistics = statistics::compute(executor, &plan, &query, &rows, rollup.as_ref())?;

    let columns = plan
        .columns()
        .iter()
        .filter(|c| c.display)
        .map(|c| OutputColumn {
            key: c.spec.key.clone(),
            alias: c.alias(),
            title: c.title.clone(),
            kind: c.spec.kind,
        })
        .collect();

    Ok(ReportOutput {
        windows,
        selection: request.selection,
        columns,
        rows,
        rollup,
        statistics,
        entity_alias: plan.entity_alias().to_string(),
        anchor_alias: plan.anchor_alias().to_string(),
        prefiltered: prefilter.as_ref().map(|t| t.len()),
        sql: sql.sql().to_string(),
    })
}

/// Remove and return the rollup row, the one row with no entity id.
fn take_rollup(rows: &mut Vec<Row>, entity_alias: &str) -> Option<Row> {
    let index = rows.iter().position(|r| r.is_null(entity_alias))?;
    Some(rows.remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{add_tag, add_to_group, at, insert_contact, insert_contribution, test_db};
    use crate::error::ReportError;
    use crate::models::{NewAddress, NewContact, NewContribution};
    use rusqlite::types::Value;
    use rusqlite::Connection;

    fn give(conn: &Connection, contact: i64, date: chrono::NaiveDateTime, amount: f64) {
        insert_contribution(conn, &NewContribution::donation(contact, date, amount)).unwrap();
    }

    fn ids(output: &ReportOutput) -> Vec<i64> {
        let mut ids: Vec<i64> = output.rows.iter().filter_map(|r| r.i64(&output.entity_alias)).collect();
        ids.sort();
        ids
    }

    fn temp_tables(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT count(*) FROM sqlite_temp_master WHERE type = 'table'",
            [],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_current_and_lifetime_totals_end_to_end() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let a = insert_contact(&conn, &NewContact::individual("Ann", "Avery")).unwrap();
        give(&conn, a, at(2023, 5, 1), 100.0);
        give(&conn, a, at(2022, 5, 1), 400.0);

        let request = ReportRequest::new(2023).selection(EntitySelection::ActiveIn(WindowKind::Current));
        let out = run_report(&conn, &reg, &request, FiscalYearStart::default()).unwrap();

        assert_eq!(out.rows.len(), 1);
        let row = &out.rows[0];
        assert_eq!(row.i64("contribution_contact_id"), Some(a));
        assert_eq!(row.f64("contribution_current_year_total"), Some(100.0));
        assert_eq!(row.f64("contribution_last_year_total"), Some(400.0));
        assert_eq!(row.f64("contribution_lifetime_total"), Some(500.0));
        assert_eq!(out.prefiltered, Some(1));
        assert_eq!(temp_tables(&conn), 0);
    }

    #[test]
    fn test_lapsed_selection() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let lapsed = insert_contact(&conn, &NewContact::individual("Lee", "Lapsed")).unwrap();
        let steady = insert_contact(&conn, &NewContact::individual("Sam", "Steady")).unwrap();
        let fresh = insert_contact(&conn, &NewContact::individual("Fay", "Fresh")).unwrap();
        give(&conn, lapsed, at(2022, 3, 1), 50.0);
        give(&conn, lapsed, at(2020, 3, 1), 25.0);
        give(&conn, steady, at(2022, 3, 1), 10.0);
        give(&conn, steady, at(2023, 3, 1), 10.0);
        give(&conn, fresh, at(2023, 3, 1), 99.0);

        let out = run_report(&conn, &reg, &ReportRequest::new(2023), FiscalYearStart::default()).unwrap();
        assert_eq!(ids(&out), vec![lapsed]);
        assert_eq!(out.rows[0].f64("contribution_last_year_total"), Some(50.0));
        assert_eq!(out.rows[0].f64("contribution_lifetime_total"), Some(75.0));
        assert_eq!(out.anchor_label(), "2022");

        let rollup = out.rollup.as_ref().unwrap();
        assert_eq!(rollup.f64("contribution_lifetime_total"), Some(75.0));
        assert!(rollup.is_null("contact_sort_name"));
    }

    #[test]
    fn test_test_and_template_contributions_are_ignored() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let a = insert_contact(&conn, &NewContact::individual("Ann", "A")).unwrap();
        let b = insert_contact(&conn, &NewContact::individual("Bob", "B")).unwrap();
        give(&conn, a, at(2022, 6, 1), 30.0);
        let mut test_gift = NewContribution::donation(a, at(2022, 7, 1), 1000.0);
        test_gift.is_test = true;
        insert_contribution(&conn, &test_gift).unwrap();
        let mut template = NewContribution::donation(b, at(2022, 7, 1), 70.0);
        template.is_template = true;
        insert_contribution(&conn, &template).unwrap();

        let out = run_report(&conn, &reg, &ReportRequest::new(2023), FiscalYearStart::default()).unwrap();
        assert_eq!(ids(&out), vec![a]);
        assert_eq!(out.rows[0].f64("contribution_lifetime_total"), Some(30.0));
    }

    #[test]
    fn test_fiscal_year_windows() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let a = insert_contact(&conn, &NewContact::individual("Ann", "A")).unwrap();
        give(&conn, a, at(2023, 8, 1), 20.0); // FY 2023-2024
        give(&conn, a, at(2023, 3, 1), 40.0); // FY 2022-2023
        give(&conn, a, at(2024, 7, 1), 80.0); // FY 2024-2025

        let fiscal = FiscalYearStart::new(7, 1).unwrap();
        let request = ReportRequest::new(2023)
            .mode(YearMode::Fiscal)
            .selection(EntitySelection::ActiveIn(WindowKind::Current));
        let out = run_report(&conn, &reg, &request, fiscal).unwrap();

        let row = &out.rows[0];
        assert_eq!(row.f64("contribution_current_year_total"), Some(20.0));
        assert_eq!(row.f64("contribution_last_year_total"), Some(40.0));
        assert_eq!(row.f64("contribution_lifetime_total"), Some(140.0));
        let title = &out.columns.iter().find(|c| c.key == "current_year_total").unwrap().title;
        assert_eq!(title, "Total for Fiscal Year 2023-2024");
    }

    #[test]
    fn test_main_query_sees_exactly_the_prefiltered_entities() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let mut members = Vec::new();
        for (i, last) in ["Smith", "Smithers", "Jones", "Smythe"].iter().enumerate() {
            let id = insert_contact(&conn, &NewContact::individual("Pat", last)).unwrap();
            give(&conn, id, at(2022, 2, 1 + i as u32), 10.0 * (i + 1) as f64);
            give(&conn, id, at(2019, 2, 1), 5.0);
            if last.starts_with("Smith") {
                members.push(id);
            }
        }

        let request = ReportRequest::new(2023).filter("sort_name", FilterValue::One("Smith".into()));
        let windows = resolve_windows(2023, YearMode::Calendar, FiscalYearStart::default()).unwrap();
        let plan = Plan::resolve(&reg, &request, windows).unwrap();
        let table = PrefilterTable::materialize(&conn, &prefilter_query(&plan).unwrap()).unwrap();
        let query = main_query(&plan, Source::Prefiltered { table: table.name() }).unwrap();
        let mut rows = conn.query_fragment(&query.sql()).unwrap();
        take_rollup(&mut rows, plan.entity_alias());

        let mut seen: Vec<i64> = rows.iter().filter_map(|r| r.i64(plan.entity_alias())).collect();
        seen.sort();
        members.sort();
        assert_eq!(table.entity_ids().unwrap(), members);
        assert_eq!(seen, members);
    }

    #[test]
    fn test_group_filter() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let a = insert_contact(&conn, &NewContact::individual("Ann", "A")).unwrap();
        let b = insert_contact(&conn, &NewContact::individual("Bob", "B")).unwrap();
        give(&conn, a, at(2022, 1, 10), 10.0);
        give(&conn, b, at(2022, 1, 10), 10.0);
        let group = add_to_group(&conn, "Major Donors", b).unwrap();

        let request = ReportRequest::new(2023).filter("group_id", FilterValue::Many(vec![group.to_string()]));
        let out = run_report(&conn, &reg, &request, FiscalYearStart::default()).unwrap();
        assert_eq!(ids(&out), vec![b]);
    }

    #[test]
    fn test_tag_filter() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let a = insert_contact(&conn, &NewContact::individual("Ann", "A")).unwrap();
        let b = insert_contact(&conn, &NewContact::individual("Bob", "B")).unwrap();
        give(&conn, a, at(2022, 2, 2), 15.0);
        give(&conn, b, at(2022, 2, 2), 25.0);
        let board = add_tag(&conn, "Board Member", a).unwrap();

        let request = ReportRequest::new(2023).filter("tag_id", FilterValue::One(board.to_string()));
        let out = run_report(&conn, &reg, &request, FiscalYearStart::default()).unwrap();
        assert_eq!(ids(&out), vec![a]);
        assert_eq!(out.statistics.money("prior_total"), Some(15.0));

        let direct = run_report(&conn, &reg, &request.clone().direct(), FiscalYearStart::default()).unwrap();
        assert_eq!(ids(&direct), vec![a]);
        assert!(!direct.sql.contains("INDEXED BY"), "{}", direct.sql);
    }

    #[test]
    fn test_address_filter_and_column() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let mut ann = NewContact::individual("Ann", "A");
        ann.address = Some(NewAddress::city("1 Main St", "Portland", "97201", "Oregon", "United States"));
        let a = insert_contact(&conn, &ann).unwrap();
        let mut bob = NewContact::individual("Bob", "B");
        bob.address = Some(NewAddress::city("9 Elm St", "Boston", "02108", "Massachusetts", "United States"));
        let b = insert_contact(&conn, &bob).unwrap();
        let c = insert_contact(&conn, &NewContact::individual("Cy", "C")).unwrap();
        for id in [a, b, c] {
            give(&conn, id, at(2022, 3, 3), 10.0);
        }

        let request = ReportRequest::new(2023)
            .column("city")
            .filter("state_province", FilterValue::Many(vec!["Oregon".into()]));
        let out = run_report(&conn, &reg, &request, FiscalYearStart::default()).unwrap();
        assert_eq!(ids(&out), vec![a]);
        assert_eq!(out.rows[0].text("address_city"), "Portland");

        // contacts without an address still list, with a blank city
        let out = run_report(&conn, &reg, &ReportRequest::new(2023).column("city"), FiscalYearStart::default()).unwrap();
        assert_eq!(ids(&out), vec![a, b, c]);
        let cy = out.rows.iter().find(|r| r.i64(&out.entity_alias) == Some(c)).unwrap();
        assert!(cy.is_null("address_city"));
    }

    #[test]
    fn test_contact_sub_type_filter() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let mut student = NewContact::individual("Sue", "S");
        student.contact_sub_type = Some("Student".into());
        let a = insert_contact(&conn, &student).unwrap();
        let b = insert_contact(&conn, &NewContact::individual("Bob", "B")).unwrap();
        give(&conn, a, at(2022, 6, 6), 5.0);
        give(&conn, b, at(2022, 6, 6), 5.0);

        let request = ReportRequest::new(2023)
            .filter("contact_sub_type", FilterValue::Many(vec!["Student".into()]))
            .sort("contact_sub_type", None);
        let out = run_report(&conn, &reg, &request, FiscalYearStart::default()).unwrap();
        assert_eq!(ids(&out), vec![a]);
        assert_eq!(out.rows[0].text("contact_contact_sub_type"), "Student");
    }

    #[test]
    fn test_direct_mode_matches_prefiltered_entities() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let a = insert_contact(&conn, &NewContact::individual("Ann", "A")).unwrap();
        let b = insert_contact(&conn, &NewContact::individual("Bob", "B")).unwrap();
        let c = insert_contact(&conn, &NewContact::individual("Cy", "C")).unwrap();
        give(&conn, a, at(2022, 4, 4), 12.0);
        give(&conn, b, at(2022, 4, 4), 8.0);
        give(&conn, b, at(2023, 4, 4), 8.0);
        give(&conn, c, at(2022, 9, 9), 4.0);

        let prefiltered = run_report(&conn, &reg, &ReportRequest::new(2023), FiscalYearStart::default()).unwrap();
        let direct = run_report(&conn, &reg, &ReportRequest::new(2023).direct(), FiscalYearStart::default()).unwrap();
        assert_eq!(ids(&prefiltered), vec![a, c]);
        assert_eq!(ids(&direct), vec![a, c]);
        assert_eq!(direct.prefiltered, None);
        assert!(direct.sql.contains("INDEXED BY idx_contributions_receive_date"), "{}", direct.sql);
    }

    #[test]
    fn test_paging_keeps_rollup_over_all_rows() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        for (i, amount) in [10.0, 20.0, 30.0].iter().enumerate() {
            let id = insert_contact(&conn, &NewContact::individual("N", &format!("Donor{i}"))).unwrap();
            give(&conn, id, at(2022, 1, 1), *amount);
        }

        let request = ReportRequest::new(2023).page(2, 0);
        let out = run_report(&conn, &reg, &request, FiscalYearStart::default()).unwrap();
        let totals: Vec<f64> = out.rows.iter().filter_map(|r| r.f64("contribution_last_year_total")).collect();
        assert_eq!(totals, vec![30.0, 20.0]);
        assert_eq!(out.rollup.as_ref().unwrap().f64("contribution_last_year_total"), Some(60.0));
        assert_eq!(out.statistics.count("row_count"), Some(3));
    }

    /// Passes everything through but fails the main report query.
    struct FailingMainQuery<'c> {
        conn: &'c Connection,
    }

    impl QueryExecutor for FailingMainQuery<'_> {
        fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
            QueryExecutor::execute(self.conn, sql, params)
        }

        fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
            if sql.contains("inner_query") {
                return Err(ReportError::Other("injected failure".into()));
            }
            QueryExecutor::query(self.conn, sql, params)
        }
    }

    #[test]
    fn test_prefilter_table_dropped_when_main_query_fails() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let a = insert_contact(&conn, &NewContact::individual("Ann", "A")).unwrap();
        give(&conn, a, at(2022, 1, 1), 1.0);

        let failing = FailingMainQuery { conn: &conn };
        let err = run_report(&failing, &reg, &ReportRequest::new(2023), FiscalYearStart::default()).unwrap_err();
        assert!(matches!(err, ReportError::Other(_)), "{err}");
        assert_eq!(temp_tables(&conn), 0);
    }

    #[test]
    fn test_empty_result() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let out = run_report(&conn, &reg, &ReportRequest::new(2023), FiscalYearStart::default()).unwrap();
        assert!(out.rows.is_empty());
        assert_eq!(out.prefiltered, Some(0));
        assert_eq!(out.statistics.count("row_count"), Some(0));
        assert!(out.statistics.get("lifetime_total").is_none());
    }

    #[test]
    fn test_hidden_sort_columns_not_in_output() {
        let (_dir, conn) = test_db();
        let reg = Registry::standard().unwrap();
        let request = ReportRequest::new(2023).sort("birth_date", Some(SortDirection::Asc));
        let out = run_report(&conn, &reg, &request, FiscalYearStart::default()).unwrap();
        assert!(out.columns.iter().all(|c| c.key != "birth_date"));
        assert!(out.sql.contains("contact_birth_date ASC"), "{}", out.sql);
    }
}
