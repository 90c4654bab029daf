use std::collections::BTreeSet;

use chrono::NaiveDate;
use rusqlite::types::Value;

use crate::error::{ReportError, Result};
use crate::registry::{
    ColumnExpr, ColumnSpec, DataKind, FilterOp, FilterSpec, FilterValue, Registry, SortDirection,
    TableRole, TableSpec,
};
use crate::report::{EntitySelection, Page, ReportRequest};
use crate::sql::Fragment;
use crate::window::{WindowKind, YearWindows};

/// Alias of the prefilter table inside report queries.
const RESTRICTED: &str = "restricted_contacts";

// ---------------------------------------------------------------------------
// Resolved plan
// ---------------------------------------------------------------------------

/// A registry column picked for the result set.
#[derive(Debug, Clone)]
pub struct SelectedColumn<'r> {
    pub table: &'r TableSpec,
    pub spec: &'r ColumnSpec,
    pub title: String,
    /// False for columns pulled in only so the outer query can sort on them.
    pub display: bool,
}

impl SelectedColumn<'_> {
    pub fn alias(&self) -> String {
        self.spec.alias()
    }
}

#[derive(Debug, Clone)]
struct BoundFilter<'r> {
    table: &'r TableSpec,
    spec: &'r FilterSpec,
    value: FilterValue,
}

/// Everything the two query phases read. Built once per run, never mutated.
#[derive(Debug)]
pub struct Plan<'r> {
    registry: &'r Registry,
    windows: YearWindows,
    selection: EntitySelection,
    filters: Vec<BoundFilter<'r>>,
    columns: Vec<SelectedColumn<'r>>,
    sorts: Vec<(String, SortDirection)>,
    entity_alias: String,
    anchor_alias: String,
    rollup: bool,
    page: Option<Page>,
}

impl<'r> Plan<'r> {
    pub fn resolve(registry: &'r Registry, request: &ReportRequest, windows: YearWindows) -> Result<Self> {
        let filters = bind_filters(registry, request)?;
        let mut columns = select_columns(registry, request, &windows)?;

        let txn = registry.transaction();
        let entity_key = entity_key(txn)?;
        let entity_col = txn
            .columns
            .iter()
            .find(|c| c.expr == ColumnExpr::Field && c.field == entity_key)
            .ok_or_else(|| {
                ReportError::Configuration(format!(
                    "transaction table '{}' has no column for '{entity_key}'",
                    txn.key
                ))
            })?;
        ensure_selected(&mut columns, txn, entity_col, &windows);

        let anchor = request.selection.anchor();
        let anchor_col = registry.windowed_column(anchor).ok_or_else(|| {
            ReportError::Configuration(format!("no windowed total registered for {anchor:?} window"))
        })?;
        ensure_selected(&mut columns, txn, anchor_col, &windows);

        let mut sorts = Vec::new();
        for (name, direction) in &request.sorts {
            let (table, key) = registry.qualify_order_by(name)?;
            let (t, order) = registry.order_by(&table, &key)?;
            let column = t
                .column_spec(&order.column)
                .ok_or_else(|| ReportError::UnknownField { table: table.clone(), key: order.column.clone() })?;
            ensure_selected(&mut columns, t, column, &windows);
            sorts.push((column.alias(), direction.unwrap_or(order.default_order)));
        }
        if sorts.is_empty() {
            sorts.push((anchor_col.alias(), SortDirection::Desc));
        }

        Ok(Self {
            registry,
            windows,
            selection: request.selection,
            filters,
            columns,
            sorts,
            entity_alias: entity_col.alias(),
            anchor_alias: anchor_col.alias(),
            rollup: request.rollup,
            page: request.page,
        })
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn windows(&self) -> &YearWindows {
        &self.windows
    }

    pub fn columns(&self) -> &[SelectedColumn<'r>] {
        &self.columns
    }

    /// Alias of the grouped entity id; NULL only on the rollup row.
    pub fn entity_alias(&self) -> &str {
        &self.entity_alias
    }

    pub fn anchor_alias(&self) -> &str {
        &self.anchor_alias
    }

    fn has_membership_filter(&self) -> bool {
        self.filters.iter().any(|f| f.table.role == TableRole::Membership)
    }
}

fn entity_key(table: &TableSpec) -> Result<&str> {
    table.entity_key.as_deref().ok_or_else(|| {
        ReportError::Configuration(format!("table '{}' has no entity key", table.key))
    })
}

fn date_field(table: &TableSpec) -> Result<&str> {
    table.date_field.as_deref().ok_or_else(|| {
        ReportError::Configuration(format!("table '{}' has no date field", table.key))
    })
}

fn column_title(spec: &ColumnSpec, windows: &YearWindows) -> String {
    match spec.expr {
        ColumnExpr::WindowedSum { window } => windows.title(window),
        _ => spec.title.clone(),
    }
}

fn ensure_selected<'r>(
    columns: &mut Vec<SelectedColumn<'r>>,
    table: &'r TableSpec,
    spec: &'r ColumnSpec,
    windows: &YearWindows,
) {
    if columns.iter().any(|c| c.table.key == table.key && c.spec.key == spec.key) {
        return;
    }
    columns.push(SelectedColumn {
        table,
        spec,
        title: column_title(spec, windows),
        display: false,
    });
}

fn select_columns<'r>(
    registry: &'r Registry,
    request: &ReportRequest,
    windows: &YearWindows,
) -> Result<Vec<SelectedColumn<'r>>> {
    let picked: Vec<(&TableSpec, &ColumnSpec)> = if request.columns.is_empty() {
        registry.default_columns()
    } else {
        let mut picked = registry.required_columns();
        for name in &request.columns {
            let (table, key) = registry.qualify_column(name)?;
            let (t, c) = registry.column(&table, &key)?;
            if !picked.iter().any(|(pt, pc)| pt.key == t.key && pc.key == c.key) {
                picked.push((t, c));
            }
        }
        picked
    };

    let mut columns = Vec::with_capacity(picked.len());
    for (table, spec) in picked {
        if table.role == TableRole::Membership {
            return Err(ReportError::Configuration(format!(
                "column '{}.{}' is on a membership table",
                table.key, spec.key
            )));
        }
        columns.push(SelectedColumn {
            table,
            spec,
            title: column_title(spec, windows),
            display: true,
        });
    }
    Ok(columns)
}

/// Merge request filters over registry defaults and validate every value.
fn bind_filters<'r>(registry: &'r Registry, request: &ReportRequest) -> Result<Vec<BoundFilter<'r>>> {
    let mut explicit = Vec::new();
    for (name, value) in &request.filters {
        let (table, key) = registry.qualify_filter(name)?;
        explicit.push((table, key, value.clone()));
    }

    let mut bound = Vec::new();
    for table in registry.tables() {
        for spec in &table.filters {
            let value = explicit
                .iter()
                .rev()
                .find(|(t, k, _)| *t == table.key && *k == spec.key)
                .map(|(_, _, v)| v.clone())
                .or_else(|| spec.default.clone());
            let Some(value) = value else { continue };
            if value.is_any() {
                continue;
            }
            validate_value(spec, &value)?;
            bound.push(BoundFilter { table, spec, value });
        }
    }
    Ok(bound)
}

fn invalid(spec: &FilterSpec, value: &str) -> ReportError {
    ReportError::InvalidFilterValue {
        filter: format!("{}.{}", spec.table, spec.key),
        value: value.to_string(),
    }
}

fn validate_value(spec: &FilterSpec, value: &FilterValue) -> Result<()> {
    match (spec.op, value) {
        (FilterOp::Equals | FilterOp::Like | FilterOp::Select, FilterValue::One(v)) => {
            if spec.op == FilterOp::Select && !spec.allows(v) {
                return Err(invalid(spec, v));
            }
            bind_scalar(spec, v).map(|_| ())
        }
        (FilterOp::Multiselect, FilterValue::One(v)) => {
            if !spec.allows(v) {
                return Err(invalid(spec, v));
            }
            bind_scalar(spec, v).map(|_| ())
        }
        (FilterOp::Multiselect, FilterValue::Many(values)) => {
            for v in values {
                if !spec.allows(v) {
                    return Err(invalid(spec, v));
                }
                bind_scalar(spec, v)?;
            }
            Ok(())
        }
        (FilterOp::DateRange, FilterValue::Range { from, to }) => {
            if from.is_none() && to.is_none() {
                return Err(invalid(spec, "empty range"));
            }
            for d in from.iter().chain(to.iter()) {
                NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|_| invalid(spec, d))?;
            }
            Ok(())
        }
        (_, other) => Err(invalid(spec, &format!("{other:?}"))),
    }
}

fn bind_scalar(spec: &FilterSpec, raw: &str) -> Result<Value> {
    match spec.kind {
        DataKind::Int => raw.trim().parse::<i64>().map(Value::Integer).map_err(|_| invalid(spec, raw)),
        DataKind::Money => raw.trim().parse::<f64>().map(Value::Real).map_err(|_| invalid(spec, raw)),
        DataKind::String | DataKind::Date => Ok(Value::Text(raw.to_string())),
    }
}

// ---------------------------------------------------------------------------
// WHERE
// ---------------------------------------------------------------------------

/// Tables outside the base join that a fragment needs left-joined.
type Needs = BTreeSet<String>;

fn filter_clause(entity: &TableSpec, f: &BoundFilter<'_>) -> Result<Fragment> {
    let column = f.table.qualify(&f.spec.field)?;
    let clause = match (&f.value, f.spec.op) {
        (FilterValue::One(v), FilterOp::Like) => {
            Fragment::with_params(format!("{column} LIKE ?"), vec![Value::Text(format!("%{v}%"))])
        }
        (FilterValue::One(v), FilterOp::Multiselect) => {
            Fragment::with_params(format!("{column} IN (?)"), vec![bind_scalar(f.spec, v)?])
        }
        (FilterValue::One(v), _) => {
            Fragment::with_params(format!("{column} = ?"), vec![bind_scalar(f.spec, v)?])
        }
        (FilterValue::Many(values), _) => {
            let params = values
                .iter()
                .map(|v| bind_scalar(f.spec, v))
                .collect::<Result<Vec<_>>>()?;
            let marks = vec!["?"; params.len()].join(", ");
            Fragment::with_params(format!("{column} IN ({marks})"), params)
        }
        (FilterValue::Range { from, to }, _) => {
            let mut parts = Vec::new();
            if let Some(from) = from {
                parts.push(Fragment::with_params(format!("{column} >= ?"), vec![Value::Text(from.clone())]));
            }
            if let Some(to) = to {
                parts.push(Fragment::with_params(format!("{column} <= ?"), vec![Value::Text(to.clone())]));
            }
            Fragment::join(&parts, " AND ")
        }
    };

    if f.table.role == TableRole::Membership {
        let member_key = f.table.qualify(entity_key(f.table)?)?;
        let head = format!(
            "{} IN (SELECT {member_key} FROM {} {} WHERE ",
            entity.qualify("id")?,
            f.table.name,
            f.table.alias()?
        );
        return Ok(clause.wrap(&head, ")"));
    }
    Ok(clause)
}

/// Entities with a live transaction inside `window` are excluded.
fn exclusion_clause(plan: &Plan<'_>, window: WindowKind) -> Result<Fragment> {
    let entity = plan.registry.entity();
    let txn = plan.registry.transaction();
    let alias = "txn_exclude";
    let mut conditions = vec![plan.windows.get(window).between(&format!("{alias}.{}", date_field(txn)?))];
    conditions.extend(txn.exclude_flagged.iter().map(|f| format!("{alias}.{f} = 0")));
    Ok(Fragment::new(format!(
        "{} NOT IN (SELECT {alias}.{} FROM {} {alias} WHERE {})",
        entity.qualify("id")?,
        entity_key(txn)?,
        txn.name,
        conditions.join(" AND ")
    )))
}

/// WHERE for one phase. Identity filters (entity, detail, membership tables
/// and the selection exclusion) only apply while the entity set is still
/// being decided.
fn where_fragment(plan: &Plan<'_>, identity: bool) -> Result<(Fragment, Needs)> {
    let entity = plan.registry.entity();
    let mut clauses = Vec::new();
    let mut needs = Needs::new();
    for f in &plan.filters {
        if f.table.role.filters_identity() && !identity {
            continue;
        }
        if f.table.role == TableRole::Detail {
            needs.insert(f.table.key.clone());
        }
        clauses.push(filter_clause(entity, f)?);
    }
    if identity {
        if let Some(window) = plan.selection.excluded() {
            clauses.push(exclusion_clause(plan, window)?);
        }
    }
    if clauses.is_empty() {
        return Ok((Fragment::default(), needs));
    }
    Ok((Fragment::join(&clauses, " AND ").wrap("WHERE ", ""), needs))
}

// ---------------------------------------------------------------------------
// SELECT
// ---------------------------------------------------------------------------

/// SQL expression for a registry column, aggregated where the column says so.
pub fn column_expr(windows: &YearWindows, table: &TableSpec, spec: &ColumnSpec) -> Result<String> {
    let field = table.qualify(&spec.field)?;
    Ok(match spec.expr {
        ColumnExpr::Field => field,
        ColumnExpr::Sum => format!("SUM({field})"),
        ColumnExpr::GroupConcat => format!("GROUP_CONCAT(DISTINCT {field})"),
        ColumnExpr::WindowedSum { window } => {
            let date = table.qualify(date_field(table)?)?;
            format!(
                "SUM(CASE WHEN {} THEN {field} ELSE 0 END)",
                windows.get(window).between(&date)
            )
        }
    })
}

fn select_fragment(plan: &Plan<'_>) -> Result<(Fragment, Needs)> {
    let mut items = Vec::with_capacity(plan.columns.len());
    let mut needs = Needs::new();
    for column in &plan.columns {
        if column.table.role == TableRole::Detail {
            needs.insert(column.table.key.clone());
        }
        items.push(format!(
            "{} AS {}",
            column_expr(&plan.windows, column.table, column.spec)?,
            column.alias()
        ));
    }
    Ok((Fragment::new(format!("SELECT {}", items.join(", "))), needs))
}

// ---------------------------------------------------------------------------
// FROM
// ---------------------------------------------------------------------------

/// Where the report's entity set comes from.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    /// Join through a materialized prefilter table of entity ids.
    Prefiltered { table: &'a str },
    /// Join entity to transactions directly, windowed inline.
    Direct,
}

fn live_conditions(txn: &TableSpec) -> Result<Vec<String>> {
    txn.exclude_flagged
        .iter()
        .map(|f| Ok(format!("{} = 0", txn.qualify(f)?)))
        .collect()
}

fn detail_joins(plan: &Plan<'_>, needs: &Needs) -> Result<String> {
    let entity = plan.registry.entity();
    let mut joins = String::new();
    for table in plan.registry.tables() {
        if table.role != TableRole::Detail || !needs.contains(&table.key) {
            continue;
        }
        let alias = table.alias()?;
        joins.push_str(&format!(
            " LEFT JOIN {} {alias} ON {alias}.{} = {}",
            table.name,
            entity_key(table)?,
            entity.qualify("id")?
        ));
        if let Some(flag) = &table.primary_flag {
            joins.push_str(&format!(" AND {alias}.{flag} = 1"));
        }
    }
    Ok(joins)
}

fn from_fragment(plan: &Plan<'_>, source: Source<'_>, needs: &Needs) -> Result<Fragment> {
    let entity = plan.registry.entity();
    let txn = plan.registry.transaction();
    let (e_alias, t_alias) = (entity.alias()?, txn.alias()?);
    let t_key = txn.qualify(entity_key(txn)?)?;
    let mut live = live_conditions(txn)?;

    let base = match source {
        Source::Prefiltered { table } => {
            let mut on = vec![format!("{RESTRICTED}.cid = {t_key}")];
            on.append(&mut live);
            format!(
                "FROM {} {t_alias} INNER JOIN {table} {RESTRICTED} ON {} INNER JOIN {} {e_alias} ON {RESTRICTED}.cid = {}",
                txn.name,
                on.join(" AND "),
                entity.name,
                entity.qualify("id")?
            )
        }
        Source::Direct => {
            // A membership pre-filter is the better primary filter; the
            // index hint would block it.
            let hint = match (&txn.date_index, plan.has_membership_filter()) {
                (Some(index), false) => format!(" INDEXED BY {index}"),
                _ => String::new(),
            };
            let mut on = vec![format!("{t_key} = {}", entity.qualify("id")?)];
            on.append(&mut live);
            let date = txn.qualify(date_field(txn)?)?;
            on.push(plan.windows.get(plan.selection.anchor()).between(&date));
            format!(
                "FROM {} {e_alias} INNER JOIN {} {t_alias}{hint} ON {}",
                entity.name,
                txn.name,
                on.join(" AND ")
            )
        }
    };
    Ok(Fragment::new(format!("{base}{}", detail_joins(plan, needs)?)))
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Phase 1: the query whose distinct entity ids seed the prefilter table.
pub fn prefilter_query(plan: &Plan<'_>) -> Result<Fragment> {
    let entity_id = plan.registry.entity().qualify("id")?;
    let (where_clause, needs) = where_fragment(plan, true)?;
    let from = from_fragment(plan, Source::Direct, &needs)?;
    let head = Fragment::new(format!("SELECT DISTINCT {entity_id} AS cid"));
    let group = Fragment::new(format!("GROUP BY {entity_id}"));
    Ok(Fragment::join([&head, &from, &where_clause, &group], " "))
}

/// The assembled main query and its parts.
#[derive(Debug, Clone)]
pub struct ReportQuery {
    pub select: Fragment,
    pub from: Fragment,
    pub where_clause: Fragment,
    pub group_by: Fragment,
    pub order_by: Fragment,
    pub limit: Fragment,
    /// Rollup branch, when requested.
    pub rollup: Option<Fragment>,
}

impl ReportQuery {
    /// SELECT .. FROM .. WHERE .. GROUP BY, one row per entity.
    pub fn grouped(&self) -> Fragment {
        Fragment::join([&self.select, &self.from, &self.where_clause, &self.group_by], " ")
    }

    /// The grouped query wrapped so ORDER BY applies after grouping.
    pub fn sql(&self) -> Fragment {
        let inner = self.grouped().wrap("SELECT * FROM (", ") AS inner_query");
        match &self.rollup {
            None => Fragment::join([&inner, &self.order_by, &self.limit], " "),
            Some(rollup) => {
                let rows = if self.limit.is_empty() {
                    inner
                } else {
                    Fragment::join([&inner, &self.order_by, &self.limit], " ")
                        .wrap("SELECT * FROM (", ") AS page")
                };
                Fragment::join([&rows, rollup], " UNION ALL ")
                    .wrap("SELECT * FROM (", ") AS report")
                    .then(&self.order_by)
            }
        }
    }
}

/// `ORDER BY` for the outer query: rollup row last, then rows with no
/// anchor total, then the requested keys.
pub fn order_fragment(entity_alias: &str, anchor_alias: &str, sorts: &[(String, SortDirection)]) -> Fragment {
    let mut keys = vec![
        format!("({entity_alias} IS NULL)"),
        format!("({anchor_alias} IS NULL)"),
    ];
    keys.extend(sorts.iter().map(|(alias, dir)| format!("{alias} {}", dir.sql())));
    Fragment::new(format!("ORDER BY {}", keys.join(", ")))
}

fn rollup_fragment(plan: &Plan<'_>, grouped: &Fragment) -> Fragment {
    let items: Vec<String> = plan
        .columns
        .iter()
        .map(|c| {
            let alias = c.alias();
            if c.spec.expr.is_summable() {
                format!("SUM({alias}) AS {alias}")
            } else {
                format!("NULL AS {alias}")
            }
        })
        .collect();
    grouped.wrap(&format!("SELECT {} FROM (", items.join(", ")), ") AS rollup_query")
}

/// Phase 2: the report query proper. WHERE and SELECT are built before FROM
/// so FROM only joins the optional tables they reference.
pub fn main_query(plan: &Plan<'_>, source: Source<'_>) -> Result<ReportQuery> {
    let identity = matches!(source, Source::Direct);
    let (where_clause, mut needs) = where_fragment(plan, identity)?;
    let (select, select_needs) = select_fragment(plan)?;
    needs.extend(select_needs);
    let from = from_fragment(plan, source, &needs)?;

    let txn = plan.registry.transaction();
    let group_by = Fragment::new(format!("GROUP BY {}", txn.qualify(entity_key(txn)?)?));
    let order_by = order_fragment(&plan.entity_alias, &plan.anchor_alias, &plan.sorts);
    let limit = match plan.page {
        Some(page) => Fragment::new(format!("LIMIT {} OFFSET {}", page.rows, page.offset)),
        None => Fragment::default(),
    };

    let mut query = ReportQuery {
        select,
        from,
        where_clause,
        group_by,
        order_by,
        limit,
        rollup: None,
    };
    if plan.rollup {
        query.rollup = Some(rollup_fragment(plan, &query.grouped()));
    }
    Ok(query)
}
