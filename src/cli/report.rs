use chrono::{Datelike, Local};
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::chart::{render_text, ChartData, ChartKind};
use crate::cli::ReportArgs;
use crate::db::get_connection;
use crate::error::{ReportError, Result};
use crate::fmt::currency;
use crate::registry::{DataKind, FilterValue, Registry, SortDirection};
use crate::report::{run_report, EntitySelection, OutputColumn, ReportOutput, ReportRequest};
use crate::settings::load_settings;
use crate::sql::Row;
use crate::statistics::StatValue;
use crate::window::{WindowKind, YearMode};

/// `name=value`, `name=a,b`, `name=FROM..TO` or `name=` (clears a default).
pub(crate) fn parse_filter(raw: &str) -> Result<(String, FilterValue)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| ReportError::Other(format!("filter '{raw}' must look like name=value")))?;
    let value = value.trim();
    let parsed = if value.is_empty() {
        FilterValue::Many(Vec::new())
    } else if let Some((from, to)) = value.split_once("..") {
        let side = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
        FilterValue::Range { from: side(from), to: side(to) }
    } else if value.contains(',') {
        FilterValue::Many(value.split(',').map(|v| v.trim().to_string()).collect())
    } else {
        FilterValue::One(value.to_string())
    };
    Ok((name.trim().to_string(), parsed))
}

/// `name`, `name:asc` or `name:desc`.
pub(crate) fn parse_sort(raw: &str) -> Result<(String, Option<SortDirection>)> {
    match raw.rsplit_once(':') {
        None => Ok((raw.trim().to_string(), None)),
        Some((name, dir)) => {
            let direction = match dir.trim().to_ascii_lowercase().as_str() {
                "asc" => SortDirection::Asc,
                "desc" => SortDirection::Desc,
                other => return Err(ReportError::Other(format!("unknown sort direction '{other}'"))),
            };
            Ok((name.trim().to_string(), Some(direction)))
        }
    }
}

pub(crate) fn build_request(args: &ReportArgs, selection: EntitySelection, year: i32) -> Result<ReportRequest> {
    let mut request = ReportRequest::new(args.year.unwrap_or(year))
        .selection(selection)
        .mode(YearMode::parse(&args.mode));
    for column in &args.columns {
        request = request.column(column);
    }
    for raw in &args.filters {
        let (name, value) = parse_filter(raw)?;
        request = request.filter(&name, value);
    }
    for raw in &args.sorts {
        let (name, direction) = parse_sort(raw)?;
        request = request.sort(&name, direction);
    }
    // Charts plot totals over every matching row, so charted runs are never paged.
    match (args.limit, args.chart) {
        (Some(rows), ChartKind::None) => request = request.page(rows, args.offset),
        (Some(_), _) => tracing::warn!(target: "lybunt::report", "--limit is ignored when a chart is drawn"),
        (None, _) => {}
    }
    if args.no_rollup {
        request = request.without_rollup();
    }
    if args.direct {
        request = request.direct();
    }
    Ok(request)
}

fn load_registry(path: Option<&str>) -> Result<Registry> {
    match path {
        Some(path) => Registry::from_json(&std::fs::read_to_string(path)?),
        None => Registry::standard(),
    }
}

/// `Title: label, label` for each filter the caller set.
fn describe_filters(registry: &Registry, request: &ReportRequest) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for (name, value) in &request.filters {
        let (table, key) = registry.qualify_filter(name)?;
        let (_, spec) = registry.filter(&table, &key)?;
        let label = |v: &String| spec.label_for(v).unwrap_or(v).to_string();
        let shown = match value {
            FilterValue::One(v) => label(v),
            FilterValue::Many(values) if values.is_empty() => "any".to_string(),
            FilterValue::Many(values) => values.iter().map(label).collect::<Vec<_>>().join(", "),
            FilterValue::Range { from, to } => format!(
                "{} to {}",
                from.as_deref().unwrap_or("..."),
                to.as_deref().unwrap_or("...")
            ),
        };
        lines.push(format!("{}: {shown}", spec.title));
    }
    Ok(lines)
}

fn cell_text(column: &OutputColumn, row: &Row, code: &str) -> String {
    if row.is_null(&column.alias) {
        return String::new();
    }
    match column.kind {
        DataKind::Money => row.f64(&column.alias).map(|v| currency(v, code)).unwrap_or_default(),
        DataKind::Int if column.key == "on_hold" => match row.i64(&column.alias) {
            Some(0) | None => String::new(),
            Some(_) => "Yes".to_string(),
        },
        _ => row.text(&column.alias),
    }
}

fn render_table(output: &ReportOutput, code: &str) -> Table {
    let mut table = Table::new();
    table.set_header(output.columns.iter().map(|c| c.title.clone()).collect::<Vec<_>>());
    for row in &output.rows {
        table.add_row(output.columns.iter().map(|c| Cell::new(cell_text(c, row, code))).collect::<Vec<_>>());
    }
    if let Some(rollup) = &output.rollup {
        let cells: Vec<Cell> = output
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| match (i, c.kind) {
                (_, DataKind::Money) => Cell::new(cell_text(c, rollup, code).bold()),
                (0, _) => Cell::new("Total".bold()),
                _ => Cell::new(""),
            })
            .collect();
        table.add_row(cells);
    }
    table
}

fn render_statistics(output: &ReportOutput, code: &str) -> Table {
    let mut table = Table::new();
    for stat in &output.statistics.entries {
        let value = match stat.value {
            StatValue::Count(n) => n.to_string(),
            StatValue::Money(v) => currency(v, code),
        };
        table.add_row(vec![Cell::new(&stat.title), Cell::new(value)]);
    }
    table
}

fn write_csv(path: &str, output: &ReportOutput) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(output.columns.iter().map(|c| c.title.as_str()))?;
    for row in &output.rows {
        let record: Vec<String> = output
            .columns
            .iter()
            .map(|c| match c.kind {
                DataKind::Money => row.f64(&c.alias).map(|v| format!("{v:.2}")).unwrap_or_default(),
                _ => row.text(&c.alias),
            })
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn run(args: ReportArgs, selection: EntitySelection) -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(ReportError::Other("No database found. Run `lybunt init` first.".into()));
    }
    let conn = get_connection(&db_path)?;
    let registry = load_registry(args.registry.as_deref())?;
    let request = build_request(&args, selection, Local::now().date_naive().year())?;
    let output = run_report(&conn, &registry, &request, settings.fiscal_start()?)?;
    let code = settings.default_currency.as_str();

    let heading = match selection {
        EntitySelection::Lapsed => format!(
            "Gave in {} but not in {}",
            output.windows.label(WindowKind::Prior),
            output.windows.label(WindowKind::Current)
        ),
        EntitySelection::ActiveIn(window) => format!("Gave in {}", output.windows.label(window)),
    };
    println!("{}", heading.bold());
    for line in describe_filters(&registry, &request)? {
        println!("  {}", line.dimmed());
    }

    if args.show_sql {
        if let Some(n) = output.prefiltered {
            println!("{}", format!("-- {n} entities in the prefilter table").dimmed());
        }
        println!("{}", output.sql.dimmed());
    }

    if output.rows.is_empty() {
        println!("No matching donors.");
    } else {
        println!("{}", render_table(&output, code));
    }
    println!("{}", render_statistics(&output, code));

    if args.chart != ChartKind::None {
        if let Some(chart) = ChartData::from_output(&output, code) {
            print!("{}", render_text(args.chart, &chart, code));
        }
    }

    if let Some(path) = &args.csv {
        write_csv(path, &output)?;
        println!("Wrote {} rows to {path}", output.rows.len());
    }
    Ok(())
}
