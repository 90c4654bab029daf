use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::RECEIVE_DATE_INDEX;
use crate::error::{ReportError, Result};
use crate::window::WindowKind;

// ---------------------------------------------------------------------------
// Metadata types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Money,
    Int,
    String,
    Date,
}

/// How a table takes part in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRole {
    /// The grouped entity. Exactly one per registry.
    Entity,
    /// One-to-one detail of the entity, left-joined only when referenced.
    Detail,
    /// Never joined; filters become `entity.id IN (subquery)`.
    Membership,
    /// The aggregated fact table. Exactly one per registry.
    Transaction,
}

impl TableRole {
    /// Filters on these tables narrow the entity set and must run before
    /// the prefilter table is materialized.
    pub fn filters_identity(self) -> bool {
        !matches!(self, TableRole::Transaction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnExpr {
    /// Plain `alias.field` reference.
    #[default]
    Field,
    /// `SUM(field)` over rows whose date falls inside the window.
    WindowedSum { window: WindowKind },
    /// `SUM(field)` over every row reachable after grouping.
    Sum,
    /// Distinct non-null values joined with commas.
    GroupConcat,
}

impl ColumnExpr {
    /// Aggregates that add up across groups into a rollup total.
    pub fn is_summable(&self) -> bool {
        matches!(self, ColumnExpr::WindowedSum { .. } | ColumnExpr::Sum)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub key: String,
    #[serde(default)]
    pub table: String,
    /// Physical field; defaults to `key`.
    #[serde(default)]
    pub field: String,
    pub title: String,
    pub kind: DataKind,
    #[serde(default)]
    pub default_visible: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub expr: ColumnExpr,
}

impl ColumnSpec {
    pub fn new(key: &str, title: &str, kind: DataKind) -> Self {
        Self {
            key: key.to_string(),
            table: String::new(),
            field: key.to_string(),
            title: title.to_string(),
            kind,
            default_visible: false,
            required: false,
            expr: ColumnExpr::Field,
        }
    }

    pub fn on(mut self, field: &str) -> Self {
        self.field = field.to_string();
        self
    }

    pub fn default_visible(mut self) -> Self {
        self.default_visible = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn expr(mut self, expr: ColumnExpr) -> Self {
        self.expr = expr;
        self
    }

    /// Result-set alias: `<table>_<key>`.
    pub fn alias(&self) -> String {
        format!("{}_{}", self.table, self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equals,
    Like,
    #[serde(alias = "multi_select")]
    Multiselect,
    DateRange,
    Select,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOption {
    pub value: String,
    pub label: String,
}

/// A filter value as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    /// An empty list means "any" and produces no clause.
    Many(Vec<String>),
    Range {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
    },
}

impl FilterValue {
    pub fn is_any(&self) -> bool {
        matches!(self, FilterValue::Many(v) if v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub key: String,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub field: String,
    pub title: String,
    pub op: FilterOp,
    pub kind: DataKind,
    /// Allowed values; `None` accepts anything.
    #[serde(default)]
    pub options: Option<Vec<FilterOption>>,
    #[serde(default)]
    pub default: Option<FilterValue>,
}

impl FilterSpec {
    pub fn new(key: &str, title: &str, op: FilterOp, kind: DataKind) -> Self {
        Self {
            key: key.to_string(),
            table: String::new(),
            field: key.to_string(),
            title: title.to_string(),
            op,
            kind,
            options: None,
            default: None,
        }
    }

    pub fn options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = Some(
            options
                .iter()
                .map(|(value, label)| FilterOption {
                    value: value.to_string(),
                    label: label.to_string(),
                })
                .collect(),
        );
        self
    }

    pub fn default_value(mut self, value: FilterValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn allows(&self, value: &str) -> bool {
        match &self.options {
            Some(options) => options.iter().any(|o| o.value == value),
            None => true,
        }
    }

    pub fn label_for(&self, value: &str) -> Option<&str> {
        self.options
            .as_ref()?
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A sortable column; `column` names a column key on the same table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBySpec {
    pub key: String,
    #[serde(default)]
    pub table: String,
    pub column: String,
    pub title: String,
    #[serde(default)]
    pub default_order: SortDirection,
}

impl OrderBySpec {
    pub fn new(key: &str, title: &str, default_order: SortDirection) -> Self {
        Self {
            key: key.to_string(),
            table: String::new(),
            column: key.to_string(),
            title: title.to_string(),
            default_order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub key: String,
    /// Physical table name.
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub role: TableRole,
    /// Column holding the entity id (required for every role but Entity).
    #[serde(default)]
    pub entity_key: Option<String>,
    /// Date column the year windows apply to (Transaction only).
    #[serde(default)]
    pub date_field: Option<String>,
    /// Index on `date_field` the direct join may hint at.
    #[serde(default)]
    pub date_index: Option<String>,
    /// Flag column that picks the single joined row of a Detail table.
    #[serde(default)]
    pub primary_flag: Option<String>,
    /// Flag columns that must be 0 for a row to count (Transaction only).
    #[serde(default)]
    pub exclude_flagged: Vec<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub order_bys: Vec<OrderBySpec>,
}

impl TableSpec {
    pub fn new(key: &str, name: &str, alias: &str, role: TableRole) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            alias: Some(alias.to_string()),
            role,
            entity_key: None,
            date_field: None,
            date_index: None,
            primary_flag: None,
            exclude_flagged: Vec::new(),
            columns: Vec::new(),
            filters: Vec::new(),
            order_bys: Vec::new(),
        }
    }

    pub fn entity_key(mut self, field: &str) -> Self {
        self.entity_key = Some(field.to_string());
        self
    }

    pub fn date_field(mut self, field: &str) -> Self {
        self.date_field = Some(field.to_string());
        self
    }

    pub fn date_index(mut self, index: &str) -> Self {
        self.date_index = Some(index.to_string());
        self
    }

    pub fn primary_flag(mut self, field: &str) -> Self {
        self.primary_flag = Some(field.to_string());
        self
    }

    pub fn exclude_flagged(mut self, fields: &[&str]) -> Self {
        self.exclude_flagged = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order_by: OrderBySpec) -> Self {
        self.order_bys.push(order_by);
        self
    }

    pub fn alias(&self) -> Result<&str> {
        match self.alias.as_deref() {
            Some(alias) if !alias.is_empty() => Ok(alias),
            _ => Err(ReportError::Configuration(format!(
                "table '{}' has no alias",
                self.key
            ))),
        }
    }

    /// `alias.field`
    pub fn qualify(&self, field: &str) -> Result<String> {
        Ok(format!("{}.{field}", self.alias()?))
    }

    pub fn column_spec(&self, key: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.key == key)
    }

    pub fn filter_spec(&self, key: &str) -> Option<&FilterSpec> {
        self.filters.iter().find(|f| f.key == key)
    }

    pub fn order_by_spec(&self, key: &str) -> Option<&OrderBySpec> {
        self.order_bys.iter().find(|o| o.key == key)
    }

    /// Fill in owner table keys and default field names.
    fn normalize(&mut self) -> Result<()> {
        let owner = self.key.clone();
        let claim = |table: &mut String, what: &str, key: &str| -> Result<()> {
            if table.is_empty() {
                *table = owner.clone();
                Ok(())
            } else if *table != owner {
                Err(ReportError::Configuration(format!(
                    "{what} '{key}' is registered under '{owner}' but names table '{table}'"
                )))
            } else {
                Ok(())
            }
        };
        for c in &mut self.columns {
            claim(&mut c.table, "column", &c.key)?;
            if c.field.is_empty() {
                c.field = c.key.clone();
            }
        }
        for f in &mut self.filters {
            claim(&mut f.table, "filter", &f.key)?;
            if f.field.is_empty() {
                f.field = f.key.clone();
            }
        }
        for o in &mut self.order_bys {
            claim(&mut o.table, "order-by", &o.key)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid identifier regex"))
}

fn check_identifier(what: &str, value: &str) -> Result<()> {
    if identifier_re().is_match(value) {
        Ok(())
    } else {
        Err(ReportError::Configuration(format!(
            "{what} '{value}' is not a valid SQL identifier"
        )))
    }
}

/// Validated column / filter / order-by metadata, keyed by table.
#[derive(Debug, Clone)]
pub struct Registry {
    tables: Vec<TableSpec>,
    entity: usize,
    transaction: usize,
}

impl Registry {
    pub fn new(mut tables: Vec<TableSpec>) -> Result<Self> {
        for table in &mut tables {
            table.normalize()?;
        }
        let (entity, transaction) = validate(&tables)?;
        Ok(Self { tables, entity, transaction })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let tables: Vec<TableSpec> = serde_json::from_str(json)?;
        Self::new(tables)
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    /// Edit tables after validation, so tests can reach checks the loader
    /// would otherwise catch first.
    #[cfg(test)]
    pub(crate) fn tables_mut(&mut self) -> &mut [TableSpec] {
        &mut self.tables
    }

    pub fn entity(&self) -> &TableSpec {
        &self.tables[self.entity]
    }

    pub fn transaction(&self) -> &TableSpec {
        &self.tables[self.transaction]
    }

    pub fn table(&self, key: &str) -> Result<&TableSpec> {
        self.tables
            .iter()
            .find(|t| t.key == key)
            .ok_or_else(|| ReportError::UnknownField {
                table: key.to_string(),
                key: "*".to_string(),
            })
    }

    pub fn column(&self, table: &str, key: &str) -> Result<(&TableSpec, &ColumnSpec)> {
        let t = self.table(table)?;
        let c = t.column_spec(key).ok_or_else(|| unknown(table, key))?;
        Ok((t, c))
    }

    pub fn filter(&self, table: &str, key: &str) -> Result<(&TableSpec, &FilterSpec)> {
        let t = self.table(table)?;
        let f = t.filter_spec(key).ok_or_else(|| unknown(table, key))?;
        Ok((t, f))
    }

    pub fn order_by(&self, table: &str, key: &str) -> Result<(&TableSpec, &OrderBySpec)> {
        let t = self.table(table)?;
        let o = t.order_by_spec(key).ok_or_else(|| unknown(table, key))?;
        Ok((t, o))
    }

    /// Resolve `table.key`, or a bare key that exists on exactly one table.
    pub fn qualify_column(&self, name: &str) -> Result<(String, String)> {
        self.qualify(name, |t, k| t.column_spec(k).is_some())
    }

    pub fn qualify_filter(&self, name: &str) -> Result<(String, String)> {
        self.qualify(name, |t, k| t.filter_spec(k).is_some())
    }

    pub fn qualify_order_by(&self, name: &str) -> Result<(String, String)> {
        self.qualify(name, |t, k| t.order_by_spec(k).is_some())
    }

    fn qualify(&self, name: &str, has: impl Fn(&TableSpec, &str) -> bool) -> Result<(String, String)> {
        if let Some((table, key)) = name.split_once('.') {
            let t = self.table(table)?;
            return if has(t, key) {
                Ok((table.to_string(), key.to_string()))
            } else {
                Err(unknown(table, key))
            };
        }
        let owners: Vec<&TableSpec> = self.tables.iter().filter(|t| has(t, name)).collect();
        match owners.as_slice() {
            [t] => Ok((t.key.clone(), name.to_string())),
            [] => Err(unknown("*", name)),
            _ => Err(ReportError::Configuration(format!(
                "'{name}' is ambiguous; qualify it as table.{name}"
            ))),
        }
    }

    /// Columns shown when the caller picks none: defaults plus required.
    pub fn default_columns(&self) -> Vec<(&TableSpec, &ColumnSpec)> {
        self.tables
            .iter()
            .flat_map(|t| t.columns.iter().map(move |c| (t, c)))
            .filter(|(_, c)| c.default_visible || c.required)
            .collect()
    }

    pub fn required_columns(&self) -> Vec<(&TableSpec, &ColumnSpec)> {
        self.tables
            .iter()
            .flat_map(|t| t.columns.iter().map(move |c| (t, c)))
            .filter(|(_, c)| c.required)
            .collect()
    }

    /// The windowed total column for `window`.
    pub fn windowed_column(&self, window: WindowKind) -> Option<&ColumnSpec> {
        self.transaction()
            .columns
            .iter()
            .find(|c| c.expr == ColumnExpr::WindowedSum { window })
    }

    pub fn lifetime_column(&self) -> Option<&ColumnSpec> {
        self.transaction().columns.iter().find(|c| c.expr == ColumnExpr::Sum)
    }
}

fn unknown(table: &str, key: &str) -> ReportError {
    ReportError::UnknownField {
        table: table.to_string(),
        key: key.to_string(),
    }
}

fn validate(tables: &[TableSpec]) -> Result<(usize, usize)> {
    let mut keys = HashSet::new();
    let mut aliases = HashSet::new();
    let mut entity = None;
    let mut transaction = None;

    for (i, t) in tables.iter().enumerate() {
        check_identifier("table key", &t.key)?;
        check_identifier("table name", &t.name)?;
        let alias = t.alias()?;
        check_identifier("alias", alias)?;
        if !keys.insert(t.key.as_str()) {
            return Err(ReportError::Configuration(format!("duplicate table '{}'", t.key)));
        }
        if !aliases.insert(alias) {
            return Err(ReportError::Configuration(format!("duplicate alias '{alias}'")));
        }

        match t.role {
            TableRole::Entity => {
                if entity.replace(i).is_some() {
                    return Err(ReportError::Configuration("more than one entity table".into()));
                }
            }
            TableRole::Transaction => {
                if transaction.replace(i).is_some() {
                    return Err(ReportError::Configuration("more than one transaction table".into()));
                }
                match &t.date_field {
                    Some(f) => check_identifier("date field", f)?,
                    None => {
                        return Err(ReportError::Configuration(format!(
                            "transaction table '{}' has no date field",
                            t.key
                        )))
                    }
                }
            }
            TableRole::Detail | TableRole::Membership => {}
        }
        if t.role != TableRole::Entity {
            match &t.entity_key {
                Some(f) => check_identifier("entity key", f)?,
                None => {
                    return Err(ReportError::Configuration(format!(
                        "table '{}' has no entity key",
                        t.key
                    )))
                }
            }
        }
        for f in t.primary_flag.iter().chain(&t.exclude_flagged) {
            check_identifier("flag", f)?;
        }
        if let Some(index) = &t.date_index {
            check_identifier("index", index)?;
        }
        if t.role == TableRole::Membership && !t.columns.is_empty() {
            return Err(ReportError::Configuration(format!(
                "membership table '{}' cannot have columns",
                t.key
            )));
        }

        let mut seen = HashSet::new();
        for c in &t.columns {
            check_identifier("column", &c.key)?;
            check_identifier("field", &c.field)?;
            if !seen.insert(c.key.as_str()) {
                return Err(ReportError::Configuration(format!(
                    "duplicate column '{}.{}'",
                    t.key, c.key
                )));
            }
            if c.expr.is_summable() && t.role != TableRole::Transaction {
                return Err(ReportError::Configuration(format!(
                    "column '{}.{}' sums outside the transaction table",
                    t.key, c.key
                )));
            }
        }
        let mut seen = HashSet::new();
        for f in &t.filters {
            check_identifier("filter", &f.key)?;
            check_identifier("field", &f.field)?;
            if !seen.insert(f.key.as_str()) {
                return Err(ReportError::Configuration(format!(
                    "duplicate filter '{}.{}'",
                    t.key, f.key
                )));
            }
        }
        for o in &t.order_bys {
            if t.column_spec(&o.column).is_none() {
                return Err(unknown(&t.key, &o.column));
            }
        }
    }

    let entity = entity.ok_or_else(|| ReportError::Configuration("no entity table".into()))?;
    let transaction =
        transaction.ok_or_else(|| ReportError::Configuration("no transaction table".into()))?;
    Ok((entity, transaction))
}

// ---------------------------------------------------------------------------
// Standard donor report metadata
// ---------------------------------------------------------------------------

const YES_NO: &[(&str, &str)] = &[("0", "No"), ("1", "Yes")];

impl Registry {
    pub fn standard() -> Result<Self> {
        use DataKind::{Date, Int, Money};
        use FilterOp::*;

        let contact = TableSpec::new("contact", "contacts", "contact", TableRole::Entity)
            .column(ColumnSpec::new("sort_name", "Donor Name", DataKind::String).default_visible())
            .column(ColumnSpec::new("first_name", "First Name", DataKind::String))
            .column(ColumnSpec::new("last_name", "Last Name", DataKind::String))
            .column(ColumnSpec::new("gender", "Gender", DataKind::String))
            .column(ColumnSpec::new("birth_date", "Birth Date", Date))
            .column(ColumnSpec::new("contact_type", "Contact Type", DataKind::String))
            .column(ColumnSpec::new("contact_sub_type", "Contact Subtype", DataKind::String))
            .filter(FilterSpec::new("sort_name", "Donor Name", Like, DataKind::String))
            .filter(FilterSpec::new("id", "Contact ID", Equals, Int))
            .filter(
                FilterSpec::new("gender", "Gender", Multiselect, DataKind::String)
                    .options(&[("Female", "Female"), ("Male", "Male"), ("Other", "Other")]),
            )
            .filter(FilterSpec::new("birth_date", "Birth Date", DateRange, Date))
            .filter(FilterSpec::new("contact_type", "Contact Type", Select, DataKind::String).options(&[
                ("Individual", "Individual"),
                ("Household", "Household"),
                ("Organization", "Organization"),
            ]))
            .filter(
                FilterSpec::new("contact_sub_type", "Contact Subtype", Multiselect, DataKind::String).options(&[
                    ("Student", "Student"),
                    ("Parent", "Parent"),
                    ("Staff", "Staff"),
                    ("Team", "Team"),
                    ("Sponsor", "Sponsor"),
                ]),
            )
            .filter(FilterSpec::new("is_deceased", "Deceased", Select, Int).options(YES_NO))
            .filter(FilterSpec::new("do_not_phone", "Do not phone", Select, Int).options(YES_NO))
            .filter(FilterSpec::new("do_not_email", "Do not email", Select, Int).options(YES_NO))
            .filter(FilterSpec::new("do_not_sms", "Do not SMS", Select, Int).options(YES_NO))
            .filter(FilterSpec::new("do_not_mail", "Do not mail", Select, Int).options(YES_NO))
            .filter(FilterSpec::new("is_opt_out", "No bulk emails", Select, Int).options(YES_NO))
            .order_by(OrderBySpec::new("sort_name", "Last Name, First Name", SortDirection::Asc))
            .order_by(OrderBySpec::new("first_name", "First Name", SortDirection::Asc))
            .order_by(OrderBySpec::new("gender", "Gender", SortDirection::Asc))
            .order_by(OrderBySpec::new("birth_date", "Birth Date", SortDirection::Asc))
            .order_by(OrderBySpec::new("contact_type", "Contact Type", SortDirection::Asc))
            .order_by(OrderBySpec::new("contact_sub_type", "Contact Subtype", SortDirection::Asc));

        let email = TableSpec::new("email", "emails", "email", TableRole::Detail)
            .entity_key("contact_id")
            .primary_flag("is_primary")
            .column(ColumnSpec::new("email", "Email", DataKind::String).default_visible())
            .column(ColumnSpec::new("on_hold", "Email on hold", Int))
            .filter(FilterSpec::new("on_hold", "On Hold", Multiselect, Int).options(&[
                ("0", "No"),
                ("1", "On Hold Bounce"),
                ("2", "On Hold Opt Out"),
            ]));

        let phone = TableSpec::new("phone", "phones", "phone", TableRole::Detail)
            .entity_key("contact_id")
            .primary_flag("is_primary")
            .column(ColumnSpec::new("phone", "Phone", DataKind::String).default_visible());

        let address = TableSpec::new("address", "addresses", "address", TableRole::Detail)
            .entity_key("contact_id")
            .primary_flag("is_primary")
            .column(ColumnSpec::new("street_address", "Street Address", DataKind::String))
            .column(ColumnSpec::new("supplemental_address_1", "Supplementary Address Field 1", DataKind::String))
            .column(ColumnSpec::new("city", "City", DataKind::String))
            .column(ColumnSpec::new("postal_code", "Postal Code", DataKind::String))
            .column(ColumnSpec::new("state_province", "State/Province", DataKind::String))
            .column(ColumnSpec::new("country", "Country", DataKind::String))
            .filter(FilterSpec::new("street_address", "Street Address", Like, DataKind::String))
            .filter(FilterSpec::new("city", "City", Like, DataKind::String))
            .filter(FilterSpec::new("postal_code", "Postal Code", Like, DataKind::String))
            .filter(FilterSpec::new("state_province", "State/Province", Multiselect, DataKind::String))
            .filter(FilterSpec::new("country", "Country", Multiselect, DataKind::String));

        let group = TableSpec::new("group", "group_members", "group_member", TableRole::Membership)
            .entity_key("contact_id")
            .filter(FilterSpec::new("group_id", "Group", Multiselect, Int));

        let tag = TableSpec::new("tag", "entity_tags", "entity_tag", TableRole::Membership)
            .entity_key("contact_id")
            .filter(FilterSpec::new("tag_id", "Tag", Multiselect, Int));

        let contribution =
            TableSpec::new("contribution", "contributions", "contribution", TableRole::Transaction)
                .entity_key("contact_id")
                .date_field("receive_date")
                .date_index(RECEIVE_DATE_INDEX)
                .exclude_flagged(&["is_test", "is_template"])
                .column(ColumnSpec::new("contact_id", "Contact ID", Int).required())
                .column(
                    ColumnSpec::new("current_year_total", "This Year Total", Money)
                        .on("total_amount")
                        .expr(ColumnExpr::WindowedSum { window: WindowKind::Current })
                        .default_visible(),
                )
                .column(
                    ColumnSpec::new("last_year_total", "Last Year Total", Money)
                        .on("total_amount")
                        .expr(ColumnExpr::WindowedSum { window: WindowKind::Prior })
                        .required(),
                )
                .column(
                    ColumnSpec::new("lifetime_total", "Lifetime Total", Money)
                        .on("total_amount")
                        .expr(ColumnExpr::Sum)
                        .required(),
                )
                .column(
                    ColumnSpec::new("payment_instruments", "Payment Methods", DataKind::String)
                        .on("payment_instrument")
                        .expr(ColumnExpr::GroupConcat),
                )
                .filter(FilterSpec::new("financial_type", "Financial Type", Multiselect, DataKind::String).options(&[
                    ("Donation", "Donation"),
                    ("Member Dues", "Member Dues"),
                    ("Event Fee", "Event Fee"),
                    ("Campaign Contribution", "Campaign Contribution"),
                ]))
                .filter(
                    FilterSpec::new("contribution_status", "Contribution Status", Multiselect, DataKind::String)
                        .options(&[
                            ("completed", "Completed"),
                            ("pending", "Pending"),
                            ("cancelled", "Cancelled"),
                            ("failed", "Failed"),
                            ("refunded", "Refunded"),
                        ])
                        .default_value(FilterValue::Many(vec!["completed".to_string()])),
                )
                .filter(
                    FilterSpec::new("payment_instrument", "Payment Method", Multiselect, DataKind::String).options(&[
                        ("Credit Card", "Credit Card"),
                        ("Debit Card", "Debit Card"),
                        ("Cash", "Cash"),
                        ("Check", "Check"),
                        ("EFT", "EFT"),
                    ]),
                )
                .order_by(OrderBySpec::new("current_year_total", "Total amount this year", SortDirection::Desc))
                .order_by(OrderBySpec::new("last_year_total", "Total amount last year", SortDirection::Desc))
                .order_by(OrderBySpec::new("lifetime_total", "Lifetime total", SortDirection::Desc));

        Registry::new(vec![contact, email, phone, address, group, tag, contribution])
    }
}
