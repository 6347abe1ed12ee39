//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from entity descriptors.
//! Rows come back as one `row_to_json` column named "row"; writes return the key as "key".

use crate::config::{ColumnInfo, EntityDescriptor, ScalarType};
use crate::sql::params::{bind_text, pg_type};
use crate::store::{AttributeSet, Direction, Predicate};
use serde_json::Value;

const MAIN_ALIAS: &str = "main";

/// One eager relationship loaded in the same statement as a scalar subquery.
pub struct Include<'a> {
    pub name: &'a str,
    pub many: bool,
    pub target: &'a EntityDescriptor,
    /// Column on `main` joined against `their_key` on the target.
    pub our_key: &'a str,
    pub their_key: &'a str,
    /// Eager includes of `target`, embedded in each included row.
    pub nested: Vec<Include<'a>>,
}

/// Logical query over one table.
pub struct Select<'a> {
    pub entity: &'a EntityDescriptor,
    pub predicates: &'a [Predicate],
    pub order: &'a [(String, Direction)],
    pub limit: Option<u64>,
    pub offset: u64,
    pub includes: &'a [Include<'a>],
}

/// Quote identifier for PostgreSQL (safe: only from declarations).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Option<String>>,
}

impl QueryBuf {
    /// Bind a value and return its cast placeholder, e.g. `$2::bigint`.
    fn push_param(&mut self, t: ScalarType, v: &Value) -> String {
        self.params.push(bind_text(t, v));
        format!("${}::{}", self.params.len(), pg_type(t))
    }
}

fn column_type(entity: &EntityDescriptor, column: &str) -> ScalarType {
    entity.column(column).map(|c| c.type_).unwrap_or(ScalarType::Text)
}

/// Column list for a table, optionally qualified, including computed expressions.
fn select_column_list(entity: &EntityDescriptor, alias: Option<&str>) -> String {
    let prefix = alias.map(|a| format!("{}.", a)).unwrap_or_default();
    let columns = entity
        .columns
        .iter()
        .map(|c| format!("{}{} AS {}", prefix, quoted(&c.name), quoted(&c.name)));
    let computed = entity
        .computed
        .iter()
        .filter_map(|c| c.sql.as_ref().map(|expr| format!("({}) AS {}", expr, quoted(&c.name))));
    columns.chain(computed).collect::<Vec<_>>().join(", ")
}

/// Scalar subquery for one include joined to `parent`. Each nesting level gets its own aliases.
fn include_subquery(inc: &Include<'_>, parent: &str, level: usize) -> String {
    let alias = format!("i{}", level);
    let wrapper = format!("s{}", level);
    let mut cols = vec![select_column_list(inc.target, Some(&alias))];
    for nested in &inc.nested {
        cols.push(format!(
            "{} AS {}",
            include_subquery(nested, &alias, level + 1),
            quoted(nested.name)
        ));
    }
    let sub_from = format!(
        "{} {} WHERE {}.{} = {}.{}",
        quoted(&inc.target.path_segment),
        alias,
        alias,
        quoted(inc.their_key),
        parent,
        quoted(inc.our_key)
    );
    if inc.many {
        let order = inc
            .target
            .pk_columns
            .iter()
            .map(|c| format!("{}.{}", alias, quoted(c)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "(SELECT COALESCE(json_agg(row_to_json({w})), '[]'::json) FROM (SELECT {} FROM {} ORDER BY {}) {w})",
            cols.join(", "),
            sub_from,
            order,
            w = wrapper
        )
    } else {
        format!(
            "(SELECT row_to_json({w}) FROM (SELECT {} FROM {} LIMIT 1) {w})",
            cols.join(", "),
            sub_from,
            w = wrapper
        )
    }
}

fn where_clause(q: &mut QueryBuf, entity: &EntityDescriptor, predicates: &[Predicate]) -> String {
    let mut parts = Vec::new();
    for p in predicates {
        match p {
            Predicate::Eq { column, value } => {
                let col = format!("{}.{}", MAIN_ALIAS, quoted(column));
                if value.is_null() {
                    parts.push(format!("{} IS NULL", col));
                } else {
                    let ph = q.push_param(column_type(entity, column), value);
                    parts.push(format!("{} = {}", col, ph));
                }
            }
            Predicate::NotIn { column, values } => {
                if values.is_empty() {
                    continue;
                }
                let t = column_type(entity, column);
                let placeholders: Vec<String> = values.iter().map(|v| q.push_param(t, v)).collect();
                parts.push(format!(
                    "{}.{} NOT IN ({})",
                    MAIN_ALIAS,
                    quoted(column),
                    placeholders.join(", ")
                ));
            }
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// ORDER BY the requested columns, then the primary key so pages are deterministic.
fn order_clause(entity: &EntityDescriptor, order: &[(String, Direction)]) -> String {
    let mut parts: Vec<String> = order
        .iter()
        .map(|(c, d)| {
            let dir = match d {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            format!("{}.{} {}", MAIN_ALIAS, quoted(c), dir)
        })
        .collect();
    for pk in &entity.pk_columns {
        if !order.iter().any(|(c, _)| c == pk) {
            parts.push(format!("{}.{} ASC", MAIN_ALIAS, quoted(pk)));
        }
    }
    format!(" ORDER BY {}", parts.join(", "))
}

fn window_clause(limit: Option<u64>, offset: u64) -> String {
    let limit = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset = if offset > 0 { format!(" OFFSET {}", offset) } else { String::new() };
    format!("{}{}", limit, offset)
}

/// SELECT rows (with eager includes) as `row_to_json` objects.
pub fn select(spec: &Select<'_>) -> QueryBuf {
    let mut q = QueryBuf::default();
    let mut select_parts = vec![select_column_list(spec.entity, Some(MAIN_ALIAS))];
    for inc in spec.includes {
        select_parts.push(format!("{} AS {}", include_subquery(inc, MAIN_ALIAS, 1), quoted(inc.name)));
    }
    let where_sql = where_clause(&mut q, spec.entity, spec.predicates);
    q.sql = format!(
        "SELECT row_to_json(t) AS \"row\" FROM (SELECT {} FROM {} {}{}{}{}) t",
        select_parts.join(", "),
        quoted(&spec.entity.path_segment),
        MAIN_ALIAS,
        where_sql,
        order_clause(spec.entity, spec.order),
        window_clause(spec.limit, spec.offset)
    );
    q
}

/// COUNT(*) over the same filtered, windowed rows `select` would return.
pub fn count(spec: &Select<'_>) -> QueryBuf {
    let mut q = QueryBuf::default();
    let where_sql = where_clause(&mut q, spec.entity, spec.predicates);
    q.sql = format!(
        "SELECT COUNT(*) AS \"count\" FROM (SELECT 1 FROM {} {}{}{}{}) t",
        quoted(&spec.entity.path_segment),
        MAIN_ALIAS,
        where_sql,
        order_clause(spec.entity, spec.order),
        window_clause(spec.limit, spec.offset)
    );
    q
}

/// `json_build_object('id', "id", ...)` over the primary key columns.
fn key_object(entity: &EntityDescriptor) -> String {
    let pairs = entity
        .pk_columns
        .iter()
        .map(|c| format!("{}, {}", literal(c), quoted(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("json_build_object({}) AS \"key\"", pairs)
}

fn key_condition(q: &mut QueryBuf, entity: &EntityDescriptor, key: &[Value]) -> String {
    entity
        .pk_infos()
        .zip(key)
        .map(|(c, v)| format!("{} = {}", quoted(&c.name), q.push_param(c.type_, v)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn assignable<'a>(entity: &'a EntityDescriptor, attributes: &'a AttributeSet) -> impl Iterator<Item = (&'a ColumnInfo, &'a Value)> + 'a {
    entity
        .columns
        .iter()
        .filter_map(move |c| attributes.get(&c.name).map(|v| (c, v)))
}

/// INSERT the provided columns; omitted columns take their database defaults.
pub fn insert(entity: &EntityDescriptor, attributes: &AttributeSet) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = quoted(&entity.path_segment);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (c, v) in assignable(entity, attributes) {
        cols.push(quoted(&c.name));
        placeholders.push(q.push_param(c.type_, v));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, key_object(entity))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            key_object(entity)
        )
    };
    q
}

/// UPDATE by key, setting only provided non-key columns. Falls back to a key lookup when nothing is set.
pub fn update(entity: &EntityDescriptor, key: &[Value], attributes: &AttributeSet) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = quoted(&entity.path_segment);
    let sets: Vec<String> = assignable(entity, attributes)
        .filter(|(c, _)| !c.primary_key)
        .map(|(c, v)| format!("{} = {}", quoted(&c.name), q.push_param(c.type_, v)))
        .collect();
    let condition = key_condition(&mut q, entity, key);
    q.sql = if sets.is_empty() {
        format!("SELECT {} FROM {} WHERE {}", key_object(entity), table, condition)
    } else {
        format!(
            "UPDATE {} SET {} WHERE {} RETURNING {}",
            table,
            sets.join(", "),
            condition,
            key_object(entity)
        )
    };
    q
}

/// DELETE by key.
pub fn delete(entity: &EntityDescriptor, key: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::default();
    let condition = key_condition(&mut q, entity, key);
    q.sql = format!("DELETE FROM {} WHERE {}", quoted(&entity.path_segment), condition);
    q
}
