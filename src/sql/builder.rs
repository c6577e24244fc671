//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from entity definitions and query plans.

use crate::catalog::{EntityDefinition, PrimitiveType};
use crate::service::{QueryPlan, Record};
use crate::sql::params::{pg_cast, PgBindValue};
use crate::store::Link;
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: names are validated identifiers from the catalog).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(s) => format!("{}.{}", quoted(s), quoted(table)),
        None => quoted(table),
    }
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: PgBindValue) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// Placeholder with a cast, e.g. `$2::bigint`.
    fn placeholder(&mut self, v: PgBindValue, ty: PrimitiveType) -> String {
        let n = self.push_param(v);
        format!("${}::{}", n, pg_cast(ty))
    }

    /// Placeholder for a JSON value against a typed column. Falls back to text comparison
    /// when the value does not fit the column type.
    fn typed_comparison(&mut self, column: &str, ty: PrimitiveType, v: &Value) -> String {
        match PgBindValue::from_json(v, ty) {
            Some(b) => format!("{} = {}", quoted(column), self.placeholder(b, ty)),
            None => {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let n = self.push_param(PgBindValue::text(text));
                format!("{}::text = ${}::text", quoted(column), n)
            }
        }
    }
}

fn field_type(entity: &EntityDefinition, column: &str) -> PrimitiveType {
    entity.field(column).map(|f| f.ty).unwrap_or(PrimitiveType::String)
}

/// SELECT list: every field cast to its canonical type so row decoding is uniform.
fn select_column_list(entity: &EntityDefinition, alias: Option<&str>) -> String {
    entity
        .fields
        .iter()
        .map(|f| {
            let q = quoted(&f.name);
            let col = match alias {
                Some(a) => format!("{}.{}", a, q),
                None => q.clone(),
            };
            format!("{}::{} AS {}", col, pg_cast(f.ty), q)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn where_clause(entity: &EntityDefinition, plan: &QueryPlan, q: &mut QueryBuf) -> String {
    let mut parts = Vec::new();
    if let Some(f) = &plan.filter {
        parts.push(q.typed_comparison(&f.column, field_type(entity, &f.column), &f.value));
    }
    if let Some(s) = &plan.search {
        let n = q.push_param(PgBindValue::text(format!("%{}%", escape_like(&s.term))));
        parts.push(format!("{} ILIKE ${}", quoted(&s.column), n));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// COUNT(*) over filter + search, ignoring the window.
pub fn count_matching(entity: &EntityDefinition, plan: &QueryPlan, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &entity.route);
    let wc = where_clause(entity, plan, &mut q);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", table, wc);
    q
}

/// SELECT page: filter + search, ORDER BY sort column then primary key (natural order), LIMIT/OFFSET.
pub fn select_page(entity: &EntityDefinition, plan: &QueryPlan, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &entity.route);
    let pk = quoted(entity.pk_name());
    let wc = where_clause(entity, plan, &mut q);
    let order = match &plan.sort {
        Some(s) => format!(
            " ORDER BY {} {} {}, {} ASC",
            quoted(&s.column),
            s.direction.as_sql(),
            s.direction.nulls_sql(),
            pk
        ),
        None => format!(" ORDER BY {} ASC", pk),
    };
    q.sql = format!(
        "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
        select_column_list(entity, None),
        table,
        wc,
        order,
        plan.limit,
        plan.skip
    );
    q
}

/// SELECT by primary key.
pub fn select_by_id(entity: &EntityDefinition, pk: &Value, schema: Option<&str>) -> QueryBuf {
    select_where(entity, entity.pk_name(), pk, schema)
}

/// SELECT rows where one column equals a value, in primary-key order.
pub fn select_where(entity: &EntityDefinition, column: &str, value: &Value, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &entity.route);
    let cond = q.typed_comparison(column, field_type(entity, column), value);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {} ASC",
        select_column_list(entity, None),
        table,
        cond,
        quoted(entity.pk_name())
    );
    q
}

/// SELECT target rows joined through an association table, in link insertion order (ctid).
pub fn select_linked(target: &EntityDefinition, link: &Link<'_>, owner_id: &Value, schema: Option<&str>) -> QueryBuf {
    const T: &str = "t";
    const A: &str = "a";
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &target.route);
    let assoc = qualified_table(schema, link.association);
    let owner = PgBindValue::from_json(owner_id, link.owner_type).unwrap_or_else(|| PgBindValue::null(link.owner_type));
    let ph = q.placeholder(owner, link.owner_type);
    q.sql = format!(
        "SELECT {} FROM {} {} JOIN {} {} ON {}.{} = {}.{} WHERE {}.{} = {} ORDER BY {}.ctid",
        select_column_list(target, Some(T)),
        table,
        T,
        assoc,
        A,
        A,
        quoted(link.target_key),
        T,
        quoted(target.pk_name()),
        A,
        quoted(link.owner_key),
        ph,
        A
    );
    q
}

/// INSERT the record's fields; the primary key is assigned by the database and returned.
pub fn insert(entity: &EntityDefinition, record: &Record, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &entity.route);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for f in entity.data_fields() {
        let v = record.get(&f.name).unwrap_or(&Value::Null);
        let b = PgBindValue::from_json(v, f.ty).unwrap_or_else(|| PgBindValue::null(f.ty));
        cols.push(quoted(&f.name));
        placeholders.push(q.placeholder(b, f.ty));
    }
    let pk = entity.primary_key();
    let returning = pk
        .map(|f| format!("{}::{}", quoted(&f.name), pg_cast(f.ty)))
        .unwrap_or_else(|| quoted("id"));
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET only the fields present in `changes`. Empty changes degrade to a SELECT.
pub fn update(entity: &EntityDefinition, pk: &Value, changes: &Record, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &entity.route);
    let mut sets = Vec::new();
    for f in entity.data_fields() {
        let Some(v) = changes.get(&f.name) else { continue };
        let b = PgBindValue::from_json(v, f.ty).unwrap_or_else(|| PgBindValue::null(f.ty));
        sets.push(format!("{} = {}", quoted(&f.name), q.placeholder(b, f.ty)));
    }
    if sets.is_empty() {
        return select_by_id(entity, pk, schema);
    }
    let cond = q.typed_comparison(entity.pk_name(), field_type(entity, entity.pk_name()), pk);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING {}",
        table,
        sets.join(", "),
        cond,
        select_column_list(entity, None)
    );
    q
}

/// DELETE by id, returning the key so a miss is observable.
pub fn delete(entity: &EntityDefinition, pk: &Value, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &entity.route);
    let cond = q.typed_comparison(entity.pk_name(), field_type(entity, entity.pk_name()), pk);
    q.sql = format!("DELETE FROM {} WHERE {} RETURNING 1", table, cond);
    q
}

/// INSERT one association row.
pub fn insert_link(link: &Link<'_>, owner_id: &Value, target_id: &Value, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, link.association);
    let owner = PgBindValue::from_json(owner_id, link.owner_type).unwrap_or_else(|| PgBindValue::null(link.owner_type));
    let target = PgBindValue::from_json(target_id, link.target_type).unwrap_or_else(|| PgBindValue::null(link.target_type));
    let a = q.placeholder(owner, link.owner_type);
    let b = q.placeholder(target, link.target_type);
    q.sql = format!(
        "INSERT INTO {} ({}, {}) VALUES ({}, {})",
        table,
        quoted(link.owner_key),
        quoted(link.target_key),
        a,
        b
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{plan, QueryOptions, SortDirection};
    use serde_json::json;

    fn item() -> EntityDefinition {
        EntityDefinition::builder("Item", "items")
            .key("id", PrimitiveType::Integer)
            .field("name", PrimitiveType::String)
            .field("price", PrimitiveType::Float)
            .build()
    }

    #[test]
    fn page_query_orders_by_sort_then_pk() {
        let opts = QueryOptions {
            skip: 10,
            limit: Some(5),
            filter: Some(("price".into(), "5".into())),
            sort_column: Some("price".into()),
            sort_direction: SortDirection::Desc,
            search: Some("50%".into()),
        };
        let p = plan(&item(), &opts).unwrap();
        let q = select_page(&item(), &p, Some("app"));
        assert_eq!(
            q.sql,
            "SELECT \"id\"::bigint AS \"id\", \"name\"::text AS \"name\", \"price\"::float8 AS \"price\" \
             FROM \"app\".\"items\" WHERE \"price\" = $1::float8 AND \"name\" ILIKE $2 \
             ORDER BY \"price\" DESC NULLS LAST, \"id\" ASC LIMIT 5 OFFSET 10"
        );
        assert_eq!(q.params[0], PgBindValue::Float(Some(5.0)));
        assert_eq!(q.params[1], PgBindValue::text("%50\\%%"));

        let c = count_matching(&item(), &p, None);
        assert_eq!(
            c.sql,
            "SELECT COUNT(*) FROM \"items\" WHERE \"price\" = $1::float8 AND \"name\" ILIKE $2"
        );
    }

    #[test]
    fn ascending_sort_puts_nulls_first() {
        let opts = QueryOptions {
            sort_column: Some("name".into()),
            ..Default::default()
        };
        let p = plan(&item(), &opts).unwrap();
        let q = select_page(&item(), &p, None);
        assert!(
            q.sql.ends_with("ORDER BY \"name\" ASC NULLS FIRST, \"id\" ASC LIMIT 100 OFFSET 0"),
            "{}",
            q.sql
        );
    }

    #[test]
    fn mismatched_filter_value_compares_as_text() {
        let mut q = QueryBuf::new();
        let cond = q.typed_comparison("id", PrimitiveType::Integer, &json!("abc"));
        assert_eq!(cond, "\"id\"::text = $1::text");
    }

    #[test]
    fn insert_skips_primary_key() {
        let rec = json!({"name": "pen", "price": 5}).as_object().cloned().unwrap();
        let q = insert(&item(), &rec, None);
        assert_eq!(
            q.sql,
            "INSERT INTO \"items\" (\"name\", \"price\") VALUES ($1::text, $2::float8) RETURNING \"id\"::bigint"
        );
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn update_sets_only_present_fields() {
        let rec = json!({"price": 7}).as_object().cloned().unwrap();
        let q = update(&item(), &json!(1), &rec, None);
        assert!(q.sql.starts_with("UPDATE \"items\" SET \"price\" = $1::float8 WHERE \"id\" = $2::bigint RETURNING"));

        let q = update(&item(), &json!(1), &Record::new(), None);
        assert!(q.sql.starts_with("SELECT"));
    }

    #[test]
    fn linked_select_joins_association() {
        let link = Link {
            association: "item_tags",
            owner_key: "item_id",
            target_key: "tag_id",
            owner_type: PrimitiveType::Integer,
            target_type: PrimitiveType::Integer,
        };
        let tag = EntityDefinition::builder("Tag", "tags")
            .key("id", PrimitiveType::Integer)
            .build();
        let q = select_linked(&tag, &link, &json!(3), None);
        assert_eq!(
            q.sql,
            "SELECT t.\"id\"::bigint AS \"id\" FROM \"tags\" t JOIN \"item_tags\" a \
             ON a.\"tag_id\" = t.\"id\" WHERE a.\"item_id\" = $1::bigint ORDER BY a.ctid"
        );
        let q = insert_link(&link, &json!(3), &json!(4), None);
        assert_eq!(
            q.sql,
            "INSERT INTO \"item_tags\" (\"item_id\", \"tag_id\") VALUES ($1::bigint, $2::bigint)"
        );
    }
}
