//! Query planning: request parameters -> validated plan (filter, search, sort, window) -> page.
//!
//! A plan is storage-agnostic. [`QueryPlan::apply`] executes it over an in-memory row set;
//! the PostgreSQL store renders the same plan into SQL. Filter and search narrow the set
//! before `total` is taken; sort and the skip/limit window come after. Count and fetch are
//! not a snapshot: rows changing between the two can make `total` drift from the page.

use crate::catalog::{EntityDefinition, FieldDefinition, PrimitiveType};
use crate::error::AppError;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Null placement matching [`compare_values`]: smallest ascending, largest descending.
    pub fn nulls_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "NULLS FIRST",
            SortDirection::Desc => "NULLS LAST",
        }
    }
}

/// Raw list options as received. Clamping happens in [`plan`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    pub skip: i64,
    pub limit: Option<i64>,
    /// `(column, textual value)`; coerced to the column type when planned.
    pub filter: Option<(String, String)>,
    pub sort_column: Option<String>,
    pub sort_direction: SortDirection,
    pub search: Option<String>,
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl QueryOptions {
    /// Parse `skip`, `limit`, `filter=<col>=<val>`, `sort_by`, `sort_dir`, `search`. Other keys are ignored.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, AppError> {
        let mut opts = QueryOptions::default();
        for (k, v) in params {
            match k.as_str() {
                "skip" => {
                    opts.skip = v
                        .trim()
                        .parse()
                        .map_err(|_| AppError::BadRequest(format!("skip must be an integer, got '{}'", v)))?;
                }
                "limit" => {
                    let n = v
                        .trim()
                        .parse()
                        .map_err(|_| AppError::BadRequest(format!("limit must be an integer, got '{}'", v)))?;
                    opts.limit = Some(n);
                }
                "filter" => {
                    if v.trim().is_empty() {
                        continue;
                    }
                    let (col, val) = v
                        .split_once('=')
                        .ok_or_else(|| AppError::BadRequest(format!("filter must look like <column>=<value>, got '{}'", v)))?;
                    opts.filter = Some((col.trim().to_string(), val.to_string()));
                }
                "sort_by" => opts.sort_column = non_empty(v),
                "sort_dir" => {
                    opts.sort_direction = match v.trim().to_ascii_lowercase().as_str() {
                        "" | "asc" => SortDirection::Asc,
                        "desc" => SortDirection::Desc,
                        _ => return Err(AppError::BadRequest(format!("sort_dir must be asc or desc, got '{}'", v))),
                    };
                }
                "search" => opts.search = non_empty(v),
                _ => {}
            }
        }
        Ok(opts)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterClause {
    pub column: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchClause {
    pub column: String,
    pub term: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortClause {
    pub column: String,
    pub direction: SortDirection,
}

/// Executable plan against one entity's collection.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    pub filter: Option<FilterClause>,
    pub search: Option<SearchClause>,
    pub sort: Option<SortClause>,
    pub skip: u64,
    pub limit: u64,
}

/// A window over the matching rows plus the count of all of them.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page {
    #[serde(rename = "data")]
    pub rows: Vec<Value>,
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
}

pub fn plan(entity: &EntityDefinition, opts: &QueryOptions) -> Result<QueryPlan, AppError> {
    let filter = match &opts.filter {
        Some((col, raw)) => {
            let field = entity.field(col).ok_or_else(|| AppError::InvalidFilterColumn {
                entity: entity.name.clone(),
                column: col.clone(),
            })?;
            Some(FilterClause {
                column: field.name.clone(),
                value: coerce_filter_value(field, raw),
            })
        }
        None => None,
    };

    // No display column means search does nothing, not an error.
    let search = opts.search.as_ref().and_then(|term| {
        entity.display_column().map(|f| SearchClause {
            column: f.name.clone(),
            term: term.clone(),
        })
    });

    let sort = match &opts.sort_column {
        Some(col) => {
            let field = entity.field(col).ok_or_else(|| AppError::InvalidSortColumn {
                entity: entity.name.clone(),
                column: col.clone(),
            })?;
            Some(SortClause {
                column: field.name.clone(),
                direction: opts.sort_direction,
            })
        }
        None => None,
    };

    let skip = opts.skip.max(0) as u64;
    let limit = opts
        .limit
        .map(|n| n.clamp(1, MAX_LIMIT as i64) as u64)
        .unwrap_or(DEFAULT_LIMIT);

    let plan = QueryPlan {
        filter,
        search,
        sort,
        skip,
        limit,
    };
    tracing::debug!(entity = %entity.name, plan = ?plan, "query planned");
    Ok(plan)
}

/// Query strings are text; compare against the column's native JSON type where it parses.
fn coerce_filter_value(field: &FieldDefinition, raw: &str) -> Value {
    let fallback = || Value::String(raw.to_string());
    match field.ty {
        PrimitiveType::Integer => raw.trim().parse::<i64>().map(Value::from).unwrap_or_else(|_| fallback()),
        PrimitiveType::Float => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(fallback),
        PrimitiveType::Boolean => {
            if raw.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if raw.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                fallback()
            }
        }
        PrimitiveType::Uuid => uuid::Uuid::parse_str(raw.trim())
            .map(|u| Value::String(u.to_string()))
            .unwrap_or_else(|_| fallback()),
        PrimitiveType::String | PrimitiveType::Datetime | PrimitiveType::Json => fallback(),
    }
}

impl QueryPlan {
    /// Filter + search predicate for a single row.
    pub fn matches(&self, row: &Value) -> bool {
        if let Some(f) = &self.filter {
            if !value_eq(row.get(&f.column).unwrap_or(&Value::Null), &f.value) {
                return false;
            }
        }
        if let Some(s) = &self.search {
            let hit = row
                .get(&s.column)
                .and_then(Value::as_str)
                .map(|v| v.to_lowercase().contains(&s.term.to_lowercase()))
                .unwrap_or(false);
            if !hit {
                return false;
            }
        }
        true
    }

    /// Run the plan over rows in storage natural order.
    pub fn apply(&self, rows: impl IntoIterator<Item = Value>) -> Page {
        let mut matching: Vec<Value> = rows.into_iter().filter(|r| self.matches(r)).collect();
        let total = matching.len() as u64;
        if let Some(sort) = &self.sort {
            // sort_by is stable; ties keep natural order in both directions.
            matching.sort_by(|a, b| {
                let ord = compare_values(
                    a.get(&sort.column).unwrap_or(&Value::Null),
                    b.get(&sort.column).unwrap_or(&Value::Null),
                );
                match sort.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }
        let rows = matching
            .into_iter()
            .skip(self.skip as usize)
            .take(self.limit as usize)
            .collect();
        Page {
            rows,
            total,
            skip: self.skip,
            limit: self.limit,
        }
    }
}

pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

/// Nulls first, then by natural order within a JSON type.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}
