use rusqlite::{params_from_iter, types::Value, Connection, Row};
use serde::Serialize;

/// Enum-like filter params use this sentinel to mean "no filter".
pub const FILTER_ALL: &str = "all";

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total_count: i64,
    pub total_pages: i64,
    pub current_page: i64,
}

impl<T> Page<T> {
    pub fn empty(current_page: i64) -> Self {
        Page {
            data: Vec::new(),
            total_count: 0,
            total_pages: 0,
            current_page,
        }
    }
}

pub fn total_pages(total_count: i64, page_size: i64) -> i64 {
    if total_count <= 0 || page_size <= 0 {
        return 0;
    }
    (total_count + page_size - 1) / page_size
}

/// Filtered, sorted, range-limited list query over one table. Produces both
/// the requested page and the total matching count.
pub struct ListQuery {
    table: &'static str,
    conditions: Vec<String>,
    binds: Vec<Value>,
    order_by: String,
    page: i64,
    page_size: i64,
}

impl ListQuery {
    pub fn new(table: &'static str) -> Self {
        ListQuery {
            table,
            conditions: Vec::new(),
            binds: Vec::new(),
            order_by: "created_at DESC".to_string(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Case-insensitive substring match over one or more text columns.
    /// Blank terms apply no filter.
    pub fn search(mut self, columns: &[&str], term: Option<&str>) -> Self {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return self;
        };
        let like = format!("%{}%", term.to_lowercase());
        let clause = columns
            .iter()
            .map(|c| format!("LOWER(COALESCE({}, '')) LIKE ?", c))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.conditions.push(format!("({})", clause));
        for _ in columns {
            self.binds.push(Value::Text(like.clone()));
        }
        self
    }

    /// Equality filter; `None`, empty, and the `"all"` sentinel apply nothing.
    pub fn filter_eq(mut self, column: &str, value: Option<&str>) -> Self {
        let Some(value) = value.filter(|v| !v.is_empty() && *v != FILTER_ALL) else {
            return self;
        };
        self.conditions.push(format!("{} = ?", column));
        self.binds.push(Value::Text(value.to_string()));
        self
    }

    /// Filter expressed as a raw condition with a single `?` bind, for
    /// denormalized filters that reach through another table (e.g. session
    /// category via its quiz). Skipped for `None` and the `"all"` sentinel.
    pub fn filter_subquery(mut self, condition: &str, value: Option<&str>) -> Self {
        let Some(value) = value.filter(|v| !v.is_empty() && *v != FILTER_ALL) else {
            return self;
        };
        self.conditions.push(condition.to_string());
        self.binds.push(Value::Text(value.to_string()));
        self
    }

    pub fn filter_flag(mut self, column: &str, value: Option<bool>) -> Self {
        if let Some(v) = value {
            self.conditions.push(format!("{} = ?", column));
            self.binds.push(Value::Integer(if v { 1 } else { 0 }));
        }
        self
    }

    /// Active rows (`deleted_at IS NULL`) or trash rows (`NOT NULL`).
    pub fn in_trash(mut self, in_trash: bool) -> Self {
        self.conditions.push(if in_trash {
            "deleted_at IS NOT NULL".to_string()
        } else {
            "deleted_at IS NULL".to_string()
        });
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = clause.into();
        self
    }

    pub fn paginate(mut self, page: i64, page_size: i64) -> Self {
        self.page = page.max(1);
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    fn where_sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// Runs the count and page queries. The row mapper may return `Ok(None)`
    /// to skip a row (e.g. one with a malformed embedded column) without
    /// failing the whole page.
    pub fn fetch<T, F>(self, conn: &Connection, mut map: F) -> rusqlite::Result<Page<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<Option<T>>,
    {
        let where_sql = self.where_sql();

        let count_sql = format!("SELECT COUNT(*) FROM {}{}", self.table, where_sql);
        let total_count: i64 = conn.query_row(
            &count_sql,
            params_from_iter(self.binds.iter().cloned()),
            |r| r.get(0),
        )?;

        let select_sql = format!(
            "SELECT * FROM {}{} ORDER BY {} LIMIT ? OFFSET ?",
            self.table, where_sql, self.order_by
        );
        let mut binds = self.binds;
        binds.push(Value::Integer(self.page_size));
        binds.push(Value::Integer((self.page - 1) * self.page_size));

        let mut stmt = conn.prepare(&select_sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut data = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(item) = map(row)? {
                data.push(item);
            }
        }

        Ok(Page {
            data,
            total_count,
            total_pages: total_pages(total_count, self.page_size),
            current_page: self.page,
        })
    }

    /// List screens degrade uniformly to an empty page when the underlying
    /// query fails; the failure is logged, never surfaced raw.
    pub fn fetch_or_empty<T, F>(self, conn: &Connection, map: F) -> Page<T>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<Option<T>>,
    {
        let table = self.table;
        let page = self.page;
        match self.fetch(conn, map) {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(table, error = %e, "list query failed, returning empty page");
                Page::empty(page)
            }
        }
    }
}

/// Picks an ORDER BY clause from a fixed per-screen map, defaulting to
/// newest-first for unknown or missing keys.
pub fn sort_clause(sort: Option<&str>, choices: &[(&str, &str)], default: &str) -> String {
    let Some(sort) = sort else {
        return default.to_string();
    };
    choices
        .iter()
        .find(|(key, _)| *key == sort)
        .map(|(_, clause)| clause.to_string())
        .unwrap_or_else(|| default.to_string())
}
