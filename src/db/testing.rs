//! In-memory [`SqlSession`] for unit tests.
//!
//! Understands the statement shapes the lifecycle code emits plus simple
//! `CREATE TABLE` / `INSERT INTO ... VALUES` template statements. Tables hold their
//! inserted value lists as opaque rows. Transactions snapshot the whole catalog and the
//! search path, so a ROLLBACK undoes DDL the way Postgres does.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use super::naming::DEFAULT_SCHEMA;
use super::session::SqlSession;

type Tables = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone)]
struct State {
    schemas: BTreeMap<String, Tables>,
    search_path: String,
}

pub struct MemorySession {
    state: State,
    snapshot: Option<State>,
    aborted: bool,
    executed: Vec<String>,
    failures: Vec<String>,
    stalls: Vec<String>,
    commits: Vec<(String, String, String)>,
    counts: HashMap<String, i64>,
}

fn injected(message: String) -> sqlx::Error {
    sqlx::Error::Protocol(message)
}

impl MemorySession {
    pub fn new() -> Self {
        let mut schemas = BTreeMap::new();
        schemas.insert(DEFAULT_SCHEMA.to_string(), Tables::new());
        Self {
            state: State {
                schemas,
                search_path: DEFAULT_SCHEMA.to_string(),
            },
            snapshot: None,
            aborted: false,
            executed: Vec::new(),
            failures: Vec::new(),
            stalls: Vec::new(),
            commits: Vec::new(),
            counts: HashMap::new(),
        }
    }

    /// Any statement containing `needle` fails.
    pub fn fail_on(&mut self, needle: &str) {
        self.failures.push(needle.to_string());
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    /// Any statement containing `needle` never completes.
    pub fn stall_on(&mut self, needle: &str) {
        self.stalls.push(needle.to_string());
    }

    /// When a statement containing `needle` runs, `schema.table` appears as if another
    /// connection had just committed it. It survives a ROLLBACK on this session.
    pub fn concurrent_commit_on(&mut self, needle: &str, schema: &str, table: &str) {
        self.commits
            .push((needle.to_string(), schema.to_string(), table.to_string()));
    }

    pub fn set_count(&mut self, sql_fragment: &str, value: i64) {
        self.counts.insert(sql_fragment.to_string(), value);
    }

    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn clear_executed(&mut self) {
        self.executed.clear();
    }

    pub fn search_path(&self) -> &str {
        &self.state.search_path
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        self.state.schemas.contains_key(schema)
    }

    pub fn has_table(&self, schema: &str, table: &str) -> bool {
        self.rows(schema, table).is_some()
    }

    pub fn rows(&self, schema: &str, table: &str) -> Option<&Vec<String>> {
        self.state.schemas.get(schema)?.get(table)
    }

    pub fn insert_table(&mut self, schema: &str, table: &str, rows: &[&str]) {
        self.state
            .schemas
            .entry(schema.to_string())
            .or_default()
            .insert(table.to_string(), rows.iter().map(|r| r.to_string()).collect());
    }

    fn apply(&mut self, sql: &str) -> Result<u64, sqlx::Error> {
        let upper = sql.to_ascii_uppercase();

        if upper == "BEGIN" {
            self.snapshot = Some(self.state.clone());
            return Ok(0);
        }
        if upper == "ROLLBACK" || (upper == "COMMIT" && self.aborted) {
            if let Some(snapshot) = self.snapshot.take() {
                self.state = snapshot;
            }
            self.aborted = false;
            return Ok(0);
        }
        if upper == "COMMIT" {
            self.snapshot = None;
            return Ok(0);
        }
        if self.aborted {
            return Err(injected(
                "current transaction is aborted, commands ignored until end of transaction block"
                    .into(),
            ));
        }

        if let Some(needle) = self.failures.iter().find(|n| sql.contains(n.as_str())) {
            let message = format!("injected failure on {needle:?}");
            if self.snapshot.is_some() {
                self.aborted = true;
            }
            return Err(injected(message));
        }

        let mut words = sql.split_whitespace();
        match (words.next().map(str::to_ascii_uppercase).as_deref(), words.next()) {
            (Some("SET"), Some(w)) if w.eq_ignore_ascii_case("search_path") => {
                let target = sql.rsplit(' ').next().unwrap_or(DEFAULT_SCHEMA);
                self.state.search_path = unquote(target);
                Ok(0)
            }
            (Some("RESET"), Some(w)) if w.eq_ignore_ascii_case("search_path") => {
                self.state.search_path = DEFAULT_SCHEMA.to_string();
                Ok(0)
            }
            (Some("CREATE"), Some(w)) if w.eq_ignore_ascii_case("SCHEMA") => {
                let name = unquote(last_word(sql));
                if self.state.schemas.contains_key(&name) {
                    if upper.contains("IF NOT EXISTS") {
                        return Ok(0);
                    }
                    return self.fail(format!("schema \"{name}\" already exists"));
                }
                self.state.schemas.insert(name, Tables::new());
                Ok(0)
            }
            (Some("DROP"), Some(w)) if w.eq_ignore_ascii_case("SCHEMA") => {
                let name = unquote(
                    sql.split_whitespace()
                        .nth(if upper.contains("IF EXISTS") { 4 } else { 2 })
                        .unwrap_or_default(),
                );
                if self.state.schemas.remove(&name).is_none() && !upper.contains("IF EXISTS") {
                    return self.fail(format!("schema \"{name}\" does not exist"));
                }
                Ok(0)
            }
            (Some("CREATE"), Some(w)) if w.eq_ignore_ascii_case("TABLE") => {
                self.create_table(sql, &upper)
            }
            (Some("INSERT"), Some(w)) if w.eq_ignore_ascii_case("INTO") => {
                let (schema, table) = self.resolve(words.next().unwrap_or_default());
                let row = match upper.find("VALUES") {
                    Some(at) => sql[at + "VALUES".len()..].trim().to_string(),
                    None => String::new(),
                };
                if !self.has_table(&schema, &table) {
                    return self.fail(format!("relation \"{table}\" does not exist"));
                }
                if let Some(rows) = self
                    .state
                    .schemas
                    .get_mut(&schema)
                    .and_then(|tables| tables.get_mut(&table))
                {
                    rows.push(row);
                }
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn create_table(&mut self, sql: &str, upper: &str) -> Result<u64, sqlx::Error> {
        let if_not_exists = upper.starts_with("CREATE TABLE IF NOT EXISTS");
        let name = sql
            .split_whitespace()
            .nth(if if_not_exists { 5 } else { 2 })
            .unwrap_or_default();
        let (schema, table) = self.resolve(name.split('(').next().unwrap_or(name));

        let rows = match upper.find(" AS SELECT * FROM ") {
            Some(at) => {
                let source = sql[at + " AS SELECT * FROM ".len()..].trim();
                let (src_schema, src_table) = self.resolve(source);
                let copied = self.rows(&src_schema, &src_table).cloned();
                match copied {
                    Some(rows) => rows,
                    None => return self.fail(format!("relation \"{source}\" does not exist")),
                }
            }
            None => Vec::new(),
        };

        if !self.has_schema(&schema) {
            return self.fail(format!("schema \"{schema}\" does not exist"));
        }
        if self.has_table(&schema, &table) {
            if if_not_exists {
                return Ok(0);
            }
            return self.fail(format!("relation \"{table}\" already exists"));
        }
        let copied = rows.len() as u64;
        self.state
            .schemas
            .entry(schema)
            .or_default()
            .insert(table, rows);
        Ok(copied)
    }

    fn resolve(&self, name: &str) -> (String, String) {
        match name.split_once('.') {
            Some((schema, table)) => (unquote(schema), unquote(table)),
            None => (self.state.search_path.clone(), unquote(name)),
        }
    }

    fn fail(&mut self, message: String) -> Result<u64, sqlx::Error> {
        if self.snapshot.is_some() {
            self.aborted = true;
        }
        Err(injected(message))
    }

    fn check_usable(&self) -> Result<(), sqlx::Error> {
        if self.aborted {
            return Err(injected("current transaction is aborted".into()));
        }
        Ok(())
    }
}

fn last_word(sql: &str) -> &str {
    sql.split_whitespace().last().unwrap_or_default()
}

fn unquote(ident: &str) -> String {
    ident.trim().trim_matches('"').to_string()
}

#[async_trait]
impl SqlSession for MemorySession {
    async fn execute(&mut self, sql: &str) -> Result<u64, sqlx::Error> {
        self.executed.push(sql.to_string());
        if self.stalls.iter().any(|n| sql.contains(n.as_str())) {
            std::future::pending::<()>().await;
        }
        let result = self.apply(sql);
        let committed: Vec<_> = self
            .commits
            .iter()
            .filter(|(needle, _, _)| sql.contains(needle.as_str()))
            .map(|(_, schema, table)| (schema.clone(), table.clone()))
            .collect();
        for (schema, table) in committed {
            for state in std::iter::once(&mut self.state).chain(self.snapshot.as_mut()) {
                state
                    .schemas
                    .entry(schema.clone())
                    .or_default()
                    .insert(table.clone(), Vec::new());
            }
        }
        result
    }

    async fn schema_exists(&mut self, schema: &str) -> Result<bool, sqlx::Error> {
        self.check_usable()?;
        Ok(self.has_schema(schema))
    }

    async fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool, sqlx::Error> {
        self.check_usable()?;
        Ok(self.has_table(schema, table))
    }

    async fn base_tables(&mut self, schema: &str) -> Result<Vec<String>, sqlx::Error> {
        self.check_usable()?;
        Ok(self
            .state
            .schemas
            .get(schema)
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn current_search_path(&mut self) -> Result<String, sqlx::Error> {
        self.check_usable()?;
        Ok(self.state.search_path.clone())
    }

    async fn scalar_count(&mut self, sql: &str) -> Result<i64, sqlx::Error> {
        self.check_usable()?;
        self.counts
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, value)| *value)
            .ok_or_else(|| injected(format!("no count configured for {sql}")))
    }

    async fn tenant_schema_table_counts(&mut self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        self.check_usable()?;
        Ok(self
            .state
            .schemas
            .iter()
            .filter(|(name, _)| name.starts_with("tenant_"))
            .map(|(name, tables)| (name.clone(), tables.len() as i64))
            .collect())
    }
}
