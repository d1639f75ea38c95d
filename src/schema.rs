//! Table plans and the SQL text generated from them.
//!
//! A [`TablePlan`] is built once per file from its sanitized headers and
//! inferred types, optionally annotated with a primary key and foreign key
//! references, and then rendered into `DROP`, `CREATE TABLE`, `INSERT OR
//! IGNORE`, and `CREATE INDEX` statements. Generation is pure string work;
//! identifiers are double-quoted and are expected to be sanitized already.

use itertools::Itertools;

use crate::{
    inference::ColumnType,
    naming::{self, foreign_key_base},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub header: String,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPlan {
    pub name: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePlan {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Option<usize>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TablePlan {
    pub fn new(name: impl Into<String>, headers: &[String], types: &[ColumnType]) -> Self {
        let normalized = naming::normalize_headers(headers);
        let identifiers = naming::column_identifiers(&normalized);
        let columns = normalized
            .into_iter()
            .zip(identifiers)
            .enumerate()
            .map(|(idx, (header, name))| Column {
                name,
                header,
                column_type: types.get(idx).copied().unwrap_or(ColumnType::Text),
            })
            .collect();
        Self {
            name: name.into(),
            columns,
            primary_key: None,
            foreign_keys: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_names().any(|column| column == name)
    }

    pub fn primary_key_column(&self) -> Option<&Column> {
        self.primary_key.and_then(|idx| self.columns.get(idx))
    }

    pub fn drop_statement(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_identifier(&self.name))
    }

    pub fn create_statement(&self) -> String {
        let mut parts = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let mut definition = format!(
                    "{} {}",
                    quote_identifier(&column.name),
                    column.column_type.sql_type()
                );
                if self.primary_key == Some(idx) {
                    definition.push_str(" PRIMARY KEY");
                }
                definition
            })
            .collect::<Vec<_>>();
        parts.extend(self.foreign_keys.iter().map(|fk| {
            format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                quote_identifier(&fk.column),
                quote_identifier(&fk.references_table),
                quote_identifier(&fk.references_column)
            )
        }));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(&self.name),
            parts.join(", ")
        )
    }

    pub fn insert_statement(&self, rows: usize) -> String {
        let columns = self.column_names().map(quote_identifier).join(", ");
        let group = format!("({})", std::iter::repeat_n("?", self.width()).join(", "));
        let values = std::iter::repeat_n(group.as_str(), rows.max(1)).join(", ");
        format!(
            "INSERT OR IGNORE INTO {} ({columns}) VALUES {values}",
            quote_identifier(&self.name)
        )
    }

    pub fn indexes(&self) -> Vec<IndexPlan> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(idx, column)| {
                self.primary_key != Some(*idx) && naming::is_foreign_key_column(&column.name)
            })
            .map(|(_, column)| IndexPlan {
                name: format!("idx_{}_{}", self.name, column.name),
                column: column.name.clone(),
            })
            .collect()
    }

    pub fn index_statement(&self, index: &IndexPlan) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_identifier(&index.name),
            quote_identifier(&self.name),
            quote_identifier(&index.column)
        )
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Attaches `FOREIGN KEY` references to every plan whose `<base>_id` columns
/// name another planned table. The referenced table is looked up as `<base>`,
/// `<base>s`, `<base>es`, then any table whose name ends with `<base>s` or
/// `<base>`. The referenced column is that table's primary key, else `id`,
/// else its first column.
pub fn resolve_foreign_keys(plans: &mut [TablePlan]) {
    let resolved = plans
        .iter()
        .map(|plan| {
            plan.columns
                .iter()
                .filter_map(|column| {
                    let base = foreign_key_base(&column.name)?;
                    let target = find_referenced_table(plans, base)?;
                    let references_column = referenced_column(target)?;
                    Some(ForeignKey {
                        column: column.name.clone(),
                        references_table: target.name.clone(),
                        references_column,
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    for (plan, foreign_keys) in plans.iter_mut().zip(resolved) {
        plan.foreign_keys = foreign_keys;
    }
}

fn find_referenced_table<'a>(plans: &'a [TablePlan], base: &str) -> Option<&'a TablePlan> {
    let exact = [base.to_string(), format!("{base}s"), format!("{base}es")];
    exact
        .iter()
        .find_map(|candidate| plans.iter().find(|plan| &plan.name == candidate))
        .or_else(|| {
            let plural = format!("{base}s");
            plans
                .iter()
                .find(|plan| plan.name.ends_with(&plural) || plan.name.ends_with(base))
        })
}

fn referenced_column(target: &TablePlan) -> Option<String> {
    if let Some(column) = target.primary_key_column() {
        return Some(column.name.clone());
    }
    if target.has_column("id") {
        return Some("id".to_string());
    }
    target.columns.first().map(|column| column.name.clone())
}
