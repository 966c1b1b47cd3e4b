//! Parse-tree analysis for the SQL validator.
//!
//! Uses sqlparser-rs with the PostgreSQL dialect. Table names, column
//! identifiers, declared aliases and SELECT counts are read off the typed AST
//! instead of scanning text, so string literals and aliases cannot confuse
//! them.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use sqlparser::ast::{
    Expr, ObjectName, Query, SelectItem, SetExpr, Statement, TableFactor, Visit, Visitor,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Structural facts about a parsed SQL text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlStructure {
    /// Number of top-level statements.
    pub statement_count: usize,
    /// Referenced relations, lowercased, fully qualified as written.
    pub tables: BTreeSet<String>,
    /// Bare and qualified column identifiers (last segment), lowercased.
    pub identifiers: BTreeSet<String>,
    /// Projection and relation aliases declared in the text, lowercased.
    pub aliases: BTreeSet<String>,
    /// Number of SELECT blocks anywhere in the tree.
    pub select_count: usize,
    /// Every statement is a plain query whose body is a SELECT or a set
    /// operation over SELECTs, with or without a WITH clause.
    pub query_only: bool,
    /// Some SELECT block writes its rows into a new table (`SELECT ... INTO`).
    pub select_into: bool,
}

impl SqlStructure {
    /// Returns true if any relation resolves to `table`, ignoring schema.
    pub fn references_table(&self, table: &str) -> bool {
        self.tables.iter().any(|t| last_segment(t) == table)
    }
}

/// Parses `sql` and collects its structure.
///
/// Returns the parser's message when the text is not valid PostgreSQL.
pub fn analyze(dialect: &PostgreSqlDialect, sql: &str) -> std::result::Result<SqlStructure, String> {
    let statements = Parser::parse_sql(dialect, sql).map_err(|e| e.to_string())?;

    let mut collector = StructureCollector::default();
    // The collector never breaks.
    let _ = statements.visit(&mut collector);

    let mut structure = collector.structure;
    structure.statement_count = statements.len();
    structure.query_only = !statements.is_empty() && statements.iter().all(is_plain_query);
    Ok(structure)
}

/// Returns the first word token of `sql`, uppercased.
///
/// Comments and punctuation are skipped. `None` when the text holds no word
/// at all.
pub fn leading_keyword(dialect: &PostgreSqlDialect, sql: &str) -> Option<String> {
    match Tokenizer::new(dialect, sql).tokenize() {
        Ok(tokens) => tokens.into_iter().find_map(|token| match token {
            Token::Word(word) => Some(word.value.to_uppercase()),
            _ => None,
        }),
        // Unterminated literals and the like; fall back to a plain word scan.
        Err(_) => sql
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .find(|w| !w.is_empty() && !w.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_uppercase),
    }
}

#[derive(Default)]
struct StructureCollector {
    structure: SqlStructure,
}

impl Visitor for StructureCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        self.structure.select_count += count_selects(&query.body);
        self.structure.select_into |= has_select_into(&query.body);
        projection_aliases(&query.body, &mut self.structure.aliases);
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.structure
                    .aliases
                    .insert(cte.alias.name.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        self.structure.tables.insert(object_name(relation));
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        let alias = match factor {
            TableFactor::Table { alias, .. } | TableFactor::Derived { alias, .. } => {
                alias.as_ref()
            }
            _ => None,
        };
        if let Some(alias) = alias {
            self.structure.aliases.insert(alias.name.value.to_lowercase());
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => {
                self.structure.identifiers.insert(ident.value.to_lowercase());
            }
            Expr::CompoundIdentifier(idents) => {
                if let Some(last) = idents.last() {
                    self.structure.identifiers.insert(last.value.to_lowercase());
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

/// Counts SELECT blocks in a query body without descending into nested
/// queries, which the visitor reaches on its own.
fn count_selects(body: &SetExpr) -> usize {
    match body {
        SetExpr::Select(_) => 1,
        SetExpr::SetOperation { left, right, .. } => count_selects(left) + count_selects(right),
        _ => 0,
    }
}

fn has_select_into(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::SetOperation { left, right, .. } => {
            has_select_into(left) || has_select_into(right)
        }
        _ => false,
    }
}

fn is_plain_query(statement: &Statement) -> bool {
    match statement {
        Statement::Query(query) => matches!(
            query.body.as_ref(),
            SetExpr::Select(_) | SetExpr::SetOperation { .. } | SetExpr::Query(_)
        ),
        _ => false,
    }
}

fn projection_aliases(body: &SetExpr, aliases: &mut BTreeSet<String>) {
    match body {
        SetExpr::Select(select) => {
            for item in &select.projection {
                if let SelectItem::ExprWithAlias { alias, .. } = item {
                    aliases.insert(alias.value.to_lowercase());
                }
            }
        }
        SetExpr::SetOperation { left, right, .. } => {
            projection_aliases(left, aliases);
            projection_aliases(right, aliases);
        }
        _ => {}
    }
}

fn object_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

/// Returns the part after the last dot.
pub fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}
