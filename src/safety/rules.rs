//! Fixed rule tables for the SQL validator.
//!
//! The allowlists here are a contract against the `app_metrics` schema served
//! by the metrics store; change them together.

use regex::Regex;
use std::sync::LazyLock;

/// The one relation generated SQL may target.
pub const CANONICAL_TABLE: &str = "app_metrics";

/// Upper bound on statement length, in characters.
pub const MAX_QUERY_CHARS: usize = 5000;

/// Upper bound on SELECTs beyond the outermost one.
pub const MAX_NESTED_SUBQUERIES: usize = 3;

/// Relations that may appear without being flagged in the logs.
pub const ALLOWED_TABLES: &[&str] = &[
    CANONICAL_TABLE,
    "query_cache",
    "information_schema",
    "pg_catalog",
    "pg_class",
    "pg_namespace",
];

/// Columns of `app_metrics`.
pub const KNOWN_COLUMNS: &[&str] = &[
    "id",
    "app_name",
    "platform",
    "date",
    "country",
    "installs",
    "in_app_revenue",
    "ads_revenue",
    "ua_cost",
    "created_at",
    "updated_at",
];

/// Words that show up as bare identifiers but are keywords, functions or
/// date parts.
pub const NON_COLUMN_WORDS: &[&str] = &[
    "select",
    "from",
    "where",
    "group",
    "by",
    "order",
    "having",
    "limit",
    "offset",
    "join",
    "inner",
    "left",
    "right",
    "on",
    "and",
    "or",
    "not",
    "in",
    "like",
    "between",
    "case",
    "when",
    "then",
    "else",
    "end",
    "as",
    "distinct",
    "count",
    "sum",
    "avg",
    "min",
    "max",
    "round",
    "coalesce",
    "desc",
    "asc",
    "date_trunc",
    "current_date",
    "interval",
    "extract",
    "now",
    "date_part",
    "postgresql",
    "null",
    "true",
    "false",
    CANONICAL_TABLE,
];

/// Computed column names the model commonly emits.
pub const KNOWN_ALIASES: &[&str] = &[
    "total_apps",
    "number_of_apps",
    "app_count",
    "total_revenue",
    "total_installs",
    "total_cost",
    "avg_revenue",
    "max_installs",
    "min_revenue",
    "count_apps",
    "revenue_sum",
    "install_sum",
    "month",
    "year",
    "day",
    "week",
    "quarter",
    "revenue_per_install",
    "roi",
    "conversion_rate",
    "daily_revenue",
    "weekly_revenue",
    "monthly_revenue",
    "yearly_revenue",
    "platform_revenue",
    "country_revenue",
    "app_revenue",
    "total_ua_cost",
];

/// A blocklisted token and the matcher that finds it.
pub struct ForbiddenKeyword {
    pub token: &'static str,
    pub pattern: Regex,
}

/// A named attack signature.
pub struct InjectionSignature {
    pub name: &'static str,
    pub pattern: Regex,
}

fn compile(pattern: &str) -> Regex {
    // Patterns are literals in this file and covered by tests.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid validator pattern {pattern}: {e}"))
}

/// Mutating and administrative tokens, matched on word boundaries so that
/// identifiers like `updated_at` or `created_at` pass.
pub static FORBIDDEN_KEYWORDS: LazyLock<Vec<ForbiddenKeyword>> = LazyLock::new(|| {
    [
        ("INSERT", r"(?i)\bINSERT\b"),
        ("UPDATE", r"(?i)\bUPDATE\b"),
        ("DELETE", r"(?i)\bDELETE\b"),
        ("DROP", r"(?i)\bDROP\b"),
        ("CREATE", r"(?i)\bCREATE\b"),
        ("ALTER", r"(?i)\bALTER\b"),
        ("TRUNCATE", r"(?i)\bTRUNCATE\b"),
        ("REPLACE", r"(?i)\bREPLACE\b"),
        ("MERGE", r"(?i)\bMERGE\b"),
        ("EXEC", r"(?i)\bEXEC\b"),
        ("EXECUTE", r"(?i)\bEXECUTE\b"),
        ("xp_", r"(?i)\bxp_\w*"),
        ("sp_", r"(?i)\bsp_\w*"),
        ("OPENROWSET", r"(?i)\bOPENROWSET\b"),
        ("BULK", r"(?i)\bBULK\b"),
        ("UNION ALL SELECT", r"(?i)\bUNION\s+ALL\s+SELECT\b"),
    ]
    .into_iter()
    .map(|(token, pattern)| ForbiddenKeyword {
        token,
        pattern: compile(pattern),
    })
    .collect()
});

pub static INJECTION_SIGNATURES: LazyLock<Vec<InjectionSignature>> = LazyLock::new(|| {
    [
        ("terminator followed by comment", r"';\s*--"),
        ("terminator followed by DROP", r"(?i)';\s*DROP\b"),
        ("UNION-based extraction", r"(?is)\bUNION\b.*\bSELECT\b.*\bFROM\b"),
        ("always-true quoted comparison", r"(?i)'\s*OR\s*'[^']*'\s*=\s*'"),
        ("always-true numeric comparison", r"(?i)\bOR\s+\d+\s*=\s*\d+\b"),
        ("always-true literal", r"(?i)\bOR\s+TRUE\b"),
        ("line comment", r"--"),
        ("block comment", r"(?s)/\*.*?\*/"),
        ("xp_cmdshell", r"(?i)xp_cmdshell"),
        ("sp_executesql", r"(?i)sp_executesql"),
    ]
    .into_iter()
    .map(|(name, pattern)| InjectionSignature {
        name,
        pattern: compile(pattern),
    })
    .collect()
});

pub static SELECT_WORD: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)\bSELECT\b"));

pub fn is_known_column(name: &str) -> bool {
    KNOWN_COLUMNS.contains(&name)
}

pub fn is_non_column_word(name: &str) -> bool {
    NON_COLUMN_WORDS.contains(&name)
}

pub fn is_known_alias(name: &str) -> bool {
    KNOWN_ALIASES.contains(&name)
}

pub fn is_allowed_table(name: &str) -> bool {
    ALLOWED_TABLES.contains(&name)
}
