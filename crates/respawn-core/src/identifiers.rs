//! Identifier and literal quoting shared by the dialect adapters.

/// The opening/closing characters an engine uses to delimit identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierQuotes {
    pub open: char,
    pub close: char,
}

impl IdentifierQuotes {
    /// ANSI double quotes (SQLite, PostgreSQL).
    pub const DOUBLE: Self = Self {
        open: '"',
        close: '"',
    };
    /// MySQL backticks.
    pub const BACKTICK: Self = Self {
        open: '`',
        close: '`',
    };
    /// SQL Server brackets.
    pub const BRACKET: Self = Self {
        open: '[',
        close: ']',
    };
}

/// Quote an identifier, doubling any embedded closing quote character.
pub fn quote_ident(ident: &str, quotes: IdentifierQuotes) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push(quotes.open);
    for c in ident.chars() {
        if c == quotes.close {
            out.push(c);
        }
        out.push(c);
    }
    out.push(quotes.close);
    out
}

/// Render a string literal, escaping single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Strip one pair of surrounding quote characters, if present.
pub fn strip_quotes(ident: &str) -> &str {
    let trimmed = ident.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next_back()) {
        (Some('"'), Some('"')) | (Some('`'), Some('`')) | (Some('['), Some(']'))
            if trimmed.len() >= 2 =>
        {
            &trimmed[1..trimmed.len() - 1]
        }
        _ => trimmed,
    }
}

/// The comparison key for an identifier: unquoted and ASCII-lowercased.
pub fn normalize_ident(ident: &str) -> String {
    strip_quotes(ident).to_ascii_lowercase()
}
