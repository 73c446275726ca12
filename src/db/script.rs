//! SQL script loading and statement splitting.
//!
//! Scripts are split on top-level `;` only. Semicolons inside single-quoted strings,
//! quoted identifiers, dollar-quoted bodies and comments never end a statement, so
//! `CREATE FUNCTION ... AS $$ ... ; ... $$` survives as one statement.

use std::path::Path;

use crate::error::{SchemaError, SchemaResult};

/// One statement of a parsed script, comments removed and whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    /// 1-based position in the script.
    pub ordinal: usize,
    pub text: String,
}

pub async fn load_script(path: &Path) -> SchemaResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SchemaError::ScriptNotFound {
            path: path.to_path_buf(),
            source,
        })
}

pub fn split_statements(sql: &str) -> Vec<SqlStatement> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '-' if next == Some('-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if next == Some('*') => {
                i = skip_block_comment(&chars, i);
                // Keep tokens on either side of the comment apart.
                current.push(' ');
                continue;
            }
            '\'' => {
                let backslash_escapes = is_escape_string(&chars, i);
                i = copy_quoted(&chars, i, '\'', backslash_escapes, &mut current);
                continue;
            }
            '"' => {
                i = copy_quoted(&chars, i, '"', false, &mut current);
                continue;
            }
            '$' => {
                if let Some(tag) = dollar_tag(&chars, i) {
                    i = copy_dollar_quoted(&chars, i, &tag, &mut current);
                    continue;
                }
            }
            ';' => {
                push_statement(&mut statements, &mut current);
                i += 1;
                continue;
            }
            _ => {}
        }
        current.push(c);
        i += 1;
    }
    push_statement(&mut statements, &mut current);

    statements
}

fn push_statement(statements: &mut Vec<SqlStatement>, current: &mut String) {
    let text = current.trim();
    if !text.is_empty() {
        statements.push(SqlStatement {
            ordinal: statements.len() + 1,
            text: text.to_string(),
        });
    }
    current.clear();
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// `E'...'` strings treat backslash as an escape character.
fn is_escape_string(chars: &[char], quote: usize) -> bool {
    quote > 0
        && matches!(chars[quote - 1], 'E' | 'e')
        && (quote == 1 || !is_ident_char(chars[quote - 2]))
}

/// Returns the index just past the comment. Block comments nest in Postgres.
fn skip_block_comment(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match (chars[i], chars.get(i + 1).copied()) {
            ('/', Some('*')) => {
                depth += 1;
                i += 2;
            }
            ('*', Some('/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

fn copy_quoted(
    chars: &[char],
    start: usize,
    quote: char,
    backslash_escapes: bool,
    out: &mut String,
) -> usize {
    out.push(quote);
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if backslash_escapes && c == '\\' {
            out.push(c);
            if let Some(&escaped) = chars.get(i + 1) {
                out.push(escaped);
            }
            i += 2;
            continue;
        }
        out.push(c);
        if c == quote {
            if chars.get(i + 1) == Some(&quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Recognises `$$` or `$tag$` at `start`. Positional parameters (`$1`) and `$` inside
/// identifiers are not quote openers.
fn dollar_tag(chars: &[char], start: usize) -> Option<String> {
    if start > 0 && is_ident_char(chars[start - 1]) {
        return None;
    }
    if chars.get(start + 1).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut j = start + 1;
    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    if chars.get(j) == Some(&'$') {
        Some(chars[start..=j].iter().collect())
    } else {
        None
    }
}

fn copy_dollar_quoted(chars: &[char], start: usize, tag: &str, out: &mut String) -> usize {
    let tag: Vec<char> = tag.chars().collect();
    out.extend(&tag);
    let mut i = start + tag.len();
    while i < chars.len() {
        if chars[i..].starts_with(&tag) {
            out.extend(&tag);
            return i + tag.len();
        }
        out.push(chars[i]);
        i += 1;
    }
    chars.len()
}
