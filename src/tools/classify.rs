//! Statement classification for `execute_query`.
//!
//! Decides whether a statement produces a result set (fetch rows) or only an
//! affected-row count. Uses [sqlparser](https://docs.rs/sqlparser/) with the
//! PostgreSQL dialect, falling back to the leading keyword when the parser
//! does not understand the statement.

use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

/// What a statement sends back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementOutput {
    /// A result set (SELECT, EXPLAIN, SHOW, VALUES, anything with RETURNING).
    Rows,
    /// Only a command tag with an affected-row count.
    AffectedCount,
}

/// Leading keywords that produce rows when the parser gives up.
const ROW_KEYWORDS: &[&str] = &["SELECT", "WITH", "VALUES", "TABLE", "SHOW", "EXPLAIN", "FETCH"];

/// Classify one statement. `sql` should use `$n` placeholders.
pub fn classify(sql: &str) -> StatementOutput {
    let dialect = PostgreSqlDialect {};

    let tokens = match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => tokens,
        Err(_) => return classify_by_leading_word(sql),
    };
    if has_returning_clause(&tokens) {
        return StatementOutput::Rows;
    }

    match Parser::parse_sql(&dialect, sql) {
        Ok(statements) => match statements.first() {
            Some(stmt) => classify_statement(stmt),
            None => StatementOutput::AffectedCount,
        },
        Err(_) => classify_tokens(&tokens),
    }
}

fn classify_statement(stmt: &Statement) -> StatementOutput {
    match stmt {
        // WITH ... INSERT/UPDATE/DELETE without RETURNING only reports a count
        Statement::Query(query)
            if matches!(
                *query.body,
                SetExpr::Insert(_) | SetExpr::Update(_) | SetExpr::Delete(_)
            ) =>
        {
            StatementOutput::AffectedCount
        }
        Statement::Query(_)
        | Statement::Explain { .. }
        | Statement::ExplainTable { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. } => StatementOutput::Rows,
        _ => StatementOutput::AffectedCount,
    }
}

/// An unquoted RETURNING outside parentheses; one inside a CTE feeds the CTE only.
fn has_returning_clause(tokens: &[Token]) -> bool {
    let mut depth = 0usize;
    tokens.iter().any(|t| match t {
        Token::LParen => {
            depth += 1;
            false
        }
        Token::RParen => {
            depth = depth.saturating_sub(1);
            false
        }
        Token::Word(w) => depth == 0 && w.quote_style.is_none() && w.keyword == Keyword::RETURNING,
        _ => false,
    })
}

fn classify_tokens(tokens: &[Token]) -> StatementOutput {
    let mut words = tokens.iter().enumerate().filter_map(|(i, t)| match t {
        Token::Word(w) => Some((i, w)),
        _ => None,
    });
    let Some((first_index, first)) = words.next() else {
        return StatementOutput::AffectedCount;
    };
    if first.keyword == Keyword::WITH {
        return classify_cte_body(&tokens[first_index + 1..]);
    }
    if ROW_KEYWORDS.contains(&first.value.to_uppercase().as_str()) {
        StatementOutput::Rows
    } else {
        StatementOutput::AffectedCount
    }
}

/// The statement after a CTE list is its first keyword outside parentheses.
fn classify_cte_body(tokens: &[Token]) -> StatementOutput {
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Word(w) if depth == 0 => match w.keyword {
                Keyword::SELECT | Keyword::VALUES | Keyword::TABLE => return StatementOutput::Rows,
                Keyword::INSERT | Keyword::UPDATE | Keyword::DELETE | Keyword::MERGE => {
                    return StatementOutput::AffectedCount;
                }
                _ => {}
            },
            _ => {}
        }
    }
    StatementOutput::Rows
}

fn classify_by_leading_word(sql: &str) -> StatementOutput {
    let word: String = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if ROW_KEYWORDS.contains(&word.to_uppercase().as_str()) {
        StatementOutput::Rows
    } else {
        StatementOutput::AffectedCount
    }
}
