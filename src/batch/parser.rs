//! Batch request parser.
//!
//! A request is one or more clauses separated by the bare word `AND`:
//!
//! ```text
//! review "tighten auth checks" src/auth.py AND test src/auth.py AND docs README.md
//! ```
//!
//! Each clause is `<type> ["<description>"] <file>...`. The first quoted span
//! is the description; every other token is a file path. Tokenizing happens
//! before splitting, so `AND` inside quotes is just text.

use crate::error::RequestError;

use super::task::{Task, TaskId, TaskKind};

/// The unquoted token separating clauses.
const CLAUSE_SEPARATOR: &str = "AND";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
}

/// Parse a batch request into tasks with ids assigned from 1 in input order.
///
/// Empty clauses are skipped. A request yielding no tasks at all is an
/// error, as is any clause naming an unknown task type.
pub fn parse_request(request: &str) -> Result<Vec<Task>, RequestError> {
    let tokens = tokenize(request)?;

    let mut tasks = Vec::new();
    let mut next_id: TaskId = 1;

    for clause in tokens.split(|t| matches!(t, Token::Word(w) if w == CLAUSE_SEPARATOR)) {
        if clause.is_empty() {
            continue;
        }

        let task = parse_clause(clause, next_id)?;
        tracing::debug!(id = task.id, kind = %task.kind, files = task.files.len(), "parsed task");
        tasks.push(task);
        next_id += 1;
    }

    if tasks.is_empty() {
        return Err(RequestError::Empty);
    }

    Ok(tasks)
}

fn parse_clause(clause: &[Token], id: TaskId) -> Result<Task, RequestError> {
    let (head, rest) = clause.split_first().ok_or(RequestError::Empty)?;

    let kind: TaskKind = match head {
        Token::Word(word) => word.parse()?,
        Token::Quoted(_) => return Err(RequestError::MissingKind { clause: id as usize }),
    };

    let mut description: Option<String> = None;
    let mut files: Vec<String> = Vec::new();

    for token in rest {
        match token {
            Token::Quoted(text) if description.is_none() => {
                description = Some(text.trim().to_string());
            }
            Token::Quoted(text) | Token::Word(text) => {
                if !text.is_empty() && !files.contains(text) {
                    files.push(text.clone());
                }
            }
        }
    }

    let description = description
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("{kind} task"));

    Ok(Task {
        id,
        kind,
        description,
        files,
    })
}

/// Split on whitespace, treating a double-quoted span as part of a single
/// token. A token that contained any quoted span is a [`Token::Quoted`].
fn tokenize(input: &str) -> Result<Vec<Token>, RequestError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut in_quotes = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
                in_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(finish_token(&mut current, quoted));
                    in_token = false;
                    quoted = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_quotes {
        return Err(RequestError::UnterminatedQuote);
    }
    if in_token {
        tokens.push(finish_token(&mut current, quoted));
    }

    Ok(tokens)
}

fn finish_token(current: &mut String, quoted: bool) -> Token {
    let text = std::mem::take(current);
    if quoted {
        Token::Quoted(text)
    } else {
        Token::Word(text)
    }
}
