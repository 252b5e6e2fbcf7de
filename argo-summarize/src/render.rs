//! Text renderings of results and history.

use argo_types::{ConversationEntry, ResultSet, Value};

fn cells(result: &ResultSet, max_rows: usize) -> Vec<Vec<String>> {
    result
        .rows
        .iter()
        .take(max_rows)
        .map(|row| row.iter().map(Value::to_string).collect())
        .collect()
}

fn widths(headers: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect()
}

fn is_numeric_column(result: &ResultSet, col: usize) -> bool {
    let mut seen = false;
    for row in &result.rows {
        match row.get(col) {
            Some(Value::Int(_)) | Some(Value::Float(_)) => seen = true,
            Some(Value::Null) | None => {}
            Some(_) => return false,
        }
    }
    seen
}

/// Plain right-aligned table of at most `max_rows` rows, used inside prompts.
pub fn preview_table(result: &ResultSet, max_rows: usize) -> String {
    if result.columns.is_empty() {
        return "(no columns)".to_string();
    }
    let rows = cells(result, max_rows);
    let widths = widths(&result.columns, &rows);
    let line = |fields: &[String]| {
        fields
            .iter()
            .zip(&widths)
            .map(|(f, w)| format!("{f:>w$}", w = *w))
            .collect::<Vec<_>>()
            .join("  ")
    };

    let mut out = vec![line(&result.columns)];
    out.extend(rows.iter().map(|r| line(r)));
    if result.len() > max_rows {
        out.push(format!("({} rows total, first {} shown)", result.len(), max_rows));
    }
    out.join("\n")
}

/// Markdown pipe table of at most `max_rows` rows; numeric columns right-aligned.
pub fn markdown_table(result: &ResultSet, max_rows: usize) -> String {
    if result.columns.is_empty() {
        return String::new();
    }
    let rows: Vec<Vec<String>> = cells(result, max_rows)
        .into_iter()
        .map(|r| r.into_iter().map(|c| c.replace('|', "\\|")).collect())
        .collect();
    let widths = widths(&result.columns, &rows);
    let numeric: Vec<bool> = (0..result.columns.len())
        .map(|i| is_numeric_column(result, i))
        .collect();

    let line = |fields: &[String]| {
        let padded = fields
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let w = widths[i];
                if numeric[i] {
                    format!("{f:>w$}")
                } else {
                    format!("{f:<w$}")
                }
            })
            .collect::<Vec<_>>();
        format!("| {} |", padded.join(" | "))
    };
    let rule = widths
        .iter()
        .zip(&numeric)
        .map(|(w, num)| {
            let dashes = "-".repeat((*w).max(3) - 1);
            if *num {
                format!("{dashes}:")
            } else {
                format!(":{dashes}")
            }
        })
        .collect::<Vec<_>>();

    let mut out = vec![line(&result.columns), format!("|{}|", rule.iter().map(|r| format!(" {r} ")).collect::<Vec<_>>().join("|"))];
    out.extend(rows.iter().map(|r| line(r)));
    out.join("\n")
}

/// Prior turns, oldest first, as a User/Assistant transcript.
pub fn transcript(history: &[ConversationEntry]) -> String {
    history
        .iter()
        .map(|e| format!("User: {}\nAssistant: {}", e.user_message, e.ai_response))
        .collect::<Vec<_>>()
        .join("\n")
}
