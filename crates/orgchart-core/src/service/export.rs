//! CSV projection of a plan.

use std::borrow::Cow;

use chrono::NaiveDate;

use crate::plan::{Node, Plan};

pub const CSV_HEADERS: [&str; 10] = [
    "ID",
    "Name",
    "Position",
    "Grade",
    "Level",
    "Parent ID",
    "Type",
    "Employment",
    "X",
    "Y",
];

/// Quote a field if it holds a comma, quote, or line break; double any
/// embedded quotes.
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn node_fields(node: &Node) -> [String; 10] {
    [
        node.id.clone(),
        node.name.clone(),
        node.position.clone(),
        node.grade.clone(),
        node.level.to_string(),
        node.parent_id.clone().unwrap_or_default(),
        node.node_type.clone(),
        node.employment.clone(),
        node.x.to_string(),
        node.y.to_string(),
    ]
}

fn push_record<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    let line: Vec<Cow<'_, str>> = fields.iter().map(|f| escape_field(f.as_ref())).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

/// Header plus one CRLF-terminated record per node, in plan order.
pub fn to_csv(plan: &Plan) -> String {
    let mut out = String::new();
    push_record(&mut out, &CSV_HEADERS);
    for node in &plan.nodes {
        push_record(&mut out, &node_fields(node));
    }
    out
}

/// `<name>_<YYYYMMDD>.csv`, with anything outside `[A-Za-z0-9_-]` in the
/// name replaced by `_`.
pub fn export_filename(name: &str, date: NaiveDate) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = if stem.is_empty() { "plan" } else { stem.as_str() };
    format!("{stem}_{}.csv", date.format("%Y%m%d"))
}
