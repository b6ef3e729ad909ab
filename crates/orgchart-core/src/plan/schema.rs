//! Declarative layout of a plan sheet.
//!
//! ```text
//! row 1   name    | <plan name>
//! row 2   period  | <period label>
//! row 3   memo    | <memo>
//! row 4   (blank)
//! row 5   node header row (NODE_COLUMNS labels)
//! row 6+  one node per row
//! ```
//!
//! Reading maps header labels to columns, so reordered or missing columns
//! fall back to defaults. Writing always uses [`NODE_COLUMNS`] order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use super::model::{DEFAULT_NODE_TYPE, Node};
use crate::store::{CellValue, Row, cell_text, is_blank};

pub const META_TOP_ROW: u32 = 1;
pub const META_LABELS: [&str; 3] = ["name", "period", "memo"];
pub const HEADER_ROW: u32 = 5;
pub const FIRST_NODE_ROW: u32 = HEADER_ROW + 1;

/// One column of the node block.
pub struct Column {
    /// Label written to the header row.
    pub header: &'static str,
    /// Field name, also accepted as a header label on read.
    pub field: &'static str,
    pub read: fn(&mut Node, &CellValue),
    pub write: fn(&Node, DateTime<Utc>) -> CellValue,
}

fn text(v: &CellValue) -> String {
    cell_text(v)
}

fn number(v: &CellValue) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flag(v: &CellValue) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

fn optional_text(s: &str) -> CellValue {
    if s.is_empty() { Value::Null } else { json!(s) }
}

/// Node block columns in persisted order.
pub static NODE_COLUMNS: [Column; 12] = [
    Column {
        header: "ID",
        field: "id",
        read: |n, v| n.id = text(v),
        write: |n, _| json!(n.id),
    },
    Column {
        header: "Name",
        field: "name",
        read: |n, v| n.name = text(v),
        write: |n, _| optional_text(&n.name),
    },
    Column {
        header: "Position",
        field: "position",
        read: |n, v| n.position = text(v),
        write: |n, _| optional_text(&n.position),
    },
    Column {
        header: "Grade",
        field: "grade",
        read: |n, v| n.grade = text(v),
        write: |n, _| optional_text(&n.grade),
    },
    Column {
        header: "Level",
        field: "level",
        read: |n, v| n.level = number(v).map_or(0, |f| f as i64),
        write: |n, _| json!(n.level),
    },
    Column {
        header: "Parent ID",
        field: "parentId",
        read: |n, v| n.parent_id = Some(text(v)).filter(|s| !s.is_empty()),
        write: |n, _| n.parent_id.as_deref().map_or(Value::Null, |p| json!(p)),
    },
    Column {
        header: "Type",
        field: "type",
        read: |n, v| {
            n.node_type = Some(text(v))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_NODE_TYPE.to_string())
        },
        write: |n, _| json!(n.node_type),
    },
    Column {
        header: "Employment",
        field: "employment",
        read: |n, v| n.employment = text(v),
        write: |n, _| optional_text(&n.employment),
    },
    Column {
        header: "X",
        field: "x",
        read: |n, v| n.x = number(v).unwrap_or(0.0),
        write: |n, _| json!(n.x),
    },
    Column {
        header: "Y",
        field: "y",
        read: |n, v| n.y = number(v).unwrap_or(0.0),
        write: |n, _| json!(n.y),
    },
    Column {
        header: "Arranged",
        field: "isArranged",
        read: |n, v| n.is_arranged = flag(v),
        write: |n, _| json!(n.is_arranged),
    },
    Column {
        header: "Updated At",
        field: "updatedAt",
        read: |n, v| {
            n.updated_at = DateTime::parse_from_rfc3339(&text(v))
                .ok()
                .map(|t| t.with_timezone(&Utc))
        },
        write: |_, now| json!(now.to_rfc3339()),
    },
];

pub fn node_width() -> u32 {
    NODE_COLUMNS.len() as u32
}

pub fn header_row() -> Row {
    NODE_COLUMNS.iter().map(|c| json!(c.header)).collect()
}

pub fn node_row(node: &Node, now: DateTime<Utc>) -> Row {
    NODE_COLUMNS.iter().map(|c| (c.write)(node, now)).collect()
}

/// Rows 1-3 of a plan sheet: label in column A, value in column B.
pub fn meta_rows(name: &str, period: &str, memo: &str) -> Vec<Row> {
    META_LABELS
        .iter()
        .zip([name, period, memo])
        .map(|(label, value)| vec![json!(label), json!(value)])
        .collect()
}

/// Read `(name, period, memo)` from the metadata block.
pub fn parse_meta(rows: &[Row]) -> (String, String, String) {
    let value = |i: usize| {
        rows.get(i)
            .and_then(|r| r.get(1))
            .map(cell_text)
            .unwrap_or_default()
    };
    (value(0), value(1), value(2))
}

fn normalize(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Parse a node block whose first row is the header row.
///
/// Rows with a blank id are padding and are skipped.
pub fn parse_nodes(block: &[Row]) -> Vec<Node> {
    let Some((header, rows)) = block.split_first() else {
        return Vec::new();
    };

    let by_label: HashMap<String, &Column> = NODE_COLUMNS
        .iter()
        .flat_map(|c| [(normalize(c.header), c), (normalize(c.field), c)])
        .collect();
    let layout: Vec<Option<&Column>> = header
        .iter()
        .map(|h| by_label.get(&normalize(&cell_text(h))).copied())
        .collect();

    let Some(id_col) = layout
        .iter()
        .position(|c| c.is_some_and(|c| c.field == "id"))
    else {
        return Vec::new();
    };

    rows.iter()
        .filter(|row| row.get(id_col).is_some_and(|v| !is_blank(v)))
        .map(|row| {
            let mut node = Node::new(String::new());
            for (col, value) in layout.iter().zip(row) {
                if let Some(col) = col {
                    (col.read)(&mut node, value);
                }
            }
            node
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_parse_preserves_fields() {
        let now = Utc::now();
        let mut node = Node::new("n2");
        node.name = "Acme, \"Inc\"".into();
        node.grade = "M2".into();
        node.level = 2;
        node.parent_id = Some("n1".into());
        node.node_type = "new".into();
        node.x = 120.5;
        node.is_arranged = true;

        let parsed = parse_nodes(&[header_row(), node_row(&node, now)]);
        assert_eq!(parsed.len(), 1);
        let back = &parsed[0];
        assert_eq!(back.name, node.name);
        assert_eq!(back.parent_id.as_deref(), Some("n1"));
        assert_eq!(back.node_type, "new");
        assert_eq!(back.x, 120.5);
        assert!(back.is_arranged);
        assert!(back.updated_at.is_some());
    }

    #[test]
    fn reordered_and_missing_columns_fall_back_to_defaults() {
        let block = vec![
            vec![json!("name"), json!("Parent ID"), json!("id"), json!("level")],
            vec![json!("Root"), Value::Null, json!("r"), json!("n/a")],
            vec![json!("Child"), json!("r"), json!(7), json!(1)],
        ];
        let nodes = parse_nodes(&block);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, "r");
        assert_eq!(nodes[0].level, 0, "non-numeric level defaults to 0");
        assert_eq!(nodes[0].grade, "");
        assert_eq!(nodes[0].node_type, "existing");
        assert_eq!(nodes[1].id, "7", "numeric ids read back as text");
        assert_eq!(nodes[1].parent_id.as_deref(), Some("r"));
    }

    #[test]
    fn blank_id_rows_are_padding() {
        let block = vec![
            header_row(),
            vec![Value::Null, json!("ghost")],
            vec![json!("  "), json!("ghost")],
            vec![json!("n1"), json!("real")],
        ];
        let nodes = parse_nodes(&block);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "real");
    }

    #[test]
    fn block_without_id_header_is_empty() {
        let block = vec![vec![json!("Name")], vec![json!("x")]];
        assert!(parse_nodes(&block).is_empty());
        assert!(parse_nodes(&[]).is_empty());
    }

    #[test]
    fn meta_round_trip() {
        let rows = meta_rows("Q1 proposal", "2026-01", "");
        assert_eq!(
            parse_meta(&rows),
            ("Q1 proposal".into(), "2026-01".into(), String::new())
        );
    }
}
