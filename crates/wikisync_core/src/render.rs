use std::fmt::Write as _;

use html_escape::encode_text;

use crate::diff::{DiffLine, DiffRow, LineKind, PageDiff};

pub const NEW_PAGE_MARKER: &str = "Newly created page (no prior revision)";
pub const NO_CHANGES_MARKER: &str = "No differences between the compared revisions";

const DIFF_STYLE: &str = r#"
body {
  font-family: system-ui, sans-serif;
  margin: 20px;
}
table.diff {
  border-collapse: collapse;
  font-family: monospace;
  width: 100%;
  table-layout: fixed;
}
table.diff td {
  padding: 0 5px;
  vertical-align: top;
  white-space: pre-wrap;
  word-break: break-all;
  font-size: 14px;
  line-height: 1.4;
}
table.diff col.diff-marker {
  width: 20px;
}
table.diff col.diff-content {
  width: 50%;
}
.diff-lineno {
  background-color: #f0f0f0;
  font-weight: bold;
  padding: 0 4px;
}
.diff-marker {
  font-weight: bold;
  text-align: right;
  padding: 0 4px;
}
.diff-addedline {
  background-color: #dfd;
  border-left: 4px solid #080;
}
.diff-deletedline {
  background-color: #fee8e8;
  border-left: 4px solid #800;
}
.diff-context {
  background-color: #fafafa;
  border-left: 4px solid #ccc;
  color: #777;
}
.diff-multi {
  color: #555;
  font-style: italic;
  text-align: center;
}
.plus-marker {
  color: #080;
}
.minus-marker {
  color: #800;
}
.diffchange.added {
  background-color: #9e9;
  color: #000;
  font-weight: bold;
}
.diffchange.deleted {
  background-color: #faa;
  color: #000;
  font-weight: bold;
  text-decoration: line-through;
}
p.new-page {
  color: green;
  font-weight: bold;
}
p.no-changes {
  color: #777;
}
"#;

/// Self-contained HTML document for one page diff.
pub fn render_diff_document(title: &str, timestamp: &str, diff: &PageDiff) -> String {
    let title = encode_text(title);
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
    let _ = write!(html, "<title>Diff: {title}</title>\n<style>{DIFF_STYLE}</style></head><body>\n");
    let _ = writeln!(html, "<h2>{title}</h2>");
    let _ = writeln!(html, "<p>Modified: {}</p>", encode_text(timestamp));
    html.push_str(&render_diff_body(diff));
    html.push_str("</body></html>\n");
    html
}

pub fn render_diff_body(diff: &PageDiff) -> String {
    match diff {
        PageDiff::NewPage => format!("<p class=\"new-page\">{NEW_PAGE_MARKER}</p>\n"),
        PageDiff::Compared(rows) if rows.is_empty() => {
            format!("<p class=\"no-changes\">{NO_CHANGES_MARKER}</p>\n")
        }
        PageDiff::Compared(rows) => {
            let mut html = String::from(concat!(
                "<table class=\"diff\">\n<colgroup>",
                "<col class=\"diff-marker\"><col class=\"diff-content\">",
                "<col class=\"diff-marker\"><col class=\"diff-content\">",
                "</colgroup>\n"
            ));
            for row in rows {
                html.push_str(&render_row(row));
            }
            html.push_str("</table>\n");
            html
        }
    }
}

fn render_row(row: &DiffRow) -> String {
    match row {
        DiffRow::LineNumbers { old, new } => format!(
            "<tr><td colspan=\"2\" class=\"diff-lineno\">{}</td><td colspan=\"2\" class=\"diff-lineno\">{}</td></tr>\n",
            encode_text(old),
            encode_text(new)
        ),
        DiffRow::Notice { text } => format!(
            "<tr><td colspan=\"4\" class=\"diff-multi\">{}</td></tr>\n",
            encode_text(text)
        ),
        DiffRow::Lines { old, new } => format!(
            "<tr>{}{}</tr>\n",
            render_side(old.as_ref()),
            render_side(new.as_ref())
        ),
    }
}

fn render_side(line: Option<&DiffLine>) -> String {
    let Some(line) = line else {
        return "<td colspan=\"2\" class=\"diff-empty\"></td>".to_string();
    };
    let (marker, class, change_class) = match line.kind {
        LineKind::Added => ("<span class=\"plus-marker\">+</span>", "diff-addedline", "added"),
        LineKind::Deleted => ("<span class=\"minus-marker\">−</span>", "diff-deletedline", "deleted"),
        LineKind::Context => ("", "diff-context", "context"),
    };

    let mut content = String::new();
    for segment in &line.segments {
        if segment.changed {
            let _ = write!(
                content,
                "<span class=\"diffchange {change_class}\">{}</span>",
                encode_text(&segment.text)
            );
        } else {
            content.push_str(&encode_text(&segment.text));
        }
    }
    format!("<td class=\"diff-marker\">{marker}</td><td class=\"{class}\"><div>{content}</div></td>")
}
