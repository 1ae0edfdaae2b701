mod themes;

use crate::editor::MindTree;
use crate::models::{CopyBorder, CopyFormat, ROOT_ID};
use serde::Serialize;
use themes::{connector, glyph, LinePosition};

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewLine {
    pub node_id: String,
    pub text: String,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub lines: Vec<PreviewLine>,
}

/// Render a tree as preview / clipboard text.
///
/// The sidebar preview and the copy button both go through here, so the two
/// can never disagree.
pub fn render(tree: &MindTree, format: CopyFormat, border: CopyBorder) -> Rendered {
    let mut lines = vec![];
    let mut open_levels = vec![];
    render_node(tree, ROOT_ID, 0, true, &mut open_levels, format, border, &mut lines);

    let text = lines
        .iter()
        .map(|l: &PreviewLine| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    Rendered { text, lines }
}

#[allow(clippy::too_many_arguments)]
fn render_node(
    tree: &MindTree,
    id: &str,
    depth: usize,
    is_last: bool,
    open_levels: &mut Vec<bool>,
    format: CopyFormat,
    border: CopyBorder,
    out: &mut Vec<PreviewLine>,
) {
    let pos = LinePosition {
        depth,
        is_last,
        open_levels: open_levels.as_slice(),
    };
    let mut line = connector(border, &pos);
    if let Some(g) = glyph(format, depth) {
        line.push_str(g);
        line.push(' ');
    }
    line.push_str(tree.text(id).unwrap_or_default());
    out.push(PreviewLine {
        node_id: id.to_string(),
        text: line,
    });

    let children = tree.children(id);
    // The root line carries no connector column, so only non-root levels push a flag.
    if depth > 0 {
        open_levels.push(!is_last);
    }
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        render_node(tree, child, depth + 1, last, open_levels, format, border, out);
    }
    if depth > 0 {
        open_levels.pop();
    }
}
