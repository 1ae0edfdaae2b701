use crate::models::{CopyBorder, CopyFormat};

pub(crate) struct Theme {
    pub format: CopyFormat,
    /// Glyph per depth; deeper levels reuse the last entry.
    pub glyphs: &'static [&'static str],
}

pub(crate) static THEMES: &[Theme] = &[
    Theme {
        format: CopyFormat::Simple,
        glyphs: &[],
    },
    Theme {
        format: CopyFormat::Hiyoko,
        glyphs: &["🐔", "🐤", "🐣", "🥚"],
    },
    Theme {
        format: CopyFormat::Family,
        glyphs: &["👴", "👨", "👦", "👶"],
    },
];

pub(crate) fn glyph(format: CopyFormat, depth: usize) -> Option<&'static str> {
    let theme = THEMES.iter().find(|t| t.format == format)?;
    let last = theme.glyphs.len().checked_sub(1)?;
    theme.glyphs.get(depth.min(last)).copied()
}

/// Where a line sits relative to its ancestors and siblings.
pub(crate) struct LinePosition<'a> {
    pub depth: usize,
    pub is_last: bool,
    /// One flag per ancestor level below the root: does that ancestor have
    /// siblings rendered after it?
    pub open_levels: &'a [bool],
}

type ConnectorFn = fn(&LinePosition<'_>) -> String;

pub(crate) static BORDERS: &[(CopyBorder, ConnectorFn)] = &[
    (CopyBorder::Border, box_connector),
    (CopyBorder::None, indent_only),
];

pub(crate) fn connector(border: CopyBorder, pos: &LinePosition<'_>) -> String {
    BORDERS
        .iter()
        .find(|(b, _)| *b == border)
        .map(|(_, f)| f(pos))
        .unwrap_or_default()
}

fn box_connector(pos: &LinePosition<'_>) -> String {
    if pos.depth == 0 {
        return String::new();
    }
    let mut out = String::new();
    for open in pos.open_levels {
        out.push_str(if *open { "│  " } else { "   " });
    }
    out.push_str(if pos.is_last { "└─ " } else { "├─ " });
    out
}

fn indent_only(pos: &LinePosition<'_>) -> String {
    "   ".repeat(pos.depth)
}
