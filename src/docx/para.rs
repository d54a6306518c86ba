//! Paragraph-level views and mutations shared by the locator, the
//! caption engine and the injector. A paragraph's text is the
//! concatenation of its `w:t` descendants; edits computed against that
//! concatenation are spliced back across the same nodes.

use crate::docx::xml::{XmlChild, XmlNode};

/// On/off property value: absent attribute means on, the usual off
/// spellings mean off.
pub fn parse_w_bool(val: Option<&str>) -> bool {
    match val {
        None => true,
        Some(s) => {
            !(s == "0"
                || s.eq_ignore_ascii_case("false")
                || s.eq_ignore_ascii_case("off")
                || s.eq_ignore_ascii_case("none"))
        }
    }
}

fn on_off_child(rpr: &XmlNode, tag: &str) -> Option<bool> {
    rpr.child(tag).map(|el| parse_w_bool(el.attr("w:val")))
}

/// One direct run of a paragraph, flattened for analysis.
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub text: String,
    /// Tri-state: explicitly bold, explicitly not bold, or unset.
    pub bold: Option<bool>,
    pub hidden: bool,
    /// A run character style can carry bold, so its presence counts as
    /// a formatting hint even when `bold` is unset.
    pub has_run_style: bool,
}

/// Direct `w:r` children, in order. Runs nested in hyperlinks or other
/// wrappers are not part of the inline-subtitle analysis.
pub fn paragraph_runs(p: &XmlNode) -> Vec<RunInfo> {
    let mut out = Vec::new();
    for r in p.children_named("w:r") {
        let mut text = String::new();
        for t in r.descendants_named("w:t") {
            text.push_str(&t.direct_text());
        }
        let (bold, hidden, has_run_style) = match r.child("w:rPr") {
            Some(rpr) => (
                on_off_child(rpr, "w:b"),
                on_off_child(rpr, "w:vanish") == Some(true),
                rpr.child("w:rStyle").is_some(),
            ),
            None => (None, false, false),
        };
        out.push(RunInfo {
            text,
            bold,
            hidden,
            has_run_style,
        });
    }
    out
}

/// Concatenated text of every `w:t` descendant.
pub fn paragraph_text(p: &XmlNode) -> String {
    let mut out = String::new();
    for t in p.descendants_named("w:t") {
        out.push_str(&t.direct_text());
    }
    out
}

pub fn style_id(p: &XmlNode) -> Option<&str> {
    p.child("w:pPr")?.child("w:pStyle")?.attr("w:val")
}

/// Outline level set directly on the paragraph properties.
pub fn direct_outline(p: &XmlNode) -> Option<i32> {
    p.child("w:pPr")?
        .child("w:outlineLvl")?
        .attr("w:val")?
        .parse()
        .ok()
}

/// Direct numbering reference `(numId, ilvl)`; either side may be
/// missing on its own.
pub fn direct_numpr(p: &XmlNode) -> (Option<i32>, Option<i32>) {
    let numpr = match p.child("w:pPr").and_then(|ppr| ppr.child("w:numPr")) {
        Some(n) => n,
        None => return (None, None),
    };
    let num_id = numpr
        .child("w:numId")
        .and_then(|n| n.attr("w:val"))
        .and_then(|v| v.parse().ok());
    let ilvl = numpr
        .child("w:ilvl")
        .and_then(|n| n.attr("w:val"))
        .and_then(|v| v.parse().ok());
    (num_id, ilvl)
}

pub fn has_drawing(p: &XmlNode) -> bool {
    p.has_descendant("w:drawing") || p.has_descendant("w:pict") || p.has_descendant("w:object")
}

/// Replace the text content of one `w:t`, adding `xml:space="preserve"`
/// when the new text would otherwise lose its edge whitespace.
pub fn set_wt_text(wt: &mut XmlNode, text: &str) {
    wt.children.clear();
    if !text.is_empty() {
        wt.children.push(XmlChild::Text(text.to_string()));
    }
    let needs_preserve =
        text.starts_with(|c: char| c.is_whitespace()) || text.ends_with(|c: char| c.is_whitespace());
    if needs_preserve && wt.attr("xml:space") != Some("preserve") {
        wt.set_attr("xml:space", "preserve");
    }
}

fn visit_wt_mut(node: &mut XmlNode, next: &mut usize, f: &mut impl FnMut(usize, &mut XmlNode)) {
    for child in node.elements_mut() {
        if child.name == "w:t" {
            f(*next, child);
            *next += 1;
        }
        visit_wt_mut(child, next, f);
    }
}

/// One replacement over the paragraph's concatenated text, in byte
/// offsets of that concatenation.
#[derive(Clone, Debug)]
pub struct TextEdit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

/// Apply non-overlapping edits to the paragraph text, distributing the
/// result across the underlying `w:t` nodes. A replacement is written
/// into the node where its edit starts; consumed stretches of later
/// nodes are dropped, so a numeral split across runs still rewrites
/// cleanly.
pub fn splice_text(p: &mut XmlNode, edits: &[TextEdit]) {
    if edits.is_empty() {
        return;
    }
    let mut edits: Vec<&TextEdit> = edits.iter().collect();
    edits.sort_by_key(|e| e.start);

    let texts: Vec<String> = p
        .descendants_named("w:t")
        .iter()
        .map(|t| t.direct_text())
        .collect();
    let mut bounds = Vec::with_capacity(texts.len());
    let mut offset = 0usize;
    for t in &texts {
        bounds.push((offset, offset + t.len()));
        offset += t.len();
    }

    let mut new_texts: Vec<String> = Vec::with_capacity(texts.len());
    for (i, t) in texts.iter().enumerate() {
        let (a, b) = bounds[i];
        let mut out = String::new();
        let mut cur = a;
        for e in &edits {
            if e.end <= a || e.start >= b {
                continue;
            }
            let s = e.start.max(a);
            if s > cur {
                out.push_str(&t[(cur - a)..(s - a)]);
            }
            if e.start >= a {
                out.push_str(&e.replacement);
            }
            cur = cur.max(e.end.min(b));
        }
        if cur < b {
            out.push_str(&t[(cur - a)..]);
        }
        new_texts.push(out);
    }

    visit_wt_mut(p, &mut 0, &mut |i, wt| {
        if new_texts[i] != texts[i] {
            set_wt_text(wt, &new_texts[i]);
        }
    });
}

/// Keep only the paragraph properties; used when a placeholder replaces
/// the paragraph's content.
pub fn clear_content_keep_ppr(p: &mut XmlNode) {
    p.children.retain(|c| matches!(c, XmlChild::Element(n) if n.name == "w:pPr"));
}

fn visit_runs_mut(node: &mut XmlNode, f: &mut impl FnMut(&mut XmlNode)) {
    for child in node.elements_mut() {
        if child.name == "w:r" {
            f(child);
        } else {
            visit_runs_mut(child, f);
        }
    }
}

/// Mark every run of the paragraph hidden (`w:vanish`).
pub fn set_runs_hidden(p: &mut XmlNode) {
    visit_runs_mut(p, &mut |run| {
        if run.child("w:rPr").is_none() {
            run.children
                .insert(0, XmlChild::Element(XmlNode::new("w:rPr")));
        }
        if let Some(rpr) = run.child_mut("w:rPr") {
            if rpr.child("w:vanish").is_none() {
                rpr.children
                    .push(XmlChild::Element(XmlNode::new("w:vanish")));
            }
        }
    });
}

fn run_is_hidden(run: &XmlNode) -> bool {
    run.child("w:rPr")
        .map(|rpr| on_off_child(rpr, "w:vanish") == Some(true))
        .unwrap_or(false)
}

/// Remove explicitly hidden runs anywhere in the paragraph. Returns how
/// many were dropped.
pub fn remove_hidden_runs(p: &mut XmlNode) -> usize {
    let mut removed = 0usize;
    fn rec(node: &mut XmlNode, removed: &mut usize) {
        node.children.retain(|c| match c {
            XmlChild::Element(n) if n.name == "w:r" && run_is_hidden(n) => {
                *removed += 1;
                false
            }
            _ => true,
        });
        for child in node.elements_mut() {
            if child.name != "w:r" {
                rec(child, removed);
            }
        }
    }
    rec(p, &mut removed);
    removed
}
