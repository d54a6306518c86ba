//! Turning document content into fill-in templates. Placeholders are
//! `{{ name }}` paragraphs, injected next to or instead of existing
//! paragraphs; variable names are derived from headings and kept
//! unique.

use std::collections::HashSet;

use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::docx::para;
use crate::docx::walker::{self, WalkOptions};
use crate::docx::xml::{XmlChild, XmlNode};
use crate::textutil::normalize_ws;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectMode {
    /// Add a placeholder paragraph directly after the target, inside
    /// the same parent.
    InsertAfter,
    /// Swap the paragraph's content for the placeholder, keeping the
    /// paragraph properties.
    Replace,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Injection {
    /// Ordinal in the document-order paragraph walk, the same index
    /// the label records carry. Table-cell paragraphs count.
    pub index: usize,
    pub var: String,
    pub mode: InjectMode,
}

pub fn placeholder_text(var: &str) -> String {
    format!("{{{{ {var} }}}}")
}

fn placeholder_paragraph(var: &str) -> XmlNode {
    XmlNode::new("w:p").with_child(placeholder_run(var))
}

fn placeholder_run(var: &str) -> XmlNode {
    XmlNode::new("w:r").with_child(
        XmlNode::new("w:t")
            .with_attr("xml:space", "preserve")
            .with_text(&placeholder_text(var)),
    )
}

/// Apply injections to a body element. Indexes address the paragraph
/// walk of the document (table cells and text boxes included), so they
/// line up with the label records. Higher indexes are applied first,
/// so each injection sees the positions the caller saw. Out-of-range
/// indexes are skipped with a warning.
pub fn apply_injections(body: &mut XmlNode, injections: &[Injection]) {
    let total = walker::paragraphs(body, WalkOptions::default()).count();
    let mut ordered: Vec<&Injection> = Vec::new();
    for inj in injections {
        if inj.index < total {
            ordered.push(inj);
        } else {
            warn!(
                "placeholder index {} is outside the {}-paragraph document",
                inj.index, total
            );
        }
    }
    ordered.sort_by(|a, b| b.index.cmp(&a.index));

    for inj in ordered {
        let mut next = 0usize;
        apply_at(body, inj, &mut next);
    }
}

/// Walk `node`'s children in paragraph-walk order, applying `inj` when
/// the running ordinal reaches its index. Returns true once applied.
fn apply_at(node: &mut XmlNode, inj: &Injection, next: &mut usize) -> bool {
    let mut i = 0;
    while i < node.children.len() {
        let mut insert_here = false;
        {
            let XmlChild::Element(child) = &mut node.children[i] else {
                i += 1;
                continue;
            };
            match child.name.as_str() {
                "w:sectPr" | "w:pPr" => {}
                "w:p" => {
                    let ordinal = *next;
                    *next += 1;
                    if ordinal == inj.index {
                        match inj.mode {
                            InjectMode::Replace => {
                                para::clear_content_keep_ppr(child);
                                child
                                    .children
                                    .push(XmlChild::Element(placeholder_run(&inj.var)));
                                return true;
                            }
                            InjectMode::InsertAfter => insert_here = true,
                        }
                    } else if apply_at(child, inj, next) {
                        return true;
                    }
                }
                _ => {
                    if apply_at(child, inj, next) {
                        return true;
                    }
                }
            }
        }
        if insert_here {
            node.children
                .insert(i + 1, XmlChild::Element(placeholder_paragraph(&inj.var)));
            return true;
        }
        i += 1;
    }
    false
}

const VAR_NAME_MAX_CHARS: usize = 60;

/// Derive a placeholder variable name from a heading. Word characters
/// survive, runs of anything else collapse to one underscore, and
/// overlong results are truncated with a digest tail so distinct
/// headings stay distinct.
pub fn make_var_name(title: &str) -> String {
    let collapsed = normalize_ws(title);
    let mut name = String::new();
    let mut gap = false;
    for c in collapsed.chars() {
        if c.is_alphanumeric() || c == '_' {
            if gap && !name.is_empty() {
                name.push('_');
            }
            gap = false;
            name.push(c);
        } else {
            gap = true;
        }
    }
    if name.is_empty() {
        name = "section".to_string();
    }
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        name = format!("sec_{name}");
    }
    if name.chars().count() > VAR_NAME_MAX_CHARS {
        let digest = hex::encode(Sha256::digest(collapsed.as_bytes()));
        let head: String = name.chars().take(VAR_NAME_MAX_CHARS - 9).collect();
        name = format!("{}_{}", head, &digest[..8]);
    }
    name
}

/// Hands out each base name once, then `base_2`, `base_3` and so on.
#[derive(Default)]
pub struct VarNames {
    used: HashSet<String>,
}

impl VarNames {
    pub fn claim(&mut self, base: &str) -> String {
        if self.used.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 2usize;
        loop {
            let candidate = format!("{base}_{n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
