//! Removal passes over a package: generated tables of contents, runs
//! marked hidden, and header or footer references. Content-destructive
//! work happens on part trees; the zip round-trip leaves every
//! untouched entry byte-identical.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use log::info;

use crate::docx::locator::{self, SectionQuery};
use crate::docx::package::DocxPackage;
use crate::docx::para;
use crate::docx::styles::StyleTable;
use crate::docx::walker::{self, WalkOptions};
use crate::docx::xml::{parse_part, write_part, XmlChild, XmlNode};
use crate::error::{DocxError, Result};
use crate::heuristics::HeuristicRules;

#[derive(Clone, Copy, Debug, Default)]
pub struct StripOptions {
    pub toc: bool,
    pub hidden_runs: bool,
    pub header_footer_refs: bool,
    /// Sweep hidden runs out of header and footer parts too.
    pub include_header_footer: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StripReport {
    pub toc_blocks: usize,
    pub hidden_runs: usize,
    pub reference_elements: usize,
}

/// Drop body-level paragraphs that carry any table-of-contents signal.
pub fn strip_toc_blocks(body: &mut XmlNode) -> usize {
    let before = body.children.len();
    body.children.retain(|c| match c {
        XmlChild::Element(n) if n.name == "w:p" => !locator::is_toc_paragraph(n),
        _ => true,
    });
    before - body.children.len()
}

/// Remove `w:headerReference`/`w:footerReference` from every `w:sectPr`
/// in the tree, section breaks inside paragraph properties included.
pub fn remove_header_footer_refs(node: &mut XmlNode) -> usize {
    let mut removed = 0usize;
    if node.name == "w:sectPr" {
        let before = node.children.len();
        node.children.retain(|c| {
            !matches!(c, XmlChild::Element(n)
                if n.name == "w:headerReference" || n.name == "w:footerReference")
        });
        removed += before - node.children.len();
    }
    for child in node.elements_mut() {
        removed += remove_header_footer_refs(child);
    }
    removed
}

/// Delete hidden runs from every paragraph under `root`. Body-level
/// paragraphs the sweep leaves with no text and no drawing are dropped
/// outright; paragraphs inside table cells keep their place so the
/// cells stay well-formed.
pub fn strip_hidden_runs_tree(root: &mut XmlNode) -> usize {
    let mut removed = 0usize;
    if let Some(body) = block_container_mut(root) {
        body.children.retain_mut(|c| match c {
            XmlChild::Element(n) if n.name == "w:p" => {
                let dropped = para::remove_hidden_runs(n);
                removed += dropped;
                dropped == 0
                    || !para::paragraph_text(n).is_empty()
                    || para::has_drawing(n)
            }
            _ => true,
        });
    }
    let opts = WalkOptions {
        enter_text_boxes: false,
        ..WalkOptions::default()
    };
    walker::visit_paragraphs_mut(root, opts, &mut |p, _| {
        removed += para::remove_hidden_runs(p);
    });
    removed
}

fn block_container_mut(root: &mut XmlNode) -> Option<&mut XmlNode> {
    match root.name.as_str() {
        "w:body" => Some(root),
        "w:document" => root.child_mut("w:body"),
        _ => None,
    }
}

/// Apply the selected removals and write the package to `output`.
pub fn strip_file(input: &Path, output: &Path, opts: &StripOptions) -> Result<StripReport> {
    let pkg = DocxPackage::read(input)?;
    if pkg.part("word/document.xml").is_none() {
        return Err(DocxError::MissingPart("word/document.xml".to_string()));
    }

    let sweep_parts = opts.hidden_runs && opts.include_header_footer;
    let mut trees = walker::load_part_trees(&pkg, sweep_parts)?;
    let mut report = StripReport::default();
    let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();

    for (i, (name, tree)) in trees.iter_mut().enumerate() {
        let is_document = i == 0;
        let mut changed = 0usize;
        if is_document && opts.toc {
            let body = walker::body_of_mut(tree)?;
            report.toc_blocks = strip_toc_blocks(body);
            changed += report.toc_blocks;
        }
        if opts.hidden_runs {
            let n = strip_hidden_runs_tree(&mut tree.root);
            report.hidden_runs += n;
            changed += n;
        }
        if is_document && opts.header_footer_refs {
            report.reference_elements = remove_header_footer_refs(&mut tree.root);
            changed += report.reference_elements;
        }
        if changed > 0 {
            replacements.insert(name.clone(), write_part(tree)?);
        }
    }

    pkg.write_with_replacements(output, &replacements)?;
    info!(
        "stripped {} TOC blocks, {} hidden runs, {} header/footer references",
        report.toc_blocks, report.hidden_runs, report.reference_elements
    );
    Ok(report)
}

/// Locate a section and mark its runs hidden instead of deleting them,
/// so the document keeps its structure while Word shows nothing.
pub fn hide_file(
    input: &Path,
    output: &Path,
    query: &SectionQuery,
    include_heading: bool,
    rules: &HeuristicRules,
) -> Result<usize> {
    let pkg = DocxPackage::read(input)?;
    let doc_bytes = pkg
        .part("word/document.xml")
        .ok_or_else(|| DocxError::MissingPart("word/document.xml".to_string()))?;
    let styles_bytes = pkg
        .part("word/styles.xml")
        .ok_or_else(|| DocxError::MissingPart("word/styles.xml".to_string()))?;
    let mut doc = parse_part(doc_bytes).context("parsing word/document.xml")?;
    let styles = StyleTable::from_part(&parse_part(styles_bytes).context("parsing word/styles.xml")?.root);

    let range = {
        let body = walker::body_of(&doc)?;
        let blocks = walker::body_blocks(body);
        let mut range = locator::find_section_range(&blocks, &styles, query)?;
        if let Some(sub) = query.sub_heading.as_deref() {
            range = locator::refine_to_subheading(
                &blocks,
                &range,
                sub,
                query.strict_sub_match,
                rules.locator.subtitle_lookahead,
            )?;
        }
        range
    };

    let first = if include_heading {
        range.start
    } else {
        range.start + 1
    };
    let body = walker::body_of_mut(&mut doc)?;
    let positions = walker::body_block_indices(body);
    let opts = WalkOptions {
        enter_text_boxes: false,
        ..WalkOptions::default()
    };
    let mut hidden = 0usize;
    for &pos in positions.get(first..range.end).unwrap_or(&[]) {
        if let XmlChild::Element(block) = &mut body.children[pos] {
            if block.name == "w:p" {
                para::set_runs_hidden(block);
                hidden += 1;
            }
            walker::visit_paragraphs_mut(block, opts, &mut |p, _| {
                para::set_runs_hidden(p);
                hidden += 1;
            });
        }
    }

    let mut replacements = HashMap::new();
    replacements.insert("word/document.xml".to_string(), write_part(&doc)?);
    pkg.write_with_replacements(output, &replacements)?;
    info!("hid {hidden} paragraphs of '{}'", range.heading_text);
    Ok(hidden)
}
