//! Document-order traversal over part trees. The block vocabulary is
//! deliberately closed: consumers match on paragraphs and tables and
//! nothing else, while the walker handles the nesting (table cells,
//! structured tags, text boxes).

use anyhow::Context;

use crate::docx::package::DocxPackage;
use crate::docx::xml::{parse_part, XmlChild, XmlNode, XmlTree};

#[derive(Clone, Copy, Debug)]
pub struct WalkOptions {
    /// Descend into table rows and cells.
    pub enter_tables: bool,
    /// Descend into text-box content nested in runs.
    pub enter_text_boxes: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions {
            enter_tables: true,
            enter_text_boxes: true,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Block<'a> {
    Paragraph(&'a XmlNode),
    Table(&'a XmlNode),
}

#[derive(Clone, Copy, Debug)]
pub struct WalkItem<'a> {
    pub block: Block<'a>,
    /// True when the block sits inside a table cell.
    pub in_table: bool,
}

struct Frame<'a> {
    node: &'a XmlNode,
    child_idx: usize,
    in_table: bool,
}

/// Lazy iterator over the blocks under `root` (the root itself is not
/// yielded). Creating it is cheap, so a restart is a new call.
pub struct BlockWalker<'a> {
    stack: Vec<Frame<'a>>,
    opts: WalkOptions,
}

pub fn walk(root: &XmlNode, opts: WalkOptions) -> BlockWalker<'_> {
    BlockWalker {
        stack: vec![Frame {
            node: root,
            child_idx: 0,
            in_table: false,
        }],
        opts,
    }
}

impl<'a> Iterator for BlockWalker<'a> {
    type Item = WalkItem<'a>;

    fn next(&mut self) -> Option<WalkItem<'a>> {
        loop {
            let frame = self.stack.last_mut()?;
            let children = &frame.node.children;
            if frame.child_idx >= children.len() {
                self.stack.pop();
                continue;
            }
            let idx = frame.child_idx;
            frame.child_idx += 1;
            let in_table = frame.in_table;
            let child = match &children[idx] {
                XmlChild::Element(n) => n,
                _ => continue,
            };
            match child.name.as_str() {
                "w:p" => {
                    // Text boxes hang off the paragraph's runs, so the
                    // paragraph is entered after being yielded.
                    self.stack.push(Frame {
                        node: child,
                        child_idx: 0,
                        in_table,
                    });
                    return Some(WalkItem {
                        block: Block::Paragraph(child),
                        in_table,
                    });
                }
                "w:tbl" => {
                    if self.opts.enter_tables {
                        self.stack.push(Frame {
                            node: child,
                            child_idx: 0,
                            in_table: true,
                        });
                    }
                    return Some(WalkItem {
                        block: Block::Table(child),
                        in_table,
                    });
                }
                "w:sectPr" | "w:pPr" => {}
                "w:txbxContent" if !self.opts.enter_text_boxes => {}
                _ => {
                    self.stack.push(Frame {
                        node: child,
                        child_idx: 0,
                        in_table,
                    });
                }
            }
        }
    }
}

/// Every paragraph under `root` in document order.
pub fn paragraphs<'a>(root: &'a XmlNode, opts: WalkOptions) -> impl Iterator<Item = &'a XmlNode> {
    walk(root, opts).filter_map(|item| match item.block {
        Block::Paragraph(p) => Some(p),
        _ => None,
    })
}

/// Paragraphs of one top-level block, the block itself included when it
/// is a paragraph.
pub fn block_paragraphs<'a>(block: &'a XmlNode, opts: WalkOptions) -> Vec<&'a XmlNode> {
    let mut out = Vec::new();
    if block.name == "w:p" {
        out.push(block);
    }
    out.extend(paragraphs(block, opts));
    out
}

/// Mutable twin of [`paragraphs`]: applies `f` to every paragraph under
/// `root` in the same document order, with its in-table flag.
pub fn visit_paragraphs_mut<F>(root: &mut XmlNode, opts: WalkOptions, f: &mut F)
where
    F: FnMut(&mut XmlNode, bool),
{
    visit_paragraphs_rec(root, opts, false, f);
}

fn visit_paragraphs_rec<F>(node: &mut XmlNode, opts: WalkOptions, in_table: bool, f: &mut F)
where
    F: FnMut(&mut XmlNode, bool),
{
    for child in node.elements_mut() {
        match child.name.as_str() {
            "w:sectPr" | "w:pPr" => continue,
            "w:txbxContent" if !opts.enter_text_boxes => continue,
            "w:tbl" if !opts.enter_tables => continue,
            "w:p" => {
                f(child, in_table);
                visit_paragraphs_rec(child, opts, in_table, f);
            }
            "w:tbl" => visit_paragraphs_rec(child, opts, true, f),
            _ => visit_paragraphs_rec(child, opts, in_table, f),
        }
    }
}

/// The `w:body` element of a document part.
pub fn body_of(tree: &XmlTree) -> anyhow::Result<&XmlNode> {
    tree.root.child("w:body").context("missing w:body")
}

pub fn body_of_mut(tree: &mut XmlTree) -> anyhow::Result<&mut XmlNode> {
    tree.root.child_mut("w:body").context("missing w:body")
}

/// Indices (into `body.children`) of the top-level blocks, excluding
/// the trailing body-level section properties.
pub fn body_block_indices(body: &XmlNode) -> Vec<usize> {
    let mut out = Vec::new();
    for (i, c) in body.children.iter().enumerate() {
        if let XmlChild::Element(n) = c {
            if n.name != "w:sectPr" {
                out.push(i);
            }
        }
    }
    out
}

pub fn body_sectpr_index(body: &XmlNode) -> Option<usize> {
    body.children.iter().position(
        |c| matches!(c, XmlChild::Element(n) if n.name == "w:sectPr"),
    )
}

/// Top-level block elements of the body in order, the trailing
/// `w:sectPr` excluded. Index-aligned with [`body_block_indices`].
pub fn body_blocks(body: &XmlNode) -> Vec<&XmlNode> {
    body.elements().filter(|n| n.name != "w:sectPr").collect()
}

/// Header and footer part targets from the body's relationships, in
/// relationship order. A package without the rels part yields none.
pub fn header_footer_part_names(pkg: &DocxPackage) -> anyhow::Result<Vec<String>> {
    let bytes = match pkg.part("word/_rels/document.xml.rels") {
        Some(b) => b,
        None => return Ok(Vec::new()),
    };
    let tree = parse_part(bytes).context("parse word/_rels/document.xml.rels")?;
    Ok(header_footer_targets(&tree.root))
}

fn header_footer_targets(relationships: &XmlNode) -> Vec<String> {
    let mut out = Vec::new();
    for rel in relationships.children_named("Relationship") {
        let ty = rel.attr("Type").unwrap_or("");
        if !(ty.ends_with("/header") || ty.ends_with("/footer")) {
            continue;
        }
        if let Some(target) = rel.attr("Target") {
            let name = if let Some(stripped) = target.strip_prefix('/') {
                stripped.to_string()
            } else {
                format!("word/{target}")
            };
            out.push(name);
        }
    }
    out
}

/// Parsed trees of the body part and, when requested, every referenced
/// header/footer part that exists. The body part must be present.
pub fn load_part_trees(
    pkg: &DocxPackage,
    include_header_footer: bool,
) -> anyhow::Result<Vec<(String, XmlTree)>> {
    let body_bytes = pkg
        .part("word/document.xml")
        .context("missing word/document.xml")?;
    let mut out = vec![(
        "word/document.xml".to_string(),
        parse_part(body_bytes).context("parse word/document.xml")?,
    )];
    if include_header_footer {
        for name in header_footer_part_names(pkg)? {
            if let Some(bytes) = pkg.part(&name) {
                let tree = parse_part(bytes).with_context(|| format!("parse {name}"))?;
                out.push((name, tree));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{
        block_paragraphs, body_block_indices, body_sectpr_index, header_footer_targets,
        paragraphs, walk, Block, WalkOptions,
    };
    use crate::docx::para::paragraph_text;
    use crate::docx::xml::parse_part;

    const NESTED_BODY: &str = "<w:body>\
        <w:p><w:r><w:t>first</w:t></w:r></w:p>\
        <w:tbl><w:tr><w:tc>\
            <w:p><w:r><w:t>cell</w:t></w:r></w:p>\
            <w:tbl><w:tr><w:tc><w:p><w:r><w:t>inner</w:t></w:r></w:p></w:tc></w:tr></w:tbl>\
        </w:tc></w:tr></w:tbl>\
        <w:p><w:r><w:t>last</w:t></w:r></w:p>\
        <w:sectPr/>\
        </w:body>";

    #[test]
    fn yields_blocks_in_document_order() {
        let tree = parse_part(NESTED_BODY.as_bytes()).expect("parse");
        let kinds: Vec<String> = walk(&tree.root, WalkOptions::default())
            .map(|item| match item.block {
                Block::Paragraph(p) => format!(
                    "p:{}{}",
                    paragraph_text(p),
                    if item.in_table { "@tbl" } else { "" }
                ),
                Block::Table(_) => format!("tbl{}", if item.in_table { "@tbl" } else { "" }),
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["p:first", "tbl", "p:cell@tbl", "tbl@tbl", "p:inner@tbl", "p:last"]
        );
    }

    #[test]
    fn table_interiors_can_be_skipped() {
        let tree = parse_part(NESTED_BODY.as_bytes()).expect("parse");
        let opts = WalkOptions {
            enter_tables: false,
            ..WalkOptions::default()
        };
        let texts: Vec<String> = paragraphs(&tree.root, opts).map(paragraph_text).collect();
        assert_eq!(texts, vec!["first", "last"]);
    }

    #[test]
    fn finds_text_box_paragraphs_after_their_host() {
        let xml = "<w:body><w:p><w:r><w:t>host</w:t>\
            <w:pict><w:txbxContent><w:p><w:r><w:t>boxed</w:t></w:r></w:p></w:txbxContent></w:pict>\
            </w:r></w:p></w:body>";
        let tree = parse_part(xml.as_bytes()).expect("parse");
        let texts: Vec<String> = paragraphs(&tree.root, WalkOptions::default())
            .map(paragraph_text)
            .collect();
        // host's own text includes the boxed text node; the nested
        // paragraph is still yielded on its own afterwards.
        assert_eq!(texts, vec!["hostboxed", "boxed"]);

        let no_boxes = WalkOptions {
            enter_text_boxes: false,
            ..WalkOptions::default()
        };
        let texts: Vec<String> = paragraphs(&tree.root, no_boxes).map(paragraph_text).collect();
        assert_eq!(texts, vec!["hostboxed"]);
    }

    #[test]
    fn body_layout_helpers() {
        let tree = parse_part(NESTED_BODY.as_bytes()).expect("parse");
        let indices = body_block_indices(&tree.root);
        assert_eq!(indices.len(), 3);
        assert!(body_sectpr_index(&tree.root).is_some());

        let blocks: Vec<_> = indices
            .iter()
            .map(|&i| match &tree.root.children[i] {
                crate::docx::xml::XmlChild::Element(n) => n,
                _ => panic!("block index must point at an element"),
            })
            .collect();
        let table_paras: Vec<String> = block_paragraphs(blocks[1], WalkOptions::default())
            .into_iter()
            .map(paragraph_text)
            .collect();
        assert_eq!(table_paras, vec!["cell", "inner"]);
        let self_para: Vec<String> = block_paragraphs(blocks[0], WalkOptions::default())
            .into_iter()
            .map(paragraph_text)
            .collect();
        assert_eq!(self_para, vec!["first"]);
    }

    #[test]
    fn mutable_visit_matches_iterator_order() {
        let mut tree = parse_part(NESTED_BODY.as_bytes()).expect("parse");
        let opts = WalkOptions {
            enter_text_boxes: false,
            ..WalkOptions::default()
        };
        let expected: Vec<(String, bool)> = walk(&tree.root, opts)
            .filter_map(|item| match item.block {
                Block::Paragraph(p) => Some((paragraph_text(p), item.in_table)),
                Block::Table(_) => None,
            })
            .collect();
        let mut seen = Vec::new();
        super::visit_paragraphs_mut(&mut tree.root, opts, &mut |p, in_table| {
            seen.push((paragraph_text(p), in_table));
        });
        assert_eq!(seen, expected);
    }

    #[test]
    fn rels_targets_are_normalized() {
        let xml = r#"<Relationships>
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/>
            <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer" Target="/word/footer2.xml"/>
            <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
        </Relationships>"#;
        let tree = parse_part(xml.as_bytes()).expect("parse");
        assert_eq!(
            header_footer_targets(&tree.root),
            vec!["word/header1.xml".to_string(), "word/footer2.xml".to_string()]
        );
    }
}
