//! Caption and cross-reference renumbering. Captions get fresh numbers
//! in document order on a first pass; a second pass rewrites captions
//! and references through per-number queues, so several captions
//! sharing one stale number still come out distinct and references
//! follow whichever caption they sit closest to.
//!
//! Only the digits are rewritten, never the label, which keeps a
//! renumbered document byte-stable under a second run.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use anyhow::{bail, Context};
use log::{debug, warn};
use regex::Regex;

use crate::docx::locator::effective_outline;
use crate::docx::package::DocxPackage;
use crate::docx::para::{self, TextEdit};
use crate::docx::styles::StyleTable;
use crate::docx::walker::{self, Block, WalkOptions};
use crate::docx::xml::{parse_part, write_part, XmlChild, XmlNode, XmlTree};
use crate::error::{DocxError, Result};
use crate::heuristics::{CaptionLabels, HeuristicRules};
use crate::textutil::leading_number_parts;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptionScope {
    /// One counter per kind across the whole document.
    Global,
    /// Counters reset at every top-level heading; numbers render as
    /// `{section}-{n}`.
    PerSection,
}

/// First number handed out per kind. Per-section scope restarts each
/// section at these values as well.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptionStarts {
    pub figure: u32,
    pub table: u32,
}

impl Default for CaptionStarts {
    fn default() -> Self {
        CaptionStarts {
            figure: 1,
            table: 1,
        }
    }
}

impl CaptionStarts {
    fn for_kind(&self, kind: CaptionKind) -> u64 {
        match kind {
            CaptionKind::Figure => u64::from(self.figure),
            CaptionKind::Table => u64::from(self.table),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum CaptionKind {
    Figure,
    Table,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptionStats {
    pub captions: usize,
    pub references: usize,
    pub unresolved: usize,
}

struct Occurrence {
    kind: CaptionKind,
    old: String,
    num_start: usize,
    num_end: usize,
    is_caption: bool,
}

pub struct CaptionEngine {
    pattern: Regex,
    figure_keys: HashSet<String>,
    table_keys: HashSet<String>,
}

fn label_key(label: &str) -> String {
    label.trim_end_matches('.').to_lowercase()
}

impl CaptionEngine {
    pub fn new(labels: &CaptionLabels) -> anyhow::Result<Self> {
        let mut all: Vec<&str> = labels
            .figure_labels
            .iter()
            .chain(labels.table_labels.iter())
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        if all.is_empty() {
            bail!("no caption labels configured");
        }
        all.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        all.dedup();

        let alts: Vec<String> = all
            .iter()
            .map(|label| match label.strip_suffix('.') {
                Some(stem) => format!("{}\\.?", regex::escape(stem)),
                None => regex::escape(label),
            })
            .collect();
        let pattern = format!(
            "(?i)(?P<label>{})\\s*(?P<num>[0-9]+(?:-[0-9]+)*)",
            alts.join("|")
        );
        let pattern = Regex::new(&pattern).context("building caption pattern")?;

        Ok(CaptionEngine {
            pattern,
            figure_keys: labels.figure_labels.iter().map(|l| label_key(l)).collect(),
            table_keys: labels.table_labels.iter().map(|l| label_key(l)).collect(),
        })
    }

    fn classify(&self, label: &str) -> Option<CaptionKind> {
        let key = label_key(label);
        if self.figure_keys.contains(&key) {
            Some(CaptionKind::Figure)
        } else if self.table_keys.contains(&key) {
            Some(CaptionKind::Table)
        } else {
            None
        }
    }

    /// All label+number occurrences in the paragraph's concatenated
    /// text, with byte spans of the digits for splicing. A match glued
    /// to a preceding ASCII letter is noise ("Subfigure 3") and is
    /// dropped entirely.
    fn occurrences(&self, p: &XmlNode) -> Vec<Occurrence> {
        let text = para::paragraph_text(p);
        let anchor = text.len() - text.trim_start().len();
        let listing_style = is_generated_listing(p);
        let mut out = Vec::new();
        for caps in self.pattern.captures_iter(&text) {
            let (Some(whole), Some(label), Some(num)) =
                (caps.get(0), caps.name("label"), caps.name("num"))
            else {
                continue;
            };
            if text[..whole.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphabetic())
            {
                continue;
            }
            let Some(kind) = self.classify(label.as_str()) else {
                continue;
            };
            out.push(Occurrence {
                kind,
                old: num.as_str().to_string(),
                num_start: num.start(),
                num_end: num.end(),
                is_caption: whole.start() == anchor && !listing_style,
            });
        }
        out
    }
}

/// Generated listings (tables of contents or of figures) quote caption
/// text but are cross-references, not the captions themselves.
fn is_generated_listing(p: &XmlNode) -> bool {
    match para::style_id(p) {
        Some(style) => {
            let lower = style.to_lowercase();
            lower.starts_with("toc") || lower.contains("tableof")
        }
        None => false,
    }
}

struct SectionTracker {
    scope: CaptionScope,
    current: u32,
    headings_seen: u32,
}

impl SectionTracker {
    fn new(scope: CaptionScope) -> Self {
        SectionTracker {
            scope,
            current: 0,
            headings_seen: 0,
        }
    }

    fn observe(&mut self, p: &XmlNode, in_table: bool, styles: &StyleTable) {
        if self.scope != CaptionScope::PerSection || in_table {
            return;
        }
        if effective_outline(p, styles) != Some(0) {
            return;
        }
        self.headings_seen += 1;
        let text = para::paragraph_text(p);
        self.current = leading_number_parts(&text)
            .and_then(|parts| parts.first().copied())
            .unwrap_or(self.headings_seen);
    }

    fn section(&self) -> u32 {
        self.current.max(1)
    }
}

fn render_number(scope: CaptionScope, section: u32, n: u64) -> String {
    match scope {
        CaptionScope::Global => n.to_string(),
        CaptionScope::PerSection => format!("{section}-{n}"),
    }
}

const WALK: WalkOptions = WalkOptions {
    enter_tables: true,
    // Boxed text is reached through the host paragraph's splice, so the
    // nested paragraphs must not be visited a second time.
    enter_text_boxes: false,
};

/// Renumber figure and table captions into document order and align
/// every cross-reference with its caption. Unresolvable references are
/// left untouched and counted.
pub fn renumber_captions(
    tree: &mut XmlTree,
    styles: &StyleTable,
    engine: &CaptionEngine,
    scope: CaptionScope,
    starts: CaptionStarts,
) -> Result<CaptionStats> {
    let mut queues: HashMap<(CaptionKind, String), VecDeque<String>> = HashMap::new();
    {
        let body = walker::body_of(tree)?;
        let mut counters: HashMap<(CaptionKind, u32), u64> = HashMap::new();
        let mut tracker = SectionTracker::new(scope);
        for item in walker::walk(body, WALK) {
            let Block::Paragraph(p) = item.block else {
                continue;
            };
            tracker.observe(p, item.in_table, styles);
            for occ in engine.occurrences(p) {
                if !occ.is_caption {
                    continue;
                }
                let section = tracker.section();
                let counter = counters
                    .entry((occ.kind, section))
                    .or_insert_with(|| starts.for_kind(occ.kind).saturating_sub(1));
                *counter += 1;
                let fresh = render_number(scope, section, *counter);
                queues
                    .entry((occ.kind, occ.old.clone()))
                    .or_default()
                    .push_back(fresh);
            }
        }
    }

    let mut mru: HashMap<(CaptionKind, String), String> = HashMap::new();
    let mut stats = CaptionStats::default();
    let body = walker::body_of_mut(tree)?;
    walker::visit_paragraphs_mut(body, WALK, &mut |p, _in_table| {
        let mut edits = Vec::new();
        for occ in engine.occurrences(p) {
            let key = (occ.kind, occ.old.clone());
            let fresh = if occ.is_caption {
                match queues.get_mut(&key).and_then(|q| q.pop_front()) {
                    Some(n) => {
                        mru.insert(key, n.clone());
                        stats.captions += 1;
                        Some(n)
                    }
                    None => {
                        warn!("caption '{}' has no assigned number", occ.old);
                        stats.unresolved += 1;
                        None
                    }
                }
            } else {
                let resolved = mru
                    .get(&key)
                    .cloned()
                    .or_else(|| queues.get(&key).and_then(|q| q.front().cloned()));
                match resolved {
                    Some(n) => {
                        stats.references += 1;
                        Some(n)
                    }
                    None => {
                        warn!("reference to number '{}' matches no caption", occ.old);
                        stats.unresolved += 1;
                        None
                    }
                }
            };
            if let Some(n) = fresh {
                if n != occ.old {
                    edits.push(TextEdit {
                        start: occ.num_start,
                        end: occ.num_end,
                        replacement: n,
                    });
                }
            }
        }
        if !edits.is_empty() {
            para::splice_text(p, &edits);
        }
    });

    debug!(
        "renumbered {} captions, {} references ({} unresolved)",
        stats.captions, stats.references, stats.unresolved
    );
    Ok(stats)
}

/// Renumber captions in a package on disk. A missing styles part only
/// weakens heading detection; a settings part, when present, gets its
/// field cache marked dirty so Word refreshes generated listings.
pub fn renumber_file(
    input: &Path,
    output: &Path,
    rules: &HeuristicRules,
    scope: CaptionScope,
    starts: CaptionStarts,
) -> Result<CaptionStats> {
    let pkg = DocxPackage::read(input)?;
    let doc_bytes = pkg
        .part("word/document.xml")
        .ok_or_else(|| DocxError::MissingPart("word/document.xml".to_string()))?;
    let mut doc = parse_part(doc_bytes).context("parsing word/document.xml")?;
    let styles = match pkg.part("word/styles.xml") {
        Some(bytes) => {
            StyleTable::from_part(&parse_part(bytes).context("parsing word/styles.xml")?.root)
        }
        None => StyleTable::empty(),
    };

    let engine = CaptionEngine::new(&rules.captions)?;
    let stats = renumber_captions(&mut doc, &styles, &engine, scope, starts)?;

    let mut replacements = HashMap::new();
    replacements.insert("word/document.xml".to_string(), write_part(&doc)?);
    if let Some(settings_bytes) = pkg.part("word/settings.xml") {
        match parse_part(settings_bytes).and_then(|mut settings| {
            mark_fields_dirty(&mut settings.root);
            write_part(&settings)
        }) {
            Ok(bytes) => {
                replacements.insert("word/settings.xml".to_string(), bytes);
            }
            Err(err) => warn!("leaving word/settings.xml untouched: {err:#}"),
        }
    }
    pkg.write_with_replacements(output, &replacements)?;
    Ok(stats)
}

/// Ask Word to refresh field results (TOC page numbers, listings) on
/// next open. Non-fatal when the part is absent; callers skip it then.
pub fn mark_fields_dirty(settings_root: &mut XmlNode) {
    if let Some(flag) = settings_root.child_mut("w:updateFields") {
        flag.set_attr("w:val", "true");
    } else {
        settings_root.children.insert(
            0,
            XmlChild::Element(XmlNode::new("w:updateFields").with_attr("w:val", "true")),
        );
    }
}
