//! Locating a section inside the body's top-level block sequence: TOC
//! awareness, exact-versus-prefix start matching, level-based end
//! detection with fallbacks, and bold-run sub-heading refinement.

use log::{debug, warn};

use crate::docx::para;
use crate::docx::styles::StyleTable;
use crate::docx::walker::{self, WalkOptions};
use crate::docx::xml::XmlNode;
use crate::error::{DocxError, Result};
use crate::textutil::{normalize_ws, starts_with_number};

#[derive(Clone, Debug)]
pub struct SectionQuery {
    /// Section number string, e.g. `"2"` or `"6.13"`.
    pub number: String,
    pub heading: Option<String>,
    pub sub_heading: Option<String>,
    pub end_title: Option<String>,
    pub skip_toc: bool,
    /// Strict sub-heading matching compares full normalized text;
    /// loose matching accepts containment.
    pub strict_sub_match: bool,
}

impl Default for SectionQuery {
    fn default() -> Self {
        SectionQuery {
            number: String::new(),
            heading: None,
            sub_heading: None,
            end_title: None,
            skip_toc: true,
            strict_sub_match: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchKind {
    /// Normalized text equaled `"{number} {heading}"` (or the bare
    /// number at a hard boundary when no heading was given).
    Exact,
    /// Normalized text started with the number and contained the
    /// heading, the shape TOC entries tend to have.
    NumberPrefix,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryKind {
    OutlineLevel,
    /// Same style id and a raw list level at or above the start's; used
    /// when outline levels are absent.
    StyleListLevel,
    EndTitle,
    DocumentEnd,
}

/// Half-open range `[start, end)` over the body's top-level blocks. The
/// block at `start` holds the matched heading; callers hide or strip
/// the heading from emitted content separately.
#[derive(Clone, Debug)]
pub struct SectionRange {
    pub start: usize,
    pub end: usize,
    pub heading_text: String,
    pub match_kind: MatchKind,
    pub boundary: BoundaryKind,
    pub warnings: Vec<String>,
}

/// Any one signal marks a table-of-contents paragraph: a TOC-prefixed
/// style, a TOC field instruction, a `_Toc` hyperlink anchor, or a
/// dot-leader tab stop.
pub fn is_toc_paragraph(p: &XmlNode) -> bool {
    if let Some(style) = para::style_id(p) {
        if style.len() >= 3 && style[..3].eq_ignore_ascii_case("toc") {
            return true;
        }
    }
    for instr in p.descendants_named("w:instrText") {
        if instr.direct_text().contains("TOC") {
            return true;
        }
    }
    for link in p.descendants_named("w:hyperlink") {
        if link
            .attr("w:anchor")
            .map_or(false, |a| a.starts_with("_Toc"))
        {
            return true;
        }
    }
    if let Some(tabs) = p.child("w:pPr").and_then(|ppr| ppr.child("w:tabs")) {
        for tab in tabs.children_named("w:tab") {
            if matches!(tab.attr("w:leader"), Some("dot") | Some("middleDot")) {
                return true;
            }
        }
    }
    false
}

pub fn effective_outline(p: &XmlNode, styles: &StyleTable) -> Option<i32> {
    para::direct_outline(p)
        .or_else(|| para::style_id(p).and_then(|s| styles.resolve_outline(s)))
}

#[derive(Clone, Debug)]
struct StartMeta {
    outline: Option<i32>,
    style: Option<String>,
    ilvl: Option<i32>,
}

impl StartMeta {
    fn of(p: &XmlNode, styles: &StyleTable) -> Self {
        StartMeta {
            outline: effective_outline(p, styles),
            style: para::style_id(p).map(|s| s.to_string()),
            ilvl: para::direct_numpr(p).1,
        }
    }
}

pub fn find_section_range(
    blocks: &[&XmlNode],
    styles: &StyleTable,
    query: &SectionQuery,
) -> Result<SectionRange> {
    let heading_norm = query.heading.as_deref().map(normalize_ws);
    let exact_target = heading_norm
        .as_ref()
        .map(|h| normalize_ws(&format!("{} {}", query.number, h)));

    let mut exact: Option<(usize, String, StartMeta)> = None;
    let mut prefix: Option<(usize, String, StartMeta)> = None;

    'scan: for (bi, block) in blocks.iter().enumerate() {
        for p in walker::block_paragraphs(block, WalkOptions::default()) {
            if query.skip_toc && is_toc_paragraph(p) {
                continue;
            }
            let txt = normalize_ws(&para::paragraph_text(p));
            if txt.is_empty() {
                continue;
            }
            match (&heading_norm, &exact_target) {
                (Some(h), Some(target)) => {
                    if &txt == target {
                        exact = Some((bi, txt, StartMeta::of(p, styles)));
                        break 'scan;
                    }
                    if prefix.is_none()
                        && txt.starts_with(query.number.as_str())
                        && txt.contains(h.as_str())
                    {
                        prefix = Some((bi, txt, StartMeta::of(p, styles)));
                    }
                }
                _ => {
                    if starts_with_number(&txt, &query.number) {
                        exact = Some((bi, txt, StartMeta::of(p, styles)));
                        break 'scan;
                    }
                }
            }
        }
    }

    let (start_idx, heading_text, meta, match_kind) = match (exact, prefix) {
        (Some((bi, txt, m)), _) => (bi, txt, m, MatchKind::Exact),
        (None, Some((bi, txt, m))) => {
            debug!("section start matched by number prefix at block {bi}");
            (bi, txt, m, MatchKind::NumberPrefix)
        }
        (None, None) => {
            let target = match &query.heading {
                Some(h) => format!("section {} {}", query.number, h),
                None => format!("section {}", query.number),
            };
            return Err(DocxError::NotFound(target));
        }
    };

    let mut warnings = Vec::new();
    let end_target = query.end_title.as_deref().map(normalize_ws);
    let mut end: Option<(usize, BoundaryKind)> = None;
    let mut auto_end: Option<(usize, BoundaryKind)> = None;

    if meta.outline.is_none() && (meta.style.is_none() || meta.ilvl.is_none()) {
        let msg = format!(
            "start heading '{heading_text}' has no outline or list level; range may overrun"
        );
        warn!("{msg}");
        warnings.push(msg);
    }

    'end_scan: for (bi, block) in blocks.iter().enumerate().skip(start_idx + 1) {
        for p in walker::block_paragraphs(block, WalkOptions::default()) {
            if query.skip_toc && is_toc_paragraph(p) {
                continue;
            }
            let txt = normalize_ws(&para::paragraph_text(p));
            if txt.is_empty() {
                continue;
            }
            if let Some(t) = end_target.as_ref() {
                if &txt == t {
                    end = Some((bi, BoundaryKind::EndTitle));
                    break 'end_scan;
                }
            }
            if let Some(kind) = paragraph_boundary_kind(p, &meta, styles) {
                if end_target.is_some() {
                    if auto_end.is_none() {
                        auto_end = Some((bi, kind));
                    }
                } else {
                    end = Some((bi, kind));
                    break 'end_scan;
                }
            }
        }
    }

    let (end_idx, boundary) = match end {
        Some(hit) => hit,
        None => {
            if let Some(t) = end_target.as_ref() {
                if let Some(hit) = auto_end {
                    let msg =
                        format!("end title '{t}' not found; stopping at the next level boundary");
                    warn!("{msg}");
                    warnings.push(msg);
                    hit
                } else {
                    let msg = format!("end title '{t}' not found; range extends to document end");
                    warn!("{msg}");
                    warnings.push(msg);
                    (blocks.len(), BoundaryKind::DocumentEnd)
                }
            } else {
                (blocks.len(), BoundaryKind::DocumentEnd)
            }
        }
    };

    Ok(SectionRange {
        start: start_idx,
        end: end_idx,
        heading_text,
        match_kind,
        boundary,
        warnings,
    })
}

fn paragraph_boundary_kind(
    p: &XmlNode,
    start: &StartMeta,
    styles: &StyleTable,
) -> Option<BoundaryKind> {
    if let Some(start_lvl) = start.outline {
        let lvl = effective_outline(p, styles)?;
        return (lvl <= start_lvl).then_some(BoundaryKind::OutlineLevel);
    }
    let start_style = start.style.as_deref()?;
    let start_ilvl = start.ilvl?;
    if para::style_id(p) != Some(start_style) {
        return None;
    }
    let ilvl = para::direct_numpr(p).1?;
    (ilvl <= start_ilvl).then_some(BoundaryKind::StyleListLevel)
}

/// A paragraph eligible to open an inline sub-section: default or
/// `Normal` style, at least one non-empty run, none explicitly unbold,
/// and some bold hint (explicit bold or a run character style).
pub fn is_inline_subtitle(p: &XmlNode) -> bool {
    match para::style_id(p) {
        None | Some("Normal") => {}
        Some(_) => return false,
    }
    let mut has_text = false;
    let mut hint = false;
    for run in para::paragraph_runs(p) {
        if run.text.trim().is_empty() {
            continue;
        }
        has_text = true;
        match run.bold {
            Some(false) => return false,
            Some(true) => hint = true,
            None => {
                if run.has_run_style {
                    hint = true;
                }
            }
        }
    }
    has_text && hint
}

/// Every non-empty run explicitly bold.
pub fn is_all_bold_paragraph(p: &XmlNode) -> bool {
    let mut has_text = false;
    for run in para::paragraph_runs(p) {
        if run.text.trim().is_empty() {
            continue;
        }
        has_text = true;
        if run.bold != Some(true) {
            return false;
        }
    }
    has_text
}

/// A subtitle candidate only counts as a boundary when body text shows
/// up shortly after it; a run of consecutive bold lines is one subtitle
/// group, not several sections.
fn body_text_follows(blocks: &[&XmlNode], idx: usize, end: usize, lookahead: usize) -> bool {
    let mut checked = 0usize;
    for block in blocks.iter().take(end).skip(idx + 1) {
        if checked >= lookahead {
            break;
        }
        if block.name != "w:p" {
            continue;
        }
        let txt = normalize_ws(&para::paragraph_text(block));
        if txt.is_empty() {
            continue;
        }
        checked += 1;
        if !is_all_bold_paragraph(block) {
            return true;
        }
    }
    false
}

/// Narrow a located range to the sub-section opened by a bold inline
/// subtitle. Top-level paragraphs only; tables never hold candidates.
pub fn refine_to_subheading(
    blocks: &[&XmlNode],
    range: &SectionRange,
    sub_heading: &str,
    strict: bool,
    lookahead: usize,
) -> Result<SectionRange> {
    let target = normalize_ws(sub_heading);
    let mut sub_start: Option<usize> = None;

    for (bi, block) in blocks
        .iter()
        .enumerate()
        .take(range.end)
        .skip(range.start)
    {
        if block.name != "w:p" || !is_inline_subtitle(block) {
            continue;
        }
        let txt = normalize_ws(&para::paragraph_text(block));
        if (strict && txt == target) || (!strict && txt.contains(target.as_str())) {
            sub_start = Some(bi);
            break;
        }
    }
    if sub_start.is_none() {
        for (bi, block) in blocks
            .iter()
            .enumerate()
            .take(range.end)
            .skip(range.start)
        {
            if block.name != "w:p" {
                continue;
            }
            let txt = normalize_ws(&para::paragraph_text(block));
            if (strict && txt == target) || (!strict && txt.contains(target.as_str())) {
                sub_start = Some(bi);
                break;
            }
        }
    }
    let sub_start = sub_start
        .ok_or_else(|| DocxError::NotFound(format!("sub-heading '{sub_heading}'")))?;

    let mut sub_end = range.end;
    for (bi, block) in blocks
        .iter()
        .enumerate()
        .take(range.end)
        .skip(sub_start + 1)
    {
        if block.name != "w:p" || !is_inline_subtitle(block) {
            continue;
        }
        if body_text_follows(blocks, bi, range.end, lookahead) {
            sub_end = bi;
            break;
        }
    }

    let heading_text = match blocks.get(sub_start) {
        Some(block) => normalize_ws(&para::paragraph_text(block)),
        None => target,
    };
    Ok(SectionRange {
        start: sub_start,
        end: sub_end,
        heading_text,
        match_kind: range.match_kind,
        boundary: range.boundary,
        warnings: range.warnings.clone(),
    })
}
