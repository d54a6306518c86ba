//! Extracting one located section into a standalone document. The new
//! package reuses every part of the source except the document body,
//! which shrinks to the section's blocks plus the original section
//! properties.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::info;

use crate::docx::locator::{self, SectionQuery, SectionRange};
use crate::docx::package::DocxPackage;
use crate::docx::strip::remove_header_footer_refs;
use crate::docx::styles::StyleTable;
use crate::docx::template::{apply_injections, Injection};
use crate::docx::walker;
use crate::docx::xml::{parse_part, write_part, XmlChild, XmlDecl, XmlTree};
use crate::error::{DocxError, Result};
use crate::heuristics::HeuristicRules;

#[derive(Clone, Debug, Default)]
pub struct ExtractOptions {
    pub query: SectionQuery,
    /// Drop header/footer references so the extract renders without the
    /// source's page furniture.
    pub ignore_header_footer: bool,
}

#[derive(Clone, Debug)]
pub struct ExtractReport {
    /// Heading text as matched, for later hide/strip calls.
    pub heading: String,
    pub sub_heading: Option<String>,
    pub blocks_kept: usize,
    pub output_path: PathBuf,
    pub warnings: Vec<String>,
}

fn locate(
    doc: &XmlTree,
    styles: &StyleTable,
    opts: &ExtractOptions,
    rules: &HeuristicRules,
) -> Result<(SectionRange, String, Option<String>)> {
    let body = walker::body_of(doc)?;
    let blocks = walker::body_blocks(body);
    let range = locator::find_section_range(&blocks, styles, &opts.query)?;
    let heading = range.heading_text.clone();
    let (range, sub_heading) = match opts.query.sub_heading.as_deref() {
        Some(sub) => {
            let refined = locator::refine_to_subheading(
                &blocks,
                &range,
                sub,
                opts.query.strict_sub_match,
                rules.locator.subtitle_lookahead,
            )?;
            let sub_text = refined.heading_text.clone();
            (refined, Some(sub_text))
        }
        None => (range, None),
    };
    Ok((range, heading, sub_heading))
}

/// Extract the queried section from `input` into a new `.docx` at
/// `output`. Styles, numbering, media and relationships carry over
/// unchanged, so the extract formats like the source.
pub fn extract_section(
    input: &Path,
    output: &Path,
    opts: &ExtractOptions,
    rules: &HeuristicRules,
) -> Result<ExtractReport> {
    let pkg = DocxPackage::read(input)?;
    let doc_bytes = pkg
        .part("word/document.xml")
        .ok_or_else(|| DocxError::MissingPart("word/document.xml".to_string()))?;
    let styles_bytes = pkg
        .part("word/styles.xml")
        .ok_or_else(|| DocxError::MissingPart("word/styles.xml".to_string()))?;
    let doc = parse_part(doc_bytes).context("parsing word/document.xml")?;
    let styles =
        StyleTable::from_part(&parse_part(styles_bytes).context("parsing word/styles.xml")?.root);

    let (range, heading, sub_heading) = locate(&doc, &styles, opts, rules)?;

    let mut out = XmlTree {
        decl: Some(XmlDecl::utf8_standalone()),
        prolog: doc.prolog.clone(),
        root: doc.root.clone(),
    };
    {
        let src_body = walker::body_of(&doc)?;
        let blocks = walker::body_blocks(src_body);
        let mut kept: Vec<XmlChild> = blocks[range.start..range.end]
            .iter()
            .map(|b| XmlChild::Element((*b).clone()))
            .collect();
        if let Some(idx) = walker::body_sectpr_index(src_body) {
            kept.push(src_body.children[idx].clone());
        }
        let out_body = walker::body_of_mut(&mut out)?;
        out_body.children = kept;
    }
    if opts.ignore_header_footer {
        remove_header_footer_refs(&mut out.root);
    }

    let mut replacements = HashMap::new();
    replacements.insert("word/document.xml".to_string(), write_part(&out)?);
    pkg.write_with_replacements(output, &replacements)?;

    info!(
        "extracted '{}' ({} blocks) into {}",
        heading,
        range.end - range.start,
        output.display()
    );
    Ok(ExtractReport {
        heading,
        sub_heading,
        blocks_kept: range.end - range.start,
        output_path: output.to_path_buf(),
        warnings: range.warnings,
    })
}

/// Rewrite the document body with placeholder paragraphs per an
/// injection plan. Indexes address the document's paragraph walk, the
/// same ordinals the label records carry. Returns the path of the
/// rendered template.
pub fn inject_placeholders(
    input: &Path,
    output: &Path,
    injections: &[Injection],
) -> Result<PathBuf> {
    let pkg = DocxPackage::read(input)?;
    let doc_bytes = pkg
        .part("word/document.xml")
        .ok_or_else(|| DocxError::MissingPart("word/document.xml".to_string()))?;
    let mut doc = parse_part(doc_bytes).context("parsing word/document.xml")?;
    {
        let body = walker::body_of_mut(&mut doc)?;
        apply_injections(body, injections);
    }
    let mut replacements = HashMap::new();
    replacements.insert("word/document.xml".to_string(), write_part(&doc)?);
    pkg.write_with_replacements(output, &replacements)?;
    info!(
        "injected {} placeholders into {}",
        injections.len(),
        output.display()
    );
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use super::{extract_section, inject_placeholders, ExtractOptions};
    use crate::docx::locator::SectionQuery;
    use crate::docx::package::DocxPackage;
    use crate::docx::para::paragraph_text;
    use crate::docx::template::{InjectMode, Injection};
    use crate::docx::walker::{self, WalkOptions};
    use crate::docx::xml::parse_part;
    use crate::error::DocxError;
    use crate::heuristics::HeuristicRules;

    fn write_docx(dir: &Path, name: &str, parts: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).expect("create");
        let mut zip = zip::ZipWriter::new(file);
        let opts = zip::write::SimpleFileOptions::default();
        for (part, content) in parts {
            zip.start_file(*part, opts).expect("start");
            zip.write_all(content.as_bytes()).expect("write");
        }
        zip.finish().expect("finish");
        path
    }

    const STYLES_MIN: &str = "<w:styles/>";

    fn h(text: &str) -> String {
        format!(
            "<w:p><w:pPr><w:outlineLvl w:val=\"0\"/></w:pPr><w:r><w:t>{text}</w:t></w:r></w:p>"
        )
    }

    fn p(text: &str) -> String {
        format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
    }

    fn query(number: &str, heading: &str) -> SectionQuery {
        SectionQuery {
            number: number.to_string(),
            heading: Some(heading.to_string()),
            ..SectionQuery::default()
        }
    }

    #[test]
    fn extracts_the_section_and_keeps_other_parts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = format!(
            "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}{}{}{}{}<w:sectPr><w:pgSz w:w=\"11906\"/></w:sectPr></w:body></w:document>",
            h("1 Intro"),
            p("intro body"),
            h("2 Scope"),
            p("scope body"),
            h("3 Next"),
        );
        let input = write_docx(
            dir.path(),
            "in.docx",
            &[
                ("word/document.xml", document.as_str()),
                ("word/styles.xml", STYLES_MIN),
                ("word/media/logo.png", "pngbytes"),
            ],
        );
        let output = dir.path().join("out.docx");
        let report = extract_section(
            &input,
            &output,
            &ExtractOptions {
                query: query("2", "Scope"),
                ..ExtractOptions::default()
            },
            &HeuristicRules::default(),
        )
        .expect("extract");
        assert_eq!(report.heading, "2 Scope");
        assert_eq!(report.blocks_kept, 2);
        assert_eq!(report.output_path, output);
        assert!(report.warnings.is_empty());

        let pkg = DocxPackage::read(&output).expect("read");
        let bytes = pkg.part("word/document.xml").expect("part");
        assert!(bytes
            .starts_with(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"));
        let doc = parse_part(bytes).expect("parse");
        let texts: Vec<String> = walker::paragraphs(&doc.root, WalkOptions::default())
            .map(|p| paragraph_text(p))
            .collect();
        assert_eq!(texts, vec!["2 Scope", "scope body"]);
        assert!(doc.root.has_descendant("w:pgSz"));
        assert_eq!(pkg.part("word/media/logo.png"), Some(b"pngbytes" as &[u8]));
        assert_eq!(pkg.part("word/styles.xml"), Some(STYLES_MIN.as_bytes()));
    }

    #[test]
    fn missing_styles_part_fails_loud() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write_docx(
            dir.path(),
            "in.docx",
            &[("word/document.xml", "<w:document><w:body/></w:document>")],
        );
        let err = extract_section(
            &input,
            &dir.path().join("out.docx"),
            &ExtractOptions {
                query: query("1", "Intro"),
                ..ExtractOptions::default()
            },
            &HeuristicRules::default(),
        )
        .expect_err("must fail");
        assert!(matches!(err, DocxError::MissingPart(part) if part.contains("styles")));
    }

    #[test]
    fn header_references_can_be_dropped_from_the_extract() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = format!(
            "<w:document><w:body>{}{}<w:sectPr>\
             <w:headerReference r:id=\"rId1\" w:type=\"default\"/>\
             <w:pgSz w:w=\"11906\"/>\
             </w:sectPr></w:body></w:document>",
            h("2 Scope"),
            p("scope body"),
        );
        let input = write_docx(
            dir.path(),
            "in.docx",
            &[
                ("word/document.xml", document.as_str()),
                ("word/styles.xml", STYLES_MIN),
            ],
        );
        let output = dir.path().join("out.docx");
        extract_section(
            &input,
            &output,
            &ExtractOptions {
                query: query("2", "Scope"),
                ignore_header_footer: true,
            },
            &HeuristicRules::default(),
        )
        .expect("extract");
        let pkg = DocxPackage::read(&output).expect("read");
        let doc = parse_part(pkg.part("word/document.xml").expect("part")).expect("parse");
        assert!(!doc.root.has_descendant("w:headerReference"));
        assert!(doc.root.has_descendant("w:pgSz"));
    }

    #[test]
    fn sub_heading_narrows_the_extract() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bold =
            |text: &str| format!("<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>{text}</w:t></w:r></w:p>");
        let document = format!(
            "<w:document><w:body>{}{}{}{}{}{}</w:body></w:document>",
            h("2 Scope"),
            bold("Inputs"),
            p("input list"),
            bold("Outputs"),
            p("output list"),
            h("3 Next"),
        );
        let input = write_docx(
            dir.path(),
            "in.docx",
            &[
                ("word/document.xml", document.as_str()),
                ("word/styles.xml", STYLES_MIN),
            ],
        );
        let output = dir.path().join("out.docx");
        let mut q = query("2", "Scope");
        q.sub_heading = Some("Inputs".to_string());
        let report = extract_section(
            &input,
            &output,
            &ExtractOptions {
                query: q,
                ..ExtractOptions::default()
            },
            &HeuristicRules::default(),
        )
        .expect("extract");
        assert_eq!(report.heading, "2 Scope");
        assert_eq!(report.sub_heading.as_deref(), Some("Inputs"));
        assert_eq!(report.blocks_kept, 2);

        let pkg = DocxPackage::read(&output).expect("read");
        let doc = parse_part(pkg.part("word/document.xml").expect("part")).expect("parse");
        let texts: Vec<String> = walker::paragraphs(&doc.root, WalkOptions::default())
            .map(|p| paragraph_text(p))
            .collect();
        assert_eq!(texts, vec!["Inputs", "input list"]);
    }

    #[test]
    fn placeholder_plan_is_applied_to_the_body() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = format!(
            "<w:document><w:body>{}{}</w:body></w:document>",
            h("2 Scope"),
            p("scope body"),
        );
        let input = write_docx(
            dir.path(),
            "in.docx",
            &[("word/document.xml", document.as_str())],
        );
        let output = dir.path().join("out.docx");
        let rendered = inject_placeholders(
            &input,
            &output,
            &[Injection {
                index: 1,
                var: "sec_2_Scope".to_string(),
                mode: InjectMode::Replace,
            }],
        )
        .expect("inject");
        assert_eq!(rendered, output);
        let pkg = DocxPackage::read(&output).expect("read");
        let doc = parse_part(pkg.part("word/document.xml").expect("part")).expect("parse");
        let texts: Vec<String> = walker::paragraphs(&doc.root, WalkOptions::default())
            .map(|p| paragraph_text(p))
            .collect();
        assert_eq!(texts, vec!["2 Scope", "{{ sec_2_Scope }}"]);
    }
}
