//! Reconstruction of the numbering labels Word renders in front of
//! paragraphs. The package stores counters implicitly; replaying every
//! numbered paragraph in document order recovers the visible "3.2.1"
//! style labels, which downstream matching against heading text needs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::docx::numbering::{CounterState, NumberingTable};
use crate::docx::package::DocxPackage;
use crate::docx::para;
use crate::docx::styles::StyleTable;
use crate::docx::walker::{self, WalkOptions};
use crate::docx::xml::{parse_part, XmlNode};
use crate::error::{DocxError, Result};

pub const LABEL_ARTIFACT_VERSION: u32 = 1;

/// One paragraph of the document part, positioned by its index in the
/// full paragraph walk. `label` is empty for unnumbered paragraphs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub index: usize,
    pub label: String,
    pub text: String,
    pub style: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct LabelArtifact {
    version: u32,
    source_digest: String,
    labels: Vec<LabelRecord>,
}

/// Replay numbering over every paragraph of the part. Counters run per
/// numbering instance, so interleaved lists stay independent. A
/// paragraph with neither text nor numbering leaves no record but keeps
/// its slot in the index.
pub fn reconstruct_labels(
    root: &XmlNode,
    styles: &StyleTable,
    numbering: &NumberingTable,
) -> Vec<LabelRecord> {
    let mut states: HashMap<i32, CounterState> = HashMap::new();
    let mut out = Vec::new();
    for (index, p) in walker::paragraphs(root, WalkOptions::default()).enumerate() {
        let text = para::paragraph_text(p).trim().to_string();
        let style = para::style_id(p).map(str::to_string);

        let (direct_num, direct_ilvl) = para::direct_numpr(p);
        let (style_num, style_ilvl) = match style.as_deref() {
            Some(s) => styles.resolve_numbering(s),
            None => (None, None),
        };
        let raw_num = direct_num.or(style_num);
        let num_id = raw_num.filter(|id| *id > 0);
        let ilvl = direct_ilvl.or(style_ilvl);
        let has_numbering = raw_num.is_some() && ilvl.is_some();

        let label = match (num_id, ilvl) {
            (Some(num_id), Some(ilvl)) => match numbering.abstract_for(num_id) {
                Some(abstract_id) => {
                    let state = states.entry(num_id).or_default();
                    state.advance(numbering, num_id, abstract_id, ilvl);
                    numbering.compute_label(abstract_id, ilvl, state)
                }
                None => String::new(),
            },
            _ => String::new(),
        };

        if text.is_empty() && !has_numbering {
            continue;
        }
        out.push(LabelRecord {
            index,
            label,
            text,
            style,
        });
    }
    out
}

/// Label reconstruction straight from a package. The document part is
/// required; absent style or numbering parts degrade to empty tables.
pub fn labels_for_package(pkg: &DocxPackage) -> Result<Vec<LabelRecord>> {
    let doc = pkg
        .part("word/document.xml")
        .ok_or_else(|| DocxError::MissingPart("word/document.xml".to_string()))?;
    let doc = parse_part(doc).context("parsing word/document.xml")?;

    let styles = match pkg.part("word/styles.xml") {
        Some(bytes) => StyleTable::from_part(&parse_part(bytes).context("parsing word/styles.xml")?.root),
        None => StyleTable::empty(),
    };
    let numbering = match pkg.part("word/numbering.xml") {
        Some(bytes) => NumberingTable::from_part(
            &parse_part(bytes).context("parsing word/numbering.xml")?.root,
        ),
        None => NumberingTable::empty(),
    };

    Ok(reconstruct_labels(&doc.root, &styles, &numbering))
}

pub fn source_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn write_labels_json(path: &Path, source_digest: &str, labels: &[LabelRecord]) -> Result<()> {
    let artifact = LabelArtifact {
        version: LABEL_ARTIFACT_VERSION,
        source_digest: source_digest.to_string(),
        labels: labels.to_vec(),
    };
    let json = serde_json::to_vec_pretty(&artifact).context("serializing labels")?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Digest-keyed cache of label artifacts next to the source document.
/// Every failure path degrades to a recompute, never to an error.
pub struct LabelCache {
    dir: PathBuf,
}

impl LabelCache {
    pub fn new(dir: PathBuf) -> Self {
        LabelCache { dir }
    }

    /// `_label_cache/` in the document's directory.
    pub fn beside(docx_path: &Path) -> Self {
        let dir = docx_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("_label_cache");
        LabelCache { dir }
    }

    fn entry_path(&self, docx_path: &Path, digest: &str) -> PathBuf {
        let stem = docx_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let short = &digest[..digest.len().min(8)];
        self.dir.join(format!("{short}_{stem}.json"))
    }

    pub fn load(&self, docx_path: &Path, digest: &str) -> Option<Vec<LabelRecord>> {
        let path = self.entry_path(docx_path, digest);
        let bytes = fs::read(&path).ok()?;
        let artifact: LabelArtifact = serde_json::from_slice(&bytes).ok()?;
        if artifact.version != LABEL_ARTIFACT_VERSION || artifact.source_digest != digest {
            debug!("stale label cache entry {}", path.display());
            return None;
        }
        debug!("label cache hit {}", path.display());
        Some(artifact.labels)
    }

    pub fn store(&self, docx_path: &Path, digest: &str, labels: &[LabelRecord]) {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            debug!("label cache unavailable: {err}");
            return;
        }
        let path = self.entry_path(docx_path, digest);
        if let Err(err) = write_labels_json(&path, digest, labels) {
            debug!("label cache write failed: {err}");
        }
    }
}

/// Cached label lookup for a document on disk: digest the file, serve
/// from `_label_cache/` when the digest matches, recompute and refill
/// otherwise.
pub fn labels_for_file(docx_path: &Path) -> Result<Vec<LabelRecord>> {
    let bytes = fs::read(docx_path)?;
    let digest = source_digest(&bytes);
    let cache = LabelCache::beside(docx_path);
    if let Some(hit) = cache.load(docx_path, &digest) {
        return Ok(hit);
    }
    let pkg = DocxPackage::read(docx_path)?;
    let labels = labels_for_package(&pkg)?;
    cache.store(docx_path, &digest, &labels);
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::{
        labels_for_package, reconstruct_labels, source_digest, LabelCache, LabelRecord,
    };
    use crate::docx::numbering::NumberingTable;
    use crate::docx::package::DocxPackage;
    use crate::docx::styles::StyleTable;
    use crate::docx::xml::parse_part;

    const NUMBERING: &str = r#"<w:numbering>
        <w:abstractNum w:abstractNumId="0">
            <w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:lvlText w:val="%1."/></w:lvl>
            <w:lvl w:ilvl="1"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:lvlText w:val="%1.%2"/></w:lvl>
        </w:abstractNum>
        <w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num>
        <w:num w:numId="2"><w:abstractNumId w:val="0"/></w:num>
    </w:numbering>"#;

    const STYLES: &str = r#"<w:styles>
        <w:style w:type="paragraph" w:styleId="ListPara">
            <w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr>
        </w:style>
    </w:styles>"#;

    fn tables() -> (StyleTable, NumberingTable) {
        let styles = StyleTable::from_part(&parse_part(STYLES.as_bytes()).expect("styles").root);
        let numbering =
            NumberingTable::from_part(&parse_part(NUMBERING.as_bytes()).expect("numbering").root);
        (styles, numbering)
    }

    fn numbered(text: &str, num_id: i32, ilvl: i32) -> String {
        format!(
            "<w:p><w:pPr><w:numPr><w:ilvl w:val=\"{ilvl}\"/><w:numId w:val=\"{num_id}\"/></w:numPr></w:pPr>\
             <w:r><w:t>{text}</w:t></w:r></w:p>"
        )
    }

    fn plain(text: &str) -> String {
        format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
    }

    fn doc(parts: &[String]) -> crate::docx::xml::XmlTree {
        let xml = format!(
            "<w:document><w:body>{}</w:body></w:document>",
            parts.concat()
        );
        parse_part(xml.as_bytes()).expect("parse")
    }

    #[test]
    fn replays_direct_and_style_numbering() {
        let (styles, numbering) = tables();
        let tree = doc(&[
            numbered("alpha", 1, 0),
            "<w:p><w:pPr><w:pStyle w:val=\"ListPara\"/></w:pPr><w:r><w:t>beta</w:t></w:r></w:p>"
                .to_string(),
            numbered("child", 1, 1),
            plain("prose"),
            "<w:p/>".to_string(),
            numbered("gamma", 1, 0),
        ]);
        let records = reconstruct_labels(&tree.root, &styles, &numbering);
        let summary: Vec<(usize, &str, &str)> = records
            .iter()
            .map(|r| (r.index, r.label.as_str(), r.text.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "1.", "alpha"),
                (1, "2.", "beta"),
                (2, "2.1", "child"),
                (3, "", "prose"),
                (5, "3.", "gamma"),
            ]
        );
    }

    #[test]
    fn interleaved_instances_count_independently() {
        let (styles, numbering) = tables();
        let tree = doc(&[
            numbered("a", 1, 0),
            numbered("b", 2, 0),
            numbered("c", 1, 0),
            numbered("d", 2, 0),
        ]);
        let labels: Vec<String> = reconstruct_labels(&tree.root, &styles, &numbering)
            .into_iter()
            .map(|r| r.label)
            .collect();
        assert_eq!(labels, vec!["1.", "1.", "2.", "2."]);
    }

    #[test]
    fn numbering_id_zero_means_unnumbered() {
        let (styles, numbering) = tables();
        let tree = doc(&[numbered("switched off", 0, 0)]);
        let records = reconstruct_labels(&tree.root, &styles, &numbering);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "");
    }

    #[test]
    fn empty_numbered_paragraphs_keep_their_record() {
        let (styles, numbering) = tables();
        let tree = doc(&[numbered("", 1, 0), numbered("next", 1, 0)]);
        let summary: Vec<(usize, String, String)> =
            reconstruct_labels(&tree.root, &styles, &numbering)
                .into_iter()
                .map(|r| (r.index, r.label, r.text))
                .collect();
        assert_eq!(
            summary,
            vec![
                (0, "1.".to_string(), String::new()),
                (1, "2.".to_string(), "next".to_string()),
            ]
        );
    }

    #[test]
    fn direct_and_style_halves_combine() {
        let (styles, numbering) = tables();
        // The style supplies the instance id; the paragraph only picks
        // the level.
        let tree = doc(&["<w:p><w:pPr><w:pStyle w:val=\"ListPara\"/>\
             <w:numPr><w:ilvl w:val=\"1\"/></w:numPr></w:pPr>\
             <w:r><w:t>deep</w:t></w:r></w:p>"
            .to_string()]);
        let records = reconstruct_labels(&tree.root, &styles, &numbering);
        assert_eq!(records[0].label, "1.1");
        assert_eq!(records[0].style.as_deref(), Some("ListPara"));
    }

    #[test]
    fn package_without_numbering_part_degrades_to_empty_labels() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bare.docx");
        let file = std::fs::File::create(&path).expect("create");
        let mut zip = zip::ZipWriter::new(file);
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("word/document.xml", opts).expect("start");
        std::io::Write::write_all(
            &mut zip,
            b"<w:document><w:body><w:p><w:r><w:t>hello</w:t></w:r></w:p></w:body></w:document>",
        )
        .expect("write");
        zip.finish().expect("finish");

        let pkg = DocxPackage::read(&path).expect("read");
        let records = labels_for_package(&pkg).expect("labels");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "hello");
        assert_eq!(records[0].label, "");
    }

    #[test]
    fn cache_round_trip_and_invalidation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let docx = dir.path().join("report.docx");
        let cache = LabelCache::new(dir.path().join("_label_cache"));
        let records = vec![LabelRecord {
            index: 0,
            label: "1.".to_string(),
            text: "alpha".to_string(),
            style: None,
        }];
        let digest = source_digest(b"content");

        assert!(cache.load(&docx, &digest).is_none());
        cache.store(&docx, &digest, &records);
        assert_eq!(cache.load(&docx, &digest), Some(records.clone()));

        let other = source_digest(b"changed content");
        assert!(cache.load(&docx, &other).is_none());
    }
}
