use std::collections::HashMap;

use crate::docx::xml::XmlNode;

/// Inheritance chains longer than this stop resolving; the ceiling also
/// terminates cyclic `basedOn` graphs.
const BASED_ON_HOP_LIMIT: usize = 30;

/// Paragraph-style catalog: outline levels, numbering references and the
/// `basedOn` graph, resolvable per style id.
#[derive(Debug, Default)]
pub struct StyleTable {
    outline: HashMap<String, i32>,
    numbering: HashMap<String, (Option<i32>, Option<i32>)>,
    based_on: HashMap<String, String>,
}

impl StyleTable {
    /// Table with no entries; every lookup misses.
    pub fn empty() -> Self {
        StyleTable::default()
    }

    pub fn from_part(styles_root: &XmlNode) -> Self {
        let mut table = StyleTable::default();
        for style in styles_root.children_named("w:style") {
            if style.attr("w:type") != Some("paragraph") {
                continue;
            }
            let id = match style.attr("w:styleId") {
                Some(id) => id.to_string(),
                None => continue,
            };
            if let Some(parent) = style.child("w:basedOn").and_then(|b| b.attr("w:val")) {
                table.based_on.insert(id.clone(), parent.to_string());
            }
            let ppr = match style.child("w:pPr") {
                Some(p) => p,
                None => continue,
            };
            if let Some(lvl) = ppr
                .child("w:outlineLvl")
                .and_then(|o| o.attr("w:val"))
                .and_then(|v| v.parse().ok())
            {
                table.outline.insert(id.clone(), lvl);
            }
            if let Some(numpr) = ppr.child("w:numPr") {
                let num_id = numpr
                    .child("w:numId")
                    .and_then(|n| n.attr("w:val"))
                    .and_then(|v| v.parse().ok());
                let ilvl = numpr
                    .child("w:ilvl")
                    .and_then(|n| n.attr("w:val"))
                    .and_then(|v| v.parse().ok());
                if num_id.is_some() || ilvl.is_some() {
                    table.numbering.insert(id, (num_id, ilvl));
                }
            }
        }
        table
    }

    /// Outline level of a style, following `basedOn` until one is set.
    pub fn resolve_outline(&self, style_id: &str) -> Option<i32> {
        let mut cur = style_id;
        for _ in 0..=BASED_ON_HOP_LIMIT {
            if let Some(lvl) = self.outline.get(cur) {
                return Some(*lvl);
            }
            cur = self.based_on.get(cur)?;
        }
        None
    }

    /// Numbering reference of a style: the first style up the chain that
    /// owns one supplies the whole `(numId, ilvl)` pair.
    pub fn resolve_numbering(&self, style_id: &str) -> (Option<i32>, Option<i32>) {
        let mut cur = style_id;
        for _ in 0..=BASED_ON_HOP_LIMIT {
            if let Some(pair) = self.numbering.get(cur) {
                return *pair;
            }
            match self.based_on.get(cur) {
                Some(parent) => cur = parent,
                None => break,
            }
        }
        (None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::StyleTable;
    use crate::docx::xml::parse_part;

    fn table(xml: &str) -> StyleTable {
        StyleTable::from_part(&parse_part(xml.as_bytes()).expect("parse styles").root)
    }

    #[test]
    fn resolves_through_based_on_chain() {
        let t = table(
            "<w:styles>\
             <w:style w:type=\"paragraph\" w:styleId=\"Heading2\">\
               <w:pPr><w:outlineLvl w:val=\"1\"/></w:pPr>\
             </w:style>\
             <w:style w:type=\"paragraph\" w:styleId=\"MyHeading\">\
               <w:basedOn w:val=\"Heading2\"/>\
             </w:style>\
             <w:style w:type=\"paragraph\" w:styleId=\"Deeper\">\
               <w:basedOn w:val=\"MyHeading\"/>\
             </w:style>\
             </w:styles>",
        );
        assert_eq!(t.resolve_outline("Heading2"), Some(1));
        assert_eq!(t.resolve_outline("MyHeading"), Some(1));
        assert_eq!(t.resolve_outline("Deeper"), Some(1));
        assert_eq!(t.resolve_outline("Unknown"), None);
    }

    #[test]
    fn cyclic_chains_terminate() {
        let t = table(
            "<w:styles>\
             <w:style w:type=\"paragraph\" w:styleId=\"A\"><w:basedOn w:val=\"B\"/></w:style>\
             <w:style w:type=\"paragraph\" w:styleId=\"B\"><w:basedOn w:val=\"A\"/></w:style>\
             </w:styles>",
        );
        assert_eq!(t.resolve_outline("A"), None);
    }

    #[test]
    fn inherits_numbering_as_a_pair() {
        let t = table(
            "<w:styles>\
             <w:style w:type=\"paragraph\" w:styleId=\"ListBase\">\
               <w:pPr><w:numPr><w:ilvl w:val=\"0\"/><w:numId w:val=\"4\"/></w:numPr></w:pPr>\
             </w:style>\
             <w:style w:type=\"paragraph\" w:styleId=\"ListDeep\">\
               <w:basedOn w:val=\"ListBase\"/>\
               <w:pPr><w:numPr><w:numId w:val=\"9\"/></w:numPr></w:pPr>\
             </w:style>\
             <w:style w:type=\"character\" w:styleId=\"Char\">\
               <w:pPr><w:numPr><w:numId w:val=\"2\"/></w:numPr></w:pPr>\
             </w:style>\
             </w:styles>",
        );
        assert_eq!(t.resolve_numbering("ListBase"), (Some(4), Some(0)));
        // The nearest owner wins even when its pair is partial.
        assert_eq!(t.resolve_numbering("ListDeep"), (Some(9), None));
        assert_eq!(t.resolve_numbering("Char"), (None, None));
    }
}
