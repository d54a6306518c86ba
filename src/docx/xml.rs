use anyhow::{anyhow, Context};
use quick_xml::events::{BytesDecl, Event};
use quick_xml::Reader;

/// XML declaration of a part, rewritten on save.
#[derive(Clone, Debug, PartialEq)]
pub struct XmlDecl {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

impl XmlDecl {
    /// The declaration WordprocessingML parts are saved with.
    pub fn utf8_standalone() -> Self {
        XmlDecl {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: Some("yes".to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum XmlChild {
    Element(XmlNode),
    Text(String),
    CData(String),
    Comment(String),
    PI(String),
    DocType(String),
}

/// One element of an owned part tree. Names keep their prefixed form
/// (`w:p`, `w:pPr`); attribute values keep their raw escaped bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlChild>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        XmlNode {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlChild::Text(text.into()));
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(XmlChild::Element(child));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        for (k, v) in self.attrs.iter_mut() {
            if k == key {
                *v = value.to_string();
                return;
            }
        }
        self.attrs.push((key.to_string(), value.to_string()));
    }

    /// Element children in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlNode> {
        self.children.iter().filter_map(|c| match c {
            XmlChild::Element(n) => Some(n),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlNode> {
        self.children.iter_mut().filter_map(|c| match c {
            XmlChild::Element(n) => Some(n),
            _ => None,
        })
    }

    /// First element child with the given prefixed name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.elements().find(|n| n.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlNode> {
        self.elements_mut().find(|n| n.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.elements().filter(move |n| n.name == name)
    }

    /// Depth-first search for any descendant element with the given name.
    pub fn has_descendant(&self, name: &str) -> bool {
        self.elements()
            .any(|n| n.name == name || n.has_descendant(name))
    }

    /// All descendant elements with the given name, in document order.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a XmlNode> {
        fn rec<'a>(node: &'a XmlNode, name: &str, out: &mut Vec<&'a XmlNode>) {
            for c in node.elements() {
                if c.name == name {
                    out.push(c);
                }
                rec(c, name, out);
            }
        }
        let mut out = Vec::new();
        rec(self, name, &mut out);
        out
    }

    /// Concatenated text of all `Text` and `CData` children, direct only.
    pub fn direct_text(&self) -> String {
        let mut out = String::new();
        for c in &self.children {
            match c {
                XmlChild::Text(t) | XmlChild::CData(t) => out.push_str(t),
                _ => {}
            }
        }
        out
    }
}

/// An owned, mutable tree for one XML part.
#[derive(Clone, Debug)]
pub struct XmlTree {
    pub decl: Option<XmlDecl>,
    pub prolog: Vec<XmlChild>,
    pub root: XmlNode,
}

pub fn parse_part(xml_bytes: &[u8]) -> anyhow::Result<XmlTree> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut decl: Option<XmlDecl> = None;
    let mut prolog: Vec<XmlChild> = Vec::new();
    let mut root: Option<XmlNode> = None;
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut buf = Vec::new();

    fn attach(
        stack: &mut Vec<XmlNode>,
        root: &mut Option<XmlNode>,
        prolog: &mut Vec<XmlChild>,
        child: XmlChild,
    ) -> anyhow::Result<()> {
        if let Some(top) = stack.last_mut() {
            top.children.push(child);
            return Ok(());
        }
        match child {
            XmlChild::Element(node) => {
                if root.is_some() {
                    return Err(anyhow!("multiple root elements"));
                }
                *root = Some(node);
            }
            XmlChild::Text(ref t) if root.is_some() => {
                if !t.trim().is_empty() {
                    return Err(anyhow!("text content after root element"));
                }
            }
            other => prolog.push(other),
        }
        Ok(())
    }

    loop {
        buf.clear();
        let ev = reader.read_event_into(&mut buf).context("read xml event")?;
        match ev {
            Event::Eof => break,
            Event::Decl(d) => {
                let version = bytes_to_string(d.version().context("decl version")?);
                let encoding = d
                    .encoding()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                let standalone = d
                    .standalone()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                decl = Some(XmlDecl {
                    version,
                    encoding,
                    standalone,
                });
            }
            Event::Start(s) => {
                let mut node = XmlNode::new(bytes_to_string(s.name().as_ref()));
                node.attrs = collect_attrs(&s)?;
                stack.push(node);
            }
            Event::End(e) => {
                let name = bytes_to_string(e.name().as_ref());
                let node = stack
                    .pop()
                    .ok_or_else(|| anyhow!("unbalanced end tag </{name}>"))?;
                if node.name != name {
                    return Err(anyhow!("mismatched end tag </{}> for <{}>", name, node.name));
                }
                attach(&mut stack, &mut root, &mut prolog, XmlChild::Element(node))?;
            }
            Event::Empty(s) => {
                let mut node = XmlNode::new(bytes_to_string(s.name().as_ref()));
                node.attrs = collect_attrs(&s)?;
                attach(&mut stack, &mut root, &mut prolog, XmlChild::Element(node))?;
            }
            Event::Text(t) => {
                let txt = t.unescape().context("unescape text")?.into_owned();
                attach(&mut stack, &mut root, &mut prolog, XmlChild::Text(txt))?;
            }
            Event::CData(t) => {
                let txt = bytes_to_string(t.into_inner());
                attach(&mut stack, &mut root, &mut prolog, XmlChild::CData(txt))?;
            }
            Event::Comment(t) => {
                let txt = bytes_to_string(t.into_inner());
                attach(&mut stack, &mut root, &mut prolog, XmlChild::Comment(txt))?;
            }
            Event::PI(t) => {
                let target = bytes_to_string(t.target());
                let content = bytes_to_string(t.content());
                attach(
                    &mut stack,
                    &mut root,
                    &mut prolog,
                    XmlChild::PI(format!("{target}{content}")),
                )?;
            }
            Event::DocType(t) => {
                let txt = bytes_to_string(t.into_inner());
                attach(&mut stack, &mut root, &mut prolog, XmlChild::DocType(txt))?;
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(anyhow!("unclosed element <{}>", open.name));
    }
    let root = root.ok_or_else(|| anyhow!("missing root element"))?;
    Ok(XmlTree { decl, prolog, root })
}

fn collect_attrs(s: &quick_xml::events::BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.context("attr")?;
        let key = bytes_to_string(a.key.as_ref());
        // Attribute bytes stay raw (already escaped). VML blobs such as
        // o:gfxdata encode CRLF as character references; unescaping and
        // re-escaping would let attribute-value normalization turn those
        // newlines into spaces and corrupt the embedded object.
        let val = bytes_to_string(a.value.as_ref());
        attrs.push((key, val));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

pub fn write_part(tree: &XmlTree) -> anyhow::Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();

    if let Some(d) = tree.decl.as_ref() {
        let decl = BytesDecl::new(
            d.version.as_str(),
            d.encoding.as_deref(),
            d.standalone.as_deref(),
        );
        let mut writer = quick_xml::Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(decl))
            .context("write decl")?;
        out.extend_from_slice(&writer.into_inner());
    }
    for child in &tree.prolog {
        write_child(&mut out, child);
    }
    write_node(&mut out, &tree.root);
    Ok(out)
}

fn write_node(out: &mut Vec<u8>, node: &XmlNode) {
    out.extend_from_slice(b"<");
    out.extend_from_slice(node.name.as_bytes());
    // Raw attribute values, no second escape pass.
    for (k, v) in &node.attrs {
        out.extend_from_slice(b" ");
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(v.as_bytes());
        out.extend_from_slice(b"\"");
    }
    if node.children.is_empty() {
        out.extend_from_slice(b"/>");
        return;
    }
    out.extend_from_slice(b">");
    for child in &node.children {
        write_child(out, child);
    }
    out.extend_from_slice(b"</");
    out.extend_from_slice(node.name.as_bytes());
    out.extend_from_slice(b">");
}

fn write_child(out: &mut Vec<u8>, child: &XmlChild) {
    match child {
        XmlChild::Element(n) => write_node(out, n),
        XmlChild::Text(t) => escape_text_into(out, t),
        XmlChild::CData(t) => {
            // CDATA must remain unescaped.
            out.extend_from_slice(b"<![CDATA[");
            out.extend_from_slice(t.as_bytes());
            out.extend_from_slice(b"]]>");
        }
        XmlChild::Comment(t) => {
            out.extend_from_slice(b"<!--");
            out.extend_from_slice(t.as_bytes());
            out.extend_from_slice(b"-->");
        }
        XmlChild::PI(t) => {
            out.extend_from_slice(b"<?");
            out.extend_from_slice(t.as_bytes());
            out.extend_from_slice(b"?>");
        }
        XmlChild::DocType(t) => {
            out.extend_from_slice(b"<!DOCTYPE");
            out.extend_from_slice(t.as_bytes());
            out.extend_from_slice(b">");
        }
    }
}

fn escape_text_into(out: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_part, write_part, XmlChild, XmlNode};

    #[test]
    fn write_preserves_attr_entity_refs() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?><root xmlns:o="urn:test" o:gfxdata="A&#xD;&#xA;B"/>"#;
        let tree = parse_part(xml).expect("parse xml");
        let out = write_part(&tree).expect("write xml");
        let s = String::from_utf8(out).expect("utf8");

        assert!(s.contains(r#"o:gfxdata="A&#xD;&#xA;B""#));
        assert!(!s.contains(r#"o:gfxdata="A&amp;#xD;"#));
    }

    #[test]
    fn builds_nested_tree() {
        let xml = br#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Hi &amp; bye</w:t></w:r></w:p>"#;
        let tree = parse_part(xml).expect("parse xml");
        assert_eq!(tree.root.name, "w:p");
        let style = tree
            .root
            .child("w:pPr")
            .and_then(|ppr| ppr.child("w:pStyle"))
            .and_then(|s| s.attr("w:val"));
        assert_eq!(style, Some("Heading1"));
        let text = tree
            .root
            .child("w:r")
            .and_then(|r| r.child("w:t"))
            .map(|t| t.direct_text());
        assert_eq!(text.as_deref(), Some("Hi & bye"));
    }

    #[test]
    fn childless_elements_write_self_closing() {
        let xml = b"<a><b></b><c/>x &lt; y</a>";
        let tree = parse_part(xml).expect("parse xml");
        let out = write_part(&tree).expect("write xml");
        assert_eq!(String::from_utf8(out).expect("utf8"), "<a><b/><c/>x &lt; y</a>");
    }

    #[test]
    fn set_attr_updates_or_appends() {
        let mut node = XmlNode::new("w:t").with_attr("xml:space", "default");
        node.set_attr("xml:space", "preserve");
        node.set_attr("w:extra", "1");
        assert_eq!(node.attr("xml:space"), Some("preserve"));
        assert_eq!(node.attr("w:extra"), Some("1"));
        assert_eq!(node.attrs.len(), 2);
    }

    #[test]
    fn rejects_mismatched_nesting() {
        assert!(parse_part(b"<a><b></a></b>").is_err());
        assert!(parse_part(b"<a>").is_err());
    }

    #[test]
    fn descendant_search_and_builder() {
        let p = XmlNode::new("w:p").with_child(
            XmlNode::new("w:r").with_child(XmlNode::new("w:t").with_text("x")),
        );
        assert!(p.has_descendant("w:t"));
        assert!(!p.has_descendant("w:tbl"));
        let out = write_part(&super::XmlTree {
            decl: None,
            prolog: Vec::new(),
            root: p,
        })
        .expect("write xml");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "<w:p><w:r><w:t>x</w:t></w:r></w:p>"
        );
    }

    #[test]
    fn keeps_prolog_comments() {
        let xml = b"<?xml version=\"1.0\"?><!-- generator --><root/>";
        let tree = parse_part(xml).expect("parse xml");
        assert_eq!(tree.prolog.len(), 1);
        assert!(matches!(&tree.prolog[0], XmlChild::Comment(c) if c.contains("generator")));
        let out = write_part(&tree).expect("write xml");
        let s = String::from_utf8(out).expect("utf8");
        assert!(s.contains("<!-- generator --><root/>"));
    }
}
