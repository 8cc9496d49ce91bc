//! Minimal XML tree for query-protocol and S3 responses.
//!
//! IAM, STS and S3 answer in XML. Responses are small, so they are parsed
//! into an owned [`Element`] tree with `quick-xml` and then navigated by
//! local name (namespaces are ignored).

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{ProviderError, ProviderResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// First direct child named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first direct child named `name`.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// First descendant (depth-first, including self) named `name`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    pub fn find_text(&self, name: &str) -> Option<&str> {
        self.find(name).map(|e| e.text.as_str())
    }

    /// Every descendant named `name`, in document order.
    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut out = Vec::new();
        self.collect(name, &mut out);
        out
    }

    fn collect<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for c in &self.children {
            if c.name == name {
                out.push(c);
            }
            c.collect(name, out);
        }
    }
}

/// Parse a document into its root element.
pub fn parse(xml: &str) -> ProviderResult<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Element {
                name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                ..Default::default()
            }),
            Ok(Event::Empty(e)) => {
                let el = Element {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    ..Default::default()
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = Some(el),
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| ProviderError::Decode(format!("xml text: {}", e)))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                let Some(done) = stack.pop() else {
                    return Err(ProviderError::Decode("unbalanced xml end tag".into()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => root = Some(done),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ProviderError::Decode(format!(
                    "xml at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    root.ok_or_else(|| ProviderError::Decode("empty xml document".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iam_error_document() {
        let doc = parse(
            r#"<?xml version="1.0"?>
<ErrorResponse xmlns="https://iam.amazonaws.com/doc/2010-05-08/">
  <Error>
    <Type>Sender</Type>
    <Code>EntityAlreadyExists</Code>
    <Message>Role with name demo already exists.</Message>
  </Error>
  <RequestId>abc</RequestId>
</ErrorResponse>"#,
        )
        .unwrap();
        assert_eq!(doc.name, "ErrorResponse");
        assert_eq!(doc.find_text("Code"), Some("EntityAlreadyExists"));
        assert_eq!(doc.child_text("RequestId"), Some("abc"));
    }

    #[test]
    fn collects_repeated_members() {
        let doc = parse(
            "<R><AttachedPolicies><member><PolicyName>a</PolicyName></member><member><PolicyName>b&amp;c</PolicyName></member></AttachedPolicies><IsTruncated/></R>",
        )
        .unwrap();
        let names: Vec<&str> = doc
            .find_all("member")
            .into_iter()
            .filter_map(|m| m.child_text("PolicyName"))
            .collect();
        assert_eq!(names, vec!["a", "b&c"]);
        assert!(doc.child("IsTruncated").is_some());
    }

    #[test]
    fn rejects_empty_input() {
        assert!(parse("").is_err());
    }
}
