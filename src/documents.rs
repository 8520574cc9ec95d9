//! Schema document trees
//!
//! Schema documents are small and are read more than once (includes are
//! revisited, references are resolved against sibling declarations), so they
//! are materialized as element trees. Instance documents never are; they go
//! straight from the tokenizer into a validation session.

use std::rc::Rc;

use crate::error::{Error, LoadError, Result};
use crate::namespaces::{NamespaceContext, QName, XSD_NAMESPACE};
use crate::tokenizer::{Token, Tokenizer, TokenizerOptions};

/// An element of a schema document
#[derive(Debug, Clone)]
pub struct XmlElement {
    /// Expanded element name
    pub name: QName,
    /// Attributes other than namespace declarations, in document order
    pub attributes: Vec<(QName, String)>,
    /// Child elements
    pub children: Vec<XmlElement>,
    /// Concatenated character data directly inside this element
    pub text: String,
    /// 1-based line of the start tag
    pub line: usize,
    namespaces: Rc<NamespaceContext>,
}

impl XmlElement {
    /// Local name of the element
    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    /// Whether this is `xs:<local>`
    pub fn is_xsd(&self, local: &str) -> bool {
        self.name.namespace == XSD_NAMESPACE && self.name.local == local
    }

    /// Unqualified attribute value
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.namespace.is_empty() && name.local == local)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute value by expanded name
    pub fn attribute_qname(&self, qname: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == qname)
            .map(|(_, value)| value.as_str())
    }

    /// Child elements in the XSD namespace, skipping annotations
    pub fn xsd_children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children
            .iter()
            .filter(|c| c.name.namespace == XSD_NAMESPACE && c.name.local != "annotation")
    }

    /// First XSD child with the given local name
    pub fn xsd_child(&self, local: &str) -> Option<&XmlElement> {
        self.xsd_children().find(|c| c.name.local == local)
    }

    /// Resolve a lexical QName (such as an attribute value) against the
    /// bindings in scope at this element
    pub fn resolve_qname(&self, lexical: &str) -> Option<QName> {
        self.namespaces.resolve(lexical.trim())
    }

    /// Resolve a QName-valued attribute; an unbound prefix is a load error
    pub fn qname_attribute(&self, local: &str) -> Result<Option<QName>> {
        match self.attribute(local) {
            None => Ok(None),
            Some(value) => self.resolve_qname(value).map(Some).ok_or_else(|| {
                Error::Load(LoadError::new(format!(
                    "line {}: unbound prefix in {}=\"{}\"",
                    self.line, local, value
                )))
            }),
        }
    }

    /// Namespace bindings in scope at this element
    pub fn namespaces(&self) -> &NamespaceContext {
        &self.namespaces
    }
}

/// A parsed schema document
#[derive(Debug, Clone)]
pub struct Document {
    /// Root element
    pub root: XmlElement,
}

impl Document {
    /// Parse a document from bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut tokenizer = Tokenizer::new(bytes, TokenizerOptions::for_validation());
        let mut context = NamespaceContext::new();
        let mut scope: Rc<NamespaceContext> = Rc::new(context.clone());
        let mut stack: Vec<(XmlElement, Rc<NamespaceContext>)> = Vec::new();
        let mut root = None;

        loop {
            let (token, position) = tokenizer.next_with_position()?;
            match token {
                Token::StartElement(tag) => {
                    let line = position.line;
                    context.push_scope();
                    let mut declares = false;
                    for attr in tag.attributes() {
                        if attr.name.qualified == "xmlns" {
                            context.add_prefix("", attr.value);
                            declares = true;
                        } else if attr.name.prefix == "xmlns" {
                            context.add_prefix(attr.name.local, attr.value);
                            declares = true;
                        }
                    }
                    let outer = scope.clone();
                    if declares {
                        scope = Rc::new(context.clone());
                    }
                    let unbound = |what: &str| {
                        Error::Load(LoadError::new(format!(
                            "line {}: unbound namespace prefix in '{}'",
                            line, what
                        )))
                    };
                    let name = context
                        .resolve_element(tag.name().prefix, tag.name().local)
                        .ok_or_else(|| unbound(tag.name().qualified))?;
                    let mut attributes = Vec::with_capacity(tag.attribute_count());
                    for attr in tag.attributes() {
                        if attr.name.qualified == "xmlns" || attr.name.prefix == "xmlns" {
                            continue;
                        }
                        let qname = context
                            .resolve_attribute(attr.name.prefix, attr.name.local)
                            .ok_or_else(|| unbound(attr.name.qualified))?;
                        attributes.push((qname, attr.value.to_string()));
                    }
                    stack.push((
                        XmlElement {
                            name,
                            attributes,
                            children: Vec::new(),
                            text: String::new(),
                            line,
                            namespaces: scope.clone(),
                        },
                        outer,
                    ));
                }
                Token::EndElement(_) => {
                    context.pop_scope();
                    if let Some((element, outer)) = stack.pop() {
                        scope = outer;
                        match stack.last_mut() {
                            Some((parent, _)) => parent.children.push(element),
                            None => root = Some(element),
                        }
                    }
                }
                Token::CharData(text) | Token::CData(text) => {
                    if let Some((current, _)) = stack.last_mut() {
                        current.text.push_str(text.value);
                    }
                }
                Token::Eof => break,
                _ => {}
            }
        }

        root.map(|root| Document { root }).ok_or_else(|| {
            Error::Load(LoadError::new("schema document has no root element"))
        })
    }

    /// Parse a document from a string
    pub fn from_string(xml: &str) -> Result<Self> {
        Self::parse(xml.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schema_tree() {
        let xml = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t">
  <xs:annotation><xs:documentation>doc</xs:documentation></xs:annotation>
  <xs:element name="root" type="xs:string"/>
</xs:schema>"#;
        let doc = Document::from_string(xml).unwrap();
        assert!(doc.root.is_xsd("schema"));
        assert_eq!(doc.root.attribute("targetNamespace"), Some("urn:t"));
        let children: Vec<_> = doc.root.xsd_children().collect();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].attribute("name"), Some("root"));
        assert_eq!(
            children[0].qname_attribute("type").unwrap(),
            Some(QName::xsd("string"))
        );
        assert_eq!(children[0].line, 3);
    }

    #[test]
    fn test_scoped_namespaces() {
        let xml = r#"<s xmlns="urn:a"><c xmlns:p="urn:p" ref="p:x"/><d ref="p:x"/></s>"#;
        let doc = Document::from_string(xml).unwrap();
        assert_eq!(doc.root.name, QName::new("urn:a", "s"));
        let c = &doc.root.children[0];
        assert_eq!(c.qname_attribute("ref").unwrap(), Some(QName::new("urn:p", "x")));
        let d = &doc.root.children[1];
        assert!(d.qname_attribute("ref").is_err());
        assert_eq!(d.resolve_qname("y"), Some(QName::new("urn:a", "y")));
    }

    #[test]
    fn test_unbound_element_prefix() {
        assert!(matches!(
            Document::from_string("<q:root/>"),
            Err(Error::Load(_))
        ));
    }

    #[test]
    fn test_syntax_error_propagates() {
        assert!(matches!(
            Document::from_string("<a><b></a>"),
            Err(Error::Syntax(_))
        ));
    }
}
