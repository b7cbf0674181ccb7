// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
A small XML element-tree reader.

ASDM documents use a narrow subset of XML: elements, attributes quoted with
either kind of quote, character data with the standard entities, an XML
declaration, and the occasional comment. This module parses that subset into
a tree of [`Element`] values. Namespaces are not interpreted; a prefixed name
is just a name containing a colon.

*/

use rubbl_core::codec::xml_unescape;
use thiserror::Error;

/// A syntax error in an XML document.
#[derive(Error, Debug)]
#[error("XML syntax error at byte {offset}: {message}")]
pub struct XmlError {
    pub offset: usize,
    pub message: String,
}

/// An XML element.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,

    /// The element's character data, with entities resolved. Text
    /// interleaved with child elements is concatenated.
    pub text: String,
}

impl Element {
    /// Get the value of an attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get the first child element with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Iterate over the child elements with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// The deepest element nesting that the parser accepts.
pub const MAX_DEPTH: usize = 256;

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn err<T, S: Into<String>>(&self, message: S) -> Result<T, XmlError> {
        Err(XmlError {
            offset: self.pos,
            message: message.into(),
        })
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn skip_past(&mut self, terminator: &str) -> Result<(), XmlError> {
        match self.rest().find(terminator) {
            Some(i) => {
                self.pos += i + terminator.len();
                Ok(())
            }
            None => self.err(format!("unterminated construct; expected `{}`", terminator)),
        }
    }

    /// Skip whitespace, comments, processing instructions and doctype
    /// declarations.
    fn skip_misc(&mut self) -> Result<(), XmlError> {
        loop {
            self.skip_whitespace();
            let rest = self.rest();

            if rest.starts_with("<?") {
                self.skip_past("?>")?;
            } else if rest.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if rest.starts_with("<!DOCTYPE") {
                self.skip_past(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn name(&mut self) -> Result<String, XmlError> {
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '/' | '>' | '=' | '<'))
            .unwrap_or(rest.len());

        if end == 0 {
            return self.err("expected a name");
        }

        self.pos += end;
        Ok(rest[..end].to_owned())
    }

    fn expect(&mut self, token: &str) -> Result<(), XmlError> {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            self.err(format!("expected `{}`", token))
        }
    }

    fn unescape(&self, text: &str) -> Result<String, XmlError> {
        xml_unescape(text).map_err(|e| XmlError {
            offset: self.pos,
            message: e.to_string(),
        })
    }

    fn element(&mut self, depth: usize) -> Result<Element, XmlError> {
        if depth > MAX_DEPTH {
            return self.err(format!("elements are nested more than {} deep", MAX_DEPTH));
        }

        self.expect("<")?;
        let mut elem = Element {
            name: self.name()?,
            ..Element::default()
        };

        loop {
            self.skip_whitespace();

            if self.rest().starts_with("/>") {
                self.pos += 2;
                return Ok(elem);
            }

            if self.rest().starts_with('>') {
                self.pos += 1;
                break;
            }

            let key = self.name()?;
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();

            let quote = match self.rest().chars().next() {
                Some(q @ '"') | Some(q @ '\'') => q,
                _ => return self.err("expected a quoted attribute value"),
            };

            self.pos += 1;
            let len = match self.rest().find(quote) {
                Some(n) => n,
                None => return self.err("unterminated attribute value"),
            };

            let value = self.unescape(&self.rest()[..len])?;
            self.pos += len + 1;
            elem.attrs.push((key, value));
        }

        loop {
            let rest = self.rest();

            if rest.is_empty() {
                return self.err(format!("element <{}> is not closed", elem.name));
            } else if rest.starts_with("</") {
                self.pos += 2;
                let name = self.name()?;

                if name != elem.name {
                    return self.err(format!(
                        "closing tag </{}> does not match <{}>",
                        name, elem.name
                    ));
                }

                self.skip_whitespace();
                self.expect(">")?;
                return Ok(elem);
            } else if rest.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if rest.starts_with("<![CDATA[") {
                self.pos += 9;
                let len = match self.rest().find("]]>") {
                    Some(n) => n,
                    None => return self.err("unterminated CDATA section"),
                };
                elem.text.push_str(&self.rest()[..len]);
                self.pos += len + 3;
            } else if rest.starts_with("<?") {
                self.skip_past("?>")?;
            } else if rest.starts_with('<') {
                let child = self.element(depth + 1)?;
                elem.children.push(child);
            } else {
                let len = rest.find('<').unwrap_or(rest.len());
                let text = self.unescape(&rest[..len])?;
                elem.text.push_str(&text);
                self.pos += len;
            }
        }
    }
}

/// Parse a complete document, returning its root element.
pub fn parse_document(text: &str) -> Result<Element, XmlError> {
    let mut p = Parser { src: text, pos: 0 };
    p.skip_misc()?;
    let root = p.element(1)?;
    p.skip_misc()?;

    if !p.rest().is_empty() {
        return p.err("trailing content after the root element");
    }

    Ok(root)
}
