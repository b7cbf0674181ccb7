// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
Per-field value codecs.

This module provides the building blocks for reading and writing individual
field values: enumerations stored as their literal names, one- and
two-dimensional sequences, and the XML text representation of all of these.

The XML text conventions are those of the ALMA Science Data Model: a scalar
field becomes `<name>value</name>`, and a sequence becomes
`<name>ndim d1 [d2] v1 v2 ...</name>`, where string elements are enclosed in
double quotes. Floating-point values are written in Rust's shortest
representation that parses back to the identical value.

*/

use ndarray::Array2;
use num_complex::Complex;
use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Write};

use crate::errors::{CodecError, Result};
use crate::io::{EndianReader, EndianWriter};

/// The definition of an enumerated type whose values are stored by name.
#[derive(Debug, Eq, PartialEq)]
pub struct EnumDef {
    /// The name of the enumeration, e.g. `ReceiverBand`.
    pub name: &'static str,

    /// The literals of the enumeration, in index order.
    pub literals: &'static [&'static str],
}

impl EnumDef {
    /// Look up a literal by name.
    pub fn value_of(&'static self, literal: &str) -> Result<EnumValue> {
        match self.literals.iter().position(|l| *l == literal) {
            Some(index) => Ok(EnumValue { def: self, index }),
            None => Err(CodecError::UnknownEnumLiteral {
                enumeration: self.name,
                literal: literal.to_owned(),
            }),
        }
    }

    /// Get the value with the given index, if it exists.
    pub fn value_at(&'static self, index: usize) -> Option<EnumValue> {
        if index < self.literals.len() {
            Some(EnumValue { def: self, index })
        } else {
            None
        }
    }

    /// The default value of the enumeration: its first literal.
    pub fn first(&'static self) -> EnumValue {
        EnumValue {
            def: self,
            index: 0,
        }
    }
}

/// A value of an enumerated type.
#[derive(Clone, Copy, Debug)]
pub struct EnumValue {
    def: &'static EnumDef,
    index: usize,
}

impl EnumValue {
    /// The enumeration this value belongs to.
    pub fn def(&self) -> &'static EnumDef {
        self.def
    }

    /// The index of this value within its enumeration.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The literal name of this value.
    pub fn literal(&self) -> &'static str {
        self.def.literals[self.index]
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &EnumValue) -> bool {
        self.def.name == other.def.name && self.index == other.index
    }
}

impl Eq for EnumValue {}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(self.literal())
    }
}

impl<R: Read> EndianReader<R> {
    /// Read an enumeration value stored as its length-prefixed literal name.
    pub fn read_enum(&mut self, def: &'static EnumDef) -> Result<EnumValue> {
        let literal = self.read_string()?;
        def.value_of(&literal)
    }
}

impl<W: Write> EndianWriter<W> {
    /// Write an enumeration value as its length-prefixed literal name.
    pub fn write_enum(&mut self, value: &EnumValue) -> Result<()> {
        self.write_string(value.literal())
    }
}

/// A type that can be decoded from and encoded to an endian-aware binary
/// stream.
pub trait BinaryCodec: Sized {
    fn decode<R: Read>(stream: &mut EndianReader<R>) -> Result<Self>;

    fn encode<W: Write>(&self, stream: &mut EndianWriter<W>) -> Result<()>;
}

macro_rules! impl_binary_codec {
    ($($ty:ty, $read:ident, $write:ident;)*) => {
        $(
            impl BinaryCodec for $ty {
                fn decode<R: Read>(stream: &mut EndianReader<R>) -> Result<Self> {
                    stream.$read()
                }

                fn encode<W: Write>(&self, stream: &mut EndianWriter<W>) -> Result<()> {
                    stream.$write(*self)
                }
            }
        )*
    };
}

impl_binary_codec! {
    bool, read_bool, write_bool;
    i16, read_i16, write_i16;
    i32, read_i32, write_i32;
    i64, read_i64, write_i64;
    f32, read_f32, write_f32;
    f64, read_f64, write_f64;
}

impl BinaryCodec for String {
    fn decode<R: Read>(stream: &mut EndianReader<R>) -> Result<Self> {
        stream.read_string()
    }

    fn encode<W: Write>(&self, stream: &mut EndianWriter<W>) -> Result<()> {
        stream.write_string(self)
    }
}

/// Complex values are stored as the real part followed by the imaginary
/// part.
impl BinaryCodec for Complex<f64> {
    fn decode<R: Read>(stream: &mut EndianReader<R>) -> Result<Self> {
        let re = stream.read_f64()?;
        let im = stream.read_f64()?;
        Ok(Complex::new(re, im))
    }

    fn encode<W: Write>(&self, stream: &mut EndianWriter<W>) -> Result<()> {
        stream.write_f64(self.re)?;
        stream.write_f64(self.im)
    }
}

/// How the length of a one-dimensional sequence is determined.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SequenceLen {
    /// The sequence is preceded by an int32 element count.
    Prefixed,

    /// The sequence has a length known to the caller, as in positional
    /// fixed-layout headers.
    Fixed(usize),
}

/// Read a one-dimensional sequence, decoding each element with *read_item*.
pub fn read_sequence_1d<R, T, F>(
    stream: &mut EndianReader<R>,
    len: SequenceLen,
    mut read_item: F,
) -> Result<Vec<T>>
where
    R: Read,
    F: FnMut(&mut EndianReader<R>) -> Result<T>,
{
    let n = match len {
        SequenceLen::Prefixed => stream.read_length()?,
        SequenceLen::Fixed(n) => n,
    };

    let mut items = Vec::with_capacity(n.min(4096));

    for _ in 0..n {
        items.push(read_item(stream)?);
    }

    Ok(items)
}

/// Write a one-dimensional sequence; the element count is emitted first
/// unless *len* says the length is fixed.
pub fn write_sequence_1d<W, T, F>(
    stream: &mut EndianWriter<W>,
    len: SequenceLen,
    items: &[T],
    mut write_item: F,
) -> Result<()>
where
    W: Write,
    F: FnMut(&mut EndianWriter<W>, &T) -> Result<()>,
{
    match len {
        SequenceLen::Prefixed => stream.write_length(items.len())?,
        SequenceLen::Fixed(n) => {
            if n != items.len() {
                return Err(CodecError::InvalidLength(items.len() as i64));
            }
        }
    }

    for item in items {
        write_item(stream, item)?;
    }

    Ok(())
}

/// Read a two-dimensional sequence: two int32 dimensions followed by the
/// elements in row-major order.
pub fn read_sequence_2d<R, T, F>(stream: &mut EndianReader<R>, mut read_item: F) -> Result<Array2<T>>
where
    R: Read,
    F: FnMut(&mut EndianReader<R>) -> Result<T>,
{
    let d1 = stream.read_length()?;
    let d2 = stream.read_length()?;
    let n = d1
        .checked_mul(d2)
        .ok_or(CodecError::InvalidLength(d1 as i64))?;
    let mut items = Vec::with_capacity(n.min(4096));

    for _ in 0..n {
        items.push(read_item(stream)?);
    }

    Ok(Array2::from_shape_vec((d1, d2), items)?)
}

/// Write a two-dimensional sequence in the form read by [`read_sequence_2d`].
pub fn write_sequence_2d<W, T, F>(
    stream: &mut EndianWriter<W>,
    items: &Array2<T>,
    mut write_item: F,
) -> Result<()>
where
    W: Write,
    F: FnMut(&mut EndianWriter<W>, &T) -> Result<()>,
{
    let (d1, d2) = items.dim();
    stream.write_length(d1)?;
    stream.write_length(d2)?;

    for item in items.iter() {
        write_item(stream, item)?;
    }

    Ok(())
}

/// A type with a textual representation inside XML elements.
pub trait XmlText: Sized {
    /// Render the value as text. The result is not yet XML-escaped.
    fn to_xml_text(&self) -> String;

    /// Parse the value from unescaped text.
    fn from_xml_text(text: &str) -> Result<Self>;
}

macro_rules! impl_xml_text_via_parse {
    ($($ty:ty, $what:expr;)*) => {
        $(
            impl XmlText for $ty {
                fn to_xml_text(&self) -> String {
                    self.to_string()
                }

                fn from_xml_text(text: &str) -> Result<Self> {
                    text.trim()
                        .parse()
                        .map_err(|_| CodecError::invalid_text($what, text))
                }
            }
        )*
    };
}

impl_xml_text_via_parse! {
    bool, "a boolean";
    i16, "a 16-bit integer";
    i32, "a 32-bit integer";
    i64, "a 64-bit integer";
    f32, "a single-precision number";
    f64, "a double-precision number";
}

impl XmlText for String {
    fn to_xml_text(&self) -> String {
        self.clone()
    }

    fn from_xml_text(text: &str) -> Result<Self> {
        Ok(text.to_owned())
    }
}

/// Complex values are written as the real and imaginary parts separated by
/// a space, so each one occupies two tokens inside a sequence.
impl XmlText for Complex<f64> {
    fn to_xml_text(&self) -> String {
        format!("{} {}", self.re, self.im)
    }

    fn from_xml_text(text: &str) -> Result<Self> {
        let mut pieces = text.split_whitespace();

        match (pieces.next(), pieces.next(), pieces.next()) {
            (Some(re), Some(im), None) => Ok(Complex::new(
                f64::from_xml_text(re)?,
                f64::from_xml_text(im)?,
            )),
            _ => Err(CodecError::invalid_text("a complex number", text)),
        }
    }
}

/// Escape text for inclusion in XML content or attribute values.
pub fn xml_escape(text: &str) -> Cow<str> {
    if !text.contains(|c: char| matches!(c, '<' | '>' | '&' | '"' | '\'')) {
        return Cow::Borrowed(text);
    }

    let mut s = String::with_capacity(text.len() + 8);

    for c in text.chars() {
        match c {
            '<' => s.push_str("&lt;"),
            '>' => s.push_str("&gt;"),
            '&' => s.push_str("&amp;"),
            '"' => s.push_str("&quot;"),
            '\'' => s.push_str("&apos;"),
            c => s.push(c),
        }
    }

    Cow::Owned(s)
}

/// Undo XML escaping, including numeric character references.
pub fn xml_unescape(text: &str) -> Result<String> {
    if !text.contains('&') {
        return Ok(text.to_owned());
    }

    let mut s = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        s.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let semi = tail
            .find(';')
            .ok_or_else(|| CodecError::invalid_text("an XML entity reference", tail))?;
        let entity = &tail[1..semi];

        let c = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };

                code.and_then(std::char::from_u32).ok_or_else(|| {
                    CodecError::invalid_text("an XML entity reference", &tail[..=semi])
                })?
            }
        };

        s.push(c);
        rest = &tail[semi + 1..];
    }

    s.push_str(rest);
    Ok(s)
}

/// Render a scalar field as `<name>text</name>`.
pub fn xml_scalar<T: XmlText>(name: &str, value: &T) -> String {
    format!("<{0}>{1}</{0}>", name, xml_escape(&value.to_xml_text()))
}

/// Render an enumeration field as `<name>LITERAL</name>`.
pub fn xml_enum(name: &str, value: &EnumValue) -> String {
    format!("<{0}>{1}</{0}>", name, value.literal())
}

/// Quote an element of a string sequence. Embedded double quotes and
/// backslashes are escaped with a backslash.
pub fn quote_text(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');

    for c in text.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }

        quoted.push(c);
    }

    quoted.push('"');
    quoted
}

/// Render a sequence field as `<name>ndim d1 [d2] v1 v2 ...</name>`.
///
/// The items must already be rendered as text, with string elements quoted
/// by [`quote_text`].
pub fn xml_sequence<I>(name: &str, dims: &[usize], items: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut text = dims.len().to_string();

    for d in dims {
        text.push(' ');
        text.push_str(&d.to_string());
    }

    for item in items {
        text.push(' ');
        text.push_str(&item);
    }

    format!("<{0}>{1}</{0}>", name, xml_escape(&text))
}

/// Split the text of a sequence element into tokens.
///
/// Tokens are separated by whitespace, except that a token beginning with a
/// double quote extends to the matching closing quote and may contain
/// whitespace. The quotes are stripped, and inside them a backslash escapes
/// the character that follows it.
pub fn tokenize_sequence(text: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }

        match chars.peek() {
            None => break,

            Some('"') => {
                chars.next();
                let mut tok = String::new();
                let mut closed = false;

                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }

                        '\\' => match chars.next() {
                            Some(escaped) => tok.push(escaped),
                            None => break,
                        },

                        c => tok.push(c),
                    }
                }

                if !closed {
                    return Err(CodecError::invalid_text("a quoted sequence element", text));
                }

                tokens.push(tok);
            }

            Some(_) => {
                let mut tok = String::new();

                while let Some(c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }

                    tok.push(*c);
                    chars.next();
                }

                tokens.push(tok);
            }
        }
    }

    Ok(tokens)
}

/// Parse the dimension header of a tokenized sequence, checking that it has
/// *ndim* dimensions. Returns the dimensions and the remaining tokens.
pub fn split_sequence_dims(tokens: &[String], ndim: usize) -> Result<(Vec<usize>, &[String])> {
    let joined = || tokens.join(" ");

    let declared: usize = tokens
        .first()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| CodecError::invalid_text("a sequence header", joined()))?;

    if declared != ndim || tokens.len() < 1 + ndim {
        return Err(CodecError::invalid_text("a sequence header", joined()));
    }

    let mut dims = Vec::with_capacity(ndim);

    for t in &tokens[1..=ndim] {
        dims.push(
            t.parse()
                .map_err(|_| CodecError::invalid_text("a sequence dimension", t.as_str()))?,
        );
    }

    Ok((dims, &tokens[1 + ndim..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Endianness;
    use std::io::Cursor;

    static COLOR: EnumDef = EnumDef {
        name: "Color",
        literals: &["RED", "GREEN", "BLUE"],
    };

    #[test]
    fn enum_lookup() {
        assert_eq!(COLOR.value_of("GREEN").unwrap().index(), 1);
        assert_eq!(COLOR.first().literal(), "RED");
        assert!(COLOR.value_at(3).is_none());

        match COLOR.value_of("PURPLE") {
            Err(CodecError::UnknownEnumLiteral {
                enumeration,
                literal,
            }) => {
                assert_eq!(enumeration, "Color");
                assert_eq!(literal, "PURPLE");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn enum_stored_as_literal() {
        let mut w = EndianWriter::new(Vec::new(), Endianness::Big);
        w.write_enum(&COLOR.value_of("BLUE").unwrap()).unwrap();
        w.write_string("MAUVE").unwrap();
        let buf = w.into_inner();
        assert_eq!(&buf[..8], b"\0\0\0\x04BLUE");

        let mut r = EndianReader::new(Cursor::new(buf), Endianness::Big);
        assert_eq!(r.read_enum(&COLOR).unwrap(), COLOR.value_of("BLUE").unwrap());
        assert!(matches!(
            r.read_enum(&COLOR),
            Err(CodecError::UnknownEnumLiteral { .. })
        ));
    }

    #[test]
    fn sequences() {
        let mut w = EndianWriter::new(Vec::new(), Endianness::Little);
        write_sequence_1d(&mut w, SequenceLen::Prefixed, &[1i32, 2, 3], |w, v| v.encode(w)).unwrap();
        write_sequence_1d(&mut w, SequenceLen::Fixed(2), &[0.5f64, 0.25], |w, v| v.encode(w))
            .unwrap();
        let grid = Array2::from_shape_vec((2, 3), vec![1i64, 2, 3, 4, 5, 6]).unwrap();
        write_sequence_2d(&mut w, &grid, |w, v| v.encode(w)).unwrap();
        assert!(write_sequence_1d(&mut w, SequenceLen::Fixed(3), &[1i32], |w, v| v.encode(w)).is_err());
        let buf = w.into_inner();
        assert_eq!(buf.len(), 4 + 12 + 16 + 8 + 48);

        let mut r = EndianReader::new(Cursor::new(buf), Endianness::Little);
        let a: Vec<i32> = read_sequence_1d(&mut r, SequenceLen::Prefixed, i32::decode).unwrap();
        assert_eq!(a, vec![1, 2, 3]);
        let b: Vec<f64> = read_sequence_1d(&mut r, SequenceLen::Fixed(2), f64::decode).unwrap();
        assert_eq!(b, vec![0.5, 0.25]);
        let c: Array2<i64> = read_sequence_2d(&mut r, i64::decode).unwrap();
        assert_eq!(c, grid);
    }

    #[test]
    fn truncated_sequence_fails() {
        let mut w = EndianWriter::new(Vec::new(), Endianness::Big);
        w.write_i32(5).unwrap();
        w.write_f64(1.0).unwrap();
        let mut r = EndianReader::new(Cursor::new(w.into_inner()), Endianness::Big);
        assert!(matches!(
            read_sequence_1d(&mut r, SequenceLen::Prefixed, f64::decode),
            Err(CodecError::TruncatedRead { .. })
        ));
    }

    #[test]
    fn xml_fragments() {
        assert_eq!(xml_scalar("numChan", &64i32), "<numChan>64</numChan>");
        assert_eq!(xml_scalar("name", &"a<b".to_owned()), "<name>a&lt;b</name>");
        assert_eq!(
            xml_enum("receiverBand", &COLOR.value_of("RED").unwrap()),
            "<receiverBand>RED</receiverBand>"
        );
        assert_eq!(
            xml_sequence("x", &[3], vec![1.5f64, 2.0, -0.1].iter().map(|v| v.to_xml_text())),
            "<x>1 3 1.5 2 -0.1</x>"
        );
        assert_eq!(
            xml_sequence("s", &[2], vec![quote_text("a b"), quote_text("c")]),
            "<s>1 2 &quot;a b&quot; &quot;c&quot;</s>"
        );
    }

    #[test]
    fn float_text_round_trips() {
        for v in &[0.1f64, 1e-300, -2.5e17, std::f64::consts::PI, f64::MAX] {
            assert_eq!(f64::from_xml_text(&v.to_xml_text()).unwrap(), *v);
        }

        for v in &[0.1f32, 3.4e38, -1.0e-7] {
            assert_eq!(f32::from_xml_text(&v.to_xml_text()).unwrap(), *v);
        }

        assert!(f64::from_xml_text("one").is_err());
        let c = Complex::new(0.5, -1.25);
        assert_eq!(Complex::<f64>::from_xml_text(&c.to_xml_text()).unwrap(), c);
    }

    #[test]
    fn escaping() {
        assert_eq!(xml_escape("plain"), "plain");
        assert_eq!(xml_escape("<&>"), "&lt;&amp;&gt;");
        assert_eq!(xml_unescape("&lt;&#65;&#x42;&amp;").unwrap(), "<AB&");
        assert!(xml_unescape("&bogus;").is_err());
        assert!(xml_unescape("a & b").is_err());
    }

    #[test]
    fn tokenizing() {
        let toks = tokenize_sequence(" 1 2  \"x y\" \"\" z ").unwrap();
        assert_eq!(toks, vec!["1", "2", "x y", "", "z"]);
        assert!(tokenize_sequence("1 1 \"open").is_err());

        let toks = tokenize_sequence("2 2 3 1 2 3 4 5 6").unwrap();
        let (dims, rest) = split_sequence_dims(&toks, 2).unwrap();
        assert_eq!(dims, vec![2, 3]);
        assert_eq!(rest.len(), 6);
        assert!(split_sequence_dims(&toks, 1).is_err());
    }

    #[test]
    fn quoted_elements_with_quotes() {
        let items = ["say \"hi\"", "C:\\dir", "\\\""];
        let quoted: Vec<String> = items.iter().map(|s| quote_text(s)).collect();
        assert_eq!(quoted[0], "\"say \\\"hi\\\"\"");

        let text = format!("1 3 {}", quoted.join(" "));
        let toks = tokenize_sequence(&text).unwrap();
        assert_eq!(&toks[2..], &items[..]);

        assert!(tokenize_sequence("1 1 \"dangling\\\"").is_err());
    }
}
