// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
Static descriptions of ASDM tables and the values their fields hold.

A [`Schema`] is an immutable, `'static` list of [`FieldDescriptor`]s. Every
table of a given kind shares the same schema, and all per-field behavior
(defaults, binary codec, XML text form) is dispatched through the
descriptor's [`FieldType`] and [`Shape`], so a single generic row type
serves every table.

*/

use rubbl_core::codec::{
    quote_text, read_sequence_1d, read_sequence_2d, split_sequence_dims, tokenize_sequence,
    write_sequence_1d, write_sequence_2d, xml_enum, xml_escape, xml_scalar, xml_sequence,
    BinaryCodec, EnumDef, EnumValue, SequenceLen, XmlText,
};
use rubbl_core::errors::{CodecError, Result as CodecResult};
use rubbl_core::io::{EndianReader, EndianWriter};
use rubbl_core::{Array2, Complex};
use std::fmt;
use std::io::{Read, Write};

use crate::types::{ArrayTime, EntityRef, Interval, QuantityKind, Tag};
use crate::xml::Element;
use crate::{Result, SdmError};

/// The type of a field, or of the elements of a sequence-valued field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldType {
    Bool,
    Int,
    Long,
    Float,
    Double,
    String,
    Enum(&'static EnumDef),

    /// A reference to a row of the named table.
    Tag(&'static str),

    ArrayTime,
    Interval,
    Complex,

    /// A physical quantity, stored as a double in SI units.
    Quantity(QuantityKind),

    EntityRef,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FieldType::Bool => f.pad("bool"),
            FieldType::Int => f.pad("int"),
            FieldType::Long => f.pad("long"),
            FieldType::Float => f.pad("float"),
            FieldType::Double => f.pad("double"),
            FieldType::String => f.pad("string"),
            FieldType::Enum(def) => f.pad(def.name),
            FieldType::Tag(table) => f.pad(&format!("tag({table})")),
            FieldType::ArrayTime => f.pad("ArrayTime"),
            FieldType::Interval => f.pad("Interval"),
            FieldType::Complex => f.pad("complex"),
            FieldType::Quantity(kind) => f.pad(&format!("{kind} [{}]", kind.unit())),
            FieldType::EntityRef => f.pad("EntityRef"),
        }
    }
}

impl FieldType {
    /// The zero value of this type. Enumerations default to their first
    /// literal, and tags to row 0 of the referenced table.
    pub fn default_item(&self) -> Value {
        match *self {
            FieldType::Bool => Value::Bool(false),
            FieldType::Int => Value::Int(0),
            FieldType::Long => Value::Long(0),
            FieldType::Float => Value::Float(0.),
            FieldType::Double | FieldType::Quantity(_) => Value::Double(0.),
            FieldType::String => Value::String(String::new()),
            FieldType::Enum(def) => Value::Enum(def.first()),
            FieldType::Tag(table) => Value::Tag(Tag::new(table, 0)),
            FieldType::ArrayTime => Value::Time(ArrayTime::default()),
            FieldType::Interval => Value::Interval(Interval::default()),
            FieldType::Complex => Value::Complex(Complex::new(0., 0.)),
            FieldType::EntityRef => Value::EntityRef(EntityRef::default()),
        }
    }

    /// Whether *value* is a scalar of this type.
    pub fn accepts_item(&self, value: &Value) -> bool {
        match (*self, value) {
            (FieldType::Bool, Value::Bool(_)) => true,
            (FieldType::Int, Value::Int(_)) => true,
            (FieldType::Long, Value::Long(_)) => true,
            (FieldType::Float, Value::Float(_)) => true,
            (FieldType::Double, Value::Double(_)) => true,
            (FieldType::Quantity(_), Value::Double(_)) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Enum(def), Value::Enum(v)) => v.def().name == def.name,
            (FieldType::Tag(_), Value::Tag(_)) => true,
            (FieldType::ArrayTime, Value::Time(_)) => true,
            (FieldType::Interval, Value::Interval(_)) => true,
            (FieldType::Complex, Value::Complex(_)) => true,
            (FieldType::EntityRef, Value::EntityRef(_)) => true,
            _ => false,
        }
    }

    pub fn decode_item<R: Read>(&self, stream: &mut EndianReader<R>) -> CodecResult<Value> {
        Ok(match *self {
            FieldType::Bool => Value::Bool(stream.read_bool()?),
            FieldType::Int => Value::Int(stream.read_i32()?),
            FieldType::Long => Value::Long(stream.read_i64()?),
            FieldType::Float => Value::Float(stream.read_f32()?),
            FieldType::Double | FieldType::Quantity(_) => Value::Double(stream.read_f64()?),
            FieldType::String => Value::String(stream.read_string()?),
            FieldType::Enum(def) => Value::Enum(stream.read_enum(def)?),
            FieldType::Tag(_) => Value::Tag(Tag::decode(stream)?),
            FieldType::ArrayTime => Value::Time(ArrayTime::decode(stream)?),
            FieldType::Interval => Value::Interval(Interval::decode(stream)?),
            FieldType::Complex => Value::Complex(Complex::decode(stream)?),
            FieldType::EntityRef => Value::EntityRef(EntityRef::decode(stream)?),
        })
    }

    pub fn encode_item<W: Write>(
        &self,
        value: &Value,
        stream: &mut EndianWriter<W>,
    ) -> CodecResult<()> {
        match value {
            Value::Bool(v) if self.accepts_item(value) => stream.write_bool(*v),
            Value::Int(v) if self.accepts_item(value) => stream.write_i32(*v),
            Value::Long(v) if self.accepts_item(value) => stream.write_i64(*v),
            Value::Float(v) if self.accepts_item(value) => stream.write_f32(*v),
            Value::Double(v) if self.accepts_item(value) => stream.write_f64(*v),
            Value::String(v) if self.accepts_item(value) => stream.write_string(v),
            Value::Enum(v) if self.accepts_item(value) => stream.write_enum(v),
            Value::Tag(v) if self.accepts_item(value) => v.encode(stream),
            Value::Time(v) if self.accepts_item(value) => v.encode(stream),
            Value::Interval(v) if self.accepts_item(value) => v.encode(stream),
            Value::Complex(v) if self.accepts_item(value) => v.encode(stream),
            Value::EntityRef(v) if self.accepts_item(value) => v.encode(stream),
            other => Err(CodecError::InvalidText {
                what: "a value matching its field type",
                text: other.to_string(),
            }),
        }
    }

    /// Render a scalar of this type as (unescaped) text.
    pub fn item_text(&self, value: &Value) -> String {
        match value {
            Value::Bool(v) => v.to_xml_text(),
            Value::Int(v) => v.to_xml_text(),
            Value::Long(v) => v.to_xml_text(),
            Value::Float(v) => v.to_xml_text(),
            Value::Double(v) => v.to_xml_text(),
            Value::String(v) => v.clone(),
            Value::Enum(v) => v.literal().to_owned(),
            Value::Tag(v) => v.to_xml_text(),
            Value::Time(v) => v.to_xml_text(),
            Value::Interval(v) => v.to_xml_text(),
            Value::Complex(v) => v.to_xml_text(),
            other => other.to_string(),
        }
    }

    /// Parse a scalar of this type from (unescaped) text.
    pub fn item_from_text(&self, text: &str) -> CodecResult<Value> {
        Ok(match *self {
            FieldType::Bool => Value::Bool(bool::from_xml_text(text)?),
            FieldType::Int => Value::Int(i32::from_xml_text(text)?),
            FieldType::Long => Value::Long(i64::from_xml_text(text)?),
            FieldType::Float => Value::Float(f32::from_xml_text(text)?),
            FieldType::Double | FieldType::Quantity(_) => Value::Double(f64::from_xml_text(text)?),
            FieldType::String => Value::String(text.to_owned()),
            FieldType::Enum(def) => Value::Enum(def.value_of(text.trim())?),
            FieldType::Tag(_) => Value::Tag(Tag::from_xml_text(text)?),
            FieldType::ArrayTime => Value::Time(ArrayTime::from_xml_text(text)?),
            FieldType::Interval => Value::Interval(Interval::from_xml_text(text)?),
            FieldType::Complex => Value::Complex(Complex::from_xml_text(text)?),
            FieldType::EntityRef => {
                return Err(CodecError::invalid_text("an entity reference", text));
            }
        })
    }

    /// How many whitespace-separated tokens one element occupies inside a
    /// sequence.
    fn tokens_per_item(&self) -> usize {
        if *self == FieldType::Complex {
            2
        } else {
            1
        }
    }
}

/// The dimensionality of a field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Shape {
    Scalar,
    Seq1D,
    Seq2D,
}

/// Everything needed to decode one field from a binary stream.
///
/// Besides describing schema fields, layouts let a table skip over
/// attributes its schema does not know about.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldLayout {
    pub ty: FieldType,
    pub shape: Shape,

    /// Whether the value is preceded by a boolean existence flag.
    pub optional: bool,
}

impl FieldLayout {
    pub fn new(ty: FieldType, shape: Shape, optional: bool) -> Self {
        FieldLayout {
            ty,
            shape,
            optional,
        }
    }

    /// Decode a value of this layout, ignoring the existence flag.
    pub fn decode_value<R: Read>(&self, stream: &mut EndianReader<R>) -> CodecResult<Value> {
        let ty = self.ty;

        Ok(match self.shape {
            Shape::Scalar => ty.decode_item(stream)?,
            Shape::Seq1D => Value::Seq1D(read_sequence_1d(stream, SequenceLen::Prefixed, |s| {
                ty.decode_item(s)
            })?),
            Shape::Seq2D => Value::Seq2D(read_sequence_2d(stream, |s| ty.decode_item(s))?),
        })
    }

    /// Encode a value of this layout, without any existence flag.
    pub fn encode_value<W: Write>(
        &self,
        value: &Value,
        stream: &mut EndianWriter<W>,
    ) -> CodecResult<()> {
        let ty = self.ty;

        match (self.shape, value) {
            (Shape::Scalar, v) => ty.encode_item(v, stream),
            (Shape::Seq1D, Value::Seq1D(items)) => {
                write_sequence_1d(stream, SequenceLen::Prefixed, items, |s, v| {
                    ty.encode_item(v, s)
                })
            }
            (Shape::Seq2D, Value::Seq2D(items)) => {
                write_sequence_2d(stream, items, |s, v| ty.encode_item(v, s))
            }
            (_, other) => Err(CodecError::InvalidText {
                what: "a value matching its field shape",
                text: other.to_string(),
            }),
        }
    }

    /// Read and discard one field of this layout, including its existence
    /// flag if it has one.
    pub fn skip<R: Read>(&self, stream: &mut EndianReader<R>) -> CodecResult<()> {
        if !self.optional || stream.read_bool()? {
            self.decode_value(stream)?;
        }

        Ok(())
    }
}

/// The description of one field of a table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub ty: FieldType,
    pub shape: Shape,

    /// Whether the field is part of the table's key.
    pub key: bool,

    /// Whether the field refers to a row of another table.
    pub extrinsic: bool,

    pub optional: bool,

    /// Whether the table assigns the field's value when a row is added.
    pub auto_increment: bool,
}

impl FieldDescriptor {
    /// A mandatory, non-key, scalar field.
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        FieldDescriptor {
            name,
            ty,
            shape: Shape::Scalar,
            key: false,
            extrinsic: false,
            optional: false,
            auto_increment: false,
        }
    }

    pub const fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub const fn extrinsic(mut self) -> Self {
        self.extrinsic = true;
        self
    }

    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark the field as an auto-incremented key.
    pub const fn auto_increment(mut self) -> Self {
        self.key = true;
        self.auto_increment = true;
        self
    }

    pub const fn seq1d(mut self) -> Self {
        self.shape = Shape::Seq1D;
        self
    }

    pub const fn seq2d(mut self) -> Self {
        self.shape = Shape::Seq2D;
        self
    }

    /// Whether the field may not be modified once its row belongs to a
    /// table.
    pub fn is_frozen_when_added(&self) -> bool {
        self.key || self.extrinsic
    }

    pub fn layout(&self) -> FieldLayout {
        FieldLayout::new(self.ty, self.shape, self.optional)
    }

    /// The value a freshly created row holds for this field: nothing for
    /// optional fields, empty sequences, and zero scalars otherwise.
    pub fn default_value(&self) -> Option<Value> {
        if self.optional {
            return None;
        }

        Some(match self.shape {
            Shape::Scalar => self.ty.default_item(),
            Shape::Seq1D => Value::Seq1D(Vec::new()),
            Shape::Seq2D => Value::Seq2D(Array2::from_elem((0, 0), self.ty.default_item())),
        })
    }

    /// Whether *value* has the right type and shape for this field.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self.shape, value) {
            (Shape::Scalar, v) => self.ty.accepts_item(v),
            (Shape::Seq1D, Value::Seq1D(items)) => items.iter().all(|v| self.ty.accepts_item(v)),
            (Shape::Seq2D, Value::Seq2D(items)) => items.iter().all(|v| self.ty.accepts_item(v)),
            _ => false,
        }
    }

    fn sequence_item_text(&self, value: &Value) -> String {
        let text = self.ty.item_text(value);

        if self.ty == FieldType::String {
            quote_text(&text)
        } else {
            text
        }
    }

    /// Render a value of this field as an XML element.
    pub fn to_xml(&self, value: &Value) -> String {
        match (self.shape, value) {
            (_, Value::Enum(v)) => xml_enum(self.name, v),
            (_, Value::EntityRef(r)) => format!("<{0}>{1}</{0}>", self.name, r.to_xml()),
            (Shape::Scalar, v) => xml_scalar(self.name, &self.ty.item_text(v)),
            (_, Value::Seq1D(items)) => xml_sequence(
                self.name,
                &[items.len()],
                items.iter().map(|v| self.sequence_item_text(v)),
            ),
            (_, Value::Seq2D(items)) => {
                let (d1, d2) = items.dim();
                xml_sequence(
                    self.name,
                    &[d1, d2],
                    items.iter().map(|v| self.sequence_item_text(v)),
                )
            }
            (_, v) => xml_scalar(self.name, &self.ty.item_text(v)),
        }
    }

    /// Parse a value of this field from its XML element.
    pub fn from_element(&self, elem: &Element) -> Result<Value> {
        if self.ty == FieldType::EntityRef && self.shape == Shape::Scalar {
            let inner = elem.child("EntityRef").ok_or_else(|| {
                SdmError::MalformedDocument(format!(
                    "field <{}> lacks an <EntityRef> element",
                    self.name
                ))
            })?;
            return Ok(Value::EntityRef(EntityRef::from_element(inner)?));
        }

        let ty = self.ty;

        let parse_items = |tokens: &[String], n: usize| -> CodecResult<Vec<Value>> {
            let per = ty.tokens_per_item();
            let expected = n
                .checked_mul(per)
                .ok_or(CodecError::InvalidLength(i64::MAX))?;

            if tokens.len() != expected {
                return Err(CodecError::invalid_text(
                    "a sequence with the declared number of elements",
                    tokens.join(" "),
                ));
            }

            tokens
                .chunks(per)
                .map(|chunk| ty.item_from_text(&chunk.join(" ")))
                .collect()
        };

        Ok(match self.shape {
            Shape::Scalar => ty.item_from_text(&elem.text)?,

            Shape::Seq1D => {
                let tokens = tokenize_sequence(&elem.text)?;
                let (dims, rest) = split_sequence_dims(&tokens, 1)?;
                Value::Seq1D(parse_items(rest, dims[0])?)
            }

            Shape::Seq2D => {
                let tokens = tokenize_sequence(&elem.text)?;
                let (dims, rest) = split_sequence_dims(&tokens, 2)?;
                let n = dims[0]
                    .checked_mul(dims[1])
                    .ok_or(CodecError::InvalidLength(i64::MAX))?;
                let items = parse_items(rest, n)?;
                Value::Seq2D(
                    Array2::from_shape_vec((dims[0], dims[1]), items).map_err(CodecError::from)?,
                )
            }
        })
    }

    /// Escaped rendering of a value for use in messages.
    pub fn describe(&self, value: &Value) -> String {
        xml_escape(&value.to_string()).into_owned()
    }
}

/// The static description of one kind of table.
#[derive(Debug)]
pub struct Schema {
    /// The table's name, e.g. `CalPrimaryBeam`.
    pub name: &'static str,

    /// The schema version written to XML documents.
    pub version: &'static str,

    /// The table's fields, in the order in which they are written to binary
    /// streams: key fields, then other mandatory fields, then optional
    /// fields.
    pub fields: &'static [FieldDescriptor],
}

impl Schema {
    /// The name of the root element of this table's XML documents, and the
    /// entity type name of the table, e.g. `CalPrimaryBeamTable`.
    pub fn table_tag(&self) -> String {
        format!("{}Table", self.name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        let fields: &'static [FieldDescriptor] = self.fields;
        fields.iter().find(|f| f.name == name)
    }

    /// The indices of the key fields, in declaration order.
    pub fn key_indices(&self) -> Vec<usize> {
        self.indices_where(|f| f.key)
    }

    pub fn key_names(&self) -> Vec<&'static str> {
        self.fields.iter().filter(|f| f.key).map(|f| f.name).collect()
    }

    /// The index of the auto-incremented key field, if the table has one.
    pub fn auto_increment_index(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.auto_increment)
    }

    /// The indices of all mandatory fields other than an auto-incremented
    /// one. These are the fields compared by `Row::compare_no_auto_inc`.
    pub fn no_auto_inc_indices(&self) -> Vec<usize> {
        self.indices_where(|f| !f.optional && !f.auto_increment)
    }

    /// The indices of the mandatory non-key fields. These are the fields
    /// compared by `Row::compare_required_value`.
    pub fn required_value_indices(&self) -> Vec<usize> {
        self.indices_where(|f| !f.optional && !f.key)
    }

    /// The field names in declaration order. This is the order in which
    /// rows are written to binary streams and the order assumed for legacy
    /// binary tables.
    pub fn default_order(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.to_owned()).collect()
    }

    fn indices_where<F: Fn(&FieldDescriptor) -> bool>(&self, pred: F) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| pred(f))
            .map(|(i, _)| i)
            .collect()
    }
}

/// A field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Enum(EnumValue),
    Tag(Tag),
    Time(ArrayTime),
    Interval(Interval),
    Complex(Complex<f64>),
    EntityRef(EntityRef),
    Seq1D(Vec<Value>),
    Seq2D(Array2<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Enum(v) => write!(f, "{v}"),
            Value::Tag(v) => write!(f, "{v}"),
            Value::Time(v) => write!(f, "{v}"),
            Value::Interval(v) => write!(f, "{v}"),
            Value::Complex(v) => write!(f, "{v}"),
            Value::EntityRef(v) => write!(f, "{v}"),
            Value::Seq1D(items) => {
                write!(f, "[")?;

                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }

                write!(f, "]")
            }
            Value::Seq2D(items) => {
                write!(f, "[")?;

                for (i, row) in items.outer_iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }

                    write!(f, "[")?;

                    for (j, v) in row.iter().enumerate() {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{v}")?;
                    }

                    write!(f, "]")?;
                }

                write!(f, "]")
            }
        }
    }
}

macro_rules! impl_value_conversions {
    ($($ty:ty => $variant:ident;)*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

/// Types that can be extracted from a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl_value_conversions! {
    bool => Bool;
    i32 => Int;
    i64 => Long;
    f32 => Float;
    f64 => Double;
    String => String;
    EnumValue => Enum;
    Tag => Tag;
    ArrayTime => Time;
    Interval => Interval;
    Complex<f64> => Complex;
    EntityRef => EntityRef;
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Seq1D(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<Array2<T>> for Value {
    fn from(v: Array2<T>) -> Self {
        Value::Seq2D(v.mapv(|x| x.into()))
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Seq1D(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Array2<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Seq2D(items) => {
                let converted: Option<Vec<T>> = items.iter().map(T::from_value).collect();
                Array2::from_shape_vec(items.dim(), converted?).ok()
            }
            _ => None,
        }
    }
}
