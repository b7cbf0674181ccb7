// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

//! Composite value types that appear in ASDM rows and table framing.

use rubbl_core::codec::{xml_escape, BinaryCodec, XmlText};
use rubbl_core::errors::{CodecError, Result as CodecResult};
use rubbl_core::io::{EndianReader, EndianWriter};
use std::fmt;
use std::io::{Read, Write};

use crate::xml::Element;
use crate::{Result, SdmError};

/// A reference to a row of some table: the table's name and an integer
/// index, written as `Name_N`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Tag {
    type_name: String,
    id: i32,
}

impl Tag {
    pub fn new<S: Into<String>>(type_name: S, id: i32) -> Self {
        Tag {
            type_name: type_name.into(),
            id,
        }
    }

    /// The name of the table the referenced row belongs to.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Parse the `Name_N` text form.
    pub fn parse(text: &str) -> CodecResult<Self> {
        let text = text.trim();

        let (name, id) = text
            .rfind('_')
            .map(|pos| (&text[..pos], &text[pos + 1..]))
            .ok_or_else(|| CodecError::invalid_text("a tag", text))?;

        if name.is_empty() {
            return Err(CodecError::invalid_text("a tag", text));
        }

        let id = id
            .parse()
            .map_err(|_| CodecError::invalid_text("a tag", text))?;
        Ok(Tag::new(name, id))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}_{}", self.type_name, self.id)
    }
}

impl BinaryCodec for Tag {
    fn decode<R: Read>(stream: &mut EndianReader<R>) -> CodecResult<Self> {
        Tag::parse(&stream.read_string()?)
    }

    fn encode<W: Write>(&self, stream: &mut EndianWriter<W>) -> CodecResult<()> {
        stream.write_string(&self.to_string())
    }
}

impl XmlText for Tag {
    fn to_xml_text(&self) -> String {
        self.to_string()
    }

    fn from_xml_text(text: &str) -> CodecResult<Self> {
        Tag::parse(text)
    }
}

macro_rules! nanosecond_type {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl BinaryCodec for $name {
            fn decode<R: Read>(stream: &mut EndianReader<R>) -> CodecResult<Self> {
                Ok($name(stream.read_i64()?))
            }

            fn encode<W: Write>(&self, stream: &mut EndianWriter<W>) -> CodecResult<()> {
                stream.write_i64(self.0)
            }
        }

        impl XmlText for $name {
            fn to_xml_text(&self) -> String {
                self.0.to_string()
            }

            fn from_xml_text(text: &str) -> CodecResult<Self> {
                Ok($name(i64::from_xml_text(text)?))
            }
        }
    };
}

nanosecond_type! {
    /// An instant, in nanoseconds since the MJD epoch.
    ArrayTime
}

nanosecond_type! {
    /// A duration, in nanoseconds.
    Interval
}

/// The physical dimension of a quantity-valued field. Quantities are stored
/// as doubles in SI units; the kind only affects how they are described.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum QuantityKind {
    Angle,
    AngularRate,
    Frequency,
    Length,
    Pressure,
    Speed,
    Temperature,
}

impl QuantityKind {
    /// The SI unit in which values of this kind are stored.
    pub fn unit(&self) -> &'static str {
        match *self {
            QuantityKind::Angle => "rad",
            QuantityKind::AngularRate => "rad/s",
            QuantityKind::Frequency => "Hz",
            QuantityKind::Length => "m",
            QuantityKind::Pressure => "Pa",
            QuantityKind::Speed => "m/s",
            QuantityKind::Temperature => "K",
        }
    }
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(match *self {
            QuantityKind::Angle => "angle",
            QuantityKind::AngularRate => "angular rate",
            QuantityKind::Frequency => "frequency",
            QuantityKind::Length => "length",
            QuantityKind::Pressure => "pressure",
            QuantityKind::Speed => "speed",
            QuantityKind::Temperature => "temperature",
        })
    }
}

fn required_attr(elem: &Element, name: &str) -> Result<String> {
    elem.attr(name).map(|s| s.to_owned()).ok_or_else(|| {
        SdmError::MalformedDocument(format!(
            "element <{}> lacks the attribute `{}`",
            elem.name, name
        ))
    })
}

/// The identity of an archived document: a table, or the dataset that
/// contains it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entity {
    pub entity_id: String,
    pub entity_id_encrypted: String,
    pub entity_type_name: String,
    pub schema_version: String,
    pub document_version: String,
}

impl Entity {
    /// Create an entity with the given UID and type name and default
    /// version information.
    pub fn new<S: Into<String>, T: Into<String>>(entity_id: S, entity_type_name: T) -> Self {
        Entity {
            entity_id: entity_id.into(),
            entity_id_encrypted: "na".to_owned(),
            entity_type_name: entity_type_name.into(),
            schema_version: "1".to_owned(),
            document_version: "1".to_owned(),
        }
    }

    /// The entity ID without its `uid://` prefix, as used for
    /// `BulkStoreRef/@file_id`.
    pub fn file_id(&self) -> &str {
        self.entity_id
            .strip_prefix("uid://")
            .unwrap_or(&self.entity_id)
    }

    /// Render as an empty XML element with the given tag name.
    pub fn to_xml(&self, tag: &str) -> String {
        format!(
            "<{} entityId=\"{}\" entityIdEncrypted=\"{}\" entityTypeName=\"{}\" schemaVersion=\"{}\" documentVersion=\"{}\"/>",
            tag,
            xml_escape(&self.entity_id),
            xml_escape(&self.entity_id_encrypted),
            xml_escape(&self.entity_type_name),
            xml_escape(&self.schema_version),
            xml_escape(&self.document_version),
        )
    }

    /// Load from the attributes of an XML element.
    pub fn from_element(elem: &Element) -> Result<Self> {
        Ok(Entity {
            entity_id: required_attr(elem, "entityId")?,
            entity_id_encrypted: elem.attr("entityIdEncrypted").unwrap_or("na").to_owned(),
            entity_type_name: required_attr(elem, "entityTypeName")?,
            schema_version: elem.attr("schemaVersion").unwrap_or("1").to_owned(),
            document_version: elem.attr("documentVersion").unwrap_or("1").to_owned(),
        })
    }
}

impl BinaryCodec for Entity {
    fn decode<R: Read>(stream: &mut EndianReader<R>) -> CodecResult<Self> {
        Ok(Entity {
            entity_id: stream.read_string()?,
            entity_id_encrypted: stream.read_string()?,
            entity_type_name: stream.read_string()?,
            schema_version: stream.read_string()?,
            document_version: stream.read_string()?,
        })
    }

    fn encode<W: Write>(&self, stream: &mut EndianWriter<W>) -> CodecResult<()> {
        stream.write_string(&self.entity_id)?;
        stream.write_string(&self.entity_id_encrypted)?;
        stream.write_string(&self.entity_type_name)?;
        stream.write_string(&self.schema_version)?;
        stream.write_string(&self.document_version)
    }
}

/// A reference to an archived document, or to a part of one.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct EntityRef {
    pub entity_id: String,
    pub part_id: String,
    pub entity_type_name: String,
    pub document_version: String,
}

impl EntityRef {
    /// Render as an `<EntityRef .../>` element.
    pub fn to_xml(&self) -> String {
        format!(
            "<EntityRef entityId=\"{}\" partId=\"{}\" entityTypeName=\"{}\" documentVersion=\"{}\"/>",
            xml_escape(&self.entity_id),
            xml_escape(&self.part_id),
            xml_escape(&self.entity_type_name),
            xml_escape(&self.document_version),
        )
    }

    /// Load from an `<EntityRef .../>` element.
    pub fn from_element(elem: &Element) -> Result<Self> {
        Ok(EntityRef {
            entity_id: required_attr(elem, "entityId")?,
            part_id: elem.attr("partId").unwrap_or_default().to_owned(),
            entity_type_name: required_attr(elem, "entityTypeName")?,
            document_version: elem.attr("documentVersion").unwrap_or("1").to_owned(),
        })
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.entity_id, self.entity_type_name)
    }
}

impl BinaryCodec for EntityRef {
    fn decode<R: Read>(stream: &mut EndianReader<R>) -> CodecResult<Self> {
        Ok(EntityRef {
            entity_id: stream.read_string()?,
            part_id: stream.read_string()?,
            entity_type_name: stream.read_string()?,
            document_version: stream.read_string()?,
        })
    }

    fn encode<W: Write>(&self, stream: &mut EndianWriter<W>) -> CodecResult<()> {
        stream.write_string(&self.entity_id)?;
        stream.write_string(&self.part_id)?;
        stream.write_string(&self.entity_type_name)?;
        stream.write_string(&self.document_version)
    }
}
