// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
Working out how the binary part of a MIME table is laid out.

The XML header of a binary table says two things about the payload: the byte
order of its numbers and the order in which each row's fields appear. Legacy
headers, with a root element named `ASDMBinaryTable`, say neither; their
payloads are big-endian with fields in declaration order. Newer headers carry
a `BulkStoreRef` element with a `byteOrder` attribute, followed by an
`Attributes` element listing one empty child per field.

*/

use rubbl_core::io::Endianness;

use crate::schema::Schema;
use crate::xml::Element;
use crate::{Result, SdmError};

/// The root element name of legacy binary table headers.
pub const LEGACY_ROOT: &str = "ASDMBinaryTable";

/// The table version implied by a legacy header.
pub const LEGACY_VERSION: &str = "2";

/// If *root_tag* names a legacy header, return the schema's declaration
/// order.
pub fn resolve_from_legacy_root(root_tag: &str, schema: &Schema) -> Option<Vec<String>> {
    if root_tag == LEGACY_ROOT {
        Some(schema.default_order())
    } else {
        None
    }
}

fn expect_child<'a>(root: &'a Element, index: usize, name: &str) -> Result<&'a Element> {
    match root.children.get(index) {
        Some(c) if c.name == name => Ok(c),
        Some(c) => Err(SdmError::MalformedHeader(format!(
            "expected <{}> as element #{} of <{}> but found <{}>",
            name,
            index + 1,
            root.name,
            c.name
        ))),
        None => Err(SdmError::MalformedHeader(format!(
            "<{}> has no element #{}; expected <{}>",
            root.name,
            index + 1,
            name
        ))),
    }
}

/// Read the field order from the `Attributes` element of a new-style
/// header.
///
/// The `Attributes` element must be the fourth child of the root, after
/// `Entity`, `ContainerEntity` and `BulkStoreRef`.
pub fn resolve_from_attributes_block(root: &Element) -> Result<Vec<String>> {
    expect_child(root, 2, "BulkStoreRef")?;
    let attributes = expect_child(root, 3, "Attributes")?;
    Ok(attributes.children.iter().map(|c| c.name.clone()).collect())
}

/// Read the payload byte order from the `BulkStoreRef` element of a
/// new-style header.
pub fn resolve_byte_order(root: &Element) -> Result<Endianness> {
    let bulk = expect_child(root, 2, "BulkStoreRef")?;

    let name = bulk.attr("byteOrder").ok_or_else(|| {
        SdmError::MalformedHeader("<BulkStoreRef> lacks a `byteOrder` attribute".to_owned())
    })?;

    Endianness::from_asdm_name(name).ok_or_else(|| {
        SdmError::MalformedHeader(format!("unrecognized byte order `{}`", name))
    })
}

/// The layout of a binary payload, as described by its header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PayloadLayout {
    pub byte_order: Endianness,
    pub attribute_order: Vec<String>,

    /// The table version announced by the header.
    pub version: String,
}

impl PayloadLayout {
    /// Analyze the root element of a binary table header.
    pub fn from_header(root: &Element, schema: &Schema) -> Result<Self> {
        if let Some(attribute_order) = resolve_from_legacy_root(&root.name, schema) {
            return Ok(PayloadLayout {
                byte_order: Endianness::Big,
                attribute_order,
                version: LEGACY_VERSION.to_owned(),
            });
        }

        let expected = schema.table_tag();

        if root.name != expected {
            return Err(SdmError::MalformedHeader(format!(
                "expected root element <{}> or <{}> but found <{}>",
                expected, LEGACY_ROOT, root.name
            )));
        }

        Ok(PayloadLayout {
            byte_order: resolve_byte_order(root)?,
            attribute_order: resolve_from_attributes_block(root)?,
            version: root.attr("schemaVersion").unwrap_or_default().to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::DELAY_MODEL_FIXED_PARAMETERS;
    use crate::xml::parse_document;

    const HEADER: &str = "<?xml version='1.0'  encoding='ISO-8859-1'?>\n\
        <DelayModelFixedParametersTable xmlns:xsi=\"x\" schemaVersion=\"3\" schemaRevision=\"-1\">\n\
        <Entity entityId='uid://X1/X2/X3' entityIdEncrypted='na' entityTypeName='DelayModelFixedParametersTable' schemaVersion='1' documentVersion='1'/>\n\
        <ContainerEntity entityId='uid://X1/X2/X0' entityIdEncrypted='na' entityTypeName='ASDM' schemaVersion='1' documentVersion='1'/>\n\
        <BulkStoreRef file_id='X1/X2/X3' byteOrder='Little_Endian' />\n\
        <Attributes>\n<delayModelVersion/>\n<execBlockId/>\n<delayModelFixedParametersId/>\n</Attributes>\n\
        </DelayModelFixedParametersTable>\n";

    #[test]
    fn new_style_header() {
        let root = parse_document(HEADER).unwrap();
        let layout = PayloadLayout::from_header(&root, &DELAY_MODEL_FIXED_PARAMETERS).unwrap();
        assert_eq!(layout.byte_order, Endianness::Little);
        assert_eq!(
            layout.attribute_order,
            vec![
                "delayModelVersion",
                "execBlockId",
                "delayModelFixedParametersId"
            ]
        );
        assert_eq!(layout.version, "3");
    }

    #[test]
    fn legacy_header() {
        let root = parse_document("<ASDMBinaryTable><Entity entityId='a' entityTypeName='b'/></ASDMBinaryTable>")
            .unwrap();
        let schema = &DELAY_MODEL_FIXED_PARAMETERS;
        let layout = PayloadLayout::from_header(&root, schema).unwrap();
        assert_eq!(layout.byte_order, Endianness::Big);
        assert_eq!(layout.attribute_order, schema.default_order());
        assert_eq!(layout.version, "2");
        assert_eq!(resolve_from_legacy_root("Other", schema), None);
    }

    #[test]
    fn misplaced_blocks() {
        let swapped = HEADER
            .replace("<BulkStoreRef", "<Tmp")
            .replace("<Attributes>", "<BulkStoreRef file_id='x' byteOrder='Big_Endian'>")
            .replace("</Attributes>", "</BulkStoreRef>")
            .replace("<Tmp", "<Attributes");
        let root = parse_document(&swapped).unwrap();
        assert!(matches!(
            resolve_from_attributes_block(&root),
            Err(SdmError::MalformedHeader(_))
        ));

        let bad_order = HEADER.replace("Little_Endian", "Middle_Endian");
        let root = parse_document(&bad_order).unwrap();
        assert!(matches!(
            resolve_byte_order(&root),
            Err(SdmError::MalformedHeader(_))
        ));

        let root = parse_document("<DelayModelFixedParametersTable><Entity/></DelayModelFixedParametersTable>")
            .unwrap();
        assert!(PayloadLayout::from_header(&root, &DELAY_MODEL_FIXED_PARAMETERS).is_err());

        let root = parse_document("<WrongTable/>").unwrap();
        assert!(PayloadLayout::from_header(&root, &DELAY_MODEL_FIXED_PARAMETERS).is_err());
    }
}
