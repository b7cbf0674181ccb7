// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
ASDM tables.

A [`Table`] owns an ordered collection of [`Row`]s sharing one [`Schema`] and
guarantees that no two of them have the same key. Tables can be serialized
as XML documents or as MIME messages with a binary payload, and stored in or
loaded from a dataset directory.

*/

use rubbl_core::codec::BinaryCodec;
use rubbl_core::io::{EndianReader, EndianWriter, Endianness};
use rubbl_core::notify::NotificationBackend;
use rubbl_core::{rn_note, rn_severe, rn_warning};
use std::convert::TryFrom;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use crate::mime;
use crate::order::PayloadLayout;
use crate::row::{Row, UnknownAttributeLayouts};
use crate::schema::{FieldLayout, Schema, Value};
use crate::types::{Entity, Tag};
use crate::xml::parse_document;
use crate::{Result, SdmError};

/// The entity ID given to tables that have not been loaded from anywhere.
const PLACEHOLDER_UID: &str = "uid://X0/X0/X0";

fn same_key(a: &Row, b: &Row) -> bool {
    a.key_values() == b.key_values()
}

fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// A table of rows.
#[derive(Clone, Debug)]
pub struct Table {
    schema: &'static Schema,
    rows: Vec<Row>,
    entity: Entity,
    container_entity: Entity,
    version: String,
    prefer_binary: bool,
    byte_order: Endianness,
    check_row_uniqueness: bool,
    unknown: UnknownAttributeLayouts,
}

impl Table {
    /// Create an empty table.
    pub fn new(schema: &'static Schema) -> Self {
        Table {
            schema,
            rows: Vec::new(),
            entity: Entity::new(PLACEHOLDER_UID, schema.table_tag()),
            container_entity: Entity::new(PLACEHOLDER_UID, "ASDM"),
            version: schema.version.to_owned(),
            prefer_binary: false,
            byte_order: Endianness::native(),
            check_row_uniqueness: true,
            unknown: UnknownAttributeLayouts::new(),
        }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// The table's name, e.g. `CalPrimaryBeam`.
    pub fn name(&self) -> &'static str {
        self.schema.name
    }

    /// The names of the key fields, in declaration order.
    pub fn key_fields(&self) -> Vec<&'static str> {
        self.schema.key_names()
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn set_entity(&mut self, entity: Entity) {
        self.entity = entity;
    }

    pub fn container_entity(&self) -> &Entity {
        &self.container_entity
    }

    pub fn set_container_entity(&mut self, entity: Entity) {
        self.container_entity = entity;
    }

    /// The schema version of the document this table was loaded from, or of
    /// the schema if it was not loaded.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether [`Self::to_file`] will write the binary representation.
    pub fn prefers_binary(&self) -> bool {
        self.prefer_binary
    }

    pub fn set_prefer_binary(&mut self, prefer_binary: bool) {
        self.prefer_binary = prefer_binary;
    }

    /// The byte order used when [`Self::to_file`] writes a binary table.
    /// Loading a binary table sets this to the order it was stored in.
    pub fn byte_order(&self) -> Endianness {
        self.byte_order
    }

    pub fn set_byte_order(&mut self, order: Endianness) {
        self.byte_order = order;
    }

    /// Control whether bulk loads check that each row's key is unique.
    /// Rows added with [`Self::add`] are always checked.
    pub fn set_check_row_uniqueness(&mut self, check: bool) {
        self.check_row_uniqueness = check;
    }

    pub fn checks_row_uniqueness(&self) -> bool {
        self.check_row_uniqueness
    }

    /// Declare the binary layout of an attribute that this code's schema
    /// does not know about, so that binary data containing it can be read.
    /// The attribute's values are discarded.
    pub fn set_unknown_attribute_layout(&mut self, name: &str, layout: FieldLayout) -> Result<()> {
        if self.schema.field_index(name).is_some() {
            return Err(SdmError::conversion(
                self.schema.name,
                format!("`{}` is a known field and cannot be redeclared", name),
            ));
        }

        self.unknown.insert(name, layout);
        Ok(())
    }

    /// Create a detached row with every field at its default.
    pub fn new_row(&self) -> Row {
        Row::new(self.schema)
    }

    /// Create a detached row, setting the given fields.
    pub fn new_row_with(&self, values: &[(&str, Value)]) -> Result<Row> {
        let mut row = self.new_row();

        for (name, value) in values {
            row.set(name, value.clone())?;
        }

        Ok(row)
    }

    /// The rows, in insertion order.
    pub fn get(&self) -> &[Row] {
        &self.rows
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Get mutable access to a row. Key and extrinsic fields of the row
    /// remain frozen.
    pub fn row_mut(&mut self, index: usize) -> Option<&mut Row> {
        self.rows.get_mut(index)
    }

    /// Find the row whose key fields equal *keys*, given in declaration
    /// order.
    pub fn get_row_by_key(&self, keys: &[Value]) -> Option<&Row> {
        self.rows.iter().find(|r| {
            let have = r.key_values();
            have.len() == keys.len() && have.iter().zip(keys).all(|(h, k)| *h == Some(k))
        })
    }

    /// Find a row whose mandatory fields, other than any auto-incremented
    /// key, equal *values*.
    pub fn lookup(&self, values: &[Value]) -> Option<&Row> {
        self.rows.iter().find(|r| r.compare_no_auto_inc(values))
    }

    fn check_schema(&self, row: &Row) -> Result<()> {
        if row.schema().name != self.schema.name {
            return Err(SdmError::conversion(
                self.schema.name,
                format!("cannot add a row of the {} table", row.schema().name),
            ));
        }

        Ok(())
    }

    fn append(&mut self, mut row: Row, check_key: bool) -> Result<&Row> {
        self.check_schema(&row)?;

        if check_key && self.rows.iter().any(|r| same_key(r, &row)) {
            return Err(SdmError::DuplicateKey {
                key: row.key_text(),
                table: self.schema.name,
            });
        }

        row.mark_added();
        let index = self.rows.len();
        self.rows.push(row);
        Ok(&self.rows[index])
    }

    /// Add a row to the table, returning a reference to the stored row.
    ///
    /// If the table has an auto-incremented key and already contains a row
    /// whose other mandatory fields are equal to those of *row*, that row
    /// is returned and nothing is added. Otherwise the key is set to the
    /// next free identifier. Fails with `DuplicateKey` if a row with the
    /// same key already exists, leaving the table unchanged.
    pub fn add(&mut self, mut row: Row) -> Result<&Row> {
        self.check_schema(&row)?;

        if let Some(auto) = self.schema.auto_increment_index() {
            let values = row.no_auto_inc_values();

            if let Some(i) = self.rows.iter().position(|r| r.compare_no_auto_inc(&values)) {
                return Ok(&self.rows[i]);
            }

            let id = i32::try_from(self.rows.len()).map_err(|_| {
                SdmError::conversion(self.schema.name, "too many rows for a tag")
            })?;
            row.set_unchecked(auto, Value::Tag(Tag::new(self.schema.name, id)));
        }

        self.append(row, true)
    }

    /// Add a row whose key is already set, checking for duplicate keys
    /// unless uniqueness checking has been turned off.
    pub fn check_and_add(&mut self, row: Row) -> Result<&Row> {
        let check = self.check_row_uniqueness;
        self.append(row, check)
    }

    /// Render the table as an XML document.
    ///
    /// Rows that cannot be rendered are left out, with a warning.
    pub fn to_xml(&self, nbe: &mut dyn NotificationBackend) -> String {
        let tag = self.schema.table_tag();
        let mut buf = String::from("<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n");
        buf.push_str(&format!(
            "<{} schemaVersion=\"{}\" schemaRevision=\"-1\">\n",
            tag, self.version
        ));
        buf.push_str(&self.entity.to_xml("Entity"));
        buf.push('\n');
        buf.push_str(&self.container_entity.to_xml("ContainerEntity"));
        buf.push('\n');

        for (i, row) in self.rows.iter().enumerate() {
            match row.to_xml() {
                Ok(text) => buf.push_str(&text),
                Err(e) => {
                    rn_warning!(nbe, "leaving row #{} out of the XML form of the {} table", i, tag; e.into())
                }
            }
        }

        buf.push_str(&format!("</{}>\n", tag));
        buf
    }

    fn expect_entity(root: &crate::xml::Element, child: &str) -> Result<Entity> {
        let elem = root.child(child).ok_or_else(|| {
            SdmError::MalformedDocument(format!("<{}> lacks a <{}> element", root.name, child))
        })?;

        Entity::from_element(elem)
    }

    /// Load rows from an XML document.
    ///
    /// The document's root element and entity type must match this table.
    /// A row that cannot be parsed, or whose key duplicates one already
    /// loaded, is skipped with a warning and the load continues; a row that
    /// cannot be added for any other reason is dropped with a more severe
    /// notification.
    pub fn from_xml(&mut self, doc: &str, nbe: &mut dyn NotificationBackend) -> Result<()> {
        let name = self.schema.name;
        let tag = self.schema.table_tag();
        let root = parse_document(doc).map_err(|e| SdmError::MalformedDocument(e.to_string()))?;

        if root.name != tag {
            return Err(SdmError::MalformedDocument(format!(
                "expected root element <{}> but found <{}>",
                tag, root.name
            )));
        }

        let entity = Self::expect_entity(&root, "Entity")?;

        if entity.entity_type_name != tag {
            return Err(SdmError::MalformedDocument(format!(
                "expected entity type `{}` but found `{}`",
                tag, entity.entity_type_name
            )));
        }

        let container_entity = Self::expect_entity(&root, "ContainerEntity")?;

        self.entity = entity;
        self.container_entity = container_entity;

        if let Some(v) = root.attr("schemaVersion") {
            self.version = v.to_owned();
        }

        for (i, elem) in root.children_named("row").enumerate() {
            let row = match Row::from_element(self.schema, elem) {
                Ok(r) => r,
                Err(e) => {
                    rn_warning!(nbe, "skipping row #{} of the {} table", i, name; e.into());
                    continue;
                }
            };

            match self.check_and_add(row) {
                Ok(_) => {}
                Err(e @ SdmError::DuplicateKey { .. }) => {
                    rn_warning!(nbe, "skipping row #{} of the {} table", i, name; e.into())
                }
                Err(e) => {
                    rn_severe!(nbe, "dropping row #{} of the {} table", i, name; e.into())
                }
            }
        }

        self.prefer_binary = false;
        Ok(())
    }

    /// Render the XML description that accompanies the binary form of this
    /// table.
    pub fn mime_xml_part(&self, order: Endianness) -> String {
        let tag = self.schema.table_tag();
        let mut buf = String::from("<?xml version='1.0'  encoding='ISO-8859-1'?>\n");
        buf.push_str(&format!(
            "<{} schemaVersion=\"{}\" schemaRevision=\"-1\">\n",
            tag, self.version
        ));
        buf.push_str(&self.entity.to_xml("Entity"));
        buf.push('\n');
        buf.push_str(&self.container_entity.to_xml("ContainerEntity"));
        buf.push('\n');
        buf.push_str(&format!(
            "<BulkStoreRef file_id='{}' byteOrder='{}' />\n",
            self.entity.file_id(),
            order.asdm_name()
        ));
        buf.push_str("<Attributes>\n");

        for desc in self.schema.fields {
            buf.push_str(&format!("<{}/>\n", desc.name));
        }

        buf.push_str("</Attributes>\n");
        buf.push_str(&format!("</{}>\n", tag));
        buf
    }

    /// Render the table as a MIME message with a binary payload in the
    /// given byte order.
    pub fn to_mime(&self, order: Endianness) -> Result<Vec<u8>> {
        let mut w = EndianWriter::new(Vec::new(), order);
        self.entity.encode(&mut w)?;
        self.container_entity.encode(&mut w)?;
        w.write_length(self.rows.len())?;

        for row in &self.rows {
            row.to_bin(&mut w)?;
        }

        let binary = w.into_inner();
        Ok(mime::compose(
            &self.entity.entity_id,
            &self.mime_xml_part(order),
            &binary,
        ))
    }

    /// Load rows from a MIME message.
    ///
    /// The load is all-or-nothing: if any row fails to decode, or duplicates
    /// the key of another row, no rows are added.
    pub fn from_mime(&mut self, msg: &[u8], nbe: &mut dyn NotificationBackend) -> Result<()> {
        let schema = self.schema;
        let parts = mime::split(msg)?;
        let root =
            parse_document(parts.xml).map_err(|e| SdmError::MalformedHeader(e.to_string()))?;
        let layout = PayloadLayout::from_header(&root, schema)?;

        let total = parts.binary.len() as u64;
        let mut stream = EndianReader::new(Cursor::new(parts.binary), layout.byte_order);
        let entity = Entity::decode(&mut stream)?;
        let container_entity = Entity::decode(&mut stream)?;
        let n_rows = stream.read_i32()?;
        let mut staged: Vec<Row> = Vec::new();

        if layout.attribute_order.is_empty() && n_rows != 0 {
            return Err(SdmError::MalformedHeader(format!(
                "the {} binary table has rows but its header lists no attributes",
                schema.name
            )));
        }

        let read_row = |stream: &mut EndianReader<_>| {
            Row::from_bin(stream, schema, &layout.attribute_order, &self.unknown)
        };

        match n_rows {
            -1 => {
                rn_note!(nbe, "the {} binary table does not state its row count", schema.name);

                while stream.offset() < total {
                    staged.push(read_row(&mut stream)?);
                }
            }

            n if n >= 0 => {
                for _ in 0..n {
                    staged.push(read_row(&mut stream)?);
                }

                if stream.offset() < total {
                    rn_warning!(
                        nbe,
                        "ignoring {} bytes after the last row of the {} binary table",
                        total - stream.offset(),
                        schema.name
                    );
                }
            }

            n => return Err(rubbl_core::errors::CodecError::InvalidLength(n.into()).into()),
        }

        if self.check_row_uniqueness {
            for (i, row) in staged.iter().enumerate() {
                let clash = self.rows.iter().chain(&staged[..i]).any(|r| same_key(r, row));

                if clash {
                    return Err(SdmError::conversion(
                        schema.name,
                        SdmError::DuplicateKey {
                            key: row.key_text(),
                            table: schema.name,
                        },
                    ));
                }
            }
        }

        for mut row in staged {
            row.mark_added();
            self.rows.push(row);
        }

        self.entity = entity;
        self.container_entity = container_entity;
        self.version = layout.version;
        self.byte_order = layout.byte_order;
        self.prefer_binary = true;
        Ok(())
    }

    /// Write the table into a dataset directory, creating it if needed.
    ///
    /// If binary is preferred, `<Name>.bin` receives the MIME form and
    /// `<Name>.xml` its XML description; otherwise `<Name>.xml` receives the
    /// full XML form.
    pub fn to_file<P: AsRef<Path>>(&self, dir: P, nbe: &mut dyn NotificationBackend) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let xml_path = dir.join(format!("{}.xml", self.schema.name));

        if self.prefer_binary {
            let bin_path = dir.join(format!("{}.bin", self.schema.name));
            fs::write(&bin_path, self.to_mime(self.byte_order)?)?;
            fs::write(&xml_path, self.mime_xml_part(self.byte_order))?;
        } else {
            fs::write(&xml_path, self.to_xml(nbe))?;
        }

        Ok(())
    }

    /// Load the table from a dataset directory.
    ///
    /// `<Name>.xml` is tried first. If it only describes a binary table, or
    /// does not exist, `<Name>.bin` is loaded instead.
    pub fn set_from_file<P: AsRef<Path>>(
        &mut self,
        dir: P,
        nbe: &mut dyn NotificationBackend,
    ) -> Result<()> {
        let dir = dir.as_ref();
        let xml_path = dir.join(format!("{}.xml", self.schema.name));
        let bin_path = dir.join(format!("{}.bin", self.schema.name));

        if xml_path.is_file() {
            let text = latin1_to_string(&fs::read(&xml_path)?);

            if !text.contains("<BulkStoreRef") {
                return self.from_xml(&text, nbe);
            }
        }

        if bin_path.is_file() {
            return self.from_mime(&fs::read(&bin_path)?, nbe);
        }

        Err(SdmError::NoFileFound {
            table: self.schema.name,
            dir: dir.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::{ACCUM_MODE, BASEBAND_NAME, RECEIVER_BAND};
    use crate::schema::{FieldType, Shape};
    use crate::schemas::{CAL_PRIMARY_BEAM, CORRELATOR_MODE, DELAY_MODEL_FIXED_PARAMETERS};
    use crate::types::ArrayTime;
    use rubbl_core::notify::{BufferingNotificationBackend, NotificationKind};

    fn beam_row(t: &Table, antenna: &str, band: &str, reduction: i32) -> Row {
        t.new_row_with(&[
            ("antennaName", Value::from(antenna)),
            (
                "receiverBand",
                Value::Enum(RECEIVER_BAND.value_of(band).unwrap()),
            ),
            ("calDataId", Value::Tag(Tag::new("CalData", 0))),
            ("calReductionId", Value::Tag(Tag::new("CalReduction", reduction))),
            ("startValidTime", Value::Time(ArrayTime(1_000))),
            ("endValidTime", Value::Time(ArrayTime(2_000))),
            ("numReceptor", Value::Int(2)),
            ("mainBeamEfficiency", Value::from(vec![0.7, 0.8])),
        ])
        .unwrap()
    }

    fn beam_keys(antenna: &str, band: &str, reduction: i32) -> Vec<Value> {
        vec![
            Value::from(antenna),
            Value::Enum(RECEIVER_BAND.value_of(band).unwrap()),
            Value::Tag(Tag::new("CalData", 0)),
            Value::Tag(Tag::new("CalReduction", reduction)),
        ]
    }

    /// A table with four rows, the third of which duplicates the first.
    fn table_with_duplicate() -> Table {
        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        t.set_check_row_uniqueness(false);
        t.check_and_add(beam_row(&t, "DV01", "ALMA_RB_03", 0)).unwrap();
        t.check_and_add(beam_row(&t, "DV02", "ALMA_RB_03", 0)).unwrap();
        t.check_and_add(beam_row(&t, "DV01", "ALMA_RB_03", 0)).unwrap();
        t.check_and_add(beam_row(&t, "DV03", "ALMA_RB_03", 0)).unwrap();
        assert_eq!(t.size(), 4);
        t
    }

    #[test]
    fn key_scenario() {
        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        assert_eq!(
            t.key_fields(),
            vec!["antennaName", "receiverBand", "calDataId", "calReductionId"]
        );

        t.add(beam_row(&t, "DV01", "ALMA_RB_07", 1)).unwrap();
        let mut second = beam_row(&t, "DV01", "ALMA_RB_07", 2);
        second.set("numSubband", 5).unwrap();
        t.add(second).unwrap();
        assert_eq!(t.size(), 2);

        match t.add(beam_row(&t, "DV01", "ALMA_RB_07", 1)) {
            Err(SdmError::DuplicateKey { table, .. }) => assert_eq!(table, "CalPrimaryBeam"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(t.size(), 2);

        let found = t.get_row_by_key(&beam_keys("DV01", "ALMA_RB_07", 1)).unwrap();
        assert_eq!(found.get_as::<i32>("numSubband").unwrap(), 0);
        assert!(std::ptr::eq(found, &t.get()[0]));
        assert!(t.get_row_by_key(&beam_keys("DV09", "ALMA_RB_07", 1)).is_none());
        assert!(t.get_row_by_key(&beam_keys("DV01", "ALMA_RB_07", 1)[..3]).is_none());
    }

    #[test]
    fn frozen_after_add() {
        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        t.add(beam_row(&t, "DV01", "ALMA_RB_07", 1)).unwrap();
        let row = t.row_mut(0).unwrap();
        assert!(row.is_added());

        for name in &["antennaName", "calDataId", "calReductionId"] {
            let value = row.get(name).unwrap().clone();
            assert!(matches!(
                row.set(name, value),
                Err(SdmError::IllegalAccess { .. })
            ));
        }

        row.set("numSubband", 3).unwrap();
        assert_eq!(row.get_as::<i32>("numSubband").unwrap(), 3);

        // A copy is detached again.
        let mut copy = t.get()[0].copy();
        assert!(!copy.is_added());
        copy.set("antennaName", "DV05").unwrap();
        t.add(copy).unwrap();
        assert_eq!(t.size(), 2);
    }

    #[test]
    fn wrong_schema_rejected() {
        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        let other = Table::new(&DELAY_MODEL_FIXED_PARAMETERS).new_row();
        assert!(matches!(t.add(other), Err(SdmError::Conversion { .. })));
    }

    fn correlator_row(t: &Table, bin_mode: i32) -> Row {
        t.new_row_with(&[
            ("numBaseband", Value::Int(1)),
            (
                "basebandNames",
                Value::from(vec![BASEBAND_NAME.value_of("BB_1").unwrap()]),
            ),
            ("basebandConfig", Value::from(vec![7])),
            ("accumMode", Value::Enum(ACCUM_MODE.value_of("NORMAL").unwrap())),
            ("binMode", Value::Int(bin_mode)),
        ])
        .unwrap()
    }

    #[test]
    fn auto_increment() {
        let mut t = Table::new(&CORRELATOR_MODE);
        let a = t.add(correlator_row(&t, 1)).unwrap().clone();
        assert_eq!(
            a.get_as::<Tag>("correlatorModeId").unwrap(),
            Tag::new("CorrelatorMode", 0)
        );

        let b = t.add(correlator_row(&t, 2)).unwrap().clone();
        assert_eq!(
            b.get_as::<Tag>("correlatorModeId").unwrap(),
            Tag::new("CorrelatorMode", 1)
        );

        let again = t.add(correlator_row(&t, 1)).unwrap().clone();
        assert_eq!(again, a);
        assert_eq!(t.size(), 2);

        let values = correlator_row(&t, 2).no_auto_inc_values();
        assert_eq!(t.lookup(&values), Some(&b));
    }

    #[test]
    fn xml_round_trip() {
        let mut t = Table::new(&DELAY_MODEL_FIXED_PARAMETERS);
        t.set_entity(Entity::new(
            "uid://A002/X1/X2",
            "DelayModelFixedParametersTable",
        ));

        for version in &["CALC 11", "CALC 12"] {
            let mut row = t.new_row();
            row.set("delayModelVersion", *version).unwrap();
            row.set("execBlockId", Tag::new("ExecBlock", 0)).unwrap();
            row.set("earthRadius", 6_378_137.0).unwrap();
            t.add(row).unwrap();
        }

        let mut nbe = BufferingNotificationBackend::new();
        let doc = t.to_xml(&mut nbe);
        assert!(nbe.is_empty());
        assert!(doc.starts_with("<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<DelayModelFixedParametersTable"));

        let mut t2 = Table::new(&DELAY_MODEL_FIXED_PARAMETERS);
        t2.set_prefer_binary(true);
        t2.from_xml(&doc, &mut nbe).unwrap();
        assert!(nbe.is_empty());
        assert_eq!(t2.get(), t.get());
        assert_eq!(t2.entity(), t.entity());
        assert_eq!(t2.version(), "3");
        assert!(!t2.prefers_binary());
        assert!(t2.get().iter().all(|r| r.is_added()));
    }

    #[test]
    fn xml_unrenderable_rows_are_skipped() {
        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        t.add(beam_row(&t, "DV01", "ALMA_RB_03", 0)).unwrap();
        let mut bad = beam_row(&t, "DV02", "ALMA_RB_03", 0);
        bad.set("calDataId", Tag::new("Antenna", 0)).unwrap();
        t.add(bad).unwrap();

        let mut nbe = BufferingNotificationBackend::new();
        let doc = t.to_xml(&mut nbe);
        assert_eq!(nbe.count(NotificationKind::Warning), 1);
        assert_eq!(doc.matches("<row>").count(), 1);
    }

    #[test]
    fn xml_duplicates_are_skipped() {
        let mut nbe = BufferingNotificationBackend::new();
        let doc = table_with_duplicate().to_xml(&mut nbe);

        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        t.from_xml(&doc, &mut nbe).unwrap();
        assert_eq!(t.size(), 3);
        assert_eq!(nbe.count(NotificationKind::Warning), 1);

        let names: Vec<String> = t
            .get()
            .iter()
            .map(|r| r.get_as::<String>("antennaName").unwrap())
            .collect();
        assert_eq!(names, vec!["DV01", "DV02", "DV03"]);
    }

    #[test]
    fn xml_bad_rows_are_skipped() {
        let mut nbe = BufferingNotificationBackend::new();
        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        t.add(beam_row(&t, "DV01", "ALMA_RB_03", 0)).unwrap();
        t.add(beam_row(&t, "DV02", "ALMA_RB_03", 0)).unwrap();
        let doc = t
            .to_xml(&mut nbe)
            .replacen("<numReceptor>2</numReceptor>", "<numReceptor>two</numReceptor>", 1);

        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        t.from_xml(&doc, &mut nbe).unwrap();
        assert_eq!(t.size(), 1);
        assert_eq!(nbe.count(NotificationKind::Warning), 1);
    }

    #[test]
    fn xml_rows_with_overflowing_dimensions_are_skipped() {
        let mut nbe = BufferingNotificationBackend::new();
        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        t.add(beam_row(&t, "DV01", "ALMA_RB_03", 0)).unwrap();
        t.add(beam_row(&t, "DV02", "ALMA_RB_03", 0)).unwrap();
        let doc = t.to_xml(&mut nbe).replacen(
            "<frequencyRange>2 0 0</frequencyRange>",
            "<frequencyRange>2 4294967296 4294967296</frequencyRange>",
            1,
        );

        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        t.from_xml(&doc, &mut nbe).unwrap();
        assert_eq!(t.size(), 1);
        assert_eq!(nbe.count(NotificationKind::Warning), 1);
    }

    #[test]
    fn xml_document_validation() {
        let mut nbe = BufferingNotificationBackend::new();
        let doc = Table::new(&CAL_PRIMARY_BEAM).to_xml(&mut nbe);

        let mut t = Table::new(&DELAY_MODEL_FIXED_PARAMETERS);
        assert!(matches!(
            t.from_xml(&doc, &mut nbe),
            Err(SdmError::MalformedDocument(_))
        ));

        let wrong_entity = doc.replace(
            "entityTypeName=\"CalPrimaryBeamTable\"",
            "entityTypeName=\"AntennaTable\"",
        );
        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        assert!(matches!(
            t.from_xml(&wrong_entity, &mut nbe),
            Err(SdmError::MalformedDocument(_))
        ));

        let no_container = doc
            .lines()
            .filter(|l| !l.starts_with("<ContainerEntity"))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(matches!(
            t.from_xml(&no_container, &mut nbe),
            Err(SdmError::MalformedDocument(_))
        ));

        assert!(t.from_xml(&doc, &mut nbe).is_ok());
    }

    #[test]
    fn mime_round_trip() {
        for order in &[Endianness::Big, Endianness::Little] {
            let mut t = Table::new(&CAL_PRIMARY_BEAM);
            t.add(beam_row(&t, "DV01", "ALMA_RB_03", 0)).unwrap();
            t.add(beam_row(&t, "DV02", "ALMA_RB_06", 4)).unwrap();

            let msg = t.to_mime(*order).unwrap();
            let text = latin1_to_string(&msg);
            assert!(text.contains(&format!("byteOrder='{}'", order.asdm_name())));
            assert!(text.contains("<Attributes>\n<antennaName/>\n<receiverBand/>"));

            let mut nbe = BufferingNotificationBackend::new();
            let mut t2 = Table::new(&CAL_PRIMARY_BEAM);
            t2.from_mime(&msg, &mut nbe).unwrap();
            assert!(nbe.is_empty());
            assert_eq!(t2.get(), t.get());
            assert_eq!(t2.byte_order(), *order);
            assert!(t2.prefers_binary());
        }
    }

    #[test]
    fn mime_with_reordered_attributes() {
        let mut t = Table::new(&DELAY_MODEL_FIXED_PARAMETERS);
        let mut row = t.new_row();
        row.set("delayModelVersion", "CALC 11").unwrap();
        row.set("execBlockId", Tag::new("ExecBlock", 2)).unwrap();
        row.set("gravity", 9.8).unwrap();
        t.add(row).unwrap();

        // Write the payload by hand with two fields swapped, announcing the
        // swap in the header.
        let mut w = EndianWriter::new(Vec::new(), Endianness::Little);
        t.entity().encode(&mut w).unwrap();
        t.container_entity().encode(&mut w).unwrap();
        w.write_i32(1).unwrap();

        let stored = &t.get()[0];
        let mut order = DELAY_MODEL_FIXED_PARAMETERS.default_order();
        order.swap(1, 2);

        for name in &order {
            let desc = DELAY_MODEL_FIXED_PARAMETERS.field(name).unwrap();
            let value = stored.get(name).ok();

            if desc.optional {
                w.write_bool(value.is_some()).unwrap();
            }

            if let Some(v) = value {
                desc.layout().encode_value(v, &mut w).unwrap();
            }
        }

        let header = t
            .mime_xml_part(Endianness::Little)
            .replace(
                "<delayModelVersion/>\n<execBlockId/>",
                "<execBlockId/>\n<delayModelVersion/>",
            );
        let msg = mime::compose("uid://X0/X0/X0", &header, &w.into_inner());

        let mut nbe = BufferingNotificationBackend::new();
        let mut t2 = Table::new(&DELAY_MODEL_FIXED_PARAMETERS);
        t2.from_mime(&msg, &mut nbe).unwrap();
        assert_eq!(t2.get(), t.get());
    }

    #[test]
    fn legacy_mime() {
        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        t.add(beam_row(&t, "DV01", "ALMA_RB_03", 0)).unwrap();

        let mut w = EndianWriter::new(Vec::new(), Endianness::Big);
        t.entity().encode(&mut w).unwrap();
        t.container_entity().encode(&mut w).unwrap();
        w.write_i32(1).unwrap();
        t.get()[0].to_bin(&mut w).unwrap();

        let header = "<?xml version='1.0'  encoding='ISO-8859-1'?>\n<ASDMBinaryTable/>\n";
        let msg = mime::compose("uid://X0/X0/X0", header, &w.into_inner());

        let mut nbe = BufferingNotificationBackend::new();
        let mut t2 = Table::new(&CAL_PRIMARY_BEAM);
        t2.from_mime(&msg, &mut nbe).unwrap();
        assert_eq!(t2.get(), t.get());
        assert_eq!(t2.version(), "2");
        assert_eq!(t2.byte_order(), Endianness::Big);
    }

    #[test]
    fn mime_unstated_row_count() {
        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        t.add(beam_row(&t, "DV01", "ALMA_RB_03", 0)).unwrap();
        t.add(beam_row(&t, "DV02", "ALMA_RB_03", 0)).unwrap();

        let mut w = EndianWriter::new(Vec::new(), Endianness::Little);
        t.entity().encode(&mut w).unwrap();
        t.container_entity().encode(&mut w).unwrap();
        w.write_i32(-1).unwrap();

        for row in t.get() {
            row.to_bin(&mut w).unwrap();
        }

        let msg = mime::compose(
            "uid://X0/X0/X0",
            &t.mime_xml_part(Endianness::Little),
            &w.into_inner(),
        );

        let mut nbe = BufferingNotificationBackend::new();
        let mut t2 = Table::new(&CAL_PRIMARY_BEAM);
        t2.from_mime(&msg, &mut nbe).unwrap();
        assert_eq!(t2.size(), 2);
        assert_eq!(nbe.count(NotificationKind::Note), 1);
    }

    #[test]
    fn mime_rows_without_attributes() {
        let t = Table::new(&CAL_PRIMARY_BEAM);
        let header = t.mime_xml_part(Endianness::Little);
        let start = header.find("<Attributes>").unwrap() + "<Attributes>".len();
        let end = header.find("</Attributes>").unwrap();
        let header = format!("{}\n{}", &header[..start], &header[end..]);

        let mut w = EndianWriter::new(Vec::new(), Endianness::Little);
        t.entity().encode(&mut w).unwrap();
        t.container_entity().encode(&mut w).unwrap();
        w.write_i32(i32::MAX).unwrap();
        let msg = mime::compose("uid://X0/X0/X0", &header, &w.into_inner());

        let mut nbe = BufferingNotificationBackend::new();
        let mut t2 = Table::new(&CAL_PRIMARY_BEAM);
        assert!(matches!(
            t2.from_mime(&msg, &mut nbe),
            Err(SdmError::MalformedHeader(_))
        ));
        assert_eq!(t2.size(), 0);
    }

    #[test]
    fn mime_load_is_atomic() {
        let msg = table_with_duplicate().to_mime(Endianness::Big).unwrap();
        let mut nbe = BufferingNotificationBackend::new();

        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        assert!(matches!(
            t.from_mime(&msg, &mut nbe),
            Err(SdmError::Conversion { .. })
        ));
        assert_eq!(t.size(), 0);

        // Truncating the payload breaks the last row; nothing is committed.
        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        t.add(beam_row(&t, "DV01", "ALMA_RB_03", 0)).unwrap();
        t.add(beam_row(&t, "DV02", "ALMA_RB_03", 0)).unwrap();
        let msg = t.to_mime(Endianness::Big).unwrap();
        let cut = msg.len() - mime::TRAILER.len() - 5;
        let mut truncated = msg[..cut].to_vec();
        truncated.extend_from_slice(mime::TRAILER.as_bytes());

        let mut t2 = Table::new(&CAL_PRIMARY_BEAM);
        assert!(matches!(
            t2.from_mime(&truncated, &mut nbe),
            Err(SdmError::FieldDecode { .. })
        ));
        assert_eq!(t2.size(), 0);

        // Turning off uniqueness checks lets the duplicate through.
        let msg = table_with_duplicate().to_mime(Endianness::Big).unwrap();
        let mut t3 = Table::new(&CAL_PRIMARY_BEAM);
        t3.set_check_row_uniqueness(false);
        t3.from_mime(&msg, &mut nbe).unwrap();
        assert_eq!(t3.size(), 4);
    }

    #[test]
    fn unknown_attributes() {
        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        let layout = FieldLayout::new(FieldType::Int, Shape::Scalar, false);
        assert!(t.set_unknown_attribute_layout("antennaName", layout).is_err());

        t.add(beam_row(&t, "DV01", "ALMA_RB_03", 0)).unwrap();
        let mut w = EndianWriter::new(Vec::new(), Endianness::Big);
        t.entity().encode(&mut w).unwrap();
        t.container_entity().encode(&mut w).unwrap();
        w.write_i32(1).unwrap();
        t.get()[0].to_bin(&mut w).unwrap();
        w.write_i32(12345).unwrap();

        let header = t
            .mime_xml_part(Endianness::Big)
            .replace("</Attributes>", "<numPixel/>\n</Attributes>");
        let msg = mime::compose("uid://X0/X0/X0", &header, &w.into_inner());

        let mut nbe = BufferingNotificationBackend::new();
        let mut t2 = Table::new(&CAL_PRIMARY_BEAM);
        assert!(matches!(
            t2.from_mime(&msg, &mut nbe),
            Err(SdmError::UnknownAttribute { .. })
        ));

        t2.set_unknown_attribute_layout("numPixel", layout).unwrap();
        t2.from_mime(&msg, &mut nbe).unwrap();
        assert_eq!(t2.get(), t.get());
    }

    #[test]
    fn files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("uid___X1_X2_X3");
        let mut nbe = BufferingNotificationBackend::new();

        let mut t = Table::new(&CAL_PRIMARY_BEAM);
        assert!(matches!(
            t.set_from_file(&dir, &mut nbe),
            Err(SdmError::NoFileFound { .. })
        ));

        t.add(beam_row(&t, "DV01", "ALMA_RB_03", 0)).unwrap();
        t.to_file(&dir, &mut nbe).unwrap();
        assert!(dir.join("CalPrimaryBeam.xml").is_file());
        assert!(!dir.join("CalPrimaryBeam.bin").exists());

        let mut t2 = Table::new(&CAL_PRIMARY_BEAM);
        t2.set_from_file(&dir, &mut nbe).unwrap();
        assert_eq!(t2.get(), t.get());
        assert!(!t2.prefers_binary());

        let bin_dir = tmp.path().join("binary");
        t.set_prefer_binary(true);
        t.set_byte_order(Endianness::Little);
        t.to_file(&bin_dir, &mut nbe).unwrap();
        let header = fs::read_to_string(bin_dir.join("CalPrimaryBeam.xml")).unwrap();
        assert!(header.contains("<BulkStoreRef"));
        assert!(bin_dir.join("CalPrimaryBeam.bin").is_file());

        let mut t3 = Table::new(&CAL_PRIMARY_BEAM);
        t3.set_from_file(&bin_dir, &mut nbe).unwrap();
        assert_eq!(t3.get(), t.get());
        assert!(t3.prefers_binary());
        assert_eq!(t3.byte_order(), Endianness::Little);
        assert!(nbe.is_empty());
    }
}
