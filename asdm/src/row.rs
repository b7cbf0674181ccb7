// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
Rows of ASDM tables.

A [`Row`] holds one value slot per field of its [`Schema`]. Rows are created
detached, by [`Table::new_row`](crate::Table::new_row) or by decoding, and
become attached when they are added to a table. Once attached, key fields
and extrinsic fields are frozen; every other field can still be modified.

*/

use rubbl_core::io::{EndianReader, EndianWriter};
use std::collections::HashMap;
use std::io::{Read, Write};

use crate::schema::{FieldDescriptor, FieldLayout, FromValue, Schema, Value};
use crate::xml::{parse_document, Element};
use crate::{Result, SdmError};

/// A strategy for dealing with attribute names that appear in a binary
/// stream but not in the table's schema.
pub trait UnknownFieldPolicy {
    /// Return the layout of the named attribute, so that it can be skipped,
    /// or None if it cannot be handled.
    fn layout_of(&self, name: &str) -> Option<FieldLayout>;
}

/// Reject every unknown attribute.
#[derive(Clone, Copy, Debug, Default)]
pub struct RejectUnknown;

impl UnknownFieldPolicy for RejectUnknown {
    fn layout_of(&self, _name: &str) -> Option<FieldLayout> {
        None
    }
}

/// A registry of layouts for attributes that newer versions of a schema
/// have added, so that their data can be skipped when read by this code.
#[derive(Clone, Debug, Default)]
pub struct UnknownAttributeLayouts {
    layouts: HashMap<String, FieldLayout>,
}

impl UnknownAttributeLayouts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, layout: FieldLayout) {
        self.layouts.insert(name.into(), layout);
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl UnknownFieldPolicy for UnknownAttributeLayouts {
    fn layout_of(&self, name: &str) -> Option<FieldLayout> {
        self.layouts.get(name).copied()
    }
}

/// One record of a table.
#[derive(Clone, Debug)]
pub struct Row {
    schema: &'static Schema,
    values: Vec<Option<Value>>,
    added: bool,
}

impl PartialEq for Row {
    /// Rows are equal if they have the same schema and the same field
    /// values, regardless of whether they are attached to a table.
    fn eq(&self, other: &Row) -> bool {
        self.schema.name == other.schema.name && self.values == other.values
    }
}

impl Row {
    /// Create a detached row with every field at its default.
    pub(crate) fn new(schema: &'static Schema) -> Self {
        Row {
            schema,
            values: schema.fields.iter().map(|f| f.default_value()).collect(),
            added: false,
        }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Whether this row belongs to a table.
    pub fn is_added(&self) -> bool {
        self.added
    }

    pub(crate) fn mark_added(&mut self) {
        self.added = true;
    }

    /// Make a deep copy of this row. The copy is detached.
    pub fn copy(&self) -> Row {
        Row {
            schema: self.schema,
            values: self.values.clone(),
            added: false,
        }
    }

    fn lookup(&self, name: &str) -> Result<(usize, &'static FieldDescriptor)> {
        let schema = self.schema;

        match schema.field_index(name) {
            Some(i) => Ok((i, &schema.fields[i])),
            None => Err(SdmError::NoSuchField {
                field: name.to_owned(),
                table: schema.name,
            }),
        }
    }

    /// Get the value of a field.
    pub fn get(&self, name: &str) -> Result<&Value> {
        let (i, _) = self.lookup(name)?;

        self.values[i].as_ref().ok_or_else(|| SdmError::FieldAbsent {
            field: name.to_owned(),
            table: self.schema.name,
        })
    }

    /// Get the value of a field, converted to a Rust type.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get(name)?;

        T::from_value(value).ok_or_else(|| SdmError::TypeMismatch {
            field: name.to_owned(),
            table: self.schema.name,
            value: value.to_string(),
        })
    }

    /// Whether a field currently has a value. This is always true for
    /// mandatory fields.
    pub fn is_present(&self, name: &str) -> Result<bool> {
        let (i, _) = self.lookup(name)?;
        Ok(self.values[i].is_some())
    }

    fn check_mutable(&self, desc: &FieldDescriptor) -> Result<()> {
        if self.added && desc.is_frozen_when_added() {
            return Err(SdmError::IllegalAccess {
                field: desc.name.to_owned(),
                table: self.schema.name,
            });
        }

        Ok(())
    }

    /// Set the value of a field, marking it present if it is optional.
    ///
    /// Fails with `IllegalAccess` if the field is a key or extrinsic field
    /// and this row already belongs to a table.
    pub fn set<V: Into<Value>>(&mut self, name: &str, value: V) -> Result<()> {
        let (i, desc) = self.lookup(name)?;
        self.check_mutable(desc)?;
        let value = value.into();

        if !desc.accepts(&value) {
            return Err(SdmError::TypeMismatch {
                field: name.to_owned(),
                table: self.schema.name,
                value: desc.describe(&value),
            });
        }

        self.values[i] = Some(value);
        Ok(())
    }

    /// Mark an optional field as absent.
    pub fn clear(&mut self, name: &str) -> Result<()> {
        let (i, desc) = self.lookup(name)?;

        if !desc.optional {
            return Err(SdmError::NotOptional {
                field: name.to_owned(),
                table: self.schema.name,
            });
        }

        self.check_mutable(desc)?;
        self.values[i] = None;
        Ok(())
    }

    pub(crate) fn set_unchecked(&mut self, index: usize, value: Value) {
        self.values[index] = Some(value);
    }

    pub(crate) fn value_at(&self, index: usize) -> Option<&Value> {
        self.values[index].as_ref()
    }

    /// The values of the key fields, in declaration order.
    pub fn key_values(&self) -> Vec<Option<&Value>> {
        self.schema
            .key_indices()
            .into_iter()
            .map(|i| self.value_at(i))
            .collect()
    }

    pub(crate) fn key_text(&self) -> String {
        let names = self.schema.key_names();

        names
            .iter()
            .zip(self.key_values())
            .map(|(n, v)| match v {
                Some(v) => format!("{n}={v}"),
                None => format!("{n}=<absent>"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn compare_indices(&self, indices: &[usize], values: &[Value]) -> bool {
        if indices.len() != values.len() {
            return false;
        }

        for (i, v) in indices.iter().zip(values) {
            if self.value_at(*i) != Some(v) {
                return false;
            }
        }

        true
    }

    /// Check whether every mandatory field other than an auto-incremented
    /// key equals the corresponding element of *values*, given in
    /// declaration order.
    pub fn compare_no_auto_inc(&self, values: &[Value]) -> bool {
        self.compare_indices(&self.schema.no_auto_inc_indices(), values)
    }

    /// Check whether every mandatory non-key field equals the corresponding
    /// element of *values*, given in declaration order.
    pub fn compare_required_value(&self, values: &[Value]) -> bool {
        self.compare_indices(&self.schema.required_value_indices(), values)
    }

    /// Check whether this row's mandatory non-key fields equal those of
    /// *other*.
    pub fn equal_by_required_value(&self, other: &Row) -> bool {
        self.schema.name == other.schema.name
            && self
                .schema
                .required_value_indices()
                .into_iter()
                .all(|i| self.value_at(i) == other.value_at(i))
    }

    /// The values compared by [`Self::compare_no_auto_inc`], in order.
    pub(crate) fn no_auto_inc_values(&self) -> Vec<Value> {
        self.schema
            .no_auto_inc_indices()
            .into_iter()
            .filter_map(|i| self.value_at(i).cloned())
            .collect()
    }

    /// Render this row as a `<row>` element.
    ///
    /// Fails if a tag-valued field refers to a table other than the one
    /// named by its schema.
    pub fn to_xml(&self) -> Result<String> {
        let mut buf = String::from("<row>\n");

        for (desc, value) in self.schema.fields.iter().zip(&self.values) {
            let value = match value {
                Some(v) => v,
                None => continue,
            };

            check_references(self.schema, desc, value)?;
            buf.push_str("  ");
            buf.push_str(&desc.to_xml(value));
            buf.push('\n');
        }

        buf.push_str("</row>\n");
        Ok(buf)
    }

    /// Parse a row from the text of a `<row>` element.
    pub fn from_xml(schema: &'static Schema, doc: &str) -> Result<Row> {
        let elem = parse_document(doc).map_err(|e| SdmError::conversion(schema.name, e))?;
        Row::from_element(schema, &elem)
    }

    /// Build a row from a parsed `<row>` element.
    ///
    /// Fields are looked up by element name, so their order does not matter.
    /// Unrecognized elements are ignored. Any failure is reported as a
    /// `Conversion` error.
    pub fn from_element(schema: &'static Schema, elem: &Element) -> Result<Row> {
        if elem.name != "row" {
            return Err(SdmError::conversion(
                schema.name,
                format!("expected a <row> element but found <{}>", elem.name),
            ));
        }

        let mut row = Row::new(schema);

        for desc in schema.fields {
            match elem.child(desc.name) {
                Some(child) => {
                    let value = desc
                        .from_element(child)
                        .map_err(|e| SdmError::conversion(schema.name, format!("field `{}`: {}", desc.name, e)))?;
                    row.set(desc.name, value)
                        .map_err(|e| SdmError::conversion(schema.name, e))?;
                }

                None => {
                    if !desc.optional {
                        return Err(SdmError::conversion(
                            schema.name,
                            format!("the mandatory field `{}` is missing", desc.name),
                        ));
                    }
                }
            }
        }

        Ok(row)
    }

    /// Write this row to a binary stream, fields in declaration order.
    ///
    /// Optional fields are preceded by a boolean existence flag.
    pub fn to_bin<W: Write>(&self, stream: &mut EndianWriter<W>) -> Result<()> {
        for (desc, value) in self.schema.fields.iter().zip(&self.values) {
            let layout = desc.layout();

            let outcome = match (desc.optional, value) {
                (true, None) => stream.write_bool(false),
                (true, Some(v)) => stream
                    .write_bool(true)
                    .and_then(|_| layout.encode_value(v, stream)),
                (false, Some(v)) => layout.encode_value(v, stream),
                (false, None) => {
                    return Err(SdmError::FieldAbsent {
                        field: desc.name.to_owned(),
                        table: self.schema.name,
                    });
                }
            };

            outcome.map_err(|source| SdmError::FieldDecode {
                field: desc.name.to_owned(),
                table: self.schema.name,
                source,
            })?;
        }

        Ok(())
    }

    /// Read a row from a binary stream whose fields appear in
    /// *attribute_order*.
    ///
    /// Names not found in the schema are resolved through *policy*; if it
    /// has no layout for a name, the read fails with `UnknownAttribute`.
    /// Fields not mentioned in *attribute_order* keep their defaults. Any
    /// failure abandons the whole row.
    pub fn from_bin<R: Read>(
        stream: &mut EndianReader<R>,
        schema: &'static Schema,
        attribute_order: &[String],
        policy: &dyn UnknownFieldPolicy,
    ) -> Result<Row> {
        let mut row = Row::new(schema);

        for name in attribute_order {
            let (index, layout) = match schema.field_index(name) {
                Some(i) => (Some(i), schema.fields[i].layout()),
                None => match policy.layout_of(name) {
                    Some(layout) => (None, layout),
                    None => {
                        return Err(SdmError::UnknownAttribute {
                            field: name.clone(),
                            table: schema.name,
                        });
                    }
                },
            };

            let wrap = |source| SdmError::FieldDecode {
                field: name.clone(),
                table: schema.name,
                source,
            };

            match index {
                Some(i) => {
                    let present = !layout.optional || stream.read_bool().map_err(wrap)?;

                    row.values[i] = if present {
                        Some(layout.decode_value(stream).map_err(wrap)?)
                    } else {
                        None
                    };
                }

                None => layout.skip(stream).map_err(wrap)?,
            }
        }

        Ok(row)
    }
}

/// Tag-valued fields must refer to rows of the table their schema names.
fn check_references(schema: &Schema, desc: &FieldDescriptor, value: &Value) -> Result<()> {
    let expected = match desc.ty {
        crate::FieldType::Tag(t) => t,
        _ => return Ok(()),
    };

    let check = |v: &Value| match v {
        Value::Tag(tag) if tag.type_name() != expected => Err(SdmError::DanglingReference {
            field: desc.name.to_owned(),
            table: schema.name,
            tag: tag.to_string(),
            expected,
        }),
        _ => Ok(()),
    };

    match value {
        Value::Seq1D(items) => items.iter().try_for_each(check),
        Value::Seq2D(items) => items.iter().try_for_each(check),
        v => check(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::{POLARIZATION_TYPE, RECEIVER_BAND};
    use crate::schemas::{CAL_PRIMARY_BEAM, DELAY_MODEL_FIXED_PARAMETERS};
    use crate::types::{ArrayTime, Tag};
    use rubbl_core::io::Endianness;
    use rubbl_core::Array2;
    use std::io::Cursor;

    fn sample_beam_row() -> Row {
        let mut row = Row::new(&CAL_PRIMARY_BEAM);
        row.set("antennaName", "DV01").unwrap();
        row.set(
            "receiverBand",
            RECEIVER_BAND.value_of("ALMA_RB_07").unwrap(),
        )
        .unwrap();
        row.set("calDataId", Tag::new("CalData", 3)).unwrap();
        row.set("calReductionId", Tag::new("CalReduction", 1)).unwrap();
        row.set("startValidTime", ArrayTime(4_800_000_000_000_000_000))
            .unwrap();
        row.set("endValidTime", ArrayTime(4_800_000_100_000_000_000))
            .unwrap();
        row.set("numSubband", 2).unwrap();
        row.set(
            "frequencyRange",
            Array2::from_shape_vec((2, 2), vec![3.0e11, 3.1e11, 3.2e11, 3.3e11]).unwrap(),
        )
        .unwrap();
        row.set("numReceptor", 2).unwrap();
        row.set(
            "polarizationTypes",
            vec![
                POLARIZATION_TYPE.value_of("X").unwrap(),
                POLARIZATION_TYPE.value_of("Y").unwrap(),
            ],
        )
        .unwrap();
        row.set("mainBeamEfficiency", vec![0.71, 0.72]).unwrap();
        row.set("relativeAmplitudeRms", 0.0125f32).unwrap();
        row.set("direction", vec![1.25, -0.5]).unwrap();
        row.set("imageChannelNumber", vec![0, 1, 2]).unwrap();
        row.set("imageNominalFrequency", vec![3.05e11, 3.25e11, 3.45e11])
            .unwrap();
        row
    }

    fn sample_delay_row() -> Row {
        let mut row = Row::new(&DELAY_MODEL_FIXED_PARAMETERS);
        row.set("delayModelVersion", "CALC 11").unwrap();
        row.set("execBlockId", Tag::new("ExecBlock", 0)).unwrap();
        row.set("gravity", 9.80665).unwrap();
        row.set("ephemerisEpoch", "J2000").unwrap();
        row.set("speedOfLight", 299_792_458.0).unwrap();
        row
    }

    #[test]
    fn defaults() {
        let row = Row::new(&CAL_PRIMARY_BEAM);
        assert_eq!(row.get_as::<String>("antennaName").unwrap(), "");
        assert_eq!(
            row.get("receiverBand").unwrap(),
            &Value::Enum(RECEIVER_BAND.first())
        );
        assert_eq!(row.get_as::<Vec<f64>>("mainBeamEfficiency").unwrap(), vec![]);

        let row = Row::new(&DELAY_MODEL_FIXED_PARAMETERS);
        assert!(!row.is_present("gravity").unwrap());
        assert!(matches!(
            row.get("gravity"),
            Err(SdmError::FieldAbsent { .. })
        ));
        assert!(matches!(
            row.get("nope"),
            Err(SdmError::NoSuchField { .. })
        ));
    }

    #[test]
    fn optional_fields() {
        let mut row = sample_delay_row();
        assert!(row.is_present("gravity").unwrap());
        assert_eq!(row.get_as::<f64>("gravity").unwrap(), 9.80665);
        row.clear("gravity").unwrap();
        assert!(!row.is_present("gravity").unwrap());
        assert!(matches!(
            row.clear("delayModelVersion"),
            Err(SdmError::NotOptional { .. })
        ));
    }

    #[test]
    fn type_checking() {
        let mut row = Row::new(&CAL_PRIMARY_BEAM);
        assert!(matches!(
            row.set("numSubband", "two"),
            Err(SdmError::TypeMismatch { .. })
        ));
        assert!(matches!(
            row.set("receiverBand", POLARIZATION_TYPE.first()),
            Err(SdmError::TypeMismatch { .. })
        ));
        assert!(row.get_as::<f64>("numSubband").is_err());
    }

    #[test]
    fn binary_round_trip_both_orders() {
        for original in &[sample_beam_row(), sample_delay_row()] {
            for order in &[Endianness::Big, Endianness::Little] {
                let mut w = EndianWriter::new(Vec::new(), *order);
                original.to_bin(&mut w).unwrap();
                let buf = w.into_inner();

                let mut r = EndianReader::new(Cursor::new(&buf[..]), *order);
                let schema = original.schema();
                let decoded =
                    Row::from_bin(&mut r, schema, &schema.default_order(), &RejectUnknown)
                        .unwrap();
                assert_eq!(r.offset(), buf.len() as u64);
                assert_eq!(&decoded, original);
                assert!(decoded.equal_by_required_value(original));
                assert!(!decoded.is_added());
            }
        }
    }

    #[test]
    fn supplied_order_is_honored() {
        let original = sample_delay_row();
        let schema = original.schema();

        // Write the fields in reverse order by hand.
        let mut order = schema.default_order();
        order.reverse();
        let mut w = EndianWriter::new(Vec::new(), Endianness::Little);

        for name in &order {
            let desc = schema.field(name).unwrap();
            let value = original.get(name).ok();

            if desc.optional {
                w.write_bool(value.is_some()).unwrap();
            }

            if let Some(v) = value {
                desc.layout().encode_value(v, &mut w).unwrap();
            }
        }

        let buf = w.into_inner();
        let mut r = EndianReader::new(Cursor::new(buf), Endianness::Little);
        let decoded = Row::from_bin(&mut r, schema, &order, &RejectUnknown).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn unknown_attributes() {
        let original = sample_beam_row();
        let schema = original.schema();
        let mut w = EndianWriter::new(Vec::new(), Endianness::Big);
        original.to_bin(&mut w).unwrap();
        w.write_bool(true).unwrap();
        w.write_i32(2).unwrap();
        w.write_f64(1.0).unwrap();
        w.write_f64(2.0).unwrap();
        let buf = w.into_inner();

        let mut order = schema.default_order();
        order.push("futureSpectrum".to_owned());

        let mut r = EndianReader::new(Cursor::new(&buf[..]), Endianness::Big);
        assert!(matches!(
            Row::from_bin(&mut r, schema, &order, &RejectUnknown),
            Err(SdmError::UnknownAttribute { .. })
        ));

        let mut layouts = UnknownAttributeLayouts::new();
        layouts.insert(
            "futureSpectrum",
            FieldLayout::new(crate::FieldType::Double, crate::schema::Shape::Seq1D, true),
        );
        let mut r = EndianReader::new(Cursor::new(&buf[..]), Endianness::Big);
        let decoded = Row::from_bin(&mut r, schema, &order, &layouts).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(r.offset(), buf.len() as u64);
    }

    #[test]
    fn truncation_names_the_field() {
        let original = sample_beam_row();
        let mut w = EndianWriter::new(Vec::new(), Endianness::Big);
        original.to_bin(&mut w).unwrap();
        let buf = w.into_inner();
        let schema = original.schema();

        let mut r = EndianReader::new(Cursor::new(&buf[..buf.len() - 3]), Endianness::Big);
        match Row::from_bin(&mut r, schema, &schema.default_order(), &RejectUnknown) {
            Err(SdmError::FieldDecode { field, .. }) => {
                assert_eq!(field, "imageNominalFrequency")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn xml_round_trip() {
        for original in &[sample_beam_row(), sample_delay_row()] {
            let text = original.to_xml().unwrap();
            let decoded = Row::from_xml(original.schema(), &text).unwrap();
            assert_eq!(&decoded, original);
        }

        let mut row = sample_delay_row();
        row.clear("ephemerisEpoch").unwrap();
        let text = row.to_xml().unwrap();
        assert!(!text.contains("ephemerisEpoch"));
        let decoded = Row::from_xml(row.schema(), &text).unwrap();
        assert!(!decoded.is_present("ephemerisEpoch").unwrap());
    }

    #[test]
    fn xml_failures_are_conversions() {
        let text = sample_beam_row().to_xml().unwrap();
        let broken = text.replace("<numSubband>2</numSubband>", "<numSubband>two</numSubband>");
        assert!(matches!(
            Row::from_xml(&CAL_PRIMARY_BEAM, &broken),
            Err(SdmError::Conversion { .. })
        ));

        let missing = text.replace("<numSubband>2</numSubband>", "");
        assert!(matches!(
            Row::from_xml(&CAL_PRIMARY_BEAM, &missing),
            Err(SdmError::Conversion { .. })
        ));
    }

    #[test]
    fn dangling_reference() {
        let mut row = sample_beam_row();
        row.set("calDataId", Tag::new("CalReduction", 3)).unwrap();
        assert!(matches!(
            row.to_xml(),
            Err(SdmError::DanglingReference { .. })
        ));
    }

    #[test]
    fn comparisons() {
        let a = sample_beam_row();
        let mut b = a.copy();
        assert!(a.equal_by_required_value(&b));

        b.set("antennaName", "DV02").unwrap();
        assert!(a.equal_by_required_value(&b));

        b.set("numSubband", 3).unwrap();
        assert!(!a.equal_by_required_value(&b));

        let values = a.no_auto_inc_values();
        assert!(a.compare_no_auto_inc(&values));
        assert!(!b.compare_no_auto_inc(&values));
        assert!(!a.compare_no_auto_inc(&values[1..]));

        let required: Vec<Value> = CAL_PRIMARY_BEAM
            .required_value_indices()
            .into_iter()
            .map(|i| a.value_at(i).unwrap().clone())
            .collect();
        assert!(a.compare_required_value(&required));
        assert!(!b.compare_required_value(&required));
    }
}
