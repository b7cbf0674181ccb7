// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

//! Schemas for the tables this crate knows how to handle.

use crate::enums::*;
use crate::schema::{FieldDescriptor as F, FieldType as T, Schema};
use crate::types::QuantityKind as Q;

static CAL_PRIMARY_BEAM_FIELDS: [F; 20] = [
    F::new("antennaName", T::String).key(),
    F::new("receiverBand", T::Enum(&RECEIVER_BAND)).key(),
    F::new("calDataId", T::Tag("CalData")).key().extrinsic(),
    F::new("calReductionId", T::Tag("CalReduction")).key().extrinsic(),
    F::new("startValidTime", T::ArrayTime),
    F::new("endValidTime", T::ArrayTime),
    F::new("antennaMake", T::Enum(&ANTENNA_MAKE)),
    F::new("numSubband", T::Int),
    F::new("frequencyRange", T::Quantity(Q::Frequency)).seq2d(),
    F::new("numReceptor", T::Int),
    F::new("polarizationTypes", T::Enum(&POLARIZATION_TYPE)).seq1d(),
    F::new("mainBeamEfficiency", T::Double).seq1d(),
    F::new("beamDescriptionUID", T::EntityRef),
    F::new("relativeAmplitudeRms", T::Float),
    F::new("direction", T::Quantity(Q::Angle)).seq1d(),
    F::new("minValidDirection", T::Quantity(Q::Angle)).seq1d(),
    F::new("maxValidDirection", T::Quantity(Q::Angle)).seq1d(),
    F::new("descriptionType", T::Enum(&PRIMARY_BEAM_DESCRIPTION)),
    F::new("imageChannelNumber", T::Int).seq1d(),
    F::new("imageNominalFrequency", T::Quantity(Q::Frequency)).seq1d(),
];

/// Primary beam calibration results, one row per antenna, receiver band
/// and calibration.
pub static CAL_PRIMARY_BEAM: Schema = Schema {
    name: "CalPrimaryBeam",
    version: "3",
    fields: &CAL_PRIMARY_BEAM_FIELDS,
};

static CORRELATOR_MODE_FIELDS: [F; 10] = [
    F::new("correlatorModeId", T::Tag("CorrelatorMode")).auto_increment(),
    F::new("numBaseband", T::Int),
    F::new("basebandNames", T::Enum(&BASEBAND_NAME)).seq1d(),
    F::new("basebandConfig", T::Int).seq1d(),
    F::new("accumMode", T::Enum(&ACCUM_MODE)),
    F::new("binMode", T::Int),
    F::new("numAxes", T::Int),
    F::new("axesOrderArray", T::Enum(&AXIS_NAME)).seq1d(),
    F::new("filterMode", T::Enum(&FILTER_MODE)).seq1d(),
    F::new("correlatorName", T::Enum(&CORRELATOR_NAME)),
];

/// Correlator configurations.
pub static CORRELATOR_MODE: Schema = Schema {
    name: "CorrelatorMode",
    version: "3",
    fields: &CORRELATOR_MODE_FIELDS,
};

static DELAY_MODEL_FIXED_PARAMETERS_FIELDS: [F; 20] = [
    F::new("delayModelFixedParametersId", T::Tag("DelayModelFixedParameters")).auto_increment(),
    F::new("delayModelVersion", T::String),
    F::new("execBlockId", T::Tag("ExecBlock")).extrinsic(),
    F::new("gaussConstant", T::Quantity(Q::AngularRate)).optional(),
    F::new("newtonianConstant", T::Double).optional(),
    F::new("gravity", T::Double).optional(),
    F::new("earthFlattening", T::Double).optional(),
    F::new("earthRadius", T::Quantity(Q::Length)).optional(),
    F::new("moonEarthMassRatio", T::Double).optional(),
    F::new("ephemerisEpoch", T::String).optional(),
    F::new("earthTideLag", T::Double).optional(),
    F::new("earthGM", T::Double).optional(),
    F::new("moonGM", T::Double).optional(),
    F::new("sunGM", T::Double).optional(),
    F::new("loveNumberH", T::Double).optional(),
    F::new("loveNumberL", T::Double).optional(),
    F::new("precessionConstant", T::Quantity(Q::AngularRate)).optional(),
    F::new("lightTime1AU", T::Double).optional(),
    F::new("speedOfLight", T::Quantity(Q::Speed)).optional(),
    F::new("delayModelFlags", T::String).optional(),
];

/// The constants of a delay model, one row per execution block.
pub static DELAY_MODEL_FIXED_PARAMETERS: Schema = Schema {
    name: "DelayModelFixedParameters",
    version: "3",
    fields: &DELAY_MODEL_FIXED_PARAMETERS_FIELDS,
};

/// Every built-in schema.
pub static ALL: [&Schema; 3] = [
    &CAL_PRIMARY_BEAM,
    &CORRELATOR_MODE,
    &DELAY_MODEL_FIXED_PARAMETERS,
];

/// Look up a built-in schema by table name, e.g. `CalPrimaryBeam`.
pub fn by_name(name: &str) -> Option<&'static Schema> {
    ALL.iter().copied().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        assert_eq!(by_name("CorrelatorMode").unwrap().name, "CorrelatorMode");
        assert!(by_name("Antenna").is_none());
    }

    #[test]
    fn well_formed() {
        for schema in ALL.iter() {
            let names = schema.default_order();
            let mut dedup = names.clone();
            dedup.sort();
            dedup.dedup();
            assert_eq!(dedup.len(), names.len(), "{}", schema.name);

            // Keys and mandatory fields precede optional ones.
            let first_optional = schema
                .fields
                .iter()
                .position(|f| f.optional)
                .unwrap_or(schema.fields.len());
            assert!(schema.fields[first_optional..].iter().all(|f| f.optional));
            assert!(schema.fields.iter().filter(|f| f.auto_increment).count() <= 1);
        }

        assert_eq!(
            CAL_PRIMARY_BEAM.key_names(),
            vec!["antennaName", "receiverBand", "calDataId", "calReductionId"]
        );
        assert_eq!(
            DELAY_MODEL_FIXED_PARAMETERS.auto_increment_index(),
            Some(0)
        );
    }
}
