// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

//! The enumerations used by the built-in table schemas.
//!
//! Enumerations are stored by literal name in both the binary and XML
//! representations, so the order of the literals here only determines the
//! default value of a field (the first literal).

use rubbl_core::codec::EnumDef;

pub static ACCUM_MODE: EnumDef = EnumDef {
    name: "AccumMode",
    literals: &["FAST", "NORMAL", "UNDEFINED"],
};

pub static ANTENNA_MAKE: EnumDef = EnumDef {
    name: "AntennaMake",
    literals: &[
        "AEM_12",
        "MITSUBISHI_7",
        "MITSUBISHI_12_A",
        "MITSUBISHI_12_B",
        "VERTEX_12_ATF",
        "AEM_12_ATF",
        "VERTEX_12",
        "IRAM_15",
        "UNDEFINED",
    ],
};

pub static AXIS_NAME: EnumDef = EnumDef {
    name: "AxisName",
    literals: &[
        "TIM", "BAL", "ANT", "BAB", "SPW", "SIB", "SUB", "BIN", "APC", "SPP", "POL", "STO", "HOL",
    ],
};

pub static BASEBAND_NAME: EnumDef = EnumDef {
    name: "BasebandName",
    literals: &[
        "NOBB", "BB_1", "BB_2", "BB_3", "BB_4", "BB_5", "BB_6", "BB_7", "BB_8", "BB_ALL",
    ],
};

pub static CORRELATOR_NAME: EnumDef = EnumDef {
    name: "CorrelatorName",
    literals: &[
        "ALMA_ACA",
        "ALMA_BASELINE",
        "ALMA_BASELINE_ATF",
        "ALMA_BASELINE_PROTO_OSF",
        "HERSCHEL",
        "IRAM_PDB",
        "IRAM_30M_VESPA",
        "IRAM_WILMA",
        "NRAO_VLA",
        "NRAO_WIDAR",
    ],
};

pub static FILTER_MODE: EnumDef = EnumDef {
    name: "FilterMode",
    literals: &["FILTER_NA", "FILTER_TDM", "FILTER_TFB", "UNDEFINED"],
};

pub static POLARIZATION_TYPE: EnumDef = EnumDef {
    name: "PolarizationType",
    literals: &["R", "L", "X", "Y", "BOTH"],
};

pub static PRIMARY_BEAM_DESCRIPTION: EnumDef = EnumDef {
    name: "PrimaryBeamDescription",
    literals: &["COMPLEX_FIELD_PATTERN", "APERTURE_FIELD_DISTRIBUTION"],
};

pub static RECEIVER_BAND: EnumDef = EnumDef {
    name: "ReceiverBand",
    literals: &[
        "ALMA_RB_01",
        "ALMA_RB_02",
        "ALMA_RB_03",
        "ALMA_RB_04",
        "ALMA_RB_05",
        "ALMA_RB_06",
        "ALMA_RB_07",
        "ALMA_RB_08",
        "ALMA_RB_09",
        "ALMA_RB_10",
        "ALMA_HOLOGRAPHY_RECEIVER",
        "BURE_01",
        "BURE_02",
        "BURE_03",
        "BURE_04",
        "EVLA_4",
        "EVLA_P",
        "EVLA_L",
        "EVLA_S",
        "EVLA_C",
        "EVLA_X",
        "EVLA_Ku",
        "EVLA_K",
        "EVLA_Ka",
        "EVLA_Q",
        "UNSPECIFIED",
    ],
};
