// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
The fixed-layout dataset header.

The header is a long run of fields at fixed positions: scalars describing the
observation as a whole, then a set of parallel arrays indexed by spectrometer
array (each exactly `ARYMAX` entries long, however many arrays were actually
used), then three tables of `ARYMAX × 10` calibration coefficients, then a few
trailing scalars that describe the data records. Reading and writing share a
single description of that order, [`Header::visit`], so the two cannot drift
apart.

*/

use ndarray::Array2;
use rubbl_core::errors::CodecError;
use rubbl_core::io::{EndianReader, EndianWriter};
use std::fmt;
use std::io::{Read, Write};

use crate::NroFormatError;

/// The number of calibration coefficients stored per array.
pub const N_CAL_COEFFS: usize = 10;

/// The name of a single header field, including any array subscripts, as
/// used in error messages.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldName {
    Scalar(&'static str),
    Element(&'static str, usize),
    Element2(&'static str, usize, usize),
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FieldName::Scalar(n) => write!(f, "{}", n),
            FieldName::Element(n, i) => write!(f, "{}[{}]", n, i),
            FieldName::Element2(n, i, j) => write!(f, "{}[{}][{}]", n, i, j),
        }
    }
}

/// Something that walks over the header fields in their on-disk order.
pub trait HeaderVisitor {
    /// A fixed-width text field.
    fn string(
        &mut self,
        name: FieldName,
        width: usize,
        value: &mut String,
    ) -> Result<(), NroFormatError>;

    /// A 32-bit integer field.
    fn int(&mut self, name: FieldName, value: &mut i32) -> Result<(), NroFormatError>;

    /// A 64-bit floating-point field.
    fn double(&mut self, name: FieldName, value: &mut f64) -> Result<(), NroFormatError>;
}

fn field_error(name: FieldName) -> impl FnOnce(CodecError) -> NroFormatError {
    move |source| NroFormatError::Field {
        field: name.to_string(),
        source,
    }
}

/// Fills in header fields from a stream.
///
/// Text fields lose any trailing NULs and blanks.
pub struct HeaderReader<'a, R: Read> {
    stream: &'a mut EndianReader<R>,
}

impl<'a, R: Read> HeaderReader<'a, R> {
    pub fn new(stream: &'a mut EndianReader<R>) -> Self {
        HeaderReader { stream }
    }
}

impl<'a, R: Read> HeaderVisitor for HeaderReader<'a, R> {
    fn string(
        &mut self,
        name: FieldName,
        width: usize,
        value: &mut String,
    ) -> Result<(), NroFormatError> {
        let text = self
            .stream
            .read_fixed_string(width)
            .map_err(field_error(name))?;
        *value = text.trim_end_matches(' ').to_owned();
        Ok(())
    }

    fn int(&mut self, name: FieldName, value: &mut i32) -> Result<(), NroFormatError> {
        *value = self.stream.read_i32().map_err(field_error(name))?;
        Ok(())
    }

    fn double(&mut self, name: FieldName, value: &mut f64) -> Result<(), NroFormatError> {
        *value = self.stream.read_f64().map_err(field_error(name))?;
        Ok(())
    }
}

/// Emits header fields to a stream.
pub struct HeaderWriter<'a, W: Write> {
    stream: &'a mut EndianWriter<W>,
}

impl<'a, W: Write> HeaderWriter<'a, W> {
    pub fn new(stream: &'a mut EndianWriter<W>) -> Self {
        HeaderWriter { stream }
    }
}

impl<'a, W: Write> HeaderVisitor for HeaderWriter<'a, W> {
    fn string(
        &mut self,
        name: FieldName,
        width: usize,
        value: &mut String,
    ) -> Result<(), NroFormatError> {
        self.stream
            .write_fixed_string(value, width)
            .map_err(field_error(name))
    }

    fn int(&mut self, name: FieldName, value: &mut i32) -> Result<(), NroFormatError> {
        self.stream.write_i32(*value).map_err(field_error(name))
    }

    fn double(&mut self, name: FieldName, value: &mut f64) -> Result<(), NroFormatError> {
        self.stream.write_f64(*value).map_err(field_error(name))
    }
}

fn strings(
    v: &mut dyn HeaderVisitor,
    name: &'static str,
    width: usize,
    values: &mut [String],
) -> Result<(), NroFormatError> {
    for (i, value) in values.iter_mut().enumerate() {
        v.string(FieldName::Element(name, i), width, value)?;
    }

    Ok(())
}

fn ints(
    v: &mut dyn HeaderVisitor,
    name: &'static str,
    values: &mut [i32],
) -> Result<(), NroFormatError> {
    for (i, value) in values.iter_mut().enumerate() {
        v.int(FieldName::Element(name, i), value)?;
    }

    Ok(())
}

fn doubles(
    v: &mut dyn HeaderVisitor,
    name: &'static str,
    values: &mut [f64],
) -> Result<(), NroFormatError> {
    for (i, value) in values.iter_mut().enumerate() {
        v.double(FieldName::Element(name, i), value)?;
    }

    Ok(())
}

fn grid(
    v: &mut dyn HeaderVisitor,
    name: &'static str,
    values: &mut Array2<f64>,
) -> Result<(), NroFormatError> {
    for ((i, j), value) in values.indexed_iter_mut() {
        v.double(FieldName::Element2(name, i, j), value)?;
    }

    Ok(())
}

/// The contents of a dataset header.
///
/// Field names follow the keywords of the format definition, lowercased.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    /// The size of each per-array field.
    array_max: usize,

    pub lofil: String,
    pub ver: String,
    pub group: String,
    pub proj: String,
    pub sched: String,
    pub obsvr: String,
    /// Observation start time.
    pub lostm: String,
    /// Observation end time.
    pub loetm: String,
    /// The number of arrays actually in use.
    pub arynm: i32,
    /// The number of scans, not counting the calibration scan.
    pub nscan: i32,
    pub title: String,
    pub obj: String,
    pub epoch: String,
    pub ra0: f64,
    pub dec0: f64,
    pub glng0: f64,
    pub glat0: f64,
    pub ncalb: i32,
    pub scncd: i32,
    pub scmod: String,
    pub urvel: f64,
    pub vref: String,
    pub vdef: String,
    pub swmod: String,
    pub frqsw: f64,
    pub dbeam: f64,
    pub mltof: f64,
    pub cmtq: f64,
    pub cmte: f64,
    pub cmtsom: f64,
    pub cmtnode: f64,
    pub cmti: f64,
    pub cmttm: String,
    pub sbdx: f64,
    pub sbdy: f64,
    pub sbdz1: f64,
    pub sbdz2: f64,
    pub dazp: f64,
    pub delp: f64,
    /// How many raw channels are averaged into each output channel.
    pub chbind: i32,
    /// The number of output channels.
    pub numch: i32,
    /// The first raw channel used when binding.
    pub chmin: i32,
    pub chmax: i32,
    pub alctm: f64,
    /// Integration time, in seconds.
    pub iptim: f64,
    pub pa: f64,

    /// Receiver names.
    pub rx: Vec<String>,
    pub hpbw: Vec<f64>,
    pub effa: Vec<f64>,
    pub effb: Vec<f64>,
    pub effl: Vec<f64>,
    pub efss: Vec<f64>,
    pub gain: Vec<f64>,
    pub horn: Vec<String>,
    pub poltp: Vec<String>,
    pub poldr: Vec<f64>,
    pub polan: Vec<f64>,
    pub dfrq: Vec<f64>,
    pub sidbd: Vec<String>,
    pub refn: Vec<i32>,
    pub ipint: Vec<i32>,
    pub multn: Vec<i32>,
    /// Per-array scale factors applied to unpacked samples.
    pub mltscf: Vec<f64>,
    pub lagwind: Vec<String>,
    pub bebw: Vec<f64>,
    pub beres: Vec<f64>,
    pub chwid: Vec<f64>,
    pub arry: Vec<i32>,
    pub nfcal: Vec<i32>,
    pub f0cal: Vec<f64>,
    pub fqcal: Array2<f64>,
    pub chcal: Array2<f64>,
    pub cwcal: Array2<f64>,

    /// The length of each data record, scan header included.
    pub scnlen: i32,
    pub sbind: i32,
    /// Bits per packed sample.
    pub ibit: i32,
    pub site: String,
}

impl Header {
    /// Create an empty header whose per-array fields have *array_max*
    /// entries.
    pub fn new(array_max: usize) -> Self {
        let texts = || vec![String::new(); array_max];
        let coeffs = || Array2::zeros((array_max, N_CAL_COEFFS));

        Header {
            array_max,
            lofil: String::new(),
            ver: String::new(),
            group: String::new(),
            proj: String::new(),
            sched: String::new(),
            obsvr: String::new(),
            lostm: String::new(),
            loetm: String::new(),
            arynm: 0,
            nscan: 0,
            title: String::new(),
            obj: String::new(),
            epoch: String::new(),
            ra0: 0.,
            dec0: 0.,
            glng0: 0.,
            glat0: 0.,
            ncalb: 0,
            scncd: 0,
            scmod: String::new(),
            urvel: 0.,
            vref: String::new(),
            vdef: String::new(),
            swmod: String::new(),
            frqsw: 0.,
            dbeam: 0.,
            mltof: 0.,
            cmtq: 0.,
            cmte: 0.,
            cmtsom: 0.,
            cmtnode: 0.,
            cmti: 0.,
            cmttm: String::new(),
            sbdx: 0.,
            sbdy: 0.,
            sbdz1: 0.,
            sbdz2: 0.,
            dazp: 0.,
            delp: 0.,
            chbind: 0,
            numch: 0,
            chmin: 0,
            chmax: 0,
            alctm: 0.,
            iptim: 0.,
            pa: 0.,
            rx: texts(),
            hpbw: vec![0.; array_max],
            effa: vec![0.; array_max],
            effb: vec![0.; array_max],
            effl: vec![0.; array_max],
            efss: vec![0.; array_max],
            gain: vec![0.; array_max],
            horn: texts(),
            poltp: texts(),
            poldr: vec![0.; array_max],
            polan: vec![0.; array_max],
            dfrq: vec![0.; array_max],
            sidbd: texts(),
            refn: vec![0; array_max],
            ipint: vec![0; array_max],
            multn: vec![0; array_max],
            mltscf: vec![0.; array_max],
            lagwind: texts(),
            bebw: vec![0.; array_max],
            beres: vec![0.; array_max],
            chwid: vec![0.; array_max],
            arry: vec![0; array_max],
            nfcal: vec![0; array_max],
            f0cal: vec![0.; array_max],
            fqcal: coeffs(),
            chcal: coeffs(),
            cwcal: coeffs(),
            scnlen: 0,
            sbind: 0,
            ibit: 0,
            site: String::new(),
        }
    }

    /// The number of entries in each per-array field.
    pub fn array_max(&self) -> usize {
        self.array_max
    }

    /// The size of the header on disk, in bytes, for a given array count.
    pub fn size_on_disk(array_max: usize) -> usize {
        // 656 bytes of leading scalars, 168 bytes of 1-D array entries and
        // 240 bytes of calibration coefficients per array, 20 trailing bytes.
        676 + 408 * array_max
    }

    /// Walk every field in on-disk order, stopping at the first failure.
    pub fn visit(&mut self, v: &mut dyn HeaderVisitor) -> Result<(), NroFormatError> {
        use self::FieldName::Scalar as S;

        v.string(S("LOFIL"), 8, &mut self.lofil)?;
        v.string(S("VER"), 8, &mut self.ver)?;
        v.string(S("GROUP"), 16, &mut self.group)?;
        v.string(S("PROJ"), 16, &mut self.proj)?;
        v.string(S("SCHED"), 24, &mut self.sched)?;
        v.string(S("OBSVR"), 40, &mut self.obsvr)?;
        v.string(S("LOSTM"), 16, &mut self.lostm)?;
        v.string(S("LOETM"), 16, &mut self.loetm)?;
        v.int(S("ARYNM"), &mut self.arynm)?;
        v.int(S("NSCAN"), &mut self.nscan)?;
        v.string(S("TITLE"), 120, &mut self.title)?;
        v.string(S("OBJ"), 16, &mut self.obj)?;
        v.string(S("EPOCH"), 8, &mut self.epoch)?;
        v.double(S("RA0"), &mut self.ra0)?;
        v.double(S("DEC0"), &mut self.dec0)?;
        v.double(S("GLNG0"), &mut self.glng0)?;
        v.double(S("GLAT0"), &mut self.glat0)?;
        v.int(S("NCALB"), &mut self.ncalb)?;
        v.int(S("SCNCD"), &mut self.scncd)?;
        v.string(S("SCMOD"), 120, &mut self.scmod)?;
        v.double(S("URVEL"), &mut self.urvel)?;
        v.string(S("VREF"), 4, &mut self.vref)?;
        v.string(S("VDEF"), 4, &mut self.vdef)?;
        v.string(S("SWMOD"), 8, &mut self.swmod)?;
        v.double(S("FRQSW"), &mut self.frqsw)?;
        v.double(S("DBEAM"), &mut self.dbeam)?;
        v.double(S("MLTOF"), &mut self.mltof)?;
        v.double(S("CMTQ"), &mut self.cmtq)?;
        v.double(S("CMTE"), &mut self.cmte)?;
        v.double(S("CMTSOM"), &mut self.cmtsom)?;
        v.double(S("CMTNODE"), &mut self.cmtnode)?;
        v.double(S("CMTI"), &mut self.cmti)?;
        v.string(S("CMTTM"), 24, &mut self.cmttm)?;
        v.double(S("SBDX"), &mut self.sbdx)?;
        v.double(S("SBDY"), &mut self.sbdy)?;
        v.double(S("SBDZ1"), &mut self.sbdz1)?;
        v.double(S("SBDZ2"), &mut self.sbdz2)?;
        v.double(S("DAZP"), &mut self.dazp)?;
        v.double(S("DELP"), &mut self.delp)?;
        v.int(S("CHBIND"), &mut self.chbind)?;
        v.int(S("NUMCH"), &mut self.numch)?;
        v.int(S("CHMIN"), &mut self.chmin)?;
        v.int(S("CHMAX"), &mut self.chmax)?;
        v.double(S("ALCTM"), &mut self.alctm)?;
        v.double(S("IPTIM"), &mut self.iptim)?;
        v.double(S("PA"), &mut self.pa)?;

        strings(v, "RX", 16, &mut self.rx)?;
        doubles(v, "HPBW", &mut self.hpbw)?;
        doubles(v, "EFFA", &mut self.effa)?;
        doubles(v, "EFFB", &mut self.effb)?;
        doubles(v, "EFFL", &mut self.effl)?;
        doubles(v, "EFSS", &mut self.efss)?;
        doubles(v, "GAIN", &mut self.gain)?;
        strings(v, "HORN", 4, &mut self.horn)?;
        strings(v, "POLTP", 4, &mut self.poltp)?;
        doubles(v, "POLDR", &mut self.poldr)?;
        doubles(v, "POLAN", &mut self.polan)?;
        doubles(v, "DFRQ", &mut self.dfrq)?;
        strings(v, "SIDBD", 4, &mut self.sidbd)?;
        ints(v, "REFN", &mut self.refn)?;
        ints(v, "IPINT", &mut self.ipint)?;
        ints(v, "MULTN", &mut self.multn)?;
        doubles(v, "MLTSCF", &mut self.mltscf)?;
        strings(v, "LAGWIND", 8, &mut self.lagwind)?;
        doubles(v, "BEBW", &mut self.bebw)?;
        doubles(v, "BERES", &mut self.beres)?;
        doubles(v, "CHWID", &mut self.chwid)?;
        ints(v, "ARRY", &mut self.arry)?;
        ints(v, "NFCAL", &mut self.nfcal)?;
        doubles(v, "F0CAL", &mut self.f0cal)?;
        grid(v, "FQCAL", &mut self.fqcal)?;
        grid(v, "CHCAL", &mut self.chcal)?;
        grid(v, "CWCAL", &mut self.cwcal)?;

        v.int(S("SCNLEN"), &mut self.scnlen)?;
        v.int(S("SBIND"), &mut self.sbind)?;
        v.int(S("IBIT"), &mut self.ibit)?;
        v.string(S("SITE"), 8, &mut self.site)?;
        Ok(())
    }

    /// Read every field from *stream*, which must be positioned at the start
    /// of the header. The first failure aborts the read and names the field
    /// concerned; the header may be partially filled in that case.
    pub fn read<R: Read>(&mut self, stream: &mut EndianReader<R>) -> Result<(), NroFormatError> {
        self.visit(&mut HeaderReader::new(stream))
    }

    /// Write every field to *stream*.
    pub fn write<W: Write>(&self, stream: &mut EndianWriter<W>) -> Result<(), NroFormatError> {
        let mut copy = self.clone();
        copy.visit(&mut HeaderWriter::new(stream))
    }

    /// Work out the polarization count of the observation: 2 if some
    /// receiver looks like a horizontal feed and some other like a
    /// vertical one, else 1.
    pub fn polarization_count(&self) -> usize {
        let horizontal = self.rx.iter().any(|r| {
            let r = r.trim();
            r.ends_with('H') || r.ends_with("H20ch1")
        });
        let vertical = self
            .rx
            .iter()
            .any(|r| crate::polarization_number(r) == 1);

        if horizontal && vertical {
            2
        } else {
            1
        }
    }
}
