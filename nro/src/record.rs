// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

//! Data records: a fixed scan header followed by packed samples.

use rubbl_core::errors::Result;
use rubbl_core::io::{EndianReader, EndianWriter};
use std::io::{Read, Write};

/// The size of the scan header that begins every data record, in bytes.
pub const SCAN_HEADER_SIZE: usize = 424;

const RESERVED_SIZE: usize = 136;

/// One data record of a dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanRecord {
    pub lsfil: String,
    /// Scan number.
    pub iscan: i32,
    /// Integration start time, as `YYYYMMDDHHMMSS.sss` text.
    pub lavst: String,
    pub scantp: String,
    pub dscx: f64,
    pub dscy: f64,
    pub scx: f64,
    pub scy: f64,
    pub paz: f64,
    pub pel: f64,
    pub raz: f64,
    pub rel: f64,
    pub xx: f64,
    pub yy: f64,
    /// The name of the array that produced this record, e.g. `A3`.
    pub arryt: String,
    pub temp: f32,
    pub patm: f32,
    pub ph2o: f32,
    pub vwind: f32,
    /// Wind direction. Degrees on disk; radians once loaded by a dataset.
    pub dwind: f32,
    pub tau: f32,
    pub tsys: f32,
    pub batm: f32,
    pub line: i32,
    pub idmy1: [i32; 4],
    pub vrad: f64,
    pub freq0: f64,
    pub fqtrk: f64,
    pub fqif1: f64,
    pub alcv: f64,
    pub offcd: [[f64; 2]; 2],
    pub idmy0: i32,
    pub idmy2: i32,
    pub dpfrq: f64,
    /// Scale factor applied to the packed samples.
    pub sfctr: f64,
    /// Offset added to the scaled samples.
    pub adoff: f64,

    /// The packed samples.
    pub data: Vec<u8>,
}

impl ScanRecord {
    /// Create a record with a zeroed sample buffer of *data_len* bytes.
    pub fn new(data_len: usize) -> Self {
        ScanRecord {
            data: vec![0; data_len],
            ..Default::default()
        }
    }

    /// Fill in this record from *stream*. The sample buffer is reused, and
    /// exactly as many bytes are read as it holds.
    pub fn read_from<R: Read>(&mut self, stream: &mut EndianReader<R>) -> Result<()> {
        self.lsfil = stream.read_fixed_string(4)?;
        self.iscan = stream.read_i32()?;
        self.lavst = stream.read_fixed_string(24)?;
        self.scantp = stream.read_fixed_string(16)?;
        self.dscx = stream.read_f64()?;
        self.dscy = stream.read_f64()?;
        self.scx = stream.read_f64()?;
        self.scy = stream.read_f64()?;
        self.paz = stream.read_f64()?;
        self.pel = stream.read_f64()?;
        self.raz = stream.read_f64()?;
        self.rel = stream.read_f64()?;
        self.xx = stream.read_f64()?;
        self.yy = stream.read_f64()?;
        self.arryt = stream.read_fixed_string(4)?;
        self.temp = stream.read_f32()?;
        self.patm = stream.read_f32()?;
        self.ph2o = stream.read_f32()?;
        self.vwind = stream.read_f32()?;
        self.dwind = stream.read_f32()?;
        self.tau = stream.read_f32()?;
        self.tsys = stream.read_f32()?;
        self.batm = stream.read_f32()?;
        self.line = stream.read_i32()?;

        for v in &mut self.idmy1 {
            *v = stream.read_i32()?;
        }

        self.vrad = stream.read_f64()?;
        self.freq0 = stream.read_f64()?;
        self.fqtrk = stream.read_f64()?;
        self.fqif1 = stream.read_f64()?;
        self.alcv = stream.read_f64()?;

        for row in &mut self.offcd {
            for v in row {
                *v = stream.read_f64()?;
            }
        }

        self.idmy0 = stream.read_i32()?;
        self.idmy2 = stream.read_i32()?;
        self.dpfrq = stream.read_f64()?;
        stream.skip(RESERVED_SIZE)?;
        self.sfctr = stream.read_f64()?;
        self.adoff = stream.read_f64()?;
        stream.fill(&mut self.data)?;
        Ok(())
    }

    /// Write this record to *stream*.
    pub fn write_to<W: Write>(&self, stream: &mut EndianWriter<W>) -> Result<()> {
        stream.write_fixed_string(&self.lsfil, 4)?;
        stream.write_i32(self.iscan)?;
        stream.write_fixed_string(&self.lavst, 24)?;
        stream.write_fixed_string(&self.scantp, 16)?;

        for v in &[
            self.dscx, self.dscy, self.scx, self.scy, self.paz, self.pel, self.raz, self.rel,
            self.xx, self.yy,
        ] {
            stream.write_f64(*v)?;
        }

        stream.write_fixed_string(&self.arryt, 4)?;

        for v in &[
            self.temp, self.patm, self.ph2o, self.vwind, self.dwind, self.tau, self.tsys,
            self.batm,
        ] {
            stream.write_f32(*v)?;
        }

        stream.write_i32(self.line)?;

        for v in &self.idmy1 {
            stream.write_i32(*v)?;
        }

        for v in &[self.vrad, self.freq0, self.fqtrk, self.fqif1, self.alcv] {
            stream.write_f64(*v)?;
        }

        for row in &self.offcd {
            for v in row {
                stream.write_f64(*v)?;
            }
        }

        stream.write_i32(self.idmy0)?;
        stream.write_i32(self.idmy2)?;
        stream.write_f64(self.dpfrq)?;
        stream.write_bytes(&[0; RESERVED_SIZE])?;
        stream.write_f64(self.sfctr)?;
        stream.write_f64(self.adoff)?;
        stream.write_bytes(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rubbl_core::errors::CodecError;
    use rubbl_core::io::Endianness;
    use std::io::Cursor;

    #[test]
    fn layout() {
        let mut rec = ScanRecord::new(6);
        rec.arryt = "A2".to_owned();
        rec.dwind = 90.;
        rec.offcd[1][0] = -3.5;
        rec.sfctr = 2.;
        rec.adoff = 4.;
        rec.data = vec![1, 2, 3, 4, 5, 6];

        for order in &[Endianness::Big, Endianness::Little] {
            let mut w = EndianWriter::new(Vec::new(), *order);
            rec.write_to(&mut w).unwrap();
            let buf = w.into_inner();
            assert_eq!(buf.len(), SCAN_HEADER_SIZE + 6);
            assert_eq!(&buf[128..130], b"A2");

            let mut r = EndianReader::new(Cursor::new(buf), *order);
            let mut back = ScanRecord::new(6);
            back.read_from(&mut r).unwrap();
            assert_eq!(back, rec);
        }
    }

    #[test]
    fn short_payload() {
        let mut w = EndianWriter::new(Vec::new(), Endianness::Little);
        ScanRecord::new(4).write_to(&mut w).unwrap();

        let mut r = EndianReader::new(Cursor::new(w.into_inner()), Endianness::Little);
        let mut rec = ScanRecord::new(8);
        assert!(matches!(
            rec.read_from(&mut r),
            Err(CodecError::TruncatedRead {
                needed: 8,
                available: 4,
                ..
            })
        ));
    }
}
