// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
Reading whole datasets: the header, then data records on demand.

*/

use rubbl_core::io::{EndianReader, Endianness};
use rubbl_core::notify::NotificationBackend;
use rubbl_core::{rn_severe, rn_warning};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::{
    array_index, detect_endianness, polarization_number, DerivedLayout, Header, NroFormatError,
    NroVariant, ScanRecord,
};

/// The only sample quantization we can unpack.
const SUPPORTED_BITS: i32 = 12;

/// An NRO or ASTE dataset.
///
/// Nothing is read until [`Self::fill_header`] is called (which
/// [`Self::open`] does for you). After that the header and the derived
/// layout are fixed, and data records are read one at a time as they are
/// requested. The most recently read record is kept, so repeated requests
/// for the same record are free.
#[derive(Debug)]
pub struct NroDataset<R: Read + Seek> {
    stream: EndianReader<R>,
    variant: NroVariant,
    header: Header,
    layout: Option<DerivedLayout>,
    record: ScanRecord,
    record_index: Option<usize>,
}

impl NroDataset<BufReader<File>> {
    /// Open the dataset stored in the file at *path* and read its header.
    pub fn open_path<P: AsRef<Path>>(
        path: P,
        variant: NroVariant,
        nbe: &mut dyn NotificationBackend,
    ) -> Result<Self, NroFormatError> {
        let f = File::open(path)?;
        Self::open(BufReader::new(f), variant, nbe)
    }
}

impl<R: Read + Seek> NroDataset<R> {
    /// Wrap a stream without reading anything from it.
    pub fn new(inner: R, variant: NroVariant) -> Self {
        NroDataset {
            stream: EndianReader::new(inner, Endianness::native()),
            variant,
            header: Header::new(variant.array_max()),
            layout: None,
            record: ScanRecord::default(),
            record_index: None,
        }
    }

    /// Wrap a stream and read the dataset header from it.
    pub fn open(
        inner: R,
        variant: NroVariant,
        nbe: &mut dyn NotificationBackend,
    ) -> Result<Self, NroFormatError> {
        let mut ds = Self::new(inner, variant);
        ds.fill_header(nbe)?;
        Ok(ds)
    }

    /// Detect the byte order and read the header, if that hasn't been done
    /// already.
    ///
    /// Failures are reported through *nbe*, naming the header field that
    /// could not be read, and returned. A failed read may be retried.
    pub fn fill_header(&mut self, nbe: &mut dyn NotificationBackend) -> Result<(), NroFormatError> {
        if self.layout.is_some() {
            return Ok(());
        }

        let result = self.fill_header_inner();

        if let Err(ref e) = result {
            match e {
                NroFormatError::Field { field, .. } => {
                    rn_severe!(nbe, "error while reading data {} of the dataset header", field)
                }
                other => rn_severe!(nbe, "cannot read the dataset header: {}", other),
            }
        }

        result
    }

    fn fill_header_inner(&mut self) -> Result<(), NroFormatError> {
        let order = detect_endianness(self.stream.get_mut(), self.variant)?;
        self.stream.set_order(order);
        self.stream.reset_offset(0);

        let mut header = Header::new(self.variant.array_max());
        header.read(&mut self.stream)?;

        let layout = DerivedLayout::compute(
            header.nscan,
            header.arynm,
            header.scnlen,
            header.ibit,
            self.variant.scan_header_size(),
        )?;

        self.header = header;
        self.record = ScanRecord::new(layout.data_record_length);
        self.record_index = None;
        self.layout = Some(layout);
        Ok(())
    }

    pub fn variant(&self) -> NroVariant {
        self.variant
    }

    /// Whether the header has been read.
    pub fn is_open(&self) -> bool {
        self.layout.is_some()
    }

    /// The byte order of the dataset. Only meaningful once the header has
    /// been read.
    pub fn byte_order(&self) -> Endianness {
        self.stream.order()
    }

    /// The header. It is blank until [`Self::fill_header`] succeeds.
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn layout(&self) -> Result<DerivedLayout, NroFormatError> {
        self.layout.ok_or(NroFormatError::NotOpened)
    }

    /// The number of data records.
    pub fn row_count(&self) -> Result<usize, NroFormatError> {
        Ok(self.layout()?.row_count)
    }

    /// Read data record *index*.
    ///
    /// The wind direction `dwind` is converted to radians.
    pub fn record(&mut self, index: usize) -> Result<&ScanRecord, NroFormatError> {
        let layout = self.layout()?;

        if index >= layout.row_count {
            return Err(NroFormatError::RecordOutOfRange {
                index,
                count: layout.row_count,
            });
        }

        if self.record_index == Some(index) {
            return Ok(&self.record);
        }

        self.record_index = None;
        let offset = (self.variant.header_size() + layout.scan_length * index) as u64;
        self.stream.get_mut().seek(SeekFrom::Start(offset))?;
        self.stream.reset_offset(offset);

        self.record
            .read_from(&mut self.stream)
            .map_err(|source| NroFormatError::Record { index, source })?;
        self.record.dwind = self.record.dwind.to_radians();
        self.record_index = Some(index);
        Ok(&self.record)
    }

    fn record_array_index(&mut self, index: usize) -> Result<usize, NroFormatError> {
        let arryt = self.record(index)?.arryt.clone();
        let idx = array_index(&arryt)?;

        if idx >= self.header.array_max() {
            return Err(NroFormatError::BadArrayName(arryt));
        }

        Ok(idx)
    }

    /// The polarization number of data record *index*, derived from the
    /// name of the receiver attached to its array.
    pub fn polarization_of(&mut self, index: usize) -> Result<u32, NroFormatError> {
        let idx = self.record_array_index(index)?;
        Ok(polarization_number(&self.header.rx[idx]))
    }

    /// Unpack the spectrum of data record *index*.
    ///
    /// Each packed sample `v` becomes `(v × SFCTR + ADOFF) × MLTSCF`, using
    /// the scale factor of the record's array. If `CHBIND` is not 1, `NUMCH`
    /// output channels are formed by averaging runs of `CHBIND` samples
    /// starting at sample `CHMIN`. A record whose `SFCTR` and `ADOFF` are
    /// both zero holds no data; it yields `NUMCH` zeros and a warning.
    pub fn spectrum(
        &mut self,
        index: usize,
        nbe: &mut dyn NotificationBackend,
    ) -> Result<Vec<f64>, NroFormatError> {
        let layout = self.layout()?;

        if self.header.ibit != SUPPORTED_BITS {
            return Err(NroFormatError::UnsupportedBitDepth(self.header.ibit));
        }

        let numch = self.header.numch.max(0) as usize;
        let idx = self.record_array_index(index)?;
        let rec = &self.record;

        if rec.sfctr == 0. && rec.adoff == 0. {
            rn_warning!(nbe, "zero spectrum for data record {}", index);
            return Ok(vec![0.; numch]);
        }

        let scale = self.header.mltscf[idx];
        let mut spec = Vec::with_capacity(layout.max_channels);
        let mut j = 0;

        for i in 0..layout.max_channels {
            let raw = if i & 1 == 0 {
                (u16::from(rec.data[j]) << 8 | u16::from(rec.data[j + 1])) >> 4
            } else {
                let v = (u16::from(rec.data[j + 1]) << 8 | u16::from(rec.data[j + 2])) & 0xFFF;
                j += 3;
                v
            };

            spec.push((f64::from(raw) * rec.sfctr + rec.adoff) * scale);
        }

        let chbind = self.header.chbind;

        if chbind == 1 {
            return Ok(spec);
        }

        let chmin = self.header.chmin;

        if chbind < 1 || chmin < 0 || chmin as usize + numch * chbind as usize > spec.len() {
            return Err(NroFormatError::InvalidLayout(format!(
                "cannot bind {} channels by {} starting at {} out of {}",
                numch,
                chbind,
                chmin,
                spec.len()
            )));
        }

        let chbind = chbind as usize;
        let start = chmin as usize;

        Ok((0..numch)
            .map(|k| {
                let run = &spec[start + k * chbind..start + (k + 1) * chbind];
                run.iter().sum::<f64>() / chbind as f64
            })
            .collect())
    }
}
