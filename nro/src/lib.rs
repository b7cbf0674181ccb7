// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
Access to the fixed-layout binary datasets written by the Nobeyama 45 m
telescope and by ASTE.

A dataset is a single file: one large header at a fixed layout, followed by a
run of equally-sized data records. The file carries no explicit byte-order
mark. Instead the order is inferred from the array count stored at a known
offset, which is always a small positive number when read in the right
order; see [`detect_endianness`].

*/

use byteorder::{ByteOrder, NativeEndian};
use rubbl_core::errors::CodecError;
use rubbl_core::io::Endianness;
use std::io::{self, Read, Seek, SeekFrom};
use thiserror::Error;

pub mod dataset;
pub mod header;
pub mod record;

pub use dataset::NroDataset;
pub use header::Header;
pub use record::ScanRecord;

/// An error arising while reading an NRO dataset.
#[derive(Error, Debug)]
pub enum NroFormatError {
    /// A header field could not be read or written.
    #[error("error while processing header field {field}")]
    Field {
        /// The field, with subscripts, e.g. `FQCAL[3][7]`.
        field: String,
        #[source]
        source: CodecError,
    },

    /// A data record could not be read.
    #[error("error while reading data record {index}")]
    Record {
        index: usize,
        #[source]
        source: CodecError,
    },

    /// The header describes an impossible record layout.
    #[error("invalid dataset layout: {0}")]
    InvalidLayout(String),

    /// Records were requested before the header was read.
    #[error("the dataset header has not been read yet")]
    NotOpened,

    #[error("data record {index} is out of range; the dataset has {count} records")]
    RecordOutOfRange { index: usize, count: usize },

    #[error("unsupported sample quantization of {0} bits")]
    UnsupportedBitDepth(i32),

    #[error("`{0}` is not a valid array name")]
    BadArrayName(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The telescopes whose datasets we understand. They differ only in the
/// number of array slots in the header.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NroVariant {
    /// The Nobeyama 45 m telescope.
    Nro45,

    /// The Atacama Submillimeter Telescope Experiment.
    Aste,
}

impl NroVariant {
    /// The number of array slots in the header (`ARYMAX`).
    pub fn array_max(self) -> usize {
        match self {
            NroVariant::Nro45 => 35,
            NroVariant::Aste => 20,
        }
    }

    /// The size of the fixed header at the start of each data record.
    pub fn scan_header_size(self) -> usize {
        record::SCAN_HEADER_SIZE
    }

    /// The size of the dataset header, in bytes.
    pub fn header_size(self) -> usize {
        Header::size_on_disk(self.array_max())
    }
}

/// The byte offset of the `ARYNM` header field.
pub const ARYNM_OFFSET: u64 = 144;

/// Quantities derived from the header once it has been read.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DerivedLayout {
    /// The number of scans, including the calibration scan.
    pub scan_count: usize,

    /// The number of data records: one per scan per array.
    pub row_count: usize,

    /// The length of each data record in bytes, scan header included.
    pub scan_length: usize,

    /// The length of the packed samples of each data record, in bytes.
    pub data_record_length: usize,

    /// The number of samples in each data record, before channel binding.
    pub max_channels: usize,
}

impl DerivedLayout {
    /// Work out the record layout from the raw header values.
    pub fn compute(
        nscan: i32,
        arynm: i32,
        scnlen: i32,
        ibit: i32,
        scan_header_size: usize,
    ) -> Result<Self, NroFormatError> {
        if nscan < 0 {
            return Err(NroFormatError::InvalidLayout(format!(
                "negative scan count {}",
                nscan
            )));
        }

        if arynm <= 0 {
            return Err(NroFormatError::InvalidLayout(format!(
                "non-positive array count {}",
                arynm
            )));
        }

        if ibit <= 0 {
            return Err(NroFormatError::InvalidLayout(format!(
                "non-positive sample width {} bits",
                ibit
            )));
        }

        if scnlen <= 0 || scnlen as usize <= scan_header_size {
            return Err(NroFormatError::InvalidLayout(format!(
                "record length {} does not exceed the scan header size {}",
                scnlen, scan_header_size
            )));
        }

        let scan_count = nscan as usize + 1;
        let scan_length = scnlen as usize;
        let data_record_length = scan_length - scan_header_size;

        Ok(DerivedLayout {
            scan_count,
            row_count: scan_count * arynm as usize,
            scan_length,
            data_record_length,
            max_channels: data_record_length * 8 / ibit as usize,
        })
    }
}

/// Work out the byte order of a dataset.
///
/// The `ARYNM` field is read without any swapping. If that yields a value in
/// `1..=ARYMAX`, the file is taken to be in native order, else swapped.
///
/// This is a property of the format and is ambiguous: a swapped file whose
/// byte-reversed array count also lands in `1..=ARYMAX` is taken to be
/// native. No legitimate array count does that, since the smallest such
/// reversal is `0x01000000`, but a corrupt file can.
///
/// The stream is left positioned at the start of the file.
pub fn detect_endianness<R: Read + Seek>(
    reader: &mut R,
    variant: NroVariant,
) -> Result<Endianness, NroFormatError> {
    reader.seek(SeekFrom::Start(ARYNM_OFFSET))?;

    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|e| NroFormatError::Field {
            field: "ARYNM".to_owned(),
            source: e.into(),
        })?;
    reader.seek(SeekFrom::Start(0))?;

    let value = NativeEndian::read_i32(&buf);

    if value > 0 && value as usize <= variant.array_max() {
        Ok(Endianness::native())
    } else {
        Ok(Endianness::native().swapped())
    }
}

/// Turn an array name such as `A3` into a zero-based index.
pub fn array_index(name: &str) -> Result<usize, NroFormatError> {
    let trimmed = name.trim();
    let digits = trimmed.get(1..).unwrap_or("");

    match digits.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(NroFormatError::BadArrayName(name.to_owned())),
    }
}

/// The polarization number of a receiver: 1 for vertical feeds, whose names
/// end in `V`, and for the second H20 channel; 0 otherwise.
pub fn polarization_number(rx: &str) -> u32 {
    let rx = rx.trim();

    if rx.ends_with('V') || rx.ends_with("H20ch2") {
        1
    } else {
        0
    }
}
