// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
The MIME framing of binary ASDM tables.

A binary table is stored as a two-part `Multipart/Related` message. The first
part is a small XML document that describes the table; the second is the
binary payload. The delimiters are fixed strings rather than anything a
general MIME parser would need to discover, so this module only deals in
those exact strings.

*/

use crate::{Result, SdmError};

/// The multipart boundary string.
pub const BOUNDARY: &str = "MIME_boundary";

/// The delimiter that introduces the XML part, after its part headers.
pub const XML_PART_MARKER: &str = "Content-ID: <header.xml>\n\n";

/// The same, as written by tools that use CRLF line endings.
pub const XML_PART_MARKER_CRLF: &str = "Content-ID: <header.xml>\r\n\r\n";

/// The complete set of headers introducing the binary part.
pub const BINARY_PART_MARKER: &str =
    "--MIME_boundary\nContent-Type: binary/octet-stream\nContent-ID: <content.bin>\n\n";

/// The same, with CRLF line endings.
pub const BINARY_PART_MARKER_CRLF: &str =
    "--MIME_boundary\r\nContent-Type: binary/octet-stream\r\nContent-ID: <content.bin>\r\n\r\n";

/// The closing delimiter written after the binary part.
pub const TRAILER: &str = "\n--MIME_boundary--\n";

/// Assemble a complete message from the XML description and the binary
/// payload of a table whose entity ID is *entity_uid*.
pub fn compose(entity_uid: &str, xml_part: &str, binary: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(xml_part.len() + binary.len() + 512);

    let head = format!(
        "MIME-Version: 1.0\n\
         Content-Type: Multipart/Related; boundary='{BOUNDARY}'; type='text/xml'; start= '<header.xml>'\n\
         Content-Description: Correlator\n\
         alma-uid:{entity_uid}\n\
         \n\
         --{BOUNDARY}\n\
         Content-Type: text/xml; charset='ISO-8859-1'\n\
         Content-Transfer-Encoding: 8bit\n\
         {XML_PART_MARKER}"
    );

    msg.extend_from_slice(head.as_bytes());
    msg.extend_from_slice(xml_part.as_bytes());
    msg.push(b'\n');
    msg.extend_from_slice(BINARY_PART_MARKER.as_bytes());
    msg.extend_from_slice(binary);
    msg.extend_from_slice(TRAILER.as_bytes());
    msg
}

/// The two parts of a message.
#[derive(Clone, Copy, Debug)]
pub struct MimeParts<'a> {
    /// The XML description. It must be valid UTF-8, which in practice it is,
    /// being ASCII.
    pub xml: &'a str,

    /// The binary payload, with any closing delimiter removed.
    pub binary: &'a [u8],
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Split a message into its XML and binary parts.
pub fn split(msg: &[u8]) -> Result<MimeParts<'_>> {
    let xml_start = find(msg, XML_PART_MARKER.as_bytes())
        .map(|i| i + XML_PART_MARKER.len())
        .or_else(|| {
            find(msg, XML_PART_MARKER_CRLF.as_bytes()).map(|i| i + XML_PART_MARKER_CRLF.len())
        })
        .ok_or_else(|| {
            SdmError::MalformedMime("cannot find the start of the XML part".to_owned())
        })?;

    let rest = &msg[xml_start..];
    let (xml_len, marker_len) = find(rest, BINARY_PART_MARKER.as_bytes())
        .map(|i| (i, BINARY_PART_MARKER.len()))
        .or_else(|| {
            find(rest, BINARY_PART_MARKER_CRLF.as_bytes())
                .map(|i| (i, BINARY_PART_MARKER_CRLF.len()))
        })
        .ok_or_else(|| {
            SdmError::MalformedMime("cannot find the start of the binary part".to_owned())
        })?;

    let xml = std::str::from_utf8(&rest[..xml_len])
        .map_err(|e| SdmError::MalformedMime(format!("the XML part is not text: {}", e)))?;

    let mut binary = &rest[xml_len + marker_len..];

    if let Some(stripped) = binary.strip_suffix(TRAILER.as_bytes()) {
        binary = stripped;
    } else if let Some(stripped) = binary.strip_suffix(b"\r\n--MIME_boundary--\r\n") {
        binary = stripped;
    }

    Ok(MimeParts { xml, binary })
}
