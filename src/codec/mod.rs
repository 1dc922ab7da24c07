//! Versioned binary codec.
//!
//! Every persisted or transmitted type has a fixed `UNIQUE_ID` and a current
//! `VERSION`. An encoded value is a header `(unique_id: i32, version: u32)`
//! followed by the type's fields in declaration order. Each version only
//! appends fields, so the field list of an older version is a strict prefix
//! of a newer one and a reader branches on the header version to decide
//! which fields are present.
//!
//! Data written by a newer version than the reader knows is rejected.

mod fields;

pub use fields::{FieldReader, FieldWriter};

use crate::error::CodecError;

/// A type with a stable identity and a version-gated field layout.
pub trait Versioned: Sized {
    const UNIQUE_ID: i32;
    const VERSION: u32;

    /// Writes the fields present at `version`.
    fn write_fields(&self, writer: &mut FieldWriter, version: u32) -> Result<(), CodecError>;

    /// Reads the fields written at `version`, defaulting newer ones.
    fn read_fields(reader: &mut FieldReader<'_>, version: u32) -> Result<Self, CodecError>;
}

/// Header preceding every encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub unique_id: i32,
    pub version: u32,
}

/// Encodes at the type's current version.
pub fn encode<T: Versioned>(value: &T) -> Result<Vec<u8>, CodecError> {
    encode_version(value, T::VERSION)
}

/// Encodes at an older version for down-level readers.
pub fn encode_version<T: Versioned>(value: &T, version: u32) -> Result<Vec<u8>, CodecError> {
    if version == 0 || version > T::VERSION {
        return Err(CodecError::UnsupportedVersion {
            unique_id: T::UNIQUE_ID,
            found: version,
            supported: T::VERSION,
        });
    }
    let mut writer = FieldWriter::new();
    writer.write(&T::UNIQUE_ID)?;
    writer.write(&version)?;
    value.write_fields(&mut writer, version)?;
    Ok(writer.into_bytes())
}

/// Reads the header without decoding the body.
pub fn peek_header(bytes: &[u8]) -> Result<Header, CodecError> {
    let mut reader = FieldReader::new(bytes);
    read_header(&mut reader)
}

fn read_header(reader: &mut FieldReader<'_>) -> Result<Header, CodecError> {
    let unique_id: i32 = reader.read().map_err(|_| CodecError::BadHeader)?;
    let version: u32 = reader.read().map_err(|_| CodecError::BadHeader)?;
    if version == 0 {
        return Err(CodecError::BadHeader);
    }
    Ok(Header { unique_id, version })
}

/// Decodes a value, accepting any version up to the type's current one.
pub fn decode<T: Versioned>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut reader = FieldReader::new(bytes);
    let header = read_header(&mut reader)?;
    check_header::<T>(header)?;
    T::read_fields(&mut reader, header.version)
}

/// Decodes the body of a value whose header was already consumed.
pub fn decode_body<T: Versioned>(
    reader: &mut FieldReader<'_>,
    header: Header,
) -> Result<T, CodecError> {
    check_header::<T>(header)?;
    T::read_fields(reader, header.version)
}

/// Splits bytes into their header and a reader positioned at the body.
pub fn open(bytes: &[u8]) -> Result<(Header, FieldReader<'_>), CodecError> {
    let mut reader = FieldReader::new(bytes);
    let header = read_header(&mut reader)?;
    Ok((header, reader))
}

fn check_header<T: Versioned>(header: Header) -> Result<(), CodecError> {
    if header.unique_id != T::UNIQUE_ID {
        return Err(CodecError::UniqueIdMismatch {
            expected: T::UNIQUE_ID,
            found: header.unique_id,
        });
    }
    if header.version > T::VERSION {
        return Err(CodecError::UnsupportedVersion {
            unique_id: T::UNIQUE_ID,
            found: header.version,
            supported: T::VERSION,
        });
    }
    Ok(())
}
