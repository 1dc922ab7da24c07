//! Sequential field writer and reader.

use std::io::Cursor;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Fixed-width little-endian layout, the same as `bincode::serialize`.
fn layout() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding()
}

/// Appends fields in declaration order.
#[derive(Debug, Default)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CodecError> {
        layout().serialize_into(&mut self.buf, value)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fields back in the order they were written.
#[derive(Debug)]
pub struct FieldReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> FieldReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    /// Decodes the next field. Length prefixes claiming more than the
    /// unread bytes fail before anything is allocated.
    pub fn read<T: DeserializeOwned>(&mut self) -> Result<T, CodecError> {
        let limit = self.remaining() as u64;
        Ok(layout().with_limit(limit).deserialize_from(&mut self.cursor)?)
    }

    /// Reads a field present since `since`, or `default` for older data.
    pub fn read_since<T: DeserializeOwned>(
        &mut self,
        version: u32,
        since: u32,
        default: T,
    ) -> Result<T, CodecError> {
        if version >= since {
            self.read()
        } else {
            Ok(default)
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        (len - self.cursor.position().min(len)) as usize
    }
}
