//! Sequential field reader over a length-checked buffer.

use primitive_types::U256;
use shared_types::{Signature, SIGNATURE_LEN};

use crate::domain::{Bound, DecodeError, FieldKind, FieldSpec, HEADER_LEN};

pub(crate) struct FieldReader<'a> {
    kind: &'static str,
    data: &'a [u8],
    layout: &'static [FieldSpec],
    pos: usize,
    index: usize,
}

impl<'a> FieldReader<'a> {
    /// `data` must already be exactly `encoded_len(layout)` bytes.
    pub(crate) fn new(kind: &'static str, data: &'a [u8], layout: &'static [FieldSpec]) -> Self {
        Self {
            kind,
            data,
            layout,
            pos: HEADER_LEN,
            index: 0,
        }
    }

    fn malformed(&self, reason: String) -> DecodeError {
        DecodeError::MalformedMessage {
            kind: self.kind,
            reason,
        }
    }

    fn take(&mut self, spec: &FieldSpec) -> Result<&'a [u8], DecodeError> {
        debug_assert_eq!(self.layout.get(self.index), Some(spec), "layout order");
        let data = self.data;
        let end = self.pos + spec.width;
        let slice = data
            .get(self.pos..end)
            .ok_or_else(|| self.malformed(format!("truncated at field {}", spec.name)))?;
        self.pos = end;
        self.index += 1;
        Ok(slice)
    }

    fn check_bound(&self, spec: &FieldSpec, value: u64) -> Result<(), DecodeError> {
        if let FieldKind::Uint(Bound::Max(max)) = spec.kind {
            if value > max {
                return Err(self.malformed(format!(
                    "{} = {} exceeds maximum {}",
                    spec.name, value, max
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn uint8(&mut self, spec: &FieldSpec) -> Result<u8, DecodeError> {
        let value = self.take(spec)?[0];
        self.check_bound(spec, u64::from(value))?;
        Ok(value)
    }

    pub(crate) fn uint64(&mut self, spec: &FieldSpec) -> Result<u64, DecodeError> {
        let slice = self.take(spec)?;
        let bytes: [u8; 8] = slice
            .try_into()
            .map_err(|_| self.malformed(format!("{} is not 8 bytes", spec.name)))?;
        let value = u64::from_be_bytes(bytes);
        self.check_bound(spec, value)?;
        Ok(value)
    }

    pub(crate) fn uint256(&mut self, spec: &FieldSpec) -> Result<U256, DecodeError> {
        Ok(U256::from_big_endian(self.take(spec)?))
    }

    pub(crate) fn array<const N: usize>(&mut self, spec: &FieldSpec) -> Result<[u8; N], DecodeError> {
        let slice = self.take(spec)?;
        slice
            .try_into()
            .map_err(|_| self.malformed(format!("{} is not {} bytes", spec.name, N)))
    }

    pub(crate) fn signature(&mut self, spec: &FieldSpec) -> Result<Signature, DecodeError> {
        self.array::<SIGNATURE_LEN>(spec).map(Signature)
    }

    /// Zero-padded UTF-8; trailing zero bytes are stripped.
    pub(crate) fn text(&mut self, spec: &FieldSpec) -> Result<String, DecodeError> {
        let slice = self.take(spec)?;
        let end = slice.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        String::from_utf8(slice[..end].to_vec())
            .map_err(|_| self.malformed(format!("{} is not valid UTF-8", spec.name)))
    }

    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        debug_assert_eq!(self.index, self.layout.len(), "unread fields");
        if self.pos != self.data.len() {
            return Err(self.malformed(format!(
                "{} trailing bytes",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}
