//! Sequential field writer producing the exact declared width.

use primitive_types::U256;
use shared_types::Signature;

use crate::domain::{encoded_len, Bound, CommandId, DecodeError, FieldKind, FieldSpec};

pub(crate) struct FieldWriter {
    buf: Vec<u8>,
    layout: &'static [FieldSpec],
    index: usize,
}

impl FieldWriter {
    pub(crate) fn new(cmd: CommandId, layout: &'static [FieldSpec]) -> Self {
        let mut buf = Vec::with_capacity(encoded_len(layout));
        buf.push(cmd as u8);
        buf.extend_from_slice(&[0u8; 3]);
        Self {
            buf,
            layout,
            index: 0,
        }
    }

    fn advance(&mut self, spec: &FieldSpec) {
        debug_assert_eq!(self.layout.get(self.index), Some(spec), "layout order");
        self.index += 1;
    }

    fn check_bound(spec: &FieldSpec, value: u64) -> Result<(), DecodeError> {
        if let FieldKind::Uint(Bound::Max(max)) = spec.kind {
            if value > max {
                return Err(DecodeError::FieldOutOfRange {
                    field: spec.name,
                    reason: format!("{} exceeds maximum {}", value, max),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn uint8(&mut self, spec: &FieldSpec, value: u8) -> Result<(), DecodeError> {
        Self::check_bound(spec, u64::from(value))?;
        self.advance(spec);
        self.buf.push(value);
        Ok(())
    }

    pub(crate) fn uint64(&mut self, spec: &FieldSpec, value: u64) -> Result<(), DecodeError> {
        Self::check_bound(spec, value)?;
        self.advance(spec);
        self.buf.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub(crate) fn uint256(&mut self, spec: &FieldSpec, value: U256) {
        self.advance(spec);
        let mut out = [0u8; 32];
        value.to_big_endian(&mut out);
        self.buf.extend_from_slice(&out);
    }

    pub(crate) fn bytes(&mut self, spec: &FieldSpec, value: &[u8]) {
        debug_assert_eq!(value.len(), spec.width, "{} width", spec.name);
        self.advance(spec);
        self.buf.extend_from_slice(value);
    }

    pub(crate) fn signature(&mut self, spec: &FieldSpec, value: &Signature) {
        self.bytes(spec, value.as_bytes());
    }

    pub(crate) fn text(&mut self, spec: &FieldSpec, value: &str) -> Result<(), DecodeError> {
        let raw = value.as_bytes();
        if raw.len() > spec.width {
            return Err(DecodeError::FieldOutOfRange {
                field: spec.name,
                reason: format!("{} bytes exceed width {}", raw.len(), spec.width),
            });
        }
        if raw.contains(&0) {
            return Err(DecodeError::FieldOutOfRange {
                field: spec.name,
                reason: "embedded zero byte".into(),
            });
        }
        self.advance(spec);
        self.buf.extend_from_slice(raw);
        self.buf.resize(self.buf.len() + spec.width - raw.len(), 0);
        Ok(())
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        debug_assert_eq!(self.index, self.layout.len(), "unwritten fields");
        debug_assert_eq!(self.buf.len(), encoded_len(self.layout));
        self.buf
    }
}
