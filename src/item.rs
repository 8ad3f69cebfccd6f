//! Item value codec: raw bits ↔ uncalibrated ↔ calibrated value for one
//! typed item (parameter, argument, or member).

use crate::bits::BitBuffer;
use crate::calibrate::Calibrator;
use crate::definition::TypeDef;
use crate::raw::RawEncoding;
use crate::value::{Value, ValueLookup};
use crate::{Error, Result, Warnings};

/// The raw/uncalibrated/calibrated triple for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Bit-exact on-wire field.
    pub bits: BitBuffer,
    pub uncalibrated: Value,
    pub calibrated: Value,
}

/// Converts one typed item between raw bits and engineering values.
///
/// Construction validates the type up front: a type without encoding
/// information, or with an unsupported encoding width, fails here rather
/// than on first use.
pub struct ItemCodec<'a> {
    name: String,
    type_def: &'a TypeDef,
    encoding: RawEncoding,
}

impl<'a> ItemCodec<'a> {
    /// # Errors
    /// [`Error::NoEncoding`] when the type carries no raw encoding;
    /// [`Error::Unsupported`]/[`Error::UnsupportedWidth`] for encoding
    /// widths the codec cannot handle.
    pub fn new(name: impl Into<String>, type_def: &'a TypeDef) -> Result<Self> {
        let Some(encoding) = type_def.encoding else {
            return Err(Error::NoEncoding(type_def.name.clone()));
        };
        encoding.validate(&type_def.name)?;
        Ok(ItemCodec {
            name: name.into(),
            type_def,
            encoding,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bit_width(&self) -> u32 {
        self.encoding.bit_width()
    }

    /// The calibrator in effect: the first context calibrator whose guard
    /// holds against `ctx`, else the type's default calibrator.
    fn calibrator(&self, ctx: &dyn ValueLookup) -> Option<&Calibrator> {
        self.type_def
            .context_calibrators
            .iter()
            .find(|c| c.applies(ctx))
            .map(|c| &c.calibrator)
            .or(self.type_def.calibrator.as_ref())
    }

    /// Decode the field at `offset` of `buf` into its value triple.
    ///
    /// Calibration failures fall back to the uncalibrated value and are
    /// recorded in `warnings`; running past the end of `buf` is fatal.
    ///
    /// # Errors
    /// [`Error::NotEnoughBits`] if the field extends past the end of `buf`.
    pub fn decode(
        &self,
        buf: &BitBuffer,
        offset: usize,
        ctx: &dyn ValueLookup,
        warnings: &mut Warnings,
    ) -> Result<Decoded> {
        let uncalibrated = self.encoding.decode(buf, offset)?;
        let calibrated = match self.calibrator(ctx) {
            Some(cal) => cal
                .calibrate(&uncalibrated, &self.name, warnings)
                .unwrap_or_else(|| uncalibrated.clone()),
            None => uncalibrated.clone(),
        };
        self.check_range(&uncalibrated, &calibrated, warnings);
        let bits = buf.slice(offset, self.bit_width() as usize)?;
        Ok(Decoded {
            bits,
            uncalibrated,
            calibrated,
        })
    }

    /// Encode `value` into raw bits. `calibrated` says whether `value` is
    /// an engineering value to be run through the inverse calibration or
    /// an already-uncalibrated value.
    ///
    /// Never fails: conversion problems warn and leave the field
    /// zero-filled, so callers must check `warnings`, not a result.
    pub fn encode(
        &self,
        value: &Value,
        calibrated: bool,
        ctx: &dyn ValueLookup,
        warnings: &mut Warnings,
    ) -> Decoded {
        let (uncalibrated, calibrated_value) = match self.calibrator(ctx) {
            Some(cal) if calibrated => {
                let uncal = cal
                    .uncalibrate(
                        value,
                        &self.name,
                        self.type_def.valid_range.as_ref(),
                        warnings,
                    )
                    .unwrap_or_else(|| value.clone());
                (uncal, value.clone())
            }
            _ => (value.clone(), value.clone()),
        };
        self.check_range(&uncalibrated, &calibrated_value, warnings);
        let bits = self.encoding.encode(&uncalibrated, &self.name, warnings);
        Decoded {
            bits,
            uncalibrated,
            calibrated: calibrated_value,
        }
    }

    fn check_range(&self, uncalibrated: &Value, calibrated: &Value, warnings: &mut Warnings) {
        if let Some(range) = &self.type_def.valid_range {
            let checked = if range.calibrated {
                calibrated
            } else {
                uncalibrated
            };
            range.check(&self.name, checked, warnings);
        }
    }

    /// Hexadecimal rendering of a field, for diagnostics and logging.
    #[must_use]
    pub fn bits_to_hex(bits: &BitBuffer) -> String {
        bits.to_hex()
    }

    /// Binary digit string rendering of a field.
    #[must_use]
    pub fn bits_to_binary(bits: &BitBuffer) -> String {
        bits.to_binary()
    }
}
