//! Raw codec: pure conversion between fixed-width bit fields and
//! uncalibrated values for every supported encoding family.
//!
//! Width validation for a family happens once, when an item codec is
//! constructed, not on every conversion. Encode-side range and format
//! problems are non-fatal: they append a `"<item> <reason>"` warning and
//! the call still returns a best-effort (usually zero-filled) field.

use serde::{Deserialize, Serialize};

use crate::bits::BitBuffer;
use crate::value::Value;
use crate::{Error, Result, Warnings};

/// Raw-encoding descriptor: family plus declared bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawEncoding {
    Unsigned { bits: u32 },
    TwosComplement { bits: u32 },
    OnesComplement { bits: u32 },
    SignMagnitude { bits: u32 },
    /// Width-constrained unsigned; negative values are meaningless here.
    Binary { bits: u32 },
    Ieee754 { bits: u32 },
    Milstd1750 { bits: u32 },
    /// Fixed-length character string encoded as its byte sequence.
    CharString { bits: u32 },
}

impl RawEncoding {
    #[must_use]
    pub fn bit_width(&self) -> u32 {
        match *self {
            RawEncoding::Unsigned { bits }
            | RawEncoding::TwosComplement { bits }
            | RawEncoding::OnesComplement { bits }
            | RawEncoding::SignMagnitude { bits }
            | RawEncoding::Binary { bits }
            | RawEncoding::Ieee754 { bits }
            | RawEncoding::Milstd1750 { bits }
            | RawEncoding::CharString { bits } => bits,
        }
    }

    /// Constructor-time width validation.
    ///
    /// # Errors
    /// [`Error::Unsupported`] for declared-but-unimplemented widths
    /// (IEEE-754 128 bit), [`Error::UnsupportedWidth`] for widths that
    /// match no known layout of the family.
    pub fn validate(&self, type_name: &str) -> Result<()> {
        let bits = self.bit_width();
        match self {
            RawEncoding::Ieee754 { .. } => match bits {
                32 | 64 => Ok(()),
                128 => Err(Error::Unsupported("IEEE-754 128 bit float".into())),
                _ => Err(Error::UnsupportedWidth {
                    name: type_name.to_string(),
                    bits,
                }),
            },
            RawEncoding::Milstd1750 { .. } => match bits {
                16 | 32 | 48 => Ok(()),
                _ => Err(Error::UnsupportedWidth {
                    name: type_name.to_string(),
                    bits,
                }),
            },
            RawEncoding::CharString { .. } => {
                if bits > 0 && bits % 8 == 0 {
                    Ok(())
                } else {
                    Err(Error::UnsupportedWidth {
                        name: type_name.to_string(),
                        bits,
                    })
                }
            }
            _ => {
                if (1..=64).contains(&bits) {
                    Ok(())
                } else {
                    Err(Error::UnsupportedWidth {
                        name: type_name.to_string(),
                        bits,
                    })
                }
            }
        }
    }

    /// Decode the field at `offset` into an uncalibrated value.
    ///
    /// # Errors
    /// [`Error::NotEnoughBits`] if the field extends past the end of `buf`.
    pub fn decode(&self, buf: &BitBuffer, offset: usize) -> Result<Value> {
        let bits = self.bit_width() as usize;
        match self {
            RawEncoding::Unsigned { .. } | RawEncoding::Binary { .. } => {
                Ok(Value::Unsigned(buf.read(offset, bits)?))
            }
            RawEncoding::TwosComplement { .. } => {
                let raw = buf.read(offset, bits)?;
                Ok(Value::Signed(sign_extend(raw, bits)))
            }
            RawEncoding::OnesComplement { .. } => {
                let raw = buf.read(offset, bits)?;
                let v = if bits < 64 && raw >> (bits - 1) == 1 {
                    -((!raw & mask(bits)) as i64)
                } else if bits == 64 && raw >> 63 == 1 {
                    -(!raw as i64)
                } else {
                    raw as i64
                };
                Ok(Value::Signed(v))
            }
            RawEncoding::SignMagnitude { .. } => {
                let raw = buf.read(offset, bits)?;
                let magnitude = (raw & (mask(bits) >> 1)) as i64;
                let v = if raw >> (bits - 1) == 1 {
                    -magnitude
                } else {
                    magnitude
                };
                Ok(Value::Signed(v))
            }
            RawEncoding::Ieee754 { .. } => {
                let raw = buf.read(offset, bits)?;
                let v = if bits == 32 {
                    f64::from(f32::from_bits(raw as u32))
                } else {
                    f64::from_bits(raw)
                };
                Ok(Value::Double(v))
            }
            RawEncoding::Milstd1750 { .. } => {
                Ok(Value::Double(decode_1750(buf, offset, bits)?))
            }
            RawEncoding::CharString { .. } => {
                let field = buf.slice(offset, bits)?;
                let s = String::from_utf8_lossy(field.as_bytes())
                    .trim_end_matches('\0')
                    .to_string();
                Ok(Value::Text(s))
            }
        }
    }

    /// Encode `value` into a field of the declared width. Never fails;
    /// problems are warned and the field is left zero-filled.
    pub fn encode(&self, value: &Value, item: &str, warnings: &mut Warnings) -> BitBuffer {
        let bits = self.bit_width() as usize;
        let mut out = BitBuffer::zeroed(bits);
        match self {
            RawEncoding::Binary { .. } => {
                match integer_of(value, item, warnings) {
                    Some(v) if v < 0 => warnings.push(format!(
                        "{item} negative values do not have a meaning in a binary context"
                    )),
                    Some(v) => self.put_unsigned(&mut out, v as u64, item, warnings),
                    None => {}
                };
            }
            RawEncoding::Unsigned { .. } => {
                match integer_of(value, item, warnings) {
                    Some(v) if v < 0 => warnings.push(format!(
                        "{item} cannot encode negative value {v} as unsigned"
                    )),
                    Some(v) => self.put_unsigned(&mut out, v as u64, item, warnings),
                    None => {}
                };
            }
            RawEncoding::TwosComplement { .. } => {
                if let Some(v) = integer_of(value, item, warnings) {
                    if in_signed_range(v, bits) {
                        out.write(0, bits, (v as u64) & mask(bits));
                    } else {
                        warnings.push(format!("{item} value {v} exceeds {bits} bit width"));
                    }
                }
            }
            RawEncoding::OnesComplement { .. } => {
                if let Some(v) = integer_of(value, item, warnings) {
                    // ones complement range is symmetric
                    if v.unsigned_abs() <= mask(bits - 1) {
                        let raw = if v < 0 {
                            !(v.unsigned_abs()) & mask(bits)
                        } else {
                            v as u64
                        };
                        out.write(0, bits, raw);
                    } else {
                        warnings.push(format!("{item} value {v} exceeds {bits} bit width"));
                    }
                }
            }
            RawEncoding::SignMagnitude { .. } => {
                if let Some(v) = integer_of(value, item, warnings) {
                    let magnitude = v.unsigned_abs();
                    if magnitude <= mask(bits - 1) {
                        let sign = u64::from(v < 0);
                        out.write(0, bits, (sign << (bits - 1)) | magnitude);
                    } else {
                        warnings.push(format!("{item} value {v} exceeds {bits} bit width"));
                    }
                }
            }
            RawEncoding::Ieee754 { .. } => {
                if let Some(v) = float_of(value, item, warnings) {
                    let raw = if bits == 32 {
                        u64::from((v as f32).to_bits())
                    } else {
                        v.to_bits()
                    };
                    out.write(0, bits, raw);
                }
            }
            RawEncoding::Milstd1750 { .. } => {
                if let Some(v) = float_of(value, item, warnings) {
                    encode_1750(&mut out, v, bits, item, warnings);
                }
            }
            RawEncoding::CharString { .. } => {
                let s = value.to_string();
                let nbytes = bits / 8;
                if s.len() > nbytes {
                    warnings.push(format!(
                        "{item} string value longer than {nbytes} characters"
                    ));
                }
                for (i, b) in s.bytes().take(nbytes).enumerate() {
                    out.write(i * 8, 8, u64::from(b));
                }
            }
        }
        out
    }

    fn put_unsigned(&self, out: &mut BitBuffer, v: u64, item: &str, warnings: &mut Warnings) {
        let bits = self.bit_width() as usize;
        if v <= mask(bits) {
            out.write(0, bits, v);
        } else {
            warnings.push(format!("{item} value {v} exceeds {bits} bit width"));
        }
    }
}

fn mask(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn sign_extend(raw: u64, bits: usize) -> i64 {
    if bits < 64 && raw >> (bits - 1) == 1 {
        (raw | !mask(bits)) as i64
    } else {
        raw as i64
    }
}

fn in_signed_range(v: i64, bits: usize) -> bool {
    if bits >= 64 {
        return true;
    }
    let half = 1i64 << (bits - 1);
    v >= -half && v < half
}

fn integer_of(value: &Value, item: &str, warnings: &mut Warnings) -> Option<i64> {
    let v = match value {
        Value::Signed(v) => Some(*v),
        Value::Unsigned(v) => i64::try_from(*v).ok(),
        Value::Double(v) => Some(v.round() as i64),
        Value::Text(s) => s.trim().parse::<f64>().ok().map(|v| v.round() as i64),
    };
    if v.is_none() {
        warnings.push(format!("{item} value '{value}' is not a usable integer"));
    }
    v
}

fn float_of(value: &Value, item: &str, warnings: &mut Warnings) -> Option<f64> {
    let v = value.as_f64();
    if v.is_none() {
        warnings.push(format!("{item} value '{value}' is not a usable number"));
    }
    v
}

/// MIL-STD-1750A layout: total mantissa bits (two's complement, sign
/// included) and exponent bits (two's complement).
///
/// 16-bit: 9-bit mantissa, 7-bit exponent. 32-bit: 24-bit mantissa, 8-bit
/// exponent. 48-bit: 24-bit high mantissa, 8-bit exponent, 16 low-order
/// mantissa bits (40 mantissa bits total).
fn layout_1750(bits: usize) -> (usize, usize) {
    match bits {
        16 => (9, 7),
        32 => (24, 8),
        _ => (40, 8),
    }
}

fn decode_1750(buf: &BitBuffer, offset: usize, bits: usize) -> Result<f64> {
    let (mant_bits, exp_bits) = layout_1750(bits);
    let (mantissa, exponent) = if bits == 48 {
        let high = buf.read(offset, 24)?;
        let exp = buf.read(offset + 24, 8)?;
        let low = buf.read(offset + 32, 16)?;
        (sign_extend((high << 16) | low, 40), sign_extend(exp, 8))
    } else {
        let mant = buf.read(offset, mant_bits)?;
        let exp = buf.read(offset + mant_bits, exp_bits)?;
        (sign_extend(mant, mant_bits), sign_extend(exp, exp_bits))
    };
    let fraction = mantissa as f64 / (1u64 << (mant_bits - 1)) as f64;
    Ok(fraction * 2f64.powi(exponent as i32))
}

fn encode_1750(out: &mut BitBuffer, v: f64, bits: usize, item: &str, warnings: &mut Warnings) {
    if v == 0.0 {
        return;
    }
    if !v.is_finite() {
        warnings.push(format!(
            "{item} value {v} exceeds the range of a {bits} bit MIL-STD-1750A float"
        ));
        return;
    }
    let (mant_bits, exp_bits) = layout_1750(bits);
    let scale = (1u64 << (mant_bits - 1)) as f64;

    // Normalize |v| = m * 2^e with m in [0.5, 1)
    let mut m = v.abs();
    let mut e = 0i64;
    while m >= 1.0 {
        m /= 2.0;
        e += 1;
    }
    while m < 0.5 {
        m *= 2.0;
        e -= 1;
    }

    let mut mantissa = (m * scale).round() as i64;
    if mantissa as f64 >= scale {
        // rounding carried past 1.0
        mantissa >>= 1;
        e += 1;
    }
    if v < 0.0 {
        mantissa = -mantissa;
        if mantissa as f64 == -scale / 2.0 {
            // normalized negative mantissa lives in [-1, -0.5)
            mantissa *= 2;
            e -= 1;
        }
    }

    let exp_half = 1i64 << (exp_bits - 1);
    if e < -exp_half || e >= exp_half {
        warnings.push(format!(
            "{item} value {v} exceeds the range of a {bits} bit MIL-STD-1750A float"
        ));
        return;
    }

    let mant_raw = (mantissa as u64) & mask(mant_bits);
    let exp_raw = (e as u64) & mask(exp_bits);
    if bits == 48 {
        out.write(0, 24, mant_raw >> 16);
        out.write(24, 8, exp_raw);
        out.write(32, 16, mant_raw & 0xffff);
    } else {
        out.write(0, mant_bits, mant_raw);
        out.write(mant_bits, exp_bits, exp_raw);
    }
}
