//! Typed argument descriptors.
//!
//! XDR itself carries no type information on the wire - a decoder must
//! already know the shape of the data it is reading. [`TypeDescriptor`] is a
//! small, closed description of that shape (the equivalent of a procedure's
//! argument/result signature) that can be built up at runtime and used to
//! pack a [`Value`] into a buffer or unpack one back out of a cursor,
//! without generating a bespoke decoder per RPC procedure.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::xdr::ByteCursor;
use crate::{ByteBuffer, Error, Opaque};

/// Describes the shape of a single XDR-encoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    /// A signed 32 bit integer.
    Int,
    /// An unsigned 32 bit integer.
    UInt,
    /// A boolean, encoded as a 32 bit integer (0 or 1).
    Bool,
    /// An IEEE-754 single precision float.
    Float,
    /// An IEEE-754 double precision float.
    Double,
    /// A variable-length, length-prefixed, zero-padded UTF-8 string.
    String,
    /// A variable-length, length-prefixed, zero-padded opaque byte array.
    Bytes,
    /// A fixed-length string of exactly `n` bytes, zero-padded but without a
    /// length prefix.
    FString(usize),
    /// A fixed-length opaque byte array of exactly `n` bytes, zero-padded but
    /// without a length prefix.
    FBytes(usize),
    /// A variable-length homogeneous list, encoded as a sequence of
    /// `(1, element)` pairs terminated by a `0` discriminator.
    List(Box<TypeDescriptor>),
    /// A variable-length homogeneous array, encoded as a count prefix
    /// followed by that many elements.
    Array(Box<TypeDescriptor>),
    /// A fixed-length homogeneous array of exactly `n` elements, with no
    /// count prefix.
    FArray(Box<TypeDescriptor>, usize),
}

/// A value that can be packed according to a [`TypeDescriptor`], or the
/// result of unpacking one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// See [`TypeDescriptor::Int`].
    Int(i32),
    /// See [`TypeDescriptor::UInt`].
    UInt(u32),
    /// See [`TypeDescriptor::Bool`].
    Bool(bool),
    /// See [`TypeDescriptor::Float`].
    Float(f32),
    /// See [`TypeDescriptor::Double`].
    Double(f64),
    /// See [`TypeDescriptor::String`].
    String(String),
    /// See [`TypeDescriptor::Bytes`], [`TypeDescriptor::FString`] and
    /// [`TypeDescriptor::FBytes`] - all three unpack to raw bytes; decoding a
    /// fixed string's bytes as UTF-8 is left to the caller.
    Bytes(Vec<u8>),
    /// See [`TypeDescriptor::List`].
    List(Vec<Value>),
    /// See [`TypeDescriptor::Array`] and [`TypeDescriptor::FArray`].
    Array(Vec<Value>),
}

impl TypeDescriptor {
    /// Returns `true` if `value` is the kind of value this descriptor packs.
    ///
    /// Used to validate homogeneity of list/array elements: each element is
    /// checked against the inner descriptor independently, rather than
    /// structurally compared against the first element.
    fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (TypeDescriptor::Int, Value::Int(_))
                | (TypeDescriptor::UInt, Value::UInt(_))
                | (TypeDescriptor::Bool, Value::Bool(_))
                | (TypeDescriptor::Float, Value::Float(_))
                | (TypeDescriptor::Double, Value::Double(_))
                | (TypeDescriptor::String, Value::String(_))
                | (TypeDescriptor::Bytes, Value::Bytes(_))
                | (TypeDescriptor::FString(_), Value::Bytes(_))
                | (TypeDescriptor::FBytes(_), Value::Bytes(_))
                | (TypeDescriptor::List(_), Value::List(_))
                | (TypeDescriptor::Array(_), Value::Array(_))
                | (TypeDescriptor::FArray(_, _), Value::Array(_))
        )
    }

    /// Packs `value` into `buf` according to this descriptor.
    pub fn pack(&self, value: &Value, buf: &mut ByteBuffer) -> Result<(), Error> {
        if !self.matches(value) {
            return Err(Error::BadFormat(format!(
                "value {value:?} does not match descriptor {self:?}"
            )));
        }

        match (self, value) {
            (TypeDescriptor::Int, Value::Int(v)) => buf.write_i32::<BigEndian>(*v)?,
            (TypeDescriptor::UInt, Value::UInt(v)) => buf.write_u32::<BigEndian>(*v)?,
            (TypeDescriptor::Bool, Value::Bool(v)) => {
                buf.write_u32::<BigEndian>(if *v { 1 } else { 0 })?
            }
            (TypeDescriptor::Float, Value::Float(v)) => buf.write_f32::<BigEndian>(*v)?,
            (TypeDescriptor::Double, Value::Double(v)) => buf.write_f64::<BigEndian>(*v)?,
            (TypeDescriptor::String, Value::String(v)) => {
                Opaque::from_user_payload(v.as_bytes()).serialise_into(buf)?
            }
            (TypeDescriptor::Bytes, Value::Bytes(v)) => {
                Opaque::from_user_payload(v.as_slice()).serialise_into(buf)?
            }
            (TypeDescriptor::FString(n), Value::Bytes(v))
            | (TypeDescriptor::FBytes(n), Value::Bytes(v)) => {
                if v.len() != *n {
                    return Err(Error::BadFormat(format!(
                        "fixed-length payload has {} bytes, expected {n}",
                        v.len()
                    )));
                }
                self.pack_raw(buf, v)?;
            }
            (TypeDescriptor::List(inner), Value::List(items)) => {
                for item in items {
                    buf.write_u32::<BigEndian>(1)?;
                    inner.pack(item, buf)?;
                }
                buf.write_u32::<BigEndian>(0)?;
            }
            (TypeDescriptor::Array(inner), Value::Array(items)) => {
                buf.write_u32::<BigEndian>(items.len() as u32)?;
                for item in items {
                    inner.pack(item, buf)?;
                }
            }
            (TypeDescriptor::FArray(inner, n), Value::Array(items)) => {
                if items.len() != *n {
                    return Err(Error::BadFormat(format!(
                        "fixed array has {} elements, expected {n}",
                        items.len()
                    )));
                }
                for item in items {
                    inner.pack(item, buf)?;
                }
            }
            _ => unreachable!("matches() already validated the shape"),
        }

        Ok(())
    }

    /// Appends `raw` to `buf` with XDR zero padding, without a length
    /// prefix. Used for the fixed-length variants.
    ///
    /// Goes through [`ByteBuffer`]'s public [`std::io::Write`] impl rather
    /// than any internal buffer field, so callers composing their own
    /// [`ByteBuffer`] wrapper still see the bytes land in the right place.
    fn pack_raw(&self, buf: &mut ByteBuffer, raw: &[u8]) -> Result<(), Error> {
        use std::io::Write;
        buf.write_all(raw)?;
        let pad = crate::xdr::pad_length(raw.len() as u32) as usize;
        if pad > 0 {
            buf.write_all(&[0u8; 3][..pad])?;
        }
        Ok(())
    }

    /// Unpacks a [`Value`] matching this descriptor from `cursor`.
    pub fn unpack(&self, cursor: &mut ByteCursor<'_>) -> Result<Value, Error> {
        let value = match self {
            TypeDescriptor::Int => Value::Int(cursor.read_i32::<BigEndian>()?),
            TypeDescriptor::UInt => Value::UInt(cursor.read_u32::<BigEndian>()?),
            TypeDescriptor::Bool => Value::Bool(cursor.read_u32::<BigEndian>()? != 0),
            TypeDescriptor::Float => Value::Float(cursor.read_f32::<BigEndian>()?),
            TypeDescriptor::Double => Value::Double(cursor.read_f64::<BigEndian>()?),
            TypeDescriptor::String => {
                let raw = Opaque::from_wire(cursor, u32::MAX as usize)?.into_payload();
                let s = std::str::from_utf8(raw)
                    .map_err(|e| Error::UnpackError(e.to_string()))?
                    .to_owned();
                Value::String(s)
            }
            TypeDescriptor::Bytes => {
                let raw = Opaque::from_wire(cursor, u32::MAX as usize)?.into_payload();
                Value::Bytes(raw.to_vec())
            }
            TypeDescriptor::FString(n) | TypeDescriptor::FBytes(n) => {
                Value::Bytes(self.unpack_raw(cursor, *n)?)
            }
            TypeDescriptor::List(inner) => {
                let mut items = Vec::new();
                loop {
                    if cursor.read_u32::<BigEndian>()? == 0 {
                        break;
                    }
                    items.push(inner.unpack_one(cursor)?);
                }
                Value::List(items)
            }
            TypeDescriptor::Array(inner) => {
                let count = cursor.read_u32::<BigEndian>()? as usize;
                Value::Array(inner.unpack_n(cursor, count)?)
            }
            TypeDescriptor::FArray(inner, n) => Value::Array(inner.unpack_n(cursor, *n)?),
        };

        Ok(value)
    }

    /// Reads `n` raw bytes plus their XDR padding.
    fn unpack_raw(&self, cursor: &mut ByteCursor<'_>, n: usize) -> Result<Vec<u8>, Error> {
        let raw = cursor.read_slice(n)?.to_vec();
        let pad = crate::xdr::pad_length(n as u32) as usize;
        if pad > 0 {
            cursor.read_slice(pad)?;
        }
        Ok(raw)
    }

    /// Unpacks a single element, instantiating a fresh (structurally
    /// identical) descriptor for the recursive call rather than reusing any
    /// shared mutable state - each element of a list/array is independent.
    fn unpack_one(&self, cursor: &mut ByteCursor<'_>) -> Result<Value, Error> {
        self.clone().unpack(cursor)
    }

    /// Unpacks exactly `n` elements, each via a freshly instantiated
    /// descriptor.
    fn unpack_n(&self, cursor: &mut ByteCursor<'_>, n: usize) -> Result<Vec<Value>, Error> {
        (0..n).map(|_| self.unpack_one(cursor)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(desc: &TypeDescriptor, value: &Value) -> Value {
        let mut buf = ByteBuffer::new();
        desc.pack(value, &mut buf).expect("pack failed");
        let mut cursor = ByteCursor::new(buf.as_slice());
        let got = desc.unpack(&mut cursor).expect("unpack failed");
        cursor.done().expect("unpack left trailing bytes");
        got
    }

    #[test]
    fn test_scalar_round_trip() {
        assert_eq!(roundtrip(&TypeDescriptor::Int, &Value::Int(-42)), Value::Int(-42));
        assert_eq!(roundtrip(&TypeDescriptor::UInt, &Value::UInt(42)), Value::UInt(42));
        assert_eq!(roundtrip(&TypeDescriptor::Bool, &Value::Bool(true)), Value::Bool(true));
        assert_eq!(
            roundtrip(&TypeDescriptor::Double, &Value::Double(1.5)),
            Value::Double(1.5)
        );
    }

    #[test]
    fn test_string_round_trip() {
        let v = Value::String("hello".to_owned());
        assert_eq!(roundtrip(&TypeDescriptor::String, &v), v);
    }

    #[test]
    fn test_fstring_requires_exact_length() {
        let desc = TypeDescriptor::FString(4);
        let mut buf = ByteBuffer::new();
        let err = desc.pack(&Value::Bytes(vec![1, 2, 3]), &mut buf).unwrap_err();
        assert!(matches!(err, Error::BadFormat(_)));
    }

    #[test]
    fn test_fstring_round_trip_is_raw_bytes() {
        let desc = TypeDescriptor::FString(3);
        let v = Value::Bytes(vec![b'f', b'o', b'o']);
        assert_eq!(roundtrip(&desc, &v), v);
    }

    #[test]
    fn test_list_round_trip() {
        let desc = TypeDescriptor::List(Box::new(TypeDescriptor::UInt));
        let v = Value::List(vec![Value::UInt(1), Value::UInt(2), Value::UInt(3)]);
        assert_eq!(roundtrip(&desc, &v), v);
    }

    #[test]
    fn test_array_round_trip() {
        let desc = TypeDescriptor::Array(Box::new(TypeDescriptor::Int));
        let v = Value::Array(vec![Value::Int(-1), Value::Int(0), Value::Int(1)]);
        assert_eq!(roundtrip(&desc, &v), v);
    }

    #[test]
    fn test_farray_wrong_length_rejected() {
        let desc = TypeDescriptor::FArray(Box::new(TypeDescriptor::Int), 4);
        let mut buf = ByteBuffer::new();
        let err = desc
            .pack(&Value::Array(vec![Value::Int(1), Value::Int(2)]), &mut buf)
            .unwrap_err();
        assert!(matches!(err, Error::BadFormat(_)));
    }

    #[test]
    fn test_heterogeneous_list_rejected() {
        let desc = TypeDescriptor::List(Box::new(TypeDescriptor::UInt));
        let mut buf = ByteBuffer::new();
        let v = Value::List(vec![Value::UInt(1), Value::Bool(true)]);
        // Packing recurses per-element; the mismatched bool is rejected when
        // its turn comes, not by a structural walk up front.
        let err = desc.pack(&v, &mut buf).unwrap_err();
        assert!(matches!(err, Error::BadFormat(_)));
    }

    #[test]
    fn test_portmapper_dump_shape() {
        // PMAPPROC_DUMP replies with a list of fixed 4-element int arrays:
        // (program, version, protocol, port).
        let entry = TypeDescriptor::FArray(Box::new(TypeDescriptor::UInt), 4);
        let desc = TypeDescriptor::List(Box::new(entry));

        let v = Value::List(vec![
            Value::Array(vec![
                Value::UInt(100000),
                Value::UInt(2),
                Value::UInt(6),
                Value::UInt(111),
            ]),
            Value::Array(vec![
                Value::UInt(100003),
                Value::UInt(3),
                Value::UInt(17),
                Value::UInt(2049),
            ]),
        ]);

        assert_eq!(roundtrip(&desc, &v), v);
    }
}
