// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::{
    cmp::Ordering,
    io::{Read, Write},
};

/// Longest encodable string (lengths are a single byte)
pub const MAX_STRING_LEN: usize = 255;

/// Most fields a table header can carry (the count is a single byte)
pub const MAX_FIELDS: usize = 255;

/// Type of a field value
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Type {
    /// 32-bit signed integer, 4 bytes two's complement on disk
    Int32,

    /// 64-bit IEEE 754 float, 8 bytes on disk
    Float64,

    /// Length-prefixed UTF-8 string, at most [`MAX_STRING_LEN`] bytes
    Str,
}

impl TryFrom<u8> for Type {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Int32),
            2 => Ok(Self::Float64),
            3 => Ok(Self::Str),
            _ => Err(()),
        }
    }
}

impl From<Type> for u8 {
    fn from(value: Type) -> Self {
        match value {
            Type::Int32 => 1,
            Type::Float64 => 2,
            Type::Str => 3,
        }
    }
}

/// A single field value
///
/// Records are row-oriented, type-erased tuples; each position carries
/// one of these, matching the table header's declared type.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// 32-bit signed integer
    Int32(i32),

    /// 64-bit IEEE 754 float
    Float64(f64),

    /// UTF-8 string, at most [`MAX_STRING_LEN`] bytes
    Str(String),
}

impl Value {
    /// Returns the type tag of this value.
    #[must_use]
    pub fn value_type(&self) -> Type {
        match self {
            Self::Int32(_) => Type::Int32,
            Self::Float64(_) => Type::Float64,
            Self::Str(_) => Type::Str,
        }
    }

    /// Deserializes a value of the given declared type.
    pub fn decode_from<R: Read>(reader: &mut R, value_type: Type) -> Result<Self, DecodeError> {
        match value_type {
            Type::Int32 => Ok(Self::Int32(reader.read_i32::<LittleEndian>()?)),
            Type::Float64 => Ok(Self::Float64(reader.read_f64::<LittleEndian>()?)),
            Type::Str => Ok(Self::Str(read_string(reader)?)),
        }
    }

    /// Compares two values of the same type.
    ///
    /// Floats are ordered by `f64::total_cmp`. Comparing values of
    /// different types is an error.
    pub fn cmp_same_type(&self, other: &Self) -> crate::Result<Ordering> {
        match (self, other) {
            (Self::Int32(a), Self::Int32(b)) => Ok(a.cmp(b)),
            (Self::Float64(a), Self::Float64(b)) => Ok(a.total_cmp(b)),
            (Self::Str(a), Self::Str(b)) => Ok(a.cmp(b)),
            (a, b) => Err(crate::Error::InvalidArgument(format!(
                "cannot compare {:?} with {:?}",
                a.value_type(),
                b.value_type(),
            ))),
        }
    }

    /// Total order used by sort operators.
    ///
    /// Values of different types never meet in a sort column; if they
    /// do, they order by type tag so the order is still total.
    #[must_use]
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int32(a), Self::Int32(b)) => a.cmp(b),
            (Self::Float64(a), Self::Float64(b)) => a.total_cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (a, b) => u8::from(a.value_type()).cmp(&u8::from(b.value_type())),
        }
    }

    /// Coerces the value to a float for aggregation.
    ///
    /// Integers widen; strings are parsed and fail loudly when they do
    /// not hold a number.
    pub fn coerce_to_f64(&self) -> crate::Result<f64> {
        match self {
            Self::Int32(x) => Ok(f64::from(*x)),
            Self::Float64(x) => Ok(*x),
            Self::Str(s) => s.parse::<f64>().map_err(|_| {
                crate::Error::InvalidArgument(format!("cannot coerce {s:?} to a float"))
            }),
        }
    }
}

impl Encode for Value {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match self {
            Self::Int32(x) => writer.write_i32::<LittleEndian>(*x)?,
            Self::Float64(x) => writer.write_f64::<LittleEndian>(*x)?,
            Self::Str(s) => write_string(writer, s)?,
        }
        Ok(())
    }
}

fn write_string<W: Write>(writer: &mut W, s: &str) -> Result<(), EncodeError> {
    if s.len() > MAX_STRING_LEN {
        return Err(EncodeError::StringTooLong(s.len()));
    }

    #[allow(clippy::cast_possible_truncation)]
    writer.write_u8(s.len() as u8)?;

    writer.write_all(s.as_bytes())?;
    Ok(())
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, DecodeError> {
    let len = reader.read_u8()?;
    let mut buf = vec![0; usize::from(len)];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

/// A named, typed column of a table
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Field {
    /// Field name
    pub name: String,

    /// Declared value type
    pub value_type: Type,
}

impl Field {
    /// Creates a field.
    pub fn new(name: impl Into<String>, value_type: Type) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

impl Encode for Field {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_string(writer, &self.name)?;
        writer.write_u8(self.value_type.into())?;
        Ok(())
    }
}

impl Decode for Field {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let name = read_string(reader)?;
        let tag = reader.read_u8()?;
        let value_type =
            Type::try_from(tag).map_err(|()| DecodeError::InvalidTag(("Type", tag)))?;
        Ok(Self { name, value_type })
    }
}

/// Schema descriptor: a table name plus its ordered fields
///
/// Field names are expected to be unique; this is a caller convention
/// and is not enforced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableHeader {
    /// Table name
    pub name: String,

    /// Ordered fields; position i types position i of every record
    pub fields: Vec<Field>,
}

impl TableHeader {
    /// Creates a table header.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Looks up a field by name, returning its position and type.
    pub fn position_and_type(&self, field_name: &str) -> crate::Result<(usize, Type)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == field_name)
            .map(|(i, f)| (i, f.value_type))
            .ok_or_else(|| {
                crate::Error::InvalidArgument(format!(
                    "table {:?} does not have field {field_name:?}",
                    self.name,
                ))
            })
    }

    /// Deserializes one record laid out per this header.
    pub fn read_record<R: Read>(&self, reader: &mut R) -> Result<Record, DecodeError> {
        let mut record = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            record.push(Value::decode_from(reader, field.value_type)?);
        }
        Ok(record)
    }

    /// Serializes one record laid out per this header.
    ///
    /// The record is expected to match the header positionwise; a
    /// width mismatch is a schema error.
    pub fn write_record<W: Write>(&self, writer: &mut W, record: &Record) -> crate::Result<()> {
        if record.len() != self.fields.len() {
            return Err(crate::Error::SchemaMismatch(format!(
                "record has {} values, table {:?} has {} fields",
                record.len(),
                self.name,
                self.fields.len(),
            )));
        }
        for value in record {
            value.encode_into(writer).map_err(crate::Error::Encode)?;
        }
        Ok(())
    }
}

impl Encode for TableHeader {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        if self.fields.len() > MAX_FIELDS {
            return Err(EncodeError::TooManyFields(self.fields.len()));
        }
        write_string(writer, &self.name)?;

        #[allow(clippy::cast_possible_truncation)]
        writer.write_u8(self.fields.len() as u8)?;

        for field in &self.fields {
            field.encode_into(writer)?;
        }
        Ok(())
    }
}

impl Decode for TableHeader {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let name = read_string(reader)?;
        let field_count = reader.read_u8()?;
        let mut fields = Vec::with_capacity(usize::from(field_count));
        for _ in 0..field_count {
            fields.push(Field::decode_from(reader)?);
        }
        Ok(Self { name, fields })
    }
}

/// Ordered heterogeneous tuple matching a [`TableHeader`]
///
/// Equality is position-wise value equality.
pub type Record = Vec<Value>;

/// Stable address of a record in a heap file
///
/// Valid as long as the owning heap file exists; never reused after a
/// delete.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct RecordId {
    /// Page (block) the record lives on
    pub page_id: i32,

    /// Slot within the page
    pub slot_id: u16,
}
