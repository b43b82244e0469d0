use super::{extract_bits, sign_extend, BitCursor};
use crate::error::Error;
use crate::metadata::{Field, MetadataType, StructType};
use std::sync::Arc;

/// A decoded field value.
///
/// Integers surface in the smallest native width that holds their declared size.
#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    /// Floating point decoding isn't supported, the raw bits are kept
    UnsupportedFloat {
        raw: u64,
    },
    String(String),
    Enum {
        value: Box<Value>,
        label: Arc<str>,
    },
    Array(Vec<Value>),
    /// An array of statically sized elements, decoded on demand
    RawArray(RawArray),
    Struct(StructValue),
    Variant {
        /// Index of the selected option
        option: usize,
        label: Arc<str>,
        value: Box<Value>,
    },
}

impl Value {
    pub(crate) fn integer(raw: u64, size: u32, signed: bool) -> Self {
        if signed {
            let v = sign_extend(raw, size);
            match size {
                0..=8 => Value::I8(v as i8),
                9..=16 => Value::I16(v as i16),
                17..=32 => Value::I32(v as i32),
                _ => Value::I64(v),
            }
        } else {
            match size {
                0..=8 => Value::U8(raw as u8),
                9..=16 => Value::U16(raw as u16),
                17..=32 => Value::U32(raw as u32),
                _ => Value::U64(raw),
            }
        }
    }

    /// Integers, and enums through their integer value
    pub fn as_i128(&self) -> Option<i128> {
        Some(match self {
            Value::U8(v) => (*v).into(),
            Value::U16(v) => (*v).into(),
            Value::U32(v) => (*v).into(),
            Value::U64(v) => (*v).into(),
            Value::I8(v) => (*v).into(),
            Value::I16(v) => (*v).into(),
            Value::I32(v) => (*v).into(),
            Value::I64(v) => (*v).into(),
            Value::Enum { value, .. } => return value.as_i128(),
            _ => return None,
        })
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i128().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Enum label, or the selected option of a variant
    pub fn label(&self) -> Option<&Arc<str>> {
        match self {
            Value::Enum { label, .. } | Value::Variant { label, .. } => Some(label),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            Value::Variant { value, .. } => value.as_struct(),
            _ => None,
        }
    }

    /// Strings, and character arrays up to their first NUL
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::RawArray(a) => a.text(),
            _ => None,
        }
    }
}

/// A statically sized array kept as its raw bytes.
#[derive(Clone, PartialEq, Debug)]
pub struct RawArray {
    element: MetadataType,
    length: u64,
    stride: u64,
    /// Packet-relative bit position of `bytes[0]`
    origin_bits: u64,
    /// Bit offset of the first element within `bytes[0]`
    start_bit: u8,
    bytes: Vec<u8>,
}

impl RawArray {
    pub(crate) fn new(
        element: MetadataType,
        length: u64,
        stride: u64,
        origin_bits: u64,
        start_bit: u8,
        bytes: Vec<u8>,
    ) -> Self {
        RawArray {
            element,
            length,
            stride,
            origin_bits,
            start_bit,
            bytes,
        }
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn element_type(&self) -> &MetadataType {
        &self.element
    }

    /// Decodes the element at `index`
    pub fn get(&self, index: u64) -> Option<Result<Value, Error>> {
        if index >= self.length {
            return None;
        }
        let bit = u64::from(self.start_bit) + index * self.stride;
        Some(match &self.element {
            MetadataType::Integer(i) => Ok(Value::integer(
                extract_bits(&self.bytes, bit, i.size, i.byte_order()),
                i.size,
                i.signed,
            )),
            element => {
                let byte = (bit / 8) as usize;
                let mut cursor =
                    BitCursor::with_origin(&self.bytes[byte..], self.origin_bits + byte as u64 * 8);
                cursor
                    .skip_bits(bit % 8)
                    .and_then(|_| cursor.read_value(element, None))
            }
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Value, Error>> + '_ {
        (0..self.length).filter_map(|i| self.get(i))
    }

    /// The raw bytes when the elements are byte-aligned octets
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.element {
            MetadataType::Integer(i) if i.size == 8 && self.stride == 8 && self.start_bit == 0 => {
                Some(&self.bytes[..self.length as usize])
            }
            _ => None,
        }
    }

    /// Character arrays as text, up to the first NUL
    pub fn text(&self) -> Option<String> {
        match &self.element {
            MetadataType::Integer(i) if i.is_text() => {
                let bytes = self.as_bytes()?;
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct FieldValue {
    /// Packet-relative bit position the field was read from
    pub bit_offset: u64,
    pub value: Value,
}

/// A decoded structure, values in declaration order
#[derive(Clone, PartialEq, Debug)]
pub struct StructValue {
    schema: Arc<StructType>,
    values: Vec<FieldValue>,
}

impl StructValue {
    pub(crate) fn new(schema: Arc<StructType>, values: Vec<FieldValue>) -> Self {
        StructValue { schema, values }
    }

    pub fn schema(&self) -> &Arc<StructType> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.field(name).map(|(_, v)| &v.value)
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index).map(|v| &v.value)
    }

    pub fn field(&self, name: &str) -> Option<(&Field, &FieldValue)> {
        let (idx, field) = self.schema.field(name)?;
        self.values.get(idx).map(|v| (field, v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Field, &FieldValue)> {
        self.schema.fields().iter().zip(self.values.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ByteOrder, Encoding, IntegerType};
    use pretty_assertions::assert_eq;

    fn int(size: u32, signed: bool, encoding: Encoding) -> MetadataType {
        MetadataType::Integer(IntegerType {
            size,
            align: 1,
            signed,
            byte_order: Some(ByteOrder::LittleEndian),
            encoding,
            base: 10,
            map: None,
        })
    }

    #[test]
    fn integer_widths() {
        assert_eq!(Value::integer(0xFF, 5, false), Value::U8(0xFF));
        assert_eq!(Value::integer(0x1F, 5, true), Value::I8(-1));
        assert_eq!(Value::integer(0xFFFF, 12, false), Value::U16(0xFFFF));
        assert_eq!(Value::integer(1 << 26, 27, false), Value::U32(1 << 26));
        assert_eq!(Value::integer(u64::MAX, 64, true), Value::I64(-1));
        assert_eq!(Value::integer(u64::MAX, 33, false), Value::U64(u64::MAX));
    }

    #[test]
    fn enum_integer_accessors() {
        let v = Value::Enum {
            value: Box::new(Value::I8(-2)),
            label: "neg".into(),
        };
        assert_eq!(v.as_i128(), Some(-2));
        assert_eq!(v.as_u64(), None);
        assert_eq!(v.label().map(|l| &**l), Some("neg"));
    }

    #[test]
    fn raw_array_bitfield_elements() {
        // Three 5-bit values 1, 2, 3 packed LSB-first, starting 2 bits into the byte
        let packed: u32 = (1 | (2 << 5) | (3 << 10)) << 2;
        let arr = RawArray::new(
            int(5, false, Encoding::None),
            3,
            5,
            0,
            2,
            packed.to_le_bytes()[..3].to_vec(),
        );
        let values: Vec<Value> = arr.iter().map(|v| v.unwrap()).collect();
        assert_eq!(values, vec![Value::U8(1), Value::U8(2), Value::U8(3)]);
        assert!(arr.get(3).is_none());
        assert_eq!(arr.as_bytes(), None);
    }

    #[test]
    fn raw_array_text() {
        let arr = RawArray::new(
            int(8, true, Encoding::Utf8),
            6,
            8,
            0,
            0,
            b"proc\0\0".to_vec(),
        );
        assert_eq!(arr.text().as_deref(), Some("proc"));
        assert_eq!(arr.as_bytes(), Some(&b"proc\0\0"[..]));
        assert_eq!(Value::RawArray(arr).to_text().as_deref(), Some("proc"));
    }
}
