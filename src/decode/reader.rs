use super::{BitCursor, FieldValue, RawArray, StructValue, Value};
use crate::error::Error;
use crate::metadata::{
    ArrayLength, ArrayType, ByteOrder, Encoding, MetadataType, StructType, VariantType,
};
use std::io::Read;
use std::sync::Arc;

/// Fields decoded so far, used to find variant tags and sequence lengths.
///
/// Names are looked up in the innermost structure first, then outwards.
pub(crate) struct Scope<'a> {
    parent: Option<&'a Scope<'a>>,
    schema: &'a StructType,
    values: &'a [FieldValue],
}

impl<'a> Scope<'a> {
    fn lookup(&self, name: &str) -> Option<&'a Value> {
        self.lookup_exact(name).or_else(|| {
            // Fully qualified paths like `stream.event.header.id`
            let (_, last) = name.rsplit_once('.')?;
            self.lookup_exact(last)
        })
    }

    fn lookup_exact(&self, name: &str) -> Option<&'a Value> {
        let values: &'a [FieldValue] = self.values;
        self.schema
            .fields()
            .iter()
            .zip(values.iter())
            .rev()
            .find(|(f, _)| f.name == name)
            .map(|(_, v)| &v.value)
            .or_else(|| self.parent.and_then(|p| p.lookup_exact(name)))
    }
}

impl<R: Read> BitCursor<R> {
    /// Decodes one structure at the current position
    pub fn read_struct(&mut self, schema: &Arc<StructType>) -> Result<StructValue, Error> {
        self.read_struct_in(schema, None)
    }

    fn read_struct_in(
        &mut self,
        schema: &Arc<StructType>,
        parent: Option<&Scope<'_>>,
    ) -> Result<StructValue, Error> {
        self.align_to(schema.align())?;
        let mut values = Vec::with_capacity(schema.fields().len());
        for field in schema.fields().iter() {
            self.align_to(field.ty.align())?;
            let bit_offset = self.position_bits();
            let value = {
                let scope = Scope {
                    parent,
                    schema: schema.as_ref(),
                    values: &values,
                };
                self.read_value(&field.ty, Some(&scope))?
            };
            values.push(FieldValue { bit_offset, value });
        }
        Ok(StructValue::new(schema.clone(), values))
    }

    pub(crate) fn read_value(
        &mut self,
        ty: &MetadataType,
        scope: Option<&Scope<'_>>,
    ) -> Result<Value, Error> {
        self.align_to(ty.align())?;
        match ty {
            MetadataType::Integer(i) => {
                let raw = self.read_bits(i.size, i.byte_order())?;
                Ok(Value::integer(raw, i.size, i.signed))
            }
            MetadataType::Float(f) => {
                let raw = self.read_bits(f.size(), f.byte_order.unwrap_or(ByteOrder::LittleEndian))?;
                Ok(Value::UnsupportedFloat { raw })
            }
            MetadataType::String(s) => self.read_string(s.encoding).map(Value::String),
            MetadataType::Struct(s) => self.read_struct_in(s, scope).map(Value::Struct),
            MetadataType::Array(a) => self.read_array(a, scope),
            MetadataType::Enum(e) => {
                let value = self.read_value(&e.base, scope)?;
                let n = value
                    .as_i128()
                    .ok_or_else(|| Error::InvalidType("enumeration base isn't an integer".into()))?;
                let label = e
                    .label_for(n)
                    .ok_or(Error::EnumValueUnmapped { value: n })?
                    .clone();
                Ok(Value::Enum {
                    value: Box::new(value),
                    label,
                })
            }
            MetadataType::Variant(v) => self.read_variant(v, scope),
            MetadataType::UnresolvedRef(name) => Err(Error::UnresolvedType(name.clone())),
        }
    }

    fn read_variant(
        &mut self,
        variant: &VariantType,
        scope: Option<&Scope<'_>>,
    ) -> Result<Value, Error> {
        let tag = variant
            .tag
            .as_deref()
            .ok_or_else(|| Error::VariantTagNotFound("<untagged>".into()))?;
        let tag_value = scope
            .and_then(|s| s.lookup(tag))
            .ok_or_else(|| Error::VariantTagNotFound(tag.to_owned()))?;
        let label = match tag_value {
            Value::Enum { label, .. } => label.clone(),
            other => {
                return Err(Error::VariantOptionNotFound {
                    tag: tag.to_owned(),
                    label: format!("{other:?}"),
                })
            }
        };
        // LTTng prefixes option names that would clash with keywords with '_'
        let (option, field) = variant
            .option(&label)
            .or_else(|| variant.option(&format!("_{label}")))
            .ok_or_else(|| Error::VariantOptionNotFound {
                tag: tag.to_owned(),
                label: label.to_string(),
            })?;
        let value = self.read_value(&field.ty, scope)?;
        Ok(Value::Variant {
            option,
            label,
            value: Box::new(value),
        })
    }

    fn read_array(&mut self, array: &ArrayType, scope: Option<&Scope<'_>>) -> Result<Value, Error> {
        let length = match &array.length {
            ArrayLength::Fixed(len) => *len,
            ArrayLength::Field(name) => scope
                .and_then(|s| s.lookup(name))
                .ok_or_else(|| Error::LengthFieldNotFound(name.clone()))?
                .as_u64()
                .ok_or_else(|| Error::NotAnInteger(name.clone()))?,
        };
        match array.stride() {
            Some(stride) => {
                let size = array.element.static_size().unwrap_or(stride);
                // The last element's trailing padding belongs to whatever follows
                let bits = match length {
                    0 => 0,
                    len => stride
                        .checked_mul(len - 1)
                        .and_then(|b| b.checked_add(size))
                        .ok_or(Error::ContentOverrun {
                            offset: self.channel_offset(),
                        })?,
                };
                let origin = self.position_bits() - self.position_bits() % 8;
                let (bytes, start_bit) = self.take_bits(bits)?;
                Ok(Value::RawArray(RawArray::new(
                    (*array.element).clone(),
                    length,
                    stride,
                    origin,
                    start_bit,
                    bytes,
                )))
            }
            None => {
                let mut elements = Vec::new();
                for _ in 0..length {
                    elements.push(self.read_value(&array.element, scope)?);
                }
                Ok(Value::Array(elements))
            }
        }
    }

    fn read_string(&mut self, encoding: Encoding) -> Result<String, Error> {
        let mut bytes = Vec::new();
        loop {
            let b = self.read_u8()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
            if encoding == Encoding::Utf8 {
                for _ in 0..utf8_continuation_len(b) {
                    bytes.push(self.read_u8()?);
                }
            }
        }
        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

/// Continuation bytes following a UTF-8 lead byte
fn utf8_continuation_len(lead: u8) -> usize {
    match lead {
        0xF0..=0xFF => 3,
        0xE0..=0xEF => 2,
        0xC0..=0xDF => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn event_fields(metadata: &str, name: &str) -> Arc<StructType> {
        let m = Metadata::from_text(metadata).unwrap();
        let stream = m.stream(0).unwrap();
        let class = stream.events().find(|e| e.name == name).unwrap();
        class.fields.clone().unwrap()
    }

    const TYPES: &str = "
        typealias integer { size = 8; align = 8; signed = false; } := u8;
        typealias integer { size = 32; align = 8; signed = false; } := u32;
        typealias integer { size = 64; align = 8; signed = false; } := u64;
        typealias integer { size = 5; align = 1; signed = false; } := u5;
        typealias integer { size = 27; align = 1; signed = false; } := u27;
        trace { byte_order = le; };
        stream { id = 0; };
    ";

    #[test]
    fn byte_aligned_integer() {
        let schema = event_fields(
            &format!("{TYPES} event {{ name = \"a\"; fields := struct {{ u32 foo; }}; }};"),
            "a",
        );
        let bytes = [0x01, 0x00, 0x00, 0x00];
        let mut c = BitCursor::new(&bytes[..]);
        let v = c.read_struct(&schema).unwrap();
        assert_eq!(v.get("foo"), Some(&Value::U32(1)));
        assert_eq!(v.get("foo").and_then(Value::as_u64), Some(1));
        assert_eq!(c.position_bits(), 32);
    }

    #[test]
    fn enum_labels_and_unmapped_values() {
        let schema = event_fields(
            &format!(
                "{TYPES} event {{ name = \"e\"; fields := struct {{
                    enum : u32 {{ red = 0, green = 1, blue = 2 ... 5 }} color; }}; }};"
            ),
            "e",
        );
        let bytes = 3_u32.to_le_bytes();
        let mut c = BitCursor::new(&bytes[..]);
        let v = c.read_struct(&schema).unwrap();
        let color = v.get("color").unwrap();
        assert_eq!(color.label().map(|l| &**l), Some("blue"));
        assert_eq!(color.as_u64(), Some(3));

        let bytes = 6_u32.to_le_bytes();
        let mut c = BitCursor::new(&bytes[..]);
        let err = c.read_struct(&schema).unwrap_err();
        assert!(matches!(err, Error::EnumValueUnmapped { value: 6 }));
        assert!(err.is_decode_invariant());
    }

    const HEADER: &str = "
        event { name = \"h\"; fields := struct {
            enum : u5 { compact = 0 ... 30, extended = 31 } id;
            variant <id> {
                struct { u27 timestamp; } compact;
                struct { u32 id; u64 timestamp; } extended;
            } v;
            u8 after;
        }; };
    ";

    #[test]
    fn variant_reads_only_the_selected_option() {
        let schema = event_fields(&format!("{TYPES}{HEADER}"), "h");

        // compact: id = 3, timestamp = 1000, then `after` on the next byte
        let word: u32 = 3 | (1000 << 5);
        let mut bytes = word.to_le_bytes().to_vec();
        bytes.push(0x7F);
        let mut c = BitCursor::new(bytes.as_slice());
        let v = c.read_struct(&schema).unwrap();
        assert_eq!(v.get("id").and_then(Value::as_u64), Some(3));
        let variant = v.get("v").unwrap();
        assert_eq!(variant.label().map(|l| &**l), Some("compact"));
        let inner = variant.as_struct().unwrap();
        assert_eq!(inner.get("timestamp"), Some(&Value::U32(1000)));
        assert_eq!(v.get("after"), Some(&Value::U8(0x7F)));
        assert_eq!(v.field("after").unwrap().1.bit_offset, 32);
        assert_eq!(c.position_bits(), 40);

        // extended: id = 31, padding to the next byte, u32 id, u64 timestamp
        let mut bytes = vec![31_u8];
        bytes.extend_from_slice(&70_000_u32.to_le_bytes());
        bytes.extend_from_slice(&123_456_789_u64.to_le_bytes());
        bytes.push(0x01);
        let mut c = BitCursor::new(bytes.as_slice());
        let v = c.read_struct(&schema).unwrap();
        let inner = v.get("v").unwrap().as_struct().unwrap();
        assert_eq!(inner.get("id"), Some(&Value::U32(70_000)));
        assert_eq!(inner.get("timestamp"), Some(&Value::U64(123_456_789)));
        assert_eq!(c.position_bits(), 8 * 14);
    }

    #[test]
    fn sequences_strings_and_char_arrays() {
        let schema = event_fields(
            &format!(
                "{TYPES} event {{ name = \"s\"; fields := struct {{
                    u8 len;
                    u8 data[len];
                    string msg;
                    integer {{ size = 8; align = 8; signed = 1; encoding = UTF8; }} name[6];
                    string {{ encoding = ASCII; }} tail;
                }}; }};"
            ),
            "s",
        );
        let mut bytes = vec![3, 0xAA, 0xBB, 0xCC];
        bytes.extend_from_slice("héllo\0".as_bytes());
        bytes.extend_from_slice(b"abc\0\0\0");
        bytes.extend_from_slice(b"end\0");
        let mut c = BitCursor::new(bytes.as_slice());
        let v = c.read_struct(&schema).unwrap();
        match v.get("data").unwrap() {
            Value::RawArray(a) => assert_eq!(a.as_bytes(), Some(&[0xAA, 0xBB, 0xCC][..])),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(v.get("msg").and_then(Value::as_str), Some("héllo"));
        assert_eq!(v.get("name").and_then(Value::to_text).as_deref(), Some("abc"));
        assert_eq!(v.get("tail").and_then(Value::as_str), Some("end"));
        assert_eq!(c.position_bits(), bytes.len() as u64 * 8);
    }

    #[test]
    fn dynamic_elements_and_missing_length() {
        let schema = event_fields(
            &format!(
                "{TYPES} event {{ name = \"d\"; fields := struct {{
                    u8 n;
                    string names[n];
                }}; }};"
            ),
            "d",
        );
        let bytes = b"\x02ab\0c\0";
        let mut c = BitCursor::new(&bytes[..]);
        let v = c.read_struct(&schema).unwrap();
        assert_eq!(
            v.get("names"),
            Some(&Value::Array(vec![
                Value::String("ab".into()),
                Value::String("c".into())
            ]))
        );

        let schema = event_fields(
            &format!(
                "{TYPES} event {{ name = \"m\"; fields := struct {{ u8 data[missing]; }}; }};"
            ),
            "m",
        );
        let mut c = BitCursor::new(&bytes[..]);
        assert!(matches!(
            c.read_struct(&schema),
            Err(Error::LengthFieldNotFound(n)) if n == "missing"
        ));
    }

    #[test]
    fn struct_elements_with_padded_inner_arrays() {
        let schema = event_fields(
            &format!(
                "{TYPES} event {{ name = \"n\"; fields := struct {{
                    struct {{
                        integer {{ size = 5; align = 8; signed = false; }} a[3];
                        integer {{ size = 3; align = 1; signed = false; }} b;
                    }} s[2];
                    u8 after;
                }}; }};"
            ),
            "n",
        );
        // a[2] ends at bit 21 so b fills the rest of the third byte
        let bytes = [1, 2, 3 | (7 << 5), 4, 5, 6 | (2 << 5), 0xEE];
        let mut c = BitCursor::new(&bytes[..]);
        let v = c.read_struct(&schema).unwrap();
        assert_eq!(c.position_bits(), 56);
        assert_eq!(v.get("after"), Some(&Value::U8(0xEE)));

        let s = match v.get("s").unwrap() {
            Value::RawArray(a) => a,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(s.len(), 2);
        let elements = (0..2)
            .map(|i| s.get(i).unwrap().unwrap())
            .collect::<Vec<_>>();
        let ints = |v: &Value| match v {
            Value::RawArray(a) => (0..a.len())
                .map(|i| a.get(i).unwrap().unwrap().as_u64().unwrap())
                .collect::<Vec<_>>(),
            other => panic!("unexpected {other:?}"),
        };
        let first = elements[0].as_struct().unwrap();
        assert_eq!(ints(first.get("a").unwrap()), vec![1, 2, 3]);
        assert_eq!(first.get("b").and_then(Value::as_u64), Some(7));
        let second = elements[1].as_struct().unwrap();
        assert_eq!(ints(second.get("a").unwrap()), vec![4, 5, 6]);
        assert_eq!(second.get("b").and_then(Value::as_u64), Some(2));
    }

    #[test]
    fn layout_is_deterministic() {
        let schema = event_fields(
            &format!(
                "{TYPES} event {{ name = \"l\"; fields := struct {{
                    u5 a; u32 b; u5 c; u27 d; u64 e;
                }}; }};"
            ),
            "l",
        );
        let bytes: Vec<u8> = (0..32).collect();
        let offsets = |bytes: &[u8]| {
            let mut c = BitCursor::new(bytes);
            let v = c.read_struct(&schema).unwrap();
            v.iter().map(|(_, fv)| fv.bit_offset).collect::<Vec<_>>()
        };
        let first = offsets(&bytes);
        assert_eq!(first, vec![0, 8, 40, 45, 72]);
        assert_eq!(first, offsets(&bytes));
    }

    proptest! {
        #[test]
        fn enum_lookup_matches_declared_ranges(value in 0_u32..16) {
            let schema = event_fields(
                &format!(
                    "{TYPES} event {{ name = \"p\"; fields := struct {{
                        enum : u32 {{ low = 0 ... 3, mid = 4 ... 9, high = 10 ... 12 }} x; }}; }};"
                ),
                "p",
            );
            let bytes = value.to_le_bytes();
            let mut c = BitCursor::new(&bytes[..]);
            let expected = match value {
                0..=3 => Some("low"),
                4..=9 => Some("mid"),
                10..=12 => Some("high"),
                _ => None,
            };
            match (c.read_struct(&schema), expected) {
                (Ok(v), Some(label)) => {
                    prop_assert_eq!(v.get("x").and_then(Value::label).map(|l| l.to_string()), Some(label.to_owned()));
                }
                (Err(Error::EnumValueUnmapped { value: v }), None) => prop_assert_eq!(v, i128::from(value)),
                (other, _) => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}
