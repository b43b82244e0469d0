//! The in-memory model of CTF metadata types.
//!
//! Types come out of the parser holding [`MetadataType::UnresolvedRef`] nodes for every
//! alias, struct or enum referenced by name. The [`Resolver`] replaces them with the
//! concrete type they name. Once resolved, a type tree is immutable and shared through
//! `Arc`s between every stream and event that uses it.

use crate::error::Error;
use derive_more::Display;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum ByteOrder {
    #[display(fmt = "le")]
    LittleEndian,
    #[display(fmt = "be")]
    BigEndian,
}

impl ByteOrder {
    /// Parses a `byte_order` property value.
    ///
    /// `Ok(None)` means `native`, i.e. the trace's byte order.
    pub(crate) fn parse(s: &str) -> Result<Option<Self>, ()> {
        match s {
            "le" | "little" | "little_endian" => Ok(Some(ByteOrder::LittleEndian)),
            "be" | "big" | "big_endian" | "network" => Ok(Some(ByteOrder::BigEndian)),
            "native" => Ok(None),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum Encoding {
    #[display(fmt = "none")]
    None,
    #[display(fmt = "ASCII")]
    Ascii,
    #[display(fmt = "UTF8")]
    Utf8,
}

impl Encoding {
    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(Encoding::None),
            "ascii" => Some(Encoding::Ascii),
            "utf8" | "utf-8" => Some(Encoding::Utf8),
            _ => None,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct IntegerType {
    /// Size in bits, 1..=64
    pub size: u32,
    /// Alignment in bits
    pub align: u32,
    pub signed: bool,
    /// `None` until linked, meaning the trace's native byte order
    pub byte_order: Option<ByteOrder>,
    pub encoding: Encoding,
    pub base: u32,
    /// Clock mapping, e.g. `clock.monotonic.value`
    pub map: Option<String>,
}

impl IntegerType {
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order.unwrap_or(ByteOrder::LittleEndian)
    }

    /// 8-bit integers carrying an encoding are characters
    pub fn is_text(&self) -> bool {
        self.size == 8 && self.encoding != Encoding::None
    }

    /// The clock name out of a `clock.<name>.value` mapping
    pub fn clock_name(&self) -> Option<&str> {
        let map = self.map.as_deref()?;
        let rest = map.strip_prefix("clock.")?;
        Some(rest.strip_suffix(".value").unwrap_or(rest))
    }
}

/// Floating point fields are modeled but their values are not decoded.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FloatType {
    pub exp_dig: u32,
    pub mant_dig: u32,
    pub align: u32,
    pub byte_order: Option<ByteOrder>,
}

impl FloatType {
    pub fn size(&self) -> u32 {
        self.exp_dig + self.mant_dig
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StringType {
    pub encoding: Encoding,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Field {
    pub name: String,
    pub ty: MetadataType,
}

impl Field {
    pub fn new<S: Into<String>>(name: S, ty: MetadataType) -> Self {
        Field {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct StructType {
    fields: Vec<Field>,
    declared_align: u32,
    alignment: u32,
    static_size: Option<u64>,
    resolved: bool,
}

impl StructType {
    /// `declared_align` is the optional trailing `align(N)`, 1 when absent
    pub fn new(fields: Vec<Field>, declared_align: u32) -> Self {
        Self::build(fields, declared_align, false)
    }

    fn build(fields: Vec<Field>, declared_align: u32, resolved: bool) -> Self {
        let declared_align = declared_align.max(1);
        let alignment = fields
            .iter()
            .map(|f| f.ty.align())
            .fold(declared_align, u32::max);
        let mut offset = 0_u64;
        let mut static_size = Some(0_u64);
        for f in fields.iter() {
            match f.ty.static_size() {
                Some(size) => {
                    offset = align_up(offset, f.ty.align()) + size;
                    static_size = Some(offset);
                }
                None => {
                    static_size = None;
                    break;
                }
            }
        }
        StructType {
            fields,
            declared_align,
            alignment,
            static_size,
            resolved,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    pub fn align(&self) -> u32 {
        self.alignment
    }

    pub fn static_size(&self) -> Option<u64> {
        self.static_size
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ArrayLength {
    Fixed(u64),
    /// Name of a field decoded before the array
    Field(String),
}

#[derive(Clone, PartialEq, Debug)]
pub struct ArrayType {
    pub element: Box<MetadataType>,
    pub length: ArrayLength,
}

impl ArrayType {
    /// Distance in bits between two consecutive elements, if the element has a static size
    pub fn stride(&self) -> Option<u64> {
        self.element
            .static_size()
            .map(|size| align_up(size, self.element.align()))
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EnumMapping {
    pub label: Arc<str>,
    pub begin: i128,
    pub end: i128,
}

#[derive(Clone, PartialEq, Debug)]
pub struct EnumType {
    pub base: Box<MetadataType>,
    pub mappings: Vec<EnumMapping>,
}

impl EnumType {
    /// First mapping whose inclusive range holds `value`
    pub fn label_for(&self, value: i128) -> Option<&Arc<str>> {
        self.mappings
            .iter()
            .find(|m| m.begin <= value && value <= m.end)
            .map(|m| &m.label)
    }

    #[cfg(test)]
    pub(crate) fn value_of(&self, label: &str) -> Option<i128> {
        self.mappings
            .iter()
            .find(|m| &*m.label == label)
            .map(|m| m.begin)
    }

    pub fn integer(&self) -> Option<&IntegerType> {
        match self.base.as_ref() {
            MetadataType::Integer(i) => Some(i),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct VariantType {
    /// Name of the enum field selecting the option
    pub tag: Option<String>,
    pub options: Vec<Field>,
    resolved: bool,
}

impl VariantType {
    pub fn new(tag: Option<String>, options: Vec<Field>) -> Self {
        VariantType {
            tag,
            options,
            resolved: false,
        }
    }

    pub fn option(&self, label: &str) -> Option<(usize, &Field)> {
        self.options
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == label)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum MetadataType {
    Integer(IntegerType),
    Float(FloatType),
    String(StringType),
    Struct(Arc<StructType>),
    Array(ArrayType),
    Enum(EnumType),
    Variant(Arc<VariantType>),
    /// A named reference, only present before linking
    UnresolvedRef(String),
}

impl MetadataType {
    /// Alignment in bits
    pub fn align(&self) -> u32 {
        match self {
            MetadataType::Integer(i) => i.align,
            MetadataType::Float(f) => f.align,
            MetadataType::String(_) => 8,
            MetadataType::Struct(s) => s.align(),
            MetadataType::Array(a) => a.element.align(),
            MetadataType::Enum(e) => e.base.align(),
            MetadataType::Variant(_) | MetadataType::UnresolvedRef(_) => 1,
        }
    }

    /// Size in bits, `None` when it depends on the data
    pub fn static_size(&self) -> Option<u64> {
        match self {
            MetadataType::Integer(i) => Some(u64::from(i.size)),
            MetadataType::Float(f) => Some(u64::from(f.size())),
            MetadataType::String(_) => None,
            MetadataType::Struct(s) => s.static_size(),
            MetadataType::Array(a) => match a.length {
                // The last element's trailing padding is not part of the array
                ArrayLength::Fixed(0) => Some(0),
                ArrayLength::Fixed(len) => a.stride().and_then(|stride| {
                    stride
                        .checked_mul(len - 1)?
                        .checked_add(a.element.static_size()?)
                }),
                ArrayLength::Field(_) => None,
            },
            MetadataType::Enum(e) => e.base.static_size(),
            MetadataType::Variant(_) | MetadataType::UnresolvedRef(_) => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Arc<StructType>> {
        match self {
            MetadataType::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Resolves every named reference against `aliases`, assuming a little-endian trace
    pub fn resolve_reference(
        &self,
        aliases: &HashMap<String, MetadataType>,
    ) -> Result<MetadataType, Error> {
        Resolver::new(aliases, ByteOrder::LittleEndian).resolve(self)
    }
}

pub(crate) fn align_up(offset: u64, align: u32) -> u64 {
    let align = u64::from(align.max(1));
    offset.div_ceil(align) * align
}

/// Replaces [`MetadataType::UnresolvedRef`] nodes with the types they name.
///
/// Named types are resolved once and the result is reused, so a struct referenced from
/// several places ends up as a single shared `Arc`.
pub(crate) struct Resolver<'a> {
    aliases: &'a HashMap<String, MetadataType>,
    resolved: HashMap<String, MetadataType>,
    in_progress: Vec<String>,
    native: ByteOrder,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(aliases: &'a HashMap<String, MetadataType>, native: ByteOrder) -> Self {
        Resolver {
            aliases,
            resolved: Default::default(),
            in_progress: Default::default(),
            native,
        }
    }

    pub(crate) fn resolve(&mut self, ty: &MetadataType) -> Result<MetadataType, Error> {
        Ok(match ty {
            MetadataType::UnresolvedRef(name) => self.resolve_name(name)?,
            MetadataType::Integer(i) => MetadataType::Integer(IntegerType {
                byte_order: Some(i.byte_order.unwrap_or(self.native)),
                ..i.clone()
            }),
            MetadataType::Float(f) => MetadataType::Float(FloatType {
                byte_order: Some(f.byte_order.unwrap_or(self.native)),
                ..f.clone()
            }),
            MetadataType::String(s) => MetadataType::String(s.clone()),
            MetadataType::Struct(s) if s.is_resolved() => MetadataType::Struct(s.clone()),
            MetadataType::Struct(s) => {
                let fields = self.resolve_fields(s.fields())?;
                MetadataType::Struct(Arc::new(StructType::build(
                    fields,
                    s.declared_align,
                    true,
                )))
            }
            MetadataType::Array(a) => MetadataType::Array(ArrayType {
                element: Box::new(self.resolve(&a.element)?),
                length: a.length.clone(),
            }),
            MetadataType::Enum(e) => {
                let base = self.resolve(&e.base)?;
                if !matches!(base, MetadataType::Integer(_)) {
                    return Err(Error::InvalidType(format!(
                        "enumeration base type must be an integer, found {base:?}"
                    )));
                }
                MetadataType::Enum(EnumType {
                    base: Box::new(base),
                    mappings: e.mappings.clone(),
                })
            }
            MetadataType::Variant(v) if v.is_resolved() => MetadataType::Variant(v.clone()),
            MetadataType::Variant(v) => MetadataType::Variant(Arc::new(VariantType {
                tag: v.tag.clone(),
                options: self.resolve_fields(&v.options)?,
                resolved: true,
            })),
        })
    }

    /// Resolves a type that must turn out to be a struct
    pub(crate) fn resolve_struct(
        &mut self,
        what: &str,
        ty: &MetadataType,
    ) -> Result<Arc<StructType>, Error> {
        match self.resolve(ty)? {
            MetadataType::Struct(s) => Ok(s),
            other => Err(Error::InvalidType(format!(
                "{what} must be a structure, found {other:?}"
            ))),
        }
    }

    fn resolve_fields(&mut self, fields: &[Field]) -> Result<Vec<Field>, Error> {
        fields
            .iter()
            .map(|f| Ok(Field::new(f.name.clone(), self.resolve(&f.ty)?)))
            .collect()
    }

    fn resolve_name(&mut self, name: &str) -> Result<MetadataType, Error> {
        if let Some(ty) = self.resolved.get(name) {
            return Ok(ty.clone());
        }
        if self.in_progress.iter().any(|n| n == name) {
            return Err(Error::CyclicType(name.to_owned()));
        }
        let target = self
            .aliases
            .get(name)
            .ok_or_else(|| Error::UnresolvedType(name.to_owned()))?;
        self.in_progress.push(name.to_owned());
        let resolved = self.resolve(target);
        self.in_progress.pop();
        let resolved = resolved?;
        self.resolved.insert(name.to_owned(), resolved.clone());
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn int(size: u32, align: u32, signed: bool) -> MetadataType {
        MetadataType::Integer(IntegerType {
            size,
            align,
            signed,
            byte_order: None,
            encoding: Encoding::None,
            base: 10,
            map: None,
        })
    }

    #[test]
    fn struct_alignment_is_max_of_fields() {
        let s = StructType::new(
            vec![Field::new("a", int(8, 8, false)), Field::new("b", int(32, 32, false))],
            1,
        );
        assert_eq!(s.align(), 32);
        // a @ 0, b @ 32
        assert_eq!(s.static_size(), Some(64));

        let s = StructType::new(vec![Field::new("a", int(8, 8, false))], 64);
        assert_eq!(s.align(), 64);
    }

    #[test]
    fn indeterminate_size_propagates() {
        let inner = MetadataType::Struct(Arc::new(StructType::new(
            vec![
                Field::new("len", int(8, 8, false)),
                Field::new(
                    "s",
                    MetadataType::String(StringType {
                        encoding: Encoding::Utf8,
                    }),
                ),
            ],
            1,
        )));
        assert_eq!(inner.static_size(), None);
        let outer = StructType::new(
            vec![Field::new("x", int(8, 8, false)), Field::new("inner", inner)],
            1,
        );
        assert_eq!(outer.static_size(), None);

        let seq = MetadataType::Array(ArrayType {
            element: Box::new(int(8, 8, false)),
            length: ArrayLength::Field("len".to_owned()),
        });
        assert_eq!(seq.static_size(), None);
        let arr = MetadataType::Array(ArrayType {
            element: Box::new(int(5, 1, false)),
            length: ArrayLength::Fixed(3),
        });
        assert_eq!(arr.static_size(), Some(15));

        // Padding after the last element is not counted
        let arr = MetadataType::Array(ArrayType {
            element: Box::new(int(5, 8, false)),
            length: ArrayLength::Fixed(3),
        });
        assert_eq!(arr.static_size(), Some(21));
        let elem = StructType::new(
            vec![Field::new("a", arr), Field::new("b", int(3, 1, false))],
            1,
        );
        assert_eq!(elem.static_size(), Some(24));
        let empty = MetadataType::Array(ArrayType {
            element: Box::new(int(5, 8, false)),
            length: ArrayLength::Fixed(0),
        });
        assert_eq!(empty.static_size(), Some(0));
    }

    #[test]
    fn resolves_aliases_and_shares_structs() {
        let mut aliases = HashMap::new();
        aliases.insert("uint8_t".to_owned(), int(8, 8, false));
        let header = MetadataType::Struct(Arc::new(StructType::new(
            vec![Field::new(
                "id",
                MetadataType::UnresolvedRef("uint8_t".to_owned()),
            )],
            1,
        )));
        aliases.insert("struct header".to_owned(), header);

        let mut resolver = Resolver::new(&aliases, ByteOrder::BigEndian);
        let a = resolver
            .resolve_struct("a", &MetadataType::UnresolvedRef("struct header".to_owned()))
            .unwrap();
        let b = resolver
            .resolve_struct("b", &MetadataType::UnresolvedRef("struct header".to_owned()))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_resolved());
        match &a.fields()[0].ty {
            MetadataType::Integer(i) => assert_eq!(i.byte_order, Some(ByteOrder::BigEndian)),
            other => panic!("unexpected {other:?}"),
        }

        // Resolving an already resolved tree is a no-op
        let again = resolver.resolve(&MetadataType::Struct(a.clone())).unwrap();
        assert_eq!(again, MetadataType::Struct(a));
    }

    #[test]
    fn unresolved_and_cyclic_references() {
        let mut aliases = HashMap::new();
        assert!(matches!(
            MetadataType::UnresolvedRef("nope".to_owned()).resolve_reference(&aliases),
            Err(Error::UnresolvedType(n)) if n == "nope"
        ));

        aliases.insert(
            "struct loop".to_owned(),
            MetadataType::Struct(Arc::new(StructType::new(
                vec![Field::new(
                    "again",
                    MetadataType::UnresolvedRef("struct loop".to_owned()),
                )],
                1,
            ))),
        );
        assert!(matches!(
            MetadataType::UnresolvedRef("struct loop".to_owned()).resolve_reference(&aliases),
            Err(Error::CyclicType(_))
        ));
    }

    #[test]
    fn enum_label_lookup() {
        let e = EnumType {
            base: Box::new(int(32, 8, false)),
            mappings: vec![
                EnumMapping {
                    label: "red".into(),
                    begin: 0,
                    end: 0,
                },
                EnumMapping {
                    label: "blue".into(),
                    begin: 2,
                    end: 5,
                },
            ],
        };
        assert_eq!(e.label_for(0).map(|l| &**l), Some("red"));
        assert_eq!(e.label_for(4).map(|l| &**l), Some("blue"));
        assert_eq!(e.label_for(1), None);
        assert_eq!(e.value_of("blue"), Some(2));
    }

    #[test]
    fn clock_mapping_name() {
        let i = IntegerType {
            size: 27,
            align: 1,
            signed: false,
            byte_order: None,
            encoding: Encoding::None,
            base: 10,
            map: Some("clock.monotonic.value".to_owned()),
        };
        assert_eq!(i.clock_name(), Some("monotonic"));
    }
}
