use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Trace metadata invalid: {message}. In declaration `{span}`")]
    MetadataSyntax { message: String, span: String },

    #[error("Trace metadata invalid: type '{0}' was never declared")]
    UnresolvedType(String),

    #[error("Trace metadata invalid: type '{0}' refers to itself")]
    CyclicType(String),

    #[error("Trace metadata invalid: {0}")]
    InvalidType(String),

    #[error("Unsupported CTF feature: {0}")]
    UnsupportedFeature(String),

    #[error("Not a valid CTF magic number (found 0x{found:08X}) at channel offset {offset}")]
    InvalidMagic { found: u64, offset: u64 },

    #[error("Invalid packet sizes at channel offset {offset}: header {header_bits} bits, content {content_bits} bits, packet {packet_bits} bits")]
    InvalidPacketSize {
        offset: u64,
        header_bits: u64,
        content_bits: u64,
        packet_bits: u64,
    },

    #[error("Packet references stream ID {0} which isn't declared in the metadata")]
    UnknownStream(u64),

    #[error("Event ID {id} isn't declared for stream ID {stream_id}")]
    UnknownEvent { stream_id: u64, id: u64 },

    #[error("Enumeration value {value} has no matching label")]
    EnumValueUnmapped { value: i128 },

    #[error("Variant tag field '{0}' was not decoded before the variant")]
    VariantTagNotFound(String),

    #[error("Variant tagged by '{tag}' has no option for label '{label}'")]
    VariantOptionNotFound { tag: String, label: String },

    #[error("Array length field '{0}' was not decoded before the array")]
    LengthFieldNotFound(String),

    #[error("Field '{0}' doesn't hold an integer value")]
    NotAnInteger(String),

    #[error("Event at channel offset {offset} overruns the packet content")]
    ContentOverrun { offset: u64 },

    #[error("Trace channel truncated at offset {offset}")]
    Truncated { offset: u64 },

    #[error("Trace input '{0}' doesn't contain a metadata entry")]
    MissingMetadata(String),

    #[error(
        "Event attribute key prefix cannot start or end with the reserved delimeter '.' character"
    )]
    InvalidAttrKeyPrefix,

    #[error(transparent)]
    Uuid(#[from] uuid::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Decode errors that describe malformed event data rather than a broken source
    pub fn is_decode_invariant(&self) -> bool {
        matches!(
            self,
            Error::EnumValueUnmapped { .. }
                | Error::VariantTagNotFound(_)
                | Error::VariantOptionNotFound { .. }
                | Error::LengthFieldNotFound(_)
                | Error::NotAnInteger(_)
                | Error::UnknownEvent { .. }
        )
    }
}
