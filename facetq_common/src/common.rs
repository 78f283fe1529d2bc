use num_derive::FromPrimitive;

/// Discriminant for packets stored in a session recording
#[derive(FromPrimitive, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketIDs {
    Marker = 1,
    Exchange = 2,
    Failure = 3,

    Unknown = 255,
}

impl serde::Serialize for PacketIDs {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(*self as u8)
    }
}

impl std::fmt::Display for PacketIDs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

impl PacketIDs {
    pub fn from_id(id: u8) -> Self {
        num_traits::FromPrimitive::from_u8(id).unwrap_or(PacketIDs::Unknown)
    }
}

/// Default page size for a freshly mounted view
pub const DEFAULT_PAGE_LIMIT: u64 = 25;

/// Number of facet values shown before a view is expanded
pub const COLLAPSED_FACET_COUNT: usize = 5;

/// Commonly used strings of the query backend contract.
pub mod strings {
    pub const FACET_TYPE_ENUMERATION: &str = "enumeration";
    pub const FACET_TYPE_RANGE: &str = "range";

    /// Value the backend uses for cells without an annotation
    pub const NULL_FACET_VALUE: &str = "org.sagebionetworks.UNDEFINED_NULL_NOTSET";
    pub const NULL_FACET_DISPLAY: &str = "unannotated";

    pub const DEFAULT_UNIT_DESCRIPTION: &str = "files";
}
