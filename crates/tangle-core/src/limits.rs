//! Input validation limits for resource protection

/// Maximum length for edge types (128 chars)
pub const MAX_EDGE_TYPE_LEN: usize = 128;

/// Maximum length for id kinds (64 chars)
pub const MAX_KIND_LEN: usize = 64;

/// Maximum properties per entity (1000)
pub const MAX_PROPERTIES_PER_ENTITY: usize = 1000;

/// Maximum serialized length for a single property value (64KB)
pub const MAX_PROPERTY_VALUE_LEN: usize = 64 * 1024;

/// Maximum edges per query page (1000)
pub const MAX_PAGE_SIZE: usize = 1000;

/// Validation error type
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EdgeTypeTooLong { len: usize, max: usize },
    KindTooLong { len: usize, max: usize },
    TooManyProperties { count: usize, max: usize },
    PropertyValueTooLong { field: String, len: usize, max: usize },
    PageSizeTooLarge { size: usize, max: usize },
    EmptyEdgeType,
    EmptyKind,
    ZeroPageSize,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EdgeTypeTooLong { len, max } => {
                write!(f, "Edge type too long: {} chars (max {})", len, max)
            }
            Self::KindTooLong { len, max } => {
                write!(f, "Id kind too long: {} chars (max {})", len, max)
            }
            Self::TooManyProperties { count, max } => {
                write!(f, "Too many properties: {} (max {})", count, max)
            }
            Self::PropertyValueTooLong { field, len, max } => {
                write!(f, "Property '{}' too long: {} bytes (max {})", field, len, max)
            }
            Self::PageSizeTooLarge { size, max } => {
                write!(f, "Page size too large: {} (max {})", size, max)
            }
            Self::EmptyEdgeType => write!(f, "Edge type cannot be empty"),
            Self::EmptyKind => write!(f, "Id kind cannot be empty"),
            Self::ZeroPageSize => write!(f, "Page size must be at least 1"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate an edge type
pub fn validate_edge_type(edge_type: &str) -> Result<(), ValidationError> {
    if edge_type.is_empty() {
        return Err(ValidationError::EmptyEdgeType);
    }
    if edge_type.len() > MAX_EDGE_TYPE_LEN {
        return Err(ValidationError::EdgeTypeTooLong {
            len: edge_type.len(),
            max: MAX_EDGE_TYPE_LEN,
        });
    }
    Ok(())
}

/// Validate an id kind
pub fn validate_kind(kind: &str) -> Result<(), ValidationError> {
    if kind.is_empty() {
        return Err(ValidationError::EmptyKind);
    }
    if kind.len() > MAX_KIND_LEN {
        return Err(ValidationError::KindTooLong {
            len: kind.len(),
            max: MAX_KIND_LEN,
        });
    }
    Ok(())
}

/// Validate the serialized length of one property value
pub fn validate_property_value(field: &str, len: usize) -> Result<(), ValidationError> {
    if len > MAX_PROPERTY_VALUE_LEN {
        return Err(ValidationError::PropertyValueTooLong {
            field: field.to_string(),
            len,
            max: MAX_PROPERTY_VALUE_LEN,
        });
    }
    Ok(())
}

/// Validate a property count
pub fn validate_property_count(count: usize) -> Result<(), ValidationError> {
    if count > MAX_PROPERTIES_PER_ENTITY {
        return Err(ValidationError::TooManyProperties {
            count,
            max: MAX_PROPERTIES_PER_ENTITY,
        });
    }
    Ok(())
}

/// Validate a query page size
pub fn validate_page_size(size: usize) -> Result<(), ValidationError> {
    if size == 0 {
        return Err(ValidationError::ZeroPageSize);
    }
    if size > MAX_PAGE_SIZE {
        return Err(ValidationError::PageSizeTooLarge {
            size,
            max: MAX_PAGE_SIZE,
        });
    }
    Ok(())
}
