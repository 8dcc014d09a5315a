//! Generic EBML element framing (spec L3).
//!
//! Everything here works on whole elements — id, size, and body — without
//! knowing what the id means. [`crate::schema`] builds typed field readers
//! on top of [`ebml_element_header`] and [`ebml_vint`].

use crate::vint::{self, VIntError, VIntMode, VIntValue};

pub type EbmlId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementSize {
    Known(u64),
    Unknown,
}

impl ElementSize {
    /// Most element kinds can't have an unknown size; only `Segment` and
    /// `Cluster` may declare one in spec'd Matroska. Callers that need a
    /// concrete byte count call this and propagate the error otherwise.
    pub fn require(self) -> Result<u64, EbmlError> {
        match self {
            ElementSize::Known(n) => Ok(n),
            ElementSize::Unknown => Err(EbmlError::UnknownSize),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum EbmlError {
    #[error("expected element {0:#x}, found {1:#x} (size {2:?})")]
    UnexpectedElement(EbmlId, EbmlId, ElementSize),

    #[error("element id occupies more than 4 bytes")]
    IdTooWide,

    #[error("element declared an unknown size where a known size is required")]
    UnknownSize,

    #[error("{0}")]
    Vint(#[from] VIntError),

    #[error("nom: {0:?}")]
    Nom(nom::error::ErrorKind),
}

impl nom::error::ParseError<&[u8]> for EbmlError {
    fn from_error_kind(_input: &[u8], kind: nom::error::ErrorKind) -> Self {
        EbmlError::Nom(kind)
    }

    fn append(_input: &[u8], _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

fn to_nom_err(e: VIntError) -> nom::Err<EbmlError> {
    match e {
        VIntError::Truncated(n) => nom::Err::Incomplete(nom::Needed::new(n)),
        other => nom::Err::Error(EbmlError::Vint(other)),
    }
}

fn ebml_id(input: &[u8]) -> nom::IResult<&[u8], EbmlId, EbmlError> {
    let (decoded, consumed) = vint::decode(input, VIntMode::Raw).map_err(to_nom_err)?;
    let value = decoded.value.as_u64().expect("raw mode always yields Unsigned");
    if decoded.width > 4 || value > u32::MAX as u64 {
        return Err(nom::Err::Error(EbmlError::IdTooWide));
    }
    Ok((&input[consumed..], value as u32))
}

fn ebml_element_size(input: &[u8]) -> nom::IResult<&[u8], ElementSize, EbmlError> {
    let (decoded, consumed) = vint::decode(input, VIntMode::Value).map_err(to_nom_err)?;
    let size = match decoded.value {
        VIntValue::Unknown => ElementSize::Unknown,
        VIntValue::Unsigned(v) => ElementSize::Known(v),
        VIntValue::Signed(_) => unreachable!("value mode never yields Signed"),
    };
    Ok((&input[consumed..], size))
}

/// Reads one element's `(id, size)` header. Curried to match the call-site
/// style the rest of the parsing layer uses for every other combinator here.
pub fn ebml_element_header() -> impl Fn(&[u8]) -> nom::IResult<&[u8], (EbmlId, ElementSize), EbmlError>
{
    |input: &[u8]| {
        let (input, id) = ebml_id(input)?;
        let (input, size) = ebml_element_size(input)?;
        Ok((input, (id, size)))
    }
}

/// Reads a plain VINT in value mode, for fields (like a block's track
/// number) that use the VINT wire encoding outside of element framing.
pub fn ebml_vint(input: &[u8]) -> nom::IResult<&[u8], u64, EbmlError> {
    let (decoded, consumed) = vint::decode(input, VIntMode::Value).map_err(to_nom_err)?;
    let value = match decoded.value {
        VIntValue::Unsigned(v) => v,
        VIntValue::Unknown => (1u64 << (7 * decoded.width as u32)) - 1,
        VIntValue::Signed(_) => unreachable!("value mode never yields Signed"),
    };
    Ok((&input[consumed..], value))
}

pub(crate) fn slice_dist(a: &[u8], b: &[u8]) -> u64 {
    let a = a.as_ptr() as u64;
    let b = b.as_ptr() as u64;
    if a > b {
        a - b
    } else {
        b - a
    }
}

/// A generic, untyped EBML subtree. Used for elements outside the modeled
/// schema (Chapters, Attachments, Tags, ContentEncodings) so the reader can
/// walk past them without a dedicated type.
#[derive(Debug, Clone)]
pub enum EbmlNode<'a> {
    Master(EbmlId, Vec<EbmlNode<'a>>),
    Binary(EbmlId, &'a [u8]),
}

/// Walks `input` as a sequence of sibling elements until `total_size` bytes
/// are consumed, recursing into every element as a generic [`EbmlNode`].
///
/// Oversized or unknown-size children are defensive stopping points: rather
/// than fail the whole subtree, the walk ends early and returns what it
/// collected so far.
pub fn read_tree(id: EbmlId, input: &[u8], total_size: u64) -> (EbmlNode<'_>, u64) {
    let total_size = total_size.min(input.len() as u64);
    let bounded = &input[..total_size as usize];
    let mut cursor = bounded;
    let mut consumed = 0u64;
    let mut children = Vec::new();

    while !cursor.is_empty() {
        let Ok((rest, (child_id, child_size))) = ebml_element_header()(cursor) else {
            break;
        };
        let header_len = slice_dist(cursor, rest);
        let child_size = match child_size {
            ElementSize::Known(n) => n,
            // An unknown length inside a bounded parent can't be trusted;
            // stop here rather than guess where it ends.
            ElementSize::Unknown => break,
        };
        let child_total = header_len + child_size;
        if child_total > cursor.len() as u64 {
            break;
        }

        let body = &rest[..child_size as usize];
        let (child, _) = read_tree(child_id, body, child_size);
        children.push(match child {
            EbmlNode::Master(_, kids) if !kids.is_empty() => EbmlNode::Master(child_id, kids),
            _ => EbmlNode::Binary(child_id, body),
        });

        cursor = &cursor[child_total as usize..];
        consumed += child_total;
    }

    (EbmlNode::Master(id, children), consumed)
}
