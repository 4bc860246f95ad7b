//! Tag-level access to a parsed DICOM data set.
//!
//! [`TagSet`] wraps a decoded Part-10 object and exposes accessors that never
//! fail: a missing or malformed element yields the caller's default (or
//! `None` for the optional variants). Sequence items are reached through
//! [`ItemView`], which carries a depth counter so that malformed files cannot
//! drive the decoder into unbounded descent.

use dicom::core::Tag;
use dicom::object::file::ReadPreamble;
use dicom::object::{FileDicomObject, InMemDicomObject, OpenFileOptions, ReadError};
use thiserror::Error;
use tracing::warn;

/// Maximum nesting depth honored when walking sequence items.
///
/// Compliant RT objects nest at most five levels deep; anything beyond this
/// bound is treated as malformed and yields no items.
pub const MAX_SEQUENCE_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum TagReadError {
    #[error("empty input buffer")]
    Empty,

    #[error("failed to read DICOM data set: {0}")]
    Read(#[from] ReadError),
}

/// A queryable DICOM data set parsed from a single file's bytes.
#[derive(Debug)]
pub struct TagSet {
    obj: FileDicomObject<InMemDicomObject>,
}

impl TagSet {
    /// Parse a DICOM Part-10 byte stream.
    ///
    /// The 128-byte preamble and `DICM` magic are detected and skipped when
    /// present; streams that start directly at the file meta group are also
    /// accepted. The file's own transfer syntax decides between explicit and
    /// implicit VR decoding.
    pub fn from_part10_bytes(bytes: &[u8]) -> Result<Self, TagReadError> {
        if bytes.is_empty() {
            return Err(TagReadError::Empty);
        }
        let preamble = bytes.len() > 132 && &bytes[128..132] == b"DICM";
        let read_preamble = if preamble {
            ReadPreamble::Always
        } else {
            ReadPreamble::Never
        };
        let obj = OpenFileOptions::new()
            .read_preamble(read_preamble)
            .from_reader(bytes)?;
        Ok(TagSet { obj })
    }

    /// Accessor view over the root data set.
    pub fn view(&self) -> ItemView<'_> {
        ItemView {
            obj: &self.obj,
            depth: 0,
        }
    }

    /// The underlying object, for pixel-data decoding.
    pub fn object(&self) -> &FileDicomObject<InMemDicomObject> {
        &self.obj
    }
}

/// A non-throwing accessor view over one data set level (the file root or a
/// sequence item).
#[derive(Debug, Clone, Copy)]
pub struct ItemView<'a> {
    obj: &'a InMemDicomObject,
    depth: usize,
}

impl<'a> ItemView<'a> {
    fn element(&self, tag: Tag) -> Option<&'a dicom::object::mem::InMemElement> {
        self.obj.element(tag).ok()
    }

    /// Trimmed string value, or `None` when absent, non-textual or blank.
    pub fn string_opt(&self, tag: Tag) -> Option<String> {
        let value = self.element(tag)?.to_str().ok()?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }

    /// Trimmed string value, or the given default.
    pub fn string_or(&self, tag: Tag, default: &str) -> String {
        self.string_opt(tag).unwrap_or_else(|| default.to_owned())
    }

    /// Trimmed string value, or `""`.
    pub fn string(&self, tag: Tag) -> String {
        self.string_or(tag, "")
    }

    /// Numeric value: float parse first, then integer parse, else `None`.
    pub fn number_opt(&self, tag: Tag) -> Option<f64> {
        let element = self.element(tag)?;
        if let Ok(value) = element.to_float64() {
            return Some(value);
        }
        element.to_int::<i64>().ok().map(|value| value as f64)
    }

    /// Numeric value, or the given default.
    pub fn number_or(&self, tag: Tag, default: f64) -> f64 {
        self.number_opt(tag).unwrap_or(default)
    }

    /// Numeric value, or `0.0`.
    pub fn number(&self, tag: Tag) -> f64 {
        self.number_or(tag, 0.0)
    }

    /// Integer value, or `None`.
    pub fn int_opt(&self, tag: Tag) -> Option<i64> {
        let element = self.element(tag)?;
        if let Ok(value) = element.to_int::<i64>() {
            return Some(value);
        }
        element.to_float64().ok().map(|value| value as i64)
    }

    /// Backslash-delimited numeric array; unparseable tokens are skipped.
    ///
    /// Absent or empty elements yield an empty vector.
    pub fn number_array(&self, tag: Tag) -> Vec<f64> {
        self.tokens(tag)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(|token| token.trim().parse::<f64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Strict variant of [`number_array`](Self::number_array): every token
    /// must parse, otherwise `None`.
    pub fn number_array_opt(&self, tag: Tag) -> Option<Vec<f64>> {
        let tokens = self.tokens(tag)?;
        if tokens.is_empty() {
            return None;
        }
        let mut values = Vec::with_capacity(tokens.len());
        for token in &tokens {
            values.push(token.trim().parse::<f64>().ok()?);
        }
        Some(values)
    }

    fn tokens(&self, tag: Tag) -> Option<Vec<String>> {
        let element = self.element(tag)?;
        // Numeric VRs (FL/FD/US/...) decode to binary values; render them
        // back to strings so one token path serves both encodings.
        let raw = element.to_multi_str().ok()?;
        let tokens: Vec<String> = raw
            .iter()
            .flat_map(|entry| entry.split('\\'))
            .map(|token| token.trim().to_owned())
            .filter(|token| !token.is_empty())
            .collect();
        Some(tokens)
    }

    /// Items of a sequence element, depth-bounded.
    ///
    /// Non-sequence elements and sequences nested beyond
    /// [`MAX_SEQUENCE_DEPTH`] yield an empty vector.
    pub fn items(&self, tag: Tag) -> Vec<ItemView<'a>> {
        if self.depth >= MAX_SEQUENCE_DEPTH {
            warn!(?tag, depth = self.depth, "sequence nesting bound reached");
            return Vec::new();
        }
        self.element(tag)
            .and_then(|element| element.value().items())
            .map(|items| {
                items
                    .iter()
                    .map(|item| ItemView {
                        obj: item,
                        depth: self.depth + 1,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First item of a sequence element, if any.
    pub fn first_item(&self, tag: Tag) -> Option<ItemView<'a>> {
        self.items(tag).into_iter().next()
    }

    /// Whether the element exists at this level.
    pub fn has(&self, tag: Tag) -> bool {
        self.element(tag).is_some()
    }
}

#[cfg(test)]
pub(crate) fn root_view(obj: &InMemDicomObject) -> ItemView<'_> {
    ItemView { obj, depth: 0 }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dicom::core::value::DataSetSequence;
    use dicom::core::{DataElement, VR};
    use dicom::dicom_value;
    use dicom::object::mem::InMemElement;

    pub(crate) fn item_with(elements: Vec<InMemElement>) -> InMemDicomObject {
        InMemDicomObject::from_element_iter(elements)
    }

    fn view_fixture() -> InMemDicomObject {
        item_with(vec![
            DataElement::new(
                Tag(0x0010, 0x0010),
                VR::PN,
                dicom_value!(Str, "  Doe^Jane  "),
            ),
            DataElement::new(Tag(0x0028, 0x1053), VR::DS, dicom_value!(Str, "2.5")),
            DataElement::new(Tag(0x0020, 0x0013), VR::IS, dicom_value!(Str, "7")),
            DataElement::new(
                Tag(0x0028, 0x0030),
                VR::DS,
                dicom_value!(Strs, ["0.5", "0.5"]),
            ),
            DataElement::new(
                Tag(0x3006, 0x0050),
                VR::DS,
                dicom_value!(Strs, ["1.0", "bogus", "3.0"]),
            ),
        ])
    }

    #[test]
    fn string_accessor_trims_and_defaults() {
        let obj = view_fixture();
        let view = ItemView { obj: &obj, depth: 0 };
        assert_eq!(view.string(Tag(0x0010, 0x0010)), "Doe^Jane");
        assert_eq!(view.string(Tag(0x0010, 0x0020)), "");
        assert_eq!(view.string_or(Tag(0x0010, 0x0020), "fallback"), "fallback");
        assert_eq!(view.string_opt(Tag(0x0010, 0x0020)), None);
    }

    #[test]
    fn number_accessor_parses_float_then_int() {
        let obj = view_fixture();
        let view = ItemView { obj: &obj, depth: 0 };
        assert_eq!(view.number(Tag(0x0028, 0x1053)), 2.5);
        assert_eq!(view.number(Tag(0x0020, 0x0013)), 7.0);
        assert_eq!(view.number(Tag(0x0028, 0x1052)), 0.0);
        assert_eq!(view.number_or(Tag(0x0028, 0x1052), 1.0), 1.0);
        assert_eq!(view.int_opt(Tag(0x0020, 0x0013)), Some(7));
    }

    #[test]
    fn lenient_array_skips_bad_tokens_strict_array_rejects() {
        let obj = view_fixture();
        let view = ItemView { obj: &obj, depth: 0 };
        assert_eq!(view.number_array(Tag(0x0028, 0x0030)), vec![0.5, 0.5]);
        assert_eq!(view.number_array(Tag(0x3006, 0x0050)), vec![1.0, 3.0]);
        assert_eq!(
            view.number_array_opt(Tag(0x0028, 0x0030)),
            Some(vec![0.5, 0.5])
        );
        assert_eq!(view.number_array_opt(Tag(0x3006, 0x0050)), None);
        assert!(view.number_array(Tag(0x0018, 0x0050)).is_empty());
        assert_eq!(view.number_array_opt(Tag(0x0018, 0x0050)), None);
    }

    #[test]
    fn sequence_items_are_depth_bounded() {
        let seq_tag = Tag(0x3006, 0x0040);
        // Build a chain nested deeper than the bound.
        let mut obj = item_with(vec![DataElement::new(
            Tag(0x3006, 0x0042),
            VR::CS,
            dicom_value!(Str, "CLOSED_PLANAR"),
        )]);
        for _ in 0..(MAX_SEQUENCE_DEPTH + 4) {
            obj = item_with(vec![DataElement::new(
                seq_tag,
                VR::SQ,
                DataSetSequence::from(vec![obj]),
            )]);
        }

        let mut view = ItemView { obj: &obj, depth: 0 };
        let mut reached = 0;
        loop {
            match view.items(seq_tag).into_iter().next() {
                Some(inner) => {
                    reached += 1;
                    view = inner;
                }
                None => break,
            }
        }
        assert_eq!(reached, MAX_SEQUENCE_DEPTH);
    }

    #[test]
    fn part10_rejects_empty_buffer() {
        assert!(matches!(
            TagSet::from_part10_bytes(&[]),
            Err(TagReadError::Empty)
        ));
    }
}
