use std::collections::BTreeMap;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, SerializeMap, SerializeTuple};
use serde_json::Value;

use crate::{AnnotationHash, Element, Item};

const TYPE: &str = "type";
const ATTRIBUTES: &str = "attributes";
const CLOSE_PREFIX: char = '/';

/// Plain text is a bare string, annotated text is a `[grapheme, [hashes]]`
/// pair, and structural markers are `{ "type": .. }` objects whose type is
/// prefixed with a `/` for closing markers.
impl ser::Serialize for Item {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match self {
            Item::Text { grapheme, annotations } if annotations.is_empty() => {
                serializer.serialize_str(grapheme)
            },

            Item::Text { grapheme, annotations } => {
                let mut tuple = serializer.serialize_tuple(2)?;
                tuple.serialize_element(grapheme)?;
                tuple.serialize_element(annotations)?;
                tuple.end()
            },

            Item::Open(element) => {
                let has_attributes = !element.attributes.is_empty();
                let len = 1 + has_attributes as usize;
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry(TYPE, &element.kind)?;
                if has_attributes {
                    map.serialize_entry(ATTRIBUTES, &element.attributes)?;
                }
                map.end()
            },

            Item::Close(kind) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(TYPE, &format!("{CLOSE_PREFIX}{kind}"))?;
                map.end()
            },
        }
    }
}

impl<'de> de::Deserialize<'de> for Item {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        // Which of the three shapes we're looking at is only known once we
        // see the input, so this has to be self-describing.
        deserializer.deserialize_any(ItemVisitor)
    }
}

struct ItemVisitor;

impl<'de> Visitor<'de> for ItemVisitor {
    type Value = Item;

    #[inline]
    fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str("a grapheme, an annotated grapheme or an element marker")
    }

    #[inline]
    fn visit_str<E>(self, grapheme: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Item::text(grapheme))
    }

    #[inline]
    fn visit_string<E>(self, grapheme: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Item::text(grapheme))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let grapheme = seq
            .next_element::<String>()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;

        let annotations = seq
            .next_element::<Vec<AnnotationHash>>()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;

        if seq.next_element::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_length(3, &self));
        }

        Ok(Item::annotated(grapheme, annotations))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut kind = None::<String>;
        let mut attributes = None::<BTreeMap<String, Value>>;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                TYPE => {
                    if kind.is_some() {
                        return Err(de::Error::duplicate_field(TYPE));
                    }
                    kind = Some(map.next_value()?);
                },
                ATTRIBUTES => {
                    if attributes.is_some() {
                        return Err(de::Error::duplicate_field(ATTRIBUTES));
                    }
                    attributes = Some(map.next_value()?);
                },
                _ => {
                    map.next_value::<de::IgnoredAny>()?;
                },
            }
        }

        let kind = kind.ok_or_else(|| de::Error::missing_field(TYPE))?;

        if let Some(kind) = kind.strip_prefix(CLOSE_PREFIX) {
            return Ok(Item::close(kind));
        }

        let mut attributes = attributes.unwrap_or_default();
        attributes.retain(|_, value| !value.is_null());

        Ok(Item::Open(Element { kind, attributes }))
    }
}
