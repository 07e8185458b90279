//! Deep copies of cached values.
//!
//! Cached values are shared snapshots. Callers that want to mutate what they
//! got back take an independent copy through an encode/decode round trip.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Returns an independent copy of `src`.
///
/// Fails with [`CacheError::Copy`](crate::CacheError::Copy) if the value
/// cannot be encoded or decoded.
pub fn deep_copy<T>(src: &T) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let bytes = bincode::serialize(src)?;
    Ok(bincode::deserialize(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        tags: Vec<String>,
        scores: HashMap<String, u32>,
    }

    #[test]
    fn test_copy_is_independent() {
        let original = Profile {
            name: "alice".into(),
            tags: vec!["admin".into()],
            scores: HashMap::from([("q1".to_string(), 7)]),
        };
        let mut copy = deep_copy(&original).unwrap();
        assert_eq!(copy, original);

        copy.tags.push("owner".into());
        assert_eq!(original.tags.len(), 1);
    }

    #[test]
    fn test_copy_error_surfaces() {
        // bincode cannot encode sequences whose length is unknown up front.
        struct Unsized;
        impl Serialize for Unsized {
            fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
                use serde::ser::SerializeSeq;
                let seq = s.serialize_seq(None)?;
                seq.end()
            }
        }
        impl<'de> Deserialize<'de> for Unsized {
            fn deserialize<D: serde::Deserializer<'de>>(_: D) -> std::result::Result<Self, D::Error> {
                Ok(Unsized)
            }
        }

        let err = deep_copy(&Unsized).err().unwrap();
        assert!(matches!(err, crate::CacheError::Copy(_)));
    }
}
