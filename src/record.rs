use serde::{Deserialize, Serialize};

/// Sample two-field record stored through `JsonCodec`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueDto {
    first_example_value: String,
    second_example_value: String,
}

impl ValueDto {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first_example_value: first.into(),
            second_example_value: second.into(),
        }
    }

    pub fn first_example_value(&self) -> &str {
        &self.first_example_value
    }

    pub fn second_example_value(&self) -> &str {
        &self.second_example_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{JsonCodec, ValueCodec};

    #[test]
    fn test_wire_shape() {
        let codec = JsonCodec::<ValueDto>::default();
        let bytes = codec.encode(&ValueDto::new("a", "b")).unwrap();
        assert_eq!(
            bytes,
            br#"{"firstExampleValue":"a","secondExampleValue":"b"}"#.to_vec()
        );
    }

    #[test]
    fn test_round_trip_preserves_unicode_and_empty_fields() {
        let codec = JsonCodec::<ValueDto>::default();
        for dto in [
            ValueDto::new("", ""),
            ValueDto::new("한국어 \"quoted\"", "line\nbreak"),
            ValueDto::new("🦀", "\u{0}"),
        ] {
            assert_eq!(codec.decode(&codec.encode(&dto).unwrap()).unwrap(), dto);
        }
    }
}
