//! Deserialization helpers that keep track of the path to the value that failed.

use crate::{JsonError, YamlError};
use serde::de::DeserializeOwned;

pub fn json_from_str<T: DeserializeOwned>(s: &str) -> Result<T, JsonError> {
    let de = &mut serde_json::Deserializer::from_str(s);
    serde_path_to_error::deserialize(de)
}

pub fn json_from_slice<T: DeserializeOwned>(b: &[u8]) -> Result<T, JsonError> {
    let de = &mut serde_json::Deserializer::from_slice(b);
    serde_path_to_error::deserialize(de)
}

pub fn json_from_reader<T: DeserializeOwned, R: std::io::Read>(r: R) -> Result<T, JsonError> {
    let de = &mut serde_json::Deserializer::from_reader(r);
    serde_path_to_error::deserialize(de)
}

pub fn yaml_from_str<T: DeserializeOwned>(s: &str) -> Result<T, YamlError> {
    let de = serde_yaml::Deserializer::from_str(s);
    serde_path_to_error::deserialize(de)
}
