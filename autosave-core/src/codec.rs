/*!
Codecs for the on-disk snapshot format.

A save file is a flat, human-readable mapping of accessor name to value.
This module defines the codec abstraction and the JSON and YAML
implementations; the engine picks one from [`Format`] at construction time.
*/

use crate::config::Format;
use crate::{AutosaveError, Result, Snapshot, Value};

/// Encoding abstraction for snapshot files
///
/// Encoders must write keys in a deterministic order so that successive save
/// files diff cleanly. Decoders must reject the whole input on any error;
/// partial decoding is never attempted.
pub trait SnapshotCodec: Send + Sync {
    /// Encode a snapshot to bytes
    fn encode(&self, snapshot: &Snapshot) -> Result<Vec<u8>>;

    /// Decode bytes into a snapshot
    fn decode(&self, data: &[u8]) -> Result<Snapshot>;

    /// Name of the format, used in diagnostics
    fn format_name(&self) -> &str;
}

/// Pretty-printed JSON codec
///
/// # Example
/// ```rust
/// use autosave_core::codec::{JsonCodec, SnapshotCodec};
/// use autosave_core::{Snapshot, Value};
///
/// let codec = JsonCodec::new();
/// let snapshot: Snapshot = vec![("x", Value::Int(5))].into_iter().collect();
/// let bytes = codec.encode(&snapshot)?;
/// assert_eq!(codec.decode(&bytes)?, snapshot);
/// # Ok::<(), autosave_core::AutosaveError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl SnapshotCodec for JsonCodec {
    /// Non-finite floats have no JSON form; a snapshot holding one fails to
    /// encode with an error naming the key.
    fn encode(&self, snapshot: &Snapshot) -> Result<Vec<u8>> {
        if let Some((key, _)) = snapshot.iter().find(|(_, value)| !value.is_finite()) {
            return Err(AutosaveError::format(format!(
                "JSON cannot represent the non-finite value of '{key}'"
            )));
        }
        let mut data = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| AutosaveError::format(format!("JSON encoding failed: {e}")))?;
        data.push(b'\n');
        Ok(data)
    }

    fn decode(&self, data: &[u8]) -> Result<Snapshot> {
        serde_json::from_slice(data)
            .map_err(|e| AutosaveError::format(format!("JSON decoding failed: {e}")))
    }

    fn format_name(&self) -> &str {
        "json"
    }
}

/// YAML codec, the default on-disk format
///
/// Writes one `key: value` line per entry in key order. Numeric arrays are
/// written inline as flow sequences (`wave: [1.0, 2.0]`) and non-finite
/// floats as `.nan`, `.inf` and `-.inf`. Block-style files written by hand
/// decode as well.
///
/// # Example
/// ```rust
/// use autosave_core::codec::{SnapshotCodec, YamlCodec};
/// use autosave_core::{Snapshot, Value};
///
/// let codec = YamlCodec::new();
/// let snapshot: Snapshot = vec![("wave", Value::FloatArray(vec![1.0, 2.5]))]
///     .into_iter()
///     .collect();
/// assert_eq!(codec.encode(&snapshot)?, b"wave: [1.0, 2.5]\n");
/// # Ok::<(), autosave_core::AutosaveError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct YamlCodec;

impl YamlCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Render one scalar as a single line of YAML
fn yaml_scalar<T: serde::Serialize + ?Sized>(scalar: &T) -> Result<String> {
    let rendered = serde_yaml::to_string(scalar)
        .map_err(|e| AutosaveError::format(format!("YAML encoding failed: {e}")))?;
    let rendered = rendered.strip_prefix("--- ").unwrap_or(&rendered).trim_end();
    if !rendered.contains('\n') {
        return Ok(rendered.to_string());
    }
    // Multi-line text comes out as a block scalar; a double-quoted JSON
    // string is also a valid YAML flow scalar.
    serde_json::to_string(scalar)
        .map_err(|e| AutosaveError::format(format!("YAML encoding failed: {e}")))
}

fn yaml_flow_sequence<T: serde::Serialize>(items: &[T]) -> Result<String> {
    let items = items.iter().map(yaml_scalar).collect::<Result<Vec<_>>>()?;
    Ok(format!("[{}]", items.join(", ")))
}

impl SnapshotCodec for YamlCodec {
    fn encode(&self, snapshot: &Snapshot) -> Result<Vec<u8>> {
        if snapshot.is_empty() {
            return Ok(b"{}\n".to_vec());
        }
        let mut out = String::new();
        for (key, value) in snapshot.iter() {
            let rendered = match value {
                Value::Bool(v) => yaml_scalar(v)?,
                Value::Int(v) => yaml_scalar(v)?,
                Value::Float(v) => yaml_scalar(v)?,
                Value::Text(v) => yaml_scalar(v)?,
                Value::IntArray(v) => yaml_flow_sequence(v.as_slice())?,
                Value::FloatArray(v) => yaml_flow_sequence(v.as_slice())?,
            };
            out.push_str(&yaml_scalar(key)?);
            out.push_str(": ");
            out.push_str(&rendered);
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    fn decode(&self, data: &[u8]) -> Result<Snapshot> {
        // An empty YAML document is an empty mapping
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Snapshot::new());
        }
        serde_yaml::from_slice(data)
            .map_err(|e| AutosaveError::format(format!("YAML decoding failed: {e}")))
    }

    fn format_name(&self) -> &str {
        "yaml"
    }
}

/// Build the codec for a configured format
pub fn codec_for(format: Format) -> Box<dyn SnapshotCodec> {
    match format {
        Format::Json => Box::new(JsonCodec::new()),
        Format::Yaml => Box::new(YamlCodec::new()),
    }
}
