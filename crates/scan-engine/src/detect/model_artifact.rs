//! Model-artifact analyzer (§4.2): metadata-only inspection of a
//! serialized model file. Never executes model code.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFramework {
    PyTorch,
    TensorFlow,
    Onnx,
    SafeTensors,
    Unknown,
}

/// Declared structural facts pulled from artifact metadata, never from
/// running the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifactSummary {
    pub framework: ModelFramework,
    pub parameter_count: Option<u64>,
    pub input_shapes: Vec<Vec<i64>>,
    pub output_shapes: Vec<Vec<i64>>,
    pub has_embedding_layer: bool,
}

/// Inspects a metadata document describing the artifact (e.g. a PyTorch
/// `config.json`, an ONNX model's embedded graph metadata, a safetensors
/// header). `metadata` is already parsed JSON; the caller is responsible for
/// extracting it from the artifact's container format.
pub fn inspect(metadata: &serde_json::Value) -> ModelArtifactSummary {
    let framework = detect_framework(metadata);
    let parameter_count = metadata
        .get("num_parameters")
        .or_else(|| metadata.get("total_params"))
        .and_then(|v| v.as_u64());

    let input_shapes = extract_shapes(metadata, "input_shapes");
    let output_shapes = extract_shapes(metadata, "output_shapes");

    let has_embedding_layer = metadata
        .get("layers")
        .and_then(|v| v.as_array())
        .map(|layers| {
            layers.iter().any(|layer| {
                layer
                    .get("type")
                    .and_then(|t| t.as_str())
                    .map(|t| t.to_lowercase().contains("embed"))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false);

    ModelArtifactSummary {
        framework,
        parameter_count,
        input_shapes,
        output_shapes,
        has_embedding_layer,
    }
}

fn detect_framework(metadata: &serde_json::Value) -> ModelFramework {
    match metadata.get("framework").and_then(|v| v.as_str()) {
        Some(s) if s.eq_ignore_ascii_case("pytorch") => ModelFramework::PyTorch,
        Some(s) if s.eq_ignore_ascii_case("tensorflow") => ModelFramework::TensorFlow,
        Some(s) if s.eq_ignore_ascii_case("onnx") => ModelFramework::Onnx,
        Some(s) if s.eq_ignore_ascii_case("safetensors") => ModelFramework::SafeTensors,
        _ => ModelFramework::Unknown,
    }
}

fn extract_shapes(metadata: &serde_json::Value, key: &str) -> Vec<Vec<i64>> {
    metadata
        .get(key)
        .and_then(|v| v.as_array())
        .map(|shapes| {
            shapes
                .iter()
                .filter_map(|shape| shape.as_array())
                .map(|dims| dims.iter().filter_map(|d| d.as_i64()).collect())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_framework_is_reported_without_failing() {
        let summary = inspect(&serde_json::json!({}));
        assert_eq!(summary.framework, ModelFramework::Unknown);
        assert!(summary.parameter_count.is_none());
    }

    #[test]
    fn detects_embedding_layer_presence() {
        let summary = inspect(&serde_json::json!({
            "framework": "pytorch",
            "num_parameters": 125_000_000u64,
            "layers": [{"type": "Linear"}, {"type": "TokenEmbedding"}]
        }));
        assert_eq!(summary.framework, ModelFramework::PyTorch);
        assert_eq!(summary.parameter_count, Some(125_000_000));
        assert!(summary.has_embedding_layer);
    }
}
