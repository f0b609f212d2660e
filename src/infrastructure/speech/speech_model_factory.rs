use std::sync::Arc;

use candle_core::DType;

use crate::application::ports::{SpeechModel, SpeechModelError};
use crate::presentation::config::{ComputeType, SpeechModelProvider};

use super::candle_whisper_model::CandleWhisperModel;
use super::mock_speech_model::MockSpeechModel;

const HUB_NAMESPACE: &str = "openai/whisper-";

pub struct SpeechModelFactory;

impl SpeechModelFactory {
    /// Loads the configured model. The local provider downloads weights on
    /// first use and blocks until they are in memory.
    pub fn create(
        provider: SpeechModelProvider,
        model: &str,
        compute_type: ComputeType,
    ) -> Result<Arc<dyn SpeechModel>, SpeechModelError> {
        match provider {
            SpeechModelProvider::Local => {
                let model_id = resolve_model_id(model);
                let model = CandleWhisperModel::new(&model_id, dtype_for(compute_type))?;
                Ok(Arc::new(model))
            }
            SpeechModelProvider::Mock => {
                tracing::warn!("Using mock speech model; transcripts are scripted");
                Ok(Arc::new(MockSpeechModel::default()))
            }
        }
    }
}

/// Short names such as `base.en` map to the OpenAI checkpoints on the hub.
pub fn resolve_model_id(name: &str) -> String {
    let name = name.trim();
    if name.contains('/') {
        name.to_string()
    } else {
        format!("{}{}", HUB_NAMESPACE, name)
    }
}

pub fn dtype_for(compute_type: ComputeType) -> DType {
    match compute_type {
        ComputeType::F32 => DType::F32,
        ComputeType::F16 => DType::F16,
        ComputeType::Bf16 => DType::BF16,
        ComputeType::Int8 => {
            tracing::warn!("int8 compute is not available on this backend, using f32");
            DType::F32
        }
    }
}
