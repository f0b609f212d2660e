mod environment;
mod settings;

pub use environment::{ENVIRONMENT_VAR, Environment};
pub use settings::{
    ComputeType, CorsSettings, LoggingSettings, ModelSettings, NormalizerSettings, ServerSettings,
    Settings, SpeechModelProvider, WorkspaceSettings, split_origins,
};
