mod settings;

pub use settings::{
    AdmissionConfig, BroadcastSettings, OtelConfig, RunMode, ServerConfig, Settings,
    ShutdownSettings, WebSocketConfig, DEFAULT_CONFIG_YAML,
};
