// Adapters layer: concrete implementations for external systems (http session, model storage).

pub mod http;
pub mod storage;
