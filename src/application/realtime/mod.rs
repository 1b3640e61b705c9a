//! Device-facing realtime layer: the wire protocol, the connection
//! registry and the per-device listening/speaking state machine.

mod connection;
mod hub;
mod protocol;

pub use connection::{
    ConnectionError, ConnectionPhase, ConnectionServices, DEFAULT_RECOGNITION_CLOSE_TIMEOUT,
    DEFAULT_STORE_TIMEOUT, DeviceConnection,
};
pub use hub::{ConnectionHandle, ConnectionId, DEFAULT_HUB_BUFFER, Hub, HubError, HubWorker};
pub use protocol::{
    ErrorCode, InboundMessage, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, OutboundFrame, OutboundMessage,
    ProtocolError, negotiate_audio_config, now_unix,
};
