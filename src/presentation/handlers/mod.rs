mod health;
mod saga_status;
mod websocket;

pub use health::health_handler;
pub use saga_status::saga_status_handler;
pub use websocket::websocket_handler;
