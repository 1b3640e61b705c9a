pub mod ports;
pub mod realtime;
pub mod saga;
pub mod services;
