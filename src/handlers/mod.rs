//! Request handlers for the WebSocket endpoint and the HTTP side-channel

pub mod http;
pub mod websocket;
