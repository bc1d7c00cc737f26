//! Default USP transport: one WebSocket per connection.
//!
//! - `frame`: text and binary frame codec
//! - `transport`: [`WebSocketTransport`] and its factory

pub mod frame;
pub mod transport;

pub use transport::{
    CONNECTION_ID_HEADER, WebSocketTransport, WebSocketTransportFactory, map_ws_error,
    new_request_id,
};
