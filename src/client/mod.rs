//! Everything that talks to the Client: session credentials, TLS trust,
//! the HTTPS gateway, the event stream, OS process control and the
//! connection state machine that ties them together.

pub mod connector;
pub mod event_stream;
pub mod gateway;
pub mod process;
pub mod session;
pub mod tls;

#[cfg(test)]
pub mod fake;
