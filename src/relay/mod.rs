//! Chat relay module.
//!
//! Accepts chat requests from browser clients, injects the server-side
//! credential, forwards them to the upstream chat-completion API and relays
//! the answer back either buffered or as a live event stream.

mod handlers;
mod server;
pub mod stream;
pub mod types;

pub use server::{
    build_http_client, create_router, run_server, AppState, RequestId, REQUEST_ID_HEADER,
};
pub use stream::{relay_stream, StreamOutcome, StreamStats};
pub use types::{validate_completion_shape, ChatRequest, UpstreamRequest};
