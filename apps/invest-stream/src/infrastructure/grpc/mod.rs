//! gRPC Market Data Transport
//!
//! Adapter implementing [`ChannelFactory`](crate::application::ports::ChannelFactory)
//! over the brokerage's `MarketDataStreamService`.

pub mod client;
pub mod codec;
pub mod transport;

// Allow clippy warnings and missing docs in generated-style wire types
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod proto;

pub use codec::{CodecError, MarketDataCodec};
pub use transport::{AuthInterceptor, GrpcChannelFactory, MAX_MESSAGE_SIZE};
