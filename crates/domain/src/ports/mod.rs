pub mod codec;
pub mod outbound;
pub mod store;

pub use codec::CompositionCodec;
pub use outbound::OutboundCaller;
pub use store::{DurableStore, StoreKey};
