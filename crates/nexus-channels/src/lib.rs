pub mod ack;
pub mod channel;
pub mod debounce;
pub mod error;
pub mod limits;
pub mod manager;
pub mod types;

pub use channel::ChannelAdapter;
pub use error::ChannelError;
