pub mod context;
pub mod provider;
pub mod prune;
pub mod stream;
pub mod summarize;
