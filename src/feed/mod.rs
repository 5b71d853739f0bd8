pub mod hub;
pub mod mock;
pub mod stream;
pub mod types;
