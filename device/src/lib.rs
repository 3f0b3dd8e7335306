pub mod connectivity;
pub mod dispatcher;
pub mod error;
pub mod frame_source;
pub mod mode;
pub mod scheduler;
pub mod sensor;
pub mod server;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

pub use error::DeviceError;
