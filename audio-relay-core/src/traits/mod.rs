pub mod capture_consumer;
pub mod capture_device;
pub mod recorder_delegate;
pub mod stream_delegate;
