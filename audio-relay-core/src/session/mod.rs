pub mod coordinator;
mod fan_out;
