pub mod buffer_ring;
pub mod level_meter;
pub mod pcm;
