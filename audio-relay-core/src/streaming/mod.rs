mod event_loop;
pub mod sender;
