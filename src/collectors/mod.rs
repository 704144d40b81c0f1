/// Access log tailing and the background tailer thread
pub mod log_tailer;

pub use log_tailer::{LogTail, LogTailer, TailOptions};
