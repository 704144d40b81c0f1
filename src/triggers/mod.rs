/// Failover detection on the serving pool
pub mod failover_detector;

pub use failover_detector::FailoverDetector;
