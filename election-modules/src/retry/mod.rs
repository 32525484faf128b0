pub mod fixed_retry_timer;
pub mod randomized_retry_timer;
