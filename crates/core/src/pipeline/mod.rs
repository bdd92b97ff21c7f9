pub mod frame_scheduler;
pub mod infrastructure;
pub mod loop_controller;
pub mod pipeline_logger;
