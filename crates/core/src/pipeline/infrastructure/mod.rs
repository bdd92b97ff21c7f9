pub mod tick_scheduler;
