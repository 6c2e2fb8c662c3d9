pub mod attendance;
pub mod intern;
pub mod submission;
pub mod task;
pub mod time_log;
