pub mod attendance;
pub mod role;
pub mod submission;
pub mod task;
pub mod time_log;
pub mod user;
