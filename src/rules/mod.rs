pub mod attendance_status;
pub mod time_accumulator;
