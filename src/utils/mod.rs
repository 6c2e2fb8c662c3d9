pub mod date_range;
pub mod db_utils;
pub mod email_registry;
