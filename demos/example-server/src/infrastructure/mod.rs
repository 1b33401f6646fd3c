pub mod database;
pub mod request_log;
