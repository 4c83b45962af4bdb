pub mod backup;
pub mod core;
pub mod maintenance;
pub mod reports;
pub mod results;
pub mod students;
