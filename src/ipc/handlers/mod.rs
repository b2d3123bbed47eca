pub mod analytics;
pub mod assignments;
pub mod bulk_upload;
pub mod classes;
pub mod core;
pub mod marks;
pub mod setup;
pub mod students;
