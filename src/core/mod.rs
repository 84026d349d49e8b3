pub mod tasks;
pub mod topology;
