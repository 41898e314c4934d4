pub mod backup;
pub mod core;
pub mod groups;
pub mod karma;
pub mod timer;
pub mod tools;
