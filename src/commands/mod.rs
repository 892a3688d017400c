// Destructive operations
pub mod erase;
pub mod install;
pub mod operation;

// Read-only commands
pub mod disks;
pub mod doctor;
pub mod keys;

pub mod config;
