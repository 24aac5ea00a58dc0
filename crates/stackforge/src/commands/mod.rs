pub mod deploy;
pub mod provision;
pub mod status;
pub mod teardown;
