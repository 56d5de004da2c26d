pub mod common;
pub mod debug;
pub mod delete;
pub mod exec;
pub mod log;
pub mod push;
pub mod test;
pub mod undeploy;

// Re-export command functions
pub use debug::cmd_debug_port_forward;
pub use delete::cmd_delete;
pub use exec::cmd_exec;
pub use log::cmd_log;
pub use push::cmd_push;
pub use test::cmd_test;
pub use undeploy::cmd_undeploy;
