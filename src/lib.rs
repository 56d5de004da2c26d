pub mod adapter;
pub mod cli;
pub mod commands;
pub mod debug;
pub mod devfile;
pub mod envinfo;
pub mod machineoutput;
pub mod paths;
pub mod platform;
pub mod sync;
pub mod util;

// Re-export core types for convenience
pub use platform::{ComponentIdentity, PlatformContext, PortPair};
