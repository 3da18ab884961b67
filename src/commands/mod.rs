// ABOUTME: Command module aggregator for the sshrun CLI.
// ABOUTME: Re-exports exec and hosts command handlers.

mod exec;
mod hosts;

pub use exec::exec_command;
pub use hosts::list_hosts;
