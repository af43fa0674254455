//! Command-line interface components
//!
//! This module contains CLI-specific code for Depot Transfer: argument
//! parsing, engine startup from configuration and the command handlers.

pub mod args;
pub mod commands;
pub mod startup;

pub use args::{BatchArgs, Cli, Commands, DeleteArgs, FetchArgs, GcArgs, GlobalArgs, ListArgs, StoreArgs};
pub use commands::{
    handle_batch, handle_delete, handle_fetch, handle_gc, handle_init, handle_list,
    handle_locations, handle_store,
};
pub use startup::Engine;
