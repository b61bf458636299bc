//! Command plugins. Each module registers its groups and leaves.

pub mod auth;
pub mod completions;
pub mod event;
pub mod openstack;
pub mod platform;
pub mod resource;
pub mod service;
pub mod ssh;

use crate::cli::registry::{CommandTree, Registry};
use anyhow::Result;

/// Register every plugin and link the command tree.
pub fn build_tree() -> Result<CommandTree> {
    let mut reg = Registry::new();
    auth::register(&mut reg);
    resource::register(&mut reg);
    service::register(&mut reg);
    event::register(&mut reg);
    openstack::register(&mut reg);
    ssh::register(&mut reg);
    platform::register(&mut reg);
    completions::register(&mut reg);
    reg.build()
}
