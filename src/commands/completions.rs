//! Shell completion scripts generated from the registered command tree.

use crate::cli::args::{ArgSpec, Invocation};
use crate::cli::registry::{LeafSpec, ROOT, Registry};
use crate::context::Context;
use anyhow::Result;
use clap_complete::Shell;

const SHELLS: [&str; 5] = ["bash", "zsh", "fish", "elvish", "powershell"];

pub fn register(reg: &mut Registry) {
    reg.leaf(
        LeafSpec::custom(ROOT, "completions", "Print a shell completion script", completions)
            .arg(ArgSpec::positional("shell", "target shell").choices(&SHELLS))
            .example("beehive completions zsh > ~/.zfunc/_beehive"),
    );
}

fn completions(ctx: &mut Context, inv: &Invocation) -> Result<()> {
    let shell: Shell = inv
        .require_str("shell")?
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let tree = super::build_tree()?;
    let mut cmd = crate::cli::build_command(&tree);
    let mut script = Vec::new();
    clap_complete::generate(shell, &mut cmd, "beehive", &mut script);
    ctx.emit(&String::from_utf8_lossy(&script));
    Ok(())
}
