//! SSH gateway: node inventory, groups, keys and node operations.

use crate::cli::args::{ArgSpec, Invocation};
use crate::cli::crud::Crud;
use crate::cli::registry::{LeafSpec, Metadata, ROOT, Registry};
use crate::context::Context;
use crate::ops::{self, operations::OPERATIONS, runner::SystemSsh};
use crate::render::RenderSpec;
use anyhow::Result;
use cmpkit::subsystem;

pub const BASE_URI: &str = "/v1.0/gas";

pub fn register(reg: &mut Registry) {
    reg.node(
        ROOT,
        "ssh",
        "SSH gateway",
        Metadata::subsystem(subsystem::SSH, BASE_URI),
    );

    reg.node("ssh", "nodes", "Managed nodes", Metadata::default());
    reg.leaf(LeafSpec::crud(
        "ssh.nodes",
        "get",
        "List ssh nodes or show one",
        Crud::get(
            "/sshnodes",
            "/sshnodes/{id}",
            RenderSpec::table(
                "sshnodes",
                &[
                    ("id", "id"),
                    ("name", "name"),
                    ("desc", "desc"),
                    ("ip", "ip_address"),
                    ("group", "group"),
                    ("active", "active"),
                ],
            ),
            RenderSpec::details("sshnode"),
        )
        .field(ArgSpec::named("group", "ssh group"))
        .field(ArgSpec::named("name", "name pattern")),
    ));

    reg.node("ssh", "groups", "Node groups", Metadata::default());
    reg.leaf(LeafSpec::crud(
        "ssh.groups",
        "get",
        "List ssh groups or show one",
        Crud::get(
            "/sshgroups",
            "/sshgroups/{id}",
            RenderSpec::table(
                "sshgroups",
                &[("id", "id"), ("uuid", "uuid"), ("name", "name"), ("desc", "desc")],
            ),
            RenderSpec::details("sshgroup"),
        ),
    ));

    reg.node("ssh", "keys", "SSH keys", Metadata::default());
    reg.leaf(LeafSpec::crud(
        "ssh.keys",
        "get",
        "List ssh keys or show one",
        Crud::get(
            "/sshkeys",
            "/sshkeys/{id}",
            RenderSpec::table(
                "sshkeys",
                &[("id", "id"), ("uuid", "uuid"), ("name", "name"), ("desc", "desc")],
            ),
            RenderSpec::details("sshkey"),
        ),
    ));

    reg.node("ssh", "ops", "Run checks on nodes over ssh", Metadata::default());
    for op in OPERATIONS {
        reg.leaf(
            LeafSpec::custom("ssh.ops", op.name, op.help, run_operation)
                .arg(ArgSpec::named("node", "a single node name or id"))
                .arg(ArgSpec::named("name", "nodes whose name contains this pattern"))
                .arg(ArgSpec::named("file", "file with one node name per line"))
                .arg(ArgSpec::named("size", "maximum number of nodes for --name").int().default("10"))
                .arg(ArgSpec::named("jobs", "hosts processed in parallel").int().default("1"))
                .arg(ArgSpec::named("user", "remote user"))
                .arg(
                    ArgSpec::named("result-file", "where the JSON results are written")
                        .default(ops::DEFAULT_RESULT_FILE),
                )
                .example("beehive ssh ops check_disk_rw -name dbs -size 10")
                .with_api(),
        );
    }
}

fn run_operation(ctx: &mut Context, inv: &Invocation) -> Result<()> {
    let runner = SystemSsh::new(inv.get_str("user").map(str::to_string));
    ops::run(ctx, inv, &runner)
}
