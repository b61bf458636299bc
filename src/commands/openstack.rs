//! OpenStack compute objects managed through the resource service.

use crate::cli::args::{ArgSpec, Invocation};
use crate::cli::crud::Crud;
use crate::cli::registry::{LeafSpec, Metadata, ROOT, Registry};
use crate::context::Context;
use crate::render::RenderSpec;
use crate::ui;
use anyhow::{Result, bail};
use cmpkit::client::path_segment;
use cmpkit::subsystem;

pub const BASE_URI: &str = "/v1.0/nrs/openstack";

pub fn register(reg: &mut Registry) {
    reg.node(
        ROOT,
        "openstack",
        "OpenStack compute",
        Metadata::subsystem(subsystem::RESOURCE, BASE_URI),
    );

    reg.node("openstack", "servers", "Servers", Metadata::default());
    reg.leaf(LeafSpec::crud(
        "openstack.servers",
        "get",
        "List servers or show one",
        Crud::get(
            "/servers",
            "/servers/{id}",
            RenderSpec::table(
                "servers",
                &[
                    ("id", "id"),
                    ("uuid", "uuid"),
                    ("name", "name"),
                    ("container", "container"),
                    ("flavor", "details.flavor.name"),
                    ("image", "details.os"),
                    ("ip", "details.ip_address"),
                    ("state", "state"),
                ],
            ),
            RenderSpec::details("server"),
        )
        .field(ArgSpec::named("container", "container id")),
    ));
    reg.leaf(
        LeafSpec::crud(
            "openstack",
            "server_add",
            "Create a server",
            Crud::add("/servers", "server", "add server {name} with id {uuid}")
                .field(ArgSpec::positional("name", "server name"))
                .field(ArgSpec::named("container", "container id"))
                .field(ArgSpec::named("flavor", "flavor id").required())
                .field(ArgSpec::named("image", "image id").required())
                .field(ArgSpec::named("networks", "comma separated network ids").list().required())
                .field_as(ArgSpec::named("keypair", "ssh key pair name"), "key_name")
                .field(ArgSpec::named("desc", "description")),
        )
        .description("Create a server and wait for the creation task to finish.")
        .example("beehive -e dev openstack server_add vm1 -flavor F -image I -networks N"),
    );
    reg.leaf(LeafSpec::crud(
        "openstack",
        "server_delete",
        "Delete a server",
        Crud::delete("/servers/{id}", "delete server {id}"),
    ));
    reg.leaf(
        LeafSpec::custom("openstack", "server-wait", "Wait for a server to settle", server_wait)
            .arg(ArgSpec::named("id", "server id").required())
            .with_api(),
    );
}

fn server_wait(ctx: &mut Context, inv: &Invocation) -> Result<()> {
    let id = inv.require_str("id")?;
    let path = format!("{BASE_URI}/servers/{}", path_segment(id));
    let outcome = ctx.wait_instance(subsystem::RESOURCE, id, &path, "server.status")?;
    let elapsed = ui::format_elapsed(outcome.elapsed);
    match outcome.status.as_str() {
        "ERROR" => bail!("server {id} went to ERROR after {elapsed}"),
        _ if outcome.is_timeout() => {
            ui::warn(&format!("server {id} still pending after {elapsed}"));
            Ok(())
        }
        status => {
            ctx.emit_line(&format!("server {id} is {status}"));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::ArgValue;
    use crate::cli::crud;
    use crate::cli::registry::Action;
    use crate::context::testing::context;
    use crate::render::Format;
    use cmpkit::Method;
    use cmpkit::transport::RequestBody;
    use serde_json::json;

    const TASK: &str = "0d6f2c3e-5b7a-4c1d-9e8f-1a2b3c4d5e6f";

    fn server_add() -> Crud {
        let mut reg = Registry::new();
        register(&mut reg);
        let tree = reg.build().unwrap();
        let leaf = tree.find(&["openstack", "server_add"]).unwrap();
        match &leaf.spec.action {
            Action::Crud(crud) => crud.clone(),
            Action::Custom(_) => panic!("server_add is a CRUD leaf"),
        }
    }

    #[test]
    fn test_server_add_waits_and_reports() {
        let (mut ctx, mock, _dir) = context(Format::Text);
        mock.on(
            Method::Post,
            "/v1.0/nrs/openstack/servers",
            202,
            json!({"uuid": "S", "taskid": TASK}),
        );
        let status = cmpkit::task::task_status_path(subsystem::RESOURCE, TASK);
        mock.on(Method::Get, &status, 200, json!({"status": "PENDING"}));
        mock.on(Method::Get, &status, 200, json!({"status": "STARTED"}));
        mock.on(Method::Get, &status, 200, json!({"status": "SUCCESS"}));

        let inv = Invocation::new("openstack server_add")
            .with_str("name", "vm1")
            .with_str("flavor", "F")
            .with_str("image", "I")
            .with("networks", ArgValue::List(vec!["N".into()]));
        let meta = Metadata::subsystem(subsystem::RESOURCE, BASE_URI);
        crud::execute(&mut ctx, &meta, &server_add(), &inv).unwrap();

        assert_eq!(mock.count(Method::Get, &status), 3);
        assert_eq!(ctx.captured().trim(), "add server vm1 with id S");

        let post = mock
            .requests()
            .into_iter()
            .find(|r| r.method == Method::Post && r.path == "/v1.0/nrs/openstack/servers")
            .unwrap();
        let RequestBody::Json(body) = post.body else {
            panic!("expected a JSON body");
        };
        assert_eq!(
            body,
            json!({"server": {"name": "vm1", "flavor": "F", "image": "I", "networks": ["N"]}})
        );
    }

    #[test]
    fn test_server_wait_until_active() {
        let (mut ctx, mock, _dir) = context(Format::Text);
        let path = "/v1.0/nrs/openstack/servers/S";
        mock.on(Method::Get, path, 200, json!({"server": {"status": "BUILD"}}));
        mock.on(Method::Get, path, 200, json!({"server": {"status": "ACTIVE"}}));

        let inv = Invocation::new("openstack server-wait").with_str("id", "S");
        server_wait(&mut ctx, &inv).unwrap();
        assert_eq!(mock.count(Method::Get, path), 2);
        assert_eq!(ctx.captured().trim(), "server S is ACTIVE");
    }

    #[test]
    fn test_server_wait_error_fails() {
        let (mut ctx, mock, _dir) = context(Format::Text);
        mock.on(
            Method::Get,
            "/v1.0/nrs/openstack/servers/S",
            200,
            json!({"server": {"status": "ERROR"}}),
        );
        let inv = Invocation::new("openstack server-wait").with_str("id", "S");
        let err = server_wait(&mut ctx, &inv).unwrap_err();
        assert!(err.to_string().contains("ERROR"));
    }
}
