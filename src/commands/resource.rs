//! Resource management service: entities and containers.

use crate::cli::args::ArgSpec;
use crate::cli::crud::Crud;
use crate::cli::registry::{LeafSpec, Metadata, ROOT, Registry};
use crate::render::RenderSpec;
use cmpkit::subsystem;
use serde_json::Value;

pub const BASE_URI: &str = "/v1.0/nrs";

fn short_state(state: &Value) -> Value {
    match state.as_str() {
        Some(s) => Value::String(s.trim_start_matches("State.").to_lowercase()),
        None => state.clone(),
    }
}

pub fn register(reg: &mut Registry) {
    reg.node(
        ROOT,
        "resource",
        "Resource management service",
        Metadata::subsystem(subsystem::RESOURCE, BASE_URI),
    );

    reg.node("resource", "entities", "Resource entities", Metadata::default());
    reg.leaf(
        LeafSpec::crud(
            "resource.entities",
            "get",
            "List resource entities or show one",
            Crud::get(
                "/entities",
                "/entities/{id}",
                RenderSpec::table(
                    "resources",
                    &[
                        ("id", "id"),
                        ("uuid", "uuid"),
                        ("definition", "__meta__.definition"),
                        ("name", "name"),
                        ("container", "container"),
                        ("parent", "parent"),
                        ("state", "state"),
                    ],
                )
                .transform("state", short_state),
                RenderSpec::details("resource"),
            )
            .field(ArgSpec::named("container", "container id"))
            .field(ArgSpec::named("type", "resource type"))
            .field(ArgSpec::named("name", "name pattern")),
        )
        .example("beehive -e dev -o json resource entities get -size 1"),
    );
    reg.leaf(LeafSpec::crud(
        "resource.entities",
        "delete",
        "Delete a resource entity",
        Crud::delete("/entities/{id}", "delete resource {id}"),
    ));

    reg.node("resource", "containers", "Resource containers", Metadata::default());
    reg.leaf(LeafSpec::crud(
        "resource.containers",
        "get",
        "List containers or show one",
        Crud::get(
            "/containers",
            "/containers/{id}",
            RenderSpec::table(
                "resourcecontainers",
                &[
                    ("id", "id"),
                    ("uuid", "uuid"),
                    ("category", "category"),
                    ("name", "name"),
                    ("state", "state"),
                    ("ping", "ping"),
                ],
            )
            .transform("state", short_state),
            RenderSpec::details("resourcecontainer"),
        ),
    ));
    reg.leaf(LeafSpec::crud(
        "resource.containers",
        "add",
        "Create a container",
        Crud::add("/containers", "resourcecontainer", "add container {name} with id {uuid}")
            .field(ArgSpec::positional("name", "container name"))
            .field(ArgSpec::named("type", "container type, e.g. Openstack").required())
            .field(ArgSpec::named("desc", "description")),
    ));
    reg.leaf(LeafSpec::crud(
        "resource.containers",
        "delete",
        "Delete a container",
        Crud::delete("/containers/{id}", "delete container {id}"),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{ArgValue, Invocation};
    use crate::cli::crud;
    use crate::context::testing::context;
    use crate::render::Format;
    use cmpkit::Method;
    use serde_json::json;

    fn entities_get() -> Crud {
        Crud::get(
            "/entities",
            "/entities/{id}",
            RenderSpec::table("resources", &[("id", "id"), ("state", "state")])
                .transform("state", short_state),
            RenderSpec::details("resource"),
        )
    }

    #[test]
    fn test_short_state() {
        assert_eq!(short_state(&json!("State.ACTIVE")), json!("active"));
        assert_eq!(short_state(&json!(3)), json!(3));
    }

    #[test]
    fn test_entities_json_is_verbatim() {
        let (mut ctx, mock, _dir) = context(Format::Json);
        let payload = json!({
            "resources": [{"id": 7, "state": "State.ACTIVE", "__meta__": {"definition": "vm"}}],
            "count": 1,
            "page": 0,
            "total": 42,
            "sort": {"field": "id", "order": "DESC"}
        });
        mock.on(Method::Get, "/v1.0/nrs/entities", 200, payload.clone());

        let inv = Invocation::new("resource entities get").with("size", ArgValue::Int(1));
        let meta = Metadata::subsystem(subsystem::RESOURCE, BASE_URI);
        crud::execute(&mut ctx, &meta, &entities_get(), &inv).unwrap();

        let printed: Value = serde_json::from_str(ctx.captured()).unwrap();
        assert_eq!(printed, payload);
        assert!(printed["resources"].as_array().unwrap().len() <= 1);
        assert!(printed["page"].is_i64() && printed["count"].is_i64() && printed["total"].is_i64());
    }

    #[test]
    fn test_entities_text_applies_transform() {
        let (mut ctx, mock, _dir) = context(Format::Text);
        mock.on(
            Method::Get,
            "/v1.0/nrs/entities",
            200,
            json!({"resources": [{"id": 7, "state": "State.ACTIVE"}]}),
        );
        let meta = Metadata::subsystem(subsystem::RESOURCE, BASE_URI);
        crud::execute(&mut ctx, &meta, &entities_get(), &Invocation::new("x")).unwrap();
        let out = ctx.captured();
        assert!(out.contains("active"));
        assert!(!out.contains("State.ACTIVE"));
    }
}
