//! Business service layer: definitions, instances and catalogs.

use crate::cli::args::ArgSpec;
use crate::cli::crud::Crud;
use crate::cli::registry::{LeafSpec, Metadata, ROOT, Registry};
use crate::render::RenderSpec;
use cmpkit::subsystem;

pub const BASE_URI: &str = "/v1.0/nws";

pub fn register(reg: &mut Registry) {
    reg.node(
        ROOT,
        "service",
        "Business service layer",
        Metadata::subsystem(subsystem::SERVICE, BASE_URI),
    );

    reg.node("service", "definitions", "Service definitions", Metadata::default());
    reg.leaf(LeafSpec::crud(
        "service.definitions",
        "get",
        "List service definitions or show one",
        Crud::get(
            "/servicedefs",
            "/servicedefs/{id}",
            RenderSpec::table(
                "servicedefs",
                &[
                    ("id", "id"),
                    ("uuid", "uuid"),
                    ("name", "name"),
                    ("version", "version"),
                    ("type", "service_type_id"),
                    ("status", "status"),
                ],
            ),
            RenderSpec::details("servicedef"),
        )
        .field(ArgSpec::named("plugintype", "plugin type filter")),
    ));

    reg.node("service", "instances", "Service instances", Metadata::default());
    reg.leaf(LeafSpec::crud(
        "service.instances",
        "get",
        "List service instances or show one",
        Crud::get(
            "/serviceinsts",
            "/serviceinsts/{id}",
            RenderSpec::table(
                "serviceinsts",
                &[
                    ("id", "id"),
                    ("uuid", "uuid"),
                    ("name", "name"),
                    ("account", "account_id"),
                    ("definition", "service_definition_id"),
                    ("status", "status"),
                    ("active", "active"),
                ],
            ),
            RenderSpec::details("serviceinst"),
        )
        .field(ArgSpec::named("account", "account id"))
        .field(ArgSpec::named("plugintype", "plugin type filter")),
    ));
    reg.leaf(LeafSpec::crud(
        "service.instances",
        "delete",
        "Delete a service instance",
        Crud::delete("/serviceinsts/{id}", "delete service instance {id}"),
    ));

    reg.node("service", "catalogs", "Service catalogs", Metadata::default());
    reg.leaf(LeafSpec::crud(
        "service.catalogs",
        "get",
        "List service catalogs or show one",
        Crud::get(
            "/srvcatalogs",
            "/srvcatalogs/{id}",
            RenderSpec::table(
                "catalogs",
                &[("id", "id"), ("uuid", "uuid"), ("name", "name"), ("desc", "desc"), ("active", "active")],
            ),
            RenderSpec::details("catalog"),
        ),
    ));
    reg.leaf(LeafSpec::crud(
        "service.catalogs",
        "add",
        "Create a service catalog",
        Crud::add("/srvcatalogs", "catalog", "add catalog {name} with id {uuid}")
            .field(ArgSpec::positional("name", "catalog name"))
            .field(ArgSpec::named("desc", "description")),
    ));
    reg.leaf(LeafSpec::crud(
        "service.catalogs",
        "delete",
        "Delete a service catalog",
        Crud::delete("/srvcatalogs/{id}", "delete catalog {id}"),
    ));
}
