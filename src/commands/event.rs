//! Event service.

use crate::cli::args::ArgSpec;
use crate::cli::crud::Crud;
use crate::cli::registry::{LeafSpec, Metadata, ROOT, Registry};
use crate::render::RenderSpec;
use cmpkit::subsystem;

pub const BASE_URI: &str = "/v1.0/nes";

pub fn register(reg: &mut Registry) {
    reg.node(
        ROOT,
        "event",
        "Event service",
        Metadata::subsystem(subsystem::EVENT, BASE_URI),
    );
    reg.node("event", "events", "Platform events", Metadata::default());
    reg.leaf(
        LeafSpec::crud(
            "event.events",
            "get",
            "List events or show one",
            Crud::get(
                "/events",
                "/events/{id}",
                RenderSpec::table(
                    "events",
                    &[
                        ("id", "event_id"),
                        ("type", "type"),
                        ("objid", "data.objid"),
                        ("op", "data.op"),
                        ("date", "date"),
                        ("source", "source.user"),
                    ],
                )
                .max_width(40),
                RenderSpec::details("event"),
            )
            .field(ArgSpec::named("type", "event type"))
            .field(ArgSpec::named("objid", "object id"))
            .field(ArgSpec::named("datefrom", "events after this date (YYYY-MM-DD)"))
            .field(ArgSpec::named("dateto", "events before this date (YYYY-MM-DD)")),
        )
        .example("beehive -e dev event events get -type API -size 20"),
    );
}
