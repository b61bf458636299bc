//! Identity and authorization service: users, roles, groups and sessions.

use crate::cli::args::{ArgSpec, Invocation};
use crate::cli::crud::Crud;
use crate::cli::registry::{LeafSpec, Metadata, ROOT, Registry};
use crate::context::Context;
use crate::render::RenderSpec;
use crate::ui;
use anyhow::Result;
use cmpkit::value::lookup;
use cmpkit::{CmpApi, subsystem};
use serde_json::{Value, json};

pub const BASE_URI: &str = "/v1.0/nas";

/// Token introspection of the current session.
pub const CURRENT_TOKEN_PATH: &str = "/v1.0/nas/tokens/current";

pub fn register(reg: &mut Registry) {
    reg.node(
        ROOT,
        "auth",
        "Identity and authorization service",
        Metadata::subsystem(subsystem::AUTH, BASE_URI),
    );

    register_users(reg);
    register_roles(reg);
    register_groups(reg);

    reg.node("auth", "tokens", "Session tokens", Metadata::default());
    reg.leaf(
        LeafSpec::custom("auth.tokens", "get-my-token", "Print the token of the current session", get_my_token)
            .description(
                "Validate the cached session against the CMP, issuing a new one when it has \
                 expired, and print its token.",
            )
            .example("beehive -e dev auth tokens get-my-token")
            .with_api(),
    );

    reg.node("auth", "session", "Local session management", Metadata::default());
    reg.leaf(
        LeafSpec::custom("auth.session", "login", "Issue a new session", login).with_api(),
    );
    reg.leaf(
        LeafSpec::custom("auth.session", "logout", "Forget the cached session", logout).with_api(),
    );
    reg.leaf(
        LeafSpec::custom("auth.session", "show", "Show the cached session", show).with_api(),
    );
}

fn users_table() -> RenderSpec {
    RenderSpec::table(
        "users",
        &[
            ("id", "id"),
            ("uuid", "uuid"),
            ("name", "name"),
            ("active", "active"),
            ("date", "date.creation"),
            ("desc", "desc"),
        ],
    )
}

fn register_users(reg: &mut Registry) {
    reg.node("auth", "users", "Users", Metadata::default());
    reg.leaf(
        LeafSpec::crud(
            "auth.users",
            "get",
            "List users or show one",
            Crud::get("/users", "/users/{id}", users_table(), RenderSpec::details("user"))
                .field(ArgSpec::named("group", "only users of this group"))
                .field(ArgSpec::named("role", "only users with this role")),
        )
        .example("beehive -e dev auth users get -id U1"),
    );
    reg.leaf(LeafSpec::crud(
        "auth.users",
        "add",
        "Create a user",
        Crud::add("/users", "user", "add user {name} with id {uuid}")
            .field(ArgSpec::positional("name", "user name, e.g. user@domain"))
            .field(ArgSpec::named("password", "initial password"))
            .field(ArgSpec::named("desc", "description"))
            .field(ArgSpec::named("email", "e-mail address"))
            .field_as(ArgSpec::named("expiry-date", "expiry date (YYYY-MM-DD)"), "expiry_date"),
    ));
    reg.leaf(LeafSpec::crud(
        "auth.users",
        "update",
        "Update a user",
        Crud::update("/users/{id}", "user", "update user {id}")
            .field(ArgSpec::named("desc", "description"))
            .field(ArgSpec::named("email", "e-mail address"))
            .field(ArgSpec::named("active", "activate or deactivate").choices(&["true", "false"])),
    ));
    reg.leaf(LeafSpec::crud(
        "auth.users",
        "delete",
        "Delete a user",
        Crud::delete("/users/{id}", "delete user {id}"),
    ));
}

fn register_roles(reg: &mut Registry) {
    reg.node("auth", "roles", "Roles", Metadata::default());
    reg.leaf(LeafSpec::crud(
        "auth.roles",
        "get",
        "List roles or show one",
        Crud::get(
            "/roles",
            "/roles/{id}",
            RenderSpec::table(
                "roles",
                &[("id", "id"), ("uuid", "uuid"), ("name", "name"), ("alias", "alias"), ("desc", "desc")],
            ),
            RenderSpec::details("role"),
        )
        .field(ArgSpec::named("user", "only roles of this user"))
        .field(ArgSpec::named("group", "only roles of this group")),
    ));
    reg.leaf(LeafSpec::crud(
        "auth.roles",
        "add",
        "Create a role",
        Crud::add("/roles", "role", "add role {name} with id {uuid}")
            .field(ArgSpec::positional("name", "role name"))
            .field(ArgSpec::named("desc", "description")),
    ));
    reg.leaf(LeafSpec::crud(
        "auth.roles",
        "update",
        "Update a role",
        Crud::update("/roles/{id}", "role", "update role {id}")
            .field(ArgSpec::named("desc", "description"))
            .field(ArgSpec::named("name", "new name")),
    ));
    reg.leaf(LeafSpec::crud(
        "auth.roles",
        "delete",
        "Delete a role",
        Crud::delete("/roles/{id}", "delete role {id}"),
    ));
}

fn register_groups(reg: &mut Registry) {
    reg.node("auth", "groups", "Groups", Metadata::default());
    reg.leaf(LeafSpec::crud(
        "auth.groups",
        "get",
        "List groups or show one",
        Crud::get(
            "/groups",
            "/groups/{id}",
            RenderSpec::table(
                "groups",
                &[("id", "id"), ("uuid", "uuid"), ("name", "name"), ("active", "active"), ("desc", "desc")],
            ),
            RenderSpec::details("group"),
        ),
    ));
    reg.leaf(LeafSpec::crud(
        "auth.groups",
        "add",
        "Create a group",
        Crud::add("/groups", "group", "add group {name} with id {uuid}")
            .field(ArgSpec::positional("name", "group name"))
            .field(ArgSpec::named("desc", "description")),
    ));
    reg.leaf(LeafSpec::crud(
        "auth.groups",
        "add-user",
        "Add users to a group",
        Crud::update("/groups/{id}", "group", "group {id} updated")
            .field_as(ArgSpec::named("users", "comma separated user names").list().required(), "users.append"),
    ));
    reg.leaf(LeafSpec::crud(
        "auth.groups",
        "delete",
        "Delete a group",
        Crud::delete("/groups/{id}", "delete group {id}"),
    ));
}

fn get_my_token(ctx: &mut Context, _inv: &Invocation) -> Result<()> {
    let response = ctx.api()?.get(subsystem::AUTH, CURRENT_TOKEN_PATH)?;
    let client = ctx.api()?;
    let token = client.session().token.clone().unwrap_or_default();
    let details = json!({
        "env": client.env(),
        "token": token,
        "user": lookup(&response, "token.user").cloned().unwrap_or(Value::Null),
        "expires_at": lookup(&response, "token.expires_at").cloned().unwrap_or(Value::Null),
    });
    ctx.render(&details, &RenderSpec::details(""))
}

fn login(ctx: &mut Context, _inv: &Invocation) -> Result<()> {
    let client = ctx.api()?;
    let session = client.login()?;
    let token = session.token.as_deref().map(ui::mask);
    let env = client.env().to_string();
    match token {
        Some(token) => ui::success(&format!("Logged in to {env} ({token})")),
        None => ui::warn(&format!("The CMP of {env} did not issue a session")),
    }
    Ok(())
}

fn logout(ctx: &mut Context, _inv: &Invocation) -> Result<()> {
    let client = ctx.api()?;
    client.logout()?;
    ui::success(&format!("Session for {} removed", client.env()));
    Ok(())
}

fn show(ctx: &mut Context, _inv: &Invocation) -> Result<()> {
    let client = ctx.api()?;
    let session = client.session();
    let details = json!({
        "env": client.env(),
        "token": session.token.as_deref().map(ui::mask),
        "seckey": session.seckey.as_deref().map(|_| "***"),
    });
    ctx.render(&details, &RenderSpec::details(""))
}
