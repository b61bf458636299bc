//! Local platform commands: environments, orchestrator settings, secret
//! encryption and the post-install customizer.

use crate::cli::args::{ArgSpec, Invocation};
use crate::cli::registry::{LeafSpec, Metadata, ROOT, Registry};
use crate::context::Context;
use crate::customize::{self, ApplyOptions};
use crate::error::UsageError;
use crate::render::RenderSpec;
use anyhow::{Result, anyhow};
use cmpkit::vault::{self, VaultKey};
use serde_json::{Value, json};

/// Keys whose values are never printed.
const SECRET_KEYS: [&str; 5] = ["pwd", "password", "secret", "priv_key", "private_key"];

pub fn register(reg: &mut Registry) {
    reg.node(ROOT, "platform", "Local configuration and platform bootstrap", Metadata::default());

    reg.leaf(LeafSpec::custom("platform", "envs", "List configured environments", envs));
    reg.leaf(
        LeafSpec::custom(
            "platform",
            "orchestrator",
            "Show an orchestrator of the active environment",
            orchestrator,
        )
        .arg(ArgSpec::named("kind", "orchestrator kind, e.g. openstack").required())
        .arg(ArgSpec::named("label", "orchestrator label").required())
        .example("beehive -e dev platform orchestrator -kind openstack -label site1"),
    );
    reg.leaf(
        LeafSpec::custom(
            "platform",
            "config-encrypt",
            "Encrypt a value for use in an environment file",
            config_encrypt,
        )
        .arg(ArgSpec::positional("value", "plain text to encrypt"))
        .example("beehive -k $KEY platform config-encrypt s3cret"),
    );

    reg.leaf(LeafSpec::custom(
        "platform",
        "customize-list",
        "List customization specs",
        customize_list,
    ));
    reg.leaf(
        LeafSpec::custom("platform", "customize-show", "Show the objects a spec declares", customize_show)
            .arg(ArgSpec::positional("name", "spec name")),
    );
    reg.leaf(
        LeafSpec::custom(
            "platform",
            "customize-diff",
            "Show what applying a spec would change",
            customize_diff,
        )
        .arg(ArgSpec::positional("name", "spec name"))
        .arg(ArgSpec::named("sections", "only these sections, e.g. auth,ssh").list())
        .with_api(),
    );
    reg.leaf(
        LeafSpec::custom("platform", "customize-apply", "Converge the CMP towards a spec", customize_apply)
            .description(
                "Create the objects a spec declares and are missing, update the ones marked \
                 `update: true` and converge association lists. Nothing is ever deleted.",
            )
            .arg(ArgSpec::positional("name", "spec name"))
            .arg(ArgSpec::named("sections", "only these sections, e.g. auth,ssh").list())
            .arg(ArgSpec::flag("dry-run", "show the changes without applying them"))
            .arg(ArgSpec::flag("yes", "apply without asking").short('y'))
            .example("beehive -e dev platform customize-apply demo -sections auth -y")
            .with_api(),
    );
}

fn envs(ctx: &mut Context, _inv: &Invocation) -> Result<()> {
    let rows: Vec<Value> = ctx
        .loader()
        .list()?
        .into_iter()
        .map(|name| {
            let active = if name == ctx.env { "*" } else { "" };
            json!({"name": name, "active": active})
        })
        .collect();
    ctx.render(
        &json!({ "envs": rows }),
        &RenderSpec::table("envs", &[("active", "active"), ("name", "name")]),
    )
}

/// Replace secret values, at any depth, with `***`.
fn mask_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                if SECRET_KEYS.contains(&key.as_str()) && !item.is_null() {
                    *item = Value::String("***".into());
                } else {
                    mask_secrets(item);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_secrets),
        _ => {}
    }
}

fn orchestrator(ctx: &mut Context, inv: &Invocation) -> Result<()> {
    let kind = inv.require_str("kind")?;
    let label = inv.require_str("label")?;
    let config = ctx.load_config()?;
    let mut details = config.get_orchestrator(kind, label)?.clone();
    mask_secrets(&mut details);
    ctx.render(&details, &RenderSpec::details(""))
}

fn config_encrypt(ctx: &mut Context, inv: &Invocation) -> Result<()> {
    let value = inv.require_str("value")?;
    let passphrase = ctx
        .key
        .clone()
        .ok_or_else(|| UsageError::MissingArgument("key".into()))?;
    let key = VaultKey::derive(&passphrase);
    let encrypted = vault::encrypt(&key, value).map_err(|e| anyhow!("encryption failed: {e}"))?;
    ctx.emit_line(&encrypted);
    Ok(())
}

fn customize_list(ctx: &mut Context, _inv: &Invocation) -> Result<()> {
    customize::list(ctx)
}

fn customize_show(ctx: &mut Context, inv: &Invocation) -> Result<()> {
    customize::show(ctx, inv.require_str("name")?)
}

fn customize_diff(ctx: &mut Context, inv: &Invocation) -> Result<()> {
    let name = inv.require_str("name")?.to_string();
    customize::diff(ctx, &name, &inv.get_list("sections"))
}

fn customize_apply(ctx: &mut Context, inv: &Invocation) -> Result<()> {
    let name = inv.require_str("name")?.to_string();
    let opts = ApplyOptions {
        sections: inv.get_list("sections"),
        dry_run: inv.flag("dry-run"),
        assume_yes: inv.flag("yes"),
    };
    customize::apply(ctx, &name, &opts).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::ArgValue;
    use crate::context::testing::{TEST_CONFIG, context};
    use crate::render::Format;

    #[test]
    fn test_envs_marks_active() {
        let (mut ctx, _mock, dir) = context(Format::Json);
        std::fs::write(dir.path().join("prod.yml"), TEST_CONFIG).unwrap();
        envs(&mut ctx, &Invocation::new("platform envs")).unwrap();
        let printed: Value = serde_json::from_str(ctx.captured()).unwrap();
        assert_eq!(
            printed["envs"],
            json!([{"name": "dev", "active": "*"}, {"name": "prod", "active": ""}])
        );
    }

    #[test]
    fn test_orchestrator_masks_passwords() {
        let (mut ctx, _mock, dir) = context(Format::Json);
        let config = format!(
            "{TEST_CONFIG}orchestrators:\n  openstack:\n    site1:\n      host: os.test\n      user: admin\n      pwd: hunter2\n      extra:\n        secret: s\n"
        );
        std::fs::write(dir.path().join("dev.yml"), config).unwrap();
        let inv = Invocation::new("platform orchestrator")
            .with_str("kind", "openstack")
            .with_str("label", "site1");
        orchestrator(&mut ctx, &inv).unwrap();
        let printed: Value = serde_json::from_str(ctx.captured()).unwrap();
        assert_eq!(printed["host"], "os.test");
        assert_eq!(printed["pwd"], "***");
        assert_eq!(printed["extra"]["secret"], "***");

        let missing = Invocation::new("platform orchestrator")
            .with_str("kind", "openstack")
            .with_str("label", "nope");
        assert!(orchestrator(&mut ctx, &missing).is_err());
    }

    #[test]
    fn test_config_encrypt_round_trip() {
        let (mut ctx, _mock, _dir) = context(Format::Text);
        let inv = Invocation::new("platform config-encrypt").with_str("value", "s3cret");
        let err = config_encrypt(&mut ctx, &inv).unwrap_err();
        assert_eq!(crate::error::exit_code(&err), 2);

        ctx.key = Some("passphrase".into());
        config_encrypt(&mut ctx, &inv).unwrap();
        let encrypted = ctx.captured().trim().to_string();
        assert!(vault::is_encrypted(&encrypted));
        let plain = vault::decrypt(&VaultKey::derive("passphrase"), &encrypted).unwrap();
        assert_eq!(plain, "s3cret");
    }

    #[test]
    fn test_customize_apply_flags() {
        let (mut ctx, _mock, dir) = context(Format::Json);
        std::fs::create_dir_all(dir.path().join("customize")).unwrap();
        std::fs::write(
            dir.path().join("customize/demo.yml"),
            "ssh:\n  groups:\n    - name: dbs\n",
        )
        .unwrap();
        let inv = Invocation::new("platform customize-apply")
            .with_str("name", "demo")
            .with("dry-run", ArgValue::Flag(true));
        customize_apply(&mut ctx, &inv).unwrap();
        let printed: Value = serde_json::from_str(ctx.captured()).unwrap();
        assert_eq!(printed["skipped"], 1);

        let bad = Invocation::new("platform customize-apply")
            .with_str("name", "demo")
            .with("sections", ArgValue::List(vec!["nope".into()]));
        let err = customize_apply(&mut ctx, &bad).unwrap_err();
        assert_eq!(crate::error::exit_code(&err), 2);
    }
}
