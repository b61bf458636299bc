//! Per-invocation state shared by every handler.
//!
//! The pre-command hook ([`Context::connect`]) builds the API client for the
//! selected environment; the post-command hook ([`Context::flush`]) writes
//! the session back to the token cache whatever the outcome.

use crate::paths;
use crate::render::{self, Format, RenderSpec};
use anyhow::{Context as _, Result};
use cmpkit::task::{self, WaitOutcome};
use cmpkit::value::{lookup, scalar_text};
use cmpkit::{
    ApiClient, Clock, ClientOptions, CmpApi, ConfigLoader, EnvironmentConfig, SystemClock, TokenCache,
    WaitOptions,
};
use serde_json::Value;
use std::path::PathBuf;

/// Global options, parsed before the leaf runs.
#[derive(Debug, Clone)]
pub struct Globals {
    pub env: String,
    pub format: Format,
    pub verbose: u8,
    pub key: Option<String>,
    pub colored: bool,
}

enum Output {
    Stdout,
    /// Output kept in memory instead of printed.
    Captured(String),
}

pub struct Context {
    pub env: String,
    pub format: Format,
    pub verbose: u8,
    pub key: Option<String>,
    pub colored: bool,
    pub config_root: PathBuf,
    pub token_dir: PathBuf,
    client: Option<ApiClient>,
    clock: Box<dyn Clock>,
    output: Output,
}

impl Context {
    /// Resolve paths from the environment and build an unconnected context.
    pub fn new(globals: Globals) -> Result<Self> {
        Ok(Self::with_paths(
            globals,
            paths::config_dir()?,
            paths::token_dir()?,
        ))
    }

    pub fn with_paths(globals: Globals, config_root: PathBuf, token_dir: PathBuf) -> Self {
        Self {
            env: globals.env,
            format: globals.format,
            verbose: globals.verbose,
            key: globals.key,
            colored: globals.colored,
            config_root,
            token_dir,
            client: None,
            clock: Box::new(SystemClock::new()),
            output: Output::Stdout,
        }
    }

    pub fn loader(&self) -> ConfigLoader {
        ConfigLoader::new(&self.config_root)
    }

    /// Load the active environment.
    pub fn load_config(&self) -> Result<EnvironmentConfig> {
        self.loader()
            .load(&self.env, self.key.as_deref())
            .with_context(|| format!("Failed to load environment '{}'", self.env))
    }

    /// Pre-command hook: build the API client for the active environment.
    pub fn connect(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }
        let config = self.load_config()?;
        let options = ClientOptions {
            verbose: self.verbose > 0,
            ..ClientOptions::default()
        };
        let client = ApiClient::connect(&config, TokenCache::new(&self.token_dir), options)?;
        log::debug!("Connected to environment {}", self.env);
        self.client = Some(client);
        Ok(())
    }

    /// Use an already built client (tests, embedding).
    pub fn set_client(&mut self, client: ApiClient) {
        self.client = Some(client);
    }

    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    /// Keep output in memory; see [`Context::captured`].
    pub fn capture_output(&mut self) {
        self.output = Output::Captured(String::new());
    }

    pub fn captured(&self) -> &str {
        match &self.output {
            Output::Captured(text) => text,
            Output::Stdout => "",
        }
    }

    /// The connected client.
    pub fn api(&mut self) -> Result<&mut ApiClient> {
        self.client
            .as_mut()
            .context("Not connected to the CMP (command did not request a client)")
    }

    /// The connected client together with the clock task waits run on.
    pub fn api_and_clock(&mut self) -> Result<(&mut ApiClient, &dyn Clock)> {
        let client = self
            .client
            .as_mut()
            .context("Not connected to the CMP (command did not request a client)")?;
        Ok((client, self.clock.as_ref()))
    }

    /// Post-command hook: persist the session.
    pub fn flush(&self) -> Result<()> {
        if let Some(client) = &self.client {
            client.flush()?;
        }
        Ok(())
    }

    /// Write text to the output stream.
    pub fn emit(&mut self, text: &str) {
        match &mut self.output {
            Output::Stdout => print!("{text}"),
            Output::Captured(buf) => buf.push_str(text),
        }
    }

    pub fn emit_line(&mut self, line: &str) {
        self.emit(line);
        self.emit("\n");
    }

    /// Render a payload in the selected format.
    pub fn render(&mut self, payload: &Value, spec: &RenderSpec) -> Result<()> {
        let text = render::render(payload, self.format, spec, self.use_color())?;
        self.emit(&text);
        if self.format != Format::Text && !text.ends_with('\n') {
            self.emit("\n");
        }
        Ok(())
    }

    fn use_color(&self) -> bool {
        self.colored
            && matches!(self.output, Output::Stdout)
            && console::Term::stdout().is_term()
    }

    /// Whether prompts and spinners make sense.
    pub fn is_interactive(&self) -> bool {
        matches!(self.output, Output::Stdout) && console::Term::stderr().is_term()
    }

    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            progress: self.format == Format::Text && self.is_interactive(),
            ..WaitOptions::default()
        }
    }

    /// Wait for a CMP task; `FAILURE` becomes an error carrying the trace.
    pub fn wait_task(&mut self, subsystem: &str, id: &str) -> Result<WaitOutcome> {
        let options = self.wait_options();
        let client = self
            .client
            .as_mut()
            .context("Not connected to the CMP")?;
        Ok(task::wait_remote_task(
            client,
            subsystem,
            id,
            &options,
            self.clock.as_ref(),
        )?)
    }

    /// Poll `path` until the value at `status_field` is an instance terminal status.
    pub fn wait_instance(
        &mut self,
        subsystem: &str,
        id: &str,
        path: &str,
        status_field: &str,
    ) -> Result<WaitOutcome> {
        let options = self.wait_options();
        let client = self
            .client
            .as_mut()
            .context("Not connected to the CMP")?;
        Ok(task::wait_instance(
            id,
            |_| {
                let response = client.get(subsystem, path)?;
                Ok(lookup(&response, status_field)
                    .map(scalar_text)
                    .unwrap_or_default())
            },
            &options,
            self.clock.as_ref(),
        ))
    }
}

#[cfg(test)]
pub mod testing {
    //! Helpers for handler tests: a context wired to a mock transport.

    use super::*;
    use cmpkit::{ManualClock, MockTransport};
    use tempfile::TempDir;

    pub const TEST_CONFIG: &str = "\
cmp:
  endpoint: https://cmp.test
  authtype: keyauth
  user: admin@local
  pwd: secret
";

    /// Context with captured output, a manual clock and a mock-backed client.
    pub fn context(format: Format) -> (Context, MockTransport, TempDir) {
        context_with_session(format, None)
    }

    /// Like [`context`], with `(token, seckey)` already in the token cache.
    pub fn context_with_session(
        format: Format,
        session: Option<(&str, &str)>,
    ) -> (Context, MockTransport, TempDir) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("dev.yml"), TEST_CONFIG).unwrap();
        let globals = Globals {
            env: "dev".into(),
            format,
            verbose: 0,
            key: None,
            colored: false,
        };
        let mut ctx = Context::with_paths(globals, dir.path().to_path_buf(), dir.path().join("tokens"));
        let mock = MockTransport::new();
        mock.on(
            cmpkit::Method::Post,
            cmpkit::auth::KEYAUTH_TOKEN_PATH,
            200,
            serde_json::json!({"access_token": "tok-1", "seckey": "c2VjcmV0"}),
        );
        let cache = TokenCache::new(&ctx.token_dir);
        if let Some((token, seckey)) = session {
            cache.write("dev", Some(token), Some(seckey)).unwrap();
        }
        let config = ctx.load_config().unwrap();
        let client = ApiClient::new(
            &config,
            cache,
            Box::new(mock.clone()),
            ClientOptions::default(),
        )
        .unwrap();
        ctx.set_client(client);
        ctx.set_clock(Box::new(ManualClock::new()));
        ctx.capture_output();
        (ctx, mock, dir)
    }
}
