//! Argument schema of leaf commands and the parsed values a handler sees.

use crate::error::UsageError;
use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Default page size of paginated lists.
pub const DEFAULT_PAGE_SIZE: &str = "10";
const ORDERS: [&str; 2] = ["ASC", "DESC"];

/// Value type of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Str,
    Int,
    /// Boolean switch without a value.
    Flag,
    /// Comma separated list.
    List,
}

/// Whether the argument is positional or named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Positional,
    Named,
}

/// One declared argument of a leaf.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: &'static str,
    pub short: Option<char>,
    pub kind: ArgKind,
    pub ty: ArgType,
    pub required: bool,
    pub default: Option<&'static str>,
    pub help: &'static str,
    pub choices: Option<&'static [&'static str]>,
}

impl ArgSpec {
    pub fn positional(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            short: None,
            kind: ArgKind::Positional,
            ty: ArgType::Str,
            required: true,
            default: None,
            help,
            choices: None,
        }
    }

    pub fn named(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            short: None,
            kind: ArgKind::Named,
            ty: ArgType::Str,
            required: false,
            default: None,
            help,
            choices: None,
        }
    }

    pub fn flag(name: &'static str, help: &'static str) -> Self {
        Self {
            ty: ArgType::Flag,
            ..Self::named(name, help)
        }
    }

    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn int(mut self) -> Self {
        self.ty = ArgType::Int;
        self
    }

    pub fn list(mut self) -> Self {
        self.ty = ArgType::List;
        self
    }

    pub fn default(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    pub fn choices(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = Some(choices);
        self
    }

    /// The pagination flags shared by list commands.
    pub fn pagination() -> Vec<Self> {
        vec![
            Self::named("size", "number of items per page").int().default(DEFAULT_PAGE_SIZE),
            Self::named("page", "page to show, starting from 0").int().default("0"),
            Self::named("order", "sort order").choices(&ORDERS).default("DESC"),
            Self::named("field", "field to sort by").default("id"),
        ]
    }

    /// Build the clap argument.
    pub fn to_arg(&self) -> Arg {
        let mut arg = Arg::new(self.name).help(self.help);
        if self.kind == ArgKind::Named {
            arg = arg.long(self.name);
        }
        if let Some(short) = self.short {
            arg = arg.short(short);
        }
        arg = match self.ty {
            ArgType::Flag => arg.action(ArgAction::SetTrue),
            ArgType::Int => arg.value_parser(clap::value_parser!(i64)),
            ArgType::Str | ArgType::List => match self.choices {
                Some(choices) => arg.value_parser(choices.to_vec()),
                None => arg,
            },
        };
        if let Some(default) = self.default {
            arg = arg.default_value(default);
        }
        if self.ty != ArgType::Flag && self.required {
            arg = arg.required(true);
        }
        arg
    }
}

/// A parsed argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Flag(bool),
    List(Vec<String>),
}

impl ArgValue {
    /// JSON form used in request bodies.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::Int(n) => Value::from(*n),
            Self::Flag(b) => Value::Bool(*b),
            Self::List(items) => Value::from(items.clone()),
        }
    }

    /// Text form used in paths, queries and messages.
    pub fn to_text(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(n) => n.to_string(),
            Self::Flag(b) => b.to_string(),
            Self::List(items) => items.join(","),
        }
    }
}

/// Split a comma separated list, dropping empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Arguments given to one leaf invocation.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Space separated command path, e.g. `auth users get`.
    pub command: String,
    values: BTreeMap<String, ArgValue>,
}

impl Invocation {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            values: BTreeMap::new(),
        }
    }

    /// Collect the values of `specs` from clap matches.
    pub fn from_matches(command: &str, specs: &[ArgSpec], matches: &ArgMatches) -> Result<Self> {
        let mut inv = Self::new(command);
        for spec in specs {
            let value = match spec.ty {
                ArgType::Flag => Some(ArgValue::Flag(
                    matches.try_get_one::<bool>(spec.name)?.copied().unwrap_or(false),
                )),
                ArgType::Int => matches.try_get_one::<i64>(spec.name)?.copied().map(ArgValue::Int),
                ArgType::Str => matches
                    .try_get_one::<String>(spec.name)?
                    .map(|s| ArgValue::Str(s.clone())),
                ArgType::List => matches
                    .try_get_one::<String>(spec.name)?
                    .map(|s| ArgValue::List(split_list(s))),
            };
            if let Some(value) = value {
                inv.values.insert(spec.name.to_string(), value);
            }
        }
        Ok(inv)
    }

    /// Set a value (used by tests and by handlers that derive arguments).
    pub fn with(mut self, name: &str, value: ArgValue) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn with_str(self, name: &str, value: &str) -> Self {
        self.with(name, ArgValue::Str(value.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Int(n)) => Some(*n),
            Some(ArgValue::Str(s)) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ArgValue::Flag(true)))
    }

    pub fn get_list(&self, name: &str) -> Vec<String> {
        match self.values.get(name) {
            Some(ArgValue::List(items)) => items.clone(),
            Some(ArgValue::Str(s)) => split_list(s),
            _ => Vec::new(),
        }
    }

    /// A string argument the handler cannot do without.
    pub fn require_str(&self, name: &str) -> Result<&str, UsageError> {
        self.get_str(name)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| UsageError::MissingArgument(name.to_string()))
    }

    /// Query parameters of the pagination flags, when present.
    pub fn pagination(&self) -> Vec<(String, String)> {
        ["size", "page", "order", "field"]
            .iter()
            .filter_map(|name| {
                self.values
                    .get(*name)
                    .map(|v| ((*name).to_string(), v.to_text()))
            })
            .collect()
    }

    /// Iterate over all values.
    pub fn values(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Rewrite single-dash long options (`-size 10`) to `--size 10`.
///
/// Only names in `long_names` are rewritten, so clustered short flags
/// (`-vv`) and negative numbers pass through untouched. Everything after a
/// bare `--` is left alone.
pub fn normalise_args<I>(args: I, long_names: &BTreeSet<String>) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut passthrough = false;
    args.into_iter()
        .map(|arg| {
            if passthrough {
                return arg;
            }
            if arg == "--" {
                passthrough = true;
                return arg;
            }
            let Some(rest) = arg.strip_prefix('-') else {
                return arg;
            };
            if rest.starts_with('-') || rest.chars().count() < 2 {
                return arg;
            }
            let name = rest.split_once('=').map_or(rest, |(name, _)| name);
            if long_names.contains(name) {
                format!("-{arg}")
            } else {
                arg
            }
        })
        .collect()
}
