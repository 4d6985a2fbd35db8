//! Profile catalog: built-in personas plus those from `[[profiles]]`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use turnstile_config::ProfileConfig;
use turnstile_core::profile::Profile;
use turnstile_core::registry::ToolRegistry;
use turnstile_core::tool::ToolSpec;

pub const DEFAULT_PROFILE: &str = "general";

const GENERAL_PROMPT: &str =
    "You are a helpful AI assistant. You answer questions clearly and concisely.";

const ASSISTANT_PROMPT: &str = "You are a helpful AI assistant with access to tools. \
Use them whenever a question depends on the current date or on information you may not have. \
Call get_current_datetime before reasoning about relative dates such as 'last week'. \
When you have enough information, answer directly without calling more tools.";

/// Summary shown by listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub name: String,
    pub system_prompt_preview: String,
    pub tool_names: Vec<String>,
    pub max_tool_rounds: u32,
}

impl From<&Profile> for ProfileInfo {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            system_prompt_preview: profile.system_prompt_preview(),
            tool_names: profile.tool_names(),
            max_tool_rounds: profile.max_tool_rounds,
        }
    }
}

/// Immutable set of profiles, shared by every conversation.
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    profiles: BTreeMap<String, Arc<Profile>>,
}

impl ProfileCatalog {
    /// The built-in `general` and `assistant` profiles.
    pub fn builtin(registry: &ToolRegistry) -> Self {
        Self::from_config(&[], registry)
    }

    /// Built-ins, then configured profiles. A configured profile replaces a
    /// built-in of the same name.
    pub fn from_config(configs: &[ProfileConfig], registry: &ToolRegistry) -> Self {
        let mut catalog = Self::default();
        catalog.insert(Profile::new(DEFAULT_PROFILE, GENERAL_PROMPT).with_max_tool_rounds(1));
        catalog.insert(
            Profile::new("assistant", ASSISTANT_PROMPT).with_tools(resolve_tools(
                "assistant",
                &["get_current_datetime", "web_search"],
                registry,
            )),
        );

        for config in configs {
            let tool_names: Vec<&str> = config.tools.iter().map(String::as_str).collect();
            catalog.insert(
                Profile::new(&config.name, &config.system_prompt)
                    .with_tools(resolve_tools(&config.name, &tool_names, registry))
                    .with_max_tool_rounds(config.max_tool_rounds)
                    .with_max_tokens(config.max_tokens)
                    .with_temperature(config.temperature),
            );
        }

        debug!(profiles = ?catalog.names(), "Profile catalog built");
        catalog
    }

    pub fn insert(&mut self, profile: Profile) {
        self.profiles.insert(profile.name.clone(), Arc::new(profile));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Profile>> {
        self.profiles.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn infos(&self) -> Vec<ProfileInfo> {
        self.profiles.values().map(|p| ProfileInfo::from(p.as_ref())).collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn resolve_tools(profile: &str, names: &[&str], registry: &ToolRegistry) -> Vec<ToolSpec> {
    names
        .iter()
        .filter_map(|name| {
            let spec = registry.spec(name).cloned();
            if spec.is_none() {
                warn!(profile, tool = name, "Profile references unknown tool, skipping");
            }
            spec
        })
        .collect()
}
