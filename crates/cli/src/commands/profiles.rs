//! `turnstile profiles`: list agent profiles.

use anyhow::Context;
use turnstile_agent::ProfileCatalog;
use turnstile_config::AppConfig;

pub fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let registry = turnstile_tools::default_registry();
    let catalog = ProfileCatalog::from_config(&config.profiles, &registry);
    print!("{}", render(&catalog));
    Ok(())
}

fn render(catalog: &ProfileCatalog) -> String {
    let mut out = format!("Profiles ({})\n", catalog.len());
    for info in catalog.infos() {
        let tools = if info.tool_names.is_empty() {
            "none".to_string()
        } else {
            info.tool_names.join(", ")
        };
        out.push_str(&format!(
            "  {} (max {} rounds)\n      tools: {tools}\n      prompt: {}\n",
            info.name, info.max_tool_rounds, info.system_prompt_preview
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_builtin_profiles() {
        let catalog = ProfileCatalog::builtin(&turnstile_tools::default_registry());
        let text = render(&catalog);
        assert!(text.starts_with("Profiles (2)"));
        assert!(text.contains("  general (max 1 rounds)\n      tools: none"));
        assert!(text.contains("tools: get_current_datetime, web_search"));
    }
}
