//! `turnstile tools`: list registered tools.

use turnstile_core::registry::ToolRegistry;

pub fn run() -> anyhow::Result<()> {
    let registry = turnstile_tools::default_registry();
    print!("{}", render(&registry));
    Ok(())
}

fn render(registry: &ToolRegistry) -> String {
    let mut out = format!("Tools ({})\n", registry.len());
    for spec in registry.specs() {
        let lazy = if registry.is_resolved(&spec.name) {
            ""
        } else {
            " (loaded on first use)"
        };
        out.push_str(&format!("  {}{lazy}\n", spec.name));
        out.push_str(&format!("      {}\n", spec.description));

        let params = spec.parameters["properties"]
            .as_object()
            .map(|props| props.keys().cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        if !params.is_empty() {
            out.push_str(&format!("      params: {params}\n"));
        }
    }
    out
}
