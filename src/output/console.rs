use super::{Classification, PolicySummary};

/// Render classifications as an aligned table.
pub fn render_classifications(items: &[Classification]) -> String {
    let mut output = String::new();
    output.push_str(&format!("{:<16} {:<10} FILENAME\n", "KIND", "VERSION"));
    output.push_str(&format!("{}\n", "-".repeat(60)));
    for item in items {
        output.push_str(&format!(
            "{:<16} {:<10} {}\n",
            item.kind.to_string(),
            item.version.as_deref().unwrap_or("-"),
            item.filename
        ));
    }
    output
}

/// Render policies grouped by scope, packages sorted within each scope.
pub fn render_policies(policies: &[PolicySummary]) -> String {
    let mut output = String::new();

    if policies.is_empty() {
        output.push_str("\n  No policies found.\n\n");
        return output;
    }

    let mut sorted: Vec<&PolicySummary> = policies.iter().collect();
    sorted.sort_by(|a, b| a.scope.cmp(&b.scope).then_with(|| a.package.cmp(&b.package)));

    output.push_str(&format!("\n  {} policy(ies):\n\n", policies.len()));
    for policy in sorted {
        let architectures = if policy.architectures.is_empty() {
            "none".to_string()
        } else {
            policy.architectures.join(", ")
        };
        output.push_str(&format!("  {}/{}\n", policy.scope, policy.package));
        if !policy.repo.is_empty() {
            output.push_str(&format!("           repo: {}\n", policy.repo));
        }
        output.push_str(&format!("           enables: {architectures}\n"));
        output.push_str(&format!("           digest: {}\n\n", policy.digest));
    }

    output
}
