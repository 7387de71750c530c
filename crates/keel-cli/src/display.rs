//! Display formatting for CLI output

use console::style;
use keel_kube::{AppliedResource, ApplyOutcome, Feature, FeatureError, FeatureSetError};

/// Created, unchanged and patched counts
fn outcome_counts(applied: &[AppliedResource]) -> (usize, usize, usize) {
    applied
        .iter()
        .fold((0, 0, 0), |(created, unchanged, patched), r| match r.outcome {
            ApplyOutcome::Created => (created + 1, unchanged, patched),
            ApplyOutcome::Unchanged => (created, unchanged + 1, patched),
            ApplyOutcome::Patched => (created, unchanged, patched + 1),
        })
}

/// One-line summary of what a feature's manifests did
pub fn format_outcome(applied: &[AppliedResource]) -> String {
    if applied.is_empty() {
        return "no manifests".to_string();
    }
    let (created, unchanged, patched) = outcome_counts(applied);
    let mut parts = Vec::new();
    if created > 0 {
        parts.push(format!("{} created", created));
    }
    if unchanged > 0 {
        parts.push(format!("{} unchanged", unchanged));
    }
    if patched > 0 {
        parts.push(format!("{} patched", patched));
    }
    parts.join(", ")
}

fn failed<'a>(error: Option<&'a FeatureSetError>, name: &str) -> Option<&'a FeatureError> {
    error?.failures.iter().find(|f| f.feature() == name)
}

/// Per-feature result of an apply
pub fn apply_report(features: &[Feature], error: Option<&FeatureSetError>) {
    println!();
    for feature in features {
        if !feature.enabled {
            println!("  {} {} {}", style("-").dim(), feature.name, style("(disabled)").dim());
            continue;
        }
        match failed(error, &feature.name) {
            Some(e) => {
                println!(
                    "  {} {} {}",
                    style("✗").red().bold(),
                    style(&feature.name).red(),
                    style(format!("(failed in {})", feature.phase())).dim()
                );
                for line in e.to_string().lines() {
                    println!("      {}", line.trim_start());
                }
            }
            None => {
                println!(
                    "  {} {} {}",
                    style("✓").green(),
                    feature.name,
                    style(format!("({})", format_outcome(feature.applied_resources()))).dim()
                );
                for resource in feature.applied_resources() {
                    if resource.outcome != ApplyOutcome::Unchanged {
                        println!("      {}", style(resource.display_name()).dim());
                    }
                }
            }
        }
    }
    println!();
}

/// Per-feature result of a cleanup, in the order cleanup ran
pub fn cleanup_report(features: &[Feature], error: Option<&FeatureSetError>) {
    println!();
    for feature in features.iter().rev() {
        if !feature.enabled {
            println!("  {} {} {}", style("-").dim(), feature.name, style("(disabled)").dim());
            continue;
        }
        match failed(error, &feature.name) {
            Some(e) => {
                println!("  {} {}", style("✗").red().bold(), style(&feature.name).red());
                for line in e.to_string().lines() {
                    println!("      {}", line.trim_start());
                }
            }
            None => println!("  {} {}", style("✓").green(), feature.name),
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied(outcome: ApplyOutcome) -> AppliedResource {
        AppliedResource {
            kind: "ConfigMap".to_string(),
            name: "refs".to_string(),
            namespace: Some("opendatahub".to_string()),
            outcome,
        }
    }

    #[test]
    fn test_format_outcome() {
        assert_eq!(format_outcome(&[]), "no manifests");
        assert_eq!(
            format_outcome(&[
                applied(ApplyOutcome::Created),
                applied(ApplyOutcome::Created),
                applied(ApplyOutcome::Patched),
            ]),
            "2 created, 1 patched"
        );
        assert_eq!(format_outcome(&[applied(ApplyOutcome::Unchanged)]), "1 unchanged");
    }
}
