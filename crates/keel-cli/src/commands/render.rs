//! Render command - render manifests locally, without a cluster

use console::style;
use keel_core::FeatureContext;
use keel_engine::{Engine, discover, split_documents};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::Inputs;
use crate::error::{CliError, Result};

pub fn run(
    config: &Path,
    paths: &[PathBuf],
    set_values: &[String],
    domain: Option<&str>,
    output_dir: Option<&Path>,
) -> Result<()> {
    let inputs = Inputs::load(config, set_values)?;

    let mut context = FeatureContext::from_spec(&inputs.spec).with_values(&inputs.values);
    if let Some(domain) = domain {
        context.domain = domain.to_string();
    }
    let engine = Engine::default();

    let mut first = true;
    for root in paths {
        let manifests = discover(root)?;
        debug!(path = %root.display(), count = manifests.len(), "discovered manifests");

        for mut manifest in manifests {
            let content = manifest.render(&engine, &context)?.to_string();
            let kind = if manifest.is_patch { "Patch" } else { "Source" };

            if let Some(output_path) = output_dir {
                let file_path = output_path.join(&manifest.name);
                if let Some(parent) = file_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&file_path, &content).map_err(|e| CliError::Io {
                    message: format!("failed to write {}: {}", file_path.display(), e),
                })?;
                println!("{} {}", style("wrote").green(), file_path.display());
                continue;
            }

            for doc in split_documents(&content) {
                if !first {
                    println!("---");
                }
                first = false;
                println!("{}", style(format!("# {}: {}", kind, manifest.origin())).dim());
                println!("{}", doc);
            }
        }
    }

    Ok(())
}
