//! Delete command - clean up every feature of a feature set, last declared
//! first

use console::style;
use std::path::Path;

use super::{Inputs, connect};
use crate::catalog::FeatureSetFile;
use crate::display;
use crate::error::Result;

pub async fn run(config: &Path, features: &Path, set_values: &[String]) -> Result<()> {
    let inputs = Inputs::load(config, set_values)?;
    let file = FeatureSetFile::load(features)?;

    println!(
        "{} Deleting {} feature(s) for namespace {}",
        style("→").blue().bold(),
        file.features.len(),
        style(&inputs.spec.applications_namespace).yellow()
    );

    let cluster = connect().await?;
    let mut set = file.load_set(&inputs.spec, cluster, &inputs.values).await?;
    let result = set.cleanup().await;

    display::cleanup_report(set.features(), result.as_ref().err());
    result?;

    println!("{} All features deleted", style("✓").green().bold());
    Ok(())
}
