//! Apply command - run every feature of a feature set against the cluster

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
        "{} Applying {} feature(s) for namespace {}",
        style("→").blue().bold(),
        file.features.len(),
        style(&inputs.spec.applications_namespace).yellow()
    );

    let cluster = connect().await?;
    let mut set = file.load_set(&inputs.spec, cluster, &inputs.values).await?;
    let result = set.apply().await;

    display::apply_report(set.features(), result.as_ref().err());
    result?;

    println!("{} All features applied", style("✓").green().bold());
    Ok(())
}
