//! Feature set runner

use tracing::{info, warn};

use crate::error::FeatureSetError;
use crate::feature::Feature;

/// An ordered list of features applied front to back and cleaned up back to
/// front. A failing feature never stops the rest of the set.
#[derive(Debug, Default)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, feature: Feature) -> &mut Self {
        self.features.push(feature);
        self
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Apply every feature in declaration order
    pub async fn apply(&mut self) -> Result<(), FeatureSetError> {
        let mut failures = Vec::new();
        for feature in self.features.iter_mut() {
            if let Err(e) = feature.apply().await {
                failures.push(e);
            }
        }
        finish("apply", self.features.len(), failures)
    }

    /// Clean up every feature in reverse declaration order
    pub async fn cleanup(&mut self) -> Result<(), FeatureSetError> {
        let mut failures = Vec::new();
        for feature in self.features.iter_mut().rev() {
            if let Err(e) = feature.cleanup().await {
                failures.push(e);
            }
        }
        finish("cleanup", self.features.len(), failures)
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

fn finish(
    operation: &str,
    total: usize,
    failures: Vec<crate::error::FeatureError>,
) -> Result<(), FeatureSetError> {
    if failures.is_empty() {
        info!(operation, features = total, "feature set finished");
        Ok(())
    } else {
        warn!(operation, features = total, failed = failures.len(), "feature set finished with failures");
        Err(FeatureSetError { failures })
    }
}
