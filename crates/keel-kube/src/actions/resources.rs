//! Imperative resource actions

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use k8s_openapi::{
    ByteString,
    api::core::v1::{ConfigMap, Namespace, Secret},
};
use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue, KeyPair};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::cluster::{gvk_from_api_version, to_dynamic, typed_resource};
use crate::error::{ErrorList, KubeError, Result};
use crate::feature::{Action, Feature};

/// Creates a ConfigMap owned by the feature, or merges `data` into it when
/// it already exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConfigMap {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl CreateConfigMap {
    fn render_data(&self, feature: &Feature) -> Result<BTreeMap<String, String>> {
        self.data
            .iter()
            .map(|(k, v)| Ok((k.clone(), feature.render_value(v)?)))
            .collect()
    }
}

#[async_trait]
impl Action for CreateConfigMap {
    fn name(&self) -> &str {
        "create config map"
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        let cluster = feature.cluster()?;
        let owner = feature.owner_reference()?;
        let name = feature.render_value(&self.name)?;
        let namespace = feature.render_value(&self.namespace)?;
        let data = self.render_data(feature)?;
        let resource = typed_resource::<ConfigMap>();

        if cluster.get(&resource, Some(&namespace), &name).await?.is_some() {
            let patch = serde_json::json!({ "data": data });
            cluster
                .merge_patch(&resource, Some(&namespace), &name, &patch)
                .await?;
            info!(%namespace, %name, "updated config map");
            return Ok(());
        }

        let mut config_map = ConfigMap::default();
        config_map.metadata.name = Some(name.clone());
        config_map.metadata.namespace = Some(namespace.clone());
        config_map.metadata.owner_references = Some(vec![owner]);
        config_map.data = Some(data);

        match cluster
            .create(&resource, Some(&namespace), &to_dynamic(&config_map)?)
            .await
        {
            Ok(_) => info!(%namespace, %name, "created config map"),
            Err(e) if e.is_already_exists() => {
                let patch = serde_json::json!({ "data": config_map.data });
                cluster
                    .merge_patch(&resource, Some(&namespace), &name, &patch)
                    .await?;
                info!(%namespace, %name, "updated config map created concurrently");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// Generates a self-signed wildcard certificate for the cluster domain and
/// stores it as a TLS secret.
///
/// Name and namespace default to the mesh certificate settings. Does nothing
/// when certificate generation is turned off or the secret already exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfSignedCertificate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// PEM encoded certificate and private key
#[derive(Debug, Clone)]
pub struct GeneratedCertificate {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Self-signed certificate valid for `*.domain` and `domain`, for one year
pub fn generate_certificate(domain: &str) -> Result<GeneratedCertificate> {
    let mut params = CertificateParams::new(vec![format!("*.{}", domain), domain.to_string()])?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String(domain.to_string()));
    dn.push(DnType::OrganizationName, DnValue::Utf8String("Keel".to_string()));
    params.distinguished_name = dn;

    // day clamped so the year-later date always exists
    let today = Utc::now().date_naive();
    let (month, day) = (today.month() as u8, today.day().min(28) as u8);
    params.not_before = rcgen::date_time_ymd(today.year(), month, day);
    params.not_after = rcgen::date_time_ymd(today.year() + 1, month, day);

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    Ok(GeneratedCertificate {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}

#[async_trait]
impl Action for SelfSignedCertificate {
    fn name(&self) -> &str {
        "create self-signed certificate"
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        let settings = feature.context.mesh.certificate.clone();
        if !settings.generate {
            debug!("certificate generation disabled");
            return Ok(());
        }

        let cluster = feature.cluster()?;
        let name = match &self.name {
            Some(name) => feature.render_value(name)?,
            None => settings.name,
        };
        let namespace = match &self.namespace {
            Some(namespace) => feature.render_value(namespace)?,
            None => feature.context.mesh.namespace.clone(),
        };
        let resource = typed_resource::<Secret>();

        if cluster.get(&resource, Some(&namespace), &name).await?.is_some() {
            debug!(%namespace, %name, "certificate secret exists");
            return Ok(());
        }

        let domain = feature.context.domain.clone();
        if domain.is_empty() {
            return Err(KubeError::Certificate(
                "cluster domain is not known; load it before generating a certificate".to_string(),
            ));
        }
        let generated = generate_certificate(&domain)?;

        let mut secret = Secret::default();
        secret.metadata.name = Some(name.clone());
        secret.metadata.namespace = Some(namespace.clone());
        secret.metadata.owner_references = Some(vec![feature.owner_reference()?]);
        secret.type_ = Some("kubernetes.io/tls".to_string());
        secret.data = Some(
            [
                ("tls.crt".to_string(), ByteString(generated.cert_pem.into_bytes())),
                ("tls.key".to_string(), ByteString(generated.key_pem.into_bytes())),
            ]
            .into(),
        );

        match cluster.create(&resource, Some(&namespace), &to_dynamic(&secret)?).await {
            Ok(_) => {
                info!(%namespace, %name, %domain, "created self-signed certificate");
                Ok(())
            }
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Merge patches the first object of a kind, in list order. Finding none is
/// not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchFirstOfKind {
    pub api_version: String,
    pub kind: String,
    /// Restrict the search to one namespace
    #[serde(default)]
    pub namespace: Option<String>,
    pub patch: JsonValue,
    /// Label used in logs and errors instead of the generic action name
    #[serde(default)]
    pub description: Option<String>,
}

fn render_json(feature: &Feature, value: &JsonValue) -> Result<JsonValue> {
    Ok(match value {
        JsonValue::String(s) => JsonValue::String(feature.render_value(s)?),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .map(|v| render_json(feature, v))
                .collect::<Result<_>>()?,
        ),
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), render_json(feature, v)?)))
                .collect::<Result<Map<_, _>>>()?,
        ),
        other => other.clone(),
    })
}

#[async_trait]
impl Action for PatchFirstOfKind {
    fn name(&self) -> &str {
        self.description.as_deref().unwrap_or("patch first of kind")
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        let cluster = feature.cluster()?;
        let gvk = gvk_from_api_version(&self.api_version, &self.kind);
        let (resource, _) = cluster.resolve(&gvk).await?;
        let namespace = self
            .namespace
            .as_deref()
            .map(|ns| feature.render_value(ns))
            .transpose()?;

        let objects = cluster.list(&resource, namespace.as_deref(), None).await?;
        let Some(target) = objects.first() else {
            debug!(kind = %self.kind, "nothing to patch");
            return Ok(());
        };
        let name = target.metadata.name.clone().ok_or_else(|| {
            KubeError::InvalidManifest(format!("listed {} has no name", self.kind))
        })?;

        let patch = render_json(feature, &self.patch)?;
        cluster
            .merge_patch(&resource, target.metadata.namespace.as_deref(), &name, &patch)
            .await?;
        info!(kind = %self.kind, %name, "patched");
        Ok(())
    }
}

/// Sets (or with a null value removes) annotations on every namespace
/// matching a label selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateNamespaces {
    pub label_selector: String,
    pub annotations: BTreeMap<String, Option<String>>,
}

#[async_trait]
impl Action for AnnotateNamespaces {
    fn name(&self) -> &str {
        "annotate namespaces"
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        let cluster = feature.cluster()?;
        let selector = feature.render_value(&self.label_selector)?;
        let resource = typed_resource::<Namespace>();

        let annotations = self
            .annotations
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Some(v) => JsonValue::String(feature.render_value(v)?),
                    None => JsonValue::Null,
                };
                Ok((k.clone(), value))
            })
            .collect::<Result<Map<_, _>>>()?;
        let patch = serde_json::json!({ "metadata": { "annotations": annotations } });

        let namespaces = cluster.list(&resource, None, Some(&selector)).await?;
        let mut errors = ErrorList::default();
        for namespace in &namespaces {
            let Some(name) = namespace.metadata.name.as_deref() else {
                continue;
            };
            match cluster.merge_patch(&resource, None, name, &patch).await {
                Ok(_) => debug!(namespace = name, "annotated namespace"),
                Err(e) => {
                    warn!(namespace = name, error = %e, "failed to annotate namespace");
                    errors.push(format!("namespace {}", name), e);
                }
            }
        }
        info!(
            count = namespaces.len() - errors.len(),
            failed = errors.len(),
            %selector,
            "annotated namespaces"
        );
        errors.into_result().map_err(|errors| KubeError::Partial {
            what: "annotate namespaces".to_string(),
            errors,
        })
    }
}
