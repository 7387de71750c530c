//! Data loaders: compute values the manifests need and store them in the
//! feature context

use async_trait::async_trait;
use k8s_openapi::{
    ByteString,
    api::core::v1::Secret,
    apimachinery::pkg::apis::meta::v1::OwnerReference,
};
use kube::core::GroupVersionKind;
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::cluster::{ClusterClient, effective_namespace, from_dynamic, to_dynamic, typed_resource};
use crate::error::{KubeError, Result};
use crate::feature::{Action, Feature};

/// Key under which generated secret values are stored
pub const SECRET_KEY: &str = "secret";

const SECRET_LENGTH: usize = 32;
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads the cluster base domain from the OpenShift ingress config into
/// `domain`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDomain {}

#[async_trait]
impl Action for ClusterDomain {
    fn name(&self) -> &str {
        "load cluster domain"
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        let cluster = feature.cluster()?;
        let gvk = GroupVersionKind::gvk("config.openshift.io", "v1", "Ingress");
        let (resource, scope) = cluster.resolve(&gvk).await?;
        let namespace = effective_namespace(&scope, None);

        let ingress = cluster
            .get(&resource, namespace.as_deref(), "cluster")
            .await?
            .ok_or_else(|| KubeError::ConditionNotMet("cluster ingress config not found".to_string()))?;

        let domain = ingress
            .data
            .pointer("/spec/domain")
            .and_then(|d| d.as_str())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                KubeError::ConditionNotMet("spec.domain not set on cluster ingress config".to_string())
            })?;

        debug!(domain, "loaded cluster domain");
        feature.context.domain = domain.to_string();
        Ok(())
    }
}

/// Loads OAuth server details and the envoy client secret and HMAC into
/// `oauth`.
///
/// The two secrets are generated once and kept in Secrets in the
/// applications namespace, so re-running yields the same values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OAuthConfig {
    /// URL of the OAuth authorization server metadata document
    pub discovery_url: String,
    pub client_secret_name: String,
    pub hmac_secret_name: String,
    /// Skip TLS verification of the discovery endpoint
    pub insecure: bool,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            discovery_url: "https://kubernetes.default.svc/.well-known/oauth-authorization-server"
                .to_string(),
            client_secret_name: "{{ mesh.name }}-oauth2-client".to_string(),
            hmac_secret_name: "{{ mesh.name }}-oauth2-hmac".to_string(),
            insecure: false,
        }
    }
}

/// The fields of an OAuth authorization server metadata document we use
#[derive(Debug, Clone, Deserialize)]
struct DiscoveryDocument {
    issuer: String,
    authorization_endpoint: String,
    token_endpoint: String,
}

impl OAuthConfig {
    async fn fetch_discovery(&self, url: &str) -> Result<DiscoveryDocument> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(self.insecure)
            .timeout(DISCOVERY_TIMEOUT)
            .build()?;

        let document = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<DiscoveryDocument>()
            .await?;
        Ok(document)
    }
}

#[async_trait]
impl Action for OAuthConfig {
    fn name(&self) -> &str {
        "load OAuth configuration"
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        let cluster = feature.cluster()?;
        let namespace = feature.context.app_namespace.clone();
        let owner = feature.owner_reference().ok();

        let client_name = feature.render_value(&self.client_secret_name)?;
        let hmac_name = feature.render_value(&self.hmac_secret_name)?;
        let client_secret =
            get_or_generate_secret(cluster.as_ref(), &namespace, &client_name, owner.as_ref()).await?;
        let hmac = get_or_generate_secret(cluster.as_ref(), &namespace, &hmac_name, owner.as_ref()).await?;

        let url = feature.render_value(&self.discovery_url)?;
        let document = self.fetch_discovery(&url).await?;
        let issuer = keel_core::extract_host_and_port(&document.issuer)?;
        info!(issuer = %document.issuer, "loaded OAuth server details");

        let oauth = &mut feature.context.oauth;
        oauth.authz_endpoint = document.authorization_endpoint;
        oauth.token_endpoint = document.token_endpoint;
        oauth.route = issuer.host;
        oauth.port = issuer.port;
        oauth.client_secret = client_secret;
        oauth.hmac = hmac;
        Ok(())
    }
}

fn random_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}

fn stored_value(secret: &Secret) -> Option<String> {
    let ByteString(bytes) = secret.data.as_ref()?.get(SECRET_KEY)?;
    String::from_utf8(bytes.clone()).ok()
}

/// Return the value stored in Secret `name`, creating it with a fresh random
/// value first if it does not exist.
pub async fn get_or_generate_secret(
    cluster: &dyn ClusterClient,
    namespace: &str,
    name: &str,
    owner: Option<&OwnerReference>,
) -> Result<String> {
    let resource = typed_resource::<Secret>();

    if let Some(existing) = cluster.get(&resource, Some(namespace), name).await? {
        let secret: Secret = from_dynamic(existing)?;
        return stored_value(&secret).ok_or_else(|| {
            KubeError::InvalidConfig(format!(
                "secret {}/{} has no '{}' key",
                namespace, name, SECRET_KEY
            ))
        });
    }

    let value = random_secret();
    let mut secret = Secret::default();
    secret.metadata.name = Some(name.to_string());
    secret.metadata.namespace = Some(namespace.to_string());
    secret.metadata.owner_references = owner.map(|o| vec![o.clone()]);
    secret.type_ = Some("Opaque".to_string());
    secret.data = Some([(SECRET_KEY.to_string(), ByteString(value.clone().into_bytes()))].into());

    match cluster.create(&resource, Some(namespace), &to_dynamic(&secret)?).await {
        Ok(_) => {
            info!(%namespace, %name, "generated secret");
            Ok(value)
        }
        Err(e) if e.is_already_exists() => {
            let existing = cluster
                .get(&resource, Some(namespace), name)
                .await?
                .ok_or_else(|| KubeError::InvalidConfig(format!("secret {}/{} vanished", namespace, name)))?;
            let secret: Secret = from_dynamic(existing)?;
            stored_value(&secret).ok_or_else(|| {
                KubeError::InvalidConfig(format!("secret {}/{} has no '{}' key", namespace, name, SECRET_KEY))
            })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::feature_on;
    use crate::mock::MockCluster;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_cluster_domain() {
        let cluster = MockCluster::new().with_cluster_scoped("Ingress");
        let mut feature = feature_on(&cluster).await;

        assert!(ClusterDomain::default().run(&mut feature).await.is_err());

        cluster
            .seed_yaml(
                "apiVersion: config.openshift.io/v1\nkind: Ingress\nmetadata:\n  name: cluster\nspec:\n  domain: apps.example.com\n",
            )
            .unwrap();
        ClusterDomain::default().run(&mut feature).await.unwrap();
        assert_eq!(feature.context.domain, "apps.example.com");
    }

    #[tokio::test]
    async fn test_secret_is_generated_once() {
        let cluster = MockCluster::new();
        let first = get_or_generate_secret(&cluster, "ns", "hmac", None).await.unwrap();
        let second = get_or_generate_secret(&cluster, "ns", "hmac", None).await.unwrap();

        assert_eq!(first.len(), SECRET_LENGTH);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(first, second);
        assert_eq!(cluster.objects_of_kind("Secret").len(), 1);
    }

    #[tokio::test]
    async fn test_oauth_config_from_discovery_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-authorization-server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": "https://oauth.apps.example.com",
                "authorization_endpoint": "https://oauth.apps.example.com/oauth/authorize",
                "token_endpoint": "https://oauth.apps.example.com/oauth/token",
            })))
            .mount(&server)
            .await;

        let cluster = MockCluster::new();
        let mut feature = feature_on(&cluster).await;
        let loader = OAuthConfig {
            discovery_url: format!("{}/.well-known/oauth-authorization-server", server.uri()),
            ..Default::default()
        };
        loader.run(&mut feature).await.unwrap();

        let oauth = &feature.context.oauth;
        assert_eq!(oauth.route, "oauth.apps.example.com");
        assert_eq!(oauth.port, "443");
        assert_eq!(oauth.token_endpoint, "https://oauth.apps.example.com/oauth/token");
        assert_eq!(oauth.client_secret.len(), SECRET_LENGTH);
        assert_ne!(oauth.client_secret, oauth.hmac);

        let stored = cluster
            .object("v1", "Secret", Some("opendatahub"), "basic-oauth2-client")
            .unwrap();
        assert_eq!(stored.metadata.owner_references.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oauth_config_fails_on_bad_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cluster = MockCluster::new();
        let mut feature = feature_on(&cluster).await;
        let loader = OAuthConfig {
            discovery_url: server.uri(),
            ..Default::default()
        };
        let err = loader.run(&mut feature).await.unwrap_err();
        assert!(matches!(err, KubeError::Http(_)));
    }
}
