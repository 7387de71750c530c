//! Integration tests for CLI commands

use std::fs;
use std::process::Command;
use tempfile::TempDir;

/// Helper to run keel command
fn keel(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_keel"))
        .args(args)
        // never pick up a real cluster from the developer's environment
        .env("KUBECONFIG", "/nonexistent/kubeconfig")
        .env_remove("KUBERNETES_SERVICE_HOST")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute keel")
}

/// Get the fixtures path
fn fixtures_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures")
}

fn installer() -> String {
    format!("{}/servicemesh/installer.yaml", fixtures_path())
}

fn templates(sub: &str) -> String {
    format!("{}/servicemesh/templates/{}", fixtures_path(), sub)
}

mod render_command {
    use super::*;

    #[test]
    fn test_render_directory_to_stdout() {
        let output = keel(&["render", "-c", &installer(), &templates("base")]);

        assert!(output.status.success(), "Expected success rendering base");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("kind: ServiceMeshControlPlane"));
        assert!(stdout.contains("name: basic"));
        assert!(stdout.contains("namespace: istio-system"));
        assert!(stdout.contains("# Source:"));
    }

    #[test]
    fn test_render_marks_patches() {
        let output = keel(&[
            "render",
            "-c",
            &installer(),
            &templates("control-plane/namespace.patch.tmpl"),
        ]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("# Patch:"));
        assert!(stdout.contains("name: opendatahub"));
    }

    #[test]
    fn test_render_multiple_paths_separated() {
        let output = keel(&[
            "render",
            "-c",
            &installer(),
            &templates("control-plane/smm.tmpl"),
            &templates("authorino"),
        ]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        // smm.tmpl, auth-smm.tmpl, authorino.tmpl, mesh-authz-ext-provider.patch.tmpl
        assert_eq!(stdout.matches("\n---\n").count(), 3);
        assert!(stdout.contains("kind: Authorino"));
        assert!(stdout.contains("authConfigLabelSelectors: \"authorino/topic=odh\""));
        assert!(stdout.contains(
            "service: authorino-authorino-authorization.auth-provider.svc.cluster.local"
        ));
    }

    #[test]
    fn test_render_with_domain() {
        let output = keel(&[
            "render",
            "-c",
            &installer(),
            &templates("control-plane/oauth/oauth-client.tmpl"),
            "--domain",
            "apps.example.com",
        ]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("https://opendatahub.apps.example.com"));
        assert!(stdout.contains("name: opendatahub-oauth2-client"));
    }

    #[test]
    fn test_render_with_set_values() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("gateway.tmpl");
        fs::write(
            &template,
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: gateway\n  namespace: {{ mesh.namespace }}\ndata:\n  replicas: {{ values.gateway.replicas | quote }}\n",
        )
        .unwrap();

        let output = keel(&[
            "render",
            "-c",
            &installer(),
            template.to_str().unwrap(),
            "--set",
            "gateway.replicas=2",
        ]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("replicas: \"2\""));
    }

    #[test]
    fn test_render_to_output_dir() {
        let out = TempDir::new().unwrap();
        let output = keel(&[
            "render",
            "-c",
            &installer(),
            &templates("control-plane"),
            "--domain",
            "apps.example.com",
            "--output-dir",
            out.path().to_str().unwrap(),
        ]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("wrote"));

        let smm = fs::read_to_string(out.path().join("smm.tmpl")).unwrap();
        assert!(smm.contains("kind: ServiceMeshMember"));
        let client = fs::read_to_string(out.path().join("oauth/oauth-client.tmpl")).unwrap();
        assert!(client.contains("https://opendatahub.apps.example.com"));
    }

    #[test]
    fn test_render_oauth_defaults_port() {
        let output = keel(&[
            "render",
            "-c",
            &installer(),
            &templates("control-plane/oauth/oauth-filter.tmpl"),
        ]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("port_value: 443"));
    }
}

mod error_handling {
    use super::*;

    #[test]
    fn test_missing_config_is_io_error() {
        let output = keel(&[
            "render",
            "-c",
            "/nonexistent/installer.yaml",
            &templates("base"),
        ]);

        assert_eq!(output.status.code(), Some(5));
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("installer.yaml");
        fs::write(
            &config,
            "applicationsNamespace: opendatahub\nserviceMesh:\n  auth:\n    name: keycloak\n    namespace: auth-provider\n",
        )
        .unwrap();

        let output = keel(&["render", "-c", config.to_str().unwrap(), &templates("base")]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("keycloak"), "stderr: {}", stderr);
    }

    #[test]
    fn test_malformed_set_value() {
        let output = keel(&[
            "render",
            "-c",
            &installer(),
            &templates("base"),
            "--set",
            "no-equals-sign",
        ]);

        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_missing_manifest_path() {
        let output = keel(&["render", "-c", &installer(), "/nonexistent/manifests"]);

        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("/nonexistent/manifests"));
    }

    #[test]
    fn test_template_error_exit_code() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.tmpl"), "name: {{ mesh.name \n").unwrap();

        let output = keel(&["render", "-c", &installer(), dir.path().to_str().unwrap()]);

        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_invalid_feature_set_fails_before_connecting() {
        let dir = TempDir::new().unwrap();
        let features = dir.path().join("features.yaml");
        fs::write(
            &features,
            "features:\n  - name: broken\n    preconditions:\n      - type: launchRockets\n",
        )
        .unwrap();

        let output = keel(&["apply", "-c", &installer(), "-f", features.to_str().unwrap()]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("launchRockets"), "stderr: {}", stderr);
    }

    #[test]
    fn test_duplicate_feature_names() {
        let dir = TempDir::new().unwrap();
        let features = dir.path().join("features.yaml");
        fs::write(
            &features,
            "features:\n  - name: shared-config-maps\n  - name: shared-config-maps\n",
        )
        .unwrap();

        let output = keel(&["delete", "-c", &installer(), "-f", features.to_str().unwrap()]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("declared twice"));
    }

    #[test]
    fn test_missing_feature_set_file() {
        let output = keel(&["apply", "-c", &installer(), "-f", "/nonexistent/features.yaml"]);

        assert_eq!(output.status.code(), Some(5));
    }

    #[test]
    fn test_apply_without_cluster() {
        let features = format!("{}/servicemesh/features.yaml", fixtures_path());
        let output = keel(&["apply", "-c", &installer(), "-f", &features]);

        assert_eq!(output.status.code(), Some(4));
    }
}

mod help_output {
    use super::*;

    #[test]
    fn test_main_help() {
        let output = keel(&["--help"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("apply"));
        assert!(stdout.contains("delete"));
        assert!(stdout.contains("render"));
    }

    #[test]
    fn test_render_help() {
        let output = keel(&["render", "--help"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("--domain"));
        assert!(stdout.contains("--output-dir"));
    }
}
