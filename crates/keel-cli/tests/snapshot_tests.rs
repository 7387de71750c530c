//! Snapshot tests for rendered output and error display

use std::fs;
use std::process::Command;
use tempfile::TempDir;

/// Helper to run keel command and capture output
fn keel_output(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_keel"))
        .args(args)
        .env_remove("CLICOLOR_FORCE")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute keel");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();

    (stdout, stderr, success)
}

fn fixtures_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures")
}

fn installer() -> String {
    format!("{}/servicemesh/installer.yaml", fixtures_path())
}

/// Replace the machine-specific fixtures prefix
fn normalize_output(output: &str) -> String {
    output.replace(fixtures_path(), "[FIXTURES]").trim_end().to_string()
}

fn template_dir(name: &str, content: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(name), content).unwrap();
    dir
}

mod render_snapshots {
    use super::*;

    #[test]
    fn test_service_mesh_member() {
        let template = format!(
            "{}/servicemesh/templates/control-plane/smm.tmpl",
            fixtures_path()
        );
        let (stdout, stderr, success) = keel_output(&["render", "-c", &installer(), &template]);

        assert!(success, "stderr: {}", stderr);
        insta::assert_snapshot!(normalize_output(&stdout), @r"
        # Source: [FIXTURES]/servicemesh/templates/control-plane/smm.tmpl
        apiVersion: maistra.io/v1
        kind: ServiceMeshMember
        metadata:
          name: default
          namespace: opendatahub
        spec:
          controlPlaneRef:
            namespace: istio-system
            name: basic
        ");
    }

    #[test]
    fn test_extension_provider_patch() {
        let template = format!(
            "{}/servicemesh/templates/authorino/mesh-authz-ext-provider.patch.tmpl",
            fixtures_path()
        );
        let (stdout, _stderr, success) = keel_output(&["render", "-c", &installer(), &template]);

        assert!(success);
        insta::assert_snapshot!(normalize_output(&stdout), @r"
        # Patch: [FIXTURES]/servicemesh/templates/authorino/mesh-authz-ext-provider.patch.tmpl
        apiVersion: maistra.io/v2
        kind: ServiceMeshControlPlane
        metadata:
          name: basic
          namespace: istio-system
        spec:
          techPreview:
            meshConfig:
              extensionProviders:
              - name: authorino-mesh-authz-provider
                envoyExtAuthzGrpc:
                  service: authorino-authorino-authorization.auth-provider.svc.cluster.local
                  port: 50051
        ");
    }
}

mod error_display_snapshots {
    use super::*;

    #[test]
    fn test_undefined_variable_error_display() {
        let dir = template_dir("cm.tmpl", "name: {{ mesh.gateway.name }}\n");

        let (_stdout, stderr, success) =
            keel_output(&["render", "-c", &installer(), dir.path().to_str().unwrap()]);

        assert!(!success);
        assert!(stderr.contains("undefined"), "Should mention undefined variable: {}", stderr);
        assert!(
            stderr.contains("app_namespace, mesh, auth, domain, oauth, values"),
            "Should list the top-level keys: {}",
            stderr
        );
    }

    #[test]
    fn test_unknown_filter_error_display() {
        let dir = template_dir("cm.tmpl", "name: {{ mesh.name | toyml }}\n");

        let (_stdout, stderr, success) =
            keel_output(&["render", "-c", &installer(), dir.path().to_str().unwrap()]);

        assert!(!success);
        assert!(
            stderr.contains("toyaml") && stderr.contains("replace_char"),
            "Should list the available helpers: {}",
            stderr
        );
    }

    #[test]
    fn test_invalid_spec_display() {
        let dir = template_dir(
            "installer.yaml",
            "applicationsNamespace: opendatahub\nserviceMesh:\n  mesh:\n    name: \"\"\n",
        );
        let config = dir.path().join("installer.yaml");
        let template = format!("{}/servicemesh/templates/base", fixtures_path());

        let (_stdout, stderr, success) =
            keel_output(&["render", "-c", config.to_str().unwrap(), &template]);

        assert!(!success);
        assert!(stderr.contains("serviceMesh.mesh requires both name and namespace"));
        assert!(stderr.contains("keel::cli::config"));
    }
}
