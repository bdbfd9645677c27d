//! # Desired Ingress

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use kube::ResourceExt;

use super::labels::dependent_meta;
use crate::constants::APP_PORT;
use crate::crd::Instance;

/// Ingress routing the declared host to the Instance's service
///
/// Returns `None` when the Instance has the ingress disabled, meaning the
/// ingress must not exist.
pub fn desired_ingress(instance: &Instance) -> Option<Ingress> {
    let config = &instance.spec.ingress;
    if !config.enabled {
        return None;
    }
    let name = instance.name_any();

    Some(Ingress {
        metadata: dependent_meta(instance, name.clone()),
        spec: Some(IngressSpec {
            ingress_class_name: config.ingress_class_name.clone(),
            rules: Some(vec![IngressRule {
                host: Some(config.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name,
                                port: Some(ServiceBackendPort {
                                    number: Some(APP_PORT),
                                    name: None,
                                }),
                            }),
                            resource: None,
                        },
                    }],
                }),
            }]),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![config.host.clone()]),
                secret_name: Some(config.secret_name.clone()),
            }]),
            default_backend: None,
        }),
        status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::desired::tests::instance;
    use crate::crd::IngressConfig;

    #[test]
    fn test_disabled_ingress_is_absent() {
        assert!(desired_ingress(&instance("home")).is_none());
    }

    #[test]
    fn test_enabled_ingress_routes_host_to_service() {
        let mut instance = instance("home");
        instance.spec.ingress = IngressConfig {
            enabled: true,
            host: "home.example.com".to_string(),
            secret_name: "home-tls".to_string(),
            ingress_class_name: Some("nginx".to_string()),
        };

        let spec = desired_ingress(&instance).unwrap().spec.unwrap();
        assert_eq!(spec.ingress_class_name.as_deref(), Some("nginx"));

        let rule = &spec.rules.unwrap()[0];
        assert_eq!(rule.host.as_deref(), Some("home.example.com"));
        let path = &rule.http.as_ref().unwrap().paths[0];
        assert_eq!(path.path.as_deref(), Some("/"));
        assert_eq!(path.path_type, "Prefix");
        let backend = path.backend.service.as_ref().unwrap();
        assert_eq!(backend.name, "home");
        assert_eq!(backend.port.as_ref().unwrap().number, Some(8123));

        let tls = &spec.tls.unwrap()[0];
        assert_eq!(tls.hosts.as_deref(), Some(&["home.example.com".to_string()][..]));
        assert_eq!(tls.secret_name.as_deref(), Some("home-tls"));
    }
}
