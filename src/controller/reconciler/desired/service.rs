//! # Desired Service

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::labels::{dependent_meta, selector_labels};
use crate::constants::{APP_PORT, APP_PORT_NAME};
use crate::crd::Instance;

/// ClusterIP service exposing port 8123 of the Instance's pod
pub fn desired_service(instance: &Instance) -> Service {
    Service {
        metadata: dependent_meta(instance, instance.name_any()),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            ports: Some(vec![ServicePort {
                name: Some(APP_PORT_NAME.to_string()),
                port: APP_PORT,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::String(APP_PORT_NAME.to_string())),
                ..Default::default()
            }]),
            selector: Some(selector_labels(instance)),
            ..Default::default()
        }),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::desired::tests::instance;

    #[test]
    fn test_service_targets_named_port() {
        let service = desired_service(&instance("home"));
        let spec = service.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));

        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.name.as_deref(), Some("http"));
        assert_eq!(port.port, 8123);
        assert_eq!(port.protocol.as_deref(), Some("TCP"));
        assert_eq!(
            port.target_port,
            Some(IntOrString::String("http".to_string()))
        );

        let selector = spec.selector.unwrap();
        assert_eq!(selector.len(), 2);
        assert_eq!(selector["app.kubernetes.io/instance"], "home");
        assert_eq!(selector["app.kubernetes.io/name"], "home");
    }
}
