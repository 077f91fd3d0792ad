use super::template::{self, TemplateError};
use super::validation::{is_dns1123_subdomain, is_fully_qualified_domain_name};
use crate::config::IngressConfig;
use crate::controller::ingress::naming::{truncate_dns_label, CLUSTER_DOMAIN};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::warn;

static EMPTY: BTreeMap<String, String> = BTreeMap::new();

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("error rendering the domain template: {0}")]
    Template(#[from] TemplateError),

    #[error("invalid domain name {0:?}")]
    InvalidDomainName(String),
}

/// Values visible to a domain template
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DomainTemplateValues<'a> {
    name: &'a str,
    namespace: &'a str,
    ingress_domain: &'a str,
    annotations: &'a BTreeMap<String, String>,
    labels: &'a BTreeMap<String, String>,
}

/// Renders public and in-cluster hostnames for services
pub trait DomainService: Send + Sync {
    /// Public hostname for `name`, using the domain template after applying
    /// the object's annotation overrides. Long names are truncated first.
    fn generate_domain_name(
        &self,
        name: &str,
        meta: &ObjectMeta,
        config: &IngressConfig,
    ) -> Result<String, DomainError>;

    /// Hostname for `name` under the cluster domain instead of the ingress domain
    fn generate_internal_domain_name(
        &self,
        name: &str,
        meta: &ObjectMeta,
        config: &IngressConfig,
    ) -> Result<String, DomainError>;

    /// Extra hosts formed by swapping the serving domain of `service_host`
    /// for each configured additional ingress domain
    fn additional_hosts(
        &self,
        domain_list: &[String],
        service_host: &str,
        config: &IngressConfig,
    ) -> Vec<String>;

    fn additional_hosts_with_annotations(
        &self,
        domain_list: &[String],
        service_host: &str,
        config: &IngressConfig,
        annotations: &BTreeMap<String, String>,
    ) -> Vec<String> {
        self.additional_hosts(domain_list, service_host, &config.resolve(annotations))
    }
}

#[derive(Debug, Default, Clone)]
pub struct DefaultDomainService;

impl DefaultDomainService {
    fn render(
        template_source: &str,
        values: &DomainTemplateValues<'_>,
    ) -> Result<String, DomainError> {
        let domain = template::render(template_source, values)?;
        if !is_fully_qualified_domain_name(&domain) {
            return Err(DomainError::InvalidDomainName(domain));
        }
        Ok(domain)
    }
}

impl DomainService for DefaultDomainService {
    fn generate_domain_name(
        &self,
        name: &str,
        meta: &ObjectMeta,
        config: &IngressConfig,
    ) -> Result<String, DomainError> {
        let annotations = meta.annotations.as_ref().unwrap_or(&EMPTY);
        let effective = config.resolve(annotations);
        let name = truncate_dns_label(name);

        let values = DomainTemplateValues {
            name: &name,
            namespace: meta.namespace.as_deref().unwrap_or_default(),
            ingress_domain: &effective.ingress_domain,
            annotations,
            labels: meta.labels.as_ref().unwrap_or(&EMPTY),
        };
        Self::render(&effective.domain_template, &values)
    }

    fn generate_internal_domain_name(
        &self,
        name: &str,
        meta: &ObjectMeta,
        config: &IngressConfig,
    ) -> Result<String, DomainError> {
        let values = DomainTemplateValues {
            name,
            namespace: meta.namespace.as_deref().unwrap_or_default(),
            ingress_domain: CLUSTER_DOMAIN,
            annotations: meta.annotations.as_ref().unwrap_or(&EMPTY),
            labels: meta.labels.as_ref().unwrap_or(&EMPTY),
        };
        Self::render(&config.domain_template, &values)
    }

    fn additional_hosts(
        &self,
        domain_list: &[String],
        service_host: &str,
        config: &IngressConfig,
    ) -> Vec<String> {
        let subdomain = domain_list
            .iter()
            .find_map(|domain| service_host.strip_suffix(domain.as_str()));

        let (Some(subdomain), Some(extra)) = (subdomain, &config.additional_ingress_domains) else {
            return Vec::new();
        };
        if subdomain.is_empty() {
            return Vec::new();
        }

        let mut seen = BTreeSet::new();
        let mut hosts = Vec::new();
        for domain in extra {
            if seen.contains(domain) {
                continue;
            }
            let host = format!("{}{}", subdomain, domain);
            if !is_dns1123_subdomain(&host) {
                warn!(
                    domain = %domain,
                    host = %host,
                    "Additional ingress domain does not form a valid host, skipping"
                );
                continue;
            }
            hosts.push(host);
            seen.insert(domain.clone());
        }
        hosts
    }
}

#[cfg(test)]
#[path = "domain_test.rs"]
mod tests;
