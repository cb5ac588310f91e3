// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Field Extractor Domain Service
//!
//! Pulls scalar and structured values out of a [`Workload`] descriptor for
//! context-field sources.
//!
//! # Supported field paths
//!
//! | Path | Value |
//! |------|-------|
//! | `metadata.name` / `metadata.namespace` / `metadata.uid` | scalar |
//! | `metadata.labels` / `metadata.annotations` | one `key="value"` line per entry |
//! | `metadata.labels['k']` / `metadata.annotations['k']` | single value |
//! | `spec.nodeName` / `spec.serviceAccountName` | scalar |
//! | `status.podIP` / `status.hostIP` | scalar |
//!
//! Resource references (`limits.cpu`, `requests.memory`, ...) are resolved
//! against a named container, scaled by an optional divisor.
//!
//! Every extracted value goes through [`sort_lines`] before it becomes file
//! content, so refreshes over unchanged data produce byte-identical files.

use crate::domain::quantity::{ceil_div, Quantity};
use crate::domain::workload::{
    ResourceList, Workload, RESOURCE_CPU, RESOURCE_EPHEMERAL_STORAGE, RESOURCE_MEMORY,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("unsupported field path: {0}")]
    UnsupportedFieldPath(String),

    #[error("field {0} is not set on the workload")]
    FieldNotSet(String),

    #[error("container '{0}' not found in workload")]
    ContainerNotFound(String),

    #[error("unsupported container resource: {0}")]
    UnsupportedResource(String),

    #[error("divisor for {0} must be greater than zero")]
    InvalidDivisor(String),

    #[error("node allocatable has no value for {0}")]
    AllocatableMissing(String),
}

/// Reference to a resource limit or request of a named container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFieldSelector {
    pub container_name: String,

    /// e.g. `limits.cpu`, `requests.memory`
    pub resource: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divisor: Option<Quantity>,
}

/// Which half of a container's resource envelope a reference targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Limits,
    Requests,
}

impl ResourceFieldSelector {
    /// Split `limits.cpu` into (`Limits`, `cpu`)
    pub fn parse_resource(&self) -> Result<(ResourceKind, &str), FieldError> {
        let unsupported = || FieldError::UnsupportedResource(self.resource.clone());
        let (kind, name) = self.resource.split_once('.').ok_or_else(unsupported)?;

        let kind = match kind {
            "limits" => ResourceKind::Limits,
            "requests" => ResourceKind::Requests,
            _ => return Err(unsupported()),
        };

        match name {
            RESOURCE_CPU | RESOURCE_MEMORY | RESOURCE_EPHEMERAL_STORAGE => Ok((kind, name)),
            _ => Err(unsupported()),
        }
    }

    /// Whether resolving this reference needs the node allocatable resources
    pub fn needs_allocatable(&self, workload: &Workload) -> bool {
        let Ok((kind, name)) = self.parse_resource() else {
            return false;
        };
        let Some(container) = workload.container(&self.container_name) else {
            return false;
        };
        match kind {
            ResourceKind::Limits => !container.resources.limits.contains_key(name),
            // requests never read node capacity
            ResourceKind::Requests => false,
        }
    }
}

/// Extract a metadata/spec/status field from the workload as a string
pub fn extract_field_path(workload: &Workload, field_path: &str) -> Result<String, FieldError> {
    if let Some((map_name, key)) = parse_subscript(field_path) {
        let map = match map_name {
            "metadata.labels" => &workload.metadata.labels,
            "metadata.annotations" => &workload.metadata.annotations,
            _ => return Err(FieldError::UnsupportedFieldPath(field_path.to_string())),
        };
        return Ok(map.get(key).cloned().unwrap_or_default());
    }

    let optional = |value: &Option<String>| {
        value
            .clone()
            .ok_or_else(|| FieldError::FieldNotSet(field_path.to_string()))
    };

    match field_path {
        "metadata.name" => Ok(workload.metadata.name.clone()),
        "metadata.namespace" => Ok(workload.metadata.namespace.clone()),
        "metadata.uid" => Ok(workload.metadata.uid.clone()),
        "metadata.labels" => Ok(format_map(&workload.metadata.labels)),
        "metadata.annotations" => Ok(format_map(&workload.metadata.annotations)),
        "spec.nodeName" => optional(&workload.spec.node_name),
        "spec.serviceAccountName" => optional(&workload.spec.service_account_name),
        "status.podIP" => optional(&workload.status.pod_ip),
        "status.hostIP" => optional(&workload.status.host_ip),
        _ => Err(FieldError::UnsupportedFieldPath(field_path.to_string())),
    }
}

/// Resolve a container resource reference to its scaled string value.
///
/// Missing limits fall back to `allocatable` (the node's effective capacity);
/// missing requests fall back to the declared limit, else zero.
pub fn extract_resource_value(
    workload: &Workload,
    selector: &ResourceFieldSelector,
    allocatable: Option<&ResourceList>,
) -> Result<String, FieldError> {
    let (kind, name) = selector.parse_resource()?;
    let container = workload
        .container(&selector.container_name)
        .ok_or_else(|| FieldError::ContainerNotFound(selector.container_name.clone()))?;

    let effective_limit = || -> Result<Quantity, FieldError> {
        if let Some(limit) = container.resources.limits.get(name) {
            return Ok(limit.clone());
        }
        allocatable
            .and_then(|a| a.get(name))
            .cloned()
            .ok_or_else(|| FieldError::AllocatableMissing(name.to_string()))
    };

    let quantity = match kind {
        ResourceKind::Limits => effective_limit()?,
        ResourceKind::Requests => container
            .resources
            .requests
            .get(name)
            .or_else(|| container.resources.limits.get(name))
            .cloned()
            .unwrap_or_else(|| Quantity::from_millis(0)),
    };

    let divisor = selector
        .divisor
        .clone()
        .unwrap_or_else(|| Quantity::from_millis(1000));

    if name == RESOURCE_CPU {
        if divisor.milli_value() <= 0 {
            return Err(FieldError::InvalidDivisor(selector.resource.clone()));
        }
        Ok(ceil_div(quantity.milli_value(), divisor.milli_value()).to_string())
    } else {
        if divisor.value() <= 0 {
            return Err(FieldError::InvalidDivisor(selector.resource.clone()));
        }
        Ok(ceil_div(quantity.value(), divisor.value()).to_string())
    }
}

/// Format a string map as `key="value"` lines
pub fn format_map(map: &BTreeMap<String, String>) -> String {
    map.iter()
        .map(|(k, v)| format!("{}={}", k, quote(v)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Double-quote `value` with Go `%q` escapes. Printable non-ASCII is kept.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{7}' => out.push_str("\\a"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{b}' => out.push_str("\\v"),
            c if (c as u32) < 0x80 && c.is_control() => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Reorder the lines of a value lexicographically.
///
/// Deterministic and idempotent: `sort_lines(&sort_lines(x)) == sort_lines(x)`.
pub fn sort_lines(value: &str) -> String {
    let mut lines: Vec<&str> = value.split('\n').collect();
    lines.sort_unstable();
    lines.join("\n")
}

/// Parse `metadata.labels['key']` into (`metadata.labels`, `key`)
fn parse_subscript(field_path: &str) -> Option<(&str, &str)> {
    let (path, rest) = field_path.split_once("['")?;
    let key = rest.strip_suffix("']")?;
    Some((path, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workload::{Container, ResourceRequirements};

    fn workload() -> Workload {
        let mut workload: Workload = serde_yaml::from_str(
            r#"
metadata:
  name: api-0
  namespace: payments
  uid: 3c1d
  labels:
    tier: backend
    env: test
  annotations:
    owner: "team \"core\""
spec:
  serviceAccountName: api
status:
  podIP: 10.0.0.7
"#,
        )
        .unwrap();

        let mut limits = ResourceList::new();
        limits.insert(RESOURCE_CPU.to_string(), Quantity::parse("1500m").unwrap());
        let mut requests = ResourceList::new();
        requests.insert(RESOURCE_MEMORY.to_string(), Quantity::parse("64Mi").unwrap());
        workload.spec.containers.push(Container {
            name: "api".to_string(),
            resources: ResourceRequirements { limits, requests },
        });
        workload
    }

    fn selector(resource: &str, divisor: Option<&str>) -> ResourceFieldSelector {
        ResourceFieldSelector {
            container_name: "api".to_string(),
            resource: resource.to_string(),
            divisor: divisor.map(|d| Quantity::parse(d).unwrap()),
        }
    }

    #[test]
    fn test_scalar_fields() {
        let w = workload();
        assert_eq!(extract_field_path(&w, "metadata.name").unwrap(), "api-0");
        assert_eq!(extract_field_path(&w, "metadata.namespace").unwrap(), "payments");
        assert_eq!(extract_field_path(&w, "spec.serviceAccountName").unwrap(), "api");
        assert_eq!(extract_field_path(&w, "status.podIP").unwrap(), "10.0.0.7");
    }

    #[test]
    fn test_map_fields() {
        let w = workload();
        let labels = extract_field_path(&w, "metadata.labels").unwrap();
        assert_eq!(labels, "env=\"test\"\ntier=\"backend\"");

        let annotations = extract_field_path(&w, "metadata.annotations").unwrap();
        assert_eq!(annotations, "owner=\"team \\\"core\\\"\"");
    }

    #[test]
    fn test_map_value_escaping() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "tab\there\nnew \"q\" back\\slash".to_string());
        map.insert("b".to_string(), "esc\u{1b} del\u{7f} bell\u{7} c1\u{85}".to_string());
        map.insert("c".to_string(), "café ✓ 'single'".to_string());

        assert_eq!(
            format_map(&map),
            [
                r#"a="tab\there\nnew \"q\" back\\slash""#,
                r#"b="esc\x1b del\x7f bell\a c1\u0085""#,
                r#"c="café ✓ 'single'""#,
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_subscripted_fields() {
        let w = workload();
        assert_eq!(extract_field_path(&w, "metadata.labels['tier']").unwrap(), "backend");
        assert_eq!(extract_field_path(&w, "metadata.labels['missing']").unwrap(), "");
        assert!(matches!(
            extract_field_path(&w, "spec.containers['api']"),
            Err(FieldError::UnsupportedFieldPath(_))
        ));
    }

    #[test]
    fn test_unset_and_unknown_fields() {
        let w = workload();
        assert_eq!(
            extract_field_path(&w, "spec.nodeName"),
            Err(FieldError::FieldNotSet("spec.nodeName".to_string()))
        );
        assert!(matches!(
            extract_field_path(&w, "metadata.generation"),
            Err(FieldError::UnsupportedFieldPath(_))
        ));
    }

    #[test]
    fn test_cpu_limit_with_divisor() {
        let w = workload();
        assert_eq!(extract_resource_value(&w, &selector("limits.cpu", None), None).unwrap(), "2");
        assert_eq!(
            extract_resource_value(&w, &selector("limits.cpu", Some("1m")), None).unwrap(),
            "1500"
        );
    }

    #[test]
    fn test_memory_limit_falls_back_to_allocatable() {
        let w = workload();
        let sel = selector("limits.memory", Some("1Mi"));
        assert!(sel.needs_allocatable(&w));
        assert_eq!(
            extract_resource_value(&w, &sel, None),
            Err(FieldError::AllocatableMissing("memory".to_string()))
        );

        let mut allocatable = ResourceList::new();
        allocatable.insert(RESOURCE_MEMORY.to_string(), Quantity::parse("2Gi").unwrap());
        assert_eq!(extract_resource_value(&w, &sel, Some(&allocatable)).unwrap(), "2048");
    }

    #[test]
    fn test_requests() {
        let w = workload();
        let memory = selector("requests.memory", Some("1Mi"));
        assert!(!memory.needs_allocatable(&w));
        assert_eq!(extract_resource_value(&w, &memory, None).unwrap(), "64");

        // cpu request unset, declared limit is used
        let cpu = selector("requests.cpu", Some("1m"));
        assert!(!cpu.needs_allocatable(&w));
        assert_eq!(extract_resource_value(&w, &cpu, None).unwrap(), "1500");
    }

    #[test]
    fn test_undeclared_request_reads_zero() {
        let mut w = workload();
        w.spec.containers[0].resources = ResourceRequirements::default();
        let sel = selector("requests.memory", Some("1Mi"));
        assert!(!sel.needs_allocatable(&w));
        assert_eq!(extract_resource_value(&w, &sel, None).unwrap(), "0");

        let mut allocatable = ResourceList::new();
        allocatable.insert(RESOURCE_MEMORY.to_string(), Quantity::parse("2Gi").unwrap());
        assert_eq!(extract_resource_value(&w, &sel, Some(&allocatable)).unwrap(), "0");
        assert_eq!(
            extract_resource_value(&w, &selector("requests.cpu", None), None).unwrap(),
            "0"
        );
    }

    #[test]
    fn test_resource_errors() {
        let w = workload();
        assert!(matches!(
            extract_resource_value(&w, &selector("limits.gpu", None), None),
            Err(FieldError::UnsupportedResource(_))
        ));
        assert!(matches!(
            extract_resource_value(&w, &selector("limits.cpu", Some("0")), None),
            Err(FieldError::InvalidDivisor(_))
        ));

        let mut missing = selector("limits.cpu", None);
        missing.container_name = "sidecar".to_string();
        assert_eq!(
            extract_resource_value(&w, &missing, None),
            Err(FieldError::ContainerNotFound("sidecar".to_string()))
        );
    }

    #[test]
    fn test_sort_lines_is_deterministic_and_idempotent() {
        let inputs = [
            "tier=\"backend\"\nenv=\"test\"",
            "b\na\nc\n",
            "",
            "single",
            "z\n\ny\nx",
        ];
        for input in inputs {
            let once = sort_lines(input);
            assert_eq!(sort_lines(input), once);
            assert_eq!(sort_lines(&once), once);
        }
        assert_eq!(sort_lines("tier=\"backend\"\nenv=\"test\""), "env=\"test\"\ntier=\"backend\"");
    }
}
