/// Exported stack outputs
use std::collections::BTreeMap;

use futures::future::join_all;
use serde::Serialize;
use tracing::debug;

use super::Output;
use crate::error::{Result, StackError};

/// The named results a stack exports.
///
/// Built once through [`OutputSetBuilder`]; names are unique.
#[derive(Debug, Clone, Serialize)]
pub struct OutputSet {
    entries: BTreeMap<String, Output<String>>,
}

/// Builder that rejects duplicate export names
#[derive(Debug, Default)]
pub struct OutputSetBuilder {
    entries: BTreeMap<String, Output<String>>,
}

impl OutputSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an export
    pub fn export(&mut self, name: &str, value: Output<String>) -> Result<&mut Self> {
        if self.entries.contains_key(name) {
            return Err(StackError::DuplicateOutput(name.to_string()));
        }
        debug!("Exporting output: {}", name);
        self.entries.insert(name.to_string(), value);
        Ok(self)
    }

    pub fn build(self) -> OutputSet {
        OutputSet {
            entries: self.entries,
        }
    }
}

impl OutputSet {
    pub fn builder() -> OutputSetBuilder {
        OutputSetBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<&Output<String>> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Wait for every export and return them sorted by name.
    ///
    /// The first failure, in name order, is returned. Unresolved dependencies
    /// are prefixed with the export name; engine-reported failures already
    /// name their resource and are returned unchanged.
    pub async fn resolve_all(&self) -> Result<BTreeMap<String, String>> {
        let resolved = join_all(self.entries.values().map(|o| o.resolve())).await;

        let mut values = BTreeMap::new();
        for (name, result) in self.entries.keys().zip(resolved) {
            match result {
                Ok(value) => {
                    values.insert(name.clone(), value);
                }
                Err(StackError::DependencyUnresolved(what)) => {
                    return Err(StackError::unresolved(format!(
                        "output '{}': {}",
                        name, what
                    )));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_export_is_rejected() {
        let mut builder = OutputSet::builder();
        builder
            .export("kubeconfig", Output::known("doc".to_string()))
            .unwrap();
        let err = builder
            .export("kubeconfig", Output::known("other".to_string()))
            .unwrap_err();
        assert_eq!(err, StackError::DuplicateOutput("kubeconfig".to_string()));

        // The first registration is kept
        let set = builder.build();
        let value = tokio_test::block_on(set.get("kubeconfig").unwrap().resolve()).unwrap();
        assert_eq!(value, "doc");
    }

    #[tokio::test]
    async fn test_resolve_all_sorted() {
        let mut builder = OutputSet::builder();
        builder
            .export("network_id", Output::known("net-1".to_string()))
            .unwrap()
            .export("environment", Output::known("dev".to_string()))
            .unwrap();
        let set = builder.build();

        let values = set.resolve_all().await.unwrap();
        let names: Vec<_> = values.keys().cloned().collect();
        assert_eq!(names, vec!["environment", "network_id"]);
        assert_eq!(values["environment"], "dev");
    }

    #[tokio::test]
    async fn test_resolve_all_names_unresolved_output() {
        let (pending, tx) = Output::<String>::pending("cluster", "endpoint");
        drop(tx);

        let mut builder = OutputSet::builder();
        builder.export("endpoint", pending).unwrap();
        let err = builder.build().resolve_all().await.unwrap_err();

        match err {
            StackError::DependencyUnresolved(msg) => assert!(msg.contains("'endpoint'")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failures_name_their_origin() {
        let (missing, tx_missing) = Output::<String>::pending("instance", "nat_ip");
        drop(tx_missing);
        let mut builder = OutputSet::builder();
        builder.export("instance_external_ip", missing).unwrap();
        let err = builder.build().resolve_all().await.unwrap_err();
        assert!(matches!(err, StackError::DependencyUnresolved(ref what)
            if what.starts_with("output 'instance_external_ip': ")));

        let (failed, tx_failed) = Output::<String>::pending("dev-cluster", "endpoint");
        tx_failed
            .send(Err(StackError::remote("dev-cluster", "quota exceeded")))
            .unwrap();
        let mut builder = OutputSet::builder();
        builder.export("endpoint", failed).unwrap();
        let err = builder.build().resolve_all().await.unwrap_err();
        assert_eq!(err, StackError::remote("dev-cluster", "quota exceeded"));
    }
}
