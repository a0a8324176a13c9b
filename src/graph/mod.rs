/// Resource graph construction
///
/// Resources are declared in order. A declaration may only depend on
/// resources declared before it, so the graph is acyclic by construction and
/// declaration order is already a valid creation order.
pub mod state;

pub use state::{EngineState, ResourceState, ResourceStatus};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, StackError};
use crate::output::{Output, Resolver};

/// A declarable resource type and its output contract
pub trait Resource: Serialize {
    /// Engine type token, e.g. `gcp:compute:Network`
    const KIND: &'static str;

    /// Fields the engine populates after creation
    const OUTPUTS: &'static [&'static str];
}

/// Per-declaration options
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    depends_on: Vec<String>,
    provider: Option<String>,
    protect: bool,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an explicit dependency
    pub fn depends_on(mut self, handle: &ResourceHandle) -> Self {
        self.depends_on.push(handle.name.clone());
        self
    }

    /// Submit through a non-default provider; implies a dependency on it
    pub fn provider(mut self, handle: &ResourceHandle) -> Self {
        self.provider = Some(handle.name.clone());
        self.depends_on.push(handle.name.clone());
        self
    }

    /// Ask the engine to refuse deletion
    pub fn protect(mut self, protect: bool) -> Self {
        self.protect = protect;
        self
    }
}

/// One declared resource as submitted to the engine
#[derive(Debug, Clone, Serialize)]
pub struct Declaration {
    pub name: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub protect: bool,
    pub args: serde_json::Value,
}

/// Handle to a declared resource and its deferred outputs
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    name: String,
    kind: &'static str,
    outputs: BTreeMap<&'static str, Output<String>>,
}

impl ResourceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deferred value of one output field
    pub fn output(&self, field: &str) -> Result<Output<String>> {
        self.outputs
            .get(field)
            .cloned()
            .ok_or_else(|| StackError::UnknownOutput {
                kind: self.kind.to_string(),
                field: field.to_string(),
            })
    }
}

/// The set of declarations making up one stack
#[derive(Default)]
pub struct ResourceGraph {
    declarations: Vec<Declaration>,
    index: HashMap<String, usize>,
    resolvers: BTreeMap<String, Vec<(&'static str, Resolver<String>)>>,
}

impl std::fmt::Debug for ResourceGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGraph")
            .field("declarations", &self.declarations)
            .finish()
    }
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource and return a handle to its outputs.
    ///
    /// Dependencies come from `options` and from every deferred value in
    /// `spec` that refers to another resource.
    pub fn declare<R: Resource>(
        &mut self,
        name: &str,
        spec: &R,
        options: ResourceOptions,
    ) -> Result<ResourceHandle> {
        if name.is_empty() || name.contains('.') {
            return Err(StackError::invalid_config(
                "resource name",
                format!("'{}' must be non-empty and contain no '.'", name),
            ));
        }
        if self.index.contains_key(name) {
            return Err(StackError::DuplicateResource(name.to_string()));
        }

        let args = serde_json::to_value(spec).map_err(|e| {
            StackError::invalid_config(name, format!("failed to serialize arguments: {}", e))
        })?;

        let mut depends_on = BTreeSet::new();
        collect_references(&args, &mut depends_on);
        depends_on.extend(options.depends_on);

        for dep in &depends_on {
            if !self.index.contains_key(dep) {
                return Err(StackError::UnknownDependency(dep.clone()));
            }
        }

        let mut outputs = BTreeMap::new();
        let mut resolvers = Vec::with_capacity(R::OUTPUTS.len());
        for field in R::OUTPUTS {
            let (output, resolver) = Output::pending(name, field);
            outputs.insert(*field, output);
            resolvers.push((*field, resolver));
        }

        debug!(
            "Declared {} {} (depends on: {:?})",
            R::KIND,
            name,
            depends_on
        );

        self.index.insert(name.to_string(), self.declarations.len());
        self.resolvers.insert(name.to_string(), resolvers);
        self.declarations.push(Declaration {
            name: name.to_string(),
            kind: R::KIND,
            depends_on: depends_on.into_iter().collect(),
            provider: options.provider,
            protect: options.protect,
            args,
        });

        Ok(ResourceHandle {
            name: name.to_string(),
            kind: R::KIND,
            outputs,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.index.get(name).map(|&i| &self.declarations[i])
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Number of declarations of a given kind
    #[cfg(test)]
    pub fn count_kind(&self, kind: &str) -> usize {
        self.declarations.iter().filter(|d| d.kind == kind).count()
    }

    /// Group declarations into waves. Every resource in a wave depends only
    /// on resources in earlier waves, so a wave can be created concurrently.
    pub fn waves(&self) -> Vec<Vec<&Declaration>> {
        let mut level: Vec<usize> = Vec::with_capacity(self.declarations.len());
        let mut waves: Vec<Vec<&Declaration>> = Vec::new();

        for decl in &self.declarations {
            let wave = decl
                .depends_on
                .iter()
                .filter_map(|dep| self.index.get(dep))
                .map(|&i| level[i] + 1)
                .max()
                .unwrap_or(0);
            level.push(wave);
            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(decl);
        }

        waves
    }

    /// Feed the engine's reported state into every pending output.
    ///
    /// Resources missing from the state, failed resources and missing fields
    /// all resolve their outputs with an error instead of being left pending.
    pub fn resolve(&mut self, state: &EngineState) {
        for (resource, resolvers) in std::mem::take(&mut self.resolvers) {
            match state.resources.get(&resource) {
                None => {
                    warn!("Resource {} is missing from engine state", resource);
                    for (field, tx) in resolvers {
                        let _ = tx.send(Err(StackError::unresolved(format!(
                            "{}.{}: resource was not reported by the engine",
                            resource, field
                        ))));
                    }
                }
                Some(ResourceState {
                    status: ResourceStatus::Failed,
                    message,
                    ..
                }) => {
                    let message = message
                        .clone()
                        .unwrap_or_else(|| "provisioning failed".to_string());
                    warn!("Resource {} failed: {}", resource, message);
                    for (_, tx) in resolvers {
                        let _ = tx.send(Err(StackError::remote(&resource, &message)));
                    }
                }
                Some(resource_state) => {
                    for (field, tx) in resolvers {
                        let value = resource_state.output(field).ok_or_else(|| {
                            StackError::unresolved(format!(
                                "{}.{}: field missing from engine state",
                                resource, field
                            ))
                        });
                        let _ = tx.send(value);
                    }
                }
            }
        }
    }
}

/// Collect resource names referenced by `$ref`/`$derived` markers
fn collect_references(value: &serde_json::Value, into: &mut BTreeSet<String>) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(r)) = map.get("$ref") {
                if let Some((resource, _)) = r.split_once('.') {
                    into.insert(resource.to_string());
                }
            }
            if let Some(serde_json::Value::Array(refs)) = map.get("$derived") {
                for r in refs.iter().filter_map(|r| r.as_str()) {
                    if let Some((resource, _)) = r.split_once('.') {
                        into.insert(resource.to_string());
                    }
                }
            }
            for v in map.values() {
                collect_references(v, into);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                collect_references(v, into);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Thing {
        name: String,
    }

    impl Resource for Thing {
        const KIND: &'static str = "test:Thing";
        const OUTPUTS: &'static [&'static str] = &["id"];
    }

    #[derive(Serialize)]
    struct Child {
        parent: Output<String>,
    }

    impl Resource for Child {
        const KIND: &'static str = "test:Child";
        const OUTPUTS: &'static [&'static str] = &["id", "ip"];
    }

    fn thing(name: &str) -> Thing {
        Thing {
            name: name.to_string(),
        }
    }

    #[test]
    fn test_implicit_dependency_from_output() {
        let mut graph = ResourceGraph::new();
        let parent = graph.declare("parent", &thing("p"), ResourceOptions::new()).unwrap();
        let child = Child {
            parent: parent.output("id").unwrap(),
        };
        graph.declare("child", &child, ResourceOptions::new()).unwrap();

        let decl = graph.get("child").unwrap();
        assert_eq!(decl.depends_on, vec!["parent"]);
        assert_eq!(decl.args["parent"], serde_json::json!({"$ref": "parent.id"}));
    }

    #[test]
    fn test_unknown_output_field() {
        let mut graph = ResourceGraph::new();
        let parent = graph.declare("parent", &thing("p"), ResourceOptions::new()).unwrap();
        let err = parent.output("endpoint").unwrap_err();
        assert!(matches!(err, StackError::UnknownOutput { .. }));
    }

    #[test]
    fn test_duplicate_resource_name() {
        let mut graph = ResourceGraph::new();
        graph.declare("a", &thing("a"), ResourceOptions::new()).unwrap();
        let err = graph.declare("a", &thing("a"), ResourceOptions::new()).unwrap_err();
        assert_eq!(err, StackError::DuplicateResource("a".to_string()));
    }

    #[test]
    fn test_dependency_on_foreign_graph_is_rejected() {
        let mut other = ResourceGraph::new();
        let foreign = other.declare("foreign", &thing("f"), ResourceOptions::new()).unwrap();

        let mut graph = ResourceGraph::new();
        let err = graph
            .declare("a", &thing("a"), ResourceOptions::new().depends_on(&foreign))
            .unwrap_err();
        assert_eq!(err, StackError::UnknownDependency("foreign".to_string()));
    }

    #[test]
    fn test_waves() {
        let mut graph = ResourceGraph::new();
        let a = graph.declare("a", &thing("a"), ResourceOptions::new()).unwrap();
        graph.declare("b", &thing("b"), ResourceOptions::new()).unwrap();
        let c = graph
            .declare("c", &Child { parent: a.output("id").unwrap() }, ResourceOptions::new())
            .unwrap();
        graph
            .declare("d", &thing("d"), ResourceOptions::new().provider(&c))
            .unwrap();

        let waves: Vec<Vec<&str>> = graph
            .waves()
            .iter()
            .map(|w| w.iter().map(|d| d.name.as_str()).collect())
            .collect();
        assert_eq!(waves, vec![vec!["a", "b"], vec!["c"], vec!["d"]]);
        assert_eq!(graph.get("d").unwrap().provider.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_resolve_from_engine_state() {
        let mut graph = ResourceGraph::new();
        let parent = graph.declare("parent", &thing("p"), ResourceOptions::new()).unwrap();
        let child = graph
            .declare(
                "child",
                &Child {
                    parent: parent.output("id").unwrap(),
                },
                ResourceOptions::new(),
            )
            .unwrap();

        let state: EngineState = serde_yaml::from_str(
            r#"
resources:
  parent:
    status: created
    outputs:
      id: projects/p/global/networks/parent
  child:
    status: failed
    message: "quota exceeded"
"#,
        )
        .unwrap();
        graph.resolve(&state);

        assert_eq!(
            parent.output("id").unwrap().resolve().await.unwrap(),
            "projects/p/global/networks/parent"
        );
        let err = child.output("ip").unwrap().resolve().await.unwrap_err();
        assert_eq!(err, StackError::remote("child", "quota exceeded"));
    }

    #[tokio::test]
    async fn test_resolve_missing_resource_and_field() {
        let mut graph = ResourceGraph::new();
        let a = graph.declare("a", &thing("a"), ResourceOptions::new()).unwrap();
        let b = graph
            .declare("b", &Child { parent: a.output("id").unwrap() }, ResourceOptions::new())
            .unwrap();

        let state: EngineState =
            serde_yaml::from_str("resources:\n  b:\n    status: created\n    outputs:\n      id: b-1\n")
                .unwrap();
        graph.resolve(&state);

        assert!(matches!(
            a.output("id").unwrap().resolve().await,
            Err(StackError::DependencyUnresolved(_))
        ));
        assert_eq!(b.output("id").unwrap().resolve().await.unwrap(), "b-1");
        assert!(matches!(
            b.output("ip").unwrap().resolve().await,
            Err(StackError::DependencyUnresolved(_))
        ));
    }
}
