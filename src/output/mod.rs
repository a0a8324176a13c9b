/// Deferred resource outputs
///
/// An [`Output`] is a handle to a value that becomes known only after the
/// provisioning engine has created the resource that produces it. Outputs are
/// cheap to clone; every clone observes the same resolution.
pub mod set;

pub use set::OutputSet;

use futures::future::{self, BoxFuture, FutureExt, Shared};
use serde::{Serialize, Serializer};
use tokio::sync::oneshot;

use crate::error::{Result, StackError};

/// Reference to one output field of a declared resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FieldRef {
    pub resource: String,
    pub field: String,
}

impl std::fmt::Display for FieldRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource, self.field)
    }
}

/// Where an output's value comes from, used when rendering a plan
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Value known at declaration time
    Known(serde_json::Value),
    /// Field populated by the engine
    Field(FieldRef),
    /// Computed in-process from engine-populated fields
    Derived(Vec<FieldRef>),
}

impl Source {
    fn field_refs(&self) -> Vec<FieldRef> {
        match self {
            Source::Known(_) => Vec::new(),
            Source::Field(r) => vec![r.clone()],
            Source::Derived(refs) => refs.clone(),
        }
    }
}

/// Sender half that completes a pending [`Output`]
pub type Resolver<T> = oneshot::Sender<Result<T>>;

/// A deferred value with `and_then` and `all` combinators
#[derive(Clone)]
pub struct Output<T> {
    future: Shared<BoxFuture<'static, Result<T>>>,
    source: Source,
}

impl<T> std::fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output").field("source", &self.source).finish()
    }
}

impl<T> Output<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    /// An output whose value is known at declaration time
    pub fn known(value: T) -> Self {
        let rendered = serde_json::to_value(&value).unwrap_or(serde_json::Value::Null);
        Self {
            future: future::ready(Ok(value)).boxed().shared(),
            source: Source::Known(rendered),
        }
    }

    /// An output that has already failed
    pub fn failed(error: StackError) -> Self {
        Self {
            future: future::ready(Err(error)).boxed().shared(),
            source: Source::Derived(Vec::new()),
        }
    }

    /// A pending output for `resource.field` together with its resolver.
    ///
    /// Dropping the resolver without sending resolves the output with
    /// [`StackError::DependencyUnresolved`].
    pub fn pending(resource: &str, field: &str) -> (Self, Resolver<T>) {
        let (tx, rx) = oneshot::channel();
        let field_ref = FieldRef {
            resource: resource.to_string(),
            field: field.to_string(),
        };
        let label = field_ref.to_string();
        let future = async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(StackError::unresolved(format!(
                    "{} was never reported by the engine",
                    label
                ))),
            }
        }
        .boxed()
        .shared();

        (
            Self {
                future,
                source: Source::Field(field_ref),
            },
            tx,
        )
    }

    pub fn is_known(&self) -> bool {
        matches!(self.source, Source::Known(_))
    }

    /// Wait for the value
    pub async fn resolve(&self) -> Result<T> {
        self.future.clone().await
    }

    /// Transform the value once it resolves; the transform may fail.
    ///
    /// Transforming a known output yields a known output.
    pub fn and_then<U, F>(&self, f: F) -> Output<U>
    where
        U: Clone + Serialize + Send + Sync + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        if self.is_known() {
            if let Some(result) = self.future.clone().now_or_never() {
                return match result.and_then(f) {
                    Ok(value) => Output::known(value),
                    Err(e) => Output::failed(e),
                };
            }
        }

        let upstream = self.future.clone();
        Output {
            future: async move { f(upstream.await?) }.boxed().shared(),
            source: Source::Derived(self.source.field_refs()),
        }
    }

    /// Combine a list of outputs into one output of all their values
    pub fn all(outputs: Vec<Output<T>>) -> Output<Vec<T>> {
        let known = outputs.iter().all(Output::is_known);
        let mut refs: Vec<FieldRef> = outputs
            .iter()
            .flat_map(|o| o.source.field_refs())
            .collect();
        refs.sort();
        refs.dedup();

        let futures: Vec<_> = outputs.into_iter().map(|o| o.future).collect();
        let combined = Output {
            future: future::try_join_all(futures).boxed().shared(),
            source: Source::Derived(refs),
        };
        if known {
            combined.into_known()
        } else {
            combined
        }
    }

    /// Collapse an already-completed output into a known one
    fn into_known(self) -> Self {
        match self.future.clone().now_or_never() {
            Some(Ok(value)) => Output::known(value),
            Some(Err(e)) => Output::failed(e),
            None => self,
        }
    }
}

impl<T> Serialize for Output<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.source {
            Source::Known(value) => value.serialize(serializer),
            Source::Field(field_ref) => {
                let mut map = std::collections::BTreeMap::new();
                map.insert("$ref", field_ref.to_string());
                map.serialize(serializer)
            }
            Source::Derived(refs) => {
                let mut map = std::collections::BTreeMap::new();
                map.insert(
                    "$derived",
                    refs.iter().map(ToString::to_string).collect::<Vec<_>>(),
                );
                map.serialize(serializer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_output_resolves() {
        let out = Output::known("dev".to_string());
        assert!(out.is_known());
        assert_eq!(out.resolve().await.unwrap(), "dev");
    }

    #[tokio::test]
    async fn test_pending_output_resolves_after_send() {
        let (out, tx) = Output::<String>::pending("cluster", "endpoint");
        let mapped = out.and_then(|e| Ok(format!("https://{}", e)));
        assert!(!mapped.is_known());

        tx.send(Ok("10.0.0.1".to_string())).unwrap();
        assert_eq!(mapped.resolve().await.unwrap(), "https://10.0.0.1");
        // Clones observe the same value
        assert_eq!(out.clone().resolve().await.unwrap(), "10.0.0.1");
    }

    #[tokio::test]
    async fn test_dropped_resolver_is_unresolved() {
        let (out, tx) = Output::<String>::pending("cluster", "endpoint");
        drop(tx);
        let err = out.resolve().await.unwrap_err();
        assert!(matches!(err, StackError::DependencyUnresolved(_)));
        assert!(err.to_string().contains("cluster.endpoint"));
    }

    #[tokio::test]
    async fn test_all_fails_if_any_input_fails() {
        let a = Output::known("a".to_string());
        let (b, tx_b) = Output::<String>::pending("cluster", "endpoint");
        let (c, tx_c) = Output::<String>::pending("cluster", "ca");
        let combined = Output::all(vec![a, b, c]);

        tx_b.send(Ok("b".to_string())).unwrap();
        tx_c.send(Err(StackError::remote("cluster", "quota exceeded")))
            .unwrap();

        let err = combined.resolve().await.unwrap_err();
        assert!(matches!(err, StackError::RemoteProvisioning { .. }));
    }

    #[test]
    fn test_transform_of_known_stays_known() {
        let out = Output::known(2_i64).and_then(|n| Ok(n * 3));
        assert!(out.is_known());
        assert_eq!(tokio_test::block_on(out.resolve()).unwrap(), 6);
    }

    #[test]
    fn test_all_of_known_stays_known() {
        let out = Output::all(vec![Output::known(1_i64), Output::known(2_i64)]);
        assert!(out.is_known());
        assert_eq!(tokio_test::block_on(out.resolve()).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_serialize_sources() {
        let known = serde_json::to_value(Output::known("x".to_string())).unwrap();
        assert_eq!(known, serde_json::json!("x"));

        let (field, _tx) = Output::<String>::pending("network", "id");
        let field = serde_json::to_value(&field).unwrap();
        assert_eq!(field, serde_json::json!({"$ref": "network.id"}));

        let (a, _ta) = Output::<String>::pending("cluster", "name");
        let (b, _tb) = Output::<String>::pending("cluster", "endpoint");
        let derived = Output::all(vec![a, b]);
        let derived = serde_json::to_value(&derived).unwrap();
        assert_eq!(
            derived,
            serde_json::json!({"$derived": ["cluster.endpoint", "cluster.name"]})
        );
    }
}
