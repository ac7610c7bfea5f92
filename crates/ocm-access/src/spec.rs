//! Access specifications and the type scheme that decodes them.
//!
//! An access spec is pure data describing where the bytes of an artifact
//! live. It is serialized as a JSON record whose `type` field names the
//! technology, optionally versioned (`maven/v1`). Decoding goes through an
//! [`AccessSpecScheme`] so that new technologies can be added without
//! touching resolution code.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ocm_refhints::ReferenceHints;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::context::{ComponentVersion, Context};
use crate::error::{AccessError, Result};
use crate::method::AccessMethod;

/// Cloning support for boxed access specs.
pub trait AccessSpecClone {
    fn clone_box(&self) -> Box<dyn AccessSpec>;
}

impl<T> AccessSpecClone for T
where
    T: AccessSpec + Clone + 'static,
{
    fn clone_box(&self) -> Box<dyn AccessSpec> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn AccessSpec> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A technology specific description of where an artifact's bytes live.
///
/// Implementations never perform I/O on construction. All I/O happens in
/// the [`AccessMethod`] returned by [`AccessSpec::access_method`].
pub trait AccessSpec: AccessSpecClone + Send + Sync + fmt::Debug {
    /// Technology name without version (`maven`, `ociArtifact`, ...).
    fn kind(&self) -> &str;

    /// The `type` value as given when the spec was created or decoded.
    fn type_name(&self) -> &str;

    /// The version part of the type name, if any.
    fn version(&self) -> Option<&str> {
        self.type_name().split_once('/').map(|(_, v)| v)
    }

    /// Short human readable description.
    fn describe(&self, ctx: &Context) -> String;

    /// Whether the bytes are stored with the component version itself.
    fn is_local(&self, _ctx: &Context) -> bool {
        false
    }

    /// A spec usable without the component version. Global specs return a
    /// copy of themselves.
    fn global_access_spec(&self, ctx: &Context) -> Option<Box<dyn AccessSpec>> {
        if self.is_local(ctx) {
            None
        } else {
            Some(self.clone_box())
        }
    }

    /// A technology meaningful locator for display. Never used for
    /// retrieval.
    fn reference_hint(&self, _cv: &ComponentVersion) -> Option<String> {
        None
    }

    /// Implicit hints describing where the artifact came from.
    fn reference_hints(&self, _cv: &ComponentVersion) -> ReferenceHints {
        ReferenceHints::new()
    }

    /// The live access method. No I/O happens until it is first read.
    fn access_method(&self, cv: &ComponentVersion) -> Result<AccessMethod>;

    /// The serialized record.
    fn encode(&self) -> Result<Value>;
}

/// Encode a serde serializable spec.
pub(crate) fn encode_spec<S: Serialize>(spec: &S) -> Result<Value> {
    Ok(serde_json::to_value(spec)?)
}

type Decoder = Arc<dyn Fn(Value) -> Result<Box<dyn AccessSpec>> + Send + Sync>;

/// Decoders for access spec types, keyed by type name.
#[derive(Default)]
pub struct AccessSpecScheme {
    decoders: RwLock<HashMap<String, Decoder>>,
}

impl AccessSpecScheme {
    pub fn new() -> Self {
        AccessSpecScheme::default()
    }

    /// Register a decoder under a type name.
    pub fn register<F>(&self, type_name: impl Into<String>, decoder: F)
    where
        F: Fn(Value) -> Result<Box<dyn AccessSpec>> + Send + Sync + 'static,
    {
        self.decoders.write().insert(type_name.into(), Arc::new(decoder));
    }

    /// Register a serde decodable spec type under `kind` and `kind/version`,
    /// plus any aliases.
    pub fn register_type<S>(&self, kind: &str, version: &str, aliases: &[&str])
    where
        S: AccessSpec + DeserializeOwned + 'static,
    {
        let decoder: Decoder = Arc::new(|value: Value| {
            let spec: S = serde_json::from_value(value)
                .map_err(|e| AccessError::invalid("access specification", e.to_string()))?;
            Ok(Box::new(spec) as Box<dyn AccessSpec>)
        });
        let mut decoders = self.decoders.write();
        for name in std::iter::once(kind).chain(aliases.iter().copied()) {
            decoders.insert(name.to_string(), Arc::clone(&decoder));
            decoders.insert(format!("{name}/{version}"), Arc::clone(&decoder));
        }
    }

    pub fn is_known(&self, type_name: &str) -> bool {
        self.decoders.read().contains_key(type_name)
    }

    /// All registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.decoders.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Decode a record. Unknown types yield an [`UnknownAccessSpec`].
    pub fn decode(&self, value: Value) -> Result<Box<dyn AccessSpec>> {
        let type_name = match value.get("type") {
            Some(Value::String(t)) if !t.is_empty() => t.clone(),
            Some(_) => {
                return Err(AccessError::invalid(
                    "access specification",
                    "type must be a non-empty string",
                ))
            }
            None => return Err(AccessError::invalid("access specification", "missing type")),
        };
        let decoder = self.decoders.read().get(&type_name).cloned();
        match decoder {
            Some(decoder) => decoder(value),
            None => {
                tracing::debug!(%type_name, "unknown access method type");
                Ok(Box::new(UnknownAccessSpec { type_name, raw: value }))
            }
        }
    }

    /// Decode a record, failing for types without registered decoder.
    pub fn decode_known(&self, value: Value) -> Result<Box<dyn AccessSpec>> {
        let spec = self.decode(value)?;
        if !self.is_known(spec.type_name()) {
            return Err(AccessError::UnknownType {
                type_name: spec.type_name().to_string(),
            });
        }
        Ok(spec)
    }

    pub fn decode_str(&self, data: &str) -> Result<Box<dyn AccessSpec>> {
        self.decode(serde_json::from_str(data)?)
    }

    pub fn encode(&self, spec: &dyn AccessSpec) -> Result<Value> {
        spec.encode()
    }
}

impl fmt::Debug for AccessSpecScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessSpecScheme")
            .field("types", &self.type_names())
            .finish()
    }
}

/// A spec of a type without registered decoder. The raw record is kept so
/// it can be passed on unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownAccessSpec {
    type_name: String,
    raw: Value,
}

impl UnknownAccessSpec {
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl AccessSpec for UnknownAccessSpec {
    fn kind(&self) -> &str {
        self.type_name
            .split_once('/')
            .map(|(k, _)| k)
            .unwrap_or(&self.type_name)
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn describe(&self, _ctx: &Context) -> String {
        format!("unknown access method type {}", self.type_name)
    }

    fn access_method(&self, _cv: &ComponentVersion) -> Result<AccessMethod> {
        Err(AccessError::not_supported(
            format!("access method type {:?}", self.type_name),
            "this context",
        ))
    }

    fn encode(&self) -> Result<Value> {
        Ok(self.raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DirectoryComponentVersion;
    use crate::methods::maven::MavenAccessSpec;
    use crate::retry::RetryPolicy;
    use serde_json::json;

    #[test]
    fn decode_versioned_and_alias() {
        let scheme = crate::methods::default_scheme();
        for t in ["maven", "maven/v1", "mvn", "mvn/v1"] {
            let spec = scheme
                .decode(json!({
                    "type": t,
                    "repoUrl": "file:///repo",
                    "groupId": "org.acme",
                    "artifactId": "lib",
                    "version": "1.0",
                }))
                .unwrap();
            assert_eq!(spec.kind(), "maven");
            assert_eq!(spec.type_name(), t);
            assert_eq!(spec.encode().unwrap()["type"], t);
        }
        let spec = scheme.decode_str(r#"{"type":"maven/v1","repoUrl":"x","groupId":"g","artifactId":"a","version":"1"}"#).unwrap();
        assert_eq!(spec.version(), Some("v1"));
    }

    #[test]
    fn decode_errors() {
        let scheme = crate::methods::default_scheme();
        assert!(matches!(
            scheme.decode(json!({"repoUrl": "x"})),
            Err(AccessError::Invalid { .. })
        ));
        assert!(matches!(
            scheme.decode(json!({"type": "maven", "groupId": 5})),
            Err(AccessError::Invalid { .. })
        ));
        assert!(matches!(scheme.decode_str("{"), Err(AccessError::Json(_))));
    }

    #[test]
    fn unknown_type_keeps_record() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::builder()
            .cache_dir(dir.path())
            .retry_policy(RetryPolicy::no_retry())
            .build()
            .unwrap();
        let raw = json!({"type": "helm/v1", "chart": "x"});
        let spec = ctx.decode_access_spec(raw.clone()).unwrap();
        assert_eq!(spec.kind(), "helm");
        assert_eq!(spec.encode().unwrap(), raw);
        assert!(spec.global_access_spec(&ctx).is_some());
        let cv = DirectoryComponentVersion::new(&ctx, "c", "1", dir.path().join("cv"))
            .unwrap()
            .into_shared();
        assert!(matches!(
            spec.access_method(&cv),
            Err(AccessError::NotSupported { .. })
        ));
        assert!(matches!(
            ctx.scheme().decode_known(raw),
            Err(AccessError::UnknownType { .. })
        ));
    }

    #[test]
    fn boxed_specs_clone() {
        let spec: Box<dyn AccessSpec> = Box::new(MavenAccessSpec::new(
            "file:///repo",
            "org.acme",
            "lib",
            "1.0",
        ));
        let copy = spec.clone();
        assert_eq!(copy.encode().unwrap(), spec.encode().unwrap());
    }
}
