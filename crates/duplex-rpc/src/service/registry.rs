//! Service registration and lookup.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::types::{DispatchError, RegistrationError};

use super::method::{MethodDescriptor, MethodSet};
use super::{is_exported, Service};

/// A registered service: its name and callable methods, bound to one receiver.
#[derive(Debug)]
pub struct ServiceEntry {
    name: String,
    methods: HashMap<String, MethodDescriptor>,
}

impl ServiceEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    fn info(&self) -> ServiceInfo {
        let mut methods: Vec<MethodInfo> = self
            .methods
            .values()
            .map(|m| MethodInfo {
                name: m.name().to_string(),
                arg_type: m.arg_type().to_string(),
                reply_type: m.reply_type().to_string(),
            })
            .collect();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        ServiceInfo {
            name: self.name.clone(),
            methods,
        }
    }
}

/// Description of a registered service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub methods: Vec<MethodInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodInfo {
    pub name: String,
    pub arg_type: String,
    pub reply_type: String,
}

/// Services callable on one connection, keyed by name.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<ServiceEntry>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `receiver` under its own name, or under `name_override` if non-empty.
    pub async fn register<S: Service>(
        &self,
        receiver: S,
        name_override: Option<&str>,
    ) -> Result<(), RegistrationError> {
        self.register_shared(Arc::new(receiver), name_override).await
    }

    /// Like [`register`](Self::register) for a receiver that is shared elsewhere.
    pub async fn register_shared<S: Service>(
        &self,
        receiver: Arc<S>,
        name_override: Option<&str>,
    ) -> Result<(), RegistrationError> {
        let name = match name_override {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => S::service_name(),
        };

        if !is_exported(&name) {
            tracing::warn!("rpc.Register: type {name} is not exported");
            return Err(RegistrationError::UnexportedName(name));
        }

        let mut set = MethodSet::new(receiver);
        S::methods(&mut set);

        let mut services = self.services.write().await;
        if services.contains_key(&name) {
            return Err(RegistrationError::DuplicateService(name));
        }

        if set.is_empty() {
            let hint = (!set.excluded().is_empty()).then(|| {
                format!(
                    "declared methods {} are not exported; method names must start with an upper-case letter",
                    set.excluded().join(", ")
                )
            });
            let err = RegistrationError::NoSuitableMethods {
                service: name,
                hint,
            };
            tracing::warn!("{err}");
            return Err(err);
        }

        let methods = set
            .into_methods()
            .into_iter()
            .map(|m| (m.name().to_string(), m))
            .collect::<HashMap<_, _>>();

        let entry = Arc::new(ServiceEntry {
            name: name.clone(),
            methods,
        });
        tracing::info!("Registered service {name} ({} methods)", entry.method_count());
        services.insert(name, entry);
        Ok(())
    }

    pub async fn get(&self, service: &str) -> Option<Arc<ServiceEntry>> {
        self.services.read().await.get(service).cloned()
    }

    /// Resolve `Service.Method` (split at the last dot) to its service entry.
    ///
    /// The method is checked to exist; fetch it from the returned entry.
    pub async fn lookup(&self, service_method: &str) -> Result<(Arc<ServiceEntry>, String), DispatchError> {
        let (service_name, method_name) = split_service_method(service_method)?;

        let entry = self
            .get(service_name)
            .await
            .ok_or_else(|| DispatchError::ServiceNotFound(service_method.to_string()))?;

        if entry.method(method_name).is_none() {
            return Err(DispatchError::MethodNotFound(service_method.to_string()));
        }

        Ok((entry, method_name.to_string()))
    }

    pub async fn contains(&self, service: &str) -> bool {
        self.services.read().await.contains_key(service)
    }

    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }

    pub async fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every service with its methods, sorted by name.
    pub async fn describe(&self) -> Vec<ServiceInfo> {
        let mut infos: Vec<ServiceInfo> = self
            .services
            .read()
            .await
            .values()
            .map(|entry| entry.info())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

/// Split `Service.Method` at the last `.`.
pub fn split_service_method(service_method: &str) -> Result<(&str, &str), DispatchError> {
    service_method
        .rsplit_once('.')
        .ok_or_else(|| DispatchError::IllFormedMethod(service_method.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Servable;

    impl Service for Servable {
        fn methods(methods: &mut MethodSet<Self>) {
            methods.method("Ping", |_: &Servable, arg: String, reply: &mut String| {
                *reply = format!("Pong:{arg}");
                Ok::<(), String>(())
            });
        }
    }

    #[allow(non_camel_case_types)]
    struct quiet;

    impl Service for quiet {
        fn methods(methods: &mut MethodSet<Self>) {
            methods.method("Ping", |_: &quiet, _: String, _: &mut String| Ok::<(), String>(()));
        }
    }

    struct Empty;

    impl Service for Empty {
        fn methods(_: &mut MethodSet<Self>) {}
    }

    struct LowerOnly;

    impl Service for LowerOnly {
        fn methods(methods: &mut MethodSet<Self>) {
            methods.method("ping", |_: &LowerOnly, _: String, _: &mut String| Ok::<(), String>(()));
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ServiceRegistry::new();
        registry.register(Servable, None).await.unwrap();

        let (entry, method) = registry.lookup("Servable.Ping").await.unwrap();
        assert_eq!(entry.name(), "Servable");
        assert_eq!(entry.method_count(), 1);
        let call = entry.method(&method).unwrap().bind(json!("X")).unwrap();
        assert_eq!(call().unwrap(), json!("Pong:X"));
    }

    #[tokio::test]
    async fn test_name_override() {
        let registry = ServiceRegistry::new();
        registry.register(Servable, Some("Node")).await.unwrap();
        assert!(registry.contains("Node").await);
        assert!(!registry.contains("Servable").await);
    }

    #[tokio::test]
    async fn test_empty_override_uses_type_name() {
        let registry = ServiceRegistry::new();
        registry.register(Servable, Some("")).await.unwrap();
        assert!(registry.contains("Servable").await);
    }

    #[tokio::test]
    async fn test_unexported_name_rejected() {
        let registry = ServiceRegistry::new();
        let err = registry.register(quiet, None).await.unwrap_err();
        assert_eq!(err, RegistrationError::UnexportedName("quiet".into()));

        let err = registry.register(Servable, Some("lower")).await.unwrap_err();
        assert_eq!(err, RegistrationError::UnexportedName("lower".into()));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_override_can_export_a_lowercase_type() {
        let registry = ServiceRegistry::new();
        registry.register(quiet, Some("Quiet")).await.unwrap();
        assert!(registry.contains("Quiet").await);
    }

    #[tokio::test]
    async fn test_duplicate_rejected_and_first_kept() {
        let registry = ServiceRegistry::new();
        registry.register(Servable, None).await.unwrap();
        let err = registry.register(Servable, None).await.unwrap_err();
        assert_eq!(err, RegistrationError::DuplicateService("Servable".into()));
        assert_eq!(registry.len().await, 1);
        assert!(registry.lookup("Servable.Ping").await.is_ok());
    }

    #[tokio::test]
    async fn test_no_suitable_methods() {
        let registry = ServiceRegistry::new();
        let err = registry.register(Empty, None).await.unwrap_err();
        assert_eq!(
            err,
            RegistrationError::NoSuitableMethods {
                service: "Empty".into(),
                hint: None
            }
        );
    }

    #[tokio::test]
    async fn test_no_suitable_methods_hints_at_excluded() {
        let registry = ServiceRegistry::new();
        let err = registry.register(LowerOnly, None).await.unwrap_err();
        match err {
            RegistrationError::NoSuitableMethods { service, hint } => {
                assert_eq!(service, "LowerOnly");
                assert!(hint.unwrap().contains("ping"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_lookup_errors() {
        let registry = ServiceRegistry::new();
        registry.register(Servable, None).await.unwrap();

        assert_eq!(
            registry.lookup("Ping").await.unwrap_err(),
            DispatchError::IllFormedMethod("Ping".into())
        );
        assert_eq!(
            registry.lookup("Unknown.Method").await.unwrap_err(),
            DispatchError::ServiceNotFound("Unknown.Method".into())
        );
        assert_eq!(
            registry.lookup("Servable.Pong").await.unwrap_err(),
            DispatchError::MethodNotFound("Servable.Pong".into())
        );
    }

    #[test]
    fn test_split_at_last_dot() {
        assert_eq!(split_service_method("a.b.Method").unwrap(), ("a.b", "Method"));
        assert!(split_service_method("NoDot").is_err());
    }

    #[tokio::test]
    async fn test_describe() {
        let registry = ServiceRegistry::new();
        registry.register(Servable, None).await.unwrap();
        registry.register(Servable, Some("Other")).await.unwrap();

        let infos = registry.describe().await;
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].name, "Other");
        assert_eq!(infos[1].methods[0].name, "Ping");
        assert_eq!(infos[1].methods[0].reply_type, "alloc::string::String");
        assert_eq!(registry.service_names().await, vec!["Other", "Servable"]);
    }
}
