//! Method declaration and type-erased invocation.

use std::fmt::Display;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::is_exported;

/// A method call with its argument already decoded, ready to run.
///
/// Returns the encoded reply, or the handler's error text.
pub type BoundCall = Box<dyn FnOnce() -> Result<Value, String> + Send>;

type Binder = Box<dyn Fn(Value) -> Result<BoundCall, serde_json::Error> + Send + Sync>;

/// One callable method of a registered service.
pub struct MethodDescriptor {
    name: String,
    arg_type: &'static str,
    reply_type: &'static str,
    binder: Binder,
}

impl MethodDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arg_type(&self) -> &'static str {
        self.arg_type
    }

    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }

    /// Decode `argument` into the declared argument type and bind it to the receiver.
    pub fn bind(&self, argument: Value) -> Result<BoundCall, serde_json::Error> {
        (self.binder)(argument)
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("arg_type", &self.arg_type)
            .field("reply_type", &self.reply_type)
            .finish()
    }
}

/// Collects the methods a [`Service`](super::Service) exposes.
pub struct MethodSet<S> {
    receiver: Arc<S>,
    methods: Vec<MethodDescriptor>,
    excluded: Vec<String>,
}

impl<S: Send + Sync + 'static> MethodSet<S> {
    pub(crate) fn new(receiver: Arc<S>) -> Self {
        Self {
            receiver,
            methods: Vec::new(),
            excluded: Vec::new(),
        }
    }

    /// Declare a method. Unexported or repeated names are skipped.
    pub fn method<A, R, E, F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Default + 'static,
        E: Display,
        F: Fn(&S, A, &mut R) -> Result<(), E> + Send + Sync + 'static,
    {
        if !is_exported(name) {
            tracing::debug!("method {name} is not exported, skipping");
            self.excluded.push(name.to_string());
            return self;
        }
        if self.methods.iter().any(|m| m.name == name) {
            tracing::debug!("method {name} declared twice, keeping the first");
            self.excluded.push(name.to_string());
            return self;
        }

        let receiver = Arc::clone(&self.receiver);
        let handler = Arc::new(handler);
        let method_name = name.to_string();
        let binder: Binder = Box::new(move |argument: Value| {
            let arg: A = serde_json::from_value(argument)?;
            let receiver = Arc::clone(&receiver);
            let handler = Arc::clone(&handler);
            let method_name = method_name.clone();
            let call: BoundCall = Box::new(move || {
                let mut reply = R::default();
                handler(&receiver, arg, &mut reply).map_err(|e| e.to_string())?;
                serde_json::to_value(&reply)
                    .map_err(|e| format!("rpc: cannot encode reply for {method_name}: {e}"))
            });
            Ok(call)
        });

        self.methods.push(MethodDescriptor {
            name: name.to_string(),
            arg_type: std::any::type_name::<A>(),
            reply_type: std::any::type_name::<R>(),
            binder,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Names that were declared but not accepted.
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    pub(crate) fn into_methods(self) -> Vec<MethodDescriptor> {
        self.methods
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Counter {
        base: i64,
    }

    fn set() -> MethodSet<Counter> {
        MethodSet::new(Arc::new(Counter { base: 10 }))
    }

    #[test]
    fn test_bind_and_invoke() {
        let mut methods = set();
        methods.method("Add", |c: &Counter, n: i64, reply: &mut i64| {
            *reply = c.base + n;
            Ok::<(), String>(())
        });
        let desc = methods.into_methods().pop().unwrap();
        assert_eq!(desc.name(), "Add");
        assert_eq!(desc.arg_type(), "i64");

        let call = desc.bind(json!(5)).unwrap();
        assert_eq!(call().unwrap(), json!(15));
    }

    #[test]
    fn test_bind_rejects_wrong_argument_type() {
        let mut methods = set();
        methods.method("Add", |c: &Counter, n: i64, reply: &mut i64| {
            *reply = c.base + n;
            Ok::<(), String>(())
        });
        let desc = methods.into_methods().pop().unwrap();
        assert!(desc.bind(json!("five")).is_err());
    }

    #[test]
    fn test_handler_error_becomes_text() {
        let mut methods = set();
        methods.method("Fail", |_: &Counter, msg: String, _: &mut ()| Err(msg));
        let desc = methods.into_methods().pop().unwrap();
        let call = desc.bind(json!("nope")).unwrap();
        assert_eq!(call().unwrap_err(), "nope");
    }

    #[test]
    fn test_unexported_and_duplicate_are_excluded() {
        let mut methods = set();
        methods
            .method("hidden", |_: &Counter, _: i64, _: &mut i64| Ok::<(), String>(()))
            .method("Twice", |_: &Counter, _: i64, r: &mut i64| {
                *r = 1;
                Ok::<(), String>(())
            })
            .method("Twice", |_: &Counter, _: i64, r: &mut i64| {
                *r = 2;
                Ok::<(), String>(())
            });
        assert_eq!(methods.len(), 1);
        assert_eq!(methods.excluded(), ["hidden".to_string(), "Twice".to_string()]);

        let desc = methods.into_methods().pop().unwrap();
        assert_eq!(desc.bind(json!(0)).unwrap()().unwrap(), json!(1));
    }
}
