//! Service registration table.
//!
//! A [`Service`] exposes a receiver object's methods under
//! `"ServiceName.MethodName"` addresses. The table is built once at startup
//! via [`ServiceBuilder`]: each registered method is wrapped in a typed
//! invocation closure that decodes a fresh argument value, allocates a
//! fresh reply value, runs the handler, and encodes the reply, so
//! concurrent requests for the same method never share argument or reply
//! storage.
//!
//! Method shape is `Fn(&S, Arg, &mut Reply) -> Result<(), String>`: the
//! argument arrives by value, the handler writes into the pre-allocated
//! reply, and an `Err` becomes the error text the caller sees verbatim.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use muxrpc_common::{CodecKind, MuxrpcError, Result};

type Handler = Box<dyn Fn(CodecKind, &[u8]) -> Result<Vec<u8>> + Send + Sync>;

/// Metadata and invocation handle for one exposed method.
pub struct MethodDescriptor {
    name: String,
    arg_type: &'static str,
    reply_type: &'static str,
    num_calls: AtomicU64,
    handler: Handler,
}

impl MethodDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type name of the argument, for logs and diagnostics.
    pub fn arg_type(&self) -> &'static str {
        self.arg_type
    }

    /// Type name of the reply, for logs and diagnostics.
    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }

    /// Times this method has been dispatched. Incremented atomically on
    /// every dispatch, readable concurrently without synchronization.
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }
}

/// A named service: an immutable method table over a receiver object.
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<MethodDescriptor>>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Service {
    /// Starts building a service around a receiver.
    pub fn builder<S>(name: impl Into<String>, receiver: S) -> ServiceBuilder<S>
    where
        S: Send + Sync + 'static,
    {
        ServiceBuilder {
            name: name.into(),
            receiver: Arc::new(receiver),
            methods: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up one method's descriptor.
    pub fn method(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.get(name)
    }

    /// Names of every registered method, in no particular order.
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }

    /// Invokes a method with codec-encoded argument bytes, returning the
    /// codec-encoded reply.
    ///
    /// Argument decode failures, handler errors and unknown methods all
    /// surface as errors; none of them is fatal to anything beyond this
    /// one call.
    pub fn call(&self, method: &str, codec: CodecKind, arg: &[u8]) -> Result<Vec<u8>> {
        let descriptor = self
            .methods
            .get(method)
            .ok_or_else(|| MuxrpcError::UnknownMethod(format!("{}.{}", self.name, method)))?;
        descriptor.num_calls.fetch_add(1, Ordering::Relaxed);
        (descriptor.handler)(codec, arg)
    }
}

/// Builder collecting typed method registrations for a [`Service`].
pub struct ServiceBuilder<S> {
    name: String,
    receiver: Arc<S>,
    methods: HashMap<String, Arc<MethodDescriptor>>,
}

impl<S> ServiceBuilder<S>
where
    S: Send + Sync + 'static,
{
    /// Registers one method under `name`.
    ///
    /// The argument type must be deserializable, the reply type must be
    /// serializable with a `Default` starting value; the handler writes
    /// the reply in place and reports failure as an error string, which
    /// reaches the remote caller verbatim. These bounds are the method
    /// shape check: a function that cannot satisfy them cannot be
    /// registered in the first place.
    pub fn method<A, R, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned + 'static,
        R: Serialize + Default + 'static,
        F: Fn(&S, A, &mut R) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        let name = name.into();
        let receiver = Arc::clone(&self.receiver);
        let handler: Handler = Box::new(move |codec, arg| {
            // fresh argument and reply storage on every call
            let argv: A = codec.decode(arg)?;
            let mut replyv = R::default();
            f(&receiver, argv, &mut replyv).map_err(MuxrpcError::Handler)?;
            codec.encode(&replyv)
        });
        let descriptor = MethodDescriptor {
            name: name.clone(),
            arg_type: std::any::type_name::<A>(),
            reply_type: std::any::type_name::<R>(),
            num_calls: AtomicU64::new(0),
            handler,
        };
        debug!(method = %name, arg = descriptor.arg_type, reply = descriptor.reply_type, "method registered");
        self.methods.insert(name, Arc::new(descriptor));
        self
    }

    /// Finalizes the service.
    ///
    /// # Errors
    ///
    /// A service must be addressable as the left half of
    /// `"ServiceName.MethodName"`: an empty name or one containing `.`
    /// is rejected.
    pub fn build(self) -> Result<Service> {
        if self.name.is_empty() || self.name.contains('.') {
            return Err(MuxrpcError::InvalidRequest(format!(
                "{:?} is not a valid service name",
                self.name
            )));
        }
        Ok(Service {
            name: self.name,
            methods: self.methods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, Default)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    struct Arith;

    fn arith_service() -> Service {
        Service::builder("Arith", Arith)
            .method("Sum", |_: &Arith, args: AddArgs, reply: &mut i64| {
                *reply = args.a + args.b;
                Ok(())
            })
            .method("Div", |_: &Arith, args: AddArgs, reply: &mut i64| {
                if args.b == 0 {
                    return Err("divide by zero".to_string());
                }
                *reply = args.a / args.b;
                Ok(())
            })
            .build()
            .unwrap()
    }

    fn encode_args(a: i64, b: i64) -> Vec<u8> {
        CodecKind::Json.encode(&AddArgs { a, b }).unwrap()
    }

    #[test]
    fn exposes_exactly_the_registered_methods() {
        let service = arith_service();
        let mut names = service.method_names();
        names.sort();
        assert_eq!(names, vec!["Div", "Sum"]);
        assert!(service.method("Sum").is_some());
        assert!(service.method("Mul").is_none());
    }

    #[test]
    fn call_invokes_and_encodes_reply() {
        let service = arith_service();
        let reply = service
            .call("Sum", CodecKind::Json, &encode_args(3, 4))
            .unwrap();
        let sum: i64 = CodecKind::Json.decode(&reply).unwrap();
        assert_eq!(sum, 7);
    }

    #[test]
    fn unknown_method_is_an_error_not_a_crash() {
        let service = arith_service();
        let err = service
            .call("Mul", CodecKind::Json, &encode_args(3, 4))
            .unwrap_err();
        assert!(err.to_string().contains("unknown method"));
        assert!(err.to_string().contains("Arith.Mul"));
    }

    #[test]
    fn handler_error_text_passes_through_verbatim() {
        let service = arith_service();
        let err = service
            .call("Div", CodecKind::Json, &encode_args(1, 0))
            .unwrap_err();
        assert_eq!(err.to_string(), "divide by zero");
    }

    #[test]
    fn argument_decode_failure_is_per_call() {
        let service = arith_service();
        assert!(service.call("Sum", CodecKind::Json, b"garbage").is_err());
        // the service keeps working afterwards
        assert!(service
            .call("Sum", CodecKind::Json, &encode_args(1, 1))
            .is_ok());
    }

    #[test]
    fn num_calls_counts_dispatches() {
        let service = arith_service();
        let descriptor = Arc::clone(service.method("Sum").unwrap());
        assert_eq!(descriptor.num_calls(), 0);

        service
            .call("Sum", CodecKind::Json, &encode_args(1, 2))
            .unwrap();
        let _ = service.call("Sum", CodecKind::Json, b"garbage");
        // decode failures still count as dispatches
        assert_eq!(descriptor.num_calls(), 2);
    }

    #[test]
    fn invalid_service_names_are_rejected() {
        assert!(Service::builder("", Arith).build().is_err());
        assert!(Service::builder("Bad.Name", Arith).build().is_err());
    }

    #[test]
    fn binary_codec_dispatch() {
        let service = arith_service();
        let arg = CodecKind::Binary.encode(&AddArgs { a: 20, b: 22 }).unwrap();
        let reply = service.call("Sum", CodecKind::Binary, &arg).unwrap();
        let sum: i64 = CodecKind::Binary.decode(&reply).unwrap();
        assert_eq!(sum, 42);
    }
}
