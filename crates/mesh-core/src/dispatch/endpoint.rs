//! Endpoint declaration.
//!
//! A plugin type lists the calls it answers with an [`EndpointsBuilder`].
//! Typed endpoints get their request rebuilt from `args` and their return
//! value serialized into `resp`; raw endpoints see the whole message.

use crate::error::{DeclarationError, MeshError, Result};
use crate::ipc::comm::CommChannel;
use crate::ipc::protocol::{from_payload, to_payload};
use crate::message::{calls, Message, Payload, Route};
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Future returned by every bound handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Payload>>;

pub(crate) type Invoke<P> =
    Arc<dyn Fn(Arc<P>, Message, Context) -> HandlerFuture + Send + Sync>;

/// What a handler knows about the request it is serving.
#[derive(Debug, Clone)]
pub struct Context {
    comm: CommChannel,
    id: String,
    sender: Option<Route>,
}

impl Context {
    pub(crate) fn for_request(msg: &Message, comm: CommChannel) -> Self {
        Self {
            comm,
            id: msg.id().to_string(),
            sender: msg.sender.clone(),
        }
    }

    pub fn comm(&self) -> &CommChannel {
        &self.comm
    }

    /// Id of the request being handled.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender(&self) -> Option<&Route> {
        self.sender.as_ref()
    }

    /// Make a nested typed request on behalf of the current one.
    ///
    /// The outgoing message carries this request's id as `parent_id`.
    pub async fn call<Req, Resp>(&self, call: &str, args: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let msg = Message::with_args(call, to_payload(args)?).with_parent(self.id.clone());
        self.comm.call_with(msg).await
    }
}

/// Metadata for one declared endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub name: String,
    pub request_type: &'static str,
    pub response_type: &'static str,
    pub required: bool,
}

pub(crate) struct Declared<P> {
    pub(crate) spec: EndpointSpec,
    pub(crate) invoke: Invoke<P>,
}

/// Collects the endpoints of plugin type `P`.
pub struct EndpointsBuilder<P> {
    plugin: &'static str,
    declared: Vec<Declared<P>>,
    errors: Vec<DeclarationError>,
}

impl<P> Default for EndpointsBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> EndpointsBuilder<P> {
    pub fn new() -> Self {
        Self {
            plugin: short_type_name::<P>(),
            declared: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Mark the last declared endpoint as required.
    ///
    /// The handshake fails if the coordinator does not confirm it.
    pub fn required(mut self) -> Self {
        match self.declared.last_mut() {
            Some(last) => last.spec.required = true,
            None => self.errors.push(DeclarationError::NothingToRequire {
                plugin: self.plugin.to_string(),
            }),
        }
        self
    }

    /// Validate the declarations and freeze them.
    pub fn build(self) -> std::result::Result<Endpoints<P>, DeclarationError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let mut seen = HashSet::new();
        for declared in &self.declared {
            let name = declared.spec.name.as_str();
            if calls::RESERVED.contains(&name) {
                return Err(DeclarationError::Reserved {
                    plugin: self.plugin.to_string(),
                    name: name.to_string(),
                });
            }
            if !seen.insert(name) {
                return Err(DeclarationError::NameClash {
                    plugin: self.plugin.to_string(),
                    name: name.to_string(),
                });
            }
        }

        Ok(Endpoints {
            plugin: self.plugin,
            declared: self.declared,
        })
    }
}

impl<P: Send + Sync + 'static> EndpointsBuilder<P> {
    /// Declare a typed endpoint.
    pub fn endpoint<Req, Resp, F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Arc<P>, Req, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Resp>> + Send + 'static,
    {
        let name = name.into();
        let call = name.clone();

        let invoke: Invoke<P> = Arc::new(
            move |plugin: Arc<P>, msg: Message, ctx: Context| -> HandlerFuture {
                match from_payload::<Req>(msg.args) {
                    Ok(req) => {
                        let pending = handler(plugin, req, ctx);
                        async move {
                            let resp = pending.await?;
                            Ok::<_, anyhow::Error>(to_payload(&resp)?)
                        }
                        .boxed()
                    }
                    Err(e) => {
                        let err = MeshError::InvalidArgs {
                            call: call.clone(),
                            message: e.to_string(),
                        };
                        futures::future::ready(Err(err.into())).boxed()
                    }
                }
            },
        );

        self.declared.push(Declared {
            spec: EndpointSpec {
                name,
                request_type: short_type_name::<Req>(),
                response_type: short_type_name::<Resp>(),
                required: false,
            },
            invoke,
        });
        self
    }

    /// Declare an untyped endpoint that receives the whole message.
    ///
    /// `None` is sent back as an empty response.
    pub fn raw<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<P>, Message, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Payload>>> + Send + 'static,
    {
        let invoke: Invoke<P> = Arc::new(
            move |plugin: Arc<P>, msg: Message, ctx: Context| -> HandlerFuture {
                let pending = handler(plugin, msg, ctx);
                async move { Ok::<_, anyhow::Error>(pending.await?.unwrap_or_default()) }.boxed()
            },
        );

        self.declared.push(Declared {
            spec: EndpointSpec {
                name: name.into(),
                request_type: "Message",
                response_type: "Payload",
                required: false,
            },
            invoke,
        });
        self
    }
}

/// Read-only endpoint declarations of one plugin type.
pub struct Endpoints<P> {
    plugin: &'static str,
    pub(crate) declared: Vec<Declared<P>>,
}

impl<P> Endpoints<P> {
    /// Short type name of the declaring plugin.
    pub fn plugin(&self) -> &'static str {
        self.plugin
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().map(|d| d.spec.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&EndpointSpec> {
        self.declared
            .iter()
            .map(|d| &d.spec)
            .find(|spec| spec.name == name)
    }

    pub fn specs(&self) -> impl Iterator<Item = &EndpointSpec> {
        self.declared.iter().map(|d| &d.spec)
    }

    /// Names the coordinator must confirm during the handshake.
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.specs()
            .filter(|spec| spec.required)
            .map(|spec| spec.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }
}

impl<P> std::fmt::Debug for Endpoints<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoints")
            .field("plugin", &self.plugin)
            .field("endpoints", &self.specs().collect::<Vec<_>>())
            .finish()
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    // Keep generic arguments intact: only strip the path before the first `<`.
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

/// Declare a typed endpoint backed by an async method.
///
/// The method must have the signature
/// `async fn(&self, Req, &Context) -> anyhow::Result<Resp>`. The exported name
/// is the method name unless renamed with `as "name"`.
///
/// ```ignore
/// fn endpoints(b: EndpointsBuilder<Self>) -> EndpointsBuilder<Self> {
///     let b = endpoint!(b, FrenchFortune::parlez as "parley");
///     endpoint!(b, FrenchFortune::bonjour)
/// }
/// ```
#[macro_export]
macro_rules! endpoint {
    ($builder:expr, $ty:ident :: $method:ident as $name:expr) => {
        $builder.endpoint(
            $name,
            |plugin: ::std::sync::Arc<$ty>, req, ctx: $crate::dispatch::Context| async move {
                <$ty>::$method(&plugin, req, &ctx).await
            },
        )
    };
    ($builder:expr, $ty:ident :: $method:ident) => {
        $crate::endpoint!($builder, $ty::$method as stringify!($method))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    struct Fortune;

    #[derive(Deserialize)]
    struct Empty {}

    #[derive(Serialize)]
    struct FortuneMessage {
        message: String,
    }

    impl Fortune {
        async fn grab_a_message(
            &self,
            _req: Empty,
            _ctx: &Context,
        ) -> anyhow::Result<FortuneMessage> {
            Ok(FortuneMessage {
                message: "A journey of a thousand miles".into(),
            })
        }
    }

    #[test]
    fn test_macro_uses_method_name() {
        let endpoints = endpoint!(EndpointsBuilder::<Fortune>::new(), Fortune::grab_a_message)
            .build()
            .unwrap();

        let names: Vec<_> = endpoints.names().collect();
        assert_eq!(names, vec!["grab_a_message"]);
        let spec = endpoints.get("grab_a_message").unwrap();
        assert_eq!(spec.request_type, "Empty");
        assert_eq!(spec.response_type, "FortuneMessage");
        assert!(!spec.required);
    }

    #[test]
    fn test_macro_rename() {
        let endpoints = endpoint!(
            EndpointsBuilder::<Fortune>::new(),
            Fortune::grab_a_message as "fortune"
        )
        .build()
        .unwrap();
        assert!(endpoints.get("fortune").is_some());
        assert!(endpoints.get("grab_a_message").is_none());
    }

    #[test]
    fn test_name_clash_in_one_builder() {
        let builder = EndpointsBuilder::<Fortune>::new();
        let builder = endpoint!(builder, Fortune::grab_a_message);
        let builder = endpoint!(builder, Fortune::grab_a_message);

        let err = builder.build().unwrap_err();

        assert_eq!(
            err,
            DeclarationError::NameClash {
                plugin: "Fortune".into(),
                name: "grab_a_message".into(),
            }
        );
    }

    #[test]
    fn test_reserved_names_rejected() {
        for reserved in calls::RESERVED {
            let err = EndpointsBuilder::<Fortune>::new()
                .raw(reserved, |_, _, _| async { Ok(None) })
                .build()
                .unwrap_err();
            assert!(matches!(err, DeclarationError::Reserved { name, .. } if name == reserved));
        }
    }

    #[test]
    fn test_required_marks_last_endpoint() {
        let endpoints = EndpointsBuilder::<Fortune>::new()
            .raw("first", |_, _, _| async { Ok(None) })
            .raw("second", |_, _, _| async { Ok(None) })
            .required()
            .build()
            .unwrap();

        assert_eq!(endpoints.required().collect::<Vec<_>>(), vec!["second"]);
    }

    #[test]
    fn test_required_without_endpoint_is_an_error() {
        let err = EndpointsBuilder::<Fortune>::new().required().build().unwrap_err();
        assert!(matches!(err, DeclarationError::NothingToRequire { .. }));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Fortune>(), "Fortune");
        assert_eq!(short_type_name::<String>(), "String");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec<alloc::string::String>");
    }
}
