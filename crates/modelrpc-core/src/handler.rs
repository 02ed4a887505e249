//! Handlers: one variant per call shape and execution mode.
//!
//! Every variant works on raw JSON values. The typed constructors wrap a
//! user function with decode (serde + [`Message::validate`]) on the way in
//! and encode on the way out, so the dispatcher never sees user types.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};

use crate::context::CallContext;
use crate::decl::{Describe, Message, TypeDecl};
use crate::failure::{CallFailure, HandlerError};
use crate::shape::{CallShape, Execution};
use crate::validate::ValidationFailure;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;
pub type RawResult = Result<Value, CallFailure>;
pub type RawIter = Box<dyn Iterator<Item = RawResult> + Send + 'static>;

pub type UnaryFn = Arc<dyn Fn(Value, CallContext) -> RawResult + Send + Sync>;
pub type UnaryAsyncFn = Arc<dyn Fn(Value, CallContext) -> BoxFuture<RawResult> + Send + Sync>;
pub type ServerStreamingFn =
    Arc<dyn Fn(Value, CallContext) -> Result<RawIter, CallFailure> + Send + Sync>;
pub type ServerStreamingAsyncFn =
    Arc<dyn Fn(Value, CallContext) -> Result<BoxStream<RawResult>, CallFailure> + Send + Sync>;
pub type ClientStreamingFn = Arc<dyn Fn(InboundQueue, CallContext) -> RawResult + Send + Sync>;
pub type ClientStreamingAsyncFn =
    Arc<dyn Fn(InboundQueue, CallContext) -> BoxFuture<RawResult> + Send + Sync>;
pub type BidiStreamingFn = Arc<dyn Fn(InboundQueue, CallContext) -> RawIter + Send + Sync>;
pub type BidiStreamingAsyncFn =
    Arc<dyn Fn(InboundQueue, CallContext) -> BoxStream<RawResult> + Send + Sync>;

/// The raw call behind a handler. The variant is fixed at registration and
/// picks the driver the dispatcher uses.
#[derive(Clone)]
pub enum HandlerFn {
    Unary(UnaryFn),
    UnaryAsync(UnaryAsyncFn),
    ServerStreaming(ServerStreamingFn),
    ServerStreamingAsync(ServerStreamingAsyncFn),
    ClientStreaming(ClientStreamingFn),
    ClientStreamingAsync(ClientStreamingAsyncFn),
    BidiStreaming(BidiStreamingFn),
    BidiStreamingAsync(BidiStreamingAsyncFn),
}

/// A registered handler: the raw call plus the request and response types
/// it decodes and encodes, with any stream marker stripped.
#[derive(Clone)]
pub struct Handler {
    pub(crate) call: HandlerFn,
    request: TypeDecl,
    response: TypeDecl,
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Handler({:?}, {:?}, {:?} -> {:?})",
            self.shape(),
            self.execution(),
            self.request,
            self.response
        )
    }
}

impl Handler {
    fn typed<Req: Describe, Resp: Describe>(call: HandlerFn) -> Self {
        Self {
            call,
            request: Req::describe(),
            response: Resp::describe(),
        }
    }

    pub fn request(&self) -> &TypeDecl {
        &self.request
    }

    pub fn response(&self) -> &TypeDecl {
        &self.response
    }

    pub fn shape(&self) -> CallShape {
        match self.call {
            HandlerFn::Unary(_) | HandlerFn::UnaryAsync(_) => CallShape::UnaryUnary,
            HandlerFn::ServerStreaming(_) | HandlerFn::ServerStreamingAsync(_) => {
                CallShape::UnaryStream
            }
            HandlerFn::ClientStreaming(_) | HandlerFn::ClientStreamingAsync(_) => {
                CallShape::StreamUnary
            }
            HandlerFn::BidiStreaming(_) | HandlerFn::BidiStreamingAsync(_) => {
                CallShape::StreamStream
            }
        }
    }

    pub fn execution(&self) -> Execution {
        match self.call {
            HandlerFn::Unary(_)
            | HandlerFn::ServerStreaming(_)
            | HandlerFn::ClientStreaming(_)
            | HandlerFn::BidiStreaming(_) => Execution::Sync,
            _ => Execution::Async,
        }
    }

    pub fn unary<Req, Resp, F>(f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(Req, CallContext) -> Result<Resp, HandlerError> + Send + Sync + 'static,
    {
        let call = HandlerFn::Unary(Arc::new(move |value, ctx| {
            let request = decode::<Req>(value)?;
            let response = f(request, ctx)?;
            encode(&response)
        }));
        Self::typed::<Req, Resp>(call)
    }

    pub fn unary_async<Req, Resp, F, Fut>(f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    {
        let call = HandlerFn::UnaryAsync(Arc::new(move |value, ctx| -> BoxFuture<RawResult> {
            let request = match decode::<Req>(value) {
                Ok(request) => request,
                Err(failure) => return Box::pin(async move { Err(failure) }),
            };
            let pending = f(request, ctx);
            Box::pin(async move {
                let response = pending.await?;
                encode(&response)
            })
        }));
        Self::typed::<Req, Resp>(call)
    }

    pub fn server_streaming<Req, Resp, F, I>(f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(Req, CallContext) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Result<Resp, HandlerError>>,
        I::IntoIter: Send + 'static,
    {
        let call = HandlerFn::ServerStreaming(Arc::new(move |value, ctx| -> Result<RawIter, CallFailure> {
            let request = decode::<Req>(value)?;
            let items = f(request, ctx).into_iter().map(encode_item);
            Ok(Box::new(items))
        }));
        Self::typed::<Req, Resp>(call)
    }

    pub fn server_streaming_async<Req, Resp, F, S>(f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(Req, CallContext) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Resp, HandlerError>> + Send + 'static,
    {
        let call = HandlerFn::ServerStreamingAsync(Arc::new(
            move |value, ctx| -> Result<BoxStream<RawResult>, CallFailure> {
                let request = decode::<Req>(value)?;
                let items = f(request, ctx).map(encode_item);
                Ok(Box::pin(items))
            },
        ));
        Self::typed::<Req, Resp>(call)
    }

    pub fn client_streaming<Req, Resp, F>(f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(RequestIter<Req>, CallContext) -> Result<Resp, HandlerError> + Send + Sync + 'static,
    {
        let call = HandlerFn::ClientStreaming(Arc::new(move |queue, ctx| {
            let response = f(RequestIter::new(queue), ctx)?;
            encode(&response)
        }));
        Self::typed::<Req, Resp>(call)
    }

    pub fn client_streaming_async<Req, Resp, F, Fut>(f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(Streaming<Req>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    {
        let call = HandlerFn::ClientStreamingAsync(Arc::new(move |queue, ctx| -> BoxFuture<RawResult> {
            let pending = f(Streaming::new(queue), ctx);
            Box::pin(async move {
                let response = pending.await?;
                encode(&response)
            })
        }));
        Self::typed::<Req, Resp>(call)
    }

    pub fn bidi_streaming<Req, Resp, F, I>(f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(RequestIter<Req>, CallContext) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Result<Resp, HandlerError>>,
        I::IntoIter: Send + 'static,
    {
        let call = HandlerFn::BidiStreaming(Arc::new(move |queue, ctx| -> RawIter {
            Box::new(f(RequestIter::new(queue), ctx).into_iter().map(encode_item))
        }));
        Self::typed::<Req, Resp>(call)
    }

    pub fn bidi_streaming_async<Req, Resp, F, S>(f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(Streaming<Req>, CallContext) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Resp, HandlerError>> + Send + 'static,
    {
        let call = HandlerFn::BidiStreamingAsync(Arc::new(move |queue, ctx| -> BoxStream<RawResult> {
            Box::pin(f(Streaming::new(queue), ctx).map(encode_item))
        }));
        Self::typed::<Req, Resp>(call)
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

pub(crate) fn decode<T: Message>(value: Value) -> Result<T, CallFailure> {
    let message: T = serde_path_to_error::deserialize(value)
        .map_err(|e| CallFailure::Validation(ValidationFailure::from_serde(&e)))?;
    message.validate().map_err(CallFailure::Validation)?;
    Ok(message)
}

pub(crate) fn encode<T: Serialize>(message: &T) -> RawResult {
    serde_json::to_value(message)
        .map_err(|e| CallFailure::Internal(format!("failed to encode response: {}", e)))
}

fn encode_item<T: Serialize>(item: Result<T, HandlerError>) -> RawResult {
    match item {
        Ok(message) => encode(&message),
        Err(err) => Err(CallFailure::Handler(err)),
    }
}

// ---------------------------------------------------------------------------
// Inbound streams
// ---------------------------------------------------------------------------

/// Records the first decode failure of a streaming request so the
/// dispatcher can end the call with it.
#[derive(Clone, Default)]
pub(crate) struct Tripwire(Arc<Mutex<Option<CallFailure>>>);

impl Tripwire {
    pub fn trip(&self, failure: CallFailure) {
        if let Ok(mut slot) = self.0.lock() {
            if slot.is_none() {
                *slot = Some(failure);
            }
        }
    }

    pub fn take(&self) -> Option<CallFailure> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Raw inbound messages of a client-streaming call, fed by the dispatcher.
pub struct InboundQueue {
    rx: mpsc::Receiver<Value>,
    tripwire: Tripwire,
}

impl InboundQueue {
    pub(crate) fn new(rx: mpsc::Receiver<Value>, tripwire: Tripwire) -> Self {
        Self { rx, tripwire }
    }

    fn fail(&mut self, failure: CallFailure) {
        self.tripwire.trip(failure);
        self.rx.close();
    }
}

/// Typed request stream for async handlers.
pub struct Streaming<T> {
    queue: InboundQueue,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Message> Streaming<T> {
    pub(crate) fn new(queue: InboundQueue) -> Self {
        Self {
            queue,
            done: false,
            _marker: PhantomData,
        }
    }

    /// Next request message, or `None` once the caller has finished sending.
    pub async fn message(&mut self) -> Option<T> {
        self.next().await
    }
}

impl<T: Message> Stream for Streaming<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.queue.rx.poll_recv(cx) {
            Poll::Ready(Some(value)) => match decode::<T>(value) {
                Ok(message) => Poll::Ready(Some(message)),
                Err(failure) => {
                    this.queue.fail(failure);
                    this.done = true;
                    Poll::Ready(None)
                }
            },
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Typed request stream for sync handlers. Blocks the handler's worker
/// thread until the next message arrives.
pub struct RequestIter<T> {
    queue: InboundQueue,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Message> RequestIter<T> {
    pub(crate) fn new(queue: InboundQueue) -> Self {
        Self {
            queue,
            done: false,
            _marker: PhantomData,
        }
    }
}

impl<T: Message> Iterator for RequestIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.done {
            return None;
        }
        match self.queue.rx.blocking_recv() {
            Some(value) => match decode::<T>(value) {
                Ok(message) => Some(message),
                Err(failure) => {
                    self.queue.fail(failure);
                    self.done = true;
                    None
                }
            },
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl<T: Describe> Describe for Streaming<T> {
    fn describe() -> TypeDecl {
        TypeDecl::Stream(Some(Box::new(T::describe())))
    }
}

impl<T: Describe> Describe for RequestIter<T> {
    fn describe() -> TypeDecl {
        TypeDecl::Stream(Some(Box::new(T::describe())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handler_shapes() {
        let unary = Handler::unary(|name: String, _ctx| Ok::<_, HandlerError>(name));
        assert_eq!(unary.shape(), CallShape::UnaryUnary);
        assert_eq!(unary.execution(), Execution::Sync);

        let bidi = Handler::bidi_streaming_async(|requests: Streaming<i32>, _ctx| {
            requests.map(Ok::<_, HandlerError>)
        });
        assert_eq!(bidi.shape(), CallShape::StreamStream);
        assert_eq!(bidi.execution(), Execution::Async);
    }

    #[test]
    fn test_unary_raw_round_trip() {
        let handler = Handler::unary(|n: i32, _ctx| Ok::<_, HandlerError>(n * 2));
        let HandlerFn::Unary(raw) = handler.call else {
            panic!("expected a sync unary handler");
        };
        let out = raw(json!(21), CallContext::new("Test/Double")).expect("handler should succeed");
        assert_eq!(out, json!(42));

        let err = raw(json!("nope"), CallContext::new("Test/Double")).unwrap_err();
        assert!(matches!(err, CallFailure::Validation(_)));
    }

    #[test]
    fn test_decode_failure_keeps_field_path() {
        #[derive(Debug, serde::Serialize, serde::Deserialize)]
        struct Chapter {
            pages: u16,
        }

        impl Describe for Chapter {
            fn describe() -> TypeDecl {
                TypeDecl::message::<Self>("Chapter", || {
                    crate::decl::MessageDecl::new().field::<i32>("pages")
                })
            }
        }

        impl Message for Chapter {}

        let Err(CallFailure::Validation(failure)) = decode::<Chapter>(json!({ "pages": 70000 }))
        else {
            panic!("expected a validation failure");
        };
        assert_eq!(failure.violations.len(), 1);
        assert_eq!(failure.violations[0].field, "pages");

        let Err(CallFailure::Validation(failure)) = decode::<Chapter>(json!({})) else {
            panic!("expected a validation failure");
        };
        assert_eq!(failure.violations[0].field, "pages");
        assert_eq!(failure.violations[0].reason, "field required");
    }

    #[tokio::test]
    async fn test_streaming_trips_on_bad_item() {
        let (tx, rx) = mpsc::channel(4);
        let tripwire = Tripwire::default();
        let mut requests: Streaming<i32> =
            Streaming::new(InboundQueue::new(rx, tripwire.clone()));

        tx.send(json!(1)).await.unwrap();
        tx.send(json!("two")).await.unwrap();
        assert_eq!(requests.message().await, Some(1));
        assert_eq!(requests.message().await, None);
        assert!(matches!(tripwire.take(), Some(CallFailure::Validation(_))));
        assert!(tx.send(json!(3)).await.is_err());
    }
}
