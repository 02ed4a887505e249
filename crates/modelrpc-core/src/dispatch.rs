//! Call dispatch: drives a handler over an inbound value stream.
//!
//! Every call goes through the same pipeline:
//!
//! ```text
//! inbound ─► structural check ─► decode + validate ─► handler ─► encode ─► outbound
//! ```
//!
//! Sync handlers run on the blocking pool; async handlers run as tasks and
//! are aborted when the call ends early. Handler output travels through a
//! channel of capacity one, so streaming responses reach the caller as they
//! are produced. Any failure ends the outbound stream with a single mapped
//! `Err` item.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_stream::StreamExt;

use crate::compiler::SchemaDocument;
use crate::context::CallContext;
use crate::failure::{CallFailure, CardinalityViolation};
use crate::handler::{BoxStream, Handler, HandlerFn, InboundQueue, RawIter, RawResult, Tripwire};
use crate::mapper::ErrorMapper;
use crate::shape::CallShape;
use crate::state::MethodEntry;
use crate::status::Status;
use crate::types::TypeDescriptor;
use crate::validate::Validator;

pub type InboundStream = BoxStream<Value>;
pub type ResponseStream = BoxStream<Result<Value, Status>>;

type PumpFuture<'a> = Pin<Box<dyn Future<Output = Result<usize, CallFailure>> + Send + 'a>>;

#[derive(Clone)]
pub struct Dispatcher {
    schema: Arc<SchemaDocument>,
    errors: Arc<ErrorMapper>,
}

impl Dispatcher {
    pub fn new(schema: Arc<SchemaDocument>, errors: Arc<ErrorMapper>) -> Self {
        Self { schema, errors }
    }

    /// Run one call. The returned stream yields each response as the
    /// handler produces it and ends after a single `Err` on failure.
    pub fn invoke(
        &self,
        method: &MethodEntry,
        inbound: InboundStream,
        ctx: CallContext,
    ) -> ResponseStream {
        let errors = self.errors.clone();
        let path = method.path.clone();
        let call_id = ctx.call_id();
        let mut outcomes = drive(
            self.schema.clone(),
            method.descriptor.input.clone(),
            method.descriptor.cardinality,
            method.handler.clone(),
            inbound,
            ctx,
        );

        tracing::debug!(method = %path, call_id = %call_id, "call started");
        Box::pin(stream! {
            let mut sent = 0usize;
            while let Some(outcome) = outcomes.next().await {
                match outcome {
                    Ok(value) => {
                        sent += 1;
                        yield Ok(value);
                    }
                    Err(failure) => {
                        let status = errors.map(&failure);
                        tracing::debug!(
                            method = %path,
                            call_id = %call_id,
                            code = %status.code,
                            error = %failure,
                            "call failed"
                        );
                        yield Err(status);
                        return;
                    }
                }
            }
            tracing::debug!(method = %path, call_id = %call_id, sent, "call finished");
        })
    }
}

enum Event {
    Cancelled,
    Pumped(Result<usize, CallFailure>),
    Output(Option<RawResult>),
}

enum HandlerInput {
    Single(Value),
    Queue(InboundQueue),
}

struct AbortOnDrop(Option<JoinHandle<()>>);

impl AbortOnDrop {
    async fn join(&mut self) -> Result<(), JoinError> {
        match self.0.take() {
            Some(handle) => handle.await,
            None => Ok(()),
        }
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

fn drive(
    schema: Arc<SchemaDocument>,
    input: TypeDescriptor,
    shape: CallShape,
    handler: Handler,
    inbound: InboundStream,
    ctx: CallContext,
) -> BoxStream<RawResult> {
    Box::pin(stream! {
        let validator = Validator::new(&schema);
        let tripwire = Tripwire::default();
        let (out_tx, mut out_rx) = mpsc::channel::<RawResult>(1);
        let mut pump: Option<PumpFuture<'_>> = None;

        let handler_input = if shape.client_streaming() {
            let (in_tx, in_rx) = mpsc::channel::<Value>(1);
            pump = Some(Box::pin(pump_inbound(
                &validator,
                &input,
                inbound,
                in_tx,
                ctx.method().to_string(),
            )));
            HandlerInput::Queue(InboundQueue::new(in_rx, tripwire.clone()))
        } else {
            let request = match take_single(inbound, &ctx).await {
                Ok(request) => request,
                Err(failure) => {
                    yield Err(failure);
                    return;
                }
            };
            if let Err(violations) = validator.check(&input, &request) {
                yield Err(CallFailure::Validation(violations));
                return;
            }
            HandlerInput::Single(request)
        };

        let mut task = match spawn_handler(handler, handler_input, ctx.clone(), out_tx) {
            Ok(handle) => AbortOnDrop(Some(handle)),
            Err(failure) => {
                yield Err(failure);
                return;
            }
        };

        // A single response is held back until the inbound side is drained.
        let hold_result = shape == CallShape::StreamUnary;
        let mut held: Option<Value> = None;
        let mut outputs_done = false;

        loop {
            if outputs_done && pump.is_none() {
                break;
            }

            let event = tokio::select! {
                biased;
                _ = ctx.cancelled() => Event::Cancelled,
                outcome = run_pump(&mut pump) => Event::Pumped(outcome),
                item = out_rx.recv(), if !outputs_done => Event::Output(item),
            };

            match event {
                Event::Cancelled => {
                    yield Err(CallFailure::Cancelled);
                    return;
                }
                Event::Pumped(Ok(_)) => {
                    pump = None;
                }
                Event::Pumped(Err(failure)) => {
                    yield Err(failure);
                    return;
                }
                Event::Output(Some(Ok(value))) => {
                    if let Some(failure) = tripwire.take() {
                        yield Err(failure);
                        return;
                    }
                    if hold_result {
                        held = Some(value);
                    } else {
                        yield Ok(value);
                    }
                }
                Event::Output(Some(Err(failure))) => {
                    yield Err(tripwire.take().unwrap_or(failure));
                    return;
                }
                Event::Output(None) => {
                    outputs_done = true;
                }
            }
        }

        if let Some(failure) = tripwire.take() {
            yield Err(failure);
            return;
        }
        if let Err(err) = task.join().await {
            if err.is_panic() {
                yield Err(CallFailure::Internal(format!("handler panicked: {}", err)));
                return;
            }
        }
        if let Some(value) = held.take() {
            yield Ok(value);
        }
    })
}

async fn run_pump(pump: &mut Option<PumpFuture<'_>>) -> Result<usize, CallFailure> {
    match pump {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

/// Pull exactly one inbound item.
async fn take_single(mut inbound: InboundStream, ctx: &CallContext) -> Result<Value, CallFailure> {
    let first = tokio::select! {
        _ = ctx.cancelled() => return Err(CallFailure::Cancelled),
        item = inbound.next() => item,
    };
    let Some(first) = first else {
        return Err(CardinalityViolation::Missing.into());
    };
    let extra = tokio::select! {
        _ = ctx.cancelled() => return Err(CallFailure::Cancelled),
        item = inbound.next() => item,
    };
    if extra.is_some() {
        return Err(CardinalityViolation::Excess.into());
    }
    Ok(first)
}

/// Feed a client stream to the handler, checking each item. Once the
/// handler stops reading, the rest is drained and counted.
async fn pump_inbound(
    validator: &Validator<'_>,
    input: &TypeDescriptor,
    mut inbound: InboundStream,
    tx: mpsc::Sender<Value>,
    method: String,
) -> Result<usize, CallFailure> {
    let mut tx = Some(tx);
    let mut drained = 0usize;
    while let Some(item) = inbound.next().await {
        let Some(sender) = &tx else {
            drained += 1;
            continue;
        };
        if let Err(violations) = validator.check(input, &item) {
            return Err(CallFailure::Validation(violations));
        }
        if sender.send(item).await.is_err() {
            tx = None;
            drained += 1;
        }
    }
    if drained > 0 {
        tracing::debug!(method = %method, drained, "discarded inbound messages after handler finished");
    }
    Ok(drained)
}

fn spawn_handler(
    handler: Handler,
    input: HandlerInput,
    ctx: CallContext,
    out: mpsc::Sender<RawResult>,
) -> Result<JoinHandle<()>, CallFailure> {
    let (shape, execution) = (handler.shape(), handler.execution());
    let handle = match (handler.call, input) {
        (HandlerFn::Unary(f), HandlerInput::Single(request)) => {
            tokio::task::spawn_blocking(move || {
                let _ = out.blocking_send(f(request, ctx));
            })
        }
        (HandlerFn::UnaryAsync(f), HandlerInput::Single(request)) => tokio::spawn(async move {
            let _ = out.send(f(request, ctx).await).await;
        }),
        (HandlerFn::ServerStreaming(f), HandlerInput::Single(request)) => {
            tokio::task::spawn_blocking(move || match f(request, ctx.clone()) {
                Ok(items) => forward_blocking(items, &out, &ctx),
                Err(failure) => {
                    let _ = out.blocking_send(Err(failure));
                }
            })
        }
        (HandlerFn::ServerStreamingAsync(f), HandlerInput::Single(request)) => {
            tokio::spawn(async move {
                match f(request, ctx) {
                    Ok(items) => forward(items, &out).await,
                    Err(failure) => {
                        let _ = out.send(Err(failure)).await;
                    }
                }
            })
        }
        (HandlerFn::ClientStreaming(f), HandlerInput::Queue(queue)) => {
            tokio::task::spawn_blocking(move || {
                let _ = out.blocking_send(f(queue, ctx));
            })
        }
        (HandlerFn::ClientStreamingAsync(f), HandlerInput::Queue(queue)) => {
            tokio::spawn(async move {
                let _ = out.send(f(queue, ctx).await).await;
            })
        }
        (HandlerFn::BidiStreaming(f), HandlerInput::Queue(queue)) => {
            tokio::task::spawn_blocking(move || {
                let items = f(queue, ctx.clone());
                forward_blocking(items, &out, &ctx);
            })
        }
        (HandlerFn::BidiStreamingAsync(f), HandlerInput::Queue(queue)) => {
            tokio::spawn(async move { forward(f(queue, ctx), &out).await })
        }
        _ => {
            return Err(CallFailure::Internal(format!(
                "{:?}/{:?} handler does not match the method's call shape",
                shape, execution
            )))
        }
    };
    Ok(handle)
}

/// Forward handler output until it ends, fails, or nobody is listening.
async fn forward(mut items: BoxStream<RawResult>, out: &mpsc::Sender<RawResult>) {
    while let Some(item) = items.next().await {
        let failed = item.is_err();
        if out.send(item).await.is_err() || failed {
            break;
        }
    }
}

fn forward_blocking(items: RawIter, out: &mpsc::Sender<RawResult>, ctx: &CallContext) {
    for item in items {
        let failed = item.is_err();
        if out.blocking_send(item).is_err() || failed || ctx.is_cancelled() {
            break;
        }
    }
}
