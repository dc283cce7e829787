//! # Inbound Dispatch
//!
//! Turns a received call into exactly one return. Arguments are resolved on
//! the receiving thread; everything after that runs on the channel's
//! executor so the receiver is never blocked by a method body.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use isowire::RemoteCall;
use isowire::RemoteFailure;
use isowire::RemoteInstance;
use isowire::RemoteMethodSignature;
use isowire::RemoteReturn;
use isowire::Value;

use crate::channel::Channel;
use crate::executor::Task;
use crate::resolver::Args;

pub(crate) fn dispatch(channel: &Channel, call: RemoteCall) {
    let RemoteCall {
        target,
        method,
        args,
        call_id,
    } = call;
    let method = method.normalized();

    let args = match args
        .into_iter()
        .map(|arg| channel.resolve_value(arg))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(args) => args,
        Err(e) => {
            let failure = RemoteFailure::remote(format!("Cannot resolve arguments of {}: {}", method, e));
            channel.send_return(RemoteReturn::failure(call_id, failure));
            return;
        }
    };

    let worker = channel.clone();
    let task: Task = Box::new(move || {
        let span = tracing::info_span!("remote_call", channel = %worker.name(), call_id, method = %method);
        let _enter = span.enter();
        let result = invoke(&worker, &target, &method, args);
        worker.send_return(RemoteReturn { call_id, result });
    });

    if let Err(e) = channel.executor().execute(task) {
        tracing::warn!(channel = %channel.name(), call_id, error = %e, "executor rejected inbound call");
        let failure = RemoteFailure::remote(format!("Dispatch rejected: {}", e));
        channel.send_return(RemoteReturn::failure(call_id, failure));
    }
}

fn invoke(
    channel: &Channel,
    target: &RemoteInstance,
    method: &RemoteMethodSignature,
    args: Vec<Value>,
) -> Result<Value, RemoteFailure> {
    let object = channel.resolve_local(target).ok_or_else(|| {
        RemoteFailure::remote(format!("Instance {} has not been exported", target))
    })?;

    let handler = channel.resolver().resolve(method).map_err(|e| {
        RemoteFailure::remote(format!("Method {} cannot be resolved. {}", method, e))
    })?;

    if args.len() != method.arity() {
        return Err(RemoteFailure::illegal_argument(format!(
            "{} expects {} argument(s), got {}",
            method,
            method.arity(),
            args.len()
        )));
    }

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(&object, Args::new(args))));
    match outcome {
        Ok(Ok(value)) => channel.marshal_value(value).map_err(|e| {
            RemoteFailure::remote("Invocation failed")
                .with_cause(RemoteFailure::new("Marshal", e.to_string()))
        }),
        Ok(Err(failure)) => {
            tracing::warn!(failure = %failure, "remote method failed");
            Err(failure)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(panic = %message, "remote method panicked");
            Err(RemoteFailure::remote("Invocation failed").with_cause(RemoteFailure::new("Panic", message)))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
