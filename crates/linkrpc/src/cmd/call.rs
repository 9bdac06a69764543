use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use linkrpc_dispatch::{CallOptions, DispatchEvent, Dispatcher, DispatcherConfig, RpcError};
use linkrpc_frame::FrameConfig;
use serde_json::Value;

use crate::cmd::{parse_duration, CallArgs};
use crate::exit::{dispatch_error, io_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_reply, OutputFormat};

const MAX_WAIT_SLICE: Duration = Duration::from_millis(100);

type Reply = Rc<RefCell<Option<Result<Value, RpcError>>>>;

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = resolve_params(&args)?;
    let dst = socket_uri(&args.path)?;

    let mut dispatcher = Dispatcher::new(DispatcherConfig::default().with_id(&args.id));
    dispatcher.add_unix_channel_factory(FrameConfig {
        write_timeout: Some(timeout),
        ..FrameConfig::default()
    });

    let closed = Rc::new(Cell::new(false));
    let flag = Rc::clone(&closed);
    dispatcher.add_observer(move |event| {
        if matches!(event, DispatchEvent::ChannelClosed { .. }) {
            flag.set(true);
        }
    });

    let mut opts = CallOptions::to(&dst);
    if let Some(tag) = &args.tag {
        opts = opts.with_tag(tag);
    }
    let deadline = Instant::now() + timeout;

    if args.notify {
        dispatcher
            .notify(&args.method, params, &opts)
            .map_err(|err| dispatch_error("notify failed", err))?;
        pump(&mut dispatcher, deadline, |d| d.queued_frames() == 0 || closed.get());
        return flush_result(&dispatcher, &closed, &args.path);
    }

    let reply: Reply = Rc::default();
    let sink = Rc::clone(&reply);
    let id = dispatcher
        .call_with(&args.method, params, &opts, move |_, _, outcome| {
            *sink.borrow_mut() = Some(outcome);
        })
        .map_err(|err| dispatch_error("call failed", err))?;
    tracing::debug!(%id, method = %args.method, "call sent");

    pump(&mut dispatcher, deadline, |_| reply.borrow().is_some() || closed.get());

    let outcome = reply.borrow_mut().take();
    match outcome {
        Some(outcome) => {
            print_reply(&args.method, &outcome, format);
            Ok(if outcome.is_ok() { SUCCESS } else { FAILURE })
        }
        None if closed.get() => Err(CliError::new(
            FAILURE,
            format!("connection to {} closed before a reply", args.path.display()),
        )),
        None => {
            dispatcher.cancel_call(&id);
            Err(CliError::new(
                TIMEOUT,
                format!("no reply to {} within {:?}", args.method, timeout),
            ))
        }
    }
}

/// Apply channel events until `done` or the deadline.
fn pump(dispatcher: &mut Dispatcher, deadline: Instant, mut done: impl FnMut(&Dispatcher) -> bool) {
    dispatcher.process_events();
    while !done(dispatcher) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        dispatcher.wait_for_events((deadline - now).min(MAX_WAIT_SLICE));
    }
}

fn flush_result(dispatcher: &Dispatcher, closed: &Rc<Cell<bool>>, path: &Path) -> CliResult<i32> {
    // A closed link drops its queued frames, so check closure first.
    if closed.get() {
        return Err(CliError::new(
            FAILURE,
            format!("connection to {} closed before sending", path.display()),
        ));
    }
    if dispatcher.queued_frames() == 0 {
        return Ok(SUCCESS);
    }
    Err(CliError::new(TIMEOUT, "notification not sent before timeout"))
}

fn resolve_params(args: &CallArgs) -> CliResult<Option<Value>> {
    let text = if let Some(json) = &args.params {
        json.clone()
    } else if let Some(path) = &args.params_file {
        fs::read_to_string(path).map_err(|err| {
            io_error(&format!("failed reading {}", path.display()), err)
        })?
    } else {
        return Ok(None);
    };

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|err| CliError::new(USAGE, format!("params are not valid JSON: {err}")))
}

/// `unix://` destination for a socket path.
fn socket_uri(path: &Path) -> CliResult<String> {
    let absolute = std::path::absolute(path)
        .map_err(|err| io_error(&format!("bad socket path {}", path.display()), err))?;
    let text = absolute.to_string_lossy();
    if text.contains(['#', '?']) {
        return Err(CliError::new(
            USAGE,
            format!("socket path may not contain '#' or '?': {text}"),
        ));
    }
    Ok(format!("unix://{text}"))
}
