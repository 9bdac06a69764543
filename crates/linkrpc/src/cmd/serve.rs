use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use linkrpc_dispatch::{ChannelListener, Dispatcher, DispatcherConfig, FrameInfo, RequestInfo};
use serde_json::Value;

use crate::cmd::ServeArgs;
use crate::exit::{dispatch_error, CliError, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub const ECHO_METHOD: &str = "Sys.Echo";

/// How long one loop iteration waits for channel events before polling
/// for new connections and the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let mut dispatcher = build_dispatcher(&args)?;
    let listener =
        ChannelListener::bind(&args.path).map_err(|err| dispatch_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    tracing::info!(path = %args.path.display(), id = %args.id, "serving");

    while running.load(Ordering::SeqCst) {
        let accepted = listener
            .accept_pending(&mut dispatcher)
            .map_err(|err| dispatch_error("accept failed", err))?;
        for id in accepted {
            tracing::debug!(channel = %id, "client connected");
        }
        dispatcher.wait_for_events(POLL_INTERVAL);
    }

    tracing::info!("shutting down");
    dispatcher.disconnect_all();
    dispatcher.process_events();
    Ok(SUCCESS)
}

fn build_dispatcher(args: &ServeArgs) -> CliResult<Dispatcher> {
    let mut dispatcher = Dispatcher::new(DispatcherConfig::default().with_id(&args.id));
    dispatcher
        .add_builtin_handlers()
        .map_err(|err| dispatch_error("handler setup failed", err))?;
    dispatcher
        .add_handler(ECHO_METHOD, None, echo)
        .map_err(|err| dispatch_error("handler setup failed", err))?;

    #[cfg(feature = "schema")]
    if let Some(dir) = &args.validate {
        dispatcher.load_schemas(dir).map_err(|err| {
            CliError::new(
                crate::exit::DATA_INVALID,
                format!("schema load failed: {err}"),
            )
        })?;
    }

    Ok(dispatcher)
}

fn echo(d: &mut Dispatcher, ri: RequestInfo, _fi: &FrameInfo, args: &Value) {
    if let Err(err) = d.respond(ri, args.clone()) {
        tracing::warn!(error = %err, "failed sending echo response");
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
