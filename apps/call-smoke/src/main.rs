mod config;
mod logging;

use std::{process, sync::Arc};

use call_core::{CallCommand, CallConfiguration, CallEvent, CallLifecyclePhase, EventStream};
use call_platform::{
    PictureInPictureHandler, RecordingCallService, RecordingScriptEvaluator,
    StaticPictureInPicture,
};
use call_runtime::{CallSessionHandle, CallSessionHost, spawn_call_session};
use config::SmokeConfig;
use tokio::{sync::broadcast::error::RecvError, time::timeout};
use tracing::{debug, error, info};
use url::Url;

#[tokio::main]
async fn main() {
    logging::init();

    let config = match SmokeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid call-smoke configuration: {err}");
            process::exit(2);
        }
    };

    if let Err(message) = run(config).await {
        error!(%message, "call smoke failed");
        eprintln!("Call smoke failed: {message}");
        process::exit(1);
    }
}

async fn run(config: SmokeConfig) -> Result<(), String> {
    let evaluator = RecordingScriptEvaluator::default();
    let picture_in_picture = config
        .allow_picture_in_picture
        .then(|| Arc::new(StaticPictureInPicture::succeeding()) as Arc<dyn PictureInPictureHandler>);
    let host = CallSessionHost {
        call_service: Arc::new(RecordingCallService::default()),
        script_evaluator: Arc::new(evaluator.clone()),
        picture_in_picture,
    };

    let handle = spawn_call_session(
        CallConfiguration::generic_call_link(config.call_link.clone()),
        None,
        host,
        config.session_options(),
    )
    .map_err(|err| err.to_string())?;
    let mut events = handle.subscribe();

    handle
        .send(CallCommand::Activate)
        .await
        .map_err(|err| err.to_string())?;
    let url = timeout(config.start_timeout, wait_for_url(&mut events))
        .await
        .map_err(|_| format!("no call url within {:?}", config.start_timeout))??;

    println!("Call page: {url}");
    println!(
        "Listener script for handler '{}':",
        handle.message_handler_name()
    );
    println!("{}", handle.listener_script());

    stop(&handle, &mut events, &config).await?;
    info!(
        scripts = evaluator.scripts().len(),
        "call smoke finished"
    );
    Ok(())
}

async fn wait_for_url(events: &mut EventStream) -> Result<Url, String> {
    loop {
        match events.recv().await {
            Ok(CallEvent::UrlResolved { url }) => return Ok(url),
            Ok(CallEvent::Alert(alert)) => {
                return Err(format!("widget failed to start ({})", alert.title));
            }
            Ok(event) => debug!(?event, "call event"),
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "call events lagged"),
            Err(RecvError::Closed) => return Err("call session closed".to_owned()),
        }
    }
}

async fn stop(
    handle: &CallSessionHandle,
    events: &mut EventStream,
    config: &SmokeConfig,
) -> Result<(), String> {
    handle
        .send(CallCommand::Stop)
        .await
        .map_err(|err| err.to_string())?;

    let ended = async {
        loop {
            match events.recv().await {
                Ok(CallEvent::StateChanged {
                    phase: CallLifecyclePhase::EndingOrDismissed,
                })
                | Err(RecvError::Closed) => return,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
            }
        }
    };
    timeout(config.start_timeout, ended)
        .await
        .map_err(|_| "call session did not stop in time".to_owned())
}
