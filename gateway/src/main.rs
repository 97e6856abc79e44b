use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gateway::config::Config;
use gateway::observer::{NullTelemetry, ObserverClient, ObserverCommand, Telemetry};
use gateway::orchestrator::OrchestratorClient;
use gateway::session::{SessionController, SessionState, TickOutcome};
use gateway::stt_client::SttClient;
use gateway::time::now_ms;
use gateway::transport::{MockFrameSink, MockRoomClient};
use log::{error, info, warn};

#[derive(Parser, Debug)]
#[command(about = "Voice gateway: bridges a conference room to an orchestrator and an STT sidecar")]
struct Args {
    /// Overrides ROOM_URL from the environment.
    #[arg(long)]
    room_url: Option<String>,

    /// Overrides ROOM_TOKEN from the environment.
    #[arg(long)]
    room_token: Option<String>,

    /// Print the resolved configuration and exit without joining a room.
    #[arg(long)]
    list_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = Config::load();

    if args.list_config {
        println!("{config:#?}");
        return Ok(());
    }

    let room_url = args
        .room_url
        .or_else(|| config.room_url.clone())
        .ok_or_else(|| anyhow::anyhow!("ROOM_URL not set and --room-url not given"))?;
    let room_token = args.room_token.or_else(|| config.room_token.clone());

    let session_id = format!("sess-{}", now_ms());
    let session = Arc::new(SessionState::new(session_id.clone(), now_ms()));
    let config = Arc::new(config);

    let room: Arc<dyn gateway::transport::RoomClient> = Arc::new(MockRoomClient::default());
    let sink: Arc<dyn gateway::transport::FrameSink> = Arc::new(MockFrameSink::default());

    let orchestrator = Some(Arc::new(OrchestratorClient::connect(
        config.orch_addr.clone(),
        session_id.clone(),
        room_url.clone(),
    )));

    let stt = if config.stt_enabled {
        match SttClient::connect(&config.stt_uds_path) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("STT sidecar unavailable, continuing without transcription: {e}");
                None
            }
        }
    } else {
        None
    };

    let mut observer_commands = None;
    let telemetry: Arc<dyn Telemetry> = match &config.observer_url {
        Some(url) => match ObserverClient::connect(url, session_id.clone()).await {
            Ok((client, commands)) => {
                observer_commands = Some(commands);
                client
            }
            Err(e) => {
                warn!("observer endpoint unavailable: {e}");
                Arc::new(NullTelemetry)
            }
        },
        None => Arc::new(NullTelemetry),
    };

    let mut controller = SessionController::new(
        session.clone(),
        config.clone(),
        room,
        sink,
        orchestrator.clone(),
        stt,
        telemetry,
    )?;

    if let Err(e) = controller.join(&room_url, room_token.as_deref()) {
        error!("failed to join room: {e}");
        std::process::exit(1);
    }

    if !controller.wait_for_participant() {
        info!("no participant joined within the timeout, exiting");
        return Ok(());
    }

    controller
        .speak("Hello, I'm ready when you are.".to_string())
        .await;

    let mut ticker = controller.idle_tick_interval();
    let mut audio_ticker = tokio::time::interval(Duration::from_millis(20));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if controller.tick().await == TickOutcome::Exit {
                    info!("idle timeout reached, exiting");
                    break;
                }
            }
            _ = audio_ticker.tick() => {
                let now = now_ms();
                controller.drive_audio(now);
                controller.drive_stt(now);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c, shutting down");
                break;
            }
        }

        if let Some(orch) = &orchestrator {
            while let Some(cmd) = orch.try_recv_command() {
                controller.handle_command(cmd, now_ms());
            }
        }

        if let Some(commands) = &mut observer_commands {
            while let Ok(cmd) = commands.try_recv() {
                match cmd {
                    ObserverCommand::StopTts => {
                        controller.tts_stop_flag.store(true, Ordering::Release);
                    }
                    ObserverCommand::Policy(payload) => {
                        info!("observer policy update: {payload}");
                    }
                }
            }
        }
    }

    Ok(())
}
