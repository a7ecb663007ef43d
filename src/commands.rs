use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use log::Level::{Debug, Error, Info, Warn};

use crate::dashboard;
use crate::speech::{SpeechGate, Utterance};
use crate::store::TelemetryStore;
use crate::telemetry::SharedMonitorState;

const TEST_ALERT_TEXT: &str = "This is a test of the audio alert system.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Toggle,
    AudioAlerts(bool),
    Module(u8, bool),
    Status,
    Latest,
    TestAlert,
}

fn parse_switch(token: &str) -> Result<bool, String> {
    match token {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(format!("invalid switch: {token}")),
    }
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let tokens: Vec<_> = line.split_whitespace().collect();
    match tokens.as_slice() {
        ["start"] => Ok(Command::Start),
        ["stop"] => Ok(Command::Stop),
        ["toggle"] => Ok(Command::Toggle),
        ["alerts", switch] => parse_switch(switch).map(Command::AudioAlerts),
        ["module", id, switch] => {
            let id: u8 = id.parse().map_err(|_| format!("invalid module: {id}"))?;
            if !(1..=3).contains(&id) {
                return Err(format!("invalid module: {id}"));
            }
            Ok(Command::Module(id, parse_switch(switch)?))
        }
        ["status"] => Ok(Command::Status),
        ["latest"] => Ok(Command::Latest),
        ["test_alert"] => Ok(Command::TestAlert),
        _ => Err("unknown command".to_string()),
    }
}

/// Apply a command and build the reply sent back to the client.
pub async fn execute(
    command: Command,
    state: &SharedMonitorState,
    speech: &SpeechGate,
    store: &Arc<dyn TelemetryStore>,
) -> String {
    match command {
        Command::Start => state.lock().await.engine.set_running(true),
        Command::Stop => state.lock().await.engine.set_running(false),
        Command::Toggle => {
            state.lock().await.engine.toggle();
        }
        Command::AudioAlerts(enabled) => state.lock().await.set_audio_alerts(enabled),
        Command::Module(id, active) => {
            state.lock().await.modules.set(id, active);
        }
        Command::Status => return dashboard::render_status(&*state.lock().await),
        Command::Latest => {
            return match store.read_latest().await {
                Ok(Some(sample)) => format!(
                    "{} speed={:.1} obstacleDistance={:.1}\n",
                    sample.timestamp, sample.speed, sample.obstacle_distance
                ),
                Ok(None) => "EMPTY\n".to_string(),
                Err(e) => {
                    crate::store_log!(Error, "Failed to read latest sample: {e}");
                    state.lock().await.set_store_error(e.to_string());
                    format!("ERR {e}\n")
                }
            };
        }
        Command::TestAlert => {
            if !speech.request(Utterance::new(TEST_ALERT_TEXT)) {
                return "ERR busy\n".to_string();
            }
        }
    }
    "OK\n".to_string()
}

pub async fn start_command_listener(
    addr: &str,
    state: SharedMonitorState,
    speech: SpeechGate,
    store: Arc<dyn TelemetryStore>,
) -> std::io::Result<JoinHandle<()>> {
    let listener = TcpListener::bind(addr).await?;
    crate::commands_log!(Info, "Command listener on {}", listener.local_addr()?);

    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    crate::commands_log!(Debug, "Command connection from {peer}");
                    let state = state.clone();
                    let speech = speech.clone();
                    let store = store.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &state, &speech, &store).await {
                            crate::commands_log!(Warn, "Command connection error: {e}");
                        }
                    });
                }
                Err(e) => {
                    crate::commands_log!(Error, "Failed to accept command connection: {e}");
                }
            }
        }
    }))
}

async fn handle_connection(
    stream: TcpStream,
    state: &SharedMonitorState,
    speech: &SpeechGate,
    store: &Arc<dyn TelemetryStore>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    if let Some(line) = lines.next_line().await? {
        let response = match parse_command(line.trim()) {
            Ok(command) => {
                crate::commands_log!(Info, "Command: {:?}", command);
                execute(command, state, speech, store).await
            }
            Err(reason) => format!("ERR {reason}\n"),
        };
        writer.write_all(response.as_bytes()).await?;
    }
    Ok(())
}
