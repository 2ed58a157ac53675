//! End-to-end: client adapter ⇄ relay ⇄ a local stand-in for Gemini Live.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use gemini_realtime::SetupMessage;
use relay_api::{config::Config, router::create_router, state::AppState};
use relay_core::{AudioBlob, ClientEvent, Controls, PlaybackBuffer, RelayClient};
use secrecy::SecretString;
use std::{io::Write, path::PathBuf, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::mpsc, time::timeout};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::Level;

const WAIT: Duration = Duration::from_secs(5);

struct FakeProvider {
    url: String,
    received: mpsc::UnboundedReceiver<Message>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl FakeProvider {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(ws) = accept_async(stream).await else {
                return;
            };
            let (mut sink, mut stream) = ws.split();
            loop {
                tokio::select! {
                    msg = stream.next() => match msg {
                        Some(Ok(m)) => {
                            if in_tx.send(m).is_err() {
                                break;
                            }
                        }
                        _ => break,
                    },
                    out = out_rx.recv() => match out {
                        Some(m) => {
                            let is_close = m.is_close();
                            if sink.send(m).await.is_err() || is_close {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });
        Self {
            url: format!("ws://{addr}/v1beta/live:connect"),
            received: in_rx,
            outbound: out_tx,
        }
    }

    async fn next_text(&mut self) -> String {
        loop {
            let msg = timeout(WAIT, self.received.recv())
                .await
                .expect("timed out waiting for the relay")
                .expect("relay disconnected from provider");
            if let Message::Text(text) = msg {
                return text.as_str().to_owned();
            }
        }
    }

    fn send_text(&self, text: &str) {
        self.outbound.send(Message::Text(text.into())).unwrap();
    }
}

fn prompt_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"Answer in one short sentence.").unwrap();
    file
}

/// Starts the relay on an ephemeral port and returns its `/ws` URL.
async fn spawn_relay(provider_url: &str, system_prompt_path: PathBuf) -> String {
    let config = Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        gemini_api_key: SecretString::from("integration-key".to_string()),
        gemini_model: "models/gemini-test".to_string(),
        gemini_endpoint: provider_url.to_string(),
        system_prompt_path,
        static_dir: std::env::temp_dir(),
        log_level: Level::DEBUG,
    };
    let app = create_router(Arc::new(AppState::new(config)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn next_event(client: &mut RelayClient<PlaybackBuffer>) -> ClientEvent {
    timeout(WAIT, client.next_event())
        .await
        .expect("timed out waiting for a client event")
        .expect("client event stream ended")
}

async fn connected() -> (FakeProvider, RelayClient<PlaybackBuffer>, tempfile::NamedTempFile) {
    let mut provider = FakeProvider::spawn().await;
    let prompt = prompt_file();
    let relay_url = spawn_relay(&provider.url, prompt.path().to_path_buf()).await;
    let client = RelayClient::start(&relay_url, "en", PlaybackBuffer::new())
        .await
        .unwrap();

    let setup: SetupMessage = serde_json::from_str(&provider.next_text().await).unwrap();
    assert_eq!(setup.setup.model, "models/gemini-test");
    assert_eq!(setup.setup.instructions, "Answer in one short sentence.");
    assert_eq!(
        provider.next_text().await,
        r#"{"input":{"event":"start","language":"en"}}"#
    );
    (provider, client, prompt)
}

#[tokio::test]
async fn test_start_opens_upstream_with_setup_first() {
    let (_provider, client, _prompt) = connected().await;
    assert_eq!(
        client.controls(),
        Controls {
            start: false,
            stop: true,
            interrupt: false
        }
    );
}

#[tokio::test]
async fn test_microphone_frames_reach_provider_in_order() {
    let (mut provider, mut client, _prompt) = connected().await;

    for i in 0..10u8 {
        client
            .send_audio(AudioBlob::encode("audio/webm;codecs=opus", &[i, i]))
            .await
            .unwrap();
    }

    for i in 0..10u8 {
        let expected = serde_json::json!({
            "input": { "audio": AudioBlob::encode("audio/webm;codecs=opus", &[i, i]) }
        });
        let got: serde_json::Value = serde_json::from_str(&provider.next_text().await).unwrap();
        assert_eq!(got, expected);
    }
}

#[tokio::test]
async fn test_speech_interrupt_and_response_end() {
    let (mut provider, mut client, _prompt) = connected().await;

    provider.send_text(r#"{"transcript":"how are you?"}"#);
    provider.send_text(r#"{"audioChunk":"AAEC"}"#);
    assert_eq!(
        next_event(&mut client).await,
        ClientEvent::Transcript {
            text: "how are you?".into(),
            partial: false
        }
    );
    assert_eq!(next_event(&mut client).await, ClientEvent::Audio { bytes: 3 });
    assert!(client.is_speaking());
    assert!(client.controls().interrupt);

    client.interrupt().await.unwrap();
    assert!(!client.is_speaking());
    assert!(client.playback().is_idle());
    assert_eq!(
        provider.next_text().await,
        r#"{"control":{"event":"interrupt"}}"#
    );

    provider
        .outbound
        .send(Message::Binary(Bytes::from_static(&[1, 2, 3, 4])))
        .unwrap();
    assert_eq!(next_event(&mut client).await, ClientEvent::Audio { bytes: 4 });
    assert_eq!(client.playback().pending_bytes(), 4);

    provider.send_text(r#"{"event":"response.end"}"#);
    assert_eq!(next_event(&mut client).await, ClientEvent::ResponseEnd);
    assert!(!client.is_speaking());
    assert!(client.playback().is_idle());
}

#[tokio::test]
async fn test_upstream_loss_reaches_client_and_resets_controls() {
    let (provider, mut client, _prompt) = connected().await;

    provider.outbound.send(Message::Close(None)).unwrap();

    assert_eq!(
        next_event(&mut client).await,
        ClientEvent::Error("Upstream connection closed".into())
    );
    assert_eq!(next_event(&mut client).await, ClientEvent::Closed);
    assert_eq!(client.controls(), Controls::default());
    client.stop().await;
}

#[tokio::test]
async fn test_missing_instructions_fail_the_session() {
    let provider = FakeProvider::spawn().await;
    let relay_url = spawn_relay(
        &provider.url,
        PathBuf::from("/no/such/dir/system_prompt.md"),
    )
    .await;
    let mut client = RelayClient::start(&relay_url, "en", PlaybackBuffer::new())
        .await
        .unwrap();

    let ClientEvent::Error(message) = next_event(&mut client).await else {
        panic!("expected an error event");
    };
    assert!(message.contains("Failed to start session"), "{message}");
    assert_eq!(next_event(&mut client).await, ClientEvent::Closed);
}
