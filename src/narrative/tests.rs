//! Narrative prompt and streaming tests against a mocked chat-completions endpoint

use super::*;
use crate::{
    error::ErrorKind,
    league::{Matchup, Record, Team, TeamRank},
    LeagueId, Provider, TeamId, Week,
};
use crate::core::streaming_client;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use wiremock::{
    matchers::{body_partial_json, body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn snapshot() -> LeagueSnapshot {
    let team = |id: &str, name: &str, wins, losses| Team {
        id: TeamId::new(id),
        name: name.to_string(),
        owner: format!("owner {id}"),
        record: Record::new(wins, losses, 0),
    };
    let rank = |id: &str, rank, wins, losses, pf| TeamRank {
        team_id: TeamId::new(id),
        rank,
        wins,
        losses,
        ties: 0,
        points_for: pf,
    };
    LeagueSnapshot::new(
        Provider::Sleeper,
        LeagueId::new("123456").unwrap(),
        Week::new(4).unwrap(),
        vec![team("1", "Gronk Smash", 3, 1), team("2", "Mahomes Alone", 1, 3)],
        vec![Matchup {
            home_team_id: TeamId::new("1"),
            away_team_id: TeamId::new("2"),
            home_score: 121.3,
            away_score: 88.7,
            is_complete: true,
        }],
        vec![rank("1", 1, 3, 1, 450.2), rank("2", 2, 1, 3, 390.0)],
    )
    .unwrap()
}

fn persona(level: u8) -> Persona {
    Persona::new("a calm analyst", Intensity::new(level).unwrap()).unwrap()
}

fn generator(server: &MockServer) -> NarrativeGenerator {
    NarrativeGenerator::new(Client::new(), format!("{}/v1", server.uri()), "sk-test", "gpt-4o")
}

fn delta(text: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({"id": "chatcmpl-1", "object": "chat.completion.chunk", "choices": [{"index": 0, "delta": {"content": text}}]})
    )
}

fn sse(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

async fn collect(mut stream: NarrativeStream) -> (String, Vec<CommishError>) {
    let mut text = String::new();
    let mut errors = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => text.push_str(&fragment),
            Err(e) => errors.push(e),
        }
    }
    (text, errors)
}

#[test]
fn test_intensity_bounds() {
    assert!(Intensity::new(0).is_err());
    assert!(Intensity::new(11).is_err());
    assert_eq!(Intensity::new(10).unwrap().level(), 10);
    assert_eq!(Intensity::default().level(), 5);
}

#[test]
fn test_low_intensity_forbids_profanity() {
    for level in 1..=4 {
        let text = Intensity::new(level).unwrap().instruction();
        assert!(text.contains("Do not use profanity"), "level {level}");
    }
    for level in 5..=10 {
        let text = Intensity::new(level).unwrap().instruction();
        assert!(!text.contains("Do not use profanity"), "level {level}");
    }
    assert_ne!(
        Intensity::new(1).unwrap().instruction(),
        Intensity::new(10).unwrap().instruction()
    );
}

#[test]
fn test_persona_validation() {
    assert!(Persona::new("   ", Intensity::default()).is_err());
    assert!(Persona::new("x".repeat(201), Intensity::default()).is_err());
    let p = Persona::new(format!(" {} ", "é".repeat(200)), Intensity::default()).unwrap();
    assert_eq!(p.description().chars().count(), 200);
}

#[test]
fn test_messages_carry_snapshot_and_persona() {
    let messages = build_messages(&snapshot(), &persona(1)).unwrap();

    assert_eq!(messages[0].role, "system");
    assert!(messages[0].content.contains("a calm analyst"));
    assert!(messages[0].content.contains("1/10"));
    assert!(messages[0].content.contains("Do not use profanity"));
    assert_eq!(messages[1].role, "user");
    assert!(messages[1].content.contains("\"Gronk Smash\""));
    assert!(messages[1].content.contains("121.3"));
    assert!(messages[1]
        .content
        .contains("- Gronk Smash 121.30 vs Mahomes Alone 88.70: Gronk Smash won"));
    assert!(messages[1].content.contains("- Top score: Gronk Smash with 121.30"));
}

#[tokio::test]
async fn test_fragments_concatenate_in_order() {
    let server = MockServer::start().await;
    let body = [delta("Gronk Sm"), delta("ash rolled"), delta(" 121.3 to 88.7.")].concat()
        + "data: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o", "stream": true})))
        .and(body_string_contains("Do not use profanity"))
        .respond_with(sse(body))
        .expect(1)
        .mount(&server)
        .await;

    let stream = generator(&server)
        .stream_narrative(&snapshot(), &persona(1))
        .await
        .unwrap();
    let (text, errors) = collect(stream).await;

    assert_eq!(text, "Gronk Smash rolled 121.3 to 88.7.");
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_role_only_and_empty_deltas_are_skipped() {
    let server = MockServer::start().await;
    let role = format!(
        "data: {}\n\n",
        json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}}]})
    );
    let body = role + &delta("Recap.") + ": keep-alive\n\n" + "data: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let text = generator(&server)
        .stream_narrative(&snapshot(), &persona(5))
        .await
        .unwrap()
        .collect_text()
        .await
        .unwrap();
    assert_eq!(text, "Recap.");
}

#[tokio::test]
async fn test_truncated_stream_ends_with_error() {
    let server = MockServer::start().await;
    let body = [delta("Week 4 was "), delta("a bloodbath")].concat();
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let mut stream = generator(&server)
        .stream_narrative(&snapshot(), &persona(8))
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), "Week 4 was ");
    assert_eq!(stream.next().await.unwrap().unwrap(), "a bloodbath");
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GenerationFailed);
    // Fused: finished streams stay finished.
    assert!(stream.next().await.is_none());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_error_event_mid_stream() {
    let server = MockServer::start().await;
    let error = format!(
        "data: {}\n\n",
        json!({"error": {"message": "The server had an error", "type": "server_error"}})
    );
    let body = delta("Half a recap") + &error + &delta("never seen") + "data: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let stream = generator(&server)
        .stream_narrative(&snapshot(), &persona(3))
        .await
        .unwrap();
    let (text, errors) = collect(stream).await;

    assert_eq!(text, "Half a recap");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("server had an error"));

    let collected = generator(&server)
        .stream_narrative(&snapshot(), &persona(3))
        .await
        .unwrap()
        .collect_text()
        .await;
    assert!(collected.is_err());
}

#[tokio::test]
async fn test_upstream_rejection_fails_before_any_fragment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached", "type": "requests"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = generator(&server)
        .stream_narrative(&snapshot(), &persona(5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GenerationFailed);
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn test_empty_completion_fails_up_front() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse("data: [DONE]\n\n".to_string()))
        .mount(&server)
        .await;

    let err = generator(&server)
        .stream_narrative(&snapshot(), &persona(5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GenerationFailed);
}

#[test]
fn test_decoder_handles_split_lines_and_utf8() {
    let mut decoder = SseDecoder::default();
    let line = delta("señor");
    let bytes = line.as_bytes();
    // Split inside the multi-byte ñ.
    let cut = line.find('ñ').unwrap() + 1;

    assert!(decoder.push(&bytes[..cut]).is_empty());
    let events = decoder.push(&bytes[cut..]);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].as_ref().unwrap(), &SseEvent::Fragment("señor".to_string()));

    // A torn final line is not a completion marker.
    assert!(decoder.push(b"data: [DO").is_empty());
    assert!(decoder.finish().is_err());
    assert_eq!(decoder.finish().unwrap(), None);
}

#[test]
fn test_decoder_finish_reads_unterminated_done() {
    let mut decoder = SseDecoder::default();
    assert!(decoder.push(b"data: [DONE]").is_empty());
    assert_eq!(decoder.finish().unwrap(), Some(SseEvent::Done));
}

/// What a paced SSE server managed to deliver before the client went away.
#[derive(Debug)]
struct Delivery {
    sent: usize,
    completed: bool,
}

/// Read one HTTP request, headers and `content-length` body.
async fn read_request(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                return Ok(());
            }
        }
    }
}

/// Serve one chat-completions stream, writing `count` deltas `gap` apart and
/// then `[DONE]`. The body is delimited by closing the connection.
async fn paced_server(count: usize, gap: Duration) -> (String, JoinHandle<Delivery>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await.unwrap();
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut sent = 0;
        for i in 0..count {
            let written = async {
                socket.write_all(delta(&format!("{i} ")).as_bytes()).await?;
                socket.flush().await
            }
            .await;
            if written.is_err() {
                return Delivery { sent, completed: false };
            }
            sent += 1;
            tokio::time::sleep(gap).await;
        }
        let completed = socket.write_all(b"data: [DONE]\n\n").await.is_ok();
        let _ = socket.shutdown().await;
        Delivery { sent, completed }
    });
    (format!("http://{addr}/v1"), handle)
}

fn paced_generator(base_url: String, client: Client) -> NarrativeGenerator {
    NarrativeGenerator::new(client, base_url, "sk-test", "gpt-4o")
}

#[tokio::test]
async fn test_slow_stream_runs_past_a_whole_request_deadline() {
    let gap = Duration::from_millis(150);

    // A whole-request deadline cuts a healthy but slow stream short.
    let (url, _) = paced_server(6, gap).await;
    let bounded = Client::builder().timeout(Duration::from_millis(400)).build().unwrap();
    let stream = paced_generator(url, bounded)
        .stream_narrative(&snapshot(), &persona(3))
        .await
        .unwrap();
    let (_, errors) = collect(stream).await;
    assert_eq!(errors.len(), 1);

    // The streaming client only bounds the silence between reads.
    let (url, server) = paced_server(6, gap).await;
    let client = streaming_client(Duration::from_secs(1), Duration::from_millis(400)).unwrap();
    let text = paced_generator(url, client)
        .stream_narrative(&snapshot(), &persona(3))
        .await
        .unwrap()
        .collect_text()
        .await
        .unwrap();

    assert_eq!(text, "0 1 2 3 4 5 ");
    let delivery = server.await.unwrap();
    assert!(delivery.completed);
    assert_eq!(delivery.sent, 6);
}

#[tokio::test]
async fn test_stalled_stream_fails_after_idle_timeout() {
    let (url, _) = paced_server(2, Duration::from_secs(3)).await;
    let client = streaming_client(Duration::from_secs(1), Duration::from_millis(200)).unwrap();

    let stream = paced_generator(url, client)
        .stream_narrative(&snapshot(), &persona(3))
        .await
        .unwrap();
    let (text, errors) = collect(stream).await;

    assert_eq!(text, "0 ");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), ErrorKind::GenerationFailed);
}

#[tokio::test]
async fn test_dropping_stream_stops_upstream_reads() {
    let (url, server) = paced_server(200, Duration::from_millis(10)).await;
    let client = streaming_client(Duration::from_secs(1), Duration::from_secs(5)).unwrap();

    let mut stream = paced_generator(url, client)
        .stream_narrative(&snapshot(), &persona(3))
        .await
        .unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), "0 ");
    drop(stream);

    let delivery = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server kept writing to an abandoned stream")
        .unwrap();
    assert!(!delivery.completed);
    assert!(delivery.sent < 200, "sent {}", delivery.sent);
}
