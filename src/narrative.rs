//! Streamed recap generation from a league snapshot and a persona.
//!
//! [`NarrativeGenerator::stream_narrative`] makes one streaming chat
//! completion call and hands back a [`NarrativeStream`] of text fragments.
//! Fragments must be concatenated in order; their boundaries mean nothing.
//!
//! The stream:
//! - always yields at least one fragment when it is returned at all; a call
//!   that fails before producing text fails up front with `GenerationFailed`
//! - ends normally only after the upstream end marker
//! - yields one `Err(GenerationFailed)` and then ends if the upstream breaks
//!   off mid-way, so a truncated recap is never mistaken for a finished one
//! - stops reading the upstream body as soon as it is dropped

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, BoxStream, Fuse};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{league::LeagueSnapshot, CommishError, Result, TeamId};

#[cfg(test)]
mod tests;

pub const MAX_PERSONA_CHARS: usize = 200;
pub const DEFAULT_INTENSITY: u8 = 5;

/// Trash-talk level, 1 (friendly) to 10 (maximal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Intensity(u8);

impl Intensity {
    pub fn new(level: u8) -> Result<Self> {
        if (1..=10).contains(&level) {
            Ok(Self(level))
        } else {
            Err(CommishError::config(format!(
                "intensity {level} (must be between 1 and 10)"
            )))
        }
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    /// Tone instruction for this level. Levels up to 4 forbid profanity.
    pub fn instruction(&self) -> &'static str {
        match self.0 {
            1..=2 => {
                "Keep the tone friendly and supportive: gentle, good-natured banter only. \
                 Do not use profanity, insults or crude language."
            }
            3..=4 => {
                "Add light ribbing for poor performances, but stay good-humored. \
                 Do not use profanity or crude language."
            }
            5..=6 => {
                "Bring pointed trash talk: call out bad lineups, blowouts and bad luck by name, \
                 while keeping it playful."
            }
            7..=8 => {
                "Roast the managers hard: savage, rivalry-fueled trash talk for every loss, \
                 with the winners gloating."
            }
            _ => {
                "Go all out: maximal, merciless trash talk and over-the-top rivalry for every \
                 matchup, holding nothing back short of slurs or hate."
            }
        }
    }
}

impl Default for Intensity {
    fn default() -> Self {
        Self(DEFAULT_INTENSITY)
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/10", self.0)
    }
}

/// Narrator voice plus trash-talk level. Fixed for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    description: String,
    intensity: Intensity,
}

impl Persona {
    pub fn new(description: impl AsRef<str>, intensity: Intensity) -> Result<Self> {
        let description = description.as_ref().trim();
        if description.is_empty() {
            return Err(CommishError::config("persona description"));
        }
        let chars = description.chars().count();
        if chars > MAX_PERSONA_CHARS {
            return Err(CommishError::config(format!(
                "persona description ({chars} characters, at most {MAX_PERSONA_CHARS})"
            )));
        }
        Ok(Self {
            description: description.to_string(),
            intensity,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn intensity(&self) -> Intensity {
        self.intensity
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// System and user messages for one recap.
pub fn build_messages(snapshot: &LeagueSnapshot, persona: &Persona) -> Result<Vec<ChatMessage>> {
    let system = format!(
        "You are the commissioner of a fantasy football league writing the weekly recap.\n\
         Write in the voice of: {}.\n\
         Trash talk level {}. {}\n\
         Cover every matchup with its final score, name the top scorer of the week, \
         and close with the standings. Use only the facts in the league data; \
         never invent players, scores or results.",
        persona.description(),
        persona.intensity(),
        persona.intensity().instruction(),
    );
    let league = serde_json::to_string_pretty(snapshot)?;
    let user = format!(
        "League data for week {} ({}):\n{}\n\nResults:\n{}\n\nWrite the recap.",
        snapshot.week,
        snapshot.provider,
        league,
        results(snapshot)
    );
    Ok(vec![
        ChatMessage {
            role: "system",
            content: system,
        },
        ChatMessage {
            role: "user",
            content: user,
        },
    ])
}

fn team_name<'a>(snapshot: &'a LeagueSnapshot, id: &'a TeamId) -> &'a str {
    snapshot.team(id).map_or(id.as_str(), |t| t.name.as_str())
}

/// One line per matchup plus the week's top score, resolved to team names.
fn results(snapshot: &LeagueSnapshot) -> String {
    let mut lines: Vec<String> = snapshot
        .matchups
        .iter()
        .map(|m| {
            let outcome = match m.winner() {
                Some(id) => format!("{} won", team_name(snapshot, id)),
                None if m.is_complete => "tie".to_string(),
                None => "not final".to_string(),
            };
            format!(
                "- {} {:.2} vs {} {:.2}: {outcome}",
                team_name(snapshot, &m.home_team_id),
                m.home_score,
                team_name(snapshot, &m.away_team_id),
                m.away_score,
            )
        })
        .collect();
    if let Some((id, points)) = snapshot.top_score() {
        lines.push(format!("- Top score: {} with {points:.2}", team_name(snapshot, id)));
    }
    if lines.is_empty() {
        lines.push("- No matchups were played".to_string());
    }
    lines.join("\n")
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Fragment(String),
    Done,
}

/// Splits a server-sent-event body into `data:` payloads. Lines may span chunks.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Events from every complete line, stopping at the first bad one.
    fn push(&mut self, chunk: &[u8]) -> Vec<Result<SseEvent>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            match parse_line(&String::from_utf8_lossy(&line)) {
                Ok(Some(event)) => events.push(Ok(event)),
                Ok(None) => {}
                Err(e) => {
                    events.push(Err(e));
                    break;
                }
            }
        }
        events
    }

    fn finish(&mut self) -> Result<Option<SseEvent>> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_line(line: &str) -> Result<Option<SseEvent>> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| CommishError::generation(format!("unreadable stream chunk: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(CommishError::generation(error.message));
    }
    let text: String = chunk
        .choices
        .iter()
        .filter_map(|c| c.delta.content.as_deref())
        .collect();
    Ok((!text.is_empty()).then_some(SseEvent::Fragment(text)))
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    failure: Option<CommishError>,
    finished: bool,
}

impl StreamState {
    fn absorb(&mut self, events: Vec<Result<SseEvent>>) {
        for event in events {
            match event {
                Ok(SseEvent::Fragment(text)) => self.pending.push_back(text),
                Ok(SseEvent::Done) => {
                    self.finished = true;
                    return;
                }
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }
        }
    }

    fn fail(&mut self, error: CommishError) {
        self.failure = Some(error);
        self.finished = true;
    }

    /// Next fragment, then any failure, then the end.
    async fn step(mut self) -> Option<(Result<String>, Self)> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                return Some((Ok(fragment), self));
            }
            if let Some(error) = self.failure.take() {
                warn!(error = %error, "narrative stream failed mid-way");
                return Some((Err(error), self));
            }
            if self.finished {
                return None;
            }

            match self.body.next().await {
                Some(Ok(bytes)) => {
                    let events = self.decoder.push(&bytes);
                    self.absorb(events);
                }
                Some(Err(e)) => {
                    self.fail(CommishError::generation(format!("stream interrupted: {e}")))
                }
                None => match self.decoder.finish() {
                    Ok(Some(SseEvent::Done)) => self.finished = true,
                    Ok(Some(SseEvent::Fragment(text))) => {
                        self.pending.push_back(text);
                        self.fail(CommishError::generation("stream ended before completion"));
                    }
                    Ok(None) => {
                        self.fail(CommishError::generation("stream ended before completion"))
                    }
                    Err(e) => self.fail(e),
                },
            }
        }
    }
}

/// Ordered, finite, single-use sequence of narrative fragments.
pub struct NarrativeStream {
    inner: Fuse<BoxStream<'static, Result<String>>>,
}

impl NarrativeStream {
    fn new(inner: BoxStream<'static, Result<String>>) -> Self {
        Self {
            inner: inner.fuse(),
        }
    }

    /// Drain the stream into one string, failing on any error.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

impl fmt::Debug for NarrativeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrativeStream").finish_non_exhaustive()
    }
}

impl Stream for NarrativeStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Chat-completions client for recap narration.
#[derive(Clone)]
pub struct NarrativeGenerator {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl fmt::Debug for NarrativeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrativeGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl NarrativeGenerator {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Start one streamed recap. Never retried; call again to regenerate.
    #[instrument(
        name = "narrative.stream_narrative",
        skip_all,
        fields(model = %self.model, week = %snapshot.week, intensity = persona.intensity().level())
    )]
    pub async fn stream_narrative(
        &self,
        snapshot: &LeagueSnapshot,
        persona: &Persona,
    ) -> Result<NarrativeStream> {
        let request = ChatRequest {
            model: &self.model,
            messages: build_messages(snapshot, persona)?,
            stream: true,
        };
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CommishError::generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CommishError::generation(format!(
                "model returned HTTP {}: {}",
                status.as_u16(),
                body.trim().chars().take(200).collect::<String>()
            )));
        }
        debug!("narrative stream opened");

        let state = StreamState {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            failure: None,
            finished: false,
        };
        let mut fragments = stream::unfold(state, StreamState::step).boxed();

        // Nothing has reached the caller yet, so an early failure fails the call.
        match fragments.next().await {
            Some(Ok(first)) => Ok(NarrativeStream::new(
                stream::once(async move { Ok(first) }).chain(fragments).boxed(),
            )),
            Some(Err(e)) => Err(e),
            None => Err(CommishError::generation("model returned no text")),
        }
    }
}
