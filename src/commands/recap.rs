//! Recap command: validate, moderate, fetch, then narrate.

use std::future::Future;

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use super::resolve;
use crate::{
    config::{AppConfig, ESPN_S2_ENV_VAR, ESPN_SWID_ENV_VAR, LEAGUE_ID_ENV_VAR},
    core::{build_client, build_streaming_client},
    league::LeagueSnapshot,
    moderation::{screen, AllowAll, ContentModerator, OpenAiModerator},
    narrative::{Intensity, NarrativeGenerator, NarrativeStream, Persona},
    oauth::{authorization_url, TokenManager, TokenSession},
    providers::{Aggregator, RawCredentials},
    CommishError, Provider, Result, Season, Week,
};

/// Parameters for the recap command.
#[derive(Debug, Clone)]
pub struct RecapParams {
    pub provider: Provider,
    pub league_id: Option<String>,
    pub swid: Option<String>,
    pub espn_s2: Option<String>,
    pub auth_code: Option<String>,
    pub week: Option<Week>,
    pub season: Option<Season>,
    pub persona: Option<String>,
    pub intensity: u8,
    pub moderate: bool,
    pub json_snapshot: bool,
    pub verbose: bool,
}

/// A fetched week and its narration, ready to render.
#[derive(Debug)]
pub struct Recap {
    pub snapshot: LeagueSnapshot,
    pub narrative: NarrativeStream,
}

/// The validate → moderate → aggregate → narrate chain.
pub struct RecapPipeline {
    aggregator: Aggregator,
    moderator: Box<dyn ContentModerator>,
    generator: NarrativeGenerator,
}

impl RecapPipeline {
    /// Moderation is off until [`RecapPipeline::with_moderator`] installs a gate.
    pub fn new(aggregator: Aggregator, generator: NarrativeGenerator) -> Self {
        Self {
            aggregator,
            moderator: Box::new(AllowAll),
            generator,
        }
    }

    #[must_use]
    pub fn with_moderator(mut self, moderator: Box<dyn ContentModerator>) -> Self {
        self.moderator = moderator;
        self
    }

    /// Run everything up to the first narrative fragment.
    ///
    /// Credentials are checked before any network call and a rejected
    /// persona stops the run before the league is fetched.
    pub async fn start(
        &self,
        provider: Provider,
        raw: &RawCredentials,
        persona: &Persona,
        week: Option<Week>,
    ) -> Result<Recap> {
        self.aggregator.validate(provider, raw)?;
        screen(self.moderator.as_ref(), persona.description()).await?;

        let snapshot = self.aggregator.get_summary(provider, raw, week).await?;
        let narrative = self.generator.stream_narrative(&snapshot, persona).await?;
        Ok(Recap {
            snapshot,
            narrative,
        })
    }
}

/// Write fragments as they arrive, flushing each one. Returns the number of
/// characters written; a mid-stream failure is returned after the partial text.
pub async fn render_narrative<W>(mut narrative: NarrativeStream, out: &mut W) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(fragment) = narrative.next().await {
        match fragment {
            Ok(text) => {
                out.write_all(text.as_bytes()).await?;
                out.flush().await?;
                written += text.chars().count();
            }
            Err(e) => {
                out.write_all(b"\n").await?;
                out.flush().await?;
                return Err(e);
            }
        }
    }
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(written)
}

/// Wipe Yahoo token material, including scratch files.
pub async fn clear_session(session: Option<&TokenSession>) {
    if let Some(session) = session {
        session.lock().await.clear();
        debug!("Yahoo session cleared");
    }
}

async fn prompt_for_auth_code(url: &str) -> Result<String> {
    eprintln!("Open this URL, approve access, and paste the code Yahoo shows you:");
    eprintln!("  {url}");
    eprint!("Authorization code: ");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim().to_string())
}

/// Handle the recap command
pub async fn handle_recap(params: RecapParams, config: AppConfig) -> Result<()> {
    let provider = params.provider;
    let verbose = params.verbose;

    // Persona and narration settings are checked before anything touches the network.
    let persona = if params.json_snapshot {
        None
    } else {
        Some(Persona::new(
            params.persona.as_deref().unwrap_or_default(),
            Intensity::new(params.intensity)?,
        )?)
    };

    let http = build_client()?;
    let aggregator = Aggregator::new(http.clone(), config.endpoints.clone())
        .with_yahoo_app(config.yahoo_app.clone());

    let session = (provider == Provider::Yahoo).then(|| {
        TokenManager::new(http.clone(), config.endpoints.yahoo_token.clone()).into_session()
    });

    let mut auth_code = params.auth_code.clone();
    if provider == Provider::Yahoo && auth_code.is_none() {
        let app = config.require_yahoo_app()?;
        let url = authorization_url(&config.endpoints.yahoo_auth, app)?;
        auth_code = Some(prompt_for_auth_code(&url).await?);
    }

    let raw = RawCredentials {
        league_id: resolve(params.league_id.clone(), LEAGUE_ID_ENV_VAR),
        season: params.season,
        espn_swid: resolve(params.swid.clone(), ESPN_SWID_ENV_VAR),
        espn_s2: resolve(params.espn_s2.clone(), ESPN_S2_ENV_VAR),
        yahoo_auth_code: auth_code,
        yahoo_session: session.clone(),
    };

    let run = async {
        match &persona {
            None => print_snapshot(&aggregator, provider, &raw, params.week, verbose).await,
            Some(persona) => {
                let pipeline = build_pipeline(&config, aggregator.clone(), params.moderate)?;
                narrate(&pipeline, provider, &raw, persona, params.week, verbose).await
            }
        }
    };

    run_cancellable(run, tokio::signal::ctrl_c(), session.as_ref()).await
}

/// Drive `work` until it finishes or `cancel` resolves `Ok`, then clear the
/// Yahoo session on either path. A cancelled run is [`CommishError::Cancelled`].
pub async fn run_cancellable<W, C>(
    work: W,
    cancel: C,
    session: Option<&TokenSession>,
) -> Result<()>
where
    W: Future<Output = Result<()>>,
    C: Future<Output = std::io::Result<()>>,
{
    // Dropping `work` drops the narrative stream, which stops reading the upstream body.
    let outcome = tokio::select! {
        result = work => result,
        Ok(()) = cancel => {
            info!("recap cancelled by user");
            Err(CommishError::Cancelled)
        }
    };

    clear_session(session).await;
    outcome
}

fn build_pipeline(
    config: &AppConfig,
    aggregator: Aggregator,
    moderate: bool,
) -> Result<RecapPipeline> {
    let api_key = config.require_openai_api_key()?;
    let generator = NarrativeGenerator::new(
        build_streaming_client()?,
        &config.endpoints.openai,
        api_key,
        &config.openai_model,
    );
    let pipeline = RecapPipeline::new(aggregator, generator);

    if moderate || config.moderation {
        Ok(pipeline.with_moderator(Box::new(OpenAiModerator::new(
            build_client()?,
            &config.endpoints.openai,
            api_key,
        ))))
    } else {
        Ok(pipeline)
    }
}

async fn print_snapshot(
    aggregator: &Aggregator,
    provider: Provider,
    raw: &RawCredentials,
    week: Option<Week>,
    verbose: bool,
) -> Result<()> {
    let snapshot = aggregator.get_summary(provider, raw, week).await?;
    if verbose {
        eprintln!("✓ Fetched week {} from {}", snapshot.week, provider);
    }
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn narrate(
    pipeline: &RecapPipeline,
    provider: Provider,
    raw: &RawCredentials,
    persona: &Persona,
    week: Option<Week>,
    verbose: bool,
) -> Result<()> {
    if verbose {
        eprintln!("Fetching {provider} league and starting the recap...");
    }
    let recap = pipeline.start(provider, raw, persona, week).await?;
    if verbose {
        let name = recap.snapshot.league_name.as_deref().unwrap_or("league");
        eprintln!(
            "✓ {name}: week {}, {} teams, {} matchups",
            recap.snapshot.week,
            recap.snapshot.teams.len(),
            recap.snapshot.matchups.len()
        );
    }

    let mut stdout = tokio::io::stdout();
    let written = render_narrative(recap.narrative, &mut stdout).await?;
    if verbose {
        eprintln!("✓ Recap complete ({written} characters)");
    }
    Ok(())
}
