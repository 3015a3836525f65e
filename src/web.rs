use crate::config::{CredentialStatus, ServiceConfig};
use crate::error::ServiceError;
use crate::fallback::{self, FEATURED_WORDS, FeaturedWord};
use crate::model::{EtymologyAnalysis, GeneratedImage, ImageResult, RelatedWord};
use crate::screen::{Screen, ScreenRouter, Transition};
use crate::service::EtymologyService;
use crate::session::SessionStore;
use askama::Template;
use axum::{
    Form, Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use cookie::{Cookie, SameSite};
use markdown::{Options as MarkdownOptions, to_html_with_options};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, info, warn};

type SharedState = Arc<AppState>;
const SESSION_COOKIE: &str = "veritas_session";
const ANALYSIS_FAILED: &str = "A análise falhou. Tente novamente.";

#[derive(Clone)]
pub struct AppState {
    pub service: EtymologyService,
    pub credentials: CredentialStatus,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(service: EtymologyService, credentials: CredentialStatus) -> Self {
        Self {
            service,
            credentials,
            sessions: SessionStore::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub service: ServiceConfig,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            service: ServiceConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("veritas-radix/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let credentials = config.service.credential_status();
    let service = EtymologyService::from_config(&config.service, http);
    let router = build_router(Arc::new(AppState::new(service, credentials)));
    if !credentials.text_generation {
        warn!("No text-generation key configured; etymology requests will fail");
    }
    if !credentials.image_generation {
        warn!("No image-generation key configured; illustration requests will fail");
    }
    if !credentials.stock_photos {
        info!("No stock-photo key configured; image search serves fallbacks only");
    }
    info!(
        addr = %config.addr,
        text_model = %config.service.text_model,
        image_model = %config.service.image_model,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<String>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details: None,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let (status, message, details) = match &err {
            ServiceError::InvalidInput(message) => (StatusCode::BAD_REQUEST, message.clone(), None),
            ServiceError::Misconfigured { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), None)
            }
            ServiceError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded. Try again in a few minutes.".to_string(),
                None,
            ),
            ServiceError::ContentRejected { .. } => (
                StatusCode::BAD_REQUEST,
                "Content not allowed or invalid prompt.".to_string(),
                Some(err.to_string()),
            ),
            ServiceError::UpstreamEmptyResult { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "The upstream service returned no result.".to_string(),
                Some(err.to_string()),
            ),
            ServiceError::UpstreamFailure { .. } | ServiceError::Timeout { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process request.".to_string(),
                Some(err.to_string()),
            ),
        };
        Self {
            status,
            message,
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = match self.details {
            Some(details) => json!({ "error": self.message, "details": details }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(payload)).into_response()
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/app", get(app_page))
        .route("/app/login", post(app_login))
        .route("/app/select", post(app_select))
        .route("/app/challenge", post(app_challenge))
        .route("/app/go/:screen", get(app_go))
        .route("/api/etymology", post(api_etymology))
        .route("/api/generate-image", post(api_generate_image))
        .route("/api/image-search", post(api_image_search))
        .route("/api/config-status", get(api_config_status))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new()),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "veritas-radix",
        "sessions": state.sessions.len(),
    }))
}

async fn api_config_status(State(state): State<SharedState>) -> Json<CredentialStatus> {
    Json(state.credentials)
}

#[derive(Debug, Deserialize)]
struct EtymologyRequest {
    #[serde(default)]
    word: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateImageRequest {
    #[serde(default)]
    word: Option<String>,
    #[serde(default)]
    etymology: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageSearchRequest {
    #[serde(default)]
    word: Option<String>,
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug, Serialize)]
struct EtymologyResponse {
    success: bool,
    #[serde(flatten)]
    analysis: EtymologyAnalysis,
}

#[derive(Debug, Serialize)]
struct GenerateImageResponse {
    success: bool,
    #[serde(flatten)]
    image: GeneratedImage,
}

#[derive(Debug, Serialize)]
struct ImageSearchResponse {
    success: bool,
    #[serde(flatten)]
    image: ImageResult,
}

async fn api_etymology(
    State(state): State<SharedState>,
    body: Result<Json<EtymologyRequest>, JsonRejection>,
) -> Result<Json<EtymologyResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let word = request.word.unwrap_or_default();
    let analysis = state.service.analyze(&word).await.map_err(|err| {
        warn!(word = %word, error = %err, "Etymology request failed");
        ApiError::from(err)
    })?;
    Ok(Json(EtymologyResponse {
        success: true,
        analysis,
    }))
}

async fn api_generate_image(
    State(state): State<SharedState>,
    body: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Result<Json<GenerateImageResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let word = request.word.unwrap_or_default();
    let image = state
        .service
        .illustrate(&word, request.etymology.as_deref())
        .await
        .map_err(|err| {
            warn!(word = %word, error = %err, "Illustration request failed");
            ApiError::from(err)
        })?;
    Ok(Json(GenerateImageResponse {
        success: true,
        image,
    }))
}

/// Always answers 200 with an image, whatever went wrong.
async fn api_image_search(
    State(state): State<SharedState>,
    body: Result<Json<ImageSearchRequest>, JsonRejection>,
) -> Json<ImageSearchResponse> {
    let image = match body {
        Ok(Json(request)) => resolve_image(&state, request.word, request.query).await,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Unreadable image search body; using default image");
            fallback::default_image_after_error()
        }
    };
    debug!(using_fallback = image.using_fallback, reason = ?image.reason, "Image resolved");
    Json(ImageSearchResponse {
        success: true,
        image,
    })
}

/// Runs the resolver on its own task so even a panic ends in the default image.
async fn resolve_image(
    state: &SharedState,
    word: Option<String>,
    query: Option<String>,
) -> ImageResult {
    let service = state.service.clone();
    let task =
        tokio::spawn(async move { service.search_image(word.as_deref(), query.as_deref()).await });
    match task.await {
        Ok(image) => image,
        Err(err) => {
            warn!(error = %err, "Image resolver crashed; using default image");
            fallback::default_image_after_error()
        }
    }
}

// Screens

#[derive(Debug, Deserialize)]
struct SelectForm {
    #[serde(default)]
    word: String,
}

async fn home() -> Redirect {
    Redirect::to("/app")
}

async fn app_page(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let (id, router, created) = state.sessions.resolve(session_id(&headers).as_deref());
    let page = render_screen(&state, &router).await;
    with_session_cookie(Html(page).into_response(), &id, created)
}

async fn app_login(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    transition(&state, &headers, Transition::Login)
}

async fn app_select(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(form): Form<SelectForm>,
) -> Response {
    transition(&state, &headers, Transition::SelectWord(form.word))
}

async fn app_challenge(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    transition(&state, &headers, Transition::StartChallenge)
}

async fn app_go(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(screen): Path<String>,
) -> Response {
    match screen.parse::<Screen>() {
        Ok(target) => transition(&state, &headers, Transition::Navigate(target)),
        Err(err) => {
            debug!(%err, "Ignoring navigation to unknown screen");
            Redirect::to("/app").into_response()
        }
    }
}

/// Applies `transition` to the caller's session and sends them back to `/app`.
fn transition(state: &SharedState, headers: &HeaderMap, transition: Transition) -> Response {
    let (id, _, created) = state.sessions.resolve(session_id(headers).as_deref());
    if let Err(err) = state.sessions.apply(&id, transition) {
        debug!(%err, "Navigation refused");
    }
    with_session_cookie(Redirect::to("/app").into_response(), &id, created)
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

fn with_session_cookie(mut response: Response, id: &str, created: bool) -> Response {
    if !created {
        return response;
    }
    let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

async fn render_screen(state: &SharedState, router: &ScreenRouter) -> String {
    let screen = router.current();
    let body = match screen {
        Screen::Login => LoginTemplate.render(),
        Screen::Main => MainTemplate {
            cards: featured_cards(),
        }
        .render(),
        Screen::Morphology => match router.selected_word() {
            Some(word) => morphology_view(state, word).await.render(),
            None => EmptySelectionTemplate.render(),
        },
        Screen::Challenges => ChallengesTemplate {
            challenges: build_challenges(router.selected_word()),
        }
        .render(),
        Screen::Profile => ProfileTemplate {
            logged_in: router.is_logged_in(),
            selected_word: router.selected_word().unwrap_or("nenhuma").to_string(),
            explored: router.explored_words().to_vec(),
        }
        .render(),
        Screen::Tree => match router.selected_word() {
            Some(word) => tree_view(word).render(),
            None => EmptySelectionTemplate.render(),
        },
    };
    let body = match body {
        Ok(body) => body,
        Err(err) => return render_error_page(&err.to_string()),
    };
    let page = PageTemplate {
        title: screen.label(),
        show_nav: router.shows_navigation(),
        nav: nav_links(screen),
        body,
    };
    page.render()
        .unwrap_or_else(|err| render_error_page(&err.to_string()))
}

fn render_error_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
  <head><meta charset="utf-8" /><title>Veritas Radix • Erro</title></head>
  <body>
    <main>
      <h1>Algo deu errado</h1>
      <p>{message}</p>
      <a href="/app">Voltar</a>
    </main>
  </body>
</html>"#,
        message = escape_html(message),
    )
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Markdown to HTML with raw HTML disabled; model output is untrusted.
fn render_markdown_str(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    to_html_with_options(trimmed, &MarkdownOptions::gfm()).ok()
}

struct NavLink {
    href: String,
    label: &'static str,
    active: bool,
}

fn nav_links(current: Screen) -> Vec<NavLink> {
    Screen::NAVIGABLE
        .iter()
        .map(|screen| NavLink {
            href: format!("/app/go/{screen}"),
            label: screen.label(),
            active: *screen == current,
        })
        .collect()
}

struct FeaturedCard {
    word: &'static str,
    origin: &'static str,
    meaning: &'static str,
    image_url: &'static str,
}

fn featured_cards() -> Vec<FeaturedCard> {
    FEATURED_WORDS
        .iter()
        .map(|featured| FeaturedCard {
            word: featured.word,
            origin: featured.origin,
            meaning: featured.meaning,
            image_url: fallback::image_url_for(featured.word),
        })
        .collect()
}

struct ImageView {
    url: String,
    description: String,
    credit: Option<String>,
}

impl From<ImageResult> for ImageView {
    fn from(image: ImageResult) -> Self {
        let credit = image
            .attribution
            .filter(|attribution| !attribution.photographer.is_empty())
            .map(|attribution| format!("Foto de {} (Unsplash)", attribution.photographer));
        Self {
            url: image.image_url,
            description: image.description,
            credit,
        }
    }
}

struct AnalysisView {
    origin_language: String,
    original_form: String,
    original_meaning: String,
    evolution_html: Option<String>,
    prefix: String,
    root: String,
    suffix: String,
    morphology_explanation: String,
    related: Vec<RelatedWord>,
    historical_html: Option<String>,
    curiosities: Vec<String>,
}

impl From<EtymologyAnalysis> for AnalysisView {
    fn from(analysis: EtymologyAnalysis) -> Self {
        let data = analysis.data;
        Self {
            prefix: data.morphology.prefix().unwrap_or_default().to_string(),
            suffix: data.morphology.suffix().unwrap_or_default().to_string(),
            root: data.morphology.root,
            morphology_explanation: data.morphology.explanation,
            origin_language: data.etymology.origin_language,
            original_form: data.etymology.original_form,
            original_meaning: data.etymology.original_meaning,
            evolution_html: render_markdown_str(&data.etymology.evolution_narrative),
            related: data.related_words,
            historical_html: render_markdown_str(&data.historical_context),
            curiosities: data.curiosities,
        }
    }
}

async fn morphology_view(state: &SharedState, word: &str) -> MorphologyTemplate {
    let analysis = match state.service.analyze(word).await {
        Ok(analysis) => Ok(AnalysisView::from(analysis)),
        Err(err) => {
            warn!(word, error = %err, "Morphology analysis failed");
            Err(err.to_string())
        }
    };
    let image = resolve_image(state, Some(word.to_string()), None).await;
    let (analysis, error) = match analysis {
        Ok(view) => (Some(view), None),
        Err(detail) => (None, Some(detail)),
    };
    MorphologyTemplate {
        word: word.to_string(),
        image: image.into(),
        analysis,
        error,
        failure_message: ANALYSIS_FAILED,
    }
}

struct ChallengeCard {
    word: &'static str,
    question: String,
    options: Vec<&'static str>,
    answer: &'static str,
}

/// One root-meaning question per featured word; the selected word goes first.
fn build_challenges(selected: Option<&str>) -> Vec<ChallengeCard> {
    let count = FEATURED_WORDS.len();
    let mut cards: Vec<ChallengeCard> = FEATURED_WORDS
        .iter()
        .enumerate()
        .filter_map(|(index, featured)| {
            let root = featured.roots.first()?;
            let mut options = vec![root.transliteration];
            for offset in 1..count {
                let other = &FEATURED_WORDS[(index + offset) % count];
                for candidate in other.roots {
                    if options.len() < 3 && !options.contains(&candidate.transliteration) {
                        options.push(candidate.transliteration);
                    }
                }
            }
            options.sort_unstable();
            Some(ChallengeCard {
                word: featured.word,
                question: format!(
                    "Qual raiz grega de \"{}\" significa \"{}\"?",
                    featured.word, root.gloss
                ),
                options,
                answer: root.transliteration,
            })
        })
        .collect();
    if let Some(selected) = selected {
        if let Some(position) = cards
            .iter()
            .position(|card| card.word.eq_ignore_ascii_case(selected))
        {
            let card = cards.remove(position);
            cards.insert(0, card);
        }
    }
    cards
}

struct RootView {
    greek: &'static str,
    transliteration: &'static str,
    gloss: &'static str,
    siblings: Vec<&'static str>,
}

fn tree_view(word: &str) -> TreeTemplate {
    let featured = fallback::featured(word);
    let roots = featured
        .map(|featured| {
            featured
                .roots
                .iter()
                .map(|root| RootView {
                    greek: root.greek,
                    transliteration: root.transliteration,
                    gloss: root.gloss,
                    siblings: words_sharing_root(featured, root.transliteration),
                })
                .collect()
        })
        .unwrap_or_default();
    TreeTemplate {
        word: word.to_string(),
        origin: featured.map(|featured| featured.origin).unwrap_or_default(),
        roots,
    }
}

fn words_sharing_root(owner: &FeaturedWord, transliteration: &str) -> Vec<&'static str> {
    FEATURED_WORDS
        .iter()
        .filter(|other| other.word != owner.word)
        .filter(|other| {
            other
                .roots
                .iter()
                .any(|root| root.transliteration == transliteration)
        })
        .map(|other| other.word)
        .collect()
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="pt-BR">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Veritas Radix • {{ title }}</title>
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
  </head>
  <body class="min-h-screen bg-[#f4ecd8] text-[#3b2f2f] font-serif">
    <main class="max-w-5xl mx-auto p-4 sm:p-6 pb-24">
{{ body|safe }}
    </main>
    {% if show_nav %}
    <nav class="fixed bottom-0 inset-x-0 bg-[#efe3c6] border-t border-[#8b0000]/30">
      <ul class="max-w-5xl mx-auto flex justify-around py-3 text-sm">
        {% for link in nav %}
        <li>
          <a href="{{ link.href }}" class="{% if link.active %}text-[#8b0000] font-semibold{% else %}text-[#704214]{% endif %}">{{ link.label }}</a>
        </li>
        {% endfor %}
      </ul>
    </nav>
    {% endif %}
  </body>
</html>"#,
    ext = "html"
)]
struct PageTemplate {
    title: &'static str,
    show_nav: bool,
    nav: Vec<NavLink>,
    body: String,
}

#[derive(Template)]
#[template(
    source = r#"<section id="login" class="text-center mt-24 space-y-6">
  <h1 class="text-4xl">Veritas Radix</h1>
  <p class="italic text-[#704214]">Explore as raízes das palavras.</p>
  <form method="post" action="/app/login">
    <button type="submit" class="px-6 py-2 bg-[#8b0000] text-[#f4ecd8] rounded">Entrar</button>
  </form>
</section>"#,
    ext = "html"
)]
struct LoginTemplate;

#[derive(Template)]
#[template(
    source = r#"<section id="main" class="space-y-10">
  <header class="text-center space-y-3">
    <h1 class="text-4xl">Veritas Radix</h1>
    <p class="italic text-[#704214]">"Explore as raízes etimológicas das palavras e descubra as histórias escondidas na linguagem"</p>
  </header>
  <form method="post" action="/app/select" class="flex gap-2 max-w-2xl mx-auto">
    <input type="text" name="word" placeholder="Digite uma palavra..." class="flex-1 px-4 py-2 border border-[#8b0000]/40 rounded bg-[#efe3c6]" />
    <button type="submit" class="px-6 py-2 bg-[#8b0000] text-[#f4ecd8] rounded">Explorar</button>
  </form>
  <h2 class="text-2xl text-center">Palavras em Destaque</h2>
  <div class="grid grid-cols-1 md:grid-cols-2 lg:grid-cols-3 gap-6">
    {% for card in cards %}
    <form method="post" action="/app/select" class="featured-word">
      <input type="hidden" name="word" value="{{ card.word }}" />
      <button type="submit" class="w-full text-left p-6 bg-[#efe3c6] rounded shadow">
        <img src="{{ card.image_url }}" alt="{{ card.word }}" class="w-full h-40 object-cover rounded mb-4" loading="lazy" />
        <h3 class="text-lg text-[#8b0000]">{{ card.word }}</h3>
        <p class="italic text-sm text-[#704214]">{{ card.origin }}</p>
        <p class="text-sm">{{ card.meaning }}</p>
      </button>
    </form>
    {% endfor %}
  </div>
</section>"#,
    ext = "html"
)]
struct MainTemplate {
    cards: Vec<FeaturedCard>,
}

#[derive(Template)]
#[template(
    source = r#"<section id="empty-selection" class="text-center mt-16 space-y-4">
  <p>Nenhuma palavra selecionada.</p>
  <a href="/app/go/main" class="text-[#8b0000] underline">Escolha uma palavra na tela inicial</a>
</section>"#,
    ext = "html"
)]
struct EmptySelectionTemplate;

#[derive(Template)]
#[template(
    source = r#"<section id="morphology" class="space-y-8">
  <h1 class="text-4xl text-center">{{ word }}</h1>
  <figure class="max-w-xl mx-auto">
    <img src="{{ image.url }}" alt="{{ image.description }}" class="w-full rounded shadow" />
    <figcaption class="text-xs text-center text-[#704214] mt-2">{{ image.description }}{% if let Some(credit) = image.credit %} · {{ credit }}{% endif %}</figcaption>
  </figure>
  {% if let Some(analysis) = analysis %}
  <article class="space-y-6">
    {% if !analysis.origin_language.is_empty() %}
    <div>
      <h2 class="text-2xl">Origem</h2>
      <p>{{ analysis.origin_language }}{% if !analysis.original_form.is_empty() %} · <em>{{ analysis.original_form }}</em>{% endif %}</p>
      {% if !analysis.original_meaning.is_empty() %}<p>{{ analysis.original_meaning }}</p>{% endif %}
    </div>
    {% endif %}
    {% if let Some(evolution) = analysis.evolution_html %}
    <div id="evolution">
      <h2 class="text-2xl">Evolução</h2>
      {{ evolution|safe }}
    </div>
    {% endif %}
    {% if !analysis.root.is_empty() %}
    <div id="morphology-parts">
      <h2 class="text-2xl">Morfologia</h2>
      <p>
        {% if !analysis.prefix.is_empty() %}<span class="text-[#704214]">{{ analysis.prefix }}</span> + {% endif %}
        <strong class="text-[#8b0000]">{{ analysis.root }}</strong>
        {% if !analysis.suffix.is_empty() %} + <span class="text-[#704214]">{{ analysis.suffix }}</span>{% endif %}
      </p>
      <p>{{ analysis.morphology_explanation }}</p>
    </div>
    {% endif %}
    {% if !analysis.related.is_empty() %}
    <div>
      <h2 class="text-2xl">Palavras relacionadas</h2>
      <ul class="list-disc pl-6">
        {% for related in analysis.related %}
        <li><strong>{{ related.word }}</strong>{% if !related.relationship.is_empty() %} ({{ related.relationship }}){% endif %} {{ related.explanation }}</li>
        {% endfor %}
      </ul>
    </div>
    {% endif %}
    {% if let Some(history) = analysis.historical_html %}
    <div id="historical-context">
      <h2 class="text-2xl">Contexto histórico</h2>
      {{ history|safe }}
    </div>
    {% endif %}
    {% if !analysis.curiosities.is_empty() %}
    <div>
      <h2 class="text-2xl">Curiosidades</h2>
      <ul class="list-disc pl-6">
        {% for curiosity in analysis.curiosities %}<li>{{ curiosity }}</li>{% endfor %}
      </ul>
    </div>
    {% endif %}
  </article>
  {% endif %}
  {% if let Some(detail) = error %}
  <div id="analysis-error" class="p-4 border border-[#8b0000]/40 rounded bg-[#efe3c6]">
    <p class="text-[#8b0000]">{{ failure_message }}</p>
    <p class="text-xs text-[#704214]">{{ detail }}</p>
  </div>
  {% endif %}
  <form method="post" action="/app/challenge" class="text-center">
    <button type="submit" class="px-6 py-2 bg-[#8b0000] text-[#f4ecd8] rounded">Iniciar desafio</button>
  </form>
</section>"#,
    ext = "html"
)]
struct MorphologyTemplate {
    word: String,
    image: ImageView,
    analysis: Option<AnalysisView>,
    error: Option<String>,
    failure_message: &'static str,
}

#[derive(Template)]
#[template(
    source = r#"<section id="challenges" class="space-y-6">
  <h1 class="text-3xl text-center">Desafios</h1>
  {% for challenge in challenges %}
  <div class="challenge p-6 bg-[#efe3c6] rounded shadow space-y-3">
    <p class="text-xs text-[#704214]">{{ challenge.word }}</p>
    <p>{{ challenge.question }}</p>
    <ul class="flex gap-4">
      {% for option in challenge.options %}<li class="px-3 py-1 border border-[#8b0000]/30 rounded">{{ option }}</li>{% endfor %}
    </ul>
    <details><summary class="cursor-pointer text-[#8b0000]">Ver resposta</summary><p>{{ challenge.answer }}</p></details>
  </div>
  {% endfor %}
</section>"#,
    ext = "html"
)]
struct ChallengesTemplate {
    challenges: Vec<ChallengeCard>,
}

#[derive(Template)]
#[template(
    source = r#"<section id="profile" class="space-y-4 max-w-xl mx-auto">
  <h1 class="text-3xl text-center">Perfil</h1>
  <p>Sessão: {% if logged_in %}conectada{% else %}desconectada{% endif %}</p>
  <p>Última palavra: {{ selected_word }}</p>
  <p>Palavras exploradas: {{ explored.len() }}</p>
  {% if !explored.is_empty() %}
  <ul class="list-disc pl-6">
    {% for word in explored %}<li>{{ word }}</li>{% endfor %}
  </ul>
  {% endif %}
</section>"#,
    ext = "html"
)]
struct ProfileTemplate {
    logged_in: bool,
    selected_word: String,
    explored: Vec<String>,
}

#[derive(Template)]
#[template(
    source = r#"<section id="tree" class="space-y-6 text-center">
  <h1 class="text-3xl">{{ word }}</h1>
  {% if !origin.is_empty() %}<p class="italic text-[#704214]">{{ origin }}</p>{% endif %}
  {% if roots.is_empty() %}
  <p>A árvore etimológica está disponível para as palavras em destaque.</p>
  {% else %}
  <div class="flex flex-wrap justify-center gap-6">
    {% for root in roots %}
    <div class="root p-4 bg-[#efe3c6] rounded shadow">
      <p class="text-2xl">{{ root.greek }}</p>
      <p class="italic">{{ root.transliteration }} · {{ root.gloss }}</p>
      {% if !root.siblings.is_empty() %}
      <p class="text-xs text-[#704214]">Também em: {{ root.siblings.join(", ") }}</p>
      {% endif %}
    </div>
    {% endfor %}
  </div>
  {% endif %}
</section>"#,
    ext = "html"
)]
struct TreeTemplate {
    word: String,
    origin: &'static str,
    roots: Vec<RootView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FallbackReason;
    use crate::service::fakes::{FakePhotos, FixedImage, PhotoBehavior, ScriptedText};
    use crate::config::RetryPolicy;
    use crate::upstream::testing;
    use std::time::Duration;
    use axum::{body, body::Body, http::Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_router(service: EtymologyService) -> Router {
        let credentials = CredentialStatus {
            text_generation: false,
            image_generation: false,
            stock_photos: false,
        };
        build_router(Arc::new(AppState::new(service, credentials)))
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn text_body(response: Response) -> String {
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = test_router(EtymologyService::default())
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn config_status_exposes_only_booleans() {
        let response = test_router(EtymologyService::default())
            .oneshot(Request::get("/api/config-status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let payload = json_body(response).await;
        assert_eq!(payload["textGeneration"], false);
        assert_eq!(payload["stockPhotos"], false);
    }

    #[tokio::test]
    async fn etymology_without_word_is_bad_request() {
        let response = test_router(EtymologyService::default())
            .oneshot(json_post("/api/etymology", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn etymology_with_malformed_body_is_bad_request() {
        let response = test_router(EtymologyService::default())
            .oneshot(json_post("/api/etymology", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn etymology_without_credential_is_server_error() {
        let response = test_router(EtymologyService::default())
            .oneshot(json_post("/api/etymology", r#"{"word":"Filosofia"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let payload = json_body(response).await;
        assert!(payload["error"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn etymology_returns_data_and_raw_response() {
        let raw = r#"```json
{"word":"Filosofia","etymology":{"origin":"grego"},"relatedWords":[{"word":"filósofo"}]}
```"#;
        let service = EtymologyService::default()
            .with_text_generator(ScriptedText::new(vec![Ok(raw.to_string())]));
        let response = test_router(service)
            .oneshot(json_post("/api/etymology", r#"{"word":"Filosofia"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["success"], true);
        assert_eq!(payload["rawResponse"], raw);
        assert_eq!(payload["data"]["word"], "Filosofia");
        assert_eq!(payload["data"]["etymology"]["origin"], "grego");
        assert_eq!(payload["data"]["relatedWords"][0]["word"], "filósofo");
    }

    #[tokio::test]
    async fn etymology_upstream_failure_carries_details() {
        let service = EtymologyService::default()
            .with_retry_policy(crate::config::RetryPolicy::none())
            .with_text_generator(ScriptedText::new(vec![Err(ServiceError::UpstreamFailure {
                service: "Gemini",
                status: Some(503),
                message: "overloaded".into(),
            })]));
        let response = test_router(service)
            .oneshot(json_post("/api/etymology", r#"{"word":"Filosofia"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let payload = json_body(response).await;
        assert!(payload["details"].as_str().unwrap().contains("overloaded"));
    }

    #[tokio::test]
    async fn generate_image_maps_error_kinds_to_statuses() {
        let cases = [
            (
                ServiceError::RateLimited { service: "OpenAI" },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ServiceError::ContentRejected {
                    service: "OpenAI",
                    message: "unsafe".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::UpstreamEmptyResult { service: "OpenAI" },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::UpstreamFailure {
                    service: "OpenAI",
                    status: Some(401),
                    message: "bad key".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let service =
                EtymologyService::default().with_image_generator(Arc::new(FixedImage(Err(err))));
            let response = test_router(service)
                .oneshot(json_post("/api/generate-image", r#"{"word":"Nostalgia"}"#))
                .await
                .unwrap();
            assert_eq!(response.status(), status);
        }
    }

    /// A stand-in for all three APIs that answers every call with `status`.
    async fn upstreams_answering(status: StatusCode, body: Value) -> String {
        let reply = move || {
            let body = body.clone();
            async move { (status, Json(body)) }
        };
        let router = Router::new()
            .route("/v1beta/models/:model", post(reply.clone()))
            .route("/v1/images/generations", post(reply.clone()))
            .route("/search/photos", get(reply));
        testing::spawn(router).await
    }

    fn live_service(base: &str) -> EtymologyService {
        let config = ServiceConfig {
            text_api_key: Some("text-key".into()),
            image_api_key: Some("image-key".into()),
            stock_photo_key: Some("photo-key".into()),
            gemini_base_url: base.to_string(),
            openai_base_url: base.to_string(),
            unsplash_base_url: base.to_string(),
            generation_timeout: Duration::from_secs(5),
            search_timeout: Duration::from_secs(5),
            retry: RetryPolicy::none(),
            ..ServiceConfig::default()
        };
        EtymologyService::from_config(&config, reqwest::Client::new())
    }

    fn api_error(message: &str) -> Value {
        serde_json::json!({"error": {"message": message}})
    }

    #[tokio::test]
    async fn etymology_reports_a_rejected_key_as_a_server_error() {
        let base = upstreams_answering(
            StatusCode::BAD_REQUEST,
            api_error("API key not valid. Please pass a valid API key."),
        )
        .await;
        let response = test_router(live_service(&base))
            .oneshot(json_post("/api/etymology", r#"{"word":"Filosofia"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let payload = json_body(response).await;
        assert!(payload["details"].as_str().unwrap().contains("API key not valid"));
    }

    #[tokio::test]
    async fn etymology_passes_rate_limits_through() {
        let base = upstreams_answering(StatusCode::TOO_MANY_REQUESTS, api_error("quota")).await;
        let response = test_router(live_service(&base))
            .oneshot(json_post("/api/etymology", r#"{"word":"Filosofia"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn generate_image_maps_upstream_statuses() {
        let cases = [
            (StatusCode::BAD_REQUEST, StatusCode::BAD_REQUEST),
            (StatusCode::TOO_MANY_REQUESTS, StatusCode::TOO_MANY_REQUESTS),
            (StatusCode::INTERNAL_SERVER_ERROR, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (upstream, expected) in cases {
            let base = upstreams_answering(
                upstream,
                api_error("Your request was rejected by the safety system."),
            )
            .await;
            let response = test_router(live_service(&base))
                .oneshot(json_post("/api/generate-image", r#"{"word":"Nostalgia"}"#))
                .await
                .unwrap();
            assert_eq!(response.status(), expected, "upstream answered {upstream}");
        }
    }

    #[tokio::test]
    async fn image_search_falls_back_when_the_photo_api_fails() {
        let base = upstreams_answering(StatusCode::INTERNAL_SERVER_ERROR, api_error("down")).await;
        let response = test_router(live_service(&base))
            .oneshot(json_post("/api/image-search", r#"{"word":"Filosofia"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["usingFallback"], true);
        assert_eq!(payload["reason"], "upstream_error");
        assert_eq!(payload["imageUrl"], fallback::image_url_for("Filosofia"));
    }

    #[tokio::test]
    async fn generate_image_returns_url_and_prompt() {
        let service = EtymologyService::default()
            .with_image_generator(Arc::new(FixedImage(Ok("https://img/n.png".into()))));
        let response = test_router(service)
            .oneshot(json_post(
                "/api/generate-image",
                r#"{"word":"Nostalgia","etymology":"nóstos + álgos"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["success"], true);
        assert_eq!(payload["imageUrl"], "https://img/n.png");
        assert!(payload["prompt"].as_str().unwrap().contains("nóstos + álgos"));
    }

    #[tokio::test]
    async fn image_search_without_input_returns_default_image() {
        let response = test_router(EtymologyService::default())
            .oneshot(json_post("/api/image-search", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["success"], true);
        assert_eq!(payload["usingFallback"], true);
        assert_eq!(payload["imageUrl"], fallback::DEFAULT_IMAGE_URL);
    }

    #[tokio::test]
    async fn image_search_without_key_serves_curated_fallback() {
        let response = test_router(EtymologyService::default())
            .oneshot(json_post("/api/image-search", r#"{"word":"Filosofia"}"#))
            .await
            .unwrap();
        let payload = json_body(response).await;
        assert_eq!(payload["usingFallback"], true);
        assert_eq!(payload["imageUrl"], fallback::image_url_for("Filosofia"));
        assert_eq!(payload["reason"], "no_api_key");
    }

    #[tokio::test]
    async fn image_search_survives_malformed_bodies() {
        let response = test_router(EtymologyService::default())
            .oneshot(json_post("/api/image-search", "word=Filosofia"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["success"], true);
        assert_eq!(payload["imageUrl"], fallback::DEFAULT_IMAGE_URL);
    }

    #[tokio::test]
    async fn image_search_survives_a_panicking_resolver() {
        let service = EtymologyService::default()
            .with_photo_search(FakePhotos::new(PhotoBehavior::Panic));
        let response = test_router(service)
            .oneshot(json_post("/api/image-search", r#"{"word":"Filosofia"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["usingFallback"], true);
        assert_eq!(payload["imageUrl"], fallback::DEFAULT_IMAGE_URL);
        assert_eq!(
            serde_json::to_value(FallbackReason::InternalError).unwrap(),
            payload["reason"]
        );
    }

    #[tokio::test]
    async fn image_search_live_result_carries_attribution() {
        let service = EtymologyService::default().with_photo_search(FakePhotos::new(
            PhotoBehavior::Results(vec![crate::service::fakes::photo(7)]),
        ));
        let response = test_router(service)
            .oneshot(json_post("/api/image-search", r#"{"query":"scrolls"}"#))
            .await
            .unwrap();
        let payload = json_body(response).await;
        assert_eq!(payload["usingFallback"], false);
        assert_eq!(payload["attribution"]["username"], "user7");
        assert_eq!(payload["thumbnailUrl"], "https://photos.example/7/small");
        assert!(payload.get("reason").is_none());
    }

    fn with_cookie(builder: axum::http::request::Builder, cookie: &str) -> axum::http::request::Builder {
        builder.header(header::COOKIE, cookie)
    }

    fn session_cookie(response: &Response) -> String {
        let value = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("session cookie issued")
            .to_str()
            .unwrap();
        value.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn login_then_word_selection_renders_morphology() {
        let service = EtymologyService::default()
            .with_text_generator(ScriptedText::new(vec![Ok("A palavra vem do grego.".into())]));
        let router = test_router(service);

        let response = router
            .clone()
            .oneshot(Request::get("/app").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let cookie = session_cookie(&response);
        let html = text_body(response).await;
        assert!(html.contains("id=\"login\""));
        assert!(!html.contains("<nav"));

        let response = router
            .clone()
            .oneshot(
                with_cookie(Request::post("/app/login"), &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let response = router
            .clone()
            .oneshot(with_cookie(Request::get("/app"), &cookie).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let html = text_body(response).await;
        assert!(html.contains("id=\"main\""));
        assert!(html.contains("Nostalgia"));
        assert!(html.contains("<nav"));

        let response = router
            .clone()
            .oneshot(
                with_cookie(Request::post("/app/select"), &cookie)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("word=Nostalgia"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let response = router
            .clone()
            .oneshot(with_cookie(Request::get("/app"), &cookie).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let html = text_body(response).await;
        assert!(html.contains("id=\"morphology\""));
        assert!(html.contains("A palavra vem do grego."));
        assert!(html.contains("Imagem relacionada a Nostalgia"));
    }

    #[tokio::test]
    async fn morphology_shows_retry_message_when_analysis_fails() {
        let router = test_router(EtymologyService::default());
        let response = router
            .clone()
            .oneshot(Request::get("/app").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let cookie = session_cookie(&response);
        for request in [
            with_cookie(Request::post("/app/login"), &cookie).body(Body::empty()).unwrap(),
            with_cookie(Request::post("/app/select"), &cookie)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("word=Saudade"))
                .unwrap(),
        ] {
            router.clone().oneshot(request).await.unwrap();
        }
        let response = router
            .oneshot(with_cookie(Request::get("/app"), &cookie).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let html = text_body(response).await;
        assert!(html.contains("id=\"analysis-error\""));
        assert!(html.contains(ANALYSIS_FAILED));
    }

    #[tokio::test]
    async fn navigation_before_login_stays_on_login() {
        let router = test_router(EtymologyService::default());
        let response = router
            .clone()
            .oneshot(Request::get("/app/go/profile").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = session_cookie(&response);
        let response = router
            .oneshot(with_cookie(Request::get("/app"), &cookie).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(text_body(response).await.contains("id=\"login\""));
    }

    #[test]
    fn challenges_put_the_selected_word_first() {
        let cards = build_challenges(Some("nostalgia"));
        assert_eq!(cards.len(), FEATURED_WORDS.len());
        assert_eq!(cards[0].word, "Nostalgia");
        for card in &cards {
            assert!(card.options.contains(&card.answer));
            assert_eq!(card.options.len(), 3);
        }
    }

    #[test]
    fn tree_links_words_sharing_a_root() {
        let tree = tree_view("Psicologia");
        let logia = tree
            .roots
            .iter()
            .find(|root| root.transliteration == "logía")
            .expect("logía root");
        assert_eq!(logia.siblings, vec!["Tecnologia"]);
        assert!(tree_view("Saudade").roots.is_empty());
    }

    #[test]
    fn markdown_rendering_escapes_raw_html() {
        let html = render_markdown_str("**grego** <script>alert(1)</script>").expect("rendered");
        assert!(html.contains("<strong>grego</strong>"));
        assert!(!html.contains("<script>"));
        assert!(render_markdown_str("   ").is_none());
    }

    #[test]
    fn error_page_escapes_message() {
        let page = render_error_page("<b>boom</b>");
        assert!(page.contains("&lt;b&gt;boom&lt;/b&gt;"));
    }
}
