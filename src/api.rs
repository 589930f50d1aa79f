//! # Cliente da API OpenDota
//!
//! Todas as chamadas passam por `OpenDotaClient::fetch`, que aplica a política de
//! retentativas (`retry::RetryPolicy`) e traduz cada resposta em um `FetchOutcome`.
//! Falhas esperadas (404, rate limit persistente, JSON inválido, rede) nunca
//! escapam como erro: viram um resultado explícito para o orquestrador decidir.

use crate::errors::ApiError;
use crate::models::ApiConfig;
use crate::retry::{RetryDecision, RetryPolicy, RetryState, Sleeper, ThreadSleeper};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::io;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Tamanho máximo do trecho de corpo anexado aos erros HTTP.
const BODY_PREVIEW_LEN: usize = 200;

/// Resultado de uma chamada à API.
#[derive(Debug)]
pub enum FetchOutcome {
    /// JSON decodificado (objeto ou lista).
    Data(Value),
    /// Sucesso sem conteúdo (204, corpo vazio ou `null`).
    Empty,
    /// HTTP 404.
    NotFound,
    /// Falha não recuperável, após esgotar as tentativas quando aplicável.
    Failed(ApiError),
}

impl FetchOutcome {
    /// Colapsa o resultado em "dados ou ausência".
    pub fn into_data(self) -> Option<Value> {
        match self {
            FetchOutcome::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, FetchOutcome::Data(_))
    }
}

/// Cliente HTTP bloqueante com retentativas, reutilizado por toda a execução.
pub struct OpenDotaClient {
    client: Client,
    base_url: String,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
    show_progress: bool,
}

impl OpenDotaClient {
    /// Cria o cliente com a sessão HTTP (keep-alive) e a política informada.
    ///
    /// # Errors
    ///
    /// Retorna `ApiError::InvalidUrl` se a `base_url` não for absoluta, ou
    /// `ApiError::Network` se o backend TLS não puder ser inicializado.
    pub fn new(config: &ApiConfig, policy: RetryPolicy) -> Result<Self, ApiError> {
        Url::parse(&config.base_url).map_err(|_| ApiError::InvalidUrl(config.base_url.clone()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|source| ApiError::Network {
                url: config.base_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            policy,
            sleeper: Box::new(ThreadSleeper),
            show_progress: true,
        })
    }

    /// Substitui a forma de esperar entre tentativas.
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Concatenação segura de URLs sem barras duplicadas, com query opcional.
    fn build_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let parsed = if query.is_empty() {
            Url::parse(&joined)
        } else {
            Url::parse_with_params(&joined, query)
        };
        parsed.map_err(|_| ApiError::InvalidUrl(joined))
    }

    /// GET em `base_url/path` com retentativas.
    ///
    /// Status em `retry_statuses` e falhas de rede são repetidos com backoff
    /// exponencial; o primeiro 429 aguarda o cooldown fixo e ganha uma tentativa
    /// extra. O laço é limitado pelo `RetryState`.
    pub fn fetch(&self, path: &str, query: &[(&str, &str)]) -> FetchOutcome {
        let url = match self.build_url(path, query) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::Failed(e),
        };

        let mut state = RetryState::new(&self.policy);

        loop {
            let attempt = state.begin_attempt();
            debug!(%url, attempt, "GET");

            let response = match self.client.get(url.clone()).send() {
                Ok(response) => response,
                Err(source) => match state.after_failure(None) {
                    RetryDecision::GiveUp => {
                        error!(%url, attempt, "Erro ao fazer requisição: {}", source);
                        return FetchOutcome::Failed(ApiError::Network {
                            url: url.to_string(),
                            source,
                        });
                    }
                    decision => {
                        warn!(%url, attempt, "Falha de rede ({}), nova tentativa", source);
                        self.wait(decision);
                        continue;
                    }
                },
            };

            let status = response.status();

            if status.is_success() {
                return self.decode(&url, response);
            }

            if status == StatusCode::NOT_FOUND {
                warn!(%url, "Endpoint não encontrado");
                return FetchOutcome::NotFound;
            }

            if self.policy.is_retryable(status) {
                match state.after_failure(Some(status)) {
                    RetryDecision::GiveUp if status == StatusCode::TOO_MANY_REQUESTS => {
                        error!(%url, attempts = state.attempts(), "Rate limit persistente");
                        return FetchOutcome::Failed(ApiError::RateLimited {
                            url: url.to_string(),
                            attempts: state.attempts(),
                        });
                    }
                    RetryDecision::GiveUp => {}
                    decision => {
                        if let RetryDecision::Cooldown(wait) = decision {
                            warn!(%url, "Rate limit atingido. Aguardando {} segundos...", wait.as_secs());
                        } else {
                            warn!(%url, attempt, %status, "Status transitório, nova tentativa");
                        }
                        self.wait(decision);
                        continue;
                    }
                }
            }

            let body = preview(&response.text().unwrap_or_default(), BODY_PREVIEW_LEN);
            error!(%url, %status, body = %body, "Erro HTTP");
            return FetchOutcome::Failed(ApiError::HttpStatus {
                status,
                url: url.to_string(),
                body,
            });
        }
    }

    fn wait(&self, decision: RetryDecision) {
        match decision {
            RetryDecision::Backoff(duration) | RetryDecision::Cooldown(duration) => {
                self.sleeper.sleep(duration)
            }
            RetryDecision::GiveUp => {}
        }
    }

    /// Lê o corpo (com barra de progresso) e decodifica o JSON.
    fn decode(&self, url: &Url, mut response: Response) -> FetchOutcome {
        if response.status() == StatusCode::NO_CONTENT {
            warn!(%url, "Aviso: Resposta vazia da API");
            return FetchOutcome::Empty;
        }

        let pb = self.progress_bar(response.content_length().unwrap_or(0), url.path());
        let mut body = Vec::new();
        let mut source = pb.wrap_read(&mut response);
        if let Err(source) = io::copy(&mut source, &mut body) {
            pb.abandon();
            error!(%url, "Erro durante a leitura da resposta: {}", source);
            return FetchOutcome::Failed(ApiError::Body {
                url: url.to_string(),
                source,
            });
        }
        pb.finish_and_clear();

        if body.iter().all(u8::is_ascii_whitespace) {
            warn!(%url, "Aviso: Resposta vazia da API");
            return FetchOutcome::Empty;
        }

        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Null) => {
                warn!(%url, "Aviso: Resposta nula da API");
                FetchOutcome::Empty
            }
            Ok(value) => {
                info!(%url, bytes = body.len(), "Resposta recebida");
                FetchOutcome::Data(value)
            }
            Err(source) => {
                error!(%url, "Erro ao decodificar JSON da resposta: {}", source);
                FetchOutcome::Failed(ApiError::InvalidJson {
                    url: url.to_string(),
                    source,
                })
            }
        }
    }

    fn progress_bar(&self, total: u64, label: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(format!("Baixando {}", label));
        pb
    }

    // ---------------------------------------------------------------------
    // Fluxo principal
    // ---------------------------------------------------------------------

    /// Partidas públicas recentes.
    pub fn public_matches(&self) -> FetchOutcome {
        self.fetch("publicMatches", &[])
    }

    /// Lista de heróis com atributos básicos.
    pub fn heroes(&self) -> FetchOutcome {
        self.fetch("heroes", &[])
    }

    /// Constante de tipos de lobby (`id -> nome`).
    pub fn lobby_types(&self) -> FetchOutcome {
        self.fetch("constants/lobby_type", &[])
    }

    /// Constante de modos de jogo (`id -> nome`).
    pub fn game_modes(&self) -> FetchOutcome {
        self.fetch("constants/game_mode", &[])
    }

    /// Clusters (regiões de servidores).
    pub fn clusters(&self) -> FetchOutcome {
        self.fetch("constants/cluster", &[])
    }

    /// Times profissionais.
    pub fn teams(&self) -> FetchOutcome {
        self.fetch("teams", &[])
    }

    /// Ligas cadastradas.
    pub fn leagues(&self) -> FetchOutcome {
        self.fetch("leagues", &[])
    }

    /// Jogadores profissionais.
    pub fn pro_players(&self) -> FetchOutcome {
        self.fetch("proPlayers", &[])
    }

    /// Partidas profissionais recentes.
    pub fn pro_matches(&self) -> FetchOutcome {
        self.fetch("proMatches", &[])
    }

    /// Cenários de tempo de compra de itens.
    pub fn item_timings(&self) -> FetchOutcome {
        self.fetch("scenarios/itemTimings", &[])
    }

    /// Cenários de desempenho por rota.
    pub fn lane_roles(&self) -> FetchOutcome {
        self.fetch("scenarios/laneRoles", &[])
    }

    /// Cenários diversos.
    pub fn misc_scenarios(&self) -> FetchOutcome {
        self.fetch("scenarios/misc", &[])
    }

    // ---------------------------------------------------------------------
    // Detalhes (repasse do JSON, fora do fluxo principal)
    // ---------------------------------------------------------------------

    /// Detalhes completos de uma partida.
    pub fn match_details(&self, match_id: u64) -> FetchOutcome {
        self.fetch(&format!("matches/{}", match_id), &[])
    }

    /// Jogadores de uma partida.
    pub fn match_players(&self, match_id: u64) -> FetchOutcome {
        self.fetch(&format!("matches/{}/players", match_id), &[])
    }

    /// Linha do tempo de uma partida.
    pub fn match_timeline(&self, match_id: u64) -> FetchOutcome {
        self.fetch(&format!("matches/{}/timeline", match_id), &[])
    }

    /// Mensagens de chat de uma partida.
    pub fn match_chat(&self, match_id: u64) -> FetchOutcome {
        self.fetch(&format!("matches/{}/chat", match_id), &[])
    }

    /// Estatísticas agregadas de um herói.
    pub fn hero_stats(&self, hero_id: u32) -> FetchOutcome {
        self.fetch(&format!("heroes/{}/stats", hero_id), &[])
    }

    /// Distribuição de duração das partidas do herói.
    pub fn hero_durations(&self, hero_id: u32) -> FetchOutcome {
        self.fetch(&format!("heroes/{}/durations", hero_id), &[])
    }

    /// Jogadores com mais partidas de um herói.
    pub fn hero_players(&self, hero_id: u32) -> FetchOutcome {
        self.fetch(&format!("heroes/{}/players", hero_id), &[])
    }

    /// Ranking de jogadores de um herói.
    pub fn rankings(&self, hero_id: u32) -> FetchOutcome {
        let hero_id = hero_id.to_string();
        self.fetch("rankings", &[("hero_id", hero_id.as_str())])
    }

    /// Dados de uma liga.
    pub fn league_details(&self, league_id: u64) -> FetchOutcome {
        self.fetch(&format!("leagues/{}", league_id), &[])
    }

    /// Partidas de uma liga.
    pub fn league_matches(&self, league_id: u64) -> FetchOutcome {
        self.fetch(&format!("leagues/{}/matches", league_id), &[])
    }

    /// Dados de um time.
    pub fn team_details(&self, team_id: u64) -> FetchOutcome {
        self.fetch(&format!("teams/{}", team_id), &[])
    }

    /// Partidas de um time.
    pub fn team_matches(&self, team_id: u64) -> FetchOutcome {
        self.fetch(&format!("teams/{}/matches", team_id), &[])
    }

    /// Elenco (atual e antigo) de um time.
    pub fn team_players(&self, team_id: u64) -> FetchOutcome {
        self.fetch(&format!("teams/{}/players", team_id), &[])
    }

    /// Heróis mais jogados por um time.
    pub fn team_heroes(&self, team_id: u64) -> FetchOutcome {
        self.fetch(&format!("teams/{}/heroes", team_id), &[])
    }

    /// Consulta SQL livre no explorer da API.
    pub fn explorer(&self, sql: &str) -> FetchOutcome {
        self.fetch("explorer", &[("sql", sql)])
    }

    /// Tabelas e colunas disponíveis no explorer.
    pub fn explorer_schema(&self) -> FetchOutcome {
        self.fetch("explorer/schema", &[])
    }

    /// Distribuições de MMR e ranques.
    pub fn distributions(&self) -> FetchOutcome {
        self.fetch("distributions", &[])
    }

    /// Estado interno da API.
    pub fn status(&self) -> FetchOutcome {
        self.fetch("status", &[])
    }

    /// Verificação de saúde dos serviços da API.
    pub fn health(&self) -> FetchOutcome {
        self.fetch("health", &[])
    }

    /// Metadados do site.
    pub fn metadata(&self) -> FetchOutcome {
        self.fetch("metadata", &[])
    }

    /// Jogadores públicos.
    pub fn public_players(&self) -> FetchOutcome {
        self.fetch("public/players", &[])
    }

    /// Schema do banco da API.
    pub fn schema(&self) -> FetchOutcome {
        self.fetch("schema", &[])
    }

    /// Índice das constantes disponíveis.
    pub fn constants(&self) -> FetchOutcome {
        self.fetch("constants", &[])
    }
}

/// Corta `text` em `max` caracteres, respeitando UTF-8.
pub(crate) fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mockito::Matcher;
    use std::sync::{Arc, Mutex};

    /// Registra as esperas em vez de dormir.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSleeper(pub Arc<Mutex<Vec<Duration>>>);

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    impl RecordingSleeper {
        pub(crate) fn waits(&self) -> Vec<Duration> {
            self.0.lock().unwrap().clone()
        }
    }

    pub(crate) fn test_client(base_url: &str, sleeper: RecordingSleeper) -> OpenDotaClient {
        let config = ApiConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            ..ApiConfig::default()
        };
        OpenDotaClient::new(&config, RetryPolicy::default())
            .unwrap()
            .with_sleeper(Box::new(sleeper))
            .with_progress(false)
    }

    #[test]
    fn returns_json_payload() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/heroes")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": 1, "localized_name": "Anti-Mage"}]"#)
            .create();

        let client = test_client(&server.url(), RecordingSleeper::default());
        let value = client.heroes().into_data().unwrap();

        assert_eq!(value[0]["localized_name"], "Anti-Mage");
        mock.assert();
    }

    #[test]
    fn rate_limit_twice_then_success_waits_one_cooldown() {
        let mut server = mockito::Server::new();
        let limited = server
            .mock("GET", "/publicMatches")
            .with_status(429)
            .expect(2)
            .create();
        let ok = server
            .mock("GET", "/publicMatches")
            .with_status(200)
            .with_body(r#"[{"match_id": 42}]"#)
            .expect(1)
            .create();

        let sleeper = RecordingSleeper::default();
        let client = test_client(&server.url(), sleeper.clone());
        let value = client.public_matches().into_data().unwrap();

        assert_eq!(value[0]["match_id"], 42);
        let cooldowns = sleeper
            .waits()
            .iter()
            .filter(|wait| **wait == Duration::from_secs(60))
            .count();
        assert_eq!(cooldowns, 1);
        limited.assert();
        ok.assert();
    }

    #[test]
    fn persistent_rate_limit_gives_up() {
        let mut server = mockito::Server::new();
        let limited = server
            .mock("GET", "/teams")
            .with_status(429)
            .expect(4)
            .create();

        let sleeper = RecordingSleeper::default();
        let client = test_client(&server.url(), sleeper.clone());
        let outcome = client.teams();

        assert!(matches!(
            outcome,
            FetchOutcome::Failed(ApiError::RateLimited { attempts: 4, .. })
        ));
        assert_eq!(
            sleeper.waits(),
            vec![
                Duration::from_secs(60),
                Duration::from_secs(1),
                Duration::from_secs(2)
            ]
        );
        limited.assert();
    }

    #[test]
    fn server_errors_are_retried_with_backoff() {
        let mut server = mockito::Server::new();
        let unavailable = server
            .mock("GET", "/leagues")
            .with_status(503)
            .with_body("manutenção")
            .expect(3)
            .create();

        let sleeper = RecordingSleeper::default();
        let client = test_client(&server.url(), sleeper.clone());

        match client.leagues() {
            FetchOutcome::Failed(ApiError::HttpStatus { status, body, .. }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "manutenção");
            }
            other => panic!("resultado inesperado: {:?}", other),
        }
        assert_eq!(
            sleeper.waits(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        unavailable.assert();
    }

    #[test]
    fn server_error_then_success() {
        let mut server = mockito::Server::new();
        let failing = server
            .mock("GET", "/proPlayers")
            .with_status(502)
            .expect(1)
            .create();
        let ok = server
            .mock("GET", "/proPlayers")
            .with_status(200)
            .with_body(r#"[{"account_id": 1}]"#)
            .create();

        let sleeper = RecordingSleeper::default();
        let client = test_client(&server.url(), sleeper.clone());

        assert!(client.pro_players().is_data());
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(1)]);
        failing.assert();
        ok.assert();
    }

    #[test]
    fn not_found_is_not_an_error() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/matches/1")
            .with_status(404)
            .expect(1)
            .create();

        let sleeper = RecordingSleeper::default();
        let client = test_client(&server.url(), sleeper.clone());

        assert!(matches!(client.match_details(1), FetchOutcome::NotFound));
        assert!(sleeper.waits().is_empty());
        mock.assert();
    }

    #[test]
    fn other_client_errors_are_not_retried() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/heroes/7/stats")
            .with_status(400)
            .with_body("x".repeat(500))
            .expect(1)
            .create();

        let client = test_client(&server.url(), RecordingSleeper::default());

        match client.hero_stats(7) {
            FetchOutcome::Failed(ApiError::HttpStatus { status, body, .. }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body.len(), BODY_PREVIEW_LEN + 3);
            }
            other => panic!("resultado inesperado: {:?}", other),
        }
        mock.assert();
    }

    #[test]
    fn empty_body_is_empty_outcome() {
        let mut server = mockito::Server::new();
        let _status = server.mock("GET", "/status").with_status(200).create();
        let _health = server.mock("GET", "/health").with_status(204).create();

        let client = test_client(&server.url(), RecordingSleeper::default());

        assert!(matches!(client.status(), FetchOutcome::Empty));
        assert!(matches!(client.health(), FetchOutcome::Empty));
    }

    #[test]
    fn invalid_json_body_fails() {
        let mut server = mockito::Server::new();
        let _metadata = server
            .mock("GET", "/metadata")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create();

        let client = test_client(&server.url(), RecordingSleeper::default());

        assert!(matches!(
            client.metadata(),
            FetchOutcome::Failed(ApiError::InvalidJson { .. })
        ));
    }

    #[test]
    fn network_failure_is_retried_then_reported() {
        // Porta 1 não aceita conexões.
        let sleeper = RecordingSleeper::default();
        let client = test_client("http://127.0.0.1:1", sleeper.clone());

        assert!(matches!(
            client.distributions(),
            FetchOutcome::Failed(ApiError::Network { .. })
        ));
        assert_eq!(
            sleeper.waits(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn query_parameters_are_encoded() {
        let mut server = mockito::Server::new();
        let explorer = server
            .mock("GET", "/explorer")
            .match_query(Matcher::UrlEncoded(
                "sql".into(),
                "select count(*) from matches".into(),
            ))
            .with_status(200)
            .with_body(r#"{"rows": []}"#)
            .create();
        let rankings = server
            .mock("GET", "/rankings")
            .match_query(Matcher::UrlEncoded("hero_id".into(), "14".into()))
            .with_status(200)
            .with_body(r#"{"hero_id": 14, "rankings": []}"#)
            .create();

        let client = test_client(&server.url(), RecordingSleeper::default());

        assert!(client.explorer("select count(*) from matches").is_data());
        assert!(client.rankings(14).is_data());
        explorer.assert();
        rankings.assert();
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = test_client("https://api.opendota.com/api/", RecordingSleeper::default());
        let url = client.build_url("/constants/cluster", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.opendota.com/api/constants/cluster");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let config = ApiConfig {
            base_url: "não é url".to_string(),
            ..ApiConfig::default()
        };
        assert!(matches!(
            OpenDotaClient::new(&config, RetryPolicy::default()),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("ação", 2), "aç...");
        assert_eq!(preview("abc", 10), "abc");
    }
}
