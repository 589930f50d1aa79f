//! Metadata-Driven Configuration Models
//!
//! ## Visão Geral
//! Este módulo define as estruturas de configuração do job de extração.
//! O catálogo de endpoints (caminho remoto + formato da resposta + nome do artefato)
//! é um metadado: existe um catálogo padrão embutido, que pode ser substituído
//! por `[[endpoints]]` no arquivo TOML.
//!
//! ## Boas Práticas
//! - **Encapsulamento**: Validações de integridade ocorrem no momento da carga.
//! - **Sem globais**: Credenciais são lidas uma única vez para `AwsCredentials`
//!   e passadas explicitamente para quem precisa delas.

use crate::errors::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Arquivo procurado quando nenhum caminho é informado.
pub const DEFAULT_CONFIG_FILE: &str = "dota_etl.toml";

/// Configuração completa do job.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,

    /// Endpoints processados pelo fluxo principal, na ordem de execução.
    pub endpoints: Vec<EndpointDescriptor>,
}

/// Parâmetros do cliente HTTP.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    /// Ponto de entrada base da API (ex: https://api.opendota.com/api)
    pub base_url: String,

    /// Timeout total de cada requisição, em segundos.
    pub timeout_secs: u64,

    pub user_agent: String,

    /// Quantidade de registros usados na inferência do schema.
    pub infer_schema_len: usize,
}

/// Política de retentativas (ver `retry::RetryPolicy`).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    /// Total de tentativas para status transitórios e falhas de rede.
    pub max_attempts: u32,

    /// Fator do backoff exponencial: espera = fator * 2^(n-1) segundos.
    pub backoff_factor_secs: f64,

    /// Espera fixa após o primeiro HTTP 429.
    pub cooldown_secs: u64,

    /// Status HTTP considerados transitórios.
    pub retry_statuses: Vec<u16>,
}

/// Destino dos artefatos.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,

    /// Prefixo das chaves no bucket (ex: dota/stage/api/full-load).
    pub prefix: String,

    /// Diretório local onde os Parquet são gravados antes do envio.
    pub staging_dir: PathBuf,

    /// Extensões removidas do diretório local ao final da execução.
    pub cleanup_extensions: Vec<String>,
}

/// Formato da resposta de um endpoint.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeKind {
    /// Lista de objetos (heroes, teams, leagues...).
    Records,
    /// Objeto `{id: valor}` das constantes (lobby_type, game_mode, cluster).
    KeyValue,
    /// Lista de partidas com `radiant_team`/`dire_team`.
    Matches,
    /// JSON repassado sem tabulação.
    Opaque,
}

/// Par (caminho remoto, formato da resposta) + nome do artefato gerado.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// Nome do artefato, sem extensão (ex: "heroes" -> heroes.parquet).
    pub name: String,

    /// Caminho relativo à base_url (ex: "constants/lobby_type").
    pub path: String,

    pub shape: ShapeKind,

    /// Nome da coluna do id, obrigatório para `key-value`.
    #[serde(default)]
    pub id_field: Option<String>,
}

impl EndpointDescriptor {
    pub fn records(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            shape: ShapeKind::Records,
            id_field: None,
        }
    }

    pub fn key_value(name: &str, path: &str, id_field: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            shape: ShapeKind::KeyValue,
            id_field: Some(id_field.to_string()),
        }
    }

    pub fn matches(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            shape: ShapeKind::Matches,
            id_field: None,
        }
    }

    /// Nome padrão do arquivo Parquet deste endpoint.
    pub fn file_name(&self) -> String {
        format!("{}.parquet", self.name)
    }
}

/// Catálogo do fluxo principal, na ordem em que os endpoints são extraídos.
pub fn default_catalog() -> Vec<EndpointDescriptor> {
    vec![
        EndpointDescriptor::matches("matches", "publicMatches"),
        EndpointDescriptor::records("heroes", "heroes"),
        EndpointDescriptor::key_value("lobby_types", "constants/lobby_type", "lobby_id"),
        EndpointDescriptor::key_value("game_modes", "constants/game_mode", "mode_id"),
        EndpointDescriptor::key_value("clusters", "constants/cluster", "cluster_id"),
        EndpointDescriptor::records("teams", "teams"),
        EndpointDescriptor::records("leagues", "leagues"),
        EndpointDescriptor::records("pro_players", "proPlayers"),
        EndpointDescriptor::records("pro_matches", "proMatches"),
        EndpointDescriptor::records("item_timings", "scenarios/itemTimings"),
        EndpointDescriptor::records("lane_roles", "scenarios/laneRoles"),
        EndpointDescriptor::records("misc_scenarios", "scenarios/misc"),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
            endpoints: default_catalog(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.opendota.com/api".to_string(),
            timeout_secs: 30,
            user_agent: concat!("dota-full-load/", env!("CARGO_PKG_VERSION")).to_string(),
            infer_schema_len: 1000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor_secs: 1.0,
            cooldown_secs: 60,
            retry_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "scarstimeslake".to_string(),
            prefix: "dota/stage/api/full-load".to_string(),
            staging_dir: PathBuf::from("staging"),
            cleanup_extensions: vec!["parquet".into(), "json".into(), "csv".into()],
        }
    }
}

impl StorageConfig {
    /// Monta a chave do objeto sem barras duplicadas.
    pub fn object_key(&self, file_name: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", prefix, file_name.trim_start_matches('/'))
        }
    }
}

impl Config {
    /// Carrega a configuração.
    ///
    /// Com `Some(path)`, o arquivo precisa existir. Com `None`, procura
    /// `dota_etl.toml` no diretório atual e, se não houver, usa os padrões.
    ///
    /// # Erros
    /// Retorna `ConfigError::Io` se o arquivo informado não puder ser lido,
    /// `ConfigError::Toml` para sintaxe inválida e `ConfigError::Invalid`
    /// se alguma regra de integridade falhar.
    pub fn load(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match custom_path {
            Some(path) => Self::load_from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load_from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validação pós-carga (Fail-Fast).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.api.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api.base_url precisa ser http(s): '{}'",
                self.api.base_url
            )));
        }
        if self.api.infer_schema_len == 0 {
            return Err(ConfigError::Invalid(
                "api.infer_schema_len precisa ser maior que zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts precisa ser maior que zero".to_string(),
            ));
        }
        if !self.retry.backoff_factor_secs.is_finite() || self.retry.backoff_factor_secs < 0.0 {
            return Err(ConfigError::Invalid(
                "retry.backoff_factor_secs precisa ser um número não negativo".to_string(),
            ));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.bucket vazio".to_string()));
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::Invalid("nenhum endpoint configurado".to_string()));
        }

        let mut names = HashSet::new();
        for endpoint in &self.endpoints {
            if !names.insert(endpoint.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "endpoint duplicado: '{}'",
                    endpoint.name
                )));
            }
            if endpoint.path.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "'{}' sem path",
                    endpoint.name
                )));
            }
            if endpoint.shape == ShapeKind::KeyValue
                && endpoint.id_field.as_deref().is_none_or(str::is_empty)
            {
                return Err(ConfigError::Invalid(format!(
                    "'{}' é key-value e precisa de id_field",
                    endpoint.name
                )));
            }
        }
        Ok(())
    }
}

/// Credenciais AWS, lidas uma única vez na inicialização.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl AwsCredentials {
    pub const DEFAULT_REGION: &'static str = "us-east-1";

    /// Lê `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` e `AWS_REGION`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Mesmo que `from_env`, mas com uma fonte arbitrária de variáveis.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(key))
        };

        Ok(Self {
            access_key_id: required("AWS_ACCESS_KEY_ID")?,
            secret_access_key: required("AWS_SECRET_ACCESS_KEY")?,
            region: lookup("AWS_REGION")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| Self::DEFAULT_REGION.to_string()),
        })
    }
}

// Nunca expõe a chave secreta em logs.
impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("region", &self.region)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoints.len(), 12);
        assert_eq!(config.endpoints[0].path, "publicMatches");
        assert_eq!(config.retry.retry_statuses, vec![429, 500, 502, 503, 504]);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            bucket = "outro-bucket"

            [retry]
            cooldown_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.bucket, "outro-bucket");
        assert_eq!(config.storage.prefix, "dota/stage/api/full-load");
        assert_eq!(config.retry.cooldown_secs, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.endpoints, default_catalog());
    }

    #[test]
    fn endpoints_override_catalog() {
        let config = Config::from_toml_str(
            r#"
            [[endpoints]]
            name = "regions"
            path = "constants/region"
            shape = "key-value"
            id_field = "region_id"
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(
            config.endpoints,
            vec![EndpointDescriptor::key_value(
                "regions",
                "constants/region",
                "region_id"
            )]
        );
    }

    #[test]
    fn key_value_without_id_field_is_rejected() {
        let config = Config::from_toml_str(
            r#"
            [[endpoints]]
            name = "regions"
            path = "constants/region"
            shape = "key-value"
            "#,
        )
        .unwrap();

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_bucket_is_rejected() {
        let mut config = Config::default();
        config.storage.bucket = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn duplicated_endpoint_is_rejected() {
        let mut config = Config::default();
        config
            .endpoints
            .push(EndpointDescriptor::records("heroes", "heroes"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_explicit_file_is_fatal() {
        let result = Config::load(Some(Path::new("/nao/existe/dota_etl.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn object_key_joins_without_duplicated_slashes() {
        let mut storage = StorageConfig::default();
        assert_eq!(
            storage.object_key("heroes.parquet"),
            "dota/stage/api/full-load/heroes.parquet"
        );

        storage.prefix = "/dota/stage/".to_string();
        assert_eq!(storage.object_key("/x.parquet"), "dota/stage/x.parquet");

        storage.prefix = String::new();
        assert_eq!(storage.object_key("x.parquet"), "x.parquet");
    }

    #[test]
    fn credentials_require_keys() {
        let env: HashMap<&str, &str> = HashMap::from([("AWS_ACCESS_KEY_ID", "AKIA")]);
        let result = AwsCredentials::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::MissingEnv("AWS_SECRET_ACCESS_KEY"))
        ));
    }

    #[test]
    fn credentials_default_region_and_redacted_debug() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("AWS_ACCESS_KEY_ID", "AKIA"),
            ("AWS_SECRET_ACCESS_KEY", "segredo"),
        ]);
        let creds = AwsCredentials::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(creds.region, "us-east-1");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("segredo"));
    }
}
