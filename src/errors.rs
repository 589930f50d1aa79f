//! # Definição de Erros do Domínio
//!
//! Este módulo centraliza as falhas possíveis em cada etapa do job:
//! extração (API), transformação (Processor), carga (Storage) e configuração.
//!
//! # Error Handling Strategy
//! - **Tipagem:** Enums para tratamento exaustivo.
//! - **Extensibilidade:** Marcados como `non_exhaustive` para permitir evolução sem quebra de contrato.
//! - **Fail-Soft:** Erros de API, Processor e Storage afetam apenas o endpoint corrente;
//!   somente `ConfigError` aborta a execução.

use thiserror::Error;

/// Erros específicos da camada de API/Rede.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Falha na conexão, DNS, timeout ou handshake TLS (após esgotar as tentativas).
    #[error("falha de rede ao acessar {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// O servidor respondeu, mas com status HTTP de erro.
    #[error("status HTTP {status} ao acessar {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
        /// Trecho inicial do corpo da resposta, para diagnóstico.
        body: String,
    },

    /// Rate limit persistente mesmo após o cooldown.
    #[error("rate limit persistente em {url} após {attempts} tentativas")]
    RateLimited { url: String, attempts: u32 },

    /// Conexão interrompida durante a leitura do corpo.
    #[error("falha ao ler o corpo de {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// O corpo da resposta não é um JSON válido.
    #[error("JSON inválido na resposta de {url}: {source}")]
    InvalidJson {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// URL base + caminho não formam uma URL válida.
    #[error("URL inválida '{0}'")]
    InvalidUrl(String),
}

/// Falhas da etapa de transformação (JSON -> DataFrame -> Parquet).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProcessorError {
    /// String recebida não pôde ser decodificada como JSON.
    #[error("JSON malformado ({kind}) próximo de '{preview}': {source}")]
    MalformedJson {
        /// Início da string recebida.
        preview: String,
        /// Tipo do dado recebido.
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Erros originados na engine (inferência de tipos, escrita Parquet).
    #[error("[Polars] {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Encapsula `serde_json::Error` na re-serialização dos registros.
    #[error("[JSON] {0}")]
    Json(#[from] serde_json::Error),

    /// Formato dos dados incompatível com uma tabela (ex: lista de escalares).
    #[error("[Schema] {0}")]
    Schema(String),
}

/// Falhas ao gravar ou enviar artefatos.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Falhas no sistema de arquivos (permissão, disco cheio, arquivo inexistente).
    #[error("[I/O] {0}")]
    Io(#[from] std::io::Error),

    /// Falha reportada pelo S3 no envio do objeto.
    #[error("falha ao enviar s3://{bucket}/{key}: {message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },

    /// Padrão de limpeza inválido.
    #[error("padrão glob inválido: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Falhas de configuração. Fatais: abortam o job antes de qualquer requisição.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("falha ao ler '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("erro no TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Violação de regra de integridade detectada na carga.
    #[error("configuração inválida: {0}")]
    Invalid(String),

    /// Variável de ambiente obrigatória ausente.
    #[error("variável de ambiente {0} não definida")]
    MissingEnv(&'static str),
}

/// Falha de uma etapa do pipeline (um endpoint). Nunca interrompe os demais.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("[API] {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
