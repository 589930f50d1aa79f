//! # Dota 2 Full-Load Extraction
//!
//! ## Visão Geral
//! Extração completa da API pública do OpenDota: partidas, heróis, constantes,
//! times, ligas, jogadores profissionais e cenários. Cada resposta é normalizada
//! em um DataFrame do Polars, serializada em Parquet e enviada ao S3 em
//! `dota/stage/api/full-load/`.
//!
//! ## Princípios de Engenharia
//! - **Resiliência (Fail-Soft)**: Erros individuais em endpoints não abortam o pipeline.
//! - **Fail-Fast na configuração**: Credenciais ou TOML inválidos abortam antes de qualquer requisição.
//! - **Observabilidade**: Logs estruturados (`RUST_LOG`) com tempos por etapa.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dota_full_load::api::OpenDotaClient;
use dota_full_load::models::{AwsCredentials, Config};
use dota_full_load::pipeline::Pipeline;
use dota_full_load::retry::RetryPolicy;
use dota_full_load::storage::{self, LocalStore, ObjectStore, S3Store};

#[derive(Parser, Debug)]
#[command(
    name = "dota-full-load",
    about = "Extrai dados da API OpenDota para Parquet no S3",
    version
)]
struct Cli {
    /// Arquivo TOML de configuração (padrão: dota_etl.toml, se existir)
    #[arg(short, long, env = "DOTA_ETL_CONFIG")]
    config: Option<PathBuf>,

    /// Grava os artefatos em --output-dir em vez de enviar ao S3
    #[arg(long)]
    dry_run: bool,

    /// Diretório de saída do dry-run
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Processa apenas os endpoints informados (pelo nome do artefato)
    #[arg(long = "only", value_name = "NOME")]
    only: Vec<String>,

    /// Não remove os arquivos locais ao final
    #[arg(long)]
    keep_files: bool,

    /// Sai com código 2 se algum endpoint falhar
    #[arg(long)]
    strict: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("Erro fatal na inicialização: {}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = Config::load(cli.config.as_deref())?;

    if !cli.only.is_empty() {
        if let Some(unknown) = cli
            .only
            .iter()
            .find(|name| !config.endpoints.iter().any(|e| &e.name == *name))
        {
            return Err(format!("endpoint desconhecido: '{}'", unknown).into());
        }
        config.endpoints.retain(|e| cli.only.contains(&e.name));
    }

    // Credenciais são lidas antes de qualquer requisição (fail-fast).
    let store: Box<dyn ObjectStore> = if cli.dry_run {
        info!(dir = %cli.output_dir.display(), "Dry-run: artefatos serão gravados localmente");
        Box::new(LocalStore::new(&cli.output_dir))
    } else {
        let credentials = AwsCredentials::from_env()?;
        info!(bucket = %config.storage.bucket, region = %credentials.region, "Cliente S3 configurado");
        Box::new(S3Store::new(&credentials, &config.storage.bucket)?)
    };

    let client = OpenDotaClient::new(&config.api, RetryPolicy::from(&config.retry))?;
    let pipeline = Pipeline::new(
        &client,
        store.as_ref(),
        &config.storage,
        NonZeroUsize::new(config.api.infer_schema_len),
    );

    let summary = pipeline.run(&config.endpoints);

    if !cli.keep_files {
        // Limpa mesmo se algum endpoint falhou
        if let Err(e) = storage::clean_local_files(
            &config.storage.staging_dir,
            &config.storage.cleanup_extensions,
        ) {
            warn!("Erro durante a limpeza de arquivos: {}", e);
        }
    }

    info!(
        "Extração concluída! Destino: {}",
        config.storage.object_key("")
    );

    if cli.strict && summary.failed() > 0 {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}
