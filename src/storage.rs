//! Carga dos artefatos: envio ao S3 (ou diretório local no dry-run),
//! gravação dos arquivos de staging e limpeza ao final da execução.

use crate::errors::StorageError;
use crate::models::AwsCredentials;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{info, warn};

/// Destino dos artefatos serializados.
pub trait ObjectStore {
    /// Grava `body` sob `key` e devolve a localização final (ex: s3://bucket/key).
    fn put(&self, key: &str, body: Vec<u8>) -> Result<String, StorageError>;
}

/// Envio para um bucket S3.
///
/// O SDK é assíncrono; o runtime próprio (current-thread) só é usado em
/// `block_on`, mantendo o restante do job síncrono.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    runtime: Runtime,
}

impl S3Store {
    /// Cria o cliente S3 autenticado com as credenciais informadas.
    pub fn new(credentials: &AwsCredentials, bucket: &str) -> Result<Self, StorageError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let provider = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            None,
            None,
            "environment",
        );

        let sdk_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(credentials.region.clone()))
                .credentials_provider(provider)
                .load(),
        );

        Ok(Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            bucket: bucket.to_string(),
            runtime,
        })
    }
}

impl ObjectStore for S3Store {
    fn put(&self, key: &str, body: Vec<u8>) -> Result<String, StorageError> {
        let size = body.len();

        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .body(ByteStream::from(body))
                    .content_type("application/octet-stream")
                    .send(),
            )
            .map_err(|e| StorageError::Upload {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let location = format!("s3://{}/{}", self.bucket, key);
        info!(%location, bytes = size, "Arquivo salvo com sucesso");
        Ok(location)
    }
}

/// Grava os objetos em um diretório local, preservando a estrutura das chaves.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectStore for LocalStore {
    fn put(&self, key: &str, body: Vec<u8>) -> Result<String, StorageError> {
        let path = self.root.join(key.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &body)?;

        info!(path = %path.display(), bytes = body.len(), "Arquivo salvo localmente");
        Ok(path.display().to_string())
    }
}

/// Grava o artefato no diretório de staging antes do envio.
pub fn write_staging(dir: &Path, file_name: &str, body: &[u8]) -> Result<PathBuf, StorageError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    fs::write(&path, body)?;
    Ok(path)
}

/// Remove do diretório os arquivos com as extensões informadas.
///
/// Falhas na remoção de um arquivo são registradas e não interrompem a limpeza.
/// Retorna quantos arquivos foram removidos.
pub fn clean_local_files(dir: &Path, extensions: &[String]) -> Result<usize, StorageError> {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut removed = 0;

    for ext in extensions {
        let pattern = format!("{}/*.{}", base, ext.trim_start_matches('.'));

        for entry in glob::glob(&pattern)? {
            let path = match entry {
                Ok(path) if path.is_file() => path,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Erro ao listar arquivos locais: {}", e);
                    continue;
                }
            };

            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(file = %path.display(), "Arquivo local deletado com sucesso");
                    removed += 1;
                }
                Err(e) => warn!(file = %path.display(), "Erro ao deletar arquivo local: {}", e),
            }
        }
    }

    info!(removed, "Limpeza de arquivos locais concluída");
    Ok(removed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Guarda os objetos em memória.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub objects: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl MemoryStore {
        pub(crate) fn keys(&self) -> Vec<String> {
            self.objects
                .lock()
                .unwrap()
                .iter()
                .map(|(key, _)| key.clone())
                .collect()
        }
    }

    impl ObjectStore for MemoryStore {
        fn put(&self, key: &str, body: Vec<u8>) -> Result<String, StorageError> {
            self.objects.lock().unwrap().push((key.to_string(), body));
            Ok(format!("memory://{}", key))
        }
    }

    #[test]
    fn local_store_creates_key_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let location = store
            .put("dota/stage/api/full-load/heroes.parquet", b"PAR1".to_vec())
            .unwrap();

        let expected = dir.path().join("dota/stage/api/full-load/heroes.parquet");
        assert_eq!(location, expected.display().to_string());
        assert_eq!(fs::read(expected).unwrap(), b"PAR1");
    }

    #[test]
    fn cleanup_removes_only_configured_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.parquet", "b.json", "c.csv", "keep.toml"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.parquet")).unwrap();

        let extensions = vec!["parquet".to_string(), ".json".to_string(), "csv".to_string()];
        let removed = clean_local_files(dir.path(), &extensions).unwrap();

        assert_eq!(removed, 3);
        assert!(dir.path().join("keep.toml").exists());
        assert!(dir.path().join("sub.parquet").is_dir());
        assert!(!dir.path().join("a.parquet").exists());
    }

    #[test]
    fn staging_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_staging(&dir.path().join("stage"), "teams.parquet", b"abc").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"abc");
    }
}
