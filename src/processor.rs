//! # JSON to Parquet Normalization Engine
//!
//! ## Engenharia de Dados
//! Este módulo converte as respostas da API em DataFrames do Polars e os
//! serializa em Parquet. Três formatos de entrada são aceitos: lista de objetos,
//! objeto único e string contendo JSON.
//!
//! O schema é a união das chaves dos registros inspecionados (limitados por
//! `infer_schema_len`); chaves ausentes em um registro viram nulos.

use chrono::{DateTime, Utc};
use chrono_tz::America::Sao_Paulo;
use polars::io::SerReader;
use polars::prelude::*;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::Cursor;
use std::num::NonZeroUsize;

use crate::api::preview;
use crate::errors::ProcessorError;
use crate::models::{EndpointDescriptor, ShapeKind};

const RADIANT_TEAM: &str = "radiant_team";
const DIRE_TEAM: &str = "dire_team";

/// Tamanho do trecho exibido quando a string JSON é inválida.
const PREVIEW_LEN: usize = 60;

/// Tabela pronta para serialização, com o nome do arquivo de destino.
#[derive(Debug)]
pub struct Artifact {
    pub file_name: String,
    /// Registros recebidos, antes da normalização.
    pub record_count: usize,
    pub frame: DataFrame,
}

/// Normaliza a resposta de um endpoint do catálogo.
///
/// Retorna `None` para endpoints `opaque`, que não são tabulados.
///
/// # Errors
///
/// Propaga `ProcessorError` para JSON malformado, formatos não tabuláveis
/// ou falhas do Polars.
pub fn build_artifact(
    endpoint: &EndpointDescriptor,
    data: Value,
    infer_schema_len: Option<NonZeroUsize>,
) -> Result<Option<Artifact>, ProcessorError> {
    let (file_name, records) = match endpoint.shape {
        ShapeKind::Opaque => return Ok(None),
        ShapeKind::Records => (endpoint.file_name(), records_from_value(data)?),
        ShapeKind::KeyValue => {
            let id_field = endpoint.id_field.as_deref().unwrap_or("id");
            (endpoint.file_name(), key_value_rows(data, id_field)?)
        }
        ShapeKind::Matches => {
            let mut records = records_from_value(data)?;
            expand_rosters(&mut records);

            let file_name = match first_start_time(&records) {
                Some(start_time) => matches_file_name(start_time)?,
                None => endpoint.file_name(),
            };
            (file_name, records)
        }
    };

    let record_count = records.len();
    let frame = frame_from_records(records, infer_schema_len)?;
    Ok(Some(Artifact {
        file_name,
        record_count,
        frame,
    }))
}

/// Cria um DataFrame a partir de um JSON (lista, objeto ou string JSON).
///
/// Lista vazia gera um DataFrame vazio (altura 0), nunca um erro.
pub fn to_dataframe(
    data: Value,
    infer_schema_len: Option<NonZeroUsize>,
) -> Result<DataFrame, ProcessorError> {
    frame_from_records(records_from_value(data)?, infer_schema_len)
}

/// Atalho para `to_dataframe` com texto JSON cru.
pub fn from_json_str(
    text: &str,
    infer_schema_len: Option<NonZeroUsize>,
) -> Result<DataFrame, ProcessorError> {
    to_dataframe(Value::String(text.to_string()), infer_schema_len)
}

/// Reduz a entrada a uma lista de objetos.
///
/// # Errors
///
/// * `MalformedJson` se a string não for JSON válido.
/// * `Schema` se o conteúdo não for objeto nem lista de objetos.
pub fn records_from_value(data: Value) -> Result<Vec<Value>, ProcessorError> {
    let data = match data {
        Value::String(text) => {
            serde_json::from_str(&text).map_err(|source| ProcessorError::MalformedJson {
                preview: preview(&text, PREVIEW_LEN),
                kind: "string",
                source,
            })?
        }
        other => other,
    };

    match data {
        Value::Array(items) => {
            if let Some((idx, item)) = items.iter().enumerate().find(|(_, v)| !v.is_object()) {
                return Err(ProcessorError::Schema(format!(
                    "registro na posição {} não é um objeto ({})",
                    idx,
                    json_type(item)
                )));
            }
            Ok(items)
        }
        Value::Object(_) => Ok(vec![data]),
        other => Err(ProcessorError::Schema(format!(
            "esperado objeto ou lista de objetos, recebido {}",
            json_type(&other)
        ))),
    }
}

fn frame_from_records(
    mut records: Vec<Value>,
    infer_schema_len: Option<NonZeroUsize>,
) -> Result<DataFrame, ProcessorError> {
    if records.is_empty() {
        return Ok(DataFrame::empty());
    }

    // None = inspeciona todos os registros
    if let Some(depth) = infer_schema_len {
        restrict_to_inspected_keys(&mut records, depth.get());
    }

    let json_bytes = serde_json::to_vec(&records)?;
    // Colunas já estão limitadas; os tipos são inferidos sobre todas as linhas.
    let frame = JsonReader::new(Cursor::new(json_bytes))
        .infer_schema_len(None)
        .finish()?;

    Ok(frame)
}

/// Mantém apenas as chaves vistas nos primeiros `depth` registros.
///
/// Chaves que só aparecem depois são descartadas em todas as linhas.
fn restrict_to_inspected_keys(records: &mut [Value], depth: usize) {
    let columns: HashSet<String> = records
        .iter()
        .take(depth)
        .filter_map(Value::as_object)
        .flat_map(|fields| fields.keys().cloned())
        .collect();

    for fields in records.iter_mut().filter_map(Value::as_object_mut) {
        fields.retain(|key, _| columns.contains(key));
    }
}

/// Expande `radiant_team`/`dire_team` em colunas posicionais.
///
/// Para cada registro com as duas listas, cria `radiant_hero_1..N` e
/// `dire_hero_1..N` (base 1) e remove os campos originais. Listas curtas
/// simplesmente não geram as posições finais.
pub fn expand_rosters(records: &mut [Value]) {
    for record in records.iter_mut() {
        let Some(fields) = record.as_object_mut() else {
            continue;
        };

        let both_lists = matches!(
            (fields.get(RADIANT_TEAM), fields.get(DIRE_TEAM)),
            (Some(Value::Array(_)), Some(Value::Array(_)))
        );
        if !both_lists {
            continue;
        }

        for (team, prefix) in [(RADIANT_TEAM, "radiant_hero"), (DIRE_TEAM, "dire_hero")] {
            if let Some(Value::Array(heroes)) = fields.remove(team) {
                for (position, hero_id) in heroes.into_iter().enumerate() {
                    fields.insert(format!("{}_{}", prefix, position + 1), hero_id);
                }
            }
        }
    }
}

/// Converte `{"123": "Ranked", ...}` em linhas `{id_field: "123", "name": "Ranked"}`.
///
/// O valor é mantido intacto (string continua string, objeto vira struct).
pub fn key_value_rows(data: Value, id_field: &str) -> Result<Vec<Value>, ProcessorError> {
    let Value::Object(entries) = data else {
        return Err(ProcessorError::Schema(format!(
            "constante deveria ser um objeto, recebido {}",
            json_type(&data)
        )));
    };

    Ok(entries
        .into_iter()
        .map(|(key, value)| {
            let mut row = Map::new();
            row.insert(id_field.to_string(), Value::String(key));
            row.insert("name".to_string(), value);
            Value::Object(row)
        })
        .collect())
}

/// `start_time` (epoch em segundos) do primeiro registro.
///
/// Valores fora do intervalo representável de datas contam como ausentes.
pub fn first_start_time(records: &[Value]) -> Option<i64> {
    let value = records.first()?.get("start_time")?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|secs| secs as i64))
        .filter(|secs| DateTime::<Utc>::from_timestamp(*secs, 0).is_some())
}

/// Nome do arquivo de partidas: data local de São Paulo + sufixo fixo.
pub fn matches_file_name(start_time: i64) -> Result<String, ProcessorError> {
    let utc = DateTime::<Utc>::from_timestamp(start_time, 0).ok_or_else(|| {
        ProcessorError::Schema(format!("start_time fora do intervalo: {}", start_time))
    })?;

    Ok(utc
        .with_timezone(&Sao_Paulo)
        .format("%Y-%m-%d-dadosprincipal.parquet")
        .to_string())
}

/// Serializa o DataFrame em Parquet (Snappy + estatísticas de coluna).
pub fn to_parquet(frame: &mut DataFrame) -> Result<Vec<u8>, ProcessorError> {
    let stats_options = StatisticsOptions {
        min_value: true,
        max_value: true,
        null_count: true,
        distinct_count: false,
    };

    let mut buffer = Vec::new();
    ParquetWriter::new(&mut buffer)
        .with_compression(ParquetCompression::Snappy)
        .with_statistics(stats_options)
        .finish(frame)?;

    Ok(buffer)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
