//! Cliente del servicio de títulos: envía un excerpt al endpoint de
//! chat-completions de Zhipu y extrae el título del objeto JSON devuelto.
//! Todo fallo se recupera localmente como un título centinela; el lote nunca
//! se detiene por un error de clasificación.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::{self, AppConfig};

/// Título centinela para fallos de red o HTTP.
pub const SENTINEL_TRANSPORT: &str = "solicitud-fallida";
/// Título centinela para respuestas cuyo contenido no se pudo interpretar.
pub const SENTINEL_FORMAT: &str = "error-de-analisis";

/// Instrucción fija del sistema: el modelo clasifica el contenido recibido y
/// responde con un objeto JSON que contiene el título.
const SYSTEM_PROMPT: &str = r#"Recibirás el contenido de un fichero y debes clasificarlo con un título (title); el título debe estar en español. Debes seguir siempre la instrucción y responder con un único objeto JSON válido. Si no estás seguro, usa por defecto la estructura {"answer": "$tu_respuesta", "title": "$tu_titulo"}. Asegúrate de terminar siempre el bloque de código con "```" para indicar el final del objeto JSON."#;

// --- Tipos del protocolo (petición y respuesta) ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Objeto JSON interno devuelto por el modelo dentro de `content`.
#[derive(Deserialize)]
struct TitlePayload {
    title: String,
}

// --- Taxonomía de errores de clasificación ---

/// Fallos al obtener un título, separados en dos niveles: el transporte
/// (red / estado HTTP) y el formato de la respuesta (cualquiera de los dos
/// niveles de parseo JSON).
#[derive(Debug, Error)]
pub enum TitleError {
    #[error("fallo de red o HTTP llamando al servicio: {detail}")]
    Transport {
        detail: String,
        body: Option<String>,
    },
    #[error("respuesta con formato inesperado: {detail}")]
    Format { detail: String, body: String },
}

impl TitleError {
    /// Título centinela correspondiente a la categoría del fallo.
    pub fn sentinel(&self) -> &'static str {
        match self {
            Self::Transport { .. } => SENTINEL_TRANSPORT,
            Self::Format { .. } => SENTINEL_FORMAT,
        }
    }

    /// Cuerpo de la respuesta, si llegó a recibirse uno.
    fn body(&self) -> Option<&str> {
        match self {
            Self::Transport { body, .. } => body.as_deref(),
            Self::Format { body, .. } => Some(body),
        }
    }
}

// --- Fuente de títulos ---

/// Costura entre el orquestador y el servicio remoto: siempre produce un
/// título utilizable, real o centinela.
#[async_trait]
pub trait TitleSource {
    async fn title_for(&self, excerpt: &str) -> String;
}

/// Cliente del endpoint de chat-completions.
pub struct TitleClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    log_responses: bool,
    log_dir: PathBuf,
}

impl TitleClient {
    /// Construye el cliente a partir de la configuración, cargando la
    /// credencial del fichero indicado.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let api_key = config::load_credentials(&cfg.credentials_file)?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_url: cfg.api_url.clone(),
            api_key,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
            log_responses: cfg.log_responses,
            log_dir: cfg.log_dir.clone(),
        })
    }

    /// Ronda completa contra el servicio. Devuelve el título junto con el
    /// cuerpo crudo de la respuesta, para poder registrarlo.
    async fn request_title(&self, excerpt: &str) -> Result<(String, String), TitleError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: excerpt,
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| TitleError::Transport {
                detail: err.to_string(),
                body: None,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| TitleError::Transport {
                detail: err.to_string(),
                body: None,
            })?;

        if !status.is_success() {
            return Err(TitleError::Transport {
                detail: format!("estado HTTP {status}"),
                body: Some(body),
            });
        }

        let title = parse_title(&body)?;
        Ok((title, body))
    }

    fn log_response(&self, title: &str, body: &str) {
        if let Err(err) = write_response_log(&self.log_dir, title, body) {
            warn!("No se pudo guardar el log de la respuesta: {err:#}");
        }
    }
}

#[async_trait]
impl TitleSource for TitleClient {
    async fn title_for(&self, excerpt: &str) -> String {
        match self.request_title(excerpt).await {
            Ok((title, body)) => {
                if self.log_responses {
                    self.log_response(&title, &body);
                }
                title
            }
            Err(err) => {
                warn!("Clasificación degradada, se usa un título centinela: {err}");
                let sentinel = err.sentinel();
                if self.log_responses {
                    if let Some(body) = err.body() {
                        self.log_response(sentinel, body);
                    }
                }
                sentinel.to_string()
            }
        }
    }
}

/// Parseo en dos niveles: el cuerpo exterior hasta
/// `choices[0].message.content`, y ese contenido como objeto JSON con el
/// campo `title`. El modelo a veces envuelve el objeto en una valla de
/// código, que se retira antes de parsear.
fn parse_title(body: &str) -> Result<String, TitleError> {
    let format_error = |detail: String| TitleError::Format {
        detail,
        body: body.to_string(),
    };

    let outer: ChatResponse = serde_json::from_str(body).map_err(|err| {
        format_error(format!("el cuerpo no tiene la estructura esperada: {err}"))
    })?;
    let content = outer
        .choices
        .first()
        .map(|choice| choice.message.content.as_str())
        .ok_or_else(|| format_error("la respuesta no contiene choices".to_string()))?;

    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_end_matches("```")
        .trim();

    let payload: TitlePayload = serde_json::from_str(cleaned).map_err(|err| {
        format_error(format!("el contenido no es un objeto JSON con 'title': {err}"))
    })?;
    Ok(payload.title)
}

// --- Log opcional de respuestas ---

/// Guarda el cuerpo de la respuesta, embellecido, bajo el directorio de log.
/// El nombre del fichero se deriva del título saneado.
fn write_response_log(dir: &Path, title: &str, body: &str) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("No se pudo crear el directorio de log {}", dir.display()))?;

    let value: serde_json::Value = serde_json::from_str(body)
        .unwrap_or_else(|_| serde_json::Value::String(body.to_string()));
    let pretty = serde_json::to_string_pretty(&value)?;

    let path = dir.join(format!("Title_{}.json", sanitize_title(title)));
    fs::write(&path, pretty)
        .with_context(|| format!("No se pudo escribir el log {}", path.display()))?;
    Ok(())
}

/// Sanea un título para usarlo como nombre de fichero de log: los caracteres
/// fuera de [alfanumérico _ . -] pasan a '_', un resultado vacío o compuesto
/// sólo de '_' se sustituye por un marcador fijo, y se corta a 100 caracteres.
fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.chars().all(|c| c == '_') {
        return "titulo_invalido".to_string();
    }
    sanitized.chars().take(100).collect()
}
