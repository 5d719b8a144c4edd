//! Carga y gestión de configuración de la aplicación (lote + cliente GLM).

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// URL del endpoint de chat-completions de Zhipu.
pub const DEFAULT_API_URL: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Directorio a procesar; si es `None` se pregunta por stdin.
    pub target_dir: Option<PathBuf>,
    /// Máximo de caracteres del excerpt enviado a clasificar.
    pub max_read_size: usize,

    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,

    /// Fichero JSON con la credencial (`header.Authorization`).
    pub credentials_file: PathBuf,

    /// Si está activo, se guarda cada respuesta de la API en `log_dir`.
    pub log_responses: bool,
    pub log_dir: PathBuf,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let target_dir = env::var("TARGET_DIR").ok().map(PathBuf::from);

        let max_read_size = parse_var("MAX_READ_SIZE", 1024usize)?;
        if max_read_size == 0 {
            return Err(anyhow!("MAX_READ_SIZE debe ser mayor que cero"));
        }

        let api_url = env::var("LLM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let model = env::var("LLM_MODEL").unwrap_or_else(|_| "glm-zero-preview".to_string());
        let temperature = parse_var("LLM_TEMPERATURE", 0.9f32)?;
        let top_p = parse_var("LLM_TOP_P", 0.9f32)?;
        let max_tokens = parse_var("LLM_MAX_TOKENS", 1024u32)?;

        let credentials_file = env::var("CREDENTIALS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.json"));

        let log_responses = parse_var("LOG_RESPONSES", false)?;
        let log_dir = env::var("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("log"));

        Ok(Self {
            target_dir,
            max_read_size,
            api_url,
            model,
            temperature,
            top_p,
            max_tokens,
            credentials_file,
            log_responses,
            log_dir,
        })
    }
}

/// Lee una variable de entorno tipada, con valor por defecto si no existe.
/// Un valor presente pero no parseable es un error de configuración.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow!("Valor no válido para {name}: '{raw}'")),
        Err(_) => Ok(default),
    }
}

// --- Fichero de credenciales ---

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    header: CredentialsHeader,
}

#[derive(Debug, Deserialize)]
struct CredentialsHeader {
    #[serde(rename = "Authorization")]
    authorization: String,
}

/// Lee el valor de `Authorization` del fichero de credenciales.
///
/// Se espera que el valor ya incluya el prefijo del esquema ("Bearer ...");
/// el cliente lo envía tal cual, sin modificarlo.
pub fn load_credentials(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).with_context(|| {
        format!(
            "No se pudo leer el fichero de credenciales: {}",
            path.display()
        )
    })?;
    let parsed: CredentialsFile = serde_json::from_str(&raw).with_context(|| {
        format!(
            "El fichero de credenciales no tiene la estructura esperada (header.Authorization): {}",
            path.display()
        )
    })?;
    Ok(parsed.header.authorization)
}
