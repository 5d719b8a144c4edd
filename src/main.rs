// Módulos de la aplicación
mod config;
mod extract;
mod llm;
mod models;
mod rename;

use std::io::Write;
use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::llm::TitleClient;

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración y credenciales
    let cfg = AppConfig::from_env().expect("Error al cargar la configuración");
    let client =
        TitleClient::from_config(&cfg).expect("Error inicializando el cliente de títulos");

    // 3. Resolver el directorio objetivo
    let dir = resolve_target_dir(&cfg);
    info!("🗂️ Procesando el directorio {}", dir.display());

    // 4. Ejecutar el lote y reportar el resultado
    match rename::rename_directory(&client, &dir, cfg.max_read_size).await {
        Ok(summary) => info!("✅ {}", summary),
        Err(err) => {
            error!("El lote terminó con un error fatal: {err:#}");
            std::process::exit(1);
        }
    }
}

/// Directorio a procesar: la configuración tiene prioridad; si falta se
/// pregunta por stdin, y una respuesta vacía cae al directorio home.
fn resolve_target_dir(cfg: &AppConfig) -> PathBuf {
    if let Some(dir) = &cfg.target_dir {
        return dir.clone();
    }

    print!("Introduce el directorio a procesar: ");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok();

    let answer = line.trim();
    if answer.is_empty() {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
    } else {
        PathBuf::from(answer)
    }
}
