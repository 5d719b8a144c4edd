//! Orquestación del lote de renombrado: enumeración del directorio,
//! producción perezosa de un título por fichero y aplicación del renombrado
//! con aislamiento de fallos por fichero.

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Result};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::extract;
use crate::llm::TitleSource;
use crate::models::{FileTask, RenamePlan};

/// Resumen de los resultados de un lote de renombrado.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RenameSummary {
    pub files_found: u32,
    pub renamed: u32,
    pub skipped_exists: u32,
    pub skipped_locked: u32,
    pub errors: u32,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for RenameSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros encontrados, {} renombrados, {} omitidos por nombre existente, {} omitidos por bloqueo, {} con error.",
            self.files_found, self.renamed, self.skipped_exists, self.skipped_locked, self.errors
        )
    }
}

/// Resultado de un intento de renombrado sobre un fichero.
#[derive(Debug)]
enum RenameOutcome {
    Renamed,
    SkippedExists,
    SkippedLocked,
    SkippedError(io::Error),
}

/// Productor perezoso de títulos: extrae y clasifica exactamente un fichero
/// por llamada, de modo que nunca hay más de un excerpt en memoria ni más de
/// una petición en vuelo.
pub struct TitleStream<'a, S: TitleSource> {
    source: &'a S,
    tasks: std::vec::IntoIter<FileTask>,
    max_read_size: usize,
}

impl<'a, S: TitleSource> TitleStream<'a, S> {
    pub fn new(source: &'a S, tasks: Vec<FileTask>, max_read_size: usize) -> Self {
        Self {
            source,
            tasks: tasks.into_iter(),
            max_read_size,
        }
    }

    /// Título para el siguiente fichero, o `None` si el flujo está agotado.
    pub async fn next(&mut self) -> Option<String> {
        let task = self.tasks.next()?;
        let excerpt = extract::excerpt(&task, self.max_read_size);
        Some(self.source.title_for(&excerpt).await)
    }
}

/// Enumera los ficheros regulares directamente bajo `dir` (sin recursión).
pub fn enumerate_files(dir: &Path) -> Result<Vec<FileTask>> {
    if !dir.is_dir() {
        return Err(anyhow!("La ruta no es un directorio: {}", dir.display()));
    }

    let tasks = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| FileTask::from_path(entry.path()))
        .collect();
    Ok(tasks)
}

/// Recorre el directorio completo renombrando cada fichero a su título.
pub async fn rename_directory<S: TitleSource>(
    source: &S,
    dir: &Path,
    max_read_size: usize,
) -> Result<RenameSummary> {
    let tasks = enumerate_files(dir)?;
    let titles = TitleStream::new(source, tasks.clone(), max_read_size);
    apply_batch(&tasks, titles).await
}

/// Consume el flujo de títulos, un fichero por iteración. Los fallos de
/// renombrado se clasifican por fichero y el lote continúa; que el flujo se
/// agote antes que la lista de ficheros es el único fallo fatal.
async fn apply_batch<S: TitleSource>(
    tasks: &[FileTask],
    mut titles: TitleStream<'_, S>,
) -> Result<RenameSummary> {
    let total = tasks.len();
    let mut summary = RenameSummary {
        files_found: total as u32,
        ..Default::default()
    };

    for (index, task) in tasks.iter().enumerate() {
        info!("[{}/{}] Renombrando: {}", index + 1, total, task.base_name());

        let Some(title) = titles.next().await else {
            error!(
                "Flujo de títulos agotado con {} ficheros pendientes",
                total - index
            );
            return Err(anyhow!(
                "El flujo de títulos se agotó antes de terminar el lote"
            ));
        };

        let plan = RenamePlan::new(task, &title);
        match apply_rename(&plan) {
            RenameOutcome::Renamed => {
                summary.renamed += 1;
                info!(
                    "Renombrado {} -> {}",
                    plan.source.display(),
                    plan.target.display()
                );
            }
            RenameOutcome::SkippedExists => {
                summary.skipped_exists += 1;
                warn!("Ya existe {}, se omite el fichero", plan.target.display());
            }
            RenameOutcome::SkippedLocked => {
                summary.skipped_locked += 1;
                warn!(
                    "Fichero abierto o bloqueado, se omite: {}",
                    plan.source.display()
                );
            }
            RenameOutcome::SkippedError(err) => {
                summary.errors += 1;
                error!("Error renombrando {}: {err}", plan.source.display());
            }
        }
    }

    Ok(summary)
}

/// Aplica un plan de renombrado sin sobrescribir nunca un destino existente;
/// el original queda intacto en todo caso que no termine en éxito.
fn apply_rename(plan: &RenamePlan) -> RenameOutcome {
    // fs::rename sobrescribe el destino en Unix; la comprobación previa
    // mantiene el contrato de no destruir ficheros existentes.
    if plan.target.exists() {
        return RenameOutcome::SkippedExists;
    }

    match fs::rename(&plan.source, &plan.target) {
        Ok(()) => RenameOutcome::Renamed,
        Err(err) => match err.kind() {
            io::ErrorKind::AlreadyExists => RenameOutcome::SkippedExists,
            io::ErrorKind::PermissionDenied => RenameOutcome::SkippedLocked,
            _ => RenameOutcome::SkippedError(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{SENTINEL_TRANSPORT, TitleSource};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fuente de títulos de prueba: devuelve títulos enlatados en orden y
    /// registra los excerpts que recibe.
    struct StubSource {
        titles: Mutex<VecDeque<String>>,
        received: Mutex<Vec<String>>,
    }

    impl StubSource {
        fn with_titles(titles: &[&str]) -> Self {
            Self {
                titles: Mutex::new(titles.iter().map(|t| t.to_string()).collect()),
                received: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TitleSource for StubSource {
        async fn title_for(&self, excerpt: &str) -> String {
            self.received.lock().unwrap().push(excerpt.to_string());
            self.titles
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "titulo-enlatado".to_string())
        }
    }

    fn list_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    mod enumeration {
        use super::*;

        #[test]
        fn only_direct_regular_files() {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("a.txt"), "a").unwrap();
            std::fs::create_dir(dir.path().join("sub")).unwrap();
            std::fs::write(dir.path().join("sub/b.txt"), "b").unwrap();

            let tasks = enumerate_files(dir.path()).unwrap();
            assert_eq!(tasks.len(), 1);
            assert_eq!(tasks[0].base_name(), "a.txt");
        }

        #[test]
        fn not_a_directory_is_an_error() {
            let dir = TempDir::new().unwrap();
            let file = dir.path().join("fichero.txt");
            std::fs::write(&file, "x").unwrap();

            assert!(enumerate_files(&file).is_err());
            assert!(enumerate_files(&dir.path().join("no-existe")).is_err());
        }
    }

    mod batch {
        use super::*;

        #[tokio::test]
        async fn renames_to_title_preserving_extension_and_content() {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("borrador.txt"), "contenido original").unwrap();
            let source = StubSource::with_titles(&["Informe anual"]);

            let summary = rename_directory(&source, dir.path(), 1024).await.unwrap();

            assert_eq!(summary.renamed, 1);
            assert_eq!(list_names(dir.path()), vec!["Informe anual.txt"]);
            let content =
                std::fs::read_to_string(dir.path().join("Informe anual.txt")).unwrap();
            assert_eq!(content, "contenido original");
        }

        #[tokio::test]
        async fn empty_file_is_classified_by_its_base_name() {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("vacio.txt"), "").unwrap();
            let source = StubSource::with_titles(&["Fichero misterioso"]);

            rename_directory(&source, dir.path(), 1024).await.unwrap();

            assert_eq!(source.received.lock().unwrap().as_slice(), ["vacio.txt"]);
            assert_eq!(list_names(dir.path()), vec!["Fichero misterioso.txt"]);
        }

        #[tokio::test]
        async fn sentinel_title_still_renames_the_file() {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("informe.txt"), "datos").unwrap();
            let source = StubSource::with_titles(&[SENTINEL_TRANSPORT]);

            let summary = rename_directory(&source, dir.path(), 1024).await.unwrap();

            assert_eq!(summary.renamed, 1);
            assert_eq!(list_names(dir.path()), vec!["solicitud-fallida.txt"]);
        }

        #[tokio::test]
        async fn duplicate_title_renames_first_and_skips_second() {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("uno.txt"), "primero").unwrap();
            std::fs::write(dir.path().join("dos.txt"), "segundo").unwrap();
            let source = StubSource::with_titles(&["Mismo título", "Mismo título"]);

            let summary = rename_directory(&source, dir.path(), 1024).await.unwrap();

            assert_eq!(summary.renamed, 1);
            assert_eq!(summary.skipped_exists, 1);
            let names = list_names(dir.path());
            assert_eq!(names.len(), 2);
            assert!(names.contains(&"Mismo título.txt".to_string()));
            // El segundo fichero conserva su nombre y su contenido.
            let survivor = names
                .iter()
                .find(|n| n.as_str() != "Mismo título.txt")
                .unwrap();
            assert!(survivor == "uno.txt" || survivor == "dos.txt");
            let original = std::fs::read_to_string(dir.path().join(survivor)).unwrap();
            assert!(original == "primero" || original == "segundo");
        }

        #[tokio::test]
        async fn exhausted_stream_aborts_leaving_files_untouched() {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("a.txt"), "a").unwrap();
            std::fs::write(dir.path().join("b.txt"), "b").unwrap();
            let source = StubSource::with_titles(&[]);

            let tasks = enumerate_files(dir.path()).unwrap();
            // Flujo construido sobre una lista vacía: se agota en el primer
            // fichero del lote.
            let titles = TitleStream::new(&source, Vec::new(), 1024);
            let result = apply_batch(&tasks, titles).await;

            assert!(result.is_err());
            assert_eq!(list_names(dir.path()), vec!["a.txt", "b.txt"]);
        }

        #[tokio::test]
        async fn empty_directory_yields_empty_summary() {
            let dir = TempDir::new().unwrap();
            let source = StubSource::with_titles(&[]);

            let summary = rename_directory(&source, dir.path(), 1024).await.unwrap();
            assert_eq!(summary, RenameSummary::default());
        }
    }

    mod apply {
        use super::*;

        #[test]
        fn existing_target_is_skipped_and_source_preserved() {
            let dir = TempDir::new().unwrap();
            let source_path = dir.path().join("origen.txt");
            let target_path = dir.path().join("Destino.txt");
            std::fs::write(&source_path, "origen").unwrap();
            std::fs::write(&target_path, "ya estaba").unwrap();

            let plan = RenamePlan {
                source: source_path.clone(),
                target: target_path.clone(),
            };
            let outcome = apply_rename(&plan);

            assert!(matches!(outcome, RenameOutcome::SkippedExists));
            assert_eq!(std::fs::read_to_string(&source_path).unwrap(), "origen");
            assert_eq!(std::fs::read_to_string(&target_path).unwrap(), "ya estaba");
        }

        #[test]
        fn missing_source_is_an_error_outcome() {
            let dir = TempDir::new().unwrap();
            let plan = RenamePlan {
                source: dir.path().join("no-existe.txt"),
                target: dir.path().join("Destino.txt"),
            };

            assert!(matches!(
                apply_rename(&plan),
                RenameOutcome::SkippedError(_)
            ));
        }

        #[test]
        fn rename_moves_within_same_directory() {
            let dir = TempDir::new().unwrap();
            let source_path = dir.path().join("origen.txt");
            std::fs::write(&source_path, "datos").unwrap();

            let plan = RenamePlan {
                source: source_path.clone(),
                target: dir.path().join("Nuevo nombre.txt"),
            };

            assert!(matches!(apply_rename(&plan), RenameOutcome::Renamed));
            assert!(!source_path.exists());
            assert_eq!(
                std::fs::read_to_string(dir.path().join("Nuevo nombre.txt")).unwrap(),
                "datos"
            );
        }
    }

    mod summary {
        use super::*;

        #[test]
        fn display_reports_all_counters() {
            let summary = RenameSummary {
                files_found: 5,
                renamed: 2,
                skipped_exists: 1,
                skipped_locked: 1,
                errors: 1,
            };
            let text = summary.to_string();
            assert!(text.contains("5 ficheros encontrados"));
            assert!(text.contains("2 renombrados"));
            assert!(text.contains("1 omitidos por nombre existente"));
        }
    }

}
