//! Modelos de dominio del lote de renombrado (ficheros y planes de renombre).

use std::path::{Path, PathBuf};

/// Representa un fichero pendiente de procesar dentro de un lote.
///
/// La extensión se captura una única vez, en minúsculas, y esa misma forma
/// se usa tanto para decidir el formato de extracción como para componer el
/// nombre de salida.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub path: PathBuf,
    pub extension: Option<String>,
}

impl FileTask {
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .map(|ext| ext.to_lowercase());
        Self {
            path: path.to_path_buf(),
            extension,
        }
    }

    /// Nombre base del fichero, usado como excerpt de reserva cuando no hay
    /// contenido útil.
    pub fn base_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

/// Emparejamiento de un fichero con su título resuelto: la ruta destino vive
/// en el mismo directorio padre, con la extensión original en minúsculas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    pub source: PathBuf,
    pub target: PathBuf,
}

impl RenamePlan {
    pub fn new(task: &FileTask, title: &str) -> Self {
        let file_name = match &task.extension {
            Some(ext) => format!("{title}.{ext}"),
            None => title.to_string(),
        };
        let parent = task.path.parent().unwrap_or_else(|| Path::new(""));
        Self {
            source: task.path.clone(),
            target: parent.join(file_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_task_lowercases_extension() {
        let task = FileTask::from_path(Path::new("/datos/Informe.PDF"));
        assert_eq!(task.extension.as_deref(), Some("pdf"));
    }

    #[test]
    fn file_task_without_extension() {
        let task = FileTask::from_path(Path::new("/datos/LEEME"));
        assert_eq!(task.extension, None);
        assert_eq!(task.base_name(), "LEEME");
    }

    #[test]
    fn rename_plan_keeps_parent_and_extension() {
        let task = FileTask::from_path(Path::new("/datos/borrador.TXT"));
        let plan = RenamePlan::new(&task, "Acta de reunión");
        assert_eq!(plan.source, PathBuf::from("/datos/borrador.TXT"));
        assert_eq!(plan.target, PathBuf::from("/datos/Acta de reunión.txt"));
    }

    #[test]
    fn rename_plan_without_extension_uses_title_only() {
        let task = FileTask::from_path(Path::new("/datos/LEEME"));
        let plan = RenamePlan::new(&task, "Notas");
        assert_eq!(plan.target, PathBuf::from("/datos/Notas"));
    }
}
