//! Extracción de un excerpt acotado del comienzo de un fichero, según su
//! formato. Todos los modos de fallo degradan a una cadena de reserva: la
//! extracción nunca aborta el lote.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;
use zip::ZipArchive;

use crate::models::FileTask;

/// Formatos de extracción reconocidos, decididos por la extensión en minúsculas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    PlainText,
    Pdf,
    Docx,
    Unsupported,
}

impl FileKind {
    pub fn from_extension(extension: Option<&str>) -> Self {
        match extension {
            Some("pdf") => Self::Pdf,
            Some("docx") => Self::Docx,
            Some("txt" | "md" | "rs" | "toml" | "log" | "html" | "css" | "js") | None => {
                Self::PlainText
            }
            Some(_) => Self::Unsupported,
        }
    }
}

/// Extrae un excerpt de como mucho `max_chars` caracteres del fichero.
///
/// Para texto plano se lee un prefijo acotado; para PDF, el texto de la
/// primera página; para DOCX, el primer párrafo. Si el fichero no tiene
/// contenido útil (vacío, ilegible, sin páginas o sin párrafos) el excerpt
/// degenera al nombre base del fichero. Una extensión no reconocida produce
/// una cadena de diagnóstico, no un error.
pub fn excerpt(task: &FileTask, max_chars: usize) -> String {
    let kind = FileKind::from_extension(task.extension.as_deref());
    let text = match kind {
        FileKind::PlainText => read_plain_text(&task.path, max_chars),
        FileKind::Pdf => read_pdf_first_page(&task.path),
        FileKind::Docx => read_docx_first_paragraph(&task.path),
        FileKind::Unsupported => {
            let ext = task.extension.as_deref().unwrap_or_default();
            Some(format!("Tipo de fichero no soportado: .{ext}"))
        }
    };

    let text = match text {
        Some(content) if !content.trim().is_empty() => content,
        _ => task.base_name(),
    };
    truncate_chars(&text, max_chars)
}

/// Lee un prefijo acotado de un fichero de texto. La ventana se dimensiona a
/// 4 bytes por carácter (el peor caso UTF-8); una secuencia incompleta justo
/// en el borde de la ventana se descarta, cualquier otro contenido no
/// decodificable invalida la lectura.
fn read_plain_text(path: &Path, max_chars: usize) -> Option<String> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            warn!("No se pudo abrir {}: {err}", path.display());
            return None;
        }
    };

    let window = max_chars.saturating_mul(4);
    let mut buffer = Vec::new();
    if let Err(err) = file.take(window as u64).read_to_end(&mut buffer) {
        warn!("No se pudo leer {}: {err}", path.display());
        return None;
    }

    match std::str::from_utf8(&buffer) {
        Ok(text) => Some(text.to_string()),
        Err(err) if err.error_len().is_none() && buffer.len() == window => {
            // La ventana cortó un carácter multibyte: nos quedamos con el
            // prefijo válido.
            Some(String::from_utf8_lossy(&buffer[..err.valid_up_to()]).into_owned())
        }
        Err(_) => {
            warn!("Contenido no decodificable como UTF-8: {}", path.display());
            None
        }
    }
}

/// Texto de la primera página de un PDF. Un PDF sin páginas devuelve `None`.
fn read_pdf_first_page(path: &Path) -> Option<String> {
    match pdf_extract::extract_text_by_pages(path) {
        Ok(pages) => pages.into_iter().next(),
        Err(err) => {
            warn!("No se pudo extraer texto del PDF {}: {err}", path.display());
            None
        }
    }
}

/// Texto del primer párrafo (`<w:p>`) de un DOCX. El documento es un zip con
/// el contenido en `word/document.xml`.
fn read_docx_first_paragraph(path: &Path) -> Option<String> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            warn!("No se pudo abrir {}: {err}", path.display());
            return None;
        }
    };
    let mut archive = match ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(err) => {
            warn!("DOCX no legible como zip {}: {err}", path.display());
            return None;
        }
    };
    let mut xml = String::new();
    match archive.by_name("word/document.xml") {
        Ok(mut entry) => {
            if let Err(err) = entry.read_to_string(&mut xml) {
                warn!("No se pudo leer word/document.xml de {}: {err}", path.display());
                return None;
            }
        }
        Err(err) => {
            warn!("DOCX sin word/document.xml {}: {err}", path.display());
            return None;
        }
    }

    match first_paragraph_text(&xml) {
        Ok(text) => text,
        Err(err) => {
            warn!("XML no válido en {}: {err}", path.display());
            None
        }
    }
}

/// Recorre el XML del documento y concatena los nodos de texto del primer
/// párrafo. `Ok(None)` significa que el documento no contiene ningún párrafo.
fn first_paragraph_text(xml: &str) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut in_paragraph = false;
    let mut seen_paragraph = false;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"p" => {
                in_paragraph = true;
                seen_paragraph = true;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"p" => {
                seen_paragraph = true;
                break;
            }
            Event::End(e) if in_paragraph && e.local_name().as_ref() == b"p" => break,
            Event::Text(t) if in_paragraph => text.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    if seen_paragraph {
        Ok(Some(text))
    } else {
        Ok(None)
    }
}

/// Corta a `max_chars` caracteres sin partir un carácter multibyte.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
