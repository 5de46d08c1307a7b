use crate::chunking::normalize_whitespace;
use crate::error::IngestError;
use crate::models::Document;
use lopdf::Document as PdfDocument;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const TEXT_EXTENSIONS: [&str; 4] = ["txt", "text", "md", "markdown"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    pub fn from_extension(filename: &str) -> Option<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())?
            .to_ascii_lowercase();

        if extension == "pdf" {
            Some(Self::Pdf)
        } else if TEXT_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::PlainText)
        } else {
            None
        }
    }

    /// Extension first, then the PDF signature.
    pub fn detect(filename: &str, bytes: &[u8]) -> Option<Self> {
        Self::from_extension(filename).or_else(|| bytes.starts_with(b"%PDF-").then_some(Self::Pdf))
    }
}

/// Turns raw document bytes into plain text. Blocking; run off the async workers.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, document: &Document) -> Result<String, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FileTypeLoader;

impl DocumentLoader for FileTypeLoader {
    fn load(&self, document: &Document) -> Result<String, IngestError> {
        match DocumentKind::detect(&document.filename, &document.bytes) {
            Some(DocumentKind::Pdf) => extract_pdf_text(&document.filename, &document.bytes),
            Some(DocumentKind::PlainText) => String::from_utf8(document.bytes.clone())
                .map_err(|error| IngestError::unreadable(&document.filename, error)),
            None => Err(IngestError::unreadable(
                &document.filename,
                "unsupported document type",
            )),
        }
    }
}

/// Text layer of every page, blank pages dropped. Empty when the PDF has no text layer.
pub fn extract_pdf_text(filename: &str, bytes: &[u8]) -> Result<String, IngestError> {
    let document =
        PdfDocument::load_mem(bytes).map_err(|error| IngestError::unreadable(filename, error))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::unreadable(filename, error))?;

        let normalized = normalize_whitespace(&text);
        if !normalized.is_empty() {
            pages.push(normalized);
        }
    }

    Ok(pages.join("\n\n"))
}

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(DocumentKind::from_extension)
            .is_some();

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub async fn read_document(path: &Path) -> Result<Document, IngestError> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::InvalidArgument(format!("path has no file name: {}", path.display()))
        })?
        .to_string();
    let bytes = tokio::fs::read(path).await?;
    Ok(Document::new(filename, bytes))
}

/// Expands folders into their supported files and reads everything into memory.
pub async fn collect_documents(paths: &[PathBuf]) -> Result<Vec<Document>, IngestError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(discover_documents(path));
        } else {
            files.push(path.clone());
        }
    }

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(
            "no supported documents found".to_string(),
        ));
    }

    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        documents.push(read_document(&file).await?);
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    fn hello_pdf() -> Vec<u8> {
        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 48.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal("Hello World")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn pdf_text_layer_is_extracted() {
        let document = Document::new("hello.pdf", hello_pdf());
        let text = FileTypeLoader.load(&document).unwrap();
        assert!(text.contains("Hello World"), "extracted: {text:?}");
    }

    #[test]
    fn broken_pdf_is_unreadable() {
        let document = Document::new("broken.pdf", b"%PDF-1.4\n%broken".to_vec());
        let error = FileTypeLoader.load(&document).unwrap_err();
        assert!(matches!(error, IngestError::UnreadableDocument { .. }));
    }

    #[test]
    fn plain_text_must_be_utf8() {
        let good = Document::new("cv.md", "# Jane Doe\nRust".as_bytes().to_vec());
        assert_eq!(FileTypeLoader.load(&good).unwrap(), "# Jane Doe\nRust");

        let bad = Document::new("cv.txt", vec![0xff, 0xfe, 0x00]);
        assert!(matches!(
            FileTypeLoader.load(&bad),
            Err(IngestError::UnreadableDocument { .. })
        ));
    }

    #[test]
    fn unknown_types_are_rejected_unless_pdf_signed() {
        let docx = Document::new("cv.docx", b"PK\x03\x04".to_vec());
        assert!(FileTypeLoader.load(&docx).is_err());
        assert_eq!(
            DocumentKind::detect("upload.bin", b"%PDF-1.7"),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(DocumentKind::detect("CV.PDF", b""), Some(DocumentKind::Pdf));
    }

    #[test]
    fn discovery_is_recursive_and_filtered() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.txt")).and_then(|mut file| file.write_all(b"Jane"))?;
        File::create(nested.join("c.png")).and_then(|mut file| file.write_all(b"png"))?;

        let files = discover_documents(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn folders_are_expanded_into_documents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("jane.txt"), b"Jane Doe")?;
        fs::write(dir.path().join("john.md"), b"John Roe")?;

        let documents = collect_documents(&[dir.path().to_path_buf()]).await?;
        let names: Vec<&str> = documents.iter().map(|doc| doc.filename.as_str()).collect();
        assert_eq!(names, vec!["jane.txt", "john.md"]);
        assert_eq!(documents[0].bytes, b"Jane Doe");

        let empty = tempdir()?;
        assert!(collect_documents(&[empty.path().to_path_buf()]).await.is_err());
        Ok(())
    }
}
