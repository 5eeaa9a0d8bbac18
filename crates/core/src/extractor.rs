use crate::error::IngestError;
use crate::models::TextSegment;
use lopdf::Document;
use regex::Regex;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Pptx,
    Markdown,
    PlainText,
}

impl DocumentFormat {
    pub const EXTENSIONS: [&'static str; 4] = ["pdf", "pptx", "md", "txt"];

    pub fn detect(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "pptx" => Some(Self::Pptx),
            "md" => Some(Self::Markdown),
            "txt" => Some(Self::PlainText),
            _ => None,
        }
    }

    fn extractor(self) -> &'static dyn TextExtractor {
        match self {
            Self::Pdf => &PdfExtractor,
            Self::Pptx => &PptxExtractor,
            Self::Markdown | Self::PlainText => &FlatTextExtractor,
        }
    }
}

/// Turns a source file into ordered `(text, locator)` segments.
///
/// Paginated formats report one segment per page or slide, including pages
/// whose text could not be read (those carry empty text). Flat formats report
/// the whole file as one segment without a locator.
pub trait TextExtractor: Sync {
    fn extract_segments(&self, path: &Path) -> Result<Vec<TextSegment>, IngestError>;
}

pub fn extract_segments(
    path: &Path,
    format: DocumentFormat,
) -> Result<Vec<TextSegment>, IngestError> {
    format.extractor().extract_segments(path)
}

#[derive(Debug, Default)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract_segments(&self, path: &Path) -> Result<Vec<TextSegment>, IngestError> {
        let document = Document::load(path).map_err(|error| IngestError::Extraction {
            path: path.display().to_string(),
            details: error.to_string(),
        })?;

        let pages = document.get_pages();
        debug!(path = %path.display(), pages = pages.len(), "pdf loaded");

        let segments = pages
            .keys()
            .map(|page_no| {
                let text = document.extract_text(&[*page_no]).unwrap_or_else(|error| {
                    warn!(
                        path = %path.display(),
                        page = page_no,
                        error = %error,
                        "page text extraction failed"
                    );
                    String::new()
                });
                TextSegment {
                    text,
                    locator: Some(*page_no),
                }
            })
            .collect();

        Ok(segments)
    }
}

#[derive(Debug, Default)]
pub struct PptxExtractor;

impl TextExtractor for PptxExtractor {
    fn extract_segments(&self, path: &Path) -> Result<Vec<TextSegment>, IngestError> {
        let extraction_error = |details: String| IngestError::Extraction {
            path: path.display().to_string(),
            details,
        };

        let file = File::open(path)?;
        let mut archive =
            ZipArchive::new(file).map_err(|error| extraction_error(error.to_string()))?;

        let slide_name_re = Regex::new(r"^ppt/slides/slide(\d+)\.xml$")
            .map_err(|error| extraction_error(error.to_string()))?;
        let mut slides: Vec<(u32, String)> = archive
            .file_names()
            .filter_map(|name| {
                let number = slide_name_re.captures(name)?.get(1)?.as_str().parse().ok()?;
                Some((number, name.to_string()))
            })
            .collect();
        slides.sort_unstable();

        let mut segments = Vec::with_capacity(slides.len());
        for (position, (_, name)) in slides.into_iter().enumerate() {
            let locator = Some(position as u32 + 1);
            let text = match read_entry(&mut archive, &name) {
                Ok(xml) => slide_text(&xml),
                Err(details) => {
                    warn!(path = %path.display(), slide = %name, error = %details, "slide text extraction failed");
                    String::new()
                }
            };
            segments.push(TextSegment { text, locator });
        }

        Ok(segments)
    }
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<String, String> {
    let mut entry = archive.by_name(name).map_err(|error| error.to_string())?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|error| error.to_string())?;
    Ok(xml)
}

/// Collects the `<a:t>` text runs of a slide, one line per `<a:p>` paragraph.
fn slide_text(xml: &str) -> String {
    let Ok(run_re) = Regex::new(r"<a:t(?:\s[^>]*)?>([^<]*)</a:t>") else {
        return String::new();
    };

    xml.split("</a:p>")
        .map(|paragraph| {
            run_re
                .captures_iter(paragraph)
                .filter_map(|capture| capture.get(1))
                .map(|run| unescape_xml(run.as_str()))
                .collect::<String>()
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decodes the predefined XML entities and numeric character references.
/// References that do not name a valid character are kept verbatim.
fn unescape_xml(text: &str) -> String {
    let Ok(entity_re) = Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|lt|gt|quot|apos|amp);") else {
        return text.to_string();
    };

    entity_re
        .replace_all(text, |captures: &regex::Captures| {
            let entity = &captures[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => {
                    let code = match entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => entity[1..].parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| captures[0].to_string(), String::from)
        })
        .into_owned()
}

#[derive(Debug, Default)]
pub struct FlatTextExtractor;

impl TextExtractor for FlatTextExtractor {
    fn extract_segments(&self, path: &Path) -> Result<Vec<TextSegment>, IngestError> {
        let text = fs::read_to_string(path)?;
        Ok(vec![TextSegment {
            text,
            locator: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    #[test]
    fn formats_are_detected_case_insensitively() {
        assert_eq!(DocumentFormat::detect(Path::new("a/Lecture.PDF")), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::detect(Path::new("slides.pptx")), Some(DocumentFormat::Pptx));
        assert_eq!(DocumentFormat::detect(Path::new("notes.md")), Some(DocumentFormat::Markdown));
        assert_eq!(DocumentFormat::detect(Path::new("notes.TXT")), Some(DocumentFormat::PlainText));
        assert_eq!(DocumentFormat::detect(Path::new("sheet.xlsx")), None);
        assert_eq!(DocumentFormat::detect(Path::new("README")), None);
    }

    #[test]
    fn flat_text_is_one_segment_without_locator() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.md");
        fs::write(&path, "# Limits\n\nA limit describes behaviour near a point.")?;

        let segments = extract_segments(&path, DocumentFormat::Markdown)?;
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].locator, None);
        assert!(segments[0].text.starts_with("# Limits"));
        Ok(())
    }

    #[test]
    fn broken_pdf_is_an_extraction_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_segments(&path, DocumentFormat::Pdf);
        assert!(matches!(result, Err(IngestError::Extraction { .. })));
        Ok(())
    }

    #[test]
    fn unreadable_pdf_page_yields_empty_segment() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("lecture.pdf");

        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let readable = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal("Chain rule")]),
                Operation::new("ET", vec![]),
            ],
        };
        let readable_id = doc.add_object(Stream::new(dictionary! {}, readable.encode()?));
        // A font operator without operands cannot be interpreted.
        let broken_id = doc.add_object(Stream::new(dictionary! {}, b"BT\nTf\nET\n".to_vec()));

        let mut kids: Vec<Object> = Vec::new();
        for contents_id in [readable_id, broken_id, readable_id] {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => contents_id,
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 3,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(&path)?;

        let segments = extract_segments(&path, DocumentFormat::Pdf)?;
        let locators: Vec<_> = segments.iter().map(|segment| segment.locator).collect();
        assert_eq!(locators, vec![Some(1), Some(2), Some(3)]);
        assert!(segments[0].text.contains("Chain rule"));
        assert_eq!(segments[1].text, "");
        assert!(segments[2].text.contains("Chain rule"));
        Ok(())
    }

    #[test]
    fn xml_entities_and_character_references_are_decoded() {
        assert_eq!(
            unescape_xml("It&#8217;s &lt;f&#x2032;&gt;&#xA0;&amp;&#38;"),
            "It\u{2019}s <f\u{2032}>\u{a0}&&"
        );
        assert_eq!(unescape_xml("&amp;#8217; &#xD800; &nbsp;"), "&#8217; &#xD800; &nbsp;");
    }

    #[test]
    fn pptx_slides_are_numbered_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("deck.pptx");
        let mut writer = ZipWriter::new(File::create(&path)?);
        let options = SimpleFileOptions::default();

        writer.start_file("ppt/slides/slide10.xml", options)?;
        writer.write_all(b"<p:sld><a:p><a:r><a:t>Tenth</a:t></a:r></a:p></p:sld>")?;
        writer.start_file("ppt/slides/slide2.xml", options)?;
        writer.write_all(
            b"<p:sld><a:p><a:r><a:t>Vectors &amp; </a:t></a:r><a:r><a:t xml:space=\"preserve\">matrices</a:t></a:r></a:p><a:p><a:r><a:t>Second line</a:t></a:r></a:p></p:sld>",
        )?;
        writer.start_file("ppt/slides/_rels/slide2.xml.rels", options)?;
        writer.write_all(b"<Relationships/>")?;
        writer.finish()?;

        let segments = extract_segments(&path, DocumentFormat::Pptx)?;
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].locator, Some(1));
        assert_eq!(segments[0].text, "Vectors & matrices\nSecond line");
        assert_eq!(segments[1].locator, Some(2));
        assert_eq!(segments[1].text, "Tenth");
        Ok(())
    }

    #[test]
    fn not_a_zip_is_an_extraction_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("deck.pptx");
        fs::write(&path, b"plain bytes")?;

        let result = extract_segments(&path, DocumentFormat::Pptx);
        assert!(matches!(result, Err(IngestError::Extraction { .. })));
        Ok(())
    }
}
