//! PDF document ingestion.
//!
//! Parses uploaded PDF bytes into a [`Document`] plus page-scoped
//! [`ContentUnit`]s: per-page text in reading order (best effort) and
//! embedded raster image XObjects. Ingestion has no persistence side
//! effects; the pipeline decides what to store.
//!
//! Pages whose text cannot be extracted are skipped rather than failing
//! the whole document; a PDF that cannot be parsed at all is rejected
//! as [`PipelineError::CorruptDocument`], and bytes that are not a PDF
//! as [`PipelineError::UnsupportedFormat`].

use chrono::Utc;
use lopdf::{Document as PdfDocument, Object, ObjectId};
use sha2::{Digest, Sha256};

use folio_core::error::PipelineError;
use folio_core::models::{ContentUnit, Document, UnitKind};

/// How far into the file the `%PDF-` header may legally appear.
const HEADER_SCAN_BYTES: usize = 1024;

/// Parse PDF bytes into a document and its content units.
///
/// The document id is derived from the content and filename, so
/// re-uploading identical bytes yields the same id while a changed
/// file produces a new, superseding document.
pub fn ingest(bytes: &[u8], filename: &str) -> Result<(Document, Vec<ContentUnit>), PipelineError> {
    if !looks_like_pdf(bytes) {
        return Err(PipelineError::UnsupportedFormat(format!(
            "{}: missing %PDF header",
            filename
        )));
    }

    let pdf = PdfDocument::load_mem(bytes)
        .map_err(|e| PipelineError::CorruptDocument(e.to_string()))?;

    let pages = pdf.get_pages();
    if pages.is_empty() {
        return Err(PipelineError::CorruptDocument(format!(
            "{}: no pages",
            filename
        )));
    }

    let document = Document {
        id: document_id(bytes, filename),
        filename: filename.to_string(),
        page_count: pages.len(),
        ingested_at: Utc::now(),
    };

    let mut units = Vec::new();
    for (&page_no, &page_id) in &pages {
        // Best effort: a page that fails text extraction still
        // contributes its images.
        if let Ok(text) = pdf.extract_text(&[page_no]) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                units.push(ContentUnit {
                    document_id: document.id.clone(),
                    page: page_no,
                    kind: UnitKind::Text(trimmed.to_string()),
                });
            }
        }

        for bytes in page_images(&pdf, page_id) {
            units.push(ContentUnit {
                document_id: document.id.clone(),
                page: page_no,
                kind: UnitKind::Image {
                    bytes,
                    caption: None,
                },
            });
        }
    }

    Ok((document, units))
}

/// Stable content-derived document identifier.
fn document_id(bytes: &[u8], filename: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update(bytes);
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

fn looks_like_pdf(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_SCAN_BYTES)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// Extract the raw bytes of each image XObject referenced by a page.
///
/// Walks Page → Resources → XObject and collects streams whose
/// `Subtype` is `Image`. Flate-compressed sample data is inflated;
/// natively encoded formats (e.g. DCT/JPEG) are carried as-is.
fn page_images(pdf: &PdfDocument, page_id: ObjectId) -> Vec<Vec<u8>> {
    let mut images = Vec::new();

    let page = match pdf.get_dictionary(page_id) {
        Ok(d) => d,
        Err(_) => return images,
    };
    let resources = match page.get(b"Resources").map(|o| resolve(pdf, o)) {
        Ok(Object::Dictionary(d)) => d,
        _ => return images,
    };
    let xobjects = match resources.get(b"XObject").map(|o| resolve(pdf, o)) {
        Ok(Object::Dictionary(d)) => d,
        _ => return images,
    };

    for (_name, obj) in xobjects.iter() {
        let stream = match resolve(pdf, obj) {
            Object::Stream(s) => s,
            _ => continue,
        };
        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|n| n == b"Image")
            .unwrap_or(false);
        if !is_image {
            continue;
        }
        let bytes = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        if !bytes.is_empty() {
            images.push(bytes);
        }
    }

    images
}

/// Follow a reference to its target object; other objects pass through.
fn resolve<'a>(pdf: &'a PdfDocument, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => pdf.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Stream};

    /// Build a one-page PDF with the given text and, optionally, a tiny
    /// embedded image XObject.
    fn build_pdf(text: &str, with_image: bool) -> Vec<u8> {
        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });

        let mut resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        };
        if with_image {
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => 1,
                    "Height" => 1,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                vec![0xAB],
            ));
            resources.set("XObject", dictionary! { "Im0" => image_id });
        }
        let resources_id = doc.add_object(resources);

        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn non_pdf_bytes_are_unsupported() {
        let err = ingest(b"hello, not a pdf", "notes.txt").unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
    }

    #[test]
    fn pdf_header_with_garbage_body_is_corrupt() {
        let err = ingest(b"%PDF-1.4\ngarbage without any structure", "bad.pdf").unwrap_err();
        assert!(matches!(err, PipelineError::CorruptDocument(_)));
    }

    #[test]
    fn extracts_page_text() {
        let bytes = build_pdf("grounding test phrase", false);
        let (doc, units) = ingest(&bytes, "sample.pdf").unwrap();
        assert_eq!(doc.page_count, 1);
        assert_eq!(doc.filename, "sample.pdf");
        let text = units
            .iter()
            .find_map(|u| match &u.kind {
                UnitKind::Text(t) => Some(t.clone()),
                _ => None,
            })
            .expect("expected a text unit");
        assert!(text.contains("grounding test phrase"), "got: {}", text);
        assert_eq!(units[0].page, 1);
    }

    #[test]
    fn extracts_embedded_images_with_page_tag() {
        let bytes = build_pdf("page with a figure", true);
        let (_, units) = ingest(&bytes, "figure.pdf").unwrap();
        let image = units
            .iter()
            .find(|u| matches!(u.kind, UnitKind::Image { .. }))
            .expect("expected an image unit");
        assert_eq!(image.page, 1);
        match &image.kind {
            UnitKind::Image { bytes, caption } => {
                assert_eq!(bytes.as_slice(), &[0xAB]);
                assert!(caption.is_none());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn document_id_is_stable_per_content() {
        let bytes = build_pdf("same content", false);
        let (a, _) = ingest(&bytes, "a.pdf").unwrap();
        let (b, _) = ingest(&bytes, "a.pdf").unwrap();
        assert_eq!(a.id, b.id);

        let (c, _) = ingest(&bytes, "renamed.pdf").unwrap();
        assert_ne!(a.id, c.id);
    }
}
