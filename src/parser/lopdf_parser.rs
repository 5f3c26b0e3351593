//! Pure-Rust backend built on `lopdf`.
//!
//! Text comes from lopdf's per-page text extraction. Images are counted from
//! the `XObject` resources reachable from the page (inherited resources and
//! nested form XObjects included). Ruling lines are recovered by replaying
//! the path operators of the page content stream; the current transformation
//! matrix is ignored, which is accurate for the unscaled coordinate systems
//! table generators use.

use super::{encrypted, PageContent, ParsedDocument, PdfParser};
use crate::error::ValidationError;
use crate::pipeline::tables::Segment;
use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashSet;
use tracing::debug;

/// Maximum depth followed through `Parent` links and nested form XObjects.
const MAX_NESTING: usize = 16;

/// The default, dependency-free parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfParser;

impl PdfParser for LopdfParser {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn ParsedDocument + 'a>, ValidationError> {
        let doc = Document::load_mem(bytes).map_err(|e| ValidationError::InvalidFormat {
            detail: format!("cannot read PDF structure: {e}"),
        })?;

        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(encrypted());
        }

        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
        debug!("lopdf opened document with {} pages", pages.len());

        Ok(Box::new(LopdfDocument { doc, pages }))
    }
}

struct LopdfDocument {
    doc: Document,
    /// (1-based page number, page object) in page order.
    pages: Vec<(u32, ObjectId)>,
}

impl ParsedDocument for LopdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, index: usize) -> Result<PageContent, String> {
        let (page_num, page_id) = *self
            .pages
            .get(index)
            .ok_or_else(|| format!("page index {index} out of range"))?;

        let content = self
            .doc
            .get_and_decode_page_content(page_id)
            .map_err(|e| format!("content stream could not be decoded: {e}"))?;

        // Fonts lopdf cannot map to Unicode (e.g. Identity-H without a
        // ToUnicode CMap) fail the whole text call; keep the rest of the page.
        let (text, text_error) = match self.doc.extract_text(&[page_num]) {
            Ok(text) => (text, None),
            Err(e) => (String::new(), Some(format!("text extraction failed: {e}"))),
        };

        Ok(PageContent {
            text,
            image_count: count_page_images(&self.doc, page_id),
            segments: collect_segments(&content.operations),
            text_error,
        })
    }
}

// ── Images ────────────────────────────────────────────────────────────────

fn count_page_images(doc: &Document, page_id: ObjectId) -> usize {
    let Some(resources) = page_resources(doc, page_id) else {
        return 0;
    };
    let mut seen = HashSet::new();
    count_in_resources(doc, resources, &mut seen, 0)
}

/// The page's `Resources`, following `Parent` links for inherited ones.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_NESTING {
        if let Some(resources) = node.get(b"Resources").ok().and_then(|r| resolve_dict(doc, r)) {
            return Some(resources);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    let (_, object) = doc.dereference(object).ok()?;
    object.as_dict().ok()
}

fn count_in_resources(
    doc: &Document,
    resources: &Dictionary,
    seen: &mut HashSet<ObjectId>,
    depth: usize,
) -> usize {
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|x| resolve_dict(doc, x))
    else {
        return 0;
    };

    let mut count = 0;
    for (_, value) in xobjects.iter() {
        let Ok((id, object)) = doc.dereference(value) else {
            continue;
        };
        if let Some(id) = id {
            if !seen.insert(id) {
                continue;
            }
        }
        let Ok(stream) = object.as_stream() else {
            continue;
        };
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => count += 1,
            Ok(b"Form") if depth < MAX_NESTING => {
                if let Some(inner) = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|r| resolve_dict(doc, r))
                {
                    count += count_in_resources(doc, inner, seen, depth + 1);
                }
            }
            _ => {}
        }
    }
    count
}

// ── Ruling lines ──────────────────────────────────────────────────────────

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn operands<const N: usize>(op: &Operation) -> Option<[f32; N]> {
    if op.operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, object) in out.iter_mut().zip(&op.operands) {
        *slot = number(object)?;
    }
    Some(out)
}

/// Replay path construction and keep the segments of painted paths.
fn collect_segments(operations: &[Operation]) -> Vec<Segment> {
    let mut painted = Vec::new();
    let mut path: Vec<Segment> = Vec::new();
    let mut current: Option<(f32, f32)> = None;
    let mut subpath_start: Option<(f32, f32)> = None;

    for op in operations {
        match op.operator.as_str() {
            "m" => {
                if let Some([x, y]) = operands::<2>(op) {
                    current = Some((x, y));
                    subpath_start = Some((x, y));
                }
            }
            "l" => {
                if let (Some([x, y]), Some((cx, cy))) = (operands::<2>(op), current) {
                    path.push(Segment::new(cx, cy, x, y));
                    current = Some((x, y));
                }
            }
            "re" => {
                if let Some([x, y, w, h]) = operands::<4>(op) {
                    path.extend(Segment::from_rect(x, y, w, h));
                    current = Some((x, y));
                    subpath_start = Some((x, y));
                }
            }
            "h" => close_subpath(&mut path, &mut current, subpath_start),
            "s" | "b" | "b*" => {
                close_subpath(&mut path, &mut current, subpath_start);
                painted.append(&mut path);
            }
            "S" | "f" | "F" | "f*" | "B" | "B*" => painted.append(&mut path),
            "n" => path.clear(),
            _ => {}
        }
    }
    painted
}

fn close_subpath(
    path: &mut Vec<Segment>,
    current: &mut Option<(f32, f32)>,
    start: Option<(f32, f32)>,
) {
    if let (Some((cx, cy)), Some((sx, sy))) = (*current, start) {
        if (cx, cy) != (sx, sy) {
            path.push(Segment::new(cx, cy, sx, sy));
        }
        *current = Some((sx, sy));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(operator: &str, nums: &[f32]) -> Operation {
        Operation::new(operator, nums.iter().map(|n| Object::Real(*n as _)).collect())
    }

    #[test]
    fn stroked_lines_are_collected() {
        let ops = vec![
            op("m", &[10.0, 10.0]),
            op("l", &[110.0, 10.0]),
            op("S", &[]),
        ];
        assert_eq!(
            collect_segments(&ops),
            vec![Segment::new(10.0, 10.0, 110.0, 10.0)]
        );
    }

    #[test]
    fn discarded_paths_are_ignored() {
        let ops = vec![op("re", &[0.0, 0.0, 50.0, 50.0]), op("n", &[])];
        assert!(collect_segments(&ops).is_empty());
    }

    #[test]
    fn closed_path_adds_closing_edge() {
        let ops = vec![
            op("m", &[0.0, 0.0]),
            op("l", &[100.0, 0.0]),
            op("l", &[100.0, 50.0]),
            op("s", &[]),
        ];
        let segs = collect_segments(&ops);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[2], Segment::new(100.0, 50.0, 0.0, 0.0));
    }

    #[test]
    fn filled_rectangle_contributes_edges() {
        let ops = vec![op("re", &[0.0, 0.0, 100.0, 40.0]), op("f", &[])];
        assert_eq!(collect_segments(&ops).len(), 4);
    }

    #[test]
    fn integer_operands_are_accepted() {
        let ops = vec![
            Operation::new("m", vec![Object::Integer(5), Object::Integer(5)]),
            Operation::new("l", vec![Object::Integer(5), Object::Integer(95)]),
            Operation::new("S", vec![]),
        ];
        assert_eq!(collect_segments(&ops), vec![Segment::new(5.0, 5.0, 5.0, 95.0)]);
    }

    /// One page drawn with a Type0 Identity-H font lacking a ToUnicode map,
    /// plus a small image.
    fn identity_font_pdf(encrypt: bool) -> Vec<u8> {
        use lopdf::content::Content;
        use lopdf::{dictionary, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "NotoSansCJK",
            "Encoding" => "Identity-H",
        });
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0u8; 4],
        ));
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Tj", vec![Object::string_literal(vec![0u8, 0x21])]),
                Operation::new("ET", vec![]),
                Operation::new("Do", vec!["Im1".into()]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 200.into(), 200.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        if encrypt {
            let encrypt_id = doc.add_object(dictionary! {
                "Filter" => "Standard",
                "V" => 1,
                "R" => 2,
            });
            doc.trailer.set("Encrypt", encrypt_id);
        }
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn undecodable_font_keeps_images() {
        let bytes = identity_font_pdf(false);
        let document = LopdfParser.open(&bytes).unwrap();
        assert_eq!(document.page_count(), 1);

        let page = document.page(0).unwrap();
        assert_eq!(page.image_count, 1);
        assert!(page.text.is_empty());
        assert!(page.text_error.is_some());
    }

    #[test]
    fn encrypted_document_is_rejected() {
        let err = LopdfParser.open(&identity_font_pdf(true)).err();
        assert_eq!(err, Some(crate::parser::encrypted()));
    }

    #[test]
    fn garbage_is_invalid_format() {
        let err = LopdfParser.open(b"%PDF-1.4 this is not a pdf").err();
        assert!(matches!(err, Some(ValidationError::InvalidFormat { .. })));
    }
}
