//! Effective image resolution, derived from where each image is painted.
//!
//! A page content stream paints an image with `/Name Do` under the current
//! transformation matrix; the matrix's axis lengths give the painted size in
//! points (72 per inch). Images that are never painted fall back to
//! [`Dpi::DEFAULT`].

use std::collections::HashMap;

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use log::debug;

use crate::pdf;

const POINTS_PER_INCH: f64 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dpi {
    pub x: f64,
    pub y: f64,
}

impl Dpi {
    pub const DEFAULT: Dpi = Dpi { x: 300.0, y: 300.0 };

    /// Keeps the lower resolution on each axis.
    fn min(self, other: Dpi) -> Dpi {
        Dpi {
            x: self.x.min(other.x),
            y: self.y.min(other.y),
        }
    }
}

/// `[a b c d e f]` as used by the `cm` operator.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// `self × other`.
    fn multiply(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() != 6 {
            return None;
        }
        let mut values = [0.0; 6];
        for (slot, operand) in values.iter_mut().zip(operands) {
            *slot = pdf::number(operand)?;
        }
        Some(Matrix(values))
    }

    fn width(&self) -> f64 {
        self.0[0].hypot(self.0[1])
    }

    fn height(&self) -> f64 {
        self.0[2].hypot(self.0[3])
    }
}

/// Lowest effective resolution of each painted image, over all pages.
pub fn scan_document(doc: &Document) -> HashMap<ObjectId, Dpi> {
    let mut found: HashMap<ObjectId, Dpi> = HashMap::new();
    for (page_number, page_id) in doc.get_pages() {
        let content = match doc
            .get_page_content(page_id)
            .and_then(|raw| Content::decode(&raw))
        {
            Ok(content) => content,
            Err(e) => {
                debug!("Page {}: cannot read content stream: {}", page_number, e);
                continue;
            }
        };
        let xobjects: HashMap<Vec<u8>, ObjectId> =
            pdf::page_xobjects(doc, page_id).into_iter().collect();

        let mut stack = vec![Matrix::IDENTITY];
        for op in &content.operations {
            match op.operator.as_str() {
                "q" => {
                    let top = stack.last().copied().unwrap_or(Matrix::IDENTITY);
                    stack.push(top);
                }
                "Q" => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                "cm" => {
                    if let (Some(m), Some(top)) =
                        (Matrix::from_operands(&op.operands), stack.last_mut())
                    {
                        *top = m.multiply(top);
                    }
                }
                "Do" => {
                    let Some(id) = op
                        .operands
                        .first()
                        .and_then(|name| name.as_name().ok())
                        .and_then(|name| xobjects.get(name))
                    else {
                        continue;
                    };
                    let ctm = stack.last().copied().unwrap_or(Matrix::IDENTITY);
                    if let Some(dpi) = painted_dpi(doc, *id, &ctm) {
                        found
                            .entry(*id)
                            .and_modify(|seen| *seen = seen.min(dpi))
                            .or_insert(dpi);
                    }
                }
                _ => {}
            }
        }
    }
    found
}

fn painted_dpi(doc: &Document, id: ObjectId, ctm: &Matrix) -> Option<Dpi> {
    let stream = pdf::image_stream(doc, id)?;
    let width = pdf::dict_u32(&stream.dict, b"Width")?;
    let height = pdf::dict_u32(&stream.dict, b"Height")?;
    let (w_in, h_in) = (ctm.width() / POINTS_PER_INCH, ctm.height() / POINTS_PER_INCH);
    if w_in <= 0.0 || h_in <= 0.0 {
        return None;
    }
    Some(Dpi {
        x: width as f64 / w_in,
        y: height as f64 / h_in,
    })
}
