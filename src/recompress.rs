//! In-process fallback used when Ghostscript is not installed: downsample
//! each page image above the target resolution and re-encode it as JPEG.

use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, GrayImage, RgbImage};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::pdf;
use crate::placement::{self, Dpi};
use crate::summary::ImageStats;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Resampled { from: (u32, u32), to: (u32, u32) },
    Kept,
}

/// Uniform factor that brings `source` down to `target` dpi, or `None`
/// when the image is already at or below the target.
pub fn scale_factor(target: u32, source: Dpi) -> Option<f64> {
    let target = target as f64;
    let factor = (target / source.x).min(target / source.y);
    (factor < 1.0).then_some(factor)
}

pub fn scaled_dimensions(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let scale = |v: u32| ((v as f64 * factor).floor() as u32).max(1);
    (scale(width), scale(height))
}

/// Rewrite `input` into `output` with downsampled images.
///
/// Failures on individual images are logged and counted; failing to load or
/// save the document fails the call.
pub fn recompress_pdf(input: &Path, output: &Path, dpi: u32, quality: u8) -> Result<ImageStats> {
    let mut doc = Document::load(input).map_err(|source| Error::Load {
        path: input.to_path_buf(),
        source,
    })?;

    // Saving a still-encrypted document with plaintext images would corrupt it.
    if doc.is_encrypted() {
        doc.decrypt(b"").map_err(|source| Error::Load {
            path: input.to_path_buf(),
            source,
        })?;
    }

    let placements = placement::scan_document(&doc);
    let mut seen = HashSet::new();
    let mut stats = ImageStats::default();

    for (page_number, page_id) in doc.get_pages() {
        for (name, image_id) in pdf::page_xobjects(&doc, page_id) {
            if pdf::image_stream(&doc, image_id).is_none() || !seen.insert(image_id) {
                continue;
            }
            let source_dpi = placements.get(&image_id).copied().unwrap_or(Dpi::DEFAULT);
            match downsample_image(&mut doc, image_id, source_dpi, dpi, quality) {
                Ok(ImageOutcome::Resampled { from, to }) => {
                    debug!(
                        "Page {} /{}: {}x{} -> {}x{}",
                        page_number,
                        String::from_utf8_lossy(&name),
                        from.0,
                        from.1,
                        to.0,
                        to.1
                    );
                    stats.resampled += 1;
                }
                Ok(ImageOutcome::Kept) => stats.kept += 1,
                Err(e) => {
                    warn!(
                        "  Cannot process image /{} on page {}: {}",
                        String::from_utf8_lossy(&name),
                        page_number,
                        e
                    );
                    stats.failed += 1;
                }
            }
        }
    }

    normalize_page_contents(&mut doc);
    doc.compress();
    doc.prune_objects();
    doc.save(output)?;
    Ok(stats)
}

/// Downsample one image object in place. Every resource table pointing at
/// `image_id` sees the new image.
pub fn downsample_image(
    doc: &mut Document,
    image_id: ObjectId,
    source_dpi: Dpi,
    target_dpi: u32,
    quality: u8,
) -> Result<ImageOutcome> {
    let Some(factor) = scale_factor(target_dpi, source_dpi) else {
        return Ok(ImageOutcome::Kept);
    };

    let stream = pdf::image_stream(doc, image_id)
        .ok_or_else(|| Error::UnsupportedImage(format!("object {} is not an image", image_id.0)))?;
    let smask_id = stream.dict.get(b"SMask").and_then(Object::as_reference).ok();

    let img = decode_image(doc, stream)?;
    let from = img.dimensions();
    let to = scaled_dimensions(from.0, from.1, factor);
    let resized = img.resize_exact(to.0, to.1, FilterType::Lanczos3);

    let jpeg = encode_jpeg(&resized, quality)?;
    let gray = !resized.color().has_color();

    let mut dict = stream.dict.clone();
    dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    dict.set("Width", Object::Integer(to.0 as i64));
    dict.set("Height", Object::Integer(to.1 as i64));
    dict.set(
        "ColorSpace",
        Object::Name(if gray { b"DeviceGray".to_vec() } else { b"DeviceRGB".to_vec() }),
    );
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.remove(b"DecodeParms");
    dict.remove(b"Decode");

    // Resize the soft mask first so a mask failure leaves the image untouched.
    let mask = match smask_id {
        Some(mask_id) => Some((mask_id, resize_mask(doc, mask_id, to)?)),
        None => None,
    };

    doc.objects
        .insert(image_id, Object::Stream(Stream::new(dict, jpeg)));
    if let Some((mask_id, mask)) = mask {
        doc.objects.insert(mask_id, Object::Stream(mask));
    }
    Ok(ImageOutcome::Resampled { from, to })
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    encode_jpeg_in(&std::env::temp_dir(), img, quality)
}

/// JPEG-encode through a scratch file in `dir`. The file is removed when
/// `scratch` drops, including on the error paths.
fn encode_jpeg_in(dir: &Path, img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut scratch = tempfile::Builder::new()
        .prefix("pdf-shrink-")
        .suffix(".jpg")
        .tempfile_in(dir)?;
    {
        let mut writer = BufWriter::new(scratch.as_file_mut());
        let (w, h) = img.dimensions();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            if img.color().has_color() {
                encoder.encode(img.to_rgb8().as_raw(), w, h, ColorType::Rgb8.into())?;
            } else {
                encoder.encode(img.to_luma8().as_raw(), w, h, ColorType::L8.into())?;
            }
        }
        writer.flush()?;
    }
    Ok(fs::read(scratch.path())?)
}

fn decode_image(doc: &Document, stream: &Stream) -> Result<DynamicImage> {
    let dict = &stream.dict;
    if dict.get(b"ImageMask").and_then(Object::as_bool).unwrap_or(false) {
        return Err(Error::UnsupportedImage("stencil mask".into()));
    }

    let filters = filter_names(dict);
    if filters.last() == Some(&&b"DCTDecode"[..]) {
        if decode_ranges(dict)?.is_some() {
            return Err(Error::UnsupportedImage("JPEG with a /Decode array".into()));
        }
        let mut jpeg = stream.content.clone();
        for filter in &filters[..filters.len() - 1] {
            if *filter != b"FlateDecode" {
                return Err(Error::UnsupportedImage(format!(
                    "{} before DCTDecode",
                    String::from_utf8_lossy(filter)
                )));
            }
            jpeg = inflate(&jpeg)?;
        }
        return Ok(image::load_from_memory(&jpeg)?);
    }

    let bits = dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8);
    if bits != 8 {
        return Err(Error::UnsupportedImage(format!("{} bits per component", bits)));
    }

    let width = pdf::dict_u32(dict, b"Width")
        .ok_or_else(|| Error::UnsupportedImage("missing /Width".into()))?;
    let height = pdf::dict_u32(dict, b"Height")
        .ok_or_else(|| Error::UnsupportedImage("missing /Height".into()))?;
    let mut samples = decompress_stream(stream)?;
    let components = color_components(doc, dict, samples.len(), width, height)?;

    let needed = width as usize * height as usize * components;
    if samples.len() < needed {
        return Err(Error::UnsupportedImage(format!(
            "expected {} sample bytes, found {}",
            needed,
            samples.len()
        )));
    }
    samples.truncate(needed);
    if let Some(ranges) = decode_ranges(dict)? {
        if ranges.len() != components {
            return Err(Error::UnsupportedImage(format!(
                "/Decode has {} ranges for {} components",
                ranges.len(),
                components
            )));
        }
        apply_decode(&mut samples, &ranges);
    }

    let img = match components {
        1 => GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
        4 => RgbImage::from_raw(width, height, cmyk_to_rgb(&samples)).map(DynamicImage::ImageRgb8),
        n => return Err(Error::UnsupportedImage(format!("{} color components", n))),
    };
    img.ok_or_else(|| Error::UnsupportedImage("sample buffer does not match dimensions".into()))
}

fn filter_names(dict: &Dictionary) -> Vec<&[u8]> {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![n.as_slice()],
        Ok(Object::Array(filters)) => filters
            .iter()
            .filter_map(|f| f.as_name().ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn has_filter(dict: &Dictionary, name: &[u8]) -> bool {
    filter_names(dict).iter().any(|filter| *filter == name)
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut buffer = Vec::new();
    decoder.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// `/Decode` as (min, max) pairs, or `None` when absent or the identity
/// mapping.
fn decode_ranges(dict: &Dictionary) -> Result<Option<Vec<(f64, f64)>>> {
    let Ok(decode) = dict.get(b"Decode") else {
        return Ok(None);
    };
    let values = decode
        .as_array()
        .ok()
        .and_then(|values| values.iter().map(pdf::number).collect::<Option<Vec<_>>>())
        .filter(|values| !values.is_empty() && values.len() % 2 == 0)
        .ok_or_else(|| Error::UnsupportedImage("malformed /Decode array".into()))?;
    let ranges: Vec<(f64, f64)> = values.chunks_exact(2).map(|r| (r[0], r[1])).collect();
    if ranges.iter().all(|&range| range == (0.0, 1.0)) {
        Ok(None)
    } else {
        Ok(Some(ranges))
    }
}

/// Map 8-bit samples through per-component decode ranges, so the bytes
/// mean what the page shows once `/Decode` is dropped.
fn apply_decode(samples: &mut [u8], ranges: &[(f64, f64)]) {
    for pixel in samples.chunks_exact_mut(ranges.len()) {
        for (sample, &(min, max)) in pixel.iter_mut().zip(ranges) {
            let value = min + (*sample as f64 / 255.0) * (max - min);
            *sample = (value * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn decompress_stream(stream: &Stream) -> Result<Vec<u8>> {
    if stream.dict.get(b"Filter").is_err() {
        return Ok(stream.content.clone());
    }
    match stream.decompressed_content() {
        Ok(content) => Ok(content),
        Err(e) if has_filter(&stream.dict, b"FlateDecode") => {
            // lopdf rejects some streams with trailing garbage; zlib alone copes.
            inflate(&stream.content).map_err(|_| Error::Pdf(e))
        }
        Err(e) => Err(Error::Pdf(e)),
    }
}

fn color_components(
    doc: &Document,
    dict: &Dictionary,
    len: usize,
    width: u32,
    height: u32,
) -> Result<usize> {
    let space = dict.get(b"ColorSpace").ok().and_then(|cs| pdf::resolve(doc, cs));
    let family = |name: &[u8]| match name {
        b"DeviceGray" | b"CalGray" => Ok(1),
        b"DeviceRGB" | b"CalRGB" => Ok(3),
        b"DeviceCMYK" => Ok(4),
        other => Err(Error::UnsupportedImage(format!(
            "color space {}",
            String::from_utf8_lossy(other)
        ))),
    };

    match space {
        Some(Object::Name(name)) => family(name.as_slice()),
        Some(Object::Array(parts)) => match parts.first() {
            Some(Object::Name(name)) if name == b"ICCBased" => parts
                .get(1)
                .and_then(|profile| pdf::resolve(doc, profile))
                .and_then(|profile| profile.as_stream().ok())
                .and_then(|profile| profile.dict.get(b"N").and_then(Object::as_i64).ok())
                .map(|n| n as usize)
                .ok_or_else(|| Error::UnsupportedImage("ICC profile without /N".into())),
            Some(Object::Name(name)) => family(name.as_slice()),
            _ => Err(Error::UnsupportedImage("malformed color space".into())),
        },
        _ => {
            let pixels = width as usize * height as usize;
            Ok(if len == pixels {
                1
            } else if len == pixels * 4 {
                4
            } else {
                3
            })
        }
    }
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|cmyk| {
            let k = 1.0 - cmyk[3] as f32 / 255.0;
            let channel = |v: u8| ((1.0 - v as f32 / 255.0) * k * 255.0) as u8;
            [channel(cmyk[0]), channel(cmyk[1]), channel(cmyk[2])]
        })
        .collect()
}

/// Resize a soft mask to the new image size and store it Flate-compressed.
fn resize_mask(doc: &Document, mask_id: ObjectId, size: (u32, u32)) -> Result<Stream> {
    let stream = match doc.get_object(mask_id)? {
        Object::Stream(stream) => stream,
        _ => return Err(Error::UnsupportedImage("SMask is not a stream".into())),
    };
    let mask = match decode_image(doc, stream)? {
        DynamicImage::ImageLuma8(gray) => gray,
        other => other.to_luma8(),
    };
    let resized = image::imageops::resize(&mask, size.0, size.1, FilterType::Lanczos3);

    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
    encoder.write_all(resized.as_raw())?;
    let compressed = encoder.finish()?;

    let mut dict = stream.dict.clone();
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    dict.set("Width", Object::Integer(size.0 as i64));
    dict.set("Height", Object::Integer(size.1 as i64));
    dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.remove(b"DecodeParms");
    dict.remove(b"Decode");
    Ok(Stream::new(dict, compressed))
}

/// Re-encode each page's content stream in canonical form. Pages whose
/// content lopdf cannot parse are left alone.
fn normalize_page_contents(doc: &mut Document) {
    let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
    for (page_number, page_id) in pages {
        let normalized = doc
            .get_page_content(page_id)
            .and_then(|raw| Content::decode(&raw))
            .and_then(|content| content.encode());
        let result = normalized.and_then(|bytes| doc.change_page_content(page_id, bytes));
        if let Err(e) = result {
            debug!("Page {}: content left as-is: {}", page_number, e);
        }
    }
}
