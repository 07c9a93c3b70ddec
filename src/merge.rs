use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use log::{info, warn};

use crate::discovery;
use crate::error::{Error, Result};
use crate::pdf;

pub fn merged_file_name(date: NaiveDate) -> String {
    format!("Ex_{}_merged.pdf", date.format("%Y-%m-%d"))
}

/// Merge the top-level PDFs of `input_dir` into `output_dir`, named after
/// today's local date.
pub fn merge(input_dir: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Result<PathBuf> {
    merge_on(input_dir, output_dir, Local::now().date_naive())
}

/// Like [`merge`], with the date in the output name supplied by the caller.
///
/// Any file that cannot be loaded, or an unwritable output, fails the whole
/// merge. A directory without PDFs yields a document with no pages.
pub fn merge_on(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    date: NaiveDate,
) -> Result<PathBuf> {
    let (input_dir, output_dir) = (input_dir.as_ref(), output_dir.as_ref());
    let file_name = merged_file_name(date);

    let mut inputs = discovery::list_pdfs(input_dir)?;
    // A merge from an earlier run today must not be merged into itself.
    inputs.retain(|path| path.file_name() != Some(OsStr::new(&file_name)));
    if inputs.is_empty() {
        warn!("No PDF files in {}, writing an empty document", input_dir.display());
    }

    let documents = inputs
        .iter()
        .map(|path| {
            info!("Appending {}", path.display());
            Document::load(path).map_err(|source| Error::Load {
                path: path.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut merged = merge_documents(documents)?;

    fs::create_dir_all(output_dir)?;
    let output = output_dir.join(file_name);
    merged.save(&output)?;
    info!(
        "Merged {} file(s) into {}",
        inputs.len(),
        output.display()
    );
    Ok(output)
}

/// Concatenate the pages of `documents`, in order, into one document.
pub fn merge_documents(documents: Vec<Document>) -> Result<Document> {
    let mut merged = Document::with_version("1.5");
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut max_id = 1;

    for mut doc in documents {
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for page_id in doc.get_pages().into_values() {
            let mut page = doc.get_dictionary(page_id)?.clone();
            // The page is re-parented below; carry over what it inherited.
            for key in pdf::INHERITABLE {
                if !page.has(key) {
                    if let Some(value) = pdf::inherited(&doc, page_id, key) {
                        page.set(key.to_vec(), value.clone());
                    }
                }
            }
            pages.push((page_id, page));
        }

        for (id, object) in doc.objects {
            let structural = match &object {
                Object::Dictionary(dict) => matches!(
                    dict.get(b"Type").and_then(Object::as_name),
                    Ok(b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline")
                ),
                _ => false,
            };
            if !structural {
                merged.objects.insert(id, object);
            }
        }
    }

    let pages_id = (max_id, 0);
    let catalog_id = (max_id + 1, 0);
    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    let count = kids.len() as i64;

    for (id, mut page) in pages {
        page.set("Parent", pages_id);
        merged.objects.insert(id, Object::Dictionary(page));
    }
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    merged.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }),
    );
    merged.trailer.set("Root", catalog_id);
    merged.max_id = catalog_id.0;

    merged.renumber_objects();
    merged.compress();
    Ok(merged)
}
