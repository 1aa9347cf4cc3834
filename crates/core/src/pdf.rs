use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object};
use tracing::warn;

use crate::error::{FolioError, Result};

/// Extracts plain text per page, 0-based position = page ordinal - 1.
pub fn extract_page_texts(path: &Path) -> Result<Vec<String>> {
    let pages = pdf_extract::extract_text_by_pages(path)?;
    Ok(pages.into_iter().map(|text| text.trim().to_string()).collect())
}

/// Extracts embedded raster images page by page, writing each to
/// `pagina<N>_img<M>.<ext>` under `out_dir`. Returns the written paths
/// keyed by 1-based page ordinal.
pub fn extract_embedded_images(path: &Path, out_dir: &Path) -> Result<BTreeMap<u32, Vec<PathBuf>>> {
    fs::create_dir_all(out_dir)?;
    let document = Document::load(path)?;
    let mut by_page = BTreeMap::new();
    for (page_number, page_id) in document.get_pages() {
        let mut written = Vec::new();
        for stream_id in page_image_xobjects(&document, page_id) {
            let object = match document.get_object(stream_id) {
                Ok(object) => object,
                Err(_) => continue,
            };
            let stream = match object.as_stream() {
                Ok(stream) => stream,
                Err(_) => continue,
            };
            let index = written.len() as u32 + 1;
            match write_image_stream(&document, stream, out_dir, page_number, index) {
                Ok(Some(path)) => written.push(path),
                Ok(None) => {}
                Err(err) => {
                    warn!(page = page_number, %err, "skipping unreadable embedded image");
                }
            }
        }
        if !written.is_empty() {
            by_page.insert(page_number, written);
        }
    }
    Ok(by_page)
}

/// Object ids of the image XObjects reachable from a page's resources.
fn page_image_xobjects(document: &Document, page_id: (u32, u16)) -> Vec<(u32, u16)> {
    let mut ids = Vec::new();
    let (direct, resource_ids) = match document.get_page_resources(page_id) {
        Ok(res) => res,
        Err(_) => return ids,
    };
    if let Some(resources) = direct {
        collect_image_ids(document, resources, &mut ids);
    }
    for resource_id in resource_ids {
        if let Ok(resources) = document.get_object(resource_id).and_then(Object::as_dict) {
            collect_image_ids(document, resources, &mut ids);
        }
    }
    ids
}

fn collect_image_ids(document: &Document, resources: &Dictionary, ids: &mut Vec<(u32, u16)>) {
    let Ok(xobjects) = resources.get(b"XObject").and_then(|obj| resolve(document, obj)) else {
        return;
    };
    let Ok(xobjects) = xobjects.as_dict() else {
        return;
    };
    for (_name, entry) in xobjects.iter() {
        let Ok(id) = entry.as_reference() else {
            continue;
        };
        let is_image = document
            .get_object(id)
            .and_then(Object::as_stream)
            .and_then(|stream| stream.dict.get(b"Subtype"))
            .and_then(Object::as_name)
            .map(|name| name == b"Image")
            .unwrap_or(false);
        if is_image && !ids.contains(&id) {
            ids.push(id);
        }
    }
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> lopdf::Result<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id),
        other => Ok(other),
    }
}

fn write_image_stream(
    document: &Document,
    stream: &lopdf::Stream,
    out_dir: &Path,
    page: u32,
    index: u32,
) -> Result<Option<PathBuf>> {
    let filters = filter_names(document, &stream.dict);
    // DCT and JPX payloads are complete image files already; anything else
    // must be rebuilt from the decompressed sample data.
    if filters.iter().any(|f| f == "DCTDecode") {
        let path = out_dir.join(format!("pagina{page}_img{index}.jpg"));
        fs::write(&path, &stream.content)?;
        return Ok(Some(path));
    }
    if filters.iter().any(|f| f == "JPXDecode") {
        let path = out_dir.join(format!("pagina{page}_img{index}.jp2"));
        fs::write(&path, &stream.content)?;
        return Ok(Some(path));
    }
    let Some(image) = decode_raw_samples(stream)? else {
        return Ok(None);
    };
    let path = out_dir.join(format!("pagina{page}_img{index}.png"));
    image.save(&path)?;
    Ok(Some(path))
}

fn filter_names(document: &Document, dict: &Dictionary) -> Vec<String> {
    let Ok(filter) = dict.get(b"Filter").and_then(|obj| resolve(document, obj)) else {
        return Vec::new();
    };
    match filter {
        Object::Name(name) => vec![String::from_utf8_lossy(name).into_owned()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| item.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}

/// Rebuilds 8-bit gray or RGB sample data into a PNG-writable image.
fn decode_raw_samples(stream: &lopdf::Stream) -> Result<Option<image::DynamicImage>> {
    let width = dict_u32(&stream.dict, b"Width")?;
    let height = dict_u32(&stream.dict, b"Height")?;
    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8);
    if bits != 8 {
        return Ok(None);
    }
    let color_space = stream
        .dict
        .get(b"ColorSpace")
        .and_then(Object::as_name)
        .map(|name| name.to_vec())
        .unwrap_or_default();
    let content = stream
        .decompressed_content()
        .map_err(|e| FolioError::Pdf(format!("failed to decompress image stream: {e}")))?;
    let expected_rgb = (width as usize) * (height as usize) * 3;
    let expected_gray = (width as usize) * (height as usize);
    let image = match color_space.as_slice() {
        b"DeviceRGB" if content.len() >= expected_rgb => {
            image::RgbImage::from_raw(width, height, content[..expected_rgb].to_vec())
                .map(image::DynamicImage::ImageRgb8)
        }
        b"DeviceGray" if content.len() >= expected_gray => {
            image::GrayImage::from_raw(width, height, content[..expected_gray].to_vec())
                .map(image::DynamicImage::ImageLuma8)
        }
        _ => None,
    };
    Ok(image)
}

fn dict_u32(dict: &Dictionary, key: &[u8]) -> Result<u32> {
    let value = dict
        .get(key)
        .and_then(Object::as_i64)
        .map_err(|e| FolioError::Pdf(format!("image stream missing {:?}: {e}", String::from_utf8_lossy(key))))?;
    u32::try_from(value).map_err(|_| FolioError::InvalidDocument("negative image dimension"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};
    use tempfile::tempdir;

    fn pdf_with_jpeg_xobject(path: &Path) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 4,
                "Height" => 4,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
        ));
        let resources_id = doc.add_object(dictionary! {
            "XObject" => dictionary! { "Im1" => Object::Reference(image_id) },
        });
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"q Q".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => Object::Reference(content_id),
            "Resources" => Object::Reference(resources_id),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn embedded_jpeg_is_written_with_deterministic_name() {
        let dir = tempdir().unwrap();
        let pdf_path = dir.path().join("doc.pdf");
        pdf_with_jpeg_xobject(&pdf_path);

        let out_dir = dir.path().join("immagini");
        let by_page = extract_embedded_images(&pdf_path, &out_dir).unwrap();
        let paths = by_page.get(&1).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("pagina1_img1.jpg"));
        assert_eq!(fs::read(&paths[0]).unwrap()[..2], [0xFF, 0xD8]);
    }

    #[test]
    fn pages_without_images_are_absent_from_the_map() {
        let dir = tempdir().unwrap();
        let pdf_path = dir.path().join("plain.pdf");
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"q Q".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => Object::Reference(content_id),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(&pdf_path).unwrap();

        let out_dir = dir.path().join("immagini");
        let by_page = extract_embedded_images(&pdf_path, &out_dir).unwrap();
        assert!(by_page.is_empty());
    }
}
