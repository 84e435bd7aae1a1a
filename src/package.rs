use std::collections::HashMap;
use std::io::{Cursor, Read};

use crate::error::Error;

const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

const DEFAULT_DOCUMENT_PATH: &str = "word/document.xml";

#[derive(Clone, Debug)]
pub(crate) struct Relationship {
    pub(crate) rel_type: String,
    pub(crate) target: String,
    pub(crate) external: bool,
}

impl Relationship {
    /// Matches on the last path segment of the relationship type so both the
    /// transitional and strict OOXML namespaces are accepted.
    pub(crate) fn is(&self, kind: &str) -> bool {
        self.rel_type.rsplit('/').next() == Some(kind)
    }
}

#[derive(Default)]
struct ContentTypes {
    defaults: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl ContentTypes {
    fn parse(xml_content: &str) -> Self {
        let mut types = ContentTypes::default();
        let Ok(xml) = roxmltree::Document::parse(xml_content) else {
            log::warn!("[Content_Types].xml is not well-formed, falling back to extensions");
            return types;
        };
        for node in xml.root_element().children() {
            if node.tag_name().namespace() != Some(CONTENT_TYPES_NS) {
                continue;
            }
            let Some(content_type) = node.attribute("ContentType") else {
                continue;
            };
            match node.tag_name().name() {
                "Default" => {
                    if let Some(ext) = node.attribute("Extension") {
                        types
                            .defaults
                            .insert(ext.to_ascii_lowercase(), content_type.to_string());
                    }
                }
                "Override" => {
                    if let Some(part) = node.attribute("PartName") {
                        let part = part.trim_start_matches('/').to_ascii_lowercase();
                        types.overrides.insert(part, content_type.to_string());
                    }
                }
                _ => {}
            }
        }
        types
    }

    fn lookup(&self, path: &str) -> Option<&str> {
        if let Some(ct) = self.overrides.get(&path.to_ascii_lowercase()) {
            return Some(ct);
        }
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        self.defaults.get(&ext).map(String::as_str)
    }
}

/// Guess a content type from the file extension when [Content_Types].xml has no entry.
fn content_type_from_extension(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        "wmf" => "image/x-wmf",
        "emf" => "image/x-emf",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

pub(crate) fn parse_rels_xml(xml_content: &str) -> HashMap<String, Relationship> {
    let mut rels = HashMap::new();
    let Ok(xml) = roxmltree::Document::parse(xml_content) else {
        log::warn!("relationship part is not well-formed XML, ignoring it");
        return rels;
    };
    for node in xml.root_element().children() {
        if node.tag_name().name() == "Relationship"
            && let (Some(id), Some(target)) = (node.attribute("Id"), node.attribute("Target"))
        {
            rels.insert(
                id.to_string(),
                Relationship {
                    rel_type: node.attribute("Type").unwrap_or("").to_string(),
                    target: target.to_string(),
                    external: node.attribute("TargetMode") == Some("External"),
                },
            );
        }
    }
    rels
}

/// Resolve a relationship target against the directory of its source part,
/// e.g. ("word", "media/image1.png") → "word/media/image1.png".
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None if base_dir.is_empty() => target.to_string(),
        None => format!("{base_dir}/{target}"),
    };
    let mut segments: Vec<&str> = Vec::new();
    for seg in joined.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Path of the .rels part describing `part_path`,
/// e.g. "word/document.xml" → "word/_rels/document.xml.rels".
pub(crate) fn rels_path_for(part_path: &str) -> String {
    match part_path.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_path}.rels"),
    }
}

fn parent_dir(part_path: &str) -> &str {
    part_path.rsplit_once('/').map(|(d, _)| d).unwrap_or("")
}

/// Local file header or empty-archive end-of-central-directory signature.
pub(crate) fn has_zip_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06")
}

fn decode_xml_text(path: &str, data: Vec<u8>) -> Result<String, Error> {
    let text = String::from_utf8(data)
        .map_err(|_| Error::Corrupt(format!("{path} is not valid UTF-8")))?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

/// An opened OOXML package. Parts are read from the archive on demand.
pub(crate) struct Package<'a> {
    zip: zip::ZipArchive<Cursor<&'a [u8]>>,
    content_types: ContentTypes,
    package_rels: HashMap<String, Relationship>,
    document_path: String,
    document_rels: HashMap<String, Relationship>,
}

impl<'a> Package<'a> {
    pub(crate) fn open(bytes: &'a [u8]) -> Result<Self, Error> {
        if !has_zip_signature(bytes) {
            return Err(Error::NotAPackage);
        }
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes))?;

        let content_types = match read_entry(&mut zip, "[Content_Types].xml") {
            Ok(data) => ContentTypes::parse(&decode_xml_text("[Content_Types].xml", data)?),
            Err(_) => {
                log::warn!("package has no [Content_Types].xml");
                ContentTypes::default()
            }
        };

        let package_rels = match read_entry(&mut zip, "_rels/.rels") {
            Ok(data) => parse_rels_xml(&decode_xml_text("_rels/.rels", data)?),
            Err(_) => HashMap::new(),
        };

        let document_path = package_rels
            .values()
            .find(|r| r.is("officeDocument") && !r.external)
            .map(|r| resolve_target("", &r.target))
            .unwrap_or_else(|| DEFAULT_DOCUMENT_PATH.to_string());

        if zip.index_for_name(&document_path).is_none() {
            return Err(Error::Corrupt(format!(
                "missing main document part {document_path} (is this a DOCX file?)"
            )));
        }

        let document_rels = match read_entry(&mut zip, &rels_path_for(&document_path)) {
            Ok(data) => parse_rels_xml(&decode_xml_text(&document_path, data)?),
            Err(_) => HashMap::new(),
        };
        log::debug!(
            "Opened package: document={document_path}, {} relationships",
            document_rels.len()
        );

        Ok(Package {
            zip,
            content_types,
            package_rels,
            document_path,
            document_rels,
        })
    }

    pub(crate) fn relationship(&self, rel_id: &str) -> Option<&Relationship> {
        self.document_rels.get(rel_id)
    }

    pub(crate) fn document_xml(&mut self) -> Result<String, Error> {
        let path = self.document_path.clone();
        let data = read_entry(&mut self.zip, &path)
            .map_err(|_| Error::Corrupt(format!("cannot read {path}")))?;
        decode_xml_text(&path, data)
    }

    /// Bytes of the part a document relationship points at.
    pub(crate) fn part(&mut self, rel_id: &str) -> Result<Vec<u8>, Error> {
        let path = self.part_path(rel_id)?;
        read_entry(&mut self.zip, &path)
    }

    /// Bytes and declared content type of the part behind `rel_id`.
    pub(crate) fn part_with_content_type(&mut self, rel_id: &str) -> Result<(String, Vec<u8>), Error> {
        let path = self.part_path(rel_id)?;
        let data = read_entry(&mut self.zip, &path)?;
        let content_type = self
            .content_types
            .lookup(&path)
            .unwrap_or_else(|| content_type_from_extension(&path))
            .to_string();
        Ok((content_type, data))
    }

    fn part_path(&self, rel_id: &str) -> Result<String, Error> {
        let rel = self
            .document_rels
            .get(rel_id)
            .ok_or_else(|| Error::MissingPart(format!("relationship {rel_id}")))?;
        if rel.external {
            return Err(Error::MissingPart(format!(
                "relationship {rel_id} points outside the package ({})",
                rel.target
            )));
        }
        Ok(resolve_target(parent_dir(&self.document_path), &rel.target))
    }

    /// XML text of the part related to the main document by relationship type,
    /// e.g. "styles" or "numbering". A declared but absent part is logged as a
    /// broken reference and treated as missing.
    pub(crate) fn related_xml(&mut self, kind: &str, fallback_path: &str) -> Option<String> {
        let rel_id = self
            .document_rels
            .iter()
            .filter(|(_, r)| r.is(kind) && !r.external)
            .map(|(id, _)| id.clone())
            .min();
        let data = match rel_id {
            Some(id) => match self.part(&id) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("Broken {kind} reference: {e}");
                    return None;
                }
            },
            None => read_entry(&mut self.zip, fallback_path).ok()?,
        };
        match decode_xml_text(kind, data) {
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("Ignoring {kind} part: {e}");
                None
            }
        }
    }

    /// Title from the core properties part (dc:title), if present and non-empty.
    pub(crate) fn core_title(&mut self) -> Option<String> {
        let path = self
            .package_rels
            .values()
            .find(|r| r.is("core-properties") && !r.external)
            .map(|r| resolve_target("", &r.target))
            .unwrap_or_else(|| "docProps/core.xml".to_string());
        let data = read_entry(&mut self.zip, &path).ok()?;
        let text = decode_xml_text(&path, data).ok()?;
        let xml = roxmltree::Document::parse(&text).ok()?;
        xml.descendants()
            .find(|n| n.tag_name().name() == "title" && n.tag_name().namespace() == Some(DC_NS))
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
    }
}

pub(crate) fn read_entry<R: std::io::Read + std::io::Seek>(
    zip: &mut zip::ZipArchive<R>,
    path: &str,
) -> Result<Vec<u8>, Error> {
    let index = zip
        .index_for_name(path)
        .ok_or_else(|| Error::MissingPart(path.to_string()))?;
    let mut entry = zip.by_index(index)?;
    let mut data = Vec::with_capacity(entry.size().min(64 * 1024 * 1024) as usize);
    entry
        .read_to_end(&mut data)
        .map_err(|e| Error::Corrupt(format!("{path}: {e}")))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_absolute_targets() {
        assert_eq!(resolve_target("word", "media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_target("word", "/word/styles.xml"), "word/styles.xml");
        assert_eq!(resolve_target("word", "../customXml/item1.xml"), "customXml/item1.xml");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
    }

    #[test]
    fn rels_path_sits_next_to_part() {
        assert_eq!(rels_path_for("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_path_for("document.xml"), "_rels/document.xml.rels");
    }

    #[test]
    fn content_type_override_beats_default() {
        let types = ContentTypes::parse(
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
                <Default Extension="png" ContentType="image/png"/>
                <Override PartName="/word/media/odd.png" ContentType="image/tiff"/>
            </Types>"#,
        );
        assert_eq!(types.lookup("word/media/a.PNG"), Some("image/png"));
        assert_eq!(types.lookup("word/media/odd.png"), Some("image/tiff"));
        assert_eq!(types.lookup("word/media/a.gif"), None);
    }
}
