use std::io::{Cursor, Write};

use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::Error;
use crate::package::{has_zip_signature, read_entry};

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn valid_percent_escapes(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = |j: usize| bytes.get(j).is_some_and(|b| b.is_ascii_hexdigit());
            if !(hex(i + 1) && hex(i + 2)) {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// Whether a hyperlink relationship target is usable as an `href`.
/// Blank targets are accepted; they are what the repair pass writes.
pub(crate) fn is_valid_uri(target: &str) -> bool {
    if target.trim().is_empty() {
        return true;
    }
    if target
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || "<>\"{}|\\^`".contains(c))
    {
        return false;
    }
    if !valid_percent_escapes(target) {
        return false;
    }

    let scheme = target
        .split_once(':')
        .map(|(scheme, _)| scheme)
        .filter(|s| is_scheme(s));
    match scheme {
        Some(s) if s.eq_ignore_ascii_case("mailto") => {
            let address = &target[s.len() + 1..];
            !address.split('?').next().unwrap_or("").is_empty()
        }
        Some(_) => url::Url::parse(target).is_ok(),
        // relative reference
        None => true,
    }
}

/// Corrected target for an invalid one: drop a leading `mailto:` and keep the
/// address, otherwise a single-space placeholder.
pub(crate) fn repair_target(target: &str) -> String {
    let trimmed = target.trim_start();
    if trimmed
        .get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("mailto:"))
        && let Some(rest) = trimmed.get(7..)
    {
        let address = rest.trim();
        if is_valid_uri(address) && !address.is_empty() {
            return address.to_string();
        }
    }
    " ".to_string()
}

fn escape_xml_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Rewrite one relationships part. Returns None when nothing needs fixing.
fn repair_rels_xml(path: &str, xml_content: &str) -> Option<String> {
    let xml = match roxmltree::Document::parse(xml_content) {
        Ok(xml) => xml,
        Err(e) => {
            log::warn!("Cannot repair {path}: {e}");
            return None;
        }
    };

    let mut changed = false;
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
    );
    out.push_str(&format!("<Relationships xmlns=\"{RELS_NS}\">"));
    for node in xml.root_element().children().filter(|n| n.is_element()) {
        if node.tag_name().name() != "Relationship" {
            continue;
        }
        let id = node.attribute("Id").unwrap_or("");
        let rel_type = node.attribute("Type").unwrap_or("");
        let mode = node.attribute("TargetMode");
        let mut target = node.attribute("Target").unwrap_or("").to_string();

        if rel_type.ends_with("/hyperlink") && !is_valid_uri(&target) {
            let fixed = repair_target(&target);
            log::info!("Repaired hyperlink {id} in {path}: {target:?} -> {fixed:?}");
            target = fixed;
            changed = true;
        }

        out.push_str(&format!(
            "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"",
            escape_xml_attr(id),
            escape_xml_attr(rel_type),
            escape_xml_attr(&target)
        ));
        if let Some(mode) = mode {
            out.push_str(&format!(" TargetMode=\"{}\"", escape_xml_attr(mode)));
        }
        out.push_str("/>");
    }
    out.push_str("</Relationships>");

    changed.then_some(out)
}

/// Pre-processing fixup for packages rejected with a repairable
/// [`Error::UnresolvedHyperlink`]: invalid external hyperlink targets in every
/// relationships part are rewritten and the archive is rebuilt. A package
/// with nothing to repair is returned unchanged.
pub fn repair_hyperlink_uris(bytes: &[u8]) -> Result<Vec<u8>, Error> {
    if !has_zip_signature(bytes) {
        return Err(Error::NotAPackage);
    }
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let names: Vec<String> = archive.file_names().map(String::from).collect();
    let mut repaired = Vec::new();
    for name in names.iter().filter(|n| n.ends_with(".rels")) {
        let data = read_entry(&mut archive, name)?;
        let Ok(text) = String::from_utf8(data) else {
            continue;
        };
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        if let Some(fixed) = repair_rels_xml(name, text) {
            repaired.push((name.clone(), fixed));
        }
    }
    if repaired.is_empty() {
        return Ok(bytes.to_vec());
    }

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for i in 0..archive.len() {
        let name = archive.by_index(i)?.name().to_string();
        if name.ends_with('/') {
            writer.add_directory(name.as_str(), options)?;
            continue;
        }
        let contents = match repaired.iter().find(|(n, _)| *n == name) {
            Some((_, fixed)) => fixed.as_bytes().to_vec(),
            None => read_entry(&mut archive, &name)?,
        };
        writer.start_file(name.as_str(), options)?;
        writer
            .write_all(&contents)
            .map_err(|e| Error::Corrupt(format!("rewriting {name}: {e}")))?;
    }
    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_usual_targets() {
        assert!(is_valid_uri("https://example.com/a?b=c#d"));
        assert!(is_valid_uri("mailto:someone@example.com"));
        assert!(is_valid_uri("../other.docx"));
        assert!(is_valid_uri("file.html#part%20two"));
        assert!(is_valid_uri(" "));
    }

    #[test]
    fn rejects_broken_targets() {
        assert!(!is_valid_uri("mailto:"));
        assert!(!is_valid_uri("mailto:john doe@example.com"));
        assert!(!is_valid_uri("http://exa mple.com"));
        assert!(!is_valid_uri("http://[::1"));
        assert!(!is_valid_uri("100%sure"));
        assert!(!is_valid_uri("C:\\docs\\file.docx"));
    }

    #[test]
    fn repair_strips_mailto_or_blanks() {
        assert_eq!(repair_target("mailto:someone@example.com?"), "someone@example.com?");
        assert_eq!(repair_target("MAILTO:x@y.org"), "x@y.org");
        assert_eq!(repair_target("http://exa mple.com"), " ");
        assert_eq!(repair_target("mailto:john doe@example.com"), " ");
    }

    #[test]
    fn repair_handles_non_ascii_targets() {
        assert!(!is_valid_uri("日本語 ページ"));
        assert_eq!(repair_target("日本語 ページ"), " ");
        assert_eq!(repair_target("mailté x"), " ");
        assert_eq!(repair_target("mailto:名前@example.jp "), "名前@example.jp");
    }

    #[test]
    fn rels_rewrite_only_touches_invalid_hyperlinks() {
        let rels = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
            <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="http://bad host" TargetMode="External"/>
        </Relationships>"#;
        let fixed = repair_rels_xml("word/_rels/document.xml.rels", rels).unwrap();
        assert!(fixed.contains(r#"Target="styles.xml""#));
        assert!(fixed.contains(r#"Id="rId2""#));
        assert!(fixed.contains(r#"Target=" " TargetMode="External""#));
        assert!(repair_rels_xml("x.rels", &fixed).is_none());
    }
}
