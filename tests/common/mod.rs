#![allow(dead_code)]

use std::io::{Cursor, Write};

use docxide_html::{Conversion, ConvertOptions, convert};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

struct Rel {
    id: String,
    kind: &'static str,
    target: String,
    external: bool,
}

/// Assembles a minimal DOCX package in memory.
#[derive(Default)]
pub struct DocxBuilder {
    body: String,
    styles: Option<String>,
    numbering: Option<String>,
    title: Option<String>,
    rels: Vec<Rel>,
    media: Vec<(String, Vec<u8>)>,
    overrides: Vec<(String, String)>,
    raw_document: Option<String>,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body content (the children of w:body).
    pub fn body(mut self, xml: &str) -> Self {
        self.body.push_str(xml);
        self
    }

    /// Replace the whole document part, bypassing the w:document wrapper.
    pub fn raw_document(mut self, xml: &str) -> Self {
        self.raw_document = Some(xml.to_string());
        self
    }

    /// Children of w:styles.
    pub fn styles(mut self, xml: &str) -> Self {
        self.styles = Some(xml.to_string());
        self
    }

    /// Children of w:numbering.
    pub fn numbering(mut self, xml: &str) -> Self {
        self.numbering = Some(xml.to_string());
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn hyperlink(mut self, id: &str, target: &str) -> Self {
        self.rels.push(Rel {
            id: id.to_string(),
            kind: "hyperlink",
            target: target.to_string(),
            external: true,
        });
        self
    }

    /// Embed `data` as word/media/`file_name`, reachable through `id`.
    pub fn image(mut self, id: &str, file_name: &str, data: Vec<u8>) -> Self {
        self.rels.push(Rel {
            id: id.to_string(),
            kind: "image",
            target: format!("media/{file_name}"),
            external: false,
        });
        self.media.push((format!("word/media/{file_name}"), data));
        self
    }

    /// Declare a content type for one part, overriding the extension default.
    pub fn content_type(mut self, part: &str, content_type: &str) -> Self {
        self.overrides.push((part.to_string(), content_type.to_string()));
        self
    }

    fn content_types_xml(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Default Extension="png" ContentType="image/png"/>
<Default Extension="jpeg" ContentType="image/jpeg"/>
<Default Extension="gif" ContentType="image/gif"/>
<Default Extension="bmp" ContentType="image/bmp"/>
<Default Extension="tiff" ContentType="image/tiff"/>
<Default Extension="wmf" ContentType="image/x-wmf"/>
<Default Extension="emf" ContentType="image/x-emf"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
"#,
        );
        for (part, ct) in &self.overrides {
            xml.push_str(&format!(r#"<Override PartName="/{part}" ContentType="{ct}"/>"#));
        }
        xml.push_str("</Types>");
        xml
    }

    fn document_rels_xml(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        if self.styles.is_some() {
            xml.push_str(&format!(
                r#"<Relationship Id="rIdStyles" Type="{REL_TYPE}/styles" Target="styles.xml"/>"#
            ));
        }
        if self.numbering.is_some() {
            xml.push_str(&format!(
                r#"<Relationship Id="rIdNumbering" Type="{REL_TYPE}/numbering" Target="numbering.xml"/>"#
            ));
        }
        for rel in &self.rels {
            let mode = if rel.external {
                r#" TargetMode="External""#
            } else {
                ""
            };
            xml.push_str(&format!(
                r#"<Relationship Id="{}" Type="{REL_TYPE}/{}" Target="{}"{mode}/>"#,
                rel.id,
                rel.kind,
                escape(&rel.target)
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }

    fn document_xml(&self) -> String {
        if let Some(raw) = &self.raw_document {
            return raw.clone();
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{W_NS}" xmlns:r="{R_NS}"
  xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"
  xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
  xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"
  xmlns:v="urn:schemas-microsoft-com:vml"
  xmlns:o="urn:schemas-microsoft-com:office:office">
<w:body>{}<w:sectPr/></w:body>
</w:document>"#,
            self.body
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut put = |name: &str, data: &[u8]| {
            zip.start_file(name, options).unwrap();
            zip.write_all(data).unwrap();
        };

        put("[Content_Types].xml", self.content_types_xml().as_bytes());
        put(
            "_rels/.rels",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="{REL_TYPE}/officeDocument" Target="word/document.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
</Relationships>"#
            )
            .as_bytes(),
        );
        put("word/document.xml", self.document_xml().as_bytes());
        put("word/_rels/document.xml.rels", self.document_rels_xml().as_bytes());
        if let Some(styles) = &self.styles {
            put(
                "word/styles.xml",
                format!(r#"<w:styles xmlns:w="{W_NS}">{styles}</w:styles>"#).as_bytes(),
            );
        }
        if let Some(numbering) = &self.numbering {
            put(
                "word/numbering.xml",
                format!(r#"<w:numbering xmlns:w="{W_NS}">{numbering}</w:numbering>"#).as_bytes(),
            );
        }
        if let Some(title) = &self.title {
            put(
                "docProps/core.xml",
                format!(
                    r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{}</dc:title></cp:coreProperties>"#,
                    escape(title)
                )
                .as_bytes(),
            );
        }
        for (path, data) in &self.media {
            put(path, data);
        }

        zip.finish().unwrap().into_inner()
    }
}

pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A paragraph with one plain run.
pub fn para(text: &str) -> String {
    format!(
        r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape(text)
    )
}

/// A paragraph holding one inline DrawingML picture.
pub fn image_para(rel_id: &str, descr: &str) -> String {
    format!(
        r#"<w:p><w:r><w:drawing><wp:inline>
<wp:extent cx="914400" cy="457200"/>
<wp:docPr id="1" name="Picture" descr="{descr}"/>
<a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">
<pic:pic><pic:blipFill><a:blip r:embed="{rel_id}"/></pic:blipFill></pic:pic>
</a:graphicData></a:graphic>
</wp:inline></w:drawing></w:r></w:p>"#
    )
}

pub fn png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode_image(width, height, rgb, image::ImageFormat::Png)
}

pub fn tiff_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode_image(width, height, rgb, image::ImageFormat::Tiff)
}

fn encode_image(width: u32, height: u32, rgb: [u8; 3], format: image::ImageFormat) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn convert_ok(bytes: &[u8], options: &ConvertOptions) -> Conversion {
    let _ = env_logger::try_init();
    match convert(bytes, options) {
        Ok(conversion) => conversion,
        Err(e) => panic!("conversion failed: {e}"),
    }
}

pub fn convert_default(bytes: &[u8]) -> Conversion {
    convert_ok(bytes, &ConvertOptions::default())
}

/// Parse the output as XML; the emitter writes XHTML-compatible markup.
pub fn parse_html(html: &str) -> roxmltree::Document<'_> {
    let opts = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    match roxmltree::Document::parse_with_options(html, opts) {
        Ok(doc) => doc,
        Err(e) => panic!("output is not well-formed ({e}):\n{html}"),
    }
}

pub fn body<'a, 'input>(doc: &'a roxmltree::Document<'input>) -> roxmltree::Node<'a, 'input> {
    doc.descendants()
        .find(|n| n.has_tag_name("body"))
        .expect("output has a body")
}

/// Tag names of the element children of <body>, in order.
pub fn body_children(html: &str) -> Vec<String> {
    let doc = parse_html(html);
    body(&doc)
        .children()
        .filter(|n| n.is_element())
        .map(|n| n.tag_name().name().to_string())
        .collect()
}

/// Concatenated text of an element, without markup.
pub fn text_of(node: roxmltree::Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

pub fn img_elements<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
) -> Vec<roxmltree::Node<'a, 'input>> {
    doc.descendants().filter(|n| n.has_tag_name("img")).collect()
}
