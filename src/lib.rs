mod docx;
mod error;
mod html;
mod media;
mod model;
mod package;
mod uri_fix;

pub use error::Error;
pub use media::AssetWarning;
pub use uri_fix::repair_hyperlink_uris;

use std::time::Instant;

use package::Package;

/// Settings of one conversion.
#[derive(Clone, Debug)]
pub struct ConvertOptions {
    /// Inline embedded images as data URIs. When false, images are left out
    /// entirely and no image part is read.
    pub include_images: bool,
    /// Appended verbatim to the generated style sheet.
    pub additional_css: String,
    /// Prefix of generated class names.
    pub css_class_prefix: String,
    /// Generated classes when true, `style` attributes when false.
    pub fabricate_css_classes: bool,
    /// Replaces the title from the core properties.
    pub page_title_override: Option<String>,
    /// Title used when the package has none, usually the input file name.
    pub source_name: Option<String>,
    pub restrict_to_supported_languages: bool,
    pub restrict_to_supported_numbering: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            include_images: true,
            additional_css: "body { margin: 1cm auto; max-width: 20cm; padding: 0; }".to_string(),
            css_class_prefix: "pt-".to_string(),
            fabricate_css_classes: true,
            page_title_override: None,
            source_name: None,
            restrict_to_supported_languages: false,
            restrict_to_supported_numbering: false,
        }
    }
}

/// A finished HTML document plus the images that could not be inlined.
#[derive(Debug)]
pub struct Conversion {
    pub html: String,
    pub warnings: Vec<AssetWarning>,
}

/// Convert the bytes of a DOCX package into a standalone HTML document.
///
/// Conversion is all-or-nothing: a document-level problem is returned as an
/// [`Error`], while images that cannot be encoded only produce warnings.
/// If the error [`is_repairable`](Error::is_repairable), running
/// [`repair_hyperlink_uris`] on the bytes and converting again may succeed.
pub fn convert(bytes: &[u8], options: &ConvertOptions) -> Result<Conversion, Error> {
    let t0 = Instant::now();

    let mut package = Package::open(bytes)?;
    let t_open = t0.elapsed();

    let doc = docx::parse(&mut package, options)?;
    let t_build = t0.elapsed();

    let (images, warnings) = if options.include_images && !doc.image_slots.is_empty() {
        media::resolve_images(&mut package, &doc.image_slots)
    } else {
        (Vec::new(), Vec::new())
    };
    let t_media = t0.elapsed();

    let title = options
        .page_title_override
        .as_deref()
        .or(doc.title.as_deref())
        .or(options.source_name.as_deref())
        .unwrap_or("");
    let html = html::emit(
        &doc,
        &images,
        &html::EmitOptions {
            css_class_prefix: &options.css_class_prefix,
            fabricate_css_classes: options.fabricate_css_classes,
            additional_css: &options.additional_css,
            title,
        },
    );
    let t_total = t0.elapsed();

    log::info!(
        "Timing: open={:.1}ms, build={:.1}ms, media={:.1}ms, emit={:.1}ms, total={:.1}ms (output {} bytes, {} images, {} skipped)",
        t_open.as_secs_f64() * 1000.0,
        (t_build - t_open).as_secs_f64() * 1000.0,
        (t_media - t_build).as_secs_f64() * 1000.0,
        (t_total - t_media).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        html.len(),
        doc.image_slots.len(),
        warnings.len(),
    );

    Ok(Conversion { html, warnings })
}
