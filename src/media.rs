use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat};

use crate::package::Package;

/// Raw bytes of one embedded image, as declared by the package.
pub(crate) struct ImageAsset {
    pub(crate) content_type: String,
    pub(crate) data: Vec<u8>,
}

pub(crate) enum Encoded {
    DataUri(String),
    Skip(String),
}

/// An image that could not be inlined. The `<img>` element is still emitted,
/// without a `src`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetWarning {
    pub relationship_id: String,
    pub reason: String,
}

impl fmt::Display for AssetWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image {} skipped: {}", self.relationship_id, self.reason)
    }
}

fn data_uri(mime: &str, data: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(data))
}

fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        _ => "image/jpeg",
    }
}

fn decode(data: &[u8], format: ImageFormat) -> Result<DynamicImage, String> {
    image::ImageReader::with_format(Cursor::new(data), format)
        .decode()
        .map_err(|e| format!("cannot decode {format:?} data: {e}"))
}

/// Natively supported formats are validated by decoding and passed through
/// byte for byte. The actual bytes win over a wrong declared type.
fn passthrough(data: &[u8], declared: ImageFormat) -> Encoded {
    let format = match image::guess_format(data) {
        Ok(f @ (ImageFormat::Png | ImageFormat::Gif | ImageFormat::Bmp | ImageFormat::Jpeg)) => f,
        Ok(ImageFormat::Tiff) => return tiff_to_gif(data),
        _ => declared,
    };
    match decode(data, format) {
        Ok(_) => Encoded::DataUri(data_uri(mime_for(format), data)),
        Err(reason) => Encoded::Skip(reason),
    }
}

fn tiff_to_gif(data: &[u8]) -> Encoded {
    let decoded = match decode(data, ImageFormat::Tiff) {
        Ok(img) => img,
        Err(reason) => return Encoded::Skip(reason),
    };
    let rgba = DynamicImage::ImageRgba8(decoded.to_rgba8());
    let mut buf = Cursor::new(Vec::new());
    match rgba.write_to(&mut buf, ImageFormat::Gif) {
        Ok(()) => Encoded::DataUri(data_uri("image/gif", buf.get_ref())),
        Err(e) => Encoded::Skip(format!("cannot re-encode TIFF as GIF: {e}")),
    }
}

const WMF_PLACEABLE_KEY: u32 = 0x9AC6_CDD7;

/// Windows Metafile: either the Aldus placeable header or a bare META_HEADER
/// (type 1 or 2, header size 9 words).
fn is_wmf(data: &[u8]) -> bool {
    if data.len() < 18 {
        return false;
    }
    let key = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if key == WMF_PLACEABLE_KEY {
        return true;
    }
    let kind = u16::from_le_bytes([data[0], data[1]]);
    let header_size = u16::from_le_bytes([data[2], data[3]]);
    matches!(kind, 1 | 2) && header_size == 9
}

/// Map one asset to a data URI, or say why it is skipped.
pub(crate) fn encode(asset: &ImageAsset) -> Encoded {
    let mime = asset
        .content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    let subtype = mime.strip_prefix("image/").unwrap_or(&mime);
    match subtype {
        "png" => passthrough(&asset.data, ImageFormat::Png),
        "gif" => passthrough(&asset.data, ImageFormat::Gif),
        "bmp" | "x-bmp" => passthrough(&asset.data, ImageFormat::Bmp),
        "jpeg" | "jpg" | "pjpeg" => passthrough(&asset.data, ImageFormat::Jpeg),
        "tiff" | "tif" => tiff_to_gif(&asset.data),
        "x-wmf" | "wmf" => {
            if is_wmf(&asset.data) {
                Encoded::DataUri(data_uri("image/x-wmf", &asset.data))
            } else {
                Encoded::Skip("not a Windows Metafile".into())
            }
        }
        _ => Encoded::Skip(format!("unsupported content type {:?}", asset.content_type)),
    }
}

#[cfg(feature = "parallel")]
fn encode_assets(assets: &[Result<ImageAsset, String>]) -> Vec<Encoded> {
    use rayon::prelude::*;
    assets
        .par_iter()
        .map(|asset| match asset {
            Ok(asset) => encode(asset),
            Err(reason) => Encoded::Skip(reason.clone()),
        })
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn encode_assets(assets: &[Result<ImageAsset, String>]) -> Vec<Encoded> {
    assets
        .iter()
        .map(|asset| match asset {
            Ok(asset) => encode(asset),
            Err(reason) => Encoded::Skip(reason.clone()),
        })
        .collect()
}

/// Resolve every image slot to its `src`. The result is aligned with `slots`;
/// an image referenced several times is read and encoded once.
pub(crate) fn resolve_images(
    package: &mut Package,
    slots: &[String],
) -> (Vec<Option<String>>, Vec<AssetWarning>) {
    let mut unique: Vec<&str> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let slot_to_unique: Vec<usize> = slots
        .iter()
        .map(|rel_id| {
            *index.entry(rel_id.as_str()).or_insert_with(|| {
                unique.push(rel_id.as_str());
                unique.len() - 1
            })
        })
        .collect();

    let assets: Vec<Result<ImageAsset, String>> = unique
        .iter()
        .map(|rel_id| {
            package
                .part_with_content_type(rel_id)
                .map(|(content_type, data)| ImageAsset { content_type, data })
                .map_err(|e| e.to_string())
        })
        .collect();

    let encoded = encode_assets(&assets);

    let mut warnings = Vec::new();
    let sources: Vec<Option<String>> = encoded
        .into_iter()
        .zip(&unique)
        .map(|(result, rel_id)| match result {
            Encoded::DataUri(uri) => Some(uri),
            Encoded::Skip(reason) => {
                log::warn!("Skipping image {rel_id}: {reason}");
                warnings.push(AssetWarning {
                    relationship_id: rel_id.to_string(),
                    reason,
                });
                None
            }
        })
        .collect();

    let resolved = slot_to_unique
        .into_iter()
        .map(|i| sources[i].clone())
        .collect();
    (resolved, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn asset(content_type: &str, data: Vec<u8>) -> ImageAsset {
        ImageAsset {
            content_type: content_type.to_string(),
            data,
        }
    }

    #[test]
    fn png_passes_through_unchanged() {
        let data = png_bytes();
        let Encoded::DataUri(uri) = encode(&asset("image/png", data.clone())) else {
            panic!("png should encode");
        };
        assert_eq!(uri, format!("data:image/png;base64,{}", STANDARD.encode(&data)));
    }

    #[test]
    fn mislabelled_png_uses_actual_format() {
        let Encoded::DataUri(uri) = encode(&asset("image/jpeg", png_bytes())) else {
            panic!("png should encode");
        };
        assert!(uri.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn corrupt_and_unknown_are_skipped() {
        assert!(matches!(
            encode(&asset("image/png", b"\x89PNG\r\n\x1a\ngarbage".to_vec())),
            Encoded::Skip(_)
        ));
        assert!(matches!(
            encode(&asset("image/x-emf", vec![0; 64])),
            Encoded::Skip(_)
        ));
    }

    #[test]
    fn wmf_header_detection() {
        let mut placeable = vec![0u8; 40];
        placeable[..4].copy_from_slice(&WMF_PLACEABLE_KEY.to_le_bytes());
        assert!(is_wmf(&placeable));

        let mut bare = vec![0u8; 40];
        bare[0] = 1;
        bare[2] = 9;
        assert!(is_wmf(&bare));

        assert!(!is_wmf(b"not a metafile at all"));
        let Encoded::DataUri(uri) = encode(&asset("image/x-wmf", placeable)) else {
            panic!("wmf should encode");
        };
        assert!(uri.starts_with("data:image/x-wmf;base64,"));
    }
}
