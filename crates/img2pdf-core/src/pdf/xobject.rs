//! Image XObject construction.
//!
//! Baseline JPEGs in gray or RGB are embedded as-is with `/DCTDecode`. Every
//! other input is decoded to 8-bit samples; an alpha channel, when present
//! and not fully opaque, becomes a separate `/SMask` image. Raw sample
//! streams are left uncompressed here and Flate-compressed when the document
//! is saved.

use std::io::Cursor;

use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageFormat, ImageReader};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::asset::ImageAsset;
use crate::error::{Error, Result};

/// Color layout of the embedded sample data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SampleSpace {
    Gray,
    Rgb,
}

impl SampleSpace {
    const fn pdf_name(self) -> &'static [u8] {
        match self {
            Self::Gray => b"DeviceGray",
            Self::Rgb => b"DeviceRGB",
        }
    }
}

/// Decode `asset` and add it (and its soft mask, if any) to `doc`.
///
/// Returns the object id of the image XObject.
pub(crate) fn embed_image(doc: &mut Document, asset: &ImageAsset) -> Result<ObjectId> {
    let reader = ImageReader::with_format(Cursor::new(asset.data()), asset.format());
    let decoder = reader
        .into_decoder()
        .map_err(|e| Error::decode(asset.label(), e))?;
    let original_color = decoder.original_color_type();

    // Full decode even for pass-through JPEGs so truncated files are caught here
    let decoded = DynamicImage::from_decoder(decoder).map_err(|e| Error::decode(asset.label(), e))?;

    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(Error::decode(asset.label(), "decoded image is empty"));
    }

    if asset.format() == ImageFormat::Jpeg {
        let space = match original_color {
            ExtendedColorType::L8 => Some(SampleSpace::Gray),
            ExtendedColorType::Rgb8 => Some(SampleSpace::Rgb),
            // CMYK and friends are re-encoded below
            _ => None,
        };
        if let Some(space) = space {
            let mut dict = image_dictionary(width, height, space);
            dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
            let stream = Stream::new(dict, asset.data().to_vec()).with_compression(false);
            return Ok(doc.add_object(stream));
        }
    }

    let (space, samples, alpha) = split_samples(&decoded);

    let smask_id = alpha.map(|alpha| {
        let dict = image_dictionary(width, height, SampleSpace::Gray);
        doc.add_object(Stream::new(dict, alpha))
    });

    let mut dict = image_dictionary(width, height, space);
    if let Some(smask_id) = smask_id {
        dict.set("SMask", Object::Reference(smask_id));
    }

    Ok(doc.add_object(Stream::new(dict, samples)))
}

/// Split a decoded image into color samples and an optional alpha plane.
///
/// The alpha plane is dropped when every pixel is opaque.
pub(crate) fn split_samples(decoded: &DynamicImage) -> (SampleSpace, Vec<u8>, Option<Vec<u8>>) {
    let color = decoded.color();

    if !color.has_alpha() {
        if color.has_color() {
            return (SampleSpace::Rgb, decoded.to_rgb8().into_raw(), None);
        }
        return (SampleSpace::Gray, decoded.to_luma8().into_raw(), None);
    }

    let rgba = decoded.to_rgba8();
    let pixel_count = rgba.as_raw().len() / 4;
    let mut rgb = Vec::with_capacity(pixel_count * 3);
    let mut alpha = Vec::with_capacity(pixel_count);
    let mut translucent = false;

    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
        translucent |= a != u8::MAX;
    }

    (SampleSpace::Rgb, rgb, translucent.then_some(alpha))
}

fn image_dictionary(width: u32, height: u32, space: SampleSpace) -> Dictionary {
    Dictionary::from_iter([
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(i64::from(width))),
        ("Height", Object::Integer(i64::from(height))),
        ("ColorSpace", Object::Name(space.pdf_name().to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
    ])
}
