//! Page geometry and image placement.
//!
//! # Coordinate System
//!
//! All values are PDF points (1/72 inch) with the origin at the bottom-left
//! corner of the page, matching what the encoder writes into the content
//! stream's `cm` operator.
//!
//! # Policy
//!
//! Page size is chosen by orientation only: landscape A4 when the image is
//! wider than tall, portrait A4 otherwise. The image is then scaled to fit
//! with a fixed 10% margin and centered on both axes. Images are never
//! rotated.

// =============================================================================
// Layout Constants
// =============================================================================

/// ISO A4 width in points (210 mm).
pub const A4_WIDTH: f32 = 595.275_6;

/// ISO A4 height in points (297 mm).
pub const A4_HEIGHT: f32 = 841.889_8;

/// Fraction of the fitting scale actually used, leaving a 10% margin.
pub const MARGIN_FACTOR: f32 = 0.9;

// =============================================================================
// Public Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Size of a page in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

impl PageGeometry {
    pub const A4_PORTRAIT: Self = Self {
        width: A4_WIDTH,
        height: A4_HEIGHT,
    };

    pub const A4_LANDSCAPE: Self = Self {
        width: A4_HEIGHT,
        height: A4_WIDTH,
    };

    pub fn orientation(&self) -> Orientation {
        if self.width > self.height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }
}

/// Where an image is drawn on its page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

// =============================================================================
// Layout Functions
// =============================================================================

/// Pick the page for an image of the given pixel size.
pub const fn compute_geometry(image_width: u32, image_height: u32) -> PageGeometry {
    if image_width > image_height {
        PageGeometry::A4_LANDSCAPE
    } else {
        PageGeometry::A4_PORTRAIT
    }
}

/// Scale and center an image on `geometry`.
///
/// Dimensions must be non-zero; the assembler rejects empty images before
/// layout.
#[allow(clippy::cast_precision_loss)]
pub fn compute_placement(image_width: u32, image_height: u32, geometry: PageGeometry) -> Placement {
    let image_width = image_width as f32;
    let image_height = image_height as f32;

    let scale_x = geometry.width / image_width;
    let scale_y = geometry.height / image_height;
    let scale = scale_x.min(scale_y) * MARGIN_FACTOR;

    let width = image_width * scale;
    let height = image_height * scale;

    Placement {
        x: (geometry.width - width) / 2.0,
        y: (geometry.height - height) / 2.0,
        width,
        height,
    }
}

/// Geometry and placement in one call.
pub fn layout(image_width: u32, image_height: u32) -> (PageGeometry, Placement) {
    let geometry = compute_geometry(image_width, image_height);
    let placement = compute_placement(image_width, image_height, geometry);
    (geometry, placement)
}

// =============================================================================
// Tests
// =============================================================================
