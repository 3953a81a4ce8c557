//! HTTP route handlers for the img2pdf web application.
//!
//! The index page is an Askama template; conversions answer with a streamed
//! PDF or a plain-text `Error: ...` body.

mod convert;
mod pages;

pub use convert::convert_images;
pub use pages::index;
