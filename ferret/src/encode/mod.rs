/*!
# Ferret: Encoders (C3)

Four independent encoders, each `(RgbaImage, params) -> Result<Vec<u8>, EncodeError>`.
Every encoder is pure and allocation-only; none touches the filesystem or
shares state, so the worker pool (§4.5) is free to run them on separate
threads without coordination beyond a `join`.
*/

mod avif;
mod png;
mod pngquant;
mod webp;

pub use avif::encode_avif;
pub use png::{encode_png, encode_png_best_of};
pub use pngquant::encode_pngquant;
pub use webp::encode_webp;
