//! Decoding and editing of DDR3 SPD images and their XMP profiles.
//!
//! An [`SpdImage`](spd::SpdImage) is read once from raw bytes, edited through its accessors and only turned back into
//! bytes (with a fresh checksum) by [`encode`](spd::SpdImage::encode) or [`save`](spd::SpdImage::save).

pub mod crc16;
pub mod field;
pub(crate) mod macros;
pub mod spd;
pub mod xmp;
