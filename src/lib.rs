//! # qrsym
//!
//! A Rust library for encoding text into QR Code symbols and rendering them.
//!
//! `qrsym` encodes UTF-8 text into QR codes adhering to the QR Code Model 2
//! specification: byte-mode segments, versions 1 to 40, Reed-Solomon error
//! correction at four levels, and penalty-based mask selection. The encoded
//! symbol is a plain boolean module matrix; the renderer turns it into a
//! raster image buffer, PNG bytes, an SVG document, or console text.
//!
//! Encoding and rendering are pure functions of their inputs: no I/O, no
//! shared mutable state, and bit-identical output for identical inputs, so
//! calls may be freely parallelized by the caller.
//!
//! ## Example
//!
//! Encode a string and render it as an SVG:
//!
//! ```rust
//! use qrsym::qrcode::{QrCode, EccLevel};
//! use qrsym::render::to_svg;
//!
//! let qr = QrCode::encode_text("https://example.com", EccLevel::High).unwrap();
//! let svg = to_svg(&qr, 600, None).unwrap();
//! assert!(svg.starts_with("<?xml"));
//! ```
//!
//! Render an in-memory image buffer:
//!
//! ```rust
//! use qrsym::qrcode::QrCode;
//! use qrsym::render::to_image;
//!
//! let qr = QrCode::encode("Hello, World!").unwrap();
//! let img = to_image(&qr, 600, None).unwrap();
//! assert_eq!(img.width(), img.height());
//! ```
//!
//! ## Modules
//!
//! - [`qrcode`]: Core QR code encoding functionality.
//! - [`render`]: Raster, vector, and console rendering of encoded symbols.

#![forbid(unsafe_code)]

pub mod qrcode;
pub mod render;
