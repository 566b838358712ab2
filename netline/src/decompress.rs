//! Streaming body decompression.
//!
//! A [`Decompressor`] is a write-side decoder over a growable byte
//! sink: the body phase feeds compressed bytes in as they arrive off
//! the socket and harvests whatever plaintext has accumulated, so a
//! large body never has to be buffered compressed.

use std::io::{self, Write};

use flate2::write::{GzDecoder, ZlibDecoder};

/// Streaming decoder for a response's `Content-Encoding`.
pub(crate) enum Decompressor {
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl Decompressor {
    /// Pick a decoder for a `Content-Encoding` value. Returns `None`
    /// for encodings the engine passes through untouched (including
    /// `identity`).
    pub fn for_encoding(encoding: &str) -> Option<Decompressor> {
        let encoding = encoding.trim();
        if encoding.eq_ignore_ascii_case("gzip") {
            Some(Decompressor::Gzip(GzDecoder::new(Vec::new())))
        } else if encoding.eq_ignore_ascii_case("deflate") {
            Some(Decompressor::Deflate(ZlibDecoder::new(Vec::new())))
        } else {
            None
        }
    }

    /// Feed compressed bytes into the stream.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Decompressor::Gzip(d) => d.write_all(data),
            Decompressor::Deflate(d) => d.write_all(data),
        }
    }

    /// Take whatever plaintext has accumulated in the sink so far.
    pub fn take_output(&mut self) -> Vec<u8> {
        match self {
            Decompressor::Gzip(d) => std::mem::take(d.get_mut()),
            Decompressor::Deflate(d) => std::mem::take(d.get_mut()),
        }
    }

    /// Flush the stream once the last input byte is in, yielding any
    /// remaining plaintext.
    pub fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            Decompressor::Gzip(d) => d.finish(),
            Decompressor::Deflate(d) => d.finish(),
        }
    }
}
