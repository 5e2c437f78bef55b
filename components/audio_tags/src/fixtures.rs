//! Small audio files for tests, also used by crates depending on this one
//! through the `fixtures` feature.

const SAMPLE_RATE: u32 = 44_100;

/// A run of bytes standing in for encoded frames, starting with a FLAC
/// frame sync code. Tests look for it intact after tagging.
pub fn flac_frames() -> Vec<u8> {
    let mut frames = vec![0xFF, 0xF8, 0x69, 0x08];
    frames.extend((0..196u32).map(|i| (i * 7 % 251) as u8));
    frames
}

/// STREAMINFO block (44.1kHz, stereo, 16 bit) with its header
fn streaminfo(total_samples: u32, last: bool) -> Vec<u8> {
    let mut block = vec![if last { 0x80 } else { 0x00 }, 0x00, 0x00, 0x22];
    // min/max block size
    block.extend_from_slice(&[0x10, 0x00, 0x10, 0x00]);
    // min/max frame size unknown
    block.extend_from_slice(&[0u8; 6]);
    // sample rate, channels - 1, bits per sample - 1, top bits of the sample count
    block.extend_from_slice(&[0x0A, 0xC4, 0x42, 0xF0]);
    block.extend_from_slice(&total_samples.to_be_bytes());
    // md5 of the decoded audio, unset
    block.extend_from_slice(&[0u8; 16]);
    block
}

fn flac(total_samples: u32, padded: bool) -> Vec<u8> {
    let mut bytes = b"fLaC".to_vec();
    bytes.extend(streaminfo(total_samples, !padded));
    if padded {
        bytes.extend_from_slice(&[0x81, 0x00, 0x00, 0x10]);
        bytes.extend_from_slice(&[0u8; 16]);
    }
    bytes.extend(flac_frames());
    bytes
}

/// One second of FLAC with a small PADDING block, as encoders write it
pub fn minimal_flac() -> Vec<u8> {
    flac(SAMPLE_RATE, true)
}

/// One second of FLAC whose metadata ends with STREAMINFO
pub fn unpadded_flac() -> Vec<u8> {
    flac(SAMPLE_RATE, false)
}

/// A well-formed FLAC that reports no samples at all
pub fn empty_flac() -> Vec<u8> {
    flac(0, true)
}

/// A small JPEG cover
pub fn cover_jpeg() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(32, 32, image::Rgb([200, 40, 40]));
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 80)
        .encode_image(&image)
        .unwrap();
    out
}

/// A PNG cover of the given size
pub fn cover_png(width: u32, height: u32) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(width, height, image::Rgb([1, 2, 3])));
    let mut out = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}
