use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use png::{BitDepth, ColorType, Encoder};
use tempfile::NamedTempFile;

/// Largest size that fits inside `max_w` x `max_h` while keeping the aspect ratio.
/// Images already inside the box are left as they are.
pub fn fit_within(w: u32, h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if w == 0 || h == 0 {
        return (w, h);
    }
    let scale = (max_w as f64 / w as f64)
        .min(max_h as f64 / h as f64)
        .min(1.0);
    if scale >= 1.0 {
        return (w, h);
    }
    let new_w = (w as f64 * scale).round().max(1.0) as u32;
    let new_h = (h as f64 * scale).round().max(1.0) as u32;
    (new_w, new_h)
}

/// Decodes the photo, scales it into the box, flattens transparency onto white
/// and writes it as an 8-bit RGB PNG the PDF layer can embed.
pub fn prepare_photo(bytes: &[u8], max_w: u32, max_h: u32) -> anyhow::Result<NamedTempFile> {
    let img = image::load_from_memory(bytes)?;
    let (orig_w, orig_h) = img.dimensions();
    let (w, h) = fit_within(orig_w, orig_h, max_w, max_h);

    let resized: DynamicImage = if (w, h) == (orig_w, orig_h) {
        img
    } else {
        img.resize_exact(w, h, FilterType::Lanczos3)
    };

    let rgba = resized.to_rgba8();
    let mut background = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut background, &rgba, 0, 0);
    let raw = DynamicImage::ImageRgba8(background).to_rgb8().into_raw();

    let mut tmp = tempfile::Builder::new().suffix(".png").tempfile()?;
    {
        let mut encoder = Encoder::new(tmp.as_file_mut(), w, h);
        encoder.set_color(ColorType::Rgb);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&raw)?;
    }
    Ok(tmp)
}
