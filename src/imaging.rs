//! Image preparation for OCR upload.
//!
//! A captured photo is probed for its dimensions, decoded already reduced by
//! a power of two, rotated according to its EXIF orientation and re-encoded
//! as JPEG into the cache directory. JPEG sources use the decoder's native
//! 1/2, 1/4 and 1/8 scaling and PNG sources are averaged row by row, so the
//! full-size bitmap of a large photo is never held in memory. The decoded, rotated bitmap is returned alongside the
//! file so the same pixels can be shown under the OCR overlay.

use crate::cache::{unique_temp_path, upload_path};
use crate::cancellation::{CancellationToken, is_cancellation};
use anyhow::{Context, Result, anyhow};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, ImageReader, RgbImage};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_width: 800,
            max_height: 800,
            jpeg_quality: 75,
        }
    }
}

/// Clockwise rotation needed to display the image upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Orientation {
    /// Map the EXIF `Orientation` tag value. Mirrored variants are treated as
    /// upright.
    pub fn from_exif(value: u32) -> Self {
        match value {
            3 => Orientation::Rotate180,
            6 => Orientation::Rotate90,
            8 => Orientation::Rotate270,
            _ => Orientation::Normal,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Orientation::Normal => 0,
            Orientation::Rotate90 => 90,
            Orientation::Rotate180 => 180,
            Orientation::Rotate270 => 270,
        }
    }

    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Orientation::Normal => image,
            Orientation::Rotate90 => image.rotate90(),
            Orientation::Rotate180 => image.rotate180(),
            Orientation::Rotate270 => image.rotate270(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Compressed JPEG ready for upload. Owned by the caller.
    pub upload_path: PathBuf,
    /// Downsampled, upright bitmap for display.
    pub display: DynamicImage,
    pub source_size: (u32, u32),
    pub sample_size: u32,
    pub orientation: Orientation,
}

/// Result of a background normalization; failures never escape as panics or
/// errors so the caller can render them as state.
#[derive(Debug)]
pub enum NormalizeOutcome {
    Ready(NormalizedImage),
    Failed { message: String },
    Cancelled,
}

/// Largest power-of-two factor that keeps both downsampled dimensions at or
/// above the targets.
pub fn sample_size(width: u32, height: u32, max_width: u32, max_height: u32) -> u32 {
    let mut factor = 1u32;
    while factor < (1 << 30) {
        let next = factor * 2;
        if height / next >= max_height.max(1) && width / next >= max_width.max(1) {
            factor = next;
        } else {
            break;
        }
    }
    factor
}

/// Read the EXIF orientation of an image file.
pub fn read_orientation(path: &Path) -> Result<Orientation> {
    let file = File::open(path).with_context(|| format!("Opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new()
        .read_from_container(&mut reader)
        .context("Reading EXIF metadata")?;
    let value = exif
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .ok_or_else(|| anyhow!("EXIF metadata has no orientation tag"))?;
    Ok(Orientation::from_exif(value))
}

pub fn normalize_image(
    source: &Path,
    cache_root: &Path,
    options: NormalizeOptions,
) -> Result<NormalizedImage> {
    normalize_with_token(source, cache_root, options, &CancellationToken::new())
}

/// Run `normalize_image` on the blocking pool.
pub async fn normalize_in_background(
    source: PathBuf,
    cache_root: PathBuf,
    options: NormalizeOptions,
    token: CancellationToken,
) -> NormalizeOutcome {
    let joined = tokio::task::spawn_blocking(move || {
        normalize_with_token(&source, &cache_root, options, &token)
    })
    .await;
    match joined {
        Ok(Ok(image)) => NormalizeOutcome::Ready(image),
        Ok(Err(err)) if is_cancellation(&err) => {
            info!("Image normalization cancelled: {err}");
            NormalizeOutcome::Cancelled
        }
        Ok(Err(err)) => {
            warn!("Image normalization failed: {err:#}");
            NormalizeOutcome::Failed {
                message: format!("{err:#}"),
            }
        }
        Err(err) => {
            warn!("Image normalization task aborted: {err}");
            NormalizeOutcome::Failed {
                message: format!("image worker stopped: {err}"),
            }
        }
    }
}

#[instrument(level = "debug", skip_all, fields(source = %source.display()))]
fn normalize_with_token(
    source: &Path,
    cache_root: &Path,
    options: NormalizeOptions,
    token: &CancellationToken,
) -> Result<NormalizedImage> {
    token.check_cancelled("probe")?;
    let reader = ImageReader::open(source)
        .with_context(|| format!("Opening {}", source.display()))?
        .with_guessed_format()
        .context("Detecting image format")?;
    let format = reader.format();
    let (width, height) = reader
        .into_dimensions()
        .context("Reading image dimensions")?;
    let factor = sample_size(width, height, options.max_width, options.max_height);
    debug!(width, height, factor, ?format, "Probed source image");

    token.check_cancelled("decode")?;
    let sampled = decode_sampled(source, format, (width, height), factor)?;

    let orientation = match read_orientation(source) {
        Ok(orientation) => orientation,
        Err(err) => {
            debug!("Keeping decoded orientation: {err:#}");
            Orientation::Normal
        }
    };
    let upright = orientation.apply(sampled);

    token.check_cancelled("compress")?;
    let upload_path = upload_path(cache_root, source);
    write_jpeg(&upright, &upload_path, options.jpeg_quality)?;
    info!(
        path = %upload_path.display(),
        width = upright.width(),
        height = upright.height(),
        rotation = orientation.degrees(),
        quality = options.jpeg_quality,
        "Prepared upload image"
    );

    Ok(NormalizedImage {
        upload_path,
        display: upright,
        source_size: (width, height),
        sample_size: factor,
        orientation,
    })
}

/// Decode `source` reduced by `factor` in both dimensions.
fn decode_sampled(
    source: &Path,
    format: Option<ImageFormat>,
    (width, height): (u32, u32),
    factor: u32,
) -> Result<DynamicImage> {
    let target = ((width / factor).max(1), (height / factor).max(1));
    let reduced = match format {
        Some(ImageFormat::Jpeg) => decode_jpeg_scaled(source, target)?,
        Some(ImageFormat::Png) => decode_png_sampled(source, factor)?,
        _ => None,
    };
    let image = match reduced {
        Some(image) => image,
        None => decode_full(source, width, height)?,
    };
    if (image.width(), image.height()) == target {
        return Ok(image);
    }
    Ok(image.resize_exact(target.0, target.1, FilterType::Triangle))
}

/// Let the JPEG decoder skip detail it would throw away. The result is at
/// most twice `target` in each dimension. `None` for pixel formats the
/// scaled path does not handle.
fn decode_jpeg_scaled(source: &Path, target: (u32, u32)) -> Result<Option<DynamicImage>> {
    use jpeg_decoder::PixelFormat;

    let file = File::open(source).with_context(|| format!("Opening {}", source.display()))?;
    let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(file));
    decoder.read_info().context("Reading JPEG header")?;
    let pixel_format = decoder
        .info()
        .map(|info| info.pixel_format)
        .ok_or_else(|| anyhow!("JPEG header has no frame"))?;
    if !matches!(pixel_format, PixelFormat::L8 | PixelFormat::RGB24) {
        debug!(?pixel_format, "JPEG pixel format needs a full decode");
        return Ok(None);
    }

    let requested = (
        u16::try_from(target.0).unwrap_or(u16::MAX),
        u16::try_from(target.1).unwrap_or(u16::MAX),
    );
    let (w, h) = decoder
        .scale(requested.0, requested.1)
        .context("Scaling JPEG decode")?;
    let pixels = decoder.decode().context("Decoding image")?;
    let (w, h) = (u32::from(w), u32::from(h));
    debug!(width = w, height = h, "Decoded scaled JPEG");
    let image = match pixel_format {
        PixelFormat::L8 => GrayImage::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
        _ => RgbImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
    };
    image
        .map(Some)
        .ok_or_else(|| anyhow!("JPEG decoder returned {w}x{h} with a short buffer"))
}

/// Stream PNG rows through a box filter. `None` for interlaced files, whose
/// rows do not arrive top to bottom.
fn decode_png_sampled(source: &Path, factor: u32) -> Result<Option<DynamicImage>> {
    let file = File::open(source).with_context(|| format!("Opening {}", source.display()))?;
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().context("Reading PNG header")?;
    if reader.info().interlaced {
        debug!("Interlaced PNG needs a full decode");
        return Ok(None);
    }
    let (width, height) = (reader.info().width, reader.info().height);
    let (color, _) = reader.output_color_type();
    let mut sampler = BoxSampler::new(width, height, factor, color.samples());
    while !sampler.is_full() {
        let Some(row) = reader.next_row().context("Decoding image")? else {
            break;
        };
        sampler.push_row(row.data());
    }
    sampler.finish().map(Some)
}

fn decode_full(source: &Path, width: u32, height: u32) -> Result<DynamicImage> {
    let mut reader = ImageReader::open(source)
        .with_context(|| format!("Opening {}", source.display()))?
        .with_guessed_format()
        .context("Detecting image format")?;
    // Room for the widest pixel type at full size.
    let needed = u64::from(width) * u64::from(height) * 16;
    let mut limits = image::Limits::default();
    limits.max_alloc = Some(limits.max_alloc.unwrap_or(0).max(needed));
    reader.limits(limits);
    reader.decode().context("Decoding image")
}

/// Averages `factor` x `factor` pixel blocks from rows fed top to bottom.
/// Trailing rows and columns that do not fill a block are dropped, matching
/// the truncating output size.
struct BoxSampler {
    factor: u32,
    channels: usize,
    out_width: u32,
    out_height: u32,
    columns: usize,
    column_weights: Vec<u64>,
    sums: Vec<u64>,
    band_rows: u32,
    out: Vec<u8>,
}

impl BoxSampler {
    fn new(width: u32, height: u32, factor: u32, channels: usize) -> Self {
        let factor = factor.max(1);
        let out_width = (width / factor).max(1);
        let out_height = (height / factor).max(1);
        let columns = (out_width as usize * factor as usize).min(width as usize);
        let column_weights = (0..out_width as usize)
            .map(|ox| {
                let start = ox * factor as usize;
                columns.saturating_sub(start).min(factor as usize) as u64
            })
            .collect();
        Self {
            factor,
            channels,
            out_width,
            out_height,
            columns,
            column_weights,
            sums: vec![0; out_width as usize * channels],
            band_rows: 0,
            out: Vec::with_capacity(out_width as usize * out_height as usize * channels),
        }
    }

    fn is_full(&self) -> bool {
        self.out.len() == self.out_width as usize * self.out_height as usize * self.channels
    }

    fn push_row(&mut self, row: &[u8]) {
        if self.is_full() {
            return;
        }
        let factor = self.factor as usize;
        for (x, pixel) in row.chunks_exact(self.channels).take(self.columns).enumerate() {
            let base = (x / factor) * self.channels;
            for (sum, value) in self.sums[base..base + self.channels].iter_mut().zip(pixel) {
                *sum += u64::from(*value);
            }
        }
        self.band_rows += 1;
        if self.band_rows == self.factor {
            self.flush_band();
        }
    }

    fn flush_band(&mut self) {
        let rows = u64::from(self.band_rows);
        for (ox, weight) in self.column_weights.iter().enumerate() {
            let divisor = (rows * weight).max(1);
            for c in 0..self.channels {
                let sum = self.sums[ox * self.channels + c];
                self.out.push(((sum + divisor / 2) / divisor) as u8);
            }
        }
        self.sums.iter_mut().for_each(|sum| *sum = 0);
        self.band_rows = 0;
    }

    fn finish(mut self) -> Result<DynamicImage> {
        // A source shorter than one block still yields a single row.
        if self.band_rows > 0 && !self.is_full() {
            self.flush_band();
        }
        if !self.is_full() {
            return Err(anyhow!(
                "Image data ended early: {} of {} rows",
                self.out.len() / (self.out_width as usize * self.channels),
                self.out_height
            ));
        }
        let (w, h) = (self.out_width, self.out_height);
        let image = match self.channels {
            1 => GrayImage::from_raw(w, h, self.out).map(DynamicImage::ImageLuma8),
            2 => image::GrayAlphaImage::from_raw(w, h, self.out).map(DynamicImage::ImageLumaA8),
            3 => RgbImage::from_raw(w, h, self.out).map(DynamicImage::ImageRgb8),
            4 => image::RgbaImage::from_raw(w, h, self.out).map(DynamicImage::ImageRgba8),
            other => return Err(anyhow!("Unsupported channel count {other}")),
        };
        image.ok_or_else(|| anyhow!("Sampled buffer does not match {w}x{h}"))
    }
}

fn write_jpeg(image: &DynamicImage, path: &Path, quality: u8) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Creating upload directory {}", parent.display()))?;
    }
    let temp_path = unique_temp_path(path);
    let result = (|| -> Result<()> {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        let rgb = image.to_rgb8();
        JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100))
            .encode_image(&rgb)
            .context("Encoding JPEG")?;
        writer.flush()?;
        Ok(())
    })();
    if let Err(err) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }
    if fs::rename(&temp_path, path).is_err() {
        fs::copy(&temp_path, path).context("Moving compressed image into place")?;
        let _ = fs::remove_file(&temp_path);
    }
    Ok(())
}
