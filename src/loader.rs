//! TIFF slice and stack loading
//!
//! Decoding is delegated to the `tiff` crate; this module maps decoded
//! pages into [`PixelBlock`]s in native (row, column) order.

use crate::block::{PixelBlock, PixelData};
use crate::error::{Result, UploadError};
use ndarray::{ArrayD, IxDyn};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};

/// Raw samples of one decoded page
enum RawPage {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

impl RawPage {
    fn from_result(result: DecodingResult) -> Result<Self> {
        match result {
            DecodingResult::U8(v) => Ok(RawPage::U8(v)),
            DecodingResult::U16(v) => Ok(RawPage::U16(v)),
            DecodingResult::U32(v) => Ok(RawPage::U32(v)),
            DecodingResult::U64(v) => Ok(RawPage::U64(v)),
            _ => Err(UploadError::Decode(
                "unsupported sample type: only unsigned integer samples are supported"
                    .to_string(),
            )),
        }
    }

    fn len(&self) -> usize {
        match self {
            RawPage::U8(v) => v.len(),
            RawPage::U16(v) => v.len(),
            RawPage::U32(v) => v.len(),
            RawPage::U64(v) => v.len(),
        }
    }
}

fn decode_error(path: &Path, err: impl std::fmt::Display) -> UploadError {
    UploadError::Decode(format!("{}: {}", path.display(), err))
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path).map_err(|e| decode_error(path, e))?;
    Decoder::new(BufReader::new(file)).map_err(|e| decode_error(path, e))
}

/// Reject paths without a `.tif`/`.tiff` extension before attempting decode
pub fn require_tiff_extension(path: &Path) -> Result<()> {
    let ok = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(UploadError::InvalidExtension(
            path.display().to_string(),
        ))
    }
}

/// Decode one single-page TIFF into a (row, column) block
pub fn load_slice(path: &Path) -> Result<PixelBlock> {
    let mut decoder = open_decoder(path)?;
    let (width, height) = decoder.dimensions().map_err(|e| decode_error(path, e))?;
    let page = RawPage::from_result(decoder.read_image().map_err(|e| decode_error(path, e))?)?;
    page_to_block(page, &[height as usize, width as usize], path)
}

/// Decode all pages of a multi-page TIFF into a (page, row, column) block
pub fn load_stack(path: &Path) -> Result<PixelBlock> {
    let mut decoder = open_decoder(path)?;
    let (width, height) = decoder.dimensions().map_err(|e| decode_error(path, e))?;

    let mut pages = Vec::new();
    loop {
        let (w, h) = decoder.dimensions().map_err(|e| decode_error(path, e))?;
        if (w, h) != (width, height) {
            return Err(decode_error(
                path,
                format!(
                    "page {} is {}x{}, expected {}x{}",
                    pages.len(),
                    w,
                    h,
                    width,
                    height
                ),
            ));
        }
        pages.push(RawPage::from_result(
            decoder.read_image().map_err(|e| decode_error(path, e))?,
        )?);
        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(|e| decode_error(path, e))?;
    }

    stack_pages(pages, height as usize, width as usize, path)
}

fn page_to_block(page: RawPage, shape: &[usize], path: &Path) -> Result<PixelBlock> {
    let expected: usize = shape.iter().product();
    if page.len() != expected {
        return Err(decode_error(
            path,
            format!(
                "unsupported sample layout: got {} samples for shape {:?}",
                page.len(),
                shape
            ),
        ));
    }

    let data = match page {
        RawPage::U8(v) => PixelData::U8(from_vec(v, shape)?),
        RawPage::U16(v) => PixelData::U16(from_vec(v, shape)?),
        RawPage::U32(v) => PixelData::U32(from_vec(v, shape)?),
        RawPage::U64(v) => PixelData::U64(from_vec(v, shape)?),
    };
    Ok(PixelBlock::new(data))
}

fn from_vec<T>(v: Vec<T>, shape: &[usize]) -> Result<ArrayD<T>> {
    ArrayD::from_shape_vec(IxDyn(shape), v)
        .map_err(|e| UploadError::Decode(format!("sample count does not match shape: {}", e)))
}

macro_rules! stack_variant {
    ($variant:ident, $first:expr, $rest:expr, $shape:expr, $path:expr) => {{
        let mut buf = $first;
        buf.reserve($rest.len() * buf.len());
        for page in $rest {
            match page {
                RawPage::$variant(v) => buf.extend_from_slice(&v),
                _ => {
                    return Err(decode_error(
                        $path,
                        "pages have mixed sample types".to_string(),
                    ))
                }
            }
        }
        PixelData::$variant(from_vec(buf, $shape)?)
    }};
}

fn stack_pages(pages: Vec<RawPage>, height: usize, width: usize, path: &Path) -> Result<PixelBlock> {
    let expected = height * width;
    for (i, page) in pages.iter().enumerate() {
        if page.len() != expected {
            return Err(decode_error(
                path,
                format!(
                    "unsupported sample layout on page {}: got {} samples for {}x{}",
                    i,
                    page.len(),
                    height,
                    width
                ),
            ));
        }
    }

    let shape = [pages.len(), height, width];
    let mut iter = pages.into_iter();
    let first = match iter.next() {
        Some(page) => page,
        None => return Err(decode_error(path, "no pages in file".to_string())),
    };
    let rest: Vec<RawPage> = iter.collect();

    let data = match first {
        RawPage::U8(v) => stack_variant!(U8, v, rest, &shape, path),
        RawPage::U16(v) => stack_variant!(U16, v, rest, &shape, path),
        RawPage::U32(v) => stack_variant!(U32, v, rest, &shape, path),
        RawPage::U64(v) => stack_variant!(U64, v, rest, &shape, path),
    };
    Ok(PixelBlock::new(data))
}
