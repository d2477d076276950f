//! Grid files: serde JSON windows and single-band GeoTIFF.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::error::{Result, ScarpError};
use crate::grid::{Crs, GeoTransform, Grid};

/// GeoKey ids carrying the EPSG code.
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

/// Read a grid, choosing the format from the file extension
/// (`.json`, `.tif`, `.tiff`).
pub fn read_grid(path: &Path) -> Result<Grid> {
    match extension(path).as_deref() {
        Some("json") => {
            let grid: Grid = serde_json::from_reader(BufReader::new(File::open(path)?))?;
            Grid::from_data(grid.data, grid.width, grid.height, grid.transform, grid.nodata, grid.crs)
        }
        Some("tif") | Some("tiff") => read_geotiff(BufReader::new(File::open(path)?), path),
        _ => Err(ScarpError::UnsupportedRaster {
            path: path.to_path_buf(),
            reason: "expected a .json, .tif or .tiff extension".into(),
        }),
    }
}

pub fn write_grid_json(path: &Path, grid: &Grid) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut out, grid)?;
    out.flush()?;
    Ok(())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Decode the first band of a GeoTIFF.
///
/// The transform comes from `ModelPixelScale` + `ModelTiepoint` (north-up,
/// pixel-is-area), the sentinel from `GDAL_NODATA`, the CRS from the
/// projected or geographic EPSG GeoKey. A missing GeoKey leaves the CRS
/// unknown.
pub fn read_geotiff<R: Read + Seek>(reader: R, path: &Path) -> Result<Grid> {
    let unsupported = |reason: String| ScarpError::UnsupportedRaster {
        path: path.to_path_buf(),
        reason,
    };

    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let scale = decoder
        .find_tag(Tag::ModelPixelScaleTag)?
        .map(|v| v.into_f64_vec())
        .transpose()?
        .ok_or_else(|| unsupported("missing ModelPixelScale tag".into()))?;
    let tie = decoder
        .find_tag(Tag::ModelTiepointTag)?
        .map(|v| v.into_f64_vec())
        .transpose()?
        .ok_or_else(|| unsupported("missing ModelTiepoint tag".into()))?;
    if scale.len() < 2 || tie.len() < 6 {
        return Err(unsupported("malformed georeferencing tags".into()));
    }
    let (sx, sy) = (scale[0], scale[1]);
    let transform = GeoTransform::new(tie[3] - tie[0] * sx, tie[4] + tie[1] * sy, sx, -sy);

    let nodata = match decoder.find_tag(Tag::GdalNodata)? {
        Some(v) => {
            let text = v.into_string()?;
            let text = text.trim_matches(char::from(0)).trim();
            Some(
                text.parse::<f32>()
                    .map_err(|_| unsupported(format!("GDAL_NODATA '{text}' is not numeric")))?,
            )
        }
        None => None,
    };

    let crs = match decoder.find_tag(Tag::GeoKeyDirectoryTag)? {
        Some(v) => epsg_from_geokeys(&v.into_u16_vec()?).map(Crs::epsg).unwrap_or_default(),
        None => Crs::default(),
    };

    let data: Vec<f32> = match decoder.read_image()? {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => return Err(unsupported("unsupported sample format".into())),
    };
    if data.len() != width * height {
        return Err(unsupported(format!(
            "expected one band of {width}x{height}, decoded {} samples",
            data.len()
        )));
    }
    Grid::from_data(data, width, height, transform, nodata, crs)
}

/// First projected, else geographic, EPSG code in a GeoKey directory.
fn epsg_from_geokeys(keys: &[u16]) -> Option<u32> {
    let n = usize::from(*keys.get(3)?);
    let entries: Vec<&[u16]> = keys.get(4..4 + 4 * n)?.chunks_exact(4).collect();
    let lookup = |id: u16| {
        entries
            .iter()
            .find(|e| e[0] == id && e[1] == 0)
            .map(|e| u32::from(e[3]))
            .filter(|&code| code != 0 && code != 32767)
    };
    lookup(PROJECTED_CS_TYPE_GEO_KEY).or_else(|| lookup(GEOGRAPHIC_TYPE_GEO_KEY))
}

/// Encode a grid as a single-band f32 GeoTIFF readable by [`read_geotiff`].
pub fn write_geotiff<W: Write + Seek>(writer: W, grid: &Grid) -> Result<()> {
    let t = &grid.transform;
    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(grid.width as u32, grid.height as u32)?;
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &[t.cell_width, -t.cell_height, 0.0][..])?;
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0][..])?;
    if let Some(code) = grid
        .crs
        .as_str()
        .strip_prefix("EPSG:")
        .and_then(|c| c.parse::<u16>().ok())
    {
        let keys: [u16; 8] = [1, 1, 0, 1, PROJECTED_CS_TYPE_GEO_KEY, 0, 1, code];
        image.encoder().write_tag(Tag::GeoKeyDirectoryTag, &keys[..])?;
    }
    if let Some(nodata) = grid.nodata {
        image.encoder().write_tag(Tag::GdalNodata, nodata.to_string().as_str())?;
    }
    image.write_data(&grid.data)?;
    Ok(())
}
