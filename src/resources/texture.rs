//! Material texture data

use crate::backend::traits::*;
use crate::backend::types::*;
use std::path::Path;

/// How texel values are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Colors authored for display; sampling decodes to linear
    Srgb,
    /// Data such as normals or packed roughness
    Linear,
}

impl ColorSpace {
    pub(crate) fn format(self) -> TextureFormat {
        match self {
            ColorSpace::Srgb => TextureFormat::Rgba8UnormSrgb,
            ColorSpace::Linear => TextureFormat::Rgba8Unorm,
        }
    }
}

/// RGBA8 pixels ready for upload
#[derive(Debug, Clone)]
pub struct TextureData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Decode an image file
    pub fn open(path: impl AsRef<Path>, space: ColorSpace) -> BackendResult<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let image = image::open(path).map_err(|e| decode_error(&name, e))?;
        Ok(Self::from_rgba(name, image.to_rgba8(), space))
    }

    /// Decode an in-memory PNG, JPEG or any other format `image` understands
    pub fn decode(name: &str, bytes: &[u8], space: ColorSpace) -> BackendResult<Self> {
        let image = image::load_from_memory(bytes).map_err(|e| decode_error(name, e))?;
        Ok(Self::from_rgba(name.to_string(), image.to_rgba8(), space))
    }

    fn from_rgba(name: String, image: image::RgbaImage, space: ColorSpace) -> Self {
        Self {
            name,
            width: image.width(),
            height: image.height(),
            format: space.format(),
            pixels: image.into_raw(),
        }
    }

    /// A single texel
    pub fn fill(name: &str, rgba: [u8; 4], space: ColorSpace) -> Self {
        Self {
            name: name.to_string(),
            width: 1,
            height: 1,
            format: space.format(),
            pixels: rgba.to_vec(),
        }
    }

    /// Create a sampled texture holding these pixels and a view of it
    pub fn upload(
        &self,
        backend: &mut dyn GraphicsBackend,
    ) -> BackendResult<(TextureHandle, TextureViewHandle)> {
        let texture = backend.create_texture(&TextureDescriptor {
            label: Some(self.name.clone()),
            width: self.width,
            height: self.height,
            format: self.format,
            ..Default::default()
        })?;
        backend.write_texture(texture, &self.pixels, self.width, self.height);
        let view = backend.create_texture_view(texture)?;
        Ok((texture, view))
    }
}

fn decode_error(name: &str, error: image::ImageError) -> BackendError {
    BackendError::TextureCreationFailed(format!("{name}: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn fill_picks_format_from_color_space() {
        let normal = TextureData::fill("n", [128, 128, 255, 255], ColorSpace::Linear);
        assert_eq!(normal.format, TextureFormat::Rgba8Unorm);
        assert_eq!(normal.pixels.len(), 4);
        assert!(TextureData::fill("c", [255; 4], ColorSpace::Srgb).format.is_srgb());
    }

    #[test]
    fn decode_png() {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let data = TextureData::decode("tiny", &png, ColorSpace::Srgb).unwrap();
        assert_eq!((data.width, data.height), (2, 3));
        assert_eq!(&data.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn garbage_is_a_texture_error() {
        let err = TextureData::decode("junk", b"not an image", ColorSpace::Srgb).unwrap_err();
        assert!(matches!(err, BackendError::TextureCreationFailed(msg) if msg.starts_with("junk")));
    }

    #[test]
    fn upload_creates_texture_and_view() {
        let mut backend = RecordingBackend::new(4, 4);
        let data = TextureData::fill("white", [255; 4], ColorSpace::Srgb);
        let (texture, _) = data.upload(&mut backend).unwrap();
        let desc = backend.texture_descriptor(texture).unwrap();
        assert_eq!(desc.label.as_deref(), Some("white"));
        assert_eq!(desc.format, TextureFormat::Rgba8UnormSrgb);
    }
}
