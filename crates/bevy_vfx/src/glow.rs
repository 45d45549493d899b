//! Procedural soft-glow particle sprites.
//!
//! A glow sprite is a square RGBA8 bitmap whose alpha falls off radially from
//! the center. Sprites are rasterized once per distinct [`GlowTexture`]
//! descriptor and shared through [`VfxAssetCache`].

use bevy::asset::RenderAssetUsages;
use bevy::image::ImageSampler;
use bevy::platform::collections::HashMap;
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use serde::{Deserialize, Serialize};

/// Largest edge length a glow sprite is rasterized at.
pub const MAX_GLOW_SIZE: u32 = 4096;

/// Radial alpha falloff of a glow sprite. `d` is the distance from the
/// center normalized so that the inscribed circle has radius 1.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub enum GlowFalloff {
    /// `exp(-d² · sharpness)`
    Gaussian { sharpness: f32 },
    /// `clamp01(1 - d³ · sharpness)`
    Cubic { sharpness: f32 },
}

impl GlowFalloff {
    pub fn alpha(&self, d: f32) -> f32 {
        match *self {
            Self::Gaussian { sharpness } => (-d * d * sharpness).exp(),
            Self::Cubic { sharpness } => (1.0 - d * d * d * sharpness).clamp(0.0, 1.0),
        }
    }
}

/// Descriptor of a procedurally generated glow sprite.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct GlowTexture {
    /// Edge length in pixels, at most [`MAX_GLOW_SIZE`].
    pub size: u32,
    pub falloff: GlowFalloff,
    /// Brightness is `alpha^gamma`.
    pub gamma: f32,
    /// Per-channel multiplier applied to brightness.
    pub tint: Vec3,
}

impl Default for GlowTexture {
    fn default() -> Self {
        Self {
            size: 128,
            falloff: GlowFalloff::Gaussian { sharpness: 5.0 },
            gamma: 0.6,
            tint: Vec3::ONE,
        }
    }
}

impl GlowTexture {
    /// Edge length actually rasterized.
    pub fn edge(&self) -> u32 {
        self.size.min(MAX_GLOW_SIZE)
    }

    /// Alpha at integer pixel `(x, y)`.
    pub fn alpha_at(&self, x: u32, y: u32) -> f32 {
        let half = self.edge() as f32 / 2.0;
        if half <= 0.0 {
            return 0.0;
        }
        let d = Vec2::new(x as f32, y as f32).distance(Vec2::splat(half)) / half;
        self.falloff.alpha(d)
    }

    /// Rasterize to tightly packed RGBA8, row-major from `y = 0`.
    pub fn rasterize(&self) -> Vec<u8> {
        let size = self.edge();
        let len = (size as usize)
            .checked_mul(size as usize)
            .and_then(|n| n.checked_mul(4))
            .unwrap_or(0);
        let mut pixels = Vec::with_capacity(len);
        for y in 0..size {
            for x in 0..size {
                let alpha = self.alpha_at(x, y);
                let brightness = alpha.powf(self.gamma);
                pixels.push(to_byte(brightness * self.tint.x));
                pixels.push(to_byte(brightness * self.tint.y));
                pixels.push(to_byte(brightness * self.tint.z));
                pixels.push(to_byte(alpha));
            }
        }
        pixels
    }

    /// Build a clamped, linearly filtered sRGB image.
    pub fn to_image(&self) -> Image {
        let mut image = Image::new(
            Extent3d {
                width: self.edge(),
                height: self.edge(),
                depth_or_array_layers: 1,
            },
            TextureDimension::D2,
            self.rasterize(),
            TextureFormat::Rgba8UnormSrgb,
            RenderAssetUsages::RENDER_WORLD,
        );
        image.sampler = ImageSampler::linear();
        image
    }

    fn cache_key(&self) -> GlowKey {
        let (kind, sharpness) = match self.falloff {
            GlowFalloff::Gaussian { sharpness } => (0u8, sharpness),
            GlowFalloff::Cubic { sharpness } => (1u8, sharpness),
        };
        GlowKey {
            size: self.size,
            kind,
            sharpness: sharpness.to_bits(),
            gamma: self.gamma.to_bits(),
            tint: [
                self.tint.x.to_bits(),
                self.tint.y.to_bits(),
                self.tint.z.to_bits(),
            ],
        }
    }
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct GlowKey {
    size: u32,
    kind: u8,
    sharpness: u32,
    gamma: u32,
    tint: [u32; 3],
}

/// Shared handles for generated layer assets: glow sprites and the unit quad
/// every sprite particle is drawn with.
#[derive(Resource, Default)]
pub struct VfxAssetCache {
    glows: HashMap<GlowKey, Handle<Image>>,
    quad: Option<Handle<Mesh>>,
}

impl VfxAssetCache {
    /// Return the sprite for `desc`, rasterizing it on first request only.
    pub fn glow(&mut self, desc: &GlowTexture, images: &mut Assets<Image>) -> Handle<Image> {
        self.glows
            .entry(desc.cache_key())
            .or_insert_with(|| {
                debug!("Rasterizing {}px glow sprite", desc.size);
                images.add(desc.to_image())
            })
            .clone()
    }

    pub fn quad(&mut self, meshes: &mut Assets<Mesh>) -> Handle<Mesh> {
        self.quad
            .get_or_insert_with(|| meshes.add(Rectangle::new(1.0, 1.0)))
            .clone()
    }

    pub fn glow_count(&self) -> usize {
        self.glows.len()
    }
}
