//! Colour pipeline data handed to the renderer.
//!
//! The expensive part of a pipeline (shader text and baked LUTs) lives in
//! [`ColourOperation`]s behind `Arc`s so that cached entries can be shared
//! by every frame with the same content and parameters. Only the uniform
//! table is per frame.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ColourError, ColourResult};

/// Where an operation sits in the display chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationStage {
    /// Source encoding to scene linear.
    ToLinear,
    /// Scene linear to the display.
    ToDisplay,
}

/// Baked 1D lookup table with per-channel linear interpolation over
/// `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColourLut {
    pub name: String,
    pub data: Vec<[f32; 3]>,
}

impl ColourLut {
    pub fn new(name: impl Into<String>, data: Vec<[f32; 3]>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<[f32; 3]>()
    }

    /// Look up an RGB triplet. Inputs outside `[0, 1]` are clamped.
    pub fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        match self.data.len() {
            0 => return rgb,
            1 => return self.data[0],
            _ => {}
        }
        let last = self.data.len() - 1;
        let mut out = [0.0f32; 3];
        for c in 0..3 {
            let pos = rgb[c].clamp(0.0, 1.0) * last as f32;
            let lo = (pos as usize).min(last - 1);
            let frac = pos - lo as f32;
            out[c] = self.data[lo][c] * (1.0 - frac) + self.data[lo + 1][c] * frac;
        }
        out
    }
}

/// One stage of the pipeline: shader source plus the LUTs it samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ColourOperation {
    pub stage: OperationStage,
    pub cache_id: String,
    pub shader: String,
    pub luts: Vec<ColourLut>,
}

impl ColourOperation {
    pub fn size_bytes(&self) -> usize {
        self.shader.len() + self.luts.iter().map(ColourLut::size_bytes).sum::<usize>()
    }

    /// Run a pixel through every LUT of this operation, in order.
    pub fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        self.luts.iter().fold(rgb, |px, lut| lut.apply(px))
    }
}

/// Everything a renderer needs to display one frame correctly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColourPipelineData {
    /// Aggregate id of all operations.
    pub cache_id: String,
    pub operations: Vec<Arc<ColourOperation>>,
    /// Per-frame shader uniform values.
    pub uniforms: BTreeMap<String, Value>,
}

/// Arc-wrapped pipeline data, as stored in the cache and returned to callers.
pub type SharedColourData = Arc<ColourPipelineData>;

impl ColourPipelineData {
    pub fn new(cache_id: impl Into<String>) -> Self {
        Self {
            cache_id: cache_id.into(),
            ..Self::default()
        }
    }

    /// Append an operation and fold its id into the aggregate id.
    pub fn push_operation(&mut self, operation: ColourOperation) {
        self.cache_id.push_str(&operation.cache_id);
        self.operations.push(Arc::new(operation));
    }

    pub fn operation(&self, stage: OperationStage) -> Option<&ColourOperation> {
        self.operations
            .iter()
            .map(AsRef::as_ref)
            .find(|op| op.stage == stage)
    }

    /// Size of the shared payload. Uniforms are not counted.
    pub fn size_bytes(&self) -> usize {
        self.operations.iter().map(|op| op.size_bytes()).sum()
    }

    /// Run a pixel through every operation, in order.
    pub fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        self.operations.iter().fold(rgb, |px, op| op.apply(px))
    }
}

/// Small RGB image used for thumbnails.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailBuffer {
    width: usize,
    height: usize,
    pixels: Vec<[f32; 3]>,
}

impl ThumbnailBuffer {
    pub fn new(width: usize, height: usize, pixels: Vec<[f32; 3]>) -> ColourResult<Self> {
        if pixels.len() != width * height {
            return Err(ColourError::Thumbnail(format!(
                "{}x{} thumbnail needs {} pixels, got {}",
                width,
                height,
                width * height,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A buffer filled with one colour.
    pub fn filled(width: usize, height: usize, rgb: [f32; 3]) -> Self {
        Self {
            width,
            height,
            pixels: vec![rgb; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[[f32; 3]] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [[f32; 3]] {
        &mut self.pixels
    }
}
