//! Builtin colour backend.
//!
//! Always available; the coordinator falls back to it when the preferred
//! backend cannot be created. Reads three colour parameters:
//! `transfer` (source encoding, default sRGB), `display` (output encoding,
//! default sRGB) and `exposure` (stops, default 0).

use parking_lot::Mutex;
use revue_core::{defaults, ColourParams, FrameDescriptor};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::backend::ColourBackend;
use crate::data::{ColourOperation, ColourPipelineData, OperationStage, ThumbnailBuffer};
use crate::error::{ColourError, ColourResult};
use crate::transfer::{Direction, TransferFunction};

const LUT_SIZE: usize = 1024;

const TO_LINEAR_SHADER: &str = "\
uniform sampler1D to_linear_lut;
vec3 to_linear(vec3 rgb) {
    return vec3(texture(to_linear_lut, rgb.r).r,
                texture(to_linear_lut, rgb.g).g,
                texture(to_linear_lut, rgb.b).b);
}
";

const TO_DISPLAY_SHADER: &str = "\
uniform sampler1D to_display_lut;
vec3 to_display(vec3 rgb) {
    return vec3(texture(to_display_lut, rgb.r).r,
                texture(to_display_lut, rgb.g).g,
                texture(to_display_lut, rgb.b).b);
}
";

/// Call counters, mostly of interest to tests and the driver's summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub setup_calls: usize,
    pub uniform_calls: usize,
    pub thumbnail_calls: usize,
}

/// Parameters the builtin backend understands.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BuiltinParams {
    transfer: TransferFunction,
    display: TransferFunction,
    exposure: f32,
}

impl BuiltinParams {
    fn parse(params: &ColourParams) -> ColourResult<Self> {
        let transfer = params.get("transfer").unwrap_or("srgb").parse()?;
        let display = params.get("display").unwrap_or("srgb").parse()?;
        let exposure = match params.get("exposure") {
            Some(text) => text
                .trim()
                .parse::<f32>()
                .map_err(|e| ColourError::Compute(format!("bad exposure '{}': {}", text, e)))?,
            None => 0.0,
        };
        Ok(Self {
            transfer,
            display,
            exposure,
        })
    }
}

#[derive(Debug)]
pub struct BuiltinBackend {
    name: String,
    lut_size: usize,
    stats: Mutex<BackendStats>,
}

impl Default for BuiltinBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinBackend {
    pub fn new() -> Self {
        Self {
            name: defaults::BUILTIN_BACKEND.to_string(),
            lut_size: LUT_SIZE,
            stats: Mutex::new(BackendStats::default()),
        }
    }

    /// A builtin backend registered under another name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new()
        }
    }

    pub fn with_lut_size(mut self, lut_size: usize) -> Self {
        self.lut_size = lut_size.max(2);
        self
    }

    pub fn stats(&self) -> BackendStats {
        self.stats.lock().clone()
    }

    fn operation_key(&self, stage: &str, content_id: &str, params: &ColourParams) -> String {
        let mut hasher = Sha256::new();
        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };
        field(self.name.as_bytes());
        field(stage.as_bytes());
        field(content_id.as_bytes());
        for (key, value) in params.iter() {
            field(key.as_bytes());
            field(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    fn build(
        &self,
        data: &mut ColourPipelineData,
        content_id: &str,
        params: &ColourParams,
    ) -> ColourResult<()> {
        let parsed = BuiltinParams::parse(params)?;
        let gain = 2f32.powf(parsed.exposure);

        data.push_operation(ColourOperation {
            stage: OperationStage::ToLinear,
            cache_id: self.operation_key("to_linear", content_id, params),
            shader: TO_LINEAR_SHADER.to_string(),
            luts: vec![parsed.transfer.bake(
                format!("to_linear_{}", parsed.transfer),
                Direction::ToLinear,
                self.lut_size,
                gain,
            )],
        });
        data.push_operation(ColourOperation {
            stage: OperationStage::ToDisplay,
            cache_id: self.operation_key("to_display", content_id, params),
            shader: TO_DISPLAY_SHADER.to_string(),
            luts: vec![parsed.display.bake(
                format!("to_display_{}", parsed.display),
                Direction::FromLinear,
                self.lut_size,
                1.0,
            )],
        });
        Ok(())
    }
}

impl ColourBackend for BuiltinBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute_hash(&self, content_id: &str, params: &ColourParams) -> String {
        self.operation_key("pipeline", content_id, params)
    }

    fn make_empty_data(&self) -> ColourPipelineData {
        ColourPipelineData::new("")
    }

    fn setup(
        &self,
        data: &mut ColourPipelineData,
        content_id: &str,
        params: &ColourParams,
    ) -> ColourResult<()> {
        self.stats.lock().setup_calls += 1;
        trace!(backend = %self.name, content = content_id, "Building colour operations");
        self.build(data, content_id, params)
    }

    fn update_uniforms(
        &self,
        data: &mut ColourPipelineData,
        frame: &FrameDescriptor,
    ) -> ColourResult<()> {
        self.stats.lock().uniform_calls += 1;
        data.uniforms
            .insert("source_id".into(), json!(frame.source_id.to_string()));
        data.uniforms.insert("frame".into(), json!(frame.frame));
        if let Some(position) = frame.playhead_logical_frame {
            data.uniforms.insert("logical_frame".into(), json!(position));
        }
        Ok(())
    }

    fn process_thumbnail(
        &self,
        frame: &FrameDescriptor,
        mut buffer: ThumbnailBuffer,
    ) -> ColourResult<ThumbnailBuffer> {
        self.stats.lock().thumbnail_calls += 1;
        let mut data = self.make_empty_data();
        self.build(&mut data, &frame.content_id, &frame.colour_params)
            .map_err(|e| ColourError::Thumbnail(e.to_string()))?;
        for px in buffer.pixels_mut() {
            *px = data.apply(*px);
        }
        Ok(buffer)
    }
}
